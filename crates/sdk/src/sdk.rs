//! The provider being assembled, then registered with the engine.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use papiea_client::{ClientOptions, IntentWatcherClient, ProviderClient};
use papiea_domain::error::{Error, Result};
use papiea_domain::model::{
    validate_error_codes, ExecutionStrategy, Kind, ProceduralSignature, ProcedureDescription,
    Provider,
};
use papiea_domain::trace::TraceEvent;
use serde_json::{json, Value};
use tracing::Instrument;

use crate::builder::ProviderSdkBuilder;
use crate::context::{ContextSeed, Shared};
use crate::handler::ProcedureHandler;
use crate::kind_builder::KindBuilder;
use crate::security::SecurityApi;
use crate::server::{route_path, CallbackServer, Route, RouteHandler, HEALTHCHECK};

/// Owns the provider document and the callback server.
///
/// Lifecycle: configure (`prefix`, `version`, kinds, procedures), then
/// [`register`](Self::register) once. Configuration calls fail with
/// [`Error::Config`] after registration.
pub struct ProviderSdk {
    shared: Arc<Shared>,
    server: CallbackServer,
    prefix: Option<String>,
    version: Option<String>,
    kinds: Vec<Kind>,
    procedures: BTreeMap<String, ProceduralSignature>,
    extension_structure: Value,
    allow_extra_props: bool,
    policy: Option<String>,
    oauth2: Option<String>,
    auth_model: Option<String>,
    registered: Option<Provider>,
}

impl fmt::Debug for ProviderSdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSdk")
            .field("engine_url", &self.shared.engine_url)
            .field("prefix", &self.prefix)
            .field("version", &self.version)
            .field("kinds", &self.kinds.iter().map(|k| &k.name).collect::<Vec<_>>())
            .field("routes", &self.server.route_paths())
            .field("registered", &self.registered.is_some())
            .finish()
    }
}

impl ProviderSdk {
    pub fn builder() -> ProviderSdkBuilder {
        ProviderSdkBuilder::new()
    }

    pub(crate) fn from_parts(shared: Arc<Shared>, server: CallbackServer, allow_extra_props: bool) -> Self {
        Self {
            shared,
            server,
            prefix: None,
            version: None,
            kinds: Vec::new(),
            procedures: BTreeMap::new(),
            extension_structure: json!({}),
            allow_extra_props,
            policy: None,
            oauth2: None,
            auth_model: None,
            registered: None,
        }
    }

    // ── Provider document ────────────────────────────────────────────

    /// Fails once a route is mounted with a different prefix.
    pub fn prefix(&mut self, prefix: impl Into<String>) -> Result<&mut Self> {
        self.ensure_configurable()?;
        let prefix = prefix.into();
        self.ensure_identity_unchanged("prefix", self.prefix.as_deref(), &prefix)?;
        self.prefix = Some(prefix);
        Ok(self)
    }

    /// Fails once a route is mounted with a different version.
    pub fn version(&mut self, version: impl Into<String>) -> Result<&mut Self> {
        self.ensure_configurable()?;
        let version = version.into();
        self.ensure_identity_unchanged("version", self.version.as_deref(), &version)?;
        self.version = Some(version);
        Ok(self)
    }

    /// Schema of the metadata extension every entity of this provider
    /// must carry.
    pub fn metadata_extension(&mut self, schema: Value) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.extension_structure = schema;
        Ok(self)
    }

    pub fn allow_extra_props(&mut self, allow: bool) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.allow_extra_props = allow;
        Ok(self)
    }

    /// Attach the OAuth2 description, auth model and policy the engine
    /// enforces for this provider.
    pub fn secure_with(
        &mut self,
        oauth2: impl Into<String>,
        auth_model: impl Into<String>,
        policy: impl Into<String>,
    ) -> Result<&mut Self> {
        self.ensure_configurable()?;
        self.oauth2 = Some(oauth2.into());
        self.auth_model = Some(auth_model.into());
        self.policy = Some(policy.into());
        Ok(self)
    }

    // ── Kinds ────────────────────────────────────────────────────────

    /// Add a kind built from `{Name: {<schema>, "x-papiea-entity": ..}}`.
    pub fn new_kind(&mut self, description: &Value) -> Result<KindBuilder<'_>> {
        self.ensure_configurable()?;
        let kind = Kind::from_description(description)?;
        if self.kind_index(&kind.name).is_some() {
            return Err(Error::Config(format!("kind '{}' already exists", kind.name)));
        }
        self.kinds.push(kind);
        let index = self.kinds.len() - 1;
        Ok(KindBuilder::new(self, index))
    }

    /// Add a prepared kind. `Ok(None)` when a kind with that name exists.
    pub fn add_kind(&mut self, kind: Kind) -> Result<Option<KindBuilder<'_>>> {
        self.ensure_configurable()?;
        if self.kind_index(&kind.name).is_some() {
            return Ok(None);
        }
        self.kinds.push(kind);
        let index = self.kinds.len() - 1;
        Ok(Some(KindBuilder::new(self, index)))
    }

    /// Drop a kind from the document. Its callback routes stay mounted.
    pub fn remove_kind(&mut self, name: &str) -> Result<bool> {
        self.ensure_configurable()?;
        Ok(match self.kind_index(name) {
            Some(index) => {
                self.kinds.remove(index);
                true
            }
            None => false,
        })
    }

    /// Re-open a kind added earlier.
    pub fn kind_builder(&mut self, name: &str) -> Option<KindBuilder<'_>> {
        let index = self.kind_index(name)?;
        Some(KindBuilder::new(self, index))
    }

    pub fn kinds(&self) -> &[Kind] {
        &self.kinds
    }

    fn kind_index(&self, name: &str) -> Option<usize> {
        self.kinds.iter().position(|k| k.name == name)
    }

    // ── Procedures ───────────────────────────────────────────────────

    /// Provider-level procedure, served at `/{name}`.
    pub fn provider_procedure(
        &mut self,
        name: &str,
        description: ProcedureDescription,
        handler: impl ProcedureHandler,
    ) -> Result<&mut Self> {
        self.ensure_configurable()?;
        if name == HEALTHCHECK {
            return Err(Error::Config(format!(
                "'{HEALTHCHECK}' is reserved for liveness probes"
            )));
        }
        let signature = self.signature(name, None, description)?;
        self.mount(
            route_path(name, None),
            RouteHandler::Procedure(Arc::new(handler)),
        )?;
        self.procedures.insert(name.to_owned(), signature);
        Ok(self)
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Send the provider document to the engine and start the callback
    /// server. One-shot.
    pub async fn register(&mut self) -> Result<()> {
        if self.registered.is_some() {
            return Err(Error::Config("provider is already registered".into()));
        }
        let provider = self.document()?;

        let span = self.shared.span.clone();
        async {
            tracing::info!(
                prefix = %provider.prefix,
                version = %provider.version,
                "registering provider"
            );
            self.shared
                .provider_api
                .execute(reqwest::Method::POST, "", Some(&provider), None)
                .await?;
            self.server.start().await?;
            Ok::<_, Error>(())
        }
        .instrument(span)
        .await?;

        TraceEvent::ProviderRegistered {
            prefix: provider.prefix.clone(),
            version: provider.version.clone(),
            kinds: provider.kinds.len(),
            procedures: provider.procedures.len(),
        }
        .emit();
        self.registered = Some(provider);
        Ok(())
    }

    /// Assemble the provider document. Fails naming the first missing
    /// field among prefix, version and kind.
    pub fn document(&self) -> Result<Provider> {
        let missing = |field: &str| Error::Config(format!("Malformed provider description. Missing: {field}"));
        let prefix = self.prefix.clone().ok_or_else(|| missing("prefix"))?;
        let version = self.version.clone().ok_or_else(|| missing("version"))?;
        if self.kinds.is_empty() {
            return Err(missing("kind"));
        }
        Ok(Provider {
            prefix,
            version,
            kinds: self.kinds.clone(),
            procedures: self.procedures.clone(),
            extension_structure: self.extension_structure.clone(),
            allow_extra_props: self.allow_extra_props,
            policy: self.policy.clone(),
            oauth2: self.oauth2.clone(),
            auth_model: self.auth_model.clone(),
        })
    }

    /// The document the engine accepted, once registered.
    pub fn provider(&self) -> Option<&Provider> {
        self.registered.as_ref()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.is_some()
    }

    pub async fn shutdown(&self) {
        self.server.shutdown().await;
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn server(&self) -> &CallbackServer {
        &self.server
    }

    pub fn engine_url(&self) -> &str {
        &self.shared.engine_url
    }

    /// Address the callback server listens on, once registered.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    pub fn client_options(&self) -> ClientOptions {
        self.shared.client_options(self.shared.s2s_key.as_deref())
    }

    pub fn provider_client(&self) -> Result<ProviderClient> {
        let (prefix, version) = self.identity()?;
        ProviderClient::new(&self.client_options(), &prefix, &version)
    }

    pub fn intent_watcher(&self) -> Result<IntentWatcherClient> {
        IntentWatcherClient::new(&self.client_options())
    }

    /// Security API acting with the SDK's own key.
    pub fn provider_security_api(&self) -> Result<SecurityApi> {
        let key = self
            .shared
            .s2s_key
            .clone()
            .ok_or_else(|| Error::Config("no provider s2s key configured".into()))?;
        self.new_security_api(&key)
    }

    pub fn new_security_api(&self, key: &str) -> Result<SecurityApi> {
        let (prefix, version) = self.identity()?;
        Ok(self.shared.security_api(&prefix, &version, key))
    }

    // ── crate internals ──────────────────────────────────────────────

    pub(crate) fn ensure_configurable(&self) -> Result<()> {
        if self.registered.is_some() {
            return Err(Error::Config(
                "provider is already registered; configure it before register()".into(),
            ));
        }
        Ok(())
    }

    fn ensure_identity_unchanged(&self, field: &str, current: Option<&str>, new: &str) -> Result<()> {
        if self.server.should_run() && current != Some(new) {
            return Err(Error::Config(format!(
                "cannot change the provider {field} after callbacks are mounted"
            )));
        }
        Ok(())
    }

    fn identity(&self) -> Result<(String, String)> {
        match (&self.prefix, &self.version) {
            (Some(p), Some(v)) => Ok((p.clone(), v.clone())),
            (None, _) => Err(Error::Config("provider prefix is not set".into())),
            (_, None) => Err(Error::Config("provider version is not set".into())),
        }
    }

    /// Signature of a procedure served by this SDK. Input and output
    /// schemas default to `{}`.
    pub(crate) fn signature(
        &self,
        name: &str,
        kind: Option<&str>,
        description: ProcedureDescription,
    ) -> Result<ProceduralSignature> {
        validate_error_codes(description.errors_schemas.as_ref())?;
        Ok(ProceduralSignature {
            name: name.to_owned(),
            argument: description.input_schema.unwrap_or_else(|| json!({})),
            result: description.output_schema.unwrap_or_else(|| json!({})),
            execution_strategy: ExecutionStrategy::Basic,
            procedure_callback: self.server.procedure_callback_url(name, kind),
            base_callback: self.server.callback_url(kind),
            errors_schemas: description.errors_schemas,
            description: description.description,
        })
    }

    /// Mount a handler. Needs prefix and version, which every context the
    /// route creates carries.
    pub(crate) fn mount(&self, path: String, handler: RouteHandler) -> Result<()> {
        let (prefix, version) = self.identity()?;
        let seed = ContextSeed {
            shared: self.shared.clone(),
            prefix,
            version,
        };
        self.server.register(path, Route { handler, seed });
        Ok(())
    }

    pub(crate) fn kind_mut(&mut self, index: usize) -> &mut Kind {
        &mut self.kinds[index]
    }

    pub(crate) fn kind_at(&self, index: usize) -> &Kind {
        &self.kinds[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerResult;
    use papiea_domain::model::{ErrorSchema, IntentfulBehaviour};

    fn sdk() -> ProviderSdk {
        ProviderSdk::builder()
            .engine_url("http://engine:3333")
            .public_host("provider.local")
            .public_port(9005)
            .build()
            .unwrap()
    }

    fn location() -> Value {
        json!({ "Location": { "type": "object", "x-papiea-entity": "differ" } })
    }

    async fn pong(_ctx: crate::ProceduralCtx, _input: Value) -> HandlerResult<Value> {
        Ok(json!("pong"))
    }

    #[test]
    fn document_names_the_first_missing_field() {
        let mut sdk = sdk();
        let msg = |sdk: &ProviderSdk| sdk.document().unwrap_err().to_string();
        assert!(msg(&sdk).ends_with("Missing: prefix"), "{}", msg(&sdk));

        sdk.prefix("location_provider").unwrap();
        assert!(msg(&sdk).ends_with("Missing: version"));

        sdk.version("0.1.0").unwrap();
        assert!(msg(&sdk).ends_with("Missing: kind"));

        sdk.new_kind(&location()).unwrap();
        let doc = sdk.document().unwrap();
        assert_eq!(doc.kinds[0].intentful_behaviour, IntentfulBehaviour::Differ);
        assert_eq!(doc.kinds[0].name_plural, "Locations");
    }

    #[test]
    fn version_alone_still_misses_prefix() {
        let mut sdk = sdk();
        sdk.version("0.1.0").unwrap();
        sdk.new_kind(&location()).unwrap();
        assert!(sdk.document().unwrap_err().to_string().ends_with("Missing: prefix"));
    }

    #[test]
    fn duplicate_kinds() {
        let mut sdk = sdk();
        sdk.new_kind(&location()).unwrap();
        assert!(sdk.new_kind(&location()).is_err());

        let kind = Kind::from_description(&location()).unwrap();
        assert!(sdk.add_kind(kind).unwrap().is_none());
        assert!(sdk.remove_kind("Location").unwrap());
        assert!(!sdk.remove_kind("Location").unwrap());
        assert!(sdk.kind_builder("Location").is_none());
    }

    #[test]
    fn provider_procedure_records_signature_and_route() {
        let mut sdk = sdk();
        sdk.prefix("location_provider").unwrap().version("0.1.0").unwrap();
        sdk.provider_procedure(
            "ping",
            ProcedureDescription::new().output(json!({ "type": "string" })),
            pong,
        )
        .unwrap();
        sdk.new_kind(&location()).unwrap();

        let doc = sdk.document().unwrap();
        let ping = &doc.procedures["ping"];
        assert_eq!(ping.procedure_callback, "http://provider.local:9005/ping");
        assert_eq!(ping.base_callback, "http://provider.local:9005/");
        assert_eq!(ping.argument, json!({}));
        assert_eq!(sdk.server().route_paths(), vec!["/ping".to_owned()]);
    }

    #[test]
    fn procedures_need_identity_and_valid_error_codes() {
        let mut sdk = sdk();
        let err = sdk
            .provider_procedure("ping", ProcedureDescription::new(), pong)
            .unwrap_err();
        assert!(err.to_string().contains("prefix"));

        sdk.prefix("p").unwrap().version("1").unwrap();
        let bad = ProcedureDescription::new().error(302, ErrorSchema::default());
        assert!(sdk.provider_procedure("ping", bad, pong).is_err());
        assert!(!sdk.server().should_run());
    }

    #[test]
    fn document_always_carries_an_extension_structure() {
        let mut sdk = sdk();
        sdk.prefix("p").unwrap().version("1").unwrap();
        sdk.new_kind(&location()).unwrap();
        let v = serde_json::to_value(sdk.document().unwrap()).unwrap();
        assert_eq!(v.get("extension_structure"), Some(&json!({})));

        let schema = json!({ "owner": { "type": "string" } });
        sdk.metadata_extension(schema.clone()).unwrap();
        assert_eq!(sdk.document().unwrap().extension_structure, schema);
    }

    #[test]
    fn identity_is_fixed_once_routes_are_mounted() {
        let mut sdk = sdk();
        sdk.prefix("p").unwrap().version("1").unwrap();
        sdk.prefix("location_provider").unwrap();

        sdk.provider_procedure("ping", ProcedureDescription::new(), pong)
            .unwrap();
        assert!(matches!(sdk.prefix("other"), Err(Error::Config(_))));
        assert!(matches!(sdk.version("2"), Err(Error::Config(_))));
        sdk.prefix("location_provider").unwrap().version("1").unwrap();
        assert_eq!(sdk.provider_client().unwrap().prefix(), "location_provider");
    }

    #[test]
    fn healthcheck_is_not_a_procedure_name() {
        let mut sdk = sdk();
        sdk.prefix("p").unwrap().version("1").unwrap();
        let err = sdk
            .provider_procedure("healthcheck", ProcedureDescription::new(), pong)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(!sdk.server().should_run());
    }
}
