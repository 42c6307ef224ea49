//! Per-request context handed to every handler.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use papiea_client::{ApiInstance, ClientOptions, EntityClient, IntentWatcherClient, ProviderClient};
use papiea_domain::error::{Error, Result};
use papiea_domain::model::{Action, Entity, EntityReference};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::Span;

use crate::security::SecurityApi;

/// Engine connection shared by the SDK and every context it hands out.
#[derive(Debug)]
pub(crate) struct Shared {
    pub engine_url: String,
    pub s2s_key: Option<String>,
    pub timeout: Duration,
    pub batch_size: u64,
    /// `{engine}/provider`, authenticated with the SDK's key.
    pub provider_api: Arc<ApiInstance>,
    pub span: Span,
}

impl Shared {
    pub fn client_options(&self, key: Option<&str>) -> ClientOptions {
        let mut opts = ClientOptions::new(self.engine_url.as_str())
            .timeout(self.timeout)
            .batch_size(self.batch_size)
            .span(self.span.clone());
        opts.s2s_key = key.map(str::to_owned);
        opts
    }

    pub fn security_api(&self, prefix: &str, version: &str, key: &str) -> SecurityApi {
        SecurityApi::new(self.provider_api.clone(), prefix, version, key)
    }
}

/// What a route captures at registration time; combined with the request
/// headers it becomes a [`ProceduralCtx`].
#[derive(Debug, Clone)]
pub(crate) struct ContextSeed {
    pub shared: Arc<Shared>,
    pub prefix: String,
    pub version: String,
}

impl ContextSeed {
    pub fn context(&self, headers: HeaderMap) -> ProceduralCtx {
        ProceduralCtx {
            shared: self.shared.clone(),
            prefix: self.prefix.clone(),
            version: self.version.clone(),
            headers,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProceduralCtx
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct ProceduralCtx {
    shared: Arc<Shared>,
    prefix: String,
    version: String,
    headers: HeaderMap,
}

/// Intent handlers get the same capabilities as procedures.
pub type IntentfulCtx = ProceduralCtx;

impl ProceduralCtx {
    pub fn provider_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn provider_version(&self) -> &str {
        &self.version
    }

    /// Headers of the engine request that triggered this invocation.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Engine URL of `entity`.
    pub fn url_for(&self, entity: &Entity) -> String {
        format!(
            "{}/services/{}/{}/{}/{}",
            self.shared.engine_url,
            self.prefix,
            self.version,
            entity.metadata.kind,
            entity.metadata.uuid
        )
    }

    /// Bearer token of the user on whose behalf the engine called.
    pub fn invoking_token(&self) -> Result<String> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth("No invoking user".into()))
    }

    /// Entity client for `entity_ref.kind`, acting as the invoking user.
    pub fn entity_client_for_user(&self, entity_ref: &EntityReference) -> Result<EntityClient> {
        let token = self.invoking_token()?;
        let opts = self.shared.client_options(Some(&token));
        EntityClient::new(&opts, &self.prefix, &self.version, &entity_ref.kind)
    }

    /// Provider client authenticated with `key`, else the invoking user's
    /// token, else the literal `anonymous`.
    pub fn provider_client(&self, key: Option<&str>) -> Result<ProviderClient> {
        let key = match key {
            Some(k) => k.to_owned(),
            None => self
                .invoking_token()
                .unwrap_or_else(|_| "anonymous".to_owned()),
        };
        let opts = self.shared.client_options(Some(&key));
        ProviderClient::new(&opts, &self.prefix, &self.version)
    }

    /// Ask the engine whether the invoking user (or `user_token`) may
    /// perform every `(action, entity)` pair on this provider.
    pub async fn check_permission(
        &self,
        actions: &[(Action, EntityReference)],
        user_token: Option<&str>,
    ) -> bool {
        let (prefix, version) = (self.prefix.clone(), self.version.clone());
        self.check_permission_in(&prefix, &version, actions, user_token)
            .await
    }

    /// Like [`check_permission`](Self::check_permission) against another
    /// provider. Any failure, engine refusal included, is `false`.
    pub async fn check_permission_in(
        &self,
        prefix: &str,
        version: &str,
        actions: &[(Action, EntityReference)],
        user_token: Option<&str>,
    ) -> bool {
        match self.ask_permission(prefix, version, actions, user_token).await {
            Ok(answer) => answer.get("success").and_then(Value::as_str) == Some("Ok"),
            Err(e) => {
                tracing::debug!(error = %e, prefix, version, "permission check failed");
                false
            }
        }
    }

    async fn ask_permission(
        &self,
        prefix: &str,
        version: &str,
        actions: &[(Action, EntityReference)],
        user_token: Option<&str>,
    ) -> Result<Value> {
        let mut api = ApiInstance::new(
            &format!("{}/services", self.shared.engine_url),
            self.shared.timeout,
        )?
        .with_span(self.shared.span.clone());

        match user_token {
            Some(token) => api = api.with_bearer(token)?,
            None => {
                if let Some(auth) = self.headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                    api = api.with_header(AUTHORIZATION.as_str(), auth)?;
                }
            }
        }

        let answer: Option<Value> = api
            .call(
                Method::POST,
                &format!("{prefix}/{version}/check_permission"),
                Some(actions),
                None,
            )
            .await?;
        Ok(answer.unwrap_or(Value::Null))
    }

    /// Report observed state for an entity of this provider.
    pub async fn update_status(&self, entity_ref: &EntityReference, status: &Value) -> Result<()> {
        let body = json!({ "entity_ref": entity_ref, "status": status });
        self.shared
            .provider_api
            .execute(Method::PATCH, "update_status", Some(&body), None)
            .await?;
        Ok(())
    }

    /// Security API acting with the SDK's own key.
    pub fn provider_security_api(&self) -> Result<SecurityApi> {
        let key = self
            .shared
            .s2s_key
            .as_deref()
            .ok_or_else(|| Error::Config("no provider s2s key configured".into()))?;
        Ok(self.user_security_api(key))
    }

    pub fn user_security_api(&self, key: &str) -> SecurityApi {
        self.shared.security_api(&self.prefix, &self.version, key)
    }

    /// Intent watcher client using the SDK's own key.
    pub fn intent_watcher(&self) -> Result<IntentWatcherClient> {
        IntentWatcherClient::new(&self.shared.client_options(self.shared.s2s_key.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn seed(engine_url: &str) -> ContextSeed {
        let provider_api = ApiInstance::new(&format!("{engine_url}/provider"), Duration::from_secs(2))
            .unwrap();
        ContextSeed {
            shared: Arc::new(Shared {
                engine_url: engine_url.to_owned(),
                s2s_key: None,
                timeout: Duration::from_secs(2),
                batch_size: 20,
                provider_api: Arc::new(provider_api),
                span: Span::none(),
            }),
            prefix: "location_provider".into(),
            version: "0.1.0".into(),
        }
    }

    #[test]
    fn invoking_token_requires_bearer() {
        let seed = seed("http://engine");
        let ctx = seed.context(HeaderMap::new());
        assert!(matches!(ctx.invoking_token(), Err(Error::Auth(_))));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(seed.context(headers).invoking_token().is_err());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer user-key"));
        assert_eq!(seed.context(headers).invoking_token().unwrap(), "user-key");
    }

    #[test]
    fn url_for_points_at_the_entity() {
        let ctx = seed("http://engine:3333").context(HeaderMap::new());
        let entity: Entity = serde_json::from_value(json!({
            "metadata": {
                "uuid": "u-1",
                "kind": "Location",
                "provider_prefix": "location_provider",
                "provider_version": "0.1.0",
                "spec_version": 1
            }
        }))
        .unwrap();
        assert_eq!(
            ctx.url_for(&entity),
            "http://engine:3333/services/location_provider/0.1.0/Location/u-1"
        );
    }

    #[test]
    fn security_api_needs_a_key() {
        let ctx = seed("http://engine").context(HeaderMap::new());
        assert!(matches!(ctx.provider_security_api(), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn unreachable_engine_denies_permission() {
        let port = papiea_testkit::free_port();
        let ctx = seed(&format!("http://127.0.0.1:{port}")).context(HeaderMap::new());
        let allowed = ctx
            .check_permission(
                &[(Action::Read, EntityReference::new("u-1", "Location"))],
                Some("user-key"),
            )
            .await;
        assert!(!allowed);
    }
}
