//! Procedures and intent handlers of one kind.

use std::sync::Arc;

use papiea_domain::error::Result;
use papiea_domain::model::{ExecutionStrategy, IntentfulSignature, Kind, ProcedureDescription};

use crate::handler::{EntityProcedureHandler, IntentHandler, ProcedureHandler};
use crate::sdk::ProviderSdk;
use crate::server::{route_path, RouteHandler};

/// Borrowed view of a kind inside its [`ProviderSdk`]. Every call records
/// a signature on the kind and mounts the matching callback route.
pub struct KindBuilder<'a> {
    sdk: &'a mut ProviderSdk,
    index: usize,
}

impl<'a> KindBuilder<'a> {
    pub(crate) fn new(sdk: &'a mut ProviderSdk, index: usize) -> Self {
        Self { sdk, index }
    }

    pub fn kind(&self) -> &Kind {
        self.sdk.kind_at(self.index)
    }

    fn name(&self) -> String {
        self.kind().name.clone()
    }

    /// Procedure invoked on one entity, served at `/{kind}/{name}`.
    pub fn entity_procedure(
        &mut self,
        name: &str,
        description: ProcedureDescription,
        handler: impl EntityProcedureHandler,
    ) -> Result<&mut Self> {
        self.sdk.ensure_configurable()?;
        let kind = self.name();
        let signature = self.sdk.signature(name, Some(&kind), description)?;
        self.sdk.mount(
            route_path(name, Some(&kind)),
            RouteHandler::Entity(Arc::new(handler)),
        )?;
        self.sdk
            .kind_mut(self.index)
            .entity_procedures
            .insert(name.to_owned(), signature);
        Ok(self)
    }

    /// Procedure invoked on the kind as a whole, served at `/{kind}/{name}`.
    pub fn kind_procedure(
        &mut self,
        name: &str,
        description: ProcedureDescription,
        handler: impl ProcedureHandler,
    ) -> Result<&mut Self> {
        self.sdk.ensure_configurable()?;
        let kind = self.name();
        let signature = self.sdk.signature(name, Some(&kind), description)?;
        self.sdk.mount(
            route_path(name, Some(&kind)),
            RouteHandler::Procedure(Arc::new(handler)),
        )?;
        self.sdk
            .kind_mut(self.index)
            .kind_procedures
            .insert(name.to_owned(), signature);
        Ok(self)
    }

    /// Handle the diffs the engine finds for the field selector
    /// `signature`. Registering the same selector again replaces it.
    pub fn on(&mut self, signature: &str, handler: impl IntentHandler) -> Result<&mut Self> {
        self.sdk.ensure_configurable()?;
        let kind = self.name();
        let intentful = IntentfulSignature {
            signature: signature.to_owned(),
            name: signature.to_owned(),
            argument: IntentfulSignature::input_schema(),
            result: IntentfulSignature::output_schema(),
            execution_strategy: ExecutionStrategy::Basic,
            procedure_callback: self.sdk.server().procedure_callback_url(signature, Some(&kind)),
            base_callback: self.sdk.server().callback_url(Some(&kind)),
        };
        self.sdk.mount(
            route_path(signature, Some(&kind)),
            RouteHandler::Intent(Arc::new(handler)),
        )?;

        let signatures = &mut self.sdk.kind_mut(self.index).intentful_signatures;
        signatures.retain(|s| s.signature != signature);
        signatures.push(intentful);
        Ok(self)
    }

    /// Kind procedure `__{kind}_create`, run by the engine on creation.
    pub fn on_create(&mut self, handler: impl ProcedureHandler) -> Result<&mut Self> {
        let name = format!("__{}_create", self.name());
        self.kind_procedure(&name, ProcedureDescription::new(), handler)
    }

    /// Kind procedure `__{kind}_delete`, run by the engine on deletion.
    pub fn on_delete(&mut self, handler: impl ProcedureHandler) -> Result<&mut Self> {
        let name = format!("__{}_delete", self.name());
        self.kind_procedure(&name, ProcedureDescription::new(), handler)
    }
}
