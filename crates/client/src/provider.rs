use std::sync::Arc;

use papiea_domain::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use crate::entity::EntityClient;
use crate::transport::ApiInstance;
use crate::ClientOptions;

/// Provider-level calls under `{engine}/services/{prefix}/{version}`.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    api: Arc<ApiInstance>,
    opts: ClientOptions,
    prefix: String,
    version: String,
}

impl ProviderClient {
    pub fn new(opts: &ClientOptions, prefix: &str, version: &str) -> Result<Self> {
        let api = opts.api(&format!("/services/{prefix}/{version}"))?;
        Ok(Self {
            api: Arc::new(api),
            opts: opts.clone(),
            prefix: prefix.to_owned(),
            version: version.to_owned(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn api(&self) -> &Arc<ApiInstance> {
        &self.api
    }

    /// Entity client for one of this provider's kinds, same credentials.
    pub fn kind(&self, kind: &str) -> Result<EntityClient> {
        EntityClient::new(&self.opts, &self.prefix, &self.version, kind)
    }

    pub async fn invoke_procedure<I, O>(&self, name: &str, input: &I) -> Result<Option<O>>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let payload = json!({ "input": serde_json::to_value(input)? });
        self.api.post(&format!("procedure/{name}"), &payload).await
    }
}
