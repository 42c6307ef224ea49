//! CRUD, filtering and procedure calls for one entity kind.
//!
//! All routes live under `{engine}/services/{prefix}/{version}/{kind}`.

use std::sync::Arc;

use papiea_domain::error::Result;
use papiea_domain::model::{
    Entity, EntityReference, EntitySpec, FilterResults, Metadata, Spec, UpdateResponse,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::pagination::FilterIter;
use crate::transport::{required, ApiInstance};
use crate::ClientOptions;

#[derive(Debug, Clone)]
pub struct EntityClient {
    api: Arc<ApiInstance>,
    kind: String,
    batch_size: u64,
}

impl EntityClient {
    pub fn new(opts: &ClientOptions, prefix: &str, version: &str, kind: &str) -> Result<Self> {
        let api = opts.api(&format!("/services/{prefix}/{version}/{kind}"))?;
        Ok(Self {
            api: Arc::new(api),
            kind: kind.to_owned(),
            batch_size: opts.batch_size,
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The underlying transport, e.g. to close or inspect the session.
    pub fn api(&self) -> &Arc<ApiInstance> {
        &self.api
    }

    pub async fn get(&self, entity: &EntityReference) -> Result<Entity> {
        required(self.api.get(&entity.uuid).await?, "get entity")
    }

    /// Whole collection in one call. Meant for small kinds and tests.
    pub async fn get_all(&self) -> Result<Vec<Entity>> {
        let page: Option<FilterResults<Entity>> = self.api.get("").await?;
        Ok(page.unwrap_or_default().results)
    }

    pub async fn create(&self, spec: Spec, extension: Option<Value>) -> Result<EntitySpec> {
        let mut payload = json!({ "spec": spec });
        if let Some(ext) = extension {
            payload["metadata"] = json!({ "extension": ext });
        }
        required(self.api.post("", &payload).await?, "create entity")
    }

    /// Create with caller-chosen metadata (uuid, extension, ...).
    pub async fn create_with_meta(&self, metadata: &Value, spec: Spec) -> Result<EntitySpec> {
        let payload = json!({ "metadata": metadata, "spec": spec });
        required(self.api.post("", &payload).await?, "create entity")
    }

    /// Replace the spec. `metadata.spec_version` must be the version the
    /// caller last read; the engine rejects stale ones as conflicting.
    pub async fn update(&self, metadata: &Metadata, spec: Spec) -> Result<UpdateResponse> {
        let payload = json!({
            "metadata": { "spec_version": metadata.spec_version },
            "spec": spec,
        });
        let resp: Option<UpdateResponse> = self.api.put(&metadata.uuid, &payload).await?;
        Ok(resp.unwrap_or_default())
    }

    pub async fn delete(&self, entity: &EntityReference) -> Result<()> {
        self.api
            .execute::<()>(Method::DELETE, &entity.uuid, None, None)
            .await?;
        Ok(())
    }

    /// One page of entities matching `criteria`.
    pub async fn filter(&self, criteria: &Value) -> Result<FilterResults<Entity>> {
        let page: Option<FilterResults<Entity>> = self.api.post("filter", criteria).await?;
        Ok(page.unwrap_or_default())
    }

    /// Lazy cursor over every entity matching `criteria`.
    pub fn filter_iter(&self, criteria: Value) -> FilterIter<Entity> {
        FilterIter::new(self.api.clone(), "filter", criteria, self.batch_size)
    }

    pub fn filter_iter_with(&self, criteria: Value, batch_size: u64) -> FilterIter<Entity> {
        FilterIter::new(self.api.clone(), "filter", criteria, batch_size)
    }

    pub fn list_iter(&self) -> FilterIter<Entity> {
        self.filter_iter(json!({}))
    }

    pub async fn invoke_procedure<I, O>(
        &self,
        name: &str,
        entity: &EntityReference,
        input: &I,
    ) -> Result<Option<O>>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let path = format!("{}/procedure/{name}", entity.uuid);
        let payload = json!({ "input": serde_json::to_value(input)? });
        self.api.post(&path, &payload).await
    }

    pub async fn invoke_kind_procedure<I, O>(&self, name: &str, input: &I) -> Result<Option<O>>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let payload = json!({ "input": serde_json::to_value(input)? });
        self.api.post(&format!("procedure/{name}"), &payload).await
    }
}
