//! `papiea-client`: HTTP clients for the papiea engine.
//!
//! Every client sits on an [`ApiInstance`], a transport that renews its
//! session and retries once when the connection breaks. Engine answers are
//! decoded into the typed records of [`papiea_domain::model`]; engine
//! errors surface as the typed variants of [`papiea_domain::error::Error`].
//!
//! ```rust,no_run
//! use papiea_client::{ClientOptions, EntityClient};
//! use papiea_domain::model::EntityReference;
//!
//! # async fn example() -> papiea_domain::error::Result<()> {
//! let opts = ClientOptions::new("http://127.0.0.1:3333").key("s2s-secret");
//! let locations = EntityClient::new(&opts, "location_provider", "0.1.0", "Location")?;
//!
//! let created = locations.create(serde_json::json!({ "x": 10, "y": 11 }), None).await?;
//! let entity = locations.get(&created.metadata.entity_ref()).await?;
//! println!("spec_version = {}", entity.metadata.spec_version);
//! # Ok(())
//! # }
//! ```

pub mod entity;
pub mod intent_watcher;
pub mod pagination;
pub mod provider;
pub mod transport;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use entity::EntityClient;
pub use intent_watcher::IntentWatcherClient;
pub use pagination::FilterIter;
pub use provider::ProviderClient;
pub use transport::{from_reqwest, ApiInstance};

use std::time::Duration;

use papiea_domain::config::{EngineConfig, DEFAULT_BATCH_SIZE};
use papiea_domain::error::Result;
use tracing::Span;

/// Connection settings shared by every client of this crate.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub engine_url: String,
    pub s2s_key: Option<String>,
    pub timeout: Duration,
    pub batch_size: u64,
    pub span: Span,
}

impl ClientOptions {
    pub fn new(engine_url: impl Into<String>) -> Self {
        let defaults = EngineConfig::default();
        Self {
            engine_url: engine_url.into().trim_end_matches('/').to_owned(),
            s2s_key: None,
            timeout: defaults.timeout(),
            batch_size: DEFAULT_BATCH_SIZE,
            span: Span::current(),
        }
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            s2s_key: cfg.s2s_key.clone(),
            timeout: cfg.timeout(),
            ..Self::new(cfg.base_url.as_str())
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.s2s_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Transport bound to `{engine_url}{path}`, authenticated with the key.
    pub fn api(&self, path: &str) -> Result<ApiInstance> {
        let mut api = ApiInstance::new(&format!("{}{path}", self.engine_url), self.timeout)?
            .with_span(self.span.clone());
        if let Some(key) = &self.s2s_key {
            api = api.with_bearer(key)?;
        }
        Ok(api)
    }
}
