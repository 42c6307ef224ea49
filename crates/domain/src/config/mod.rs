mod engine;
mod polling;
mod server;

pub use engine::*;
pub use polling::*;
pub use server::*;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a provider process needs to talk to the engine and to be
/// called back by it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SdkConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub server: CallbackServerConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Sent with the provider document; lets entities carry fields the
    /// kind schema does not declare.
    #[serde(default)]
    pub allow_extra_props: bool,
}

/// Environment variables understood by [`SdkConfig::apply_env`].
pub const ENV_ENGINE_URL: &str = "PAPIEA_URL";
pub const ENV_ADMIN_S2S_KEY: &str = "PAPIEA_ADMIN_S2S_KEY";
pub const ENV_PROVIDER_HOST: &str = "PROVIDER_HOST";
pub const ENV_PROVIDER_PORT: &str = "PROVIDER_PORT";

impl SdkConfig {
    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    /// Overlay values from an arbitrary variable source. Empty values and
    /// unparseable ports are ignored.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_ENGINE_URL) {
            self.engine.base_url = url;
        }
        if let Some(key) = get(ENV_ADMIN_S2S_KEY) {
            self.engine.s2s_key = Some(key);
        }
        if let Some(host) = get(ENV_PROVIDER_HOST) {
            self.server.public_host = host;
        }
        if let Some(port) = get(ENV_PROVIDER_PORT) {
            match port.parse() {
                Ok(p) => self.server.public_port = p,
                Err(_) => tracing::warn!(value = %port, "ignoring unparseable {ENV_PROVIDER_PORT}"),
            }
        }
    }
}
