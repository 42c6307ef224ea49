use std::time::Duration;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "d_engine_url")]
    pub base_url: String,
    /// Admin / provider S2S key used for registration and the provider API.
    #[serde(default)]
    pub s2s_key: Option<String>,
    #[serde(default = "d_60000")]
    pub timeout_ms: u64,
}

impl EngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: d_engine_url(),
            s2s_key: None,
            timeout_ms: 60_000,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_engine_url() -> String {
    "http://127.0.0.1:3333".into()
}
fn d_60000() -> u64 {
    60_000
}
