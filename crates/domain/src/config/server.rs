use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Callback server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackServerConfig {
    /// Host the engine uses to reach this provider. Baked into every
    /// callback URL sent at registration time.
    #[serde(default = "d_host")]
    pub public_host: String,
    #[serde(default = "d_9000")]
    pub public_port: u16,
    /// Local interface to bind. Defaults to `public_host`; set to
    /// `0.0.0.0` when the public name is not a local address (containers).
    #[serde(default)]
    pub bind_host: Option<String>,
}

impl CallbackServerConfig {
    pub fn bind_addr(&self) -> String {
        let host = self.bind_host.as_deref().unwrap_or(&self.public_host);
        format!("{host}:{}", self.public_port)
    }
}

impl Default for CallbackServerConfig {
    fn default() -> Self {
        Self {
            public_host: d_host(),
            public_port: 9000,
            bind_host: None,
        }
    }
}

fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_9000() -> u16 {
    9000
}
