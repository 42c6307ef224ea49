use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use papiea_domain::config::SdkConfig;

/// Reference papiea provider serving a `Location` kind.
#[derive(Debug, Parser)]
#[command(name = "papiea-hello-provider", version, about)]
pub struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
    /// Host the engine uses to call this provider back.
    #[arg(long)]
    pub host: Option<String>,
    /// Callback server port.
    #[arg(long)]
    pub port: Option<u16>,
    /// Engine base URL, e.g. `http://127.0.0.1:3333`.
    #[arg(long)]
    pub engine_url: Option<String>,
}

impl Cli {
    /// File (or defaults), then environment, then command-line flags.
    pub fn load_config(&self) -> anyhow::Result<SdkConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            None => SdkConfig::default(),
        };
        config.apply_env();
        self.apply_flags(&mut config);
        Ok(config)
    }

    fn apply_flags(&self, config: &mut SdkConfig) {
        if let Some(host) = &self.host {
            config.server.public_host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.public_port = port;
        }
        if let Some(url) = &self.engine_url {
            config.engine.base_url = url.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "papiea-hello-provider",
            "--port",
            "9100",
            "--engine-url",
            "http://engine:3333",
        ]);
        let mut config = SdkConfig::default();
        cli.apply_flags(&mut config);
        assert_eq!(config.server.public_port, 9100);
        assert_eq!(config.server.public_host, "127.0.0.1");
        assert_eq!(config.engine.base_url, "http://engine:3333");
    }

    #[test]
    fn shipped_config_parses() {
        let raw = include_str!("../hello-provider.toml");
        let config: SdkConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.server.public_port, 9005);
        assert_eq!(config.pagination.batch_size, 20);
    }

    #[test]
    fn missing_file_is_an_error() {
        let cli = Cli::parse_from(["papiea-hello-provider", "--config", "/nonexistent/p.toml"]);
        let err = cli.load_config().unwrap_err();
        assert!(err.to_string().contains("/nonexistent/p.toml"));
    }
}
