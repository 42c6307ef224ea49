//! Fluent construction of a [`ProviderSdk`].

use std::sync::Arc;
use std::time::Duration;

use papiea_client::ApiInstance;
use papiea_domain::config::SdkConfig;
use papiea_domain::error::Result;
use tracing::Span;

use crate::context::Shared;
use crate::sdk::ProviderSdk;
use crate::server::CallbackServer;

/// Builder for [`ProviderSdk`].
///
/// [`config`](Self::config) replaces every setting at once, so call it
/// before the individual setters.
///
/// ```rust,no_run
/// use papiea_sdk::ProviderSdk;
///
/// # fn example() -> papiea_domain::error::Result<()> {
/// let sdk = ProviderSdk::builder()
///     .engine_url("http://127.0.0.1:3333")
///     .s2s_key("admin-key")
///     .public_host("127.0.0.1")
///     .public_port(9005)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ProviderSdkBuilder {
    config: SdkConfig,
    span: Option<Span>,
}

impl ProviderSdkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: &SdkConfig) -> Self {
        self.config = config.clone();
        self
    }

    // ── Engine ───────────────────────────────────────────────────────

    pub fn engine_url(mut self, url: impl Into<String>) -> Self {
        self.config.engine.base_url = url.into();
        self
    }

    /// Key used for registration and every provider-level call.
    pub fn s2s_key(mut self, key: impl Into<String>) -> Self {
        self.config.engine.s2s_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.engine.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn batch_size(mut self, batch_size: u64) -> Self {
        self.config.pagination.batch_size = batch_size;
        self
    }

    // ── Callback server ──────────────────────────────────────────────

    pub fn public_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.public_host = host.into();
        self
    }

    pub fn public_port(mut self, port: u16) -> Self {
        self.config.server.public_port = port;
        self
    }

    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.bind_host = Some(host.into());
        self
    }

    // ── Provider document ────────────────────────────────────────────

    pub fn allow_extra_props(mut self, allow: bool) -> Self {
        self.config.allow_extra_props = allow;
        self
    }

    /// Span every engine call and callback is recorded under. Defaults to
    /// the span current at [`build`](Self::build) time.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<ProviderSdk> {
        let span = self.span.unwrap_or_else(Span::current);
        let engine_url = self.config.engine.base_url.trim_end_matches('/').to_owned();
        let timeout = self.config.engine.timeout();

        let mut provider_api = ApiInstance::new(&format!("{engine_url}/provider"), timeout)?
            .with_span(span.clone());
        if let Some(key) = &self.config.engine.s2s_key {
            provider_api = provider_api.with_bearer(key)?;
        }

        let shared = Arc::new(Shared {
            engine_url,
            s2s_key: self.config.engine.s2s_key.clone(),
            timeout,
            batch_size: self.config.pagination.batch_size,
            provider_api: Arc::new(provider_api),
            span: span.clone(),
        });
        let server = CallbackServer::new(&self.config.server).with_span(span);

        Ok(ProviderSdk::from_parts(
            shared,
            server,
            self.config.allow_extra_props,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_override_config() {
        let mut cfg = SdkConfig::default();
        cfg.server.public_port = 9100;
        let sdk = ProviderSdkBuilder::new()
            .config(&cfg)
            .public_host("provider.local")
            .engine_url("http://engine:3333/")
            .build()
            .unwrap();
        assert_eq!(
            sdk.server().callback_url(Some("Location")),
            "http://provider.local:9100/Location"
        );
        assert_eq!(sdk.engine_url(), "http://engine:3333");
    }

    #[test]
    fn invalid_key_is_rejected() {
        let err = ProviderSdkBuilder::new().s2s_key("bad\nkey").build().unwrap_err();
        assert!(matches!(err, papiea_domain::error::Error::Config(_)));
    }
}
