//! Resilient HTTP transport bound to one engine base URL.
//!
//! `ApiInstance` owns a single `reqwest::Client` (the "session"). When a
//! call fails below the HTTP layer (connection refused, reset, timed out,
//! or the session was closed) the session is replaced and the call is
//! retried exactly once. Answers the engine actually produced, including
//! every error-taxonomy response, are returned as-is and never retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use papiea_domain::error::{Error, ResponseMeta, Result};
use papiea_domain::trace::TraceEvent;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{Instrument, Span};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ApiInstance
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug)]
pub struct ApiInstance {
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    session: RwLock<Option<Client>>,
    renewals: AtomicU64,
    span: Span,
}

impl ApiInstance {
    /// Bind a transport to `base_url`. Every request carries
    /// `Content-Type: application/json`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            headers,
            timeout,
            session: RwLock::new(Some(open_session(timeout)?)),
            renewals: AtomicU64::new(0),
            span: Span::current(),
        })
    }

    /// Add `Authorization: Bearer <token>` to the default headers.
    pub fn with_bearer(self, token: &str) -> Result<Self> {
        self.with_header(AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Config(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Config(format!("invalid value for header '{name}': {e}")))?;
        self.headers.insert(header, value);
        Ok(self)
    }

    /// Span every call of this instance is recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// How many times the session was replaced since construction.
    pub fn session_renewals(&self) -> u64 {
        self.renewals.load(Ordering::Relaxed)
    }

    /// Full URL for a path relative to the base URL.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    // ── session lifecycle ────────────────────────────────────────────

    /// Drop the current session. The next call renews it.
    pub fn close(&self) {
        *self.session.write() = None;
    }

    /// Replace the current session with a fresh one.
    pub fn renew_session(&self) -> Result<()> {
        let fresh = open_session(self.timeout)?;
        *self.session.write() = Some(fresh);
        let renewals = self.renewals.fetch_add(1, Ordering::Relaxed) + 1;

        TraceEvent::SessionRenewed {
            base_url: self.base_url.clone(),
            renewals,
        }
        .emit();
        Ok(())
    }

    // ── calls ────────────────────────────────────────────────────────

    /// Issue a request and decode the JSON answer.
    ///
    /// `headers` are merged over the instance defaults; on conflict the
    /// request-specific value wins. An empty 2xx body yields `Ok(None)`.
    pub async fn call<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        headers: Option<&HeaderMap>,
    ) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.execute(method, path, body, headers).await?;
        decode(&text)
    }

    /// Like [`call`](Self::call) but hands back the raw response text.
    pub async fn execute<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        headers: Option<&HeaderMap>,
    ) -> Result<String>
    where
        B: Serialize + ?Sized,
    {
        let payload = body.map(serde_json::to_vec).transpose()?;
        let payload = payload.as_deref();

        async {
            match self.send(&method, path, payload, headers).await {
                Err(Error::Transport(reason)) => {
                    tracing::debug!(%reason, url = %self.url(path), "renewing engine session");
                    self.renew_session()?;
                    self.send(&method, path, payload, headers).await
                }
                other => other,
            }
        }
        .instrument(self.span.clone())
        .await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.call::<(), T>(Method::GET, path, None, None).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(Method::POST, path, Some(body), None).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(Method::PUT, path, Some(body), None).await
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.call(Method::PATCH, path, Some(body), None).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        self.call::<(), T>(Method::DELETE, path, None, None).await
    }

    /// One attempt, no retry.
    async fn send(
        &self,
        method: &Method,
        path: &str,
        payload: Option<&[u8]>,
        headers: Option<&HeaderMap>,
    ) -> Result<String> {
        let session = self
            .session
            .read()
            .clone()
            .ok_or_else(|| Error::Transport("session closed".into()))?;

        let url = self.url(path);
        let mut rb = session
            .request(method.clone(), &url)
            .headers(self.headers.clone());
        if let Some(extra) = headers {
            rb = rb.headers(extra.clone());
        }
        if let Some(bytes) = payload {
            rb = rb.body(bytes.to_vec());
        }

        let start = Instant::now();
        let result = rb.send().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                TraceEvent::EngineCall {
                    method: method.to_string(),
                    url,
                    status: 0,
                    duration_ms,
                }
                .emit();
                return Err(from_reqwest(e));
            }
        };

        let status = resp.status();
        TraceEvent::EngineCall {
            method: method.to_string(),
            url: url.clone(),
            status: status.as_u16(),
            duration_ms,
        }
        .emit();

        let reason = status.canonical_reason().unwrap_or_default().to_owned();
        let text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            let meta = ResponseMeta {
                status: status.as_u16(),
                reason,
                url,
            };
            return Err(Error::from_response(meta, &text));
        }
        Ok(text)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn open_session(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("cannot build HTTP session: {e}")))
}

/// Decode a 2xx body. Empty means "no value", not an empty object.
pub(crate) fn decode<T: DeserializeOwned>(text: &str) -> Result<Option<T>> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| Error::Decode(format!("{e}: {}", preview(text))))
}

/// Unwrap a decoded body that the engine must always send.
pub(crate) fn required<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| Error::Decode(format!("empty response to {what}")))
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Map a `reqwest` failure. Every failure below the HTTP layer is a
/// transport error, timeouts included.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transport(format!("timed out: {e}"))
    } else {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_relative_paths() {
        let api = ApiInstance::new("http://engine:3000/services/p/1/k/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(api.url(""), "http://engine:3000/services/p/1/k");
        assert_eq!(api.url("abc"), "http://engine:3000/services/p/1/k/abc");
        assert_eq!(
            api.url("/filter?limit=20&offset=0"),
            "http://engine:3000/services/p/1/k/filter?limit=20&offset=0"
        );
    }

    #[test]
    fn empty_body_decodes_to_none() {
        let v: Option<serde_json::Value> = decode("").unwrap();
        assert!(v.is_none());
        let v: Option<serde_json::Value> = decode("{}").unwrap();
        assert_eq!(v, Some(serde_json::json!({})));
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = decode::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn bearer_header_is_validated() {
        let api = ApiInstance::new("http://engine", Duration::from_secs(1)).unwrap();
        assert!(api.with_bearer("bad\nkey").is_err());
    }

    #[tokio::test]
    async fn closed_session_against_dead_engine_renews_once_then_fails() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let api = ApiInstance::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2))
            .unwrap();
        api.close();
        let err = api.get::<serde_json::Value>("x").await.unwrap_err();
        assert!(err.is_transport(), "{err}");
        assert_eq!(api.session_renewals(), 1);
    }
}
