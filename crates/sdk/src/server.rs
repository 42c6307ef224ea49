//! HTTP server the engine calls back into.
//!
//! Routes live in a table keyed by request path. A single catch-all POST
//! route looks the path up, so any intentful signature (dots, brackets,
//! `+`/`-` markers) can be a path segment. `GET /healthcheck` and
//! `GET /{kind}/healthcheck` answer liveness probes.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::FutureExt;
use papiea_domain::config::CallbackServerConfig;
use papiea_domain::error::{Error, Result};
use papiea_domain::model::{DiffContent, Entity, Metadata};
use papiea_domain::trace::TraceEvent;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, Span};

use crate::context::ContextSeed;
use crate::handler::{
    EntityProcedureHandler, HandlerResult, IntentHandler, InvocationError, ProcedureHandler,
};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Routes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub(crate) enum RouteHandler {
    /// Provider and kind procedures: `{input}`.
    Procedure(Arc<dyn ProcedureHandler>),
    /// `{metadata, spec, status, input}`.
    Entity(Arc<dyn EntityProcedureHandler>),
    /// `{metadata, spec, status, input: [diff, ..]}`.
    Intent(Arc<dyn IntentHandler>),
}

#[derive(Clone)]
pub(crate) struct Route {
    pub handler: RouteHandler,
    pub seed: ContextSeed,
}

impl Route {
    async fn invoke(&self, headers: HeaderMap, body: &[u8]) -> Response {
        let payload: Value = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => return InvocationError::new(400, format!("malformed JSON body: {e}")).into_response(),
        };
        let input = payload.get("input").cloned().unwrap_or(Value::Null);
        let ctx = self.seed.context(headers);

        let call = match &self.handler {
            RouteHandler::Procedure(h) => {
                let h = h.clone();
                async move { h.call(ctx, input).await }.boxed()
            }
            RouteHandler::Entity(h) => {
                let entity = match entity_from(&payload) {
                    Ok(e) => e,
                    Err(e) => return e.into_response(),
                };
                let h = h.clone();
                async move { h.call(ctx, entity, input).await }.boxed()
            }
            RouteHandler::Intent(h) => {
                let entity = match entity_from(&payload) {
                    Ok(e) => e,
                    Err(e) => return e.into_response(),
                };
                let diffs: Vec<DiffContent> = match input {
                    Value::Null => Vec::new(),
                    other => match serde_json::from_value(other) {
                        Ok(d) => d,
                        Err(e) => {
                            return InvocationError::new(400, format!("malformed diff list: {e}"))
                                .into_response()
                        }
                    },
                };
                let h = h.clone();
                async move {
                    let output = h.call(ctx, entity, diffs).await?;
                    serde_json::to_value(output).map_err(InvocationError::from_error)
                }
                .boxed()
            }
        };

        let outcome: std::result::Result<HandlerResult<Value>, _> =
            AssertUnwindSafe(call).catch_unwind().await;
        match outcome {
            Ok(Ok(value)) => Json(value).into_response(),
            Ok(Err(e)) => e.into_response(),
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(%reason, "callback handler panicked");
                InvocationError::from_error(format!("handler panicked: {reason}")).into_response()
            }
        }
    }
}

/// Entity-scoped bodies carry the entity; `spec`/`status` default to `{}`.
fn entity_from(payload: &Value) -> HandlerResult<Entity> {
    let metadata = payload
        .get("metadata")
        .filter(|m| !m.is_null())
        .ok_or_else(|| InvocationError::new(400, "request body has no metadata"))?;
    let metadata: Metadata = serde_json::from_value(metadata.clone())
        .map_err(|e| InvocationError::new(400, format!("malformed metadata: {e}")))?;
    let field = |name: &str| match payload.get(name) {
        Some(v) if !v.is_null() => v.clone(),
        _ => json!({}),
    };
    Ok(Entity {
        metadata,
        spec: field("spec"),
        status: field("status"),
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// CallbackServer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Cheap to clone; clones share the route table and lifecycle.
#[derive(Clone)]
pub struct CallbackServer {
    public_host: String,
    public_port: u16,
    bind_addr: String,
    routes: Arc<RwLock<HashMap<String, Route>>>,
    shutdown: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    local_addr: Arc<Mutex<Option<SocketAddr>>>,
    span: Span,
}

impl CallbackServer {
    pub fn new(cfg: &CallbackServerConfig) -> Self {
        Self {
            public_host: cfg.public_host.clone(),
            public_port: cfg.public_port,
            bind_addr: cfg.bind_addr(),
            routes: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            task: Arc::new(Mutex::new(None)),
            local_addr: Arc::new(Mutex::new(None)),
            span: Span::current(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Base URL of a kind's callbacks, or of the provider's when `kind` is
    /// `None`.
    pub fn callback_url(&self, kind: Option<&str>) -> String {
        format!(
            "http://{}:{}/{}",
            self.public_host,
            self.public_port,
            kind.unwrap_or_default()
        )
    }

    pub fn procedure_callback_url(&self, name: &str, kind: Option<&str>) -> String {
        format!("http://{}:{}{}", self.public_host, self.public_port, route_path(name, kind))
    }

    pub(crate) fn register(&self, path: String, route: Route) {
        tracing::debug!(parent: &self.span, %path, "callback route registered");
        self.routes.write().insert(path, route);
    }

    /// Whether anything was registered; an empty server is never started.
    pub fn should_run(&self) -> bool {
        !self.routes.read().is_empty()
    }

    pub fn route_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.routes.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthcheck", get(healthcheck))
            .route("/*route", get(kind_healthcheck).post(dispatch))
            .with_state(self.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind `bind_host:public_port` and serve. `Ok(None)` when there is
    /// nothing to serve.
    pub async fn start(&self) -> Result<Option<SocketAddr>> {
        if !self.should_run() {
            tracing::debug!(parent: &self.span, "no callback routes, server not started");
            return Ok(None);
        }
        let listener = TcpListener::bind(&self.bind_addr).await.map_err(|e| {
            Error::Config(format!("cannot bind callback server on {}: {e}", self.bind_addr))
        })?;
        self.serve(listener).await.map(Some)
    }

    /// Serve on an already bound listener until [`shutdown`](Self::shutdown).
    pub async fn serve(&self, listener: TcpListener) -> Result<SocketAddr> {
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Config(format!("callback listener has no address: {e}")))?;
        if self.is_running() {
            return Err(Error::Config("callback server already running".into()));
        }

        let app = self.router();
        let token = self.shutdown.clone();
        let task = tokio::spawn(
            async move {
                let served = axum::serve(listener, app)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "callback server stopped");
                }
            }
            .instrument(self.span.clone()),
        );

        *self.task.lock() = Some(task);
        *self.local_addr.lock() = Some(addr);
        tracing::info!(parent: &self.span, %addr, "callback server listening");
        Ok(addr)
    }

    /// Stop accepting callbacks and wait for in-flight ones to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Reserved for liveness probes at the root and under every kind.
pub(crate) const HEALTHCHECK: &str = "healthcheck";

/// `/{kind}/{name}` or `/{name}`.
pub(crate) fn route_path(name: &str, kind: Option<&str>) -> String {
    match kind {
        Some(kind) => format!("/{kind}/{name}"),
        None => format!("/{name}"),
    }
}

// ── axum handlers ────────────────────────────────────────────────────

async fn healthcheck() -> Json<Value> {
    Json(json!({ "status": "Available" }))
}

/// `GET /{kind}/healthcheck`, probed by the engine under each kind's
/// base callback.
async fn kind_healthcheck(Path(route): Path<String>) -> Response {
    match route.trim_start_matches('/').split_once('/') {
        Some((kind, HEALTHCHECK)) if !kind.is_empty() => healthcheck().await.into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(InvocationError::new(404, format!("nothing to GET at /{route}")).to_response()),
        )
            .into_response(),
    }
}

async fn dispatch(
    State(server): State<CallbackServer>,
    Path(route): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/{}", route.trim_start_matches('/'));
    let start = Instant::now();

    let entry = server.routes.read().get(&path).cloned();
    let response = match entry {
        Some(route) => route.invoke(headers, &body).await,
        None => (
            StatusCode::NOT_FOUND,
            Json(InvocationError::new(404, format!("no callback registered at {path}")).to_response()),
        )
            .into_response(),
    };

    TraceEvent::CallbackInvoked {
        route: path,
        status: response.status().as_u16(),
        duration_ms: start.elapsed().as_millis() as u64,
    }
    .emit();
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> CallbackServer {
        CallbackServer::new(&CallbackServerConfig {
            public_host: "provider.local".into(),
            public_port: 9005,
            bind_host: Some("0.0.0.0".into()),
        })
    }

    #[test]
    fn callback_urls() {
        let s = server();
        assert_eq!(s.callback_url(Some("Location")), "http://provider.local:9005/Location");
        assert_eq!(s.callback_url(None), "http://provider.local:9005/");
        assert_eq!(
            s.procedure_callback_url("moveX", Some("Location")),
            "http://provider.local:9005/Location/moveX"
        );
        assert_eq!(
            s.procedure_callback_url("ping", None),
            "http://provider.local:9005/ping"
        );
    }

    #[test]
    fn empty_server_does_not_run() {
        assert!(!server().should_run());
    }

    #[test]
    fn entity_defaults_spec_and_status() {
        let entity = entity_from(&json!({
            "metadata": {
                "uuid": "u-1",
                "kind": "Location",
                "provider_prefix": "p",
                "provider_version": "1",
                "spec_version": 2
            }
        }))
        .unwrap();
        assert_eq!(entity.spec, json!({}));
        assert_eq!(entity.status, json!({}));

        let err = entity_from(&json!({ "spec": {} })).unwrap_err();
        assert_eq!(err.status_code, 400);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("static reason");
        assert_eq!(panic_message(boxed.as_ref()), "static reason");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned reason"));
        assert_eq!(panic_message(boxed.as_ref()), "owned reason");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
