//! In-memory engine speaking the papiea REST surface used by the SDK.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use papiea_domain::error::ErrorKind;
use papiea_domain::model::{
    Action, Entity, IntentWatcher, IntentfulStatus, Metadata, ProviderEntityReference, S2SKey,
    UserInfo,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Key the mock treats as the engine administrator.
pub const ADMIN_KEY: &str = "mock-admin-key";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub authorization: Option<String>,
}

struct ScriptedWatcher {
    watcher: IntentWatcher,
    started: Instant,
    steps: Vec<(Duration, IntentfulStatus)>,
}

impl ScriptedWatcher {
    fn snapshot(&self) -> IntentWatcher {
        let elapsed = self.started.elapsed();
        let mut w = self.watcher.clone();
        for (at, status) in &self.steps {
            if elapsed >= *at {
                w.status = *status;
            }
        }
        w
    }
}

struct EngineState {
    providers: Mutex<HashMap<(String, String), Value>>,
    entities: Mutex<Vec<Entity>>,
    watchers: Mutex<Vec<ScriptedWatcher>>,
    keys: Mutex<Vec<S2SKey>>,
    denied: Mutex<Vec<Action>>,
    requests: Mutex<Vec<RecordedRequest>>,
    filter_calls: AtomicU64,
    http: reqwest::Client,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MockEngine handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A running mock engine bound on `127.0.0.1:<ephemeral>`. Stops on drop.
pub struct MockEngine {
    addr: SocketAddr,
    state: Arc<EngineState>,
    shutdown: CancellationToken,
}

impl MockEngine {
    pub async fn start() -> std::io::Result<MockEngine> {
        let state = Arc::new(EngineState {
            providers: Mutex::new(HashMap::new()),
            entities: Mutex::new(Vec::new()),
            watchers: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
            denied: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            filter_calls: AtomicU64::new(0),
            http: reqwest::Client::new(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();

        let app = router(state.clone());
        let token = shutdown.clone();
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::warn!(error = %e, "mock engine stopped");
            }
        });

        Ok(MockEngine {
            addr,
            state,
            shutdown,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of entity filter pages served so far.
    pub fn filter_calls(&self) -> u64 {
        self.state.filter_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    /// Registered provider document, as received.
    pub fn provider(&self, prefix: &str, version: &str) -> Option<Value> {
        self.state
            .providers
            .lock()
            .get(&(prefix.to_owned(), version.to_owned()))
            .cloned()
    }

    pub fn entity(&self, uuid: &str) -> Option<Entity> {
        self.state
            .entities
            .lock()
            .iter()
            .find(|e| e.metadata.uuid == uuid)
            .cloned()
    }

    pub fn keys(&self) -> Vec<S2SKey> {
        self.state.keys.lock().clone()
    }

    /// Make `check_permission` refuse every request that includes `action`.
    pub fn deny(&self, action: Action) {
        self.state.denied.lock().push(action);
    }

    /// Create a watcher that starts `Pending` and takes each scripted status
    /// once its delay (measured from now) has elapsed.
    pub fn script_watcher(
        &self,
        entity_ref: ProviderEntityReference,
        steps: Vec<(Duration, IntentfulStatus)>,
    ) -> String {
        let uuid = uuid::Uuid::new_v4().to_string();
        let watcher = IntentWatcher {
            uuid: uuid.clone(),
            entity_ref,
            spec_version: 1,
            diffs: Vec::new(),
            status: IntentfulStatus::Pending,
            user: None,
            last_status_changed: None,
            created_at: Some(Utc::now()),
        };
        self.state.watchers.lock().push(ScriptedWatcher {
            watcher,
            started: Instant::now(),
            steps,
        });
        uuid
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Routes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type Shared = Arc<EngineState>;

fn router(state: Shared) -> Router {
    Router::new()
        // provider API
        .route("/provider", post(register_provider))
        .route("/provider/update_status", patch(update_status))
        .route("/provider/:prefix/:version", get(get_provider))
        .route("/provider/:prefix/:version/auth/user_info", get(user_info))
        .route(
            "/provider/:prefix/:version/s2skey",
            get(list_keys).post(create_key).put(deactivate_key),
        )
        // intent watchers
        .route("/services/intent_watcher", get(list_watchers))
        .route("/services/intent_watcher/filter", post(filter_watchers))
        .route("/services/intent_watcher/:id", get(get_watcher))
        // entity API
        .route(
            "/services/:prefix/:version/check_permission",
            post(check_permission),
        )
        .route(
            "/services/:prefix/:version/procedure/:name",
            post(provider_procedure),
        )
        .route(
            "/services/:prefix/:version/:kind",
            get(list_entities).post(create_entity),
        )
        .route("/services/:prefix/:version/:kind/filter", post(filter_entities))
        .route(
            "/services/:prefix/:version/:kind/procedure/:name",
            post(kind_procedure),
        )
        .route(
            "/services/:prefix/:version/:kind/:uuid",
            get(get_entity).put(update_entity).delete(delete_entity),
        )
        .route(
            "/services/:prefix/:version/:kind/:uuid/procedure/:name",
            post(entity_procedure),
        )
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

async fn record(State(state): State<Shared>, req: Request, next: Next) -> Response {
    let recorded = RecordedRequest {
        method: req.method().to_string(),
        path: req.uri().path().to_owned(),
        authorization: req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
    };
    state.requests.lock().push(recorded);
    next.run(req).await
}

fn engine_error(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": { "type": kind.tag(), "message": message.into(), "errors": [] }
        })),
    )
        .into_response()
}

fn not_found(what: &str) -> Response {
    engine_error(
        StatusCode::NOT_FOUND,
        ErrorKind::EntityNotFound,
        format!("{what} not found"),
    )
}

fn ok() -> Response {
    Json(json!("OK")).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

/// Every key of `criteria` must be present in `doc` with a matching value;
/// nested objects are compared the same way.
fn matches(doc: &Value, criteria: &Value) -> bool {
    match (doc, criteria) {
        (Value::Object(d), Value::Object(c)) => c
            .iter()
            .all(|(k, v)| d.get(k).map(|dv| matches(dv, v)).unwrap_or(false)),
        (d, c) => d == c,
    }
}

#[derive(Debug, Default, Deserialize)]
struct Page {
    offset: Option<usize>,
    limit: Option<usize>,
}

impl Page {
    fn slice<T: serde::Serialize>(&self, items: Vec<T>) -> Value {
        let total = items.len();
        let page: Vec<T> = items
            .into_iter()
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();
        json!({ "results": page, "entity_count": total })
    }
}

// ── provider ─────────────────────────────────────────────────────────

async fn register_provider(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let prefix = body.get("prefix").and_then(Value::as_str);
    let version = body.get("version").and_then(Value::as_str);
    let (Some(prefix), Some(version)) = (prefix, version) else {
        return engine_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "provider must have prefix and version",
        );
    };
    state
        .providers
        .lock()
        .insert((prefix.to_owned(), version.to_owned()), body.clone());
    StatusCode::OK.into_response()
}

async fn get_provider(
    State(state): State<Shared>,
    Path((prefix, version)): Path<(String, String)>,
) -> Response {
    match state.providers.lock().get(&(prefix, version)) {
        Some(p) => Json(p.clone()).into_response(),
        None => not_found("provider"),
    }
}

// ── security ─────────────────────────────────────────────────────────

/// `(owner, user_info)` of the caller, if the bearer key is known.
fn caller(state: &EngineState, headers: &HeaderMap, prefix: &str) -> Option<(String, UserInfo)> {
    let token = bearer(headers)?;
    if token == ADMIN_KEY {
        let mut info = UserInfo::new();
        info.insert("owner".into(), json!("admin"));
        info.insert("is_admin".into(), json!(true));
        info.insert("provider_prefix".into(), json!(prefix));
        return Some(("admin".into(), info));
    }
    state
        .keys
        .lock()
        .iter()
        .find(|k| k.key == token && k.deleted_at.is_none())
        .map(|k| (k.owner.clone(), k.user_info.clone()))
}

fn unauthorized() -> Response {
    engine_error(
        StatusCode::UNAUTHORIZED,
        ErrorKind::Unauthorized,
        "Unauthorized",
    )
}

async fn user_info(
    State(state): State<Shared>,
    Path((prefix, _version)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    match caller(&state, &headers, &prefix) {
        Some((_, info)) => Json(info).into_response(),
        None => unauthorized(),
    }
}

async fn list_keys(
    State(state): State<Shared>,
    Path((prefix, _version)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let Some((owner, _)) = caller(&state, &headers, &prefix) else {
        return unauthorized();
    };
    let keys: Vec<S2SKey> = state
        .keys
        .lock()
        .iter()
        .filter(|k| k.provider_prefix == prefix && k.deleted_at.is_none())
        .filter(|k| owner == "admin" || k.owner == owner)
        .cloned()
        .collect();
    Json(keys).into_response()
}

async fn create_key(
    State(state): State<Shared>,
    Path((prefix, _version)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some((caller_owner, _)) = caller(&state, &headers, &prefix) else {
        return unauthorized();
    };
    let prefix_in_info = body
        .get("user_info")
        .and_then(|u| u.get("provider_prefix"))
        .is_some();
    if body.get("provider_prefix").is_some() || prefix_in_info {
        return engine_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::BadRequest,
            "provider_prefix may not be specified in the request body",
        );
    }

    let owner = body
        .get("owner")
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or(caller_owner);
    let mut user_info: UserInfo = body
        .get("user_info")
        .and_then(|u| u.as_object().cloned())
        .unwrap_or_default();
    user_info.insert("owner".into(), json!(owner));
    user_info.insert("provider_prefix".into(), json!(prefix));

    let key = S2SKey {
        owner,
        provider_prefix: prefix,
        key: body
            .get("key")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()),
        uuid: uuid::Uuid::new_v4().to_string(),
        created_at: Some(Utc::now()),
        deleted_at: None,
        user_info,
        name: body.get("name").and_then(Value::as_str).map(str::to_owned),
    };
    state.keys.lock().push(key.clone());
    Json(key).into_response()
}

async fn deactivate_key(
    State(state): State<Shared>,
    Path((prefix, _version)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if caller(&state, &headers, &prefix).is_none() {
        return unauthorized();
    }
    if body.get("active").and_then(Value::as_bool).unwrap_or(false) {
        return ok();
    }
    let uuid = body.get("uuid").and_then(Value::as_str).unwrap_or_default();
    let mut keys = state.keys.lock();
    match keys.iter_mut().find(|k| k.uuid == uuid) {
        Some(k) => {
            k.deleted_at = Some(Utc::now());
            ok()
        }
        None => not_found("s2s key"),
    }
}

async fn check_permission(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if bearer(&headers).is_none() {
        return unauthorized();
    }
    let denied = state.denied.lock().clone();
    let requested: Vec<Action> = body
        .as_array()
        .map(|pairs| {
            pairs
                .iter()
                .filter_map(|pair| pair.get(0).cloned())
                .filter_map(|a| serde_json::from_value(a).ok())
                .collect()
        })
        .unwrap_or_default();
    if requested.iter().any(|a| denied.contains(a)) {
        return engine_error(
            StatusCode::FORBIDDEN,
            ErrorKind::PermissionDenied,
            "Permission denied",
        );
    }
    Json(json!({ "success": "Ok" })).into_response()
}

async fn update_status(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let uuid = body
        .get("entity_ref")
        .and_then(|r| r.get("uuid"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    let patch = body.get("status").cloned().unwrap_or(Value::Null);

    let mut entities = state.entities.lock();
    let Some(entity) = entities.iter_mut().find(|e| e.metadata.uuid == uuid) else {
        return not_found("entity");
    };
    match (&mut entity.status, patch) {
        (Value::Object(current), Value::Object(fields)) => current.extend(fields),
        (current, other) => *current = other,
    }
    ok()
}

// ── intent watchers ──────────────────────────────────────────────────

fn watcher_snapshots(state: &EngineState) -> Vec<IntentWatcher> {
    state.watchers.lock().iter().map(ScriptedWatcher::snapshot).collect()
}

async fn get_watcher(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    match watcher_snapshots(&state).into_iter().find(|w| w.uuid == id) {
        Some(w) => Json(w).into_response(),
        None => not_found("intent watcher"),
    }
}

async fn list_watchers(State(state): State<Shared>, Query(page): Query<Page>) -> Response {
    Json(page.slice(watcher_snapshots(&state))).into_response()
}

async fn filter_watchers(
    State(state): State<Shared>,
    Query(page): Query<Page>,
    Json(criteria): Json<Value>,
) -> Response {
    let found: Vec<IntentWatcher> = watcher_snapshots(&state)
        .into_iter()
        .filter(|w| {
            serde_json::to_value(w)
                .map(|doc| matches(&doc, &criteria))
                .unwrap_or(false)
        })
        .collect();
    Json(page.slice(found)).into_response()
}

// ── entities ─────────────────────────────────────────────────────────

fn in_scope(e: &Entity, prefix: &str, version: &str, kind: &str) -> bool {
    e.metadata.provider_prefix == prefix
        && e.metadata.provider_version == version
        && e.metadata.kind == kind
        && e.metadata.deleted_at.is_none()
}

async fn list_entities(
    State(state): State<Shared>,
    Path((prefix, version, kind)): Path<(String, String, String)>,
    Query(page): Query<Page>,
) -> Response {
    let found: Vec<Entity> = state
        .entities
        .lock()
        .iter()
        .filter(|e| in_scope(e, &prefix, &version, &kind))
        .cloned()
        .collect();
    Json(page.slice(found)).into_response()
}

async fn create_entity(
    State(state): State<Shared>,
    Path((prefix, version, kind)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let Some(spec) = body.get("spec").cloned() else {
        return engine_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "spec is required",
        );
    };
    let requested = body.get("metadata");
    let uuid = requested
        .and_then(|m| m.get("uuid"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let mut entities = state.entities.lock();
    if entities.iter().any(|e| e.metadata.uuid == uuid) {
        return engine_error(
            StatusCode::CONFLICT,
            ErrorKind::ConflictingEntity,
            format!("Conflicting entity: {uuid}"),
        );
    }

    let metadata = Metadata {
        uuid,
        kind,
        provider_prefix: prefix,
        provider_version: version,
        spec_version: 1,
        created_at: Some(Utc::now()),
        deleted_at: None,
        extension: requested.and_then(|m| m.get("extension")).cloned(),
    };
    entities.push(Entity {
        metadata: metadata.clone(),
        spec: spec.clone(),
        status: spec.clone(),
    });
    Json(json!({ "metadata": metadata, "spec": spec })).into_response()
}

async fn get_entity(
    State(state): State<Shared>,
    Path((prefix, version, kind, uuid)): Path<(String, String, String, String)>,
) -> Response {
    let entities = state.entities.lock();
    match entities
        .iter()
        .find(|e| e.metadata.uuid == uuid && in_scope(e, &prefix, &version, &kind))
    {
        Some(e) => Json(e.clone()).into_response(),
        None => not_found("entity"),
    }
}

async fn update_entity(
    State(state): State<Shared>,
    Path((prefix, version, kind, uuid)): Path<(String, String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    let sent_version = body
        .get("metadata")
        .and_then(|m| m.get("spec_version"))
        .and_then(Value::as_u64);
    let Some(spec) = body.get("spec").cloned() else {
        return engine_error(
            StatusCode::BAD_REQUEST,
            ErrorKind::Validation,
            "spec is required",
        );
    };

    let mut entities = state.entities.lock();
    let Some(entity) = entities
        .iter_mut()
        .find(|e| e.metadata.uuid == uuid && in_scope(e, &prefix, &version, &kind))
    else {
        return not_found("entity");
    };
    if sent_version != Some(entity.metadata.spec_version) {
        return engine_error(
            StatusCode::CONFLICT,
            ErrorKind::ConflictingEntity,
            format!(
                "Spec version mismatch: expected {}, got {:?}",
                entity.metadata.spec_version, sent_version
            ),
        );
    }
    entity.metadata.spec_version += 1;
    entity.spec = spec;
    Json(json!({ "watcher": null })).into_response()
}

async fn delete_entity(
    State(state): State<Shared>,
    Path((prefix, version, kind, uuid)): Path<(String, String, String, String)>,
) -> Response {
    let mut entities = state.entities.lock();
    let before = entities.len();
    entities.retain(|e| !(e.metadata.uuid == uuid && in_scope(e, &prefix, &version, &kind)));
    if entities.len() == before {
        return not_found("entity");
    }
    ok()
}

async fn filter_entities(
    State(state): State<Shared>,
    Path((prefix, version, kind)): Path<(String, String, String)>,
    Query(page): Query<Page>,
    Json(criteria): Json<Value>,
) -> Response {
    state.filter_calls.fetch_add(1, Ordering::SeqCst);
    let found: Vec<Entity> = state
        .entities
        .lock()
        .iter()
        .filter(|e| in_scope(e, &prefix, &version, &kind))
        .filter(|e| {
            serde_json::to_value(e)
                .map(|doc| matches(&doc, &criteria))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    Json(page.slice(found)).into_response()
}

// ── procedures ───────────────────────────────────────────────────────

/// Callback URL of a registered procedure. `section` is `procedures` on the
/// provider or `entity_procedures` / `kind_procedures` on a kind.
fn callback_for(
    state: &EngineState,
    prefix: &str,
    version: &str,
    kind: Option<&str>,
    section: &str,
    name: &str,
) -> Option<String> {
    let providers = state.providers.lock();
    let provider = providers.get(&(prefix.to_owned(), version.to_owned()))?;
    let owner = match kind {
        Some(kind) => provider
            .get("kinds")?
            .as_array()?
            .iter()
            .find(|k| k.get("name").and_then(Value::as_str) == Some(kind))?,
        None => provider,
    };
    owner
        .get(section)?
        .get(name)?
        .get("procedure_callback")?
        .as_str()
        .map(str::to_owned)
}

/// POST `payload` to a provider callback, relaying the caller's credentials.
async fn forward(state: &EngineState, url: &str, headers: &HeaderMap, payload: Value) -> Response {
    let mut rb = state.http.post(url).json(&payload);
    if let Some(auth) = headers.get(AUTHORIZATION) {
        rb = rb.header(AUTHORIZATION, auth.clone());
    }
    let resp = match rb.send().await {
        Ok(resp) => resp,
        Err(e) => {
            return engine_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::ProcedureInvocation,
                format!("provider callback unreachable: {e}"),
            )
        }
    };
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();

    if !(200..300).contains(&status) {
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("procedure failed")
            .to_owned();
        let errors = body.get("errors").cloned().unwrap_or_else(|| json!([]));
        let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (
            code,
            Json(json!({
                "error": {
                    "type": ErrorKind::ProcedureInvocation.tag(),
                    "message": message,
                    "errors": errors,
                }
            })),
        )
            .into_response();
    }
    (StatusCode::OK, [(CONTENT_TYPE, "application/json")], text).into_response()
}

fn unknown_procedure(name: &str) -> Response {
    engine_error(
        StatusCode::NOT_FOUND,
        ErrorKind::EntityNotFound,
        format!("procedure {name} not found"),
    )
}

async fn provider_procedure(
    State(state): State<Shared>,
    Path((prefix, version, name)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(url) = callback_for(&state, &prefix, &version, None, "procedures", &name) else {
        return unknown_procedure(&name);
    };
    let input = body.get("input").cloned().unwrap_or(Value::Null);
    forward(&state, &url, &headers, json!({ "input": input })).await
}

async fn kind_procedure(
    State(state): State<Shared>,
    Path((prefix, version, kind, name)): Path<(String, String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(url) = callback_for(&state, &prefix, &version, Some(&kind), "kind_procedures", &name)
    else {
        return unknown_procedure(&name);
    };
    let input = body.get("input").cloned().unwrap_or(Value::Null);
    forward(&state, &url, &headers, json!({ "input": input })).await
}

async fn entity_procedure(
    State(state): State<Shared>,
    Path((prefix, version, kind, uuid, name)): Path<(String, String, String, String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(url) = callback_for(
        &state,
        &prefix,
        &version,
        Some(&kind),
        "entity_procedures",
        &name,
    ) else {
        return unknown_procedure(&name);
    };
    let entity = state
        .entities
        .lock()
        .iter()
        .find(|e| e.metadata.uuid == uuid && in_scope(e, &prefix, &version, &kind))
        .cloned();
    let Some(entity) = entity else {
        return not_found("entity");
    };
    let payload = json!({
        "metadata": entity.metadata,
        "spec": entity.spec,
        "status": entity.status,
        "input": body.get("input").cloned().unwrap_or(Value::Null),
    });
    forward(&state, &url, &headers, payload).await
}
