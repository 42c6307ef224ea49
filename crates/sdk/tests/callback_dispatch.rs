//! Callback routing and error mapping, driven through the axum router
//! without a socket.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use papiea_domain::model::{DiffContent, Entity, IntentfulOutput, ProcedureDescription};
use papiea_sdk::{HandlerResult, IntentfulCtx, InvocationError, ProceduralCtx, ProviderSdk};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn echo(_ctx: ProceduralCtx, input: Value) -> HandlerResult<Value> {
    Ok(json!({ "echo": input }))
}

async fn whoami(ctx: ProceduralCtx, _input: Value) -> HandlerResult<Value> {
    Ok(json!({
        "token": ctx.invoking_token()?,
        "prefix": ctx.provider_prefix(),
        "version": ctx.provider_version(),
    }))
}

async fn reject(_ctx: ProceduralCtx, _input: Value) -> HandlerResult<Value> {
    Err(InvocationError::new(422, "x must be positive").with_errors(vec![json!("x < 0")]))
}

async fn explode(_ctx: ProceduralCtx, _input: Value) -> HandlerResult<Value> {
    panic!("handler blew up")
}

async fn describe(_ctx: ProceduralCtx, entity: Entity, input: Value) -> HandlerResult<Value> {
    Ok(json!({
        "uuid": entity.metadata.uuid,
        "spec": entity.spec,
        "status": entity.status,
        "input": input,
    }))
}

async fn converge(
    _ctx: IntentfulCtx,
    _entity: Entity,
    diffs: Vec<DiffContent>,
) -> HandlerResult<Option<IntentfulOutput>> {
    if diffs.iter().any(|d| d.key == "x") {
        Ok(Some(IntentfulOutput::retry_after(diffs.len() as u64 * 10)))
    } else {
        Ok(None)
    }
}

fn app() -> Router {
    let mut sdk = ProviderSdk::builder()
        .engine_url("http://127.0.0.1:1")
        .public_port(9005)
        .build()
        .unwrap();
    sdk.prefix("location_provider").unwrap().version("0.1.0").unwrap();
    sdk.provider_procedure("echo", ProcedureDescription::new(), echo)
        .unwrap()
        .provider_procedure("whoami", ProcedureDescription::new(), whoami)
        .unwrap();
    sdk.new_kind(&json!({ "Location": { "type": "object", "x-papiea-entity": "differ" } }))
        .unwrap()
        .kind_procedure("reject", ProcedureDescription::new(), reject)
        .unwrap()
        .kind_procedure("explode", ProcedureDescription::new(), explode)
        .unwrap()
        .entity_procedure("describe", ProcedureDescription::new(), describe)
        .unwrap()
        .on("x", converge)
        .unwrap();
    sdk.server().router()
}

async fn post(app: Router, path: &str, body: &str, bearer: Option<&str>) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(token) = bearer {
        req = req.header("authorization", format!("Bearer {token}"));
    }
    let resp = app
        .oneshot(req.body(Body::from(body.to_owned())).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn entity_body(input: Value) -> String {
    json!({
        "metadata": {
            "uuid": "u-1",
            "kind": "Location",
            "provider_prefix": "location_provider",
            "provider_version": "0.1.0",
            "spec_version": 3
        },
        "spec": { "x": 10 },
        "input": input
    })
    .to_string()
}

#[tokio::test]
async fn healthcheck_reports_available() {
    let resp = app()
        .oneshot(Request::get("/healthcheck").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "status": "Available" }));
}

#[tokio::test]
async fn kind_healthcheck_reports_available() {
    let resp = app()
        .oneshot(Request::get("/Location/healthcheck").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "status": "Available" }));

    let resp = app()
        .oneshot(Request::get("/Location/x").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn provider_procedure_gets_the_input() {
    let (status, body) = post(app(), "/echo", r#"{"input": {"n": 5}}"#, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "echo": { "n": 5 } }));
}

#[tokio::test]
async fn context_carries_identity_and_caller_token() {
    let (status, body) = post(app(), "/whoami", r#"{"input": null}"#, Some("user-key")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token"], "user-key");
    assert_eq!(body["prefix"], "location_provider");
    assert_eq!(body["version"], "0.1.0");
}

#[tokio::test]
async fn missing_caller_token_is_a_500() {
    let (status, body) = post(app(), "/whoami", r#"{"input": null}"#, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().contains("No invoking user"));
}

#[tokio::test]
async fn handler_error_keeps_its_status_and_body() {
    let (status, body) = post(app(), "/Location/reject", r#"{"input": 1}"#, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "x must be positive");
    assert_eq!(body["errors"], json!(["x < 0"]));
    assert!(body.get("stacktrace").is_some());
}

#[tokio::test]
async fn panicking_handler_is_a_500_and_server_keeps_serving() {
    let app = app();
    let (status, body) = post(app.clone(), "/Location/explode", r#"{"input": 1}"#, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["message"].as_str().unwrap().contains("handler blew up"));

    let (status, _) = post(app, "/echo", r#"{"input": 1}"#, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn entity_procedure_receives_the_entity() {
    let (status, body) = post(app(), "/Location/describe", &entity_body(json!(7)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uuid"], "u-1");
    assert_eq!(body["spec"], json!({ "x": 10 }));
    assert_eq!(body["status"], json!({}));
    assert_eq!(body["input"], 7);
}

#[tokio::test]
async fn entity_procedure_without_metadata_is_a_400() {
    let (status, body) = post(app(), "/Location/describe", r#"{"input": 7}"#, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("metadata"));
}

#[tokio::test]
async fn malformed_json_is_a_400() {
    let (status, _) = post(app(), "/echo", "{not json", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_is_a_404() {
    let (status, body) = post(app(), "/Location/nope", r#"{"input": 1}"#, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["message"].as_str().unwrap().contains("/Location/nope"));
}

#[tokio::test]
async fn intent_handler_gets_diffs_and_may_ask_for_a_delay() {
    let diffs = json!([
        { "keys": {}, "key": "x", "path": ["x"], "spec-val": [10], "status-val": [3] }
    ]);
    let (status, body) = post(app(), "/Location/x", &entity_body(diffs), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "delay_secs": 10 }));

    let (status, body) = post(app(), "/Location/x", &entity_body(json!([])), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}

#[tokio::test]
async fn intent_handler_rejects_a_malformed_diff_list() {
    let (status, _) = post(app(), "/Location/x", &entity_body(json!({ "x": 1 })), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
