//! Handler traits and the error type handlers report to the engine.

use std::future::Future;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use papiea_domain::model::{DiffContent, Entity, IntentfulOutput};
use serde_json::{json, Value};

use crate::context::{IntentfulCtx, ProceduralCtx};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// InvocationError
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failure of a procedure or intent handler.
///
/// The callback server answers with `status_code` and the body
/// `{"errors": [...], "message": ..., "stacktrace": null}`; the engine
/// relays it to the caller as a procedure invocation error.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{message} (status {status_code})")]
pub struct InvocationError {
    pub status_code: u16,
    pub message: String,
    pub errors: Vec<Value>,
}

pub type HandlerResult<T> = Result<T, InvocationError>;

impl InvocationError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<Value>) -> Self {
        self.errors = errors;
        self
    }

    /// Unclassified failure: status 500, the error text as message and as
    /// the single entry of `errors`.
    pub fn from_error(err: impl std::fmt::Display) -> Self {
        let message = err.to_string();
        Self {
            status_code: 500,
            errors: vec![json!({ "message": message })],
            message,
        }
    }

    pub fn to_response(&self) -> Value {
        json!({
            "errors": self.errors,
            "message": self.message,
            "stacktrace": Value::Null,
        })
    }
}

impl From<papiea_domain::error::Error> for InvocationError {
    /// Engine errors keep the engine's status; local ones become 500.
    fn from(err: papiea_domain::error::Error) -> Self {
        let status_code = err.status_code().unwrap_or(500);
        let errors = match err.details() {
            Some(d) => vec![d.details.clone()],
            None => vec![json!({ "message": err.to_string() })],
        };
        Self {
            status_code,
            message: err.to_string(),
            errors,
        }
    }
}

impl From<serde_json::Error> for InvocationError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(400, format!("invalid input: {err}"))
    }
}

impl IntoResponse for InvocationError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response())).into_response()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Provider-level and kind-level procedures: `input` is the body's `input`.
///
/// Implemented for every `Fn(ProceduralCtx, Value) -> impl Future` closure.
#[async_trait]
pub trait ProcedureHandler: Send + Sync + 'static {
    async fn call(&self, ctx: ProceduralCtx, input: Value) -> HandlerResult<Value>;
}

/// Procedures bound to one entity, which the engine sends along.
#[async_trait]
pub trait EntityProcedureHandler: Send + Sync + 'static {
    async fn call(&self, ctx: ProceduralCtx, entity: Entity, input: Value) -> HandlerResult<Value>;
}

/// Reacts to the diffs the engine computed for one intentful signature.
///
/// Answer `Some(IntentfulOutput { delay_secs })` to ask the engine to
/// re-check the entity after a delay.
#[async_trait]
pub trait IntentHandler: Send + Sync + 'static {
    async fn call(
        &self,
        ctx: IntentfulCtx,
        entity: Entity,
        diffs: Vec<DiffContent>,
    ) -> HandlerResult<Option<IntentfulOutput>>;
}

#[async_trait]
impl<F, Fut> ProcedureHandler for F
where
    F: Fn(ProceduralCtx, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Value>> + Send + 'static,
{
    async fn call(&self, ctx: ProceduralCtx, input: Value) -> HandlerResult<Value> {
        (self)(ctx, input).await
    }
}

#[async_trait]
impl<F, Fut> EntityProcedureHandler for F
where
    F: Fn(ProceduralCtx, Entity, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Value>> + Send + 'static,
{
    async fn call(&self, ctx: ProceduralCtx, entity: Entity, input: Value) -> HandlerResult<Value> {
        (self)(ctx, entity, input).await
    }
}

#[async_trait]
impl<F, Fut> IntentHandler for F
where
    F: Fn(IntentfulCtx, Entity, Vec<DiffContent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<Option<IntentfulOutput>>> + Send + 'static,
{
    async fn call(
        &self,
        ctx: IntentfulCtx,
        entity: Entity,
        diffs: Vec<DiffContent>,
    ) -> HandlerResult<Option<IntentfulOutput>> {
        (self)(ctx, entity, diffs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papiea_domain::error::{Error, ErrorDetails, ResponseMeta};

    #[test]
    fn from_error_is_a_500_with_one_entry() {
        let err = InvocationError::from_error("boom");
        assert_eq!(err.status_code, 500);
        assert_eq!(err.message, "boom");
        assert_eq!(err.errors, vec![json!({ "message": "boom" })]);
    }

    #[test]
    fn response_body_shape() {
        let body = InvocationError::new(422, "bad x")
            .with_errors(vec![json!("x must be positive")])
            .to_response();
        assert_eq!(body["message"], "bad x");
        assert_eq!(body["errors"][0], "x must be positive");
        assert!(body["stacktrace"].is_null());
    }

    #[test]
    fn engine_errors_keep_their_status() {
        let err: InvocationError = Error::PermissionDenied(ErrorDetails {
            message: "nope".into(),
            response: ResponseMeta {
                status: 403,
                reason: "Forbidden".into(),
                url: "http://engine/x".into(),
            },
            details: json!({ "error": { "type": "permission_denied_error" } }),
        })
        .into();
        assert_eq!(err.status_code, 403);
        assert_eq!(err.errors[0]["error"]["type"], "permission_denied_error");

        let local: InvocationError = Error::Auth("No invoking user".into()).into();
        assert_eq!(local.status_code, 500);
    }

    #[test]
    fn out_of_range_status_maps_to_500() {
        let resp = InvocationError::new(42, "weird").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
