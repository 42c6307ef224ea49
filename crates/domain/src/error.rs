use std::fmt;

use serde::{Deserialize, Serialize};

/// Status line and address of the engine response an error was built from.
///
/// Kept by value so callers can inspect it after the connection is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub status: u16,
    pub reason: String,
    pub url: String,
}

impl fmt::Display for ResponseMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.status, self.reason, self.url)
    }
}

/// Payload shared by every engine-reported error variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetails {
    pub message: String,
    pub response: ResponseMeta,
    /// The parsed error body, or the raw text when it was not JSON.
    pub details: serde_json::Value,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.message, self.response)
    }
}

/// Closed set of `error.type` tags the engine puts in its error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "conflicting_entity_error")]
    ConflictingEntity,
    #[serde(rename = "entity_not_found_error")]
    EntityNotFound,
    #[serde(rename = "permission_denied_error")]
    PermissionDenied,
    #[serde(rename = "procedure_invocation_error")]
    ProcedureInvocation,
    #[serde(rename = "unauthorized_error")]
    Unauthorized,
    #[serde(rename = "validation_error")]
    Validation,
    #[serde(rename = "bad_request_error")]
    BadRequest,
    #[serde(rename = "server_error")]
    ServerError,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::ConflictingEntity,
        ErrorKind::EntityNotFound,
        ErrorKind::PermissionDenied,
        ErrorKind::ProcedureInvocation,
        ErrorKind::Unauthorized,
        ErrorKind::Validation,
        ErrorKind::BadRequest,
        ErrorKind::ServerError,
    ];

    /// Wire tag, e.g. `"entity_not_found_error"`.
    pub fn tag(self) -> &'static str {
        match self {
            ErrorKind::ConflictingEntity => "conflicting_entity_error",
            ErrorKind::EntityNotFound => "entity_not_found_error",
            ErrorKind::PermissionDenied => "permission_denied_error",
            ErrorKind::ProcedureInvocation => "procedure_invocation_error",
            ErrorKind::Unauthorized => "unauthorized_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::BadRequest => "bad_request_error",
            ErrorKind::ServerError => "server_error",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.tag() == tag)
    }

    /// Wrap `details` in the matching [`Error`] variant.
    pub fn into_error(self, details: ErrorDetails) -> Error {
        match self {
            ErrorKind::ConflictingEntity => Error::ConflictingEntity(details),
            ErrorKind::EntityNotFound => Error::EntityNotFound(details),
            ErrorKind::PermissionDenied => Error::PermissionDenied(details),
            ErrorKind::ProcedureInvocation => Error::ProcedureInvocation(details),
            ErrorKind::Unauthorized => Error::Unauthorized(details),
            ErrorKind::Validation => Error::Validation(details),
            ErrorKind::BadRequest => Error::BadRequest(details),
            ErrorKind::ServerError => Error::ServerError(details),
        }
    }
}

/// Shared error type used across all papiea crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("conflicting entity: {0}")]
    ConflictingEntity(ErrorDetails),

    #[error("entity not found: {0}")]
    EntityNotFound(ErrorDetails),

    #[error("permission denied: {0}")]
    PermissionDenied(ErrorDetails),

    #[error("procedure invocation failed: {0}")]
    ProcedureInvocation(ErrorDetails),

    #[error("unauthorized: {0}")]
    Unauthorized(ErrorDetails),

    #[error("validation failed: {0}")]
    Validation(ErrorDetails),

    #[error("bad request: {0}")]
    BadRequest(ErrorDetails),

    #[error("engine server error: {0}")]
    ServerError(ErrorDetails),

    /// Non-2xx answer without a recognised `error.type` tag.
    #[error("API error: {0}")]
    Api(ErrorDetails),

    /// Connection-level failure (dropped, reset, expired or closed session).
    #[error("transport: {0}")]
    Transport(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("{context}: {source}")]
    Security {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Translate a non-2xx engine response into an error value.
    ///
    /// Bodies of the form `{"error": {"type": <tag>, "message": <m>}}` with a
    /// known tag map onto the specific variant; anything else (unknown tag,
    /// no `error` key, non-JSON text) becomes [`Error::Api`].
    pub fn from_response(response: ResponseMeta, body: &str) -> Error {
        let parsed: serde_json::Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(_) => {
                return Error::Api(ErrorDetails {
                    message: response.reason.clone(),
                    response,
                    details: serde_json::Value::String(body.to_owned()),
                })
            }
        };

        let error_obj = parsed.get("error");
        let message = error_obj
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| response.reason.clone());
        let kind = error_obj
            .and_then(|e| e.get("type"))
            .and_then(|t| t.as_str())
            .and_then(ErrorKind::from_tag);

        let details = ErrorDetails {
            message,
            response,
            details: parsed,
        };
        match kind {
            Some(kind) => kind.into_error(details),
            None => Error::Api(details),
        }
    }

    /// Taxonomy tag of an engine-reported error. `None` for local errors and
    /// for the generic [`Error::Api`].
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::ConflictingEntity(_) => Some(ErrorKind::ConflictingEntity),
            Error::EntityNotFound(_) => Some(ErrorKind::EntityNotFound),
            Error::PermissionDenied(_) => Some(ErrorKind::PermissionDenied),
            Error::ProcedureInvocation(_) => Some(ErrorKind::ProcedureInvocation),
            Error::Unauthorized(_) => Some(ErrorKind::Unauthorized),
            Error::Validation(_) => Some(ErrorKind::Validation),
            Error::BadRequest(_) => Some(ErrorKind::BadRequest),
            Error::ServerError(_) => Some(ErrorKind::ServerError),
            Error::Security { source, .. } => source.kind(),
            _ => None,
        }
    }

    /// Details of the engine response, for every variant built from one.
    pub fn details(&self) -> Option<&ErrorDetails> {
        match self {
            Error::ConflictingEntity(d)
            | Error::EntityNotFound(d)
            | Error::PermissionDenied(d)
            | Error::ProcedureInvocation(d)
            | Error::Unauthorized(d)
            | Error::Validation(d)
            | Error::BadRequest(d)
            | Error::ServerError(d)
            | Error::Api(d) => Some(d),
            Error::Security { source, .. } => source.details(),
            _ => None,
        }
    }

    /// HTTP status of the engine response this error came from.
    pub fn status_code(&self) -> Option<u16> {
        self.details().map(|d| d.response.status)
    }

    /// Whether the engine itself produced this outcome. Such errors are
    /// authoritative and are never retried.
    pub fn is_engine_error(&self) -> bool {
        self.details().is_some()
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(ErrorKind::EntityNotFound)
    }
}
