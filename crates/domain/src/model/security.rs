use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claims the engine attaches to an authenticated caller. Open-ended.
pub type UserInfo = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S2SKey {
    pub owner: String,
    pub provider_prefix: String,
    pub key: String,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_info: UserInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Request body for key creation. Everything omitted is filled in by the
/// engine from the caller's identity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewS2SKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}
