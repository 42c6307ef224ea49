//! Intent watchers and diffs. The engine owns the watcher state machine;
//! these types only mirror what it reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::ProviderEntityReference;
use super::provider::IntentfulSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentfulStatus {
    Pending,
    Active,
    #[serde(rename = "Completed Successfully")]
    CompletedSuccessfully,
    #[serde(rename = "Completed Partially")]
    CompletedPartially,
    Failed,
    Outdated,
}

impl IntentfulStatus {
    /// Whether the engine will not move the watcher any further.
    pub fn is_terminal(self) -> bool {
        !matches!(self, IntentfulStatus::Pending | IntentfulStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntentfulStatus::Pending => "Pending",
            IntentfulStatus::Active => "Active",
            IntentfulStatus::CompletedSuccessfully => "Completed Successfully",
            IntentfulStatus::CompletedPartially => "Completed Partially",
            IntentfulStatus::Failed => "Failed",
            IntentfulStatus::Outdated => "Outdated",
        }
    }
}

/// A single divergent field between spec and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffContent {
    #[serde(default)]
    pub keys: serde_json::Value,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub path: Vec<serde_json::Value>,
    #[serde(default, alias = "spec-val")]
    pub spec: Vec<serde_json::Value>,
    #[serde(default, alias = "status-val")]
    pub status: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub kind: String,
    pub intentful_signature: IntentfulSignature,
    #[serde(default)]
    pub diff_fields: Vec<DiffContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentWatcher {
    pub uuid: String,
    pub entity_ref: ProviderEntityReference,
    #[serde(default)]
    pub spec_version: u64,
    #[serde(default)]
    pub diffs: Vec<Diff>,
    pub status: IntentfulStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status_changed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// What an intent handler may answer: how long the engine should wait
/// before re-checking the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntentfulOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_secs: Option<u64>,
}

impl IntentfulOutput {
    pub fn retry_after(delay_secs: u64) -> Self {
        Self {
            delay_secs: Some(delay_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_uses_spaced_wire_names() {
        assert_eq!(
            serde_json::to_value(IntentfulStatus::CompletedSuccessfully).unwrap(),
            json!("Completed Successfully")
        );
        let s: IntentfulStatus = serde_json::from_value(json!("Completed Partially")).unwrap();
        assert_eq!(s, IntentfulStatus::CompletedPartially);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!IntentfulStatus::Pending.is_terminal());
        assert!(!IntentfulStatus::Active.is_terminal());
        assert!(IntentfulStatus::Failed.is_terminal());
        assert!(IntentfulStatus::Outdated.is_terminal());
    }

    #[test]
    fn diff_content_accepts_dashed_value_names() {
        let d: DiffContent = serde_json::from_value(json!({
            "keys": {},
            "key": "x",
            "path": ["x"],
            "spec-val": [10],
            "status-val": [5]
        }))
        .unwrap();
        assert_eq!(d.spec, vec![json!(10)]);
        assert_eq!(d.status, vec![json!(5)]);
    }
}
