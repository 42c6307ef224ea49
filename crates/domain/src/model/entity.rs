//! Entities and references as they travel between the SDK and the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::intent::IntentWatcher;

/// Desired state of an entity. Shape is defined by the kind schema.
pub type Spec = serde_json::Value;
/// Observed state of an entity. Shape is defined by the kind schema.
pub type Status = serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// References
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference {
    pub uuid: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityReference {
    pub fn new(uuid: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            kind: kind.into(),
            name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEntityReference {
    pub uuid: String,
    pub kind: String,
    #[serde(default)]
    pub provider_prefix: String,
    #[serde(default)]
    pub provider_version: String,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub uuid: String,
    pub kind: String,
    #[serde(default)]
    pub provider_prefix: String,
    #[serde(default)]
    pub provider_version: String,
    /// Optimistic-concurrency counter. Must be sent back unchanged on update.
    #[serde(default)]
    pub spec_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<serde_json::Value>,
}

impl Metadata {
    pub fn entity_ref(&self) -> EntityReference {
        EntityReference::new(self.uuid.clone(), self.kind.clone())
    }

    pub fn provider_ref(&self) -> ProviderEntityReference {
        ProviderEntityReference {
            uuid: self.uuid.clone(),
            kind: self.kind.clone(),
            provider_prefix: self.provider_prefix.clone(),
            provider_version: self.provider_version.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: Spec,
    #[serde(default)]
    pub status: Status,
}

/// Answer to an entity creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: Spec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_watcher: Option<IntentWatcher>,
}

/// Answer to a spec update. `watcher` is present when the change produced
/// work for the intent engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateResponse {
    #[serde(default)]
    pub watcher: Option<IntentWatcher>,
}

/// One page of a filter / list call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResults<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub entity_count: u64,
}

impl<T> Default for FilterResults<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            entity_count: 0,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Permission actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Read,
    #[serde(rename = "write")]
    Update,
    Create,
    Delete,
    RegisterProvider,
    UnregisterProvider,
    ReadProvider,
    UpdateAuth,
    #[serde(rename = "create_key")]
    CreateS2SKey,
    #[serde(rename = "read_key")]
    ReadS2SKey,
    #[serde(rename = "inactive_key")]
    InactivateS2SKey,
    UpdateStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn metadata_tolerates_missing_optional_fields() {
        let md: Metadata = serde_json::from_value(json!({
            "uuid": "u-1",
            "kind": "Location",
            "spec_version": 3
        }))
        .unwrap();
        assert_eq!(md.spec_version, 3);
        assert!(md.created_at.is_none());
        assert_eq!(md.entity_ref(), EntityReference::new("u-1", "Location"));
    }

    #[test]
    fn entity_defaults_spec_and_status_to_null() {
        let e: Entity = serde_json::from_value(json!({
            "metadata": { "uuid": "u-1", "kind": "Location" }
        }))
        .unwrap();
        assert!(e.spec.is_null());
        assert!(e.status.is_null());
    }

    #[test]
    fn actions_use_engine_names() {
        let pairs = vec![
            (Action::Update, "write"),
            (Action::CreateS2SKey, "create_key"),
            (Action::InactivateS2SKey, "inactive_key"),
            (Action::RegisterProvider, "register_provider"),
        ];
        for (action, wire) in pairs {
            assert_eq!(serde_json::to_value(action).unwrap(), json!(wire));
        }
    }
}
