//! The provider document sent to the engine at registration time.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// How the engine reconciles entities of a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentfulBehaviour {
    #[serde(rename = "basic")]
    Basic,
    #[serde(rename = "spec-only")]
    SpecOnly,
    #[serde(rename = "differ")]
    Differ,
}

impl IntentfulBehaviour {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "basic" => Some(Self::Basic),
            "spec-only" => Some(Self::SpecOnly),
            "differ" => Some(Self::Differ),
            _ => None,
        }
    }
}

/// Execution strategy of a signature. The engine only knows `Basic`,
/// encoded as the integer `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ExecutionStrategy {
    #[default]
    Basic,
}

impl From<ExecutionStrategy> for u8 {
    fn from(s: ExecutionStrategy) -> u8 {
        match s {
            ExecutionStrategy::Basic => 0,
        }
    }
}

impl TryFrom<u8> for ExecutionStrategy {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        match v {
            0 => Ok(ExecutionStrategy::Basic),
            other => Err(format!("unknown execution strategy {other}")),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Procedures
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ErrorSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<Value>,
}

/// HTTP status code (as a string key) → error description.
pub type ErrorSchemas = BTreeMap<String, ErrorSchema>;

/// What a provider author declares about a procedure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcedureDescription {
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub output_schema: Option<Value>,
    #[serde(default)]
    pub errors_schemas: Option<ErrorSchemas>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ProcedureDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn output(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn error(mut self, status: u16, schema: ErrorSchema) -> Self {
        self.errors_schemas
            .get_or_insert_with(BTreeMap::new)
            .insert(status.to_string(), schema);
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// Every error-schema key must be an HTTP error status (400..=599).
pub fn validate_error_codes(schemas: Option<&ErrorSchemas>) -> Result<()> {
    let Some(schemas) = schemas else {
        return Ok(());
    };
    for code in schemas.keys() {
        match code.parse::<u16>() {
            Ok(status) if (400..=599).contains(&status) => {}
            _ => {
                return Err(Error::Config(format!(
                    "Error code must be a valid HTTP error code (400-599), got '{code}'"
                )))
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceduralSignature {
    pub name: String,
    #[serde(default)]
    pub argument: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub execution_strategy: ExecutionStrategy,
    pub procedure_callback: String,
    pub base_callback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors_schemas: Option<ErrorSchemas>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentfulSignature {
    /// Field-path selector this handler reacts to.
    pub signature: String,
    pub name: String,
    #[serde(default)]
    pub argument: Value,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub execution_strategy: ExecutionStrategy,
    pub procedure_callback: String,
    pub base_callback: String,
}

impl IntentfulSignature {
    /// Schema of the diff list an intent handler receives.
    pub fn input_schema() -> Value {
        json!({
            "IntentfulInput": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "keys": { "type": "object" },
                        "key": { "type": "string" },
                        "spec-val": { "type": "array" },
                        "status-val": { "type": "array" }
                    }
                }
            }
        })
    }

    /// Schema of the optional `{delay_secs}` answer.
    pub fn output_schema() -> Value {
        json!({
            "IntentfulOutput": {
                "type": "object",
                "nullable": "true",
                "properties": {
                    "delay_secs": { "type": "integer" }
                },
                "description": "Amount of seconds to wait before this entity will be checked again by the intent engine"
            }
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Kind
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kind {
    pub name: String,
    pub name_plural: String,
    pub kind_structure: Value,
    pub intentful_behaviour: IntentfulBehaviour,
    #[serde(default)]
    pub intentful_signatures: Vec<IntentfulSignature>,
    #[serde(default)]
    pub dependency_tree: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub entity_procedures: BTreeMap<String, ProceduralSignature>,
    #[serde(default)]
    pub kind_procedures: BTreeMap<String, ProceduralSignature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub differ: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_selection_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid_validation_pattern: Option<String>,
}

impl Kind {
    /// Build a kind from a `{Name: {<schema>, "x-papiea-entity": <behaviour>}}`
    /// description. Only the first top-level entry is used.
    pub fn from_description(description: &Value) -> Result<Kind> {
        let (name, schema) = description
            .as_object()
            .and_then(|m| m.iter().next())
            .ok_or_else(|| Error::Config("Wrong kind description specified".into()))?;

        let behaviour = schema.get("x-papiea-entity").ok_or_else(|| {
            Error::Config(format!(
                "Entity not a papiea entity. Please make sure you have 'x-papiea-entity' property for '{name}'"
            ))
        })?;
        let behaviour = behaviour
            .as_str()
            .and_then(IntentfulBehaviour::from_tag)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Unknown 'x-papiea-entity' value {behaviour} for '{name}'"
                ))
            })?;

        Ok(Kind {
            name: name.clone(),
            name_plural: format!("{name}s"),
            kind_structure: description.clone(),
            intentful_behaviour: behaviour,
            intentful_signatures: Vec::new(),
            dependency_tree: BTreeMap::new(),
            entity_procedures: BTreeMap::new(),
            kind_procedures: BTreeMap::new(),
            differ: None,
            diff_delay: None,
            diff_selection_strategy: None,
            uuid_validation_pattern: None,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Provider
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub prefix: String,
    pub version: String,
    pub kinds: Vec<Kind>,
    #[serde(default)]
    pub procedures: BTreeMap<String, ProceduralSignature>,
    /// Schema of the metadata extension; `{}` when the provider has none.
    #[serde(default = "empty_object")]
    pub extension_structure: Value,
    #[serde(rename = "allowExtraProps", default)]
    pub allow_extra_props: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<String>,
    #[serde(rename = "authModel", default, skip_serializing_if = "Option::is_none")]
    pub auth_model: Option<String>,
}

fn empty_object() -> Value {
    json!({})
}

impl Provider {
    pub fn kind(&self, name: &str) -> Option<&Kind> {
        self.kinds.iter().find(|k| k.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> Value {
        json!({
            "Location": {
                "type": "object",
                "x-papiea-entity": "differ",
                "properties": { "x": { "type": "number" } }
            }
        })
    }

    #[test]
    fn kind_from_description() {
        let kind = Kind::from_description(&location()).unwrap();
        assert_eq!(kind.name, "Location");
        assert_eq!(kind.name_plural, "Locations");
        assert_eq!(kind.intentful_behaviour, IntentfulBehaviour::Differ);
        assert_eq!(kind.kind_structure, location());
    }

    #[test]
    fn kind_requires_entity_marker() {
        let err = Kind::from_description(&json!({ "Location": { "type": "object" } })).unwrap_err();
        assert!(err.to_string().contains("x-papiea-entity"), "{err}");

        let err = Kind::from_description(&json!({})).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn error_codes_must_be_http_errors() {
        let ok = ProcedureDescription::new()
            .error(400, ErrorSchema::default())
            .error(599, ErrorSchema::default());
        assert!(validate_error_codes(ok.errors_schemas.as_ref()).is_ok());

        let bad = ProcedureDescription::new().error(302, ErrorSchema::default());
        assert!(validate_error_codes(bad.errors_schemas.as_ref()).is_err());

        let mut text = ErrorSchemas::new();
        text.insert("teapot".into(), ErrorSchema::default());
        assert!(validate_error_codes(Some(&text)).is_err());
        assert!(validate_error_codes(None).is_ok());
    }

    #[test]
    fn provider_uses_engine_field_names() {
        let provider = Provider {
            prefix: "location_provider".into(),
            version: "0.1.0".into(),
            kinds: vec![Kind::from_description(&location()).unwrap()],
            procedures: BTreeMap::new(),
            extension_structure: json!({}),
            allow_extra_props: true,
            policy: None,
            oauth2: None,
            auth_model: Some("rbac".into()),
        };
        let v = serde_json::to_value(&provider).unwrap();
        assert_eq!(v["allowExtraProps"], json!(true));
        assert_eq!(v["authModel"], json!("rbac"));
        assert!(v.get("policy").is_none());
        assert_eq!(v["extension_structure"], json!({}));
        assert_eq!(v["kinds"][0]["intentful_behaviour"], json!("differ"));
    }

    #[test]
    fn missing_extension_structure_reads_as_empty() {
        let provider: Provider = serde_json::from_value(json!({
            "prefix": "location_provider",
            "version": "0.1.0",
            "kinds": []
        }))
        .unwrap();
        assert_eq!(provider.extension_structure, json!({}));
    }

    #[test]
    fn execution_strategy_is_numeric() {
        assert_eq!(serde_json::to_value(ExecutionStrategy::Basic).unwrap(), json!(0));
        assert!(serde_json::from_value::<ExecutionStrategy>(json!(3)).is_err());
    }
}
