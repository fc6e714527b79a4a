//! Metadata codec.
//!
//! Export flattens one level of nesting into `parent_child` keys so the
//! edit-planning consumer sees a flat map; import splits them back. The two
//! directions are deliberately asymmetric: the reserved `text` field is only
//! ever exported, and flat keys that happen to contain an underscore come back
//! nested.

use serde_json::{Map, Value};

use crate::core::timeline::otio::schema_name_of;
use crate::core::RESERVED_TEXT_KEY;

/// Marker key for metadata that was not a mapping
pub const RAW_MARKER: &str = "_raw";

/// Marker key for fields of an object that could not be exported
pub const ERROR_MARKER: &str = "_error";

/// Namespace Resolve uses for its own metadata
pub const RESOLVE_NAMESPACE: &str = "Resolve_OTIO";

// =============================================================================
// Classification
// =============================================================================

/// Shape of a single metadata value
#[derive(Clone, Debug, PartialEq)]
pub enum MetadataValue {
    /// Scalars and arrays
    Primitive(Value),
    /// A plain mapping
    Nested(Map<String, Value>),
    /// A serialized OTIO object stored inside metadata
    Opaque { schema: String, name: Option<String> },
}

impl MetadataValue {
    pub fn classify(value: &Value) -> Self {
        match value {
            Value::Object(obj) => match schema_name_of(value) {
                Some(schema) => MetadataValue::Opaque {
                    schema: schema.to_string(),
                    name: obj
                        .get("name")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                },
                None => MetadataValue::Nested(obj.clone()),
            },
            other => MetadataValue::Primitive(other.clone()),
        }
    }

    /// JSON form written to the interchange document
    pub fn into_export_value(self) -> Value {
        match self {
            MetadataValue::Primitive(Value::Array(items)) => {
                Value::Array(items.iter().map(export_value).collect())
            }
            MetadataValue::Primitive(v) => v,
            MetadataValue::Nested(obj) => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), export_value(v)))
                    .collect(),
            ),
            MetadataValue::Opaque { schema, name } => {
                let mut obj = Map::new();
                obj.insert("type".into(), Value::String(schema));
                if let Some(name) = name {
                    obj.insert("name".into(), Value::String(name));
                }
                Value::Object(obj)
            }
        }
    }
}

/// Recursively replaces embedded OTIO objects with `{type, name}` stubs.
pub fn export_value(value: &Value) -> Value {
    MetadataValue::classify(value).into_export_value()
}

// =============================================================================
// Export
// =============================================================================

/// Extracts a metadata mapping without flattening.
///
/// Missing or null metadata yields an empty map; anything that is not a
/// mapping is kept as its text under `_raw`.
pub fn extract(metadata: &Value) -> Map<String, Value> {
    match metadata {
        Value::Null => Map::new(),
        Value::Object(obj) => obj
            .iter()
            .map(|(k, v)| (k.clone(), export_value(v)))
            .collect(),
        other => raw_marker(other),
    }
}

/// Extracts and flattens one level of nesting into `parent_child` keys.
pub fn flatten(metadata: &Value) -> Map<String, Value> {
    let Value::Object(obj) = metadata else {
        return extract(metadata);
    };

    let mut flat = Map::new();
    for (key, value) in obj {
        match MetadataValue::classify(value) {
            MetadataValue::Nested(children) => {
                for (child, child_value) in &children {
                    flat.insert(format!("{key}_{child}"), export_value(child_value));
                }
            }
            other => {
                flat.insert(key.clone(), other.into_export_value());
            }
        }
    }
    flat
}

/// Flattens a metadata map already held by the timeline model
pub fn flatten_map(metadata: &Map<String, Value>) -> Map<String, Value> {
    flatten(&Value::Object(metadata.clone()))
}

fn raw_marker(value: &Value) -> Map<String, Value> {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut obj = Map::new();
    obj.insert(RAW_MARKER.into(), Value::String(text));
    obj
}

// =============================================================================
// Import
// =============================================================================

/// How flat keys are split back into nested metadata
#[derive(Clone, Debug, PartialEq)]
pub struct UnflattenRules {
    /// Keys starting with `<prefix>_` split after the prefix instead of at the first underscore
    pub namespace_prefixes: Vec<String>,
    /// Keys never written back into the timeline
    pub reserved_keys: Vec<String>,
}

impl Default for UnflattenRules {
    fn default() -> Self {
        Self {
            namespace_prefixes: vec![RESOLVE_NAMESPACE.to_string()],
            reserved_keys: vec![RESERVED_TEXT_KEY.to_string()],
        }
    }
}

impl UnflattenRules {
    /// Plain first-underscore splitting with no namespaces
    pub fn first_underscore() -> Self {
        Self {
            namespace_prefixes: Vec::new(),
            ..Self::default()
        }
    }

    /// Splits a flat key into (parent, child), or None if it stays flat.
    pub fn split<'a>(&self, key: &'a str) -> Option<(&'a str, &'a str)> {
        for prefix in &self.namespace_prefixes {
            if let Some(rest) = key.strip_prefix(prefix.as_str()) {
                if let Some(child) = rest.strip_prefix('_') {
                    if !child.is_empty() {
                        return Some((&key[..prefix.len()], child));
                    }
                }
            }
        }
        match key.split_once('_') {
            Some((parent, child)) if !parent.is_empty() && !child.is_empty() => {
                Some((parent, child))
            }
            _ => None,
        }
    }

    fn is_reserved(&self, key: &str) -> bool {
        self.reserved_keys.iter().any(|k| k == key)
    }
}

/// Rebuilds nested metadata from flat keys.
///
/// Reserved keys are dropped. Unsplit keys are placed first, so a split whose
/// parent holds a non-mapping value keeps its flat key whatever the key order.
pub fn unflatten(flat: &Map<String, Value>, rules: &UnflattenRules) -> Map<String, Value> {
    let mut nested = Map::new();
    let mut splits = Vec::new();
    for (key, value) in flat {
        if rules.is_reserved(key) {
            continue;
        }
        match rules.split(key) {
            Some((parent, child)) => splits.push((key, parent, child, value)),
            None => {
                nested.insert(key.clone(), value.clone());
            }
        }
    }

    for (key, parent, child, value) in splits {
        let slot = nested
            .entry(parent.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(children) = slot {
            children.insert(child.to_string(), value.clone());
            continue;
        }
        tracing::debug!(key = %key, "Metadata parent is not a mapping; keeping flat key");
        nested.insert(key.clone(), value.clone());
    }
    nested
}

// =============================================================================
// Key Validation
// =============================================================================

/// Why a metadata key was rejected
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyProblem {
    Empty,
    ControlCharacter,
    LeadingUnderscore,
}

impl std::fmt::Display for KeyProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyProblem::Empty => write!(f, "key is empty"),
            KeyProblem::ControlCharacter => write!(f, "key contains control characters"),
            KeyProblem::LeadingUnderscore => write!(f, "key starts with an underscore"),
        }
    }
}

/// A rejected key and where it was found
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BadKey {
    pub path: String,
    pub problem: KeyProblem,
}

/// Checks a single key against the strict key rules of the timeline library.
pub fn check_key(key: &str) -> Result<(), KeyProblem> {
    if key.is_empty() {
        Err(KeyProblem::Empty)
    } else if key.chars().any(char::is_control) {
        Err(KeyProblem::ControlCharacter)
    } else if key.starts_with('_') {
        Err(KeyProblem::LeadingUnderscore)
    } else {
        Ok(())
    }
}

/// Collects every bad key at every nesting level.
pub fn find_bad_keys(metadata: &Map<String, Value>) -> Vec<BadKey> {
    let mut bad = Vec::new();
    collect_bad_keys(metadata, "", &mut bad);
    bad
}

/// Fails with the first bad key found, if any.
pub fn validate_keys(metadata: &Map<String, Value>) -> Result<(), BadKey> {
    match find_bad_keys(metadata).into_iter().next() {
        Some(bad) => Err(bad),
        None => Ok(()),
    }
}

fn collect_bad_keys(metadata: &Map<String, Value>, prefix: &str, out: &mut Vec<BadKey>) {
    for (key, value) in metadata {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if let Err(problem) = check_key(key) {
            out.push(BadKey {
                path: path.clone(),
                problem,
            });
        }
        if let Value::Object(children) = value {
            collect_bad_keys(children, &path, out);
        }
    }
}

/// What to do with a metadata write that contains a bad key
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataWritePolicy {
    /// Skip the whole write for the object
    #[default]
    SkipObject,
    /// Drop only the offending keys
    DropKey,
}

/// Result of filtering a metadata write
#[derive(Clone, Debug, PartialEq)]
pub struct FilteredMetadata {
    /// Metadata to write, or None if the write is skipped
    pub accepted: Option<Map<String, Value>>,
    pub rejected: Vec<BadKey>,
}

impl MetadataWritePolicy {
    pub fn filter(&self, metadata: Map<String, Value>) -> FilteredMetadata {
        let rejected = find_bad_keys(&metadata);
        if rejected.is_empty() {
            return FilteredMetadata {
                accepted: Some(metadata),
                rejected,
            };
        }
        let accepted = match self {
            MetadataWritePolicy::SkipObject => None,
            MetadataWritePolicy::DropKey => Some(drop_bad_keys(metadata)),
        };
        FilteredMetadata { accepted, rejected }
    }
}

fn drop_bad_keys(metadata: Map<String, Value>) -> Map<String, Value> {
    metadata
        .into_iter()
        .filter(|(k, _)| check_key(k).is_ok())
        .map(|(k, v)| match v {
            Value::Object(children) => (k, Value::Object(drop_bad_keys(children))),
            other => (k, other),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_flatten_one_level() {
        let flat = flatten(&json!({
            "speaker": "A",
            "Resolve_OTIO": {"Link Group ID": 3, "Channels": [0, 1]},
        }));
        assert_eq!(flat["speaker"], "A");
        assert_eq!(flat["Resolve_OTIO_Link Group ID"], 3);
        assert_eq!(flat["Resolve_OTIO_Channels"], json!([0, 1]));
        assert!(!flat.contains_key("Resolve_OTIO"));
    }

    #[test]
    fn test_non_mapping_degrades_to_raw() {
        assert_eq!(flatten(&json!("free text"))[RAW_MARKER], "free text");
        assert_eq!(extract(&json!(42))[RAW_MARKER], "42");
        assert!(extract(&Value::Null).is_empty());
    }

    #[test]
    fn test_opaque_objects_are_stubbed() {
        let flat = flatten(&json!({
            "marker": {"OTIO_SCHEMA": "Marker.2", "name": "Beat", "color": "RED"}
        }));
        assert_eq!(flat["marker"], json!({"type": "Marker", "name": "Beat"}));
    }

    #[test]
    fn test_unflatten_drops_text_and_splits() {
        let nested = unflatten(
            &map(json!({"text": "hello", "speaker_label": "B", "confidence": 0.9})),
            &UnflattenRules::default(),
        );
        assert!(!nested.contains_key("text"));
        assert_eq!(nested["speaker"], json!({"label": "B"}));
        assert_eq!(nested["confidence"], 0.9);
    }

    #[test]
    fn test_namespace_prefix_round_trips() {
        let original = map(json!({"Resolve_OTIO": {"Link Group ID": 1, "Clip Color": "Orange"}}));
        let flat = flatten_map(&original);
        assert_eq!(unflatten(&flat, &UnflattenRules::default()), original);

        let naive = unflatten(&flat, &UnflattenRules::first_underscore());
        assert_eq!(naive["Resolve"]["OTIO_Link Group ID"], 1);
    }

    #[test]
    fn test_unflatten_keeps_flat_key_on_collision() {
        let nested = unflatten(
            &map(json!({"take": 3, "take_note": "good"})),
            &UnflattenRules::default(),
        );
        assert_eq!(nested["take"], 3);
        assert_eq!(nested["take_note"], "good");

        let reversed = unflatten(
            &map(json!({"take_note": "good", "take": 3})),
            &UnflattenRules::default(),
        );
        assert_eq!(reversed, nested);
    }

    #[test]
    fn test_leading_underscore_stays_flat() {
        let nested = unflatten(&map(json!({"_raw": "x"})), &UnflattenRules::default());
        assert_eq!(nested["_raw"], "x");
    }

    #[test]
    fn test_key_checks() {
        assert_eq!(check_key(""), Err(KeyProblem::Empty));
        assert_eq!(check_key("a\u{7}"), Err(KeyProblem::ControlCharacter));
        assert_eq!(check_key("_hidden"), Err(KeyProblem::LeadingUnderscore));
        assert!(check_key("Link Group ID").is_ok());
    }

    #[test]
    fn test_validate_keys_reports_nested_path() {
        let metadata = map(json!({"Resolve_OTIO": {"ok": 1, "_hidden": 2}}));
        let bad = validate_keys(&metadata).unwrap_err();
        assert_eq!(bad.path, "Resolve_OTIO._hidden");
        assert_eq!(bad.problem, KeyProblem::LeadingUnderscore);
        assert!(validate_keys(&map(json!({"speaker": "A"}))).is_ok());
    }

    #[test]
    fn test_skip_object_policy_rejects_whole_write() {
        let metadata = map(json!({"speaker": "A", "nested": {"_bad": 1}}));
        let filtered = MetadataWritePolicy::SkipObject.filter(metadata);
        assert!(filtered.accepted.is_none());
        assert_eq!(filtered.rejected[0].path, "nested._bad");
    }

    #[test]
    fn test_drop_key_policy_keeps_good_keys() {
        let metadata = map(json!({"speaker": "A", "": 1, "nested": {"_bad": 1, "ok": 2}}));
        let filtered = MetadataWritePolicy::DropKey.filter(metadata);
        let accepted = filtered.accepted.unwrap();
        assert_eq!(accepted["speaker"], "A");
        assert!(!accepted.contains_key(""));
        assert_eq!(accepted["nested"], json!({"ok": 2}));
        assert_eq!(filtered.rejected.len(), 2);
    }
}
