//! Typed field descriptors for immutable grid directories
//!
//! `POST /uri?t=mkdir-immutable` takes a JSON object whose values are either
//! `["filenode", {"ro_uri": .., "metadata": {..}}]` child descriptors or, for
//! `parents`, a bare list of capability strings. Every accepted shape is a
//! [`FieldValue`] variant.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::Value;

use super::Capability;

const FILENODE: &str = "filenode";
const DIRNODE: &str = "dirnode";

static NO_METADATA: BTreeMap<String, String> = BTreeMap::new();

/// One named child of an immutable directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// A child object referenced by capability, with per-entry metadata
    Capability {
        cap: Capability,
        metadata: BTreeMap<String, String>,
    },
    /// A literal string stored in the child's `ro_uri` slot
    Literal(String),
    /// An ordered list of capabilities; order is significant
    List(Vec<Capability>),
}

impl FieldValue {
    pub fn capability(cap: Capability) -> Self {
        Self::Capability {
            cap,
            metadata: BTreeMap::new(),
        }
    }

    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// The `ro_uri` text for node-shaped fields
    pub fn ro_uri(&self) -> Option<&str> {
        match self {
            Self::Capability { cap, .. } => Some(cap.as_str()),
            Self::Literal(text) => Some(text),
            Self::List(_) => None,
        }
    }

    fn from_json(name: &str, value: &Value) -> Result<Self, String> {
        let Value::Array(items) = value else {
            return Err(format!("field {name:?} is not an array"));
        };

        if let [Value::String(kind), Value::Object(node)] = items.as_slice() {
            if kind != FILENODE {
                return Err(format!("field {name:?} has unsupported node type {kind:?}"));
            }
            let ro_uri = node
                .get("ro_uri")
                .and_then(Value::as_str)
                .ok_or_else(|| format!("field {name:?} has no ro_uri"))?;
            // grids add their own non-string bookkeeping; only strings are ours
            let metadata: BTreeMap<String, String> = node
                .get("metadata")
                .and_then(Value::as_object)
                .map(|m| {
                    m.iter()
                        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default();

            return Ok(if Capability::looks_like_capability(ro_uri) {
                Self::Capability {
                    cap: Capability::new(ro_uri),
                    metadata,
                }
            } else {
                Self::Literal(ro_uri.to_string())
            });
        }

        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(Capability::new)
                    .ok_or_else(|| format!("field {name:?} list holds a non-string"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::List)
    }
}

#[derive(Serialize)]
struct NodeDescriptor<'a> {
    ro_uri: &'a str,
    metadata: &'a BTreeMap<String, String>,
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Capability { cap, metadata } => (
                FILENODE,
                NodeDescriptor {
                    ro_uri: cap.as_str(),
                    metadata,
                },
            )
                .serialize(serializer),
            Self::Literal(text) => (
                FILENODE,
                NodeDescriptor {
                    ro_uri: text,
                    metadata: &NO_METADATA,
                },
            )
                .serialize(serializer),
            Self::List(caps) => caps.serialize(serializer),
        }
    }
}

/// The complete field set of an immutable directory
///
/// Kept sorted by name so the serialized form, and therefore the resulting
/// capability, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DirectoryFields(BTreeMap<String, FieldValue>);

impl DirectoryFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) -> &mut Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.0.iter()
    }

    /// Canonical JSON bytes, as posted to the grid
    pub fn to_json_bytes(&self) -> Vec<u8> {
        // string keys and plain values cannot fail to serialize
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parse a bare field map or a `["dirnode", {"children": {..}}]` listing
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let children = match value {
            Value::Object(map) => map,
            Value::Array(items) => match items.as_slice() {
                [Value::String(kind), Value::Object(node)] if kind == DIRNODE => node
                    .get("children")
                    .and_then(Value::as_object)
                    .ok_or_else(|| "dirnode listing has no children".to_string())?,
                _ => return Err("expected a dirnode listing".to_string()),
            },
            _ => return Err("expected a JSON object".to_string()),
        };

        children
            .iter()
            .map(|(name, field)| FieldValue::from_json(name, field).map(|v| (name.clone(), v)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Self)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, String> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        Self::from_json(&value)
    }

    /// Wrap in the grid's directory listing shape
    pub fn to_dirnode_listing(&self) -> Value {
        serde_json::json!([DIRNODE, { "children": self }])
    }
}

impl FromIterator<(String, FieldValue)> for DirectoryFields {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
