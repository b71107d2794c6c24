//! Search documents — the projected, engine-facing form of one record.
//!
//! The content of a document is produced by an external projector. This module
//! only enforces the write-time shape invariants:
//! - list fields carry no duplicates and no null/empty entries
//! - empty fields (null, `""`, `[]`, `{}`) are dropped instead of written

use serde_json::{Map, Value};

use crate::error::SyncError;

/// Primary key of a record in the system of record.
pub type RecordId = u64;

/// Default primary-key field of every index.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// A normalised document ready to be written to an index.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: RecordId,
    fields: Map<String, Value>,
}

impl Document {
    /// Build a document, normalising `fields`. A field named like the index
    /// primary key is shadowed by `id` when serialised.
    pub fn new(id: RecordId, fields: Map<String, Value>) -> Self {
        Self {
            id,
            fields: normalize_map(fields),
        }
    }

    /// Parse a JSON object carrying its id under `primary_key`.
    pub fn from_json(value: Value, primary_key: &str) -> Result<Self, SyncError> {
        let Value::Object(mut map) = value else {
            return Err(SyncError::Projection("document is not a JSON object".into()));
        };
        let id = map
            .remove(primary_key)
            .as_ref()
            .and_then(parse_record_id)
            .ok_or_else(|| {
                SyncError::Projection(format!("document has no valid '{primary_key}' field"))
            })?;
        Ok(Self::new(id, map))
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Serialise for the wire, with the id under `primary_key`.
    pub fn to_json(&self, primary_key: &str) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert(primary_key.to_string(), Value::from(self.id));
        for (k, v) in &self.fields {
            if k != primary_key {
                map.insert(k.clone(), v.clone());
            }
        }
        Value::Object(map)
    }
}

/// Read a record id from an engine response. Engines hand primary keys back
/// either as numbers or as numeric strings.
pub fn parse_record_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn normalize_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter_map(|(k, v)| normalize_value(v).map(|v| (k, v)))
        .collect()
}

/// Returns `None` when the value is empty and must be dropped.
fn normalize_value(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items.into_iter().filter_map(normalize_value) {
                if !out.contains(&item) {
                    out.push(item);
                }
            }
            (!out.is_empty()).then_some(Value::Array(out))
        }
        Value::Object(map) => {
            let map = normalize_map(map);
            (!map.is_empty()).then_some(Value::Object(map))
        }
        other => Some(other),
    }
}
