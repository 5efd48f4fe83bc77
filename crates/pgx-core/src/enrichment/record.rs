//! The evolving per-variant record enrichers write into.

use crate::error::{PgxError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whether a value counts as "nothing": null, empty string, empty array or empty object.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// A variant and every field discovered about it so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub id: String,
    #[serde(flatten)]
    fields: Map<String, Value>,
}

impl EnrichedRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Build from a JSON object. The entity id is taken from `id`, falling
    /// back to `ftId`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(PgxError::Config {
                message: "Variant record must be a JSON object".to_string(),
            });
        };
        let id = match fields.remove("id") {
            Some(Value::String(id)) => id,
            _ => fields
                .get("ftId")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| PgxError::Config {
                    message: "Variant record has no id".to_string(),
                })?,
        };
        Ok(Self { id, fields })
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// True if the field is missing or holds an empty value.
    pub fn is_field_empty(&self, name: &str) -> bool {
        self.fields.get(name).map_or(true, is_empty_value)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// The dbSNP rsID: the entity id itself when it is one, else the first
    /// `dbSNP` cross-reference.
    pub fn rsid(&self) -> Option<&str> {
        if self.id.starts_with("rs") {
            return Some(&self.id);
        }
        self.fields
            .get("xrefs")
            .and_then(Value::as_array)?
            .iter()
            .find(|xref| xref.get("name").and_then(Value::as_str) == Some("dbSNP"))
            .and_then(|xref| xref.get("id"))
            .and_then(Value::as_str)
    }

    /// Gene symbol attached to the record, if any.
    pub fn gene_symbol(&self) -> Option<&str> {
        ["gene", "gene_symbol"]
            .iter()
            .find_map(|key| self.fields.get(*key).and_then(Value::as_str))
            .filter(|s| !s.is_empty())
    }
}
