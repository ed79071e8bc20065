//! Event - the unit of data in a pipeline
//!
//! An event is a JSON object document plus metadata. Fields are addressed by
//! key paths: `"name"` for a top-level field or `"/outer/inner"` for a nested
//! one. Insertion order is preserved.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;

/// Well-known event types
pub mod event_types {
    /// Generic structured event
    pub const EVENT: &str = "event";
    /// Log line
    pub const LOG: &str = "log";
    /// Metric data point
    pub const METRIC: &str = "metric";
    /// Trace span
    pub const SPAN: &str = "span";
}

/// Metadata carried alongside an event's data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// When the event entered the system
    pub time_received: DateTime<Utc>,

    /// Free-form attributes set by sources and processors
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,

    /// Tags attached during processing
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl EventMetadata {
    fn now() -> Self {
        Self {
            time_received: Utc::now(),
            attributes: Map::new(),
            tags: BTreeSet::new(),
        }
    }
}

/// A single event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    event_type: String,
    data: Map<String, Value>,
    metadata: EventMetadata,
}

impl Event {
    /// Create an empty event of the given type
    pub fn new(event_type: impl Into<String>) -> Self {
        Self::from_data(event_type, Map::new())
    }

    /// Create an event from an existing object
    pub fn from_data(event_type: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            metadata: EventMetadata::now(),
        }
    }

    /// Parse event data from a JSON object string
    pub fn from_json(event_type: impl Into<String>, json: &str) -> crate::Result<Self> {
        match serde_json::from_str::<Value>(json)? {
            Value::Object(data) => Ok(Self::from_data(event_type, data)),
            other => Err(ProtocolError::NotAnObject(kind_of(&other))),
        }
    }

    /// Event type
    #[inline]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Event data
    #[inline]
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Mutable event data
    #[inline]
    pub fn data_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.data
    }

    /// Event metadata
    #[inline]
    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    /// Mutable event metadata
    #[inline]
    pub fn metadata_mut(&mut self) -> &mut EventMetadata {
        &mut self.metadata
    }

    /// Look up a field by key path
    pub fn get(&self, key: &str) -> Option<&Value> {
        let segments = parse_key(key).ok()?;
        let (last, parents) = segments.split_last()?;
        let mut current = &self.data;
        for segment in parents {
            current = current.get(*segment)?.as_object()?;
        }
        current.get(*last)
    }

    /// Whether a field exists at the key path
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set a field, creating intermediate objects as needed
    ///
    /// Returns the previous value, if any.
    pub fn put(&mut self, key: &str, value: impl Into<Value>) -> crate::Result<Option<Value>> {
        let segments = parse_key(key)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(ProtocolError::invalid_key(key));
        };

        let mut current = &mut self.data;
        for (depth, segment) in parents.iter().enumerate() {
            let entry = current
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match entry {
                Value::Object(map) => map,
                _ => return Err(ProtocolError::NotTraversable(parents[..=depth].join("/"))),
            };
        }
        Ok(current.insert((*last).to_string(), value.into()))
    }

    /// Remove a field, returning its value
    pub fn delete(&mut self, key: &str) -> Option<Value> {
        let segments = parse_key(key).ok()?;
        let (last, parents) = segments.split_last()?;
        let mut current = &mut self.data;
        for segment in parents {
            current = current.get_mut(*segment)?.as_object_mut()?;
        }
        current.shift_remove(*last)
    }

    /// Move a field to a new key path
    ///
    /// Returns false if the source field does not exist.
    pub fn rename(&mut self, from: &str, to: &str) -> crate::Result<bool> {
        parse_key(to)?;
        let Some(value) = self.delete(from) else {
            return Ok(false);
        };
        self.put(to, value)?;
        Ok(true)
    }

    /// Serialize the data portion to a JSON string
    pub fn to_json(&self) -> String {
        Value::Object(self.data.clone()).to_string()
    }
}

/// Split a key path into segments
fn parse_key(key: &str) -> crate::Result<Vec<&str>> {
    let trimmed = key.strip_prefix('/').unwrap_or(key);
    if trimmed.is_empty() {
        return Err(ProtocolError::invalid_key(key));
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(ProtocolError::invalid_key(key));
    }
    Ok(segments)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
