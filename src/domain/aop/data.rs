//! Per-instance workflow scratch space

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Accumulated answers and action outputs for one running workflow instance
///
/// Keys are step ids (validated answers) or fields written by actions. Ordered so
/// persisted snapshots are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowData(BTreeMap<String, Value>);

impl WorkflowData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for WorkflowData {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_as_plain_object() {
        let data = WorkflowData::new()
            .with("ask_ref", "ABC123")
            .with("verified", true);

        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"ask_ref": "ABC123", "verified": true})
        );
    }

    #[test]
    fn test_typed_getters() {
        let data = WorkflowData::new()
            .with("ask_ref", "ABC123")
            .with("verified", true);

        assert_eq!(data.get_str("ask_ref"), Some("ABC123"));
        assert_eq!(data.get_bool("verified"), Some(true));
        assert_eq!(data.get_bool("ask_ref"), None);
        assert!(!data.contains_key("missing"));
    }
}
