use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

/// An insertion-ordered mapping from feature name to value.
///
/// Names are unique; re-inserting an existing name overwrites its value in
/// place. Storage is a plain vector so iteration order never depends on hash
/// state and merges stay deterministic.
#[derive(Clone, Default, PartialEq)]
pub struct FeatureSet {
    entries: Vec<(String, Value)>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feature value, overwriting any existing value for the same
    /// name. The original position is kept on overwrite.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `newer` into `self`: names present in both take the newer value,
    /// names unique to either side are preserved.
    pub fn merge_from(&mut self, newer: &FeatureSet) {
        for (name, value) in newer.iter() {
            self.insert(name, value.clone());
        }
    }
}

impl FromIterator<(String, Value)> for FeatureSet {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut set = FeatureSet::new();
        for (name, value) in iter {
            set.insert(name, value);
        }
        set
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl Serialize for FeatureSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_overwrites_in_place() {
        let mut set = FeatureSet::new();
        set.insert("brightness", json!(0.4));
        set.insert("contrast", json!(0.9));
        set.insert("brightness", json!(0.7));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("brightness"), Some(&json!(0.7)));
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["brightness", "contrast"]);
    }

    #[test]
    fn merge_prefers_newer_values_and_keeps_unique_names() {
        let mut older: FeatureSet = [
            ("a".to_string(), json!(1)),
            ("b".to_string(), json!(2)),
        ]
        .into_iter()
        .collect();
        let newer: FeatureSet = [
            ("b".to_string(), json!(20)),
            ("c".to_string(), json!(30)),
        ]
        .into_iter()
        .collect();
        older.merge_from(&newer);
        assert_eq!(older.get("a"), Some(&json!(1)));
        assert_eq!(older.get("b"), Some(&json!(20)));
        assert_eq!(older.get("c"), Some(&json!(30)));
    }

    #[test]
    fn serializes_as_a_map() {
        let mut set = FeatureSet::new();
        set.insert("label", json!("cat"));
        set.insert("score", json!(0.98));
        let encoded = serde_json::to_string(&set).unwrap();
        assert_eq!(encoded, r#"{"label":"cat","score":0.98}"#);
    }
}
