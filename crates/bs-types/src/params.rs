//! Scalar hyperparameter values and insertion-ordered parameter settings.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A concrete hyperparameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    /// Numeric view used for numeric coercion when results are persisted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::Bool(v) => serde_json::Value::from(*v),
            Self::Text(v) => serde_json::Value::from(v.as_str()),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// An ordered mapping from hyperparameter name to value.
///
/// Keys keep their first-insertion position; re-inserting a key replaces
/// the value in place. Serialized as a JSON object in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    entries: Vec<(String, ParamValue)>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a value, returning the previous one.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<ParamValue> {
        let pos = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(pos).1)
    }

    /// Overlay `other` on top of `self`.
    pub fn merged(&self, other: &ParamSet) -> ParamSet {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            merged.insert(name.clone(), value.clone());
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, ParamValue)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }
}

impl FromIterator<(String, ParamValue)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        let mut set = ParamSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

impl Serialize for ParamSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParamSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ParamSetVisitor;

        impl<'de> Visitor<'de> for ParamSetVisitor {
            type Value = ParamSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of parameter names to scalar values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<ParamSet, A::Error> {
                let mut set = ParamSet::new();
                while let Some((k, v)) = access.next_entry::<String, ParamValue>()? {
                    set.insert(k, v);
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(ParamSetVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_in_place_and_appends_new_keys() {
        let baseline = ParamSet::new()
            .with("objective", "binary")
            .with("num_leaves", 31i64)
            .with("learning_rate", 0.05);
        let swept = ParamSet::new()
            .with("learning_rate", 0.1)
            .with("min_data_in_leaf", 20i64);

        let merged = baseline.merged(&swept);
        let names: Vec<&str> = merged.names().collect();
        assert_eq!(
            names,
            vec!["objective", "num_leaves", "learning_rate", "min_data_in_leaf"]
        );
        assert_eq!(merged.get("learning_rate"), Some(&ParamValue::Float(0.1)));
        // baseline is untouched
        assert_eq!(baseline.get("learning_rate"), Some(&ParamValue::Float(0.05)));
    }

    #[test]
    fn untagged_values_parse_from_plain_json() {
        let set: ParamSet =
            serde_json::from_str(r#"{"b": 3, "a": 0.5, "c": true, "d": "gbdt"}"#).unwrap();
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["b", "a", "c", "d"]);
        assert_eq!(set.get("b"), Some(&ParamValue::Int(3)));
        assert_eq!(set.get("a"), Some(&ParamValue::Float(0.5)));
        assert_eq!(set.get("c"), Some(&ParamValue::Bool(true)));
        assert_eq!(set.get("d"), Some(&ParamValue::Text("gbdt".into())));
    }

    #[test]
    fn serializes_in_insertion_order() {
        let set = ParamSet::new().with("z", 1i64).with("a", 2i64);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"{"z":1,"a":2}"#);
    }

    #[test]
    fn numeric_views() {
        assert_eq!(ParamValue::Int(4).as_f64(), Some(4.0));
        assert_eq!(ParamValue::Float(8.0).as_i64(), Some(8));
        assert_eq!(ParamValue::Float(8.5).as_i64(), None);
        assert_eq!(ParamValue::Text("x".into()).as_f64(), None);
        assert_eq!(ParamValue::Bool(true).to_string(), "true");
    }

    #[test]
    fn remove_drops_entry() {
        let mut set = ParamSet::new().with("a", 1i64).with("b", 2i64);
        assert_eq!(set.remove("a"), Some(ParamValue::Int(1)));
        assert!(!set.contains("a"));
        assert_eq!(set.len(), 1);
    }
}
