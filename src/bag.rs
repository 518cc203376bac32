//! Storage keys and the untyped value channel shared with the host engine
//!
//! The host serialization engine never sees field names or declaration order.
//! Every value travels under a [`StorageKey`], the generation index of the
//! declaring type within the inheritance chain plus the field's numeric id.
//! That pair is the only identity that must stay stable across schema
//! versions.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::FieldError;

/// Composite identity of one stored field value: `(generation index, field id)`.
///
/// Canonical text form is `"<generation>_<id>"`, e.g. `"0_2"` for field id 2
/// declared on the most-derived type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageKey {
    /// Zero-based position of the declaring type in the inheritance chain,
    /// counted from the most-derived type.
    pub generation: u32,
    /// Field id, unique within the declaring type's own fields.
    pub id: u32,
}

impl StorageKey {
    pub fn new(generation: u32, id: u32) -> Self {
        Self { generation, id }
    }

    /// Parse the canonical `"<generation>_<id>"` form.
    pub fn parse(s: &str) -> Option<Self> {
        let (generation, id) = s.split_once('_')?;
        Some(Self {
            generation: generation.parse().ok()?,
            id: id.parse().ok()?,
        })
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.generation, self.id)
    }
}

/// Outcome of fetching one field value from a source.
///
/// `Absent` is the schema-evolution case (the key was written by an older
/// producer that did not know the field) and triggers the fallback chain.
/// `Corrupt` is every other failure and aborts the read of the instance.
#[derive(Debug, Clone)]
pub enum Fetch {
    Found(Value),
    Absent,
    Corrupt(String),
}

/// Host hookpoint: where the write path deposits field values.
pub trait FieldSink {
    fn put(&mut self, key: StorageKey, value: Value) -> Result<(), FieldError>;
}

/// Host hookpoint: where the read path fetches field values.
pub trait FieldSource {
    fn fetch(&self, key: StorageKey) -> Fetch;
}

/// In-memory key/value channel keyed by the canonical key text.
///
/// Doubles as the degraded projection mode: the raw string-keyed map can be
/// inspected or rendered as JSON without the original type definitions.
#[derive(Debug, Clone, Default)]
pub struct ValueBag {
    entries: BTreeMap<String, Value>,
}

impl ValueBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: StorageKey) -> Option<&Value> {
        self.entries.get(&key.to_string())
    }

    /// Remove one entry, e.g. to simulate data written before a field existed.
    pub fn remove(&mut self, key: StorageKey) -> Option<Value> {
        self.entries.remove(&key.to_string())
    }

    /// The raw string-keyed mapping, no type resolution involved.
    pub fn projection(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    pub fn into_projection(self) -> BTreeMap<String, Value> {
        self.entries
    }

    /// Render the projection as a JSON document.
    pub fn projection_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries)
    }
}

impl FieldSink for ValueBag {
    fn put(&mut self, key: StorageKey, value: Value) -> Result<(), FieldError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

impl FieldSource for ValueBag {
    fn fetch(&self, key: StorageKey) -> Fetch {
        match self.entries.get(&key.to_string()) {
            Some(value) => Fetch::Found(value.clone()),
            None => Fetch::Absent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_text_form() {
        let key = StorageKey::new(1, 42);
        assert_eq!(key.to_string(), "1_42");
        assert_eq!(StorageKey::parse("1_42"), Some(key));
    }

    #[test]
    fn test_key_parse_rejects_garbage() {
        assert_eq!(StorageKey::parse("1-42"), None);
        assert_eq!(StorageKey::parse("x_1"), None);
        assert_eq!(StorageKey::parse(""), None);
    }

    #[test]
    fn test_bag_fetch() {
        let mut bag = ValueBag::new();
        bag.put(StorageKey::new(0, 0), json!(7)).unwrap();

        match bag.fetch(StorageKey::new(0, 0)) {
            Fetch::Found(v) => assert_eq!(v, json!(7)),
            other => panic!("expected Found, got {:?}", other),
        }
        assert!(matches!(bag.fetch(StorageKey::new(0, 1)), Fetch::Absent));
    }

    #[test]
    fn test_projection_json() {
        let mut bag = ValueBag::new();
        bag.put(StorageKey::new(0, 0), json!("hello")).unwrap();
        bag.put(StorageKey::new(1, 0), json!(2)).unwrap();

        let json = bag.projection_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["0_0"], json!("hello"));
        assert_eq!(parsed["1_0"], json!(2));
    }
}
