//! The declarative document.
//!
//! The desired state arrives as one nested YAML mapping whose keys are
//! typed identifiers (`"schema public"`, `"cast (integer as text)"`, ...).
//! This module wraps that mapping and performs the top-level split; the
//! recursive walk into schemas, tables and wrappers lives in [`crate::graph`].
//!
//! How the mapping is assembled from files (one file, or a directory of
//! per-object files) is the caller's business; the engine only ever sees
//! the merged mapping.

use serde_yaml::{Mapping, Value};

use crate::error::Error;
use crate::object::Kind;

/// Top-level kinds a document may declare directly; everything else nests
/// inside one of these.
const TOP_LEVEL: [Kind; 6] = [
    Kind::Schema,
    Kind::Extension,
    Kind::Language,
    Kind::Cast,
    Kind::ForeignDataWrapper,
    Kind::UserMapping,
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document(pub Mapping);

impl Document {
    /// Parse a document from YAML text. The top level must be a mapping.
    pub fn parse(text: &str) -> Result<Document, Error> {
        let value: Value = serde_yaml::from_str(text)?;
        Document::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Document, Error> {
        match value {
            Value::Mapping(m) => Ok(Document(m)),
            Value::Null => Ok(Document::default()),
            other => Err(Error::format(
                value_key_text(&other),
                "document root must be a mapping of typed identifiers",
            )),
        }
    }

    /// Merge another mapping's entries into this document (directory
    /// loading: later files win on key collisions, as with dict update).
    pub fn merge(&mut self, other: Mapping) {
        for (k, v) in other {
            self.0.insert(k, v);
        }
    }

    /// Drop top-level schema entries not in the given set. Used before a
    /// schema-restricted diff so the document side matches the trimmed
    /// catalog side.
    pub fn retain_schemas(&mut self, keep: &[String]) {
        self.0.retain(|k, _| {
            let Some(key) = k.as_str() else { return true };
            match Kind::parse_word(key) {
                Some((Kind::Schema, name)) => keep.iter().any(|s| s == name),
                _ => true,
            }
        });
    }

    /// Split into (kind, identifier remainder, body) triples, document
    /// order. An unrecognized top-level key word is fatal.
    pub fn split(&self) -> Result<Vec<(Kind, &str, &Value)>, Error> {
        let mut entries = Vec::with_capacity(self.0.len());
        for (k, v) in &self.0 {
            let key = k
                .as_str()
                .ok_or_else(|| Error::format(value_key_text(k), "document keys must be strings"))?;
            let (kind, rest) = Kind::parse_word(key)
                .filter(|(kind, _)| TOP_LEVEL.contains(kind))
                .ok_or_else(|| Error::format(key, "expected a typed object"))?;
            entries.push((kind, rest, v));
        }
        Ok(entries)
    }

    pub fn to_value(&self) -> Value {
        Value::Mapping(self.0.clone())
    }
}

fn value_key_text(v: &Value) -> String {
    serde_yaml::to_string(v)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_else(|_| "<unprintable>".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_accepts_known_top_level_kinds() {
        let doc = Document::parse(
            "schema public:\n  description: main\nextension plpgsql: {}\ncast (integer as text):\n  function: int4out(integer)\n",
        )
        .unwrap();
        let entries = doc.split().unwrap();
        let kinds: Vec<Kind> = entries.iter().map(|(k, _, _)| *k).collect();
        assert_eq!(kinds, [Kind::Schema, Kind::Extension, Kind::Cast]);
        assert_eq!(entries[0].1, "public");
    }

    #[test]
    fn split_rejects_unknown_top_level_word() {
        let doc = Document::parse("tablespace fast:\n  location: /x\n").unwrap();
        let err = doc.split().unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn split_rejects_nested_only_kinds_at_top_level() {
        let doc = Document::parse("table orders:\n  columns: []\n").unwrap();
        assert!(doc.split().is_err());
    }

    #[test]
    fn retain_schemas_drops_unselected() {
        let mut doc =
            Document::parse("schema public: {}\nschema audit: {}\nlanguage plpgsql: {}\n").unwrap();
        doc.retain_schemas(&["public".to_string()]);
        let entries = doc.split().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|(k, n, _)| *k == Kind::Schema && *n == "public"));
        assert!(entries.iter().all(|(k, n, _)| !(*k == Kind::Schema && *n == "audit")));
    }
}
