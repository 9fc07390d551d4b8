//! Records and the scalar values they hold.
//!
//! A record is an ordered mapping from column name to [`Value`], in schema
//! definition order, tagged with the store-assigned [`RecordId`].

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize, ser::SerializeMap};

// ─── Identity ────────────────────────────────────────────────────────────────

/// Store-assigned record identity. Never reused for another record within
/// the lifetime of a record table.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// A single scalar cell.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  #[default]
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
  Binary(Vec<u8>),
}

impl Value {
  /// `Null`, blank text and zero-length binary count as empty for the
  /// `required` constraint.
  pub fn is_empty(&self) -> bool {
    match self {
      Self::Null => true,
      Self::Text(s) => s.trim().is_empty(),
      Self::Binary(b) => b.is_empty(),
      Self::Integer(_) | Self::Real(_) => false,
    }
  }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<i64> for Value {
  fn from(n: i64) -> Self { Self::Integer(n) }
}

impl From<f64> for Value {
  fn from(n: f64) -> Self { Self::Real(n) }
}

impl From<Vec<u8>> for Value {
  fn from(b: Vec<u8>) -> Self { Self::Binary(b) }
}

/// Field values supplied to `insert`/`update`, keyed by column name.
pub type Fields = BTreeMap<String, Value>;

/// Build a [`Fields`] map from `(name, value)` pairs.
pub fn fields<I, K, V>(pairs: I) -> Fields
where
  I: IntoIterator<Item = (K, V)>,
  K: Into<String>,
  V: Into<Value>,
{
  pairs
    .into_iter()
    .map(|(k, v)| (k.into(), v.into()))
    .collect()
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// A stored record. `values` follows schema definition order, which export
/// writers rely on for column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
  pub id:     RecordId,
  pub values: Vec<(String, Value)>,
}

impl Record {
  /// Look up a column's value by name.
  pub fn get(&self, column: &str) -> Option<&Value> {
    self
      .values
      .iter()
      .find(|(name, _)| name == column)
      .map(|(_, v)| v)
  }

  /// Iterate over the text values of this record.
  pub fn text_values(&self) -> impl Iterator<Item = &str> {
    self.values.iter().filter_map(|(_, v)| v.as_text())
  }
}

impl Serialize for Record {
  /// Serialises as a flat object: `record_id` first, then every column in
  /// schema order.
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
    map.serialize_entry("record_id", &self.id)?;
    for (name, value) in &self.values {
      map.serialize_entry(name, value)?;
    }
    map.end()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn emptiness() {
    assert!(Value::Null.is_empty());
    assert!(Value::from("   ").is_empty());
    assert!(Value::Binary(vec![]).is_empty());
    assert!(!Value::Integer(0).is_empty());
    assert!(!Value::from("x").is_empty());
  }

  #[test]
  fn untagged_json_values() {
    let parsed: Fields =
      serde_json::from_str(r#"{"a":"x","b":5,"c":1.5,"d":null}"#).unwrap();
    assert_eq!(parsed["a"], Value::from("x"));
    assert_eq!(parsed["b"], Value::Integer(5));
    assert_eq!(parsed["c"], Value::Real(1.5));
    assert_eq!(parsed["d"], Value::Null);
  }

  #[test]
  fn record_serialises_in_schema_order() {
    let record = Record {
      id:     RecordId(7),
      values: vec![
        ("zeta".into(), Value::from("z")),
        ("alpha".into(), Value::Integer(1)),
      ],
    };
    let json = serde_json::to_string(&record).unwrap();
    assert_eq!(json, r#"{"record_id":7,"zeta":"z","alpha":1}"#);
  }
}
