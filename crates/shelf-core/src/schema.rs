//! Runtime schema model: the data-driven column registry.
//!
//! A [`Schema`] is built once from caller-supplied [`ColumnDefinition`]s and
//! interpreted by storage backends at the storage boundary. Changing it means
//! a destructive rebuild; there are no migrations.

use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
  checksum,
  error::{ConstraintViolation, Error, Result, SchemaError, ViolationReason},
  record::{Fields, Value},
};

/// Name of the store-assigned identity column. Reserved.
pub const ID_COLUMN: &str = "record_id";

/// Suffix appended to a column name to form its derived-index shadow column.
pub const DERIVED_SUFFIX: &str = "_derived";

// ─── Declared types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeclaredType {
  #[serde(rename = "TEXT")]
  Text,
  #[serde(rename = "INTEGER")]
  Integer,
  #[serde(rename = "REAL")]
  Real,
  #[serde(rename = "BINARY")]
  Binary,
  /// Stored as text; must pass [`checksum::is_valid`].
  #[serde(rename = "CHECKSUMMED_13", alias = "EAN13")]
  Checksummed13,
}

impl DeclaredType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Text => "TEXT",
      Self::Integer => "INTEGER",
      Self::Real => "REAL",
      Self::Binary => "BINARY",
      Self::Checksummed13 => "CHECKSUMMED_13",
    }
  }

  /// The SQL column type used for physical storage.
  pub fn storage_type(self) -> &'static str {
    match self {
      Self::Text | Self::Checksummed13 => "TEXT",
      Self::Integer => "INTEGER",
      Self::Real => "REAL",
      Self::Binary => "BLOB",
    }
  }

  /// Map a physical SQL type back to a declared type. Used only when a
  /// catalog lacks an explicit type entry.
  pub fn from_storage(sql_type: &str) -> Self {
    let upper = sql_type.to_ascii_uppercase();
    match upper.as_str() {
      s if s.contains("INT") => Self::Integer,
      s if s.contains("REAL") || s.contains("FLOA") || s.contains("DOUB") => Self::Real,
      s if s.contains("BLOB") => Self::Binary,
      _ => Self::Text,
    }
  }

  pub fn is_textual(self) -> bool { matches!(self, Self::Text | Self::Checksummed13) }

  /// Coerce a written value towards this type, mirroring what the storage
  /// layer would keep. Values that cannot be coerced are returned unchanged.
  pub fn coerce(self, value: Value) -> Value {
    match (self, value) {
      (Self::Text | Self::Checksummed13, Value::Integer(n)) => Value::Text(n.to_string()),
      (Self::Text | Self::Checksummed13, Value::Real(n)) => Value::Text(n.to_string()),
      (Self::Checksummed13, Value::Text(s)) => Value::Text(s.trim().to_owned()),
      (Self::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
        Ok(n) => Value::Integer(n),
        Err(_) => Value::Text(s),
      },
      (Self::Real, Value::Text(s)) => match s.trim().parse::<f64>() {
        Ok(n) => Value::Real(n),
        Err(_) => Value::Text(s),
      },
      (Self::Real, Value::Integer(n)) => Value::Real(n as f64),
      (_, other) => other,
    }
  }
}

impl fmt::Display for DeclaredType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for DeclaredType {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "TEXT" => Ok(Self::Text),
      "INTEGER" => Ok(Self::Integer),
      "REAL" => Ok(Self::Real),
      "BINARY" | "BLOB" => Ok(Self::Binary),
      "CHECKSUMMED_13" | "EAN13" => Ok(Self::Checksummed13),
      other => Err(format!("unknown declared type: {other:?}")),
    }
  }
}

// ─── Column definitions ──────────────────────────────────────────────────────

fn default_true() -> bool { true }

/// One column of a runtime schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
  pub name:          String,
  /// Display label; defaults to `name`.
  #[serde(default)]
  pub label:         String,
  #[serde(rename = "type", default = "default_text")]
  pub declared_type: DeclaredType,
  #[serde(default)]
  pub required:      bool,
  #[serde(default)]
  pub unique:        bool,
  /// Opt into phonetic derived indexing. Only honoured for `TEXT` columns.
  #[serde(default = "default_true")]
  pub derived_index: bool,
}

fn default_text() -> DeclaredType { DeclaredType::Text }

impl ColumnDefinition {
  pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
    let name = name.into();
    Self {
      label: name.clone(),
      name,
      declared_type,
      required: false,
      unique: false,
      derived_index: declared_type == DeclaredType::Text,
    }
  }

  pub fn text(name: impl Into<String>) -> Self { Self::new(name, DeclaredType::Text) }

  pub fn label(mut self, label: impl Into<String>) -> Self {
    self.label = label.into();
    self
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn unique(mut self) -> Self {
    self.unique = true;
    self
  }

  pub fn derived_index(mut self, enabled: bool) -> Self {
    self.derived_index = enabled && self.declared_type == DeclaredType::Text;
    self
  }

  /// `true` if this column gets a shadow column once derived indexing is
  /// enabled.
  pub fn is_derived_eligible(&self) -> bool {
    self.derived_index && self.declared_type == DeclaredType::Text
  }

  pub fn shadow_name(&self) -> String { format!("{}{DERIVED_SUFFIX}", self.name) }

  fn normalize(mut self) -> Self {
    if self.label.trim().is_empty() {
      self.label = self.name.clone();
    }
    if self.declared_type != DeclaredType::Text {
      self.derived_index = false;
    }
    self
  }
}

/// Column name for a free-form key: spaces become underscores, letters are
/// lowercased.
pub fn column_name_for(key: &str) -> String { key.trim().replace(' ', "_").to_lowercase() }

fn is_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  match chars.next() {
    Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
    _ => return false,
  }
  chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Whether a write creates a record or patches an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
  Insert,
  Update,
}

/// A validated, non-empty list of uniquely named columns in definition order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema {
  columns: Vec<ColumnDefinition>,
}

impl Schema {
  /// Validate and normalise a column list.
  pub fn new(columns: Vec<ColumnDefinition>) -> Result<Self, SchemaError> {
    if columns.is_empty() {
      return Err(SchemaError::Empty);
    }

    let mut seen = HashSet::new();
    for col in &columns {
      if !is_identifier(&col.name)
        || col.name.eq_ignore_ascii_case(ID_COLUMN)
        || col.name.ends_with(DERIVED_SUFFIX)
      {
        return Err(SchemaError::InvalidName(col.name.clone()));
      }
      // SQLite identifiers are case-insensitive.
      if !seen.insert(col.name.to_ascii_lowercase()) {
        return Err(SchemaError::DuplicateColumn(col.name.clone()));
      }
    }

    Ok(Self { columns: columns.into_iter().map(ColumnDefinition::normalize).collect() })
  }

  /// Parse a JSON array of column definitions, as stored by a tenant
  /// catalog.
  pub fn from_json(raw: &str) -> Result<Self> {
    let columns: Vec<ColumnDefinition> = serde_json::from_str(raw)?;
    Ok(Self::new(columns)?)
  }

  /// Guess a schema from sample rows, as when importing data into a new
  /// store.
  ///
  /// Columns appear in first-seen order. Each key becomes a column named by
  /// [`column_name_for`] and labelled with the key itself. A column is
  /// `INTEGER` if every non-null sample is an integer, `REAL` if every one is
  /// numeric, and `TEXT` otherwise.
  pub fn infer(sample: &[Fields]) -> Result<Self, SchemaError> {
    let mut columns: Vec<(ColumnDefinition, Option<DeclaredType>)> = Vec::new();

    for row in sample {
      for (key, value) in row {
        let name = column_name_for(key);
        let slot = match columns.iter().position(|(c, _)| c.name == name) {
          Some(i) => i,
          None => {
            columns.push((ColumnDefinition::text(&name).label(key.as_str()), None));
            columns.len() - 1
          }
        };
        let seen = &mut columns[slot].1;
        *seen = match (*seen, value) {
          (seen, Value::Null) => seen,
          (None | Some(DeclaredType::Integer), Value::Integer(_)) => Some(DeclaredType::Integer),
          (
            None | Some(DeclaredType::Integer | DeclaredType::Real),
            Value::Integer(_) | Value::Real(_),
          ) => Some(DeclaredType::Real),
          _ => Some(DeclaredType::Text),
        };
      }
    }

    Self::new(
      columns
        .into_iter()
        .map(|(col, seen)| match seen {
          Some(ty) if ty != DeclaredType::Text => {
            ColumnDefinition::new(col.name, ty).label(col.label)
          }
          _ => col,
        })
        .collect(),
    )
  }

  pub fn columns(&self) -> &[ColumnDefinition] { &self.columns }

  pub fn into_columns(self) -> Vec<ColumnDefinition> { self.columns }

  pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
    self.columns.iter().find(|c| c.name == name)
  }

  /// Columns that get a shadow column under derived indexing.
  pub fn derived_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
    self.columns.iter().filter(|c| c.is_derived_eligible())
  }

  pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
    self.columns.iter().filter(|c| c.unique)
  }

  /// Coerce `fields` to the declared column types and check the constraints
  /// that need no stored state: unknown columns, `required` and checksums.
  ///
  /// On insert every required column must be present and non-empty; on
  /// update only the written fields are checked. Uniqueness is checked by the
  /// storage backend against stored state.
  pub fn prepare_write(&self, fields: Fields, mode: WriteMode) -> Result<Fields> {
    if let Some(unknown) = fields.keys().find(|k| self.column(k).is_none()) {
      return Err(Error::UnknownColumn(unknown.clone()));
    }

    let fields: Fields = fields
      .into_iter()
      .map(|(name, value)| {
        let value = match self.column(&name) {
          Some(col) => col.declared_type.coerce(value),
          None => value,
        };
        (name, value)
      })
      .collect();

    for col in &self.columns {
      let value = fields.get(&col.name);

      if col.required {
        let missing = match (mode, value) {
          (_, Some(v)) => v.is_empty(),
          (WriteMode::Insert, None) => true,
          (WriteMode::Update, None) => false,
        };
        if missing {
          return Err(ConstraintViolation::new(&col.name, ViolationReason::Required).into());
        }
      }

      if col.declared_type == DeclaredType::Checksummed13
        && let Some(v) = value
        && !v.is_empty()
      {
        let valid = v.as_text().is_some_and(checksum::is_valid);
        if !valid {
          return Err(
            ConstraintViolation::new(&col.name, ViolationReason::ChecksumInvalid).into(),
          );
        }
      }
    }

    Ok(fields)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::fields;

  fn inventory() -> Schema {
    Schema::new(vec![
      ColumnDefinition::text("sku").unique().required(),
      ColumnDefinition::new("qty", DeclaredType::Integer),
      ColumnDefinition::new("barcode", DeclaredType::Checksummed13),
      ColumnDefinition::text("name").label("Product name"),
    ])
    .unwrap()
  }

  #[test]
  fn rejects_empty_and_duplicates() {
    assert_eq!(Schema::new(vec![]), Err(SchemaError::Empty));
    assert_eq!(
      Schema::new(vec![ColumnDefinition::text("a"), ColumnDefinition::text("A")]),
      Err(SchemaError::DuplicateColumn("A".into()))
    );
  }

  #[test]
  fn rejects_reserved_and_malformed_names() {
    for bad in ["", "1abc", "has space", "record_id", "name_derived", "semi;colon"] {
      assert_eq!(
        Schema::new(vec![ColumnDefinition::text(bad)]),
        Err(SchemaError::InvalidName(bad.into())),
        "{bad:?}"
      );
    }
  }

  #[test]
  fn derived_index_only_for_text() {
    let schema = inventory();
    let eligible: Vec<_> = schema.derived_columns().map(|c| c.name.as_str()).collect();
    assert_eq!(eligible, ["sku", "name"]);

    let col = ColumnDefinition::new("n", DeclaredType::Integer).derived_index(true);
    assert!(!col.is_derived_eligible());
  }

  #[test]
  fn deserialises_with_defaults() {
    let schema = Schema::from_json(
      r#"[{"name":"sku","unique":true},{"name":"code","type":"EAN13","label":"Code"}]"#,
    )
    .unwrap();
    let sku = schema.column("sku").unwrap();
    assert_eq!(sku.label, "sku");
    assert_eq!(sku.declared_type, DeclaredType::Text);
    assert!(sku.derived_index);
    let code = schema.column("code").unwrap();
    assert_eq!(code.declared_type, DeclaredType::Checksummed13);
    assert!(!code.derived_index);
  }

  #[test]
  fn insert_requires_required_columns() {
    let err = inventory()
      .prepare_write(fields([("qty", Value::Integer(1))]), WriteMode::Insert)
      .unwrap_err();
    assert!(matches!(
      err,
      Error::Constraint(ConstraintViolation { ref column, reason: ViolationReason::Required })
        if column == "sku"
    ));
  }

  #[test]
  fn update_checks_only_written_fields() {
    let schema = inventory();
    assert!(schema.prepare_write(fields([("qty", 3i64)]), WriteMode::Update).is_ok());
    let err = schema
      .prepare_write(fields([("sku", "  ")]), WriteMode::Update)
      .unwrap_err();
    assert!(matches!(err, Error::Constraint(v) if v.reason == ViolationReason::Required));
  }

  #[test]
  fn checksum_is_enforced() {
    let schema = inventory();
    let bad = fields([("sku", "A1"), ("barcode", "4006381333932")]);
    let err = schema.prepare_write(bad, WriteMode::Insert).unwrap_err();
    assert!(matches!(err, Error::Constraint(v) if v.reason == ViolationReason::ChecksumInvalid));

    let good = fields([("sku", "A1"), ("barcode", "4006381333931")]);
    assert!(schema.prepare_write(good, WriteMode::Insert).is_ok());

    let blank = fields([("sku", "A1"), ("barcode", "")]);
    assert!(schema.prepare_write(blank, WriteMode::Insert).is_ok());
  }

  #[test]
  fn numeric_barcode_is_coerced_then_checked() {
    let written = fields([
      ("sku", Value::from("A1")),
      ("barcode", Value::Integer(4006381333931)),
    ]);
    let prepared = inventory().prepare_write(written, WriteMode::Insert).unwrap();
    assert_eq!(prepared["barcode"], Value::from("4006381333931"));
  }

  #[test]
  fn padded_barcode_is_stored_trimmed() {
    let written = fields([("sku", "A1"), ("barcode", " 4006381333931 ")]);
    let prepared = inventory().prepare_write(written, WriteMode::Insert).unwrap();
    assert_eq!(prepared["barcode"], Value::from("4006381333931"));
  }

  #[test]
  fn infers_columns_from_sample_rows() {
    let sample = vec![
      fields([
        ("Item Name", Value::from("茶杯")),
        ("Qty", Value::Integer(3)),
        ("Price", Value::Integer(12)),
      ]),
      fields([
        ("Item Name", Value::from("Saucer")),
        ("Qty", Value::Null),
        ("Price", Value::Real(4.5)),
        ("Note", Value::Integer(1)),
      ]),
      fields([("Note", Value::from("fragile"))]),
    ];

    let schema = Schema::infer(&sample).unwrap();
    let summary: Vec<_> = schema
      .columns()
      .iter()
      .map(|c| (c.name.as_str(), c.label.as_str(), c.declared_type))
      .collect();
    assert_eq!(summary, [
      ("item_name", "Item Name", DeclaredType::Text),
      ("price", "Price", DeclaredType::Real),
      ("qty", "Qty", DeclaredType::Integer),
      ("note", "Note", DeclaredType::Text),
    ]);
    assert!(schema.column("item_name").unwrap().derived_index);
    assert!(!schema.column("qty").unwrap().derived_index);
  }

  #[test]
  fn inference_needs_usable_keys() {
    assert_eq!(Schema::infer(&[]), Err(SchemaError::Empty));
    assert_eq!(
      Schema::infer(&[fields([("数量", 1i64)])]),
      Err(SchemaError::InvalidName("数量".into()))
    );

    // Keys that normalise to the same name share one column.
    let merged = Schema::infer(&[fields([("Name", "a"), ("name", "b")])]).unwrap();
    assert_eq!(merged.columns().len(), 1);
    assert_eq!(merged.columns()[0].label, "Name");
  }

  #[test]
  fn coerces_towards_declared_type() {
    let prepared = inventory()
      .prepare_write(
        fields([("sku", Value::Integer(42)), ("qty", Value::from(" 7 "))]),
        WriteMode::Insert,
      )
      .unwrap();
    assert_eq!(prepared["sku"], Value::from("42"));
    assert_eq!(prepared["qty"], Value::Integer(7));
  }

  #[test]
  fn unknown_columns_are_rejected() {
    let err = inventory()
      .prepare_write(fields([("sku", "A1"), ("sku_derived", "x")]), WriteMode::Insert)
      .unwrap_err();
    assert!(matches!(err, Error::UnknownColumn(c) if c == "sku_derived"));
  }
}
