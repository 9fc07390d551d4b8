//! Error types for `shelf-core`.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Rejections raised while building a [`Schema`](crate::schema::Schema).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
  #[error("a schema needs at least one column")]
  Empty,

  #[error("duplicate column name: {0:?}")]
  DuplicateColumn(String),

  #[error("invalid column name: {0:?}")]
  InvalidName(String),
}

/// Which constraint a written value broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
  /// A required column was absent or empty.
  Required,
  /// Another record already holds this value in a unique column.
  Unique,
  /// A checksummed column failed the 13-digit check-digit test.
  ChecksumInvalid,
}

impl fmt::Display for ViolationReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let text = match self {
      Self::Required => "a value is required",
      Self::Unique => "value already exists in another record",
      Self::ChecksumInvalid => "not 13 digits with a valid check digit",
    };
    f.write_str(text)
  }
}

/// A write rejected by a column constraint. Nothing is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("constraint violation on column {column:?}: {reason}")]
pub struct ConstraintViolation {
  pub column: String,
  pub reason: ViolationReason,
}

impl ConstraintViolation {
  pub fn new(column: impl Into<String>, reason: ViolationReason) -> Self {
    Self { column: column.into(), reason }
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Schema(#[from] SchemaError),

  #[error(transparent)]
  Constraint(#[from] ConstraintViolation),

  #[error("unknown column: {0:?}")]
  UnknownColumn(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
