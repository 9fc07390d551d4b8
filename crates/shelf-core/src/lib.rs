//! Core types and trait definitions for the Shelf record store.
//!
//! This crate is deliberately free of database dependencies. It owns the
//! runtime schema model, value coercion and validation, phonetic keys, the
//! search heuristics and the backup naming and retention policy. Storage
//! backends (e.g. `shelf-store-sqlite`) implement the traits in [`store`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod backup;
pub mod checksum;
pub mod error;
pub mod phonetic;
pub mod record;
pub mod schema;
pub mod search;
pub mod store;
pub mod tenant;

pub use error::{ConstraintViolation, Error, Result, SchemaError, ViolationReason};
