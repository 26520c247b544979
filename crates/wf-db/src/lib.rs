//! wf-db - Warehouse abstraction layer for Wrenflow
//!
//! This crate provides the `Warehouse` trait the scheduler's run-callbacks
//! execute against, and the DuckDB implementation. Connection and retry
//! policy are entirely the adapter's concern; the scheduler only ever sees
//! per-call `DbResult`s.

pub mod duckdb;
pub mod error;
pub mod traits;

pub use duckdb::DuckDbWarehouse;
pub use error::{DbError, DbResult};
pub use traits::{CsvLoadOptions, Warehouse};
