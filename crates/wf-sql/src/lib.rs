//! wf-sql - SQL validation layer for Wrenflow
//!
//! Wraps sqlparser behind a small dialect abstraction so compiled SQL can
//! be rejected before it ever reaches the warehouse. A compiled resource
//! that does not parse is a structural failure, not an execution error.

pub mod dialect;
pub mod error;
pub mod validator;

pub use dialect::{parse_sql, SqlDialect};
pub use error::{SqlError, SqlResult};
pub use validator::validate_model_sql;
