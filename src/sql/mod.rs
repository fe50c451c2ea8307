//! SQL dialect definitions for the derived-source rewrite.

mod dialect;

pub use dialect::{Dialect, SqlDialect};
