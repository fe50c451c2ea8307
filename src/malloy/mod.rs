//! Malloy emission: identifier escaping, expression builders, and the query
//! generator.

pub mod expr;
pub mod generator;
pub mod reserved;

pub use expr::{aggregate_expression, parse_format, percentage_expression, FormatPattern};
pub use generator::{GeneratedQuery, MalloyGenerator};
pub use reserved::escape_identifier;
