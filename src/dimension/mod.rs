//! User-provided dimension definitions: parsing, SQL translation, and
//! definition-order companions.

pub mod defs;
pub mod ordering;

pub use defs::{parse_dimension, BucketBranch, DimensionDefinition, ParsedDimension};
pub use ordering::{AutoOrderDimension, DimensionCatalog, DimensionOrderingProvider};
