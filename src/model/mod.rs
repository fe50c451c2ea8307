//! Structural IR: the per-axis node tree and the table specification.

pub mod builder;
pub mod node;
pub mod spec;

pub use builder::build_table_spec;
pub use node::{AggregateNode, AxisNode, DimensionNode, PercentageNode, SiblingsNode, TotalNode};
pub use spec::{AggregateInfo, RowHeaderMode, TableOptions, TableSpec};
