//! Front-end contract: the parsed TPL AST and tree paths.

pub mod ast;
pub mod path;

pub use ast::{
    AggregationSpec, AxisExpr, AxisGroup, AxisItem, AxisKind, DenominatorScope, DimensionRef,
    LimitSpec, MeasureBinding, OrderBy, OrderByAggregate, OrderSpec, PercentageRef, SortDirection,
    TableStatement,
};
pub use path::{path_key, PathSegment, TreePath};
