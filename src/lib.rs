//! # crosstab
//!
//! Compiles the TPL cross-tabulation language to Malloy queries and
//! assembles the executed results into a pivoted grid.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            TPL statement (parsed AST)                    │
//! │  TABLE ROWS (state[-5] | ALL) * births.sum COLS year;    │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [percentile rewrite]
//! ┌─────────────────────────────────────────────────────────┐
//! │      Rewritten AST + derived-source SQL (optional)       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │           TableSpec (axis trees, aggregates)             │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [planner: dedup + merge]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     QueryPlan                            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [generator]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Malloy query set                         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [executor (external)] [grid builder]
//! ┌─────────────────────────────────────────────────────────┐
//! │          GridSpec (headers + cell lookup)                │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The grammar front end, the Malloy engine, and the HTML renderer are
//! external collaborators; their contracts live in [`compile`].

pub mod compile;
pub mod dimension;
pub mod error;
pub mod grid;
pub mod malloy;
pub mod model;
pub mod percentile;
pub mod planner;
pub mod sql;
pub mod tpl;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::compile::{
        CompiledTable, Compiler, CompilerOptions, ExecutionRequest, QueryExecutor,
        StatementParser,
    };
    pub use crate::dimension::{DimensionDefinition, DimensionOrderingProvider};
    pub use crate::error::{CompileError, CompileResult};
    pub use crate::grid::{CellValue, GridSpec, HeaderKind, HeaderNode};
    pub use crate::malloy::generator::GeneratedQuery;
    pub use crate::model::spec::{TableOptions, TableSpec};
    pub use crate::sql::Dialect;
    pub use crate::tpl::{AxisKind, TableStatement};
}

// Also export the workhorse types at the crate root.
pub use compile::{CompiledTable, Compiler, CompilerOptions};
pub use error::{CompileError, CompileResult};
pub use grid::GridSpec;
pub use sql::Dialect;
