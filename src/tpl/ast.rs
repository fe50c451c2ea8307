//! AST for a parsed TPL `TABLE` statement.
//!
//! The grammar front end is an external collaborator; this module defines the
//! strictly-typed tree it hands to the builder. A statement such as
//!
//! ```text
//! TABLE ROWS (state[-5] | ALL) * (gender | ALL) * births.(sum|mean) COLS year[-3];
//! ```
//!
//! arrives as a [`TableStatement`] whose axes are sequences of groups (joined
//! by `*`) of items (joined by `|`).

use serde::{Deserialize, Serialize};

/// Which axis a clause belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisKind {
    Row,
    Col,
}

/// A parsed `TABLE` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStatement {
    /// Named source to query (falls back to the compiler's default).
    pub source: Option<String>,
    /// Literal predicate understood by the host query language.
    pub where_clause: Option<String>,
    /// Raw `OPTIONS` entries; unrecognized keys are ignored downstream.
    pub options: Vec<(String, String)>,
    pub row_axis: AxisExpr,
    pub col_axis: Option<AxisExpr>,
    /// Which of `ROWS`/`COLS` appeared first in the source text.
    /// Determines limit priority between the axes.
    pub first_axis: AxisKind,
}

/// An axis expression: groups joined by `*` (nesting, left over right).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisExpr {
    pub groups: Vec<AxisGroup>,
}

/// One `*`-separated group: alternatives joined by `|`, with optional
/// group-level aggregations, format, and label annotations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisGroup {
    pub items: Vec<AxisItem>,
    /// Aggregations applied to every measure item in the group,
    /// as in `(births|deaths).(sum|mean)`.
    pub aggregations: Vec<AggregationSpec>,
    pub format: Option<String>,
    pub label: Option<String>,
}

/// One alternative within a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AxisItem {
    /// A grouping dimension, possibly limited or ordered: `state[-5]`.
    Dimension(DimensionRef),
    /// A measure bound to one or more aggregations: `births.(sum|mean)`.
    Binding(MeasureBinding),
    /// A bare measure reference; aggregation defaults to `sum`.
    Measure(String),
    /// A standalone aggregation with no measure: `count`, `n`.
    Aggregation(AggregationSpec),
    /// A percentage aggregate: `(births.sum ACROSS COLS)`.
    Percentage(PercentageRef),
    /// `ALL` — collapse the parent dimension into a subtotal.
    All { label: Option<String> },
    /// A parenthesized sub-axis: `(a * b | c)`.
    SubAxis(AxisExpr),
}

/// A dimension reference with its presentation and limiting clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRef {
    pub name: String,
    /// Custom label; the empty string suppresses the label entirely.
    pub label: Option<String>,
    pub limit: Option<LimitSpec>,
    pub order: Option<OrderSpec>,
}

impl DimensionRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            label: None,
            limit: None,
            order: None,
        }
    }
}

/// A measure (or measure group) bound to aggregations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureBinding {
    /// One entry for `births.sum`; several for `(births|deaths).sum`.
    pub measures: Vec<String>,
    pub aggregations: Vec<AggregationSpec>,
    pub format: Option<String>,
    pub label: Option<String>,
}

/// A single aggregation function with optional per-aggregation overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub function: String,
    pub format: Option<String>,
    pub label: Option<String>,
}

impl AggregationSpec {
    pub fn new(function: &str) -> Self {
        Self {
            function: function.into(),
            format: None,
            label: None,
        }
    }
}

/// A percentage aggregate: `100 × agg / all(agg, scope)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentageRef {
    pub measure: Option<String>,
    pub aggregation: String,
    pub scope: DenominatorScope,
    pub format: Option<String>,
    pub label: Option<String>,
}

/// Scope of a percentage denominator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenominatorScope {
    /// Percent of the grand total.
    All,
    /// Percent within the row: denominator keeps the column dimensions.
    Rows,
    /// Percent within the column: denominator keeps the row dimensions.
    Cols,
    /// Denominator keeps exactly the listed dimensions.
    Dimensions(Vec<String>),
}

/// A limit clause: `[-5]`, `[+3@name]`, `[-5@(births.sum ACROSS name)]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitSpec {
    pub count: u32,
    pub direction: SortDirection,
    pub order_by: Option<OrderBy>,
}

/// An ordering clause without a count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub direction: SortDirection,
    pub order_by: Option<OrderBy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// What a limit or order sorts by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderBy {
    /// A plain field name.
    Field(String),
    /// An aggregate expression, possibly crossing dimension scopes.
    Aggregate(OrderByAggregate),
    /// A ratio of two aggregates.
    Ratio {
        numerator: OrderByAggregate,
        denominator: OrderByAggregate,
    },
}

/// An aggregate inside an `orderBy`, as in `births.sum ACROSS name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByAggregate {
    pub field: String,
    pub function: String,
    /// Dimensions named after `ACROSS` — evaluated outside the current
    /// grouping scope.
    pub ungrouped_dimensions: Vec<String>,
}

impl OrderBy {
    /// The `ACROSS` dimensions buried in this clause, if any.
    pub fn ungrouped_dimensions(&self) -> Vec<String> {
        match self {
            OrderBy::Field(_) => Vec::new(),
            OrderBy::Aggregate(agg) => agg.ungrouped_dimensions.clone(),
            OrderBy::Ratio {
                numerator,
                denominator,
            } => {
                let mut dims = numerator.ungrouped_dimensions.clone();
                for d in &denominator.ungrouped_dimensions {
                    if !dims.contains(d) {
                        dims.push(d.clone());
                    }
                }
                dims
            }
        }
    }
}
