//! The table specification: both axis trees plus everything global.

use serde::{Deserialize, Serialize};

use crate::model::node::AxisNode;
use crate::tpl::{AxisKind, DenominatorScope};

/// Presentation of row dimension labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowHeaderMode {
    /// Labels in the corner above the row headers.
    #[default]
    Above,
    /// Labels in a column to the left.
    Left,
}

/// Recognized `OPTIONS` entries. Unrecognized options are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableOptions {
    pub row_headers: RowHeaderMode,
    /// When false (the default), NULLs in every grouping dimension are
    /// excluded.
    pub include_nulls: bool,
}

/// One aggregate in the global, deduplicated aggregate set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateInfo {
    /// Generated id: `<measure>_<function>`, with `_pct` for percentages.
    /// Used as the output column in the HQL and the cell-index key.
    pub name: String,
    pub measure: Option<String>,
    pub function: String,
    pub format: Option<String>,
    pub label: Option<String>,
    /// Present for percentage aggregates.
    pub percentage: Option<DenominatorScope>,
}

impl AggregateInfo {
    /// Generated aggregate id for a plain aggregate.
    pub fn id(measure: Option<&str>, function: &str) -> String {
        match measure {
            Some(m) => format!("{m}_{function}"),
            None => function.to_string(),
        }
    }

    /// Generated aggregate id for a percentage aggregate.
    pub fn percentage_id(measure: Option<&str>, function: &str) -> String {
        format!("{}_pct", Self::id(measure, function))
    }

    pub fn is_percentage(&self) -> bool {
        self.percentage.is_some()
    }

    /// Display label: custom label, else `<measure> <function>`.
    pub fn display_label(&self) -> String {
        if let Some(label) = &self.label {
            if !label.is_empty() {
                return label.clone();
            }
        }
        match &self.measure {
            Some(m) => format!("{m} {}", self.function),
            None => self.function.clone(),
        }
    }
}

/// The canonical structural description of one `TABLE` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub source: Option<String>,
    /// User WHERE combined with the synthesized NULL-exclusion filter.
    pub where_clause: Option<String>,
    pub options: TableOptions,
    pub row_axis: AxisNode,
    pub col_axis: Option<AxisNode>,
    /// Deduplicated union of aggregates from both axes; defaults to a single
    /// row-count aggregate when empty.
    pub aggregates: Vec<AggregateInfo>,
    /// Which axis appeared first in the source; determines limit priority.
    pub first_axis: AxisKind,
}

impl TableSpec {
    /// Dimension names of the row axis, in tree order.
    pub fn row_dimensions(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.row_axis.dimension_names(&mut names);
        names
    }

    /// Dimension names of the column axis, in tree order.
    pub fn col_dimensions(&self) -> Vec<String> {
        let mut names = Vec::new();
        if let Some(col) = &self.col_axis {
            col.dimension_names(&mut names);
        }
        names
    }

    /// All grouping dimensions in the statement, rows first.
    pub fn all_dimensions(&self) -> Vec<String> {
        let mut names = self.row_dimensions();
        for name in self.col_dimensions() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// True when any percentage aggregate forces the flat template: with a
    /// column axis that groups dimensions, `all(...)` cannot see across nest
    /// scopes, so every dimension must share one `group_by`.
    pub fn requires_flat(&self) -> bool {
        self.aggregates.iter().any(AggregateInfo::is_percentage)
            && !self.col_dimensions().is_empty()
    }
}
