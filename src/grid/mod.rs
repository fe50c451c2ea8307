//! Grid assembly: indexes executor rowsets under axis-independent cell keys
//! and derives the nested header hierarchies.

pub mod headers;
pub mod index;
pub mod normalize;

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::dimension::DimensionOrderingProvider;
use crate::error::{CompileError, CompileResult};
use crate::malloy::expr::parse_format;
use crate::malloy::generator::GeneratedQuery;
use crate::model::builder::RAW_PERCENT;
use crate::model::spec::{AggregateInfo, RowHeaderMode, TableOptions, TableSpec};
use crate::tpl::path::TreePath;

// ============================================================================
// Header and cell types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderKind {
    Dimension,
    Total,
    SiblingLabel,
}

/// One header cell in a row or column hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeaderNode {
    pub kind: HeaderKind,
    /// Display value.
    pub value: String,
    pub label: Option<String>,
    /// Number of leaf positions this header spans.
    pub span: usize,
    pub depth: usize,
    pub children: Vec<HeaderNode>,
    pub path: TreePath,
}

/// One resolved cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellValue {
    pub raw: Option<f64>,
    pub formatted: String,
    pub aggregate: String,
    pub path_description: String,
}

/// Corner label for one row nesting level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CornerLabel {
    pub dimension: String,
    pub label: String,
}

/// The renderable description of a pivoted report.
#[derive(Debug)]
pub struct GridSpec {
    pub row_headers: Vec<HeaderNode>,
    pub col_headers: Vec<HeaderNode>,
    pub aggregates: Vec<AggregateInfo>,
    pub has_row_total: bool,
    pub has_col_total: bool,
    pub options: TableOptions,
    /// Row dimension labels render in the corner; false falls back to a
    /// left-hand label column.
    pub use_corner_row_headers: bool,
    pub corner_row_labels: Option<Vec<CornerLabel>>,
    /// One entry per row-header column depth in left mode.
    pub left_mode_row_labels: Option<Vec<String>>,
    cells: index::CellIndex,
}

impl GridSpec {
    /// Look up one cell by its row and column dimension values. The key is
    /// axis-independent: which axis a dimension lives on does not matter.
    pub fn get_cell(
        &self,
        row_values: &[(String, String)],
        col_values: &[(String, String)],
        aggregate: Option<&str>,
    ) -> CellValue {
        let mut pairs: Vec<(String, String)> = row_values.to_vec();
        pairs.extend(col_values.iter().cloned());
        let key = index::cell_key(&pairs);

        let info = match aggregate {
            Some(name) => self.aggregates.iter().find(|a| a.name == name),
            None => self.aggregates.first(),
        };
        let Some(info) = info else {
            return CellValue {
                raw: None,
                formatted: String::new(),
                aggregate: aggregate.unwrap_or("").to_string(),
                path_description: describe(&pairs, aggregate.unwrap_or("")),
            };
        };

        let raw = self.cells.get(&key, &info.name).flatten();
        CellValue {
            raw,
            formatted: format_cell(raw, info.format.as_deref()),
            aggregate: info.name.clone(),
            path_description: describe(&pairs, &info.name),
        }
    }
}

fn describe(pairs: &[(String, String)], aggregate: &str) -> String {
    let mut parts: Vec<String> = pairs.iter().map(|(n, v)| format!("{n}={v}")).collect();
    if !aggregate.is_empty() {
        parts.push(aggregate.to_string());
    }
    parts.join(", ")
}

/// Render a cell value through its format pattern; numbers without a pattern
/// get up to two fractional digits with trailing zeros trimmed.
pub fn format_cell(raw: Option<f64>, format: Option<&str>) -> String {
    let Some(value) = raw else {
        return String::new();
    };
    match format {
        Some(RAW_PERCENT) => format!("{value:.1}%"),
        Some(pattern) => {
            let parsed = parse_format(pattern);
            let number = match parsed.precision {
                Some(precision) => format!("{value:.p$}", p = precision as usize),
                None => default_number(value),
            };
            format!("{}{}{}", parsed.prefix, number, parsed.suffix)
        }
        None => default_number(value),
    }
}

fn default_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let rounded = format!("{value:.2}");
        rounded
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builds a [`GridSpec`] from a query set and its result rowsets. Holds the
/// compilation's ordering provider for the duration of one build.
pub struct GridBuilder<'a> {
    spec: &'a TableSpec,
    ordering: &'a dyn DimensionOrderingProvider,
}

impl<'a> GridBuilder<'a> {
    pub fn new(spec: &'a TableSpec, ordering: &'a dyn DimensionOrderingProvider) -> Self {
        Self { spec, ordering }
    }

    pub fn build(
        &self,
        queries: &[GeneratedQuery],
        results: &HashMap<String, Vec<Value>>,
    ) -> CompileResult<GridSpec> {
        let mut cells = index::CellIndex::default();
        for query in queries {
            let rows = results.get(&query.id).ok_or_else(|| {
                CompileError::Internal(format!("no result rows for query '{}'", query.id))
            })?;
            cells.index_query(query, rows, &self.spec.aggregates);
        }
        debug!(cells = cells.len(), "cell index built");

        let row_headers = headers::build_axis_headers(
            &self.spec.row_axis,
            &cells,
            self.ordering,
            &self.spec.aggregates,
        );
        let col_headers = match &self.spec.col_axis {
            Some(col) => {
                headers::build_axis_headers(col, &cells, self.ordering, &self.spec.aggregates)
            }
            None => Vec::new(),
        };

        let use_corner = self.spec.options.row_headers != RowHeaderMode::Left
            && !self.spec.row_axis.has_true_siblings();
        let corner_row_labels = use_corner.then(|| headers::corner_labels(&self.spec.row_axis));
        let left_mode_row_labels =
            (!use_corner).then(|| headers::left_mode_labels(&row_headers));

        Ok(GridSpec {
            row_headers,
            col_headers,
            aggregates: self.spec.aggregates.clone(),
            has_row_total: self.spec.row_axis.has_total(),
            has_col_total: self
                .spec
                .col_axis
                .as_ref()
                .is_some_and(crate::model::node::AxisNode::has_total),
            options: self.spec.options,
            use_corner_row_headers: use_corner,
            corner_row_labels,
            left_mode_row_labels,
            cells,
        })
    }
}
