//! Percentile rewrite: window-function derived source plus the `.min` trick.
//!
//! Percentile methods have no native Malloy support, so statements that use
//! them are rewritten before any other compilation stage:
//!
//! 1. A derived source pre-computes each percentile as a column via
//!    `quantile_cont(...) OVER (PARTITION BY ...)`, once per partition level.
//! 2. The statement is rewritten to reference those columns through a `.min`
//!    aggregation (every row in a group carries the same value, so `.min`
//!    reads it back out).
//! 3. After Malloy generation, references at an outer (ALL) aggregate are
//!    redirected to the column of the matching reduced partition level.

use std::collections::BTreeSet;

use crate::dimension::DimensionCatalog;
use crate::error::CompileResult;
use crate::sql::{Dialect, SqlDialect};
use crate::tpl::{
    AggregationSpec, AxisExpr, AxisGroup, AxisItem, MeasureBinding, TableStatement,
};

/// Percentile methods recognized in aggregation position.
pub const PERCENTILE_METHODS: [&str; 7] = ["p25", "p50", "p75", "p90", "p95", "p99", "median"];

pub fn is_percentile_method(function: &str) -> bool {
    PERCENTILE_METHODS.contains(&function)
}

fn quantile_of(method: &str) -> f64 {
    match method {
        "p25" => 0.25,
        "p50" | "median" => 0.5,
        "p75" => 0.75,
        "p90" => 0.9,
        "p95" => 0.95,
        "p99" => 0.99,
        other => unreachable!("not a percentile method: {other}"),
    }
}

/// One `(measure, method)` pair used in the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PercentilePair {
    pub measure: String,
    pub method: String,
}

/// A dimension subset to `PARTITION BY`: the full set for cells without ALL,
/// a reduced set per ALL sibling group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionLevel {
    /// Sorted dimension names; empty for the global level.
    pub dimensions: Vec<String>,
}

/// The 2D matrix of (pair × level) percentile columns and its derived SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct PercentilePlan {
    pub pairs: Vec<PercentilePair>,
    /// Full level first.
    pub levels: Vec<PartitionLevel>,
    pub derived_sql: String,
}

/// Derived column name: `__<measure>_<method><suffix>` where the suffix
/// joins the sorted level dimensions, empty for the global level.
pub fn column_name(measure: &str, method: &str, level: &[String]) -> String {
    if level.is_empty() {
        format!("__{measure}_{method}")
    } else {
        format!("__{measure}_{method}__{}", level.join("_"))
    }
}

fn method_label(measure: &str, method: &str) -> String {
    format!("{measure} {}", method.to_uppercase())
}

// ============================================================================
// Detection and planning
// ============================================================================

/// True when the statement uses any percentile aggregation.
pub fn uses_percentiles(stmt: &TableStatement) -> bool {
    !collect_pairs(stmt).is_empty()
}

/// Build the rewrite plan, or None when no percentiles are used.
pub fn build_plan(
    stmt: &TableStatement,
    table: &str,
    user_where: Option<&str>,
    catalog: &DimensionCatalog,
    dialect: Dialect,
) -> CompileResult<Option<PercentilePlan>> {
    let pairs = collect_pairs(stmt);
    if pairs.is_empty() {
        return Ok(None);
    }

    let all_dims = statement_dimensions(stmt);
    let mut levels = vec![PartitionLevel {
        dimensions: sorted(&all_dims),
    }];
    for collapsed in collapsed_groups(stmt) {
        let remaining: Vec<String> = all_dims
            .iter()
            .filter(|d| !collapsed.contains(*d))
            .cloned()
            .collect();
        let level = PartitionLevel {
            dimensions: sorted(&remaining),
        };
        if !levels.contains(&level) {
            levels.push(level);
        }
    }

    let derived_sql = derived_source_sql(&pairs, &levels, table, user_where, catalog, dialect);
    Ok(Some(PercentilePlan {
        pairs,
        levels,
        derived_sql,
    }))
}

fn sorted(dims: &[String]) -> Vec<String> {
    let set: BTreeSet<&String> = dims.iter().collect();
    set.into_iter().cloned().collect()
}

fn derived_source_sql(
    pairs: &[PercentilePair],
    levels: &[PartitionLevel],
    table: &str,
    user_where: Option<&str>,
    catalog: &DimensionCatalog,
    dialect: Dialect,
) -> String {
    let mut columns = Vec::new();
    for pair in pairs {
        for level in levels {
            let partition: Vec<String> = level
                .dimensions
                .iter()
                .map(|d| match catalog.get(d) {
                    Some(parsed) => parsed.sql_expression.clone(),
                    None => dialect.quote_identifier(d),
                })
                .collect();
            let window =
                dialect.percentile_over(&pair.measure, quantile_of(&pair.method), &partition);
            let alias =
                dialect.quote_identifier(&column_name(&pair.measure, &pair.method, &level.dimensions));
            columns.push(format!("{window} AS {alias}"));
        }
    }

    let mut sql = format!("SELECT *, {} FROM {table}", columns.join(", "));
    if let Some(w) = user_where {
        sql.push_str(&format!(" WHERE {w}"));
    }
    sql
}

fn collect_pairs(stmt: &TableStatement) -> Vec<PercentilePair> {
    let mut pairs = Vec::new();
    collect_axis_pairs(&stmt.row_axis, &mut pairs);
    if let Some(col) = &stmt.col_axis {
        collect_axis_pairs(col, &mut pairs);
    }
    pairs
}

fn collect_axis_pairs(axis: &AxisExpr, out: &mut Vec<PercentilePair>) {
    for group in &axis.groups {
        for item in &group.items {
            match item {
                AxisItem::Binding(binding) => {
                    for measure in &binding.measures {
                        for agg in &binding.aggregations {
                            push_pair(out, measure, &agg.function);
                        }
                    }
                }
                AxisItem::Measure(measure) => {
                    for agg in &group.aggregations {
                        push_pair(out, measure, &agg.function);
                    }
                }
                AxisItem::SubAxis(sub) => collect_axis_pairs(sub, out),
                _ => {}
            }
        }
    }
}

fn push_pair(out: &mut Vec<PercentilePair>, measure: &str, function: &str) {
    if !is_percentile_method(function) {
        return;
    }
    let pair = PercentilePair {
        measure: measure.to_string(),
        method: function.to_string(),
    };
    if !out.contains(&pair) {
        out.push(pair);
    }
}

/// All grouping dimensions of the statement, in appearance order.
fn statement_dimensions(stmt: &TableStatement) -> Vec<String> {
    let mut dims = Vec::new();
    collect_axis_dimensions(&stmt.row_axis, &mut dims);
    if let Some(col) = &stmt.col_axis {
        collect_axis_dimensions(col, &mut dims);
    }
    dims
}

fn collect_axis_dimensions(axis: &AxisExpr, out: &mut Vec<String>) {
    for group in &axis.groups {
        for item in &group.items {
            collect_item_dimensions(item, out);
        }
    }
}

fn collect_item_dimensions(item: &AxisItem, out: &mut Vec<String>) {
    match item {
        AxisItem::Dimension(dref) => {
            if !out.contains(&dref.name) {
                out.push(dref.name.clone());
            }
        }
        AxisItem::SubAxis(sub) => collect_axis_dimensions(sub, out),
        _ => {}
    }
}

/// For each sibling group containing an ALL, the dimensions of its non-ALL
/// branches (the dimensions the ALL collapses).
fn collapsed_groups(stmt: &TableStatement) -> Vec<Vec<String>> {
    let mut groups = Vec::new();
    collect_collapsed(&stmt.row_axis, &mut groups);
    if let Some(col) = &stmt.col_axis {
        collect_collapsed(col, &mut groups);
    }
    groups
}

fn collect_collapsed(axis: &AxisExpr, out: &mut Vec<Vec<String>>) {
    for group in &axis.groups {
        let has_all = group
            .items
            .iter()
            .any(|item| matches!(item, AxisItem::All { .. }));
        if has_all {
            let mut collapsed = Vec::new();
            for item in &group.items {
                collect_item_dimensions(item, &mut collapsed);
            }
            if !collapsed.is_empty() {
                out.push(collapsed);
            }
        }
        for item in &group.items {
            if let AxisItem::SubAxis(sub) = item {
                collect_collapsed(sub, out);
            }
        }
    }
}

// ============================================================================
// Statement rewrite
// ============================================================================

/// Rewrite percentile bindings to reference the derived columns via `.min`.
///
/// `measure.method` becomes `<column>.min "<measure> <METHOD>"` with the
/// full-level suffix; in multi bindings only the percentile entries are
/// replaced and surrounding entries keep their position.
pub fn rewrite_statement(stmt: &TableStatement, plan: &PercentilePlan) -> TableStatement {
    let full_level = &plan.levels[0].dimensions;
    let mut rewritten = stmt.clone();
    rewrite_axis(&mut rewritten.row_axis, full_level);
    if let Some(col) = &mut rewritten.col_axis {
        rewrite_axis(col, full_level);
    }
    rewritten
}

fn rewrite_axis(axis: &mut AxisExpr, full_level: &[String]) {
    for group in &mut axis.groups {
        // Group-level aggregations distribute over measure items first, so
        // percentile entries can change the measure they bind to.
        if group
            .aggregations
            .iter()
            .any(|agg| is_percentile_method(&agg.function))
        {
            let aggregations = std::mem::take(&mut group.aggregations);
            for item in &mut group.items {
                if let AxisItem::Measure(measure) = item {
                    *item = AxisItem::Binding(MeasureBinding {
                        measures: vec![measure.clone()],
                        aggregations: aggregations.clone(),
                        format: group.format.clone(),
                        label: group.label.clone(),
                    });
                }
            }
        }

        let mut items = Vec::new();
        for item in group.items.drain(..) {
            rewrite_item(item, full_level, &mut items);
        }
        group.items = items;
    }
}

fn rewrite_item(item: AxisItem, full_level: &[String], out: &mut Vec<AxisItem>) {
    match item {
        AxisItem::Binding(binding)
            if binding
                .aggregations
                .iter()
                .any(|agg| is_percentile_method(&agg.function)) =>
        {
            let mut plain: Vec<AggregationSpec> = Vec::new();
            let flush = |plain: &mut Vec<AggregationSpec>,
                         out: &mut Vec<AxisItem>,
                         binding: &MeasureBinding| {
                if plain.is_empty() {
                    return;
                }
                out.push(AxisItem::Binding(MeasureBinding {
                    measures: binding.measures.clone(),
                    aggregations: std::mem::take(plain),
                    format: binding.format.clone(),
                    label: binding.label.clone(),
                }));
            };

            for agg in &binding.aggregations {
                if !is_percentile_method(&agg.function) {
                    plain.push(agg.clone());
                    continue;
                }
                flush(&mut plain, out, &binding);
                for measure in &binding.measures {
                    out.push(AxisItem::Binding(MeasureBinding {
                        measures: vec![column_name(measure, &agg.function, full_level)],
                        aggregations: vec![AggregationSpec {
                            function: "min".to_string(),
                            format: agg.format.clone().or_else(|| binding.format.clone()),
                            label: Some(
                                agg.label
                                    .clone()
                                    .or_else(|| binding.label.clone())
                                    .unwrap_or_else(|| method_label(measure, &agg.function)),
                            ),
                        }],
                        format: None,
                        label: None,
                    }));
                }
            }
            flush(&mut plain, out, &binding);
        }
        AxisItem::SubAxis(mut sub) => {
            rewrite_axis(&mut sub, full_level);
            out.push(AxisItem::SubAxis(sub));
        }
        other => out.push(other),
    }
}

// ============================================================================
// Outer-aggregate fixup
// ============================================================================

/// Redirect percentile column references at the outer aggregate of a query to
/// the column matching the outer partition level.
///
/// Cells inside a `nest:` keep the full-level column; without this fixup an
/// ALL cell would reduce, via `.min`, to the minimum of per-bucket
/// percentiles instead of the correct global-or-sub percentile. Only the
/// aggregate expression is rewritten; output names keep the full-level id so
/// the cell index sees one aggregate name at every level.
pub fn fixup_outer_references(
    malloy: &str,
    plan: &PercentilePlan,
    outer_dims: &[String],
) -> String {
    if plan.levels.len() < 2 {
        return malloy.to_string();
    }
    let outer = sorted(&outer_dims.to_vec());
    let full = &plan.levels[0].dimensions;
    if outer == *full {
        return malloy.to_string();
    }
    let Some(level) = plan.levels.iter().find(|l| l.dimensions == outer) else {
        return malloy.to_string();
    };

    let mut depth = 0i32;
    let mut lines = Vec::new();
    for line in malloy.lines() {
        let mut rewritten = line.to_string();
        if depth <= 1 {
            for pair in &plan.pairs {
                let from = format!("{}.min()", column_name(&pair.measure, &pair.method, full));
                let to = format!(
                    "{}.min()",
                    column_name(&pair.measure, &pair.method, &level.dimensions)
                );
                rewritten = rewritten.replace(&from, &to);
            }
        }
        depth += line.matches('{').count() as i32;
        depth -= line.matches('}').count() as i32;
        lines.push(rewritten);
    }
    lines.join("\n")
}
