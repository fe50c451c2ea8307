//! TableSpec builder: converts the parsed AST into canonical axis trees.
//!
//! Each axis arrives as a flat sequence of groups; the builder links them
//! right-to-left so the group at position `i` becomes a node whose child is
//! the chain built from `i+1..`. Alternation within a group becomes a
//! Siblings node, with every alternative receiving its own deep clone of the
//! remaining chain.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::malloy::reserved::escape_identifier;
use crate::model::node::{
    AggregateNode, AxisNode, DimensionNode, PercentageNode, SiblingsNode, TotalNode,
};
use crate::model::spec::{AggregateInfo, RowHeaderMode, TableOptions, TableSpec};
use crate::tpl::{
    AggregationSpec, AxisExpr, AxisGroup, AxisItem, MeasureBinding, TableStatement,
};

/// Default format for percentage aggregates: the host language already emits
/// the scaled value.
pub const RAW_PERCENT: &str = "rawPercent";

/// Build a [`TableSpec`] from a parsed statement.
pub fn build_table_spec(stmt: &TableStatement) -> CompileResult<TableSpec> {
    let options = parse_options(&stmt.options);

    let row_axis = build_axis(&stmt.row_axis)?.ok_or_else(|| {
        CompileError::Structure("statement has an empty row axis".to_string())
    })?;
    let col_axis = match &stmt.col_axis {
        Some(axis) => build_axis(axis)?,
        None => None,
    };

    let mut aggregates = Vec::new();
    collect_aggregates(&row_axis, &mut aggregates);
    if let Some(col) = &col_axis {
        collect_aggregates(col, &mut aggregates);
    }
    if aggregates.is_empty() {
        aggregates.push(AggregateInfo {
            name: "count".to_string(),
            measure: None,
            function: "count".to_string(),
            format: None,
            label: None,
            percentage: None,
        });
    }

    let where_clause = combined_where(stmt.where_clause.as_deref(), &row_axis, &options);

    Ok(TableSpec {
        source: stmt.source.clone(),
        where_clause,
        options,
        row_axis,
        col_axis,
        aggregates,
        first_axis: stmt.first_axis,
    })
}

// ============================================================================
// Options
// ============================================================================

fn parse_options(raw: &[(String, String)]) -> TableOptions {
    let mut options = TableOptions::default();
    for (key, value) in raw {
        match key.as_str() {
            "rowHeaders" => match value.as_str() {
                "above" => options.row_headers = RowHeaderMode::Above,
                "left" => options.row_headers = RowHeaderMode::Left,
                other => debug!(option = %key, value = other, "ignoring option value"),
            },
            "includeNulls" => match value.as_str() {
                "true" => options.include_nulls = true,
                "false" => options.include_nulls = false,
                other => debug!(option = %key, value = other, "ignoring option value"),
            },
            other => debug!(option = other, "ignoring unrecognized option"),
        }
    }
    options
}

// ============================================================================
// Axis construction
// ============================================================================

fn build_axis(axis: &AxisExpr) -> CompileResult<Option<AxisNode>> {
    let mut chain: Option<AxisNode> = None;
    for group in axis.groups.iter().rev() {
        chain = Some(build_group(group, chain.as_ref())?);
    }
    Ok(chain)
}

fn build_group(group: &AxisGroup, tail: Option<&AxisNode>) -> CompileResult<AxisNode> {
    if group.items.is_empty() {
        return Err(CompileError::Structure("empty axis group".to_string()));
    }

    let mut children = Vec::new();
    for item in &group.items {
        children.push(build_item(item, group, tail)?);
    }

    let mut node = if children.len() == 1 {
        children.pop().expect("one child")
    } else {
        AxisNode::Siblings(SiblingsNode { children })
    };

    apply_group_annotations(&mut node, group);
    Ok(flatten_siblings(node))
}

fn build_item(
    item: &AxisItem,
    group: &AxisGroup,
    tail: Option<&AxisNode>,
) -> CompileResult<AxisNode> {
    match item {
        AxisItem::Dimension(dref) => {
            let mut across = Vec::new();
            if let Some(limit) = &dref.limit {
                if let Some(order_by) = &limit.order_by {
                    across = order_by.ungrouped_dimensions();
                }
            }
            if across.is_empty() {
                if let Some(order) = &dref.order {
                    if let Some(order_by) = &order.order_by {
                        across = order_by.ungrouped_dimensions();
                    }
                }
            }
            Ok(AxisNode::Dimension(DimensionNode {
                name: dref.name.clone(),
                label: dref.label.clone(),
                suppress_label: dref.label.as_deref() == Some(""),
                limit: dref.limit.clone(),
                order: dref.order.clone(),
                across_dimensions: across,
                child: tail.cloned().map(Box::new),
            }))
        }
        AxisItem::All { label } => Ok(AxisNode::Total(TotalNode {
            label: label.clone(),
            child: tail.cloned().map(Box::new),
        })),
        AxisItem::Binding(binding) => {
            require_leaf(tail, "measure binding")?;
            Ok(build_binding(binding))
        }
        AxisItem::Measure(name) => {
            require_leaf(tail, "measure reference")?;
            let aggregations = if group.aggregations.is_empty() {
                vec![AggregationSpec::new("sum")]
            } else {
                group.aggregations.clone()
            };
            Ok(build_binding(&MeasureBinding {
                measures: vec![name.clone()],
                aggregations,
                format: None,
                label: None,
            }))
        }
        AxisItem::Aggregation(spec) => {
            require_leaf(tail, "aggregation")?;
            Ok(AxisNode::Aggregate(AggregateNode {
                measure: None,
                aggregation: spec.function.clone(),
                format: spec.format.clone(),
                label: spec.label.clone(),
            }))
        }
        AxisItem::Percentage(pct) => {
            require_leaf(tail, "percentage aggregate")?;
            Ok(AxisNode::Percentage(PercentageNode {
                measure: pct.measure.clone(),
                aggregation: pct.aggregation.clone(),
                scope: pct.scope.clone(),
                format: pct.format.clone(),
                label: pct.label.clone(),
            }))
        }
        AxisItem::SubAxis(sub) => {
            let mut tree = build_axis(sub)?.ok_or_else(|| {
                CompileError::Structure("empty parenthesized sub-axis".to_string())
            })?;
            if let Some(tail) = tail {
                tree.attach_child_to_leaves(tail)?;
            }
            Ok(tree)
        }
    }
}

fn require_leaf(tail: Option<&AxisNode>, kind: &str) -> CompileResult<()> {
    if tail.is_some() {
        return Err(CompileError::Structure(format!(
            "{kind} must terminate its chain"
        )));
    }
    Ok(())
}

/// Cartesian product of measures × aggregations.
fn build_binding(binding: &MeasureBinding) -> AxisNode {
    let mut leaves = Vec::new();
    for measure in &binding.measures {
        for agg in &binding.aggregations {
            leaves.push(AxisNode::Aggregate(AggregateNode {
                measure: Some(measure.clone()),
                aggregation: agg.function.clone(),
                format: agg.format.clone().or_else(|| binding.format.clone()),
                label: agg.label.clone().or_else(|| binding.label.clone()),
            }));
        }
    }
    if leaves.len() == 1 {
        leaves.pop().expect("one leaf")
    } else {
        AxisNode::Siblings(SiblingsNode { children: leaves })
    }
}

/// Group-level format/label annotations propagate to every aggregate leaf
/// that has no override of its own.
fn apply_group_annotations(node: &mut AxisNode, group: &AxisGroup) {
    if group.format.is_none() && group.label.is_none() {
        return;
    }
    fill_aggregate_annotations(node, group.format.as_ref(), group.label.as_ref());
}

fn fill_aggregate_annotations(
    node: &mut AxisNode,
    format: Option<&String>,
    label: Option<&String>,
) {
    match node {
        AxisNode::Aggregate(a) => {
            if a.format.is_none() {
                a.format = format.cloned();
            }
            if a.label.is_none() {
                a.label = label.cloned();
            }
        }
        AxisNode::Percentage(p) => {
            if p.format.is_none() {
                p.format = format.cloned();
            }
            if p.label.is_none() {
                p.label = label.cloned();
            }
        }
        AxisNode::Dimension(d) => {
            if let Some(child) = &mut d.child {
                fill_aggregate_annotations(child, format, label);
            }
        }
        AxisNode::Total(t) => {
            if let Some(child) = &mut t.child {
                fill_aggregate_annotations(child, format, label);
            }
        }
        AxisNode::Siblings(s) => {
            for child in &mut s.children {
                fill_aggregate_annotations(child, format, label);
            }
        }
    }
}

/// Single-child Siblings are flattened to their sole child.
fn flatten_siblings(node: AxisNode) -> AxisNode {
    match node {
        AxisNode::Siblings(mut s) if s.children.len() == 1 => {
            flatten_siblings(s.children.pop().expect("one child"))
        }
        other => other,
    }
}

// ============================================================================
// Aggregate collection
// ============================================================================

fn collect_aggregates(node: &AxisNode, out: &mut Vec<AggregateInfo>) {
    match node {
        AxisNode::Aggregate(a) => {
            let name = AggregateInfo::id(a.measure.as_deref(), &a.aggregation);
            if !out.iter().any(|existing| existing.name == name) {
                out.push(AggregateInfo {
                    name,
                    measure: a.measure.clone(),
                    function: a.aggregation.clone(),
                    format: a.format.clone(),
                    label: a.label.clone(),
                    percentage: None,
                });
            }
        }
        AxisNode::Percentage(p) => {
            let name = AggregateInfo::percentage_id(p.measure.as_deref(), &p.aggregation);
            if !out.iter().any(|existing| existing.name == name) {
                out.push(AggregateInfo {
                    name,
                    measure: p.measure.clone(),
                    function: p.aggregation.clone(),
                    format: p.format.clone().or_else(|| Some(RAW_PERCENT.to_string())),
                    label: p.label.clone(),
                    percentage: Some(p.scope.clone()),
                });
            }
        }
        AxisNode::Dimension(d) => {
            if let Some(child) = &d.child {
                collect_aggregates(child, out);
            }
        }
        AxisNode::Total(t) => {
            if let Some(child) = &t.child {
                collect_aggregates(child, out);
            }
        }
        AxisNode::Siblings(s) => {
            for child in &s.children {
                collect_aggregates(child, out);
            }
        }
    }
}

// ============================================================================
// NULL-exclusion filter
// ============================================================================

/// Synthesize the NULL-exclusion predicate over the row-axis dimensions and
/// AND it with any user WHERE. Column-axis NULLs are filtered per-nest by the
/// generator: with concatenated column sections each section must filter only
/// its own dimensions, which a global WHERE cannot express.
fn combined_where(
    user: Option<&str>,
    row_axis: &AxisNode,
    options: &TableOptions,
) -> Option<String> {
    let null_filter = if options.include_nulls {
        None
    } else {
        let mut dims = Vec::new();
        row_axis.dimension_names(&mut dims);
        if dims.is_empty() {
            None
        } else {
            Some(
                dims.iter()
                    .map(|d| format!("{} is not null", escape_identifier(d)))
                    .collect::<Vec<_>>()
                    .join(" and "),
            )
        }
    };

    match (user, null_filter) {
        (Some(user), Some(nulls)) => {
            // A disjunctive user predicate must not capture the appended
            // conjuncts.
            if DISJUNCTION_RE.is_match(user) {
                Some(format!("({user}) and {nulls}"))
            } else {
                Some(format!("{user} and {nulls}"))
            }
        }
        (Some(user), None) => Some(user.to_string()),
        (None, Some(nulls)) => Some(nulls),
        (None, None) => None,
    }
}

// The host language accepts SQL capitalization, so `OR` counts too.
static DISJUNCTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bor\b").unwrap());
