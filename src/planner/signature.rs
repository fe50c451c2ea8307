//! Structural signatures: the canonical dedup keys for queries.

use crate::model::spec::AggregateInfo;
use crate::planner::GroupingInfo;
use crate::tpl::{LimitSpec, OrderBy, OrderSpec, SortDirection};

fn direction_tag(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "asc",
        SortDirection::Desc => "desc",
    }
}

fn order_by_tag(order_by: &OrderBy) -> String {
    match order_by {
        OrderBy::Field(field) => format!("f:{field}"),
        OrderBy::Aggregate(agg) => {
            if agg.ungrouped_dimensions.is_empty() {
                format!("a:{}_{}", agg.field, agg.function)
            } else {
                format!(
                    "a:{}_{}^{}",
                    agg.field,
                    agg.function,
                    agg.ungrouped_dimensions.join(",")
                )
            }
        }
        OrderBy::Ratio {
            numerator,
            denominator,
        } => format!(
            "r:{}_{}/{}_{}",
            numerator.field, numerator.function, denominator.field, denominator.function
        ),
    }
}

fn limit_tag(limit: &LimitSpec) -> String {
    let mut tag = format!("{}{}", direction_tag(limit.direction), limit.count);
    if let Some(order_by) = &limit.order_by {
        tag.push('@');
        tag.push_str(&order_by_tag(order_by));
    }
    tag
}

fn order_tag(order: &OrderSpec) -> String {
    let mut tag = direction_tag(order.direction).to_string();
    if let Some(order_by) = &order.order_by {
        tag.push('@');
        tag.push_str(&order_by_tag(order_by));
    }
    tag
}

fn grouping_tag(grouping: &GroupingInfo) -> String {
    let mut tag = grouping.dimension.clone();
    if let Some(label) = &grouping.label {
        tag.push_str(&format!("~{label}"));
    }
    if let Some(limit) = &grouping.limit {
        tag.push_str(&format!("[{}]", limit_tag(limit)));
    }
    if let Some(order) = &grouping.order {
        tag.push_str(&format!("<{}>", order_tag(order)));
    }
    if !grouping.across_dimensions.is_empty() {
        tag.push_str(&format!("^{}", grouping.across_dimensions.join(",")));
    }
    tag
}

fn groupings_tag(groupings: &[GroupingInfo]) -> String {
    groupings
        .iter()
        .map(grouping_tag)
        .collect::<Vec<_>>()
        .join("|")
}

/// The row-side portion of a signature: row groupings, the aggregate set,
/// and the row total flag and label. Queries sharing this portion are merge
/// candidates.
pub fn row_signature(
    row: &[GroupingInfo],
    aggregates: &[AggregateInfo],
    is_row_total: bool,
    row_total_label: Option<&str>,
) -> String {
    let mut names: Vec<&str> = aggregates.iter().map(|a| a.name.as_str()).collect();
    names.sort_unstable();
    format!(
        "R[{}];A[{}];RT[{},{}]",
        groupings_tag(row),
        names.join(","),
        is_row_total,
        row_total_label.unwrap_or("")
    )
}

/// The full structural signature of a query.
pub fn query_signature(
    row: &[GroupingInfo],
    col: &[GroupingInfo],
    aggregates: &[AggregateInfo],
    is_row_total: bool,
    has_col_total: bool,
    row_total_label: Option<&str>,
    col_total_label: Option<&str>,
) -> String {
    format!(
        "{};C[{}];CT[{},{}]",
        row_signature(row, aggregates, is_row_total, row_total_label),
        groupings_tag(col),
        has_col_total,
        col_total_label.unwrap_or("")
    )
}
