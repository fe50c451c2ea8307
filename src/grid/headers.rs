//! Header hierarchies: the axis tree populated with observed dimension
//! values.
//!
//! A child dimension's values are filtered to those that actually occur
//! under each parent, so sparse data never produces empty header cells.
//! Spans build bottom-up: a leaf spans 1, an internal node spans the sum of
//! its children.

use std::cmp::Ordering;

use crate::dimension::DimensionOrderingProvider;
use crate::grid::index::CellIndex;
use crate::grid::{CornerLabel, HeaderKind, HeaderNode};
use crate::model::node::{AxisNode, DimensionNode};
use crate::model::spec::AggregateInfo;
use crate::tpl::path::{PathSegment, TreePath};

const TOTAL_LABEL: &str = "Total";

/// Build the header hierarchy for one axis.
pub fn build_axis_headers(
    axis: &AxisNode,
    cells: &CellIndex,
    ordering: &dyn DimensionOrderingProvider,
    aggregates: &[AggregateInfo],
) -> Vec<HeaderNode> {
    let builder = HeaderBuilder {
        cells,
        ordering,
        aggregates,
    };
    builder.build(axis, &[], 0, &TreePath::new(), None)
}

struct HeaderBuilder<'a> {
    cells: &'a CellIndex,
    ordering: &'a dyn DimensionOrderingProvider,
    aggregates: &'a [AggregateInfo],
}

impl<'a> HeaderBuilder<'a> {
    /// `sibling_dims` is the number of dimension-bearing children of the
    /// enclosing Siblings node, or None outside any sibling context.
    fn build(
        &self,
        node: &AxisNode,
        context: &[(String, String)],
        depth: usize,
        path: &TreePath,
        sibling_dims: Option<usize>,
    ) -> Vec<HeaderNode> {
        match node {
            AxisNode::Dimension(d) => self.dimension_headers(d, context, depth, path, sibling_dims),
            AxisNode::Total(t) => {
                let path = path.child(PathSegment::Total {
                    label: t.label.clone(),
                });
                let children = match &t.child {
                    Some(child) => self.build(child, context, depth + 1, &path, None),
                    None => Vec::new(),
                };
                let span = span_of(&children);
                vec![HeaderNode {
                    kind: HeaderKind::Total,
                    value: t.label.clone().unwrap_or_else(|| TOTAL_LABEL.to_string()),
                    label: t.label.clone(),
                    span,
                    depth,
                    children,
                    path,
                }]
            }
            AxisNode::Aggregate(a) => {
                let name = AggregateInfo::id(a.measure.as_deref(), &a.aggregation);
                vec![self.aggregate_header(&name, depth, path)]
            }
            AxisNode::Percentage(p) => {
                let name = AggregateInfo::percentage_id(p.measure.as_deref(), &p.aggregation);
                vec![self.aggregate_header(&name, depth, path)]
            }
            AxisNode::Siblings(s) => {
                let dims = s
                    .children
                    .iter()
                    .filter(|child| child.has_dimensions())
                    .count();
                let mut out = Vec::new();
                for (index, child) in s.children.iter().enumerate() {
                    let path = path.child(PathSegment::Sibling { index });
                    out.extend(self.build(child, context, depth, &path, Some(dims)));
                }
                out
            }
        }
    }

    fn dimension_headers(
        &self,
        d: &DimensionNode,
        context: &[(String, String)],
        depth: usize,
        path: &TreePath,
        sibling_dims: Option<usize>,
    ) -> Vec<HeaderNode> {
        let custom_label = d
            .label
            .as_deref()
            .filter(|l| !l.is_empty())
            .map(str::to_string);
        let wrap = if d.suppress_label {
            false
        } else {
            match (&custom_label, sibling_dims) {
                // A lone labeled dimension advertises its label in the body.
                (Some(_), None) => true,
                // True siblings each get a section label, custom or not.
                (_, Some(dims)) if dims >= 2 => true,
                _ => false,
            }
        };

        let value_depth = if wrap { depth + 1 } else { depth };
        let path = path.child(PathSegment::Dimension {
            name: d.name.clone(),
        });

        let mut values = self.cells.observed_values(&d.name, context);
        let keep_order = d.limit.is_some()
            || d.order.is_some()
            || self.ordering.has_definition_order(&d.name);
        if !keep_order {
            sort_values(&mut values);
        }

        let mut value_nodes = Vec::new();
        for value in values {
            let mut child_context = context.to_vec();
            child_context.push((d.name.clone(), value.clone()));
            let children = match &d.child {
                Some(child) => self.build(child, &child_context, value_depth + 1, &path, None),
                None => Vec::new(),
            };
            let span = span_of(&children);
            value_nodes.push(HeaderNode {
                kind: HeaderKind::Dimension,
                value,
                // The wrapper owns the label when one is emitted.
                label: if wrap { None } else { custom_label.clone() },
                span,
                depth: value_depth,
                children,
                path: path.clone(),
            });
        }

        if !wrap {
            return value_nodes;
        }
        let span = span_of(&value_nodes);
        vec![HeaderNode {
            kind: HeaderKind::SiblingLabel,
            value: custom_label.clone().unwrap_or_else(|| d.name.clone()),
            label: custom_label,
            span,
            depth,
            children: value_nodes,
            path,
        }]
    }

    fn aggregate_header(&self, name: &str, depth: usize, path: &TreePath) -> HeaderNode {
        let value = self
            .aggregates
            .iter()
            .find(|a| a.name == name)
            .map(AggregateInfo::display_label)
            .unwrap_or_else(|| name.to_string());
        HeaderNode {
            kind: HeaderKind::Dimension,
            value,
            label: None,
            span: 1,
            depth,
            children: Vec::new(),
            path: path.child(PathSegment::Aggregate {
                name: name.to_string(),
            }),
        }
    }
}

fn span_of(children: &[HeaderNode]) -> usize {
    if children.is_empty() {
        1
    } else {
        children.iter().map(|c| c.span).sum()
    }
}

/// Numeric compare when both values parse as numbers, string compare
/// otherwise.
fn sort_values(values: &mut [String]) {
    values.sort_by(|a, b| match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    });
}

// ============================================================================
// Row label presentation
// ============================================================================

/// Corner labels: one `{dimension, label}` per row nesting level. Valid only
/// without true siblings, where the row axis reduces to a single dimension
/// chain.
pub fn corner_labels(axis: &AxisNode) -> Vec<CornerLabel> {
    let mut labels = Vec::new();
    collect_corner_labels(axis, &mut labels);
    labels
}

fn collect_corner_labels(node: &AxisNode, out: &mut Vec<CornerLabel>) {
    match node {
        AxisNode::Dimension(d) => {
            if !out.iter().any(|l| l.dimension == d.name) {
                let label = match (&d.label, d.suppress_label) {
                    (Some(label), false) if !label.is_empty() => label.clone(),
                    (_, true) => String::new(),
                    _ => d.name.clone(),
                };
                out.push(CornerLabel {
                    dimension: d.name.clone(),
                    label,
                });
            }
            if let Some(child) = &d.child {
                collect_corner_labels(child, out);
            }
        }
        AxisNode::Total(t) => {
            if let Some(child) = &t.child {
                collect_corner_labels(child, out);
            }
        }
        AxisNode::Siblings(s) => {
            for child in &s.children {
                collect_corner_labels(child, out);
            }
        }
        AxisNode::Aggregate(_) | AxisNode::Percentage(_) => {}
    }
}

/// Left-mode labels: one entry per header column depth. A column carries a
/// label only when a custom-labeled dimension's values land at that depth
/// and no sibling-label already displays it in the body.
pub fn left_mode_labels(headers: &[HeaderNode]) -> Vec<String> {
    let mut max_depth = 0;
    let mut labels: Vec<(usize, String)> = Vec::new();
    collect_left_labels(headers, &mut max_depth, &mut labels);

    let mut out = vec![String::new(); max_depth + 1];
    for (depth, label) in labels {
        if out[depth].is_empty() {
            out[depth] = label;
        }
    }
    out
}

fn collect_left_labels(
    headers: &[HeaderNode],
    max_depth: &mut usize,
    labels: &mut Vec<(usize, String)>,
) {
    for node in headers {
        *max_depth = (*max_depth).max(node.depth);
        if node.kind == HeaderKind::Dimension {
            if let Some(label) = &node.label {
                if !label.is_empty() {
                    labels.push((node.depth, label.clone()));
                }
            }
        }
        collect_left_labels(&node.children, max_depth, labels);
    }
}
