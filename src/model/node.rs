//! Axis tree - the IR for one axis of a table.
//!
//! A node is exactly one of five variants. A dimension carries at most one
//! child (nesting); alternation is expressed only by [`AxisNode::Siblings`].
//! The tree is created once by the builder and treated as immutable
//! afterwards; every consumer is a total case-analysis over the variants.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, CompileResult};
use crate::tpl::{DenominatorScope, LimitSpec, OrderSpec};

/// A node in an axis tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AxisNode {
    /// A grouping level.
    Dimension(DimensionNode),
    /// A leaf value.
    Aggregate(AggregateNode),
    /// A leaf value computed as `100 × agg / all(agg, scope)`.
    Percentage(PercentageNode),
    /// Collapses the parent dimension (`ALL`).
    Total(TotalNode),
    /// Alternative sub-trees.
    Siblings(SiblingsNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionNode {
    pub name: String,
    pub label: Option<String>,
    /// Set iff the label is the empty string.
    pub suppress_label: bool,
    pub limit: Option<LimitSpec>,
    pub order: Option<OrderSpec>,
    /// `ACROSS` dimensions from any orderBy, promoted for downstream use.
    pub across_dimensions: Vec<String>,
    pub child: Option<Box<AxisNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateNode {
    pub measure: Option<String>,
    pub aggregation: String,
    pub format: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentageNode {
    pub measure: Option<String>,
    pub aggregation: String,
    pub scope: DenominatorScope,
    pub format: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalNode {
    pub label: Option<String>,
    pub child: Option<Box<AxisNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiblingsNode {
    pub children: Vec<AxisNode>,
}

impl AxisNode {
    /// True when this node can terminate a branch.
    pub fn is_leaf(&self) -> bool {
        match self {
            AxisNode::Aggregate(_) | AxisNode::Percentage(_) => true,
            AxisNode::Dimension(d) => d.child.is_none(),
            AxisNode::Total(t) => t.child.is_none(),
            AxisNode::Siblings(_) => false,
        }
    }

    /// Attach a deep clone of `tail` to every leaf of this tree.
    ///
    /// Aggregates and percentages are always leaves; reaching one here means
    /// the statement nested something under a value, which is a structural
    /// error.
    pub fn attach_child_to_leaves(&mut self, tail: &AxisNode) -> CompileResult<()> {
        match self {
            AxisNode::Dimension(d) => match d.child {
                Some(ref mut child) => child.attach_child_to_leaves(tail),
                None => {
                    d.child = Some(Box::new(tail.clone()));
                    Ok(())
                }
            },
            AxisNode::Total(t) => match t.child {
                Some(ref mut child) => child.attach_child_to_leaves(tail),
                None => {
                    t.child = Some(Box::new(tail.clone()));
                    Ok(())
                }
            },
            AxisNode::Siblings(s) => {
                for child in &mut s.children {
                    child.attach_child_to_leaves(tail)?;
                }
                Ok(())
            }
            AxisNode::Aggregate(a) => Err(CompileError::Structure(format!(
                "cannot nest under aggregate '{}'",
                a.aggregation
            ))),
            AxisNode::Percentage(p) => Err(CompileError::Structure(format!(
                "cannot nest under percentage aggregate '{}'",
                p.aggregation
            ))),
        }
    }

    /// Collect the names of every dimension in the tree, in visit order.
    pub fn dimension_names(&self, out: &mut Vec<String>) {
        match self {
            AxisNode::Dimension(d) => {
                if !out.contains(&d.name) {
                    out.push(d.name.clone());
                }
                if let Some(child) = &d.child {
                    child.dimension_names(out);
                }
            }
            AxisNode::Total(t) => {
                if let Some(child) = &t.child {
                    child.dimension_names(out);
                }
            }
            AxisNode::Siblings(s) => {
                for child in &s.children {
                    child.dimension_names(out);
                }
            }
            AxisNode::Aggregate(_) | AxisNode::Percentage(_) => {}
        }
    }

    /// True if any dimension appears in the tree.
    pub fn has_dimensions(&self) -> bool {
        let mut names = Vec::new();
        self.dimension_names(&mut names);
        !names.is_empty()
    }

    /// True if any `Total` appears in the tree.
    pub fn has_total(&self) -> bool {
        match self {
            AxisNode::Total(_) => true,
            AxisNode::Dimension(d) => d.child.as_deref().is_some_and(AxisNode::has_total),
            AxisNode::Siblings(s) => s.children.iter().any(AxisNode::has_total),
            AxisNode::Aggregate(_) | AxisNode::Percentage(_) => false,
        }
    }

    /// True when the tree contains a "true sibling" group: a Siblings node
    /// with two or more children that each contain a dimension. A single
    /// dimension alternated with `ALL` does not count.
    pub fn has_true_siblings(&self) -> bool {
        match self {
            AxisNode::Siblings(s) => {
                let dimension_children = s
                    .children
                    .iter()
                    .filter(|child| child.has_dimensions())
                    .count();
                dimension_children >= 2 || s.children.iter().any(AxisNode::has_true_siblings)
            }
            AxisNode::Dimension(d) => d.child.as_deref().is_some_and(AxisNode::has_true_siblings),
            AxisNode::Total(t) => t.child.as_deref().is_some_and(AxisNode::has_true_siblings),
            AxisNode::Aggregate(_) | AxisNode::Percentage(_) => false,
        }
    }
}
