//! Query planning: enumerate (row branch × col branch) combinations, then
//! deduplicate and merge them into the minimal query set.

pub mod merge;
pub mod signature;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::model::node::AxisNode;
use crate::model::spec::{AggregateInfo, TableSpec};
use crate::tpl::path::{path_key, PathSegment, TreePath};
use crate::tpl::{LimitSpec, OrderSpec};

// ============================================================================
// Groupings and branches
// ============================================================================

/// One grouping level of a query, flattened out of the axis tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingInfo {
    pub dimension: String,
    pub label: Option<String>,
    pub suppress_label: bool,
    pub limit: Option<LimitSpec>,
    pub order: Option<OrderSpec>,
    pub across_dimensions: Vec<String>,
}

impl GroupingInfo {
    /// The output column name: the alias when one was declared, the
    /// dimension name otherwise.
    pub fn output_name(&self) -> String {
        match &self.label {
            Some(label) if !label.is_empty() => label.clone(),
            _ => self.dimension.clone(),
        }
    }
}

/// One root-to-leaf branch of an axis tree. Totals are collapsed: they
/// contribute only the total flag and label.
#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub path: TreePath,
    pub groupings: Vec<GroupingInfo>,
    pub has_total: bool,
    pub total_label: Option<String>,
}

impl Branch {
    fn empty() -> Self {
        Self {
            path: TreePath::new(),
            groupings: Vec::new(),
            has_total: false,
            total_label: None,
        }
    }
}

/// Collect every root-to-leaf branch of an axis tree.
pub fn enumerate_branches(node: &AxisNode) -> Vec<Branch> {
    let mut branches = Vec::new();
    walk_branches(node, &Branch::empty(), &mut branches);
    branches
}

fn walk_branches(node: &AxisNode, prefix: &Branch, out: &mut Vec<Branch>) {
    match node {
        AxisNode::Dimension(d) => {
            let mut branch = prefix.clone();
            branch.path.push(PathSegment::Dimension {
                name: d.name.clone(),
            });
            branch.groupings.push(GroupingInfo {
                dimension: d.name.clone(),
                label: d.label.clone(),
                suppress_label: d.suppress_label,
                limit: d.limit.clone(),
                order: d.order.clone(),
                across_dimensions: d.across_dimensions.clone(),
            });
            match &d.child {
                Some(child) => walk_branches(child, &branch, out),
                None => out.push(branch),
            }
        }
        AxisNode::Total(t) => {
            let mut branch = prefix.clone();
            branch.path.push(PathSegment::Total {
                label: t.label.clone(),
            });
            branch.has_total = true;
            if branch.total_label.is_none() {
                branch.total_label = t.label.clone();
            }
            match &t.child {
                Some(child) => walk_branches(child, &branch, out),
                None => out.push(branch),
            }
        }
        AxisNode::Aggregate(a) => {
            let mut branch = prefix.clone();
            branch.path.push(PathSegment::Aggregate {
                name: AggregateInfo::id(a.measure.as_deref(), &a.aggregation),
            });
            out.push(branch);
        }
        AxisNode::Percentage(p) => {
            let mut branch = prefix.clone();
            branch.path.push(PathSegment::Aggregate {
                name: AggregateInfo::percentage_id(p.measure.as_deref(), &p.aggregation),
            });
            out.push(branch);
        }
        AxisNode::Siblings(s) => {
            for (index, child) in s.children.iter().enumerate() {
                let mut branch = prefix.clone();
                branch.path.push(PathSegment::Sibling { index });
                walk_branches(child, &branch, out);
            }
        }
    }
}

// ============================================================================
// Query specs and the plan
// ============================================================================

/// A relocated column arrangement inside a merged query.
#[derive(Debug, Clone, PartialEq)]
pub struct ColVariant {
    pub path: TreePath,
    pub groupings: Vec<GroupingInfo>,
    pub has_total: bool,
    pub total_label: Option<String>,
}

/// One deduplicated query, tagged with the tree paths that own it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedQuerySpec {
    pub id: String,
    pub row_path: TreePath,
    pub col_path: TreePath,
    pub row_groupings: Vec<GroupingInfo>,
    pub col_groupings: Vec<GroupingInfo>,
    pub aggregates: Vec<AggregateInfo>,
    pub is_row_total: bool,
    pub has_col_total: bool,
    pub row_total_label: Option<String>,
    pub col_total_label: Option<String>,
    pub signature: String,
    /// Column arrangements merged into this query beyond the primary one.
    pub additional_col_variants: Vec<ColVariant>,
}

impl TaggedQuerySpec {
    /// True when any column grouping, across every variant, carries a limit.
    pub fn has_col_limit(&self) -> bool {
        self.col_groupings.iter().any(|g| g.limit.is_some())
            || self
                .additional_col_variants
                .iter()
                .any(|v| v.groupings.iter().any(|g| g.limit.is_some()))
    }
}

/// The deduplicated, merged query set for one statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryPlan {
    pub queries: Vec<TaggedQuerySpec>,
    /// Every original (row path, col path) key maps to exactly one query id.
    pub path_to_query: HashMap<String, String>,
    /// Ids of queries that absorbed additional column variants.
    pub merge_order: Vec<String>,
}

impl QueryPlan {
    pub fn query(&self, id: &str) -> CompileResult<&TaggedQuerySpec> {
        self.queries
            .iter()
            .find(|q| q.id == id)
            .ok_or_else(|| CompileError::Internal(format!("no query with id '{id}'")))
    }

    pub fn query_for_path(&self, row: &TreePath, col: &TreePath) -> CompileResult<&TaggedQuerySpec> {
        let key = path_key(row, col);
        let id = self
            .path_to_query
            .get(&key)
            .ok_or_else(|| CompileError::Internal(format!("path '{key}' maps to no query")))?;
        self.query(id)
    }
}

/// Generate the query plan for a table spec.
pub fn build_query_plan(spec: &TableSpec) -> CompileResult<QueryPlan> {
    let row_branches = enumerate_branches(&spec.row_axis);
    let col_branches = match &spec.col_axis {
        Some(col) => enumerate_branches(col),
        None => vec![Branch::empty()],
    };

    // Enumerate and deduplicate by structural signature; the first query
    // with a given signature wins and absorbs the others' path keys.
    let mut raw: Vec<TaggedQuerySpec> = Vec::new();
    let mut by_signature: HashMap<String, usize> = HashMap::new();
    let mut path_entries: Vec<(String, usize)> = Vec::new();

    for row_branch in &row_branches {
        for col_branch in &col_branches {
            let sig = signature::query_signature(
                &row_branch.groupings,
                &col_branch.groupings,
                &spec.aggregates,
                row_branch.has_total,
                col_branch.has_total,
                row_branch.total_label.as_deref(),
                col_branch.total_label.as_deref(),
            );
            let key = path_key(&row_branch.path, &col_branch.path);
            let index = match by_signature.get(&sig) {
                Some(&index) => index,
                None => {
                    let index = raw.len();
                    by_signature.insert(sig.clone(), index);
                    raw.push(TaggedQuerySpec {
                        id: String::new(),
                        row_path: row_branch.path.clone(),
                        col_path: col_branch.path.clone(),
                        row_groupings: row_branch.groupings.clone(),
                        col_groupings: col_branch.groupings.clone(),
                        aggregates: spec.aggregates.clone(),
                        is_row_total: row_branch.has_total,
                        has_col_total: col_branch.has_total,
                        row_total_label: row_branch.total_label.clone(),
                        col_total_label: col_branch.total_label.clone(),
                        signature: sig,
                        additional_col_variants: Vec::new(),
                    });
                    index
                }
            };
            path_entries.push((key, index));
        }
    }

    let plan = merge::merge_column_variants(spec, raw, path_entries);
    debug!(
        queries = plan.queries.len(),
        merged = plan.merge_order.len(),
        "query plan built"
    );
    Ok(plan)
}
