//! Tree paths: serializable identifiers for one branch of an axis tree.
//!
//! A path is the dedup key for the query that owns a structural cell, and the
//! link from result rows back to the position that produced them.

use serde::{Deserialize, Serialize};

/// One step along a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathSegment {
    Dimension { name: String },
    Sibling { index: usize },
    Total { label: Option<String> },
    Aggregate { name: String },
}

/// A root-to-leaf branch identifier.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TreePath(pub Vec<PathSegment>);

impl TreePath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment);
        Self(segments)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical string form, usable as a map key.
    pub fn key(&self) -> String {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|segment| match segment {
                PathSegment::Dimension { name } => format!("dim:{name}"),
                PathSegment::Sibling { index } => format!("sib:{index}"),
                PathSegment::Total { label } => match label {
                    Some(l) => format!("total:{l}"),
                    None => "total".to_string(),
                },
                PathSegment::Aggregate { name } => format!("agg:{name}"),
            })
            .collect();
        parts.join("/")
    }
}

impl std::fmt::Display for TreePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Combined key for a (row branch, col branch) pair.
pub fn path_key(row: &TreePath, col: &TreePath) -> String {
    format!("R:{}|C:{}", row.key(), col.key())
}
