//! Definition-order companions for bucketed dimensions.
//!
//! The default sort order for a bucketed dimension is the order its branches
//! were declared, not the alphabetic order of its labels. The catalog either
//! recognizes a legacy `<name>_order` companion supplied by the user, or
//! synthesizes `<name>_def_order` as an ordinal bucketing over the same
//! conditions. The generator turns the companion into an ordering aggregate
//! (`<companion>_min is <companion>.min()`), because limits must respect the
//! same order and nested results arrive pre-sorted from the executor.

use std::collections::HashMap;

use crate::dimension::defs::{parse_dimension, DimensionDefinition, ParsedDimension};
use crate::error::CompileResult;

/// A synthesized companion dimension to inject into the model.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoOrderDimension {
    pub name: String,
    /// Malloy `pick` expression over the source bucketing's conditions.
    pub expression: String,
}

/// How the generator learns about definition ordering.
pub trait DimensionOrderingProvider {
    fn has_definition_order(&self, name: &str) -> bool;

    /// The companion dimension to sort by, preferring the synthesized
    /// companion over a legacy user-supplied one.
    fn order_dimension_name(&self, name: &str) -> Option<String>;

    /// Synthesized definitions that must be declared in the model preamble.
    fn auto_order_dimensions(&self) -> Vec<AutoOrderDimension>;
}

/// Parsed user dimension definitions plus their ordering companions.
#[derive(Debug, Default)]
pub struct DimensionCatalog {
    dimensions: HashMap<String, ParsedDimension>,
    /// Declaration order of bucketed dimensions, for stable preamble output.
    bucketed: Vec<String>,
}

impl DimensionCatalog {
    pub fn new(definitions: &[DimensionDefinition]) -> CompileResult<Self> {
        let mut dimensions = HashMap::new();
        let mut bucketed = Vec::new();
        for def in definitions {
            let parsed = parse_dimension(&def.name, &def.definition)?;
            if parsed.is_bucketing() {
                bucketed.push(def.name.clone());
            }
            dimensions.insert(def.name.clone(), parsed);
        }
        Ok(Self {
            dimensions,
            bucketed,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ParsedDimension> {
        self.dimensions.get(name)
    }

    /// SQL expression to `PARTITION BY` for a dimension: the user mapping
    /// when one exists, the bare column otherwise.
    pub fn partition_sql(&self, name: &str) -> String {
        match self.dimensions.get(name) {
            Some(parsed) => parsed.sql_expression.clone(),
            None => format!("\"{name}\""),
        }
    }

    fn auto_name(name: &str) -> String {
        format!("{name}_def_order")
    }

    fn legacy_name(name: &str) -> String {
        format!("{name}_order")
    }

    /// Malloy `pick` expression mirroring the bucketing's declaration order.
    fn pick_expression(parsed: &ParsedDimension) -> String {
        let mut expr = String::new();
        for (i, branch) in parsed.branches.iter().enumerate() {
            expr.push_str(&format!("pick {} when {} ", i + 1, branch.condition));
        }
        expr.push_str(&format!("else {}", parsed.branches.len() + 1));
        expr
    }
}

impl DimensionOrderingProvider for DimensionCatalog {
    fn has_definition_order(&self, name: &str) -> bool {
        self.dimensions
            .get(name)
            .is_some_and(ParsedDimension::is_bucketing)
            || self.dimensions.contains_key(&Self::legacy_name(name))
    }

    fn order_dimension_name(&self, name: &str) -> Option<String> {
        if self
            .dimensions
            .get(name)
            .is_some_and(ParsedDimension::is_bucketing)
        {
            return Some(Self::auto_name(name));
        }
        let legacy = Self::legacy_name(name);
        self.dimensions.contains_key(&legacy).then_some(legacy)
    }

    fn auto_order_dimensions(&self) -> Vec<AutoOrderDimension> {
        self.bucketed
            .iter()
            .map(|name| {
                let parsed = &self.dimensions[name];
                AutoOrderDimension {
                    name: Self::auto_name(name),
                    expression: Self::pick_expression(parsed),
                }
            })
            .collect()
    }
}
