//! The cell index: a map from axis-independent cell keys to aggregate
//! values, built by walking each query's result rows.

use std::collections::HashMap;

use serde_json::Value;

use crate::grid::normalize::normalize_value;
use crate::malloy::generator::GeneratedQuery;
use crate::model::spec::AggregateInfo;
use crate::planner::GroupingInfo;

/// Axis-independent cell key: `(name=value)` pairs sorted by name. Which
/// axis a dimension lives on does not affect the key.
pub fn cell_key(pairs: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = pairs.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    sorted
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("|")
}

#[derive(Debug, Default)]
pub struct CellIndex {
    cells: HashMap<String, HashMap<String, Option<f64>>>,
    /// Dimension combinations in rowset order, for header derivation.
    combos: Vec<Vec<(String, String)>>,
    /// First-seen value order per dimension.
    value_order: HashMap<String, Vec<String>>,
}

impl CellIndex {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, key: &str, aggregate: &str) -> Option<Option<f64>> {
        self.cells.get(key).and_then(|m| m.get(aggregate)).copied()
    }

    /// Observed values of `dimension` under the given bound ancestors, in
    /// first-seen rowset order.
    pub fn observed_values(
        &self,
        dimension: &str,
        context: &[(String, String)],
    ) -> Vec<String> {
        let mut values = Vec::new();
        for combo in &self.combos {
            if !context.iter().all(|pair| combo.contains(pair)) {
                continue;
            }
            let Some((_, value)) = combo.iter().find(|(name, _)| name == dimension) else {
                continue;
            };
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
        values
    }

    /// Index one query's rowset. Merged queries are re-processed once per
    /// column variant, because each variant stores its dimension values in a
    /// distinct by-nest.
    pub fn index_query(
        &mut self,
        query: &GeneratedQuery,
        rows: &[Value],
        aggregates: &[AggregateInfo],
    ) {
        if query.is_flat_query {
            let mut pending: Vec<&GroupingInfo> = query.row_groupings.iter().collect();
            pending.extend(query.col_groupings.iter());
            let hints = vec![None; pending.len()];
            self.walk(rows, &pending, &hints, &[], aggregates);
            return;
        }

        let variants = variant_groupings(query);
        for (variant_index, variant) in variants.iter().enumerate() {
            let (pending, col_start) = if query.axes_inverted {
                let mut pending: Vec<&GroupingInfo> = variant.to_vec();
                pending.extend(query.row_groupings.iter());
                (pending, 0)
            } else {
                let mut pending: Vec<&GroupingInfo> = query.row_groupings.iter().collect();
                pending.extend(variant.iter());
                (pending, query.row_groupings.len())
            };

            let mut hints: Vec<Option<&str>> = vec![None; pending.len()];
            if !variant.is_empty() && col_start < hints.len() {
                hints[col_start] = query
                    .variant_nest_names
                    .get(variant_index)
                    .and_then(|n| n.as_deref());
            }
            self.walk(rows, &pending, &hints, &[], aggregates);
        }
    }

    /// Descend one result level: bind every pending grouping present as a
    /// scalar, then either store a cell (all bound) or recurse into the
    /// by-nest owning the next grouping.
    fn walk(
        &mut self,
        rows: &[Value],
        pending: &[&GroupingInfo],
        hints: &[Option<&str>],
        bound: &[(String, String)],
        aggregates: &[AggregateInfo],
    ) {
        for row in rows {
            let Value::Object(fields) = row else {
                continue;
            };

            let mut bound = bound.to_vec();
            let mut index = 0;
            while index < pending.len() {
                let grouping = pending[index];
                match fields.get(&grouping.output_name()) {
                    Some(value) if !value.is_array() && !value.is_object() => {
                        bound.push((grouping.dimension.clone(), normalize_value(value)));
                        index += 1;
                    }
                    Some(value @ Value::Object(_)) if value.get("value").is_some() => {
                        bound.push((grouping.dimension.clone(), normalize_value(value)));
                        index += 1;
                    }
                    _ => break,
                }
            }

            if index == pending.len() {
                self.store(&bound, fields, aggregates);
                continue;
            }

            let next = pending[index];
            let mut candidates: Vec<String> = Vec::new();
            if let Some(hint) = hints[index] {
                candidates.push(hint.to_string());
            }
            candidates.push(format!("by_{}", next.dimension));
            for candidate in candidates {
                if let Some(Value::Array(nested)) = fields.get(&candidate) {
                    self.walk(
                        nested,
                        &pending[index..],
                        &hints[index..],
                        &bound,
                        aggregates,
                    );
                    break;
                }
            }
        }
    }

    fn store(
        &mut self,
        bound: &[(String, String)],
        fields: &serde_json::Map<String, Value>,
        aggregates: &[AggregateInfo],
    ) {
        let key = cell_key(bound);
        let entry = self.cells.entry(key).or_default();
        for aggregate in aggregates {
            if let Some(value) = fields.get(&aggregate.name) {
                entry.insert(aggregate.name.clone(), value.as_f64());
            }
        }

        self.combos.push(bound.to_vec());
        for (dimension, value) in bound {
            let order = self.value_order.entry(dimension.clone()).or_default();
            if !order.contains(value) {
                order.push(value.clone());
            }
        }
    }
}

fn variant_groupings(query: &GeneratedQuery) -> Vec<Vec<&GroupingInfo>> {
    let mut variants: Vec<Vec<&GroupingInfo>> = vec![query.col_groupings.iter().collect()];
    for variant in &query.additional_col_variants {
        variants.push(variant.groupings.iter().collect());
    }
    variants
}
