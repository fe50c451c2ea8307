//! Column-variant merging: queries sharing a row structure collapse into one
//! query with multiple column arrangements.
//!
//! Merging and restructuring are mutually exclusive: a query with a
//! column-grouping limit must be restructured around that limit, which a
//! merged query cannot express. The eligibility predicate is a hard
//! decision, not a heuristic.

use std::collections::HashMap;

use crate::model::spec::TableSpec;
use crate::planner::signature::row_signature;
use crate::planner::{ColVariant, QueryPlan, TaggedQuerySpec};

/// Group deduplicated queries by row signature and merge each group into a
/// single query whose extra column arrangements become
/// `additional_col_variants`. Ids are assigned in one left-to-right pass
/// over the result, and every original path key is remapped.
pub fn merge_column_variants(
    spec: &TableSpec,
    raw: Vec<TaggedQuerySpec>,
    path_entries: Vec<(String, usize)>,
) -> QueryPlan {
    // Raw index -> merged-slot index, filled as groups resolve.
    let mut slot_of_raw: Vec<usize> = vec![usize::MAX; raw.len()];
    let mut merged: Vec<TaggedQuerySpec> = Vec::new();
    let mut group_slots: HashMap<String, usize> = HashMap::new();
    let mut merge_slots: Vec<usize> = Vec::new();

    for (index, query) in raw.into_iter().enumerate() {
        if !mergeable(spec, &query) {
            slot_of_raw[index] = merged.len();
            merged.push(query);
            continue;
        }

        let row_sig = row_signature(
            &query.row_groupings,
            &query.aggregates,
            query.is_row_total,
            query.row_total_label.as_deref(),
        );
        match group_slots.get(&row_sig) {
            Some(&slot) => {
                slot_of_raw[index] = slot;
                let has_total = query.has_col_total;
                let total_label = query.col_total_label.clone();
                let primary = &mut merged[slot];
                primary.additional_col_variants.push(ColVariant {
                    path: query.col_path,
                    groupings: query.col_groupings,
                    has_total,
                    total_label: total_label.clone(),
                });
                if has_total {
                    primary.has_col_total = true;
                    if primary.col_total_label.is_none() {
                        primary.col_total_label = total_label;
                    }
                }
                if !merge_slots.contains(&slot) {
                    merge_slots.push(slot);
                }
            }
            None => {
                let slot = merged.len();
                group_slots.insert(row_sig, slot);
                slot_of_raw[index] = slot;
                merged.push(query);
            }
        }
    }

    for (index, query) in merged.iter_mut().enumerate() {
        query.id = format!("q{index}");
    }

    let path_to_query = path_entries
        .into_iter()
        .map(|(key, raw_index)| (key, merged[slot_of_raw[raw_index]].id.clone()))
        .collect();
    let merge_order = merge_slots
        .into_iter()
        .map(|slot| merged[slot].id.clone())
        .collect();

    QueryPlan {
        queries: merged,
        path_to_query,
        merge_order,
    }
}

/// A query may be merged only when nothing about it forces a restructured or
/// flat template.
fn mergeable(spec: &TableSpec, query: &TaggedQuerySpec) -> bool {
    if spec.requires_flat() {
        return false;
    }
    if query.col_groupings.iter().any(|g| g.limit.is_some()) {
        return false;
    }
    // Cross-scope ordering restructures around the limited row dimension;
    // the inverted layout cannot host extra column variants.
    if query
        .row_groupings
        .iter()
        .any(|g| !g.across_dimensions.is_empty())
    {
        return false;
    }
    true
}
