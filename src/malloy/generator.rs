//! Malloy query generation.
//!
//! Every tagged query is rendered through exactly one of four templates:
//!
//! - **Flat**: percentage scopes must reference dimensions across nest
//!   boundaries, so every dimension shares one `group_by:`.
//! - **Column-restructured**: a column limit (or a cross-scope `ACROSS`
//!   ordering) takes priority, so the column side forms the outer structure
//!   and the row axis nests inside. Marked `axes_inverted`.
//! - **Row-restructured**: a multi-dimension row axis with a limit nests the
//!   limited dimension so the limit counts that dimension's values alone.
//! - **Standard**: row dimensions in the outer `group_by:`, one nest per
//!   column variant.
//!
//! Each nest filters NULLs for its own column dimensions; row dimensions are
//! covered by the spec-level WHERE.

use std::collections::HashMap;

use tracing::trace;

use crate::dimension::DimensionOrderingProvider;
use crate::error::{CompileError, CompileResult};
use crate::malloy::expr::{aggregate_expression, percentage_expression};
use crate::malloy::reserved::escape_identifier;
use crate::model::spec::{AggregateInfo, TableSpec};
use crate::planner::{ColVariant, GroupingInfo, QueryPlan, TaggedQuerySpec};
use crate::tpl::{AxisKind, OrderBy, SortDirection};

/// Guard against the host language's implicit row cap on flat queries.
const FLAT_QUERY_LIMIT: u64 = 10_000;

/// One executable query, ready for the executor.
#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    pub id: String,
    pub malloy: String,
    pub row_groupings: Vec<GroupingInfo>,
    pub col_groupings: Vec<GroupingInfo>,
    pub additional_col_variants: Vec<ColVariant>,
    /// Nest name per column variant, aligned with `[primary, additional..]`;
    /// None marks a variant served by outer aggregates.
    pub variant_nest_names: Vec<Option<String>>,
    /// The outer/nested interpretation is reversed: column groupings bind
    /// before row groupings.
    pub axes_inverted: bool,
    /// Every dimension sits in one top-level `group_by:`.
    pub is_flat_query: bool,
    /// Dimensions grouped at the query's outermost level, for the
    /// percentile outer-aggregate fixup.
    pub outer_dimensions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Template {
    Flat,
    ColRestructured { inverted_by_across: bool },
    RowRestructured,
    Standard,
}

// ============================================================================
// Block model
// ============================================================================

/// One `{ ... }` level of a query under construction.
#[derive(Debug, Default)]
struct Block {
    where_terms: Vec<String>,
    group_by: Vec<String>,
    aggregates: Vec<(String, String)>,
    nests: Vec<(String, Block)>,
    order_by: Vec<String>,
    limit: Option<u64>,
}

impl Block {
    fn add_aggregate(&mut self, name: &str, expr: &str) {
        if !self.aggregates.iter().any(|(n, _)| n == name) {
            self.aggregates.push((name.to_string(), expr.to_string()));
        }
    }

    fn render(&self, indent: usize, out: &mut String) {
        let pad = "  ".repeat(indent);
        if !self.where_terms.is_empty() {
            out.push_str(&format!("{pad}where: {}\n", self.where_terms.join(" and ")));
        }
        if !self.group_by.is_empty() {
            out.push_str(&format!("{pad}group_by: {}\n", self.group_by.join(", ")));
        }
        if !self.aggregates.is_empty() {
            let rendered: Vec<String> = self
                .aggregates
                .iter()
                .map(|(name, expr)| format!("{} is {expr}", escape_identifier(name)))
                .collect();
            out.push_str(&format!("{pad}aggregate: {}\n", rendered.join(", ")));
        }
        for (name, nest) in &self.nests {
            out.push_str(&format!("{pad}nest: {name} is {{\n"));
            nest.render(indent + 1, out);
            out.push_str(&format!("{pad}}}\n"));
        }
        if !self.order_by.is_empty() {
            out.push_str(&format!("{pad}order_by: {}\n", self.order_by.join(", ")));
        }
        if let Some(limit) = self.limit {
            out.push_str(&format!("{pad}limit: {limit}\n"));
        }
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Generates Malloy text for every query in a plan. Holds the compilation's
/// ordering provider and NULL-inclusion flag for the duration of one
/// generation pass.
pub struct MalloyGenerator<'a> {
    spec: &'a TableSpec,
    ordering: &'a dyn DimensionOrderingProvider,
    source: &'a str,
}

impl<'a> MalloyGenerator<'a> {
    pub fn new(
        spec: &'a TableSpec,
        ordering: &'a dyn DimensionOrderingProvider,
        source: &'a str,
    ) -> Self {
        Self {
            spec,
            ordering,
            source,
        }
    }

    pub fn generate(&self, plan: &QueryPlan) -> CompileResult<Vec<GeneratedQuery>> {
        plan.queries
            .iter()
            .map(|query| self.generate_query(query))
            .collect()
    }

    fn generate_query(&self, query: &TaggedQuerySpec) -> CompileResult<GeneratedQuery> {
        let template = self.choose_template(query);
        trace!(id = %query.id, ?template, "generating query");
        let mut generated = match template {
            Template::Flat => self.flat_query(query),
            Template::ColRestructured { inverted_by_across } => {
                self.col_restructured_query(query, inverted_by_across)?
            }
            Template::RowRestructured => self.row_restructured_query(query)?,
            Template::Standard => self.standard_query(query),
        };
        generated.id = query.id.clone();
        Ok(generated)
    }

    fn choose_template(&self, query: &TaggedQuerySpec) -> Template {
        if self.spec.requires_flat() {
            return Template::Flat;
        }
        let across_on_rows = query.row_groupings.iter().any(|g| {
            g.limit.is_some()
                && g.across_dimensions
                    .iter()
                    .any(|d| query.col_groupings.iter().any(|c| &c.dimension == d))
        });
        if across_on_rows {
            return Template::ColRestructured {
                inverted_by_across: true,
            };
        }
        if query.has_col_limit() && self.col_has_priority(query) {
            return Template::ColRestructured {
                inverted_by_across: false,
            };
        }
        if query.row_groupings.len() > 1
            && query.row_groupings.iter().any(|g| g.limit.is_some())
        {
            return Template::RowRestructured;
        }
        Template::Standard
    }

    /// The column axis takes limit priority when it came first in the
    /// statement, or when the row axis has no leading limit of its own.
    fn col_has_priority(&self, query: &TaggedQuerySpec) -> bool {
        self.spec.first_axis == AxisKind::Col
            || query
                .row_groupings
                .first()
                .is_none_or(|g| g.limit.is_none())
    }

    // ------------------------------------------------------------------
    // Templates
    // ------------------------------------------------------------------

    fn standard_query(&self, query: &TaggedQuerySpec) -> GeneratedQuery {
        let mut top = Block::default();
        self.push_spec_where(&mut top);

        // A lone column arrangement under an empty row side needs no nest:
        // its dimensions group at the top level.
        let flatten_cols = query.row_groupings.is_empty()
            && query.additional_col_variants.is_empty()
            && !query.col_groupings.is_empty();

        for grouping in &query.row_groupings {
            self.apply_grouping(&mut top, grouping, false);
        }

        let mut outer_dimensions: Vec<String> = query
            .row_groupings
            .iter()
            .map(|g| g.dimension.clone())
            .collect();

        let mut variant_nest_names = Vec::new();
        if flatten_cols {
            for grouping in &query.col_groupings {
                self.apply_grouping(&mut top, grouping, true);
                outer_dimensions.push(grouping.dimension.clone());
            }
            self.push_display_aggregates(&mut top);
            variant_nest_names.push(None);
        } else {
            let variants = self.variants_of(query);
            let mut cells_at_top = variants.iter().all(|v| v.is_empty());
            let mut used_names: HashMap<String, usize> = HashMap::new();
            for groupings in &variants {
                if groupings.is_empty() {
                    cells_at_top = true;
                    variant_nest_names.push(None);
                    continue;
                }
                let name = allocate_nest_name(&mut used_names, &groupings[0].dimension);
                let nest = self.col_nest(groupings);
                top.nests.push((name.clone(), nest));
                variant_nest_names.push(Some(name));
            }
            if cells_at_top {
                self.push_display_aggregates(&mut top);
            }
        }

        GeneratedQuery {
            id: String::new(),
            malloy: self.render(&top),
            row_groupings: query.row_groupings.clone(),
            col_groupings: query.col_groupings.clone(),
            additional_col_variants: query.additional_col_variants.clone(),
            variant_nest_names,
            axes_inverted: false,
            is_flat_query: false,
            outer_dimensions,
        }
    }

    fn flat_query(&self, query: &TaggedQuerySpec) -> GeneratedQuery {
        let mut top = Block::default();
        self.push_spec_where(&mut top);

        let mut outer_dimensions = Vec::new();
        for grouping in &query.row_groupings {
            self.apply_grouping(&mut top, grouping, false);
            outer_dimensions.push(grouping.dimension.clone());
        }
        for grouping in &query.col_groupings {
            self.apply_grouping(&mut top, grouping, true);
            outer_dimensions.push(grouping.dimension.clone());
        }
        // Limits cannot be honored per-dimension in a single group_by; the
        // safety limit keeps the host from applying its implicit cap.
        top.limit = Some(FLAT_QUERY_LIMIT);
        self.push_display_aggregates(&mut top);

        GeneratedQuery {
            id: String::new(),
            malloy: self.render(&top),
            row_groupings: query.row_groupings.clone(),
            col_groupings: query.col_groupings.clone(),
            additional_col_variants: query.additional_col_variants.clone(),
            variant_nest_names: vec![None],
            axes_inverted: false,
            is_flat_query: true,
            outer_dimensions,
        }
    }

    fn row_restructured_query(&self, query: &TaggedQuerySpec) -> CompileResult<GeneratedQuery> {
        let limited = query
            .row_groupings
            .iter()
            .position(|g| g.limit.is_some())
            .ok_or_else(|| {
                CompileError::Internal("row restructure without a limited grouping".to_string())
            })?;

        let mut top = Block::default();
        self.push_spec_where(&mut top);
        for grouping in &query.row_groupings[..limited] {
            self.apply_grouping(&mut top, grouping, false);
        }
        let outer_dimensions: Vec<String> = query.row_groupings[..limited]
            .iter()
            .map(|g| g.dimension.clone())
            .collect();

        // Innermost level: the column variants (or the cell aggregates when
        // a variant collapses to the row level).
        let innermost = self.innermost_with_variants(query);

        // Chain the limited dimension and everything after it, inside out.
        let chain = &query.row_groupings[limited..];
        let nested = self.chain_nests(chain, 0, innermost);
        let first = &chain[0];
        top.nests
            .push((format!("by_{}", first.dimension), nested));

        Ok(GeneratedQuery {
            id: String::new(),
            malloy: self.render(&top),
            row_groupings: query.row_groupings.clone(),
            col_groupings: query.col_groupings.clone(),
            additional_col_variants: query.additional_col_variants.clone(),
            variant_nest_names: self.nested_variant_names(query),
            axes_inverted: false,
            is_flat_query: false,
            outer_dimensions,
        })
    }

    fn col_restructured_query(
        &self,
        query: &TaggedQuerySpec,
        inverted_by_across: bool,
    ) -> CompileResult<GeneratedQuery> {
        let mut top = Block::default();
        self.push_spec_where(&mut top);

        let (outer_cols, chain): (&[GroupingInfo], Vec<GroupingInfo>) = if inverted_by_across {
            // The ACROSS dimensions must be grouped in an enclosing scope, so
            // every column dimension goes outer and the limited row chain
            // nests inside.
            (&query.col_groupings, query.row_groupings.clone())
        } else {
            let limited = query
                .col_groupings
                .iter()
                .position(|g| g.limit.is_some())
                .ok_or_else(|| {
                    CompileError::Internal(
                        "column restructure without a limited grouping".to_string(),
                    )
                })?;
            let mut chain: Vec<GroupingInfo> = query.col_groupings[limited..].to_vec();
            chain.extend(query.row_groupings.iter().cloned());
            (&query.col_groupings[..limited], chain)
        };

        for grouping in outer_cols {
            self.apply_grouping(&mut top, grouping, true);
        }
        let outer_dimensions: Vec<String> =
            outer_cols.iter().map(|g| g.dimension.clone()).collect();

        if chain.is_empty() {
            return Err(CompileError::Internal(
                "column restructure with an empty nest chain".to_string(),
            ));
        }
        let mut innermost = Block::default();
        self.push_display_aggregates(&mut innermost);

        // Everything after the first chained dimension nests inside it; the
        // innermost block holds the cell aggregates.
        let col_count = if inverted_by_across {
            0
        } else {
            chain.len() - query.row_groupings.len()
        };
        let nested = self.chain_nests(&chain, col_count, innermost);
        top.nests
            .push((format!("by_{}", chain[0].dimension), nested));

        Ok(GeneratedQuery {
            id: String::new(),
            malloy: self.render(&top),
            row_groupings: query.row_groupings.clone(),
            col_groupings: query.col_groupings.clone(),
            additional_col_variants: query.additional_col_variants.clone(),
            variant_nest_names: vec![self
                .first_nested_col(query, inverted_by_across)
                .map(|d| format!("by_{d}"))],
            axes_inverted: true,
            is_flat_query: false,
            outer_dimensions,
        })
    }

    // ------------------------------------------------------------------
    // Template pieces
    // ------------------------------------------------------------------

    /// Column variants of a query: primary groupings first, then each
    /// additional variant.
    fn variants_of<'q>(&self, query: &'q TaggedQuerySpec) -> Vec<&'q [GroupingInfo]> {
        let mut variants: Vec<&[GroupingInfo]> = vec![&query.col_groupings];
        for variant in &query.additional_col_variants {
            variants.push(&variant.groupings);
        }
        variants
    }

    /// Innermost block of a restructured row chain: cell aggregates when any
    /// variant collapses to the row level, plus one nest per remaining
    /// column variant.
    fn innermost_with_variants(&self, query: &TaggedQuerySpec) -> Block {
        let mut block = Block::default();
        let mut used_names: HashMap<String, usize> = HashMap::new();
        let variants = self.variants_of(query);
        let mut cells_here = variants.iter().all(|v| v.is_empty());
        for groupings in variants {
            if groupings.is_empty() {
                cells_here = true;
                continue;
            }
            let name = allocate_nest_name(&mut used_names, &groupings[0].dimension);
            block.nests.push((name, self.col_nest(groupings)));
        }
        if cells_here {
            self.push_display_aggregates(&mut block);
        }
        block
    }

    fn nested_variant_names(&self, query: &TaggedQuerySpec) -> Vec<Option<String>> {
        let mut used_names: HashMap<String, usize> = HashMap::new();
        self.variants_of(query)
            .into_iter()
            .map(|groupings| {
                if groupings.is_empty() {
                    None
                } else {
                    Some(allocate_nest_name(
                        &mut used_names,
                        &groupings[0].dimension,
                    ))
                }
            })
            .collect()
    }

    fn first_nested_col(
        &self,
        query: &TaggedQuerySpec,
        inverted_by_across: bool,
    ) -> Option<String> {
        if inverted_by_across {
            None
        } else {
            query
                .col_groupings
                .iter()
                .find(|g| g.limit.is_some())
                .map(|g| g.dimension.clone())
        }
    }

    /// A single-variant column nest: all of the variant's dimensions in one
    /// `group_by:`, filtered against NULLs in its own dimensions, with the
    /// cell aggregates.
    fn col_nest(&self, groupings: &[GroupingInfo]) -> Block {
        let mut nest = Block::default();
        for grouping in groupings {
            self.apply_grouping(&mut nest, grouping, true);
        }
        self.push_display_aggregates(&mut nest);
        nest
    }

    /// Build a chain of single-dimension nest levels, inside out. The last
    /// grouping is applied directly onto `innermost` (so cell aggregates
    /// live at that level); each earlier grouping wraps the accumulated
    /// block in a `by_<next dimension>` nest. Returns the block for the
    /// first grouping, which the caller names. The first `col_count`
    /// groupings are column dimensions and get per-level NULL filters.
    fn chain_nests(
        &self,
        groupings: &[GroupingInfo],
        col_count: usize,
        innermost: Block,
    ) -> Block {
        let last = groupings.len() - 1;
        let mut current = innermost;
        self.apply_grouping(&mut current, &groupings[last], last < col_count);
        for index in (0..last).rev() {
            let mut outer = Block::default();
            self.apply_grouping(&mut outer, &groupings[index], index < col_count);
            outer.nests.push((
                format!("by_{}", groupings[index + 1].dimension),
                current,
            ));
            current = outer;
        }
        current
    }

    /// Push the spec-level WHERE (user predicate plus the row NULL filter).
    fn push_spec_where(&self, block: &mut Block) {
        if let Some(where_clause) = &self.spec.where_clause {
            block.where_terms.push(where_clause.clone());
        }
    }

    /// Apply one grouping to a block: output column, NULL filter for column
    /// dimensions, and its ordering or limit.
    fn apply_grouping(&self, block: &mut Block, grouping: &GroupingInfo, is_col: bool) {
        let output = grouping.output_name();
        if output == grouping.dimension {
            block.group_by.push(escape_identifier(&grouping.dimension));
        } else {
            block.group_by.push(format!(
                "{} is {}",
                escape_identifier(&output),
                escape_identifier(&grouping.dimension)
            ));
        }

        if is_col && !self.spec.options.include_nulls {
            block
                .where_terms
                .push(format!("{} is not null", escape_identifier(&grouping.dimension)));
        }

        if let Some(limit) = &grouping.limit {
            block.limit = Some(u64::from(limit.count));
            let field = match &limit.order_by {
                Some(order_by) => self.push_order_aggregate(block, order_by),
                None => self.default_order_field(block),
            };
            block
                .order_by
                .push(format!("{field} {}", direction(limit.direction)));
        } else if let Some(order) = &grouping.order {
            let field = match &order.order_by {
                Some(order_by) => self.push_order_aggregate(block, order_by),
                None => escape_identifier(&output),
            };
            block
                .order_by
                .push(format!("{field} {}", direction(order.direction)));
        } else if self.ordering.has_definition_order(&grouping.dimension) {
            if let Some(companion) = self.ordering.order_dimension_name(&grouping.dimension) {
                let name = format!("{companion}_min");
                block.add_aggregate(
                    &name,
                    &format!("{}.min()", escape_identifier(&companion)),
                );
                block.order_by.push(format!("{name} asc"));
            }
        }
    }

    /// Materialize the aggregate a limit or order sorts by; returns the
    /// output field to reference in `order_by:`.
    fn push_order_aggregate(&self, block: &mut Block, order_by: &OrderBy) -> String {
        match order_by {
            OrderBy::Field(field) => escape_identifier(field),
            OrderBy::Aggregate(agg) => {
                let expr = aggregate_expression(Some(&agg.field), &agg.function);
                if agg.ungrouped_dimensions.is_empty() {
                    let name = AggregateInfo::id(Some(&agg.field), &agg.function);
                    block.add_aggregate(&name, &expr);
                    escape_identifier(&name)
                } else {
                    let dims: Vec<String> = agg
                        .ungrouped_dimensions
                        .iter()
                        .map(|d| escape_identifier(d))
                        .collect();
                    let name = format!(
                        "{}_across",
                        AggregateInfo::id(Some(&agg.field), &agg.function)
                    );
                    block.add_aggregate(&name, &format!("all({expr}, {})", dims.join(", ")));
                    escape_identifier(&name)
                }
            }
            OrderBy::Ratio {
                numerator,
                denominator,
            } => {
                let num_expr = aggregate_expression(Some(&numerator.field), &numerator.function);
                let den_expr =
                    aggregate_expression(Some(&denominator.field), &denominator.function);
                let num_name = AggregateInfo::id(Some(&numerator.field), &numerator.function);
                block.add_aggregate(&num_name, &num_expr);
                let name = format!("{num_name}_ratio");
                block.add_aggregate(&name, &format!("{num_expr} / all({den_expr})"));
                escape_identifier(&name)
            }
        }
    }

    /// Default ordering field for a limit with no explicit orderBy: the
    /// first display aggregate, materialized into this block.
    fn default_order_field(&self, block: &mut Block) -> String {
        let first = &self.spec.aggregates[0];
        block.add_aggregate(&first.name, &self.aggregate_expr(first));
        escape_identifier(&first.name)
    }

    /// Emit every display aggregate at a cell level.
    fn push_display_aggregates(&self, block: &mut Block) {
        for aggregate in &self.spec.aggregates {
            let expr = self.aggregate_expr(aggregate);
            block.add_aggregate(&aggregate.name, &expr);
        }
    }

    fn aggregate_expr(&self, aggregate: &AggregateInfo) -> String {
        match &aggregate.percentage {
            Some(scope) => percentage_expression(
                aggregate.measure.as_deref(),
                &aggregate.function,
                scope,
                &self.spec.row_dimensions(),
                &self.spec.col_dimensions(),
                &self.alias_map(),
            ),
            None => aggregate_expression(aggregate.measure.as_deref(), &aggregate.function),
        }
    }

    /// Dimension name to output name, for percentage scope references.
    fn alias_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        collect_aliases(&self.spec.row_axis, &mut map);
        if let Some(col) = &self.spec.col_axis {
            collect_aliases(col, &mut map);
        }
        map
    }

    fn render(&self, top: &Block) -> String {
        let mut out = format!("run: {} -> {{\n", escape_identifier(self.source));
        top.render(1, &mut out);
        out.push_str("}\n");
        out
    }
}

fn direction(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "asc",
        SortDirection::Desc => "desc",
    }
}

fn allocate_nest_name(used: &mut HashMap<String, usize>, dimension: &str) -> String {
    let count = used.entry(dimension.to_string()).or_insert(0);
    let name = if *count == 0 {
        format!("by_{dimension}")
    } else {
        format!("by_{dimension}_{count}")
    };
    *count += 1;
    name
}

fn collect_aliases(node: &crate::model::node::AxisNode, map: &mut HashMap<String, String>) {
    use crate::model::node::AxisNode;
    match node {
        AxisNode::Dimension(d) => {
            if let Some(label) = &d.label {
                if !label.is_empty() {
                    map.insert(d.name.clone(), label.clone());
                }
            }
            if let Some(child) = &d.child {
                collect_aliases(child, map);
            }
        }
        AxisNode::Total(t) => {
            if let Some(child) = &t.child {
                collect_aliases(child, map);
            }
        }
        AxisNode::Siblings(s) => {
            for child in &s.children {
                collect_aliases(child, map);
            }
        }
        AxisNode::Aggregate(_) | AxisNode::Percentage(_) => {}
    }
}
