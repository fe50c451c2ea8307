//! End-to-end compilation from a TPL statement to a renderable grid.
//!
//! ```text
//! TPL source → AST → TableSpec → QueryPlan → Malloy query set → GridSpec
//! ```
//!
//! The orchestrator threads the source name, user WHERE, dialect, and the
//! dimension catalog through the stages, and exposes a single entry point to
//! consumers. The grammar front end and the executing engine are external:
//! both arrive as trait objects.
//!
//! Data flow is one-way and every stage is pure on its inputs. The two
//! stage-scoped contexts (the generator's and the grid builder's hold of the
//! ordering provider) live only for their method call: they are created on
//! entry and dropped on every exit path, so nothing leaks across
//! compilations.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::dimension::defs::ParsedDimension;
use crate::dimension::{DimensionCatalog, DimensionDefinition, DimensionOrderingProvider};
use crate::error::{CompileError, CompileResult};
use crate::grid::{GridBuilder, GridSpec};
use crate::malloy::generator::{GeneratedQuery, MalloyGenerator};
use crate::malloy::reserved::escape_identifier;
use crate::model::builder::build_table_spec;
use crate::model::spec::TableSpec;
use crate::percentile::{self, PercentilePlan};
use crate::planner::{build_query_plan, QueryPlan};
use crate::sql::Dialect;
use crate::tpl::{DenominatorScope, TableStatement};

/// The grammar front end: TPL source to AST.
pub trait StatementParser: Send + Sync {
    fn parse(&self, source: &str) -> CompileResult<TableStatement>;
}

/// One query handed to the executor.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub id: String,
    pub malloy: String,
    /// Model preamble declaring the named source (and the derived source
    /// when percentiles were rewritten).
    pub preamble: String,
    pub axes_inverted: bool,
    pub is_flat_query: bool,
}

/// The engine that runs Malloy queries and returns flat-or-nested row
/// objects.
#[async_trait::async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> CompileResult<Vec<Value>>;
}

// ============================================================================
// Options
// ============================================================================

/// Options threaded through a compilation.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Name of the Malloy source the queries select from.
    pub source_name: String,
    /// Physical table behind the source.
    pub table: String,
    /// WHERE predicate applied to every query.
    pub where_clause: Option<String>,
    pub dialect: Dialect,
    /// User-authored dimension definitions.
    pub dimensions: Vec<DimensionDefinition>,
}

impl CompilerOptions {
    pub fn new(source_name: &str, table: &str) -> Self {
        Self {
            source_name: source_name.into(),
            table: table.into(),
            where_clause: None,
            dialect: Dialect::default(),
            dimensions: Vec::new(),
        }
    }

    pub fn with_where(mut self, where_clause: &str) -> Self {
        self.where_clause = Some(where_clause.into());
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_dimensions(mut self, dimensions: Vec<DimensionDefinition>) -> Self {
        self.dimensions = dimensions;
        self
    }
}

// ============================================================================
// Results
// ============================================================================

/// Everything produced by compilation short of execution.
#[derive(Debug)]
pub struct Compilation {
    pub spec: TableSpec,
    pub plan: QueryPlan,
    pub queries: Vec<GeneratedQuery>,
    pub preamble: String,
    pub derived_sql: Option<String>,
}

/// The executed result: the grid plus the queries that produced it.
#[derive(Debug)]
pub struct CompiledTable {
    pub grid: GridSpec,
    pub queries: Vec<GeneratedQuery>,
}

// ============================================================================
// Compiler
// ============================================================================

pub struct Compiler {
    options: CompilerOptions,
    catalog: DimensionCatalog,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> CompileResult<Self> {
        let catalog = DimensionCatalog::new(&options.dimensions)?;
        Ok(Self { options, catalog })
    }

    /// Compile a pre-parsed statement to its executable query set.
    pub fn compile_statement(&self, stmt: &TableStatement) -> CompileResult<Compilation> {
        let mut stmt = stmt.clone();
        stmt.where_clause = merge_where(
            self.options.where_clause.as_deref(),
            stmt.where_clause.as_deref(),
        );

        // Percentiles rewrite the statement before every other stage.
        let percentile_plan = percentile::build_plan(
            &stmt,
            &self.options.table,
            stmt.where_clause.as_deref(),
            &self.catalog,
            self.options.dialect,
        )?;
        if let Some(plan) = &percentile_plan {
            validate_embeddable_sql(&plan.derived_sql)?;
            stmt = percentile::rewrite_statement(&stmt, plan);
            debug!(
                pairs = plan.pairs.len(),
                levels = plan.levels.len(),
                "percentile rewrite applied"
            );
        }

        let spec = build_table_spec(&stmt)?;
        validate_percentage_scopes(&spec)?;
        let plan = build_query_plan(&spec)?;

        let queries = {
            let generator =
                MalloyGenerator::new(&spec, &self.catalog, &self.options.source_name);
            generator.generate(&plan)?
        };
        let queries = match &percentile_plan {
            Some(pplan) => queries
                .into_iter()
                .map(|mut q| {
                    q.malloy =
                        percentile::fixup_outer_references(&q.malloy, pplan, &q.outer_dimensions);
                    q
                })
                .collect(),
            None => queries,
        };

        let preamble = self.preamble(percentile_plan.as_ref())?;
        Ok(Compilation {
            spec,
            plan,
            queries,
            preamble,
            derived_sql: percentile_plan.map(|p| p.derived_sql),
        })
    }

    /// Compile and execute a pre-parsed statement.
    pub async fn query_statement(
        &self,
        stmt: &TableStatement,
        executor: &dyn QueryExecutor,
    ) -> CompileResult<CompiledTable> {
        let compilation = self.compile_statement(stmt)?;

        let mut results: HashMap<String, Vec<Value>> = HashMap::new();
        for query in &compilation.queries {
            let request = ExecutionRequest {
                id: query.id.clone(),
                malloy: query.malloy.clone(),
                preamble: compilation.preamble.clone(),
                axes_inverted: query.axes_inverted,
                is_flat_query: query.is_flat_query,
            };
            let rows = executor.execute(&request).await?;
            results.insert(query.id.clone(), rows);
        }

        let grid = {
            let builder = GridBuilder::new(&compilation.spec, &self.catalog);
            builder.build(&compilation.queries, &results)?
        };
        Ok(CompiledTable {
            grid,
            queries: compilation.queries,
        })
    }

    /// Parse, compile, and execute a TPL statement.
    pub async fn query(
        &self,
        tpl: &str,
        parser: &dyn StatementParser,
        executor: &dyn QueryExecutor,
    ) -> CompileResult<CompiledTable> {
        let stmt = parser.parse(tpl)?;
        self.query_statement(&stmt, executor).await
    }

    /// The model preamble: the named source definition, the dimension
    /// declarations, and the synthesized ordering companions.
    fn preamble(&self, percentile_plan: Option<&PercentilePlan>) -> CompileResult<String> {
        let connection = match self.options.dialect {
            Dialect::DuckDb => "duckdb",
            Dialect::BigQuery => "bigquery",
        };
        let mut source = match percentile_plan {
            Some(plan) => format!(
                "source: {} is {connection}.sql(\"\"\"{}\"\"\")",
                escape_identifier(&self.options.source_name),
                plan.derived_sql
            ),
            None => format!(
                "source: {} is {connection}.table('{}')",
                escape_identifier(&self.options.source_name),
                self.options.table
            ),
        };

        let mut declarations: Vec<String> = self
            .options
            .dimensions
            .iter()
            .filter_map(|def| self.catalog.get(&def.name))
            .map(|parsed| {
                format!(
                    "  dimension: {} is {}",
                    escape_identifier(&parsed.name),
                    malloy_dimension_expression(parsed)
                )
            })
            .collect();
        for auto in self.catalog.auto_order_dimensions() {
            declarations.push(format!(
                "  dimension: {} is {}",
                escape_identifier(&auto.name),
                auto.expression
            ));
        }

        if !declarations.is_empty() {
            source.push_str(" extend {\n");
            source.push_str(&declarations.join("\n"));
            source.push_str("\n}");
        }
        source.push('\n');
        Ok(source)
    }
}

/// Malloy expression for a user dimension: the aliased column, or a `pick`
/// over the bucketing's branches.
fn malloy_dimension_expression(parsed: &ParsedDimension) -> String {
    match &parsed.raw_column {
        Some(column) => escape_identifier(column),
        None => {
            let mut expr = String::new();
            for branch in &parsed.branches {
                expr.push_str(&format!("pick '{}' when {} ", branch.label, branch.condition));
            }
            match &parsed.else_label {
                Some(label) => expr.push_str(&format!("else '{label}'")),
                None => expr.push_str("else null"),
            }
            expr
        }
    }
}

fn merge_where(global: Option<&str>, statement: Option<&str>) -> Option<String> {
    match (global, statement) {
        (Some(g), Some(s)) => Some(format!("({g}) and ({s})")),
        (Some(g), None) => Some(g.to_string()),
        (None, Some(s)) => Some(s.to_string()),
        (None, None) => None,
    }
}

/// Raw SQL embedded in the model is wrapped in a triple-quoted literal; a
/// triple quote inside it would terminate the literal early.
fn validate_embeddable_sql(sql: &str) -> CompileResult<()> {
    if sql.contains("\"\"\"") {
        return Err(CompileError::Validation(
            "embedded SQL contains a triple-quote delimiter".to_string(),
        ));
    }
    Ok(())
}

/// An explicit percentage scope may only name dimensions grouped somewhere
/// in the statement.
fn validate_percentage_scopes(spec: &TableSpec) -> CompileResult<()> {
    let known = spec.all_dimensions();
    for aggregate in &spec.aggregates {
        if let Some(DenominatorScope::Dimensions(dims)) = &aggregate.percentage {
            for dim in dims {
                if !known.contains(dim) {
                    return Err(CompileError::Validation(format!(
                        "percentage scope references ungrouped dimension '{dim}'"
                    )));
                }
            }
        }
    }
    Ok(())
}
