//! Backend dialect differences for the derived-source SQL.
//!
//! The Malloy surface is dialect-independent; only the percentile rewrite
//! emits raw SQL, so the trait covers exactly what that rewrite needs:
//! identifier quoting and the continuous-percentile window function.

/// SQL dialect trait for derived-source generation.
pub trait SqlDialect: std::fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    /// Quote an identifier (column, alias).
    ///
    /// - DuckDB: `"identifier"`
    /// - BigQuery: `` `identifier` ``
    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Emit the continuous-percentile window function over a partition.
    fn percentile_over(&self, measure: &str, quantile: f64, partition: &[String]) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn percentile_over(&self, measure: &str, quantile: f64, partition: &[String]) -> String {
        let mut sql = format!(
            "quantile_cont({}, {quantile}) OVER (",
            self.quote_identifier(measure)
        );
        if !partition.is_empty() {
            sql.push_str(&format!("PARTITION BY {}", partition.join(", ")));
        }
        sql.push(')');
        sql
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BigQuery;

impl SqlDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn percentile_over(&self, measure: &str, quantile: f64, partition: &[String]) -> String {
        let mut sql = format!(
            "PERCENTILE_CONT({}, {quantile}) OVER (",
            self.quote_identifier(measure)
        );
        if !partition.is_empty() {
            sql.push_str(&format!("PARTITION BY {}", partition.join(", ")));
        }
        sql.push(')');
        sql
    }
}

/// Supported backend dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    DuckDb,
    BigQuery,
}

impl Dialect {
    fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::BigQuery => &BigQuery,
        }
    }
}

impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn percentile_over(&self, measure: &str, quantile: f64, partition: &[String]) -> String {
        self.dialect().percentile_over(measure, quantile, partition)
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}
