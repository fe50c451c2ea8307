use crosstab::compile::{Compiler, CompilerOptions};
use crosstab::tpl::{
    AggregationSpec, AxisExpr, AxisGroup, AxisItem, AxisKind, DimensionRef, LimitSpec,
    MeasureBinding, SortDirection, TableStatement,
};
use crosstab::Dialect;

fn group(items: Vec<AxisItem>) -> AxisGroup {
    AxisGroup {
        items,
        aggregations: Vec::new(),
        format: None,
        label: None,
    }
}

fn dim(name: &str) -> AxisItem {
    AxisItem::Dimension(DimensionRef::new(name))
}

fn binding(measure: &str, functions: &[&str]) -> AxisItem {
    AxisItem::Binding(MeasureBinding {
        measures: vec![measure.to_string()],
        aggregations: functions.iter().map(|f| AggregationSpec::new(f)).collect(),
        format: None,
        label: None,
    })
}

fn statement(rows: Vec<AxisGroup>, cols: Option<Vec<AxisGroup>>) -> TableStatement {
    TableStatement {
        source: None,
        where_clause: None,
        options: Vec::new(),
        row_axis: AxisExpr { groups: rows },
        col_axis: cols.map(|groups| AxisExpr { groups }),
        first_axis: AxisKind::Row,
    }
}

fn compiler() -> Compiler {
    Compiler::new(CompilerOptions::new("births", "birth_data")).unwrap()
}

#[test]
fn test_percentile_derived_source_and_min_rewrite() {
    // TABLE ROWS state[-3] * births.(p25|p50|p75)
    let mut state = DimensionRef::new("state");
    state.limit = Some(LimitSpec {
        count: 3,
        direction: SortDirection::Desc,
        order_by: None,
    });
    let stmt = statement(
        vec![
            group(vec![AxisItem::Dimension(state)]),
            group(vec![binding("births", &["p25", "p50", "p75"])]),
        ],
        None,
    );
    let compilation = compiler().compile_statement(&stmt).unwrap();

    let derived = compilation.derived_sql.as_deref().unwrap();
    for method in ["p25", "p50", "p75"] {
        let quantile = match method {
            "p25" => "0.25",
            "p50" => "0.5",
            _ => "0.75",
        };
        assert!(derived.contains(&format!(
            "quantile_cont(\"births\", {quantile}) OVER (PARTITION BY \"state\") AS \"__births_{method}__state\""
        )));
    }
    assert!(derived.starts_with("SELECT *, "));
    assert!(derived.contains("FROM birth_data"));

    // The derived source is wrapped as the model's source definition.
    assert!(compilation
        .preamble
        .contains("source: births is duckdb.sql(\"\"\"SELECT *"));

    // The statement now reads the columns back through .min.
    assert_eq!(compilation.queries.len(), 1);
    let malloy = &compilation.queries[0].malloy;
    assert!(malloy.contains("__births_p25__state_min is __births_p25__state.min()"));
    assert!(malloy.contains("__births_p50__state_min is __births_p50__state.min()"));

    // Display labels carry the measure and uppercased method.
    let labels: Vec<Option<&str>> = compilation
        .spec
        .aggregates
        .iter()
        .map(|a| a.label.as_deref())
        .collect();
    assert_eq!(
        labels,
        vec![Some("births P25"), Some("births P50"), Some("births P75")]
    );
}

#[test]
fn test_bigquery_dialect_uses_percentile_cont() {
    let options = CompilerOptions::new("births", "birth_data").with_dialect(Dialect::BigQuery);
    let compiler = Compiler::new(options).unwrap();
    let stmt = statement(
        vec![
            group(vec![dim("state")]),
            group(vec![binding("births", &["median"])]),
        ],
        None,
    );
    let compilation = compiler.compile_statement(&stmt).unwrap();
    let derived = compilation.derived_sql.as_deref().unwrap();
    assert!(derived.contains("PERCENTILE_CONT(`births`, 0.5) OVER (PARTITION BY `state`)"));
}

#[test]
fn test_outer_total_references_reduced_partition_level() {
    // TABLE ROWS state * births.p50 COLS gender | ALL
    let stmt = statement(
        vec![
            group(vec![dim("state")]),
            group(vec![binding("births", &["p50"])]),
        ],
        Some(vec![group(vec![dim("gender"), AxisItem::All { label: None }])]),
    );
    let compilation = compiler().compile_statement(&stmt).unwrap();
    assert_eq!(compilation.queries.len(), 1);
    let malloy = &compilation.queries[0].malloy;

    // Cells inside the gender nest keep the full-level column; the outer
    // (ALL) aggregate reads the column partitioned by state alone.
    let mut outer_line = None;
    let mut nested_line = None;
    for line in malloy.lines() {
        if line.starts_with("  aggregate:") {
            outer_line = Some(line);
        }
        if line.starts_with("    aggregate:") {
            nested_line = Some(line);
        }
    }
    assert!(outer_line.unwrap().contains("is __births_p50__state.min()"));
    assert!(nested_line
        .unwrap()
        .contains("is __births_p50__gender_state.min()"));

    // Both partitions appear in the derived source.
    let derived = compilation.derived_sql.as_deref().unwrap();
    assert!(derived.contains("PARTITION BY \"gender\", \"state\""));
    assert!(derived.contains("AS \"__births_p50__state\""));
}

#[test]
fn test_mixed_binding_keeps_plain_aggregations() {
    let stmt = statement(
        vec![
            group(vec![dim("state")]),
            group(vec![binding("births", &["sum", "p50"])]),
        ],
        None,
    );
    let compilation = compiler().compile_statement(&stmt).unwrap();
    let names: Vec<&str> = compilation
        .spec
        .aggregates
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(names, vec!["births_sum", "__births_p50__state_min"]);
}

#[test]
fn test_no_percentiles_no_derived_source() {
    let stmt = statement(
        vec![group(vec![dim("state")]), group(vec![binding("births", &["sum"])])],
        None,
    );
    let compilation = compiler().compile_statement(&stmt).unwrap();
    assert!(compilation.derived_sql.is_none());
    assert!(compilation
        .preamble
        .contains("source: births is duckdb.table('birth_data')"));
}
