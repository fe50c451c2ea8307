use std::collections::HashMap;

use crosstab::compile::{Compiler, CompilerOptions};
use crosstab::dimension::DimensionCatalog;
use crosstab::grid::{GridBuilder, GridSpec, HeaderKind};
use crosstab::tpl::{
    AggregationSpec, AxisExpr, AxisGroup, AxisItem, AxisKind, DimensionRef, LimitSpec,
    MeasureBinding, SortDirection, TableStatement,
};
use serde_json::{json, Value};

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

fn births_sum() -> AxisItem {
    AxisItem::Binding(MeasureBinding {
        measures: vec!["births".to_string()],
        aggregations: vec![AggregationSpec::new("sum")],
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

fn build_grid(stmt: &TableStatement, rows_by_query: Vec<Vec<Value>>) -> GridSpec {
    let compiler = Compiler::new(CompilerOptions::new("births", "birth_data")).unwrap();
    let compilation = compiler.compile_statement(stmt).unwrap();
    assert_eq!(compilation.queries.len(), rows_by_query.len());

    let mut results: HashMap<String, Vec<Value>> = HashMap::new();
    for (query, rows) in compilation.queries.iter().zip(rows_by_query) {
        results.insert(query.id.clone(), rows);
    }
    let catalog = DimensionCatalog::default();
    GridBuilder::new(&compilation.spec, &catalog)
        .build(&compilation.queries, &results)
        .unwrap()
}

fn pair(name: &str, value: &str) -> (String, String) {
    (name.to_string(), value.to_string())
}

#[test]
fn test_merged_query_grid_with_totals() {
    // TABLE ROWS state[-3] * births.sum COLS gender | ALL
    let mut state = DimensionRef::new("state");
    state.limit = Some(LimitSpec {
        count: 3,
        direction: SortDirection::Desc,
        order_by: None,
    });
    let stmt = statement(
        vec![
            group(vec![AxisItem::Dimension(state)]),
            group(vec![births_sum()]),
        ],
        Some(vec![group(vec![dim("gender"), AxisItem::All { label: None }])]),
    );

    let rows = vec![json!([
        {"state": "CA", "births_sum": 500,
         "by_gender": [{"gender": "F", "births_sum": 260}, {"gender": "M", "births_sum": 240}]},
        {"state": "TX", "births_sum": 400,
         "by_gender": [{"gender": "F", "births_sum": 210}, {"gender": "M", "births_sum": 190}]},
        {"state": "NY", "births_sum": 300,
         "by_gender": [{"gender": "F", "births_sum": 160}, {"gender": "M", "births_sum": 140}]}
    ])];
    let rows = rows
        .into_iter()
        .map(|v| v.as_array().unwrap().clone())
        .collect();
    let grid = build_grid(&stmt, rows);

    // Limited dimension keeps rowset order.
    let row_values: Vec<&str> = grid.row_headers.iter().map(|h| h.value.as_str()).collect();
    assert_eq!(row_values, vec!["CA", "TX", "NY"]);

    // Two gender values plus the Total header.
    let col_values: Vec<&str> = grid.col_headers.iter().map(|h| h.value.as_str()).collect();
    assert_eq!(col_values, vec!["F", "M", "Total"]);
    assert!(grid.has_col_total);
    assert!(!grid.has_row_total);

    // Cells, including the outer-aggregate total column.
    let cell = grid.get_cell(&[pair("state", "CA")], &[pair("gender", "F")], None);
    assert_eq!(cell.raw, Some(260.0));
    let total = grid.get_cell(&[pair("state", "CA")], &[], None);
    assert_eq!(total.raw, Some(500.0));
    assert_eq!(total.formatted, "500");

    // Each total cell equals the sum of its gender cells.
    for state in ["CA", "TX", "NY"] {
        let f = grid.get_cell(&[pair("state", state)], &[pair("gender", "F")], None);
        let m = grid.get_cell(&[pair("state", state)], &[pair("gender", "M")], None);
        let total = grid.get_cell(&[pair("state", state)], &[], None);
        assert_eq!(total.raw, Some(f.raw.unwrap() + m.raw.unwrap()));
    }
}

#[test]
fn test_cell_key_is_axis_independent() {
    let stmt = statement(
        vec![group(vec![dim("state")]), group(vec![births_sum()])],
        Some(vec![group(vec![dim("gender")])]),
    );
    let rows = vec![vec![json!(
        {"state": "CA", "by_gender": [{"gender": "F", "births_sum": 10}]}
    )]];
    let grid = build_grid(&stmt, rows);

    let a = grid.get_cell(&[pair("state", "CA")], &[pair("gender", "F")], None);
    let b = grid.get_cell(&[pair("gender", "F")], &[pair("state", "CA")], None);
    assert_eq!(a.raw, Some(10.0));
    assert_eq!(a.raw, b.raw);
}

#[test]
fn test_header_spans_sum_bottom_up() {
    // COLS gender * year, sparse under one gender.
    let stmt = statement(
        vec![group(vec![dim("state")]), group(vec![births_sum()])],
        Some(vec![group(vec![dim("gender")]), group(vec![dim("year")])]),
    );
    let rows = vec![vec![json!(
        {"state": "CA", "by_gender": [
            {"gender": "F", "year": 2020, "births_sum": 1},
            {"gender": "F", "year": 2021, "births_sum": 2},
            {"gender": "M", "year": 2020, "births_sum": 3}
        ]}
    )]];
    let grid = build_grid(&stmt, rows);

    assert_eq!(grid.col_headers.len(), 2);
    let f = &grid.col_headers[0];
    let m = &grid.col_headers[1];
    assert_eq!(f.value, "F");
    assert_eq!(f.span, 2);
    assert_eq!(f.children.len(), 2);
    assert!(f.children.iter().all(|c| c.span == 1));
    // The child dimension only shows values observed under its parent.
    assert_eq!(m.span, 1);
    assert_eq!(m.children.len(), 1);
    assert_eq!(m.children[0].value, "2020");
}

#[test]
fn test_date_normalization_in_headers() {
    let stmt = statement(
        vec![group(vec![dim("month")]), group(vec![births_sum()])],
        None,
    );
    let rows = vec![vec![
        json!({"month": {"value": "2020-02-01T00:00:00"}, "births_sum": 2}),
        json!({"month": "2020-01-01 00:00:00", "births_sum": 1}),
    ]];
    let grid = build_grid(&stmt, rows);

    let values: Vec<&str> = grid.row_headers.iter().map(|h| h.value.as_str()).collect();
    assert_eq!(values, vec!["2020-01-01", "2020-02-01"]);
    assert!(values.iter().all(|v| !v.contains("object")));
}

#[test]
fn test_null_appears_as_sentinel_value() {
    let stmt = statement(
        vec![group(vec![dim("state")]), group(vec![births_sum()])],
        None,
    );
    let mut stmt = stmt;
    stmt.options
        .push(("includeNulls".to_string(), "true".to_string()));
    let rows = vec![vec![
        json!({"state": "CA", "births_sum": 1}),
        json!({"state": null, "births_sum": 2}),
    ]];
    let grid = build_grid(&stmt, rows);

    let values: Vec<&str> = grid.row_headers.iter().map(|h| h.value.as_str()).collect();
    assert!(values.contains(&"(null)"));
    let cell = grid.get_cell(&[pair("state", "(null)")], &[], None);
    assert_eq!(cell.raw, Some(2.0));
}

#[test]
fn test_suppressed_label_interleaves_totals() {
    // TABLE ROWS (state "" | ALL) * births.sum
    let mut state = DimensionRef::new("state");
    state.label = Some(String::new());
    let stmt = statement(
        vec![
            group(vec![AxisItem::Dimension(state), AxisItem::All { label: None }]),
            group(vec![births_sum()]),
        ],
        None,
    );
    let rows = vec![
        vec![
            json!({"state": "CA", "births_sum": 1}),
            json!({"state": "TX", "births_sum": 2}),
        ],
        vec![json!({"births_sum": 3})],
    ];
    let grid = build_grid(&stmt, rows);

    // No sibling-label wrapper: values and the Total sit at the same depth.
    let kinds: Vec<HeaderKind> = grid.row_headers.iter().map(|h| h.kind).collect();
    assert_eq!(
        kinds,
        vec![HeaderKind::Dimension, HeaderKind::Dimension, HeaderKind::Total]
    );
    assert!(grid.row_headers.iter().all(|h| h.depth == 0));
    assert!(grid.has_row_total);

    let grand = grid.get_cell(&[], &[], None);
    assert_eq!(grand.raw, Some(3.0));
}

#[test]
fn test_true_siblings_force_left_mode() {
    // TABLE ROWS (state | region) * births.sum
    let stmt = statement(
        vec![
            group(vec![dim("state"), dim("region")]),
            group(vec![births_sum()]),
        ],
        None,
    );
    let rows = vec![
        vec![json!({"state": "CA", "births_sum": 1})],
        vec![json!({"region": "West", "births_sum": 4})],
    ];
    let grid = build_grid(&stmt, rows);

    assert!(!grid.use_corner_row_headers);
    assert!(grid.corner_row_labels.is_none());
    assert!(grid.left_mode_row_labels.is_some());

    // True siblings wrap each section in a label node.
    let kinds: Vec<HeaderKind> = grid.row_headers.iter().map(|h| h.kind).collect();
    assert_eq!(kinds, vec![HeaderKind::SiblingLabel, HeaderKind::SiblingLabel]);
    assert_eq!(grid.row_headers[0].value, "state");
    assert_eq!(grid.row_headers[1].value, "region");
}

#[test]
fn test_corner_labels_follow_row_chain() {
    let mut state = DimensionRef::new("state");
    state.label = Some("State".to_string());
    let stmt = statement(
        vec![
            group(vec![AxisItem::Dimension(state)]),
            group(vec![dim("gender")]),
            group(vec![births_sum()]),
        ],
        None,
    );
    let rows = vec![vec![json!(
        {"State": "CA", "gender": "F", "births_sum": 1}
    )]];
    let grid = build_grid(&stmt, rows);

    assert!(grid.use_corner_row_headers);
    let labels = grid.corner_row_labels.as_ref().unwrap();
    assert_eq!(labels.len(), 2);
    assert_eq!(labels[0].dimension, "state");
    assert_eq!(labels[0].label, "State");
    assert_eq!(labels[1].dimension, "gender");
    assert_eq!(labels[1].label, "gender");
}

#[test]
fn test_aggregate_only_row_axis() {
    // TABLE ROWS births.(sum|mean) COLS year
    let stmt = statement(
        vec![group(vec![AxisItem::Binding(MeasureBinding {
            measures: vec!["births".to_string()],
            aggregations: vec![AggregationSpec::new("sum"), AggregationSpec::new("mean")],
            format: None,
            label: None,
        })])],
        Some(vec![group(vec![dim("year")])]),
    );
    let rows = vec![vec![
        json!({"year": 2020, "births_sum": 10, "births_mean": 5}),
        json!({"year": 2021, "births_sum": 20, "births_mean": 8}),
    ]];
    let grid = build_grid(&stmt, rows);

    let row_values: Vec<&str> = grid.row_headers.iter().map(|h| h.value.as_str()).collect();
    assert_eq!(row_values, vec!["births sum", "births mean"]);

    let cell = grid.get_cell(&[], &[pair("year", "2021")], Some("births_mean"));
    assert_eq!(cell.raw, Some(8.0));
}
