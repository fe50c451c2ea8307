use crosstab::dimension::{DimensionCatalog, DimensionDefinition};
use crosstab::malloy::MalloyGenerator;
use crosstab::model::build_table_spec;
use crosstab::planner::build_query_plan;
use crosstab::tpl::{
    AggregationSpec, AxisExpr, AxisGroup, AxisItem, AxisKind, DenominatorScope, DimensionRef,
    LimitSpec, MeasureBinding, OrderBy, OrderByAggregate, PercentageRef, SortDirection,
    TableStatement,
};

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

fn dim_limited(name: &str, count: u32) -> AxisItem {
    let mut dref = DimensionRef::new(name);
    dref.limit = Some(LimitSpec {
        count,
        direction: SortDirection::Desc,
        order_by: None,
    });
    AxisItem::Dimension(dref)
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

fn generate(stmt: &TableStatement, catalog: &DimensionCatalog) -> Vec<crosstab::prelude::GeneratedQuery> {
    let spec = build_table_spec(stmt).unwrap();
    let plan = build_query_plan(&spec).unwrap();
    MalloyGenerator::new(&spec, catalog, "births")
        .generate(&plan)
        .unwrap()
}

#[test]
fn test_merged_query_with_outer_total() {
    // TABLE ROWS state[-3] * births.sum COLS gender | ALL
    let stmt = statement(
        vec![
            group(vec![dim_limited("state", 3)]),
            group(vec![births_sum()]),
        ],
        Some(vec![group(vec![dim("gender"), AxisItem::All { label: None }])]),
    );
    let queries = generate(&stmt, &DimensionCatalog::default());
    assert_eq!(queries.len(), 1);

    insta::assert_snapshot!(queries[0].malloy, @r###"
    run: births -> {
      where: state is not null
      group_by: state
      aggregate: births_sum is births.sum()
      nest: by_gender is {
        where: gender is not null
        group_by: gender
        aggregate: births_sum is births.sum()
      }
      order_by: births_sum desc
      limit: 3
    }
    "###);
    assert!(!queries[0].axes_inverted);
    assert!(!queries[0].is_flat_query);
}

#[test]
fn test_null_filters_stay_inside_their_nests() {
    // COLS gender | occupation: each section filters only its own
    // dimension.
    let stmt = statement(
        vec![group(vec![dim("state")]), group(vec![births_sum()])],
        Some(vec![group(vec![dim("gender"), dim("occupation")])]),
    );
    let queries = generate(&stmt, &DimensionCatalog::default());
    assert_eq!(queries.len(), 1);
    let malloy = &queries[0].malloy;

    let top_where: Vec<&str> = malloy
        .lines()
        .filter(|l| l.starts_with("  where:"))
        .collect();
    assert_eq!(top_where, vec!["  where: state is not null"]);

    assert!(malloy.contains("nest: by_gender is {\n    where: gender is not null"));
    assert!(malloy.contains("nest: by_occupation is {\n    where: occupation is not null"));
}

#[test]
fn test_distinct_count_vs_row_count() {
    // count and name.count side by side produce different expressions.
    let stmt = statement(
        vec![
            group(vec![dim("state")]),
            group(vec![
                AxisItem::Aggregation(AggregationSpec::new("count")),
                AxisItem::Binding(MeasureBinding {
                    measures: vec!["name".to_string()],
                    aggregations: vec![AggregationSpec::new("count")],
                    format: None,
                    label: None,
                }),
            ]),
        ],
        None,
    );
    let queries = generate(&stmt, &DimensionCatalog::default());
    let malloy = &queries[0].malloy;
    assert!(malloy.contains("`count` is count()"));
    assert!(malloy.contains("name_count is count(name)"));
}

#[test]
fn test_col_limit_restructures_and_inverts() {
    // TABLE ROWS state * births.sum COLS year[-3]
    let stmt = statement(
        vec![group(vec![dim("state")]), group(vec![births_sum()])],
        Some(vec![group(vec![dim_limited("year", 3)])]),
    );
    let queries = generate(&stmt, &DimensionCatalog::default());
    assert_eq!(queries.len(), 1);
    let query = &queries[0];

    assert!(query.axes_inverted);
    let malloy = &query.malloy;
    assert!(malloy.contains("nest: by_year is {"));
    assert!(malloy.contains("limit: 3"));
    assert!(malloy.contains("order_by: births_sum desc"));
    assert!(malloy.contains("nest: by_state is {"));
    // The limited column nest encloses the row nest.
    let year_at = malloy.find("nest: by_year").unwrap();
    let state_at = malloy.find("nest: by_state").unwrap();
    assert!(year_at < state_at);
}

#[test]
fn test_row_limit_with_multiple_row_dims_restructures() {
    // TABLE ROWS state[-3] * city * births.sum COLS year
    let stmt = statement(
        vec![
            group(vec![dim_limited("state", 3)]),
            group(vec![dim("city")]),
            group(vec![births_sum()]),
        ],
        Some(vec![group(vec![dim("year")])]),
    );
    let queries = generate(&stmt, &DimensionCatalog::default());
    let query = &queries[0];
    assert!(!query.axes_inverted);

    let malloy = &query.malloy;
    let state_at = malloy.find("nest: by_state").unwrap();
    let city_at = malloy.find("nest: by_city").unwrap();
    let year_at = malloy.find("nest: by_year").unwrap();
    assert!(state_at < city_at && city_at < year_at);
    assert!(malloy.contains("limit: 3"));
}

#[test]
fn test_across_ordering_inverts_axes() {
    // TABLE ROWS state[-5@(births.sum ACROSS name)] * births.sum COLS name
    let mut state = DimensionRef::new("state");
    state.limit = Some(LimitSpec {
        count: 5,
        direction: SortDirection::Desc,
        order_by: Some(OrderBy::Aggregate(OrderByAggregate {
            field: "births".to_string(),
            function: "sum".to_string(),
            ungrouped_dimensions: vec!["name".to_string()],
        })),
    });
    let stmt = statement(
        vec![
            group(vec![AxisItem::Dimension(state)]),
            group(vec![births_sum()]),
        ],
        Some(vec![group(vec![dim("name")])]),
    );
    let queries = generate(&stmt, &DimensionCatalog::default());
    let query = &queries[0];

    assert!(query.axes_inverted);
    let malloy = &query.malloy;
    assert!(malloy.contains("group_by: name"));
    assert!(malloy.contains("nest: by_state is {"));
    assert!(malloy.contains("births_sum_across is all(births.sum(), name)"));
    assert!(malloy.contains("order_by: births_sum_across desc"));
    assert!(malloy.contains("limit: 5"));
}

#[test]
fn test_percentage_across_cols_emits_flat_query() {
    // TABLE ROWS occupation * (count ACROSS COLS) COLS education
    let stmt = statement(
        vec![
            group(vec![dim("occupation")]),
            group(vec![AxisItem::Percentage(PercentageRef {
                measure: None,
                aggregation: "count".to_string(),
                scope: DenominatorScope::Cols,
                format: None,
                label: None,
            })]),
        ],
        Some(vec![group(vec![dim("education")])]),
    );
    let queries = generate(&stmt, &DimensionCatalog::default());
    let query = &queries[0];

    assert!(query.is_flat_query);
    let malloy = &query.malloy;
    assert!(malloy.contains("group_by: occupation, education"));
    assert!(malloy.contains("count_pct is 100.0 * count() / all(count(), occupation)"));
    assert!(malloy.contains("limit: 10000"));
    assert!(malloy.contains("where: occupation is not null and education is not null"));
}

#[test]
fn test_definition_order_adds_ordering_aggregate() {
    let catalog = DimensionCatalog::new(&[DimensionDefinition::new(
        "agegroup",
        "Minor when age < 18 | Adult when age < 65 | else Senior",
    )])
    .unwrap();
    let stmt = statement(
        vec![group(vec![dim("agegroup")]), group(vec![births_sum()])],
        None,
    );
    let queries = generate(&stmt, &catalog);
    let malloy = &queries[0].malloy;

    assert!(malloy.contains("agegroup_def_order_min is agegroup_def_order.min()"));
    assert!(malloy.contains("order_by: agegroup_def_order_min asc"));
}

#[test]
fn test_aliased_grouping_renames_output() {
    let mut dref = DimensionRef::new("state");
    dref.label = Some("State Name".to_string());
    let stmt = statement(
        vec![
            group(vec![AxisItem::Dimension(dref)]),
            group(vec![births_sum()]),
        ],
        None,
    );
    let queries = generate(&stmt, &DimensionCatalog::default());
    assert!(queries[0]
        .malloy
        .contains("group_by: `State Name` is state"));
}

#[test]
fn test_reserved_identifier_is_escaped() {
    let stmt = statement(
        vec![group(vec![dim("year")]), group(vec![births_sum()])],
        None,
    );
    let queries = generate(&stmt, &DimensionCatalog::default());
    assert!(queries[0].malloy.contains("group_by: `year`"));
}
