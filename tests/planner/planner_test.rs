use crosstab::model::build_table_spec;
use crosstab::planner::build_query_plan;
use crosstab::tpl::{
    AggregationSpec, AxisExpr, AxisGroup, AxisItem, AxisKind, DimensionRef, LimitSpec,
    MeasureBinding, SortDirection, TableStatement,
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

#[test]
fn test_col_alternation_merges_to_single_query() {
    // ROWS state[-3] * births.sum COLS gender | ALL
    let stmt = statement(
        vec![
            group(vec![dim_limited("state", 3)]),
            group(vec![births_sum()]),
        ],
        Some(vec![group(vec![dim("gender"), AxisItem::All { label: None }])]),
    );
    let spec = build_table_spec(&stmt).unwrap();
    let plan = build_query_plan(&spec).unwrap();

    assert_eq!(plan.queries.len(), 1);
    let query = &plan.queries[0];
    assert_eq!(query.id, "q0");
    assert_eq!(query.col_groupings.len(), 1);
    assert_eq!(query.col_groupings[0].dimension, "gender");
    assert_eq!(query.additional_col_variants.len(), 1);
    assert!(query.additional_col_variants[0].groupings.is_empty());
    assert!(query.has_col_total);
    assert_eq!(plan.merge_order, vec!["q0"]);

    // Both original path keys resolve to the merged query.
    assert_eq!(plan.path_to_query.len(), 2);
    assert!(plan.path_to_query.values().all(|id| id == "q0"));
}

#[test]
fn test_row_subtotals_dedup_to_four_queries() {
    // ROWS (state | ALL) * (gender | ALL) * births.sum COLS year[-3]
    let stmt = statement(
        vec![
            group(vec![dim("state"), AxisItem::All { label: None }]),
            group(vec![dim("gender"), AxisItem::All { label: None }]),
            group(vec![births_sum()]),
        ],
        Some(vec![group(vec![dim_limited("year", 3)])]),
    );
    let spec = build_table_spec(&stmt).unwrap();
    let plan = build_query_plan(&spec).unwrap();

    // The column limit forbids merging, so the four structural combinations
    // stay distinct.
    assert_eq!(plan.queries.len(), 4);
    assert_eq!(plan.merge_order.len(), 0);
    assert_eq!(plan.path_to_query.len(), 4);

    let ids: Vec<&str> = plan.queries.iter().map(|q| q.id.as_str()).collect();
    assert_eq!(ids, vec!["q0", "q1", "q2", "q3"]);
}

#[test]
fn test_aggregate_siblings_share_one_query() {
    // ROWS state * births.(sum|mean): two branches, one structural query.
    let stmt = statement(
        vec![
            group(vec![dim("state")]),
            group(vec![AxisItem::Binding(MeasureBinding {
                measures: vec!["births".to_string()],
                aggregations: vec![AggregationSpec::new("sum"), AggregationSpec::new("mean")],
                format: None,
                label: None,
            })]),
        ],
        None,
    );
    let spec = build_table_spec(&stmt).unwrap();
    let plan = build_query_plan(&spec).unwrap();

    assert_eq!(plan.queries.len(), 1);
    assert_eq!(plan.path_to_query.len(), 2);
    assert!(plan.path_to_query.values().all(|id| id == "q0"));
    assert_eq!(plan.queries[0].aggregates.len(), 2);
}

#[test]
fn test_merge_preserves_column_coverage() {
    // COLS gender | occupation: two sections, one merged query whose
    // variants cover both.
    let stmt = statement(
        vec![
            group(vec![dim("state")]),
            group(vec![births_sum()]),
        ],
        Some(vec![group(vec![dim("gender"), dim("occupation")])]),
    );
    let spec = build_table_spec(&stmt).unwrap();
    let plan = build_query_plan(&spec).unwrap();

    assert_eq!(plan.queries.len(), 1);
    let query = &plan.queries[0];
    let mut covered: Vec<&str> = query
        .col_groupings
        .iter()
        .map(|g| g.dimension.as_str())
        .collect();
    for variant in &query.additional_col_variants {
        covered.extend(variant.groupings.iter().map(|g| g.dimension.as_str()));
    }
    covered.sort_unstable();
    assert_eq!(covered, vec!["gender", "occupation"]);
}

#[test]
fn test_identical_signature_identical_structure() {
    // Duplicate branches collapse: state | state.
    let stmt = statement(
        vec![
            group(vec![dim("state"), dim("state")]),
            group(vec![births_sum()]),
        ],
        None,
    );
    let spec = build_table_spec(&stmt).unwrap();
    let plan = build_query_plan(&spec).unwrap();
    assert_eq!(plan.queries.len(), 1);
    assert_eq!(plan.path_to_query.len(), 2);
}

#[test]
fn test_path_lookup_reports_internal_error_for_unknown_path() {
    let stmt = statement(vec![group(vec![dim("state")])], None);
    let spec = build_table_spec(&stmt).unwrap();
    let plan = build_query_plan(&spec).unwrap();

    let bogus = crosstab::tpl::TreePath(vec![crosstab::tpl::PathSegment::Dimension {
        name: "nope".to_string(),
    }]);
    let err = plan.query_for_path(&bogus, &bogus).unwrap_err();
    assert!(matches!(err, crosstab::CompileError::Internal(_)));
}
