use crosstab::dimension::{
    parse_dimension, DimensionCatalog, DimensionDefinition, DimensionOrderingProvider,
};

fn catalog() -> DimensionCatalog {
    DimensionCatalog::new(&[
        DimensionDefinition::new(
            "agegroup",
            "'Under 18' when age < 18 | '18 to 64' when age < 65 | else '65 and over'",
        ),
        DimensionDefinition::new("state", "state_abbrev"),
    ])
    .unwrap()
}

#[test]
fn test_bucketing_case_sql() {
    let parsed = parse_dimension(
        "agegroup",
        "'Under 18' when age < 18 | '18 to 64' when age < 65 | else '65 and over'",
    )
    .unwrap();
    assert_eq!(
        parsed.sql_expression,
        "CASE WHEN age < 18 THEN 'Under 18' WHEN age < 65 THEN '18 to 64' ELSE '65 and over' END"
    );
    assert_eq!(parsed.branches.len(), 2);
    assert_eq!(parsed.else_label.as_deref(), Some("65 and over"));
}

#[test]
fn test_condition_translation_in_case() {
    let parsed = parse_dimension(
        "coastal",
        "Coastal when `state` = 'CA' or `state` = 'FL' | else Inland",
    )
    .unwrap();
    assert_eq!(
        parsed.sql_expression,
        "CASE WHEN \"state\" = 'CA' OR \"state\" = 'FL' THEN 'Coastal' ELSE 'Inland' END"
    );
}

#[test]
fn test_alias_maps_to_raw_column() {
    let catalog = catalog();
    assert_eq!(catalog.partition_sql("state"), "\"state_abbrev\"");
    assert!(!catalog.has_definition_order("state"));
}

#[test]
fn test_bucketing_partitions_by_case() {
    let catalog = catalog();
    let sql = catalog.partition_sql("agegroup");
    assert!(sql.starts_with("CASE WHEN age < 18 THEN 'Under 18'"));
    assert!(sql.ends_with("ELSE '65 and over' END"));
}

#[test]
fn test_definition_order_companion_is_synthesized() {
    let catalog = catalog();
    assert!(catalog.has_definition_order("agegroup"));
    assert_eq!(
        catalog.order_dimension_name("agegroup").as_deref(),
        Some("agegroup_def_order")
    );

    let autos = catalog.auto_order_dimensions();
    assert_eq!(autos.len(), 1);
    assert_eq!(
        autos[0].expression,
        "pick 1 when age < 18 pick 2 when age < 65 else 3"
    );
}

#[test]
fn test_unknown_dimension_has_no_order() {
    let catalog = catalog();
    assert!(!catalog.has_definition_order("year"));
    assert_eq!(catalog.order_dimension_name("year"), None);
    assert_eq!(catalog.partition_sql("year"), "\"year\"");
}
