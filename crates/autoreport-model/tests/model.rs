//! Tests for autoreport-model types.

use autoreport_model::{
    BindingEntry, BindingSpec, Column, ColumnType, DataSourceDef, Dataset, Diagnostic,
    DiagnosticReport, FieldPath, Schema, SourceKind, Value, parse_parameters,
};

#[test]
fn diagnostic_report_counts() {
    let mut report = DiagnosticReport::new("letter.xml");
    report.push(
        Diagnostic::error("unresolved-reference", "no binding for Total").with_subject("Total"),
    );
    report.push(Diagnostic::warning("missing-field", "Discount was empty").with_count(3));
    assert_eq!(report.error_count(), 1);
    assert_eq!(report.warning_count(), 1);
    assert!(report.has_errors());
}

#[test]
fn binding_spec_serializes() {
    let spec = BindingSpec::new()
        .with_source(
            DataSourceDef::new("Items", SourceKind::Range, "items.csv")
                .with_schema(Schema::parse_declaration("Product:text;Qty:number").unwrap()),
        )
        .unwrap()
        .with_entry(BindingEntry::marker("Items").with_source("Items"))
        .with_entry(
            BindingEntry::placeholder("Total", FieldPath::scoped("Orders", "Total"))
                .with_format("$,"),
        );
    let json = serde_json::to_string(&spec).expect("serialize spec");
    let round: BindingSpec = serde_json::from_str(&json).expect("deserialize spec");
    assert_eq!(round, spec);
}

#[test]
fn marker_and_placeholder_entries_differ() {
    let marker = BindingEntry::marker("Orders").with_correlation(
        "Customers",
        parse_parameters("CustomerId=Customers.Id").unwrap(),
    );
    assert!(marker.is_marker());
    assert_eq!(marker.parameters.len(), 1);

    let placeholder = BindingEntry::placeholder("Name", FieldPath::column("Name"));
    assert!(!placeholder.is_marker());
}

#[test]
fn dataset_rows_follow_schema_types() {
    let schema = Schema::new(vec![
        Column::new("Name", ColumnType::Text),
        Column::new("Joined", ColumnType::Date),
    ])
    .unwrap();
    let joined = ColumnType::Date.coerce("2024-02-29").unwrap();
    let dataset = Dataset::from_rows(schema, vec![vec![Value::text("Alex"), joined.clone()]])
        .expect("build dataset");
    assert_eq!(dataset.value(0, "joined"), Some(&joined));
    assert_eq!(dataset.value(0, "Joined").unwrap().to_string(), "2024-02-29");
}

#[test]
fn dataset_serializes_with_its_schema() {
    let schema = Schema::parse_declaration("Name; Qty:number").unwrap();
    let dataset = Dataset::from_rows(schema, vec![vec![Value::text("A"), Value::Number(2.0)]])
        .expect("build dataset");
    let json = serde_json::to_string(&dataset).expect("serialize dataset");
    let round: Dataset = serde_json::from_str(&json).expect("deserialize dataset");
    assert_eq!(round, dataset);
    assert_eq!(round.value(0, "Qty"), Some(&Value::Number(2.0)));
}
