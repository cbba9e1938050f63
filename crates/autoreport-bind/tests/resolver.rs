use autoreport_bind::{BindingError, ExecutionPlan, FieldTarget, NodeBinding, resolve};
use autoreport_model::{
    BindingEntry, BindingSpec, DataSourceDef, FieldPath, Schema, SourceKind, parse_parameters,
};
use autoreport_template::{Document, RegionTree, parse_template};

fn tree(text: &str) -> RegionTree {
    parse_template(&Document::from_lines(text)).expect("template parses")
}

fn source(name: &str, columns: &str) -> DataSourceDef {
    DataSourceDef::new(name, SourceKind::Range, format!("{name}.csv"))
        .with_schema(Schema::parse_declaration(columns).expect("valid columns"))
}

fn order_spec() -> BindingSpec {
    BindingSpec::new()
        .with_source(source("Customer", "Name; Status"))
        .and_then(|spec| spec.with_source(source("Items", "Product; Qty:number")))
        .expect("distinct sources")
        .with_entry(
            BindingEntry::placeholder("Name", FieldPath::column("Name")).with_source("Customer"),
        )
        .with_entry(BindingEntry::marker("Items").with_source("Items"))
}

fn errors(text: &str, spec: &BindingSpec) -> Vec<BindingError> {
    resolve(tree(text), spec)
        .expect_err("resolution should fail")
        .errors
}

fn placeholder_targets(plan: &ExecutionPlan) -> Vec<(String, FieldTarget)> {
    let tree = plan.tree();
    tree.placeholders()
        .into_iter()
        .filter_map(|id| plan.placeholder(id))
        .map(|binding| (binding.name.clone(), binding.field.target.clone()))
        .collect()
}

#[test]
fn binds_root_scalar_and_implicit_repeat_columns() {
    let plan = resolve(
        tree("Dear {{Name}}, you ordered {{#Items}}{{Product}} x{{Qty}}{{/Items}}"),
        &order_spec(),
    )
    .expect("plan resolves");

    let repeat = plan.tree().markers()[0];
    let targets = placeholder_targets(&plan);
    assert_eq!(
        targets,
        vec![
            ("Name".to_string(), FieldTarget::Root("Customer".to_string())),
            ("Product".to_string(), FieldTarget::Scope(repeat)),
            ("Qty".to_string(), FieldTarget::Scope(repeat)),
        ]
    );
    assert_eq!(plan.prefetch_order(), ["Customer", "Items"]);
    assert_eq!(plan.scope_source(repeat), Some("Items"));
}

#[test]
fn reports_every_problem_in_one_pass() {
    let problems = errors(
        "{{Nme}} {{#Orders}}{{Total}}{{/Orders}} {{#Items}}{{Colour}}{{/Items}}",
        &order_spec(),
    );
    let codes: Vec<&str> = problems.iter().map(BindingError::code).collect();
    assert_eq!(
        codes,
        vec![
            "unresolved-reference",
            "unresolved-reference",
            "unresolved-reference",
            "unresolved-reference",
            "unused-binding",
        ]
    );
    assert!(matches!(
        &problems[0],
        BindingError::UnresolvedReference { name, suggestion: Some(hint), .. }
            if name == "Nme" && hint == "Name"
    ));
    assert!(matches!(
        &problems[4],
        BindingError::UnusedBinding { name, .. } if name == "Name"
    ));
}

#[test]
fn explicit_field_outside_schema_is_a_scope_error() {
    let spec = order_spec().with_entry(
        BindingEntry::placeholder("Amount", FieldPath::column("Quantity")).with_source("Items"),
    );
    let problems = errors("{{Name}} {{#Items}}{{Amount}}{{/Items}}", &spec);
    assert_eq!(problems.len(), 1);
    assert!(matches!(
        &problems[0],
        BindingError::FieldNotInScope { column, source_name, .. }
            if column == "Quantity" && source_name == "Items"
    ));
}

#[test]
fn undefined_marker_source_is_reported() {
    let spec = BindingSpec::new().with_entry(BindingEntry::marker("Rows").with_source("Missing"));
    let problems = errors("{{#Rows}}x{{/Rows}}", &spec);
    assert!(matches!(
        &problems[..],
        [BindingError::UndefinedSource { source_name, .. }] if source_name == "Missing"
    ));
}

#[test]
fn qualified_tokens_bind_to_the_named_marker() {
    let spec = BindingSpec::new()
        .with_source(source("Orders", "Id; Total:number"))
        .and_then(|spec| spec.with_source(source("Lines", "OrderId; Product")))
        .expect("distinct sources")
        .with_entry(BindingEntry::marker("Orders"))
        .with_entry(BindingEntry::marker("Lines").with_correlation(
            "Orders",
            parse_parameters("OrderId=Orders.Id").expect("valid parameters"),
        ));
    let plan = resolve(
        tree("{{#Orders}}{{#Lines}}{{Orders.Total}} {{Product}}{{/Lines}}{{/Orders}}"),
        &spec,
    )
    .expect("plan resolves");

    let markers = plan.tree().markers();
    let (orders, lines) = (markers[0], markers[1]);
    assert_eq!(
        placeholder_targets(&plan),
        vec![
            ("Orders.Total".to_string(), FieldTarget::Scope(orders)),
            ("Product".to_string(), FieldTarget::Scope(lines)),
        ]
    );
    let correlation = plan
        .repeat(lines)
        .and_then(|binding| binding.correlation.as_ref())
        .expect("lines are correlated");
    assert_eq!(correlation.ancestor, orders);
    assert_eq!(correlation.parameters[0].field.column, "Id");
    assert_eq!(plan.prefetch_order(), ["Orders"]);
}

#[test]
fn correlation_must_name_one_enclosing_repeat_with_parameters() {
    let base = || {
        BindingSpec::new()
            .with_source(source("Orders", "Id"))
            .and_then(|spec| spec.with_source(source("Lines", "OrderId")))
            .expect("distinct sources")
            .with_entry(BindingEntry::marker("Orders"))
    };
    let template = "{{#Orders}}{{/Orders}}{{#Lines}}{{OrderId}}{{/Lines}}";
    let not_ancestor = base().with_entry(BindingEntry::marker("Lines").with_correlation(
        "Orders",
        parse_parameters("OrderId=Id").expect("valid parameters"),
    ));
    assert!(matches!(
        errors(template, &not_ancestor).first(),
        Some(BindingError::InvalidCorrelation { reason, .. }) if reason.contains("not an enclosing")
    ));

    let nested = "{{#Orders}}{{#Lines}}{{OrderId}}{{/Lines}}{{/Orders}}";
    let no_parameters =
        base().with_entry(BindingEntry::marker("Lines").with_correlation("Orders", Vec::new()));
    assert!(matches!(
        errors(nested, &no_parameters).first(),
        Some(BindingError::InvalidCorrelation { reason, .. }) if reason.contains("no correlation")
    ));

    let two = base().with_entry(BindingEntry::marker("Lines").with_correlation(
        "Orders, Customers",
        parse_parameters("OrderId=Id").expect("valid parameters"),
    ));
    assert!(matches!(
        errors(nested, &two).first(),
        Some(BindingError::InvalidCorrelation { reason, .. }) if reason.contains("more than one")
    ));
}

#[test]
fn conditional_predicates_compile_against_their_source() {
    let spec = order_spec()
        .with_entry(
            BindingEntry::marker("Active")
                .with_source("Customer")
                .with_predicate("Status = \u{201c}active\u{201d}"),
        );
    let plan = resolve(tree("{{Name}}{{?Active}}VIP{{/Active}}{{#Items}}{{/Items}}"), &spec)
        .expect("plan resolves");
    let conditional = plan.tree().markers()[0];
    let Some(NodeBinding::Conditional(binding)) = plan.binding(conditional) else {
        panic!("conditional binding expected");
    };
    assert_eq!(binding.source.as_deref(), Some("Customer"));
    let status = &binding.predicate.fields[&FieldPath::column("Status")];
    assert_eq!(status.target, FieldTarget::Scope(conditional));
}

#[test]
fn bad_predicates_and_formats_are_binding_errors() {
    let spec = order_spec()
        .with_entry(BindingEntry::marker("Active").with_source("Customer").with_predicate("Status ="))
        .with_entry(BindingEntry::marker("Flag").with_source("Customer"));
    let problems = errors(
        "{{Name|%MK}}{{?Active}}x{{/Active}}{{?Flag}}y{{/Flag}}{{#Items}}{{/Items}}",
        &spec,
    );
    let codes: Vec<&str> = problems.iter().map(BindingError::code).collect();
    assert_eq!(codes, vec!["invalid-format", "invalid-predicate", "missing-predicate"]);
}

#[test]
fn inline_format_overrides_the_entry_format() {
    let spec = BindingSpec::new()
        .with_source(source("Totals", "Amount:number"))
        .expect("source")
        .with_entry(
            BindingEntry::placeholder("Amount", FieldPath::column("Amount"))
                .with_source("Totals")
                .with_format("$"),
        );
    let plan = resolve(tree("{{Amount|,.0}} {{Amount}}"), &spec).expect("plan resolves");
    let formats: Vec<String> = plan
        .tree()
        .placeholders()
        .into_iter()
        .filter_map(|id| plan.placeholder(id))
        .map(|binding| binding.format.to_string())
        .collect();
    assert_eq!(formats, vec![",.0", "$"]);
}

#[test]
fn rows_sharing_a_name_become_conditional_formats() {
    let spec = BindingSpec::new()
        .with_source(source("Totals", "Amount:number"))
        .expect("source")
        .with_entry(
            BindingEntry::placeholder("Amount", FieldPath::column("Amount"))
                .with_source("Totals")
                .with_predicate("Amount > 1000")
                .with_format("$"),
        )
        .with_entry(
            BindingEntry::placeholder("Amount", FieldPath::column("Amount"))
                .with_source("Totals")
                .with_format(",.0"),
        );
    let plan = resolve(tree("{{Amount}}"), &spec).expect("plan resolves");
    let id = plan.tree().placeholders()[0];
    let binding = plan.placeholder(id).expect("placeholder binding");
    assert_eq!(binding.format.to_string(), ",.0");
    assert_eq!(binding.conditional_formats.len(), 1);
    let conditional = &binding.conditional_formats[0];
    assert_eq!(conditional.format.to_string(), "$");
    assert_eq!(
        conditional.predicate.fields.get(&FieldPath::column("Amount")).map(|field| &field.target),
        Some(&FieldTarget::Root("Totals".to_string()))
    );
}

#[test]
fn two_unconditional_rows_are_duplicates() {
    let spec = BindingSpec::new()
        .with_source(source("Totals", "Amount:number"))
        .expect("source")
        .with_entry(BindingEntry::placeholder("Amount", FieldPath::column("Amount")).with_source("Totals"))
        .with_entry(BindingEntry::placeholder("Amount", FieldPath::column("Amount")).with_source("Totals"));
    let problems = errors("{{Amount}}", &spec);
    assert!(matches!(
        &problems[..],
        [BindingError::DuplicateBinding { name }] if name == "Amount"
    ));
}

#[test]
fn duplicate_sibling_markers_are_reported() {
    let spec = order_spec();
    let problems = errors("{{Name}}{{#Items}}{{/Items}}{{#Items}}{{/Items}}", &spec);
    assert!(matches!(
        &problems[..],
        [BindingError::DuplicateMarker { name, .. }] if name == "Items"
    ));
}

#[test]
fn undeclared_schemas_defer_to_the_innermost_scope() {
    let spec = BindingSpec::new()
        .with_source(DataSourceDef::new("Rows", SourceKind::Range, "rows.csv"))
        .expect("source")
        .with_entry(BindingEntry::marker("Rows"));
    let plan = resolve(tree("{{#Rows}}{{Anything}} {{@now}}{{/Rows}}"), &spec)
        .expect("plan resolves");
    let targets: Vec<FieldTarget> = placeholder_targets(&plan)
        .into_iter()
        .map(|(_, target)| target)
        .collect();
    assert_eq!(targets, vec![FieldTarget::Innermost, FieldTarget::GeneratedAt]);
}

#[test]
fn fallback_content_has_no_row_scope() {
    let problems = errors(
        "{{Name}}\n{{#Items}}\n{{Product}}\n{{^Items}}\nNo {{Product}}\n{{/Items}}",
        &order_spec(),
    );
    assert!(matches!(
        &problems[..],
        [BindingError::UnresolvedReference { name, .. }] if name == "Product"
    ));
}
