use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::NaiveDate;

use autoreport_bind::{ExecutionPlan, resolve};
use autoreport_ingest::{AdapterRegistry, DataSourceError, HandlePool, InMemoryAdapter};
use autoreport_merge::{
    BatchOptions, CancelToken, MergeEngine, MergeError, MergeJob, MergeOptions, MergeWarning,
    SourceExecutor, run_batch,
};
use autoreport_model::{
    BindingEntry, BindingSpec, DataSourceDef, Dataset, FieldPath, Schema, SourceKind, Value,
    parse_parameters,
};
use autoreport_template::{Document, Group, GroupKind, Run, parse_template};
use serde_json::json;

fn dataset(columns: &str, rows: Vec<Vec<Value>>) -> Dataset {
    Dataset::from_rows(Schema::parse_declaration(columns).expect("columns"), rows)
        .expect("rows match schema")
}

fn source(name: &str, columns: &str) -> DataSourceDef {
    DataSourceDef::new(name, SourceKind::Query, format!("select * from {name}"))
        .with_schema(Schema::parse_declaration(columns).expect("columns"))
}

fn spec(sources: Vec<DataSourceDef>, entries: Vec<BindingEntry>) -> BindingSpec {
    let mut spec = BindingSpec::new();
    for source in sources {
        spec.add_source(source).expect("distinct sources");
    }
    for entry in entries {
        spec.add_entry(entry);
    }
    spec
}

fn plan(template: &str, spec: &BindingSpec) -> ExecutionPlan {
    let tree = parse_template(&Document::from_lines(template)).expect("template parses");
    resolve(tree, spec).expect("bindings resolve")
}

fn executor(adapter: &Arc<InMemoryAdapter>) -> SourceExecutor {
    let registry = AdapterRegistry::new().with_adapter(SourceKind::Query, adapter.clone());
    SourceExecutor::new(registry, HandlePool::new(2))
}

fn fixed_options() -> MergeOptions {
    let generated_at = NaiveDate::from_ymd_opt(2024, 5, 17)
        .and_then(|date| date.and_hms_opt(9, 30, 0))
        .expect("valid timestamp");
    MergeOptions::new().with_generated_at(generated_at)
}

fn merge_text(plan: &ExecutionPlan, adapter: &Arc<InMemoryAdapter>) -> String {
    let executor = executor(adapter);
    let engine = MergeEngine::new(plan, &executor, fixed_options());
    engine
        .merge(&CancelToken::new())
        .expect("merge succeeds")
        .tree
        .text()
}

fn order_fixture() -> (BindingSpec, Arc<InMemoryAdapter>) {
    let spec = spec(
        vec![source("Customer", "Name; Status"), source("Items", "Product; Qty:number")],
        vec![
            BindingEntry::placeholder("Name", FieldPath::column("Name")).with_source("Customer"),
            BindingEntry::marker("Items"),
        ],
    );
    let adapter = InMemoryAdapter::new()
        .with_dataset(
            "Customer",
            dataset("Name; Status", vec![vec!["Alex".into(), "active".into()]]),
        )
        .with_dataset(
            "Items",
            dataset(
                "Product; Qty:number",
                vec![vec!["A".into(), 2.0.into()], vec!["B".into(), 1.0.into()]],
            ),
        );
    (spec, Arc::new(adapter))
}

#[test]
fn substitutes_scalars_and_repeats_rows_in_order() {
    let (spec, adapter) = order_fixture();
    let plan = plan(
        "Dear {{Name}}, you ordered {{#Items}}{{Product}} x{{Qty}}{{/Items}}",
        &spec,
    );
    assert_eq!(merge_text(&plan, &adapter), "Dear Alex, you ordered A x2B x1");
}

#[test]
fn conditional_content_follows_its_predicate() {
    let spec = spec(
        vec![source("Customer", "Name; Status")],
        vec![
            BindingEntry::marker("Active")
                .with_source("Customer")
                .with_predicate("Status = \"active\""),
        ],
    );
    let plan = plan("{{?Active}}VIP{{/Active}}", &spec);
    for (status, expected) in [("inactive", ""), ("active", "VIP")] {
        let adapter = Arc::new(InMemoryAdapter::new().with_dataset(
            "Customer",
            dataset("Name; Status", vec![vec!["Alex".into(), status.into()]]),
        ));
        assert_eq!(merge_text(&plan, &adapter), expected, "status {status}");
    }
}

#[test]
fn conditionals_compare_dates_with_quoted_literals() {
    let spec = spec(
        vec![source("Inv", "Due:date")],
        vec![
            BindingEntry::marker("Late")
                .with_source("Inv")
                .with_predicate("Due < \"2024-06-01\""),
        ],
    );
    let plan = plan("{{?Late}}LATE{{/Late}}", &spec);
    for (due, expected) in [((2024, 1, 1), "LATE"), ((2024, 7, 1), "")] {
        let date = NaiveDate::from_ymd_opt(due.0, due.1, due.2).expect("valid date");
        let adapter = Arc::new(
            InMemoryAdapter::new().with_dataset("Inv", dataset("Due:date", vec![vec![date.into()]])),
        );
        assert_eq!(merge_text(&plan, &adapter), expected, "due {date}");
    }
}

#[test]
fn correlated_repeats_fetch_per_parent_row_and_others_once() {
    let spec = spec(
        vec![
            source("Orders", "Id:number"),
            source("Lines", "OrderId:number; Product"),
            source("Tags", "Tag"),
        ],
        vec![
            BindingEntry::marker("Orders"),
            BindingEntry::marker("Lines").with_correlation(
                "Orders",
                parse_parameters("OrderId=Orders.Id").expect("parameters"),
            ),
            BindingEntry::marker("Tags"),
        ],
    );
    let adapter = Arc::new(
        InMemoryAdapter::new()
            .with_dataset(
                "Orders",
                dataset(
                    "Id:number",
                    vec![vec![1.0.into()], vec![2.0.into()], vec![3.0.into()]],
                ),
            )
            .with_dataset(
                "Lines",
                dataset(
                    "OrderId:number; Product",
                    vec![
                        vec![1.0.into(), "A".into()],
                        vec![1.0.into(), "B".into()],
                        vec![2.0.into(), "C".into()],
                    ],
                ),
            )
            .with_dataset("Tags", dataset("Tag", vec![vec!["x".into()], vec!["y".into()]])),
    );
    let plan = plan(
        "{{#Orders}}[{{Id}}:{{#Lines}}{{Product}}{{/Lines}}|{{#Tags}}{{Tag}}{{/Tags}}]{{/Orders}}",
        &spec,
    );

    assert_eq!(merge_text(&plan, &adapter), "[1:AB|xy][2:C|xy][3:|xy]");
    assert_eq!(adapter.fetch_count_for("Orders"), 1);
    assert_eq!(adapter.fetch_count_for("Lines"), 3);
    assert_eq!(adapter.fetch_count_for("Tags"), 1);
}

#[test]
fn empty_repeats_vanish_or_show_their_fallback() {
    let empty = || {
        Arc::new(InMemoryAdapter::new().with_dataset(
            "Items",
            dataset("Product; Qty:number", Vec::new()),
        ))
    };
    let spec = spec(
        vec![source("Items", "Product; Qty:number")],
        vec![BindingEntry::marker("Items")],
    );

    let without = plan("Before\n{{#Items}}\n- {{Product}}\n{{/Items}}\nAfter", &spec);
    assert_eq!(merge_text(&without, &empty()), "Before\nAfter");

    let with = plan(
        "{{#Items}}\n- {{Product}}\n{{^Items}}\nNo items\n{{/Items}}",
        &spec,
    );
    assert_eq!(merge_text(&with, &empty()), "No items");
}

#[test]
fn row_filters_keep_matching_rows() {
    let (_, adapter) = order_fixture();
    let spec = spec(
        vec![source("Items", "Product; Qty:number")],
        vec![BindingEntry::marker("Items").with_predicate("Qty > 1")],
    );
    let plan = plan("{{#Items}}{{Product}}{{/Items}}", &spec);
    assert_eq!(merge_text(&plan, &adapter), "A");
}

#[test]
fn missing_fields_warn_and_use_the_missing_marker() {
    let spec = spec(
        vec![DataSourceDef::new("Rows", SourceKind::Query, "select")],
        vec![BindingEntry::marker("Rows")],
    );
    let adapter = Arc::new(
        InMemoryAdapter::new().with_dataset("Rows", dataset("Name", vec![vec!["Alex".into()]])),
    );
    let plan = plan("{{#Rows}}{{Name}}/{{Nickname}}{{/Rows}}", &spec);
    let executor = executor(&adapter);
    let engine = MergeEngine::new(&plan, &executor, fixed_options().with_missing_marker("??"));
    let outcome = engine.merge(&CancelToken::new()).expect("merge succeeds");

    assert_eq!(outcome.tree.text(), "Alex/??");
    assert!(matches!(
        &outcome.warnings[..],
        [MergeWarning::MissingField { column, .. }] if column == "Nickname"
    ));
}

#[test]
fn formats_values_and_falls_back_on_format_errors() {
    let spec = spec(
        vec![source("Totals", "Label; Total:number; Due:date")],
        vec![
            BindingEntry::placeholder("Total", FieldPath::column("Total"))
                .with_source("Totals")
                .with_format("$,"),
            BindingEntry::placeholder("Label", FieldPath::column("Label")).with_source("Totals"),
            BindingEntry::placeholder("Due", FieldPath::column("Due"))
                .with_source("Totals")
                .with_default("n/a"),
        ],
    );
    let adapter = Arc::new(InMemoryAdapter::new().with_dataset(
        "Totals",
        dataset(
            "Label; Total:number; Due:date",
            vec![vec!["Net".into(), 1234.5.into(), Value::Null]],
        ),
    ));
    let plan = plan("{{Label}}: {{Total}} {{Label|$}} due {{Due}} {{@now|date=%Y}}", &spec);
    let executor = executor(&adapter);
    let engine = MergeEngine::new(&plan, &executor, fixed_options());
    let outcome = engine.merge(&CancelToken::new()).expect("merge succeeds");

    assert_eq!(outcome.tree.text(), "Net: $1,234.50 Net due n/a 2024");
    assert!(matches!(&outcome.warnings[..], [MergeWarning::Format { placeholder, .. }] if placeholder == "Label"));
}

#[test]
fn first_matching_conditional_format_wins() {
    let spec = spec(
        vec![source("Totals", "Total:number")],
        vec![
            BindingEntry::placeholder("Total", FieldPath::column("Total"))
                .with_source("Totals")
                .with_predicate("Total >= 1000000")
                .with_format("MK"),
            BindingEntry::placeholder("Total", FieldPath::column("Total"))
                .with_source("Totals")
                .with_format("$,"),
        ],
    );
    let plan = plan("Total: {{Total}}", &spec);
    for (total, expected) in [(2_500_000.0, "Total: 2.5M"), (12.0, "Total: $12.00")] {
        let adapter = Arc::new(
            InMemoryAdapter::new()
                .with_dataset("Totals", dataset("Total:number", vec![vec![total.into()]])),
        );
        assert_eq!(merge_text(&plan, &adapter), expected, "total {total}");
    }
}

#[test]
fn placeholder_only_templates_keep_their_structure() {
    let (spec, adapter) = order_fixture();
    let spec = spec.with_entry(
        BindingEntry::placeholder("Status", FieldPath::column("Status")).with_source("Customer"),
    );
    let greeting = Group::new(GroupKind::Paragraph)
        .with_run(Run::new("Dear ").with_style("bold"))
        .with_run(Run::new("{{Name}}").with_style("italic"))
        .with_run(Run::new("!"));
    let status =
        Group::new(GroupKind::Paragraph).with_run(Run::new("Status: {{Status}}").with_style("mono"));
    let document = Document::new(
        Group::new(GroupKind::Document)
            .with_group(greeting)
            .with_group(status),
    );
    let tree = parse_template(&document).expect("template parses");
    let plan = resolve(tree, &spec_with_name_only(spec)).expect("bindings resolve");
    let executor = executor(&adapter);
    let outcome = MergeEngine::new(&plan, &executor, fixed_options())
        .merge(&CancelToken::new())
        .expect("merge succeeds");

    let merged = serde_json::to_value(&outcome.tree).expect("tree serializes");
    assert_eq!(
        merged,
        json!({
            "root": {
                "kind": "document",
                "children": [
                    {
                        "node": "group",
                        "kind": "paragraph",
                        "children": [
                            { "node": "text", "text": "Dear ", "style": "bold" },
                            { "node": "text", "text": "Alex", "style": "italic" },
                            { "node": "text", "text": "!" }
                        ]
                    },
                    {
                        "node": "group",
                        "kind": "paragraph",
                        "children": [
                            { "node": "text", "text": "Status: active", "style": "mono" }
                        ]
                    }
                ]
            }
        })
    );
    assert!(outcome.warnings.is_empty());
}

#[test]
fn repeated_merges_are_identical() {
    let (spec, adapter) = order_fixture();
    let plan = plan("{{Name}} {{#Items}}{{Product}}{{@now}}{{/Items}}", &spec);
    let executor = executor(&adapter);
    let engine = MergeEngine::new(&plan, &executor, MergeOptions::new());
    let first = engine.merge(&CancelToken::new()).expect("first merge");
    let second = engine.merge(&CancelToken::new()).expect("second merge");
    assert_eq!(first.tree, second.tree);
    assert_eq!(adapter.fetch_count(), 2);
}

#[test]
fn slow_sources_fail_the_merge_with_a_timeout() {
    let (spec, _) = order_fixture();
    let adapter = Arc::new(
        InMemoryAdapter::new()
            .with_dataset("Items", dataset("Product; Qty:number", Vec::new()))
            .with_delay(Duration::from_millis(250)),
    );
    let plan = plan("{{#Items}}{{Product}}{{/Items}}", &spec_without_name(spec));
    let executor = executor(&adapter).with_timeout(Duration::from_millis(25));
    let engine = MergeEngine::new(&plan, &executor, fixed_options());
    let err = engine.merge(&CancelToken::new()).expect_err("merge times out");
    assert!(matches!(
        err,
        MergeError::DataSource(DataSourceError::Timeout { ref source_name, .. }) if source_name == "Items"
    ));
    assert_eq!(executor.pool().available(), 2);
}

fn spec_without_name(spec: BindingSpec) -> BindingSpec {
    let mut trimmed = BindingSpec::new();
    for source in spec.sources() {
        trimmed.add_source(source.clone()).expect("distinct sources");
    }
    for entry in spec.entries().iter().filter(|entry| entry.is_marker()) {
        trimmed.add_entry(entry.clone());
    }
    trimmed
}

#[test]
fn cancelled_merges_stop_at_a_region_boundary() {
    let (spec, adapter) = order_fixture();
    let plan = plan("{{Name}}", &spec_with_name_only(spec));
    let executor = executor(&adapter);
    let engine = MergeEngine::new(&plan, &executor, fixed_options());
    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(matches!(engine.merge(&cancel), Err(MergeError::Cancelled)));
}

fn spec_with_name_only(spec: BindingSpec) -> BindingSpec {
    let mut trimmed = BindingSpec::new();
    for source in spec.sources() {
        trimmed.add_source(source.clone()).expect("distinct sources");
    }
    for entry in spec.entries().iter().filter(|entry| !entry.is_marker()) {
        trimmed.add_entry(entry.clone());
    }
    trimmed
}

#[test]
fn per_record_batches_return_results_in_job_order() {
    let spec = spec(
        vec![source("Customers", "Name")],
        vec![BindingEntry::placeholder("Name", FieldPath::column("Name")).with_source("Customers")],
    );
    let adapter = Arc::new(InMemoryAdapter::new().with_dataset(
        "Customers",
        dataset(
            "Name",
            vec![vec!["Ana".into()], vec!["Ben".into()], vec!["Cy".into()], vec!["Di".into()]],
        ),
    ));
    let plan = plan("Hello {{Name}}", &spec);
    let executor = executor(&adapter);
    let engine = MergeEngine::new(&plan, &executor, fixed_options());
    let jobs = MergeJob::per_record(engine.records("Customers").expect("records"));
    let finished = Mutex::new(0usize);

    let results = run_batch(
        &engine,
        jobs,
        &BatchOptions::default().with_jobs(3),
        &CancelToken::new(),
        |_| *finished.lock().expect("counter lock") += 1,
    );

    let texts: Vec<String> = results
        .iter()
        .map(|result| result.outcome.as_ref().expect("job succeeds").tree.text())
        .collect();
    assert_eq!(texts, vec!["Hello Ana", "Hello Ben", "Hello Cy", "Hello Di"]);
    assert_eq!(results[1].job.label, "Customers #2");
    assert_eq!(*finished.lock().expect("counter lock"), 4);
    assert_eq!(adapter.fetch_count_for("Customers"), 1);
}

#[test]
fn cancelled_batches_skip_queued_jobs() {
    let (spec, adapter) = order_fixture();
    let plan = plan("{{Name}}", &spec_with_name_only(spec));
    let executor = executor(&adapter);
    let engine = MergeEngine::new(&plan, &executor, fixed_options());
    let cancel = CancelToken::new();
    cancel.cancel();
    let jobs = vec![MergeJob::single("a"), MergeJob::single("b")];
    let results = run_batch(&engine, jobs, &BatchOptions::default(), &cancel, |_| {});
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|result| result.was_skipped()));
}

#[test]
fn one_failing_source_fails_only_its_merge() {
    let spec = spec(
        vec![source("Customer", "Name")],
        vec![BindingEntry::placeholder("Name", FieldPath::column("Name")).with_source("Customer")],
    );
    let adapter = Arc::new(InMemoryAdapter::new().with_failure("Customer", "relation missing"));
    let plan = plan("{{Name}}", &spec);
    let executor = executor(&adapter);
    let engine = MergeEngine::new(&plan, &executor, fixed_options());
    let err = engine.merge(&CancelToken::new()).expect_err("merge fails");
    assert_eq!(err.kind(), "query-failed");
}
