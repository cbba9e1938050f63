use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use autoreport_cli::pipeline::{GenerateResult, ReportStatus, ReportSummary, SourceRow};
use autoreport_model::{Diagnostic, DiagnosticReport, Severity};

pub fn print_check(report: &DiagnosticReport) {
    println!("Template: {}", report.subject);
    if report.is_empty() {
        println!("No problems found.");
        return;
    }
    print_problem_table(report.diagnostics.iter().map(|d| ("-", d)));
    println!(
        "{} error(s), {} warning(s)",
        report.error_count(),
        report.warning_count()
    );
}

pub fn print_generate(result: &GenerateResult) {
    if result.problems.has_errors() {
        eprintln!("Template: {}", result.problems.subject);
        eprintln!("Nothing generated: the template or bindings have problems.");
        print_problem_table(result.problems.diagnostics.iter().map(|d| ("-", d)));
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Report"),
        header_cell("Status"),
        header_cell("Output"),
        header_cell("Bytes"),
        header_cell("SHA-256"),
        header_cell("Warnings"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    align_column(&mut table, 3, CellAlignment::Right);
    align_column(&mut table, 5, CellAlignment::Right);
    for report in &result.reports {
        table.add_row(vec![
            Cell::new(&report.label).add_attribute(Attribute::Bold),
            status_cell(&report.status),
            report
                .path
                .as_ref()
                .map_or_else(|| dim_cell("-"), |path| Cell::new(path.display())),
            report.bytes.map_or_else(|| dim_cell("-"), Cell::new),
            report
                .sha256
                .as_ref()
                .map_or_else(|| dim_cell("-"), |digest| Cell::new(short_digest(digest))),
            count_cell(report.diagnostics.warning_count(), Color::Yellow),
        ]);
    }
    println!("{table}");

    let problems: Vec<(&str, &Diagnostic)> = result
        .reports
        .iter()
        .flat_map(|report| {
            report
                .diagnostics
                .diagnostics
                .iter()
                .map(move |d| (report.label.as_str(), d))
        })
        .collect();
    if !problems.is_empty() {
        println!();
        println!("Problems:");
        print_problem_table(problems);
    }

    let written = result
        .reports
        .iter()
        .filter(|report| !report.is_failure())
        .count();
    let verb = if result.dry_run { "merged" } else { "written" };
    println!(
        "{written} report(s) {verb}, {} failed, {} warning(s)",
        result.failed_count(),
        result.warning_count()
    );
    for report in result.reports.iter().filter(|report| report.is_failure()) {
        eprintln!("- {}: {}", report.label, failure_reason(report));
    }
}

pub fn print_sources(rows: &[SourceRow]) {
    let probed = rows.iter().any(|row| row.probe.is_some());
    let mut table = Table::new();
    let mut header = vec![
        header_cell("Source"),
        header_cell("Kind"),
        header_cell("Statement"),
        header_cell("Columns"),
        header_cell("Driver"),
    ];
    if probed {
        header.push(header_cell("Rows"));
    }
    table.set_header(header);
    apply_table_style(&mut table);
    align_column(&mut table, 4, CellAlignment::Center);
    for row in rows {
        let mut cells = vec![
            Cell::new(&row.name)
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            Cell::new(row.kind),
            Cell::new(&row.statement),
            row.columns
                .as_ref()
                .map_or_else(|| dim_cell("undeclared"), Cell::new),
            if row.has_driver {
                Cell::new("✓").fg(Color::Green).add_attribute(Attribute::Bold)
            } else {
                Cell::new("none").fg(Color::Red)
            },
        ];
        if probed {
            cells.push(match &row.probe {
                Some(Ok(count)) => Cell::new(count),
                Some(Err(message)) => Cell::new(message).fg(Color::Red),
                None => dim_cell("-"),
            });
        }
        table.add_row(cells);
    }
    println!("{table}");
}

fn print_problem_table<'a, I>(problems: I)
where
    I: IntoIterator<Item = (&'a str, &'a Diagnostic)>,
{
    let mut problems: Vec<(&str, &Diagnostic)> = problems.into_iter().collect();
    problems.sort_by(|a, b| {
        a.1.severity
            .cmp(&b.1.severity)
            .then_with(|| a.0.cmp(b.0))
            .then_with(|| a.1.code.cmp(&b.1.code))
    });
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Report"),
        header_cell("Severity"),
        header_cell("Code"),
        header_cell("Location"),
        header_cell("Count"),
        header_cell("Message"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    align_column(&mut table, 4, CellAlignment::Right);
    for (report, diagnostic) in problems {
        table.add_row(vec![
            Cell::new(report),
            severity_cell(diagnostic.severity),
            Cell::new(&diagnostic.code),
            diagnostic
                .location
                .as_ref()
                .map_or_else(|| dim_cell("-"), Cell::new),
            diagnostic.count.map_or_else(|| dim_cell(1), Cell::new),
            Cell::new(&diagnostic.message),
        ]);
    }
    println!("{table}");
}

fn failure_reason(report: &ReportSummary) -> &str {
    match &report.status {
        ReportStatus::Failed(reason) => reason,
        ReportStatus::Skipped => "skipped (cancelled)",
        ReportStatus::Written | ReportStatus::Merged => "",
    }
}

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(140);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn status_cell(status: &ReportStatus) -> Cell {
    match status {
        ReportStatus::Written => Cell::new("written")
            .fg(Color::Green)
            .add_attribute(Attribute::Bold),
        ReportStatus::Merged => Cell::new("merged").fg(Color::Green),
        ReportStatus::Failed(_) => Cell::new("FAILED")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        ReportStatus::Skipped => dim_cell("skipped"),
    }
}

fn severity_cell(severity: Severity) -> Cell {
    match severity {
        Severity::Error => Cell::new("ERROR").fg(Color::Red),
        Severity::Warning => Cell::new("WARN").fg(Color::Yellow),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}
