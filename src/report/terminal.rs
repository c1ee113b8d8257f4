use std::collections::HashMap;

use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use license_autoid::engine::RunReport;
use license_autoid::error::{FaultKind, FileFault};
use license_autoid::models::{IdentificationRecord, ProjectHandle};

/// Render a colored terminal summary of a finished run.
pub fn render(
    project: &ProjectHandle,
    strategy: &str,
    records: &[IdentificationRecord],
    report: &RunReport,
    verbose: bool,
    quiet: bool,
) {
    let skipped = report.faults.len();

    if quiet {
        println!(
            "Identified: {}  Skipped: {}  Passes: {}",
            records.len().to_string().green(),
            skipped.to_string().yellow(),
            report.passes,
        );
        return;
    }

    println!(
        "\n {} v{}",
        "license-autoid".bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!(" Project: {} ({})\n", project.name, project.id);

    let refresh = if report.refreshed {
        "refreshed".green()
    } else if report.refresh_skipped {
        "skipped (--no-refresh)".yellow()
    } else {
        "not required".normal()
    };

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Strategy           : {}", strategy));
    println!(" │  {:<48} │", format!("Passes             : {}", report.passes));
    println!(
        " │  {:<48} │",
        format!(
            "{}  Identified      : {:>4}  {}",
            "✓".green(),
            records.len(),
            summarize_components(records)
        )
    );
    println!(
        " │  {:<48} │",
        format!("{}  Skipped         : {:>4}", "⚠".yellow(), skipped)
    );
    println!(" │  {:<48} │", format!("BOM                : {}", refresh));
    println!(" └────────────────────────────────────────────────────┘\n");

    if skipped > 0 {
        println!(" {} Files skipped after service faults:\n", "[WARN]".yellow().bold());
        render_faults(&report.faults);
        println!();
    }

    if verbose && !records.is_empty() {
        println!(" {} Identifications made:\n", "[DONE]".green().bold());
        render_records(records);
        println!();
    }
}

fn render_records(records: &[IdentificationRecord]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Path").add_attribute(Attribute::Bold),
            Cell::new("Lines").add_attribute(Attribute::Bold),
            Cell::new("Component").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Score").add_attribute(Attribute::Bold),
        ]);

    for record in records {
        let score_color = match record.score {
            80..=100 => Color::Green,
            50..=79 => Color::Yellow,
            _ => Color::Red,
        };

        table.add_row(vec![
            Cell::new(&record.path),
            Cell::new(format!(
                "{}-{}",
                record.first_line,
                record.first_line + record.line_count.saturating_sub(1)
            )),
            Cell::new(&record.component_id),
            Cell::new(&record.version_label),
            Cell::new(format!("{}%", record.score))
                .fg(score_color)
                .set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{}", table);
}

fn render_faults(faults: &[FileFault]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Path").add_attribute(Attribute::Bold),
            Cell::new("Kind").add_attribute(Attribute::Bold),
            Cell::new("Message").add_attribute(Attribute::Bold),
        ]);

    for fault in faults {
        let kind_color = match fault.kind {
            FaultKind::InsufficientPermission => Color::Red,
            FaultKind::Service => Color::Yellow,
            FaultKind::Refresh => Color::Magenta,
        };

        table.add_row(vec![
            Cell::new(&fault.path),
            Cell::new(fault.kind.to_string()).fg(kind_color),
            Cell::new(&fault.message),
        ]);
    }

    println!("{}", table);
}

/// Top three components by identification count, e.g. `[zlib (4), openssl (1)]`.
fn summarize_components(records: &[IdentificationRecord]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        *counts.entry(record.component_id.as_str()).or_insert(0) += 1;
    }

    let mut pairs: Vec<(&str, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let summary: Vec<String> = pairs
        .iter()
        .take(3)
        .map(|(component, cnt)| format!("{} ({})", component, cnt))
        .collect();

    if summary.is_empty() {
        String::new()
    } else {
        format!("[{}]", summary.join(", "))
    }
}
