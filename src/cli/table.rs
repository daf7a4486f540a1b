//! Yield tables rendered with `tabled`

use console::style;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::cli::helpers::format_with_error;
use crate::core::summary::{SummaryReport, SummarySection};
use crate::entities::source::SourceKind;

#[derive(Tabled)]
struct YieldRow {
    #[tabled(rename = "Sample")]
    name: String,
    #[tabled(rename = "Yield")]
    yields: String,
    #[tabled(rename = "Efficiency (%)")]
    efficiency: String,
}

fn section_title(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Data => "Data",
        SourceKind::Mc => "Background",
        SourceKind::Signal => "Signal",
    }
}

/// One table per section: sources, systematic lines, then the total
pub fn section_table(section: &SummarySection) -> String {
    let mut rows: Vec<YieldRow> = section
        .rows
        .iter()
        .map(|row| {
            let efficiency = if section.kind == SourceKind::Data {
                String::new()
            } else {
                let text =
                    format_with_error(row.efficiency * 100.0, row.efficiency_error * 100.0, 4);
                if row.efficiency_exceeds_one {
                    format!("{} (!)", text)
                } else {
                    text
                }
            };
            YieldRow {
                name: row.name.clone(),
                yields: format_with_error(row.n_events, row.n_events_error, 2),
                efficiency,
            }
        })
        .collect();

    rows.extend(section.systematics.iter().map(|line| YieldRow {
        name: format!("  {}", line.name),
        yields: format!("± {:.2}", line.n_events_error),
        efficiency: String::new(),
    }));

    if let Some(total) = section.total {
        rows.push(YieldRow {
            name: "Total".to_string(),
            yields: format_with_error(total.n_events, total.n_events_error, 2),
            efficiency: String::new(),
        });
    }

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Print the report of one plot, optionally restricted to one kind
pub fn print_report(report: &SummaryReport, kind: Option<SourceKind>) {
    println!("{} {}", style("▸").blue(), style(&report.plot).bold());
    for section in &report.sections {
        if kind.is_some_and(|k| k != section.kind) {
            continue;
        }
        println!("{}", style(section_title(section.kind)).cyan());
        println!("{}", section_table(section));
    }
    for note in &report.notes {
        println!("{} {}", style("!").yellow(), note);
    }
    println!();
}
