//! Yield summary tables
//!
//! Read-only view over the source summaries written by the scaler and the
//! systematic propagator. One section per sample kind that is present.

use serde::Serialize;

use crate::core::aggregator::display_order;
use crate::entities::source::{Source, SourceKind};

/// Yield of one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub name: String,
    pub n_events: f64,
    pub n_events_error: f64,
    /// Selection efficiency as a fraction
    pub efficiency: f64,
    pub efficiency_error: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub efficiency_exceeds_one: bool,
}

/// Absolute yield error from one systematic source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystematicLine {
    pub name: String,
    pub n_events_error: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryTotal {
    pub n_events: f64,
    pub n_events_error: f64,
}

/// Rows of one sample kind
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummarySection {
    pub kind: SourceKind,
    pub rows: Vec<SummaryRow>,
    /// Luminosity and variant lines (simulated backgrounds only)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub systematics: Vec<SystematicLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<SummaryTotal>,
}

/// Yield report of one plot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub plot: String,
    pub sections: Vec<SummarySection>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl SummaryReport {
    pub fn section(&self, kind: SourceKind) -> Option<&SummarySection> {
        self.sections.iter().find(|s| s.kind == kind)
    }
}

/// Name of the luminosity line in the MC section
pub const LUMINOSITY_LINE: &str = "luminosity";

fn section(sources: &[Source], kind: SourceKind, luminosity_error: f64) -> Option<SummarySection> {
    let members: Vec<&Source> = display_order(sources)
        .into_iter()
        .map(|i| &sources[i])
        .filter(|s| s.kind == kind)
        .collect();
    if members.is_empty() {
        return None;
    }

    let rows: Vec<SummaryRow> = members
        .iter()
        .map(|s| SummaryRow {
            name: s.name(),
            n_events: s.summary.n_events,
            n_events_error: s.summary.n_events_error,
            efficiency: s.summary.efficiency,
            efficiency_error: s.summary.efficiency_error,
            efficiency_exceeds_one: s.summary.efficiency_exceeds_one(),
        })
        .collect();

    let sum: f64 = rows.iter().map(|r| r.n_events).sum();
    let mut error2: f64 = rows.iter().map(|r| r.n_events_error.powi(2)).sum();

    let mut systematics = Vec::new();
    if kind == SourceKind::Mc {
        if luminosity_error > 0.0 {
            let lumi = sum * luminosity_error;
            error2 += lumi * lumi;
            systematics.push(SystematicLine {
                name: LUMINOSITY_LINE.to_string(),
                n_events_error: lumi,
            });
        }
        for source in &members {
            for variant in &source.systematics {
                if let Some(summary) = variant.summary {
                    error2 += summary.n_events_error.powi(2);
                    systematics.push(SystematicLine {
                        name: format!("{} ({})", variant.name(), source.name()),
                        n_events_error: summary.n_events_error,
                    });
                }
            }
        }
    }

    let total = (sum != 0.0).then(|| SummaryTotal {
        n_events: sum,
        n_events_error: error2.sqrt(),
    });

    Some(SummarySection {
        kind,
        rows,
        systematics,
        total,
    })
}

/// Build the report for `plot` from the current source summaries
pub fn build_report(
    plot: &str,
    sources: &[Source],
    luminosity_error: f64,
    notes: Vec<String>,
) -> SummaryReport {
    let sections = SourceKind::REPORT_ORDER
        .iter()
        .filter_map(|kind| section(sources, *kind, luminosity_error))
        .collect();
    SummaryReport {
        plot: plot.to_string(),
        sections,
        notes,
    }
}
