//! Per-plot artifacts written by `plotit run`

use chrono::{DateTime, Utc};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::args::OutputFormat;
use crate::cli::helpers::artifact_stem;
use crate::core::pipeline::PlotOutcome;
use crate::entities::style::Rgba;

/// Provenance header of every artifact
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactMeta {
    pub tool: &'static str,
    pub version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub config_sha256: String,
    /// Custom colors allocated so far, by palette index
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub palette: Vec<PaletteEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaletteEntry {
    pub index: u32,
    pub color: Rgba,
}

impl ArtifactMeta {
    pub fn new(config_sha256: String, palette: &[(u32, Rgba)]) -> Self {
        Self {
            tool: "plotit",
            version: env!("CARGO_PKG_VERSION"),
            generated_at: Utc::now(),
            config_sha256,
            palette: palette
                .iter()
                .map(|(index, color)| PaletteEntry {
                    index: *index,
                    color: *color,
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct Artifact<'a> {
    meta: &'a ArtifactMeta,
    #[serde(flatten)]
    outcome: &'a PlotOutcome,
}

/// Serialize `outcome` into `dir`, returning the written path
pub fn write_artifact(
    dir: &Path,
    outcome: &PlotOutcome,
    meta: &ArtifactMeta,
    format: OutputFormat,
) -> Result<PathBuf> {
    let artifact = Artifact { meta, outcome };
    let text = match format {
        OutputFormat::Yaml => serde_yml::to_string(&artifact).into_diagnostic()?,
        OutputFormat::Json => serde_json::to_string_pretty(&artifact).into_diagnostic()?,
    };
    let path = dir.join(format!(
        "{}.{}",
        artifact_stem(&outcome.plot.name),
        format.extension()
    ));
    std::fs::write(&path, text).into_diagnostic()?;
    Ok(path)
}

const CSV_HEADER: [&str; 10] = [
    "bin",
    "low_edge",
    "high_edge",
    "data",
    "data_error",
    "background",
    "stat_error",
    "syst_error",
    "ratio",
    "ratio_error",
];

/// Flat per-bin table next to the artifact
pub fn write_csv(dir: &Path, outcome: &PlotOutcome) -> Result<PathBuf> {
    let path = dir.join(format!("{}.csv", artifact_stem(&outcome.plot.name)));
    let mut wtr = csv::Writer::from_path(&path).into_diagnostic()?;
    wtr.write_record(CSV_HEADER).into_diagnostic()?;

    let cell = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
    for (i, edges) in outcome.edges.windows(2).enumerate() {
        let data = outcome.data.as_ref();
        let bands = outcome.bands.as_ref();
        let ratio = outcome.ratio.as_ref().map(|r| &r.ratio);
        wtr.write_record([
            i.to_string(),
            edges[0].to_string(),
            edges[1].to_string(),
            cell(data.map(|h| h.bin_content(i))),
            cell(data.map(|h| h.bin_error(i))),
            cell(bands.map(|b| b.stat_only.bin_content(i))),
            cell(bands.map(|b| b.stat_only.bin_error(i))),
            cell(bands.map(|b| b.syst_only.bin_error(i))),
            cell(ratio.map(|h| h.bin_content(i))),
            cell(ratio.map(|h| h.bin_error(i))),
        ])
        .into_diagnostic()?;
    }
    wtr.flush().into_diagnostic()?;
    Ok(path)
}
