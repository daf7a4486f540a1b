//! Shared helper functions for CLI commands

use miette::{IntoDiagnostic, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::core::pipeline::expand_plots;
use crate::entities::analysis::Analysis;
use crate::entities::plot::{glob_matches, Plot};
use crate::io::store::FileStore;

/// Load the configuration at `path`
pub fn load_analysis(path: &Path, ignore_scales: bool) -> Result<Analysis> {
    let mut analysis = Analysis::load(path)?;
    analysis.configuration.ignore_scales = ignore_scales;
    log::info!(
        "Loaded {} source(s) and {} plot request(s) from '{}'",
        analysis.sources.len(),
        analysis.plots.len(),
        path.display()
    );
    Ok(analysis)
}

/// Expanded plots, optionally restricted to names matching `filter`
pub fn selected_plots(
    analysis: &Analysis,
    store: &mut FileStore,
    filter: Option<&str>,
) -> Result<Vec<Plot>> {
    let plots = expand_plots(analysis, store)?;
    Ok(match filter {
        Some(pattern) => plots
            .into_iter()
            .filter(|p| glob_matches(pattern, &p.name))
            .collect(),
        None => plots,
    })
}

/// Hex-encoded SHA-256 of a file's bytes
pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).into_diagnostic()?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

/// File-name-safe form of a plot name
pub fn artifact_stem(plot: &str) -> String {
    plot.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

/// `value ± error` with a fixed number of decimals
pub fn format_with_error(value: f64, error: f64, decimals: usize) -> String {
    format!("{:.*} ± {:.*}", decimals, value, decimals, error)
}
