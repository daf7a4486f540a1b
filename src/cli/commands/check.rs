//! `plotit check` command - validate configuration and inputs

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::args::GlobalOpts;
use crate::cli::helpers::{load_analysis, selected_plots};
use crate::core::formula::FitModel;
use crate::core::scaler::validate;
use crate::io::store::{FileStore, HistogramStore};

#[derive(clap::Args, Debug)]
pub struct CheckArgs {
    /// Configuration file
    pub config: PathBuf,
}

#[derive(Default)]
struct CheckStats {
    errors: usize,
    warnings: usize,
}

impl CheckStats {
    fn error(&mut self, message: impl std::fmt::Display) {
        self.errors += 1;
        println!("{} {}", style("✗").red(), message);
    }

    fn warning(&mut self, message: impl std::fmt::Display) {
        self.warnings += 1;
        println!("{} {}", style("!").yellow(), message);
    }
}

pub fn run(args: CheckArgs, global: GlobalOpts) -> Result<()> {
    let analysis = load_analysis(&args.config, false)?;
    let mut store = FileStore::new();
    let mut stats = CheckStats::default();

    if !global.quiet {
        println!(
            "{} Checking {} source(s) from {}...\n",
            style("→").blue(),
            analysis.sources.len(),
            style(args.config.display()).cyan()
        );
    }

    let mut files_ok = true;
    for source in &analysis.sources {
        if let Err(e) = validate(source) {
            stats.error(e);
        }
        if !store.exists(&source.path) {
            stats.error(format!("File '{}' not found", source.path));
            files_ok = false;
        }
        for variant in &source.systematics {
            if !store.exists(&variant.path) {
                stats.warning(format!(
                    "Systematics file '{}' of '{}' not found, it will be ignored",
                    variant.path,
                    source.name()
                ));
            }
        }
    }

    if files_ok && !analysis.sources.is_empty() {
        match selected_plots(&analysis, &mut store, None) {
            Ok(plots) => {
                for plot in &plots {
                    for source in &analysis.sources {
                        match store.load(&source.path, &plot.name) {
                            Ok(Some(_)) => {}
                            Ok(None) => stats.error(format!(
                                "Object '{}' not found in '{}'",
                                plot.name, source.path
                            )),
                            Err(e) => stats.error(e),
                        }
                    }
                    if plot.fit_ratio {
                        if let Err(e) = FitModel::parse(&plot.fit_function) {
                            stats.error(format!("Plot '{}': {}", plot.name, e));
                        }
                    }
                }
                if !global.quiet {
                    println!(
                        "{} {} plot(s) to produce",
                        style("→").blue(),
                        style(plots.len()).cyan()
                    );
                }
            }
            Err(e) => stats.error(e),
        }
    } else if analysis.sources.is_empty() {
        stats.error("No source files are configured");
    }

    if stats.errors > 0 {
        return Err(miette::miette!(
            "{} error(s), {} warning(s)",
            stats.errors,
            stats.warnings
        ));
    }
    if !global.quiet {
        println!(
            "{} Configuration is valid ({} warning(s))",
            style("✓").green(),
            stats.warnings
        );
    }
    Ok(())
}
