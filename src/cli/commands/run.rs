//! `plotit run` command - process every plot and write artifacts

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::args::{GlobalOpts, OutputFormat};
use crate::cli::helpers::{load_analysis, selected_plots, sha256_file};
use crate::cli::output::{write_artifact, write_csv, ArtifactMeta};
use crate::cli::table::print_report;
use crate::cli::viz::{render_preview, PREVIEW_HEIGHT, PREVIEW_WIDTH};
use crate::core::context::RenderContext;
use crate::core::pipeline::process_plot;
use crate::io::store::FileStore;

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Configuration file
    pub config: PathBuf,

    /// Existing directory receiving one artifact per plot
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Only plots whose name matches this glob
    #[arg(long)]
    pub plot: Option<String>,

    /// Treat every per-file scale as 1
    #[arg(long)]
    pub ignore_scales: bool,

    /// Artifact format
    #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,

    /// Also write a per-bin CSV table for each plot
    #[arg(long)]
    pub csv: bool,

    /// Draw a terminal preview of each plot
    #[arg(long)]
    pub preview: bool,
}

pub fn run(args: RunArgs, global: GlobalOpts) -> Result<()> {
    if !args.output.is_dir() {
        return Err(miette::miette!(
            code = "plotit::output::missing",
            help = "create the directory first",
            "Output directory '{}' does not exist",
            args.output.display()
        ));
    }

    let mut analysis = load_analysis(&args.config, args.ignore_scales)?;
    let config_sha256 = sha256_file(&args.config)?;
    let mut store = FileStore::new();
    analysis.drop_missing_systematics(&store);
    let plots = selected_plots(&analysis, &mut store, args.plot.as_deref())?;

    let mut ctx = RenderContext::new();
    let mut failed = 0usize;
    for plot in &plots {
        match process_plot(&mut analysis, plot, &mut store, &mut ctx) {
            Ok(outcome) => {
                if !global.quiet {
                    print_report(&outcome.summary, None);
                }
                if args.preview {
                    println!("{}\n", render_preview(&outcome, PREVIEW_WIDTH, PREVIEW_HEIGHT));
                }
                let meta = ArtifactMeta::new(config_sha256.clone(), ctx.palette());
                let path = write_artifact(&args.output, &outcome, &meta, args.format)?;
                log::info!("Wrote {}", path.display());
                if args.csv {
                    let path = write_csv(&args.output, &outcome)?;
                    log::info!("Wrote {}", path.display());
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("{} {}", style("✗").red(), style(&e.plot).yellow());
                eprintln!("{:?}", miette::Report::new(e));
            }
        }
    }

    let written = plots.len() - failed;
    if !global.quiet {
        println!(
            "{} {} plot(s) written to {}",
            style("✓").green(),
            style(written).cyan(),
            style(args.output.display()).dim()
        );
    }
    if failed > 0 {
        return Err(miette::miette!(
            "{} of {} plot(s) failed",
            failed,
            plots.len()
        ));
    }
    Ok(())
}
