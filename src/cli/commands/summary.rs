//! `plotit summary` command - yield tables only

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::args::KindArg;
use crate::cli::helpers::{load_analysis, selected_plots};
use crate::cli::table::print_report;
use crate::core::context::RenderContext;
use crate::core::pipeline::process_plot;
use crate::io::store::FileStore;

#[derive(clap::Args, Debug)]
pub struct SummaryArgs {
    /// Configuration file
    pub config: PathBuf,

    /// Only plots whose name matches this glob
    #[arg(long)]
    pub plot: Option<String>,

    /// Only show one kind of sample
    #[arg(long, value_enum)]
    pub kind: Option<KindArg>,

    /// Treat every per-file scale as 1
    #[arg(long)]
    pub ignore_scales: bool,
}

pub fn run(args: SummaryArgs) -> Result<()> {
    let mut analysis = load_analysis(&args.config, args.ignore_scales)?;
    let mut store = FileStore::new();
    analysis.drop_missing_systematics(&store);
    let plots = selected_plots(&analysis, &mut store, args.plot.as_deref())?;

    let mut ctx = RenderContext::new();
    let mut failed = 0usize;
    for plot in &plots {
        match process_plot(&mut analysis, plot, &mut store, &mut ctx) {
            Ok(outcome) => print_report(&outcome.summary, args.kind.map(Into::into)),
            Err(e) => {
                failed += 1;
                eprintln!("{} {}", style("✗").red(), style(&e.plot).yellow());
                eprintln!("{:?}", miette::Report::new(e));
            }
        }
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
