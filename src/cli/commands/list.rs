//! `plotit list` command - expanded plot names

use miette::Result;
use std::path::PathBuf;

use crate::cli::helpers::{load_analysis, selected_plots};
use crate::io::store::FileStore;

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Configuration file
    pub config: PathBuf,

    /// Only plots whose name matches this glob
    #[arg(long)]
    pub plot: Option<String>,
}

pub fn run(args: ListArgs) -> Result<()> {
    let analysis = load_analysis(&args.config, false)?;
    let mut store = FileStore::new();
    for plot in selected_plots(&analysis, &mut store, args.plot.as_deref())? {
        println!("{}", plot.name);
    }
    Ok(())
}
