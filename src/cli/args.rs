//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::commands::{
    check::CheckArgs, completions::CompletionsArgs, list::ListArgs, run::RunArgs,
    summary::SummaryArgs,
};
use crate::entities::source::SourceKind;

#[derive(Parser, Debug)]
#[command(name = "plotit")]
#[command(author, version, about = "Stack, normalize and compare HEP histograms")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct GlobalOpts {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors and skip the summary tables
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl GlobalOpts {
    pub fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process every plot and write one artifact per plot
    Run(RunArgs),

    /// Print the yield tables without writing anything
    Summary(SummaryArgs),

    /// Validate the configuration and the input files
    Check(CheckArgs),

    /// List the plots a configuration expands to
    List(ListArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Artifact serialization format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Yaml => "yaml",
            OutputFormat::Json => "json",
        }
    }
}

/// Sample kind selector for `--kind`
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindArg {
    Data,
    Mc,
    Signal,
}

impl From<KindArg> for SourceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Data => SourceKind::Data,
            KindArg::Mc => SourceKind::Mc,
            KindArg::Signal => SourceKind::Signal,
        }
    }
}
