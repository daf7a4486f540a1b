//! Errors raised while processing a plot

use miette::Diagnostic;
use thiserror::Error;

use crate::core::fit::FitError;
use crate::core::formula::FormulaError;
use crate::core::histogram::HistogramError;
use crate::entities::source::SourceKind;
use crate::io::store::StoreError;

/// Fatal problems that abort the current plot
#[derive(Debug, Error, Diagnostic)]
pub enum CoreError {
    #[error("Source '{source_name}' ({kind}) has {generated_events} generated events")]
    #[diagnostic(
        code(plotit::source::generated_events),
        help("set a positive 'generated-events' for every simulated source")
    )]
    InvalidGeneratedEvents {
        source_name: String,
        kind: SourceKind,
        generated_events: f64,
    },

    #[error("Object '{object}' not found in '{path}'")]
    #[diagnostic(code(plotit::source::missing_object))]
    MissingHistogram { path: String, object: String },

    #[error("Histogram of '{source_name}' is not compatible with the other samples")]
    #[diagnostic(code(plotit::source::binning))]
    BinningMismatch {
        source_name: String,
        #[source]
        error: HistogramError,
    },

    #[error("Systematic '{variant}' of '{source_name}' does not match the nominal binning")]
    #[diagnostic(code(plotit::systematics::binning))]
    VariantBinningMismatch {
        source_name: String,
        variant: String,
        #[source]
        error: HistogramError,
    },

    #[error("Cannot rebin '{object}' by {factor}")]
    #[diagnostic(
        code(plotit::plot::rebin),
        help("'rebin' must divide the number of bins")
    )]
    InvalidRebin {
        object: String,
        factor: usize,
        #[source]
        error: HistogramError,
    },

    #[error("Invalid fit function")]
    #[diagnostic(code(plotit::plot::fit_function))]
    Formula(
        #[from]
        #[diagnostic_source]
        FormulaError,
    ),

    #[error("Sideband fit failed")]
    #[diagnostic(code(plotit::plot::sideband))]
    SidebandFit(
        #[source]
        #[diagnostic_source]
        FitError,
    ),

    #[error("No source files are configured")]
    #[diagnostic(code(plotit::config::no_sources))]
    NoSources,

    #[error("No plots found in '{path}'")]
    #[diagnostic(
        code(plotit::plot::no_match),
        help("plot names are globs matched against the objects of the first file")
    )]
    NoPlots { path: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

/// A fatal error tagged with the plot it aborted
#[derive(Debug, Error, Diagnostic)]
#[error("Plot '{plot}' failed")]
#[diagnostic(code(plotit::plot::failed))]
pub struct PlotError {
    pub plot: String,
    #[source]
    #[diagnostic_source]
    pub error: CoreError,
}

impl PlotError {
    pub fn new(plot: impl Into<String>, error: CoreError) -> Self {
        Self {
            plot: plot.into(),
            error,
        }
    }
}
