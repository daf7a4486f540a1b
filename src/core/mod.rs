//! Core module - histogram arithmetic and the per-plot processing engine

pub mod aggregator;
pub mod context;
pub mod drawable;
pub mod error;
pub mod fit;
pub mod formula;
pub mod histogram;
pub mod pipeline;
pub mod ratio;
pub mod scaler;
pub mod sideband;
pub mod summary;
pub mod systematics;

pub use aggregator::{Background, Overlay};
pub use context::RenderContext;
pub use drawable::{AxisTitles, Drawable, Frame, Stack, StackLayer};
pub use error::{CoreError, PlotError};
pub use fit::{FitError, FitOptions, FitResult};
pub use formula::{FitModel, Formula, FormulaError};
pub use histogram::{Histogram, HistogramError};
pub use pipeline::{expand_plots, process_plot, LegendEntry, PlotOutcome};
pub use ratio::{RatioFit, RatioPanel};
pub use scaler::Normalization;
pub use sideband::{SidebandEstimate, SidebandYield};
pub use summary::{SummaryReport, SummaryRow, SummarySection};
pub use systematics::BackgroundBands;
