//! Per-plot processing
//!
//! One named plot goes through load, scale, aggregate, propagate, ratio and
//! summary before the next one starts. Every per-plot object is released when
//! the plot is done, whether it succeeded or not.

use serde::Serialize;

use crate::core::aggregator::{
    aggregate_background, collect_signals, combine_data, display_order, normalize, Background,
    Overlay,
};
use crate::core::context::RenderContext;
use crate::core::drawable::{frame_range, AxisTitles, Drawable, Frame, Stack, StackLayer};
use crate::core::error::{CoreError, PlotError};
use crate::core::formula::FitModel;
use crate::core::histogram::Histogram;
use crate::core::ratio::{compute_ratio, fit_ratio, RatioPanel};
use crate::core::scaler::{rebin_source, scale_source, validate, Normalization};
use crate::core::sideband::{self, SidebandEstimate};
use crate::core::summary::{build_report, SummaryReport};
use crate::core::systematics::{propagate, BackgroundBands};
use crate::entities::analysis::Analysis;
use crate::entities::plot::{is_glob, Plot};
use crate::entities::source::{Source, SourceKind};
use crate::entities::style::{Color, Label, Position};
use crate::io::store::HistogramStore;

/// Legend text of the background uncertainty band
pub const UNCERTAINTIES_LEGEND: &str = "Uncertainties";

pub const NOTE_NO_BACKGROUND: &str = "no background";
pub const NOTE_NO_DATA: &str = "no data";
pub const NOTE_NO_RATIO: &str = "no ratio computed";
pub const NOTE_NOTHING_TO_DRAW: &str = "nothing to draw";

/// One line of the plot legend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub label: String,
    /// ROOT-style option letters: `p`, `l`, `f`, ...
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_color: Option<u32>,
}

/// Presentation settings resolved for one plot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanvasStyle {
    pub width: f64,
    pub height: f64,
    pub experiment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub luminosity_label: Option<String>,
    /// Plot label, falling back to the global one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_label: Option<String>,
    pub legend_position: Position,
    pub log_y: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_axis_range: Option<[f64; 2]>,
    pub error_fill_color: u32,
    pub ratio_fit_line_color: u32,
    pub ratio_fit_error_fill_color: u32,
    pub fit_legend_position: [f64; 2],
}

impl CanvasStyle {
    fn resolve(analysis: &Analysis, plot: &Plot, ctx: &mut RenderContext) -> Self {
        let config = &analysis.configuration;
        Self {
            width: config.width,
            height: config.height,
            experiment: config.experiment.clone(),
            luminosity_label: config.luminosity_label_text(),
            extra_label: plot.extra_label.clone().or_else(|| config.extra_label.clone()),
            legend_position: plot.legend_position.unwrap_or(analysis.legend.position),
            log_y: plot.log_y,
            x_axis_range: plot.x_axis_range,
            error_fill_color: ctx.color_index(&config.error_fill_color),
            ratio_fit_line_color: ctx.color_index(&config.ratio_fit_line_color),
            ratio_fit_error_fill_color: ctx.color_index(&config.ratio_fit_error_fill_color),
            fit_legend_position: plot.fit_legend_position,
        }
    }
}

/// Everything computed for one plot
#[derive(Debug, Clone, Serialize)]
pub struct PlotOutcome {
    pub plot: Plot,
    pub canvas: CanvasStyle,
    /// Bin edges shared by every histogram of the plot
    pub edges: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<Stack>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bands: Option<BackgroundBands>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Histogram>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<Overlay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<RatioPanel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sideband: Option<SidebandEstimate>,
    pub legend: Vec<LegendEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis_titles: Option<AxisTitles>,
    pub summary: SummaryReport,
}

impl PlotOutcome {
    pub fn notes(&self) -> &[String] {
        &self.summary.notes
    }
}

/// Process one concrete plot
///
/// Sources are reset before and after, and the per-plot state of `ctx` is
/// released, so a plot never sees leftovers of the previous one.
pub fn process_plot(
    analysis: &mut Analysis,
    plot: &Plot,
    store: &mut dyn HistogramStore,
    ctx: &mut RenderContext,
) -> Result<PlotOutcome, PlotError> {
    log::info!("Processing plot '{}'", plot.name);
    analysis.reset_sources();
    let outcome = run(analysis, plot, store, ctx);
    analysis.reset_sources();
    ctx.finish_plot();
    outcome.map_err(|error| PlotError::new(&plot.name, error))
}

/// Concrete plots: glob names are matched against the objects of the first
/// source file, other names are taken as they are
pub fn expand_plots(
    analysis: &Analysis,
    store: &mut dyn HistogramStore,
) -> Result<Vec<Plot>, CoreError> {
    let first = analysis.sources.first().ok_or(CoreError::NoSources)?;
    let needs_objects = analysis.plots.iter().any(|p| is_glob(&p.name));
    let objects = if needs_objects {
        store.object_names(&first.path)?
    } else {
        Vec::new()
    };

    let mut plots = Vec::new();
    for plot in &analysis.plots {
        if !is_glob(&plot.name) {
            plots.push(plot.clone());
            continue;
        }
        let before = plots.len();
        plots.extend(
            objects
                .iter()
                .filter(|object| plot.matches(object))
                .map(|object| plot.clone_named(object.as_str())),
        );
        if plots.len() == before {
            log::warn!("No object of '{}' matches '{}'", first.path, plot.name);
        }
    }

    if plots.is_empty() {
        return Err(CoreError::NoPlots {
            path: first.path.clone(),
        });
    }
    Ok(plots)
}

fn load_sources(
    sources: &mut [Source],
    object: &str,
    store: &mut dyn HistogramStore,
) -> Result<(), CoreError> {
    for source in sources.iter_mut() {
        let histogram =
            store
                .load(&source.path, object)?
                .ok_or_else(|| CoreError::MissingHistogram {
                    path: source.path.clone(),
                    object: object.to_string(),
                })?;
        let source_name = source.name();
        for variant in source.systematics.iter_mut() {
            variant.histogram = store.load(&variant.path, object)?;
            match variant.histogram.as_ref() {
                Some(h) => h.check_binning(&histogram).map_err(|error| {
                    CoreError::VariantBinningMismatch {
                        source_name: source_name.clone(),
                        variant: variant.name(),
                        error,
                    }
                })?,
                None => log::warn!(
                    "Object '{}' not found in systematics file '{}', skipping it",
                    object,
                    variant.path
                ),
            }
        }
        source.histogram = Some(histogram);
    }
    Ok(())
}

fn note(notes: &mut Vec<String>, text: impl Into<String>) {
    let text = text.into();
    log::warn!("{}", text);
    notes.push(text);
}

fn run(
    analysis: &mut Analysis,
    plot: &Plot,
    store: &mut dyn HistogramStore,
    ctx: &mut RenderContext,
) -> Result<PlotOutcome, CoreError> {
    if analysis.sources.is_empty() {
        return Err(CoreError::NoSources);
    }
    let fit_model = if plot.show_ratio && plot.fit_ratio {
        Some(FitModel::parse(&plot.fit_function)?)
    } else {
        None
    };
    for source in &analysis.sources {
        validate(source)?;
    }

    load_sources(&mut analysis.sources, &plot.name, store)?;
    let norm = Normalization::from_configuration(&analysis.configuration);
    for source in analysis.sources.iter_mut() {
        scale_source(source, &norm)?;
        rebin_source(source, plot.rebin)?;
    }

    let mut notes: Vec<String> = analysis
        .dropped_systematics
        .iter()
        .map(|path| format!("systematics file '{}' not found", path))
        .collect();
    let mut background = aggregate_background(&analysis.sources, &analysis.groups)?;
    let mut data = combine_data(&analysis.sources)?;
    let mut signals = collect_signals(&analysis.sources, &analysis.groups)?;
    if background.is_none() {
        note(&mut notes, NOTE_NO_BACKGROUND);
    }
    if data.is_none() {
        note(&mut notes, NOTE_NO_DATA);
    }
    if plot.normalized {
        normalize(
            &mut analysis.sources,
            background.as_mut(),
            &mut signals,
            data.as_mut(),
        );
    }

    let sideband = match &plot.sideband {
        Some(config) => match (data.as_ref(), background.as_mut()) {
            (Some(data), Some(background)) => {
                match sideband::estimate(config, data, &background.stat_only) {
                    Ok(estimate) => {
                        add_estimate(background, &estimate)?;
                        Some(estimate)
                    }
                    Err(CoreError::SidebandFit(e)) => {
                        note(&mut notes, format!("sideband fit failed: {}", e));
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => {
                note(&mut notes, "sideband skipped: data and background are both needed");
                None
            }
        },
        None => None,
    };

    let luminosity_error = analysis.configuration.luminosity_error;
    let bands = background
        .as_ref()
        .map(|bg| propagate(&bg.stat_only, luminosity_error, &mut analysis.sources))
        .transpose()?;

    let ratio = if plot.show_ratio {
        match (data.as_ref(), bands.as_ref()) {
            (Some(data), Some(bands)) => {
                let range = plot
                    .ratio_range
                    .unwrap_or(analysis.configuration.ratio_range);
                let mut panel = compute_ratio(data, bands, range)?;
                if let Some(model) = &fit_model {
                    fit_ratio(&mut panel, model, plot.fit_legend.as_deref());
                    if let Some(error) = &panel.fit_error {
                        notes.push(format!("ratio fit failed: {}", error));
                    }
                }
                Some(panel)
            }
            _ => {
                note(&mut notes, NOTE_NO_RATIO);
                None
            }
        }
    } else {
        None
    };

    for source in &analysis.sources {
        if source.summary.efficiency_exceeds_one() {
            notes.push(format!(
                "efficiency of '{}' exceeds 1 ({:.5})",
                source.name(),
                source.summary.efficiency
            ));
        }
    }

    let canvas = CanvasStyle::resolve(analysis, plot, ctx);
    let legend = legend_entries(
        analysis,
        background.as_ref(),
        plot.show_errors,
        sideband.as_ref(),
        ctx,
    );

    let mut drawables = Vec::new();
    if let Some(bg) = &background {
        drawables.push(Drawable::Stack(bg.stack.clone()));
    }
    drawables.extend(signals.iter().map(|s| Drawable::Histogram(s.histogram.clone())));
    if let Some(data) = &data {
        drawables.push(Drawable::Histogram(data.clone()));
    }
    for mut drawable in drawables {
        drawable.set_range(plot);
        ctx.keep(drawable);
    }
    let frame = frame_range(ctx.scratch(), plot);
    let axis_titles = ctx.scratch().first().map(|d| d.axis_titles(plot));
    if ctx.scratch().is_empty() {
        note(&mut notes, NOTE_NOTHING_TO_DRAW);
    }

    let edges = analysis
        .sources
        .iter()
        .find_map(|s| s.histogram.as_ref())
        .map(|h| h.edges().to_vec())
        .unwrap_or_default();
    let summary = build_report(&plot.name, &analysis.sources, luminosity_error, notes);

    Ok(PlotOutcome {
        plot: plot.clone(),
        canvas,
        edges,
        stack: background.map(|bg| bg.stack),
        bands,
        data,
        signals,
        ratio,
        sideband,
        legend,
        labels: plot.merged_labels(&analysis.configuration.labels),
        frame,
        axis_titles,
        summary,
    })
}

/// Fold the sideband estimate into the background sum and the stack
fn add_estimate(background: &mut Background, estimate: &SidebandEstimate) -> Result<(), CoreError> {
    background
        .stat_only
        .add(&estimate.nominal)
        .map_err(|error| CoreError::BinningMismatch {
            source_name: estimate.label.clone(),
            error,
        })?;
    background.stack.push(StackLayer {
        label: estimate.label.clone(),
        group: None,
        sources: Vec::new(),
        histogram: estimate.nominal.clone(),
    });
    Ok(())
}

fn color(ctx: &mut RenderContext, color: Option<&Color>) -> Option<u32> {
    color.map(|c| ctx.color_index(c))
}

/// Legend entries: backgrounds, then signals, then data, each in display order
///
/// A grouped source contributes its group once, and only if the group has a
/// legend; other sources contribute their own non-empty legend.
fn legend_entries(
    analysis: &Analysis,
    background: Option<&Background>,
    show_errors: bool,
    sideband: Option<&SidebandEstimate>,
    ctx: &mut RenderContext,
) -> Vec<LegendEntry> {
    let order = display_order(&analysis.sources);
    let mut entries = Vec::new();
    for kind in [SourceKind::Mc, SourceKind::Signal, SourceKind::Data] {
        for source in order.iter().map(|&i| &analysis.sources[i]) {
            if source.kind != kind || source.histogram.is_none() {
                continue;
            }
            match source.group.as_deref().and_then(|g| analysis.group(g)) {
                Some(group) => {
                    let Some(label) = group.legend.clone() else {
                        continue;
                    };
                    if !ctx.claim_legend_group(&group.name) {
                        continue;
                    }
                    entries.push(LegendEntry {
                        label,
                        style: group
                            .legend_style
                            .clone()
                            .unwrap_or_else(|| kind.default_legend_style().to_string()),
                        fill_color: color(ctx, group.fill_color.as_ref()),
                        line_color: color(ctx, group.line_color.as_ref()),
                    });
                }
                None => {
                    let Some(label) = source.legend.clone().filter(|l| !l.is_empty()) else {
                        continue;
                    };
                    entries.push(LegendEntry {
                        label,
                        style: source.legend_style().to_string(),
                        fill_color: color(ctx, source.fill_color.as_ref()),
                        line_color: color(ctx, source.line_color.as_ref()),
                    });
                }
            }
        }

        if kind == SourceKind::Mc {
            if let Some(estimate) = sideband {
                entries.push(LegendEntry {
                    label: estimate.label.clone(),
                    style: "f".to_string(),
                    fill_color: None,
                    line_color: None,
                });
            }
        }
    }

    if background.is_some() && show_errors {
        entries.push(LegendEntry {
            label: UNCERTAINTIES_LEGEND.to_string(),
            style: "f".to_string(),
            fill_color: Some(ctx.color_index(&analysis.configuration.error_fill_color)),
            line_color: None,
        });
    }
    entries
}
