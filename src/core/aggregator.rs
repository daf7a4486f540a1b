//! Background aggregation
//!
//! Scaled simulated backgrounds are summed into a stat-only total and stacked
//! by display order. Sources sharing a group become one layer that takes the
//! position of the group's first member. Data sources are summed into one
//! histogram and signals are kept as separate overlays.

use serde::Serialize;

use crate::core::drawable::{Stack, StackLayer};
use crate::core::error::CoreError;
use crate::core::histogram::Histogram;
use crate::entities::group::Group;
use crate::entities::source::{Source, SourceKind};

/// Summed simulated background
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Background {
    /// Element-wise sum with statistical errors only
    pub stat_only: Histogram,

    pub stack: Stack,

    /// Sum of weights before any normalization
    pub total_weight: f64,
}

/// A signal curve drawn on top of the stack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub sources: Vec<String>,
    pub histogram: Histogram,
}

/// Indices of `sources` sorted by `order`; sources without one come last
///
/// The sort is stable, so equal orders keep declaration order.
pub fn display_order(sources: &[Source]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..sources.len()).collect();
    indices.sort_by_key(|&i| match sources[i].order {
        Some(order) => (0, order),
        None => (1, 0),
    });
    indices
}

fn loaded_of_kind(sources: &[Source], kind: SourceKind) -> impl Iterator<Item = (&Source, &Histogram)> {
    display_order(sources)
        .into_iter()
        .map(move |i| &sources[i])
        .filter(move |s| s.kind == kind)
        .filter_map(|s| s.histogram.as_ref().map(|h| (s, h)))
}

fn group_of<'a>(source: &Source, groups: &'a [Group]) -> Option<&'a Group> {
    let name = source.group.as_deref()?;
    groups.iter().find(|g| g.name == name)
}

fn source_label(source: &Source) -> String {
    source.legend.clone().unwrap_or_else(|| source.name())
}

fn binning_error(source: &Source) -> impl FnOnce(crate::core::histogram::HistogramError) -> CoreError {
    let source_name = source.name();
    move |error| CoreError::BinningMismatch { source_name, error }
}

/// Layers of `kind`, one per source or per group, in display order
fn layers(
    sources: &[Source],
    groups: &[Group],
    kind: SourceKind,
) -> Result<Vec<StackLayer>, CoreError> {
    let mut layers: Vec<StackLayer> = Vec::new();
    for (source, histogram) in loaded_of_kind(sources, kind) {
        let group = group_of(source, groups);
        let existing = group.and_then(|g| {
            layers
                .iter_mut()
                .find(|l| l.group.as_deref() == Some(g.name.as_str()))
        });
        match existing {
            Some(layer) => {
                layer.histogram.add(histogram).map_err(binning_error(source))?;
                layer.sources.push(source.name());
            }
            None => {
                let (label, group_name, name) = match group {
                    Some(g) => (g.label().to_string(), Some(g.name.clone()), g.name.clone()),
                    None => (source_label(source), None, source.name()),
                };
                layers.push(StackLayer {
                    label,
                    group: group_name,
                    sources: vec![source.name()],
                    histogram: histogram.clone_named(name),
                });
            }
        }
    }
    Ok(layers)
}

/// Sum and stack the simulated backgrounds
///
/// Returns `None` when there is no background: no simulated source at all,
/// or a total weight of exactly zero.
pub fn aggregate_background(
    sources: &[Source],
    groups: &[Group],
) -> Result<Option<Background>, CoreError> {
    let mut stat_only: Option<Histogram> = None;
    for (source, histogram) in loaded_of_kind(sources, SourceKind::Mc) {
        match stat_only.as_mut() {
            Some(total) => total.add(histogram).map_err(binning_error(source))?,
            None => stat_only = Some(histogram.clone_named("mc_stat_only")),
        }
    }
    let Some(stat_only) = stat_only else {
        log::debug!("No simulated background");
        return Ok(None);
    };

    let total_weight = stat_only.integral();
    if total_weight == 0.0 {
        log::warn!("Simulated background has zero total weight");
        return Ok(None);
    }

    let mut stack = Stack::new("mc_stack");
    for layer in layers(sources, groups, SourceKind::Mc)? {
        stack.push(layer);
    }

    Ok(Some(Background {
        stat_only,
        stack,
        total_weight,
    }))
}

/// Sum of every data histogram; `None` when absent or of zero weight
pub fn combine_data(sources: &[Source]) -> Result<Option<Histogram>, CoreError> {
    let mut data: Option<Histogram> = None;
    for (source, histogram) in loaded_of_kind(sources, SourceKind::Data) {
        match data.as_mut() {
            Some(total) => total.add(histogram).map_err(binning_error(source))?,
            None => data = Some(histogram.clone_named("data")),
        }
    }
    match data {
        Some(h) if h.integral() == 0.0 => {
            log::warn!("Data has zero total weight");
            Ok(None)
        }
        other => Ok(other),
    }
}

/// Signal overlays, summed per group
pub fn collect_signals(sources: &[Source], groups: &[Group]) -> Result<Vec<Overlay>, CoreError> {
    Ok(layers(sources, groups, SourceKind::Signal)?
        .into_iter()
        .map(|layer| Overlay {
            label: layer.label,
            group: layer.group,
            sources: layer.sources,
            histogram: layer.histogram,
        })
        .collect())
}

/// Scale everything drawn to unit area
///
/// Backgrounds share the total simulated weight, each signal uses its own and
/// data its own. Source histograms are scaled too, so systematic errors
/// computed from them follow.
pub fn normalize(
    sources: &mut [Source],
    background: Option<&mut Background>,
    signals: &mut [Overlay],
    data: Option<&mut Histogram>,
) {
    if let Some(background) = background {
        let factor = 1.0 / background.total_weight.abs();
        background.stat_only.scale(factor);
        background.stack.scale(factor);
        for source in sources.iter_mut().filter(|s| s.kind == SourceKind::Mc) {
            if let Some(h) = source.histogram.as_mut() {
                h.scale(factor);
            }
        }
    }

    for signal in signals.iter_mut() {
        let weight = signal.histogram.integral();
        if weight != 0.0 {
            signal.histogram.scale(1.0 / weight.abs());
        }
    }

    if let Some(data) = data {
        let weight = data.integral();
        if weight != 0.0 {
            data.scale(1.0 / weight);
        }
    }
}
