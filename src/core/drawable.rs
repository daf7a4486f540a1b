//! Drawable objects handed to a renderer
//!
//! A closed set: a single histogram or an ordered stack of histograms. The
//! helpers here replace per-type dispatch with a `match`.

use serde::Serialize;

use crate::core::histogram::{DisplayRange, Histogram};
use crate::entities::plot::Plot;

/// One layer of a background stack
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackLayer {
    /// Legend text of the layer
    pub label: String,

    /// Group the layer stands for, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Names of the sources summed into this layer
    pub sources: Vec<String>,

    pub histogram: Histogram,
}

/// Ordered visual sum of background histograms, first layer at the bottom
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stack {
    pub name: String,
    pub layers: Vec<StackLayer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display: Option<DisplayRange>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
            display: None,
        }
    }

    pub fn push(&mut self, layer: StackLayer) {
        self.layers.push(layer);
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Cumulative sum of every layer
    pub fn total(&self) -> Option<Histogram> {
        let (first, rest) = self.layers.split_first()?;
        let mut total = first.histogram.clone_named(format!("{}_total", self.name));
        for layer in rest {
            // Layers are built from compatible histograms
            if total.add(&layer.histogram).is_err() {
                log::warn!("Stack '{}' has a layer with different binning", self.name);
            }
        }
        Some(total)
    }

    /// Scale every layer
    pub fn scale(&mut self, factor: f64) {
        for layer in &mut self.layers {
            layer.histogram.scale(factor);
        }
    }

    pub fn set_display_range(&mut self, minimum: Option<f64>, maximum: Option<f64>) {
        self.display = Some(DisplayRange { minimum, maximum });
    }
}

/// Axis titles as a renderer should draw them
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisTitles {
    pub x: String,
    pub y: String,
    /// Hidden when a ratio panel carries the x axis
    pub show_x_labels: bool,
}

/// Frame limits for the main pad
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Frame {
    pub minimum: f64,
    pub maximum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Drawable {
    Histogram(Histogram),
    Stack(Stack),
}

impl Drawable {
    pub fn name(&self) -> &str {
        match self {
            Drawable::Histogram(h) => &h.name,
            Drawable::Stack(s) => &s.name,
        }
    }

    /// Largest visible value; for a stack, the maximum of the summed layers
    pub fn maximum(&self) -> f64 {
        match self {
            Drawable::Histogram(h) => h.maximum(),
            Drawable::Stack(s) => s
                .display
                .and_then(|d| d.maximum)
                .or_else(|| s.total().map(|t| t.maximum()))
                .unwrap_or(0.0),
        }
    }

    /// Smallest visible value; for a stack, the minimum of the summed layers
    pub fn minimum(&self) -> f64 {
        match self {
            Drawable::Histogram(h) => h.minimum(),
            Drawable::Stack(s) => s
                .display
                .and_then(|d| d.minimum)
                .or_else(|| s.total().map(|t| t.minimum()))
                .unwrap_or(0.0),
        }
    }

    /// Apply the plot's fixed y range, if it has one
    pub fn set_range(&mut self, plot: &Plot) {
        let Some([low, high]) = plot.y_axis_range else {
            return;
        };
        match self {
            Drawable::Histogram(h) => h.set_display_range(Some(low), Some(high)),
            Drawable::Stack(s) => s.set_display_range(Some(low), Some(high)),
        }
    }

    /// Axis titles for this object; the y title carries the first bin width
    pub fn axis_titles(&self, plot: &Plot) -> AxisTitles {
        let bin_width = match self {
            Drawable::Histogram(h) => Some(h.bin_width(0)),
            Drawable::Stack(s) => s.layers.first().map(|l| l.histogram.bin_width(0)),
        };
        let y = match bin_width {
            Some(width) if !plot.y_axis.is_empty() => format!("{} / {:.2}", plot.y_axis, width),
            _ => plot.y_axis.clone(),
        };
        AxisTitles {
            x: plot.x_axis.clone(),
            y,
            show_x_labels: !plot.show_ratio,
        }
    }
}

/// Frame range of the main pad
///
/// The highest maximum gets a safety margin (x1.2, or x8 on a log scale) and
/// the lowest minimum is scaled by 1.2, raised to 0.1 first on a log scale
/// when it is not positive. A fixed `y-axis-range` wins.
pub fn frame_range(items: &[Drawable], plot: &Plot) -> Option<Frame> {
    if let Some([minimum, maximum]) = plot.y_axis_range {
        return Some(Frame { minimum, maximum });
    }
    if items.is_empty() {
        return None;
    }
    let maximum = items
        .iter()
        .map(Drawable::maximum)
        .fold(f64::NEG_INFINITY, f64::max);
    let mut minimum = items
        .iter()
        .map(Drawable::minimum)
        .fold(f64::INFINITY, f64::min);

    let margin = if plot.log_y { 8.0 } else { 1.2 };
    if minimum <= 0.0 && plot.log_y {
        minimum = 0.1;
    }
    Some(Frame {
        minimum: minimum * 1.2,
        maximum: maximum * margin,
    })
}
