//! Terminal preview of a processed plot using braille graphics
//!
//! The summed background is drawn as filled columns and data as dots on top,
//! on a linear scale up to the frame maximum.

use drawille::Canvas;

use crate::core::pipeline::PlotOutcome;

/// Default canvas size of the preview
pub const PREVIEW_WIDTH: u32 = 120;
pub const PREVIEW_HEIGHT: u32 = 40;

/// Render `outcome` on a `width` x `height` dot canvas
pub fn render_preview(outcome: &PlotOutcome, width: u32, height: u32) -> String {
    let n_bins = outcome.edges.len().saturating_sub(1);
    if n_bins == 0 || width == 0 || height == 0 {
        return "  (nothing to draw)".to_string();
    }

    let background: Option<Vec<f64>> = outcome
        .bands
        .as_ref()
        .map(|b| b.stat_only.content().to_vec());
    let data: Option<Vec<f64>> = outcome.data.as_ref().map(|h| h.content().to_vec());
    let top = outcome
        .frame
        .map(|f| f.maximum)
        .filter(|m| m.is_finite() && *m > 0.0)
        .or_else(|| {
            background
                .iter()
                .chain(data.iter())
                .flatten()
                .copied()
                .reduce(f64::max)
                .filter(|m| *m > 0.0)
        });
    let Some(top) = top else {
        return "  (nothing to draw)".to_string();
    };

    let mut canvas = Canvas::new(width, height);
    let column_of = |bin: usize| (bin as u64 * width as u64 / n_bins as u64) as u32;
    let row_of = |value: f64| {
        let fraction = (value / top).clamp(0.0, 1.0);
        (height - 1) - ((fraction * (height - 1) as f64).round() as u32)
    };

    if let Some(background) = &background {
        for (bin, value) in background.iter().enumerate() {
            let level = row_of(*value);
            for x in column_of(bin)..column_of(bin + 1) {
                // every other row
                for y in (level..height).step_by(2) {
                    canvas.set(x, y);
                }
            }
        }
    }

    if let Some(data) = &data {
        for (bin, value) in data.iter().enumerate() {
            if *value <= 0.0 {
                continue;
            }
            let x = (column_of(bin) + column_of(bin + 1)) / 2;
            let y = row_of(*value);
            canvas.set(x, y);
            canvas.set(x.saturating_sub(1), y);
            canvas.set((x + 1).min(width - 1), y);
        }
    }

    let mut output = String::new();
    output.push_str(&format!("{} (max {:.3})\n", outcome.plot.name, top));
    output.push_str(&canvas.frame());
    output.push_str(&format!(
        "\n  {:.3} … {:.3}",
        outcome.edges[0],
        outcome.edges[n_bins]
    ));
    output
}
