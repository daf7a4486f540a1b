//! Render context - state that outlives a single computation step
//!
//! Custom colors are allocated once per run and keep their index. Derived
//! drawables and the "group already in the legend" flags live for one plot
//! and are released by [`RenderContext::finish_plot`].

use std::collections::HashSet;

use crate::core::drawable::Drawable;
use crate::entities::style::{Color, Rgba};

/// First palette index handed out for custom colors
pub const FIRST_CUSTOM_COLOR: u32 = 1000;

#[derive(Debug)]
pub struct RenderContext {
    next_color: u32,
    palette: Vec<(u32, Rgba)>,
    scratch: Vec<Drawable>,
    legend_groups: HashSet<String>,
    plots_finished: usize,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            next_color: FIRST_CUSTOM_COLOR,
            palette: Vec::new(),
            scratch: Vec::new(),
            legend_groups: HashSet::new(),
            plots_finished: 0,
        }
    }

    /// Palette index for `color`, allocating one for new RGBA values
    pub fn color_index(&mut self, color: &Color) -> u32 {
        match color {
            Color::Index(index) => u32::try_from(*index).unwrap_or(0),
            Color::Rgba(rgba) => {
                if let Some((index, _)) = self.palette.iter().find(|(_, c)| c == rgba) {
                    return *index;
                }
                let index = self.next_color;
                self.next_color += 1;
                self.palette.push((index, *rgba));
                index
            }
        }
    }

    /// Custom colors allocated so far
    pub fn palette(&self) -> &[(u32, Rgba)] {
        &self.palette
    }

    /// Keep a derived object alive until the end of the current plot
    pub fn keep(&mut self, drawable: Drawable) -> &Drawable {
        self.scratch.push(drawable);
        &self.scratch[self.scratch.len() - 1]
    }

    pub fn scratch(&self) -> &[Drawable] {
        &self.scratch
    }

    /// Mark `group` as present in the legend; false if it already was
    pub fn claim_legend_group(&mut self, group: &str) -> bool {
        self.legend_groups.insert(group.to_string())
    }

    /// Release every per-plot object and legend flag
    pub fn finish_plot(&mut self) {
        log::trace!(
            "Releasing {} derived objects and {} legend groups",
            self.scratch.len(),
            self.legend_groups.len()
        );
        self.scratch.clear();
        self.legend_groups.clear();
        self.plots_finished += 1;
    }

    pub fn plots_finished(&self) -> usize {
        self.plots_finished
    }
}
