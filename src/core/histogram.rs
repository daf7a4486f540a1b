//! Histogram - one-dimensional binned series with per-bin errors
//!
//! This is the numeric currency of the whole pipeline. Every source histogram,
//! combined background, ratio and confidence band is a `Histogram`.
//! Errors are absolute per-bin uncertainties; arithmetic propagates them the
//! way the usual HEP histogram libraries do (uncorrelated, in quadrature).

use serde::Serialize;
use thiserror::Error;

/// Relative tolerance used when comparing bin edges
const EDGE_TOLERANCE: f64 = 1e-9;

/// Errors raised by histogram arithmetic
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HistogramError {
    #[error("histograms '{left}' ({left_bins} bins) and '{right}' ({right_bins} bins) have different binning")]
    IncompatibleBinning {
        left: String,
        right: String,
        left_bins: usize,
        right_bins: usize,
    },

    #[error("cannot rebin '{name}' with {bins} bins by a factor of {factor}")]
    InvalidRebin {
        name: String,
        bins: usize,
        factor: usize,
    },

    #[error("invalid bin edges for '{name}': {reason}")]
    InvalidEdges { name: String, reason: String },

    #[error("'{name}' has {bins} bins but {found} {what} values were given")]
    LengthMismatch {
        name: String,
        bins: usize,
        found: usize,
        what: &'static str,
    },
}

/// Display limits on the y axis. Never applied to stored contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DisplayRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// A 1-D histogram with explicit bin edges
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// Object name
    pub name: String,

    /// Bin edges (length = bins + 1, strictly increasing)
    edges: Vec<f64>,

    /// Bin contents
    content: Vec<f64>,

    /// Absolute bin errors
    errors: Vec<f64>,

    /// Y-axis display limits
    #[serde(skip_serializing_if = "DisplayRange::is_unset")]
    display: DisplayRange,
}

impl DisplayRange {
    fn is_unset(&self) -> bool {
        self.minimum.is_none() && self.maximum.is_none()
    }
}

impl Histogram {
    /// Create an empty histogram with `bins` equal-width bins over `[low, high]`
    pub fn uniform(name: impl Into<String>, bins: usize, low: f64, high: f64) -> Self {
        let bins = bins.max(1);
        let width = (high - low) / bins as f64;
        let edges = (0..=bins).map(|i| low + width * i as f64).collect();
        Self {
            name: name.into(),
            edges,
            content: vec![0.0; bins],
            errors: vec![0.0; bins],
            display: DisplayRange::default(),
        }
    }

    /// Create an empty histogram from explicit bin edges
    pub fn from_edges(name: impl Into<String>, edges: Vec<f64>) -> Result<Self, HistogramError> {
        let name = name.into();
        if edges.len() < 2 {
            return Err(HistogramError::InvalidEdges {
                name,
                reason: "at least two edges are required".to_string(),
            });
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(HistogramError::InvalidEdges {
                name,
                reason: "edges must be finite".to_string(),
            });
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(HistogramError::InvalidEdges {
                name,
                reason: "edges must be strictly increasing".to_string(),
            });
        }

        let bins = edges.len() - 1;
        Ok(Self {
            name,
            edges,
            content: vec![0.0; bins],
            errors: vec![0.0; bins],
            display: DisplayRange::default(),
        })
    }

    /// Set bin contents; errors default to `sqrt(|content|)`
    pub fn with_content(mut self, content: Vec<f64>) -> Result<Self, HistogramError> {
        self.check_length(content.len(), "content")?;
        self.errors = content.iter().map(|c| c.abs().sqrt()).collect();
        self.content = content;
        Ok(self)
    }

    /// Override bin errors
    pub fn with_errors(mut self, errors: Vec<f64>) -> Result<Self, HistogramError> {
        self.check_length(errors.len(), "error")?;
        self.errors = errors;
        Ok(self)
    }

    /// Same binning and name, all bins zeroed
    pub fn empty_like(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            edges: self.edges.clone(),
            content: vec![0.0; self.n_bins()],
            errors: vec![0.0; self.n_bins()],
            display: DisplayRange::default(),
        }
    }

    /// Clone under a new name
    pub fn clone_named(&self, name: impl Into<String>) -> Self {
        let mut h = self.clone();
        h.name = name.into();
        h
    }

    fn check_length(&self, found: usize, what: &'static str) -> Result<(), HistogramError> {
        if found != self.n_bins() {
            return Err(HistogramError::LengthMismatch {
                name: self.name.clone(),
                bins: self.n_bins(),
                found,
                what,
            });
        }
        Ok(())
    }

    pub fn n_bins(&self) -> usize {
        self.content.len()
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn content(&self) -> &[f64] {
        &self.content
    }

    pub fn errors(&self) -> &[f64] {
        &self.errors
    }

    pub fn bin_content(&self, bin: usize) -> f64 {
        self.content[bin]
    }

    pub fn bin_error(&self, bin: usize) -> f64 {
        self.errors[bin]
    }

    pub fn set_bin_content(&mut self, bin: usize, value: f64) {
        self.content[bin] = value;
    }

    pub fn set_bin_error(&mut self, bin: usize, value: f64) {
        self.errors[bin] = value;
    }

    pub fn low_edge(&self, bin: usize) -> f64 {
        self.edges[bin]
    }

    pub fn up_edge(&self, bin: usize) -> f64 {
        self.edges[bin + 1]
    }

    pub fn bin_width(&self, bin: usize) -> f64 {
        self.edges[bin + 1] - self.edges[bin]
    }

    pub fn bin_center(&self, bin: usize) -> f64 {
        0.5 * (self.edges[bin] + self.edges[bin + 1])
    }

    /// Bin centres for every bin
    pub fn centers(&self) -> Vec<f64> {
        (0..self.n_bins()).map(|i| self.bin_center(i)).collect()
    }

    /// Lower edge of the first bin
    pub fn x_min(&self) -> f64 {
        self.edges[0]
    }

    /// Upper edge of the last bin
    pub fn x_max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Index of the bin containing `x` (upper edge of the last bin included)
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if !(self.x_min()..=self.x_max()).contains(&x) {
            return None;
        }
        let idx = self.edges.partition_point(|&e| e <= x);
        Some(idx.saturating_sub(1).min(self.n_bins() - 1))
    }

    /// Sum of bin contents (under/overflow are not modelled)
    pub fn integral(&self) -> f64 {
        self.content.iter().sum()
    }

    /// Sum of contents over the bins `[first, last]`, clamped to the histogram
    pub fn integral_range(&self, first: usize, last: usize) -> f64 {
        if first >= self.n_bins() {
            return 0.0;
        }
        let last = last.min(self.n_bins() - 1);
        self.content[first..=last].iter().sum()
    }

    /// True when two histograms share the same bin edges
    pub fn same_binning(&self, other: &Histogram) -> bool {
        self.edges.len() == other.edges.len()
            && self.edges.iter().zip(&other.edges).all(|(a, b)| {
                let scale = a.abs().max(b.abs()).max(1.0);
                (a - b).abs() <= EDGE_TOLERANCE * scale
            })
    }

    /// Fail with [`HistogramError::IncompatibleBinning`] unless binnings agree
    pub fn check_binning(&self, other: &Histogram) -> Result<(), HistogramError> {
        if self.same_binning(other) {
            Ok(())
        } else {
            Err(HistogramError::IncompatibleBinning {
                left: self.name.clone(),
                right: other.name.clone(),
                left_bins: self.n_bins(),
                right_bins: other.n_bins(),
            })
        }
    }

    /// Bin-wise sum; errors combine in quadrature
    pub fn add(&mut self, other: &Histogram) -> Result<(), HistogramError> {
        self.add_scaled(other, 1.0)
    }

    /// `self += c * other`; errors combine as `sqrt(e1² + c²·e2²)`
    pub fn add_scaled(&mut self, other: &Histogram, c: f64) -> Result<(), HistogramError> {
        self.check_binning(other)?;
        for i in 0..self.n_bins() {
            self.content[i] += c * other.content[i];
            self.errors[i] = self.errors[i].hypot(c * other.errors[i]);
        }
        Ok(())
    }

    /// Multiply contents by `factor` and errors by `|factor|`
    pub fn scale(&mut self, factor: f64) {
        for (c, e) in self.content.iter_mut().zip(self.errors.iter_mut()) {
            *c *= factor;
            *e *= factor.abs();
        }
    }

    /// Merge groups of `factor` adjacent bins
    ///
    /// Contents are summed and errors combined in quadrature. The factor must
    /// divide the number of bins.
    pub fn rebin(&mut self, factor: usize) -> Result<(), HistogramError> {
        if factor <= 1 {
            if factor == 1 {
                return Ok(());
            }
            return Err(self.rebin_error(factor));
        }
        if self.n_bins() % factor != 0 {
            return Err(self.rebin_error(factor));
        }

        let edges = self.edges.iter().step_by(factor).copied().collect();
        let content = self
            .content
            .chunks(factor)
            .map(|chunk| chunk.iter().sum())
            .collect();
        let errors = self
            .errors
            .chunks(factor)
            .map(|chunk| chunk.iter().map(|e| e * e).sum::<f64>().sqrt())
            .collect();

        self.edges = edges;
        self.content = content;
        self.errors = errors;
        Ok(())
    }

    fn rebin_error(&self, factor: usize) -> HistogramError {
        HistogramError::InvalidRebin {
            name: self.name.clone(),
            bins: self.n_bins(),
            factor,
        }
    }

    /// Bin-wise quotient `self / denominator`
    ///
    /// Bins with a zero denominator are defined as 0 with zero error. Errors
    /// elsewhere assume uncorrelated numerator and denominator:
    /// `sqrt(e1²·c2² + e2²·c1²) / c2²`.
    pub fn divide(&self, denominator: &Histogram) -> Result<Histogram, HistogramError> {
        self.check_binning(denominator)?;
        let mut out = self.empty_like(format!("{}_over_{}", self.name, denominator.name));
        for i in 0..self.n_bins() {
            let (c1, e1) = (self.content[i], self.errors[i]);
            let (c2, e2) = (denominator.content[i], denominator.errors[i]);
            if c2 == 0.0 {
                continue;
            }
            out.content[i] = c1 / c2;
            out.errors[i] = ((e1 * c2).powi(2) + (e2 * c1).powi(2)).sqrt() / (c2 * c2);
        }
        Ok(out)
    }

    /// Zero every bin, keeping binning and name
    pub fn reset(&mut self) {
        self.content.iter_mut().for_each(|c| *c = 0.0);
        self.errors.iter_mut().for_each(|e| *e = 0.0);
    }

    /// Fix the y-axis display limits
    pub fn set_display_range(&mut self, minimum: Option<f64>, maximum: Option<f64>) {
        self.display = DisplayRange { minimum, maximum };
    }

    pub fn display_range(&self) -> DisplayRange {
        self.display
    }

    /// Largest bin content, or the display maximum when one is set
    pub fn maximum(&self) -> f64 {
        self.display.maximum.unwrap_or_else(|| {
            self.content
                .iter()
                .copied()
                .fold(f64::NEG_INFINITY, f64::max)
        })
    }

    /// Smallest bin content, or the display minimum when one is set
    pub fn minimum(&self) -> f64 {
        self.display
            .minimum
            .unwrap_or_else(|| self.content.iter().copied().fold(f64::INFINITY, f64::min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(content: Vec<f64>) -> Histogram {
        let n = content.len();
        Histogram::uniform("h", n, 0.0, n as f64)
            .with_content(content)
            .unwrap()
    }

    #[test]
    fn test_uniform_edges() {
        let h = Histogram::uniform("h", 4, 0.0, 2.0);
        assert_eq!(h.n_bins(), 4);
        assert_eq!(h.edges(), &[0.0, 0.5, 1.0, 1.5, 2.0]);
        assert_eq!(h.bin_center(1), 0.75);
    }

    #[test]
    fn test_from_edges_rejects_unsorted() {
        let result = Histogram::from_edges("h", vec![0.0, 2.0, 1.0]);
        assert!(matches!(result, Err(HistogramError::InvalidEdges { .. })));
    }

    #[test]
    fn test_default_errors_are_poisson() {
        let h = filled(vec![4.0, 9.0]);
        assert_eq!(h.errors(), &[2.0, 3.0]);
    }

    #[test]
    fn test_add_combines_errors_in_quadrature() {
        let mut a = filled(vec![9.0, 16.0]);
        let b = filled(vec![16.0, 9.0]);
        a.add(&b).unwrap();
        assert_eq!(a.content(), &[25.0, 25.0]);
        assert!((a.bin_error(0) - 5.0).abs() < 1e-12);
        assert!((a.bin_error(1) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_add_rejects_other_binning() {
        let mut a = filled(vec![1.0, 2.0]);
        let b = filled(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            a.add(&b),
            Err(HistogramError::IncompatibleBinning { .. })
        ));
    }

    #[test]
    fn test_scale_propagates_errors() {
        let mut h = filled(vec![4.0]);
        h.scale(-0.5);
        assert_eq!(h.bin_content(0), -2.0);
        assert_eq!(h.bin_error(0), 1.0);
    }

    #[test]
    fn test_rebin_merges_bins() {
        let mut h = filled(vec![1.0, 3.0, 9.0, 16.0]);
        h.rebin(2).unwrap();
        assert_eq!(h.n_bins(), 2);
        assert_eq!(h.content(), &[4.0, 25.0]);
        assert_eq!(h.edges(), &[0.0, 2.0, 4.0]);
        assert!((h.bin_error(1) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_rebin_requires_divisor() {
        let mut h = filled(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            h.rebin(2),
            Err(HistogramError::InvalidRebin { factor: 2, .. })
        ));
        assert!(h.rebin(0).is_err());
        assert!(h.rebin(1).is_ok());
    }

    #[test]
    fn test_divide_zero_denominator_is_zero() {
        let num = filled(vec![5.0, 8.0]);
        let den = filled(vec![0.0, 4.0]);
        let ratio = num.divide(&den).unwrap();
        assert_eq!(ratio.bin_content(0), 0.0);
        assert_eq!(ratio.bin_error(0), 0.0);
        assert_eq!(ratio.bin_content(1), 2.0);
        assert!(ratio.bin_content(0).is_finite());
    }

    #[test]
    fn test_divide_error_propagation() {
        // c1=4 ± 2, c2=2 ± 1 -> 2 ± sqrt(4*4 + 1*16)/4 = sqrt(32)/4
        let num = filled(vec![4.0]);
        let den = filled(vec![2.0]).with_errors(vec![1.0]).unwrap();
        let ratio = num.divide(&den).unwrap();
        assert!((ratio.bin_error(0) - 32f64.sqrt() / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_find_bin() {
        let h = Histogram::uniform("h", 4, 0.0, 4.0);
        assert_eq!(h.find_bin(0.0), Some(0));
        assert_eq!(h.find_bin(1.5), Some(1));
        assert_eq!(h.find_bin(4.0), Some(3));
        assert_eq!(h.find_bin(4.5), None);
    }

    #[test]
    fn test_display_range_does_not_touch_content() {
        let mut h = filled(vec![0.5, 3.0]);
        h.set_display_range(Some(0.0), Some(2.0));
        assert_eq!(h.maximum(), 2.0);
        assert_eq!(h.bin_content(1), 3.0);
    }
}
