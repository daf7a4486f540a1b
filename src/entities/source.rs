//! Source entity - one physical input histogram file and its normalization
//!
//! A source is declared once in the `files` section of the configuration and
//! re-used for every plot. Per plot it owns exactly one loaded histogram and a
//! yield summary; both are cleared by [`Source::reset`] before the next plot.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::histogram::Histogram;
use crate::entities::style::Color;

/// Sample classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Recorded collision data
    Data,
    /// Simulated background
    #[default]
    #[serde(alias = "background", alias = "MC")]
    Mc,
    /// Simulated signal, drawn as an overlay
    Signal,
}

impl SourceKind {
    /// Order of the sections in summaries: data, MC, signal
    pub const REPORT_ORDER: [SourceKind; 3] =
        [SourceKind::Data, SourceKind::Mc, SourceKind::Signal];

    /// Default legend style for this kind
    pub fn default_legend_style(&self) -> &'static str {
        match self {
            SourceKind::Data => "p",
            SourceKind::Mc => "lf",
            SourceKind::Signal => "l",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Data => write!(f, "data"),
            SourceKind::Mc => write!(f, "mc"),
            SourceKind::Signal => write!(f, "signal"),
        }
    }
}

/// Yield summary written by the scaler and the systematic propagator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Summary {
    /// Normalized yield
    pub n_events: f64,

    /// Uncertainty on the yield
    pub n_events_error: f64,

    /// Selection efficiency (integral / generated events)
    pub efficiency: f64,

    /// Binomial uncertainty on the efficiency
    pub efficiency_error: f64,
}

impl Summary {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Efficiency above one means more selected than generated events
    pub fn efficiency_exceeds_one(&self) -> bool {
        self.efficiency > 1.0
    }
}

/// Which part of a variant histogram carries the fractional error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FractionFrom {
    /// Per-bin errors hold the fraction
    #[default]
    Error,
    /// Per-bin contents hold the fraction
    Content,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VariantSpec {
    Path(String),
    Detailed {
        path: String,
        #[serde(default, rename = "fraction-from")]
        fraction_from: FractionFrom,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

/// Alternate histogram giving a per-bin fractional systematic error
#[derive(Debug, Clone, Serialize)]
pub struct SystematicVariant {
    /// Path of the file holding the variant histograms
    pub path: String,

    /// Where the fraction is read from
    pub fraction_from: FractionFrom,

    /// Variant histogram for the current plot, if present
    #[serde(skip)]
    pub histogram: Option<Histogram>,

    /// Propagated summary, set only once the propagator has run
    #[serde(skip)]
    pub summary: Option<Summary>,
}

impl SystematicVariant {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fraction_from: FractionFrom::default(),
            histogram: None,
            summary: None,
        }
    }

    /// Display name (file stem)
    pub fn name(&self) -> String {
        file_stem(&self.path)
    }

    /// Fractional error in `bin`; zero when the variant is inactive
    pub fn fraction(&self, bin: usize) -> f64 {
        match (&self.histogram, self.fraction_from) {
            (Some(h), FractionFrom::Error) => h.bin_error(bin),
            (Some(h), FractionFrom::Content) => h.bin_content(bin),
            (None, _) => 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.histogram.is_some()
    }
}

fn deserialize_variants<'de, D>(deserializer: D) -> Result<Vec<SystematicVariant>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let specs = match OneOrMany::<VariantSpec>::deserialize(deserializer)? {
        OneOrMany::One(spec) => vec![spec],
        OneOrMany::Many(specs) => specs,
    };
    Ok(specs
        .into_iter()
        .map(|spec| match spec {
            VariantSpec::Path(path) => SystematicVariant::new(path),
            VariantSpec::Detailed {
                path,
                fraction_from,
            } => SystematicVariant {
                fraction_from,
                ..SystematicVariant::new(path)
            },
        })
        .collect())
}

fn default_one() -> f64 {
    1.0
}

/// One input file with its normalization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Source {
    /// File path (resolved against the configuration root)
    #[serde(skip)]
    pub path: String,

    /// Sample classification
    #[serde(rename = "type", default)]
    pub kind: SourceKind,

    /// Production cross-section
    #[serde(default = "default_one")]
    pub cross_section: f64,

    /// Branching ratio applied on top of the cross-section
    #[serde(default = "default_one")]
    pub branching_ratio: f64,

    /// Number of generated events before selection
    #[serde(default = "default_one")]
    pub generated_events: f64,

    /// Extra per-source scale
    #[serde(default = "default_one")]
    pub scale: f64,

    /// Stacking / drawing order; sources without one go last
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i16>,

    /// Name of the group this source is merged into
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Legend text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,

    /// Legend style (defaults by kind)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend_style: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<Color>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_color: Option<Color>,

    /// Drawing attributes carried through to the artifact; not interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_width: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_type: Option<i16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_type: Option<i16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_size: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_color: Option<Color>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_type: Option<i16>,

    /// Fractional systematic variants
    #[serde(default, deserialize_with = "deserialize_variants", skip_serializing)]
    pub systematics: Vec<SystematicVariant>,

    /// Histogram loaded for the current plot
    #[serde(skip)]
    pub histogram: Option<Histogram>,

    /// Yield summary for the current plot
    #[serde(skip)]
    pub summary: Summary,
}

impl Source {
    /// Create a source with unit normalization
    pub fn new(path: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            path: path.into(),
            kind,
            cross_section: 1.0,
            branching_ratio: 1.0,
            generated_events: 1.0,
            scale: 1.0,
            order: None,
            group: None,
            legend: None,
            legend_style: None,
            fill_color: None,
            line_color: None,
            line_width: None,
            line_type: None,
            fill_type: None,
            marker_size: None,
            marker_color: None,
            marker_type: None,
            systematics: Vec::new(),
            histogram: None,
            summary: Summary::default(),
        }
    }

    /// Builder-style normalization setter
    pub fn with_normalization(
        mut self,
        cross_section: f64,
        branching_ratio: f64,
        generated_events: f64,
    ) -> Self {
        self.cross_section = cross_section;
        self.branching_ratio = branching_ratio;
        self.generated_events = generated_events;
        self
    }

    /// Display name (file stem)
    pub fn name(&self) -> String {
        file_stem(&self.path)
    }

    /// Keys of the drawing attributes that were set
    pub fn drawing_attributes(&self) -> Vec<&'static str> {
        [
            ("line-width", self.line_width.is_some()),
            ("line-type", self.line_type.is_some()),
            ("fill-type", self.fill_type.is_some()),
            ("marker-size", self.marker_size.is_some()),
            ("marker-color", self.marker_color.is_some()),
            ("marker-type", self.marker_type.is_some()),
        ]
        .into_iter()
        .filter_map(|(key, set)| set.then_some(key))
        .collect()
    }

        pub fn legend_style(&self) -> &str {
        self.legend_style
            .as_deref()
            .unwrap_or_else(|| self.kind.default_legend_style())
    }

    /// Drop the per-plot histograms and summaries
    pub fn reset(&mut self) {
        self.histogram = None;
        self.summary.clear();
        for variant in &mut self.systematics {
            variant.histogram = None;
            variant.summary = None;
        }
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_yaml() {
        let source: Source = serde_yml::from_str("type: signal").unwrap();
        assert_eq!(source.kind, SourceKind::Signal);
        assert_eq!(source.cross_section, 1.0);
        assert_eq!(source.generated_events, 1.0);
        assert_eq!(source.order, None);
        assert!(source.systematics.is_empty());
    }

    #[test]
    fn test_missing_type_is_mc() {
        let source: Source = serde_yml::from_str("cross-section: 2.5").unwrap();
        assert_eq!(source.kind, SourceKind::Mc);
        assert_eq!(source.cross_section, 2.5);
    }

    #[test]
    fn test_systematics_single_or_list() {
        let one: Source = serde_yml::from_str("systematics: jec.yaml").unwrap();
        assert_eq!(one.systematics.len(), 1);
        assert_eq!(one.systematics[0].name(), "jec");

        let many: Source = serde_yml::from_str(
            "systematics:\n  - jec.yaml\n  - path: pu.yaml\n    fraction-from: content\n",
        )
        .unwrap();
        assert_eq!(many.systematics.len(), 2);
        assert_eq!(many.systematics[1].fraction_from, FractionFrom::Content);
    }

    #[test]
    fn test_drawing_attributes_are_accepted() {
        let source: Source = serde_yml::from_str(
            "type: data\nmarker-size: 1.2\nmarker-color: '#ff0000'\nmarker-type: 20\n\
             line-width: 2\nline-type: 2\nfill-type: 3004\n",
        )
        .unwrap();
        assert_eq!(source.marker_size, Some(1.2));
        assert!(source.marker_color.is_some());
        assert_eq!(source.marker_type, Some(20));
        assert_eq!(source.line_width, Some(2.0));
        assert_eq!(source.line_type, Some(2));
        assert_eq!(source.fill_type, Some(3004));
        assert_eq!(source.drawing_attributes().len(), 6);
        assert!(Source::new("a.yaml", SourceKind::Mc)
            .drawing_attributes()
            .is_empty());
    }

        #[test]
    fn test_reset_clears_plot_state() {
        let mut source = Source::new("dir/ttbar.yaml", SourceKind::Mc);
        source.histogram = Some(Histogram::uniform("h", 2, 0.0, 1.0));
        source.summary.n_events = 12.0;
        source.reset();
        assert!(source.histogram.is_none());
        assert_eq!(source.summary, Summary::default());
        assert_eq!(source.name(), "ttbar");
    }

    #[test]
    fn test_inactive_variant_has_zero_fraction() {
        let variant = SystematicVariant::new("jec.yaml");
        assert_eq!(variant.fraction(0), 0.0);
        assert!(!variant.is_active());
    }
}
