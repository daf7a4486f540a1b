//! Plot entity - one named plot request, possibly a glob over object names

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::entities::style::{Label, Position};

/// Model used for the sideband extrapolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidebandModel {
    /// `[0] * x^[1]`
    Powerlaw,
    /// `exp([0] + [1] * x)`
    Expo,
}

fn default_sideband_label() -> String {
    "QCD".to_string()
}

/// Data-driven background estimated from `data - background`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SidebandConfig {
    pub model: SidebandModel,

    /// Range `[lo, hi]` fitted to the data excess
    pub fit_range: [f64; 2],

    /// Yields are integrated from the bin containing this value
    pub integrate_from: f64,

    /// Fix the exponential slope instead of fitting it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_slope: Option<f64>,

    #[serde(default = "default_sideband_label")]
    pub label: String,
}

fn default_y_axis() -> String {
    "Events".to_string()
}

fn default_fit_function() -> String {
    "pol1".to_string()
}

fn default_fit_legend_position() -> [f64; 2] {
    [0.20, 0.38]
}

fn default_rebin() -> usize {
    1
}

/// A plot request from the `plots` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Plot {
    /// Object name, or a glob before expansion
    #[serde(skip_deserializing)]
    pub name: String,

    /// Glob of object names to skip during expansion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,

    #[serde(default)]
    pub x_axis: String,

    #[serde(default = "default_y_axis")]
    pub y_axis: String,

    #[serde(default)]
    pub normalized: bool,

    #[serde(default)]
    pub log_y: bool,

    #[serde(default)]
    pub show_ratio: bool,

    #[serde(default)]
    pub show_errors: bool,

    #[serde(default)]
    pub fit_ratio: bool,

    /// `polN`, `expo`, `powerlaw` or a formula in `x` and `[k]`
    #[serde(default = "default_fit_function")]
    pub fit_function: String,

    /// printf-style template receiving the fitted parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fit_legend: Option<String>,

    #[serde(default = "default_fit_legend_position")]
    pub fit_legend_position: [f64; 2],

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis_range: Option<[f64; 2]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_range: Option<[f64; 2]>,

    /// Number of adjacent bins merged after scaling
    #[serde(default = "default_rebin")]
    pub rebin: usize,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_label: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend_position: Option<Position>,

    /// Ratio display range; overrides the global one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratio_range: Option<[f64; 2]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sideband: Option<SidebandConfig>,
}

impl Plot {
    /// A plot with every option at its default
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exclude: None,
            x_axis: String::new(),
            y_axis: default_y_axis(),
            normalized: false,
            log_y: false,
            show_ratio: false,
            show_errors: false,
            fit_ratio: false,
            fit_function: default_fit_function(),
            fit_legend: None,
            fit_legend_position: default_fit_legend_position(),
            x_axis_range: None,
            y_axis_range: None,
            rebin: default_rebin(),
            labels: Vec::new(),
            extra_label: None,
            legend_position: None,
            ratio_range: None,
            sideband: None,
        }
    }

    /// Copy of this request bound to one concrete object name
    pub fn clone_named(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Whether `object` is selected by `name` and not by `exclude`
    ///
    /// Matching is case-insensitive shell globbing (`*`, `?`, `[...]`).
    pub fn matches(&self, object: &str) -> bool {
        if !glob_matches(&self.name, object) {
            return false;
        }
        match &self.exclude {
            Some(exclude) if !exclude.is_empty() => !glob_matches(exclude, object),
            _ => true,
        }
    }

    /// Plot labels followed by global labels whose text is not already used
    pub fn merged_labels(&self, global: &[Label]) -> Vec<Label> {
        let mut labels = self.labels.clone();
        for label in global {
            if !self.labels.iter().any(|l| l.text == label.text) {
                labels.push(label.clone());
            }
        }
        labels
    }
}

/// Translate a shell glob into an anchored regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() * 2 + 2);
    re.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for inner in chars.by_ref() {
                    if inner == ']' {
                        closed = true;
                        break;
                    }
                    if inner == '\\' || inner == '[' {
                        class.push('\\');
                    }
                    class.push(inner);
                }
                if closed {
                    re.push('[');
                    re.push_str(&class);
                    re.push(']');
                } else {
                    re.push_str(&regex::escape("["));
                    re.push_str(&regex::escape(class.trim_start_matches('^')));
                }
            }
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    RegexBuilder::new(&re).case_insensitive(true).build()
}

/// Case-insensitive glob match; a malformed pattern only matches itself
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    match glob_to_regex(pattern) {
        Ok(re) => re.is_match(name),
        Err(_) => pattern.eq_ignore_ascii_case(name),
    }
}

/// Whether a plot name contains glob metacharacters
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}
