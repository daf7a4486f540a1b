//! Global configuration block

use serde::{Deserialize, Serialize};

use crate::entities::style::{Color, Label};

fn default_scale() -> f64 {
    1.0
}

fn default_root() -> String {
    ".".to_string()
}

fn default_ratio_range() -> [f64; 2] {
    [0.0, 2.0]
}

fn default_experiment() -> String {
    "CMS".to_string()
}

fn default_size() -> f64 {
    800.0
}

fn default_error_fill_color() -> Color {
    Color::Index(42)
}

fn default_fit_line_color() -> Color {
    Color::Index(46)
}

/// The `configuration` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    /// Integrated luminosity, in the same inverse unit as the cross-sections
    pub luminosity: f64,

    /// Relative luminosity uncertainty
    #[serde(default)]
    pub luminosity_error: f64,

    /// Global scale applied to every simulated sample
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Directory prefix for relative input paths
    #[serde(default = "default_root")]
    pub root: String,

    /// Ratio panel display range
    #[serde(default = "default_ratio_range")]
    pub ratio_range: [f64; 2],

    #[serde(default = "default_size")]
    pub width: f64,

    #[serde(default = "default_size")]
    pub height: f64,

    #[serde(default = "default_experiment")]
    pub experiment: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_label: Option<String>,

    /// `%lumi%` is replaced by the luminosity in inverse femtobarns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub luminosity_label: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,

    #[serde(default = "default_error_fill_color")]
    pub error_fill_color: Color,

    #[serde(default = "default_fit_line_color")]
    pub ratio_fit_line_color: Color,

    #[serde(default = "default_error_fill_color")]
    pub ratio_fit_error_fill_color: Color,

    /// Treat every per-source `scale` as 1 (set from the command line)
    #[serde(skip)]
    pub ignore_scales: bool,
}

impl Configuration {
    pub fn new(luminosity: f64) -> Self {
        Self {
            luminosity,
            luminosity_error: 0.0,
            scale: default_scale(),
            root: default_root(),
            ratio_range: default_ratio_range(),
            width: default_size(),
            height: default_size(),
            experiment: default_experiment(),
            extra_label: None,
            luminosity_label: None,
            labels: Vec::new(),
            error_fill_color: default_error_fill_color(),
            ratio_fit_line_color: default_fit_line_color(),
            ratio_fit_error_fill_color: default_error_fill_color(),
            ignore_scales: false,
        }
    }

    /// Luminosity label with `%lumi%` expanded
    pub fn luminosity_label_text(&self) -> Option<String> {
        self.luminosity_label.as_ref().map(|label| {
            label.replace("%lumi%", &format!("{:.2}", self.luminosity / 1000.0))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luminosity_is_required() {
        let result: Result<Configuration, _> = serde_yml::from_str("scale: 2");
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let config: Configuration = serde_yml::from_str("luminosity: 19700").unwrap();
        assert_eq!(config.luminosity, 19700.0);
        assert_eq!(config.luminosity_error, 0.0);
        assert_eq!(config.scale, 1.0);
        assert_eq!(config.ratio_range, [0.0, 2.0]);
        assert_eq!(config.experiment, "CMS");
        assert_eq!(config.error_fill_color, Color::Index(42));
        assert!(!config.ignore_scales);
    }

    #[test]
    fn test_luminosity_label() {
        let mut config = Configuration::new(19700.0);
        config.luminosity_label = Some("%lumi% fb^{-1} (8 TeV)".to_string());
        assert_eq!(
            config.luminosity_label_text().as_deref(),
            Some("19.70 fb^{-1} (8 TeV)")
        );
    }
}
