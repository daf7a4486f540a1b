//! Data / background ratio panel
//!
//! The ratio is computed from the combined data and the stat-only background.
//! A companion band shows the fractional systematic uncertainty around 1, and
//! an optional fit adds a function with its confidence band.

use regex::{Captures, Regex};
use serde::Serialize;

use crate::core::error::CoreError;
use crate::core::fit::{fit_histogram, FitOptions, FitResult};
use crate::core::formula::FitModel;
use crate::core::histogram::Histogram;
use crate::core::systematics::BackgroundBands;

/// Number of points in the fit confidence band
pub const FIT_BAND_POINTS: usize = 100;

/// Confidence level of the fit band
pub const FIT_BAND_CL: f64 = 0.68;

/// Fit of the ratio
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioFit {
    pub result: FitResult,
    /// Fitted function with its confidence interval as errors
    pub band: Histogram,
    /// Legend text with the fitted parameters substituted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend: Option<String>,
}

/// Bottom panel of a plot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioPanel {
    /// Bin-wise data / background
    pub ratio: Histogram,
    /// Content 1 and the fractional systematic error where defined
    pub systematic_band: Histogram,
    /// Y range the panel is drawn with; contents are never clamped
    pub display_range: [f64; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<RatioFit>,
    /// Why the requested fit failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit_error: Option<String>,
}

/// Fractional systematic band centered on 1
///
/// For bins with a non-zero background, `f = c / (e + c)` and the band error
/// is `1 - f`. Other bins stay empty.
pub fn systematic_band(template: &Histogram, syst_only: &Histogram) -> Histogram {
    let mut band = template.empty_like("ratio_systematics");
    for i in 0..band.n_bins().min(syst_only.n_bins()) {
        let content = syst_only.bin_content(i);
        if content == 0.0 {
            continue;
        }
        let fraction = content / (syst_only.bin_error(i) + content);
        band.set_bin_content(i, 1.0);
        band.set_bin_error(i, 1.0 - fraction);
    }
    band
}

/// Build the ratio panel from combined data and the background bands
pub fn compute_ratio(
    data: &Histogram,
    bands: &BackgroundBands,
    display_range: [f64; 2],
) -> Result<RatioPanel, CoreError> {
    let mut ratio = data
        .divide(&bands.stat_only)
        .map_err(|error| CoreError::BinningMismatch {
            source_name: data.name.clone(),
            error,
        })?;
    ratio.name = "ratio".to_string();
    ratio.set_display_range(Some(display_range[0]), Some(display_range[1]));

    let systematic_band = systematic_band(&ratio, &bands.syst_only);
    Ok(RatioPanel {
        ratio,
        systematic_band,
        display_range,
        fit: None,
        fit_error: None,
    })
}

/// Fit `model` to the ratio over its full x range
///
/// A failed fit is recorded on the panel and logged; the ratio stays usable.
pub fn fit_ratio(panel: &mut RatioPanel, model: &FitModel, legend_template: Option<&str>) {
    match fit_histogram(&panel.ratio, model, &FitOptions::default()) {
        Ok(result) => {
            let band = result.confidence_band(
                model,
                FIT_BAND_POINTS,
                panel.ratio.x_min(),
                panel.ratio.x_max(),
                FIT_BAND_CL,
            );
            let legend = legend_template
                .filter(|t| !t.is_empty())
                .map(|t| format_fit_legend(t, &result.parameters));
            panel.fit = Some(RatioFit {
                result,
                band,
                legend,
            });
            panel.fit_error = None;
        }
        Err(e) => {
            log::warn!("Fit of the ratio with '{}' failed: {}", model, e);
            panel.fit = None;
            panel.fit_error = Some(e.to_string());
        }
    }
}

const PRINTF_SPEC: &str = r"%%|%([-+ 0#]*)(\d+)?(?:\.(\d+))?([feEgG])";

/// Substitute fitted parameters into a printf-style template
///
/// Each float conversion (`%f`, `%.3f`, `%e`, `%g`, ...) takes the next
/// parameter; conversions left without a parameter render empty. `%%` is a
/// literal percent sign.
pub fn format_fit_legend(template: &str, parameters: &[f64]) -> String {
    let Ok(re) = Regex::new(PRINTF_SPEC) else {
        return template.to_string();
    };
    let mut next = parameters.iter();
    re.replace_all(template, |caps: &Captures| {
        if &caps[0] == "%%" {
            return "%".to_string();
        }
        let Some(value) = next.next() else {
            return String::new();
        };
        let flags = caps.get(1).map_or("", |m| m.as_str());
        let width = caps.get(2).and_then(|m| m.as_str().parse().ok());
        let precision = caps.get(3).and_then(|m| m.as_str().parse().ok());
        let conversion = caps[4].chars().next().unwrap_or('f');
        format_float(*value, flags, width, precision, conversion)
    })
    .into_owned()
}

fn format_float(
    value: f64,
    flags: &str,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
) -> String {
    let precision_or_default = precision.unwrap_or(6);
    let mut body = match conversion {
        'e' | 'E' => exponential(value, precision_or_default),
        'g' | 'G' => general(value, precision_or_default, flags.contains('#')),
        _ => format!("{:.*}", precision_or_default, value),
    };
    if conversion.is_ascii_uppercase() {
        body = body.to_uppercase();
    }
    if !body.starts_with('-') {
        if flags.contains('+') {
            body.insert(0, '+');
        } else if flags.contains(' ') {
            body.insert(0, ' ');
        }
    }

    let Some(width) = width.filter(|w| *w > body.len()) else {
        return body;
    };
    let padding = width - body.len();
    if flags.contains('-') {
        format!("{}{}", body, " ".repeat(padding))
    } else if flags.contains('0') && value.is_finite() {
        let sign_len = usize::from(body.starts_with(['-', '+', ' ']));
        let (sign, digits) = body.split_at(sign_len);
        format!("{}{}{}", sign, "0".repeat(padding), digits)
    } else {
        format!("{}{}", " ".repeat(padding), body)
    }
}

/// C-style `%e`: mantissa, `e`, sign and at least two exponent digits
fn exponential(value: f64, precision: usize) -> String {
    let formatted = format!("{:.*e}", precision, value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => formatted,
    }
}

/// C-style `%g`: shortest of `%e` / `%f` at `precision` significant digits
fn general(value: f64, precision: usize, keep_zeros: bool) -> String {
    if value == 0.0 || !value.is_finite() {
        return if value == 0.0 {
            "0".to_string()
        } else {
            format!("{}", value)
        };
    }
    let precision = precision.max(1);
    let exponent = value.abs().log10().floor() as i32;
    let text = if exponent < -4 || exponent >= precision as i32 {
        exponential(value, precision - 1)
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        format!("{:.*}", decimals, value)
    };
    if keep_zeros {
        return text;
    }
    strip_trailing_zeros(&text)
}

fn strip_trailing_zeros(text: &str) -> String {
    let (number, exponent) = match text.find('e') {
        Some(at) => text.split_at(at),
        None => (text, ""),
    };
    let number = if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    };
    format!("{}{}", number, exponent)
}
