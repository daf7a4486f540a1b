//! Sideband extrapolation of a data-driven background
//!
//! The excess `data - background` is fitted in a control range with a
//! two-parameter falling model, then extrapolated over the whole histogram.

use serde::Serialize;

use crate::core::error::CoreError;
use crate::core::fit::{fit_histogram, FitOptions, FitResult};
use crate::core::formula::FitModel;
use crate::core::histogram::Histogram;
use crate::entities::plot::{SidebandConfig, SidebandModel};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SidebandYield {
    pub nominal: f64,
    pub up: f64,
    pub down: f64,
}

/// Extrapolated estimate with its one-sigma envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidebandEstimate {
    pub label: String,
    pub fit: FitResult,
    /// Model at each bin center; errors are zero
    pub nominal: Histogram,
    pub up: Histogram,
    pub down: Histogram,
    #[serde(rename = "yield")]
    pub yields: SidebandYield,
}

impl SidebandModel {
    pub fn fit_model(&self) -> FitModel {
        match self {
            SidebandModel::Powerlaw => FitModel::PowerLaw,
            SidebandModel::Expo => FitModel::Exponential,
        }
    }
}

fn fit_options(config: &SidebandConfig) -> FitOptions {
    let fixed = match (config.model, config.fix_slope) {
        (SidebandModel::Expo, Some(slope)) => vec![None, Some(slope)],
        (SidebandModel::Powerlaw, Some(_)) => {
            log::warn!("fix-slope only applies to the expo sideband model, ignoring it");
            Vec::new()
        }
        _ => Vec::new(),
    };
    FitOptions {
        fixed,
        range: Some((config.fit_range[0], config.fit_range[1])),
        ..FitOptions::default()
    }
}

/// Fit `data - background` and extrapolate it
pub fn estimate(
    config: &SidebandConfig,
    data: &Histogram,
    background: &Histogram,
) -> Result<SidebandEstimate, CoreError> {
    let mut excess = data.clone_named("sideband_excess");
    excess
        .add_scaled(background, -1.0)
        .map_err(|error| CoreError::BinningMismatch {
            source_name: background.name.clone(),
            error,
        })?;

    let model = config.model.fit_model();
    let fit = fit_histogram(&excess, &model, &fit_options(config)).map_err(CoreError::SidebandFit)?;
    log::debug!(
        "Sideband fit ({}): parameters {:?}, chi2/ndf = {:.3}/{}",
        model,
        fit.parameters,
        fit.chi2,
        fit.ndf
    );

    let mut nominal = data.empty_like(config.label.clone());
    let mut up = data.empty_like(format!("{}_up", config.label));
    let mut down = data.empty_like(format!("{}_down", config.label));
    let first = (0..data.n_bins()).find(|&i| data.bin_content(i) > 0.0);
    if let Some(first) = first {
        for i in first..data.n_bins() {
            let x = data.bin_center(i);
            let value = fit.eval(&model, x);
            let error = fit.uncertainty(&model, x);
            nominal.set_bin_content(i, value);
            up.set_bin_content(i, value + error);
            down.set_bin_content(i, value - error);
        }
    }

    let from = integration_start(&nominal, config.integrate_from);
    let last = nominal.n_bins().saturating_sub(1);
    let integrate = |h: &Histogram| match from {
        Some(first) => h.integral_range(first, last),
        None => 0.0,
    };
    let yields = SidebandYield {
        nominal: integrate(&nominal),
        up: integrate(&up),
        down: integrate(&down),
    };
    log::info!(
        "{} = {:.3} +{:.3} -{:.3}",
        config.label,
        yields.nominal,
        (yields.up - yields.nominal).abs(),
        (yields.nominal - yields.down).abs()
    );

    Ok(SidebandEstimate {
        label: config.label.clone(),
        fit,
        nominal,
        up,
        down,
        yields,
    })
}

/// Bin containing `x`; values below the axis start at the first bin
fn integration_start(h: &Histogram, x: f64) -> Option<usize> {
    if x < h.x_min() {
        return (h.n_bins() > 0).then_some(0);
    }
    h.find_bin(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model: SidebandModel) -> SidebandConfig {
        SidebandConfig {
            model,
            fit_range: [0.0, 10.0],
            integrate_from: 5.0,
            fix_slope: None,
            label: "QCD".to_string(),
        }
    }

    fn falling(n: usize, f: impl Fn(f64) -> f64) -> Histogram {
        let h = Histogram::uniform("data", n, 0.0, n as f64);
        let content: Vec<f64> = (0..n).map(|i| f(h.bin_center(i))).collect();
        let errors: Vec<f64> = content.iter().map(|c| 0.05 * c.abs().max(1e-3)).collect();
        h.with_content(content).unwrap().with_errors(errors).unwrap()
    }

    #[test]
    fn test_expo_recovers_excess() {
        let data = falling(10, |x| (3.0 - 0.5 * x).exp() + 1.0);
        let background = Histogram::uniform("mc", 10, 0.0, 10.0)
            .with_content(vec![1.0; 10])
            .unwrap()
            .with_errors(vec![0.0; 10])
            .unwrap();
        let est = estimate(&config(SidebandModel::Expo), &data, &background).unwrap();
        assert!((est.fit.parameters[0] - 3.0).abs() < 1e-4);
        assert!((est.fit.parameters[1] + 0.5).abs() < 1e-4);

        let expected: f64 = (5..10).map(|i| (3.0 - 0.5 * (i as f64 + 0.5)).exp()).sum();
        assert!((est.yields.nominal - expected).abs() < 1e-3);
        assert!(est.yields.up >= est.yields.nominal);
        assert!(est.yields.down <= est.yields.nominal);
        assert_eq!(est.nominal.name, "QCD");
        assert_eq!(est.nominal.bin_error(3), 0.0);
    }

    #[test]
    fn test_fixed_slope() {
        let data = falling(10, |x| (2.0 - 0.3 * x).exp());
        let background = data.empty_like("mc");
        let mut cfg = config(SidebandModel::Expo);
        cfg.fix_slope = Some(-0.3);
        let est = estimate(&cfg, &data, &background).unwrap();
        assert_eq!(est.fit.parameters[1], -0.3);
        assert!((est.fit.parameters[0] - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_starts_at_first_filled_data_bin() {
        let mut data = falling(10, |x| 100.0 * x.powf(-2.0));
        data.set_bin_content(0, 0.0);
        data.set_bin_error(0, 0.0);
        data.set_bin_content(1, 0.0);
        data.set_bin_error(1, 0.0);
        let background = data.empty_like("mc");
        let est = estimate(&config(SidebandModel::Powerlaw), &data, &background).unwrap();
        assert_eq!(est.nominal.bin_content(0), 0.0);
        assert_eq!(est.nominal.bin_content(1), 0.0);
        assert!(est.nominal.bin_content(2) > 0.0);
        assert!((est.fit.parameters[1] + 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_binning_mismatch_is_an_error() {
        let data = falling(10, |x| 10.0 - x);
        let background = Histogram::uniform("mc", 5, 0.0, 10.0);
        let result = estimate(&config(SidebandModel::Expo), &data, &background);
        assert!(matches!(result, Err(CoreError::BinningMismatch { .. })));
    }
}
