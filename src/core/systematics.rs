//! Systematic uncertainty propagation
//!
//! Luminosity and per-variant fractional errors are combined bin by bin in
//! quadrature into a systematic-only band, which is then combined with the
//! statistical errors of the summed background.

use serde::Serialize;

use crate::core::error::CoreError;
use crate::core::histogram::Histogram;
use crate::entities::source::{Source, SourceKind, Summary};

/// The three views of the summed background
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackgroundBands {
    /// Statistical errors only
    pub stat_only: Histogram,
    /// Systematic errors only
    pub syst_only: Histogram,
    /// Statistical and systematic errors combined
    pub stat_syst: Histogram,
}

/// Root-sum-of-squares of two independent errors
pub fn quadrature(a: f64, b: f64) -> f64 {
    (a * a + b * b).sqrt()
}

/// Propagate luminosity and variant errors on top of `stat_only`
///
/// `luminosity_error` is a fraction. Every active variant of every simulated
/// source contributes `nominal * fraction` per bin; bins where the background
/// is empty get no variant contribution. Each variant's summary receives the
/// nominal yield and the linear sum of its absolute errors.
pub fn propagate(
    stat_only: &Histogram,
    luminosity_error: f64,
    sources: &mut [Source],
) -> Result<BackgroundBands, CoreError> {
    let bins = stat_only.n_bins();
    let mut syst_error = vec![0.0; bins];

    if luminosity_error > 0.0 {
        for (i, err) in syst_error.iter_mut().enumerate() {
            *err = quadrature(*err, stat_only.bin_content(i) * luminosity_error);
        }
    }

    for source in sources.iter_mut().filter(|s| s.kind == SourceKind::Mc) {
        let source_name = source.name();
        let Some(nominal) = source.histogram.as_ref() else {
            continue;
        };
        let yield_ = source.summary.n_events;

        for variant in source.systematics.iter_mut() {
            let Some(h) = variant.histogram.as_ref() else {
                continue;
            };
            let mismatch = |error| CoreError::VariantBinningMismatch {
                source_name: source_name.clone(),
                variant: variant.name(),
                error,
            };
            h.check_binning(nominal).map_err(mismatch)?;
            stat_only.check_binning(nominal).map_err(|error| CoreError::BinningMismatch {
                source_name: source_name.clone(),
                error,
            })?;

            let mut total = 0.0;
            let mut skipped = 0;
            for (i, err) in syst_error.iter_mut().enumerate() {
                if stat_only.bin_content(i) == 0.0 {
                    skipped += 1;
                    continue;
                }
                let absolute = nominal.bin_content(i) * variant.fraction(i);
                total += absolute;
                *err = quadrature(*err, absolute);
            }
            if skipped > 0 {
                log::debug!(
                    "Systematic '{}': {} empty background bins skipped",
                    variant.name(),
                    skipped
                );
            }

            variant.summary = Some(Summary {
                n_events: yield_,
                n_events_error: total,
                ..Summary::default()
            });
        }
    }

    let mut syst_only = stat_only.clone_named("mc_syst_only");
    let mut stat_syst = stat_only.clone_named("mc_stat_syst");
    for (i, err) in syst_error.iter().enumerate() {
        syst_only.set_bin_error(i, *err);
        stat_syst.set_bin_error(i, quadrature(*err, stat_only.bin_error(i)));
    }

    Ok(BackgroundBands {
        stat_only: stat_only.clone(),
        syst_only,
        stat_syst,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::source::{FractionFrom, SystematicVariant};

    fn hist(name: &str, content: Vec<f64>) -> Histogram {
        let n = content.len();
        Histogram::uniform(name, n, 0.0, n as f64)
            .with_content(content)
            .unwrap()
    }

    fn variant(path: &str, fractions: Vec<f64>) -> SystematicVariant {
        let n = fractions.len();
        let mut v = SystematicVariant::new(path);
        v.histogram = Some(
            Histogram::uniform("v", n, 0.0, n as f64)
                .with_content(vec![1.0; n])
                .unwrap()
                .with_errors(fractions)
                .unwrap(),
        );
        v
    }

    fn mc(name: &str, content: Vec<f64>) -> Source {
        let mut s = Source::new(format!("{name}.yaml"), SourceKind::Mc);
        s.histogram = Some(hist(name, content));
        s
    }

    #[test]
    fn test_quadrature_is_exact() {
        assert_eq!(quadrature(3.0, 4.0), 5.0);
        assert_eq!(quadrature(0.0, 2.5), 2.5);
    }

    #[test]
    fn test_quadrature_is_order_independent() {
        let errors = [0.3, 1.7, 2.2, 0.01];
        let forward = errors.iter().fold(0.0, |acc, e| quadrature(acc, *e));
        let backward = errors.iter().rev().fold(0.0, |acc, e| quadrature(acc, *e));
        assert!((forward - backward).abs() < 1e-12);
    }

    #[test]
    fn test_luminosity_only() {
        let stat = hist("stat", vec![100.0, 0.0]);
        let bands = propagate(&stat, 0.1, &mut []).unwrap();
        assert!((bands.syst_only.bin_error(0) - 10.0).abs() < 1e-12);
        assert_eq!(bands.syst_only.bin_error(1), 0.0);
        assert!((bands.stat_syst.bin_error(0) - quadrature(10.0, 10.0)).abs() < 1e-12);
        assert_eq!(bands.stat_syst.content(), stat.content());
    }

    #[test]
    fn test_variants_add_in_quadrature_and_sum_linearly() {
        let mut a = mc("a", vec![10.0, 20.0]);
        a.summary.n_events = 30.0;
        a.systematics.push(variant("a_jec.yaml", vec![0.1, 0.05]));
        let mut b = mc("b", vec![30.0, 0.0]);
        b.systematics.push(variant("b_jec.yaml", vec![0.2, 0.5]));

        let stat = hist("stat", vec![40.0, 20.0]);
        let mut sources = vec![a, b];
        let bands = propagate(&stat, 0.0, &mut sources).unwrap();

        assert!((bands.syst_only.bin_error(0) - quadrature(1.0, 6.0)).abs() < 1e-12);
        assert!((bands.syst_only.bin_error(1) - 1.0).abs() < 1e-12);

        let summary = sources[0].systematics[0].summary.unwrap();
        assert_eq!(summary.n_events, 30.0);
        assert!((summary.n_events_error - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_background_bins_are_skipped() {
        let mut a = mc("a", vec![5.0, 5.0]);
        a.systematics.push(variant("a_jec.yaml", vec![0.5, 0.5]));
        let stat = hist("stat", vec![5.0, 0.0]);
        let mut sources = vec![a];
        let bands = propagate(&stat, 0.0, &mut sources).unwrap();
        assert_eq!(bands.syst_only.bin_error(1), 0.0);
        let summary = sources[0].systematics[0].summary.unwrap();
        assert!((summary.n_events_error - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_fraction_from_content() {
        let mut a = mc("a", vec![10.0]);
        let mut v = SystematicVariant::new("a_pu.yaml");
        v.fraction_from = FractionFrom::Content;
        v.histogram = Some(hist("v", vec![0.3]));
        a.systematics.push(v);
        let stat = hist("stat", vec![10.0]);
        let bands = propagate(&stat, 0.0, &mut [a]).unwrap();
        assert!((bands.syst_only.bin_error(0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_variant_binning_mismatch_is_fatal() {
        let mut a = mc("a", vec![1.0, 2.0]);
        a.systematics.push(variant("a_jec.yaml", vec![0.1, 0.1, 0.1]));
        let stat = hist("stat", vec![1.0, 2.0]);
        let err = propagate(&stat, 0.0, &mut [a]).unwrap_err();
        assert!(matches!(err, CoreError::VariantBinningMismatch { .. }));
    }

    #[test]
    fn test_inactive_variants_and_signals_are_ignored() {
        let mut a = mc("a", vec![10.0]);
        a.systematics.push(SystematicVariant::new("missing.yaml"));
        let mut s = Source::new("sig.yaml", SourceKind::Signal);
        s.histogram = Some(hist("sig", vec![10.0]));
        s.systematics.push(variant("sig_jec.yaml", vec![0.5]));
        let stat = hist("stat", vec![10.0]);
        let mut sources = vec![a, s];
        let bands = propagate(&stat, 0.0, &mut sources).unwrap();
        assert_eq!(bands.syst_only.bin_error(0), 0.0);
        assert!(sources[0].systematics[0].summary.is_none());
        assert!(sources[1].systematics[0].summary.is_none());
    }
}
