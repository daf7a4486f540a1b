//! Sample classification and normalization
//!
//! Simulated samples are scaled to the integrated luminosity:
//! `factor = scale * luminosity * source.scale * cross_section * branching_ratio / generated_events`.
//! Data is only summarized.

use crate::core::error::CoreError;
use crate::entities::configuration::Configuration;
use crate::entities::source::{Source, SourceKind, Summary};

/// Global normalization inputs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub luminosity: f64,
    pub scale: f64,
    /// Treat every per-source scale as 1
    pub ignore_scales: bool,
}

impl Normalization {
    pub fn new(luminosity: f64) -> Self {
        Self {
            luminosity,
            scale: 1.0,
            ignore_scales: false,
        }
    }

    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            luminosity: config.luminosity,
            scale: config.scale,
            ignore_scales: config.ignore_scales,
        }
    }

    fn source_scale(&self, source: &Source) -> f64 {
        if self.ignore_scales {
            1.0
        } else {
            source.scale
        }
    }
}

/// Simulated sources need a positive number of generated events
pub fn validate(source: &Source) -> Result<(), CoreError> {
    if source.kind != SourceKind::Data && !(source.generated_events > 0.0) {
        return Err(CoreError::InvalidGeneratedEvents {
            source_name: source.name(),
            kind: source.kind,
            generated_events: source.generated_events,
        });
    }
    Ok(())
}

/// Multiplicative factor turning raw entries into expected events
pub fn scale_factor(source: &Source, norm: &Normalization) -> f64 {
    norm.scale
        * norm.luminosity
        * norm.source_scale(source)
        * source.cross_section
        * source.branching_ratio
        / source.generated_events
}

/// Yield summary of a source whose raw histogram integrates to `integral`
pub fn summarize(integral: f64, source: &Source, norm: &Normalization) -> Summary {
    if source.kind == SourceKind::Data {
        return Summary {
            n_events: integral,
            ..Summary::default()
        };
    }

    let efficiency = integral / source.generated_events;
    let efficiency_error = (efficiency * (1.0 - efficiency) / source.generated_events).sqrt();
    Summary {
        n_events: integral * scale_factor(source, norm),
        n_events_error: norm.scale
            * norm.luminosity
            * source.cross_section
            * source.branching_ratio
            * efficiency_error,
        efficiency,
        efficiency_error,
    }
}

/// Scale the loaded histogram of `source` in place and fill its summary
///
/// Sources without a loaded histogram are left untouched.
pub fn scale_source(source: &mut Source, norm: &Normalization) -> Result<(), CoreError> {
    validate(source)?;
    let Some(integral) = source.histogram.as_ref().map(|h| h.integral()) else {
        log::debug!("'{}' has no histogram to scale", source.name());
        return Ok(());
    };

    let summary = summarize(integral, source, norm);
    if summary.efficiency_exceeds_one() {
        log::warn!(
            "Efficiency of '{}' is {:.5} (more selected than generated events)",
            source.name(),
            summary.efficiency
        );
    }

    if source.kind != SourceKind::Data {
        let factor = scale_factor(source, norm);
        if let Some(h) = source.histogram.as_mut() {
            h.scale(factor);
        }
    }
    source.summary = summary;
    Ok(())
}

/// Merge `factor` adjacent bins in the nominal and every variant histogram
pub fn rebin_source(source: &mut Source, factor: usize) -> Result<(), CoreError> {
    if factor == 1 {
        return Ok(());
    }
    let histograms = source
        .histogram
        .iter_mut()
        .chain(source.systematics.iter_mut().filter_map(|v| v.histogram.as_mut()));
    for h in histograms {
        h.rebin(factor).map_err(|error| CoreError::InvalidRebin {
            object: h.name.clone(),
            factor,
            error,
        })?;
    }
    Ok(())
}
