//! End-to-end processing of in-memory analyses

use plotit::core::context::RenderContext;
use plotit::core::error::CoreError;
use plotit::core::histogram::Histogram;
use plotit::core::pipeline::{
    process_plot, PlotOutcome, NOTE_NO_BACKGROUND, NOTE_NO_RATIO, UNCERTAINTIES_LEGEND,
};
use plotit::entities::{
    Analysis, Configuration, Group, Plot, SidebandConfig, SidebandModel, Source, SourceKind,
    SystematicVariant,
};
use plotit::io::store::MemoryStore;

// ============================================================================
// Fixtures
// ============================================================================

fn hist(content: Vec<f64>) -> Histogram {
    let n = content.len();
    Histogram::uniform("mjj", n, 0.0, n as f64)
        .with_content(content)
        .unwrap()
}

fn mc(path: &str, generated_events: f64) -> Source {
    Source::new(path, SourceKind::Mc).with_normalization(1.0, 1.0, generated_events)
}

/// MC [10, 20] / 100 and [5, 5] / 50 at L = 10, data [20, 30]
fn reference() -> (Analysis, MemoryStore) {
    let mut analysis = Analysis::new(Configuration::new(10.0));
    analysis.sources = vec![
        Source::new("data.yaml", SourceKind::Data),
        mc("ttbar.yaml", 100.0),
        mc("dy.yaml", 50.0),
    ];
    let store = MemoryStore::new()
        .with("data.yaml", hist(vec![20.0, 30.0]))
        .with("ttbar.yaml", hist(vec![10.0, 20.0]))
        .with("dy.yaml", hist(vec![5.0, 5.0]));
    (analysis, store)
}

fn ratio_plot() -> Plot {
    let mut plot = Plot::new("mjj");
    plot.show_ratio = true;
    plot.show_errors = true;
    plot
}

fn process(analysis: &mut Analysis, store: &mut MemoryStore, plot: &Plot) -> PlotOutcome {
    process_plot(analysis, plot, store, &mut RenderContext::new()).unwrap()
}

// ============================================================================
// Scaling and aggregation
// ============================================================================

#[test]
fn test_end_to_end_reference_values() {
    let (mut analysis, mut store) = reference();
    let outcome = process(&mut analysis, &mut store, &ratio_plot());

    let bands = outcome.bands.as_ref().unwrap();
    assert_eq!(bands.stat_only.content(), &[2.0, 3.0]);
    let ratio = outcome.ratio.as_ref().unwrap();
    assert_eq!(ratio.ratio.content(), &[10.0, 10.0]);
    assert_eq!(outcome.data.as_ref().unwrap().content(), &[20.0, 30.0]);
    assert_eq!(ratio.display_range, [0.0, 2.0]);
}

#[test]
fn test_scaling_reference_yield() {
    let mut analysis = Analysis::new(Configuration::new(500.0));
    analysis.sources = vec![Source::new("sig.yaml", SourceKind::Signal).with_normalization(
        2.0, 1.0, 1000.0,
    )];
    let mut store = MemoryStore::new().with("sig.yaml", hist(vec![40.0, 60.0]));
    let outcome = process(&mut analysis, &mut store, &Plot::new("mjj"));

    let signal = outcome.summary.sections[0].clone();
    assert_eq!(signal.kind, SourceKind::Signal);
    assert!((signal.rows[0].n_events - 100.0).abs() < 1e-9);
    assert!((signal.rows[0].efficiency - 0.1).abs() < 1e-12);
    assert!(signal.rows[0].efficiency_error >= 0.0);
    assert_eq!(outcome.signals[0].histogram.integral(), 100.0);
}

#[test]
fn test_background_sum_is_additive() {
    let (mut analysis, mut store) = reference();
    let outcome = process(&mut analysis, &mut store, &ratio_plot());

    let stack = outcome.stack.as_ref().unwrap();
    let total = stack.total().unwrap();
    assert_eq!(total.content(), outcome.bands.as_ref().unwrap().stat_only.content());
    assert_eq!(stack.layers.len(), 2);
}

#[test]
fn test_groups_merge_into_one_layer() {
    let (mut analysis, mut store) = reference();
    let mut top = Group::new("top");
    top.legend = Some("Top".into());
    analysis.groups = vec![top];
    analysis.sources[1].group = Some("top".into());
    analysis.sources[2].group = Some("top".into());

    let outcome = process(&mut analysis, &mut store, &ratio_plot());
    let stack = outcome.stack.as_ref().unwrap();
    assert_eq!(stack.layers.len(), 1);
    assert_eq!(stack.layers[0].label, "Top");
    assert_eq!(stack.layers[0].sources, vec!["ttbar", "dy"]);
    assert_eq!(stack.layers[0].histogram.content(), &[2.0, 3.0]);

    let labels: Vec<&str> = outcome.legend.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["Top", UNCERTAINTIES_LEGEND]);
}

#[test]
fn test_rebin_applies_to_every_source() {
    let mut analysis = Analysis::new(Configuration::new(1.0));
    analysis.sources = vec![
        Source::new("data.yaml", SourceKind::Data),
        mc("mc.yaml", 1.0),
    ];
    let mut store = MemoryStore::new()
        .with("data.yaml", hist(vec![1.0, 2.0, 3.0, 4.0]))
        .with("mc.yaml", hist(vec![1.0, 1.0, 1.0, 1.0]));
    let mut plot = ratio_plot();
    plot.rebin = 2;
    let outcome = process(&mut analysis, &mut store, &plot);
    assert_eq!(outcome.edges, vec![0.0, 2.0, 4.0]);
    assert_eq!(outcome.ratio.unwrap().ratio.content(), &[1.5, 3.5]);
}

#[test]
fn test_invalid_rebin_is_fatal() {
    let (mut analysis, mut store) = reference();
    let mut plot = ratio_plot();
    plot.rebin = 3;
    let err = process_plot(&mut analysis, &plot, &mut store, &mut RenderContext::new())
        .unwrap_err();
    assert!(matches!(err.error, CoreError::InvalidRebin { .. }));
}

#[test]
fn test_zero_generated_events_is_fatal() {
    let (mut analysis, mut store) = reference();
    analysis.sources[1].generated_events = 0.0;
    let err = process_plot(&mut analysis, &ratio_plot(), &mut store, &mut RenderContext::new())
        .unwrap_err();
    assert!(matches!(err.error, CoreError::InvalidGeneratedEvents { .. }));
    assert_eq!(err.plot, "mjj");
}

#[test]
fn test_normalized_plot_has_unit_area() {
    let (mut analysis, mut store) = reference();
    let mut plot = ratio_plot();
    plot.normalized = true;
    let outcome = process(&mut analysis, &mut store, &plot);
    let stat_only = &outcome.bands.as_ref().unwrap().stat_only;
    assert!((stat_only.integral() - 1.0).abs() < 1e-12);
    assert!((outcome.data.as_ref().unwrap().integral() - 1.0).abs() < 1e-12);
}

// ============================================================================
// Systematics, ratio and fit
// ============================================================================

#[test]
fn test_variant_errors_reach_band_and_summary() {
    let mut analysis = Analysis::new(Configuration::new(10.0));
    let mut ttbar = mc("ttbar.yaml", 100.0);
    ttbar.systematics.push(SystematicVariant::new("ttbar_jec.yaml"));
    analysis.sources = vec![Source::new("data.yaml", SourceKind::Data), ttbar];
    let variant = hist(vec![1.0, 1.0]).with_errors(vec![0.1, 0.1]).unwrap();
    let mut store = MemoryStore::new()
        .with("data.yaml", hist(vec![20.0, 30.0]))
        .with("ttbar.yaml", hist(vec![10.0, 20.0]))
        .with("ttbar_jec.yaml", variant);

    let outcome = process(&mut analysis, &mut store, &ratio_plot());
    let bands = outcome.bands.as_ref().unwrap();
    assert!((bands.syst_only.bin_error(0) - 0.1).abs() < 1e-12);
    assert!((bands.syst_only.bin_error(1) - 0.2).abs() < 1e-12);
    let expected = (bands.stat_only.bin_error(1).powi(2) + 0.04).sqrt();
    assert!((bands.stat_syst.bin_error(1) - expected).abs() < 1e-12);

    let mc = outcome.summary.section(SourceKind::Mc).unwrap();
    assert_eq!(mc.systematics.len(), 1);
    assert_eq!(mc.systematics[0].name, "ttbar_jec (ttbar)");
    assert!((mc.systematics[0].n_events_error - 0.3).abs() < 1e-12);

    // band: f = c / (e + c) with c = 1, e = 0.1
    let band = &outcome.ratio.as_ref().unwrap().systematic_band;
    assert_eq!(band.bin_content(0), 1.0);
    assert!((band.bin_error(0) - (1.0 - 1.0 / 1.1)).abs() < 1e-12);
}

#[test]
fn test_missing_systematics_file_becomes_a_note() {
    let (mut analysis, mut store) = reference();
    analysis.sources[1]
        .systematics
        .push(SystematicVariant::new("missing_jec.yaml"));
    let dropped = analysis.drop_missing_systematics(&store);
    assert_eq!(dropped, vec!["missing_jec.yaml".to_string()]);

    let outcome = process(&mut analysis, &mut store, &ratio_plot());
    assert!(outcome
        .notes()
        .iter()
        .any(|n| n == "systematics file 'missing_jec.yaml' not found"));
    let mc = outcome.summary.section(SourceKind::Mc).unwrap();
    assert!(mc.systematics.is_empty());
}

#[test]
fn test_variant_binning_checked_for_zero_weight_background() {
    let mut analysis = Analysis::new(Configuration::new(10.0));
    let mut ttbar = mc("ttbar.yaml", 100.0);
    ttbar.systematics.push(SystematicVariant::new("ttbar_jec.yaml"));
    analysis.sources = vec![Source::new("data.yaml", SourceKind::Data), ttbar];
    let mut store = MemoryStore::new()
        .with("data.yaml", hist(vec![20.0, 30.0]))
        .with("ttbar.yaml", hist(vec![0.0, 0.0]))
        .with("ttbar_jec.yaml", hist(vec![1.0, 1.0, 1.0]));

    let err = process_plot(&mut analysis, &ratio_plot(), &mut store, &mut RenderContext::new())
        .unwrap_err();
    match err.error {
        CoreError::VariantBinningMismatch {
            source_name,
            variant,
            ..
        } => {
            assert_eq!(source_name, "ttbar");
            assert_eq!(variant, "ttbar_jec");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_variant_binning_checked_for_signal() {
    let mut analysis = Analysis::new(Configuration::new(10.0));
    let mut signal =
        Source::new("sig.yaml", SourceKind::Signal).with_normalization(1.0, 1.0, 10.0);
    signal.systematics.push(SystematicVariant::new("sig_jec.yaml"));
    analysis.sources = vec![Source::new("data.yaml", SourceKind::Data), signal];
    let mut store = MemoryStore::new()
        .with("data.yaml", hist(vec![2.0, 3.0]))
        .with("sig.yaml", hist(vec![1.0, 1.0]))
        .with("sig_jec.yaml", hist(vec![1.0, 1.0, 1.0]));

    let err = process_plot(&mut analysis, &ratio_plot(), &mut store, &mut RenderContext::new())
        .unwrap_err();
    assert!(matches!(err.error, CoreError::VariantBinningMismatch { .. }));
}

#[test]
fn test_luminosity_error_in_total() {
    let (mut analysis, mut store) = reference();
    analysis.configuration.luminosity_error = 0.1;
    let outcome = process(&mut analysis, &mut store, &ratio_plot());
    let mc = outcome.summary.section(SourceKind::Mc).unwrap();
    let total = mc.total.unwrap();
    assert_eq!(total.n_events, 5.0);
    let stat2: f64 = mc.rows.iter().map(|r| r.n_events_error.powi(2)).sum();
    assert!((total.n_events_error - (stat2 + 0.25).sqrt()).abs() < 1e-12);
    assert_eq!(mc.systematics[0].name, "luminosity");
}

#[test]
fn test_ratio_zero_guard() {
    let (mut analysis, mut store) = reference();
    store.insert("ttbar.yaml", hist(vec![0.0, 20.0]));
    store.insert("dy.yaml", hist(vec![0.0, 5.0]));
    let outcome = process(&mut analysis, &mut store, &ratio_plot());
    let ratio = &outcome.ratio.as_ref().unwrap().ratio;
    assert_eq!(ratio.bin_content(0), 0.0);
    assert_eq!(ratio.bin_error(0), 0.0);
    assert_eq!(ratio.bin_content(1), 10.0);
}

#[test]
fn test_ratio_fit_with_legend() {
    let (mut analysis, mut store) = reference();
    let mut plot = ratio_plot();
    plot.fit_ratio = true;
    plot.fit_function = "pol0".into();
    plot.fit_legend = Some("p_{0} = %.1f".into());
    plot.ratio_range = Some([0.5, 1.5]);
    let outcome = process(&mut analysis, &mut store, &plot);

    let panel = outcome.ratio.as_ref().unwrap();
    assert_eq!(panel.display_range, [0.5, 1.5]);
    let fit = panel.fit.as_ref().unwrap();
    assert!((fit.result.parameters[0] - 10.0).abs() < 1e-6);
    assert_eq!(fit.result.ndf, 1);
    assert_eq!(fit.legend.as_deref(), Some("p_{0} = 10.0"));
    assert_eq!(fit.band.n_bins(), 100);
}

// ============================================================================
// Degenerate inputs and idempotence
// ============================================================================

#[test]
fn test_no_background() {
    let mut analysis = Analysis::new(Configuration::new(10.0));
    analysis.sources = vec![
        Source::new("data.yaml", SourceKind::Data),
        Source::new("sig.yaml", SourceKind::Signal).with_normalization(1.0, 1.0, 10.0),
    ];
    let mut store = MemoryStore::new()
        .with("data.yaml", hist(vec![2.0, 3.0]))
        .with("sig.yaml", hist(vec![1.0, 1.0]));

    let outcome = process(&mut analysis, &mut store, &ratio_plot());
    assert!(outcome.stack.is_none());
    assert!(outcome.bands.is_none());
    assert!(outcome.ratio.is_none());
    assert!(outcome.notes().iter().any(|n| n == NOTE_NO_BACKGROUND));
    assert!(outcome.notes().iter().any(|n| n == NOTE_NO_RATIO));

    let kinds: Vec<SourceKind> = outcome.summary.sections.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![SourceKind::Data, SourceKind::Signal]);
    assert!(outcome.legend.iter().all(|e| e.label != UNCERTAINTIES_LEGEND));
}

#[test]
fn test_zero_weight_background_counts_as_absent() {
    let (mut analysis, mut store) = reference();
    store.insert("ttbar.yaml", hist(vec![0.0, 0.0]));
    store.insert("dy.yaml", hist(vec![0.0, 0.0]));
    let outcome = process(&mut analysis, &mut store, &ratio_plot());
    assert!(outcome.stack.is_none());
    assert!(outcome.notes().iter().any(|n| n == NOTE_NO_BACKGROUND));
}

#[test]
fn test_processing_twice_is_identical() {
    let (mut analysis, mut store) = reference();
    analysis.configuration.luminosity_error = 0.05;
    let mut ctx = RenderContext::new();
    let plot = ratio_plot();

    let first = process_plot(&mut analysis, &plot, &mut store, &mut ctx).unwrap();
    let second = process_plot(&mut analysis, &plot, &mut store, &mut ctx).unwrap();
    assert_eq!(first.bands, second.bands);
    assert_eq!(first.ratio, second.ratio);
    assert_eq!(first.summary, second.summary);
    assert_eq!(first.legend, second.legend);
    assert_eq!(ctx.plots_finished(), 2);
}

#[test]
fn test_custom_colors_are_allocated_once() {
    let (mut analysis, mut store) = reference();
    analysis.sources[1].legend = Some("ttbar".into());
    analysis.sources[1].fill_color = Some("#ff0000".parse().unwrap());
    analysis.sources[2].legend = Some("dy".into());
    analysis.sources[2].fill_color = Some("#ff0000".parse().unwrap());
    let mut ctx = RenderContext::new();

    let outcome = process_plot(&mut analysis, &ratio_plot(), &mut store, &mut ctx).unwrap();
    assert_eq!(outcome.legend[0].fill_color, Some(1000));
    assert_eq!(outcome.legend[1].fill_color, Some(1000));
    assert_eq!(ctx.palette().len(), 1);
}

// ============================================================================
// Sideband extrapolation
// ============================================================================

#[test]
fn test_sideband_is_stacked_on_the_background() {
    let n = 10;
    let centers: Vec<f64> = (0..n).map(|i| i as f64 + 0.5).collect();
    let data: Vec<f64> = centers.iter().map(|x| (3.0 - 0.5 * x).exp() + 1.0).collect();

    let mut analysis = Analysis::new(Configuration::new(1.0));
    analysis.sources = vec![
        Source::new("data.yaml", SourceKind::Data),
        mc("mc.yaml", 1.0),
    ];
    let mut store = MemoryStore::new()
        .with("data.yaml", hist(data))
        .with("mc.yaml", hist(vec![1.0; n]));

    let mut plot = ratio_plot();
    plot.sideband = Some(SidebandConfig {
        model: SidebandModel::Expo,
        fit_range: [0.0, 10.0],
        integrate_from: 0.0,
        fix_slope: None,
        label: "QCD".into(),
    });
    let outcome = process(&mut analysis, &mut store, &plot);

    let estimate = outcome.sideband.as_ref().unwrap();
    assert!((estimate.fit.parameters[1] + 0.5).abs() < 1e-4);
    let stack = outcome.stack.as_ref().unwrap();
    assert_eq!(stack.layers.last().unwrap().label, "QCD");

    let ratio = &outcome.ratio.as_ref().unwrap().ratio;
    for i in 0..n {
        assert!((ratio.bin_content(i) - 1.0).abs() < 1e-3);
    }
    assert!(outcome.legend.iter().any(|e| e.label == "QCD"));
}

#[test]
fn test_sideband_without_data_is_skipped() {
    let mut analysis = Analysis::new(Configuration::new(1.0));
    analysis.sources = vec![mc("mc.yaml", 1.0)];
    let mut store = MemoryStore::new().with("mc.yaml", hist(vec![1.0, 1.0]));
    let mut plot = Plot::new("mjj");
    plot.sideband = Some(SidebandConfig {
        model: SidebandModel::Powerlaw,
        fit_range: [0.0, 2.0],
        integrate_from: 0.0,
        fix_slope: None,
        label: "QCD".into(),
    });
    let outcome = process(&mut analysis, &mut store, &plot);
    assert!(outcome.sideband.is_none());
    assert!(outcome.notes().iter().any(|n| n.starts_with("sideband skipped")));
}
