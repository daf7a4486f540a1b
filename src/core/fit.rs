//! Weighted least-squares fitting
//!
//! `chi2 = sum((y - f(x))^2 / sigma^2)` is minimized with argmin's L-BFGS.
//! Parameter errors come from the inverse of `J^T W J` at the minimum. Confidence bands
//! follow the usual recipe: `t(ndf) * sqrt(g^T C g) * sqrt(chi2 / ndf)`.

use argmin::core::{
    CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use miette::Diagnostic;
use nalgebra::DMatrix;
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use thiserror::Error;

use crate::core::formula::FitModel;
use crate::core::histogram::Histogram;

#[derive(Debug, Clone, Error, Diagnostic, PartialEq)]
pub enum FitError {
    #[error("Not enough points to fit: {points} point(s) for {parameters} free parameter(s)")]
    #[diagnostic(code(plotit::fit::points))]
    NotEnoughPoints { points: usize, parameters: usize },

    #[error("Fit did not converge after {iterations} iterations")]
    #[diagnostic(code(plotit::fit::convergence))]
    NoConvergence { iterations: usize },

    #[error("Fit covariance matrix is singular")]
    #[diagnostic(
        code(plotit::fit::singular),
        help("the function may have more parameters than the data can constrain")
    )]
    Singular,

    #[error("Minimizer failed: {message}")]
    #[diagnostic(code(plotit::fit::minimizer))]
    Minimizer { message: String },

    #[error("Fit function is not finite at the starting point")]
    #[diagnostic(code(plotit::fit::non_finite))]
    NonFinite,
}

/// Corrections kept for the inverse Hessian approximation
const LBFGS_MEMORY: usize = 10;

/// Stop once an iteration changes chi2 by less than this
const CHI2_TOLERANCE: f64 = 1e-14;

/// Minimizer settings
#[derive(Debug, Clone, PartialEq)]
pub struct FitOptions {
    pub max_iterations: usize,
    /// Converged when the chi2 gradient norm drops below this
    pub tolerance: f64,
    /// Per-parameter fixed values; `None` means free
    pub fixed: Vec<Option<f64>>,
    /// Only bins whose center lies in `[lo, hi]`
    pub range: Option<(f64, f64)>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-8,
            fixed: Vec::new(),
            range: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    /// Function family or formula that was fitted
    pub function: String,
    pub parameters: Vec<f64>,
    pub errors: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub chi2: f64,
    pub ndf: usize,
    pub iterations: usize,
}

impl FitResult {
    /// Fitted function at `x`
    pub fn eval(&self, model: &FitModel, x: f64) -> f64 {
        model.eval(x, &self.parameters)
    }

    /// Propagated uncertainty `sqrt(g^T C g)` of the function at `x`
    pub fn uncertainty(&self, model: &FitModel, x: f64) -> f64 {
        let g = model.gradient(x, &self.parameters);
        let mut variance = 0.0;
        for (i, gi) in g.iter().enumerate() {
            for (j, gj) in g.iter().enumerate() {
                variance += gi * self.covariance[i][j] * gj;
            }
        }
        variance.max(0.0).sqrt()
    }

    /// Band of `bins` points over `[low, high]` at confidence level `cl`
    ///
    /// Contents are the fitted function, errors the half-width of the interval.
    pub fn confidence_band(
        &self,
        model: &FitModel,
        bins: usize,
        low: f64,
        high: f64,
        cl: f64,
    ) -> Histogram {
        let p = 0.5 + cl / 2.0;
        let (quantile, chi2_per_ndf) = if self.ndf > 0 {
            let t = StudentsT::new(0.0, 1.0, self.ndf as f64)
                .map(|d| d.inverse_cdf(p))
                .unwrap_or(1.0);
            (t, self.chi2 / self.ndf as f64)
        } else {
            let z = Normal::new(0.0, 1.0)
                .map(|d| d.inverse_cdf(p))
                .unwrap_or(1.0);
            (z, 1.0)
        };
        let scale = quantile * chi2_per_ndf.sqrt();

        let mut band = Histogram::uniform("fit_band", bins, low, high);
        for i in 0..band.n_bins() {
            let x = band.bin_center(i);
            band.set_bin_content(i, self.eval(model, x));
            band.set_bin_error(i, self.uncertainty(model, x) * scale);
        }
        band
    }
}

/// Fit `model` to histogram contents
///
/// Bins are placed at their centers; bins whose error is not finite and
/// positive carry no weight and are skipped.
pub fn fit_histogram(
    histogram: &Histogram,
    model: &FitModel,
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    let mut sigmas = Vec::new();
    for i in 0..histogram.n_bins() {
        let (x, y, e) = (
            histogram.bin_center(i),
            histogram.bin_content(i),
            histogram.bin_error(i),
        );
        if !(e.is_finite() && e > 0.0) {
            continue;
        }
        if let Some((lo, hi)) = options.range {
            if x < lo || x > hi {
                continue;
            }
        }
        xs.push(x);
        ys.push(y);
        sigmas.push(e);
    }
    least_squares(model, &xs, &ys, &sigmas, options)
}

fn chi2_at(model: &FitModel, xs: &[f64], ys: &[f64], sigmas: &[f64], p: &[f64]) -> f64 {
    xs.iter()
        .zip(ys)
        .zip(sigmas)
        .map(|((x, y), s)| ((y - model.eval(*x, p)) / s).powi(2))
        .sum()
}

/// Chi-square over the free parameters, as seen by the minimizer
struct Chi2Problem<'a> {
    model: &'a FitModel,
    xs: &'a [f64],
    ys: &'a [f64],
    sigmas: &'a [f64],
    /// Full parameter vector; fixed entries keep their value
    template: &'a [f64],
    free: &'a [usize],
}

impl Chi2Problem<'_> {
    fn full(&self, values: &[f64]) -> Vec<f64> {
        let mut p = self.template.to_vec();
        for (&k, &v) in self.free.iter().zip(values) {
            p[k] = v;
        }
        p
    }
}

impl CostFunction for Chi2Problem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        let chi2 = chi2_at(self.model, self.xs, self.ys, self.sigmas, &self.full(params));
        if chi2.is_finite() {
            Ok(chi2)
        } else {
            Err(argmin::core::Error::msg("chi2 is not finite"))
        }
    }
}

impl Gradient for Chi2Problem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    /// `d chi2 / dp_k = -2 sum(r_i * g_k(x_i) / sigma_i)`
    fn gradient(&self, params: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        let p = self.full(params);
        let mut grad = vec![0.0; self.free.len()];
        for ((&x, &y), &s) in self.xs.iter().zip(self.ys).zip(self.sigmas) {
            let r = (y - self.model.eval(x, &p)) / s;
            let g = self.model.gradient(x, &p);
            for (out, &k) in grad.iter_mut().zip(self.free) {
                *out -= 2.0 * r * g[k] / s;
            }
        }
        Ok(grad)
    }
}

/// `J^T W J` over the free parameters at `p`
fn curvature(
    model: &FitModel,
    xs: &[f64],
    sigmas: &[f64],
    p: &[f64],
    free: &[usize],
) -> DMatrix<f64> {
    let mut jacobian = DMatrix::<f64>::zeros(xs.len(), free.len());
    for (i, (&x, &s)) in xs.iter().zip(sigmas).enumerate() {
        let g = model.gradient(x, p);
        for (col, &k) in free.iter().enumerate() {
            jacobian[(i, col)] = g[k] / s;
        }
    }
    jacobian.transpose() * &jacobian
}

/// Minimize the weighted squared residuals with L-BFGS
pub fn least_squares(
    model: &FitModel,
    xs: &[f64],
    ys: &[f64],
    sigmas: &[f64],
    options: &FitOptions,
) -> Result<FitResult, FitError> {
    let n_params = model.n_params();
    let mut start = model.initial_parameters(xs, ys);
    let fixed = |k: usize| options.fixed.get(k).copied().flatten();
    for (k, value) in start.iter_mut().enumerate() {
        if let Some(v) = fixed(k) {
            *value = v;
        }
    }
    let free: Vec<usize> = (0..n_params).filter(|&k| fixed(k).is_none()).collect();
    let m = free.len();
    let n = xs.len();
    if n < m || m == 0 {
        return Err(FitError::NotEnoughPoints {
            points: n,
            parameters: m,
        });
    }
    if !chi2_at(model, xs, ys, sigmas, &start).is_finite() {
        return Err(FitError::NonFinite);
    }

    let problem = Chi2Problem {
        model,
        xs,
        ys,
        sigmas,
        template: &start,
        free: &free,
    };
    let init: Vec<f64> = free.iter().map(|&k| start[k]).collect();
    let minimizer = |e: argmin::core::Error| FitError::Minimizer {
        message: e.to_string(),
    };

    let linesearch = MoreThuenteLineSearch::new();
    let solver = LBFGS::new(linesearch, LBFGS_MEMORY)
        .with_tolerance_grad(options.tolerance)
        .map_err(minimizer)?
        .with_tolerance_cost(CHI2_TOLERANCE)
        .map_err(minimizer)?;
    let res = Executor::new(problem, solver)
        .configure(|state| state.param(init).max_iters(options.max_iterations as u64))
        .run()
        .map_err(minimizer)?;

    let state = res.state();
    let iterations = state.get_iter() as usize;
    let converged = matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
    );
    if !converged {
        return Err(FitError::NoConvergence { iterations });
    }
    let best = state.get_best_param().ok_or(FitError::NoConvergence { iterations })?;

    let mut p = start.clone();
    for (&k, &v) in free.iter().zip(best) {
        p[k] = v;
    }
    let chi2 = chi2_at(model, xs, ys, sigmas, &p);

    let inverse = curvature(model, xs, sigmas, &p, &free)
        .try_inverse()
        .ok_or(FitError::Singular)?;
    let mut covariance = vec![vec![0.0; n_params]; n_params];
    for (row, &i) in free.iter().enumerate() {
        for (col, &j) in free.iter().enumerate() {
            covariance[i][j] = inverse[(row, col)];
        }
    }
    if covariance.iter().flatten().any(|c| !c.is_finite()) {
        return Err(FitError::Singular);
    }
    let errors = (0..n_params).map(|k| covariance[k][k].max(0.0).sqrt()).collect();

    log::debug!(
        "Fitted {} in {} iterations: chi2 = {:.4}, ndf = {}",
        model,
        iterations,
        chi2,
        n - m
    );

    Ok(FitResult {
        function: model.to_string(),
        parameters: p,
        errors,
        covariance,
        chi2,
        ndf: n - m,
        iterations,
    })
}
