use argmin::core::{CostFunction, Error as ArgminError, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CurveError;

/// A model that can be compared against observations.
pub trait Residuals {
    /// Model prediction for every observation given the full parameter vector.
    fn predict(&self, params: &[f64]) -> Vec<f64>;
}

/// One fit parameter with its starting value, bounds and typical magnitude.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub vary: bool,
    pub min: f64,
    pub max: f64,
    /// Typical magnitude, the solver works in units of this scale.
    pub scale: f64,
}

impl Parameter {
    pub fn new(name: &str, value: f64) -> Self {
        Parameter {
            name: name.to_string(),
            value,
            vary: true,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            scale: if value != 0.0 { value.abs() } else { 1.0 },
        }
    }

    pub fn fixed(name: &str, value: f64) -> Self {
        Parameter {
            vary: false,
            ..Parameter::new(name, value)
        }
    }

    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self.value = self.value.clamp(min, max);
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        if scale.is_finite() && scale > 0.0 {
            self.scale = scale;
        }
        self
    }

    pub fn with_vary(mut self, vary: bool) -> Self {
        self.vary = vary;
        self
    }

    fn is_free(&self) -> bool {
        self.vary && self.min < self.max
    }

    /// Unbounded solver coordinate of `value`.
    fn to_internal(&self, value: f64) -> f64 {
        match (self.min.is_finite(), self.max.is_finite()) {
            (true, true) => (2.0 * (value - self.min) / (self.max - self.min) - 1.0).clamp(-1.0, 1.0).asin(),
            (true, false) => (((value - self.min) / self.scale + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            (false, true) => (((self.max - value) / self.scale + 1.0).powi(2) - 1.0).max(0.0).sqrt(),
            (false, false) => value / self.scale,
        }
    }

    /// Parameter value of solver coordinate `u`, always inside the bounds.
    fn from_internal(&self, u: f64) -> f64 {
        match (self.min.is_finite(), self.max.is_finite()) {
            (true, true) => self.min + (self.max - self.min) * (u.sin() + 1.0) / 2.0,
            (true, false) => self.min + self.scale * ((u * u + 1.0).sqrt() - 1.0),
            (false, true) => self.max - self.scale * ((u * u + 1.0).sqrt() - 1.0),
            (false, false) => u * self.scale,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Iteration limit of a single simplex run.
    pub max_iterations: usize,
    /// Spread of the normalized chi-square over the simplex at which a run stops.
    pub tolerance: f64,
    /// Simplex runs, each restarted around the best point of the previous one.
    pub restarts: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            max_iterations: 2000,
            tolerance: 1e-15,
            restarts: 3,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub names: Vec<String>,
    pub values: Vec<f64>,
    pub chisq: f64,
    pub redchi: f64,
    pub r_squared: f64,
    pub iterations: usize,
    pub best_fit: Vec<f64>,
}

impl FitReport {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }
}

#[derive(Clone, Debug, PartialEq, Error)]
pub enum FitError {
    #[error("model produced {predicted} values for {observed} observations")]
    LengthMismatch { predicted: usize, observed: usize },
    #[error("{points} points cannot constrain {free} free parameters")]
    Underdetermined { points: usize, free: usize },
    #[error("non-finite residuals at iteration {0}")]
    NonFinite(usize),
    #[error("no convergence after {0} iterations")]
    MaxIterations(usize),
    #[error("solver failed: {0}")]
    Solver(String),
}

impl From<FitError> for CurveError {
    fn from(err: FitError) -> Self {
        CurveError::FitConvergence(err.to_string())
    }
}

fn sum_of_squares<M: Residuals>(
    model: &M,
    observed: &[f64],
    params: &[f64],
) -> Result<(f64, Vec<f64>), FitError> {
    let predicted = model.predict(params);
    if predicted.len() != observed.len() {
        return Err(FitError::LengthMismatch {
            predicted: predicted.len(),
            observed: observed.len(),
        });
    }
    let chisq = observed.iter().zip(&predicted).map(|(o, p)| (o - p) * (o - p)).sum();
    Ok((chisq, predicted))
}

/// Full parameter vector for the solver coordinates of the free parameters.
fn expand(params: &[Parameter], free: &[usize], internal: &[f64]) -> Vec<f64> {
    let mut values: Vec<f64> = params.iter().map(|p| p.value).collect();
    for (&i, &u) in free.iter().zip(internal) {
        values[i] = params[i].from_internal(u);
    }
    values
}

/// Chi-square relative to the starting point, as seen by the simplex.
struct ChiSquare<'a, M> {
    model: &'a M,
    observed: &'a [f64],
    params: &'a [Parameter],
    free: &'a [usize],
    norm: f64,
}

impl<M: Residuals> CostFunction for ChiSquare<'_, M> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, internal: &Self::Param) -> Result<Self::Output, ArgminError> {
        let values = expand(self.params, self.free, internal);
        let (chisq, _) = sum_of_squares(self.model, self.observed, &values)?;
        Ok(if chisq.is_finite() { chisq / self.norm } else { f64::INFINITY })
    }
}

fn simplex(center: &[f64]) -> Vec<Vec<f64>> {
    let mut vertices = vec![center.to_vec()];
    for d in 0..center.len() {
        let mut vertex = center.to_vec();
        vertex[d] += 0.1 * center[d].abs().max(1.0);
        vertices.push(vertex);
    }
    vertices
}

fn solver_error(err: ArgminError) -> FitError {
    match err.downcast::<FitError>() {
        Ok(fit) => fit,
        Err(other) => FitError::Solver(other.to_string()),
    }
}

/// Bounded least squares with a restarted Nelder-Mead simplex.
///
/// Free parameters are searched in units of their `scale`; bounded ones
/// through a sine or square-root transform so every trial stays inside
/// `[min, max]`.
///
/// # Arguments
/// * `model` - the model to fit
/// * `observed` - observations, one per model prediction
/// * `params` - parameters in the order the model expects them
/// * `config` - iteration limits and tolerance
///
/// # Returns
/// * `FitReport` with the optimized values and goodness-of-fit figures
pub fn least_squares<M: Residuals>(
    model: &M,
    observed: &[f64],
    params: &[Parameter],
    config: &FitConfig,
) -> Result<FitReport, FitError> {
    let free: Vec<usize> = (0..params.len()).filter(|&i| params[i].is_free()).collect();
    let n = observed.len();
    let m = free.len();
    if n <= m || n == 0 {
        return Err(FitError::Underdetermined { points: n, free: m });
    }

    let mut values: Vec<f64> = params.iter().map(|p| p.value).collect();
    let (start_chisq, _) = sum_of_squares(model, observed, &values)?;
    if !start_chisq.is_finite() {
        return Err(FitError::NonFinite(0));
    }

    let mut iterations = 0;
    if m > 0 && start_chisq > 0.0 {
        let mut best: Vec<f64> = free.iter().map(|&i| params[i].to_internal(params[i].value)).collect();
        let mut best_cost = 1.0;
        let mut converged = false;

        for _ in 0..config.restarts.max(1) {
            let problem = ChiSquare {
                model,
                observed,
                params,
                free: &free,
                norm: start_chisq,
            };
            let solver = NelderMead::new(simplex(&best))
                .with_sd_tolerance(config.tolerance)
                .map_err(solver_error)?;
            let result = Executor::new(problem, solver)
                .configure(|state| state.max_iters(config.max_iterations as u64))
                .run()
                .map_err(solver_error)?;

            let state = result.state();
            iterations += state.get_iter() as usize;
            let run_converged = matches!(
                state.get_termination_status(),
                TerminationStatus::Terminated(TerminationReason::SolverConverged)
            );
            converged |= run_converged;

            let cost = state.get_best_cost();
            let gain = best_cost - cost;
            if let Some(param) = state.get_best_param() {
                if cost <= best_cost {
                    best = param.clone();
                    best_cost = cost;
                }
            }
            if run_converged && gain <= config.tolerance * best_cost {
                break;
            }
        }

        if !converged {
            debug!("least squares stopped after {} iterations at chisq {:e}", iterations, best_cost * start_chisq);
            return Err(FitError::MaxIterations(iterations));
        }
        values = expand(params, &free, &best);
    }

    let (chisq, predicted) = sum_of_squares(model, observed, &values)?;
    let mean = observed.iter().sum::<f64>() / n as f64;
    let total: f64 = observed.iter().map(|o| (o - mean) * (o - mean)).sum();
    let r_squared = if total > 0.0 { 1.0 - chisq / total } else { f64::NAN };

    Ok(FitReport {
        names: params.iter().map(|p| p.name.clone()).collect(),
        values,
        chisq,
        redchi: chisq / (n - m) as f64,
        r_squared,
        iterations,
        best_fit: predicted,
    })
}
