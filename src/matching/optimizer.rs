//! Levenberg-Marquardt core
//!
//! Damped Gauss-Newton on the weighted residual vector:
//!
//! ```text
//! (JᵀJ + μ·diag(JᵀJ))·δ = −Jᵀr
//! ```
//!
//! Accepted steps divide μ by 3, rejected ones multiply it by 10. The
//! Jacobian is a forward difference whose columns are evaluated in parallel.
//!
//! Progress is measured on the residual norm ‖r‖, not on the cost ‖r‖².
//! A run converges when that norm stops dropping by more than `tolerance`,
//! or when a streak of rejected steps ends with a step (or its predicted
//! gain) below `tolerance`. It diverges only when trial points stop
//! producing finite residuals or the predicted gain is real but never
//! materialises.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use tracing::{debug, trace};

use super::objective::{Objective, ParameterSpace};
use crate::config::MatchSettings;
use crate::types::{ModelParameters, Termination};

/// Relative forward-difference step in internal coordinates
const JACOBIAN_STEP: f64 = 1e-5;

/// Cost below which the fit is exact for all practical purposes
const EXACT_FIT_COST: f64 = 1e-30;

/// Damping ceiling; beyond this the step is numerically zero
const MAX_DAMPING: f64 = 1e16;

/// Stalled-iteration count that declares convergence
const STALLED_ITERATIONS: usize = 2;

/// Progress report after an accepted step
#[derive(Debug, Clone)]
pub struct IterationReport {
    pub iteration: usize,
    /// Norm of the weighted residual vector
    pub residual: f64,
    pub parameters: ModelParameters,
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RunEnd {
    Finished(Termination),
    Cancelled,
}

/// Best point reached by a run
#[derive(Debug, Clone)]
pub struct RunResult {
    pub x: DVector<f64>,
    pub cost: f64,
    pub iterations: usize,
    /// At least one step improved on the starting point
    pub improved: bool,
    pub end: RunEnd,
}

/// Relative drop of the residual norm when the cost moves from `before` to `after`.
fn norm_reduction(before: f64, after: f64) -> f64 {
    1.0 - (after.max(0.0) / before).sqrt()
}

pub struct LevenbergMarquardt<'a> {
    objective: &'a Objective<'a>,
    space: &'a ParameterSpace,
    settings: &'a MatchSettings,
}

impl<'a> LevenbergMarquardt<'a> {
    pub fn new(objective: &'a Objective<'a>, space: &'a ParameterSpace, settings: &'a MatchSettings) -> Self {
        Self {
            objective,
            space,
            settings,
        }
    }

    fn residuals_at(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        self.objective.residuals(&self.space.decode(x))
    }

    fn jacobian(&self, x: &DVector<f64>, r: &DVector<f64>) -> DMatrix<f64> {
        let columns: Vec<DVector<f64>> = (0..x.len())
            .into_par_iter()
            .map(|j| {
                let h = JACOBIAN_STEP * x[j].abs().max(1.0);
                let mut shifted = x.clone();
                shifted[j] += h;
                let shifted = self.space.clamp(shifted);
                let actual = shifted[j] - x[j];
                if actual == 0.0 {
                    // Pinned against a bound in this direction
                    let mut back = x.clone();
                    back[j] -= h;
                    let back = self.space.clamp(back);
                    let actual = back[j] - x[j];
                    return match self.residuals_at(&back) {
                        Some(rb) if actual != 0.0 => (rb - r) / actual,
                        _ => DVector::zeros(r.len()),
                    };
                }
                match self.residuals_at(&shifted) {
                    Some(rs) => (rs - r) / actual,
                    None => DVector::zeros(r.len()),
                }
            })
            .collect();
        DMatrix::from_columns(&columns)
    }

    fn solve_step(jtj: &DMatrix<f64>, gradient: &DVector<f64>, damping: f64) -> Option<DVector<f64>> {
        let n = jtj.nrows();
        let scale = jtj.diagonal().max().max(f64::MIN_POSITIVE);
        let mut a = jtj.clone();
        for i in 0..n {
            a[(i, i)] += damping * jtj[(i, i)].max(1e-12 * scale);
        }
        let rhs = -gradient;
        if let Some(chol) = a.clone().cholesky() {
            return Some(chol.solve(&rhs));
        }
        a.lu().solve(&rhs)
    }

    /// Run from `start` until a termination rule fires or `cancelled()`
    /// returns true at an iteration boundary.
    pub fn run<C, P>(&self, start: DVector<f64>, cancelled: C, mut progress: P) -> RunResult
    where
        C: Fn() -> bool,
        P: FnMut(IterationReport),
    {
        let mut x = self.space.clamp(start);
        let Some(mut r) = self.residuals_at(&x) else {
            debug!("Starting point has no finite residual");
            return RunResult {
                x,
                cost: f64::INFINITY,
                iterations: 0,
                improved: false,
                end: RunEnd::Finished(Termination::Diverged),
            };
        };
        let mut cost = r.norm_squared();
        let mut damping = self.settings.initial_damping;
        let mut improved = false;
        let mut stalled = 0usize;
        let mut rejections = 0usize;

        let finish = |x: DVector<f64>, cost: f64, iterations: usize, improved: bool, end: RunEnd| RunResult {
            x,
            cost,
            iterations,
            improved,
            end,
        };

        if cost < EXACT_FIT_COST {
            return finish(x, cost, 0, false, RunEnd::Finished(Termination::Converged));
        }

        for iteration in 1..=self.settings.max_iterations {
            if cancelled() {
                debug!(iteration, "Match cancelled");
                return finish(x, cost, iteration - 1, improved, RunEnd::Cancelled);
            }

            let j = self.jacobian(&x, &r);
            let jt = j.transpose();
            let jtj = &jt * &j;
            let gradient = &jt * &r;

            loop {
                let step = Self::solve_step(&jtj, &gradient, damping)
                    .filter(|s| s.iter().all(|v| v.is_finite()));

                let trial = step.as_ref().map(|s| self.space.clamp(&x + s));
                let step_norm = trial.as_ref().map_or(f64::INFINITY, |t| (t - &x).norm());
                if step_norm < self.settings.step_epsilon {
                    debug!(iteration, step_norm, "Step below tolerance");
                    return finish(x, cost, iteration, improved, RunEnd::Finished(Termination::StepTolerance));
                }

                let settled = trial.as_ref().is_some_and(|t| {
                    let d = t - &x;
                    let predicted = -(2.0 * d.dot(&gradient) + d.dot(&(&jtj * &d)));
                    let step_rel = step_norm / x.norm().max(1.0);
                    step_rel < self.settings.tolerance
                        || norm_reduction(cost, cost - predicted) < self.settings.tolerance
                });

                let candidate = trial.and_then(|t| {
                    let rt = self.residuals_at(&t)?;
                    let ct = rt.norm_squared();
                    ct.is_finite().then_some((t, rt, ct))
                });
                let finite = candidate.is_some();

                match candidate {
                    Some((t, rt, ct)) if ct < cost => {
                        let reduction = norm_reduction(cost, ct);
                        x = t;
                        r = rt;
                        cost = ct;
                        damping = (damping / 3.0).max(1e-12);
                        rejections = 0;
                        improved = true;

                        trace!(iteration, cost, damping, "Step accepted");
                        progress(IterationReport {
                            iteration,
                            residual: cost.sqrt(),
                            parameters: self.space.decode(&x),
                        });

                        if cost < EXACT_FIT_COST {
                            return finish(x, cost, iteration, improved, RunEnd::Finished(Termination::Converged));
                        }
                        if reduction < self.settings.tolerance {
                            stalled += 1;
                            if stalled >= STALLED_ITERATIONS {
                                return finish(x, cost, iteration, improved, RunEnd::Finished(Termination::Converged));
                            }
                        } else {
                            stalled = 0;
                        }
                        break;
                    }
                    _ => {
                        rejections += 1;
                        damping *= 10.0;
                        trace!(iteration, rejections, damping, "Step rejected");
                        if rejections >= self.settings.max_consecutive_increases || damping > MAX_DAMPING {
                            // Rejections with a negligible step or predicted gain mean
                            // the fit sits at the numerical floor of the objective
                            if finite && settled {
                                debug!(iteration, rejections, cost, "No further reduction available");
                                return finish(x, cost, iteration, improved, RunEnd::Finished(Termination::Converged));
                            }
                            debug!(iteration, rejections, "Residual kept increasing");
                            return finish(x, cost, iteration, improved, RunEnd::Finished(Termination::Diverged));
                        }
                    }
                }
            }
        }

        finish(
            x,
            cost,
            self.settings.max_iterations,
            improved,
            RunEnd::Finished(Termination::MaxIterations),
        )
    }
}
