// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Gaussian-plus-exponential peak fit.
//!
//! Levenberg–Marquardt on the five-parameter model
//! `A·exp(-½((t-μ)/σ)²) + B·exp(-α·t)` with geodesic acceleration: the
//! second directional derivative of the residuals is estimated
//! numerically along the velocity step and the acceleration correction is
//! kept only while it stays small relative to the velocity.

use nalgebra::{Cholesky, DMatrix, DVector, SMatrix, SVector};

use abcd_histogram::Histogram;

const MAX_ITERATIONS: u32 = 200;
const XTOL: f64 = 1.0e-8;
const FTOL: f64 = 1.0e-8;
const GTOL: f64 = 1.0e-8;
/// Step size of the numerical second directional derivative.
const ACCEL_H: f64 = 0.02;
/// Largest accepted |acceleration| / |velocity| ratio.
const ACCEL_RATIO_MAX: f64 = 0.75;

/// The five model parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakParameters {
    pub amplitude: f64,
    pub mu: f64,
    pub sigma: f64,
    pub background: f64,
    pub alpha: f64,
}

/// Termination reason of the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    Converged,
    MaxIterations,
    /// The model degenerated (null width) or the normal equations could
    /// not be solved at any damping.
    Degenerate,
}

#[derive(Debug, Clone, Copy)]
pub struct FitResult {
    pub parameters: PeakParameters,
    pub status: FitStatus,
    pub iterations: u32,
    pub chi_square: f64,
}

/// Model value at `t`.
pub fn peak_model(parameters: &PeakParameters, t: f64) -> f64 {
    let z = (t - parameters.mu) / parameters.sigma;
    parameters.amplitude * (-0.5 * z * z).exp()
        + parameters.background * (-parameters.alpha * t).exp()
}

fn pack(parameters: &PeakParameters) -> SVector<f64, 5> {
    SVector::from([
        parameters.amplitude,
        parameters.mu,
        parameters.sigma,
        parameters.background,
        parameters.alpha,
    ])
}

fn unpack(x: &SVector<f64, 5>) -> PeakParameters {
    PeakParameters {
        amplitude: x[0],
        mu: x[1],
        sigma: x[2],
        background: x[3],
        alpha: x[4],
    }
}

/// Residuals `y_i - model(t_i)` over the histogram bins.
fn residuals(histo: &Histogram, x: &SVector<f64, 5>) -> DVector<f64> {
    let parameters = unpack(x);
    let min = histo.min();
    let width = histo.bin_width();
    DVector::from_iterator(
        histo.counts().len(),
        histo
            .counts()
            .iter()
            .enumerate()
            .map(|(i, &y)| y - peak_model(&parameters, min + width * i as f64)),
    )
}

/// Analytic Jacobian of the residuals.
fn jacobian(histo: &Histogram, x: &SVector<f64, 5>) -> DMatrix<f64> {
    let [amplitude, mu, sigma, background, alpha] = [x[0], x[1], x[2], x[3], x[4]];
    let min = histo.min();
    let width = histo.bin_width();
    let bins = histo.counts().len();

    let mut jacobian = DMatrix::zeros(bins, 5);
    for i in 0..bins {
        let t = min + width * i as f64;
        let rt = t - mu;
        let gauss = (-0.5 * (rt / sigma) * (rt / sigma)).exp();
        let expo = (-alpha * t).exp();

        // Residual is y - model, hence the sign flip.
        jacobian[(i, 0)] = -gauss;
        jacobian[(i, 1)] = -amplitude * rt * gauss / (sigma * sigma);
        jacobian[(i, 2)] = -amplitude * rt * rt * gauss / (sigma * sigma * sigma);
        jacobian[(i, 3)] = -expo;
        jacobian[(i, 4)] = background * t * expo;
    }
    jacobian
}

fn solve_damped(
    jtj: &SMatrix<f64, 5, 5>,
    rhs: &SVector<f64, 5>,
    lambda: f64,
) -> Option<SVector<f64, 5>> {
    let mut damped = *jtj;
    for k in 0..5 {
        // Marquardt scaling keeps the step sane across the wildly
        // different parameter magnitudes.
        damped[(k, k)] += lambda * jtj[(k, k)].max(1.0e-12);
    }
    Cholesky::new(damped).map(|factor| factor.solve(rhs))
}

/// Fit the model to a histogram, warm-starting from `initial`.
pub fn fit_peak(histo: &Histogram, initial: &PeakParameters) -> FitResult {
    let mut x = pack(initial);
    if x[2] == 0.0 {
        return FitResult {
            parameters: *initial,
            status: FitStatus::Degenerate,
            iterations: 0,
            chi_square: f64::INFINITY,
        };
    }

    let mut residual = residuals(histo, &x);
    let mut cost = residual.norm_squared();
    let mut lambda = 1.0e-3;

    for iteration in 1..=MAX_ITERATIONS {
        let jac = jacobian(histo, &x);
        let jtj: SMatrix<f64, 5, 5> = SMatrix::from_iterator(
            (jac.transpose() * &jac).iter().copied(),
        );
        let gradient: SVector<f64, 5> =
            SVector::from_iterator((jac.transpose() * &residual).iter().copied());

        if gradient.norm() < GTOL {
            return FitResult {
                parameters: unpack(&x),
                status: FitStatus::Converged,
                iterations: iteration,
                chi_square: cost,
            };
        }

        // Raise the damping until the normal equations admit a step that
        // lowers the cost.
        let mut stepped = false;
        for _attempt in 0..16 {
            let Some(velocity) = solve_damped(&jtj, &(-gradient), lambda) else {
                lambda *= 10.0;
                continue;
            };

            // Geodesic acceleration: second directional derivative of the
            // residuals along the velocity, estimated by central
            // differences.
            let forward = residuals(histo, &(x + velocity * ACCEL_H));
            let backward = residuals(histo, &(x - velocity * ACCEL_H));
            let second = (&forward + &backward - &residual * 2.0) / (ACCEL_H * ACCEL_H);
            let accel_rhs: SVector<f64, 5> =
                SVector::from_iterator((jac.transpose() * &second).iter().copied());
            let acceleration = solve_damped(&jtj, &(-accel_rhs * 0.5), lambda)
                .filter(|a| a.norm() <= ACCEL_RATIO_MAX * velocity.norm())
                .unwrap_or_else(SVector::zeros);

            let step = velocity + acceleration * 0.5;
            let trial = x + step;
            if trial[2] == 0.0 {
                lambda *= 10.0;
                continue;
            }

            let trial_residual = residuals(histo, &trial);
            let trial_cost = trial_residual.norm_squared();

            if trial_cost < cost {
                let step_norm = step.norm();
                let converged = step_norm < XTOL * (x.norm() + XTOL)
                    || (cost - trial_cost) < FTOL * cost.max(FTOL);

                x = trial;
                residual = trial_residual;
                cost = trial_cost;
                lambda = (lambda * 0.1).max(1.0e-12);
                stepped = true;

                if converged {
                    return FitResult {
                        parameters: unpack(&x),
                        status: FitStatus::Converged,
                        iterations: iteration,
                        chi_square: cost,
                    };
                }
                break;
            }

            lambda *= 10.0;
            if lambda > 1.0e12 {
                break;
            }
        }

        if !stepped {
            // No damping produced progress; report what we have.
            return FitResult {
                parameters: unpack(&x),
                status: if cost.is_finite() {
                    FitStatus::Converged
                } else {
                    FitStatus::Degenerate
                },
                iterations: iteration,
                chi_square: cost,
            };
        }
    }

    FitResult {
        parameters: unpack(&x),
        status: FitStatus::MaxIterations,
        iterations: MAX_ITERATIONS,
        chi_square: cost,
    }
}
