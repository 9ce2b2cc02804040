//! Construction of the ¹⁴C-only companion of a reconstructed ¹²C system.
//!
//! The companion shares the carbon transport, adds radioactive decay and
//! takes its inputs from the ¹²C inputs weighted by the atmospheric
//! ¹⁴C/¹²C ratio. Its start values assume the tracer was close to
//! equilibrium under time averaged dynamics. That is an approximation, and
//! the averaging is selected with an [`EquilibriumPolicy`].

use crate::config::Delta14CConfig;
use crate::forcing::AtmosphericForcing;
use c14_core::errors::{C14Error, C14Result};
use c14_core::system::{LinearSystem, TracerForcing};
use c14_core::timeseries::{FloatValue, TimeAxis};
use c14_core::utils::linear_algebra::solve_dense;
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// How the tracer start values are derived from the per-step dynamics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquilibriumPolicy {
    /// Solve with the time mean of the system matrices and of the inputs.
    #[default]
    TimeMean,
    /// Solve with the matrix and inputs of the first step only.
    InitialStep,
    /// Ignore transfers between pools: divide the mean inputs by the
    /// diagonal of the mean system matrix.
    DiagonalTimeMean,
}

/// Per-step linear problems `A_k x = b_k` whose solution is a steady state.
///
/// For a discrete system `A_k = I - e^{-λ Δt_k} B_k` and `b_k` is the
/// tracer input of step `k`. For a continuous system `A_k = -(B(t_k) - λI)`
/// and `b_k = u(t_k) F_a(t_k)`, both at the start of each step.
#[derive(Debug, Clone, PartialEq)]
pub struct EquilibriumProblem {
    matrices: Vec<DMatrix<FloatValue>>,
    rhs: Vec<DVector<FloatValue>>,
}

impl EquilibriumProblem {
    /// Reads the problem off a tracer-only system.
    pub fn from_tracer_system(system: &LinearSystem) -> C14Result<Self> {
        let n = system.nr_pools();
        let (matrices, rhs): (Vec<_>, Vec<_>) = match system {
            LinearSystem::Discrete(run) => (0..run.times().nr_intervals())
                .map(|k| {
                    let b = run.transfer_matrix(k).ok_or_else(|| {
                        C14Error::InvalidArgument(format!("no transfer matrix for step {k}"))
                    })?;
                    Ok((DMatrix::identity(n, n) - b, run.input_vectors()[k].clone()))
                })
                .collect::<C14Result<Vec<_>>>()?
                .into_iter()
                .unzip(),
            LinearSystem::Continuous(run) => {
                let times = run.times();
                times.values()[..times.nr_intervals()]
                    .iter()
                    .map(|&t| (-run.b_at(t), run.u_at(t)))
                    .unzip()
            }
        };
        if matrices.is_empty() {
            return Err(C14Error::InvalidArgument(
                "an equilibrium needs at least one time step".into(),
            ));
        }
        Ok(Self { matrices, rhs })
    }

    pub fn nr_steps(&self) -> usize {
        self.matrices.len()
    }

    pub fn mean_matrix(&self) -> DMatrix<FloatValue> {
        let (rows, cols) = self.matrices[0].shape();
        let sum = self
            .matrices
            .iter()
            .fold(DMatrix::zeros(rows, cols), |acc, a| acc + a);
        sum / self.nr_steps() as FloatValue
    }

    pub fn mean_rhs(&self) -> DVector<FloatValue> {
        let sum = self
            .rhs
            .iter()
            .fold(DVector::zeros(self.rhs[0].len()), |acc, b| acc + b);
        sum / self.nr_steps() as FloatValue
    }

    pub fn solve(&self, policy: EquilibriumPolicy) -> C14Result<DVector<FloatValue>> {
        let solution = match policy {
            EquilibriumPolicy::TimeMean => solve_dense(&self.mean_matrix(), &self.mean_rhs()),
            EquilibriumPolicy::InitialStep => solve_dense(&self.matrices[0], &self.rhs[0]),
            EquilibriumPolicy::DiagonalTimeMean => {
                let a = self.mean_matrix();
                let x = self.mean_rhs().component_div(&a.diagonal());
                x.iter().all(|v| v.is_finite()).then_some(x)
            }
        };
        solution.ok_or_else(|| {
            C14Error::EquilibriumSolve(format!(
                "Singular matrix: no {policy:?} tracer equilibrium for {} pools",
                self.matrices[0].nrows()
            ))
        })
    }
}

/// Tracer inputs per step for a discrete system.
///
/// Step `k` takes the carbon input of that step weighted by the atmospheric
/// ratio at its start. Infinite values are replaced by zero while missing
/// values are kept.
pub fn tracer_input_series(
    carbon_inputs: &[DVector<FloatValue>],
    times: &TimeAxis,
    forcing: &AtmosphericForcing,
    alpha: FloatValue,
) -> Vec<DVector<FloatValue>> {
    carbon_inputs
        .iter()
        .zip(times.values())
        .map(|(u, &t)| {
            let ratio = forcing.ratio_at(t, alpha);
            u.map(|v| match v * ratio {
                w if w.is_infinite() => 0.0,
                w => w,
            })
        })
        .collect()
}

fn tracer_forcing(
    system: &LinearSystem,
    forcing: &AtmosphericForcing,
    alpha: FloatValue,
) -> TracerForcing {
    match system {
        LinearSystem::Discrete(run) => TracerForcing::Series(tracer_input_series(
            run.input_vectors(),
            run.times(),
            forcing,
            alpha,
        )),
        LinearSystem::Continuous(_) => TracerForcing::Ratio(forcing.ratio_function(alpha)),
    }
}

/// Builds the ¹⁴C-only system paired with a ¹²C system.
///
/// # Errors
///
/// [`C14Error::EquilibriumSolve`] when the start values cannot be solved for.
pub fn build_tracer_system(
    system: &LinearSystem,
    forcing: &AtmosphericForcing,
    config: &Delta14CConfig,
) -> C14Result<LinearSystem> {
    let tracer_forcing = tracer_forcing(system, forcing, config.alpha);
    let n = system.nr_pools();

    let provisional =
        system.to_tracer_only(DVector::zeros(n), tracer_forcing.clone(), config.decay_rate)?;
    let start_values =
        EquilibriumProblem::from_tracer_system(&provisional)?.solve(config.equilibrium)?;
    debug!(
        "{} tracer start values ({:?}): {:?}",
        system.kind(),
        config.equilibrium,
        start_values.as_slice()
    );

    system.to_tracer_only(start_values, tracer_forcing, config.decay_rate)
}
