//! Continuous model runs: $\dot{x} = (B(t) - \lambda I) x + u(t)$.
//!
//! Transport rates and input rates are constant over each time step. Every
//! step is integrated separately with RK4, carrying accumulators for the
//! amounts that enter, move between and leave the pools alongside the
//! stocks, so the flux amounts follow the same trajectory as the stocks.

use super::{RatioFunction, Solution};
use crate::errors::{C14Error, C14Result};
use crate::interpolate::find_segment;
use crate::ivp::{get_last_step, IVPBuilder, ModelState, IVP};
use crate::timeseries::{FloatValue, Time, TimeAxis};
use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Array3};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_SUBSTEPS: usize = 10;

#[derive(Clone)]
pub struct ContinuousModelRun {
    times: Arc<TimeAxis>,
    start_values: DVector<FloatValue>,
    /// Transport rates per day for each step, diagonal holding total loss rates.
    rates: Vec<DMatrix<FloatValue>>,
    /// Input rates per day for each step.
    input_rates: Vec<DVector<FloatValue>>,
    input_ratio: Option<RatioFunction>,
    decay_rate: FloatValue,
    substeps: usize,
}

impl fmt::Debug for ContinuousModelRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuousModelRun")
            .field("times", &self.times)
            .field("start_values", &self.start_values)
            .field("rates", &self.rates)
            .field("input_rates", &self.input_rates)
            .field("weighted_inputs", &self.input_ratio.is_some())
            .field("decay_rate", &self.decay_rate)
            .field("substeps", &self.substeps)
            .finish()
    }
}

impl ContinuousModelRun {
    pub fn new(
        times: Arc<TimeAxis>,
        start_values: DVector<FloatValue>,
        rates: Vec<DMatrix<FloatValue>>,
        input_rates: Vec<DVector<FloatValue>>,
        substeps: usize,
    ) -> C14Result<Self> {
        let n = start_values.len();
        let nr_steps = times.nr_intervals();
        if rates.len() != nr_steps || input_rates.len() != nr_steps {
            return Err(C14Error::InvalidArgument(format!(
                "{nr_steps} steps need as many rate matrices and input vectors, got {} and {}",
                rates.len(),
                input_rates.len()
            )));
        }
        if rates.iter().any(|b| b.shape() != (n, n)) || input_rates.iter().any(|u| u.len() != n) {
            return Err(C14Error::InvalidArgument(format!(
                "rate matrices must be {n}x{n} and input vectors of length {n}"
            )));
        }
        if substeps == 0 {
            return Err(C14Error::InvalidArgument(
                "at least one integration substep is needed".into(),
            ));
        }
        Ok(Self {
            times,
            start_values,
            rates,
            input_rates,
            input_ratio: None,
            decay_rate: 0.0,
            substeps,
        })
    }

    /// Rates from observed stocks and flux amounts.
    ///
    /// The rate out of a pool during a step is the flux amount divided by the
    /// step length and the pool's mean stock over the step. Pools that are
    /// empty on average get no outgoing rates.
    ///
    /// # Arguments
    ///
    /// * `stocks` - `(nr_times, nr_pools)` observed stocks
    /// * `inputs` - `(nr_steps, nr_pools)` external input amounts
    /// * `transfers` - `(nr_steps, nr_pools, nr_pools)` amounts indexed `[k, to, from]`
    /// * `outputs` - `(nr_steps, nr_pools)` external output amounts
    pub fn from_fluxes(
        times: Arc<TimeAxis>,
        stocks: &Array2<FloatValue>,
        inputs: &Array2<FloatValue>,
        transfers: &Array3<FloatValue>,
        outputs: &Array2<FloatValue>,
        substeps: usize,
    ) -> C14Result<Self> {
        let (nr_times, n) = stocks.dim();
        let nr_steps = times.nr_intervals();
        if nr_times != times.len()
            || inputs.dim() != (nr_steps, n)
            || transfers.dim() != (nr_steps, n, n)
            || outputs.dim() != (nr_steps, n)
        {
            return Err(C14Error::InvalidArgument(
                "stock and flux arrays do not match the time axis and pool count".into(),
            ));
        }

        let mut rates = Vec::with_capacity(nr_steps);
        let mut input_rates = Vec::with_capacity(nr_steps);
        for (k, dt) in times.step_lengths().into_iter().enumerate() {
            let mut b = DMatrix::zeros(n, n);
            for j in 0..n {
                let mean_stock = 0.5 * (stocks[[k, j]] + stocks[[k + 1, j]]);
                if mean_stock < 0.0 {
                    return Err(C14Error::Reconstruction(format!(
                        "Compartment content negative: mean stock of pool {j} in step {k} is {mean_stock}"
                    )));
                }
                let drains = mean_stock > 0.0 || mean_stock.is_nan();
                let mut loss = outputs[[k, j]];
                for i in (0..n).filter(|&i| i != j) {
                    let flux = transfers[[k, i, j]];
                    if flux < 0.0 {
                        return Err(C14Error::Reconstruction(format!(
                            "Negative flux from pool {j} to pool {i} in step {k}: {flux}"
                        )));
                    }
                    if drains {
                        b[(i, j)] = flux / (mean_stock * dt);
                    }
                    loss += flux;
                }
                if outputs[[k, j]] < 0.0 {
                    return Err(C14Error::Reconstruction(format!(
                        "Negative flux out of pool {j} in step {k}: {}",
                        outputs[[k, j]]
                    )));
                }
                if drains {
                    b[(j, j)] = -loss / (mean_stock * dt);
                }
            }
            rates.push(b);
            input_rates.push(DVector::from_fn(n, |j, _| inputs[[k, j]] / dt));
        }
        debug!("reconstructed {nr_steps} continuous rate matrices for {n} pools");

        let start_values = DVector::from_fn(n, |j, _| stocks[[0, j]]);
        Self::new(times, start_values, rates, input_rates, substeps)
    }

    pub fn times(&self) -> &Arc<TimeAxis> {
        &self.times
    }

    pub fn nr_pools(&self) -> usize {
        self.start_values.len()
    }

    pub fn start_values(&self) -> &DVector<FloatValue> {
        &self.start_values
    }

    pub fn decay_rate(&self) -> FloatValue {
        self.decay_rate
    }

    /// Step whose rates apply at `t`. Times outside the axis use the end steps.
    pub fn step_index(&self, t: Time) -> usize {
        find_segment(self.times.values(), t)
    }

    /// The system matrix $B(t) - \lambda I$ at `t`, per day.
    pub fn b_at(&self, t: Time) -> DMatrix<FloatValue> {
        let b = &self.rates[self.step_index(t)];
        b - DMatrix::identity(b.nrows(), b.ncols()) * self.decay_rate
    }

    /// External input rates at `t`, per day.
    pub fn u_at(&self, t: Time) -> DVector<FloatValue> {
        let u = &self.input_rates[self.step_index(t)];
        match &self.input_ratio {
            Some(ratio) => u * ratio(t),
            None => u.clone(),
        }
    }

    pub fn run(&self) -> C14Result<Solution> {
        let n = self.nr_pools();
        let mut solution = Solution::zeros(self.times.len(), n);
        let mut x = self.start_values.clone();
        for j in 0..n {
            solution.stocks[[0, j]] = x[j];
        }

        for k in 0..self.times.nr_intervals() {
            let (t_start, t_end) = self
                .times
                .interval(k)
                .ok_or_else(|| C14Error::Integration(format!("no interval {k}")))?;
            let dynamics = StepDynamics {
                rates: self.rates[k].clone(),
                input_rates: self.input_rates[k].clone(),
                input_ratio: self.input_ratio.clone(),
                decay_rate: self.decay_rate,
                t_start,
                substep: (t_end - t_start) / self.substeps as Time,
            };

            let mut y0 = ModelState::zeros(dynamics.state_len());
            y0.rows_mut(0, n).copy_from(&x);

            // Integrate on a unit-step clock so the number of steps is exact
            let end = self.substeps as Time;
            let mut solver = IVPBuilder::new(Arc::new(dynamics), y0).to_rk4(0.0, end, 1.0);
            solver
                .integrate()
                .map_err(|e| C14Error::Integration(format!("step {k}: {e:?}")))?;
            let y = get_last_step(solver.results(), end)?;

            for j in 0..n {
                x[j] = y[j];
                solution.stocks[[k + 1, j]] = y[j];
                solution.inputs[[k, j]] = y[n + j];
                solution.outputs[[k, j]] = y[2 * n + n * n + j];
                for i in 0..n {
                    solution.transfers[[k, i, j]] = y[2 * n + i * n + j];
                }
            }
        }
        Ok(solution)
    }

    pub fn solve(&self) -> C14Result<Array2<FloatValue>> {
        Ok(self.run()?.stocks)
    }

    /// Same transport with inputs `ratio(t) * u(t)` and first order decay.
    pub fn to_tracer_only(
        &self,
        start_values: DVector<FloatValue>,
        ratio: RatioFunction,
        decay_rate: FloatValue,
    ) -> C14Result<Self> {
        if start_values.len() != self.nr_pools() {
            return Err(C14Error::InvalidArgument(format!(
                "{} tracer start values for {} pools",
                start_values.len(),
                self.nr_pools()
            )));
        }
        Ok(Self {
            start_values,
            input_ratio: Some(ratio),
            decay_rate,
            ..self.clone()
        })
    }
}

/// Right hand side for one step, on a clock where one unit is one substep.
///
/// State layout: stocks `x` (n), accumulated inputs (n), accumulated
/// transfers (n * n, row-major `[to, from]`), accumulated outputs (n).
struct StepDynamics {
    rates: DMatrix<FloatValue>,
    input_rates: DVector<FloatValue>,
    input_ratio: Option<RatioFunction>,
    decay_rate: FloatValue,
    t_start: Time,
    substep: Time,
}

impl StepDynamics {
    fn state_len(&self) -> usize {
        let n = self.input_rates.len();
        n * (n + 3)
    }
}

impl IVP<Time, ModelState> for StepDynamics {
    fn calculate_dy_dt(&self, tau: Time, y: &ModelState, dy_dt: &mut ModelState) {
        let n = self.input_rates.len();
        let t = self.t_start + tau * self.substep;
        let ratio = self.input_ratio.as_ref().map_or(1.0, |r| r(t));
        let x = y.rows(0, n);

        for j in 0..n {
            let u = self.input_rates[j] * ratio;
            let mut column_sum = 0.0;
            let mut dx = u - self.decay_rate * x[j];
            for i in 0..n {
                dx += self.rates[(j, i)] * x[i];
                column_sum += self.rates[(i, j)];
                let transfer = if i == j {
                    0.0
                } else {
                    self.rates[(i, j)] * x[j]
                };
                dy_dt[2 * n + i * n + j] = transfer * self.substep;
            }
            dy_dt[j] = dx * self.substep;
            dy_dt[n + j] = u * self.substep;
            dy_dt[2 * n + n * n + j] = -column_sum * x[j] * self.substep;
        }
    }
}
