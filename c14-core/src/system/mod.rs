//! Linear compartmental systems reconstructed from observed stocks and fluxes.
//!
//! Two forms are available. [`DiscreteModelRun`] iterates
//! $x_{k+1} = B_k x_k + u_k$ with one transfer matrix per time step, and
//! [`ContinuousModelRun`] integrates $\dot{x} = B(t) x + u(t)$ with rates that
//! are constant over each step. Both can be turned into a tracer-only system
//! that shares the carbon transport but carries its own inputs and decay.

pub mod continuous;
pub mod discrete;

pub use continuous::ContinuousModelRun;
pub use discrete::DiscreteModelRun;

use crate::errors::{C14Error, C14Result};
use crate::timeseries::{FloatValue, Time, TimeAxis};
use nalgebra::DVector;
use ndarray::{Array2, Array3};
use std::sync::Arc;

/// Tracer to carbon ratio of external inputs as a function of time in days.
pub type RatioFunction = Arc<dyn Fn(Time) -> FloatValue + Send + Sync>;

/// Stocks at every time point and the amounts moved during every step.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// `(nr_times, nr_pools)`
    pub stocks: Array2<FloatValue>,
    /// `(nr_times - 1, nr_pools)`, amount entering each pool during step `k`
    pub inputs: Array2<FloatValue>,
    /// `(nr_times - 1, nr_pools, nr_pools)` indexed `[k, to, from]`
    pub transfers: Array3<FloatValue>,
    /// `(nr_times - 1, nr_pools)`, amount leaving each pool to the outside
    pub outputs: Array2<FloatValue>,
}

impl Solution {
    pub fn zeros(nr_times: usize, nr_pools: usize) -> Self {
        let nr_steps = nr_times.saturating_sub(1);
        Self {
            stocks: Array2::zeros((nr_times, nr_pools)),
            inputs: Array2::zeros((nr_steps, nr_pools)),
            transfers: Array3::zeros((nr_steps, nr_pools, nr_pools)),
            outputs: Array2::zeros((nr_steps, nr_pools)),
        }
    }

    pub fn nr_times(&self) -> usize {
        self.stocks.nrows()
    }

    pub fn nr_pools(&self) -> usize {
        self.stocks.ncols()
    }
}

/// How tracer inputs are given when deriving a tracer-only system.
#[derive(Clone)]
pub enum TracerForcing {
    /// One input vector per time step, for the discrete form.
    Series(Vec<DVector<FloatValue>>),
    /// A ratio applied to the carbon input rates, for the continuous form.
    Ratio(RatioFunction),
}

#[derive(Debug, Clone)]
pub enum LinearSystem {
    Discrete(DiscreteModelRun),
    Continuous(ContinuousModelRun),
}

impl LinearSystem {
    pub fn kind(&self) -> &'static str {
        match self {
            LinearSystem::Discrete(_) => "discrete",
            LinearSystem::Continuous(_) => "continuous",
        }
    }

    pub fn times(&self) -> &Arc<TimeAxis> {
        match self {
            LinearSystem::Discrete(run) => run.times(),
            LinearSystem::Continuous(run) => run.times(),
        }
    }

    pub fn nr_pools(&self) -> usize {
        match self {
            LinearSystem::Discrete(run) => run.nr_pools(),
            LinearSystem::Continuous(run) => run.nr_pools(),
        }
    }

    pub fn start_values(&self) -> &DVector<FloatValue> {
        match self {
            LinearSystem::Discrete(run) => run.start_values(),
            LinearSystem::Continuous(run) => run.start_values(),
        }
    }

    pub fn run(&self) -> C14Result<Solution> {
        match self {
            LinearSystem::Discrete(run) => Ok(run.run()),
            LinearSystem::Continuous(run) => run.run(),
        }
    }

    /// Stocks at every time point.
    pub fn solve(&self) -> C14Result<Array2<FloatValue>> {
        Ok(self.run()?.stocks)
    }

    /// A system with the same transport but new start values, inputs and decay.
    ///
    /// The discrete form takes [`TracerForcing::Series`] and the continuous
    /// form [`TracerForcing::Ratio`]; any other pairing is rejected.
    pub fn to_tracer_only(
        &self,
        start_values: DVector<FloatValue>,
        forcing: TracerForcing,
        decay_rate: FloatValue,
    ) -> C14Result<LinearSystem> {
        match (self, forcing) {
            (LinearSystem::Discrete(run), TracerForcing::Series(inputs)) => Ok(
                LinearSystem::Discrete(run.to_tracer_only(start_values, inputs, decay_rate)?),
            ),
            (LinearSystem::Continuous(run), TracerForcing::Ratio(ratio)) => Ok(
                LinearSystem::Continuous(run.to_tracer_only(start_values, ratio, decay_rate)?),
            ),
            (system, _) => Err(C14Error::InvalidArgument(format!(
                "tracer forcing does not match a {} system",
                system.kind()
            ))),
        }
    }
}
