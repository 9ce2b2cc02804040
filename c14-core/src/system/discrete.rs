//! Discrete model runs: $x_{k+1} = e^{-\lambda \Delta t_k} B_k x_k + u_k$.

use super::Solution;
use crate::errors::{C14Error, C14Result};
use crate::timeseries::{FloatValue, TimeAxis};
use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Array3};
use std::sync::Arc;

/// Slack allowed when a pool loses everything it held during a step.
pub const RETAINED_TOLERANCE: FloatValue = 1e-7;

#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteModelRun {
    times: Arc<TimeAxis>,
    start_values: DVector<FloatValue>,
    transport: Vec<DMatrix<FloatValue>>,
    inputs: Vec<DVector<FloatValue>>,
    decay_rate: FloatValue,
}

impl DiscreteModelRun {
    /// # Arguments
    ///
    /// * `transport` - one transfer matrix per step, without decay
    /// * `inputs` - amount entering each pool during each step
    /// * `decay_rate` - first order decay per day applied to every pool
    pub fn new(
        times: Arc<TimeAxis>,
        start_values: DVector<FloatValue>,
        transport: Vec<DMatrix<FloatValue>>,
        inputs: Vec<DVector<FloatValue>>,
        decay_rate: FloatValue,
    ) -> C14Result<Self> {
        let n = start_values.len();
        let nr_steps = times.nr_intervals();
        if transport.len() != nr_steps || inputs.len() != nr_steps {
            return Err(C14Error::InvalidArgument(format!(
                "{nr_steps} steps need as many matrices and input vectors, got {} and {}",
                transport.len(),
                inputs.len()
            )));
        }
        if transport.iter().any(|b| b.shape() != (n, n)) || inputs.iter().any(|u| u.len() != n) {
            return Err(C14Error::InvalidArgument(format!(
                "matrices must be {n}x{n} and input vectors of length {n}"
            )));
        }
        Ok(Self {
            times,
            start_values,
            transport,
            inputs,
            decay_rate,
        })
    }

    /// Reconstructs the transfer matrices that reproduce observed fluxes.
    ///
    /// The system is iterated from `start_values`, and each step's matrix is
    /// derived from the reconstructed (not the observed) stocks.
    ///
    /// # Arguments
    ///
    /// * `inputs` - `(nr_steps, nr_pools)` external input amounts
    /// * `transfers` - `(nr_steps, nr_pools, nr_pools)` amounts indexed `[k, to, from]`
    /// * `outputs` - `(nr_steps, nr_pools)` external output amounts
    pub fn from_fluxes(
        times: Arc<TimeAxis>,
        start_values: DVector<FloatValue>,
        inputs: &Array2<FloatValue>,
        transfers: &Array3<FloatValue>,
        outputs: &Array2<FloatValue>,
    ) -> C14Result<Self> {
        let n = start_values.len();
        let nr_steps = times.nr_intervals();
        if inputs.dim() != (nr_steps, n)
            || transfers.dim() != (nr_steps, n, n)
            || outputs.dim() != (nr_steps, n)
        {
            return Err(C14Error::InvalidArgument(
                "flux arrays do not match the time axis and pool count".into(),
            ));
        }

        let mut x = start_values.clone();
        let mut transport = Vec::with_capacity(nr_steps);
        let mut input_vectors = Vec::with_capacity(nr_steps);
        for k in 0..nr_steps {
            let f = DMatrix::from_fn(n, n, |i, j| if i == j { 0.0 } else { transfers[[k, i, j]] });
            let r = DVector::from_fn(n, |j, _| outputs[[k, j]]);
            let u = DVector::from_fn(n, |j, _| inputs[[k, j]]);
            let b = Self::reconstruct_b(&x, &f, &r)?;
            x = &b * &x + &u;
            transport.push(b);
            input_vectors.push(u);
        }
        debug!("reconstructed {nr_steps} discrete transfer matrices for {n} pools");

        Self::new(times, start_values, transport, input_vectors, 0.0)
    }

    /// The matrix `B` with `B x = x - r` and off-diagonal `B x = f`.
    ///
    /// Column `j` holds the fractions of pool `j` that move to each other
    /// pool. The diagonal is what stays. An empty pool keeps a unit diagonal
    /// and moves nothing.
    pub fn reconstruct_b(
        x: &DVector<FloatValue>,
        f: &DMatrix<FloatValue>,
        r: &DVector<FloatValue>,
    ) -> C14Result<DMatrix<FloatValue>> {
        let n = x.len();
        if f.iter().any(|&v| v < 0.0) || r.iter().any(|&v| v < 0.0) {
            return Err(C14Error::Reconstruction(format!(
                "Negative flux: internal {f}, external {r}"
            )));
        }

        let mut b = DMatrix::identity(n, n);
        for j in 0..n {
            if x[j] < 0.0 {
                return Err(C14Error::Reconstruction(format!(
                    "Reconstructed compartment content negative: x[{j}] = {}",
                    x[j]
                )));
            }
            if x[j] == 0.0 {
                continue;
            }

            let mut moved = 0.0;
            for i in (0..n).filter(|&i| i != j) {
                b[(i, j)] = f[(i, j)] / x[j];
                moved += f[(i, j)];
            }
            let retained = 1.0 - (moved + r[j]) / x[j];
            b[(j, j)] = if retained >= 0.0 || retained.is_nan() {
                retained
            } else if (x[j] - r[j] - moved).abs() < RETAINED_TOLERANCE {
                0.0
            } else {
                return Err(C14Error::Reconstruction(format!(
                    "Diagonal value negative for pool {j}: {retained} \
                     (content {}, outflux {})",
                    x[j],
                    moved + r[j]
                )));
            };
        }
        Ok(b)
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

    pub fn transport_matrices(&self) -> &[DMatrix<FloatValue>] {
        &self.transport
    }

    pub fn input_vectors(&self) -> &[DVector<FloatValue>] {
        &self.inputs
    }

    pub fn decay_rate(&self) -> FloatValue {
        self.decay_rate
    }

    /// Fraction surviving decay over step `k`.
    pub fn decay_factor(&self, k: usize) -> FloatValue {
        let dt = self.times.step_length(k).unwrap_or(0.0);
        (-self.decay_rate * dt).exp()
    }

    /// The full transfer matrix of step `k`, decay included.
    pub fn transfer_matrix(&self, k: usize) -> Option<DMatrix<FloatValue>> {
        self.transport.get(k).map(|b| b * self.decay_factor(k))
    }

    pub fn run(&self) -> Solution {
        let n = self.nr_pools();
        let mut solution = Solution::zeros(self.times.len(), n);
        let mut x = self.start_values.clone();
        solution
            .stocks
            .row_mut(0)
            .iter_mut()
            .zip(x.iter())
            .for_each(|(s, v)| *s = *v);

        for (k, (b, u)) in self.transport.iter().zip(&self.inputs).enumerate() {
            let d = self.decay_factor(k);
            for j in 0..n {
                let mut column_sum = b[(j, j)];
                for i in (0..n).filter(|&i| i != j) {
                    solution.transfers[[k, i, j]] = b[(i, j)] * d * x[j];
                    column_sum += b[(i, j)];
                }
                solution.outputs[[k, j]] = (1.0 - column_sum) * d * x[j];
                solution.inputs[[k, j]] = u[j];
            }
            x = b * &x * d + u;
            for j in 0..n {
                solution.stocks[[k + 1, j]] = x[j];
            }
        }
        solution
    }

    pub fn solve(&self) -> Array2<FloatValue> {
        self.run().stocks
    }

    pub fn to_tracer_only(
        &self,
        start_values: DVector<FloatValue>,
        inputs: Vec<DVector<FloatValue>>,
        decay_rate: FloatValue,
    ) -> C14Result<Self> {
        if start_values.len() != self.nr_pools() {
            return Err(C14Error::InvalidArgument(format!(
                "{} tracer start values for {} pools",
                start_values.len(),
                self.nr_pools()
            )));
        }
        Self::new(
            self.times.clone(),
            start_values,
            self.transport.clone(),
            inputs,
            decay_rate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};
    use ndarray::{array, Array};

    #[test]
    fn reconstruct_two_pools() {
        let x = dvector![10.0, 5.0];
        // 2 moves from pool 0 to pool 1, pool 1 loses 1 to the outside
        let f = dmatrix![0.0, 0.0; 2.0, 0.0];
        let r = dvector![0.0, 1.0];
        let b = DiscreteModelRun::reconstruct_b(&x, &f, &r).unwrap();
        assert_relative_eq!(b, dmatrix![0.8, 0.0; 0.2, 0.8]);
        assert_relative_eq!(&b * &x, dvector![8.0, 6.0]);
    }

    #[test]
    fn empty_pool_keeps_unit_diagonal() {
        let b = DiscreteModelRun::reconstruct_b(
            &dvector![0.0, 4.0],
            &dmatrix![0.0, 0.0; 1.0, 0.0],
            &dvector![3.0, 0.0],
        )
        .unwrap();
        assert_eq!(b, dmatrix![1.0, 0.0; 0.0, 1.0]);
    }

    #[test]
    fn pool_emptied_within_tolerance() {
        let b = DiscreteModelRun::reconstruct_b(
            &dvector![1.0],
            &dmatrix![0.0],
            &dvector![1.0 + 5e-8],
        )
        .unwrap();
        assert_eq!(b[(0, 0)], 0.0);
    }

    #[test]
    fn reconstruction_failures() {
        let negative_flux = DiscreteModelRun::reconstruct_b(
            &dvector![1.0, 1.0],
            &dmatrix![0.0, 0.0; -1.0, 0.0],
            &dvector![0.0, 0.0],
        );
        assert!(matches!(negative_flux, Err(C14Error::Reconstruction(_))));

        let negative_content = DiscreteModelRun::reconstruct_b(
            &dvector![-1.0],
            &dmatrix![0.0],
            &dvector![0.0],
        );
        assert!(negative_content.unwrap_err().to_string().contains("negative"));

        let overdrawn =
            DiscreteModelRun::reconstruct_b(&dvector![1.0], &dmatrix![0.0], &dvector![2.0]);
        assert!(matches!(overdrawn, Err(C14Error::Reconstruction(_))));
    }

    fn chain() -> DiscreteModelRun {
        // pool 0 -> pool 1 -> outside, constant fluxes
        let times = Arc::new(TimeAxis::regular(3, 1.0));
        let inputs = array![[1.0, 0.0], [1.0, 0.0]];
        let mut transfers = Array::zeros((2, 2, 2));
        transfers[[0, 1, 0]] = 1.0;
        transfers[[1, 1, 0]] = 1.0;
        let outputs = array![[0.0, 1.0], [0.0, 1.0]];
        DiscreteModelRun::from_fluxes(times, dvector![10.0, 10.0], &inputs, &transfers, &outputs)
            .unwrap()
    }

    #[test]
    fn run_reproduces_fluxes() {
        let run = chain();
        let solution = run.run();
        assert_eq!(solution.stocks.dim(), (3, 2));
        for &stock in solution.stocks.iter() {
            assert_relative_eq!(stock, 10.0);
        }
        assert_relative_eq!(solution.transfers[[1, 1, 0]], 1.0);
        assert_relative_eq!(solution.outputs[[0, 1]], 1.0);
        assert_relative_eq!(solution.outputs[[0, 0]], 0.0);
        assert_eq!(solution.inputs, array![[1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn decaying_tracer() {
        let run = chain();
        let tracer = run
            .to_tracer_only(dvector![1.0, 1.0], vec![dvector![0.0, 0.0]; 2], 0.1)
            .unwrap();
        let stocks = tracer.solve();
        let d = (-0.1f64).exp();
        assert_relative_eq!(stocks[[1, 0]], 0.9 * d);
        assert_relative_eq!(stocks[[1, 1]], (0.1 + 0.9) * d);
        // respiration excludes decay losses
        let solution = tracer.run();
        assert_relative_eq!(solution.outputs[[0, 1]], 0.1 * d);
        assert_relative_eq!(tracer.transfer_matrix(0).unwrap(), &run.transport_matrices()[0] * d);
    }

    #[test]
    fn tracer_size_mismatch() {
        let run = chain();
        assert!(run
            .to_tracer_only(dvector![1.0], vec![dvector![0.0]; 2], 0.1)
            .is_err());
        assert!(run
            .to_tracer_only(dvector![1.0, 1.0], vec![dvector![0.0, 0.0]; 1], 0.1)
            .is_err());
    }
}
