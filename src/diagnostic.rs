//! Δ¹⁴C of paired ¹²C and ¹⁴C solutions.

use c14_core::structure::ModelStructure;
use c14_core::system::Solution;
use c14_core::timeseries::{FloatValue, TimeAxis};
use c14_core::utils::nan_max;
use ndarray::{s, Array1, Array2, Array3, ArrayView1};
use std::collections::BTreeMap;

/// Per-mille deviation of the ¹⁴C/¹²C ratio from the standard `alpha`:
///
/// $$ \Delta^{14}C = \left(\frac{C_{14}}{C_{12}\,\alpha} - 1\right) \cdot 1000 $$
///
/// Missing when `c12` is zero or missing.
pub fn delta_14c(c12: FloatValue, c14: FloatValue, alpha: FloatValue) -> FloatValue {
    if c12 == 0.0 {
        return FloatValue::NAN;
    }
    (c14 / c12 / alpha - 1.0) * 1000.0
}

pub fn delta_14c_series(
    c12: ArrayView1<FloatValue>,
    c14: ArrayView1<FloatValue>,
    alpha: FloatValue,
) -> Array1<FloatValue> {
    ndarray::Zip::from(&c12)
        .and(&c14)
        .map_collect(|&a, &b| delta_14c(a, b, alpha))
}

/// Fluxes of a solution as daily rates aligned with the time points.
///
/// Row `k + 1` holds the rate over the step ending at time point `k + 1`.
/// Row 0 has no preceding step and is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedFluxes {
    /// `(nr_times, nr_pools)`
    pub inputs: Array2<FloatValue>,
    /// `(nr_times, nr_pools, nr_pools)` indexed `[k, to, from]`
    pub transfers: Array3<FloatValue>,
    /// `(nr_times, nr_pools)`
    pub outputs: Array2<FloatValue>,
}

impl RealizedFluxes {
    pub fn from_solution(solution: &Solution, times: &TimeAxis) -> Self {
        let (nr_times, n) = (solution.nr_times(), solution.nr_pools());
        let step_lengths = Array1::from_vec(times.step_lengths());
        let per_day = step_lengths.mapv(|dt| 1.0 / dt);

        let mut inputs = Array2::from_elem((nr_times, n), FloatValue::NAN);
        let mut transfers = Array3::from_elem((nr_times, n, n), FloatValue::NAN);
        let mut outputs = Array2::from_elem((nr_times, n), FloatValue::NAN);
        for (k, &rate) in per_day.iter().enumerate() {
            inputs
                .row_mut(k + 1)
                .assign(&(&solution.inputs.row(k) * rate));
            transfers
                .slice_mut(s![k + 1, .., ..])
                .assign(&(&solution.transfers.slice(s![k, .., ..]) * rate));
            outputs
                .row_mut(k + 1)
                .assign(&(&solution.outputs.row(k) * rate));
        }
        Self {
            inputs,
            transfers,
            outputs,
        }
    }
}

/// Where the values of an output variable are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableSlot {
    Stock(usize),
    Input(usize),
    Transfer { from: usize, to: usize },
    Output(usize),
}

/// Every stock and flux variable of the structure with its slot, stocks first.
pub fn variable_slots(structure: &ModelStructure) -> Vec<(String, VariableSlot)> {
    let mut slots = Vec::new();
    for (j, pool) in structure.pools().enumerate() {
        slots.push((pool.stock_var.clone(), VariableSlot::Stock(j)));
    }
    for j in 0..structure.nr_pools() {
        for name in structure.external_input_fluxes(j) {
            slots.push((name.clone(), VariableSlot::Input(j)));
        }
    }
    for transfer in structure.transfers() {
        for name in transfer.fluxes {
            slots.push((
                name.clone(),
                VariableSlot::Transfer {
                    from: transfer.from,
                    to: transfer.to,
                },
            ));
        }
    }
    for j in 0..structure.nr_pools() {
        for name in structure.external_output_fluxes(j) {
            slots.push((name.clone(), VariableSlot::Output(j)));
        }
    }
    slots
}

/// Δ¹⁴C of one batch cell together with the reconstruction errors.
///
/// `log` is empty on success and holds the failure message otherwise, in
/// which case every value is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta14CDiagnostic {
    pub series: BTreeMap<String, Array1<FloatValue>>,
    pub max_abs_err: FloatValue,
    pub max_rel_err: FloatValue,
    pub log: String,
}

impl Delta14CDiagnostic {
    pub fn from_solutions(
        slots: &[(String, VariableSlot)],
        carbon: &Solution,
        tracer: &Solution,
        times: &TimeAxis,
        alpha: FloatValue,
        max_abs_err: FloatValue,
        max_rel_err: FloatValue,
    ) -> Self {
        let c12 = RealizedFluxes::from_solution(carbon, times);
        let c14 = RealizedFluxes::from_solution(tracer, times);

        let series = slots
            .iter()
            .map(|(name, slot)| {
                let (a, b) = match *slot {
                    VariableSlot::Stock(j) => (carbon.stocks.column(j), tracer.stocks.column(j)),
                    VariableSlot::Input(j) => (c12.inputs.column(j), c14.inputs.column(j)),
                    VariableSlot::Transfer { from, to } => (
                        c12.transfers.slice(s![.., to, from]),
                        c14.transfers.slice(s![.., to, from]),
                    ),
                    VariableSlot::Output(j) => (c12.outputs.column(j), c14.outputs.column(j)),
                };
                (name.clone(), delta_14c_series(a, b, alpha))
            })
            .collect();

        Self {
            series,
            max_abs_err,
            max_rel_err,
            log: String::new(),
        }
    }

    /// The result of a failed cell: all values missing, `log` set to `message`.
    pub fn failed<'a, I>(names: I, nr_times: usize, message: &str) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            series: names
                .into_iter()
                .map(|name| (name.to_string(), Array1::from_elem(nr_times, FloatValue::NAN)))
                .collect(),
            max_abs_err: FloatValue::NAN,
            max_rel_err: FloatValue::NAN,
            log: message.to_string(),
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.log.is_empty()
    }

    /// Largest absolute Δ¹⁴C over every series, ignoring missing values.
    pub fn max_abs_delta(&self) -> FloatValue {
        nan_max(self.series.values().flat_map(|s| s.iter().map(|v| v.abs())))
    }
}
