use crate::errors::{C14Error, C14Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

pub type Time = f64;
pub type FloatValue = f64;

/// Strictly increasing time points, in days since the start of a run.
///
/// Observations are attached to the points. Fluxes describe the interval
/// between a point and the one after it, so `len()` points bound
/// `len() - 1` intervals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeAxis {
    values: Vec<Time>,
}

impl TimeAxis {
    pub fn from_values(values: Vec<Time>) -> C14Result<Self> {
        if values.iter().any(|t| !t.is_finite()) {
            return Err(C14Error::Dataset("time values must be finite".into()));
        }
        if values.windows(2).any(|w| w[1] <= w[0]) {
            return Err(C14Error::Dataset(
                "time values must be strictly increasing".into(),
            ));
        }
        Ok(Self { values })
    }

    /// `len` points starting at zero, `step` apart.
    pub fn regular(len: usize, step: Time) -> Self {
        Self {
            values: (0..len).map(|i| i as Time * step).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Time] {
        &self.values
    }

    pub fn to_array(&self) -> Array1<Time> {
        Array1::from_vec(self.values.clone())
    }

    pub fn at(&self, index: usize) -> Option<Time> {
        self.values.get(index).copied()
    }

    pub fn first(&self) -> Option<Time> {
        self.at(0)
    }

    pub fn last(&self) -> Option<Time> {
        self.values.last().copied()
    }

    pub fn nr_intervals(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// The `[start, end)` bounds of interval `index`.
    pub fn interval(&self, index: usize) -> Option<(Time, Time)> {
        Some((self.at(index)?, self.at(index + 1)?))
    }

    pub fn step_length(&self, index: usize) -> Option<Time> {
        self.interval(index).map(|(start, end)| end - start)
    }

    pub fn step_lengths(&self) -> Vec<Time> {
        (0..self.nr_intervals())
            .filter_map(|i| self.step_length(i))
            .collect()
    }
}
