//! Side by side comparison of two Δ¹⁴C datasets, typically the discrete and
//! continuous results for the same input.

use crate::pipeline::{LOG, MAX_ABS_ERR, MAX_REL_ERR};
use c14_core::dataset::Dataset;
use c14_core::errors::{C14Error, C14Result};
use c14_core::timeseries::FloatValue;
use c14_core::utils::nan_max;
use log::debug;
use std::collections::BTreeMap;

/// Largest differences between the values of one variable in two datasets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariableDifference {
    /// Largest `|a - b|`, missing values ignored.
    pub max_abs_diff: FloatValue,
    /// Largest `|a - b| / |a|` in percent, missing values ignored.
    pub max_rel_diff: FloatValue,
}

/// Compares every numeric variable of `reference` with the same variable of
/// `other`, skipping [`LOG`], [`MAX_ABS_ERR`] and [`MAX_REL_ERR`].
///
/// Relative differences are taken against `reference`.
pub fn compare_datasets(
    reference: &Dataset,
    other: &Dataset,
) -> C14Result<BTreeMap<String, VariableDifference>> {
    let mut differences = BTreeMap::new();
    for (name, var) in reference.data_vars() {
        if [LOG, MAX_ABS_ERR, MAX_REL_ERR].contains(&name.as_str()) {
            continue;
        }
        let counterpart = other.require(name)?;
        if counterpart.shape() != var.shape() {
            return Err(C14Error::Dataset(format!(
                "variable '{name}' has shape {:?} and {:?}",
                var.shape(),
                counterpart.shape()
            )));
        }

        let abs_diff = (var.data() - counterpart.data()).mapv(FloatValue::abs);
        let rel_diff = &abs_diff / &var.data().mapv(FloatValue::abs) * 100.0;
        let difference = VariableDifference {
            max_abs_diff: nan_max(abs_diff.iter().copied()),
            max_rel_diff: nan_max(rel_diff.iter().copied().filter(|v| v.is_finite())),
        };
        debug!(
            "{name}: max abs diff {}, max rel diff {}%",
            difference.max_abs_diff, difference.max_rel_diff
        );
        differences.insert(name.clone(), difference);
    }
    Ok(differences)
}
