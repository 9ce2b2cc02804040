//! Δ¹⁴C for every batch cell of a CARDAMOM dataset.
//!
//! Each cell is reconstructed, paired with its tracer companion and solved
//! independently. Cells whose reconstruction or tracer equilibrium fails
//! are reported with missing values and the failure message in `log`
//! rather than failing the whole run.

use crate::config::Delta14CConfig;
use crate::diagnostic::{variable_slots, Delta14CDiagnostic, VariableSlot};
use crate::forcing::AtmosphericForcing;
use crate::tracer::build_tracer_system;
use c14_core::adapter::ModelData;
use c14_core::dataset::{BatchLayout, Dataset, TIME_DIM, UNITS_ATTR};
use c14_core::errors::{C14Error, C14Result};
use c14_core::structure::ModelStructure;
use c14_core::timeseries::FloatValue;
use log::{info, warn};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const MAX_ABS_ERR: &str = "max_abs_err";
pub const MAX_REL_ERR: &str = "max_rel_err";
pub const LOG: &str = "log";
pub const LONG_NAME_ATTR: &str = "long_name";
pub const DELTA_UNITS: &str = "permille";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Discrete,
    Continuous,
}

impl FromStr for Method {
    type Err = C14Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discrete" => Ok(Method::Discrete),
            "continuous" => Ok(Method::Continuous),
            other => Err(C14Error::InvalidArgument(format!(
                "method must be either 'discrete' or 'continuous', got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Discrete => write!(f, "discrete"),
            Method::Continuous => write!(f, "continuous"),
        }
    }
}

fn present_slots(structure: &ModelStructure, dataset: &Dataset) -> Vec<(String, VariableSlot)> {
    variable_slots(structure)
        .into_iter()
        .filter(|(name, _)| dataset.contains(name))
        .collect()
}

fn compute(
    slice: &Dataset,
    method: Method,
    structure: &ModelStructure,
    slots: &[(String, VariableSlot)],
    forcing: &AtmosphericForcing,
    config: &Delta14CConfig,
) -> C14Result<Delta14CDiagnostic> {
    let mdo = ModelData::new(structure, slice, &config.stock_unit, config.days_per_step)?;
    let reconstruction = match method {
        Method::Discrete => mdo.create_discrete_model_run()?,
        Method::Continuous => mdo.create_continuous_model_run(config.solver.substeps)?,
    };
    let tracer = build_tracer_system(&reconstruction.system, forcing, config)?;

    let carbon_solution = reconstruction.system.run()?;
    let tracer_solution = tracer.run()?;
    Ok(Delta14CDiagnostic::from_solutions(
        slots,
        &carbon_solution,
        &tracer_solution,
        &mdo.time_axis(),
        config.alpha,
        reconstruction.max_abs_err(),
        reconstruction.max_rel_err(),
    ))
}

/// Δ¹⁴C of one time-only dataset.
///
/// Output series are produced for every stock and flux variable of
/// `structure` present in `slice`.
///
/// # Errors
///
/// Reconstruction and equilibrium failures are not returned as errors but
/// as a [`Delta14CDiagnostic`] with missing values and a non-empty `log`.
/// Everything else, such as a missing stock variable or an unknown unit,
/// is returned.
pub fn delta_14c_for_slice(
    slice: &Dataset,
    method: Method,
    structure: &ModelStructure,
    forcing: &AtmosphericForcing,
    config: &Delta14CConfig,
) -> C14Result<Delta14CDiagnostic> {
    let slots = present_slots(structure, slice);
    match compute(slice, method, structure, &slots, forcing, config) {
        Ok(diagnostic) => Ok(diagnostic),
        Err(e) if e.is_recoverable() => {
            warn!("{method} Δ14C failed, reporting missing values: {e}");
            let nr_times = slice.dim_size(TIME_DIM).unwrap_or(0);
            Ok(Delta14CDiagnostic::failed(
                slots.iter().map(|(name, _)| name.as_str()),
                nr_times,
                &e.to_string(),
            ))
        }
        Err(e) => Err(e),
    }
}

/// Δ¹⁴C of every stock and flux of a batched CARDAMOM dataset.
///
/// Every structure variable must have the dimensions `(batch..., time)`.
/// The result keeps the input's coordinates and attributes and holds one
/// Δ¹⁴C series per variable present in the input, [`MAX_ABS_ERR`] and
/// [`MAX_REL_ERR`] over the batch dimensions, and the text variable [`LOG`].
///
/// # Arguments
///
/// * `method` - either `"discrete"` or `"continuous"`
///
/// # Errors
///
/// [`C14Error::InvalidArgument`] for any other method, before anything is
/// read. When a batch dimension is empty, the empty result is returned
/// without loading the atmospheric record.
pub fn load_delta_14c_dataset(
    ds: &Dataset,
    method: &str,
    structure: &ModelStructure,
    config: &Delta14CConfig,
) -> C14Result<Dataset> {
    let method: Method = method.parse()?;
    let names = structure.variables();
    let layout = BatchLayout::from_variables(ds, &names)?;
    let slots = present_slots(structure, ds);

    if layout.is_empty() {
        info!("empty batch {:?}, nothing to compute", layout.shape());
        return assemble_output(ds, &layout, &slots, Vec::new(), config);
    }

    let forcing = AtmosphericForcing::from_config(config)?;
    info!(
        "computing {method} Δ14C for {} batch cells of {} time points",
        layout.len(),
        layout.time_len()
    );

    let mut diagnostics = Vec::with_capacity(layout.len());
    for cell in 0..layout.len() {
        let slice = layout.slice(ds, cell, &names)?;
        diagnostics.push(delta_14c_for_slice(
            &slice, method, structure, &forcing, config,
        )?);
    }
    let failures = diagnostics.iter().filter(|d| d.is_failure()).count();
    if failures > 0 {
        warn!("{failures} of {} batch cells failed", diagnostics.len());
    }

    assemble_output(ds, &layout, &slots, diagnostics, config)
}

fn assemble_output(
    ds: &Dataset,
    layout: &BatchLayout,
    slots: &[(String, VariableSlot)],
    diagnostics: Vec<Delta14CDiagnostic>,
    config: &Delta14CConfig,
) -> C14Result<Dataset> {
    let mut output = Dataset::new();
    for (name, values) in ds.coords() {
        output.insert_coord(name, values.clone())?;
    }
    for (key, value) in ds.attrs() {
        output.set_attr(key, value);
    }

    let time_len = layout.time_len();
    for (name, _) in slots {
        let series = diagnostics
            .iter()
            .map(|d| {
                d.series
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| Array1::from_elem(time_len, FloatValue::NAN))
            })
            .collect();
        let mut var = layout.assemble_series(series, time_len)?;
        if let Some(input) = ds.get(name) {
            for (key, value) in input.attrs() {
                var.set_attr(key, value);
            }
        }
        var.set_attr(UNITS_ATTR, DELTA_UNITS);
        output.insert(name, var)?;
    }

    let max_abs_err = layout
        .assemble(diagnostics.iter().map(|d| d.max_abs_err).collect())?
        .with_attr(UNITS_ATTR, &config.stock_unit)
        .with_attr(
            LONG_NAME_ATTR,
            "max. abs. error on reconstructed stock sizes",
        );
    output.insert(MAX_ABS_ERR, max_abs_err)?;

    let max_rel_err = layout
        .assemble(diagnostics.iter().map(|d| d.max_rel_err).collect())?
        .with_attr(UNITS_ATTR, "%")
        .with_attr(
            LONG_NAME_ATTR,
            "max. rel. error on reconstructed stock sizes",
        );
    output.insert(MAX_REL_ERR, max_rel_err)?;

    let log = layout.assemble(diagnostics.into_iter().map(|d| d.log).collect())?;
    output.insert_text(LOG, log)?;
    Ok(output)
}
