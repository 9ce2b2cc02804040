//! Synthetic CARDAMOM datasets for tests and examples.
//!
//! Each pool loses its content with a fixed turnover time, NPP feeds the
//! four vegetation pools and Litter splits between Soil and heterotrophic
//! respiration. With constant NPP the stocks are at steady state.

use crate::config::Delta14CConfig;
use c14_core::dataset::{DataArray, Dataset, TIME_DIM};
use c14_core::errors::{C14Error, C14Result};
use c14_core::timeseries::FloatValue;
use c14_core::units::DAYS_PER_MONTH;
use ndarray::{Array1, Ix1, IxDyn};
use std::collections::BTreeMap;
use std::f64::consts::PI;

pub const STOCK_UNIT: &str = "gC/m2";
pub const FLUX_UNIT: &str = "gC/m2/day";

/// Turnover times in days, in pool order.
pub const TURNOVER_DAYS: [FloatValue; 6] = [60.0, 200.0, 300.0, 3000.0, 400.0, 5000.0];

/// NPP per day into Labile, Leaf, Root and Wood.
pub const NPP: [FloatValue; 4] = [1.0, 1.0, 1.5, 1.0];

/// Share of Litter turnover that goes to Soil.
pub const LITTER_TO_SOIL_SHARE: FloatValue = 1.0 / 3.5;

/// Steady state stocks for [`NPP`] and [`TURNOVER_DAYS`].
pub const STEADY_STOCKS: [FloatValue; 6] = [60.0, 400.0, 450.0, 3000.0, 1400.0, 10000.0];

const POOLS: [&str; 6] = ["Labile", "Leaf", "Root", "Wood", "Litter", "Soil"];
const NPP_VARS: [&str; 4] = ["NPP_to_Labile", "NPP_to_Leaf", "NPP_to_Root", "NPP_to_Wood"];

/// Daily flux rates implied by the stocks and NPP.
fn fluxes(stocks: &[FloatValue; 6], npp: &[FloatValue; 4]) -> BTreeMap<&'static str, FloatValue> {
    let loss = |j: usize| stocks[j] / TURNOVER_DAYS[j];
    let mut fluxes: BTreeMap<_, _> = NPP_VARS.iter().copied().zip(npp.iter().copied()).collect();
    fluxes.insert("Labile_to_Leaf", loss(0));
    fluxes.insert("Leaf_to_Litter", loss(1));
    fluxes.insert("Root_to_Litter", loss(2));
    fluxes.insert("Wood_to_Soil", loss(3));
    fluxes.insert("Litter_to_Soil", loss(4) * LITTER_TO_SOIL_SHARE);
    fluxes.insert("Litter_to_RH", loss(4) * (1.0 - LITTER_TO_SOIL_SHARE));
    fluxes.insert("Soil_to_RH", loss(5));
    fluxes
}

/// Every stock and daily flux of the steady state.
pub fn steady_state_values() -> BTreeMap<&'static str, FloatValue> {
    let mut values = fluxes(&STEADY_STOCKS, &NPP);
    values.extend(POOLS.iter().copied().zip(STEADY_STOCKS));
    values
}

fn is_stock(name: &str) -> bool {
    POOLS.contains(&name)
}

/// Monthly time points in days, starting at zero.
pub fn monthly_times(nr_times: usize) -> Array1<FloatValue> {
    Array1::from_iter((0..nr_times).map(|k| k as FloatValue * DAYS_PER_MONTH))
}

/// A single-cell dataset holding every value constant over `nr_times` months.
pub fn constant_dataset(
    values: &BTreeMap<&str, FloatValue>,
    nr_times: usize,
) -> C14Result<Dataset> {
    let series = values
        .iter()
        .map(|(&name, &value)| (name, Array1::from_elem(nr_times, value)))
        .collect();
    dataset_from_series(series, nr_times)
}

fn dataset_from_series(
    series: BTreeMap<&str, Array1<FloatValue>>,
    nr_times: usize,
) -> C14Result<Dataset> {
    let mut ds = Dataset::new();
    ds.set_attr("title", "synthetic CARDAMOM output");
    ds.insert_coord(TIME_DIM, monthly_times(nr_times))?;
    for (name, values) in series {
        let unit = if is_stock(name) { STOCK_UNIT } else { FLUX_UNIT };
        ds.insert(name, DataArray::time_series(values).with_unit(unit))?;
    }
    Ok(ds)
}

/// The steady state over `nr_times` months.
pub fn steady_state_dataset(nr_times: usize) -> C14Result<Dataset> {
    constant_dataset(&steady_state_values(), nr_times)
}

/// Seasonal NPP with an amplitude of half its mean.
///
/// Stocks follow from monthly steps of the turnover dynamics starting at
/// the steady state, so stocks and fluxes are mutually consistent. Fluxes
/// at time point `k` hold over the month that starts there.
pub fn seasonal_dataset(nr_times: usize) -> C14Result<Dataset> {
    let mut stocks = STEADY_STOCKS;
    let mut series: BTreeMap<&str, Vec<FloatValue>> = BTreeMap::new();

    for k in 0..nr_times {
        let season = 1.0 + 0.5 * (2.0 * PI * k as FloatValue / 12.0).sin();
        let npp = NPP.map(|v| v * season);
        let rates = fluxes(&stocks, &npp);

        for (name, &stock) in POOLS.iter().zip(&stocks) {
            series.entry(*name).or_default().push(stock);
        }
        for (&name, &rate) in &rates {
            series.entry(name).or_default().push(rate);
        }

        let gain = |names: &[&str]| names.iter().map(|n| rates[n]).sum::<FloatValue>();
        let inflow = [
            gain(&["NPP_to_Labile"]),
            gain(&["NPP_to_Leaf", "Labile_to_Leaf"]),
            gain(&["NPP_to_Root"]),
            gain(&["NPP_to_Wood"]),
            gain(&["Leaf_to_Litter", "Root_to_Litter"]),
            gain(&["Wood_to_Soil", "Litter_to_Soil"]),
        ];
        for (j, stock) in stocks.iter_mut().enumerate() {
            *stock += (inflow[j] - *stock / TURNOVER_DAYS[j]) * DAYS_PER_MONTH;
        }
    }

    let series = series
        .into_iter()
        .map(|(name, values)| (name, Array1::from_vec(values)))
        .collect();
    dataset_from_series(series, nr_times)
}

/// Repeats every variable of a single-cell dataset over `(ens, lat)`.
pub fn batched(ds: &Dataset, nr_ens: usize, nr_lat: usize) -> C14Result<Dataset> {
    let mut out = Dataset::new();
    for (key, value) in ds.attrs() {
        out.set_attr(key, value);
    }
    for (name, values) in ds.coords() {
        out.insert_coord(name, values.clone())?;
    }
    out.insert_coord("ens", Array1::from_iter((0..nr_ens).map(|i| i as FloatValue)))?;
    out.insert_coord("lat", Array1::from_iter((0..nr_lat).map(|i| i as FloatValue)))?;

    for (name, var) in ds.data_vars() {
        let series = var.data();
        let nr_times = series.len();
        let data = series
            .broadcast(IxDyn(&[nr_ens, nr_lat, nr_times]))
            .ok_or_else(|| {
                C14Error::Dataset(format!("variable '{name}' is not a single time series"))
            })?
            .to_owned();
        let mut batched = DataArray::new(["ens", "lat", TIME_DIM].as_slice(), data)?;
        for (key, value) in var.attrs() {
            batched.set_attr(key, value);
        }
        out.insert(name, batched)?;
    }
    Ok(out)
}

/// Replaces a variable of a single-cell dataset, keeping its attributes.
pub fn with_series(ds: &Dataset, name: &str, values: Array1<FloatValue>) -> C14Result<Dataset> {
    let mut out = ds.clone();
    let mut var = DataArray::time_series(values);
    if let Some(existing) = ds.get(name) {
        for (key, value) in existing.attrs() {
            var.set_attr(key, value);
        }
    }
    out.insert(name, var)?;
    Ok(out)
}

/// Default configuration with an atmosphere fixed at `delta` permille.
pub fn constant_atmosphere_config(delta: FloatValue) -> Delta14CConfig {
    Delta14CConfig::with_atmosphere_points(vec![(1900.0, delta), (2100.0, delta)])
}

/// Sum over all stocks at each time point.
pub fn total_stock(ds: &Dataset) -> Option<Array1<FloatValue>> {
    let mut total: Option<Array1<FloatValue>> = None;
    for pool in POOLS {
        let series = ds.get(pool)?.data().clone().into_dimensionality::<Ix1>().ok()?;
        total = Some(match total {
            Some(t) => t + &series,
            None => series,
        });
    }
    total
}
