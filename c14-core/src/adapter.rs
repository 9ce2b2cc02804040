//! Maps a single-cell dataset through a [`ModelStructure`] into stock and
//! flux-amount tensors, and reconstructs linear systems from them.
//!
//! Flux variables are rates. The value at time index `k` is taken to hold
//! over `[t_k, t_{k+1})`, so the last time point's fluxes are not used. A
//! rate is converted to the stock unit per day and multiplied by the step
//! length to give an amount per step.

use crate::dataset::{DataArray, Dataset, TIME_DIM};
use crate::errors::{C14Error, C14Result};
use crate::structure::ModelStructure;
use crate::system::{ContinuousModelRun, DiscreteModelRun, LinearSystem};
use crate::timeseries::{FloatValue, Time, TimeAxis};
use crate::units::Unit;
use crate::utils::nan_max;
use log::debug;
use nalgebra::DVector;
use ndarray::{s, Array1, Array2, Array3, ArrayView1, Ix1};
use std::sync::Arc;

/// A reconstructed system and how far its stocks drift from the observed ones.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub system: LinearSystem,
    /// `(nr_times, nr_pools)` absolute stock error, in the stock unit
    pub abs_err: Array2<FloatValue>,
    /// `(nr_times, nr_pools)` relative stock error, in percent
    pub rel_err: Array2<FloatValue>,
}

impl Reconstruction {
    pub fn new(system: LinearSystem, observed: &Array2<FloatValue>) -> C14Result<Self> {
        let modelled = system.solve()?;
        if modelled.dim() != observed.dim() {
            return Err(C14Error::InvalidArgument(format!(
                "modelled stocks have shape {:?}, observed {:?}",
                modelled.dim(),
                observed.dim()
            )));
        }
        let abs_err = (&modelled - observed).mapv(FloatValue::abs);
        let rel_err = &abs_err / observed * 100.0;
        Ok(Self {
            system,
            abs_err,
            rel_err,
        })
    }

    /// Largest absolute stock error, ignoring missing values.
    pub fn max_abs_err(&self) -> FloatValue {
        nan_max(self.abs_err.iter().copied())
    }

    /// Largest relative stock error in percent, ignoring missing values.
    pub fn max_rel_err(&self) -> FloatValue {
        nan_max(self.rel_err.iter().copied())
    }
}

pub struct ModelData<'a> {
    structure: &'a ModelStructure,
    dataset: &'a Dataset,
    stock_unit: Unit,
    rate_unit: Unit,
    time_axis: Arc<TimeAxis>,
}

impl<'a> ModelData<'a> {
    /// # Arguments
    ///
    /// * `dataset` - variables with the single dimension `time`
    /// * `stock_unit` - unit every stock is converted to, e.g. `gC/m2`
    /// * `days_per_step` - spacing of the time points in days
    pub fn new(
        structure: &'a ModelStructure,
        dataset: &'a Dataset,
        stock_unit: &str,
        days_per_step: Time,
    ) -> C14Result<Self> {
        let stock_unit = parse_unit("stock unit", stock_unit)?;
        let day = parse_unit("day", "day")?;
        let rate_unit = stock_unit.per(&day);

        let nr_times = dataset
            .dim_size(TIME_DIM)
            .ok_or_else(|| C14Error::Dataset(format!("no '{TIME_DIM}' dimension")))?;
        if nr_times < 2 {
            return Err(C14Error::Dataset(format!(
                "at least two time points are needed, found {nr_times}"
            )));
        }
        if !(days_per_step > 0.0) {
            return Err(C14Error::InvalidArgument(format!(
                "step length must be positive, got {days_per_step}"
            )));
        }

        Ok(Self {
            structure,
            dataset,
            stock_unit,
            rate_unit,
            time_axis: Arc::new(TimeAxis::regular(nr_times, days_per_step)),
        })
    }

    pub fn time_axis(&self) -> Arc<TimeAxis> {
        self.time_axis.clone()
    }

    pub fn stock_unit(&self) -> &Unit {
        &self.stock_unit
    }

    pub fn nr_pools(&self) -> usize {
        self.structure.nr_pools()
    }

    fn series(&self, name: &str) -> C14Result<Option<(ArrayView1<'a, FloatValue>, &'a DataArray)>> {
        let Some(var) = self.dataset.get(name) else {
            return Ok(None);
        };
        if var.dims() != [TIME_DIM] {
            return Err(C14Error::Dataset(format!(
                "variable '{name}' must have the single dimension '{TIME_DIM}', found {:?}",
                var.dims()
            )));
        }
        let view = var
            .data()
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|e| C14Error::Dataset(format!("variable '{name}': {e}")))?;
        Ok(Some((view, var)))
    }

    fn conversion_to(&self, name: &str, var: &DataArray, target: &Unit) -> C14Result<FloatValue> {
        let unit = var.unit().ok_or_else(|| C14Error::UnitError {
            variable: name.to_string(),
            unit: String::new(),
            details: "missing 'units' attribute".into(),
        })?;
        parse_unit(name, unit)?
            .conversion_factor(target)
            .map_err(|e| C14Error::UnitError {
                variable: name.to_string(),
                unit: unit.to_string(),
                details: e.to_string(),
            })
    }

    /// `(nr_times, nr_pools)` stocks in the stock unit.
    pub fn stocks(&self) -> C14Result<Array2<FloatValue>> {
        let mut stocks = Array2::zeros((self.time_axis.len(), self.nr_pools()));
        for (j, pool) in self.structure.pools().enumerate() {
            let (values, var) = self
                .series(&pool.stock_var)?
                .ok_or_else(|| C14Error::MissingVariable(pool.stock_var.clone()))?;
            let factor = self.conversion_to(&pool.stock_var, var, &self.stock_unit)?;
            stocks.column_mut(j).assign(&values.mapv(|v| v * factor));
        }
        Ok(stocks)
    }

    /// Summed amounts per step of the given flux variables. Absent variables count as zero.
    fn flux_amounts(&self, names: &[String]) -> C14Result<Array1<FloatValue>> {
        let nr_steps = self.time_axis.nr_intervals();
        let step_lengths = Array1::from_vec(self.time_axis.step_lengths());
        let mut total = Array1::zeros(nr_steps);
        for name in names {
            let Some((values, var)) = self.series(name)? else {
                continue;
            };
            let factor = self.conversion_to(name, var, &self.rate_unit)?;
            total += &(&values.slice(s![..nr_steps]) * factor * &step_lengths);
        }
        Ok(total)
    }

    /// `(nr_steps, nr_pools)` external input amounts.
    pub fn external_input_amounts(&self) -> C14Result<Array2<FloatValue>> {
        let mut amounts = Array2::zeros((self.time_axis.nr_intervals(), self.nr_pools()));
        for j in 0..self.nr_pools() {
            let column = self.flux_amounts(self.structure.external_input_fluxes(j))?;
            amounts.column_mut(j).assign(&column);
        }
        Ok(amounts)
    }

    /// `(nr_steps, nr_pools, nr_pools)` internal flux amounts indexed `[k, to, from]`.
    pub fn internal_flux_amounts(&self) -> C14Result<Array3<FloatValue>> {
        let n = self.nr_pools();
        let mut amounts = Array3::zeros((self.time_axis.nr_intervals(), n, n));
        for transfer in self.structure.transfers() {
            let series = self.flux_amounts(transfer.fluxes)?;
            amounts
                .slice_mut(s![.., transfer.to, transfer.from])
                .assign(&series);
        }
        Ok(amounts)
    }

    /// `(nr_steps, nr_pools)` external output amounts.
    pub fn external_output_amounts(&self) -> C14Result<Array2<FloatValue>> {
        let mut amounts = Array2::zeros((self.time_axis.nr_intervals(), self.nr_pools()));
        for j in 0..self.nr_pools() {
            let column = self.flux_amounts(self.structure.external_output_fluxes(j))?;
            amounts.column_mut(j).assign(&column);
        }
        Ok(amounts)
    }

    pub fn create_discrete_model_run(&self) -> C14Result<Reconstruction> {
        let stocks = self.stocks()?;
        let start_values = DVector::from_iterator(self.nr_pools(), stocks.row(0).iter().copied());
        let run = DiscreteModelRun::from_fluxes(
            self.time_axis(),
            start_values,
            &self.external_input_amounts()?,
            &self.internal_flux_amounts()?,
            &self.external_output_amounts()?,
        )?;
        let reconstruction = Reconstruction::new(LinearSystem::Discrete(run), &stocks)?;
        debug!(
            "discrete reconstruction: max abs err {}, max rel err {}%",
            reconstruction.max_abs_err(),
            reconstruction.max_rel_err()
        );
        Ok(reconstruction)
    }

    pub fn create_continuous_model_run(&self, substeps: usize) -> C14Result<Reconstruction> {
        let stocks = self.stocks()?;
        let run = ContinuousModelRun::from_fluxes(
            self.time_axis(),
            &stocks,
            &self.external_input_amounts()?,
            &self.internal_flux_amounts()?,
            &self.external_output_amounts()?,
            substeps,
        )?;
        let reconstruction = Reconstruction::new(LinearSystem::Continuous(run), &stocks)?;
        debug!(
            "continuous reconstruction: max abs err {}, max rel err {}%",
            reconstruction.max_abs_err(),
            reconstruction.max_rel_err()
        );
        Ok(reconstruction)
    }
}

fn parse_unit(variable: &str, unit: &str) -> C14Result<Unit> {
    Unit::parse(unit).map_err(|e| C14Error::UnitError {
        variable: variable.to_string(),
        unit: unit.to_string(),
        details: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::ModelStructure;
    use approx::assert_relative_eq;
    use ndarray::array;

    const TWO_POOLS: &str = r#"
[[pools]]
pool_name = "Litter"
stock_var = "Litter"

[[pools]]
pool_name = "Soil"
stock_var = "Soil"

[external_inputs]
Litter = ["Leaf_fall", "Root_death"]

[[transfers]]
from = "Litter"
to = "Soil"
fluxes = ["Litter_to_Soil"]

[external_outputs]
Litter = ["Litter_to_RH"]
Soil = ["Soil_to_RH"]
"#;

    fn dataset(flux_unit: &str) -> Dataset {
        let mut ds = Dataset::new();
        let mut add = |name: &str, values: Array1<f64>, unit: &str| {
            ds.insert(name, DataArray::time_series(values).with_unit(unit))
                .unwrap();
        };
        add("Litter", array![100.0, 100.0, 100.0], "gC/m2");
        add("Soil", array![1.0, 1.0, 1.0], "kgC/m2");
        add("Leaf_fall", array![1.0, 1.0, 99.0], flux_unit);
        add("Litter_to_Soil", array![0.5, 0.5, 99.0], flux_unit);
        add("Litter_to_RH", array![0.5, 0.5, 99.0], flux_unit);
        add("Soil_to_RH", array![0.5, 0.5, 99.0], flux_unit);
        ds
    }

    fn structure() -> ModelStructure {
        ModelStructure::from_toml(TWO_POOLS).unwrap()
    }

    #[test]
    fn tensors() {
        let structure = structure();
        let ds = dataset("gC/m2/day");
        let mdo = ModelData::new(&structure, &ds, "gC/m2", 10.0).unwrap();

        let stocks = mdo.stocks().unwrap();
        assert_eq!(stocks, array![[100.0, 1000.0], [100.0, 1000.0], [100.0, 1000.0]]);

        // last time point fluxes are not used; Root_death is absent
        let inputs = mdo.external_input_amounts().unwrap();
        assert_eq!(inputs, array![[10.0, 0.0], [10.0, 0.0]]);
        let transfers = mdo.internal_flux_amounts().unwrap();
        assert_eq!(transfers[[1, 1, 0]], 5.0);
        assert_eq!(transfers[[1, 0, 1]], 0.0);
        let outputs = mdo.external_output_amounts().unwrap();
        assert_eq!(outputs, array![[5.0, 5.0], [5.0, 5.0]]);
    }

    #[test]
    fn monthly_flux_units() {
        let structure = structure();
        let ds = dataset("gC/m2/month");
        let mdo = ModelData::new(&structure, &ds, "gC/m2", 365.25 / 12.0).unwrap();
        let inputs = mdo.external_input_amounts().unwrap();
        assert_relative_eq!(inputs[[0, 0]], 1.0, max_relative = 1e-12);
    }

    #[test]
    fn discrete_reconstruction_reproduces_stocks() {
        let structure = structure();
        let mut ds = dataset("gC/m2/day");
        ds.insert(
            "Soil",
            DataArray::time_series(array![1000.0, 1000.0, 1000.0]).with_unit("gC/m2"),
        )
        .unwrap();
        let mdo = ModelData::new(&structure, &ds, "gC/m2", 10.0).unwrap();
        let reconstruction = mdo.create_discrete_model_run().unwrap();
        assert_eq!(reconstruction.system.kind(), "discrete");
        assert_relative_eq!(reconstruction.max_abs_err(), 0.0, epsilon = 1e-9);
        assert_relative_eq!(reconstruction.max_rel_err(), 0.0, epsilon = 1e-9);

        let reconstruction = mdo.create_continuous_model_run(10).unwrap();
        assert_eq!(reconstruction.system.kind(), "continuous");
        assert_relative_eq!(reconstruction.max_abs_err(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_stock() {
        let structure = structure();
        let mut ds = Dataset::new();
        ds.insert(
            "Litter",
            DataArray::time_series(array![1.0, 1.0]).with_unit("gC/m2"),
        )
        .unwrap();
        let mdo = ModelData::new(&structure, &ds, "gC/m2", 1.0).unwrap();
        assert_eq!(
            mdo.stocks().unwrap_err(),
            C14Error::MissingVariable("Soil".into())
        );
    }

    #[test]
    fn unit_errors() {
        let structure = structure();
        let mut ds = dataset("gC/m2/day");
        ds.insert(
            "Soil_to_RH",
            DataArray::time_series(array![1.0, 1.0, 1.0]).with_unit("gC/m2"),
        )
        .unwrap();
        let mdo = ModelData::new(&structure, &ds, "gC/m2", 1.0).unwrap();
        assert!(matches!(
            mdo.external_output_amounts(),
            Err(C14Error::UnitError { .. })
        ));

        ds.insert("Litter", DataArray::time_series(array![1.0, 1.0, 1.0]))
            .unwrap();
        let mdo = ModelData::new(&structure, &ds, "gC/m2", 1.0).unwrap();
        assert!(matches!(mdo.stocks(), Err(C14Error::UnitError { .. })));
    }

    #[test]
    fn too_short() {
        let structure = structure();
        let mut ds = Dataset::new();
        ds.insert(
            "Litter",
            DataArray::time_series(array![1.0]).with_unit("gC/m2"),
        )
        .unwrap();
        assert!(matches!(
            ModelData::new(&structure, &ds, "gC/m2", 1.0),
            Err(C14Error::Dataset(_))
        ));
    }
}
