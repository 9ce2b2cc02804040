//! Labelled n-dimensional data: named dimensions, per-variable attributes,
//! and dataset-level coordinates.
//!
//! Model output is stored with any number of leading batch dimensions
//! (ensemble member, latitude, longitude, ...) followed by [`TIME_DIM`].
//! [`BatchLayout`] walks the batch cells and cuts out one time series per
//! variable.

use crate::errors::{C14Error, C14Result};
use crate::timeseries::FloatValue;
use ndarray::{Array1, ArrayD, Axis, Ix1, IxDyn};
use std::collections::BTreeMap;

pub const TIME_DIM: &str = "time";
pub const UNITS_ATTR: &str = "units";

#[derive(Debug, Clone, PartialEq)]
pub struct DataArray<T = FloatValue> {
    dims: Vec<String>,
    data: ArrayD<T>,
    attrs: BTreeMap<String, String>,
}

impl<T: Clone> DataArray<T> {
    pub fn new<S: AsRef<str>>(dims: &[S], data: ArrayD<T>) -> C14Result<Self> {
        let dims: Vec<String> = dims.iter().map(|d| d.as_ref().to_string()).collect();
        if dims.len() != data.ndim() {
            return Err(C14Error::Dataset(format!(
                "{} dimension names given for an array with {} dimensions",
                dims.len(),
                data.ndim()
            )));
        }
        if let Some(dup) = dims
            .iter()
            .enumerate()
            .find_map(|(i, d)| dims[..i].contains(d).then_some(d))
        {
            return Err(C14Error::Dataset(format!("dimension '{dup}' repeated")));
        }
        Ok(Self {
            dims,
            data,
            attrs: BTreeMap::new(),
        })
    }

    /// A series along [`TIME_DIM`] only.
    pub fn time_series(values: Array1<T>) -> Self {
        Self {
            dims: vec![TIME_DIM.to_string()],
            data: values.into_dyn(),
            attrs: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn data(&self) -> &ArrayD<T> {
        &self.data
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        self.attrs.insert(key.to_string(), value.to_string());
    }

    pub fn dim_size(&self, dim: &str) -> Option<usize> {
        self.dims
            .iter()
            .position(|d| d == dim)
            .map(|axis| self.data.len_of(Axis(axis)))
    }
}

impl DataArray<FloatValue> {
    #[must_use]
    pub fn with_unit(self, unit: &str) -> Self {
        self.with_attr(UNITS_ATTR, unit)
    }

    pub fn unit(&self) -> Option<&str> {
        self.attr(UNITS_ATTR)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    coords: BTreeMap<String, Array1<FloatValue>>,
    data_vars: BTreeMap<String, DataArray>,
    text_vars: BTreeMap<String, DataArray<String>>,
    attrs: BTreeMap<String, String>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size of every dimension used by a coordinate or variable.
    pub fn dims(&self) -> BTreeMap<String, usize> {
        let mut sizes: BTreeMap<String, usize> = self
            .coords
            .iter()
            .map(|(name, values)| (name.clone(), values.len()))
            .collect();
        let float_dims = self.data_vars.values().map(|v| (v.dims(), v.shape()));
        let text_dims = self.text_vars.values().map(|v| (v.dims(), v.shape()));
        for (dims, shape) in float_dims.chain(text_dims) {
            for (dim, &size) in dims.iter().zip(shape) {
                sizes.entry(dim.clone()).or_insert(size);
            }
        }
        sizes
    }

    pub fn dim_size(&self, dim: &str) -> Option<usize> {
        self.dims().get(dim).copied()
    }

    fn check_sizes(&self, dims: &[String], shape: &[usize]) -> C14Result<()> {
        let known = self.dims();
        for (dim, &size) in dims.iter().zip(shape) {
            match known.get(dim) {
                Some(&existing) if existing != size => {
                    return Err(C14Error::Dataset(format!(
                        "dimension '{dim}' has size {existing}, got {size}"
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn insert_coord(&mut self, name: &str, values: Array1<FloatValue>) -> C14Result<()> {
        self.check_sizes(&[name.to_string()], &[values.len()])?;
        self.coords.insert(name.to_string(), values);
        Ok(())
    }

    pub fn insert(&mut self, name: &str, var: DataArray) -> C14Result<()> {
        self.check_sizes(var.dims(), var.shape())?;
        self.data_vars.insert(name.to_string(), var);
        Ok(())
    }

    pub fn insert_text(&mut self, name: &str, var: DataArray<String>) -> C14Result<()> {
        self.check_sizes(var.dims(), var.shape())?;
        self.text_vars.insert(name.to_string(), var);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.data_vars.get(name)
    }

    pub fn get_text(&self, name: &str) -> Option<&DataArray<String>> {
        self.text_vars.get(name)
    }

    pub fn require(&self, name: &str) -> C14Result<&DataArray> {
        self.get(name)
            .ok_or_else(|| C14Error::MissingVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data_vars.contains_key(name) || self.text_vars.contains_key(name)
    }

    pub fn data_vars(&self) -> impl Iterator<Item = (&String, &DataArray)> {
        self.data_vars.iter()
    }

    pub fn text_vars(&self) -> impl Iterator<Item = (&String, &DataArray<String>)> {
        self.text_vars.iter()
    }

    pub fn coord(&self, name: &str) -> Option<&Array1<FloatValue>> {
        self.coords.get(name)
    }

    pub fn coords(&self) -> &BTreeMap<String, Array1<FloatValue>> {
        &self.coords
    }

    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        self.attrs.insert(key.to_string(), value.to_string());
    }
}

/// Shape of the batch dimensions shared by a set of variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    dims: Vec<String>,
    shape: Vec<usize>,
    time_len: usize,
}

impl BatchLayout {
    /// Reads the layout from the first of `names` present in `dataset`.
    ///
    /// Every other present variable must have the same dimensions, and
    /// [`TIME_DIM`] must be the last of them.
    pub fn from_variables<S: AsRef<str>>(dataset: &Dataset, names: &[S]) -> C14Result<Self> {
        let mut present = names
            .iter()
            .filter_map(|name| dataset.get(name.as_ref()).map(|var| (name.as_ref(), var)));
        let (first_name, first) = present.next().ok_or_else(|| {
            C14Error::MissingVariable(
                names
                    .first()
                    .map(|n| n.as_ref().to_string())
                    .unwrap_or_default(),
            )
        })?;

        let layout = Self::from_dims(first_name, first.dims(), first.shape())?;
        for (name, var) in present {
            if var.dims() != first.dims() || var.shape() != first.shape() {
                return Err(C14Error::Dataset(format!(
                    "variable '{name}' has dimensions {:?} {:?}, expected {:?} {:?}",
                    var.dims(),
                    var.shape(),
                    first.dims(),
                    first.shape()
                )));
            }
        }
        Ok(layout)
    }

    fn from_dims(name: &str, dims: &[String], shape: &[usize]) -> C14Result<Self> {
        match dims.last() {
            Some(last) if last == TIME_DIM => Ok(Self {
                dims: dims[..dims.len() - 1].to_vec(),
                shape: shape[..shape.len() - 1].to_vec(),
                time_len: shape[shape.len() - 1],
            }),
            _ => Err(C14Error::Dataset(format!(
                "variable '{name}' must have '{TIME_DIM}' as its last dimension, found {dims:?}"
            ))),
        }
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn time_len(&self) -> usize {
        self.time_len
    }

    /// Number of batch cells.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// True when some batch dimension has size zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row-major multi-index of batch cell `cell`.
    pub fn multi_index(&self, cell: usize) -> Vec<usize> {
        let mut index = vec![0; self.shape.len()];
        let mut rest = cell;
        for (slot, &size) in index.iter_mut().zip(&self.shape).rev() {
            *slot = rest % size;
            rest /= size;
        }
        index
    }

    /// The time series of every present variable in `names` at one batch cell,
    /// as a dataset with the single dimension [`TIME_DIM`]. Attributes are kept.
    pub fn slice<S: AsRef<str>>(
        &self,
        dataset: &Dataset,
        cell: usize,
        names: &[S],
    ) -> C14Result<Dataset> {
        let index = self.multi_index(cell);
        let mut slice = Dataset::new();
        if let Some(time) = dataset.coord(TIME_DIM) {
            slice.insert_coord(TIME_DIM, time.clone())?;
        }
        for name in names.iter().map(AsRef::as_ref) {
            let Some(var) = dataset.get(name) else {
                continue;
            };
            let mut view = var.data().view();
            for &i in &index {
                view = view.index_axis_move(Axis(0), i);
            }
            let series = view
                .into_dimensionality::<Ix1>()
                .map_err(|e| C14Error::Dataset(format!("variable '{name}': {e}")))?
                .to_owned();
            let mut sliced = DataArray::time_series(series);
            for (key, value) in var.attrs() {
                sliced.set_attr(key, value);
            }
            slice.insert(name, sliced)?;
        }
        Ok(slice)
    }

    /// Stacks one value per batch cell into an array over the batch dimensions.
    pub fn assemble<T: Clone>(&self, values: Vec<T>) -> C14Result<DataArray<T>> {
        let data = ArrayD::from_shape_vec(IxDyn(&self.shape), values)
            .map_err(|e| C14Error::Dataset(e.to_string()))?;
        DataArray::new(self.dims.as_slice(), data)
    }

    /// Stacks one series of `len` values per batch cell into an array over
    /// the batch dimensions followed by [`TIME_DIM`].
    pub fn assemble_series(
        &self,
        series: Vec<Array1<FloatValue>>,
        len: usize,
    ) -> C14Result<DataArray> {
        let mut shape = self.shape.clone();
        shape.push(len);
        let mut dims = self.dims.clone();
        dims.push(TIME_DIM.to_string());

        let mut flat = Vec::with_capacity(self.len() * len);
        for s in &series {
            if s.len() != len {
                return Err(C14Error::Dataset(format!(
                    "series of length {} where {len} was expected",
                    s.len()
                )));
            }
            flat.extend(s.iter().copied());
        }
        let data = ArrayD::from_shape_vec(IxDyn(&shape), flat)
            .map_err(|e| C14Error::Dataset(e.to_string()))?;
        DataArray::new(dims.as_slice(), data)
    }
}
