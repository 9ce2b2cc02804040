//! Run configuration.
//!
//! All physical constants, the calendar mapping and the source of the
//! atmospheric record live here so nothing is fixed at call sites.
//!
//! ```toml
//! alpha = 1.18e-12
//! decay_rate = 0.0001209681
//! equilibrium = "time_mean"
//!
//! [atmosphere]
//! kind = "file"
//! path = "C14Atm_NH.csv"
//!
//! [solver]
//! substeps = 10
//! ```

use crate::tracer::EquilibriumPolicy;
use c14_core::errors::{C14Error, C14Result};
use c14_core::system::continuous::DEFAULT_SUBSTEPS;
use c14_core::timeseries::{FloatValue, Time};
use c14_core::units::{DAYS_PER_MONTH, DAYS_PER_YEAR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// ¹⁴C/¹²C ratio of the reference standard.
pub const ALPHA: FloatValue = 1.18e-12;

/// ¹⁴C decay rate per day.
pub const DECAY_RATE: FloatValue = 0.0001209681;

pub const DEFAULT_ATMOSPHERE_FILE: &str = "C14Atm_NH.csv";

/// Maps model time in days to a decimal calendar year.
///
/// $$ \text{year} = \text{epoch\\_year} + \frac{\text{offset\\_days} + t}{\text{days\\_per\\_year}} $$
///
/// The default offset puts monthly values in the middle of their month.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConversion {
    pub epoch_year: FloatValue,
    pub offset_days: Time,
    pub days_per_year: Time,
}

impl Default for CalendarConversion {
    fn default() -> Self {
        Self {
            epoch_year: 2001.0,
            offset_days: 15.0,
            days_per_year: DAYS_PER_YEAR,
        }
    }
}

impl CalendarConversion {
    pub fn to_calendar_year(&self, t: Time) -> FloatValue {
        self.epoch_year + (self.offset_days + t) / self.days_per_year
    }
}

/// Where the atmospheric Δ¹⁴C record comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AtmosphereSource {
    /// Comma separated `year,delta` rows after a single header row.
    File { path: PathBuf },
    /// Pre-loaded `(year, delta)` points.
    Table { points: Vec<(FloatValue, FloatValue)> },
}

impl Default for AtmosphereSource {
    fn default() -> Self {
        AtmosphereSource::File {
            path: PathBuf::from(DEFAULT_ATMOSPHERE_FILE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// RK4 steps per time step of the continuous form.
    pub substeps: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            substeps: DEFAULT_SUBSTEPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delta14CConfig {
    pub alpha: FloatValue,
    /// Per day.
    pub decay_rate: FloatValue,
    pub days_per_step: Time,
    pub calendar: CalendarConversion,
    /// Unit every stock is converted to. Fluxes are converted to this unit per day.
    pub stock_unit: String,
    pub atmosphere: AtmosphereSource,
    pub equilibrium: EquilibriumPolicy,
    pub solver: SolverOptions,
}

impl Default for Delta14CConfig {
    fn default() -> Self {
        Self {
            alpha: ALPHA,
            decay_rate: DECAY_RATE,
            days_per_step: DAYS_PER_MONTH,
            calendar: CalendarConversion::default(),
            stock_unit: "gC/m2".to_string(),
            atmosphere: AtmosphereSource::default(),
            equilibrium: EquilibriumPolicy::default(),
            solver: SolverOptions::default(),
        }
    }
}

impl Delta14CConfig {
    /// Defaults with the atmospheric record given as points.
    pub fn with_atmosphere_points(points: Vec<(FloatValue, FloatValue)>) -> Self {
        Self {
            atmosphere: AtmosphereSource::Table { points },
            ..Self::default()
        }
    }

    pub fn from_toml(text: &str) -> C14Result<Self> {
        toml::from_str(text).map_err(|e| C14Error::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> C14Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| C14Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> C14Result<String> {
        toml::to_string(self).map_err(|e| C14Error::Config(e.to_string()))
    }
}
