//! Units for carbon stocks and fluxes.
//!
//! Dataset variables carry their unit as a free-text `units` attribute.
//! Stocks are converted to a common stock unit (e.g. `gC/m2`) and fluxes to
//! that unit per day before any model is reconstructed.
//!
//! | Notation | Meaning |
//! |----------|---------|
//! | `gC/m2`, `gC m-2`, `gC m^-2` | grams of carbon per square metre |
//! | `gC/m2/day`, `gC m-2 d-1` | daily flux |
//! | `gC/m2/month` | flux per month of 365.25 / 12 days |
//! | `kgC/m2`, `tC/ha`, `PgC` | prefixed carbon masses |

pub mod conversion;
pub mod dimension;
pub mod parser;
pub mod registry;

pub use conversion::{conversion_factor, ConversionError, Unit};
pub use dimension::Dimension;
pub use parser::{ParsedUnit, UnitParseError};
pub use registry::{DAYS_PER_MONTH, DAYS_PER_YEAR};
