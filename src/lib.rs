//! Radiocarbon (¹⁴C) tracer dynamics for CARDAMOM.
//!
//! Given ¹²C stocks and fluxes from a calibrated CARDAMOM run, the linear
//! compartmental system reproducing them is reconstructed, a ¹⁴C-only
//! companion system is derived from the atmospheric Δ¹⁴C record and
//! radioactive decay, both are run, and Δ¹⁴C is reported for every stock
//! and flux.
//!
//! ```no_run
//! use cardamom_c14::cardamom::load_model_structure;
//! use cardamom_c14::config::Delta14CConfig;
//! use cardamom_c14::example_datasets::steady_state_dataset;
//! use cardamom_c14::pipeline::load_delta_14c_dataset;
//!
//! let structure = load_model_structure().unwrap();
//! let config = Delta14CConfig::from_file("delta14c.toml").unwrap();
//! let ds = steady_state_dataset(24).unwrap();
//! let result = load_delta_14c_dataset(&ds, "discrete", &structure, &config).unwrap();
//! assert!(result.get("Soil").is_some());
//! ```

pub mod cardamom;
pub mod compare;
pub mod config;
pub mod diagnostic;
pub mod example_datasets;
pub mod forcing;
pub mod pipeline;
pub mod tracer;

pub use c14_core::errors::{C14Error, C14Result};
