//! Domain-neutral building blocks for radiocarbon tracer runs.
//!
//! A labelled [`dataset::Dataset`] is mapped through a [`structure::ModelStructure`]
//! by the [`adapter::ModelData`] adapter into stock and flux tensors, which are
//! then used to reconstruct a [`system::LinearSystem`] (either the discrete,
//! matrix-iteration form or the continuous, ODE form).

pub mod adapter;
pub mod dataset;
pub mod errors;
pub mod interpolate;
pub mod ivp;
pub mod structure;
pub mod system;
pub mod timeseries;
pub mod units;
pub mod utils;
