use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum C14Error {
    /// A caller-supplied argument is not one of the accepted values.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The ¹²C system could not be reconstructed consistently from the observed stocks and fluxes.
    #[error("{0}")]
    Reconstruction(String),
    /// The linear system for the tracer equilibrium initial condition is singular.
    #[error("{0}")]
    EquilibriumSolve(String),
    #[error("Extrapolation is not allowed. Target={target}, interpolation range=[{lower}, {upper}]")]
    ExtrapolationNotAllowed {
        target: f64,
        lower: f64,
        upper: f64,
    },
    #[error("variable '{0}' not found in dataset")]
    MissingVariable(String),
    #[error("unit error for '{variable}' ({unit}): {details}")]
    UnitError {
        variable: String,
        unit: String,
        details: String,
    },
    #[error("invalid model structure: {0}")]
    Structure(String),
    #[error("dataset error: {0}")]
    Dataset(String),
    #[error("failed to load atmospheric reference table '{source_name}': {details}")]
    AtmosphericTable {
        source_name: String,
        details: String,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("ODE integration failed: {0}")]
    Integration(String),
}

impl C14Error {
    /// Whether the error describes a numerically infeasible model rather than bad input.
    ///
    /// Only reconstruction and equilibrium failures are recoverable; callers turn
    /// them into a missing-value result instead of propagating them.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            C14Error::Reconstruction(_) | C14Error::EquilibriumSolve(_)
        )
    }
}

/// Convenience type for `Result<T, C14Error>`.
pub type C14Result<T> = Result<T, C14Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds() {
        assert!(C14Error::Reconstruction("negative flux".into()).is_recoverable());
        assert!(C14Error::EquilibriumSolve("singular".into()).is_recoverable());
        assert!(!C14Error::InvalidArgument("method".into()).is_recoverable());
        assert!(!C14Error::MissingVariable("Leaf".into()).is_recoverable());
    }

    #[test]
    fn reconstruction_message_is_verbatim() {
        let err = C14Error::Reconstruction("Reconstructed compartment content negative".into());
        assert_eq!(err.to_string(), "Reconstructed compartment content negative");
    }
}
