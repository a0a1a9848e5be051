//! Error types for the simulation and experiment pipeline
//!
//! Precondition violations (bad population shapes, undersized populations)
//! fail immediately with no partial result. Degenerate statistics inside a
//! single test are absorbed as neutral outcomes by the stats helpers; this
//! module covers the cases that must surface to the caller.

use std::path::PathBuf;

/// Errors from simulation, planning, and experiment operations
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("population size {0} is odd; an even count is required to split into control and treatment")]
    OddPopulation(usize),

    #[error("population of {available} users per arm cannot cover the required sample of {required}")]
    InsufficientPopulation { available: usize, required: usize },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("degenerate statistics: {0}")]
    DegenerateStatistics(String),

    #[error("distribution setup failed: {0}")]
    Distribution(String),

    #[error("failed to write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl ExperimentError {
    /// Shorthand for an [`ExperimentError::InvalidParameter`]
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Type alias for Results using ExperimentError
pub type Result<T> = std::result::Result<T, ExperimentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ExperimentError::OddPopulation(101);
        assert!(err.to_string().contains("101"));

        let err = ExperimentError::InsufficientPopulation {
            available: 50,
            required: 120,
        };
        assert!(err.to_string().contains("50"));
        assert!(err.to_string().contains("120"));
    }

    #[test]
    fn test_invalid_parameter_helper() {
        let err = ExperimentError::invalid("sigma", "must be positive");
        assert!(err.to_string().contains("sigma"));
        assert!(err.to_string().contains("must be positive"));
    }
}
