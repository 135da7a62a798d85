use thiserror::Error;

use super::config::ConfigError;
use super::platform::PlatformKind;
use crate::core::forcefield::contributor::ForceError;
use crate::core::models::system::{IndexKind, SystemError};

pub use super::utils::sampling::SamplingError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("{kind} index {index} is out of range (count: {count})")]
    InvalidIndex {
        kind: IndexKind,
        index: usize,
        count: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Platform '{platform}' cannot run this system: {reason}")]
    UnsupportedSystem {
        platform: &'static str,
        reason: String,
    },

    #[error("Platform '{0}' is not available in this build")]
    PlatformUnavailable(PlatformKind),

    #[error(
        "Constraints failed to converge after {iterations} iterations (max error {max_error:e})"
    )]
    ConstraintConvergence { iterations: usize, max_error: f64 },

    #[error("Force evaluation failed: {source}")]
    ForceEvaluation {
        #[from]
        source: ForceError,
    },

    #[error("Velocity sampling failed: {source}")]
    Sampling {
        #[from]
        source: SamplingError,
    },

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
}

impl From<SystemError> for EngineError {
    fn from(err: SystemError) -> Self {
        match err {
            SystemError::InvalidIndex { kind, index, count } => {
                EngineError::InvalidIndex { kind, index, count }
            }
            other => EngineError::InvalidConfiguration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_index_errors_keep_their_kind() {
        let err: EngineError = SystemError::InvalidIndex {
            kind: IndexKind::Constraint,
            index: 4,
            count: 2,
        }
        .into();
        assert_eq!(
            err,
            EngineError::InvalidIndex {
                kind: IndexKind::Constraint,
                index: 4,
                count: 2
            }
        );
    }

    #[test]
    fn other_system_errors_become_invalid_configuration() {
        let err: EngineError = SystemError::InvalidParameter {
            name: "mass",
            reason: "negative".to_string(),
        }
        .into();
        assert!(matches!(err, EngineError::InvalidConfiguration(msg) if msg.contains("mass")));
    }

    #[test]
    fn sampling_errors_are_matchable_through_the_engine_error() {
        let err: EngineError = SamplingError::InvalidTemperature(-5.0).into();
        match err {
            EngineError::Sampling {
                source: crate::engine::error::SamplingError::InvalidTemperature(t),
            } => assert_eq!(t, -5.0),
            other => panic!("unexpected error: {other}"),
        }
    }
}
