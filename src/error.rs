//! Stable, machine-readable error kinds for the engine.
//!
//! `anyhow::Error` is used for ad hoc propagation inside a module; at the
//! boundaries named in the error-handling table (Model Client, Router,
//! Parser, Verifier, Orchestrator) failures are wrapped in [`EngineError`] so
//! callers get a stable `code()` alongside the human-readable message.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("transport error talking to model server: {0}")]
    TransportError(String),

    #[error("model not installed: {0}")]
    ModelMissing(String),

    #[error("no model available for requested role/category")]
    ModelUnavailable,

    #[error("could not parse model output: {0}")]
    ParseError(String),

    #[error("verification failed: {0}")]
    VerifierFailure(String),

    #[error("subprocess timed out after {0:?}")]
    SubprocessTimeout(std::time::Duration),

    #[error("dangerous command rejected: {0}")]
    DangerousCommand(String),

    #[error("plan invariant violated: {0}")]
    PlanInvariantViolated(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Stable machine-readable code, independent of the `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::TransportError(_) => "transport_error",
            EngineError::ModelMissing(_) => "model_missing",
            EngineError::ModelUnavailable => "model_unavailable",
            EngineError::ParseError(_) => "parse_error",
            EngineError::VerifierFailure(_) => "verifier_failure",
            EngineError::SubprocessTimeout(_) => "subprocess_timeout",
            EngineError::DangerousCommand(_) => "dangerous_command",
            EngineError::PlanInvariantViolated(_) => "plan_invariant_violated",
            EngineError::Cancelled => "cancelled",
        }
    }

    /// CLI exit code per the external-interfaces contract (0/1/2/3).
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::ModelMissing(_) | EngineError::ModelUnavailable => 3,
            EngineError::Cancelled => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::ModelUnavailable.code(), "model_unavailable");
        assert_eq!(EngineError::Cancelled.code(), "cancelled");
    }

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(EngineError::ModelUnavailable.exit_code(), 3);
        assert_eq!(EngineError::Cancelled.exit_code(), 2);
        assert_eq!(
            EngineError::PlanInvariantViolated("dup path".into()).exit_code(),
            1
        );
    }
}
