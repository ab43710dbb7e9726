//! Error types for sedrun.
//!
//! All errors are strongly typed using thiserror so callers can branch on
//! the cause of a failure. Errors are grouped by layer:
//!
//! - [`ValidationError`]: structural problems with the task, model, targets or
//!   configuration. Always fatal.
//! - [`AlgorithmError`]: algorithm and parameter problems. Fatal only under the
//!   strictest substitution policy; looser policies downgrade them to warnings.
//! - [`ExecutionError`]: failures while driving the engine.

use thiserror::Error;

use crate::algorithm::SubstitutionPolicy;
use crate::value::{ParameterValue, ValueType};

/// Which part of a task a batch of bad targets came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRole {
    /// Targets of model changes.
    Change,
    /// Targets of recorded variables.
    Variable,
}

impl TargetRole {
    const fn plural(self) -> &'static str {
        match self {
            Self::Change => "changes",
            Self::Variable => "variables",
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "\n  (none)".to_string();
    }
    items.iter().map(|item| format!("\n  - {item}")).collect()
}

fn invalid_targets_message(role: &TargetRole, targets: &[String], valid: &[String]) -> String {
    format!(
        "The targets for the following {} are not valid:{}\n\nTargets must be one of the following:{}",
        role.plural(),
        bullet_list(targets),
        bullet_list(valid),
    )
}

fn unsupported_symbols_message(role: &TargetRole, symbols: &[String], supported: &[String]) -> String {
    format!(
        "The following symbols of {} are not supported:{}\n\nSymbols must be one of the following:{}",
        role.plural(),
        bullet_list(symbols),
        bullet_list(supported),
    )
}

/// Renders a solver parameter snapshot as `name=value` pairs.
pub(crate) fn format_parameters(parameters: &[(String, Option<ParameterValue>)]) -> String {
    if parameters.is_empty() {
        return "(none)".to_string();
    }
    parameters
        .iter()
        .map(|(name, value)| match value {
            Some(value) => format!("{name}={value}"),
            None => format!("{name}=unset"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validation errors: the request can never succeed as written.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid task: {reason}")]
    InvalidTask {
        reason: String,
    },

    #[error("Model '{model_id}' is invalid:{}", bullet_list(.errors))]
    InvalidModel {
        model_id: String,
        errors: Vec<String>,
    },

    #[error("{}", invalid_targets_message(.role, .targets, .valid_targets))]
    InvalidTarget {
        role: TargetRole,
        targets: Vec<String>,
        valid_targets: Vec<String>,
    },

    #[error("{}", unsupported_symbols_message(.role, .symbols, .supported))]
    UnsupportedSymbol {
        role: TargetRole,
        symbols: Vec<String>,
        supported: Vec<String>,
    },

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    /// Creates an `InvalidTask` error.
    #[must_use]
    pub fn invalid_task(reason: impl Into<String>) -> Self {
        Self::InvalidTask {
            reason: reason.into(),
        }
    }
}

/// Algorithm errors, governed by the substitution policy.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error(
        "Algorithm '{requested}' is not supported and cannot be substituted under policy {policy}. \
         Supported algorithms:{}",
        bullet_list(.supported)
    )]
    UnsupportedAlgorithm {
        requested: String,
        policy: SubstitutionPolicy,
        supported: Vec<String>,
    },

    #[error(
        "Algorithm parameter '{parameter}' is not supported by '{algorithm}'. \
         Parameter must be one of the following:{}",
        bullet_list(.supported)
    )]
    UnsupportedParameter {
        algorithm: String,
        parameter: String,
        supported: Vec<String>,
    },

    #[error("'{value}' is not a valid {expected} value for parameter '{parameter}' of '{algorithm}'")]
    InvalidParameterValue {
        algorithm: String,
        parameter: String,
        value: String,
        expected: ValueType,
    },
}

/// Execution errors that occur while driving the engine.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(
        "Steady state of task '{task_id}' could not be found after {attempts} attempts: {last_error}. \
         Algorithm: {algorithm}; solver: {solver}; parameters: {}",
        format_parameters(.parameters)
    )]
    SteadyStateFailure {
        task_id: String,
        algorithm: String,
        solver: String,
        attempts: usize,
        last_error: String,
        parameters: Vec<(String, Option<ParameterValue>)>,
    },

    #[error(
        "Simulation of task '{task_id}' produced NaN values. \
         Algorithm: {algorithm}; solver: {solver}; parameters: {}",
        format_parameters(.parameters)
    )]
    SimulationDiverged {
        task_id: String,
        algorithm: String,
        solver: String,
        parameters: Vec<(String, Option<ParameterValue>)>,
    },

    #[error("Engine error in task '{task_id}': {message}")]
    Engine {
        task_id: String,
        message: String,
    },

    #[error("Execution queue is full (capacity: {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Execution worker disconnected")]
    Disconnected,

    #[error("Execution was cancelled before it started")]
    Cancelled,

    #[error("Execution timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },
}

/// Top-level error type for sedrun.
#[derive(Debug, Error)]
pub enum SedError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Algorithm error: {0}")]
    Algorithm(#[from] AlgorithmError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl SedError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an algorithm error.
    #[must_use]
    pub const fn is_algorithm(&self) -> bool {
        matches!(self, Self::Algorithm(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if resubmitting the same request may succeed.
    ///
    /// Simulation failures are deterministic and never retried beyond the
    /// steady-state ladder; only runtime back-pressure is transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Execution(ExecutionError::QueueFull { .. } | ExecutionError::Timeout { .. })
        )
    }
}

/// Result type alias for sedrun operations.
pub type SedResult<T> = Result<T, SedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_target_lists_targets_and_valid_targets() {
        let err = ValidationError::InvalidTarget {
            role: TargetRole::Variable,
            targets: vec!["/sbml:sbml".to_string()],
            valid_targets: vec![
                "/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id='C']".to_string(),
            ],
        };
        let msg = format!("{err}");
        assert!(msg.contains("targets for the following variables are not valid"));
        assert!(msg.contains("  - /sbml:sbml\n"));
        assert!(msg.contains("species[@id='C']"));
    }

    #[test]
    fn unsupported_symbol_mentions_supported_symbols() {
        let err = ValidationError::UnsupportedSymbol {
            role: TargetRole::Variable,
            symbols: vec!["mass".to_string()],
            supported: vec!["urn:sedml:symbol:time".to_string()],
        };
        let msg = format!("{err}");
        assert!(msg.contains("mass"));
        assert!(msg.contains("urn:sedml:symbol:time"));
    }

    #[test]
    fn invalid_parameter_value_names_expected_type() {
        let err = AlgorithmError::InvalidParameterValue {
            algorithm: "KISAO_0000019".to_string(),
            parameter: "KISAO_0000209".to_string(),
            value: "abc".to_string(),
            expected: ValueType::Float,
        };
        let msg = format!("{err}");
        assert!(msg.contains("'abc'"));
        assert!(msg.contains("float"));
    }

    #[test]
    fn steady_state_failure_dumps_parameters() {
        let err = ExecutionError::SteadyStateFailure {
            task_id: "task".to_string(),
            algorithm: "KISAO_0000569".to_string(),
            solver: "nleq2".to_string(),
            attempts: 7,
            last_error: "singular jacobian".to_string(),
            parameters: vec![
                ("relative_tolerance".to_string(), Some(ParameterValue::Float(1e-12))),
                ("maximum_iterations".to_string(), Some(ParameterValue::Integer(100))),
                ("seed".to_string(), None),
            ],
        };
        let msg = format!("{err}");
        assert!(msg.contains("singular jacobian"));
        assert!(msg.contains("maximum_iterations=100"));
        assert!(msg.contains("seed=unset"));
        assert!(msg.contains("nleq2"));
    }

    #[test]
    fn sed_error_classification() {
        let err: SedError = ValidationError::invalid_task("empty id").into();
        assert!(err.is_validation());
        assert!(!err.is_retryable());

        let err: SedError = AlgorithmError::UnsupportedAlgorithm {
            requested: "KISAO_0000088".to_string(),
            policy: SubstitutionPolicy::None,
            supported: vec![],
        }
        .into();
        assert!(err.is_algorithm());

        let err: SedError = ExecutionError::QueueFull { capacity: 4 }.into();
        assert!(err.is_execution());
        assert!(err.is_retryable());

        let err = SedError::internal("poisoned");
        assert!(err.is_internal());
        assert!(format!("{err}").contains("poisoned"));
    }
}
