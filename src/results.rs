//! Variable results, diagnostics and task logs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::value::ParameterValue;

/// The recorded values of one variable.
///
/// Repeated tasks nest results as repetition, then sub-task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableResult {
    /// One value per output time point.
    Series(Vec<f64>),
    /// A steady-state value.
    Scalar(f64),
    Nested(Vec<VariableResult>),
    /// The variable does not apply to this sub-task.
    Empty,
}

impl VariableResult {
    #[must_use]
    pub fn as_series(&self) -> Option<&[f64]> {
        match self {
            Self::Series(values) => Some(values),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_scalar(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_nested(&self) -> Option<&[VariableResult]> {
        match self {
            Self::Nested(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Results of one execution, keyed by variable id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableResults(BTreeMap<String, VariableResult>);

impl VariableResults {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, variable_id: impl Into<String>, result: VariableResult) {
        self.0.insert(variable_id.into(), result);
    }

    #[must_use]
    pub fn get(&self, variable_id: &str) -> Option<&VariableResult> {
        self.0.get(variable_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VariableResult)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, VariableResult> {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A different algorithm runs in place of the requested one.
    AlgorithmSubstituted,
    /// Parameter changes were discarded after a substitution.
    ParametersDropped,
    /// An unknown or badly typed parameter change was skipped.
    ParameterIgnored,
    /// The engine refused a parameter value.
    ParameterRejected,
    /// A steady state was found only after presimulation.
    SteadyStateRetried,
}

/// A non-fatal problem found while preparing or running a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic and emits it as a warning.
    #[must_use]
    pub fn warn(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(kind = ?kind, "{message}");
        Self { kind, message }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Succeeded,
    Failed,
}

/// Which engine method produced the results, and how it was configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorDetails {
    /// `simulate` or `steady_state`.
    pub method: String,
    pub solver: String,
    /// Every parameter the algorithm declares, with its live value after the
    /// run. Optional parameters that were never set are `None`.
    pub parameters: BTreeMap<String, Option<ParameterValue>>,
}

/// Unique id of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Record of one task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLog {
    pub run_id: RunId,
    pub task_id: String,
    pub status: TaskStatus,
    /// Algorithm that actually ran (simple tasks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Algorithm the task asked for (simple tasks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulator_details: Option<SimulatorDetails>,
    pub warnings: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Logs of sub-task runs, in run order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_tasks: Vec<TaskLog>,
}

impl TaskLog {
    /// Starts a log for `task_id`; status is settled by [`TaskLog::finish`].
    #[must_use]
    pub fn start(run_id: RunId, task_id: impl Into<String>) -> Self {
        Self {
            run_id,
            task_id: task_id.into(),
            status: TaskStatus::Failed,
            algorithm: None,
            requested_algorithm: None,
            simulator_details: None,
            warnings: Vec::new(),
            error: None,
            started_at: Utc::now(),
            duration_seconds: 0.0,
            sub_tasks: Vec::new(),
        }
    }

    /// Records the outcome and elapsed time.
    pub fn finish<T, E: fmt::Display>(&mut self, outcome: &Result<T, E>) {
        let elapsed = Utc::now() - self.started_at;
        #[allow(clippy::cast_precision_loss)]
        let seconds = elapsed.num_microseconds().map_or(0.0, |us| us as f64 / 1e6);
        self.duration_seconds = seconds.max(0.0);
        match outcome {
            Ok(_) => self.status = TaskStatus::Succeeded,
            Err(e) => {
                self.status = TaskStatus::Failed;
                self.error = Some(e.to_string());
            }
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Succeeded
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
