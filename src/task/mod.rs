//! Task descriptions: models, simulations, variables and the task graph.
//!
//! Tasks are read-only inputs owned by the caller. A task is either a simple
//! task (one model under one simulation) or a repeated task that re-runs
//! sub-tasks while sweeping model values.

mod fingerprint;
mod validation;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::algorithm::{AlgorithmSpec, SolverRole};
use crate::error::ValidationError;
use crate::value::ChangeValue;

pub use fingerprint::TaskFingerprint;
pub(crate) use validation::{validate, Leaf};

/// The built-in symbol for simulation time.
pub const TIME_SYMBOL: &str = "urn:sedml:symbol:time";

/// Tolerance for the integral-step check of uniform time courses.
const STEP_TOLERANCE: f64 = 1e-8;

/// A change to one model attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelChange {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub new_value: ChangeValue,
}

impl ModelChange {
    #[must_use]
    pub fn new(target: impl Into<String>, new_value: impl Into<ChangeValue>) -> Self {
        Self {
            target: target.into(),
            symbol: None,
            new_value: new_value.into(),
        }
    }
}

/// A model file plus the changes to apply before each run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub source: PathBuf,
    pub language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ModelChange>,
}

impl Model {
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            language: language.into(),
            changes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_change(mut self, change: ModelChange) -> Self {
        self.changes.push(change);
        self
    }
}

/// A time course sampled at evenly spaced points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformTimeCourse {
    pub initial_time: f64,
    pub output_start_time: f64,
    pub output_end_time: f64,
    pub number_of_steps: usize,
    pub algorithm: AlgorithmSpec,
}

impl UniformTimeCourse {
    /// Number of steps from `initial_time` to `output_end_time` at the output
    /// step size.
    ///
    /// Fails unless the times are ordered and the count is a non-negative
    /// integer within tolerance.
    pub fn total_steps(&self) -> Result<usize, ValidationError> {
        let (initial, start, end) = (self.initial_time, self.output_start_time, self.output_end_time);
        if !(initial.is_finite() && start.is_finite() && end.is_finite()) {
            return Err(ValidationError::invalid_task("time course times must be finite"));
        }
        if start > end {
            return Err(ValidationError::invalid_task(format!(
                "output start time {start} must be at most output end time {end}"
            )));
        }
        if initial > start {
            return Err(ValidationError::invalid_task(format!(
                "initial time {initial} must be at most output start time {start}"
            )));
        }
        if self.number_of_steps == 0 && end > start {
            return Err(ValidationError::invalid_task("number of steps must be positive"));
        }
        // One sample per step plus the output start.
        if self.number_of_steps == usize::MAX {
            return Err(ValidationError::invalid_task(format!(
                "number of steps {} is too large",
                self.number_of_steps
            )));
        }

        #[allow(clippy::float_cmp)]
        if end == start {
            return if initial == start {
                Ok(self.number_of_steps)
            } else {
                Err(ValidationError::invalid_task(
                    "an empty output interval requires the initial time to equal the output start time",
                ))
            };
        }

        #[allow(clippy::cast_precision_loss)]
        let total = (end - initial) / (end - start) * self.number_of_steps as f64;
        let rounded = total.round();
        if total < 0.0 || (total - rounded).abs() > STEP_TOLERANCE {
            return Err(ValidationError::invalid_task(format!(
                "the interval from the initial time to the output end time must be an integer multiple of the \
                 output step; got {total} steps"
            )));
        }
        #[allow(clippy::cast_precision_loss)]
        if rounded >= usize::MAX as f64 {
            return Err(ValidationError::invalid_task(format!("{total} total steps is too large")));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(rounded as usize)
    }
}

/// A search for a fixed point of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteadyState {
    pub algorithm: AlgorithmSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
    TimeCourse,
    SteadyState,
}

impl SimulationKind {
    /// Which kind of solver runs this simulation.
    #[must_use]
    pub const fn solver_role(self) -> SolverRole {
        match self {
            Self::TimeCourse => SolverRole::Integrator,
            Self::SteadyState => SolverRole::SteadyState,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Simulation {
    UniformTimeCourse(UniformTimeCourse),
    SteadyState(SteadyState),
}

impl Simulation {
    #[must_use]
    pub const fn kind(&self) -> SimulationKind {
        match self {
            Self::UniformTimeCourse(_) => SimulationKind::TimeCourse,
            Self::SteadyState(_) => SimulationKind::SteadyState,
        }
    }

    #[must_use]
    pub const fn algorithm(&self) -> &AlgorithmSpec {
        match self {
            Self::UniformTimeCourse(tc) => &tc.algorithm,
            Self::SteadyState(ss) => &ss.algorithm,
        }
    }
}

/// An output to record: a model component or a built-in symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Restricts the variable to leaves running this model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Variable {
    /// A variable recording the component at `target`.
    #[must_use]
    pub fn target(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: Some(target.into()),
            symbol: None,
            model: None,
        }
    }

    /// A variable recording a built-in symbol.
    #[must_use]
    pub fn symbol(id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: None,
            symbol: Some(symbol.into()),
            model: None,
        }
    }

    /// A variable recording simulation time.
    #[must_use]
    pub fn time(id: impl Into<String>) -> Self {
        Self::symbol(id, TIME_SYMBOL)
    }

    /// Scopes the variable to one model.
    #[must_use]
    pub fn for_model(mut self, model_id: impl Into<String>) -> Self {
        self.model = Some(model_id.into());
        self
    }

    /// Returns true if the variable is recorded for leaves running `model_id`.
    #[must_use]
    pub fn applies_to(&self, model_id: &str) -> bool {
        self.model.as_deref().map_or(true, |m| m == model_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleTask {
    pub id: String,
    pub model: Model,
    pub simulation: Simulation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub order: i64,
    pub task: Task,
}

/// A per-repetition change applied by a repeated task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetValue {
    /// Id of the model whose leaves receive the change.
    pub model: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// One value per repetition.
    pub values: Vec<ChangeValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatedTask {
    pub id: String,
    pub repetitions: usize,
    #[serde(default)]
    pub reset_model_for_each_repetition: bool,
    pub sub_tasks: Vec<SubTask>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<SetValue>,
}

impl RepeatedTask {
    /// Sub-tasks in ascending `order`; equal orders keep document order.
    #[must_use]
    pub fn ordered_sub_tasks(&self) -> Vec<&SubTask> {
        let mut subs: Vec<&SubTask> = self.sub_tasks.iter().collect();
        subs.sort_by_key(|s| s.order);
        subs
    }
}

/// A task: the closed set of executable task kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    Simple(SimpleTask),
    Repeated(RepeatedTask),
}

impl Task {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Simple(t) => &t.id,
            Self::Repeated(t) => &t.id,
        }
    }

    /// Parses a JSON task description.
    ///
    /// Unknown task kinds and malformed documents are `InvalidTask`.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(json).map_err(|e| ValidationError::invalid_task(format!("unsupported or malformed task: {e}")))
    }

    pub fn to_json(&self) -> Result<String, ValidationError> {
        serde_json::to_string(self).map_err(|e| ValidationError::invalid_task(e.to_string()))
    }
}

impl From<SimpleTask> for Task {
    fn from(task: SimpleTask) -> Self {
        Self::Simple(task)
    }
}

impl From<RepeatedTask> for Task {
    fn from(task: RepeatedTask) -> Self {
        Self::Repeated(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tc(initial: f64, start: f64, end: f64, steps: usize) -> UniformTimeCourse {
        UniformTimeCourse {
            initial_time: initial,
            output_start_time: start,
            output_end_time: end,
            number_of_steps: steps,
            algorithm: AlgorithmSpec::new("KISAO_0000019").unwrap(),
        }
    }

    #[test]
    fn total_steps_counts_presimulation() {
        assert_eq!(tc(0.0, 0.0, 10.0, 10).total_steps().unwrap(), 10);
        assert_eq!(tc(10.0, 20.0, 30.0, 10).total_steps().unwrap(), 20);
        assert_eq!(tc(0.0, 5.0, 10.0, 4).total_steps().unwrap(), 8);
    }

    #[test]
    fn total_steps_rejects_fractional_counts() {
        assert!(tc(0.0, 3.0, 10.0, 10).total_steps().is_err());
        assert!(tc(5.0, 0.0, 10.0, 10).total_steps().is_err());
        assert!(tc(0.0, 10.0, 5.0, 10).total_steps().is_err());
        assert!(tc(0.0, 0.0, 10.0, 0).total_steps().is_err());
    }

    #[test]
    fn step_counts_that_overflow_are_invalid() {
        let err = tc(0.0, 0.0, 10.0, usize::MAX).total_steps().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTask { .. }));
        assert!(tc(2.0, 2.0, 2.0, usize::MAX).total_steps().is_err());
        assert!(tc(0.0, 5.0, 10.0, usize::MAX / 2 + 1).total_steps().is_err());
        assert_eq!(tc(0.0, 5.0, 10.0, 1 << 40).total_steps().unwrap(), 1 << 41);
    }

    #[test]
    fn empty_output_interval() {
        assert_eq!(tc(2.0, 2.0, 2.0, 3).total_steps().unwrap(), 3);
        assert!(tc(1.0, 2.0, 2.0, 3).total_steps().is_err());
    }

    #[test]
    fn unknown_task_kinds_are_invalid() {
        let err = Task::from_json(r#"{"type":"functional","id":"t"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTask { .. }));
    }

    #[test]
    fn json_round_trip() {
        let task = Task::Simple(SimpleTask {
            id: "task".to_string(),
            model: Model::new("model", "model.json", "urn:sedml:language:sbml")
                .with_change(ModelChange::new("/sbml:sbml/sbml:model/sbml:listOfParameters/sbml:parameter[@id='k']", "2.5")),
            simulation: Simulation::UniformTimeCourse(tc(0.0, 0.0, 10.0, 10)),
        });
        let json = task.to_json().unwrap();
        assert_eq!(Task::from_json(&json).unwrap(), task);
    }

    #[test]
    fn sub_tasks_sort_stably_by_order() {
        let leaf = |id: &str| {
            Task::Simple(SimpleTask {
                id: id.to_string(),
                model: Model::new("m", "m.json", "urn:sedml:language:sbml"),
                simulation: Simulation::UniformTimeCourse(tc(0.0, 0.0, 1.0, 1)),
            })
        };
        let rt = RepeatedTask {
            id: "r".to_string(),
            repetitions: 1,
            reset_model_for_each_repetition: false,
            sub_tasks: vec![
                SubTask { order: 2, task: leaf("a") },
                SubTask { order: 1, task: leaf("b") },
                SubTask { order: 2, task: leaf("c") },
            ],
            changes: vec![],
        };
        let ids: Vec<&str> = rt.ordered_sub_tasks().iter().map(|s| s.task.id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn variable_scope() {
        let v = Variable::time("t");
        assert!(v.applies_to("anything"));
        let v = v.for_model("m1");
        assert!(v.applies_to("m1"));
        assert!(!v.applies_to("m2"));
    }
}
