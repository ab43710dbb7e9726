//! Task execution.
//!
//! The executor runs a task against the engines of a [`PreprocessedTask`]:
//! it applies model changes, dispatches to the time-course integrator or the
//! steady-state solver, validates and slices the output, and records a
//! [`TaskLog`].

use std::collections::BTreeMap;
use std::sync::MutexGuard;

use tracing::{debug, info, info_span, warn};

use crate::algorithm::SolverRole;
use crate::config::Config;
use crate::engine::{Engine, EngineError};
use crate::error::{ExecutionError, SedError, SedResult, ValidationError};
use crate::preprocess::{LeafContext, PreprocessedTask, RunState};
use crate::results::{Diagnostic, DiagnosticKind, RunId, SimulatorDetails, TaskLog, VariableResult, VariableResults};
use crate::target::TargetKey;
use crate::task::{validate, RepeatedTask, SimpleTask, Simulation, Task, TaskFingerprint, UniformTimeCourse, Variable};
use crate::value::ChangeValue;

/// Runs tasks against preprocessed engines.
#[derive(Debug, Clone, Default)]
pub struct TaskExecutor {
    config: Config,
}

impl TaskExecutor {
    pub fn new(config: Config) -> SedResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Executes `task` and returns its results and log.
    ///
    /// `preprocessed` must come from preprocessing the same task shape with
    /// the same variables; only change values and time-course bounds may
    /// differ between runs.
    pub fn execute(
        &self,
        task: &Task,
        preprocessed: &PreprocessedTask,
        variables: &[Variable],
    ) -> SedResult<(VariableResults, TaskLog)> {
        let (result, log) = self.execute_logged(task, preprocessed, variables);
        result.map(|results| (results, log))
    }

    /// Like [`TaskExecutor::execute`], but returns the log on failure too.
    pub fn execute_logged(
        &self,
        task: &Task,
        preprocessed: &PreprocessedTask,
        variables: &[Variable],
    ) -> (SedResult<VariableResults>, TaskLog) {
        let run_id = RunId::new();
        let span = info_span!("execute", task = %task.id(), run = %run_id);
        let _entered = span.enter();

        let mut log = TaskLog::start(run_id, task.id());
        log.warnings = preprocessed.diagnostics().to_vec();
        info!("executing task");

        let result = self.run(task, preprocessed, variables, &mut log);
        log.finish(&result);
        match &result {
            Ok(_) => info!(duration_seconds = log.duration_seconds, "task succeeded"),
            Err(e) => warn!(error = %e, "task failed"),
        }
        (result, log)
    }

    fn run(
        &self,
        task: &Task,
        preprocessed: &PreprocessedTask,
        variables: &[Variable],
        log: &mut TaskLog,
    ) -> SedResult<VariableResults> {
        // Values may change between runs, so the cheap checks run again.
        validate(task, variables, false)?;
        if TaskFingerprint::of(task, variables) != preprocessed.fingerprint() {
            return Err(ValidationError::invalid_task(format!(
                "task '{}' does not match the preprocessed task '{}'",
                task.id(),
                preprocessed.task_id()
            ))
            .into());
        }

        let mut run = Run {
            config: &self.config,
            leaves: preprocessed.lock_all()?,
            variables,
            run_id: log.run_id,
        };
        let outputs = run.task(task, &[], true, log)?;

        let mut results = VariableResults::new();
        for (id, result) in outputs {
            results.insert(id, result);
        }
        Ok(results)
    }
}

/// A set-value change inherited from an enclosing repeated task.
#[derive(Debug, Clone)]
struct PendingChange<'t> {
    key: TargetKey,
    value: &'t ChangeValue,
}

type Outputs = BTreeMap<String, VariableResult>;

/// State of one `execute` call: the locked leaves and what to record.
struct Run<'a, 'p> {
    config: &'a Config,
    leaves: BTreeMap<&'p str, MutexGuard<'p, LeafContext>>,
    variables: &'a [Variable],
    run_id: RunId,
}

fn leaf_ids<'t>(task: &'t Task, out: &mut Vec<&'t str>) {
    match task {
        Task::Simple(simple) => out.push(&simple.id),
        Task::Repeated(repeated) => {
            for sub in &repeated.sub_tasks {
                leaf_ids(&sub.task, out);
            }
        }
    }
}

impl Run<'_, '_> {
    fn leaf(&mut self, id: &str) -> SedResult<&mut LeafContext> {
        self.leaves
            .get_mut(id)
            .map(|guard| &mut **guard)
            .ok_or_else(|| SedError::internal(format!("leaf '{id}' was not preprocessed")))
    }

    fn task<'t>(
        &mut self,
        task: &'t Task,
        pending: &[PendingChange<'t>],
        reset: bool,
        log: &mut TaskLog,
    ) -> SedResult<Outputs> {
        match task {
            Task::Simple(simple) => {
                let (config, variables) = (self.config, self.variables);
                let leaf = self.leaf(&simple.id)?;
                leaf.state = RunState::Running;
                let result = run_leaf(config, leaf, simple, pending, reset, variables, log);
                leaf.state = if result.is_ok() {
                    RunState::Succeeded
                } else {
                    RunState::Failed
                };
                leaf.runs += 1;
                result
            }
            Task::Repeated(repeated) => self.repeated(repeated, pending, reset, log),
        }
    }

    fn reset_subtree(&mut self, repeated: &RepeatedTask) -> SedResult<()> {
        let mut ids = Vec::new();
        for sub in &repeated.sub_tasks {
            leaf_ids(&sub.task, &mut ids);
        }
        ids.sort_unstable();
        ids.dedup();
        for id in ids {
            let leaf = self.leaf(id)?;
            leaf.engine.reset().map_err(|e| engine_error(id, &e))?;
        }
        Ok(())
    }

    fn repeated<'t>(
        &mut self,
        repeated: &'t RepeatedTask,
        pending: &[PendingChange<'t>],
        reset: bool,
        log: &mut TaskLog,
    ) -> SedResult<Outputs> {
        let subs = repeated.ordered_sub_tasks();
        let mut per_variable: BTreeMap<String, Vec<VariableResult>> = self
            .variables
            .iter()
            .map(|v| (v.id.clone(), Vec::with_capacity(repeated.repetitions)))
            .collect();

        for rep in 0..repeated.repetitions {
            let reset_now = if rep == 0 { reset } else { repeated.reset_model_for_each_repetition };
            if reset_now {
                self.reset_subtree(repeated)?;
            }
            debug!(task = %repeated.id, repetition = rep, reset = reset_now, "running repetition");

            let mut changes = pending.to_vec();
            for change in &repeated.changes {
                let value = change.values.get(rep).ok_or_else(|| {
                    SedError::from(ValidationError::invalid_task(format!(
                        "change of '{}' in repeated task '{}' has no value for repetition {rep}",
                        change.target, repeated.id
                    )))
                })?;
                changes.push(PendingChange {
                    key: TargetKey::set_value(change),
                    value,
                });
            }

            let mut per_sub: BTreeMap<String, Vec<VariableResult>> =
                per_variable.keys().map(|id| (id.clone(), Vec::with_capacity(subs.len()))).collect();
            for sub in &subs {
                let mut sub_log = TaskLog::start(self.run_id, sub.task.id());
                let result = self.task(&sub.task, &changes, false, &mut sub_log);
                sub_log.finish(&result);
                log.sub_tasks.push(sub_log);

                let mut outputs = result?;
                for (id, results) in &mut per_sub {
                    results.push(outputs.remove(id).unwrap_or(VariableResult::Empty));
                }
            }
            for (id, results) in per_sub {
                if let Some(reps) = per_variable.get_mut(&id) {
                    reps.push(VariableResult::Nested(results));
                }
            }
        }

        Ok(per_variable
            .into_iter()
            .map(|(id, reps)| (id, VariableResult::Nested(reps)))
            .collect())
    }
}

fn engine_error(task_id: &str, err: &EngineError) -> SedError {
    ExecutionError::Engine {
        task_id: task_id.to_string(),
        message: err.to_string(),
    }
    .into()
}

/// Engine id and numeric value of every change that applies to the leaf.
fn leaf_changes(leaf: &LeafContext, task: &SimpleTask, pending: &[PendingChange<'_>]) -> SedResult<Vec<(String, f64)>> {
    let model = &task.model;
    let own = model.changes.iter().map(|c| (TargetKey::change(&model.id, c), &c.new_value));
    let inherited = pending
        .iter()
        .filter(|p| p.key.model == leaf.model_id)
        .map(|p| (p.key.clone(), p.value));

    let mut changes = Vec::new();
    for (key, value) in own.chain(inherited) {
        let target = key.target.as_deref().unwrap_or_default();
        let engine_id = leaf.change_engine_id(&key).ok_or_else(|| {
            SedError::from(ValidationError::invalid_task(format!(
                "change target '{target}' of model '{}' was not preprocessed",
                model.id
            )))
        })?;
        let number = value.to_f64().ok_or_else(|| {
            SedError::from(ValidationError::invalid_task(format!(
                "value '{value}' of the change to '{target}' is not a number"
            )))
        })?;
        changes.push((engine_id.to_string(), number));
    }
    Ok(changes)
}

fn apply_changes(engine: &mut dyn Engine, changes: &[(String, f64)], task_id: &str) -> SedResult<()> {
    for (id, value) in changes {
        engine.set_value(id, *value).map_err(|e| engine_error(task_id, &e))?;
    }
    Ok(())
}

fn run_leaf(
    config: &Config,
    leaf: &mut LeafContext,
    task: &SimpleTask,
    pending: &[PendingChange<'_>],
    reset: bool,
    variables: &[Variable],
    log: &mut TaskLog,
) -> SedResult<Outputs> {
    log.algorithm = Some(leaf.algorithm.clone());
    log.requested_algorithm = Some(leaf.requested_algorithm.clone());

    let changes = leaf_changes(leaf, task, pending)?;
    if reset {
        leaf.engine.reset().map_err(|e| engine_error(&task.id, &e))?;
    }
    apply_changes(leaf.engine.as_mut(), &changes, &task.id)?;

    let (method, values) = match &task.simulation {
        Simulation::UniformTimeCourse(tc) => ("simulate", time_course(leaf, tc, &task.id)?),
        Simulation::SteadyState(_) => ("steady_state", steady_state(config, leaf, &changes, &task.id, log)?),
    };

    log.simulator_details = Some(SimulatorDetails {
        method: method.to_string(),
        solver: leaf.engine.solver_name(leaf.role),
        parameters: leaf.parameter_snapshot().into_iter().collect(),
    });

    if config.validate_results && values.has_nan() {
        return Err(ExecutionError::SimulationDiverged {
            task_id: task.id.clone(),
            algorithm: leaf.algorithm.clone(),
            solver: leaf.engine.solver_name(leaf.role),
            parameters: leaf.parameter_snapshot(),
        }
        .into());
    }

    let mut outputs = Outputs::new();
    for v in variables {
        let result = match leaf.variable_columns.get(&v.id) {
            Some(&column) => values.column(column).ok_or_else(|| {
                SedError::internal(format!("engine returned no column {column} for variable '{}'", v.id))
            })?,
            None => VariableResult::Empty,
        };
        outputs.insert(v.id.clone(), result);
    }
    Ok(outputs)
}

/// Raw engine output of one leaf run.
enum LeafValues {
    Rows(Vec<Vec<f64>>),
    Point(Vec<f64>),
}

impl LeafValues {
    fn has_nan(&self) -> bool {
        match self {
            Self::Rows(rows) => rows.iter().flatten().any(|v| v.is_nan()),
            Self::Point(values) => values.iter().any(|v| v.is_nan()),
        }
    }

    fn column(&self, column: usize) -> Option<VariableResult> {
        match self {
            Self::Rows(rows) => rows
                .iter()
                .map(|row| row.get(column).copied())
                .collect::<Option<Vec<f64>>>()
                .map(VariableResult::Series),
            Self::Point(values) => values.get(column).copied().map(VariableResult::Scalar),
        }
    }
}

fn time_course(leaf: &mut LeafContext, tc: &UniformTimeCourse, task_id: &str) -> SedResult<LeafValues> {
    let total = tc.total_steps()?;
    let steps = tc.number_of_steps;
    let engine = leaf.engine.as_mut();

    if tc.initial_time < tc.output_start_time {
        let points = total.saturating_sub(steps).saturating_add(1).max(2);
        debug!(from = tc.initial_time, to = tc.output_start_time, points, "presimulating");
        engine
            .simulate(tc.initial_time, tc.output_start_time, points)
            .map_err(|e| engine_error(task_id, &e))?;
    }

    let samples = steps
        .checked_add(1)
        .ok_or_else(|| ValidationError::invalid_task(format!("number of steps {steps} is too large")))?;
    let mut rows = engine
        .simulate(tc.output_start_time, tc.output_end_time, samples)
        .map_err(|e| engine_error(task_id, &e))?;
    if rows.len() < samples {
        return Err(ExecutionError::Engine {
            task_id: task_id.to_string(),
            message: format!("expected {samples} samples, engine returned {}", rows.len()),
        }
        .into());
    }
    let excess = rows.len() - samples;
    rows.drain(..excess);
    debug!(samples = rows.len(), "time course finished");
    Ok(LeafValues::Rows(rows))
}

fn steady_state(
    config: &Config,
    leaf: &mut LeafContext,
    changes: &[(String, f64)],
    task_id: &str,
    log: &mut TaskLog,
) -> SedResult<LeafValues> {
    let algorithm = leaf.algorithm.clone();
    let engine = leaf.engine.as_mut();
    let mut last_error = match engine.steady_state() {
        Ok(values) => return Ok(LeafValues::Point(values)),
        Err(e) => e,
    };
    debug!(error = %last_error, "direct steady-state attempt failed");

    for &rung in &config.steady_state_ladder {
        engine.reset().map_err(|e| engine_error(task_id, &e))?;
        apply_changes(engine, changes, task_id)?;
        if rung > 0.0 {
            if let Err(e) = engine.simulate(0.0, rung, 2) {
                debug!(rung, error = %e, "presimulation failed");
                last_error = e;
                continue;
            }
        }
        match engine.steady_state() {
            Ok(values) => {
                log.warnings.push(Diagnostic::warn(
                    DiagnosticKind::SteadyStateRetried,
                    format!("steady state of task '{task_id}' was found after presimulating for {rung} time units"),
                ));
                return Ok(LeafValues::Point(values));
            }
            Err(e) => {
                debug!(rung, error = %e, "steady-state attempt failed");
                last_error = e;
            }
        }
    }

    let solver = engine.solver_name(SolverRole::SteadyState);
    Err(ExecutionError::SteadyStateFailure {
        task_id: task_id.to_string(),
        algorithm,
        solver,
        attempts: 1 + config.steady_state_ladder.len(),
        last_error: last_error.to_string(),
        parameters: leaf.parameter_snapshot(),
    }
    .into())
}
