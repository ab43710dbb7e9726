//! Task preprocessing.
//!
//! Preprocessing does all the expensive, run-independent work once: reading
//! models, loading engines, resolving the algorithm and its parameters, and
//! resolving targets. The resulting [`PreprocessedTask`] can then be executed
//! any number of times with different change values.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::algorithm::{
    resolve_algorithm, resolve_parameters, AlgorithmCatalog, ParameterSpec, SolverRole, SolverSettings,
    SubstitutionPolicy,
};
use crate::config::Config;
use crate::engine::{Engine, EngineFactory, ModelReader};
use crate::error::{AlgorithmError, ExecutionError, SedError, SedResult, TargetRole, ValidationError};
use crate::results::{Diagnostic, DiagnosticKind};
use crate::target::{TargetContext, TargetKey};
use crate::task::{self, Leaf, SimulationKind, Task, TaskFingerprint, Variable};
use crate::value::ParameterValue;

/// Lifecycle of a leaf between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Preprocessed and never run.
    Ready,
    Running,
    Succeeded,
    Failed,
}

/// Everything needed to run one leaf task.
pub struct LeafContext {
    pub(crate) engine: Box<dyn Engine>,
    pub(crate) model_id: String,
    pub(crate) simulation: SimulationKind,
    pub(crate) requested_algorithm: String,
    pub(crate) algorithm: String,
    pub(crate) role: SolverRole,
    pub(crate) solver: String,
    pub(crate) settings: SolverSettings,
    /// Parameters the resolved algorithm declares, in catalog order.
    pub(crate) declared_parameters: Vec<ParameterSpec>,
    pub(crate) change_targets: HashMap<TargetKey, String>,
    /// Engine selection column of each applicable variable, by variable id.
    pub(crate) variable_columns: BTreeMap<String, usize>,
    pub(crate) selections: Vec<String>,
    pub(crate) state: RunState,
    pub(crate) runs: u64,
}

impl LeafContext {
    /// Id of the algorithm that runs this leaf.
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    #[must_use]
    pub fn requested_algorithm(&self) -> &str {
        &self.requested_algorithm
    }

    #[must_use]
    pub fn solver(&self) -> &str {
        &self.solver
    }

    #[must_use]
    pub const fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Completed runs of this leaf.
    #[must_use]
    pub const fn runs(&self) -> u64 {
        self.runs
    }

    /// Engine ids registered as selections, in column order.
    #[must_use]
    pub fn selections(&self) -> &[String] {
        &self.selections
    }

    /// Every declared solver parameter with the engine's live value, or
    /// `None` when the parameter has never been set.
    #[must_use]
    pub fn parameter_snapshot(&self) -> Vec<(String, Option<ParameterValue>)> {
        let live: HashMap<String, ParameterValue> = self.engine.solver_parameters(self.role).into_iter().collect();
        self.declared_parameters
            .iter()
            .map(|spec| {
                let value = live
                    .get(&spec.engine_id)
                    .or_else(|| spec.alias.as_ref().and_then(|alias| live.get(alias)))
                    .copied();
                (spec.engine_id.clone(), value)
            })
            .collect()
    }

    /// Engine id a change target resolved to.
    #[must_use]
    pub fn change_engine_id(&self, key: &TargetKey) -> Option<&str> {
        self.change_targets.get(key).map(String::as_str)
    }
}

impl std::fmt::Debug for LeafContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafContext")
            .field("model_id", &self.model_id)
            .field("simulation", &self.simulation)
            .field("algorithm", &self.algorithm)
            .field("solver", &self.solver)
            .field("selections", &self.selections)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A task with engines loaded and targets resolved, ready to execute.
///
/// Each leaf sits behind its own mutex, so concurrent executions of the same
/// preprocessed task serialize while independent ones run in parallel.
#[derive(Debug)]
pub struct PreprocessedTask {
    task_id: String,
    leaves: BTreeMap<String, Mutex<LeafContext>>,
    fingerprint: TaskFingerprint,
    diagnostics: Vec<Diagnostic>,
    created_at: DateTime<Utc>,
}

fn poisoned(leaf_id: &str) -> SedError {
    SedError::internal(format!("lock for leaf '{leaf_id}' is poisoned"))
}

impl PreprocessedTask {
    #[must_use]
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    #[must_use]
    pub const fn fingerprint(&self) -> TaskFingerprint {
        self.fingerprint
    }

    /// Warnings raised while preprocessing.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Leaf task ids in lock order.
    #[must_use]
    pub fn leaf_ids(&self) -> Vec<&str> {
        self.leaves.keys().map(String::as_str).collect()
    }

    /// Runs `f` against one leaf.
    pub fn with_leaf<R>(&self, leaf_id: &str, f: impl FnOnce(&LeafContext) -> R) -> SedResult<R> {
        let leaf = self
            .leaves
            .get(leaf_id)
            .ok_or_else(|| SedError::from(ValidationError::invalid_task(format!("no leaf task '{leaf_id}'"))))?;
        let guard = leaf.lock().map_err(|_| poisoned(leaf_id))?;
        Ok(f(&guard))
    }

    /// Current run state of one leaf.
    pub fn run_state(&self, leaf_id: &str) -> SedResult<RunState> {
        self.with_leaf(leaf_id, LeafContext::state)
    }

    /// Locks every leaf in sorted key order.
    pub(crate) fn lock_all(&self) -> SedResult<BTreeMap<&str, MutexGuard<'_, LeafContext>>> {
        let mut guards = BTreeMap::new();
        for (id, leaf) in &self.leaves {
            guards.insert(id.as_str(), leaf.lock().map_err(|_| poisoned(id))?);
        }
        Ok(guards)
    }
}

/// Builds [`PreprocessedTask`]s against an engine factory and model reader.
#[derive(Clone)]
pub struct TaskPreprocessor {
    config: Config,
    catalog: Arc<AlgorithmCatalog>,
    engines: Arc<dyn EngineFactory>,
    reader: Arc<dyn ModelReader>,
}

impl std::fmt::Debug for TaskPreprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPreprocessor")
            .field("config", &self.config)
            .field("catalog", &self.catalog.ids())
            .finish_non_exhaustive()
    }
}

impl TaskPreprocessor {
    /// Creates a preprocessor using the standard algorithm catalog.
    pub fn new(config: Config, engines: Arc<dyn EngineFactory>, reader: Arc<dyn ModelReader>) -> SedResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            catalog: Arc::new(AlgorithmCatalog::standard()),
            engines,
            reader,
        })
    }

    /// Replaces the algorithm catalog.
    #[must_use]
    pub fn with_catalog(mut self, catalog: AlgorithmCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn catalog(&self) -> &AlgorithmCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn policy(&self) -> SubstitutionPolicy {
        self.config.algorithm_substitution_policy
    }

    /// Validates `task`, loads an engine per leaf, and resolves algorithms and
    /// targets.
    pub fn preprocess(&self, task: &Task, variables: &[Variable]) -> SedResult<PreprocessedTask> {
        let leaves = task::validate(task, variables, self.config.validate_sedml)?;
        info!(task = %task.id(), leaves = leaves.len(), "preprocessing task");

        let mut diagnostics = Vec::new();
        let mut contexts = BTreeMap::new();
        for (id, leaf) in &leaves {
            let context = self.preprocess_leaf(leaf, variables, &mut diagnostics)?;
            contexts.insert(id.clone(), Mutex::new(context));
        }

        Ok(PreprocessedTask {
            task_id: task.id().to_string(),
            leaves: contexts,
            fingerprint: TaskFingerprint::of(task, variables),
            diagnostics,
            created_at: Utc::now(),
        })
    }

    fn preprocess_leaf(
        &self,
        leaf: &Leaf<'_>,
        variables: &[Variable],
        diagnostics: &mut Vec<Diagnostic>,
    ) -> SedResult<LeafContext> {
        let task = leaf.task;
        let model = &task.model;
        let invalid_model = |errors: Vec<String>| ValidationError::InvalidModel {
            model_id: model.id.clone(),
            errors,
        };

        if !self.reader.supports_language(&model.language) {
            return Err(invalid_model(vec![format!("language '{}' is not supported", model.language)]).into());
        }
        let description = self
            .reader
            .read(&model.source, &model.language)
            .map_err(|e| invalid_model(vec![e.to_string()]))?;
        if !description.is_valid() {
            return Err(invalid_model(description.errors).into());
        }
        let mut engine = self
            .engines
            .load(&model.source)
            .map_err(|e| invalid_model(vec![e.to_string()]))?;

        // Algorithm and parameters.
        let policy = self.policy();
        let strict = policy.is_strict() && self.config.validate_sedml;
        let simulation = task.simulation.kind();
        let role = simulation.solver_role();
        let spec = task.simulation.algorithm();
        let resolution = resolve_algorithm(spec.kisao_id(), &self.catalog, role, policy, diagnostics)?;
        let changes = resolve_parameters(spec, &resolution, strict, diagnostics)?;
        let entry = resolution.entry;

        let engine_err = |e: crate::engine::EngineError| ExecutionError::Engine {
            task_id: task.id.clone(),
            message: e.to_string(),
        };
        let selected = match role {
            SolverRole::Integrator => engine.set_integrator(&entry.engine_id),
            SolverRole::SteadyState => engine.set_steady_state_solver(&entry.engine_id),
        };
        selected.map_err(engine_err)?;

        let mut settings = SolverSettings::for_entry(entry);
        for change in &changes {
            if !settings.set(change.spec, change.value) {
                return Err(SedError::internal(format!(
                    "settings for '{}' have no slot for validated parameter '{}'",
                    entry.kisao_id, change.spec.kisao_id
                )));
            }
        }
        for (name, err) in settings.apply(engine.as_mut(), role) {
            let requested = changes.iter().find(|c| c.spec.engine_id == name);
            match requested {
                Some(change) if strict => {
                    return Err(AlgorithmError::UnsupportedParameter {
                        algorithm: entry.kisao_id.clone(),
                        parameter: change.spec.kisao_id.clone(),
                        supported: entry.parameter_ids(),
                    }
                    .into());
                }
                _ => diagnostics.push(Diagnostic::warn(
                    DiagnosticKind::ParameterRejected,
                    format!("'{}' did not accept parameter '{name}': {err}", entry.engine_id),
                )),
            }
        }

        // Targets.
        let ctx = TargetContext {
            description: &description,
            simulation,
            stochastic: entry.stochastic,
        };
        let change_keys: Vec<TargetKey> = model
            .changes
            .iter()
            .map(|c| TargetKey::change(&model.id, c))
            .chain(leaf.inherited.iter().cloned())
            .collect();
        let change_targets = ctx.resolve(&change_keys, TargetRole::Change)?;

        let applicable: Vec<&Variable> = variables.iter().filter(|v| v.applies_to(&model.id)).collect();
        let variable_keys: Vec<TargetKey> = applicable.iter().map(|v| TargetKey::variable(&model.id, v)).collect();
        let resolved = ctx.resolve(&variable_keys, TargetRole::Variable)?;

        let mut selections: Vec<String> = Vec::new();
        let mut variable_columns = BTreeMap::new();
        for (v, key) in applicable.iter().zip(&variable_keys) {
            let engine_id = resolved
                .get(key)
                .ok_or_else(|| SedError::internal(format!("variable '{}' was not resolved", v.id)))?;
            let column = match selections.iter().position(|s| s == engine_id) {
                Some(column) => column,
                None => {
                    selections.push(engine_id.clone());
                    selections.len() - 1
                }
            };
            variable_columns.insert(v.id.clone(), column);
        }
        engine.set_time_course_selections(&selections).map_err(engine_err)?;
        if simulation == SimulationKind::SteadyState {
            engine.set_steady_state_selections(&selections).map_err(engine_err)?;
        }

        let solver = engine.solver_name(role);
        debug!(
            leaf = %task.id,
            algorithm = %entry.kisao_id,
            solver = %solver,
            selections = selections.len(),
            "leaf preprocessed"
        );

        Ok(LeafContext {
            engine,
            model_id: model.id.clone(),
            simulation,
            requested_algorithm: spec.kisao_id().to_string(),
            algorithm: entry.kisao_id.clone(),
            role,
            solver,
            settings,
            declared_parameters: entry.parameters.clone(),
            change_targets,
            variable_columns,
            selections,
            state: RunState::Ready,
            runs: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmSpec;
    use crate::engine::memory::{MemoryEngineFactory, ModelDefinition, ReactionKind};
    use crate::task::{Model, ModelChange, SimpleTask, Simulation, SteadyState, UniformTimeCourse};

    const SOURCE: &str = "decay.json";

    fn factory() -> Arc<MemoryEngineFactory> {
        let factory = Arc::new(MemoryEngineFactory::new());
        factory
            .register(
                SOURCE,
                ModelDefinition::default()
                    .compartment("cell", 1.0)
                    .species("C", "cell", 1.0)
                    .parameter("k_in", 1.0)
                    .parameter("k_out", 0.5)
                    .reaction("synthesis", ReactionKind::Production, "C", "k_in")
                    .reaction("decay", ReactionKind::Degradation, "C", "k_out"),
            )
            .unwrap();
        factory
    }

    fn preprocessor(policy: SubstitutionPolicy) -> (TaskPreprocessor, Arc<MemoryEngineFactory>) {
        let f = factory();
        let p = TaskPreprocessor::new(Config::default().with_policy(policy), f.clone(), f.clone()).unwrap();
        (p, f)
    }

    fn time_course(algorithm: AlgorithmSpec) -> Task {
        Task::Simple(SimpleTask {
            id: "task".to_string(),
            model: Model::new("model", SOURCE, "urn:sedml:language:sbml").with_change(ModelChange::new(
                "/sbml:sbml/sbml:model/sbml:listOfParameters/sbml:parameter[@id='k_out']",
                0.25,
            )),
            simulation: Simulation::UniformTimeCourse(UniformTimeCourse {
                initial_time: 0.0,
                output_start_time: 0.0,
                output_end_time: 10.0,
                number_of_steps: 10,
                algorithm,
            }),
        })
    }

    fn species(id: &str) -> Variable {
        Variable::target(id, format!("/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id='{id}']"))
    }

    #[test]
    fn preprocess_resolves_everything_once() {
        let (p, f) = preprocessor(SubstitutionPolicy::None);
        let spec = AlgorithmSpec::new("KISAO_0000019").unwrap().with_change("KISAO_0000209", "1e-9").unwrap();
        let vars = [Variable::time("time"), species("C")];
        let pre = p.preprocess(&time_course(spec), &vars).unwrap();

        assert_eq!(f.load_count(), 1);
        assert_eq!(pre.leaf_ids(), vec!["task"]);
        assert!(pre.diagnostics().is_empty());
        pre.with_leaf("task", |leaf| {
            assert_eq!(leaf.algorithm(), "KISAO_0000019");
            assert_eq!(leaf.solver(), "cvode");
            assert_eq!(leaf.selections(), ["time".to_string(), "[C]".to_string()]);
            assert_eq!(leaf.state(), RunState::Ready);
            let SolverSettings::Cvode(cvode) = leaf.settings() else {
                panic!("expected cvode settings");
            };
            assert!((cvode.relative_tolerance - 1e-9).abs() < f64::EPSILON);
        })
        .unwrap();
    }

    #[test]
    fn substitution_is_recorded() {
        let (p, _) = preprocessor(SubstitutionPolicy::SimilarVariables);
        let spec = AlgorithmSpec::new("KISAO_0000088").unwrap().with_change("KISAO_0000209", "1e-9").unwrap();
        let pre = p.preprocess(&time_course(spec), &[Variable::time("time")]).unwrap();
        let kinds: Vec<DiagnosticKind> = pre.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DiagnosticKind::AlgorithmSubstituted, DiagnosticKind::ParametersDropped]);
        pre.with_leaf("task", |leaf| {
            assert_eq!(leaf.requested_algorithm(), "KISAO_0000088");
            assert_eq!(leaf.algorithm(), "KISAO_0000019");
        })
        .unwrap();
    }

    #[test]
    fn unknown_model_source_is_invalid_model() {
        let (p, _) = preprocessor(SubstitutionPolicy::default());
        let mut task = time_course(AlgorithmSpec::new("KISAO_0000019").unwrap());
        if let Task::Simple(simple) = &mut task {
            simple.model.source = "missing.json".into();
        }
        let err = p.preprocess(&task, &[Variable::time("time")]).unwrap_err();
        assert!(matches!(err, SedError::Validation(ValidationError::InvalidModel { .. })));
    }

    #[test]
    fn unsupported_language_is_invalid_model() {
        let (p, _) = preprocessor(SubstitutionPolicy::default());
        let mut task = time_course(AlgorithmSpec::new("KISAO_0000019").unwrap());
        if let Task::Simple(simple) = &mut task {
            simple.model.language = "urn:sedml:language:cellml".to_string();
        }
        let err = p.preprocess(&task, &[Variable::time("time")]).unwrap_err();
        assert!(matches!(err, SedError::Validation(ValidationError::InvalidModel { .. })));
    }

    #[test]
    fn time_is_unsupported_in_steady_state() {
        let (p, _) = preprocessor(SubstitutionPolicy::default());
        let task = Task::Simple(SimpleTask {
            id: "ss".to_string(),
            model: Model::new("model", SOURCE, "urn:sedml:language:sbml"),
            simulation: Simulation::SteadyState(SteadyState {
                algorithm: AlgorithmSpec::new("KISAO_0000569").unwrap(),
            }),
        });
        let err = p.preprocess(&task, &[Variable::time("time"), species("C")]).unwrap_err();
        assert!(matches!(err, SedError::Validation(ValidationError::UnsupportedSymbol { .. })));

        let pre = p.preprocess(&task, &[species("C")]).unwrap();
        assert_eq!(pre.run_state("ss").unwrap(), RunState::Ready);
    }

    #[test]
    fn stochastic_algorithms_record_amounts() {
        let (p, _) = preprocessor(SubstitutionPolicy::default());
        let pre = p
            .preprocess(&time_course(AlgorithmSpec::new("KISAO_0000029").unwrap()), &[species("C")])
            .unwrap();
        pre.with_leaf("task", |leaf| assert_eq!(leaf.selections(), ["C".to_string()])).unwrap();
    }

    #[test]
    fn invalid_parameter_value_is_fatal_under_none() {
        let (p, _) = preprocessor(SubstitutionPolicy::None);
        let spec = AlgorithmSpec::new("KISAO_0000019").unwrap().with_change("KISAO_0000415", "many").unwrap();
        let err = p.preprocess(&time_course(spec.clone()), &[Variable::time("time")]).unwrap_err();
        assert!(err.is_algorithm());

        let (p, _) = preprocessor(SubstitutionPolicy::SameMath);
        let pre = p.preprocess(&time_course(spec), &[Variable::time("time")]).unwrap();
        assert_eq!(pre.diagnostics()[0].kind, DiagnosticKind::ParameterIgnored);
    }
}
