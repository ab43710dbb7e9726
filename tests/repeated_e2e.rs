use std::sync::Arc;

use approx::assert_relative_eq;

use sedrun::engine::memory::{MemoryEngineFactory, ModelDefinition, ReactionKind};
use sedrun::{
    AlgorithmSpec, ChangeValue, Config, Model, RepeatedTask, SedError, SetValue, SimpleTask, Simulation, Simulator,
    SubTask, Task, UniformTimeCourse, ValidationError, Variable, VariableResult,
};

const SBML: &str = "urn:sedml:language:sbml";
const DECAY: &str = "decay.json";
const GROWTH: &str = "growth.json";
const K: &str = "/sbml:sbml/sbml:model/sbml:listOfParameters/sbml:parameter[@id='k']";
const C: &str = "/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id='C']";
const D: &str = "/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id='D']";

fn simulator() -> Simulator {
    let factory = Arc::new(MemoryEngineFactory::new());
    factory
        .register(
            DECAY,
            ModelDefinition::default()
                .compartment("cell", 1.0)
                .species("C", "cell", 1.0)
                .parameter("k", 0.5)
                .reaction("decay", ReactionKind::Degradation, "C", "k"),
        )
        .unwrap();
    factory
        .register(
            GROWTH,
            ModelDefinition::default()
                .compartment("cell", 1.0)
                .species("D", "cell", 0.0)
                .parameter("g", 1.0)
                .reaction("make", ReactionKind::Production, "D", "g"),
        )
        .unwrap();
    Simulator::new(Config::default(), factory.clone(), factory).unwrap()
}

fn leaf(id: &str, model: &str, source: &str, end: f64) -> Task {
    Task::Simple(SimpleTask {
        id: id.to_string(),
        model: Model::new(model, source, SBML),
        simulation: Simulation::UniformTimeCourse(UniformTimeCourse {
            initial_time: 0.0,
            output_start_time: 0.0,
            output_end_time: end,
            number_of_steps: 2,
            algorithm: AlgorithmSpec::new("KISAO_0000019").unwrap(),
        }),
    })
}

fn sub(order: i64, task: Task) -> SubTask {
    SubTask { order, task }
}

fn set_k(values: &[f64]) -> SetValue {
    SetValue {
        model: "decay".to_string(),
        target: K.to_string(),
        symbol: None,
        values: values.iter().copied().map(ChangeValue::from).collect(),
    }
}

fn repeated(repetitions: usize, reset: bool, sub_tasks: Vec<SubTask>, changes: Vec<SetValue>) -> Task {
    Task::Repeated(RepeatedTask {
        id: "sweep".to_string(),
        repetitions,
        reset_model_for_each_repetition: reset,
        sub_tasks,
        changes,
    })
}

/// The series recorded for `rep`, `sub` of a repeated-task result.
fn series(result: &VariableResult, rep: usize, sub: usize) -> &[f64] {
    result.as_nested().unwrap()[rep].as_nested().unwrap()[sub].as_series().unwrap()
}

#[test]
fn results_nest_by_repetition_then_sub_task() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let task = repeated(
        3,
        true,
        vec![sub(1, leaf("run", "decay", DECAY, 2.0))],
        vec![set_k(&[0.5, 1.0, 0.5])],
    );
    let vars = [Variable::time("time"), Variable::target("C", C)];
    let (results, log) = simulator().exec_task(&task, &vars, None).unwrap();

    let c = results.get("C").unwrap();
    assert_eq!(c.as_nested().unwrap().len(), 3);
    assert_eq!(c.as_nested().unwrap()[0].as_nested().unwrap().len(), 1);
    assert_relative_eq!(series(c, 0, 0)[2], (-1.0f64).exp(), epsilon = 1e-12);
    assert_relative_eq!(series(c, 1, 0)[2], (-2.0f64).exp(), epsilon = 1e-12);
    assert_eq!(series(c, 0, 0), series(c, 2, 0));
    assert_eq!(series(results.get("time").unwrap(), 1, 0), &[0.0, 1.0, 2.0]);

    assert_eq!(log.sub_tasks.len(), 3);
    assert!(log.sub_tasks.iter().all(|s| s.task_id == "run" && s.succeeded()));
}

#[test]
fn repetitions_continue_without_reset() {
    let sim = simulator();
    let task = repeated(2, false, vec![sub(1, leaf("run", "decay", DECAY, 2.0))], vec![]);
    let vars = [Variable::target("C", C)];
    let prepared = sim.preprocess(&task, &vars).unwrap();

    for _ in 0..2 {
        let (results, _) = sim.exec_task(&task, &vars, Some(&prepared)).unwrap();
        let c = results.get("C").unwrap();
        // Every execution starts from the initial state.
        assert_relative_eq!(series(c, 0, 0)[0], 1.0);
        assert_relative_eq!(series(c, 1, 0)[0], series(c, 0, 0)[2], epsilon = 1e-12);
        assert_relative_eq!(series(c, 1, 0)[2], (-2.0f64).exp(), epsilon = 1e-12);
    }
}

#[test]
fn variables_scoped_to_other_models_are_empty() {
    let task = repeated(
        2,
        true,
        vec![
            sub(2, leaf("grow", "growth", GROWTH, 1.0)),
            sub(1, leaf("shrink", "decay", DECAY, 1.0)),
        ],
        vec![set_k(&[0.5, 2.0])],
    );
    let vars = [
        Variable::time("time"),
        Variable::target("C", C).for_model("decay"),
        Variable::target("D", D).for_model("growth"),
    ];
    let sim = simulator();
    let prepared = sim.preprocess(&task, &vars).unwrap();
    assert_eq!(prepared.leaf_ids(), vec!["grow", "shrink"]);

    let (results, log) = sim.exec_task(&task, &vars, Some(&prepared)).unwrap();
    for rep in 0..2 {
        // Sub-tasks run in ascending order: shrink, then grow.
        let c = results.get("C").unwrap().as_nested().unwrap()[rep].as_nested().unwrap();
        assert!(c[0].as_series().is_some());
        assert!(c[1].is_empty());
        let d = results.get("D").unwrap().as_nested().unwrap()[rep].as_nested().unwrap();
        assert!(d[0].is_empty());
        assert!(d[1].as_series().is_some());
        assert_eq!(series(results.get("time").unwrap(), rep, 1).len(), 3);
    }
    // The sweep of k reaches the decay model only.
    assert_relative_eq!(series(results.get("C").unwrap(), 1, 0)[2], (-2.0f64).exp(), epsilon = 1e-12);
    assert_eq!(series(results.get("D").unwrap(), 0, 1), series(results.get("D").unwrap(), 1, 1));

    let ids: Vec<_> = log.sub_tasks.iter().map(|s| s.task_id.as_str()).collect();
    assert_eq!(ids, vec!["shrink", "grow", "shrink", "grow"]);
}

#[test]
fn shared_leaf_keeps_its_state_between_sub_tasks() {
    let run = leaf("run", "decay", DECAY, 2.0);
    let task = repeated(1, false, vec![sub(1, run.clone()), sub(2, run)], vec![]);
    let vars = [Variable::target("C", C)];
    let sim = simulator();
    let prepared = sim.preprocess(&task, &vars).unwrap();
    assert_eq!(prepared.leaf_ids(), vec!["run"]);

    let (results, _) = sim.exec_task(&task, &vars, Some(&prepared)).unwrap();
    let c = results.get("C").unwrap();
    assert_relative_eq!(series(c, 0, 1)[0], series(c, 0, 0)[2], epsilon = 1e-12);
    assert_eq!(prepared.with_leaf("run", |l| l.runs()).unwrap(), 2);
}

#[test]
fn nested_repeated_tasks_compose_their_changes() {
    let inner = Task::Repeated(RepeatedTask {
        id: "inner".to_string(),
        repetitions: 2,
        reset_model_for_each_repetition: true,
        sub_tasks: vec![sub(1, leaf("run", "decay", DECAY, 1.0))],
        changes: vec![],
    });
    let task = repeated(2, true, vec![sub(1, inner)], vec![set_k(&[1.0, 3.0])]);
    let vars = [Variable::target("C", C)];
    let (results, log) = simulator().exec_task(&task, &vars, None).unwrap();

    let c = results.get("C").unwrap();
    for (rep, k) in [(0, 1.0f64), (1, 3.0)] {
        let inner_reps = c.as_nested().unwrap()[rep].as_nested().unwrap()[0].as_nested().unwrap();
        assert_eq!(inner_reps.len(), 2);
        for inner_rep in inner_reps {
            let values = inner_rep.as_nested().unwrap()[0].as_series().unwrap();
            assert_relative_eq!(values[2], (-k).exp(), epsilon = 1e-12);
        }
    }
    assert_eq!(log.sub_tasks.len(), 2);
    assert_eq!(log.sub_tasks[0].sub_tasks.len(), 2);
}

#[test]
fn mismatched_task_shape_is_rejected() {
    let sim = simulator();
    let vars = [Variable::target("C", C)];
    let task = repeated(2, true, vec![sub(1, leaf("run", "decay", DECAY, 1.0))], vec![set_k(&[0.5, 1.0])]);
    let prepared = sim.preprocess(&task, &vars).unwrap();

    let renamed = repeated(2, true, vec![sub(1, leaf("other", "decay", DECAY, 1.0))], vec![set_k(&[0.5, 1.0])]);
    let err = sim.exec_task(&renamed, &vars, Some(&prepared)).unwrap_err();
    assert!(matches!(err, SedError::Validation(ValidationError::InvalidTask { .. })));

    // Repetition counts and change values may differ.
    let longer = repeated(
        3,
        true,
        vec![sub(1, leaf("run", "decay", DECAY, 1.0))],
        vec![set_k(&[4.0, 0.1, 2.0])],
    );
    let (results, _) = sim.exec_task(&longer, &vars, Some(&prepared)).unwrap();
    assert_eq!(results.get("C").unwrap().as_nested().unwrap().len(), 3);
}

#[test]
fn execution_rechecks_repetition_counts() {
    let sim = simulator();
    let vars = [Variable::target("C", C)];
    let task = repeated(2, true, vec![sub(1, leaf("run", "decay", DECAY, 1.0))], vec![set_k(&[0.5, 1.0])]);
    let prepared = sim.preprocess(&task, &vars).unwrap();

    let empty = repeated(0, true, vec![sub(1, leaf("run", "decay", DECAY, 1.0))], vec![set_k(&[])]);
    let err = sim.exec_task(&empty, &vars, Some(&prepared)).unwrap_err();
    assert!(matches!(err, SedError::Validation(ValidationError::InvalidTask { .. })));

    let short = repeated(3, true, vec![sub(1, leaf("run", "decay", DECAY, 1.0))], vec![set_k(&[0.5, 1.0])]);
    let err = sim.exec_task(&short, &vars, Some(&prepared)).unwrap_err();
    assert!(matches!(err, SedError::Validation(ValidationError::InvalidTask { .. })));
    assert_eq!(prepared.with_leaf("run", |l| l.runs()).unwrap(), 0);
}
