use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::{RepeatedTask, SetValue, SimpleTask, Simulation, Task, Variable};
use crate::error::ValidationError;
use crate::target::TargetKey;

/// A simple task reached by flattening the task graph.
#[derive(Debug, Clone)]
pub(crate) struct Leaf<'a> {
    pub task: &'a SimpleTask,
    /// Change targets contributed by enclosing repeated tasks.
    pub inherited: BTreeSet<TargetKey>,
}

/// Flattens `task` into its leaves, keyed by leaf id.
///
/// A leaf id reached more than once must name the same definition each time;
/// its inherited change targets are the union over every occurrence.
pub(crate) fn flatten(task: &Task) -> Result<BTreeMap<String, Leaf<'_>>, ValidationError> {
    let mut leaves = BTreeMap::new();
    let mut enclosing = Vec::new();
    walk(task, &mut enclosing, &mut leaves)?;
    Ok(leaves)
}

fn walk<'a>(
    task: &'a Task,
    enclosing: &mut Vec<&'a SetValue>,
    leaves: &mut BTreeMap<String, Leaf<'a>>,
) -> Result<(), ValidationError> {
    match task {
        Task::Simple(simple) => {
            let inherited: BTreeSet<TargetKey> = enclosing
                .iter()
                .filter(|c| c.model == simple.model.id)
                .map(|c| TargetKey::set_value(c))
                .collect();

            match leaves.get_mut(&simple.id) {
                Some(existing) => {
                    if existing.task != simple {
                        return Err(ValidationError::invalid_task(format!(
                            "task '{}' appears more than once with different definitions",
                            simple.id
                        )));
                    }
                    existing.inherited.extend(inherited);
                }
                None => {
                    leaves.insert(simple.id.clone(), Leaf { task: simple, inherited });
                }
            }
        }
        Task::Repeated(repeated) => {
            let depth = enclosing.len();
            enclosing.extend(repeated.changes.iter());
            for sub in &repeated.sub_tasks {
                walk(&sub.task, enclosing, leaves)?;
            }
            enclosing.truncate(depth);
        }
    }
    Ok(())
}

/// Validates `task` and `variables` and returns the flattened leaves.
///
/// Checks that execution depends on always run. With `structural` set,
/// cosmetic problems such as empty or duplicate ids are rejected too.
pub(crate) fn validate<'a>(
    task: &'a Task,
    variables: &[Variable],
    structural: bool,
) -> Result<BTreeMap<String, Leaf<'a>>, ValidationError> {
    check_task(task, structural)?;
    let leaves = flatten(task)?;
    check_variables(variables, &leaves, structural)?;
    Ok(leaves)
}

fn check_task(task: &Task, structural: bool) -> Result<(), ValidationError> {
    if structural && task.id().trim().is_empty() {
        return Err(ValidationError::invalid_task("task ids must be non-empty"));
    }
    match task {
        Task::Simple(simple) => check_simple(simple, structural),
        Task::Repeated(repeated) => check_repeated(repeated, structural),
    }
}

fn check_simple(task: &SimpleTask, structural: bool) -> Result<(), ValidationError> {
    if let Simulation::UniformTimeCourse(tc) = &task.simulation {
        tc.total_steps().map_err(|e| match e {
            ValidationError::InvalidTask { reason } => {
                ValidationError::invalid_task(format!("task '{}': {reason}", task.id))
            }
            other => other,
        })?;
    }
    if structural {
        if task.model.id.trim().is_empty() {
            return Err(ValidationError::invalid_task(format!("model of task '{}' has an empty id", task.id)));
        }
        if task.model.changes.iter().any(|c| c.target.trim().is_empty()) {
            return Err(ValidationError::invalid_task(format!(
                "model '{}' has a change with an empty target",
                task.model.id
            )));
        }
    }
    Ok(())
}

fn models_in(task: &Task, out: &mut HashSet<String>) {
    match task {
        Task::Simple(simple) => {
            out.insert(simple.model.id.clone());
        }
        Task::Repeated(repeated) => {
            for sub in &repeated.sub_tasks {
                models_in(&sub.task, out);
            }
        }
    }
}

fn check_repeated(task: &RepeatedTask, structural: bool) -> Result<(), ValidationError> {
    if task.repetitions == 0 {
        return Err(ValidationError::invalid_task(format!(
            "repeated task '{}' must have at least one repetition",
            task.id
        )));
    }
    if task.sub_tasks.is_empty() {
        return Err(ValidationError::invalid_task(format!("repeated task '{}' has no sub-tasks", task.id)));
    }
    for change in &task.changes {
        if change.values.len() != task.repetitions {
            return Err(ValidationError::invalid_task(format!(
                "change of '{}' in repeated task '{}' has {} values for {} repetitions",
                change.target,
                task.id,
                change.values.len(),
                task.repetitions
            )));
        }
    }

    if structural {
        let mut models = HashSet::new();
        for sub in &task.sub_tasks {
            models_in(&sub.task, &mut models);
        }
        if let Some(change) = task.changes.iter().find(|c| !models.contains(&c.model)) {
            return Err(ValidationError::invalid_task(format!(
                "repeated task '{}' changes model '{}' which none of its sub-tasks run",
                task.id, change.model
            )));
        }
    }

    for sub in &task.sub_tasks {
        check_task(&sub.task, structural)?;
    }
    Ok(())
}

fn check_variables(
    variables: &[Variable],
    leaves: &BTreeMap<String, Leaf<'_>>,
    structural: bool,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(variables.len());
    for v in variables {
        if structural {
            if v.id.trim().is_empty() {
                return Err(ValidationError::invalid_task("variable ids must be non-empty"));
            }
            if !seen.insert(v.id.as_str()) {
                return Err(ValidationError::invalid_task(format!("variable id '{}' is used more than once", v.id)));
            }
        }
        match (&v.target, &v.symbol) {
            (Some(_), None) | (None, Some(_)) => {}
            (Some(_), Some(_)) => {
                return Err(ValidationError::invalid_task(format!(
                    "variable '{}' must have a target or a symbol, not both",
                    v.id
                )));
            }
            (None, None) => {
                return Err(ValidationError::invalid_task(format!(
                    "variable '{}' must have a target or a symbol",
                    v.id
                )));
            }
        }
        if !leaves.values().any(|leaf| v.applies_to(&leaf.task.model.id)) {
            return Err(ValidationError::invalid_task(format!(
                "variable '{}' does not apply to any model of the task",
                v.id
            )));
        }
    }
    Ok(())
}
