use std::fmt;

use super::{Simulation, Task, Variable};

/// Hash of everything preprocessing depends on.
///
/// Values that only matter at run time (change values, time-course bounds,
/// repetition counts) are left out, so a preprocessed task can be reused
/// while they vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskFingerprint(blake3::Hash);

struct ShapeHasher(blake3::Hasher);

impl ShapeHasher {
    fn str(&mut self, s: &str) {
        self.0.update(&(s.len() as u64).to_le_bytes());
        self.0.update(s.as_bytes());
    }

    fn opt(&mut self, s: Option<&str>) {
        match s {
            Some(s) => {
                self.0.update(&[1]);
                self.str(s);
            }
            None => {
                self.0.update(&[0]);
            }
        }
    }

    fn task(&mut self, task: &Task) {
        match task {
            Task::Simple(t) => {
                self.str("simple");
                self.str(&t.id);
                self.str(&t.model.id);
                self.str(&t.model.source.to_string_lossy());
                self.str(&t.model.language);
                for c in &t.model.changes {
                    self.str(&c.target);
                    self.opt(c.symbol.as_deref());
                }
                let algorithm = t.simulation.algorithm();
                self.str(match t.simulation {
                    Simulation::UniformTimeCourse(_) => "time_course",
                    Simulation::SteadyState(_) => "steady_state",
                });
                self.str(algorithm.kisao_id());
                for p in algorithm.changes() {
                    self.str(&p.kisao_id);
                    self.str(&p.new_value);
                }
            }
            Task::Repeated(t) => {
                self.str("repeated");
                self.str(&t.id);
                for c in &t.changes {
                    self.str(&c.model);
                    self.str(&c.target);
                    self.opt(c.symbol.as_deref());
                }
                for sub in t.ordered_sub_tasks() {
                    self.0.update(&sub.order.to_le_bytes());
                    self.task(&sub.task);
                }
                self.str("end");
            }
        }
    }
}

impl TaskFingerprint {
    /// Fingerprints `task` together with the variables it records.
    #[must_use]
    pub fn of(task: &Task, variables: &[Variable]) -> Self {
        let mut h = ShapeHasher(blake3::Hasher::new());
        h.task(task);
        for v in variables {
            h.str(&v.id);
            h.opt(v.target.as_deref());
            h.opt(v.symbol.as_deref());
            h.opt(v.model.as_deref());
        }
        Self(h.0.finalize())
    }
}

impl fmt::Display for TaskFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmSpec;
    use crate::task::{Model, ModelChange, SimpleTask, UniformTimeCourse};

    fn task(end: f64, value: f64, algorithm: &str) -> Task {
        Task::Simple(SimpleTask {
            id: "task".to_string(),
            model: Model::new("model", "model.json", "urn:sedml:language:sbml")
                .with_change(ModelChange::new("/sbml:sbml/sbml:model/sbml:listOfParameters/sbml:parameter[@id='k']", value)),
            simulation: Simulation::UniformTimeCourse(UniformTimeCourse {
                initial_time: 0.0,
                output_start_time: 0.0,
                output_end_time: end,
                number_of_steps: 10,
                algorithm: AlgorithmSpec::new(algorithm).unwrap(),
            }),
        })
    }

    #[test]
    fn run_time_values_do_not_change_the_shape() {
        let vars = [Variable::time("t")];
        assert_eq!(
            TaskFingerprint::of(&task(10.0, 1.0, "KISAO_0000019"), &vars),
            TaskFingerprint::of(&task(20.0, 2.0, "KISAO_0000019"), &vars)
        );
    }

    #[test]
    fn algorithm_and_variables_change_the_shape() {
        let vars = [Variable::time("t")];
        let base = TaskFingerprint::of(&task(10.0, 1.0, "KISAO_0000019"), &vars);
        assert_ne!(base, TaskFingerprint::of(&task(10.0, 1.0, "KISAO_0000030"), &vars));
        assert_ne!(base, TaskFingerprint::of(&task(10.0, 1.0, "KISAO_0000019"), &[Variable::time("time")]));
        assert_eq!(base.to_string().len(), 64);
    }
}
