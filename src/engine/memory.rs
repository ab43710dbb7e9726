//! In-memory reference engine.
//!
//! This module provides an [`Engine`] whose species follow uncoupled linear
//! kinetics, `dX/dt = k_in - k_out * X`, solved in closed form. It is intended
//! for embedded usage, tests, and as a reference implementation of the engine
//! contract. Stochastic integrators return the deterministic mean.
//!
//! Model definitions are JSON documents, either registered with the factory
//! under a path or read from disk.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::{ComponentKind, Engine, EngineError, EngineFactory, ModelDescription, ModelReader, TIME_ID};
use crate::algorithm::SolverRole;
use crate::value::ParameterValue;

const CVODE_PARAMETERS: &[&str] = &[
    "relative_tolerance",
    "absolute_tolerance",
    "maximum_bdf_order",
    "maximum_adams_order",
    "maximum_num_steps",
    "maximum_time_step",
    "minimum_time_step",
    "initial_time_step",
    "stiff",
    "multiple_steps",
];
const RK45_PARAMETERS: &[&str] = &["maximum_time_step", "minimum_time_step", "epsilon"];
const GILLESPIE_PARAMETERS: &[&str] = &["seed", "nonnegative"];
const NLEQ2_PARAMETERS: &[&str] = &[
    "relative_tolerance",
    "maximum_iterations",
    "minimum_damping",
    "allow_presimulation",
    "broyden_method",
    "linearity",
    "presimulation_maximum_steps",
    "approx_maximum_steps",
    "approx_time",
    "presimulation_time",
    "allow_approx",
    "approx_tolerance",
];

fn known_parameters(role: SolverRole, solver: &str) -> Option<&'static [&'static str]> {
    match (role, solver) {
        (SolverRole::Integrator, "cvode") => Some(CVODE_PARAMETERS),
        (SolverRole::Integrator, "euler" | "rk4") => Some(&[]),
        (SolverRole::Integrator, "rk45") => Some(RK45_PARAMETERS),
        (SolverRole::Integrator, "gillespie") => Some(GILLESPIE_PARAMETERS),
        (SolverRole::SteadyState, "nleq2") => Some(NLEQ2_PARAMETERS),
        _ => None,
    }
}

const DEFAULT_APPROX_TIME: f64 = 10_000.0;
const DEFAULT_APPROX_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompartmentDef {
    pub id: String,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesDef {
    pub id: String,
    pub compartment: String,
    pub initial_concentration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    pub id: String,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    /// Zero-order synthesis at rate `k`.
    Production,
    /// First-order decay at rate `k * X`.
    Degradation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionDef {
    pub id: String,
    pub kind: ReactionKind,
    pub species: String,
    /// Parameter holding the rate constant.
    pub rate_constant: String,
}

/// A model understood by the reference engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub compartments: Vec<CompartmentDef>,
    #[serde(default)]
    pub species: Vec<SpeciesDef>,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub reactions: Vec<ReactionDef>,
    /// Largest normalized distance from the fixed point, `|X - Xss| / (1 + |Xss|)`,
    /// from which the steady-state solver converges. `None` means always.
    #[serde(default)]
    pub steady_state_basin: Option<f64>,
    /// Problems reported by the model reader.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ModelDefinition {
    #[must_use]
    pub fn compartment(mut self, id: &str, size: f64) -> Self {
        self.compartments.push(CompartmentDef { id: id.to_string(), size });
        self
    }

    #[must_use]
    pub fn species(mut self, id: &str, compartment: &str, initial_concentration: f64) -> Self {
        self.species.push(SpeciesDef {
            id: id.to_string(),
            compartment: compartment.to_string(),
            initial_concentration,
        });
        self
    }

    #[must_use]
    pub fn parameter(mut self, id: &str, value: f64) -> Self {
        self.parameters.push(ParameterDef { id: id.to_string(), value });
        self
    }

    #[must_use]
    pub fn reaction(mut self, id: &str, kind: ReactionKind, species: &str, rate_constant: &str) -> Self {
        self.reactions.push(ReactionDef {
            id: id.to_string(),
            kind,
            species: species.to_string(),
            rate_constant: rate_constant.to_string(),
        });
        self
    }

    #[must_use]
    pub fn with_basin(mut self, basin: f64) -> Self {
        self.steady_state_basin = Some(basin);
        self
    }

    /// Structural problems plus reported errors.
    #[must_use]
    pub fn problems(&self) -> Vec<String> {
        let mut problems = self.errors.clone();

        let mut ids = HashSet::new();
        let all_ids = self
            .compartments
            .iter()
            .map(|c| c.id.as_str())
            .chain(self.species.iter().map(|s| s.id.as_str()))
            .chain(self.parameters.iter().map(|p| p.id.as_str()))
            .chain(self.reactions.iter().map(|r| r.id.as_str()));
        for id in all_ids {
            if id == TIME_ID {
                problems.push(format!("'{TIME_ID}' is reserved and cannot be a component id"));
            } else if !ids.insert(id) {
                problems.push(format!("component id '{id}' is used more than once"));
            }
        }

        for s in &self.species {
            if !self.compartments.iter().any(|c| c.id == s.compartment) {
                problems.push(format!("species '{}' refers to unknown compartment '{}'", s.id, s.compartment));
            }
        }
        for r in &self.reactions {
            if !self.species.iter().any(|s| s.id == r.species) {
                problems.push(format!("reaction '{}' refers to unknown species '{}'", r.id, r.species));
            }
            if !self.parameters.iter().any(|p| p.id == r.rate_constant) {
                problems.push(format!("reaction '{}' refers to unknown parameter '{}'", r.id, r.rate_constant));
            }
        }
        problems
    }

    /// Component listing as a model reader reports it.
    #[must_use]
    pub fn description(&self) -> ModelDescription {
        let mut components = BTreeMap::new();
        components.insert(ComponentKind::Species, self.species.iter().map(|s| s.id.clone()).collect());
        components.insert(ComponentKind::Parameter, self.parameters.iter().map(|p| p.id.clone()).collect());
        components.insert(ComponentKind::Compartment, self.compartments.iter().map(|c| c.id.clone()).collect());
        components.insert(ComponentKind::Reaction, self.reactions.iter().map(|r| r.id.clone()).collect());
        ModelDescription {
            components,
            errors: self.problems(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Time,
    Concentration(usize),
    Amount(usize),
    Parameter(usize),
    Compartment(usize),
    Reaction(usize),
}

/// Model state that evolves and resets.
#[derive(Debug, Clone, PartialEq)]
struct State {
    concentrations: Vec<f64>,
    parameters: Vec<f64>,
    sizes: Vec<f64>,
    time: f64,
}

/// Reference engine over a [`ModelDefinition`].
#[derive(Debug)]
pub struct MemoryEngine {
    model: Arc<ModelDefinition>,
    // Index of each species' compartment and of each reaction's species and parameter.
    species_compartment: Vec<usize>,
    reaction_links: Vec<(usize, usize)>,
    initial: State,
    state: State,
    integrator: String,
    steady_state_solver: String,
    integrator_parameters: BTreeMap<String, ParameterValue>,
    steady_state_parameters: BTreeMap<String, ParameterValue>,
    time_course_selections: Vec<Quantity>,
    steady_state_selections: Vec<Quantity>,
}

fn position<T>(items: &[T], id: &str, key: impl Fn(&T) -> &str) -> Option<usize> {
    items.iter().position(|item| key(item) == id)
}

fn evolve(x0: f64, k_in: f64, k_out: f64, dt: f64) -> f64 {
    if k_out == 0.0 {
        x0 + k_in * dt
    } else {
        let xss = k_in / k_out;
        xss + (x0 - xss) * (-k_out * dt).exp()
    }
}

impl MemoryEngine {
    /// Builds an engine, rejecting structurally invalid definitions.
    pub fn new(model: Arc<ModelDefinition>) -> Result<Self, EngineError> {
        let problems = model.problems();
        if !problems.is_empty() {
            return Err(EngineError::Backend(problems.join("; ")));
        }

        let mut species_compartment = Vec::with_capacity(model.species.len());
        for s in &model.species {
            let idx = position(&model.compartments, &s.compartment, |c| c.id.as_str())
                .ok_or_else(|| EngineError::UnknownQuantity(s.compartment.clone()))?;
            species_compartment.push(idx);
        }
        let mut reaction_links = Vec::with_capacity(model.reactions.len());
        for r in &model.reactions {
            let s = position(&model.species, &r.species, |s| s.id.as_str())
                .ok_or_else(|| EngineError::UnknownQuantity(r.species.clone()))?;
            let p = position(&model.parameters, &r.rate_constant, |p| p.id.as_str())
                .ok_or_else(|| EngineError::UnknownQuantity(r.rate_constant.clone()))?;
            reaction_links.push((s, p));
        }

        let initial = State {
            concentrations: model.species.iter().map(|s| s.initial_concentration).collect(),
            parameters: model.parameters.iter().map(|p| p.value).collect(),
            sizes: model.compartments.iter().map(|c| c.size).collect(),
            time: 0.0,
        };

        Ok(Self {
            model,
            species_compartment,
            reaction_links,
            state: initial.clone(),
            initial,
            integrator: "cvode".to_string(),
            steady_state_solver: "nleq2".to_string(),
            integrator_parameters: BTreeMap::new(),
            steady_state_parameters: BTreeMap::new(),
            time_course_selections: Vec::new(),
            steady_state_selections: Vec::new(),
        })
    }

    fn quantity(&self, id: &str) -> Result<Quantity, EngineError> {
        if id == TIME_ID {
            return Ok(Quantity::Time);
        }
        if let Some(inner) = id.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return position(&self.model.species, inner, |s| s.id.as_str())
                .map(Quantity::Concentration)
                .ok_or_else(|| EngineError::UnknownQuantity(id.to_string()));
        }
        let m = &self.model;
        position(&m.species, id, |s| s.id.as_str())
            .map(Quantity::Amount)
            .or_else(|| position(&m.parameters, id, |p| p.id.as_str()).map(Quantity::Parameter))
            .or_else(|| position(&m.compartments, id, |c| c.id.as_str()).map(Quantity::Compartment))
            .or_else(|| position(&m.reactions, id, |r| r.id.as_str()).map(Quantity::Reaction))
            .ok_or_else(|| EngineError::UnknownQuantity(id.to_string()))
    }

    fn selections(&self, ids: &[String]) -> Result<Vec<Quantity>, EngineError> {
        ids.iter().map(|id| self.quantity(id)).collect()
    }

    /// Net synthesis and decay constants of each species.
    fn rates(&self) -> Vec<(f64, f64)> {
        let mut rates = vec![(0.0, 0.0); self.model.species.len()];
        for (r, &(s, p)) in self.model.reactions.iter().zip(&self.reaction_links) {
            let k = self.state.parameters[p];
            match r.kind {
                ReactionKind::Production => rates[s].0 += k,
                ReactionKind::Degradation => rates[s].1 += k,
            }
        }
        rates
    }

    fn evolved(&self, rates: &[(f64, f64)], dt: f64) -> Vec<f64> {
        self.state
            .concentrations
            .iter()
            .zip(rates)
            .map(|(&x, &(k_in, k_out))| evolve(x, k_in, k_out, dt))
            .collect()
    }

    fn read(&self, q: Quantity, concentrations: &[f64], time: f64) -> f64 {
        match q {
            Quantity::Time => time,
            Quantity::Concentration(i) => concentrations[i],
            Quantity::Amount(i) => concentrations[i] * self.state.sizes[self.species_compartment[i]],
            Quantity::Parameter(i) => self.state.parameters[i],
            Quantity::Compartment(i) => self.state.sizes[i],
            Quantity::Reaction(i) => {
                let (s, p) = self.reaction_links[i];
                let k = self.state.parameters[p];
                match self.model.reactions[i].kind {
                    ReactionKind::Production => k,
                    ReactionKind::Degradation => k * concentrations[s],
                }
            }
        }
    }

    fn steady_state_parameter(&self, name: &str) -> Option<ParameterValue> {
        self.steady_state_parameters.get(name).copied()
    }

    /// Fixed point of every species, or the first species without one.
    fn fixed_point(&self, rates: &[(f64, f64)]) -> Result<Vec<f64>, EngineError> {
        let mut target = Vec::with_capacity(rates.len());
        for (i, &(k_in, k_out)) in rates.iter().enumerate() {
            let x = self.state.concentrations[i];
            if k_out > 0.0 {
                target.push(k_in / k_out);
            } else if k_in == 0.0 {
                target.push(x);
            } else {
                return Err(EngineError::SteadyState(format!(
                    "species '{}' has no fixed point",
                    self.model.species[i].id
                )));
            }
        }
        Ok(target)
    }

    fn distance(x: f64, xss: f64) -> f64 {
        (x - xss).abs() / (1.0 + xss.abs())
    }
}

impl Engine for MemoryEngine {
    fn set_integrator(&mut self, name: &str) -> Result<(), EngineError> {
        if known_parameters(SolverRole::Integrator, name).is_none() {
            return Err(EngineError::UnknownSolver {
                role: SolverRole::Integrator,
                name: name.to_string(),
            });
        }
        if self.integrator != name {
            self.integrator = name.to_string();
            self.integrator_parameters.clear();
        }
        Ok(())
    }

    fn set_steady_state_solver(&mut self, name: &str) -> Result<(), EngineError> {
        if known_parameters(SolverRole::SteadyState, name).is_none() {
            return Err(EngineError::UnknownSolver {
                role: SolverRole::SteadyState,
                name: name.to_string(),
            });
        }
        if self.steady_state_solver != name {
            self.steady_state_solver = name.to_string();
            self.steady_state_parameters.clear();
        }
        Ok(())
    }

    fn solver_name(&self, role: SolverRole) -> String {
        match role {
            SolverRole::Integrator => self.integrator.clone(),
            SolverRole::SteadyState => self.steady_state_solver.clone(),
        }
    }

    fn set_solver_parameter(&mut self, role: SolverRole, name: &str, value: ParameterValue) -> Result<(), EngineError> {
        let (solver, params) = match role {
            SolverRole::Integrator => (&self.integrator, &mut self.integrator_parameters),
            SolverRole::SteadyState => (&self.steady_state_solver, &mut self.steady_state_parameters),
        };
        let known = known_parameters(role, solver).unwrap_or(&[]);
        if !known.contains(&name) {
            return Err(EngineError::UnknownParameter {
                solver: solver.clone(),
                parameter: name.to_string(),
            });
        }
        params.insert(name.to_string(), value);
        Ok(())
    }

    fn solver_parameters(&self, role: SolverRole) -> Vec<(String, ParameterValue)> {
        let params = match role {
            SolverRole::Integrator => &self.integrator_parameters,
            SolverRole::SteadyState => &self.steady_state_parameters,
        };
        params.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    fn get_value(&self, id: &str) -> Result<f64, EngineError> {
        let q = self.quantity(id)?;
        Ok(self.read(q, &self.state.concentrations, self.state.time))
    }

    fn set_value(&mut self, id: &str, value: f64) -> Result<(), EngineError> {
        match self.quantity(id)? {
            Quantity::Concentration(i) => self.state.concentrations[i] = value,
            Quantity::Amount(i) => {
                let size = self.state.sizes[self.species_compartment[i]];
                self.state.concentrations[i] = value / size;
            }
            Quantity::Parameter(i) => self.state.parameters[i] = value,
            Quantity::Compartment(i) => self.state.sizes[i] = value,
            Quantity::Time | Quantity::Reaction(_) => return Err(EngineError::ReadOnly(id.to_string())),
        }
        Ok(())
    }

    fn quantity_ids(&self) -> Vec<String> {
        let m = &self.model;
        let mut ids = vec![TIME_ID.to_string()];
        ids.extend(m.species.iter().map(|s| format!("[{}]", s.id)));
        ids.extend(m.species.iter().map(|s| s.id.clone()));
        ids.extend(m.parameters.iter().map(|p| p.id.clone()));
        ids.extend(m.compartments.iter().map(|c| c.id.clone()));
        ids.extend(m.reactions.iter().map(|r| r.id.clone()));
        ids
    }

    fn set_time_course_selections(&mut self, ids: &[String]) -> Result<(), EngineError> {
        self.time_course_selections = self.selections(ids)?;
        Ok(())
    }

    fn set_steady_state_selections(&mut self, ids: &[String]) -> Result<(), EngineError> {
        let selections = self.selections(ids)?;
        if selections.contains(&Quantity::Time) {
            return Err(EngineError::UnknownQuantity(TIME_ID.to_string()));
        }
        self.steady_state_selections = selections;
        Ok(())
    }

    fn simulate(&mut self, start: f64, end: f64, points: usize) -> Result<Vec<Vec<f64>>, EngineError> {
        if points == 0 {
            return Err(EngineError::Simulation("at least one point is required".to_string()));
        }
        if !(end >= start) {
            return Err(EngineError::Simulation(format!("end time {end} precedes start time {start}")));
        }

        let rates = self.rates();
        #[allow(clippy::cast_precision_loss)]
        let step = if points > 1 { (end - start) / (points - 1) as f64 } else { 0.0 };

        let mut rows = Vec::with_capacity(points);
        for i in 0..points {
            #[allow(clippy::cast_precision_loss)]
            let t = if i + 1 == points { end } else { start + step * i as f64 };
            let concentrations = self.evolved(&rates, t - start);
            rows.push(
                self.time_course_selections
                    .iter()
                    .map(|&q| self.read(q, &concentrations, t))
                    .collect(),
            );
        }

        self.state.concentrations = self.evolved(&rates, end - start);
        self.state.time = end;
        Ok(rows)
    }

    fn steady_state(&mut self) -> Result<Vec<f64>, EngineError> {
        let rates = self.rates();
        let mut target = self.fixed_point(&rates)?;

        if let Some(basin) = self.model.steady_state_basin {
            let outside = self
                .state
                .concentrations
                .iter()
                .zip(&target)
                .position(|(&x, &xss)| Self::distance(x, xss) > basin);

            if let Some(i) = outside {
                let allow_approx = self
                    .steady_state_parameter("allow_approx")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if !allow_approx {
                    return Err(EngineError::SteadyState(format!(
                        "Newton iteration did not converge from the current value of '{}'",
                        self.model.species[i].id
                    )));
                }

                let approx_time = self
                    .steady_state_parameter("approx_time")
                    .and_then(|v| v.as_float())
                    .unwrap_or(DEFAULT_APPROX_TIME);
                let tolerance = self
                    .steady_state_parameter("approx_tolerance")
                    .and_then(|v| v.as_float())
                    .unwrap_or(DEFAULT_APPROX_TOLERANCE);
                let approx = self.evolved(&rates, approx_time);
                if approx
                    .iter()
                    .zip(&target)
                    .any(|(&x, &xss)| Self::distance(x, xss) > tolerance)
                {
                    return Err(EngineError::SteadyState(format!(
                        "approximation did not settle within {approx_time} time units"
                    )));
                }
                target = approx;
            }
        }

        self.state.concentrations = target;
        let time = self.state.time;
        Ok(self
            .steady_state_selections
            .iter()
            .map(|&q| self.read(q, &self.state.concentrations, time))
            .collect())
    }

    fn reset(&mut self) -> Result<(), EngineError> {
        self.state = self.initial.clone();
        Ok(())
    }
}

fn lock_err(context: &'static str) -> EngineError {
    EngineError::Backend(format!("poisoned lock: {context}"))
}

/// Loads [`MemoryEngine`]s and reads their model descriptions.
#[derive(Debug, Default)]
pub struct MemoryEngineFactory {
    models: RwLock<HashMap<PathBuf, Arc<ModelDefinition>>>,
    loads: AtomicUsize,
}

impl MemoryEngineFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition under `source`, shadowing any file there.
    pub fn register(&self, source: impl Into<PathBuf>, model: ModelDefinition) -> Result<(), EngineError> {
        let mut models = self.models.write().map_err(|_| lock_err("models"))?;
        models.insert(source.into(), Arc::new(model));
        Ok(())
    }

    /// Number of engines loaded so far.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    fn definition(&self, source: &Path) -> Result<Arc<ModelDefinition>, EngineError> {
        {
            let models = self.models.read().map_err(|_| lock_err("models"))?;
            if let Some(model) = models.get(source) {
                return Ok(Arc::clone(model));
            }
        }

        let load_err = |reason: String| EngineError::Load {
            source_path: source.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(source).map_err(|e| load_err(e.to_string()))?;
        let model: ModelDefinition = serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))?;
        Ok(Arc::new(model))
    }
}

impl EngineFactory for MemoryEngineFactory {
    fn load(&self, source: &Path) -> Result<Box<dyn Engine>, EngineError> {
        let model = self.definition(source)?;
        let engine = MemoryEngine::new(model).map_err(|e| EngineError::Load {
            source_path: source.display().to_string(),
            reason: e.to_string(),
        })?;
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(engine))
    }
}

impl ModelReader for MemoryEngineFactory {
    fn supports_language(&self, language: &str) -> bool {
        language.starts_with("urn:sedml:language:sbml")
    }

    fn read(&self, source: &Path, _language: &str) -> Result<ModelDescription, EngineError> {
        Ok(self.definition(source)?.description())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn decay() -> ModelDefinition {
        ModelDefinition::default()
            .compartment("cell", 2.0)
            .species("C", "cell", 1.0)
            .parameter("k_in", 0.5)
            .parameter("k_out", 0.25)
            .reaction("synthesis", ReactionKind::Production, "C", "k_in")
            .reaction("decay", ReactionKind::Degradation, "C", "k_out")
    }

    fn engine(model: ModelDefinition) -> MemoryEngine {
        MemoryEngine::new(Arc::new(model)).unwrap()
    }

    #[test]
    fn simulate_samples_closed_form() {
        let mut e = engine(decay());
        e.set_time_course_selections(&["time".to_string(), "[C]".to_string(), "C".to_string()]).unwrap();
        let rows = e.simulate(0.0, 4.0, 5).unwrap();
        assert_eq!(rows.len(), 5);
        assert_relative_eq!(rows[4][0], 4.0);
        // Xss = 2, X(t) = 2 - e^{-t/4}
        let expected = 2.0 - (-1.0f64).exp();
        assert_relative_eq!(rows[4][1], expected, epsilon = 1e-12);
        assert_relative_eq!(rows[4][2], expected * 2.0, epsilon = 1e-12);
        assert_relative_eq!(e.get_value("[C]").unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut e = engine(decay());
        e.set_value("k_out", 1.0).unwrap();
        e.simulate(0.0, 10.0, 2).unwrap();
        e.reset().unwrap();
        assert_relative_eq!(e.get_value("[C]").unwrap(), 1.0);
        assert_relative_eq!(e.get_value("k_out").unwrap(), 0.25);
    }

    #[test]
    fn amounts_scale_with_compartment_size() {
        let mut e = engine(decay());
        e.set_value("C", 3.0).unwrap();
        assert_relative_eq!(e.get_value("[C]").unwrap(), 1.5);
        assert!(e.set_value("decay", 1.0).is_err());
        assert!(e.set_value("time", 1.0).is_err());
    }

    #[test]
    fn steady_state_reaches_fixed_point() {
        let mut e = engine(decay());
        e.set_steady_state_selections(&["[C]".to_string(), "decay".to_string()]).unwrap();
        let values = e.steady_state().unwrap();
        assert_relative_eq!(values[0], 2.0);
        assert_relative_eq!(values[1], 0.5);
    }

    #[test]
    fn steady_state_fails_without_fixed_point() {
        let mut e = engine(decay());
        e.set_value("k_out", 0.0).unwrap();
        assert!(matches!(e.steady_state(), Err(EngineError::SteadyState(_))));
    }

    #[test]
    fn basin_requires_presimulation_or_approximation() {
        // Normalized distance from C=1 to Xss=2 is 1/3.
        let mut e = engine(decay().with_basin(0.1));
        assert!(e.steady_state().is_err());

        e.simulate(0.0, 10.0, 2).unwrap();
        assert!(e.steady_state().is_ok());

        e.reset().unwrap();
        e.set_solver_parameter(SolverRole::SteadyState, "allow_approx", true.into()).unwrap();
        assert!(e.steady_state().is_ok());
    }

    #[test]
    fn solver_parameters_are_checked() {
        let mut e = engine(decay());
        assert!(e.set_solver_parameter(SolverRole::Integrator, "relative_tolerance", ParameterValue::Float(1e-8)).is_ok());
        assert!(e.set_solver_parameter(SolverRole::Integrator, "epsilon", ParameterValue::Float(1e-8)).is_err());
        e.set_integrator("rk45").unwrap();
        assert!(e.solver_parameters(SolverRole::Integrator).is_empty());
        assert!(e.set_integrator("lsoda").is_err());
        assert_eq!(e.solver_name(SolverRole::SteadyState), "nleq2");
    }

    #[test]
    fn time_is_not_a_steady_state_selection() {
        let mut e = engine(decay());
        assert!(e.set_steady_state_selections(&["time".to_string()]).is_err());
        assert!(e.set_time_course_selections(&["missing".to_string()]).is_err());
    }

    #[test]
    fn definitions_report_problems() {
        let model = decay().reaction("bad", ReactionKind::Production, "X", "k_in");
        assert_eq!(model.problems().len(), 1);
        assert!(!model.description().is_valid());
        assert!(MemoryEngine::new(Arc::new(model)).is_err());
    }

    #[test]
    fn factory_reads_definitions_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, serde_json::to_string(&decay()).unwrap()).unwrap();

        let factory = MemoryEngineFactory::new();
        let desc = factory.read(&path, "urn:sedml:language:sbml").unwrap();
        assert!(desc.contains(ComponentKind::Species, "C"));
        assert!(factory.load(&path).is_ok());
        assert_eq!(factory.load_count(), 1);
        assert!(factory.load(&dir.path().join("missing.json")).is_err());
        assert!(!factory.supports_language("urn:sedml:language:cellml"));
    }
}
