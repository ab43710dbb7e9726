//! Simulation engine and model reader contracts.
//!
//! The numerical work lives behind these traits. By using traits, we enable:
//! - The in-memory reference engine for tests and embedded use
//! - Bindings to native simulators in production

pub mod memory;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithm::SolverRole;
use crate::value::ParameterValue;

/// Engine identifier of the simulation time.
pub const TIME_ID: &str = "time";

/// Errors reported by engines and model readers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// The model source could not be loaded.
    #[error("Failed to load '{source_path}': {reason}")]
    Load { source_path: String, reason: String },

    #[error("Unknown quantity: {0}")]
    UnknownQuantity(String),

    #[error("Unknown {role:?} solver: {name}")]
    UnknownSolver { role: SolverRole, name: String },

    #[error("Solver '{solver}' has no parameter '{parameter}'")]
    UnknownParameter { solver: String, parameter: String },

    #[error("Quantity '{0}' is read-only")]
    ReadOnly(String),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Steady state not found: {0}")]
    SteadyState(String),

    #[error("Engine backend error: {0}")]
    Backend(String),
}

/// Category of an addressable model component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Species,
    Parameter,
    Compartment,
    Reaction,
}

impl ComponentKind {
    pub const ALL: [Self; 4] = [Self::Species, Self::Parameter, Self::Compartment, Self::Reaction];

    /// XML element name of a component of this kind.
    #[must_use]
    pub const fn element(self) -> &'static str {
        match self {
            Self::Species => "species",
            Self::Parameter => "parameter",
            Self::Compartment => "compartment",
            Self::Reaction => "reaction",
        }
    }

    /// XML list element wrapping components of this kind.
    #[must_use]
    pub const fn list_element(self) -> &'static str {
        match self {
            Self::Species => "listOfSpecies",
            Self::Parameter => "listOfParameters",
            Self::Compartment => "listOfCompartments",
            Self::Reaction => "listOfReactions",
        }
    }

    /// Maps an element name back to a kind.
    #[must_use]
    pub fn from_element(element: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.element() == element)
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element())
    }
}

/// What a model reader learned about a model file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDescription {
    /// Component ids by category, in document order.
    pub components: BTreeMap<ComponentKind, Vec<String>>,
    /// Problems that make the model unusable.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ModelDescription {
    #[must_use]
    pub fn with_components(mut self, kind: ComponentKind, ids: &[&str]) -> Self {
        self.components
            .entry(kind)
            .or_default()
            .extend(ids.iter().map(|id| (*id).to_string()));
        self
    }

    /// Returns true if `id` names a component of `kind`.
    #[must_use]
    pub fn contains(&self, kind: ComponentKind, id: &str) -> bool {
        self.components.get(&kind).is_some_and(|ids| ids.iter().any(|c| c == id))
    }

    /// Component ids of `kind`.
    #[must_use]
    pub fn ids(&self, kind: ComponentKind) -> &[String] {
        self.components.get(&kind).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parses model files into component listings.
pub trait ModelReader: Send + Sync {
    /// Returns true if models in `language` can be read.
    fn supports_language(&self, language: &str) -> bool;

    /// Reads the model at `source`.
    fn read(&self, source: &Path, language: &str) -> Result<ModelDescription, EngineError>;
}

/// Loads models into fresh engine instances.
pub trait EngineFactory: Send + Sync {
    fn load(&self, source: &Path) -> Result<Box<dyn Engine>, EngineError>;
}

/// A live, stateful simulation of one model.
///
/// Selections fix the columns (time course) or entries (steady state) that
/// `simulate` and `steady_state` return.
pub trait Engine: Send {
    /// Activates the named time-course integrator.
    fn set_integrator(&mut self, name: &str) -> Result<(), EngineError>;

    /// Activates the named steady-state solver.
    fn set_steady_state_solver(&mut self, name: &str) -> Result<(), EngineError>;

    /// Name of the active solver for `role`.
    fn solver_name(&self, role: SolverRole) -> String;

    /// Sets a parameter of the active solver for `role`.
    fn set_solver_parameter(&mut self, role: SolverRole, name: &str, value: ParameterValue) -> Result<(), EngineError>;

    /// Live parameter values of the active solver for `role`.
    fn solver_parameters(&self, role: SolverRole) -> Vec<(String, ParameterValue)>;

    fn get_value(&self, id: &str) -> Result<f64, EngineError>;

    fn set_value(&mut self, id: &str, value: f64) -> Result<(), EngineError>;

    /// Every addressable engine identifier.
    fn quantity_ids(&self) -> Vec<String>;

    fn set_time_course_selections(&mut self, ids: &[String]) -> Result<(), EngineError>;

    fn set_steady_state_selections(&mut self, ids: &[String]) -> Result<(), EngineError>;

    /// Advances the model from `start` to `end`, sampling `points` evenly
    /// spaced rows (inclusive of both ends) of the time-course selections.
    fn simulate(&mut self, start: f64, end: f64, points: usize) -> Result<Vec<Vec<f64>>, EngineError>;

    /// Drives the model to steady state and returns the steady-state
    /// selections.
    fn steady_state(&mut self) -> Result<Vec<f64>, EngineError>;

    /// Restores the model to its loaded state.
    fn reset(&mut self) -> Result<(), EngineError>;
}
