//! Typed solver settings, one struct per catalog algorithm.
//!
//! Settings start from catalog defaults, absorb validated parameter changes,
//! and are then written to the engine by engine parameter name.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{AlgorithmCatalogEntry, ParameterSpec, SolverRole};
use crate::engine::{Engine, EngineError};
use crate::value::ParameterValue;

/// One value to write to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParameter {
    pub name: String,
    pub alias: Option<String>,
    pub value: ParameterValue,
}

impl SolverParameter {
    fn new(name: &str, value: ParameterValue) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
            value,
        }
    }

    fn aliased(name: &str, alias: &str, value: ParameterValue) -> Self {
        Self {
            name: name.to_string(),
            alias: Some(alias.to_string()),
            value,
        }
    }
}

fn push_opt(out: &mut Vec<SolverParameter>, name: &str, value: Option<f64>) {
    if let Some(v) = value {
        out.push(SolverParameter::new(name, ParameterValue::Float(v)));
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CvodeSettings {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
    pub maximum_bdf_order: i64,
    pub maximum_adams_order: i64,
    pub maximum_num_steps: i64,
    pub maximum_time_step: Option<f64>,
    pub minimum_time_step: Option<f64>,
    pub initial_time_step: Option<f64>,
    pub stiff: bool,
    pub multiple_steps: bool,
}

impl Default for CvodeSettings {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-6,
            absolute_tolerance: 1e-12,
            maximum_bdf_order: 5,
            maximum_adams_order: 12,
            maximum_num_steps: 20000,
            maximum_time_step: None,
            minimum_time_step: None,
            initial_time_step: None,
            stiff: true,
            multiple_steps: false,
        }
    }
}

impl CvodeSettings {
    fn set(&mut self, kisao_id: &str, value: ParameterValue) -> Option<()> {
        match kisao_id {
            "KISAO_0000209" => self.relative_tolerance = value.as_float()?,
            "KISAO_0000211" => self.absolute_tolerance = value.as_float()?,
            "KISAO_0000220" => self.maximum_bdf_order = value.as_integer()?,
            "KISAO_0000219" => self.maximum_adams_order = value.as_integer()?,
            "KISAO_0000415" => self.maximum_num_steps = value.as_integer()?,
            "KISAO_0000467" => self.maximum_time_step = Some(value.as_float()?),
            "KISAO_0000485" => self.minimum_time_step = Some(value.as_float()?),
            "KISAO_0000559" => self.initial_time_step = Some(value.as_float()?),
            "KISAO_0000671" => self.stiff = value.as_bool()?,
            "KISAO_0000670" => self.multiple_steps = value.as_bool()?,
            _ => return None,
        }
        Some(())
    }

    fn parameters(&self) -> Vec<SolverParameter> {
        let mut out = vec![
            SolverParameter::new("relative_tolerance", self.relative_tolerance.into()),
            SolverParameter::new("absolute_tolerance", self.absolute_tolerance.into()),
            SolverParameter::aliased("maximum_bdf_order", "max_bdf_order", self.maximum_bdf_order.into()),
            SolverParameter::aliased("maximum_adams_order", "max_adams_order", self.maximum_adams_order.into()),
            SolverParameter::aliased("maximum_num_steps", "max_steps", self.maximum_num_steps.into()),
        ];
        push_opt(&mut out, "maximum_time_step", self.maximum_time_step);
        push_opt(&mut out, "minimum_time_step", self.minimum_time_step);
        push_opt(&mut out, "initial_time_step", self.initial_time_step);
        out.push(SolverParameter::new("stiff", self.stiff.into()));
        out.push(SolverParameter::new("multiple_steps", self.multiple_steps.into()));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rk45Settings {
    pub maximum_time_step: f64,
    pub minimum_time_step: f64,
    pub epsilon: f64,
}

impl Default for Rk45Settings {
    fn default() -> Self {
        Self {
            maximum_time_step: 1.0,
            minimum_time_step: 1e-12,
            epsilon: 1e-12,
        }
    }
}

impl Rk45Settings {
    fn set(&mut self, kisao_id: &str, value: ParameterValue) -> Option<()> {
        match kisao_id {
            "KISAO_0000467" => self.maximum_time_step = value.as_float()?,
            "KISAO_0000485" => self.minimum_time_step = value.as_float()?,
            "KISAO_0000597" => self.epsilon = value.as_float()?,
            _ => return None,
        }
        Some(())
    }

    fn parameters(&self) -> Vec<SolverParameter> {
        vec![
            SolverParameter::new("maximum_time_step", self.maximum_time_step.into()),
            SolverParameter::new("minimum_time_step", self.minimum_time_step.into()),
            SolverParameter::new("epsilon", self.epsilon.into()),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GillespieSettings {
    pub seed: Option<i64>,
    pub nonnegative: bool,
}

impl GillespieSettings {
    fn set(&mut self, kisao_id: &str, value: ParameterValue) -> Option<()> {
        match kisao_id {
            "KISAO_0000488" => self.seed = Some(value.as_integer()?),
            "KISAO_0000673" => self.nonnegative = value.as_bool()?,
            _ => return None,
        }
        Some(())
    }

    fn parameters(&self) -> Vec<SolverParameter> {
        let mut out = Vec::with_capacity(2);
        if let Some(seed) = self.seed {
            out.push(SolverParameter::new("seed", seed.into()));
        }
        out.push(SolverParameter::new("nonnegative", self.nonnegative.into()));
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nleq2Settings {
    pub relative_tolerance: f64,
    pub maximum_iterations: i64,
    pub minimum_damping: f64,
    pub allow_presimulation: bool,
    pub broyden_method: i64,
    pub linearity: i64,
    pub presimulation_maximum_steps: i64,
    pub approx_maximum_steps: i64,
    pub approx_time: f64,
    pub presimulation_time: f64,
    pub allow_approx: bool,
    pub approx_tolerance: f64,
}

impl Default for Nleq2Settings {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-12,
            maximum_iterations: 100,
            minimum_damping: 1e-20,
            allow_presimulation: false,
            broyden_method: 0,
            linearity: 3,
            presimulation_maximum_steps: 100,
            approx_maximum_steps: 10000,
            approx_time: 10000.0,
            presimulation_time: 100.0,
            allow_approx: false,
            approx_tolerance: 1e-6,
        }
    }
}

impl Nleq2Settings {
    fn set(&mut self, kisao_id: &str, value: ParameterValue) -> Option<()> {
        match kisao_id {
            "KISAO_0000209" => self.relative_tolerance = value.as_float()?,
            "KISAO_0000486" => self.maximum_iterations = value.as_integer()?,
            "KISAO_0000487" => self.minimum_damping = value.as_float()?,
            "KISAO_0000674" => self.allow_presimulation = value.as_bool()?,
            "KISAO_0000675" => self.broyden_method = value.as_integer()?,
            "KISAO_0000676" => self.linearity = value.as_integer()?,
            "KISAO_0000677" => self.presimulation_maximum_steps = value.as_integer()?,
            "KISAO_0000678" => self.approx_maximum_steps = value.as_integer()?,
            "KISAO_0000679" => self.approx_time = value.as_float()?,
            "KISAO_0000680" => self.presimulation_time = value.as_float()?,
            "KISAO_0000682" => self.allow_approx = value.as_bool()?,
            "KISAO_0000683" => self.approx_tolerance = value.as_float()?,
            _ => return None,
        }
        Some(())
    }

    fn parameters(&self) -> Vec<SolverParameter> {
        vec![
            SolverParameter::new("relative_tolerance", self.relative_tolerance.into()),
            SolverParameter::new("maximum_iterations", self.maximum_iterations.into()),
            SolverParameter::new("minimum_damping", self.minimum_damping.into()),
            SolverParameter::new("allow_presimulation", self.allow_presimulation.into()),
            SolverParameter::new("broyden_method", self.broyden_method.into()),
            SolverParameter::new("linearity", self.linearity.into()),
            SolverParameter::new("presimulation_maximum_steps", self.presimulation_maximum_steps.into()),
            SolverParameter::new("approx_maximum_steps", self.approx_maximum_steps.into()),
            SolverParameter::new("approx_time", self.approx_time.into()),
            SolverParameter::new("presimulation_time", self.presimulation_time.into()),
            SolverParameter::new("allow_approx", self.allow_approx.into()),
            SolverParameter::new("approx_tolerance", self.approx_tolerance.into()),
        ]
    }
}

/// Settings for catalog entries outside the standard set, keyed by engine
/// parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenericSettings {
    pub values: BTreeMap<String, ParameterValue>,
}

/// Resolved settings for the algorithm a leaf runs with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "algorithm", content = "settings", rename_all = "snake_case")]
pub enum SolverSettings {
    Cvode(CvodeSettings),
    Euler,
    Rk4,
    Rk45(Rk45Settings),
    Gillespie(GillespieSettings),
    Nleq2(Nleq2Settings),
    Generic(GenericSettings),
}

impl SolverSettings {
    /// Builds settings for `entry`, seeded with the entry's declared defaults.
    #[must_use]
    pub fn for_entry(entry: &AlgorithmCatalogEntry) -> Self {
        let mut settings = match entry.engine_id.as_str() {
            "cvode" => Self::Cvode(CvodeSettings::default()),
            "euler" if entry.parameters.is_empty() => Self::Euler,
            "rk4" if entry.parameters.is_empty() => Self::Rk4,
            "rk45" => Self::Rk45(Rk45Settings::default()),
            "gillespie" => Self::Gillespie(GillespieSettings::default()),
            "nleq2" => Self::Nleq2(Nleq2Settings::default()),
            _ => Self::Generic(GenericSettings::default()),
        };
        for spec in &entry.parameters {
            if let Some(default) = spec.default {
                if !settings.set(spec, default) {
                    // A custom entry declared a parameter the typed struct
                    // has no slot for.
                    let mut generic = GenericSettings::default();
                    for p in settings.parameters() {
                        generic.values.insert(p.name, p.value);
                    }
                    generic.values.insert(spec.engine_id.clone(), default);
                    settings = Self::Generic(generic);
                }
            }
        }
        settings
    }

    /// Sets one parameter. Returns false if these settings have no slot for
    /// it or the value has the wrong type.
    pub fn set(&mut self, spec: &ParameterSpec, value: ParameterValue) -> bool {
        let id = spec.kisao_id.as_str();
        match self {
            Self::Cvode(s) => s.set(id, value).is_some(),
            Self::Rk45(s) => s.set(id, value).is_some(),
            Self::Gillespie(s) => s.set(id, value).is_some(),
            Self::Nleq2(s) => s.set(id, value).is_some(),
            Self::Euler | Self::Rk4 => false,
            Self::Generic(s) => {
                s.values.insert(spec.engine_id.clone(), value);
                true
            }
        }
    }

    /// Values to write to the engine, in a stable order.
    #[must_use]
    pub fn parameters(&self) -> Vec<SolverParameter> {
        match self {
            Self::Cvode(s) => s.parameters(),
            Self::Rk45(s) => s.parameters(),
            Self::Gillespie(s) => s.parameters(),
            Self::Nleq2(s) => s.parameters(),
            Self::Euler | Self::Rk4 => Vec::new(),
            Self::Generic(s) => s
                .values
                .iter()
                .map(|(name, value)| SolverParameter::new(name, *value))
                .collect(),
        }
    }

    /// Writes every value to the engine, falling back to the alias when the
    /// engine refuses the primary name.
    ///
    /// Returns the parameters the engine refused under every name.
    pub fn apply(&self, engine: &mut dyn Engine, role: SolverRole) -> Vec<(String, EngineError)> {
        let mut refused = Vec::new();
        for p in self.parameters() {
            let Err(err) = engine.set_solver_parameter(role, &p.name, p.value) else {
                continue;
            };
            let retried = p
                .alias
                .as_deref()
                .is_some_and(|alias| engine.set_solver_parameter(role, alias, p.value).is_ok());
            if !retried {
                refused.push((p.name, err));
            }
        }
        refused
    }
}
