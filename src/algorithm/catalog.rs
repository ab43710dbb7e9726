use std::collections::HashSet;

use serde::Serialize;

use crate::error::ValidationError;
use crate::value::{ParameterValue, ValueType};

/// What an algorithm is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverRole {
    /// Time-course integrator.
    Integrator,
    /// Steady-state solver.
    SteadyState,
}

/// Metadata for one tunable algorithm parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSpec {
    pub kisao_id: String,
    /// Name the engine knows the parameter by.
    pub engine_id: String,
    pub name: String,
    pub value_type: ValueType,
    pub default: Option<ParameterValue>,
    /// Alternative engine attribute name for the same setting.
    pub alias: Option<String>,
}

impl ParameterSpec {
    #[must_use]
    pub fn new(kisao_id: &str, engine_id: &str, name: &str, value_type: ValueType, default: Option<ParameterValue>) -> Self {
        Self {
            kisao_id: kisao_id.to_string(),
            engine_id: engine_id.to_string(),
            name: name.to_string(),
            value_type,
            default,
            alias: None,
        }
    }

    /// Sets the engine attribute alias.
    #[must_use]
    pub fn with_alias(mut self, alias: &str) -> Self {
        self.alias = Some(alias.to_string());
        self
    }
}

/// One supported algorithm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlgorithmCatalogEntry {
    pub kisao_id: String,
    pub engine_id: String,
    pub name: String,
    pub role: SolverRole,
    pub stochastic: bool,
    pub parameters: Vec<ParameterSpec>,
}

impl AlgorithmCatalogEntry {
    #[must_use]
    pub fn new(kisao_id: &str, engine_id: &str, name: &str, role: SolverRole) -> Self {
        Self {
            kisao_id: kisao_id.to_string(),
            engine_id: engine_id.to_string(),
            name: name.to_string(),
            role,
            stochastic: false,
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn stochastic(mut self) -> Self {
        self.stochastic = true;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Looks up a parameter by KiSAO id.
    #[must_use]
    pub fn parameter(&self, kisao_id: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.kisao_id == kisao_id)
    }

    /// Parameter KiSAO ids in declaration order.
    #[must_use]
    pub fn parameter_ids(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.kisao_id.clone()).collect()
    }
}

/// Ordered, read-only registry of supported algorithms.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AlgorithmCatalog {
    entries: Vec<AlgorithmCatalogEntry>,
}

impl AlgorithmCatalog {
    /// Builds a catalog, rejecting duplicate algorithm ids and duplicate
    /// parameter ids within an entry.
    pub fn new(entries: Vec<AlgorithmCatalogEntry>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.kisao_id.as_str()) {
                return Err(ValidationError::invalid_task(format!(
                    "algorithm catalog lists '{}' more than once",
                    entry.kisao_id
                )));
            }
            let mut params = HashSet::with_capacity(entry.parameters.len());
            for p in &entry.parameters {
                if !params.insert(p.kisao_id.as_str()) {
                    return Err(ValidationError::invalid_task(format!(
                        "algorithm '{}' lists parameter '{}' more than once",
                        entry.kisao_id, p.kisao_id
                    )));
                }
            }
        }
        Ok(Self { entries })
    }

    /// The catalog of algorithms supported by the reference engine contract.
    #[must_use]
    pub fn standard() -> Self {
        use ParameterValue::{Boolean, Float, Integer};
        use ValueType as T;

        let entries = vec![
            AlgorithmCatalogEntry::new("KISAO_0000019", "cvode", "CVODE", SolverRole::Integrator)
                .with_parameter(ParameterSpec::new("KISAO_0000209", "relative_tolerance", "relative tolerance", T::Float, Some(Float(1e-6))))
                .with_parameter(ParameterSpec::new("KISAO_0000211", "absolute_tolerance", "absolute tolerance", T::Float, Some(Float(1e-12))))
                .with_parameter(
                    ParameterSpec::new("KISAO_0000220", "maximum_bdf_order", "Maximum Backward Differentiation Formula (BDF) order", T::Integer, Some(Integer(5)))
                        .with_alias("max_bdf_order"),
                )
                .with_parameter(
                    ParameterSpec::new("KISAO_0000219", "maximum_adams_order", "Maximum Adams order", T::Integer, Some(Integer(12)))
                        .with_alias("max_adams_order"),
                )
                .with_parameter(
                    ParameterSpec::new("KISAO_0000415", "maximum_num_steps", "Maximum number of steps", T::Integer, Some(Integer(20000)))
                        .with_alias("max_steps"),
                )
                .with_parameter(ParameterSpec::new("KISAO_0000467", "maximum_time_step", "Maximum time step", T::Float, None))
                .with_parameter(ParameterSpec::new("KISAO_0000485", "minimum_time_step", "Minimum time step", T::Float, None))
                .with_parameter(ParameterSpec::new("KISAO_0000559", "initial_time_step", "Initial time step", T::Float, None))
                .with_parameter(ParameterSpec::new("KISAO_0000671", "stiff", "Stiff", T::Boolean, Some(Boolean(true))))
                .with_parameter(ParameterSpec::new("KISAO_0000670", "multiple_steps", "Multiple steps", T::Boolean, Some(Boolean(false)))),
            AlgorithmCatalogEntry::new("KISAO_0000030", "euler", "Forward Euler method", SolverRole::Integrator),
            AlgorithmCatalogEntry::new("KISAO_0000032", "rk4", "Runge-Kutta fourth order method", SolverRole::Integrator),
            AlgorithmCatalogEntry::new("KISAO_0000086", "rk45", "Fehlberg method", SolverRole::Integrator)
                .with_parameter(ParameterSpec::new("KISAO_0000467", "maximum_time_step", "Maximum time step", T::Float, Some(Float(1.0))))
                .with_parameter(ParameterSpec::new("KISAO_0000485", "minimum_time_step", "Minimum time step", T::Float, Some(Float(1e-12))))
                .with_parameter(ParameterSpec::new("KISAO_0000597", "epsilon", "Epsilon", T::Float, Some(Float(1e-12)))),
            AlgorithmCatalogEntry::new(
                "KISAO_0000029",
                "gillespie",
                "Gillespie direct method of the Stochastic Simulation Algorithm (SSA)",
                SolverRole::Integrator,
            )
            .stochastic()
            .with_parameter(ParameterSpec::new("KISAO_0000488", "seed", "Random number generator seed", T::Integer, None))
            .with_parameter(ParameterSpec::new(
                "KISAO_0000673",
                "nonnegative",
                "Skip reactions which would result in negative species amounts",
                T::Boolean,
                Some(Boolean(false)),
            )),
            AlgorithmCatalogEntry::new(
                "KISAO_0000569",
                "nleq2",
                "Newton-type method for solving non-linear (NL) equations (EQ)",
                SolverRole::SteadyState,
            )
            .with_parameter(ParameterSpec::new("KISAO_0000209", "relative_tolerance", "relative tolerance", T::Float, Some(Float(1e-12))))
            .with_parameter(ParameterSpec::new("KISAO_0000486", "maximum_iterations", "Maximum number of iterations", T::Integer, Some(Integer(100))))
            .with_parameter(ParameterSpec::new("KISAO_0000487", "minimum_damping", "Minimum damping factor", T::Float, Some(Float(1e-20))))
            .with_parameter(ParameterSpec::new("KISAO_0000674", "allow_presimulation", "Whether to allow presimulation", T::Boolean, Some(Boolean(false))))
            .with_parameter(ParameterSpec::new("KISAO_0000675", "broyden_method", "Broyden method", T::Integer, Some(Integer(0))))
            .with_parameter(ParameterSpec::new("KISAO_0000676", "linearity", "Degree of linearity", T::Integer, Some(Integer(3))))
            .with_parameter(ParameterSpec::new(
                "KISAO_0000677",
                "presimulation_maximum_steps",
                "Maximum number of steps for presimulation",
                T::Integer,
                Some(Integer(100)),
            ))
            .with_parameter(ParameterSpec::new(
                "KISAO_0000678",
                "approx_maximum_steps",
                "Maximum number of steps for approximation",
                T::Integer,
                Some(Integer(10000)),
            ))
            .with_parameter(ParameterSpec::new("KISAO_0000679", "approx_time", "Amount of time for approximation", T::Float, Some(Float(10000.0))))
            .with_parameter(ParameterSpec::new("KISAO_0000680", "presimulation_time", "Amount of time for presimulation", T::Float, Some(Float(100.0))))
            .with_parameter(ParameterSpec::new("KISAO_0000682", "allow_approx", "Whether to allow approximation", T::Boolean, Some(Boolean(false))))
            .with_parameter(ParameterSpec::new("KISAO_0000683", "approx_tolerance", "Tolerance for approximation", T::Float, Some(Float(1e-6)))),
        ];

        Self { entries }
    }

    /// Looks up an algorithm by KiSAO id.
    #[must_use]
    pub fn get(&self, kisao_id: &str) -> Option<&AlgorithmCatalogEntry> {
        self.entries.iter().find(|e| e.kisao_id == kisao_id)
    }

    /// Entries in catalog order.
    #[must_use]
    pub fn entries(&self) -> &[AlgorithmCatalogEntry] {
        &self.entries
    }

    /// Algorithm KiSAO ids in catalog order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.kisao_id.clone()).collect()
    }
}

impl Default for AlgorithmCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_is_well_formed() {
        let catalog = AlgorithmCatalog::standard();
        let rebuilt = AlgorithmCatalog::new(catalog.entries().to_vec());
        assert!(rebuilt.is_ok());
        assert_eq!(
            catalog.ids(),
            vec!["KISAO_0000019", "KISAO_0000030", "KISAO_0000032", "KISAO_0000086", "KISAO_0000029", "KISAO_0000569"]
        );
    }

    #[test]
    fn cvode_defaults_and_aliases() {
        let catalog = AlgorithmCatalog::standard();
        let cvode = catalog.get("KISAO_0000019").unwrap();
        assert_eq!(cvode.engine_id, "cvode");
        assert_eq!(cvode.parameters.len(), 10);
        assert_eq!(cvode.parameter("KISAO_0000209").unwrap().default, Some(ParameterValue::Float(1e-6)));
        assert_eq!(cvode.parameter("KISAO_0000220").unwrap().alias.as_deref(), Some("max_bdf_order"));
        assert_eq!(cvode.parameter("KISAO_0000467").unwrap().default, None);
    }

    #[test]
    fn roles_and_stochasticity() {
        let catalog = AlgorithmCatalog::standard();
        assert!(catalog.get("KISAO_0000029").unwrap().stochastic);
        assert_eq!(catalog.get("KISAO_0000569").unwrap().role, SolverRole::SteadyState);
        assert_eq!(catalog.get("KISAO_0000569").unwrap().parameters.len(), 12);
        assert!(catalog.get("KISAO_0000088").is_none());
    }

    #[test]
    fn duplicate_parameters_are_rejected() {
        let entry = AlgorithmCatalogEntry::new("KISAO_0000030", "euler", "Euler", SolverRole::Integrator)
            .with_parameter(ParameterSpec::new("KISAO_0000467", "a", "a", ValueType::Float, None))
            .with_parameter(ParameterSpec::new("KISAO_0000467", "b", "b", ValueType::Float, None));
        assert!(AlgorithmCatalog::new(vec![entry]).is_err());
    }
}
