//! Algorithm layer: catalog, substitution policy and resolution.
//!
//! A task names its algorithm by KiSAO id. The resolver maps that id onto a
//! catalog entry (substituting a close relative when the policy allows),
//! validates parameter changes, and produces typed [`SolverSettings`].

mod catalog;
pub mod kisao;
mod policy;
mod resolver;
mod settings;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub use catalog::{AlgorithmCatalog, AlgorithmCatalogEntry, ParameterSpec, SolverRole};
pub use policy::SubstitutionPolicy;
pub use resolver::{resolve_algorithm, resolve_parameters, AlgorithmResolution, ResolvedParameter};
pub use settings::{
    CvodeSettings, GenericSettings, GillespieSettings, Nleq2Settings, Rk45Settings, SolverParameter, SolverSettings,
};

static KISAO_ID: OnceLock<Option<Regex>> = OnceLock::new();

/// Returns true if `id` has the `KISAO_` + seven digits form.
#[must_use]
pub fn is_kisao_id(id: &str) -> bool {
    KISAO_ID
        .get_or_init(|| Regex::new(r"^KISAO_\d{7}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(id))
}

fn check_kisao_id(id: &str, what: &str) -> Result<(), ValidationError> {
    if is_kisao_id(id) {
        Ok(())
    } else {
        Err(ValidationError::invalid_task(format!(
            "{what} '{id}' is not a KiSAO id of the form KISAO_0000000"
        )))
    }
}

/// A requested change to one algorithm parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParameterChange {
    pub kisao_id: String,
    pub new_value: String,
}

/// The algorithm a simulation asks for, plus parameter changes.
///
/// Ids are validated on construction and on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AlgorithmSpec {
    kisao_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    changes: Vec<ParameterChange>,
}

impl AlgorithmSpec {
    pub fn new(kisao_id: impl Into<String>) -> Result<Self, ValidationError> {
        let kisao_id = kisao_id.into();
        check_kisao_id(&kisao_id, "algorithm")?;
        Ok(Self {
            kisao_id,
            changes: Vec::new(),
        })
    }

    /// Appends a parameter change.
    pub fn with_change(mut self, kisao_id: impl Into<String>, new_value: impl Into<String>) -> Result<Self, ValidationError> {
        let kisao_id = kisao_id.into();
        check_kisao_id(&kisao_id, "algorithm parameter")?;
        self.changes.push(ParameterChange {
            kisao_id,
            new_value: new_value.into(),
        });
        Ok(self)
    }

    #[must_use]
    pub fn kisao_id(&self) -> &str {
        &self.kisao_id
    }

    #[must_use]
    pub fn changes(&self) -> &[ParameterChange] {
        &self.changes
    }
}

impl<'de> Deserialize<'de> for AlgorithmSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            kisao_id: String,
            #[serde(default)]
            changes: Vec<ParameterChange>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let mut spec = AlgorithmSpec::new(raw.kisao_id).map_err(serde::de::Error::custom)?;
        for change in raw.changes {
            spec = spec
                .with_change(change.kisao_id, change.new_value)
                .map_err(serde::de::Error::custom)?;
        }
        Ok(spec)
    }
}
