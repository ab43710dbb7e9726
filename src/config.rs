//! Preprocessor and executor configuration.

use serde::{Deserialize, Serialize};

use crate::algorithm::SubstitutionPolicy;
use crate::error::ValidationError;

/// Environment variable holding the substitution policy.
pub const ENV_ALGORITHM_SUBSTITUTION_POLICY: &str = "ALGORITHM_SUBSTITUTION_POLICY";
/// Environment variable toggling structural and parameter validation.
pub const ENV_VALIDATE_SEDML: &str = "VALIDATE_SEDML";
/// Environment variable toggling NaN checks on results.
pub const ENV_VALIDATE_RESULTS: &str = "VALIDATE_RESULTS";

/// Presimulation durations tried, in order, when a steady state is not found
/// directly.
pub const DEFAULT_STEADY_STATE_LADDER: [f64; 6] = [0.0, 0.1, 1.0, 10.0, 100.0, 1000.0];

/// Configuration shared by the preprocessor and the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How far the resolver may substitute a requested algorithm.
    pub algorithm_substitution_policy: SubstitutionPolicy,
    /// Validate task structure and algorithm parameters.
    pub validate_sedml: bool,
    /// Reject simulation results containing NaN.
    pub validate_results: bool,
    /// Presimulation durations for the steady-state retry ladder.
    pub steady_state_ladder: Vec<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm_substitution_policy: SubstitutionPolicy::default(),
            validate_sedml: true,
            validate_results: true,
            steady_state_ladder: DEFAULT_STEADY_STATE_LADDER.to_vec(),
        }
    }
}

fn parse_bool(field: &str, raw: &str) -> Result<bool, ValidationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ValidationError::InvalidConfig {
            field: field.to_string(),
            reason: format!("'{raw}' is not a boolean"),
        }),
    }
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, falling back to defaults for
    /// unset variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_ALGORITHM_SUBSTITUTION_POLICY) {
            config.algorithm_substitution_policy =
                raw.parse().map_err(|reason| ValidationError::InvalidConfig {
                    field: ENV_ALGORITHM_SUBSTITUTION_POLICY.to_string(),
                    reason,
                })?;
        }
        if let Some(raw) = lookup(ENV_VALIDATE_SEDML) {
            config.validate_sedml = parse_bool(ENV_VALIDATE_SEDML, &raw)?;
        }
        if let Some(raw) = lookup(ENV_VALIDATE_RESULTS) {
            config.validate_results = parse_bool(ENV_VALIDATE_RESULTS, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the substitution policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SubstitutionPolicy) -> Self {
        self.algorithm_substitution_policy = policy;
        self
    }

    /// Sets the steady-state ladder.
    #[must_use]
    pub fn with_ladder(mut self, ladder: Vec<f64>) -> Self {
        self.steady_state_ladder = ladder;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.steady_state_ladder.is_empty() {
            return Err(ValidationError::InvalidConfig {
                field: "steady_state_ladder".to_string(),
                reason: "must contain at least one rung".to_string(),
            });
        }
        if let Some(bad) = self
            .steady_state_ladder
            .iter()
            .find(|d| !d.is_finite() || **d < 0.0)
        {
            return Err(ValidationError::InvalidConfig {
                field: "steady_state_ladder".to_string(),
                reason: format!("rung durations must be finite and >= 0, got {bad}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.algorithm_substitution_policy, SubstitutionPolicy::SimilarVariables);
        assert_eq!(config.steady_state_ladder, vec![0.0, 0.1, 1.0, 10.0, 100.0, 1000.0]);
    }

    #[test]
    fn reads_variables() {
        let config = Config::from_lookup(lookup(&[
            (ENV_ALGORITHM_SUBSTITUTION_POLICY, "none"),
            (ENV_VALIDATE_SEDML, "0"),
            (ENV_VALIDATE_RESULTS, "False"),
        ]))
        .unwrap();
        assert_eq!(config.algorithm_substitution_policy, SubstitutionPolicy::None);
        assert!(!config.validate_sedml);
        assert!(!config.validate_results);
    }

    #[test]
    fn rejects_bad_values() {
        let err = Config::from_lookup(lookup(&[(ENV_ALGORITHM_SUBSTITUTION_POLICY, "LOOSE")])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { ref field, .. } if field == ENV_ALGORITHM_SUBSTITUTION_POLICY));

        let err = Config::from_lookup(lookup(&[(ENV_VALIDATE_RESULTS, "maybe")])).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfig { .. }));
    }

    #[test]
    fn ladder_is_validated() {
        assert!(Config::default().with_ladder(vec![]).validate().is_err());
        assert!(Config::default().with_ladder(vec![0.0, -1.0]).validate().is_err());
        assert!(Config::default().with_ladder(vec![0.0, f64::NAN]).validate().is_err());
        assert!(Config::default().with_ladder(vec![5.0]).validate().is_ok());
    }

    #[test]
    fn deserializes_partial_documents() {
        let config: Config = serde_json::from_str(r#"{"validate_results": false}"#).unwrap();
        assert!(!config.validate_results);
        assert!(config.validate_sedml);
    }
}
