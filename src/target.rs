//! Resolution of symbolic targets to engine identifiers.
//!
//! Targets address model components with XPath-like expressions such as
//! `/sbml:sbml/sbml:model/sbml:listOfSpecies/sbml:species[@id='C']`. Species
//! resolve to their concentration (`[C]`) for deterministic algorithms and to
//! their amount (`C`) for stochastic ones; other components resolve to their
//! plain id. The only built-in symbol is simulation time.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::engine::{ComponentKind, ModelDescription, TIME_ID};
use crate::error::{TargetRole, ValidationError};
use crate::task::{ModelChange, SetValue, SimulationKind, Variable, TIME_SYMBOL};

static ADDRESS: OnceLock<Option<Regex>> = OnceLock::new();

fn address_regex() -> Option<&'static Regex> {
    ADDRESS
        .get_or_init(|| {
            Regex::new(r#"^/sbml:sbml/sbml:model/sbml:(listOf[A-Za-z]+)/sbml:([A-Za-z]+)\[@id=['"]([^'"]+)['"]\]$"#).ok()
        })
        .as_ref()
}

/// Identifies one target within one model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetKey {
    pub model: String,
    pub target: Option<String>,
    pub symbol: Option<String>,
}

impl TargetKey {
    #[must_use]
    pub fn change(model: &str, change: &ModelChange) -> Self {
        Self {
            model: model.to_string(),
            target: Some(change.target.clone()),
            symbol: change.symbol.clone(),
        }
    }

    #[must_use]
    pub fn set_value(change: &SetValue) -> Self {
        Self {
            model: change.model.clone(),
            target: Some(change.target.clone()),
            symbol: change.symbol.clone(),
        }
    }

    #[must_use]
    pub fn variable(model: &str, variable: &Variable) -> Self {
        Self {
            model: model.to_string(),
            target: variable.target.clone(),
            symbol: variable.symbol.clone(),
        }
    }
}

/// Splits an address into component kind and id.
#[must_use]
pub fn parse_address(address: &str) -> Option<(ComponentKind, String)> {
    let caps = address_regex()?.captures(address.trim())?;
    let kind = ComponentKind::from_element(caps.get(2)?.as_str())?;
    if caps.get(1)?.as_str() != kind.list_element() {
        return None;
    }
    Some((kind, caps.get(3)?.as_str().to_string()))
}

/// Canonical address of a component.
#[must_use]
pub fn address(kind: ComponentKind, id: &str) -> String {
    format!("/sbml:sbml/sbml:model/sbml:{}/sbml:{}[@id='{id}']", kind.list_element(), kind.element())
}

/// Every address valid in `description`, by category then document order.
#[must_use]
pub fn valid_addresses(description: &ModelDescription) -> Vec<String> {
    ComponentKind::ALL
        .into_iter()
        .flat_map(|kind| description.ids(kind).iter().map(move |id| address(kind, id)))
        .collect()
}

/// Engine identifier of a component.
#[must_use]
pub fn engine_id(kind: ComponentKind, id: &str, stochastic: bool) -> String {
    match kind {
        ComponentKind::Species if !stochastic => format!("[{id}]"),
        _ => id.to_string(),
    }
}

/// Context targets are resolved in.
#[derive(Debug, Clone, Copy)]
pub struct TargetContext<'a> {
    pub description: &'a ModelDescription,
    pub simulation: SimulationKind,
    /// Whether the algorithm counts molecules rather than concentrations.
    pub stochastic: bool,
}

impl TargetContext<'_> {
    fn supported_symbols(&self, role: TargetRole) -> Vec<String> {
        match (role, self.simulation) {
            (TargetRole::Variable, SimulationKind::TimeCourse) => vec![TIME_SYMBOL.to_string()],
            _ => Vec::new(),
        }
    }

    /// Resolves every key, reporting all bad addresses together and all
    /// unsupported symbols together.
    pub fn resolve<'k, I>(&self, keys: I, role: TargetRole) -> Result<HashMap<TargetKey, String>, ValidationError>
    where
        I: IntoIterator<Item = &'k TargetKey>,
    {
        let supported = self.supported_symbols(role);
        let mut resolved = HashMap::new();
        let mut bad_targets = Vec::new();
        let mut bad_symbols = Vec::new();

        for key in keys {
            match (&key.symbol, &key.target) {
                (Some(symbol), _) if role == TargetRole::Variable => {
                    if supported.contains(symbol) {
                        resolved.insert(key.clone(), TIME_ID.to_string());
                    } else if !bad_symbols.contains(symbol) {
                        bad_symbols.push(symbol.clone());
                    }
                }
                (Some(symbol), _) => {
                    if !bad_symbols.contains(symbol) {
                        bad_symbols.push(symbol.clone());
                    }
                }
                (None, Some(target)) => {
                    match parse_address(target).filter(|(kind, id)| self.description.contains(*kind, id)) {
                        Some((kind, id)) => {
                            resolved.insert(key.clone(), engine_id(kind, &id, self.stochastic));
                        }
                        None => {
                            if !bad_targets.contains(target) {
                                bad_targets.push(target.clone());
                            }
                        }
                    }
                }
                (None, None) => {
                    return Err(ValidationError::invalid_task("a target needs an address or a symbol"));
                }
            }
        }

        if !bad_symbols.is_empty() {
            return Err(ValidationError::UnsupportedSymbol {
                role,
                symbols: bad_symbols,
                supported,
            });
        }
        if !bad_targets.is_empty() {
            return Err(ValidationError::InvalidTarget {
                role,
                targets: bad_targets,
                valid_targets: valid_addresses(self.description),
            });
        }
        Ok(resolved)
    }
}
