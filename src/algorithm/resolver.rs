use tracing::debug;

use super::kisao::substitution_level;
use super::{AlgorithmCatalog, AlgorithmCatalogEntry, AlgorithmSpec, ParameterSpec, SolverRole, SubstitutionPolicy};
use crate::error::AlgorithmError;
use crate::results::{Diagnostic, DiagnosticKind};
use crate::value::ParameterValue;

/// Outcome of mapping a requested algorithm onto the catalog.
#[derive(Debug, Clone, Copy)]
pub struct AlgorithmResolution<'a> {
    pub requested: &'a str,
    pub entry: &'a AlgorithmCatalogEntry,
    /// Substitution level of `entry` relative to `requested`.
    pub level: SubstitutionPolicy,
}

impl AlgorithmResolution<'_> {
    #[must_use]
    pub fn is_substituted(&self) -> bool {
        self.entry.kisao_id != self.requested
    }
}

/// A validated parameter change.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameter<'a> {
    pub spec: &'a ParameterSpec,
    pub value: ParameterValue,
}

fn describe(entry: &AlgorithmCatalogEntry) -> String {
    format!("{}: {}", entry.kisao_id, entry.name)
}

/// Picks an executable catalog algorithm for `requested`.
///
/// Only entries whose role matches `role` are considered. The candidate with
/// the lowest substitution level wins; ties go to catalog order. Any
/// substitution is recorded as a diagnostic.
pub fn resolve_algorithm<'a>(
    requested: &'a str,
    catalog: &'a AlgorithmCatalog,
    role: SolverRole,
    policy: SubstitutionPolicy,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<AlgorithmResolution<'a>, AlgorithmError> {
    let mut best: Option<AlgorithmResolution<'a>> = None;
    for entry in catalog.entries().iter().filter(|e| e.role == role) {
        let level = substitution_level(requested, &entry.kisao_id);
        if best.map_or(true, |b| level < b.level) {
            best = Some(AlgorithmResolution {
                requested,
                entry,
                level,
            });
        }
    }

    let Some(resolution) = best.filter(|b| policy.permits(b.level)) else {
        return Err(AlgorithmError::UnsupportedAlgorithm {
            requested: requested.to_string(),
            policy,
            supported: catalog
                .entries()
                .iter()
                .filter(|e| e.role == role)
                .map(describe)
                .collect(),
        });
    };

    if resolution.is_substituted() {
        diagnostics.push(Diagnostic::warn(
            DiagnosticKind::AlgorithmSubstituted,
            format!(
                "'{}' is not supported; substituted '{}' ({}) at level {} under policy {}",
                requested, resolution.entry.kisao_id, resolution.entry.name, resolution.level, policy
            ),
        ));
    } else {
        debug!(algorithm = %requested, "algorithm used as requested");
    }
    Ok(resolution)
}

/// Validates the parameter changes of `spec` against the resolved entry.
///
/// After a substitution every change is dropped with one warning. Unknown
/// parameters and badly typed values are errors when `strict` is set and
/// warnings otherwise.
pub fn resolve_parameters<'a>(
    spec: &AlgorithmSpec,
    resolution: &AlgorithmResolution<'a>,
    strict: bool,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Vec<ResolvedParameter<'a>>, AlgorithmError> {
    let entry = resolution.entry;
    if resolution.is_substituted() {
        if !spec.changes().is_empty() {
            let ids: Vec<&str> = spec.changes().iter().map(|c| c.kisao_id.as_str()).collect();
            diagnostics.push(Diagnostic::warn(
                DiagnosticKind::ParametersDropped,
                format!(
                    "'{}' was substituted by '{}'; ignoring parameter changes {}",
                    spec.kisao_id(),
                    entry.kisao_id,
                    ids.join(", ")
                ),
            ));
        }
        return Ok(Vec::new());
    }

    let mut resolved = Vec::with_capacity(spec.changes().len());
    for change in spec.changes() {
        let Some(param) = entry.parameter(&change.kisao_id) else {
            let err = AlgorithmError::UnsupportedParameter {
                algorithm: entry.kisao_id.clone(),
                parameter: change.kisao_id.clone(),
                supported: entry
                    .parameters
                    .iter()
                    .map(|p| format!("{}: {}", p.kisao_id, p.name))
                    .collect(),
            };
            if strict {
                return Err(err);
            }
            diagnostics.push(Diagnostic::warn(DiagnosticKind::ParameterIgnored, err.to_string()));
            continue;
        };

        match param.value_type.parse(&change.new_value) {
            Some(value) => resolved.push(ResolvedParameter { spec: param, value }),
            None => {
                let err = AlgorithmError::InvalidParameterValue {
                    algorithm: entry.kisao_id.clone(),
                    parameter: change.kisao_id.clone(),
                    value: change.new_value.clone(),
                    expected: param.value_type,
                };
                if strict {
                    return Err(err);
                }
                diagnostics.push(Diagnostic::warn(DiagnosticKind::ParameterIgnored, err.to_string()));
            }
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(requested: &str, role: SolverRole, policy: SubstitutionPolicy) -> (Result<String, AlgorithmError>, Vec<Diagnostic>) {
        let catalog = AlgorithmCatalog::standard();
        let mut diags = Vec::new();
        let out = resolve_algorithm(requested, &catalog, role, policy, &mut diags).map(|r| r.entry.kisao_id.clone());
        (out, diags)
    }

    #[test]
    fn exact_match_needs_no_substitution() {
        let (out, diags) = resolve("KISAO_0000019", SolverRole::Integrator, SubstitutionPolicy::None);
        assert_eq!(out.unwrap(), "KISAO_0000019");
        assert!(diags.is_empty());
    }

    #[test]
    fn none_rejects_missing_algorithm() {
        let (out, _) = resolve("KISAO_0000088", SolverRole::Integrator, SubstitutionPolicy::None);
        match out {
            Err(AlgorithmError::UnsupportedAlgorithm { requested, supported, .. }) => {
                assert_eq!(requested, "KISAO_0000088");
                assert!(supported.iter().any(|s| s.starts_with("KISAO_0000019")));
                assert!(!supported.iter().any(|s| s.starts_with("KISAO_0000569")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn similar_variables_substitutes_with_warning() {
        let (out, diags) = resolve("KISAO_0000088", SolverRole::Integrator, SubstitutionPolicy::SimilarVariables);
        assert_eq!(out.unwrap(), "KISAO_0000019");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::AlgorithmSubstituted);
    }

    #[test]
    fn nearest_candidate_wins() {
        // Dormand-Prince shares a family with the Fehlberg method.
        let (out, _) = resolve("KISAO_0000087", SolverRole::Integrator, SubstitutionPolicy::SameMethod);
        assert_eq!(out.unwrap(), "KISAO_0000086");
        // Tau-leaping is closest to the Gillespie direct method.
        let (out, _) = resolve("KISAO_0000039", SolverRole::Integrator, SubstitutionPolicy::SimilarApproximations);
        assert_eq!(out.unwrap(), "KISAO_0000029");
    }

    #[test]
    fn unknown_algorithm_needs_any() {
        let (out, _) = resolve("KISAO_0000999", SolverRole::Integrator, SubstitutionPolicy::SameFramework);
        assert!(out.is_err());
        let (out, _) = resolve("KISAO_0000999", SolverRole::Integrator, SubstitutionPolicy::Any);
        assert_eq!(out.unwrap(), "KISAO_0000019");
    }

    #[test]
    fn role_filters_candidates() {
        let (out, _) = resolve("KISAO_0000019", SolverRole::SteadyState, SubstitutionPolicy::Any);
        assert_eq!(out.unwrap(), "KISAO_0000569");
        let (out, _) = resolve("KISAO_0000569", SolverRole::Integrator, SubstitutionPolicy::None);
        assert!(out.is_err());
    }

    #[test]
    fn parameters_are_typed() {
        let catalog = AlgorithmCatalog::standard();
        let mut diags = Vec::new();
        let spec = AlgorithmSpec::new("KISAO_0000019")
            .unwrap()
            .with_change("KISAO_0000209", "1e-8")
            .unwrap()
            .with_change("KISAO_0000415", "5000")
            .unwrap();
        let resolution =
            resolve_algorithm(spec.kisao_id(), &catalog, SolverRole::Integrator, SubstitutionPolicy::None, &mut diags).unwrap();
        let params = resolve_parameters(&spec, &resolution, true, &mut diags).unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].value, ParameterValue::Float(1e-8));
        assert_eq!(params[1].value, ParameterValue::Integer(5000));
    }

    #[test]
    fn bad_parameters_are_fatal_only_when_strict() {
        let catalog = AlgorithmCatalog::standard();
        let spec = AlgorithmSpec::new("KISAO_0000019")
            .unwrap()
            .with_change("KISAO_0000209", "abc")
            .unwrap()
            .with_change("KISAO_0000531", "1")
            .unwrap();
        let mut diags = Vec::new();
        let resolution =
            resolve_algorithm(spec.kisao_id(), &catalog, SolverRole::Integrator, SubstitutionPolicy::None, &mut diags).unwrap();

        let err = resolve_parameters(&spec, &resolution, true, &mut diags).unwrap_err();
        assert!(matches!(err, AlgorithmError::InvalidParameterValue { .. }));

        let params = resolve_parameters(&spec, &resolution, false, &mut diags).unwrap();
        assert!(params.is_empty());
        assert_eq!(diags.len(), 2);
        assert!(diags.iter().all(|d| d.kind == DiagnosticKind::ParameterIgnored));
    }

    #[test]
    fn substitution_drops_all_parameters() {
        let catalog = AlgorithmCatalog::standard();
        let spec = AlgorithmSpec::new("KISAO_0000088")
            .unwrap()
            .with_change("KISAO_0000209", "1e-8")
            .unwrap();
        let mut diags = Vec::new();
        let resolution =
            resolve_algorithm(spec.kisao_id(), &catalog, SolverRole::Integrator, SubstitutionPolicy::Any, &mut diags).unwrap();
        let params = resolve_parameters(&spec, &resolution, false, &mut diags).unwrap();
        assert!(params.is_empty());
        assert_eq!(diags.last().unwrap().kind, DiagnosticKind::ParametersDropped);
    }
}
