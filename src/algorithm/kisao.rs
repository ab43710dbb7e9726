//! A small slice of the KiSAO algorithm taxonomy.
//!
//! Only the attributes needed to rank substitutes are kept: the modelling
//! framework, the mathematical problem the algorithm solves, and the method
//! family it belongs to.

use super::SubstitutionPolicy;

/// Modelling framework of an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framework {
    /// Continuous deterministic time course.
    Deterministic,
    /// Discrete stochastic time course.
    Stochastic,
    /// Root finding for a fixed point.
    SteadyState,
}

impl Framework {
    const fn is_time_course(self) -> bool {
        matches!(self, Self::Deterministic | Self::Stochastic)
    }
}

/// Mathematical problem solved by an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathClass {
    OdeIntegration,
    ExactStochastic,
    ApproximateStochastic,
    NewtonIteration,
}

/// Method family; members differ only in implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodFamily {
    VariableOrderMultistep,
    AutomaticStiffnessSwitching,
    ForwardEuler,
    ClassicRungeKutta,
    EmbeddedRungeKutta,
    DirectMethod,
    NextReaction,
    TauLeaping,
    DampedNewton,
    NewtonKrylov,
}

/// A taxonomy entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KisaoTerm {
    pub id: &'static str,
    pub name: &'static str,
    pub framework: Framework,
    pub math: MathClass,
    pub family: MethodFamily,
}

const fn term(
    id: &'static str,
    name: &'static str,
    framework: Framework,
    math: MathClass,
    family: MethodFamily,
) -> KisaoTerm {
    KisaoTerm {
        id,
        name,
        framework,
        math,
        family,
    }
}

static TERMS: &[KisaoTerm] = &[
    term("KISAO_0000019", "CVODE", Framework::Deterministic, MathClass::OdeIntegration, MethodFamily::VariableOrderMultistep),
    term("KISAO_0000496", "CVODES", Framework::Deterministic, MathClass::OdeIntegration, MethodFamily::VariableOrderMultistep),
    term("KISAO_0000088", "LSODA", Framework::Deterministic, MathClass::OdeIntegration, MethodFamily::AutomaticStiffnessSwitching),
    term("KISAO_0000030", "Forward Euler method", Framework::Deterministic, MathClass::OdeIntegration, MethodFamily::ForwardEuler),
    term("KISAO_0000032", "Runge-Kutta fourth order method", Framework::Deterministic, MathClass::OdeIntegration, MethodFamily::ClassicRungeKutta),
    term("KISAO_0000086", "Fehlberg method", Framework::Deterministic, MathClass::OdeIntegration, MethodFamily::EmbeddedRungeKutta),
    term("KISAO_0000087", "Dormand-Prince method", Framework::Deterministic, MathClass::OdeIntegration, MethodFamily::EmbeddedRungeKutta),
    term("KISAO_0000029", "Gillespie direct method", Framework::Stochastic, MathClass::ExactStochastic, MethodFamily::DirectMethod),
    term("KISAO_0000027", "Gibson-Bruck next reaction method", Framework::Stochastic, MathClass::ExactStochastic, MethodFamily::NextReaction),
    term("KISAO_0000039", "tau-leaping method", Framework::Stochastic, MathClass::ApproximateStochastic, MethodFamily::TauLeaping),
    term("KISAO_0000569", "NLEQ2", Framework::SteadyState, MathClass::NewtonIteration, MethodFamily::DampedNewton),
    term("KISAO_0000568", "NLEQ1", Framework::SteadyState, MathClass::NewtonIteration, MethodFamily::DampedNewton),
    term("KISAO_0000282", "KINSOL", Framework::SteadyState, MathClass::NewtonIteration, MethodFamily::NewtonKrylov),
];

/// Looks up a KiSAO id in the taxonomy.
#[must_use]
pub fn lookup(id: &str) -> Option<&'static KisaoTerm> {
    TERMS.iter().find(|t| t.id == id)
}

/// Returns the smallest policy level at which `candidate` may stand in for
/// `requested`.
///
/// Ids unknown to the taxonomy can only be substituted under `ANY`.
#[must_use]
pub fn substitution_level(requested: &str, candidate: &str) -> SubstitutionPolicy {
    if requested == candidate {
        return SubstitutionPolicy::None;
    }
    let (Some(r), Some(c)) = (lookup(requested), lookup(candidate)) else {
        return SubstitutionPolicy::Any;
    };

    if r.family == c.family {
        SubstitutionPolicy::SameMethod
    } else if r.math == c.math {
        SubstitutionPolicy::SameMath
    } else if r.framework == c.framework {
        SubstitutionPolicy::SimilarApproximations
    } else if r.framework.is_time_course() && c.framework.is_time_course() {
        SubstitutionPolicy::SimilarVariables
    } else {
        SubstitutionPolicy::Any
    }
}
