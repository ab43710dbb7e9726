use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How far the resolver may stray from a requested algorithm.
///
/// Levels follow the KiSAO substitution scale and are totally ordered:
/// a policy permits every substitution whose level is at or below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubstitutionPolicy {
    /// Only the requested algorithm itself.
    None,
    SameMethod,
    SameMath,
    SimilarApproximations,
    DistinctApproximations,
    DistinctScales,
    SameVariables,
    SimilarVariables,
    SameFramework,
    /// Any algorithm that can run the simulation.
    Any,
}

impl Default for SubstitutionPolicy {
    fn default() -> Self {
        Self::SimilarVariables
    }
}

impl SubstitutionPolicy {
    /// All levels, least permissive first.
    pub const ALL: [Self; 10] = [
        Self::None,
        Self::SameMethod,
        Self::SameMath,
        Self::SimilarApproximations,
        Self::DistinctApproximations,
        Self::DistinctScales,
        Self::SameVariables,
        Self::SimilarVariables,
        Self::SameFramework,
        Self::Any,
    ];

    /// Numeric level on the KiSAO scale (0 = `NONE`, 9 = `ANY`).
    #[must_use]
    pub const fn level(self) -> u8 {
        self as u8
    }

    /// Returns true if a substitution at `level` is acceptable under this policy.
    #[must_use]
    pub fn permits(self, level: Self) -> bool {
        level <= self
    }

    /// Returns true if this is the strictest policy.
    ///
    /// Under `NONE` problems that looser policies downgrade to warnings are
    /// fatal.
    #[must_use]
    pub const fn is_strict(self) -> bool {
        matches!(self, Self::None)
    }

    /// Returns the stable upper-case name used in configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::SameMethod => "SAME_METHOD",
            Self::SameMath => "SAME_MATH",
            Self::SimilarApproximations => "SIMILAR_APPROXIMATIONS",
            Self::DistinctApproximations => "DISTINCT_APPROXIMATIONS",
            Self::DistinctScales => "DISTINCT_SCALES",
            Self::SameVariables => "SAME_VARIABLES",
            Self::SimilarVariables => "SIMILAR_VARIABLES",
            Self::SameFramework => "SAME_FRAMEWORK",
            Self::Any => "ANY",
        }
    }
}

impl fmt::Display for SubstitutionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SubstitutionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(|p| p.name()).collect();
                format!("'{s}' is not a substitution policy; expected one of {}", names.join(", "))
            })
    }
}
