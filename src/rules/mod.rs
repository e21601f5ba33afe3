//! Interpretation rules: scope, dimensions, consensus label, statistics,
//! and an optional structural trigger evaluated against charts.
pub mod record;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use store::RuleStore;

use crate::chart::{Branch, Magnitude, PalaceRole, Transformation};
use crate::error::{ConsensusInconsistency, EngineError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Star,
    StarGroup,
    MajorPattern,
    BasicPattern,
    MiscellaneousCombo,
}

impl Scope {
    /// Higher is more specific; used to break weight ties.
    #[must_use]
    pub fn specificity(self) -> u8 {
        match self {
            Self::MajorPattern => 4,
            Self::BasicPattern => 3,
            Self::StarGroup => 2,
            Self::MiscellaneousCombo => 1,
            Self::Star => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Consensus {
    MinorityView,
    Disputed,
    Consensus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Personality,
    Career,
    Wealth,
    Health,
    Relationships,
    Family,
    Education,
    Spirituality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// All required stars share one palace.
    #[default]
    SamePalace,
    /// The anchor palace and the palace across from it.
    OppositePalace,
    /// The anchor palace and its two trine palaces (三合).
    Triangle,
    /// Triangle plus the opposite palace (三方四正).
    FullSquare,
}

impl Relation {
    /// Branches the relation covers when anchored at `anchor`, anchor first.
    #[must_use]
    pub fn branches(self, anchor: Branch) -> Vec<Branch> {
        match self {
            Self::SamePalace => vec![anchor],
            Self::OppositePalace => vec![anchor, anchor.opposite()],
            Self::Triangle => {
                let [a, b] = anchor.trine();
                vec![anchor, a, b]
            }
            Self::FullSquare => {
                let [a, b] = anchor.trine();
                vec![anchor, a, b, anchor.opposite()]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bilingual {
    pub zh: String,
    pub en: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Structural trigger: which stars (and transformations) must appear where.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stars: Vec<String>,
    /// Anchor palace; any palace when absent (Life Palace tried first).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palace: Option<PalaceRole>,
    #[serde(default)]
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformations: Vec<Transformation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_magnitude: Option<Magnitude>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub scope: Scope,
    pub interpretation: Bilingual,
    pub dimensions: Vec<Dimension>,
    pub consensus: Consensus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
}

impl Rule {
    /// Semantic checks shared by file import and database load.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::new("id", "rule id must not be empty").into());
        }
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("name", format!("rule {} has no name", self.id)).into());
        }
        if self.dimensions.is_empty() {
            return Err(self.inconsistency("dimensions", "at least one dimension tag is required"));
        }

        if let Some(stats) = &self.statistics {
            for (field, value) in [
                ("statistics.match_rate", stats.match_rate),
                ("statistics.confidence", stats.confidence),
            ] {
                if let Some(v) = value.filter(|v| !(0.0..=1.0).contains(v)) {
                    return Err(ValidationError::new(
                        field,
                        format!("rule {}: {v} is outside [0, 1]", self.id),
                    )
                    .into());
                }
            }
            if stats.confidence.is_some() && stats.sample_size.is_none() {
                return Err(self.inconsistency(
                    "statistics.sample_size",
                    "confidence given without a sample size",
                ));
            }
        }

        if let Some(cond) = &self.condition {
            if cond.stars.is_empty() && cond.transformations.is_empty() {
                return Err(ValidationError::new(
                    "condition",
                    format!("rule {}: condition names no stars or transformations", self.id),
                )
                .into());
            }
            if cond.stars.iter().any(|s| s.trim().is_empty()) {
                return Err(ValidationError::new(
                    "condition.stars",
                    format!("rule {}: empty star id", self.id),
                )
                .into());
            }
        }
        Ok(())
    }

    fn inconsistency(&self, field: &str, reason: &str) -> EngineError {
        ConsensusInconsistency {
            rule_id: self.id.clone(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
        .into()
    }
}

// ── Symbol parsing ───────────────────────────────────────────────────

macro_rules! snake_case_symbols {
    ($ty:ty, $field:literal, [$($variant:path => $name:literal),+ $(,)?]) => {
        impl $ty {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
                    $($name => Ok($variant),)+
                    other => Err(ValidationError::new(
                        $field,
                        format!("unrecognized symbol {other:?}"),
                    )),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

snake_case_symbols!(Scope, "scope", [
    Scope::Star => "star",
    Scope::StarGroup => "star_group",
    Scope::MajorPattern => "major_pattern",
    Scope::BasicPattern => "basic_pattern",
    Scope::MiscellaneousCombo => "miscellaneous_combo",
]);

snake_case_symbols!(Consensus, "consensus", [
    Consensus::Consensus => "consensus",
    Consensus::Disputed => "disputed",
    Consensus::MinorityView => "minority_view",
]);

snake_case_symbols!(Dimension, "dimensions", [
    Dimension::Personality => "personality",
    Dimension::Career => "career",
    Dimension::Wealth => "wealth",
    Dimension::Health => "health",
    Dimension::Relationships => "relationships",
    Dimension::Family => "family",
    Dimension::Education => "education",
    Dimension::Spirituality => "spirituality",
]);
