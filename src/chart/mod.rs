//! Chart model: twelve palaces on the branch ring, each holding stars.
//!
//! Charts are produced by [`placement::ChartCalculator`] and are immutable
//! afterwards. A chart received from outside (e.g. over the MCP surface)
//! must pass [`Chart::validate`] before evaluation.
pub mod birth;
pub mod calendar;
pub mod placement;
pub mod stars;
pub mod symbols;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use birth::{BirthInput, BirthRecord, CalendarType, Gender};
pub use calendar::{CalendarConverter, LunarDate, LunarTable};
pub use placement::{ChartCalculator, calculate};
pub use stars::{Magnitude, StarInfo, StarKind, Transformation, star_info};
pub use symbols::{Branch, Stem};

use crate::error::ValidationError;

/// Palace roles in counter-clockwise order starting from the Life Palace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PalaceRole {
    Life,
    Siblings,
    Spouse,
    Children,
    Wealth,
    Health,
    Travel,
    Friendship,
    Career,
    Residence,
    Virtue,
    Parents,
}

impl PalaceRole {
    pub const ALL: [PalaceRole; 12] = [
        PalaceRole::Life,
        PalaceRole::Siblings,
        PalaceRole::Spouse,
        PalaceRole::Children,
        PalaceRole::Wealth,
        PalaceRole::Health,
        PalaceRole::Travel,
        PalaceRole::Friendship,
        PalaceRole::Career,
        PalaceRole::Residence,
        PalaceRole::Virtue,
        PalaceRole::Parents,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Life => "命宮",
            Self::Siblings => "兄弟",
            Self::Spouse => "夫妻",
            Self::Children => "子女",
            Self::Wealth => "財帛",
            Self::Health => "疾厄",
            Self::Travel => "遷移",
            Self::Friendship => "交友",
            Self::Career => "官祿",
            Self::Residence => "田宅",
            Self::Virtue => "福德",
            Self::Parents => "父母",
        }
    }

    #[must_use]
    pub fn english(self) -> &'static str {
        match self {
            Self::Life => "life",
            Self::Siblings => "siblings",
            Self::Spouse => "spouse",
            Self::Children => "children",
            Self::Wealth => "wealth",
            Self::Health => "health",
            Self::Travel => "travel",
            Self::Friendship => "friendship",
            Self::Career => "career",
            Self::Residence => "residence",
            Self::Virtue => "virtue",
            Self::Parents => "parents",
        }
    }
}

/// Five-element bureau (五行局); the number is the first decade's starting age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bureau {
    Water2,
    Wood3,
    Metal4,
    Earth5,
    Fire6,
}

impl Bureau {
    #[must_use]
    pub fn number(self) -> u8 {
        match self {
            Self::Water2 => 2,
            Self::Wood3 => 3,
            Self::Metal4 => 4,
            Self::Earth5 => 5,
            Self::Fire6 => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Star {
    pub id: String,
    /// Only primary stars carry a brightness rating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<Magnitude>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformations: Vec<Transformation>,
    pub palace: PalaceRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecadeLimit {
    pub start_age: u8,
    pub end_age: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palace {
    pub role: PalaceRole,
    pub stem: Stem,
    pub branch: Branch,
    pub stars: Vec<Star>,
    pub is_life_palace: bool,
    pub is_body_palace: bool,
    pub decade: DecadeLimit,
}

impl Palace {
    #[must_use]
    pub fn has_star(&self, id: &str) -> bool {
        self.stars.iter().any(|s| s.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chart {
    pub birth: BirthRecord,
    /// The lunar date the placement was computed from.
    pub lunar: LunarDate,
    pub bureau: Bureau,
    pub life_branch: Branch,
    pub body_branch: Branch,
    /// Ordered by role, Life Palace first.
    pub palaces: Vec<Palace>,
}

impl Chart {
    #[must_use]
    pub fn palace(&self, role: PalaceRole) -> Option<&Palace> {
        self.palaces.iter().find(|p| p.role == role)
    }

    #[must_use]
    pub fn palace_at(&self, branch: Branch) -> Option<&Palace> {
        self.palaces.iter().find(|p| p.branch == branch)
    }

    #[must_use]
    pub fn life_palace(&self) -> Option<&Palace> {
        self.palaces.iter().find(|p| p.is_life_palace)
    }

    /// The palace holding `star_id` (simplified spellings accepted).
    #[must_use]
    pub fn find_star(&self, star_id: &str) -> Option<(&Palace, &Star)> {
        let canonical = stars::canonical_star_id(star_id);
        self.palaces.iter().find_map(|p| {
            p.stars
                .iter()
                .find(|s| s.id == canonical)
                .map(|s| (p, s))
        })
    }

    pub fn stars(&self) -> impl Iterator<Item = &Star> {
        self.palaces.iter().flat_map(|p| p.stars.iter())
    }

    /// Structural checks for chart payloads received from outside.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.birth.validate()?;

        if self.palaces.len() != 12 {
            return Err(ValidationError::new(
                "palaces",
                format!("expected 12 palaces, got {}", self.palaces.len()),
            ));
        }

        let roles: HashSet<PalaceRole> = self.palaces.iter().map(|p| p.role).collect();
        if roles.len() != 12 {
            return Err(ValidationError::new("palaces", "palace roles must be distinct"));
        }
        let branches: HashSet<Branch> = self.palaces.iter().map(|p| p.branch).collect();
        if branches.len() != 12 {
            return Err(ValidationError::new("palaces", "palace branches must be distinct"));
        }

        let life: Vec<&Palace> = self.palaces.iter().filter(|p| p.is_life_palace).collect();
        match life.as_slice() {
            [only] if only.role == PalaceRole::Life && only.branch == self.life_branch => {}
            _ => {
                return Err(ValidationError::new(
                    "life_branch",
                    "exactly one life palace matching life_branch is required",
                ));
            }
        }

        let mut seen = HashSet::new();
        for palace in &self.palaces {
            for star in &palace.stars {
                if star.palace != palace.role {
                    return Err(ValidationError::new(
                        "stars",
                        format!(
                            "star {} claims {:?} but sits in {:?}",
                            star.id, star.palace, palace.role
                        ),
                    ));
                }
                if !seen.insert(star.id.as_str()) {
                    return Err(ValidationError::new(
                        "stars",
                        format!("star {} occupies more than one palace", star.id),
                    ));
                }
            }
        }
        Ok(())
    }
}
