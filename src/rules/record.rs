//! Loose rule records as they appear in seed files.
//!
//! Every symbolic field arrives as a string so that an unrecognized value
//! can be reported against the field it came from rather than as a bare
//! deserialization failure.
use serde::Deserialize;

use super::{Bilingual, Condition, Consensus, Dimension, Relation, Rule, Scope, Statistics};
use crate::chart::stars::canonical_star_id;
use crate::chart::{Magnitude, PalaceRole, Transformation};
use crate::error::{ConsensusInconsistency, EngineError, ValidationError};

#[derive(Debug, Clone, Deserialize)]
pub struct RuleRecord {
    pub id: String,
    pub name: String,
    pub scope: String,
    pub interpretation: Bilingual,
    #[serde(default)]
    pub dimensions: Vec<String>,
    pub consensus: String,
    #[serde(default)]
    pub statistics: Option<StatisticsRecord>,
    #[serde(default)]
    pub condition: Option<ConditionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsRecord {
    #[serde(default, alias = "sampleSize")]
    pub sample_size: Option<i64>,
    #[serde(default, alias = "matchRate")]
    pub match_rate: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionRecord {
    #[serde(default)]
    pub stars: Vec<String>,
    #[serde(default)]
    pub palace: Option<String>,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub transformations: Vec<String>,
    #[serde(default, alias = "minMagnitude")]
    pub min_magnitude: Option<String>,
}

fn tagged(id: &str, err: ValidationError) -> ValidationError {
    ValidationError::new(err.field, format!("rule {id}: {}", err.reason))
}

impl RuleRecord {
    /// Resolve every symbol and run [`Rule::validate`].
    pub fn into_rule(self) -> Result<Rule, EngineError> {
        let id = self.id.trim().to_string();
        let scope = self.scope.parse::<Scope>().map_err(|e| tagged(&id, e))?;
        let consensus = self.consensus.parse::<Consensus>().map_err(|e| tagged(&id, e))?;

        let mut dimensions: Vec<Dimension> = Vec::with_capacity(self.dimensions.len());
        for raw in &self.dimensions {
            let dim = raw
                .parse::<Dimension>()
                .map_err(|e| ConsensusInconsistency {
                    rule_id: id.clone(),
                    field: e.field,
                    reason: e.reason,
                })?;
            if !dimensions.contains(&dim) {
                dimensions.push(dim);
            }
        }

        let statistics = self
            .statistics
            .map(|s| s.resolve(&id))
            .transpose()?;
        let condition = self.condition.map(|c| c.resolve(&id)).transpose()?;

        let rule = Rule {
            id,
            name: self.name.trim().to_string(),
            scope,
            interpretation: self.interpretation,
            dimensions,
            consensus,
            statistics,
            condition,
        };
        rule.validate()?;
        Ok(rule)
    }
}

impl StatisticsRecord {
    fn resolve(self, id: &str) -> Result<Statistics, ValidationError> {
        let sample_size = self
            .sample_size
            .map(|n| {
                u32::try_from(n).map_err(|_| {
                    ValidationError::new(
                        "statistics.sample_size",
                        format!("rule {id}: sample size {n} is not a count"),
                    )
                })
            })
            .transpose()?;
        Ok(Statistics {
            sample_size,
            match_rate: self.match_rate,
            confidence: self.confidence,
        })
    }
}

impl ConditionRecord {
    fn resolve(self, id: &str) -> Result<Condition, ValidationError> {
        let palace = self
            .palace
            .as_deref()
            .map(parse_palace)
            .transpose()
            .map_err(|e| tagged(id, e))?;
        let relation = self
            .relation
            .as_deref()
            .map(parse_relation)
            .transpose()
            .map_err(|e| tagged(id, e))?
            .unwrap_or_default();

        let mut transformations = Vec::new();
        for raw in &self.transformations {
            let t = parse_transformation(raw).map_err(|e| tagged(id, e))?;
            if !transformations.contains(&t) {
                transformations.push(t);
            }
        }

        let min_magnitude = self
            .min_magnitude
            .as_deref()
            .map(parse_magnitude)
            .transpose()
            .map_err(|e| tagged(id, e))?;

        Ok(Condition {
            stars: self
                .stars
                .iter()
                .map(|s| canonical_star_id(s).into_owned())
                .collect(),
            palace,
            relation,
            transformations,
            min_magnitude,
        })
    }
}

// ── Symbol tables ────────────────────────────────────────────────────

const PALACE_SIMPLIFIED: [(&str, PalaceRole); 5] = [
    ("命宫", PalaceRole::Life),
    ("财帛", PalaceRole::Wealth),
    ("迁移", PalaceRole::Travel),
    ("官禄", PalaceRole::Career),
    ("仆役", PalaceRole::Friendship),
];

pub fn parse_palace(raw: &str) -> Result<PalaceRole, ValidationError> {
    let s = raw.trim();
    let lower = s.to_ascii_lowercase();
    let bare = lower.strip_suffix("_palace").unwrap_or(&lower);
    PalaceRole::ALL
        .into_iter()
        .find(|r| r.symbol() == s || r.english() == bare)
        .or_else(|| {
            PALACE_SIMPLIFIED
                .iter()
                .find(|(zh, _)| *zh == s)
                .map(|(_, r)| *r)
        })
        .or_else(|| (s == "命").then_some(PalaceRole::Life))
        .ok_or_else(|| {
            ValidationError::new("condition.palace", format!("unrecognized palace {s:?}"))
        })
}

pub fn parse_relation(raw: &str) -> Result<Relation, ValidationError> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "same_palace" | "same" | "同宮" | "同宫" => Ok(Relation::SamePalace),
        "opposite_palace" | "opposite" | "對宮" | "对宫" => Ok(Relation::OppositePalace),
        "triangle" | "trine" | "三合" => Ok(Relation::Triangle),
        "full_square" | "三方四正" => Ok(Relation::FullSquare),
        other => Err(ValidationError::new(
            "condition.relation",
            format!("unrecognized relation {other:?}"),
        )),
    }
}

pub fn parse_transformation(raw: &str) -> Result<Transformation, ValidationError> {
    let s = raw.trim();
    let bare = s.strip_prefix('化').unwrap_or(s);
    match bare.to_ascii_lowercase().as_str() {
        "wealth" | "lu" | "祿" | "禄" => Ok(Transformation::Wealth),
        "power" | "quan" | "權" | "权" => Ok(Transformation::Power),
        "scholarship" | "ke" | "科" => Ok(Transformation::Scholarship),
        "adversity" | "ji" | "忌" => Ok(Transformation::Adversity),
        _ => Err(ValidationError::new(
            "condition.transformations",
            format!("unrecognized transformation {s:?}"),
        )),
    }
}

pub fn parse_magnitude(raw: &str) -> Result<Magnitude, ValidationError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trapped" | "陷" => Ok(Magnitude::Trapped),
        "weak" | "不" => Ok(Magnitude::Weak),
        "neutral" | "平" => Ok(Magnitude::Neutral),
        "beneficial" | "利" => Ok(Magnitude::Beneficial),
        "gained" | "得" => Ok(Magnitude::Gained),
        "prosperous" | "旺" => Ok(Magnitude::Prosperous),
        "temple" | "廟" | "庙" => Ok(Magnitude::Temple),
        other => Err(ValidationError::new(
            "condition.min_magnitude",
            format!("unrecognized magnitude {other:?}"),
        )),
    }
}
