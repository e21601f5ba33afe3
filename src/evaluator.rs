//! Rule evaluation: match rule conditions against a chart and rank the
//! resulting interpretations.
//!
//! Evaluation is pure. The same chart and rule set always produce the same
//! interpretations in the same order, and contradicting rules are both
//! returned; reconciling them is left to the reader.
use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::chart::{Branch, Chart, Palace, PalaceRole, star_info};
use crate::config::{BaseWeights, EvaluateConfig};
use crate::rules::{Bilingual, Condition, Consensus, Dimension, Rule, Scope};

/// One chart element that satisfied part of a rule's condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedElement {
    pub palace: PalaceRole,
    pub branch: Branch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub star: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Interpretation {
    pub rule_id: String,
    pub rule_name: String,
    pub scope: Scope,
    pub consensus: Consensus,
    pub dimensions: Vec<Dimension>,
    /// The palace the match was anchored on.
    pub anchor: PalaceRole,
    pub matched: Vec<MatchedElement>,
    pub weight: f64,
    pub in_life_palace: bool,
    pub text: Bilingual,
}

struct Match {
    anchor: PalaceRole,
    elements: Vec<MatchedElement>,
    in_life_palace: bool,
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    weights: BaseWeights,
    default_confidence: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(&EvaluateConfig::default())
    }
}

impl Evaluator {
    pub fn new(config: &EvaluateConfig) -> Self {
        Self {
            weights: config.base_weights,
            default_confidence: config.default_confidence,
        }
    }

    /// Base weight from the consensus label, scaled by confidence.
    #[must_use]
    pub fn weight(&self, rule: &Rule) -> f64 {
        let base = match rule.consensus {
            Consensus::Consensus => self.weights.consensus,
            Consensus::Disputed => self.weights.disputed,
            Consensus::MinorityView => self.weights.minority_view,
        };
        let confidence = rule
            .statistics
            .as_ref()
            .and_then(|s| s.confidence)
            .unwrap_or(self.default_confidence);
        base * confidence
    }

    /// Every matching rule, strongest first. Rules without a condition
    /// never match.
    pub fn evaluate<'r>(
        &self,
        chart: &Chart,
        rules: impl IntoIterator<Item = &'r Rule>,
    ) -> Vec<Interpretation> {
        self.evaluate_filtered(chart, rules, None)
    }

    /// Like [`Evaluator::evaluate`], dropping rules whose label ranks
    /// below `min_consensus`.
    pub fn evaluate_filtered<'r>(
        &self,
        chart: &Chart,
        rules: impl IntoIterator<Item = &'r Rule>,
        min_consensus: Option<Consensus>,
    ) -> Vec<Interpretation> {
        let mut out: Vec<Interpretation> = rules
            .into_iter()
            .filter(|r| min_consensus.is_none_or(|min| r.consensus >= min))
            .filter_map(|rule| {
                let condition = rule.condition.as_ref()?;
                let found = match_condition(chart, condition)?;
                Some(self.interpret(chart, rule, found))
            })
            .collect();

        out.sort_by(rank);
        debug!(matched = out.len(), "evaluated rules");
        out
    }

    fn interpret(&self, chart: &Chart, rule: &Rule, found: Match) -> Interpretation {
        let text = render(&rule.interpretation, chart, &found);
        Interpretation {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            scope: rule.scope,
            consensus: rule.consensus,
            dimensions: rule.dimensions.clone(),
            anchor: found.anchor,
            matched: found.elements,
            weight: self.weight(rule),
            in_life_palace: found.in_life_palace,
            text,
        }
    }
}

/// Weight, then scope specificity, then Life Palace matches, then id.
fn rank(a: &Interpretation, b: &Interpretation) -> Ordering {
    b.weight
        .total_cmp(&a.weight)
        .then(b.scope.specificity().cmp(&a.scope.specificity()))
        .then(b.in_life_palace.cmp(&a.in_life_palace))
        .then_with(|| a.rule_id.cmp(&b.rule_id))
}

// ── Condition matching ───────────────────────────────────────────────

fn match_condition(chart: &Chart, condition: &Condition) -> Option<Match> {
    let anchors: Vec<&Palace> = match condition.palace {
        Some(role) => chart.palace(role).into_iter().collect(),
        None => {
            // Life Palace first, then the rest in role order.
            let mut all: Vec<&Palace> = chart.palaces.iter().collect();
            all.sort_by_key(|p| (!p.is_life_palace, p.role));
            all
        }
    };
    anchors
        .into_iter()
        .find_map(|anchor| match_at(chart, condition, anchor))
}

fn match_at(chart: &Chart, condition: &Condition, anchor: &Palace) -> Option<Match> {
    let covered: Vec<&Palace> = condition
        .relation
        .branches(anchor.branch)
        .into_iter()
        .filter_map(|b| chart.palace_at(b))
        .collect();

    let mut elements = Vec::new();
    for id in &condition.stars {
        let (palace, star) = covered
            .iter()
            .find_map(|p| p.stars.iter().find(|s| s.id == *id).map(|s| (*p, s)))?;
        if let Some(min) = condition.min_magnitude {
            if star.magnitude.is_none_or(|m| m < min) {
                return None;
            }
        }
        elements.push(MatchedElement {
            palace: palace.role,
            branch: palace.branch,
            star: Some(star.id.clone()),
        });
    }

    for t in &condition.transformations {
        // With named stars the transformation must sit on one of them.
        let carrier = covered.iter().find_map(|p| {
            p.stars
                .iter()
                .filter(|s| condition.stars.is_empty() || condition.stars.contains(&s.id))
                .find(|s| s.transformations.contains(t))
                .map(|s| (*p, s))
        });
        let (palace, star) = carrier?;
        let element = MatchedElement {
            palace: palace.role,
            branch: palace.branch,
            star: Some(star.id.clone()),
        };
        if !elements.contains(&element) {
            elements.push(element);
        }
    }

    let in_life_palace = anchor.is_life_palace
        || elements
            .iter()
            .any(|e| e.palace == PalaceRole::Life);
    Some(Match {
        anchor: anchor.role,
        elements,
        in_life_palace,
    })
}

// ── Text rendering ───────────────────────────────────────────────────

/// Fill `{palace}` and `{stars}` placeholders in both languages.
fn render(text: &Bilingual, chart: &Chart, found: &Match) -> Bilingual {
    let mut star_ids: Vec<&str> = Vec::new();
    for e in &found.elements {
        if let Some(id) = e.star.as_deref() {
            if !star_ids.contains(&id) {
                star_ids.push(id);
            }
        }
    }
    let branch = chart
        .palace(found.anchor)
        .map(|p| p.branch.symbol())
        .unwrap_or_default();

    let zh_palace = format!("{}({branch})", found.anchor.symbol());
    let zh_stars = star_ids.join("、");
    let en_palace = format!("{} palace", found.anchor.english());
    let en_stars = star_ids
        .iter()
        .map(|id| star_info(id).name_en)
        .collect::<Vec<_>>()
        .join(", ");

    Bilingual {
        zh: text
            .zh
            .replace("{palace}", &zh_palace)
            .replace("{stars}", &zh_stars),
        en: text
            .en
            .replace("{palace}", &en_palace)
            .replace("{stars}", &en_stars),
    }
}
