//! Evaluation API: the pure query-time path shared by the MCP tools and the CLI.
//!
//! An [`Engine`] owns no mutable state after construction, so one instance
//! can serve concurrent requests behind an `Arc`.
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::chart::{BirthInput, Chart, ChartCalculator, LunarTable};
use crate::config::Config;
use crate::error::{EngineError, ValidationError};
use crate::evaluator::{Evaluator, Interpretation};
use crate::rules::{Consensus, Dimension, Rule, RuleStore};

pub struct Engine {
    calculator: ChartCalculator,
    rules: RuleStore,
    evaluator: Evaluator,
}

impl Engine {
    pub fn new(calculator: ChartCalculator, rules: RuleStore, evaluator: Evaluator) -> Self {
        Self {
            calculator,
            rules,
            evaluator,
        }
    }

    /// Build from configuration, loading the lunar table when one is configured.
    pub fn from_config(config: &Config, rules: RuleStore) -> Result<Self> {
        let calculator = match &config.calendar_table_path {
            Some(path) => {
                let table = LunarTable::load(Path::new(path))
                    .with_context(|| format!("failed to load calendar table: {path}"))?;
                info!(years = table.len(), "lunar calendar table loaded");
                ChartCalculator::with_converter(Arc::new(table))
            }
            None => ChartCalculator::new(),
        };
        Ok(Self::new(
            calculator,
            rules,
            Evaluator::new(&config.evaluate),
        ))
    }

    pub fn rules(&self) -> &RuleStore {
        &self.rules
    }

    pub fn calculate(&self, input: &BirthInput) -> Result<Chart, EngineError> {
        let record = input.validate()?;
        self.calculator.calculate(&record)
    }

    /// Evaluate every stored rule against a chart that may have come from
    /// outside. The chart must be well formed and must be exactly the chart
    /// its own birth record produces.
    pub fn evaluate_rules(
        &self,
        chart: &Chart,
        min_consensus: Option<Consensus>,
    ) -> Result<Vec<Interpretation>, EngineError> {
        chart.validate()?;
        let expected = self.calculator.calculate(&chart.birth)?;
        if let Some(reason) = first_difference(&expected, chart) {
            return Err(ValidationError::new("chart", reason).into());
        }
        Ok(self
            .evaluator
            .evaluate_filtered(chart, self.rules.iter(), min_consensus))
    }

    pub fn search_knowledge(
        &self,
        query: &str,
        category: Option<&str>,
    ) -> Result<Vec<&Rule>, EngineError> {
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(|c| {
                c.parse::<Dimension>()
                    .map_err(|e| ValidationError::new("category", e.reason))
            })
            .transpose()?;
        Ok(self.rules.search(query, category)?)
    }
}

/// Where a received chart departs from the recomputed one, if anywhere.
fn first_difference(expected: &Chart, received: &Chart) -> Option<String> {
    if expected.lunar != received.lunar {
        return Some("lunar date does not match the birth record".into());
    }
    if expected.bureau != received.bureau
        || expected.life_branch != received.life_branch
        || expected.body_branch != received.body_branch
    {
        return Some("bureau or life/body palace does not match the birth record".into());
    }
    expected
        .palaces
        .iter()
        .zip(&received.palaces)
        .find(|(e, r)| e != r)
        .map(|(e, _)| format!("{} palace does not match the birth record", e.role.english()))
}

/// Parse an optional consensus label as received from a caller.
pub fn parse_min_consensus(raw: Option<&str>) -> Result<Option<Consensus>, ValidationError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Consensus>()
                .map_err(|e| ValidationError::new("min_consensus", e.reason))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{PalaceRole, Transformation};

    const RULES: &str = r#"[
        {"id":"tianji-life","name":"天機坐命","scope":"star",
         "interpretation":{"zh":"{stars}坐{palace}","en":"{stars} in the {palace}"},
         "dimensions":["personality"],"consensus":"consensus",
         "condition":{"stars":["天機"],"palace":"life"}},
        {"id":"wealth-note","name":"財帛雜論","scope":"miscellaneous_combo",
         "interpretation":{"zh":"財","en":"money"},
         "dimensions":["wealth"],"consensus":"minority_view"}
    ]"#;

    fn engine() -> Engine {
        let mut rules = RuleStore::new();
        rules.import_json(RULES).unwrap();
        Engine::from_config(&Config::default(), rules).unwrap()
    }

    fn input() -> BirthInput {
        serde_json::from_value(serde_json::json!({
            "year": 1990, "month": 5, "day": 15,
            "hourBranch": "午", "yearStem": "庚", "yearBranch": "午",
            "gender": "male"
        }))
        .unwrap()
    }

    #[test]
    fn test_calculate_then_evaluate() {
        let engine = engine();
        let chart = engine.calculate(&input()).unwrap();
        assert_eq!(chart.palaces.len(), 12);

        let out = engine.evaluate_rules(&chart, None).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rule_id, "tianji-life");
    }

    #[test]
    fn test_invalid_birth_names_field() {
        let mut bad = input();
        bad.hour_branch = "noon".into();
        let err = engine().calculate(&bad).unwrap_err();
        assert_eq!(err.field(), Some("hour_branch"));
    }

    #[test]
    fn test_tampered_chart_rejected() {
        let engine = engine();
        let mut chart = engine.calculate(&input()).unwrap();
        chart.palaces.pop();
        let err = engine.evaluate_rules(&chart, None).unwrap_err();
        assert_eq!(err.field(), Some("palaces"));
    }

    #[test]
    fn test_forged_chart_rejected() {
        let mut rules = RuleStore::new();
        rules
            .import_json(
                r#"[{"id":"ziwei-ji-life","name":"紫微化忌坐命","scope":"star",
                    "interpretation":{"zh":"","en":""},"dimensions":["career"],
                    "consensus":"consensus",
                    "condition":{"stars":["紫微"],"palace":"life","transformations":["化忌"]}}]"#,
            )
            .unwrap();
        let engine = Engine::from_config(&Config::default(), rules).unwrap();
        let honest = engine.calculate(&input()).unwrap();
        assert!(engine.evaluate_rules(&honest, None).unwrap().is_empty());

        // Move 紫微 into the life palace and tag it 化忌.
        let mut forged = honest.clone();
        let (from, at) = forged
            .palaces
            .iter()
            .enumerate()
            .find_map(|(i, p)| p.stars.iter().position(|s| s.id == "紫微").map(|j| (i, j)))
            .unwrap();
        let mut star = forged.palaces[from].stars.remove(at);
        star.palace = PalaceRole::Life;
        star.transformations = vec![Transformation::Adversity];
        forged.palaces[0].stars.push(star);
        assert!(forged.validate().is_ok());

        let err = engine.evaluate_rules(&forged, None).unwrap_err();
        assert_eq!(err.field(), Some("chart"));
    }

    #[test]
    fn test_search_category() {
        let engine = engine();
        let hits = engine.search_knowledge("", Some("wealth")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "wealth-note");

        let err = engine.search_knowledge("財", Some("fame")).unwrap_err();
        assert_eq!(err.field(), Some("category"));
    }

    #[test]
    fn test_parse_min_consensus() {
        assert_eq!(parse_min_consensus(None).unwrap(), None);
        assert_eq!(
            parse_min_consensus(Some("disputed")).unwrap(),
            Some(Consensus::Disputed)
        );
        assert_eq!(
            parse_min_consensus(Some("strong")).unwrap_err().field,
            "min_consensus"
        );
    }

    #[test]
    fn test_missing_calendar_table_is_an_error() {
        let config = Config {
            calendar_table_path: Some("/nonexistent/lunar.json".into()),
            ..Config::default()
        };
        assert!(Engine::from_config(&config, RuleStore::new()).is_err());
    }
}
