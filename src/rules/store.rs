use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use super::record::RuleRecord;
use super::{Consensus, Dimension, Rule};
use crate::chart::stars::canonical_star_id;
use crate::error::{EngineError, ValidationError};

/// Seed files are either a bare array or `{"rules": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RuleFile {
    List(Vec<RuleRecord>),
    Wrapped { rules: Vec<RuleRecord> },
}

/// In-memory rule catalogue keyed by id. Iteration is always in id order.
#[derive(Debug, Clone, Default)]
pub struct RuleStore {
    rules: BTreeMap<String, Rule>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from already-typed rules (e.g. loaded from SQLite).
    pub fn from_rules(rules: Vec<Rule>) -> Result<Self, EngineError> {
        let mut store = Self::new();
        store.insert_all(rules)?;
        Ok(store)
    }

    /// Parse and validate a seed document without touching any store.
    pub fn parse(json: &str) -> Result<Vec<Rule>, EngineError> {
        let file: RuleFile = serde_json::from_str(json)
            .map_err(|e| ValidationError::new("rules", format!("malformed rule file: {e}")))?;
        let records = match file {
            RuleFile::List(records) | RuleFile::Wrapped { rules: records } => records,
        };
        records.into_iter().map(RuleRecord::into_rule).collect()
    }

    /// Import a seed document. All-or-nothing: one bad record rejects the
    /// whole file. Existing rules with the same id are replaced.
    pub fn import_json(&mut self, json: &str) -> Result<usize, EngineError> {
        let rules = Self::parse(json)?;
        self.insert_all(rules)
    }

    pub fn import_file(&mut self, path: &Path) -> Result<usize> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read rule file: {}", path.display()))?;
        let count = self
            .import_json(&json)
            .with_context(|| format!("rejected rule file: {}", path.display()))?;
        info!(path = %path.display(), count, "imported rules");
        Ok(count)
    }

    fn insert_all(&mut self, rules: Vec<Rule>) -> Result<usize, EngineError> {
        let mut batch: BTreeMap<String, Rule> = BTreeMap::new();
        for rule in rules {
            rule.validate()?;
            if batch.contains_key(&rule.id) {
                return Err(ValidationError::new(
                    "id",
                    format!("duplicate rule id {}", rule.id),
                )
                .into());
            }
            batch.insert(rule.id.clone(), rule);
        }
        let count = batch.len();
        self.rules.extend(batch);
        Ok(count)
    }

    /// Pretty JSON array sorted by id; importing it back yields an
    /// identical export.
    pub fn export_json(&self) -> serde_json::Result<String> {
        let rules: Vec<&Rule> = self.rules.values().collect();
        serde_json::to_string_pretty(&rules)
    }

    pub fn export_file(&self, path: &Path) -> Result<()> {
        let json = self.export_json().context("failed to serialize rules")?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write rule file: {}", path.display()))?;
        info!(path = %path.display(), count = self.len(), "exported rules");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn to_vec(&self) -> Vec<Rule> {
        self.rules.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Keyword search over names, interpretation text and condition stars,
    /// optionally narrowed to one dimension.
    ///
    /// Name and id hits rank above body hits; ties go to the stronger
    /// consensus label, then id.
    pub fn search(
        &self,
        query: &str,
        category: Option<Dimension>,
    ) -> Result<Vec<&Rule>, ValidationError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() && category.is_none() {
            return Err(ValidationError::new(
                "query",
                "a query or a category is required",
            ));
        }
        let star = canonical_star_id(query);

        let mut hits: Vec<(u8, Consensus, &Rule)> = self
            .rules
            .values()
            .filter(|r| category.is_none_or(|c| r.dimensions.contains(&c)))
            .filter_map(|r| {
                if needle.is_empty() {
                    return Some((0, r.consensus, r));
                }
                let score = if r.name.to_lowercase().contains(&needle)
                    || r.id.to_lowercase().contains(&needle)
                {
                    2
                } else if r.interpretation.zh.contains(query.trim())
                    || r.interpretation.en.to_lowercase().contains(&needle)
                    || r
                        .condition
                        .as_ref()
                        .is_some_and(|c| c.stars.iter().any(|s| *s == star))
                {
                    1
                } else {
                    return None;
                };
                Some((score, r.consensus, r))
            })
            .collect();

        hits.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then(b.1.cmp(&a.1))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });
        Ok(hits.into_iter().map(|(_, _, r)| r).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Scope;

    const SEED: &str = r#"[
        {
            "id": "ziwei-life",
            "name": "紫微坐命",
            "scope": "star",
            "interpretation": {"zh": "紫微坐命，氣度尊貴", "en": "Emperor star in the Life Palace: dignified bearing"},
            "dimensions": ["personality", "career"],
            "consensus": "consensus",
            "statistics": {"sample_size": 200, "match_rate": 0.62, "confidence": 0.8},
            "condition": {"stars": ["紫微"], "palace": "life"}
        },
        {
            "id": "jiyueTongLiang",
            "name": "機月同梁格",
            "scope": "major_pattern",
            "interpretation": {"zh": "宜公職", "en": "Suited to civil service"},
            "dimensions": ["career"],
            "consensus": "disputed",
            "condition": {"stars": ["天機", "太陰", "天同", "天梁"], "palace": "life", "relation": "full_square"}
        },
        {
            "id": "lucun-wealth",
            "name": "祿存守財",
            "scope": "star",
            "interpretation": {"zh": "善於積蓄", "en": "Good at saving"},
            "dimensions": ["wealth"],
            "consensus": "minority_view"
        }
    ]"#;

    fn seeded() -> RuleStore {
        let mut store = RuleStore::new();
        store.import_json(SEED).unwrap();
        store
    }

    #[test]
    fn test_import_counts() {
        let store = seeded();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("jiyueTongLiang").unwrap().scope, Scope::MajorPattern);
    }

    #[test]
    fn test_wrapped_file_accepted() {
        let wrapped = format!(r#"{{"rules": {SEED}}}"#);
        let mut store = RuleStore::new();
        assert_eq!(store.import_json(&wrapped).unwrap(), 3);
    }

    #[test]
    fn test_export_round_trip_is_stable() {
        let first = seeded().export_json().unwrap();
        let mut again = RuleStore::new();
        again.import_json(&first).unwrap();
        assert_eq!(again.export_json().unwrap(), first);
    }

    #[test]
    fn test_export_sorted_by_id() {
        let json = seeded().export_json().unwrap();
        let ids: Vec<String> = serde_json::from_str::<Vec<serde_json::Value>>(&json)
            .unwrap()
            .iter()
            .map(|v| v["id"].as_str().unwrap().to_string())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_bad_record_rejects_whole_file() {
        let bad = SEED.replacen("\"minority_view\"", "\"rumour\"", 1);
        let mut store = RuleStore::new();
        let err = store.import_json(&bad).unwrap_err();
        assert_eq!(err.field(), Some("consensus"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let dup = format!(
            "[{0}, {0}]",
            r#"{"id":"a","name":"n","scope":"star","interpretation":{"zh":"","en":""},"dimensions":["wealth"],"consensus":"consensus"}"#
        );
        let err = RuleStore::new().import_json(&dup).unwrap_err();
        assert_eq!(err.field(), Some("id"));
    }

    #[test]
    fn test_search_ranks_name_hits_first() {
        let store = seeded();
        let hits = store.search("紫微", None).unwrap();
        assert_eq!(hits[0].id, "ziwei-life");

        let hits = store.search("天机", None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "jiyueTongLiang");
    }

    #[test]
    fn test_search_by_category_only() {
        let store = seeded();
        let hits = store.search("", Some(Dimension::Career)).unwrap();
        let ids: Vec<&str> = hits.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ziwei-life", "jiyueTongLiang"]);
    }

    #[test]
    fn test_search_requires_something() {
        assert_eq!(seeded().search("  ", None).unwrap_err().field, "query");
    }
}
