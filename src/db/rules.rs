use super::Db;
use crate::rules::Rule;
use rusqlite::types::Type;
use rusqlite::{Result, params};

impl Db {
    /// Insert or replace rules, one JSON body per id.
    pub fn save_rules<'r>(&mut self, rules: impl IntoIterator<Item = &'r Rule>) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;
        for rule in rules {
            let body = serde_json::to_string(rule)
                .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
            tx.execute(
                r#"
                INSERT INTO rules (id, body, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
                ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = CURRENT_TIMESTAMP
                "#,
                params![rule.id, body],
            )?;
            count += 1;
        }
        tx.commit()?;
        Ok(count)
    }

    /// Every stored rule in id order.
    pub fn load_rules(&self) -> Result<Vec<Rule>> {
        let mut stmt = self.conn.prepare("SELECT body FROM rules ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            let body: String = row.get(0)?;
            serde_json::from_str::<Rule>(&body)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
        })?;
        rows.collect()
    }

    pub fn count_rules(&self) -> Result<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM rules", [], |row| row.get(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleStore;

    const SEED: &str = r#"[
        {"id":"b","name":"天府坐命","scope":"star","interpretation":{"zh":"穩重","en":"Steady"},
         "dimensions":["personality"],"consensus":"consensus",
         "condition":{"stars":["天府"],"palace":"life"}},
        {"id":"a","name":"機月同梁","scope":"major_pattern","interpretation":{"zh":"","en":""},
         "dimensions":["career"],"consensus":"disputed",
         "statistics":{"sample_size":40,"confidence":0.55}}
    ]"#;

    #[test]
    fn test_rules_round_trip_through_sqlite() {
        let mut store = RuleStore::new();
        store.import_json(SEED).unwrap();

        let mut db = Db::open_in_memory().unwrap();
        assert_eq!(db.save_rules(store.iter()).unwrap(), 2);
        assert_eq!(db.count_rules().unwrap(), 2);

        let loaded = RuleStore::from_rules(db.load_rules().unwrap()).unwrap();
        assert_eq!(loaded.export_json().unwrap(), store.export_json().unwrap());
    }

    #[test]
    fn test_save_replaces_by_id() {
        let mut store = RuleStore::new();
        store.import_json(SEED).unwrap();
        let mut db = Db::open_in_memory().unwrap();
        db.save_rules(store.iter()).unwrap();

        let mut changed = store.get("b").unwrap().clone();
        changed.name = "天府守命".into();
        db.save_rules([&changed]).unwrap();

        let rules = db.load_rules().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].name, "天府守命");
    }
}
