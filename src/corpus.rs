//! One JSON document per scraped source under the corpus directory.
//!
//! Writes go to a temporary file in the same directory and are renamed
//! into place, so a reader never observes a half-written document.
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::models::Source;
use crate::extractor::{ContentStats, Extraction, PageMetadata};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusDocument {
    pub source_id: String,
    pub source_name: String,
    pub url: String,
    pub scraped_at: DateTime<Utc>,
    pub metadata: PageMetadata,
    pub stats: ContentStats,
    /// Lexicon-filtered lines, in page order.
    pub content: String,
    /// First characters of the cleaned page text, for debugging.
    pub raw_sample: String,
}

impl CorpusDocument {
    pub fn new(
        source: &Source,
        extraction: Extraction,
        raw_sample_chars: usize,
        scraped_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            url: source.url.clone(),
            scraped_at,
            metadata: extraction.metadata,
            stats: extraction.stats,
            content: extraction.relevant_text,
            raw_sample: extraction.raw_text.chars().take(raw_sample_chars).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorpusStore {
    dir: PathBuf,
}

impl CorpusStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, source_id: &str) -> Result<PathBuf> {
        if source_id.is_empty()
            || source_id.starts_with('.')
            || source_id.contains(['/', '\\'])
        {
            bail!("source id {source_id:?} cannot name a corpus file");
        }
        Ok(self.dir.join(format!("{source_id}.json")))
    }

    /// Write (or overwrite) the document for its source.
    pub fn save(&self, doc: &CorpusDocument) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create corpus dir: {}", self.dir.display()))?;
        let path = self.path_for(&doc.source_id)?;
        let tmp = self.dir.join(format!(".{}.json.tmp", doc.source_id));

        let json = serde_json::to_string_pretty(doc).context("failed to serialize document")?;
        fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("failed to move {} into place", path.display()))?;

        debug!(path = %path.display(), "corpus document written");
        Ok(path)
    }

    pub fn load(&self, source_id: &str) -> Result<Option<CorpusDocument>> {
        let path = self.path_for(source_id)?;
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let doc = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(doc))
    }

    /// Source ids with a stored document, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
