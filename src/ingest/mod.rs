//! Ingestion driver: walks the source registry and turns each source into
//! a corpus document.
//!
//! Sources are processed one at a time with a fixed pause between network
//! fetches. Per-source failures are recorded and the run moves on; only
//! database errors abort a run.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use chrono::Utc;
use indicatif::ProgressBar;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::corpus::{CorpusDocument, CorpusStore};
use crate::db::Db;
use crate::db::models::{Phase, ScrapeErrorRecord, Source, SourceStatus};
use crate::error::ExtractionError;
use crate::extractor::Extractor;
use crate::fetcher::Fetcher;

static MANUAL_ACCESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)manual|paywall|login required|subscription|手動|付費|需登入|會員").unwrap()
});

const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// True when the source's note says it cannot be scraped automatically.
pub fn requires_manual_access(source: &Source) -> bool {
    source
        .scraper_note
        .as_deref()
        .is_some_and(|note| MANUAL_ACCESS.is_match(note))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueFilter {
    /// Select exactly this source, whatever its status.
    pub source: Option<String>,
    pub phase: Option<Phase>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub selected: usize,
    pub scraped: usize,
    pub skipped_manual: usize,
    pub failed: usize,
    /// Sources a dry run would have fetched.
    pub would_fetch: usize,
    pub stopped_early: bool,
    pub dry_run: bool,
}

pub struct Ingestor<'a, F: Fetcher + ?Sized> {
    pub db: &'a mut Db,
    pub fetcher: &'a F,
    pub corpus: &'a CorpusStore,
    extractor: Extractor,
    raw_sample_chars: usize,
    delay: Duration,
    stop: Arc<AtomicBool>,
    progress: ProgressBar,
}

impl<'a, F: Fetcher + ?Sized> Ingestor<'a, F> {
    pub fn new(db: &'a mut Db, fetcher: &'a F, corpus: &'a CorpusStore, config: &Config) -> Self {
        Self {
            db,
            fetcher,
            corpus,
            extractor: Extractor::new(&config.extract),
            raw_sample_chars: config.extract.raw_sample_chars,
            delay: config.fetch.request_delay(),
            stop: Arc::new(AtomicBool::new(false)),
            progress: ProgressBar::hidden(),
        }
    }

    /// Share a flag that requests a stop after the current source.
    #[must_use]
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sources a run with `filter` would visit, in order.
    pub fn select(&self, filter: &QueueFilter) -> Result<Vec<Source>> {
        match &filter.source {
            Some(id) => {
                let source = self
                    .db
                    .get_source(id)?
                    .ok_or_else(|| anyhow!("unknown source id: {id}"))?;
                if filter.phase.is_some_and(|p| p != source.phase) {
                    warn!(source = %id, phase = %source.phase, "source is outside the requested phase");
                    return Ok(Vec::new());
                }
                Ok(vec![source])
            }
            None => Ok(self.db.source_queue(filter.phase)?),
        }
    }

    pub fn run(&mut self, filter: &QueueFilter, dry_run: bool) -> Result<IngestReport> {
        let queue = self.select(filter)?;
        let mut report = IngestReport {
            selected: queue.len(),
            dry_run,
            ..IngestReport::default()
        };
        info!(selected = queue.len(), dry_run, "ingestion queue selected");
        self.progress.set_length(queue.len() as u64);

        let mut fetched_before = false;
        for source in &queue {
            if self.stop_requested() {
                report.stopped_early = true;
                info!("stop requested, ending run before {}", source.id);
                break;
            }
            self.progress.set_message(source.id.clone());

            if requires_manual_access(source) {
                info!(source = %source.id, "skipping: requires manual access");
                if !dry_run {
                    self.db
                        .set_source_status(&source.id, SourceStatus::SkippedManual)?;
                }
                report.skipped_manual += 1;
            } else if dry_run {
                info!(source = %source.id, url = %source.url, "dry run: would fetch");
                report.would_fetch += 1;
            } else {
                if fetched_before && !self.pause() {
                    report.stopped_early = true;
                    info!("stop requested during delay, ending run before {}", source.id);
                    break;
                }
                fetched_before = true;
                if self.ingest_one(source)? {
                    report.scraped += 1;
                } else {
                    report.failed += 1;
                }
            }
            self.progress.inc(1);
        }

        self.progress.finish_and_clear();
        info!(
            scraped = report.scraped,
            skipped = report.skipped_manual,
            failed = report.failed,
            "ingestion run finished"
        );
        Ok(report)
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Sleep out the politeness delay; false if a stop arrived meanwhile.
    fn pause(&self) -> bool {
        let deadline = Instant::now() + self.delay;
        loop {
            if self.stop_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(PAUSE_SLICE.min(deadline - now));
        }
    }

    /// Fetch, extract and store one source. Returns whether it succeeded;
    /// only database errors are propagated.
    fn ingest_one(&mut self, source: &Source) -> Result<bool> {
        self.db.set_source_status(&source.id, SourceStatus::Fetching)?;

        let outcome = self.harvest(source).and_then(|doc| {
            self.corpus.save(&doc)?;
            Ok(doc)
        });

        match outcome {
            Ok(doc) => {
                let chars = doc.stats.relevant_chars as u64;
                self.db.mark_scraped(&source.id, doc.scraped_at, chars)?;
                info!(
                    source = %source.id,
                    relevant_chars = chars,
                    ratio = doc.stats.relevance_ratio,
                    "scraped"
                );
                Ok(true)
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(source = %source.id, error = %message, "scrape failed");
                self.db.mark_error(&ScrapeErrorRecord {
                    source_id: source.id.clone(),
                    url: source.url.clone(),
                    message,
                    occurred_at: Utc::now(),
                })?;
                Ok(false)
            }
        }
    }

    fn harvest(&self, source: &Source) -> Result<CorpusDocument> {
        let response = self.fetcher.fetch(&source.url)?;
        if !response.is_markup() {
            let ct = response.content_type.unwrap_or_default();
            return Err(ExtractionError::UnsupportedContentType(ct).into());
        }
        let extraction = self.extractor.extract(&response.body)?;
        Ok(CorpusDocument::new(
            source,
            extraction,
            self.raw_sample_chars,
            Utc::now(),
        ))
    }
}
