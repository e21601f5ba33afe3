use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Named grouping of sources that share a scraping strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Structured reference sites: star and palace encyclopaedias.
    Reference,
    /// Digitised classical texts.
    Classics,
    /// Forums, blogs and case collections.
    Community,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    #[default]
    Pending,
    Fetching,
    Scraped,
    SkippedManual,
    Error,
}

macro_rules! text_enum {
    ($ty:ty, $field:literal, [$($variant:path => $name:literal),+ $(,)?]) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(ValidationError::new($field, format!("unrecognized {other:?}"))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: ValidationError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum!(Phase, "phase", [
    Phase::Reference => "reference",
    Phase::Classics => "classics",
    Phase::Community => "community",
]);

text_enum!(SourceStatus, "status", [
    SourceStatus::Pending => "pending",
    SourceStatus::Fetching => "fetching",
    SourceStatus::Scraped => "scraped",
    SourceStatus::SkippedManual => "skipped_manual",
    SourceStatus::Error => "error",
]);

/// A registry entry. Only the ingestion driver changes its lifecycle fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub priority: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraper_note: Option<String>,
    pub phase: Phase,
    #[serde(default)]
    pub status: SourceStatus,
    #[serde(default)]
    pub last_scraped: Option<DateTime<Utc>>,
    #[serde(default)]
    pub char_count: u64,
}

impl Source {
    /// Ids become corpus file names, so keep them to a safe alphabet.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let id_ok = !self.id.is_empty()
            && self
                .id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !self.id.starts_with('.');
        if !id_ok {
            return Err(ValidationError::new(
                "id",
                format!("source id {:?} must be [A-Za-z0-9._-] and not start with '.'", self.id),
            ));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ValidationError::new(
                "url",
                format!("source {}: {:?} is not an http(s) url", self.id, self.url),
            ));
        }
        Ok(())
    }
}

/// Structured record of one failed scrape attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeErrorRecord {
    pub source_id: String,
    pub url: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub scraped_count: u64,
    pub last_scraped_at: Option<DateTime<Utc>>,
}

/// The registry file: sources plus the aggregate progress block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    pub sources: Vec<Source>,
    #[serde(default)]
    pub progress: Progress,
}
