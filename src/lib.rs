//! # ziwei-lore: Zi Wei Dou Shu knowledge engine
//!
//! Builds a domain corpus from external sources, keeps a curated rule
//! store, places birth records into charts and evaluates rules against
//! them. The evaluation path is served to AI assistants over the Model
//! Context Protocol (MCP).
//!
//! ## Architecture
//!
//! - **[`config`]**: JSON configuration with per-field defaults
//! - **[`db`]**: SQLite source registry, scrape error records, rule persistence
//! - **[`fetcher`]**: polite HTTP retrieval behind the [`fetcher::Fetcher`] trait
//! - **[`extractor`]**: content region isolation and lexicon filtering
//! - **[`corpus`]**: one JSON document per scraped source
//! - **[`ingest`]**: sequential ingestion driver over the source queue
//! - **[`chart`]**: deterministic twelve-palace chart placement
//! - **[`rules`]**: typed interpretation rules, import/export, search
//! - **[`evaluator`]**: weighted rule matching against a chart
//! - **[`engine`]**: the query-time facade shared by MCP and the CLI
//! - **[`mcp`]**: MCP server with 4 tool handlers (stdio transport via rmcp)

pub mod chart;
pub mod config;
pub mod corpus;
pub mod db;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod extractor;
pub mod fetcher;
pub mod ingest;
pub mod mcp;
pub mod rules;
