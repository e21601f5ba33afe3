/// MCP tool handlers for the evaluation API.
///
/// 1. calculate_chart  : place a birth record into twelve palaces
/// 2. evaluate_rules   : match stored rules against a chart
/// 3. search_knowledge : keyword search over the rule store
/// 4. list_sources     : source registry with scrape progress
use crate::chart::{BirthInput, Chart};
use crate::db::models::{Phase, SourceStatus};
use crate::engine::parse_min_consensus;
use crate::error::{EngineError, ValidationError};
use crate::mcp::server::McpContext;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct EvaluateParams {
    /// Chart object as returned by calculate_chart
    chart: serde_json::Value,
    /// Lowest consensus label to keep: consensus | disputed | minority_view
    min_consensus: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct SearchKnowledgeParams {
    /// Keywords matched against rule names, texts and star names
    query: String,
    /// Dimension filter: personality | career | wealth | health | relationships | family | education | spirituality
    category: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct ListSourcesParams {
    /// Phase filter: reference | classics | community
    phase: Option<String>,
    /// Status filter: pending | fetching | scraped | skipped_manual | error
    status: Option<String>,
}

// ── Response helpers ─────────────────────────────────────────────────

fn json_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn error_result(value: serde_json::Value) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(
        serde_json::to_string_pretty(&value).unwrap_or_default(),
    )]))
}

fn validation_error(e: &ValidationError) -> Result<CallToolResult, McpError> {
    error_result(serde_json::json!({
        "error": "validation",
        "field": e.field,
        "reason": e.reason,
    }))
}

fn engine_error(e: &EngineError) -> Result<CallToolResult, McpError> {
    match e {
        EngineError::Validation(v) => validation_error(v),
        EngineError::Consensus(c) => error_result(serde_json::json!({
            "error": "consensus_inconsistency",
            "rule_id": c.rule_id,
            "field": c.field,
            "reason": c.reason,
        })),
        EngineError::Calculation(d) => {
            tracing::error!("{d}");
            Err(McpError::internal_error(d.to_string(), None))
        }
    }
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: calculate_chart ─────────────────────────────────────

    #[tool(
        description = "Calculate a Zi Wei Dou Shu chart from a birth record. Returns twelve palaces with their stems, branches, stars, brightness and transformations."
    )]
    async fn calculate_chart(
        &self,
        params: Parameters<BirthInput>,
    ) -> Result<CallToolResult, McpError> {
        match self.ctx.engine.calculate(&params.0) {
            Ok(chart) => json_result(serde_json::json!({ "chart": chart })),
            Err(e) => engine_error(&e),
        }
    }

    // ── Tool 2: evaluate_rules ──────────────────────────────────────

    #[tool(
        description = "Match the rule store against a chart. Returns interpretations ordered by weight; contradicting rules are all returned."
    )]
    async fn evaluate_rules(
        &self,
        params: Parameters<EvaluateParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let chart: Chart = match serde_json::from_value(p.chart) {
            Ok(c) => c,
            Err(e) => return validation_error(&ValidationError::new("chart", e.to_string())),
        };
        let min_consensus = match parse_min_consensus(p.min_consensus.as_deref()) {
            Ok(m) => m,
            Err(e) => return validation_error(&e),
        };

        match self.ctx.engine.evaluate_rules(&chart, min_consensus) {
            Ok(interpretations) => json_result(serde_json::json!({
                "count": interpretations.len(),
                "interpretations": interpretations,
            })),
            Err(e) => engine_error(&e),
        }
    }

    // ── Tool 3: search_knowledge ────────────────────────────────────

    #[tool(description = "Keyword search over interpretation rules, optionally filtered by dimension")]
    async fn search_knowledge(
        &self,
        params: Parameters<SearchKnowledgeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        match self
            .ctx
            .engine
            .search_knowledge(&p.query, p.category.as_deref())
        {
            Ok(rules) => json_result(serde_json::json!({
                "count": rules.len(),
                "rules": rules,
            })),
            Err(e) => engine_error(&e),
        }
    }

    // ── Tool 4: list_sources ────────────────────────────────────────

    #[tool(description = "List corpus sources with their scrape status and overall progress")]
    async fn list_sources(
        &self,
        params: Parameters<ListSourcesParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let phase = match p.phase.as_deref().map(str::parse::<Phase>).transpose() {
            Ok(v) => v,
            Err(e) => return validation_error(&e),
        };
        let status = match p
            .status
            .as_deref()
            .map(str::parse::<SourceStatus>)
            .transpose()
        {
            Ok(v) => v,
            Err(e) => return validation_error(&e),
        };

        let db = self.ctx.db.lock().await;
        let mut registry = db
            .export_registry()
            .map_err(|e| McpError::internal_error(format!("registry query failed: {e}"), None))?;
        registry.sources.retain(|s| {
            phase.is_none_or(|p| s.phase == p) && status.is_none_or(|st| s.status == st)
        });

        json_result(serde_json::json!({
            "sources": registry.sources,
            "progress": registry.progress,
        }))
    }
}
