use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use rmcp::{
    ServerHandler,
    ServiceExt,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult,
        Content,
        Implementation,
        ServerCapabilities,
        ServerInfo,
    },
    tool,
    tool_handler,
    tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    config::{self, RankOverrides},
    dataset::{self, DatasetOptions},
    embedder::Embedder,
    embedding_cache::EmbeddingCache,
    error::{self, Error},
    ranker::ScoredListing,
    search,
    settings::SettingsDb,
    snapshot::{ListingSnapshot, SharedSnapshot},
};

/// Everything the MCP tools share across requests.
pub struct ServerState {
    pub snapshot: SharedSnapshot,
    pub embedder: Mutex<Box<dyn Embedder + Send>>,
    pub cache: Option<EmbeddingCache>,
    pub settings: Option<SettingsDb>,
    /// Source for `rentrank_reload`.
    pub dataset: Option<PathBuf>,
}

#[derive(Clone)]
pub struct RentrankMcpServer {
    state: Arc<ServerState>,
    tool_router: ToolRouter<Self>,
}

impl RentrankMcpServer {
    pub fn new(state: ServerState) -> Self {
        Self {
            state: Arc::new(state),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router(router = tool_router)]
impl RentrankMcpServer {
    /// Rank the loaded listings against a query and its constraints.
    #[tool(
        name = "rentrank_search",
        description = "Rank rental listings by price and bedroom constraints blended with semantic similarity of the description to the query."
    )]
    pub async fn rentrank_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, rmcp::ErrorData> {
        let params = params.0;
        let overrides = RankOverrides {
            max_price: params.max_price,
            min_bedrooms: params.min_bedrooms,
            weight_hard: params.weight_hard,
            weight_semantic: None,
            threshold: params.threshold,
            top_k: params.limit,
            all: false,
            binary_filter: false,
        };
        let settings = self.state.settings.as_ref();
        let query = config::resolve_query(&params.query, &overrides, settings)
            .map_err(|e| tool_error("invalid query", e))?;
        let rank_config = config::resolve_rank_config(&overrides, settings)
            .map_err(|e| tool_error("invalid ranking options", e))?;

        let snapshot = self.state.snapshot.current();
        let mut embedder = self.state.embedder.lock().map_err(|_| {
            rmcp::ErrorData::internal_error("embedder lock poisoned", None)
        })?;

        let ranked =
            search::execute_search(&snapshot, &mut *embedder, &query, &rank_config)
                .map_err(|e| tool_error("search failed", e))?;
        drop(embedder);

        let response = SearchResponse {
            query_received: params.query,
            total_matches_above_threshold: ranked.total_above_threshold,
            result_count: ranked.len(),
            results: ranked.entries.iter().map(SearchResultItem::from).collect(),
        };

        let summary = format_search_summary(&response);
        let structured = serde_json::to_value(&response)
            .map_err(|e| internal("failed to serialize search results", e))?;

        Ok(CallToolResult {
            content: vec![Content::text(summary)],
            structured_content: Some(structured),
            is_error: Some(false),
            meta: None,
        })
    }

    /// Re-read the dataset and atomically swap in a new snapshot.
    #[tool(
        name = "rentrank_reload",
        description = "Reload listings from the dataset file and rebuild embeddings. In-flight searches finish against the previous listings."
    )]
    pub async fn rentrank_reload(&self) -> Result<CallToolResult, rmcp::ErrorData> {
        let path = self.state.dataset.clone().ok_or_else(|| {
            rmcp::ErrorData::internal_error("server was started without a dataset", None)
        })?;

        let listings = dataset::load_listings(&path, &DatasetOptions::default())
            .map_err(|e| tool_error("failed to load dataset", e))?;

        let snapshot = {
            let mut embedder = self.state.embedder.lock().map_err(|_| {
                rmcp::ErrorData::internal_error("embedder lock poisoned", None)
            })?;
            ListingSnapshot::build(listings, &mut *embedder, self.state.cache.as_ref())
                .map_err(|e| tool_error("failed to build listing snapshot", e))?
        };

        let count = snapshot.len();
        let model = snapshot.model_version().to_string();
        self.state.snapshot.publish(snapshot);
        match self.state.cache.as_ref().map(EmbeddingCache::len).transpose() {
            Ok(cached) => info!(listings = count, model = %model, ?cached, "published new snapshot"),
            Err(e) => warn!(error = %e, "cannot read embedding cache size"),
        }

        Ok(CallToolResult {
            content: vec![Content::text(format!(
                "Loaded {count} listing(s) from {}",
                path.display()
            ))],
            structured_content: Some(json!({
                "listingCount": count,
                "modelVersion": model,
            })),
            is_error: Some(false),
            meta: None,
        })
    }
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for RentrankMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "rentrank".to_string(),
                title: Some("rentrank MCP".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Use rentrank_search with a free-text description of the wanted home plus maxPrice and minBedrooms. Lower the threshold if nothing comes back."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    /// Free-text description of the wanted listing.
    pub query: String,
    /// Maximum monthly price.
    pub max_price: Option<f64>,
    /// Minimum number of bedrooms.
    pub min_bedrooms: Option<u32>,
    /// Minimum final score (default: 0.7).
    pub threshold: Option<f32>,
    /// Weight of the hard-constraint score; the semantic weight is the rest.
    pub weight_hard: Option<f32>,
    /// Maximum number of results (default: 10).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    query_received: String,
    total_matches_above_threshold: usize,
    result_count: usize,
    results: Vec<SearchResultItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultItem {
    rank: usize,
    id: String,
    price: f64,
    bedrooms: u32,
    description: String,
    attributes: BTreeMap<String, String>,
    hard_score: f32,
    semantic_score: f32,
    final_score: f32,
}

impl From<&ScoredListing<'_>> for SearchResultItem {
    fn from(entry: &ScoredListing<'_>) -> Self {
        Self {
            rank: entry.rank,
            id: entry.listing.id.clone(),
            price: entry.listing.price,
            bedrooms: entry.listing.bedrooms,
            description: entry.listing.description.clone(),
            attributes: entry.listing.attributes.clone(),
            hard_score: entry.hard_score,
            semantic_score: entry.semantic_score,
            final_score: entry.final_score,
        }
    }
}

fn format_search_summary(response: &SearchResponse) -> String {
    let query = &response.query_received;
    if response.results.is_empty() {
        return format!("No listings above the threshold for \"{query}\"");
    }

    let mut lines = Vec::with_capacity(response.results.len() + 1);
    lines.push(format!(
        "Showing {} of {} listing(s) for \"{query}\":",
        response.result_count, response.total_matches_above_threshold
    ));

    for item in &response.results {
        lines.push(format!(
            "#{} {:.3} ${:.0} {}bd",
            item.id, item.final_score, item.price, item.bedrooms
        ));
    }

    lines.join("\n")
}

/// Caller mistakes become invalid-params errors; everything else is internal.
fn tool_error(message: &str, error: Error) -> rmcp::ErrorData {
    if error.is_contract_violation() {
        rmcp::ErrorData::invalid_params(format!("{message}: {error}"), None)
    } else {
        internal(message, error)
    }
}

fn internal(message: &str, error: impl std::fmt::Display) -> rmcp::ErrorData {
    rmcp::ErrorData::internal_error(
        message.to_string(),
        Some(json!({ "error": error.to_string() })),
    )
}

pub fn run_mcp(state: ServerState) -> error::Result<()> {
    let server = RentrankMcpServer::new(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            Error::Config(format!("failed to start tokio runtime: {e}"))
        })?;

    runtime.block_on(async move {
        let transport = rmcp::transport::stdio();
        let running = server.serve(transport).await.map_err(|e| {
            Error::Config(format!("MCP server initialization failed: {e}"))
        })?;
        running.waiting().await.map_err(|e| {
            Error::Config(format!("MCP server error: {e}"))
        })?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{embedder::HashEmbedder, listing::Listing};

    fn server(dataset: Option<PathBuf>) -> RentrankMcpServer {
        let mut embedder = HashEmbedder::default();
        let listings = vec![
            Listing::new("A", 2000.0, 2, "modern sunny apartment with pool"),
            Listing::new("B", 3000.0, 3, "cozy rustic cabin"),
        ];
        let snapshot = ListingSnapshot::build(listings, &mut embedder, None).unwrap();
        RentrankMcpServer::new(ServerState {
            snapshot: SharedSnapshot::new(snapshot),
            embedder: Mutex::new(Box::new(embedder)),
            cache: Some(EmbeddingCache::in_memory().unwrap()),
            settings: None,
            dataset,
        })
    }

    fn params(query: &str) -> SearchParams {
        SearchParams {
            query: query.to_string(),
            max_price: Some(2500.0),
            min_bedrooms: Some(2),
            threshold: Some(0.5),
            weight_hard: None,
            limit: None,
        }
    }

    #[tokio::test]
    async fn search_tool_returns_structured_results() {
        let server = server(None);
        let result = server
            .rentrank_search(Parameters(params("modern apartment with pool")))
            .await
            .unwrap();

        let structured = result.structured_content.expect("structured");
        assert_eq!(
            structured.get("queryReceived").and_then(|v| v.as_str()),
            Some("modern apartment with pool")
        );
        let results = structured
            .get("results")
            .and_then(|v| v.as_array())
            .expect("results array");
        assert!(!results.is_empty());
        assert_eq!(results[0].get("id").and_then(|v| v.as_str()), Some("A"));
        assert_eq!(results[0].get("hardScore").and_then(|v| v.as_f64()), Some(1.0));

        let summary = result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap_or_default();
        assert!(summary.contains("#A"));
    }

    #[tokio::test]
    async fn unreachable_threshold_is_empty_not_an_error() {
        let server = server(None);
        let mut p = params("apartment");
        p.threshold = Some(1.01);
        let result = server.rentrank_search(Parameters(p)).await.unwrap();
        let structured = result.structured_content.expect("structured");
        assert_eq!(structured["totalMatchesAboveThreshold"], 0);
        assert_eq!(structured["results"].as_array().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn bad_parameters_are_invalid_params() {
        let server = server(None);
        let mut p = params("apartment");
        p.max_price = Some(-1.0);
        let err = server.rentrank_search(Parameters(p)).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);

        let mut p = params("apartment");
        p.weight_hard = Some(1.5);
        let err = server.rentrank_search(Parameters(p)).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);

        let mut p = params("apartment");
        p.limit = Some(0);
        let err = server.rentrank_search(Parameters(p)).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn reload_swaps_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("listings.csv");
        std::fs::write(
            &path,
            "id;body;bedrooms;price\n1;garden loft;2;1200\n2;city studio;1;900\n3;farm house;4;2100\n",
        )
        .unwrap();

        let server = server(Some(path));
        let before = server.state.snapshot.current();
        let result = server.rentrank_reload().await.unwrap();

        assert_eq!(result.structured_content.unwrap()["listingCount"], 3);
        assert_eq!(before.len(), 2);
        assert_eq!(server.state.snapshot.current().len(), 3);
    }

    #[tokio::test]
    async fn reload_without_dataset_fails() {
        let err = server(None).rentrank_reload().await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn missing_dataset_file_is_an_internal_error() {
        let tmp = tempfile::tempdir().unwrap();
        let server = server(Some(tmp.path().join("gone.csv")));
        let err = server.rentrank_reload().await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
        assert_eq!(server.state.snapshot.current().len(), 2);
    }
}
