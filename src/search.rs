use serde::Serialize;

use crate::{
    embedder::Embedder,
    error::{Error, Result},
    listing::Query,
    ranker::{self, RankConfig, RankedResult, ScoredListing},
    snapshot::ListingSnapshot,
};

/// Maximum characters of a description shown in terminal output.
const PREVIEW_CHARS: usize = 120;

/// Execute the full search pipeline.
///
/// 1. Embed the query text with the snapshot's model
/// 2. Score every listing (hard + semantic) and blend
/// 3. Filter by threshold, sort, apply top-K
pub fn execute_search<'a, E: Embedder + ?Sized>(
    snapshot: &'a ListingSnapshot,
    embedder: &mut E,
    query: &Query,
    config: &RankConfig,
) -> Result<RankedResult<'a>> {
    query.validate()?;
    config.validate()?;

    if embedder.model_version() != snapshot.model_version() {
        return Err(Error::Config(format!(
            "query embedder '{}' does not match snapshot model '{}'",
            embedder.model_version(),
            snapshot.model_version()
        )));
    }

    let query_vector = embedder.embed_query(&query.text)?;
    ranker::rank(snapshot, query, &query_vector, config)
}

/// Serialized shape of a search response.
#[derive(Debug, Serialize)]
pub struct SearchReport<'r, 'a> {
    pub query: &'r str,
    pub total_matches_above_threshold: usize,
    pub result_count: usize,
    pub results: &'r [ScoredListing<'a>],
}

impl<'r, 'a> SearchReport<'r, 'a> {
    pub fn new(query: &'r str, result: &'r RankedResult<'a>) -> Self {
        Self {
            query,
            total_matches_above_threshold: result.total_above_threshold,
            result_count: result.len(),
            results: &result.entries,
        }
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Format results for human-readable terminal output.
pub fn format_human(result: &RankedResult<'_>) -> String {
    if result.is_empty() {
        return "No listings scored at or above the threshold.\n".to_string();
    }

    let mut out = String::new();
    for e in &result.entries {
        let extra: String = ["city", "title"]
            .iter()
            .filter_map(|key| e.listing.attributes.get(*key))
            .map(|v| format!("  {v}"))
            .collect();
        out.push_str(&format!(
            "{:>3}. [{:.3}] #{}  ${:.0}  {} bd{extra}\n",
            e.rank, e.final_score, e.listing.id, e.listing.price, e.listing.bedrooms,
        ));
        out.push_str(&format!(
            "     hard {:.3}  semantic {:.3}\n     {}\n",
            e.hard_score,
            e.semantic_score,
            preview(&e.listing.description)
        ));
    }
    out.push_str(&format!(
        "\n{} of {} listing(s) above threshold\n",
        result.len(),
        result.total_above_threshold
    ));
    out
}

/// Format results as a JSON document.
pub fn format_json(result: &RankedResult<'_>, query: &str) -> Result<String> {
    serde_json::to_string_pretty(&SearchReport::new(query, result))
        .map_err(|e| Error::Config(format!("cannot serialize results: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{embedder::HashEmbedder, listing::Listing};

    fn snapshot(embedder: &mut HashEmbedder) -> ListingSnapshot {
        let listings = vec![
            Listing::new("A", 2000.0, 2, "modern sunny apartment with pool")
                .with_attribute("title", "Sunny two bed"),
            Listing::new("B", 3000.0, 3, "cozy rustic cabin"),
        ];
        ListingSnapshot::build(listings, embedder, None).unwrap()
    }

    fn config(threshold: f32) -> RankConfig {
        RankConfig {
            threshold,
            ..RankConfig::default()
        }
    }

    #[test]
    fn search_ranks_matching_listing_first() {
        let mut embedder = HashEmbedder::default();
        let snapshot = snapshot(&mut embedder);
        let query = Query::new("modern apartment with pool", 2500.0, 2);

        let result = execute_search(&snapshot, &mut embedder, &query, &config(0.5)).unwrap();
        assert_eq!(result.entries[0].listing.id, "A");
    }

    /// Queries and documents land on orthogonal axes.
    struct SidedEmbedder;

    impl Embedder for SidedEmbedder {
        fn model_version(&self) -> &str {
            "sided"
        }

        fn embed_query(&mut self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn embed_documents(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
        }
    }

    #[test]
    fn query_and_descriptions_use_their_own_side() {
        let mut embedder = SidedEmbedder;
        let listings = vec![Listing::new("A", 1000.0, 2, "same text")];
        let snapshot = ListingSnapshot::build(listings, &mut embedder, None).unwrap();
        let query = Query::new("same text", 2500.0, 2);

        let result = execute_search(&snapshot, &mut embedder, &query, &config(0.0)).unwrap();
        assert!((result.entries[0].semantic_score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn model_mismatch_is_rejected() {
        let snapshot = snapshot(&mut HashEmbedder::default());
        let query = Query::new("pool", 2500.0, 2);
        let err = execute_search(&snapshot, &mut HashEmbedder::new(16), &query, &config(0.0))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn invalid_query_is_rejected_before_embedding() {
        let mut embedder = HashEmbedder::default();
        let snapshot = snapshot(&mut embedder);
        let query = Query::new("pool", -5.0, 2);
        let err = execute_search(&snapshot, &mut embedder, &query, &config(0.0)).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn human_output_lists_entries() {
        let mut embedder = HashEmbedder::default();
        let snapshot = snapshot(&mut embedder);
        let query = Query::new("apartment pool", 2500.0, 2);
        let result = execute_search(&snapshot, &mut embedder, &query, &config(0.0)).unwrap();

        let text = format_human(&result);
        assert!(text.contains("#A"));
        assert!(text.contains("Sunny two bed"));
        assert!(text.contains("2 of 2 listing(s) above threshold"));
    }

    #[test]
    fn human_output_for_empty_result() {
        let mut embedder = HashEmbedder::default();
        let snapshot = snapshot(&mut embedder);
        let query = Query::new("apartment", 2500.0, 2);
        let result = execute_search(&snapshot, &mut embedder, &query, &config(1.01)).unwrap();
        assert!(format_human(&result).starts_with("No listings scored"));
    }

    #[test]
    fn json_output_shape() {
        let mut embedder = HashEmbedder::default();
        let snapshot = snapshot(&mut embedder);
        let query = Query::new("apartment pool", 2500.0, 2);
        let cfg = RankConfig {
            top_k: Some(1),
            ..config(0.0)
        };
        let result = execute_search(&snapshot, &mut embedder, &query, &cfg).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&format_json(&result, &query.text).unwrap()).unwrap();
        assert_eq!(json["query"], "apartment pool");
        assert_eq!(json["total_matches_above_threshold"], 2);
        assert_eq!(json["result_count"], 1);
        let first = &json["results"][0];
        assert_eq!(first["rank"], 1);
        assert_eq!(first["id"], "A");
        assert!(first["final_score"].is_number());
        assert!(first["hard_score"].is_number());
        assert_eq!(first["attributes"]["title"], "Sunny two bed");
    }

    #[test]
    fn preview_truncates_long_descriptions() {
        let long = "x".repeat(PREVIEW_CHARS + 10);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
