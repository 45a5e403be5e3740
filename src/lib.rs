//! rentrank - a hybrid ranker for rental listings.
//!
//! Every listing gets two scores against a query: a hard score for how well
//! it meets the price and bedroom constraints, and a semantic score for how
//! close its description is to the query text in embedding space. The two
//! are blended with weights summing to one, thresholded, and sorted.
//!
//! # Quick start
//!
//! ```no_run
//! use rentrank::{HashEmbedder, ListingSnapshot, Query, RankConfig};
//! use rentrank::dataset::{self, DatasetOptions};
//!
//! let listings = dataset::load_listings(
//!     std::path::Path::new("apartments.csv"),
//!     &DatasetOptions::default(),
//! )
//! .unwrap();
//! let mut embedder = HashEmbedder::default();
//! let snapshot = ListingSnapshot::build(listings, &mut embedder, None).unwrap();
//!
//! let query = Query::new("quiet apartment near a park", 2500.0, 2);
//! let result =
//!     rentrank::search::execute_search(&snapshot, &mut embedder, &query, &RankConfig::default())
//!         .unwrap();
//! for e in &result.entries {
//!     println!("{} {} (score: {:.3})", e.rank, e.listing.id, e.final_score);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod data_dir;
pub mod dataset;
pub mod embedder;
pub mod embedding_cache;
pub mod error;
pub mod hard_filter;
pub mod listing;
pub mod mcp;
pub mod model_manager;
pub mod ranker;
pub mod search;
pub mod settings;
pub mod similarity;
pub mod snapshot;

pub use data_dir::DataDir;
pub use embedder::{Embedder, HashEmbedder};
pub use embedding_cache::EmbeddingCache;
pub use error::{Error, Result};
pub use hard_filter::HardFilterPolicy;
pub use listing::{Listing, Query};
pub use model_manager::ColbertEmbedder;
pub use ranker::{RankConfig, RankedResult, ScoredListing, Weights};
pub use settings::{SettingKey, SettingsDb};
pub use snapshot::{ListingSnapshot, SharedSnapshot};
