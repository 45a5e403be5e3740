//! Resolution of ranking options.
//!
//! Every option is taken from, in order of priority:
//! 1. An explicit override (CLI flag or MCP parameter)
//! 2. The value stored in the settings database
//! 3. The built-in default

use std::path::PathBuf;

use crate::{
    error::{Error, Result},
    hard_filter::{BedroomPenalty, HardFilterPolicy, PricePenalty},
    listing::Query,
    model_manager::{DEFAULT_MODEL_ID, MODEL_ENV_VAR},
    ranker::{RankConfig, Weights},
    settings::{SettingKey, SettingsDb},
};

pub const DEFAULT_MAX_PRICE: f64 = 3000.0;
pub const DEFAULT_MIN_BEDROOMS: u32 = 2;
pub const DEFAULT_THRESHOLD: f32 = 0.7;
pub const DEFAULT_TOP_K: usize = 10;

/// Per-request overrides; `None` defers to settings and defaults.
#[derive(Debug, Clone, Default)]
pub struct RankOverrides {
    pub max_price: Option<f64>,
    pub min_bedrooms: Option<u32>,
    pub weight_hard: Option<f32>,
    pub weight_semantic: Option<f32>,
    pub threshold: Option<f32>,
    pub top_k: Option<usize>,
    /// Return every listing above the threshold (no top-K cap).
    pub all: bool,
    /// Use 0/1 constraint matches instead of graded penalties.
    pub binary_filter: bool,
}

fn stored<T: std::str::FromStr>(
    settings: Option<&SettingsDb>,
    key: SettingKey,
) -> Result<Option<T>> {
    match settings {
        Some(db) => db.get_parsed(key),
        None => Ok(None),
    }
}

fn pick<T: std::str::FromStr>(
    explicit: Option<T>,
    settings: Option<&SettingsDb>,
    key: SettingKey,
    default: T,
) -> Result<T> {
    match explicit {
        Some(v) => Ok(v),
        None => Ok(stored(settings, key)?.unwrap_or(default)),
    }
}

fn weights_from(hard: Option<f32>, semantic: Option<f32>) -> Option<Result<Weights>> {
    match (hard, semantic) {
        (Some(h), Some(s)) => Some(Weights::new(h, s)),
        (Some(h), None) => Some(Weights::from_hard(h)),
        (None, Some(s)) => Some(Weights::new(1.0 - s, s)),
        (None, None) => None,
    }
}

pub fn resolve_query(
    text: &str,
    overrides: &RankOverrides,
    settings: Option<&SettingsDb>,
) -> Result<Query> {
    let query = Query::new(
        text,
        pick(overrides.max_price, settings, SettingKey::MaxPrice, DEFAULT_MAX_PRICE)?,
        pick(
            overrides.min_bedrooms,
            settings,
            SettingKey::MinBedrooms,
            DEFAULT_MIN_BEDROOMS,
        )?,
    );
    query.validate()?;
    Ok(query)
}

pub fn resolve_policy(
    overrides: &RankOverrides,
    settings: Option<&SettingsDb>,
) -> Result<HardFilterPolicy> {
    if overrides.binary_filter {
        return Ok(HardFilterPolicy::binary());
    }

    let mut policy = HardFilterPolicy::default();
    if let PricePenalty::Proportional { tolerance, floor } = policy.price {
        policy.price = PricePenalty::Proportional {
            tolerance: pick(None, settings, SettingKey::PriceTolerance, tolerance)?,
            floor: pick(None, settings, SettingKey::PriceFloor, floor)?,
        };
    }
    if let BedroomPenalty::PerBedroom { step, floor } = policy.bedrooms {
        policy.bedrooms = BedroomPenalty::PerBedroom {
            step: pick(None, settings, SettingKey::BedroomStep, step)?,
            floor: pick(None, settings, SettingKey::BedroomFloor, floor)?,
        };
    }
    policy.validate()?;
    Ok(policy)
}

pub fn resolve_rank_config(
    overrides: &RankOverrides,
    settings: Option<&SettingsDb>,
) -> Result<RankConfig> {
    let weights = match weights_from(overrides.weight_hard, overrides.weight_semantic) {
        Some(weights) => weights?,
        None => weights_from(
            stored(settings, SettingKey::WeightHard)?,
            stored(settings, SettingKey::WeightSemantic)?,
        )
        .unwrap_or(Ok(Weights::default()))?,
    };

    let top_k = if overrides.all {
        None
    } else {
        Some(pick(overrides.top_k, settings, SettingKey::TopK, DEFAULT_TOP_K)?)
    };

    let config = RankConfig {
        policy: resolve_policy(overrides, settings)?,
        weights,
        threshold: pick(
            overrides.threshold,
            settings,
            SettingKey::Threshold,
            DEFAULT_THRESHOLD,
        )?,
        top_k,
    };
    config.validate()?;
    Ok(config)
}

/// Embedding model: flag, then `RENTRANK_MODEL`, then settings, then default.
pub fn resolve_model(explicit: Option<&str>, settings: Option<&SettingsDb>) -> Result<String> {
    if let Some(model) = explicit {
        return Ok(model.to_string());
    }
    if let Ok(model) = std::env::var(MODEL_ENV_VAR) {
        return Ok(model);
    }
    Ok(stored(settings, SettingKey::Model)?.unwrap_or_else(|| DEFAULT_MODEL_ID.to_string()))
}

pub fn resolve_dataset(
    explicit: Option<PathBuf>,
    settings: Option<&SettingsDb>,
) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path),
        None => stored::<PathBuf>(settings, SettingKey::Dataset)?.ok_or_else(|| {
            Error::Config(
                "no dataset given: pass --dataset or run `rentrank settings set dataset <path>`"
                    .into(),
            )
        }),
    }
}
