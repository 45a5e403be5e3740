use std::{fmt, path::Path, str::FromStr};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{
    error::{Error, Result},
    ranker::Weights,
};

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Keys accepted by the settings store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    WeightHard,
    WeightSemantic,
    Threshold,
    TopK,
    MaxPrice,
    MinBedrooms,
    PriceTolerance,
    PriceFloor,
    BedroomStep,
    BedroomFloor,
    Model,
    Dataset,
}

impl SettingKey {
    pub const ALL: [SettingKey; 12] = [
        SettingKey::WeightHard,
        SettingKey::WeightSemantic,
        SettingKey::Threshold,
        SettingKey::TopK,
        SettingKey::MaxPrice,
        SettingKey::MinBedrooms,
        SettingKey::PriceTolerance,
        SettingKey::PriceFloor,
        SettingKey::BedroomStep,
        SettingKey::BedroomFloor,
        SettingKey::Model,
        SettingKey::Dataset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::WeightHard => "weight_hard",
            SettingKey::WeightSemantic => "weight_semantic",
            SettingKey::Threshold => "threshold",
            SettingKey::TopK => "top_k",
            SettingKey::MaxPrice => "max_price",
            SettingKey::MinBedrooms => "min_bedrooms",
            SettingKey::PriceTolerance => "price_tolerance",
            SettingKey::PriceFloor => "price_floor",
            SettingKey::BedroomStep => "bedroom_step",
            SettingKey::BedroomFloor => "bedroom_floor",
            SettingKey::Model => "model",
            SettingKey::Dataset => "dataset",
        }
    }

    /// Reject values that would not parse, or that ranking would refuse,
    /// when the setting is used.
    fn check_value(self, value: &str) -> Result<()> {
        let unit = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
        let ok = match self {
            SettingKey::Model | SettingKey::Dataset => !value.trim().is_empty(),
            SettingKey::TopK => value.parse::<u32>().is_ok_and(|k| k > 0),
            SettingKey::MinBedrooms => value.parse::<u32>().is_ok(),
            SettingKey::MaxPrice => value.parse::<f64>().is_ok_and(|p| p.is_finite() && p > 0.0),
            SettingKey::Threshold => value.parse::<f32>().is_ok_and(|t| t.is_finite() && t >= 0.0),
            SettingKey::PriceTolerance => {
                value.parse::<f32>().is_ok_and(|t| t.is_finite() && t > 0.0)
            }
            SettingKey::WeightHard
            | SettingKey::WeightSemantic
            | SettingKey::PriceFloor
            | SettingKey::BedroomStep
            | SettingKey::BedroomFloor => value.parse::<f32>().is_ok_and(unit),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::Config(format!("invalid value for {self}: '{value}'")))
        }
    }

    /// The other half of a weight pair.
    fn counterpart(self) -> Option<SettingKey> {
        match self {
            SettingKey::WeightHard => Some(SettingKey::WeightSemantic),
            SettingKey::WeightSemantic => Some(SettingKey::WeightHard),
            _ => None,
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SettingKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::NotFound {
                kind: "setting",
                name: s.to_string(),
            })
    }
}

/// Persistent defaults for ranking options, stored in `settings.redb`.
pub struct SettingsDb {
    db: Database,
}

impl SettingsDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Store `value` for `key`. A weight is rejected when it does not sum
    /// to 1 with the other stored weight.
    pub fn set(&self, key: SettingKey, value: &str) -> Result<()> {
        key.check_value(value)?;
        if let Some(other) = key.counterpart()
            && let Some(stored) = self.get_parsed::<f32>(other)?
        {
            let this: f32 = value.parse().map_err(|_| {
                Error::Config(format!("invalid value for {key}: '{value}'"))
            })?;
            let (hard, semantic) = if key == SettingKey::WeightHard {
                (this, stored)
            } else {
                (stored, this)
            };
            Weights::new(hard, semantic)?;
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key.as_str(), value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, key: SettingKey) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key.as_str())?.map(|v| v.value().to_string()))
    }

    /// Parse a stored setting; `Ok(None)` when it is not set.
    pub fn get_parsed<T: FromStr>(&self, key: SettingKey) -> Result<Option<T>> {
        match self.get(key)? {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                Error::Config(format!("stored value for {key} is invalid: '{raw}'"))
            }),
        }
    }

    pub fn remove(&self, key: SettingKey) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key.as_str())?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }
}

impl fmt::Debug for SettingsDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsDb").finish_non_exhaustive()
    }
}
