use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A cleaned rental listing as handed over by the listing store.
///
/// `attributes` holds display-only columns (city, bathrooms, ...) that the
/// scorers never inspect but that travel through to the ranked output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub price: f64,
    pub bedrooms: u32,
    pub description: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Listing {
    pub fn new(
        id: impl Into<String>,
        price: f64,
        bedrooms: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            price,
            bedrooms,
            description: description.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach a passthrough attribute.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Check the invariants every listing reaching the scorers must hold.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.id.is_empty() {
            Some("empty id")
        } else if !self.price.is_finite() {
            Some("price is not a finite number")
        } else if self.price < 0.0 {
            Some("price is negative")
        } else if self.description.trim().is_empty() {
            Some("description is empty")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidListing {
                id: self.id.clone(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// A single user query: free text plus the two hard constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub max_price: f64,
    pub min_bedrooms: u32,
}

impl Query {
    pub fn new(text: impl Into<String>, max_price: f64, min_bedrooms: u32) -> Self {
        Self {
            text: text.into(),
            max_price,
            min_bedrooms,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.max_price.is_finite() || self.max_price <= 0.0 {
            return Err(Error::InvalidQuery(format!(
                "max_price must be a positive number, got {}",
                self.max_price
            )));
        }
        Ok(())
    }
}
