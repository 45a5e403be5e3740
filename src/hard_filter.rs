//! Graded eligibility score from the price and bedroom constraints.
//!
//! A listing that meets both constraints always scores exactly `1.0`.
//! Violations reduce the score through two independent components, each in
//! `[0, 1]`, which are blended by [`HardFilterPolicy::price_share`]:
//!
//! ```text
//! hard = price_share * price_component + (1 - price_share) * bedroom_component
//! ```
//!
//! Both components are monotonically non-increasing in the size of the
//! violation, so a listing further over budget (or with more missing
//! bedrooms) never outscores a closer one.

use crate::{
    error::{Error, Result},
    listing::{Listing, Query},
};

/// How exceeding `max_price` is penalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PricePenalty {
    /// Any overage drops the price component to 0.
    Binary,
    /// Linear in the overage measured as a fraction of `max_price`.
    ///
    /// The component reaches `floor` once the overage equals `tolerance`
    /// (e.g. `tolerance = 0.5` means 50% over budget) and stays there.
    Proportional { tolerance: f32, floor: f32 },
}

/// How a bedroom deficit is penalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BedroomPenalty {
    /// Any deficit drops the bedroom component to 0.
    Binary,
    /// Any deficit costs the same fixed `penalty`, regardless of size.
    Flat { penalty: f32 },
    /// Each missing bedroom costs `step`, saturating at `floor`.
    PerBedroom { step: f32, floor: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HardFilterPolicy {
    pub price: PricePenalty,
    pub bedrooms: BedroomPenalty,
    /// Share of the hard score carried by the price component.
    pub price_share: f32,
}

impl Default for HardFilterPolicy {
    fn default() -> Self {
        Self {
            price: PricePenalty::Proportional {
                tolerance: 0.5,
                floor: 0.0,
            },
            bedrooms: BedroomPenalty::PerBedroom {
                step: 0.5,
                floor: 0.0,
            },
            price_share: 0.5,
        }
    }
}

fn unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidPolicy(format!(
            "{name} must be within 0..=1, got {value}"
        )))
    }
}

impl HardFilterPolicy {
    /// Each constraint is a plain 0/1 match and the two are averaged.
    pub fn binary() -> Self {
        Self {
            price: PricePenalty::Binary,
            bedrooms: BedroomPenalty::Binary,
            price_share: 0.5,
        }
    }

    pub fn validate(&self) -> Result<()> {
        unit("price_share", self.price_share)?;

        if let PricePenalty::Proportional { tolerance, floor } = self.price {
            if !(tolerance.is_finite() && tolerance > 0.0) {
                return Err(Error::InvalidPolicy(format!(
                    "price tolerance must be positive, got {tolerance}"
                )));
            }
            unit("price floor", floor)?;
        }

        match self.bedrooms {
            BedroomPenalty::Binary => {}
            BedroomPenalty::Flat { penalty } => unit("bedroom penalty", penalty)?,
            BedroomPenalty::PerBedroom { step, floor } => {
                unit("bedroom step", step)?;
                unit("bedroom floor", floor)?;
            }
        }

        Ok(())
    }

    /// Price component for a listing priced at `price` against `max_price`.
    pub fn price_component(&self, price: f64, max_price: f64) -> f32 {
        if price <= max_price {
            return 1.0;
        }
        match self.price {
            PricePenalty::Binary => 0.0,
            PricePenalty::Proportional { tolerance, floor } => {
                let overage = ((price - max_price) / max_price) as f32;
                (1.0 - overage / tolerance).max(floor)
            }
        }
    }

    /// Bedroom component for `bedrooms` against `min_bedrooms`.
    pub fn bedroom_component(&self, bedrooms: u32, min_bedrooms: u32) -> f32 {
        let deficit = min_bedrooms.saturating_sub(bedrooms);
        if deficit == 0 {
            return 1.0;
        }
        match self.bedrooms {
            BedroomPenalty::Binary => 0.0,
            BedroomPenalty::Flat { penalty } => 1.0 - penalty,
            BedroomPenalty::PerBedroom { step, floor } => {
                (1.0 - deficit as f32 * step).max(floor)
            }
        }
    }

    /// Hard score of one listing against the query constraints.
    ///
    /// Fails on a malformed listing or query instead of coercing it.
    pub fn score(&self, listing: &Listing, query: &Query) -> Result<f32> {
        listing.validate()?;
        query.validate()?;
        Ok(self.score_unchecked(listing, query))
    }

    /// Hard score for inputs that were already validated (snapshot listings
    /// and a checked query).
    pub(crate) fn score_unchecked(&self, listing: &Listing, query: &Query) -> f32 {
        let price = self.price_component(listing.price, query.max_price);
        let beds = self.bedroom_component(listing.bedrooms, query.min_bedrooms);
        (self.price_share * price + (1.0 - self.price_share) * beds)
            .clamp(0.0, 1.0)
    }
}
