//! Unit-cost selection policy.
//!
//! CWICR rows can carry a direct resource cost as well as median and mean
//! market estimates. Which one becomes a row's unit cost is a business rule,
//! so it lives behind [`PricePolicy`] instead of inside the row mapping.

use serde::{Deserialize, Serialize};

/// Candidate prices read from one source record.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceCandidates {
    pub resource_cost: Option<f64>,
    pub median_estimate: Option<f64>,
    pub mean_estimate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    ResourceCost,
    MedianEstimate,
    MeanEstimate,
}

impl PriceCandidates {
    pub fn get(&self, source: PriceSource) -> Option<f64> {
        let value = match source {
            PriceSource::ResourceCost => self.resource_cost,
            PriceSource::MedianEstimate => self.median_estimate,
            PriceSource::MeanEstimate => self.mean_estimate,
        };
        value.filter(|v| v.is_finite())
    }
}

pub trait PricePolicy: Send + Sync {
    fn unit_cost(&self, candidates: &PriceCandidates) -> Option<f64>;
}

/// First available source in `order`, else `default`.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackChain {
    pub order: Vec<PriceSource>,
    pub default: Option<f64>,
}

impl Default for FallbackChain {
    fn default() -> Self {
        Self {
            order: vec![
                PriceSource::ResourceCost,
                PriceSource::MedianEstimate,
                PriceSource::MeanEstimate,
            ],
            default: Some(0.0),
        }
    }
}

impl PricePolicy for FallbackChain {
    fn unit_cost(&self, candidates: &PriceCandidates) -> Option<f64> {
        self.order
            .iter()
            .find_map(|source| candidates.get(*source))
            .or(self.default)
    }
}

impl<F> PricePolicy for F
where
    F: Fn(&PriceCandidates) -> Option<f64> + Send + Sync,
{
    fn unit_cost(&self, candidates: &PriceCandidates) -> Option<f64> {
        self(candidates)
    }
}
