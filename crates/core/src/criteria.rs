use serde::{Deserialize, Serialize};

use crate::models::{AiAnalysis, Package};

/// Upper bound on packages returned for one planning turn.
pub const MATCH_LIMIT: usize = 5;

/// Marker the AI flow puts in `missing_info` when it cannot supply matchable criteria.
pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceRange {
    Below(f64),
    /// Inclusive on both ends.
    Between(f64, f64),
    Above(f64),
}

impl PriceRange {
    pub fn contains(self, price: f64) -> bool {
        match self {
            Self::Below(limit) => price < limit,
            Self::Between(low, high) => price >= low && price <= high,
            Self::Above(limit) => price > limit,
        }
    }
}

/// Predicates applied to the catalog for a planning turn.
///
/// Location and price combine with AND; tags match when any one of them is present on
/// the package. An empty criteria set matches every package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchCriteria {
    pub location: Option<String>,
    pub price: Option<PriceRange>,
    pub tags: Vec<String>,
}

impl MatchCriteria {
    /// Returns `None` when the analysis says the catalog must not be queried.
    pub fn from_analysis(analysis: &AiAnalysis) -> Option<Self> {
        if analysis
            .missing_info
            .iter()
            .any(|item| item.trim() == SERVICE_UNAVAILABLE)
        {
            return None;
        }

        let location = analysis
            .location
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("any"))
            .map(ToString::to_string);

        let tags = analysis
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(ToString::to_string)
            .collect();

        Some(Self {
            location,
            price: analysis.budget.map(|tier| tier.price_range()),
            tags,
        })
    }

    pub fn is_unconstrained(&self) -> bool {
        self.location.is_none() && self.price.is_none() && self.tags.is_empty()
    }
}

impl Package {
    pub fn matches(&self, criteria: &MatchCriteria) -> bool {
        if let Some(location) = criteria.location.as_deref() {
            let needle = location.to_lowercase();
            let covered = self
                .location_coverage
                .as_deref()
                .map(|coverage| coverage.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !covered {
                return false;
            }
        }

        if let Some(range) = criteria.price {
            if !range.contains(self.price) {
                return false;
            }
        }

        criteria.tags.is_empty() || criteria.tags.iter().any(|tag| self.tags.contains(tag))
    }
}
