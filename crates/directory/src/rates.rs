//! Billing-rate resolution.
//!
//! Rate cards map a role name to an hourly rate. Lookup follows the same
//! precedence chain as vocabulary: project card → client card → organization
//! card → system default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use scdp_core::Money;

/// Role → hourly rate, at one level of the cascade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCard {
    pub rates: BTreeMap<String, Money>,
}

impl RateCard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, role: impl Into<String>, rate: Money) -> Self {
        self.rates.insert(role.into(), rate);
        self
    }

    pub fn rate_for(&self, role: &str) -> Option<Money> {
        self.rates.get(role).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Which level of the cascade supplied a resolved rate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Project,
    Client,
    Organization,
    SystemDefault,
}

/// A resolved rate together with its provenance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateResolution {
    pub rate: Money,
    pub source: RateSource,
}

/// Resolve the rate for `role` through project → client → organization →
/// system default. `None` when no level knows the role.
pub fn resolve_rate(
    role: &str,
    project: Option<&RateCard>,
    client: Option<&RateCard>,
    organization: Option<&RateCard>,
    system_default: Option<Money>,
) -> Option<RateResolution> {
    let levels = [
        (project, RateSource::Project),
        (client, RateSource::Client),
        (organization, RateSource::Organization),
    ];
    for (card, source) in levels {
        if let Some(rate) = card.and_then(|c| c.rate_for(role)) {
            return Some(RateResolution { rate, source });
        }
    }
    system_default.map(|rate| RateResolution {
        rate,
        source: RateSource::SystemDefault,
    })
}
