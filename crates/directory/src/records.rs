//! Client and project records carrying the per-level configuration the
//! precedence resolvers read from.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scdp_core::{DomainError, Money};

use crate::rates::RateCard;
use crate::vocabulary::VocabularyOverrides;

/// Identifier of a client.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(Uuid);

/// Identifier of a project (always belongs to a client).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(Uuid);

macro_rules! impl_uuid_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(ClientId, "ClientId");
impl_uuid_newtype!(ProjectId, "ProjectId");

/// Organization-wide defaults (the third level of the cascade).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    pub vocabulary: VocabularyOverrides,
    pub rates: RateCard,
    /// Fallback rate when no card in the chain knows the role.
    pub default_rate: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: ClientId,
    pub name: String,
    pub vocabulary: VocabularyOverrides,
    pub rates: RateCard,
}

impl Client {
    pub fn new(client_id: ClientId, name: impl Into<String>) -> Self {
        Self {
            client_id,
            name: name.into(),
            vocabulary: VocabularyOverrides::default(),
            rates: RateCard::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: ProjectId,
    pub client_id: ClientId,
    pub name: String,
    pub vocabulary: VocabularyOverrides,
    pub rates: RateCard,
}

impl Project {
    pub fn new(project_id: ProjectId, client_id: ClientId, name: impl Into<String>) -> Self {
        Self {
            project_id,
            client_id,
            name: name.into(),
            vocabulary: VocabularyOverrides::default(),
            rates: RateCard::default(),
        }
    }
}
