//! Directory domain module: clients, projects, and the configuration that
//! cascades across them.
//!
//! Both resolvers here are pure read-through precedence chains
//! (project → client → organization → system default); storage of the
//! override records is an infrastructure concern.

pub mod rates;
pub mod records;
pub mod vocabulary;

pub use rates::{RateCard, RateResolution, RateSource, resolve_rate};
pub use records::{Client, ClientId, OrganizationSettings, Project, ProjectId};
pub use vocabulary::{
    ResolvedVocabulary, TermResolution, TermSource, VocabularyOverrides, VocabularyTerms,
    default_vocabulary, resolve_vocabulary,
};
