//! Customizable delivery vocabulary.
//!
//! Organizations relabel the five delivery term slots ("Epic" might be
//! "Initiative" for one client, "Theme" for one project). Each slot resolves
//! independently through the precedence chain, so a project overriding only
//! `epic` still inherits `stage` from its client or organization.

use serde::{Deserialize, Serialize};

/// Fully-resolved terms for the five vocabulary slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyTerms {
    pub epic: String,
    pub stage: String,
    pub activity: String,
    pub workstream: String,
    pub milestone: String,
}

/// Partial overrides at one level of the chain. `None` falls through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyOverrides {
    pub epic: Option<String>,
    pub stage: Option<String>,
    pub activity: Option<String>,
    pub workstream: Option<String>,
    pub milestone: Option<String>,
}

impl VocabularyOverrides {
    pub fn is_empty(&self) -> bool {
        self.epic.is_none()
            && self.stage.is_none()
            && self.activity.is_none()
            && self.workstream.is_none()
            && self.milestone.is_none()
    }
}

/// Which level of the chain supplied a resolved term.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermSource {
    Project,
    Client,
    Organization,
    SystemDefault,
}

/// A resolved term together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermResolution {
    pub term: String,
    pub source: TermSource,
}

/// All five slots resolved, with per-slot provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVocabulary {
    pub epic: TermResolution,
    pub stage: TermResolution,
    pub activity: TermResolution,
    pub workstream: TermResolution,
    pub milestone: TermResolution,
}

impl ResolvedVocabulary {
    pub fn terms(&self) -> VocabularyTerms {
        VocabularyTerms {
            epic: self.epic.term.clone(),
            stage: self.stage.term.clone(),
            activity: self.activity.term.clone(),
            workstream: self.workstream.term.clone(),
            milestone: self.milestone.term.clone(),
        }
    }
}

/// System-default terms, the end of every precedence chain.
pub fn default_vocabulary() -> VocabularyTerms {
    VocabularyTerms {
        epic: "Epic".to_string(),
        stage: "Stage".to_string(),
        activity: "Activity".to_string(),
        workstream: "Workstream".to_string(),
        milestone: "Milestone".to_string(),
    }
}

/// Resolve all five slots through project → client → organization → default.
///
/// Pure read-through chain; no caching.
pub fn resolve_vocabulary(
    project: Option<&VocabularyOverrides>,
    client: Option<&VocabularyOverrides>,
    organization: Option<&VocabularyOverrides>,
) -> ResolvedVocabulary {
    let defaults = default_vocabulary();
    ResolvedVocabulary {
        epic: resolve_slot(project, client, organization, |o| &o.epic, defaults.epic),
        stage: resolve_slot(project, client, organization, |o| &o.stage, defaults.stage),
        activity: resolve_slot(
            project,
            client,
            organization,
            |o| &o.activity,
            defaults.activity,
        ),
        workstream: resolve_slot(
            project,
            client,
            organization,
            |o| &o.workstream,
            defaults.workstream,
        ),
        milestone: resolve_slot(
            project,
            client,
            organization,
            |o| &o.milestone,
            defaults.milestone,
        ),
    }
}

fn resolve_slot(
    project: Option<&VocabularyOverrides>,
    client: Option<&VocabularyOverrides>,
    organization: Option<&VocabularyOverrides>,
    slot: impl Fn(&VocabularyOverrides) -> &Option<String>,
    default: String,
) -> TermResolution {
    let levels = [
        (project, TermSource::Project),
        (client, TermSource::Client),
        (organization, TermSource::Organization),
    ];
    for (overrides, source) in levels {
        if let Some(term) = overrides.and_then(|o| slot(o).as_deref()) {
            return TermResolution {
                term: term.to_string(),
                source,
            };
        }
    }
    TermResolution {
        term: default,
        source: TermSource::SystemDefault,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(epic: Option<&str>, stage: Option<&str>) -> VocabularyOverrides {
        VocabularyOverrides {
            epic: epic.map(str::to_string),
            stage: stage.map(str::to_string),
            ..VocabularyOverrides::default()
        }
    }

    #[test]
    fn falls_through_to_system_defaults() {
        let resolved = resolve_vocabulary(None, None, None);
        assert_eq!(resolved.epic.term, "Epic");
        assert_eq!(resolved.epic.source, TermSource::SystemDefault);
        assert_eq!(resolved.milestone.term, "Milestone");
    }

    #[test]
    fn each_slot_resolves_independently() {
        // Project overrides only `epic`; `stage` still comes from the client.
        let project = overrides(Some("Initiative"), None);
        let client = overrides(Some("Theme"), Some("Phase"));

        let resolved = resolve_vocabulary(Some(&project), Some(&client), None);
        assert_eq!(resolved.epic.term, "Initiative");
        assert_eq!(resolved.epic.source, TermSource::Project);
        assert_eq!(resolved.stage.term, "Phase");
        assert_eq!(resolved.stage.source, TermSource::Client);
        assert_eq!(resolved.activity.source, TermSource::SystemDefault);
    }

    #[test]
    fn organization_level_sits_between_client_and_default() {
        let org = overrides(None, Some("Gate"));
        let resolved = resolve_vocabulary(None, None, Some(&org));
        assert_eq!(resolved.stage.term, "Gate");
        assert_eq!(resolved.stage.source, TermSource::Organization);
        assert_eq!(resolved.epic.source, TermSource::SystemDefault);
    }

    #[test]
    fn client_override_beats_organization() {
        let client = overrides(Some("Theme"), None);
        let org = overrides(Some("Program"), None);
        let resolved = resolve_vocabulary(None, Some(&client), Some(&org));
        assert_eq!(resolved.epic.term, "Theme");
        assert_eq!(resolved.epic.source, TermSource::Client);
    }
}
