//! Tenant-scoped storage for the configuration the precedence resolvers
//! read from: organization defaults, client records, project records.
//!
//! Not event-sourced: the resolvers are pure read-through chains over the
//! latest settings, with no history requirement.

use scdp_core::{DomainError, TenantId};
use scdp_directory::{
    Client, ClientId, OrganizationSettings, Project, ProjectId, RateCard, RateResolution,
    ResolvedVocabulary, VocabularyOverrides, resolve_rate, resolve_vocabulary,
};

use super::tenant_store::{InMemoryTenantStore, TenantStore};

/// In-memory directory settings store.
///
/// Organization settings are a per-tenant singleton (unit key).
#[derive(Debug, Default)]
pub struct DirectorySettingsStore {
    organization: InMemoryTenantStore<(), OrganizationSettings>,
    clients: InMemoryTenantStore<ClientId, Client>,
    projects: InMemoryTenantStore<ProjectId, Project>,
}

impl DirectorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn organization(&self, tenant_id: TenantId) -> OrganizationSettings {
        self.organization.get(tenant_id, &()).unwrap_or_default()
    }

    pub fn upsert_organization(&self, tenant_id: TenantId, settings: OrganizationSettings) {
        self.organization.upsert(tenant_id, (), settings);
    }

    pub fn client(&self, tenant_id: TenantId, client_id: &ClientId) -> Option<Client> {
        self.clients.get(tenant_id, client_id)
    }

    pub fn list_clients(&self, tenant_id: TenantId) -> Vec<Client> {
        self.clients.list(tenant_id)
    }

    pub fn upsert_client(&self, tenant_id: TenantId, client: Client) {
        self.clients.upsert(tenant_id, client.client_id, client);
    }

    pub fn project(&self, tenant_id: TenantId, project_id: &ProjectId) -> Option<Project> {
        self.projects.get(tenant_id, project_id)
    }

    pub fn list_projects(&self, tenant_id: TenantId) -> Vec<Project> {
        self.projects.list(tenant_id)
    }

    /// Insert a project after checking its client exists.
    pub fn create_project(&self, tenant_id: TenantId, project: Project) -> Result<(), DomainError> {
        if self.client(tenant_id, &project.client_id).is_none() {
            return Err(DomainError::validation(format!(
                "unknown client {}",
                project.client_id
            )));
        }
        self.projects.upsert(tenant_id, project.project_id, project);
        Ok(())
    }

    pub fn update_client_vocabulary(
        &self,
        tenant_id: TenantId,
        client_id: &ClientId,
        vocabulary: VocabularyOverrides,
    ) -> Result<(), DomainError> {
        let mut client = self
            .client(tenant_id, client_id)
            .ok_or(DomainError::NotFound)?;
        client.vocabulary = vocabulary;
        self.upsert_client(tenant_id, client);
        Ok(())
    }

    pub fn update_client_rates(
        &self,
        tenant_id: TenantId,
        client_id: &ClientId,
        rates: RateCard,
    ) -> Result<(), DomainError> {
        let mut client = self
            .client(tenant_id, client_id)
            .ok_or(DomainError::NotFound)?;
        client.rates = rates;
        self.upsert_client(tenant_id, client);
        Ok(())
    }

    pub fn update_project_vocabulary(
        &self,
        tenant_id: TenantId,
        project_id: &ProjectId,
        vocabulary: VocabularyOverrides,
    ) -> Result<(), DomainError> {
        let mut project = self
            .project(tenant_id, project_id)
            .ok_or(DomainError::NotFound)?;
        project.vocabulary = vocabulary;
        self.projects.upsert(tenant_id, *project_id, project);
        Ok(())
    }

    pub fn update_project_rates(
        &self,
        tenant_id: TenantId,
        project_id: &ProjectId,
        rates: RateCard,
    ) -> Result<(), DomainError> {
        let mut project = self
            .project(tenant_id, project_id)
            .ok_or(DomainError::NotFound)?;
        project.rates = rates;
        self.projects.upsert(tenant_id, *project_id, project);
        Ok(())
    }

    /// Resolve the five vocabulary slots for a project through
    /// project → client → organization → system default.
    pub fn resolve_project_vocabulary(
        &self,
        tenant_id: TenantId,
        project_id: &ProjectId,
    ) -> Result<ResolvedVocabulary, DomainError> {
        let project = self
            .project(tenant_id, project_id)
            .ok_or(DomainError::NotFound)?;
        let client = self.client(tenant_id, &project.client_id);
        let org = self.organization(tenant_id);

        Ok(resolve_vocabulary(
            Some(&project.vocabulary),
            client.as_ref().map(|c| &c.vocabulary),
            Some(&org.vocabulary),
        ))
    }

    /// Resolve the billing rate for `role` on a project through the same
    /// cascade, ending at the organization's default rate.
    pub fn resolve_project_rate(
        &self,
        tenant_id: TenantId,
        project_id: &ProjectId,
        role: &str,
    ) -> Result<Option<RateResolution>, DomainError> {
        let project = self
            .project(tenant_id, project_id)
            .ok_or(DomainError::NotFound)?;
        let client = self.client(tenant_id, &project.client_id);
        let org = self.organization(tenant_id);

        Ok(resolve_rate(
            role,
            Some(&project.rates),
            client.as_ref().map(|c| &c.rates),
            Some(&org.rates),
            org.default_rate,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scdp_core::Money;
    use scdp_directory::{RateSource, TermSource};

    fn seeded() -> (DirectorySettingsStore, TenantId, ProjectId) {
        let store = DirectorySettingsStore::new();
        let tenant_id = TenantId::new();

        store.upsert_organization(
            tenant_id,
            OrganizationSettings {
                vocabulary: VocabularyOverrides {
                    stage: Some("Gate".to_string()),
                    ..VocabularyOverrides::default()
                },
                rates: RateCard::new().with_rate("consultant", Money::from_cents(16_000)),
                default_rate: Some(Money::from_cents(12_000)),
            },
        );

        let client_id = ClientId::new();
        let mut client = Client::new(client_id, "Globex");
        client.vocabulary.epic = Some("Theme".to_string());
        store.upsert_client(tenant_id, client);

        let project_id = ProjectId::new();
        let mut project = Project::new(project_id, client_id, "Migration 2026");
        project.vocabulary.epic = Some("Initiative".to_string());
        project.rates = RateCard::new().with_rate("architect", Money::from_cents(24_000));
        store.create_project(tenant_id, project).unwrap();

        (store, tenant_id, project_id)
    }

    #[test]
    fn resolves_vocabulary_through_the_cascade() {
        let (store, tenant_id, project_id) = seeded();
        let resolved = store
            .resolve_project_vocabulary(tenant_id, &project_id)
            .unwrap();

        assert_eq!(resolved.epic.term, "Initiative");
        assert_eq!(resolved.epic.source, TermSource::Project);
        assert_eq!(resolved.stage.term, "Gate");
        assert_eq!(resolved.stage.source, TermSource::Organization);
        assert_eq!(resolved.activity.source, TermSource::SystemDefault);
    }

    #[test]
    fn resolves_rates_through_the_cascade() {
        let (store, tenant_id, project_id) = seeded();

        let architect = store
            .resolve_project_rate(tenant_id, &project_id, "architect")
            .unwrap()
            .unwrap();
        assert_eq!(architect.rate, Money::from_cents(24_000));
        assert_eq!(architect.source, RateSource::Project);

        let consultant = store
            .resolve_project_rate(tenant_id, &project_id, "consultant")
            .unwrap()
            .unwrap();
        assert_eq!(consultant.source, RateSource::Organization);

        let unknown = store
            .resolve_project_rate(tenant_id, &project_id, "sound-designer")
            .unwrap()
            .unwrap();
        assert_eq!(unknown.rate, Money::from_cents(12_000));
        assert_eq!(unknown.source, RateSource::SystemDefault);
    }

    #[test]
    fn unknown_project_is_not_found() {
        let (store, tenant_id, _) = seeded();
        let err = store
            .resolve_project_vocabulary(tenant_id, &ProjectId::new())
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn tenants_are_isolated() {
        let (store, _tenant, project_id) = seeded();
        let other_tenant = TenantId::new();
        assert!(store.project(other_tenant, &project_id).is_none());
    }

    #[test]
    fn project_creation_requires_existing_client() {
        let store = DirectorySettingsStore::new();
        let tenant_id = TenantId::new();
        let err = store
            .create_project(
                tenant_id,
                Project::new(ProjectId::new(), ClientId::new(), "Orphan"),
            )
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }
}
