use scdp_core::{TenantId, UserId};

/// Tenant context for a request.
///
/// This is immutable and must be present for all tenant-scoped routes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Acting user for a request, when identified.
///
/// Commit and reversal record the actor on the audit trail, so routes with
/// side effects require it; read-only routes do not.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ActorContext {
    user_id: Option<UserId>,
}

impl ActorContext {
    pub fn new(user_id: Option<UserId>) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }
}
