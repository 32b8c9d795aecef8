//! Explicit tenant-scope threading.
//!
//! Every repository call against a tenant-owned table receives a
//! `TenantScope` resolved from the authenticated user. There is no
//! ambient/global scope state: an operation that cannot resolve a scope
//! fails closed instead of falling back to an unscoped query.

use uuid::Uuid;

use crate::database::models::{TenantId, User, UserRole};
use crate::utils::error::DomainError;

/// The caller's tenant context for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantScope {
    /// Reads and writes are confined to this tenant.
    Tenant(TenantId),
    /// Explicit cross-tenant administrative mode. Only an AdminMaster can
    /// obtain it, and its construction is audit-logged.
    CrossTenant { actor: Uuid },
}

impl TenantScope {
    /// Resolves the normal scope for an authenticated user.
    ///
    /// A user without a tenant never gets an implicit scope: scoped-role
    /// users without a tenant are a data error, and administrators must
    /// go through [`TenantScope::cross_tenant`] instead.
    pub fn for_user(user: &User) -> Result<Self, DomainError> {
        match user.tenant_id {
            Some(tenant_id) => Ok(Self::Tenant(tenant_id)),
            None if user.role == UserRole::AdminMaster => Err(DomainError::ScopeViolation(
                "administrators have no implicit tenant scope; request cross-tenant mode explicitly"
                    .to_string(),
            )),
            None => Err(DomainError::ScopeViolation(
                "user has no tenant and no scope can be resolved".to_string(),
            )),
        }
    }

    /// Grants the explicit cross-tenant mode to an AdminMaster.
    pub fn cross_tenant(actor: &User) -> Result<Self, DomainError> {
        if actor.role != UserRole::AdminMaster {
            return Err(DomainError::Unauthorized(
                "cross-tenant access is restricted to ADMIN_MASTER".to_string(),
            ));
        }

        tracing::warn!(
            target: "audit",
            actor = %actor.id,
            email = %actor.email,
            "cross-tenant administrative scope granted"
        );

        Ok(Self::CrossTenant { actor: actor.id })
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            Self::Tenant(tenant_id) => Some(*tenant_id),
            Self::CrossTenant { .. } => None,
        }
    }

    /// Writes always target a concrete tenant, even in administrative
    /// sessions.
    pub fn require_tenant(&self) -> Result<TenantId, DomainError> {
        self.tenant_id().ok_or_else(|| {
            DomainError::ScopeViolation(
                "this operation requires a concrete tenant scope".to_string(),
            )
        })
    }
}

/// Contract every tenant-owned entity implements.
///
/// Guarantees an opaque record id and a single owning tenant, and gives
/// collaborating modules a uniform ownership check against the caller's
/// scope.
pub trait TenantRecord {
    fn record_id(&self) -> Uuid;

    fn owner(&self) -> TenantId;

    fn owned_by(&self, scope: &TenantScope) -> bool {
        match scope {
            TenantScope::Tenant(tenant_id) => self.owner() == *tenant_id,
            TenantScope::CrossTenant { .. } => true,
        }
    }
}
