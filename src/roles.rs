//! Role/identity collaborator seam.
//!
//! The core never owns user records; it only asks the identity system which
//! role an actor holds. Deployments plug their directory in here.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ActorId, Role};

#[derive(Debug, Error)]
pub enum RoleResolveError {
    #[error("identity service unavailable: {reason}")]
    Unavailable { reason: String },
}

#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RoleResolver: Send + Sync {
    /// The role the identity system holds for `actor_id`, or `None` when the
    /// actor is unknown.
    async fn resolve(&self, actor_id: &ActorId) -> Result<Option<Role>, RoleResolveError>;
}

/// Fixed actor-to-role table; the default resolver for tests and single-node
/// deployments without a directory service.
#[derive(Debug, Default, Clone)]
pub struct StaticRoleResolver {
    roles: HashMap<ActorId, Role>,
}

impl StaticRoleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, actor_id: impl Into<String>, role: Role) -> Self {
        self.roles.insert(ActorId::new(actor_id), role);
        self
    }
}

#[async_trait]
impl RoleResolver for StaticRoleResolver {
    async fn resolve(&self, actor_id: &ActorId) -> Result<Option<Role>, RoleResolveError> {
        if actor_id == &ActorId::system() {
            return Ok(Some(Role::System));
        }
        Ok(self.roles.get(actor_id).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_returns_configured_roles() {
        let resolver = StaticRoleResolver::new()
            .with_role("alice", Role::Author)
            .with_role("bob", Role::Reviewer);

        assert_eq!(
            resolver.resolve(&ActorId::new("alice")).await.unwrap(),
            Some(Role::Author)
        );
        assert_eq!(
            resolver.resolve(&ActorId::new("carol")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn system_identity_always_resolves() {
        let resolver = StaticRoleResolver::new();
        assert_eq!(
            resolver.resolve(&ActorId::system()).await.unwrap(),
            Some(Role::System)
        );
    }
}
