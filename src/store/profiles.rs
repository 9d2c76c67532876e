//! Profile Repository Capabilities
//!
//! Narrow interfaces to the profile domains, limited to the two operations
//! the auth core needs for auto-provisioning on first verified login. The
//! full profile CRUD surface lives elsewhere and is deliberately not exposed
//! here.

use async_trait::async_trait;
use uuid::Uuid;

/// Capability to provision and look up model profiles
#[async_trait]
pub trait ModelProfileRepository: Send + Sync {
    /// Create an empty profile for the user
    async fn create(&self, user_id: Uuid) -> anyhow::Result<()>;

    /// Return the profile id for the user, if one exists
    async fn get_by_user_id(&self, user_id: Uuid) -> anyhow::Result<Option<Uuid>>;
}

/// Capability to provision and look up employer profiles
#[async_trait]
pub trait EmployerProfileRepository: Send + Sync {
    /// Create an empty profile for the user
    async fn create(&self, user_id: Uuid) -> anyhow::Result<()>;

    /// Return the profile id for the user, if one exists
    async fn get_by_user_id(&self, user_id: Uuid) -> anyhow::Result<Option<Uuid>>;
}
