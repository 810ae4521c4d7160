//! Admin access control
//!
//! Owners come from the configured allow-list and are always admins. Other
//! users become admins only when an owner promotes them.

use crate::error::PermissionError;
use crate::models::{Role, User};
use crate::storage::StorageProvider;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

/// Audit tag written for every refused admin attempt
pub const ACTION_ACCESS_DENIED: &str = "admin_access_denied";

/// Gate in front of every admin operation
pub struct AdminGate {
    owners: HashSet<i64>,
    storage: Arc<dyn StorageProvider>,
}

impl AdminGate {
    /// Create a gate for the given allow-list.
    #[must_use]
    pub fn new(owners: HashSet<i64>, storage: Arc<dyn StorageProvider>) -> Self {
        Self { owners, storage }
    }

    /// Allow-listed owner.
    #[must_use]
    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owners.contains(&user_id)
    }

    /// Owner, or a promoted admin who is not banned.
    #[must_use]
    pub fn is_admin(&self, user: &User) -> bool {
        self.is_owner(user.id) || (user.role == Role::Admin && !user.is_banned)
    }

    /// Role to give a user on first contact.
    #[must_use]
    pub fn initial_role(&self, user_id: i64) -> Role {
        if self.is_owner(user_id) {
            Role::Admin
        } else {
            Role::User
        }
    }

    /// Check admin rights, auditing refusals.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::NotAdmin`] for non-admins.
    pub async fn authorize(&self, user: &User, operation: &str) -> Result<(), PermissionError> {
        if self.is_admin(user) {
            return Ok(());
        }
        self.deny(user.id, operation).await;
        Err(PermissionError::NotAdmin { user_id: user.id })
    }

    /// Check owner rights, auditing refusals.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::OwnerOnly`] for anyone off the allow-list.
    pub async fn authorize_owner(
        &self,
        user: &User,
        operation: &str,
    ) -> Result<(), PermissionError> {
        if self.is_owner(user.id) {
            return Ok(());
        }
        self.deny(user.id, operation).await;
        Err(PermissionError::OwnerOnly { user_id: user.id })
    }

    async fn deny(&self, user_id: i64, operation: &str) {
        warn!("Denied admin operation '{operation}' for user {user_id}");
        if let Err(e) = self
            .storage
            .record_admin_action(user_id, ACTION_ACCESS_DENIED, None, Some(operation.to_string()))
            .await
        {
            warn!("Failed to audit denied access for {user_id}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MockStorageProvider;
    use crate::testing::sample_user;
    use mockall::predicate::{always, eq};

    fn gate(storage: MockStorageProvider) -> AdminGate {
        AdminGate::new(HashSet::from([1]), Arc::new(storage))
    }

    #[tokio::test]
    async fn owner_and_promoted_admin_pass() {
        let gate = gate(MockStorageProvider::new());
        let owner = sample_user(1);
        let mut promoted = sample_user(2);
        promoted.role = Role::Admin;

        assert!(gate.authorize(&owner, "panel").await.is_ok());
        assert!(gate.authorize(&promoted, "panel").await.is_ok());
    }

    #[tokio::test]
    async fn non_admin_is_denied_and_audited() {
        let mut storage = MockStorageProvider::new();
        storage
            .expect_record_admin_action()
            .with(eq(7), eq(ACTION_ACCESS_DENIED), eq(None::<i64>), always())
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let gate = gate(storage);

        let result = gate.authorize(&sample_user(7), "panel").await;
        assert_eq!(result, Err(PermissionError::NotAdmin { user_id: 7 }));
    }

    #[tokio::test]
    async fn banned_admin_loses_rights() {
        let mut storage = MockStorageProvider::new();
        storage
            .expect_record_admin_action()
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let gate = gate(storage);
        let mut user = sample_user(3);
        user.role = Role::Admin;
        user.is_banned = true;

        assert!(gate.authorize(&user, "panel").await.is_err());
    }

    #[tokio::test]
    async fn promoted_admin_is_not_owner() {
        let mut storage = MockStorageProvider::new();
        storage
            .expect_record_admin_action()
            .times(1)
            .returning(|_, _, _, _| Ok(()));
        let gate = gate(storage);
        let mut admin = sample_user(2);
        admin.role = Role::Admin;

        assert_eq!(
            gate.authorize_owner(&admin, "promote").await,
            Err(PermissionError::OwnerOnly { user_id: 2 })
        );
    }

    #[test]
    fn owners_start_as_admins() {
        let gate = gate(MockStorageProvider::new());
        assert_eq!(gate.initial_role(1), Role::Admin);
        assert_eq!(gate.initial_role(9), Role::User);
    }
}
