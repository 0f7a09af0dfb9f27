//! Authorization context for admin-only operations.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

use bizpass_types::TgUserId;

use crate::{ServiceError, ServiceResult};

/// Proof that `actor` passed the admin check. Only [`AccessPolicy`] mints one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminCapability {
    actor: TgUserId,
}

impl AdminCapability {
    #[must_use]
    pub const fn actor(&self) -> TgUserId {
        self.actor
    }
}

/// Admin id set, seeded from configuration at startup.
///
/// Changes only through [`AccessPolicy::grant_admin`] and
/// [`AccessPolicy::revoke_admin`], both of which require an existing capability.
#[derive(Debug, Default)]
pub struct AccessPolicy {
    admins: RwLock<BTreeSet<TgUserId>>,
}

impl AccessPolicy {
    pub fn new(admins: impl IntoIterator<Item = TgUserId>) -> Self {
        Self {
            admins: RwLock::new(admins.into_iter().collect()),
        }
    }

    #[must_use]
    pub fn from_config(config: &bizpass_config::BizpassConfig) -> Self {
        Self::new(config.admin_ids().into_iter().map(TgUserId::new))
    }

    #[must_use]
    pub fn is_admin(&self, user: TgUserId) -> bool {
        self.admins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&user)
    }

    pub fn require_admin(&self, actor: TgUserId) -> ServiceResult<AdminCapability> {
        if self.is_admin(actor) {
            Ok(AdminCapability { actor })
        } else {
            tracing::warn!(actor = %actor, "Admin-only operation denied");
            Err(ServiceError::AccessDenied(
                "This action is available to administrators only.",
            ))
        }
    }

    /// Returns `false` if `user` already was an admin.
    pub fn grant_admin(&self, granted_by: &AdminCapability, user: TgUserId) -> bool {
        let added = self
            .admins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user);
        if added {
            tracing::info!(actor = %granted_by.actor(), user = %user, "Admin granted");
        }
        added
    }

    /// Returns `false` if `user` was not an admin.
    pub fn revoke_admin(&self, revoked_by: &AdminCapability, user: TgUserId) -> bool {
        let removed = self
            .admins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user);
        if removed {
            tracing::info!(actor = %revoked_by.actor(), user = %user, "Admin revoked");
        }
        removed
    }

    #[must_use]
    pub fn admins(&self) -> Vec<TgUserId> {
        self.admins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}
