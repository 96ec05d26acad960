//! GPU quota admission
//!
//! A reservation is the instance record itself: units count against the
//! quota from the moment the instance is inserted until it is removed,
//! whatever its status. The caller must hold the user's lock from
//! [`AdmissionController::try_reserve`] until the instance is in the store.

use std::sync::Arc;

use api_types::MAX_UNITS_PER_INSTANCE;
use tracing::debug;

use super::error::PlatformError;
use super::error::Result;
use super::store::ResourceStore;
use super::types::User;

/// Result of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected { available: u32 },
}

#[derive(Debug, Clone)]
pub struct AdmissionController {
    store: Arc<ResourceStore>,
}

impl AdmissionController {
    pub fn new(store: Arc<ResourceStore>) -> Self {
        Self { store }
    }

    /// Units currently held by `user_id` across all of their instances
    pub fn used_units(&self, user_id: &str) -> u32 {
        self.store
            .instances
            .list(|instance| instance.is_owned_by(user_id))
            .iter()
            .map(|instance| instance.count)
            .sum()
    }

    /// Units `user` could still reserve
    pub fn available_units(&self, user: &User) -> u32 {
        user.gpu_quota.saturating_sub(self.used_units(&user.user_id))
    }

    /// Checks a request for `requested` units against the user's quota
    pub fn try_reserve(&self, user: &User, requested: u32) -> Admission {
        let available = self.available_units(user);
        if requested > available {
            debug!(
                user_id = %user.user_id,
                requested,
                available,
                "Admission rejected"
            );
            return Admission::Rejected { available };
        }
        Admission::Accepted
    }
}

/// Rejects unit counts outside `1..=MAX_UNITS_PER_INSTANCE`
pub fn validate_unit_count(count: u32) -> Result<()> {
    if count == 0 || count > MAX_UNITS_PER_INSTANCE {
        return Err(PlatformError::InvalidRequest {
            reason: format!(
                "GPU count must be between 1 and {MAX_UNITS_PER_INSTANCE}, got {count}"
            ),
        });
    }
    Ok(())
}
