use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use crate::domain::values::guardrail::{GuardrailProfile, VersionedProfile};

/// Holds the active guardrail profile as an immutable, versioned snapshot.
///
/// Runs take an `Arc` to the snapshot current at open time; publishing a new
/// profile only affects runs opened afterwards.
pub struct ProfileRegistry {
    current: RwLock<Arc<VersionedProfile>>,
}

impl ProfileRegistry {
    pub fn new(profile: GuardrailProfile) -> Self {
        Self {
            current: RwLock::new(Arc::new(VersionedProfile { version: 1, profile })),
        }
    }

    pub fn active(&self) -> Arc<VersionedProfile> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn publish(&self, profile: GuardrailProfile) -> Arc<VersionedProfile> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(VersionedProfile {
            version: guard.version + 1,
            profile,
        });
        info!(
            profile = next.profile.name(),
            version = next.version,
            "activated guardrail profile"
        );
        *guard = next.clone();
        next
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new(GuardrailProfile::default())
    }
}
