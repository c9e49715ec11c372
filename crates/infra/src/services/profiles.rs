use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use vetledger_core::StaffId;
use vetledger_scheduling::AvailabilityProfile;

/// Storage boundary for staff availability profiles.
///
/// Profiles are configuration, not event-sourced state; a handful of rows
/// edited by the clinic owner.
pub trait ProfileStore: Send + Sync {
    fn get(&self, staff_id: StaffId) -> Option<AvailabilityProfile>;
    fn upsert(&self, profile: AvailabilityProfile);
    fn list(&self) -> Vec<AvailabilityProfile>;
}

impl<S> ProfileStore for Arc<S>
where
    S: ProfileStore + ?Sized,
{
    fn get(&self, staff_id: StaffId) -> Option<AvailabilityProfile> {
        (**self).get(staff_id)
    }

    fn upsert(&self, profile: AvailabilityProfile) {
        (**self).upsert(profile)
    }

    fn list(&self) -> Vec<AvailabilityProfile> {
        (**self).list()
    }
}

/// In-memory profile store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    inner: RwLock<HashMap<StaffId, AvailabilityProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn get(&self, staff_id: StaffId) -> Option<AvailabilityProfile> {
        let map = self.inner.read().ok()?;
        map.get(&staff_id).cloned()
    }

    fn upsert(&self, profile: AvailabilityProfile) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(profile.staff_id, profile);
        }
    }

    fn list(&self) -> Vec<AvailabilityProfile> {
        match self.inner.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => vec![],
        }
    }
}
