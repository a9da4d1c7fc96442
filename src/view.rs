//! Cached resolutions with last-request-wins refresh.
//!
//! Each resource has a generation counter. Starting a refresh takes a [`Ticket`] for the next
//! generation; completing it publishes the snapshot only if no newer ticket was issued (or
//! invalidation happened) in the meantime. Stale in-flight results are discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::debug;

use crate::constants::WILDCARD_SUBJECT;
use crate::error::Result;
use crate::snapshot::{fetch, Snapshot};
use crate::store::PermissionStore;
use crate::types::{now_millis, EffectiveEntry, Scope, User};

type Key = (Scope, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    scope: Scope,
    resource_id: String,
    generation: u64,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Default)]
struct Slot {
    generation: u64,
    /// Owning project of an environment, once any snapshot of it has been seen.
    parent: Option<String>,
    snapshot: Option<Arc<Snapshot>>,
}

impl Slot {
    fn supersede(&mut self) {
        self.generation += 1;
        self.snapshot = None;
    }
}

/// Effective entry paired with display data for its subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedEntry {
    #[serde(flatten)]
    pub entry: EffectiveEntry,
    pub user: Option<User>,
    /// Display hint only; the controller re-checks on revoke.
    pub revocable: bool,
}

#[derive(Default)]
pub struct PermissionView {
    slots: Mutex<HashMap<Key, Slot>>,
}

impl PermissionView {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Slot>> {
        self.slots.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Start a refresh; any ticket issued earlier for the same resource becomes stale.
    pub fn begin(&self, scope: Scope, resource_id: &str) -> Ticket {
        let mut slots = self.lock();
        let slot = slots.entry((scope, resource_id.to_string())).or_default();
        slot.generation += 1;
        Ticket { scope, resource_id: resource_id.to_string(), generation: slot.generation }
    }

    /// Publish a fetched snapshot. Returns `None` if the ticket was superseded.
    pub fn complete(&self, ticket: Ticket, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
        let mut slots = self.lock();
        let slot = slots.entry((ticket.scope, ticket.resource_id)).or_default();
        if ticket.scope == Scope::Environment {
            slot.parent = snapshot.project_id().map(str::to_string);
        }
        if slot.generation != ticket.generation {
            debug!(
                ticket = ticket.generation,
                latest = slot.generation,
                "discarding superseded resolution"
            );
            return None;
        }
        let snapshot = Arc::new(snapshot);
        slot.snapshot = Some(snapshot.clone());
        Some(snapshot)
    }

    pub fn current(&self, scope: Scope, resource_id: &str) -> Option<Arc<Snapshot>> {
        self.lock()
            .get(&(scope, resource_id.to_string()))
            .and_then(|s| s.snapshot.clone())
    }

    /// Drop the cached resolution and supersede in-flight refreshes.
    pub fn invalidate(&self, scope: Scope, resource_id: &str) {
        self.lock().entry((scope, resource_id.to_string())).or_default().supersede();
    }

    /// Invalidate a resource and, for a project, every environment slot that inherits from it.
    ///
    /// Environments whose parent is not yet known (first refresh still in flight) are superseded
    /// as well, so a pre-write result can never be published.
    pub fn invalidate_tree(&self, scope: Scope, resource_id: &str) {
        let mut slots = self.lock();
        slots.entry((scope, resource_id.to_string())).or_default().supersede();
        if scope != Scope::Project {
            return;
        }
        for ((s, _), slot) in slots.iter_mut() {
            let inherits = match slot.parent.as_deref() {
                Some(parent) => parent == resource_id,
                None => true,
            };
            if *s == Scope::Environment && inherits {
                slot.supersede();
            }
        }
    }

    /// Fetch and publish. `Ok(None)` means a newer request superseded this one.
    pub fn refresh<S: PermissionStore + ?Sized>(
        &self,
        store: &S,
        scope: Scope,
        resource_id: &str,
    ) -> Result<Option<Arc<Snapshot>>> {
        let ticket = self.begin(scope, resource_id);
        let snapshot = fetch(store, scope, resource_id, now_millis())?;
        Ok(self.complete(ticket, snapshot))
    }

    /// Cached resolution, fetching one if none is cached.
    pub fn get_or_refresh<S: PermissionStore + ?Sized>(
        &self,
        store: &S,
        scope: Scope,
        resource_id: &str,
    ) -> Result<Arc<Snapshot>> {
        if let Some(snap) = self.current(scope, resource_id) {
            return Ok(snap);
        }
        match self.refresh(store, scope, resource_id)? {
            Some(snap) => Ok(snap),
            // Superseded: whoever won has published (or will); serve the newest we can see.
            None => match self.current(scope, resource_id) {
                Some(snap) => Ok(snap),
                None => Ok(Arc::new(fetch(store, scope, resource_id, now_millis())?)),
            },
        }
    }

    /// Pair each entry with its user record, using one store lookup for all subjects.
    pub fn enrich<S: PermissionStore + ?Sized>(
        &self,
        store: &S,
        entries: &[EffectiveEntry],
    ) -> Result<Vec<EnrichedEntry>> {
        let mut ids: Vec<String> = Vec::new();
        for e in entries {
            if e.subject_id != WILDCARD_SUBJECT && !ids.contains(&e.subject_id) {
                ids.push(e.subject_id.clone());
            }
        }
        let users: HashMap<String, User> = store
            .list_users_by_ids(&ids)?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();
        Ok(entries
            .iter()
            .map(|e| EnrichedEntry {
                entry: e.clone(),
                user: users.get(&e.subject_id).cloned(),
                revocable: e.is_revocable(),
            })
            .collect())
    }
}
