//! In-process permission store

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::StoreError;
use crate::store::{new_grant_id, PermissionStore};
use crate::types::{Grant, GrantId, GrantRequest, Precondition, ResourceMeta, Scope, User};

type ResourceKey = (Scope, String);

#[derive(Default)]
struct Inner {
    resources: HashMap<ResourceKey, ResourceMeta>,
    revisions: HashMap<ResourceKey, u64>,
    // Creation order is list order
    grants: Vec<Grant>,
    users: HashMap<String, User>,
}

impl Inner {
    fn revision(&self, scope: Scope, resource_id: &str) -> u64 {
        self.revisions
            .get(&(scope, resource_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    fn bump(&mut self, scope: Scope, resource_id: &str) {
        *self.revisions.entry((scope, resource_id.to_string())).or_insert(0) += 1;
    }

    fn check(&self, expected: &[Precondition]) -> Result<(), StoreError> {
        for p in expected {
            if self.revision(p.scope, &p.resource_id) != p.revision {
                return Err(StoreError::Conflict);
            }
        }
        Ok(())
    }
}

/// Mutex-guarded maps. Suitable for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register or update resource metadata. Bumps the resource's revision.
    pub fn put_resource(&self, meta: ResourceMeta) {
        let mut inner = self.lock();
        inner.bump(meta.scope, &meta.id);
        inner.resources.insert((meta.scope, meta.id.clone()), meta);
    }

    pub fn put_user(&self, user: User) {
        self.lock().users.insert(user.id.clone(), user);
    }

    /// Total number of stored grant rows.
    pub fn grant_count(&self) -> usize {
        self.lock().grants.len()
    }
}

impl PermissionStore for MemoryStore {
    fn resource(&self, scope: Scope, resource_id: &str) -> Result<ResourceMeta, StoreError> {
        self.lock()
            .resources
            .get(&(scope, resource_id.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn revision(&self, scope: Scope, resource_id: &str) -> Result<u64, StoreError> {
        Ok(self.lock().revision(scope, resource_id))
    }

    fn list_grants(&self, scope: Scope, resource_id: &str) -> Result<Vec<Grant>, StoreError> {
        Ok(self
            .lock()
            .grants
            .iter()
            .filter(|g| g.scope == scope && g.resource_id == resource_id)
            .cloned()
            .collect())
    }

    fn list_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        let inner = self.lock();
        Ok(ids.iter().filter_map(|id| inner.users.get(id).cloned()).collect())
    }

    fn create_or_replace_grant(
        &self,
        request: &GrantRequest,
        expected: &[Precondition],
    ) -> Result<Grant, StoreError> {
        let mut inner = self.lock();
        inner.check(expected)?;

        let existing = inner.grants.iter_mut().find(|g| {
            g.subject_id == request.subject_id
                && g.scope == request.scope
                && g.resource_id == request.resource_id
        });
        let grant = match existing {
            Some(g) => {
                g.actions = request.actions;
                g.granted_at = Some(request.granted_at);
                g.granted_by = request.granted_by.clone();
                g.clone()
            }
            None => {
                let g = Grant {
                    id: new_grant_id()?,
                    subject_id: request.subject_id.clone(),
                    scope: request.scope,
                    resource_id: request.resource_id.clone(),
                    actions: request.actions,
                    granted_at: Some(request.granted_at),
                    granted_by: request.granted_by.clone(),
                };
                inner.grants.push(g.clone());
                g
            }
        };
        inner.bump(request.scope, &request.resource_id);
        debug!(id = %grant.id, subject = %grant.subject_id, "memory store upserted grant");
        Ok(grant)
    }

    fn delete_grant(&self, id: &GrantId, expected: &[Precondition]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let pos = inner
            .grants
            .iter()
            .position(|g| &g.id == id)
            .ok_or(StoreError::NotFound)?;
        inner.check(expected)?;
        let g = inner.grants.remove(pos);
        inner.bump(g.scope, &g.resource_id);
        debug!(id = %id, "memory store deleted grant");
        Ok(())
    }
}
