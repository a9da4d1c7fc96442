//! Storage abstraction for the permission authority of record.
//!
//! Backends ([`crate::MemoryStore`], [`crate::LmdbStore`], or a remote client) implement this
//! trait so resolution and the controller never depend on a specific transport or schema.
//!
//! Every mutation bumps the revision of the `(scope, resource)` it touches. Writes take a slice
//! of [`Precondition`]s and must fail with [`StoreError::Conflict`] if any listed revision has
//! moved, atomically with the write itself.

use crate::error::StoreError;
use crate::types::{Grant, GrantId, GrantRequest, Precondition, ResourceMeta, Scope, User};

pub trait PermissionStore: Send + Sync {
    /// Metadata of a project or environment.
    fn resource(&self, scope: Scope, resource_id: &str) -> Result<ResourceMeta, StoreError>;

    /// Current mutation counter of `(scope, resource)`. Zero if never mutated.
    fn revision(&self, scope: Scope, resource_id: &str) -> Result<u64, StoreError>;

    /// Grant rows issued at `scope` on `resource_id`, in creation order.
    fn list_grants(&self, scope: Scope, resource_id: &str) -> Result<Vec<Grant>, StoreError>;

    /// Users for the given ids. Unknown ids are skipped.
    fn list_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError>;

    /// Upsert the row for `(subject, scope, resource)`; an existing row keeps its id and has its
    /// actions replaced wholesale.
    fn create_or_replace_grant(
        &self,
        request: &GrantRequest,
        expected: &[Precondition],
    ) -> Result<Grant, StoreError>;

    /// Delete a grant row. `NotFound` if the id does not exist.
    fn delete_grant(&self, id: &GrantId, expected: &[Precondition]) -> Result<(), StoreError>;
}

impl<S: PermissionStore + ?Sized> PermissionStore for std::sync::Arc<S> {
    fn resource(&self, scope: Scope, resource_id: &str) -> Result<ResourceMeta, StoreError> {
        (**self).resource(scope, resource_id)
    }

    fn revision(&self, scope: Scope, resource_id: &str) -> Result<u64, StoreError> {
        (**self).revision(scope, resource_id)
    }

    fn list_grants(&self, scope: Scope, resource_id: &str) -> Result<Vec<Grant>, StoreError> {
        (**self).list_grants(scope, resource_id)
    }

    fn list_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        (**self).list_users_by_ids(ids)
    }

    fn create_or_replace_grant(
        &self,
        request: &GrantRequest,
        expected: &[Precondition],
    ) -> Result<Grant, StoreError> {
        (**self).create_or_replace_grant(request, expected)
    }

    fn delete_grant(&self, id: &GrantId, expected: &[Precondition]) -> Result<(), StoreError> {
        (**self).delete_grant(id, expected)
    }
}

/// Random 16-byte grant id, hex encoded.
pub(crate) fn new_grant_id() -> Result<GrantId, StoreError> {
    let mut bytes = [0u8; 16];
    getrandom::getrandom(&mut bytes).map_err(|e| StoreError::Backend(e.to_string()))?;
    Ok(GrantId(bytes.iter().map(|b| format!("{:02x}", b)).collect()))
}
