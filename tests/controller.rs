//! Grant and revoke tests for permscope
//!
//! These tests drive the controller against the in-memory store: authorization, protected
//! rows, self-revocation, and recovery from concurrent writes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use permscope::{
    Actions, Controller, Error, ErrorKind, Grant, GrantId, GrantRequest, MemoryStore, Mutation,
    MutationState, PermissionStore, Precondition, ResourceMeta, Scope, StoreError, User,
};

fn rw() -> Actions {
    Actions::READ.union(Actions::WRITE)
}

/// Project p1 owned by "owner", environment e1 inside it, "admin" holding admin on p1.
fn seeded() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put_resource(ResourceMeta::project("p1").with_owner("owner").with_created_at(5));
    store.put_resource(ResourceMeta::environment("e1", "p1").with_owner("owner").with_created_at(6));
    store
        .create_or_replace_grant(
            &GrantRequest {
                subject_id: "admin".into(),
                scope: Scope::Project,
                resource_id: "p1".into(),
                actions: Actions::ADMIN.union(Actions::READ),
                granted_by: "owner".into(),
                granted_at: 7,
            },
            &[],
        )
        .unwrap();
    store
}

fn controller() -> (Controller<Arc<MemoryStore>>, Arc<MemoryStore>) {
    let store = seeded();
    (Controller::new(store.clone()), store)
}

// ============================================================================
// Grant
// ============================================================================

/// A granted subject shows up in the next resolution with exactly those actions
#[test]
fn grant_then_resolve() {
    let (c, _) = controller();
    let g = c.grant("owner", "u1", Scope::Environment, "e1", rw()).unwrap();
    assert_eq!(g.actions, rw());
    assert_eq!(g.granted_by, "owner");

    let snap = c.resolve(Scope::Environment, "e1").unwrap();
    let e = snap.entry_for("u1").unwrap();
    assert_eq!(e.actions, rw());
    assert_eq!(e.source_scope, Scope::Environment);
    assert_eq!(e.id, g.id);
}

/// Inherited admin on the project authorizes grants on its environments
#[test]
fn project_admin_can_grant_on_environment() {
    let (c, _) = controller();
    assert!(c.grant("admin", "u1", Scope::Environment, "e1", Actions::READ).is_ok());
}

/// A second grant to the same subject replaces actions and keeps the id
#[test]
fn regrant_replaces_and_keeps_id() {
    let (c, store) = controller();
    let first = c.grant("owner", "u1", Scope::Project, "p1", rw()).unwrap();
    let count = store.grant_count();
    let second = c.grant("owner", "u1", Scope::Project, "p1", Actions::DELETE).unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(store.grant_count(), count);
    let snap = c.resolve(Scope::Project, "p1").unwrap();
    assert_eq!(snap.entry_for("u1").unwrap().actions, Actions::DELETE);
}

/// Environment grant overrides an inherited project grant in the view
#[test]
fn environment_grant_overrides_project_in_view() {
    let (c, _) = controller();
    c.grant("owner", "u1", Scope::Project, "p1", rw()).unwrap();
    c.grant("owner", "u1", Scope::Environment, "e1", Actions::READ).unwrap();
    let snap = c.resolve(Scope::Environment, "e1").unwrap();
    let rows: Vec<_> = snap.entries.iter().filter(|e| e.subject_id == "u1").collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].actions, Actions::READ);
}

/// Project grant lands in cached environment views of that project
#[test]
fn project_grant_refreshes_cached_environment() {
    let (c, _) = controller();
    let before = c.resolve(Scope::Environment, "e1").unwrap();
    assert!(before.entry_for("u1").is_none());
    c.grant("owner", "u1", Scope::Project, "p1", rw()).unwrap();
    let after = c.resolve(Scope::Environment, "e1").unwrap();
    assert_eq!(after.entry_for("u1").unwrap().actions, rw());
}

/// A non-admin actor is rejected and nothing is written
#[test]
fn grant_without_admin_is_unauthorized() {
    let (c, store) = controller();
    let count = store.grant_count();
    let r = c.grant("stranger", "u1", Scope::Environment, "e1", Actions::READ);
    assert_eq!(r.unwrap_err().kind(), ErrorKind::Unauthorized);
    assert_eq!(store.grant_count(), count);
}

/// Wildcard read does not imply admin
#[test]
fn read_only_subject_cannot_grant() {
    let (c, _) = controller();
    c.grant("owner", "reader", Scope::Project, "p1", Actions::READ).unwrap();
    let r = c.grant("reader", "u1", Scope::Project, "p1", Actions::READ);
    assert!(matches!(r, Err(Error::Unauthorized(_))));
}

/// Empty sets, the owner and the wildcard are rejected as subjects
#[test]
fn invalid_grant_arguments() {
    let (c, store) = controller();
    let count = store.grant_count();
    for (subject, actions) in [("u1", Actions::NONE), ("owner", Actions::READ), ("*", Actions::READ)] {
        let r = c.grant("owner", subject, Scope::Environment, "e1", actions);
        assert_eq!(r.unwrap_err().kind(), ErrorKind::InvalidArgument, "subject {}", subject);
    }
    assert_eq!(store.grant_count(), count);
}

/// Granting on a resource that does not exist is NotFound
#[test]
fn grant_on_unknown_resource() {
    let (c, _) = controller();
    let r = c.grant("owner", "u1", Scope::Environment, "nope", Actions::READ);
    assert_eq!(r.unwrap_err().kind(), ErrorKind::NotFound);
}

// ============================================================================
// Revoke
// ============================================================================

/// Revoking a grant removes the subject from the next resolution
#[test]
fn grant_revoke_round_trip() {
    let (c, store) = controller();
    let before = c.resolve(Scope::Environment, "e1").unwrap().entries.clone();
    let count = store.grant_count();

    let g = c.grant("owner", "u1", Scope::Environment, "e1", rw()).unwrap();
    c.revoke("owner", &g.id, Scope::Environment, "e1").unwrap();

    let after = c.resolve(Scope::Environment, "e1").unwrap();
    assert!(after.entry_for("u1").is_none());
    assert_eq!(store.grant_count(), count);
    let ids = |v: &[permscope::EffectiveEntry]| v.iter().map(|e| e.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&before), ids(&after.entries));
}

/// Revoking an env grant reveals the project grant underneath
#[test]
fn revoke_environment_grant_reveals_project_grant() {
    let (c, _) = controller();
    c.grant("owner", "u1", Scope::Project, "p1", rw()).unwrap();
    let g = c.grant("owner", "u1", Scope::Environment, "e1", Actions::READ).unwrap();
    c.revoke("owner", &g.id, Scope::Environment, "e1").unwrap();
    let e = c.resolve(Scope::Environment, "e1").unwrap().entry_for("u1").cloned().unwrap();
    assert_eq!(e.source_scope, Scope::Project);
    assert_eq!(e.actions, rw());
}

/// Owner and wildcard ids are refused before the store is touched
#[test]
fn synthesized_rows_are_forbidden() {
    let (c, _) = controller();
    for id in [GrantId::owner("e1"), GrantId::wildcard()] {
        let r = c.revoke("owner", &id, Scope::Environment, "e1");
        assert_eq!(r.unwrap_err().kind(), ErrorKind::Forbidden);
    }
    // Refused even on a resource that does not exist
    let r = c.revoke("owner", &GrantId::owner("ghost"), Scope::Environment, "ghost");
    assert_eq!(r, Err(Error::Forbidden("cannot revoke resource owner".into())));
    let r = c.revoke("owner", &GrantId::wildcard(), Scope::Environment, "ghost");
    assert_eq!(r, Err(Error::Forbidden("cannot revoke the system default grant".into())));
}

/// An actor cannot revoke their own environment grant, even as admin
#[test]
fn self_revoke_environment_forbidden() {
    let (c, store) = controller();
    let g = c.grant("owner", "admin", Scope::Environment, "e1", Actions::ADMIN).unwrap();
    let count = store.grant_count();
    let r = c.revoke("admin", &g.id, Scope::Environment, "e1");
    assert_eq!(r.unwrap_err().kind(), ErrorKind::Forbidden);
    assert_eq!(store.grant_count(), count);
}

/// Leaving a project by revoking your own project grant is allowed without admin
#[test]
fn self_revoke_project_allowed() {
    let (c, _) = controller();
    let g = c.grant("owner", "u1", Scope::Project, "p1", Actions::READ).unwrap();
    c.revoke("u1", &g.id, Scope::Project, "p1").unwrap();
    assert!(c.resolve(Scope::Project, "p1").unwrap().entry_for("u1").is_none());
}

/// Revoking someone else's grant requires admin
#[test]
fn revoke_without_admin_is_unauthorized() {
    let (c, store) = controller();
    let g = c.grant("owner", "u1", Scope::Environment, "e1", rw()).unwrap();
    let count = store.grant_count();
    let r = c.revoke("u2", &g.id, Scope::Environment, "e1");
    assert_eq!(r.unwrap_err().kind(), ErrorKind::Unauthorized);
    assert_eq!(store.grant_count(), count);
}

/// Unknown ids, and ids living at another scope, are NotFound
#[test]
fn revoke_unknown_is_not_found() {
    let (c, _) = controller();
    let r = c.revoke("owner", &GrantId::from("missing"), Scope::Environment, "e1");
    assert_eq!(r.unwrap_err().kind(), ErrorKind::NotFound);

    // Project grants are visible in the environment view but revoked at project scope
    let g = c.grant("owner", "u1", Scope::Project, "p1", rw()).unwrap();
    let r = c.revoke("owner", &g.id, Scope::Environment, "e1");
    assert_eq!(r.unwrap_err().kind(), ErrorKind::NotFound);
}

/// A second revoke of the same id fails cleanly
#[test]
fn double_revoke() {
    let (c, _) = controller();
    let g = c.grant("owner", "u1", Scope::Project, "p1", rw()).unwrap();
    c.revoke("owner", &g.id, Scope::Project, "p1").unwrap();
    let r = c.revoke("owner", &g.id, Scope::Project, "p1");
    assert_eq!(r.unwrap_err().kind(), ErrorKind::NotFound);
}

// ============================================================================
// Concurrent Writes
// ============================================================================

/// Store wrapper that lands a competing write just before the first `n` mutations.
struct Meddling {
    inner: Arc<MemoryStore>,
    remaining: AtomicU32,
    attempts: AtomicU32,
}

impl Meddling {
    fn new(inner: Arc<MemoryStore>, n: u32) -> Self {
        Meddling { inner, remaining: AtomicU32::new(n), attempts: AtomicU32::new(0) }
    }

    fn meddle(&self, expected: &[Precondition]) {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return;
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        if let Some(p) = expected.first() {
            let meta = self.inner.resource(p.scope, &p.resource_id).unwrap();
            self.inner.put_resource(meta);
        }
    }
}

impl PermissionStore for Meddling {
    fn resource(&self, scope: Scope, id: &str) -> Result<ResourceMeta, StoreError> {
        self.inner.resource(scope, id)
    }

    fn revision(&self, scope: Scope, id: &str) -> Result<u64, StoreError> {
        self.inner.revision(scope, id)
    }

    fn list_grants(&self, scope: Scope, id: &str) -> Result<Vec<Grant>, StoreError> {
        self.inner.list_grants(scope, id)
    }

    fn list_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        self.inner.list_users_by_ids(ids)
    }

    fn create_or_replace_grant(
        &self,
        request: &GrantRequest,
        expected: &[Precondition],
    ) -> Result<Grant, StoreError> {
        self.meddle(expected);
        self.inner.create_or_replace_grant(request, expected)
    }

    fn delete_grant(&self, id: &GrantId, expected: &[Precondition]) -> Result<(), StoreError> {
        self.meddle(expected);
        self.inner.delete_grant(id, expected)
    }
}

/// A conflicting write is absorbed by re-resolving and retrying
#[test]
fn conflict_is_retried() {
    let store = Meddling::new(seeded(), 2);
    let c = Controller::with_retry_budget(store, 3);
    let g = c.grant("owner", "u1", Scope::Environment, "e1", rw()).unwrap();
    assert_eq!(c.store().attempts.load(Ordering::SeqCst), 3);
    assert_eq!(c.resolve(Scope::Environment, "e1").unwrap().entry_for("u1").unwrap().id, g.id);
}

/// Once the budget is spent the caller sees Conflict and nothing was written
#[test]
fn conflict_budget_exhausted() {
    let inner = seeded();
    let count = inner.grant_count();
    let c = Controller::with_retry_budget(Meddling::new(inner.clone(), 10), 2);
    let r = c.grant("owner", "u1", Scope::Environment, "e1", rw());
    assert_eq!(r.unwrap_err().kind(), ErrorKind::Conflict);
    assert_eq!(c.store().attempts.load(Ordering::SeqCst), 2);
    assert_eq!(inner.grant_count(), count);
}

/// Revoke retries the same way
#[test]
fn revoke_conflict_is_retried() {
    let inner = seeded();
    let c = Controller::new(inner.clone());
    let g = c.grant("owner", "u1", Scope::Project, "p1", rw()).unwrap();

    let c = Controller::new(Meddling::new(inner.clone(), 1));
    c.revoke("owner", &g.id, Scope::Project, "p1").unwrap();
    assert!(inner.list_grants(Scope::Project, "p1").unwrap().iter().all(|x| x.id != g.id));
}

/// Unavailable stores surface as retryable Transient errors
#[test]
fn unavailable_store_is_transient() {
    struct Offline;
    impl PermissionStore for Offline {
        fn resource(&self, _: Scope, _: &str) -> Result<ResourceMeta, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn revision(&self, _: Scope, _: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn list_grants(&self, _: Scope, _: &str) -> Result<Vec<Grant>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn list_users_by_ids(&self, _: &[String]) -> Result<Vec<User>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn create_or_replace_grant(&self, _: &GrantRequest, _: &[Precondition]) -> Result<Grant, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        fn delete_grant(&self, _: &GrantId, _: &[Precondition]) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    let c = Controller::new(Offline);
    let e = c.resolve(Scope::Project, "p1").unwrap_err();
    assert_eq!(e.kind(), ErrorKind::Transient);
    assert!(e.is_retryable());
    assert!(c.view().current(Scope::Project, "p1").is_none());
}

// ============================================================================
// Mutation Lifecycle
// ============================================================================

/// A failed revoke leaves the cached view as it was and the mutation carries the reason
#[test]
fn failed_mutation_keeps_view() {
    let (c, _) = controller();
    let before = c.resolve(Scope::Environment, "e1").unwrap();
    let mut m = Mutation::new();
    let r = m.run(|| c.revoke("owner", &GrantId::owner("e1"), Scope::Environment, "e1"));
    assert!(r.is_err());
    assert!(matches!(m.state(), MutationState::Failed(Error::Forbidden(_))));
    let after = c.view().current(Scope::Environment, "e1").unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    m.acknowledge();
    assert_eq!(m.state(), &MutationState::Idle);
}

/// Enriched resolution attaches user records where known
#[test]
fn resolve_enriched_attaches_users() {
    let (c, store) = controller();
    store.put_user(User { id: "owner".into(), name: "Olive".into(), email: None });
    store.put_user(User { id: "u1".into(), name: "Uma".into(), email: Some("uma@example.com".into()) });
    c.grant("owner", "u1", Scope::Environment, "e1", rw()).unwrap();

    let rows = c.resolve_enriched(Scope::Environment, "e1").unwrap();
    let name = |s: &str| rows.iter().find(|r| r.entry.subject_id == s).and_then(|r| r.user.as_ref()).map(|u| u.name.clone());
    assert_eq!(name("owner").as_deref(), Some("Olive"));
    assert_eq!(name("u1").as_deref(), Some("Uma"));
    assert_eq!(name("*"), None);
    assert_eq!(name("admin"), None);
}
