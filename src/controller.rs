//! Grant/revoke controller.
//!
//! All mutations require an actor with `admin` on the target resource, checked against a
//! resolution fetched for this call (never the cache). The write carries the revisions that
//! resolution observed; if the store reports a conflict the controller re-resolves, re-checks,
//! and tries again, up to the retry budget.
//!
//! The cached view is only touched after the store confirms a write; a failed call leaves it
//! exactly as it was.

use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

use crate::actions::Actions;
use crate::config::Config;
use crate::constants::{DEFAULT_RETRY_BUDGET, WILDCARD_SUBJECT};
use crate::error::{Error, Result, StoreError};
use crate::snapshot::{fetch, Snapshot};
use crate::store::PermissionStore;
use crate::types::{now_millis, Grant, GrantId, GrantRequest, Scope};
use crate::view::{EnrichedEntry, PermissionView};

/// `Unauthorized` unless `actor` holds admin in the resolution, wildcard included.
fn require_admin(snap: &Snapshot, actor: &str) -> Result<()> {
    if snap.actions_for(actor).contains(Actions::ADMIN) {
        Ok(())
    } else {
        Err(Error::Unauthorized(format!(
            "{} lacks admin on {} '{}'",
            actor,
            snap.scope(),
            snap.resource.id
        )))
    }
}

/// Authorizes and commits grant changes against a [`PermissionStore`], keeping a
/// [`PermissionView`] of resolved lists in step with confirmed writes.
pub struct Controller<S> {
    store: S,
    view: PermissionView,
    retry_budget: u32,
}

impl<S: PermissionStore> Controller<S> {
    pub fn new(store: S) -> Self {
        Self::with_retry_budget(store, DEFAULT_RETRY_BUDGET)
    }

    pub fn from_config(store: S, config: &Config) -> Self {
        Self::with_retry_budget(store, config.retry_budget)
    }

    pub fn with_retry_budget(store: S, retry_budget: u32) -> Self {
        Controller { store, view: PermissionView::new(), retry_budget: retry_budget.max(1) }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn view(&self) -> &PermissionView {
        &self.view
    }

    /// Effective list of a resource, served from the view when cached.
    pub fn resolve(&self, scope: Scope, resource_id: &str) -> Result<Arc<Snapshot>> {
        self.view.get_or_refresh(&self.store, scope, resource_id)
    }

    /// Effective list with user display data attached.
    pub fn resolve_enriched(&self, scope: Scope, resource_id: &str) -> Result<Vec<EnrichedEntry>> {
        let snap = self.resolve(scope, resource_id)?;
        self.view.enrich(&self.store, &snap.entries)
    }

    /// Issue or overwrite `subject_id`'s grant on `(scope, resource_id)`.
    ///
    /// Errors: `Unauthorized` if the actor lacks admin; `InvalidArgument` for an empty action set,
    /// the resource owner, or the wildcard as subject; `Conflict` once the retry budget is spent.
    pub fn grant(
        &self,
        actor_id: &str,
        subject_id: &str,
        scope: Scope,
        resource_id: &str,
        actions: Actions,
    ) -> Result<Grant> {
        let span = info_span!("grant", actor = %actor_id, scope = %scope, resource = %resource_id);
        let _guard = span.enter();

        for attempt in 1..=self.retry_budget {
            let snap = fetch(&self.store, scope, resource_id, now_millis())?;
            let checked = require_admin(&snap, actor_id).and_then(|_| {
                if actions.is_empty() {
                    Err(Error::InvalidArgument("action set is empty".into()))
                } else if subject_id == WILDCARD_SUBJECT {
                    Err(Error::InvalidArgument("the system default grant is not editable".into()))
                } else if snap.resource.is_owner(subject_id) {
                    Err(Error::InvalidArgument("resource owner already has full access".into()))
                } else {
                    Ok(())
                }
            });
            if let Err(e) = checked {
                warn!(subject = %subject_id, error = %e, "grant rejected");
                return Err(e);
            }

            let request = GrantRequest {
                subject_id: subject_id.to_string(),
                scope,
                resource_id: resource_id.to_string(),
                actions,
                granted_by: actor_id.to_string(),
                granted_at: now_millis(),
            };
            match self.store.create_or_replace_grant(&request, &snap.preconditions) {
                Ok(grant) => {
                    info!(id = %grant.id, subject = %subject_id, actions = %actions, "granted");
                    self.after_commit(scope, resource_id);
                    return Ok(grant);
                }
                Err(StoreError::Conflict) => {
                    warn!(attempt, "concurrent write, re-resolving");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Conflict(format!(
            "{} '{}' kept changing; gave up after {} attempts",
            scope, resource_id, self.retry_budget
        )))
    }

    /// Delete grant `permission_id` from `(scope, resource_id)`.
    ///
    /// Owner and system-default rows are refused before any store call. An actor may not
    /// revoke their own environment-scope grant; revoking their own project-scope grant is
    /// always allowed. Anything else requires admin on the resource.
    pub fn revoke(
        &self,
        actor_id: &str,
        permission_id: &GrantId,
        scope: Scope,
        resource_id: &str,
    ) -> Result<()> {
        let span = info_span!("revoke", actor = %actor_id, scope = %scope, resource = %resource_id);
        let _guard = span.enter();

        if permission_id.is_synthesized() {
            warn!(id = %permission_id, "revoke of synthesized entry refused");
            return Err(Error::Forbidden(if permission_id.is_owner() {
                "cannot revoke resource owner".into()
            } else {
                "cannot revoke the system default grant".into()
            }));
        }

        for attempt in 1..=self.retry_budget {
            let snap = fetch(&self.store, scope, resource_id, now_millis())?;
            let target = snap
                .grants_at(scope)
                .iter()
                .find(|g| &g.id == permission_id)
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "permission {} not found on {} '{}'",
                        permission_id, scope, resource_id
                    ))
                })?;

            let own = target.subject_id == actor_id;
            if own && scope == Scope::Environment {
                warn!(id = %permission_id, "self-revocation at environment scope refused");
                return Err(Error::Forbidden(
                    "cannot revoke your own access to the environment you are managing".into(),
                ));
            }
            if !own {
                require_admin(&snap, actor_id).inspect_err(|e| warn!(error = %e, "revoke rejected"))?;
            }

            match self.store.delete_grant(permission_id, &snap.preconditions) {
                Ok(()) => {
                    info!(id = %permission_id, subject = %target.subject_id, "revoked");
                    self.after_commit(scope, resource_id);
                    return Ok(());
                }
                Err(StoreError::Conflict) => {
                    warn!(attempt, "concurrent write, re-resolving");
                }
                Err(StoreError::NotFound) => {
                    return Err(Error::NotFound(format!("permission {} not found", permission_id)));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(Error::Conflict(format!(
            "{} '{}' kept changing; gave up after {} attempts",
            scope, resource_id, self.retry_budget
        )))
    }

    fn after_commit(&self, scope: Scope, resource_id: &str) {
        self.view.invalidate_tree(scope, resource_id);
        match self.view.refresh(&self.store, scope, resource_id) {
            Ok(_) => debug!("view refreshed"),
            // The write is committed; the next resolve fetches again.
            Err(e) => warn!(error = %e, "refresh after commit failed"),
        }
    }
}
