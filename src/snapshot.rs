//! Point-in-time resolution of one resource.
//!
//! A snapshot may be stale the instant it is read. It records the store revisions it observed
//! (read before the grant lists) so a write gated on it can be rejected if anything moved.

use std::thread;

use tracing::debug;

use crate::actions::Actions;
use crate::error::{Error, Result, StoreError};
use crate::resolver::{actions_for, entry_for, resolve};
use crate::store::PermissionStore;
use crate::types::{EffectiveEntry, Grant, Precondition, ResourceMeta, Scope};

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub resource: ResourceMeta,
    /// Grants inherited from the owning project (the resource itself for projects).
    pub project_grants: Vec<Grant>,
    /// Grants issued on the environment; empty for projects.
    pub environment_grants: Vec<Grant>,
    pub entries: Vec<EffectiveEntry>,
    pub preconditions: Vec<Precondition>,
}

impl Snapshot {
    pub fn scope(&self) -> Scope {
        self.resource.scope
    }

    /// Project whose project-scope grants feed this resolution.
    pub fn project_id(&self) -> Option<&str> {
        match self.resource.scope {
            Scope::Project => Some(&self.resource.id),
            Scope::Environment => self.resource.parent_id.as_deref(),
        }
    }

    /// Raw grant rows issued at `scope` on this snapshot's resource.
    pub fn grants_at(&self, scope: Scope) -> &[Grant] {
        match (self.resource.scope, scope) {
            (Scope::Project, Scope::Project) => &self.project_grants,
            (Scope::Environment, Scope::Environment) => &self.environment_grants,
            _ => &[],
        }
    }

    pub fn entry_for(&self, subject_id: &str) -> Option<&EffectiveEntry> {
        entry_for(&self.entries, subject_id)
    }

    pub fn actions_for(&self, subject_id: &str) -> Actions {
        actions_for(&self.entries, subject_id)
    }
}

fn not_found(scope: Scope, resource_id: &str) -> impl FnOnce(StoreError) -> Error + '_ {
    move |e| match e {
        StoreError::NotFound => Error::NotFound(format!("{} '{}' does not exist", scope, resource_id)),
        other => other.into(),
    }
}

/// Fetch both grant tiers of `resource_id` and resolve them.
///
/// The project and environment lists are fetched concurrently; resolution runs once both have
/// arrived, whichever finishes first.
pub fn fetch<S: PermissionStore + ?Sized>(
    store: &S,
    scope: Scope,
    resource_id: &str,
    reference_ts: u64,
) -> Result<Snapshot> {
    let resource = store.resource(scope, resource_id).map_err(not_found(scope, resource_id))?;

    let project_id = match scope {
        Scope::Project => Some(resource.id.clone()),
        Scope::Environment => resource.parent_id.clone(),
    };

    // Revisions first: a write landing between here and the lists makes the snapshot look
    // older than it is, which can only cause a spurious retry.
    let mut preconditions = Vec::with_capacity(2);
    if let Some(p) = &project_id {
        preconditions.push(Precondition {
            scope: Scope::Project,
            resource_id: p.clone(),
            revision: store.revision(Scope::Project, p)?,
        });
    }
    if scope == Scope::Environment {
        preconditions.push(Precondition {
            scope: Scope::Environment,
            resource_id: resource.id.clone(),
            revision: store.revision(Scope::Environment, &resource.id)?,
        });
    }

    let (project_grants, environment_grants) = thread::scope(|s| {
        let project = s.spawn(|| match &project_id {
            Some(p) => store.list_grants(Scope::Project, p),
            None => Ok(Vec::new()),
        });
        let environment = match scope {
            Scope::Environment => store.list_grants(Scope::Environment, &resource.id),
            Scope::Project => Ok(Vec::new()),
        };
        let project = project
            .join()
            .unwrap_or_else(|_| Err(StoreError::Unavailable("project grant fetch panicked".into())));
        (project, environment)
    });
    let (project_grants, environment_grants) = (project_grants?, environment_grants?);

    let entries = resolve(&project_grants, &environment_grants, &resource, reference_ts);
    debug!(
        scope = %scope,
        resource = %resource.id,
        project_grants = project_grants.len(),
        environment_grants = environment_grants.len(),
        "fetched snapshot"
    );
    Ok(Snapshot { resource, project_grants, environment_grants, entries, preconditions })
}
