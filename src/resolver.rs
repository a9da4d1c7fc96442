//! Permission resolution.
//!
//! Folds the project-scope and environment-scope grant lists of one resource into a single
//! effective list:
//!
//! 1. seed a subject-keyed map from the project grants,
//! 2. overlay the environment grants; a subject present at both tiers keeps only the
//!    environment action set (replace, never union),
//! 3. drop the owner's subject from the map,
//! 4. emit the synthesized owner row, then the system-default wildcard row,
//! 5. emit the environment-sourced rows, then the project leftovers, each in input order.
//!
//! Resolution is pure: no I/O, same input gives the same output.

use std::collections::HashMap;

use tracing::debug;

use crate::actions::Actions;
use crate::constants::{SYSTEM_SUBJECT, WILDCARD_SUBJECT};
use crate::types::{EffectiveEntry, Grant, GrantId, GrantedAt, ResourceMeta, Scope};

/// Insertion-ordered map keyed by subject id. Replacing a key moves it to the end.
#[derive(Default)]
struct SubjectMap {
    slots: Vec<Option<EffectiveEntry>>,
    index: HashMap<String, usize>,
}

impl SubjectMap {
    fn replace(&mut self, entry: EffectiveEntry) {
        self.remove(&entry.subject_id);
        self.index.insert(entry.subject_id.clone(), self.slots.len());
        self.slots.push(Some(entry));
    }

    fn remove(&mut self, subject_id: &str) {
        if let Some(i) = self.index.remove(subject_id) {
            self.slots[i] = None;
        }
    }

    fn into_entries(self) -> impl Iterator<Item = EffectiveEntry> {
        self.slots.into_iter().flatten()
    }
}

fn entry_from_grant(g: &Grant, source_scope: Scope) -> EffectiveEntry {
    EffectiveEntry {
        id: g.id.clone(),
        subject_id: g.subject_id.clone(),
        actions: g.actions,
        source_scope,
        granted_at: g.granted_at.map(GrantedAt::At).unwrap_or(GrantedAt::NotApplicable),
        granted_by: g.granted_by.clone(),
        is_owner: false,
        is_system_default: false,
    }
}

// Empty action sets count as "no grant at this tier"; wildcard rows are synthesized only.
#[inline]
fn usable(g: &Grant) -> bool {
    !g.actions.is_empty() && g.subject_id != WILDCARD_SUBJECT
}

/// Synthesized full-access row for the resource owner.
pub fn owner_entry(resource: &ResourceMeta, owner_id: &str, reference_ts: u64) -> EffectiveEntry {
    let at = resource.created_at.or(resource.updated_at).unwrap_or(reference_ts);
    EffectiveEntry {
        id: GrantId::owner(&resource.id),
        subject_id: owner_id.to_string(),
        actions: Actions::ALL,
        source_scope: Scope::Project,
        granted_at: GrantedAt::At(at),
        granted_by: SYSTEM_SUBJECT.to_string(),
        is_owner: true,
        is_system_default: false,
    }
}

/// Synthesized read-only row covering every authenticated subject.
pub fn wildcard_entry() -> EffectiveEntry {
    EffectiveEntry {
        id: GrantId::wildcard(),
        subject_id: WILDCARD_SUBJECT.to_string(),
        actions: Actions::READ,
        source_scope: Scope::Project,
        granted_at: GrantedAt::NotApplicable,
        granted_by: SYSTEM_SUBJECT.to_string(),
        is_owner: false,
        is_system_default: true,
    }
}

/// Resolve the effective permission list of `resource`.
///
/// `reference_ts` is only used as the owner row's timestamp when the resource carries neither a
/// creation nor an update time.
pub fn resolve(
    project_grants: &[Grant],
    environment_grants: &[Grant],
    resource: &ResourceMeta,
    reference_ts: u64,
) -> Vec<EffectiveEntry> {
    let mut map = SubjectMap::default();
    for g in project_grants.iter().filter(|g| usable(g)) {
        map.replace(entry_from_grant(g, Scope::Project));
    }
    for g in environment_grants.iter().filter(|g| usable(g)) {
        map.replace(entry_from_grant(g, Scope::Environment));
    }
    if let Some(owner) = resource.owner_id.as_deref() {
        map.remove(owner);
    }

    let mut out = Vec::with_capacity(map.index.len() + 2);
    if let Some(owner) = resource.owner_id.as_deref() {
        out.push(owner_entry(resource, owner, reference_ts));
    }
    out.push(wildcard_entry());

    let (env, project): (Vec<_>, Vec<_>) = map
        .into_entries()
        .partition(|e| e.source_scope == Scope::Environment);
    out.extend(env);
    out.extend(project);

    debug!(resource = %resource.id, entries = out.len(), "resolved permissions");
    out
}

/// Effective actions of `subject_id` in a resolved list.
///
/// The system-default row applies to every subject, so the result is the subject's own row
/// (if any) plus the wildcard's actions.
pub fn actions_for(entries: &[EffectiveEntry], subject_id: &str) -> Actions {
    entries
        .iter()
        .filter(|e| e.subject_id == subject_id || e.is_system_default)
        .fold(Actions::NONE, |acc, e| acc.union(e.actions))
}

/// Find the row of a concrete subject (never the wildcard).
pub fn entry_for<'a>(entries: &'a [EffectiveEntry], subject_id: &str) -> Option<&'a EffectiveEntry> {
    entries
        .iter()
        .find(|e| !e.is_system_default && e.subject_id == subject_id)
}
