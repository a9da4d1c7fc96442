//! Grant records, resolver output, and resource metadata

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::actions::Actions;
use crate::constants::{OWNER_ID_PREFIX, WILDCARD_SUBJECT};
use crate::error::{Error, Result};

/// Resource tier a grant was issued at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Project,
    Environment,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Project => "project",
            Scope::Environment => "environment",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "project" => Ok(Scope::Project),
            "environment" => Ok(Scope::Environment),
            other => Err(Error::InvalidArgument(format!("unknown scope '{}'", other))),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque permission identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(pub String);

impl GrantId {
    /// Id of the synthesized owner entry for a resource.
    pub fn owner(resource_id: &str) -> Self {
        GrantId(format!("{}{}", OWNER_ID_PREFIX, resource_id))
    }

    /// Id of the synthesized system-default entry.
    pub fn wildcard() -> Self {
        GrantId(WILDCARD_SUBJECT.to_string())
    }

    pub fn is_owner(&self) -> bool {
        self.0.starts_with(OWNER_ID_PREFIX)
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD_SUBJECT
    }

    /// Synthesized ids never correspond to a store row.
    pub fn is_synthesized(&self) -> bool {
        self.is_owner() || self.is_wildcard()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GrantId {
    fn from(s: &str) -> Self {
        GrantId(s.to_string())
    }
}

/// An explicit permission record as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub subject_id: String,
    pub scope: Scope,
    pub resource_id: String,
    pub actions: Actions,
    /// Epoch millis. Absent for system-synthesized grants.
    pub granted_at: Option<u64>,
    pub granted_by: String,
}

/// Write request for an upsert of one `(subject, scope, resource)` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRequest {
    pub subject_id: String,
    pub scope: Scope,
    pub resource_id: String,
    pub actions: Actions,
    pub granted_by: String,
    pub granted_at: u64,
}

/// Optimistic write guard: the write only commits if the resource's revision is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Precondition {
    pub scope: Scope,
    pub resource_id: String,
    pub revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "at")]
pub enum GrantedAt {
    At(u64),
    NotApplicable,
}

/// Resolver output row for one subject against one target resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveEntry {
    pub id: GrantId,
    pub subject_id: String,
    pub actions: Actions,
    pub source_scope: Scope,
    pub granted_at: GrantedAt,
    pub granted_by: String,
    pub is_owner: bool,
    pub is_system_default: bool,
}

impl EffectiveEntry {
    /// Owner and system-default rows can never be revoked.
    pub fn is_revocable(&self) -> bool {
        !self.is_owner && !self.is_system_default
    }
}

/// Metadata of a project or environment; owner and timestamps feed the synthesized rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub id: String,
    pub scope: Scope,
    /// Project an environment belongs to. `None` for projects.
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<u64>,
}

impl ResourceMeta {
    pub fn project(id: impl Into<String>) -> Self {
        ResourceMeta {
            id: id.into(),
            scope: Scope::Project,
            parent_id: None,
            owner_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn environment(id: impl Into<String>, project_id: impl Into<String>) -> Self {
        ResourceMeta {
            id: id.into(),
            scope: Scope::Environment,
            parent_id: Some(project_id.into()),
            owner_id: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_created_at(mut self, at: u64) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn with_updated_at(mut self, at: u64) -> Self {
        self.updated_at = Some(at);
        self
    }

    pub fn is_owner(&self, subject_id: &str) -> bool {
        self.owner_id.as_deref() == Some(subject_id)
    }
}

/// Display data for a subject; not used by resolution itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Current time in epoch millis
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
