//! Permscope - hierarchical project/environment permission resolution
//!
//! Projects contain environments. Grants issued on a project apply to all of its environments;
//! a grant on an environment replaces (never unions with) the same subject's project grant.
//! Every resolution also carries two synthesized rows: full access for the resource owner and
//! read access for every authenticated subject.

pub mod actions;
pub mod config;
pub mod constants;
pub mod controller;
pub mod db;
pub mod error;
pub mod keys;
pub mod memory;
pub mod mutation;
pub mod resolver;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod view;

#[cfg(feature = "server")]
pub mod server;

pub use actions::Actions;
pub use config::{Config, ConfigError};
pub use controller::Controller;
pub use db::LmdbStore;
pub use error::{Error, ErrorKind, Result, StoreError};
pub use memory::MemoryStore;
pub use mutation::{Mutation, MutationState};
pub use resolver::{actions_for, entry_for, resolve};
pub use snapshot::{fetch, Snapshot};
pub use store::PermissionStore;
pub use types::{
    now_millis, EffectiveEntry, Grant, GrantId, GrantRequest, GrantedAt, Precondition,
    ResourceMeta, Scope, User,
};
pub use view::{EnrichedEntry, PermissionView, Ticket};
