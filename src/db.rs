//! LMDB-backed permission store

use std::path::Path;

use byteorder::BigEndian;
use heed::types::{Bytes, Str, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{err, StoreError};
use crate::keys::{grant_row_key, resource_key, subject_key};
use crate::store::{new_grant_id, PermissionStore};
use crate::types::{Grant, GrantId, GrantRequest, Precondition, ResourceMeta, Scope, User};

// Database type aliases
type DbJson = Database<Bytes, Bytes>;
type DbCounter = Database<Bytes, U64<BigEndian>>;
type DbByName = Database<Str, Bytes>;

const NEXT_SEQ: &str = "next_seq";

/// All database handles
struct Dbs {
    /// [scope][resource][seq] -> Grant
    grants: DbJson,
    /// [scope][resource][subject] -> seq
    by_subject: DbCounter,
    /// grant id -> grant row key
    by_id: DbByName,
    /// [scope][resource] -> ResourceMeta
    resources: DbJson,
    /// [scope][resource] -> revision
    revisions: DbCounter,
    /// user id -> User
    users: DbByName,
    meta: Database<Str, U64<BigEndian>>,
}

fn encode<T: Serialize>(v: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(v).map_err(err)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(err)
}

impl Dbs {
    fn revision(&self, tx: &RoTxn, scope: Scope, resource_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .revisions
            .get(tx, &resource_key(scope, resource_id)?)
            .map_err(err)?
            .unwrap_or(0))
    }

    fn bump(&self, tx: &mut RwTxn, scope: Scope, resource_id: &str) -> Result<(), StoreError> {
        let k = resource_key(scope, resource_id)?;
        let next = self.revisions.get(tx, &k).map_err(err)?.unwrap_or(0) + 1;
        self.revisions.put(tx, &k, &next).map_err(err)
    }

    fn check(&self, tx: &RoTxn, expected: &[Precondition]) -> Result<(), StoreError> {
        for p in expected {
            if self.revision(tx, p.scope, &p.resource_id)? != p.revision {
                return Err(StoreError::Conflict);
            }
        }
        Ok(())
    }

    fn next_seq(&self, tx: &mut RwTxn) -> Result<u64, StoreError> {
        let seq = self.meta.get(tx, NEXT_SEQ).map_err(err)?.unwrap_or(1);
        self.meta.put(tx, NEXT_SEQ, &(seq + 1)).map_err(err)?;
        Ok(seq)
    }
}

/// Persistent store on a single LMDB environment. Writes are serialized by LMDB's single
/// writer, so a revision check and the write it guards are always atomic.
pub struct LmdbStore {
    env: Env,
    dbs: Dbs,
}

impl LmdbStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl AsRef<Path>, map_size: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other processes access this path concurrently during open.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(7)
                .open(path)
                .map_err(err)?
        };
        let mut tx = env.write_txn().map_err(err)?;
        let dbs = Dbs {
            grants: env.create_database(&mut tx, Some("grants")).map_err(err)?,
            by_subject: env.create_database(&mut tx, Some("by_subject")).map_err(err)?,
            by_id: env.create_database(&mut tx, Some("by_id")).map_err(err)?,
            resources: env.create_database(&mut tx, Some("resources")).map_err(err)?,
            revisions: env.create_database(&mut tx, Some("revisions")).map_err(err)?,
            users: env.create_database(&mut tx, Some("users")).map_err(err)?,
            meta: env.create_database(&mut tx, Some("meta")).map_err(err)?,
        };
        tx.commit().map_err(err)?;
        info!(path = %path.display(), "opened permission store");
        Ok(LmdbStore { env, dbs })
    }

    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        Self::open(&config.db_path, config.map_size)
    }

    fn read<T, F: FnOnce(&Dbs, &RoTxn) -> Result<T, StoreError>>(&self, f: F) -> Result<T, StoreError> {
        f(&self.dbs, &self.env.read_txn().map_err(err)?)
    }

    fn write<T, F: FnOnce(&Dbs, &mut RwTxn) -> Result<T, StoreError>>(&self, f: F) -> Result<T, StoreError> {
        let mut tx = self.env.write_txn().map_err(err)?;
        let r = f(&self.dbs, &mut tx)?;
        tx.commit().map_err(err)?;
        Ok(r)
    }

    /// Register or update resource metadata. Bumps the resource's revision.
    pub fn put_resource(&self, meta: &ResourceMeta) -> Result<(), StoreError> {
        self.write(|d, tx| {
            d.resources
                .put(tx, &resource_key(meta.scope, &meta.id)?, &encode(meta)?)
                .map_err(err)?;
            d.bump(tx, meta.scope, &meta.id)
        })
    }

    pub fn put_user(&self, user: &User) -> Result<(), StoreError> {
        self.write(|d, tx| d.users.put(tx, &user.id, &encode(user)?).map_err(err))
    }
}

impl PermissionStore for LmdbStore {
    fn resource(&self, scope: Scope, resource_id: &str) -> Result<ResourceMeta, StoreError> {
        self.read(|d, tx| {
            let bytes = d
                .resources
                .get(tx, &resource_key(scope, resource_id)?)
                .map_err(err)?
                .ok_or(StoreError::NotFound)?;
            decode(bytes)
        })
    }

    fn revision(&self, scope: Scope, resource_id: &str) -> Result<u64, StoreError> {
        self.read(|d, tx| d.revision(tx, scope, resource_id))
    }

    fn list_grants(&self, scope: Scope, resource_id: &str) -> Result<Vec<Grant>, StoreError> {
        self.read(|d, tx| {
            let mut r = Vec::new();
            for item in d.grants.prefix_iter(tx, &resource_key(scope, resource_id)?).map_err(err)? {
                let (_, v) = item.map_err(err)?;
                r.push(decode(v)?);
            }
            Ok(r)
        })
    }

    fn list_users_by_ids(&self, ids: &[String]) -> Result<Vec<User>, StoreError> {
        self.read(|d, tx| {
            let mut r = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(bytes) = d.users.get(tx, id).map_err(err)? {
                    r.push(decode(bytes)?);
                }
            }
            Ok(r)
        })
    }

    fn create_or_replace_grant(
        &self,
        request: &GrantRequest,
        expected: &[Precondition],
    ) -> Result<Grant, StoreError> {
        let (scope, resource) = (request.scope, request.resource_id.as_str());
        let grant = self.write(|d, tx| {
            d.check(tx, expected)?;
            let skey = subject_key(scope, resource, &request.subject_id)?;
            let grant = match d.by_subject.get(tx, &skey).map_err(err)? {
                Some(seq) => {
                    let row = grant_row_key(scope, resource, seq)?;
                    let bytes = d
                        .grants
                        .get(tx, &row)
                        .map_err(err)?
                        .ok_or_else(|| StoreError::Backend("dangling subject index".into()))?;
                    let mut g: Grant = decode(bytes)?;
                    g.actions = request.actions;
                    g.granted_at = Some(request.granted_at);
                    g.granted_by = request.granted_by.clone();
                    d.grants.put(tx, &row, &encode(&g)?).map_err(err)?;
                    g
                }
                None => {
                    let seq = d.next_seq(tx)?;
                    let row = grant_row_key(scope, resource, seq)?;
                    let g = Grant {
                        id: new_grant_id()?,
                        subject_id: request.subject_id.clone(),
                        scope,
                        resource_id: resource.to_string(),
                        actions: request.actions,
                        granted_at: Some(request.granted_at),
                        granted_by: request.granted_by.clone(),
                    };
                    d.grants.put(tx, &row, &encode(&g)?).map_err(err)?;
                    d.by_subject.put(tx, &skey, &seq).map_err(err)?;
                    d.by_id.put(tx, g.id.as_str(), &row).map_err(err)?;
                    g
                }
            };
            d.bump(tx, scope, resource)?;
            Ok(grant)
        })?;
        debug!(id = %grant.id, subject = %grant.subject_id, "lmdb store upserted grant");
        Ok(grant)
    }

    fn delete_grant(&self, id: &GrantId, expected: &[Precondition]) -> Result<(), StoreError> {
        self.write(|d, tx| {
            let row = d
                .by_id
                .get(tx, id.as_str())
                .map_err(err)?
                .ok_or(StoreError::NotFound)?
                .to_vec();
            d.check(tx, expected)?;
            let bytes = d.grants.get(tx, &row).map_err(err)?.ok_or(StoreError::NotFound)?;
            let g: Grant = decode(bytes)?;
            d.grants.delete(tx, &row).map_err(err)?;
            d.by_subject
                .delete(tx, &subject_key(g.scope, &g.resource_id, &g.subject_id)?)
                .map_err(err)?;
            d.by_id.delete(tx, id.as_str()).map_err(err)?;
            d.bump(tx, g.scope, &g.resource_id)
        })?;
        debug!(id = %id, "lmdb store deleted grant");
        Ok(())
    }
}
