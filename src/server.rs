//! REST adapter over the controller.
//!
//! Endpoints:
//!   GET    /health
//!   PUT    /resources/:scope/:id                      - register resource metadata
//!   PUT    /users/:id                                 - register display data
//!   GET    /resources/:scope/:id/permissions          - enriched effective list
//!   POST   /resources/:scope/:id/grants               - grant (upsert)
//!   DELETE /resources/:scope/:id/grants/:grant_id     - revoke (?actor=...)

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::actions::Actions;
use crate::controller::Controller;
use crate::db::LmdbStore;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{Grant, GrantId, ResourceMeta, Scope, User};
use crate::view::EnrichedEntry;

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller<Arc<LmdbStore>>>,
}

impl AppState {
    pub fn new(controller: Controller<Arc<LmdbStore>>) -> Self {
        AppState { controller: Arc::new(controller) }
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ResourceReq {
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<u64>,
    #[serde(default)]
    pub updated_at: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct UserReq {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GrantReq {
    pub actor: String,
    pub subject: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor: String,
}

#[derive(Debug, Serialize)]
struct HealthRes {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub kind: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None, kind: None }
    }

    fn err(e: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(e.to_string()),
            kind: Some(e.kind().as_str().to_string()),
        }
    }
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

// ============================================================================
// Helpers
// ============================================================================

pub fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized | ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn reply<T>(r: Result<T>) -> Reply<T> {
    match r {
        Ok(v) => (StatusCode::OK, Json(ApiResponse::ok(v))),
        Err(e) => (status_of(e.kind()), Json(ApiResponse::err(&e))),
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthRes> {
    Json(HealthRes { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

async fn put_resource(
    State(state): State<AppState>,
    Path((scope, id)): Path<(String, String)>,
    Json(req): Json<ResourceReq>,
) -> Reply<ResourceMeta> {
    reply(Scope::parse(&scope).and_then(|scope| {
        if scope == Scope::Environment && req.parent_id.is_none() {
            return Err(Error::InvalidArgument("environment requires parent_id".into()));
        }
        let meta = ResourceMeta {
            id,
            scope,
            parent_id: req.parent_id,
            owner_id: req.owner_id,
            created_at: req.created_at,
            updated_at: req.updated_at,
        };
        state.controller.store().put_resource(&meta)?;
        state.controller.view().invalidate_tree(meta.scope, &meta.id);
        Ok(meta)
    }))
}

async fn put_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UserReq>,
) -> Reply<User> {
    let user = User { id, name: req.name, email: req.email };
    reply(state.controller.store().put_user(&user).map(|_| user).map_err(Error::from))
}

async fn get_permissions(
    State(state): State<AppState>,
    Path((scope, id)): Path<(String, String)>,
) -> Reply<Vec<EnrichedEntry>> {
    reply(Scope::parse(&scope).and_then(|scope| state.controller.resolve_enriched(scope, &id)))
}

async fn post_grant(
    State(state): State<AppState>,
    Path((scope, id)): Path<(String, String)>,
    Json(req): Json<GrantReq>,
) -> Reply<Grant> {
    reply(Scope::parse(&scope).and_then(|scope| {
        let actions = Actions::parse(&req.actions)?;
        state.controller.grant(&req.actor, &req.subject, scope, &id, actions)
    }))
}

async fn delete_grant(
    State(state): State<AppState>,
    Path((scope, id, grant_id)): Path<(String, String, String)>,
    Query(q): Query<ActorQuery>,
) -> Reply<()> {
    reply(Scope::parse(&scope).and_then(|scope| {
        state.controller.revoke(&q.actor, &GrantId(grant_id), scope, &id)
    }))
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/resources/:scope/:id", put(put_resource))
        .route("/users/:id", put(put_user))
        .route("/resources/:scope/:id/permissions", get(get_permissions))
        .route("/resources/:scope/:id/grants", post(post_grant))
        .route("/resources/:scope/:id/grants/:grant_id", delete(delete_grant))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
