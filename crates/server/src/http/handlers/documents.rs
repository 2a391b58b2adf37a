use axum::{extract::State, http::HeaderMap, Extension, Json};
use domain::criteria::QueryParams;
use domain::query::{parse_populate, ListQuery, Scope};
use domain::{AppError, Collection, Comment, Document, RoomEventKind};
use serde::Serialize;
use storage::{lifecycle_for, CountPolicy, ListPage};

use super::admin::require_admin;
use super::comments::notify;
use crate::error::ApiResult;
use crate::http::extract::{JsonBody, Pairs, PathArg, QueryArgs};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct MutationResponse {
    pub success: bool,
    pub ids: Vec<String>,
}

impl MutationResponse {
    fn from_documents(docs: &[Document]) -> Self {
        Self {
            success: true,
            ids: docs.iter().map(|d| d.id.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    SoftDelete,
    Restore,
    HardDestroy,
}

pub(crate) async fn list_in_scope(
    state: &AppState,
    collection: Collection,
    scope: Scope,
    pairs: Vec<(String, String)>,
) -> ApiResult<ListPage> {
    let params = QueryParams::from_pairs(pairs);
    let query = ListQuery::from_params(collection, scope, &params)?;
    Ok(state
        .db
        .list(&query, CountPolicy::DegradeToZero, state.count_timeout)
        .await?)
}

pub async fn list(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    QueryArgs(pairs): Pairs,
) -> ApiResult<Json<ListPage>> {
    Ok(Json(list_in_scope(&state, collection, Scope::Active, pairs).await?))
}

pub async fn trash(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    headers: HeaderMap,
    QueryArgs(pairs): Pairs,
) -> ApiResult<Json<ListPage>> {
    require_admin(&headers, &state.admin_token)?;
    Ok(Json(
        list_in_scope(&state, collection, Scope::Tombstoned, pairs).await?,
    ))
}

pub async fn find_by_id(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    PathArg(id): PathArg<String>,
    QueryArgs(pairs): Pairs,
) -> ApiResult<Json<Document>> {
    let params = QueryParams::from_pairs(pairs);
    let populate = match params.get("populate") {
        Some(spec) => parse_populate(collection, spec)?,
        None => Vec::new(),
    };
    state
        .db
        .find_document(collection, &id, &populate)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("{} {}", collection, id)).into())
}

pub async fn find_by_slug(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    PathArg(slug): PathArg<String>,
    QueryArgs(pairs): Pairs,
) -> ApiResult<Json<Document>> {
    let params = QueryParams::from_pairs(pairs);
    let populate = match params.get("populate") {
        Some(spec) => parse_populate(collection, spec)?,
        None => Vec::new(),
    };
    state
        .db
        .find_by_slug(collection, &slug, &populate)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("{} with slug {}", collection, slug)).into())
}

async fn transition(
    state: &AppState,
    collection: Collection,
    step: Transition,
    ids: &[String],
) -> ApiResult<Vec<Document>> {
    let lifecycle = lifecycle_for(&state.db, collection);
    let changed = match step {
        Transition::SoftDelete => lifecycle.soft_delete(ids).await?,
        Transition::Restore => lifecycle.restore(ids).await?,
        Transition::HardDestroy => lifecycle.hard_destroy(ids).await?,
    };

    if collection == Collection::Comments {
        for doc in &changed {
            let was_visible = match step {
                Transition::SoftDelete => true,
                Transition::HardDestroy => !doc.is_tombstoned(),
                Transition::Restore => false,
            };
            if !was_visible {
                continue;
            }
            match Comment::try_from(doc.clone()) {
                Ok(comment) => notify(state, RoomEventKind::CommentDeleted, comment).await,
                Err(e) => tracing::warn!("Comment {} not announced: {}", doc.id, e),
            }
        }
    }
    Ok(changed)
}

async fn transition_one(
    state: &AppState,
    collection: Collection,
    step: Transition,
    id: String,
) -> ApiResult<Json<MutationResponse>> {
    let changed = transition(state, collection, step, &[id.clone()]).await?;
    if changed.is_empty() {
        return Err(AppError::not_found(format!("{} {}", collection, id)).into());
    }
    Ok(Json(MutationResponse::from_documents(&changed)))
}

async fn transition_many(
    state: &AppState,
    collection: Collection,
    step: Transition,
    ids: Vec<String>,
) -> ApiResult<Json<MutationResponse>> {
    let changed = transition(state, collection, step, &ids).await?;
    Ok(Json(MutationResponse::from_documents(&changed)))
}

pub async fn soft_delete_one(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    headers: HeaderMap,
    PathArg(id): PathArg<String>,
) -> ApiResult<Json<MutationResponse>> {
    require_admin(&headers, &state.admin_token)?;
    transition_one(&state, collection, Transition::SoftDelete, id).await
}

pub async fn soft_delete_many(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    headers: HeaderMap,
    JsonBody(ids): JsonBody<Vec<String>>,
) -> ApiResult<Json<MutationResponse>> {
    require_admin(&headers, &state.admin_token)?;
    transition_many(&state, collection, Transition::SoftDelete, ids).await
}

pub async fn restore_one(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    headers: HeaderMap,
    PathArg(id): PathArg<String>,
) -> ApiResult<Json<MutationResponse>> {
    require_admin(&headers, &state.admin_token)?;
    transition_one(&state, collection, Transition::Restore, id).await
}

pub async fn restore_many(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    headers: HeaderMap,
    JsonBody(ids): JsonBody<Vec<String>>,
) -> ApiResult<Json<MutationResponse>> {
    require_admin(&headers, &state.admin_token)?;
    transition_many(&state, collection, Transition::Restore, ids).await
}

pub async fn destroy_one(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    headers: HeaderMap,
    PathArg(id): PathArg<String>,
) -> ApiResult<Json<MutationResponse>> {
    require_admin(&headers, &state.admin_token)?;
    transition_one(&state, collection, Transition::HardDestroy, id).await
}

pub async fn destroy_many(
    State(state): State<AppState>,
    Extension(collection): Extension<Collection>,
    headers: HeaderMap,
    JsonBody(ids): JsonBody<Vec<String>>,
) -> ApiResult<Json<MutationResponse>> {
    require_admin(&headers, &state.admin_token)?;
    transition_many(&state, collection, Transition::HardDestroy, ids).await
}
