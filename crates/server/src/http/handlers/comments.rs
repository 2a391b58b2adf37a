use axum::{extract::State, http::StatusCode, Json};
use domain::criteria::{Condition, QueryParams};
use domain::query::{ListQuery, Scope};
use domain::{
    AppError, Comment, CommentEdit, CommentView, NewComment, NewReply, RoomEvent, RoomEventKind,
};
use storage::{CountPolicy, ListPage, Visibility};

use crate::error::ApiResult;
use crate::http::extract::{JsonBody, Pairs, PathArg, QueryArgs};
use crate::state::AppState;

const THREAD_POPULATE: &str = "authorRef,replyIds,replyIds.authorRef";

/// Announces a change that is already stored. A failure here never fails
/// the request.
pub(crate) async fn notify(state: &AppState, kind: RoomEventKind, comment: Comment) {
    match state.db.comment_view(comment).await {
        Ok(view) => {
            state.rooms.publish(RoomEvent::new(kind, view));
        }
        Err(e) => tracing::warn!("{} not published: {:#}", kind.as_str(), e),
    }
}

async fn announce(
    state: &AppState,
    kind: RoomEventKind,
    comment: Comment,
) -> ApiResult<CommentView> {
    let view = state.db.comment_view(comment).await?;
    state.rooms.publish(RoomEvent::new(kind, view.clone()));
    Ok(view)
}

pub async fn create_comment(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<NewComment>,
) -> ApiResult<(StatusCode, Json<CommentView>)> {
    let comment = payload.into_comment()?;
    state.db.insert_comment(&comment).await?;
    tracing::info!("Comment {} created on article {}", comment.id, comment.article_ref);

    let view = announce(&state, RoomEventKind::CommentCreated, comment).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn create_reply(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<NewReply>,
) -> ApiResult<(StatusCode, Json<CommentView>)> {
    let reply = payload.into_comment()?;
    let root_id = reply.root_ref.clone().unwrap_or_default();

    let root = state
        .db
        .get_comment(&root_id, Visibility::Active)
        .await?
        .ok_or_else(|| AppError::not_found(format!("root comment {}", root_id)))?;
    if !root.is_root() {
        return Err(AppError::validation("replies attach to root comments only").into());
    }
    if root.article_ref != reply.article_ref {
        return Err(AppError::validation("reply and root belong to different articles").into());
    }

    state.db.insert_reply(&reply).await?;
    tracing::info!("Reply {} added to thread {}", reply.id, root_id);

    let view = announce(&state, RoomEventKind::ReplyCreated, reply).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn update_comment(
    State(state): State<AppState>,
    PathArg(id): PathArg<String>,
    JsonBody(payload): JsonBody<CommentEdit>,
) -> ApiResult<Json<CommentView>> {
    let content = payload.content()?;
    let comment = state
        .db
        .update_comment_content(&id, &content)
        .await?
        .ok_or_else(|| AppError::not_found(format!("comment {}", id)))?;

    let view = announce(&state, RoomEventKind::CommentUpdated, comment).await?;
    Ok(Json(view))
}

/// Root comments of one article with authors and replies expanded.
pub async fn article_thread(
    State(state): State<AppState>,
    PathArg(article_id): PathArg<String>,
    QueryArgs(pairs): Pairs,
) -> ApiResult<Json<ListPage>> {
    let params = QueryParams::from_pairs(pairs);
    let query = ListQuery::from_params(domain::Collection::Comments, Scope::Active, &params)?
        .with_condition(Condition::eq("articleRef", article_id))
        .with_condition(Condition::is_null("rootRef"))
        .populated(Some(THREAD_POPULATE))?;

    Ok(Json(
        state
            .db
            .list(&query, CountPolicy::DegradeToZero, state.count_timeout)
            .await?,
    ))
}
