use super::handlers::{comments, documents, sse};
use crate::state::AppState;
use axum::{
    http::{HeaderValue, Method},
    routing::{get, patch, post},
    Extension, Router,
};
use domain::Collection;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

fn cors_layer(allowed_origins: &str) -> CorsLayer {
    if allowed_origins == "*" {
        return CorsLayer::new()
            .allow_methods(METHODS)
            .allow_origin(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        tracing::warn!("CORS config is invalid or empty, falling back to allow ANY.");
        CorsLayer::new()
            .allow_methods(METHODS)
            .allow_origin(Any)
            .allow_headers(Any)
    } else {
        tracing::info!("CORS enabled for origins: {:?}", origins);
        CorsLayer::new()
            .allow_methods(METHODS)
            .allow_origin(origins)
            .allow_headers(Any)
    }
}

/// Routes shared by every collection, mounted under `/api/<collection>`.
fn collection_routes(collection: Collection) -> Router<AppState> {
    let is_comments = collection == Collection::Comments;

    let mut root = get(documents::list)
        .patch(documents::soft_delete_many)
        .delete(documents::destroy_many);
    let mut by_id = get(documents::find_by_id)
        .patch(documents::soft_delete_one)
        .delete(documents::destroy_one);
    if is_comments {
        root = root.post(comments::create_comment);
        by_id = by_id.put(comments::update_comment);
    }

    let mut router = Router::new()
        .route("/", root)
        .route("/trash", get(documents::trash))
        .route("/restore", patch(documents::restore_many))
        .route("/restore/:id", patch(documents::restore_one))
        .route("/:id", by_id);

    if collection.has_slug() {
        router = router.route("/slug/:slug", get(documents::find_by_slug));
    }
    if is_comments {
        router = router
            .route("/reply", post(comments::create_reply))
            .route("/article/:article_id", get(comments::article_thread));
    }
    router.layer(Extension(collection))
}

pub fn build_router(state: AppState, allowed_origins: &str) -> Router {
    let mut router = Router::new().route("/api/rooms/:article_id/events", get(sse::room_events));
    for collection in Collection::ALL {
        router = router.nest(&format!("/api/{}", collection), collection_routes(collection));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::RoomHub;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use domain::{Document, RoomEventKind};
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use storage::Db;
    use tower::ServiceExt;

    const TOKEN: &str = "test-admin";

    async fn test_state() -> AppState {
        AppState {
            db: Db::new("sqlite::memory:", 1).await.unwrap(),
            rooms: RoomHub::new(16),
            admin_token: TOKEN.to_string(),
            count_timeout: Duration::from_secs(5),
        }
    }

    async fn seed(db: &Db, collection: Collection, value: Value) -> Document {
        let Value::Object(body) = value else {
            panic!("seed body must be an object")
        };
        let doc = Document::new(body);
        db.insert_document(collection, &doc).await.unwrap();
        doc
    }

    fn request(method: &str, uri: &str, body: Option<Value>, admin: bool) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if admin {
            builder = builder.header("Authorization", format!("Bearer {}", TOKEN));
        }
        match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_list_returns_page_and_total() {
        let state = test_state().await;
        for title in ["one", "two", "three"] {
            seed(&state.db, Collection::Articles, json!({ "title": title })).await;
        }
        let app = build_router(state, "*");

        let (status, body) = send(&app, request("GET", "/api/articles?limit=2", None, false)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 3);
        assert_eq!(body["items"].as_array().unwrap().len(), 2);

        let (status, body) =
            send(&app, request("GET", "/api/articles?search=TWO", None, false)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["items"][0]["title"], "two");
    }

    #[tokio::test]
    async fn test_bad_query_is_a_validation_error() {
        let app = build_router(test_state().await, "*");
        let (status, body) =
            send(&app, request("GET", "/api/articles?populate=nope", None, false)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_get_by_id_and_slug() {
        let state = test_state().await;
        let page = seed(&state.db, Collection::Pages, json!({ "title": "About", "slug": "about" })).await;
        let app = build_router(state, "*");

        let (status, body) =
            send(&app, request("GET", &format!("/api/pages/{}", page.id), None, false)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "About");

        let (status, body) = send(&app, request("GET", "/api/pages/slug/about", None, false)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], page.id);

        let (status, _) = send(&app, request("GET", "/api/pages/missing", None, false)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_lifecycle_endpoints_need_admin_token() {
        let state = test_state().await;
        let tag = seed(&state.db, Collection::Tags, json!({ "name": "rust" })).await;
        let app = build_router(state, "*");
        let uri = format!("/api/tags/{}", tag.id);

        let (status, body) = send(&app, request("PATCH", &uri, None, false)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        let (status, _) = send(&app, request("GET", "/api/tags/trash", None, false)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(&app, request("PATCH", &uri, None, true)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "ids": [tag.id] }));

        let (status, body) = send(&app, request("GET", "/api/tags/trash", None, true)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        // already tombstoned
        let (status, _) = send(&app, request("PATCH", &uri, None, true)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            request("PATCH", "/api/tags/restore", Some(json!([tag.id, "ghost"])), true),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ids"], json!([tag.id]));

        let (status, _) = send(&app, request("DELETE", &uri, None, true)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, request("GET", &uri, None, false)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_comment_thread_flow_reaches_the_room() {
        let state = test_state().await;
        let alice = seed(&state.db, Collection::Users, json!({ "username": "alice" })).await;
        let mut room = state.rooms.join("A1");
        let mut other_room = state.rooms.join("A2");
        let app = build_router(state, "*");

        let (status, root) = send(
            &app,
            request(
                "POST",
                "/api/comments",
                Some(json!({
                    "authorRef": alice.id,
                    "articleRef": "A1",
                    "articleAuthorRef": alice.id,
                    "content": "  first!  ",
                })),
                false,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(root["content"], "first!");
        assert_eq!(root["author"]["username"], "alice");
        let root_id = root["id"].as_str().unwrap().to_string();

        let (status, reply) = send(
            &app,
            request(
                "POST",
                "/api/comments/reply",
                Some(json!({
                    "authorRef": alice.id,
                    "articleRef": "A1",
                    "articleAuthorRef": alice.id,
                    "content": "second",
                    "rootRef": root_id,
                })),
                false,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let reply_id = reply["id"].as_str().unwrap().to_string();

        let (status, thread) =
            send(&app, request("GET", "/api/comments/article/A1", None, false)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(thread["count"], 1);
        assert_eq!(thread["items"][0]["replyIds"][0]["id"], reply_id);
        assert_eq!(thread["items"][0]["replyIds"][0]["authorRef"]["username"], "alice");

        let (status, _) = send(
            &app,
            request(
                "PUT",
                &format!("/api/comments/{}", reply_id),
                Some(json!({ "content": "edited" })),
                false,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            request("PATCH", &format!("/api/comments/{}", root_id), None, true),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, thread) = send(&app, request("GET", "/api/comments/article/A1", None, false)).await;
        assert_eq!(thread["count"], 0);

        let mut kinds = Vec::new();
        for _ in 0..4 {
            let event = tokio::time::timeout(Duration::from_secs(1), room.next())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(event.room, "A1");
            kinds.push(event.kind);
        }
        assert_eq!(
            kinds,
            vec![
                RoomEventKind::CommentCreated,
                RoomEventKind::ReplyCreated,
                RoomEventKind::CommentUpdated,
                RoomEventKind::CommentDeleted,
            ]
        );
        assert!(tokio::time::timeout(Duration::from_millis(50), other_room.next())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_reply_requires_an_active_root() {
        let state = test_state().await;
        let app = build_router(state, "*");
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/comments/reply",
                Some(json!({
                    "authorRef": "u1",
                    "articleRef": "A1",
                    "articleAuthorRef": "u1",
                    "content": "hello?",
                    "rootRef": "missing",
                })),
                false,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/comments",
                Some(json!({
                    "authorRef": "u1",
                    "articleRef": "A1",
                    "articleAuthorRef": "u1",
                    "content": "   ",
                })),
                false,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_bodies_answer_with_the_error_shape() {
        let app = build_router(test_state().await, "*");

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/comments",
                Some(json!({
                    "authorRef": "u1",
                    "articleRef": "A1",
                    "articleAuthorRef": "u1",
                })),
                false,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("content"));

        let (status, body) = send(
            &app,
            request("PATCH", "/api/tags", Some(json!({ "ids": [1] })), true),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_failed_listing_is_an_internal_error() {
        let state = test_state().await;
        let db = state.db.clone();
        let app = build_router(state, "*");
        db.close().await;

        let (status, body) = send(&app, request("GET", "/api/articles", None, false)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "success": false, "error": "internal server error" }));
    }
}
