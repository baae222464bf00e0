pub mod chat;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod reactions;
pub mod replies;
pub mod state;
pub mod threads;
pub mod users;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

pub use error::{ApiError, ApiResult};
pub use state::{AppState, AppStateInner};

/// Every `/api` route, behind bearer-token auth.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/me", get(users::get_me).patch(users::update_me))
        .route("/api/threads/categories", get(threads::list_categories))
        .route("/api/threads", get(threads::list_threads).post(threads::create_thread))
        .route("/api/threads/{thread_id}", get(threads::get_thread))
        .route(
            "/api/threads/{thread_id}/replies",
            get(replies::list_replies).post(replies::create_reply),
        )
        .route("/api/replies/{reply_id}", delete(replies::delete_reply))
        .route(
            "/api/threads/{thread_id}/like",
            post(reactions::like_thread).delete(reactions::unlike_thread),
        )
        .route("/api/notifications", get(notifications::list_notifications))
        .route("/api/notifications/read-all", post(notifications::mark_all_read))
        .route("/api/notifications/{notification_id}/read", post(notifications::mark_read))
        .route("/api/chat/users", get(chat::list_users))
        .route(
            "/api/chat/conversations/{other_user_id}/messages",
            get(chat::conversation),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agora_db::Database;
    use agora_gateway::{GatewayContext, GatewaySettings, JwtIdentityVerifier};
    use agora_types::api::IdentityClaims;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    const SECRET: &str = "api-test-secret";

    fn app() -> (Router, GatewayContext) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ctx = GatewayContext::new(
            db,
            Arc::new(JwtIdentityVerifier::new(SECRET)),
            GatewaySettings::default(),
        );
        (router(AppStateInner::from_gateway(&ctx)), ctx)
    }

    fn token(sub: &str, name: &str) -> String {
        let claims = IdentityClaims {
            sub: sub.to_string(),
            name: Some(name.to_string()),
            picture: None,
            exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn call(app: &Router, method: &str, uri: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        let body = match body {
            Some(json) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    async fn create_thread(app: &Router, token: &str) -> i64 {
        let (status, body) = call(
            app,
            "POST",
            "/api/threads",
            token,
            Some(json!({ "title": "Composting 101", "body": "Greens, browns, and patience.", "categorySlug": "general" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["data"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn missing_or_bad_token_is_unauthorized() {
        let (app, _) = app();
        let res = app
            .clone()
            .oneshot(Request::builder().uri("/api/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, "GET", "/api/me", "garbage", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["status"], 401);
    }

    #[tokio::test]
    async fn profile_update_and_handle_conflict() {
        let (app, _) = app();
        let ada = token("idp_ada", "Ada");
        let bob = token("idp_bob", "Bob");

        let (status, body) = call(&app, "PATCH", "/api/me", &ada, Some(json!({ "handle": "ada", "bio": "hi" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["handle"], "ada");
        assert_eq!(body["data"]["displayName"], "Ada");

        let (status, _) = call(&app, "PATCH", "/api/me", &bob, Some(json!({ "handle": "ada" }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn thread_lifecycle_with_like_and_reply() {
        let (app, ctx) = app();
        let author = token("idp_author", "Author");
        let fan = token("idp_fan", "Fan");
        let thread_id = create_thread(&app, &author).await;

        let (status, body) = call(&app, "POST", &format!("/api/threads/{}/like", thread_id), &fan, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!({ "liked": true, "likeCount": 1 }));

        let (status, _) = call(&app, "POST", &format!("/api/threads/{}/like", thread_id), &fan, None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, reply) = call(
            &app,
            "POST",
            &format!("/api/threads/{}/replies", thread_id),
            &fan,
            Some(json!({ "body": "Great post" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, details) = call(&app, "GET", &format!("/api/threads/{}", thread_id), &fan, None).await;
        assert_eq!(details["data"]["likeCount"], 1);
        assert_eq!(details["data"]["replyCount"], 1);
        assert_eq!(details["data"]["viewerHasLiked"], true);

        let (_, notes) = call(&app, "GET", "/api/notifications?unreadOnly=true", &author, None).await;
        let kinds: Vec<&str> = notes["data"].as_array().unwrap().iter().map(|n| n["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["REPLY_ON_THREAD", "LIKE_ON_THREAD"]);

        let reply_id = reply["data"]["id"].as_i64().unwrap();
        let (status, _) = call(&app, "DELETE", &format!("/api/replies/{}", reply_id), &author, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(&app, "DELETE", &format!("/api/replies/{}", reply_id), &fan, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&app, "DELETE", &format!("/api/threads/{}/like", thread_id), &fan, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["likeCount"], 0);

        assert_eq!(ctx.dispatcher.connection_count(), 0);
    }

    #[tokio::test]
    async fn thread_validation_and_lookup_errors() {
        let (app, _) = app();
        let ada = token("idp_ada", "Ada");

        let (status, _) = call(
            &app,
            "POST",
            "/api/threads",
            &ada,
            Some(json!({ "title": "Hey", "body": "Too short title here", "categorySlug": "general" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/api/threads",
            &ada,
            Some(json!({ "title": "Valid title", "body": "A body long enough.", "categorySlug": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", "/api/threads/0", &ada, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(&app, "GET", "/api/threads/999", &ada, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "POST", "/api/threads/999/like", &ada, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_mark_read() {
        let (app, _) = app();
        let author = token("idp_author", "Author");
        let fan = token("idp_fan", "Fan");
        let thread_id = create_thread(&app, &author).await;
        call(&app, "POST", &format!("/api/threads/{}/like", thread_id), &fan, None).await;

        let (_, notes) = call(&app, "GET", "/api/notifications", &author, None).await;
        let id = notes["data"][0]["id"].as_i64().unwrap();

        let (status, _) = call(&app, "POST", &format!("/api/notifications/{}/read", id), &fan, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "POST", &format!("/api/notifications/{}/read", id), &author, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, unread) = call(&app, "GET", "/api/notifications?unreadOnly=true", &author, None).await;
        assert!(unread["data"].as_array().unwrap().is_empty());

        let (status, _) = call(&app, "POST", "/api/notifications/read-all", &author, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn chat_users_exclude_caller() {
        let (app, _) = app();
        let ada = token("idp_ada", "Ada");
        let bob = token("idp_bob", "Bob");
        call(&app, "GET", "/api/me", &bob, None).await;

        let (status, body) = call(&app, "GET", "/api/chat/users", &ada, None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body["data"].as_array().unwrap().iter().map(|u| u["displayName"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Bob"]);

        let bob_id = body["data"][0]["id"].as_i64().unwrap();
        let (status, body) = call(&app, "GET", &format!("/api/chat/conversations/{}/messages?limit=500", bob_id), &ada, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().is_empty());
    }
}
