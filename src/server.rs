/// HTTP server setup and routing
use crate::{
    context::AppContext,
    error::{FlockError, FlockResult},
    rate_limit::rate_limit_middleware,
};
use axum::{
    http::{header, Method, StatusCode},
    middleware,
    response::Json,
    Router,
};
use serde_json::json;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// Build the main application router
/// Returns Router<()> because state is already provided
pub fn build_router(ctx: AppContext) -> Router {
    // Login hands the token back in the Authorization header, so expose it
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::AUTHORIZATION]);

    Router::new()
        .merge(crate::api::routes())
        .fallback(not_found)
        .with_state(ctx.clone())
        .layer(middleware::from_fn_with_state(ctx, rate_limit_middleware))
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// 404 handler
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "NotFound",
            "message": "Endpoint not found"
        })),
    )
}

/// Start the HTTP server
pub async fn serve(ctx: AppContext) -> FlockResult<()> {
    let addr = format!("{}:{}", ctx.config.service.hostname, ctx.config.service.port);

    info!("Flock listening on {}", addr);
    info!("   Service URL: {}", ctx.service_url());

    let app = build_router(ctx);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FlockError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| FlockError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ServerConfig, store::MemoryRecordStore};
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        response::Response,
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let ctx = AppContext::with_store(ServerConfig::for_tests(), Arc::new(MemoryRecordStore::new()));
        build_router(ctx)
    }

    fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn signup_and_login(app: &Router, user_id: &str) -> String {
        let body = json!({ "userId": user_id, "displayName": user_id, "password": "password123" });
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/auth/signup", None, Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json!({ "userId": user_id, "password": "password123" });
        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/auth/login", None, Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::AUTHORIZATION));

        json_body(response).await["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health_and_not_found() {
        let app = app();

        let response = app.clone().oneshot(request(Method::GET, "/health", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(request(Method::GET, "/nope", None, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_follow_and_home_feed() {
        let app = app();
        let alice = signup_and_login(&app, "alice").await;
        let bob = signup_and_login(&app, "bob").await;

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/tweets", Some(&alice), Some(json!({ "body": "hello" }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let post_id = json_body(response).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/users/alice/follow", Some(&bob), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/tweets/feed",
                Some(&bob),
                Some(json!({ "offset": 1, "count": 10, "scope": "home" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page = json_body(response).await;
        assert_eq!(page["items"][0]["id"], post_id.as_str());
        assert_eq!(page["items"][0]["author"]["id"], "alice");
        assert!(page.get("totalCount").is_none());

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/users/alice/feed", None, Some(json!({}))))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["totalCount"], 1);

        let response = app
            .oneshot(request(Method::GET, "/api/users/alice", Some(&bob), None))
            .await
            .unwrap();
        let view = json_body(response).await;
        assert_eq!(view["followerCount"], 1);
        assert_eq!(view["following"], true);
        assert!(view.get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn test_error_bodies() {
        let app = app();

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/tweets", None, Some(json!({ "body": "x" }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["code"], 10406);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/api/tweets/missing", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], 10501);

        let response = app
            .clone()
            .oneshot(request(Method::POST, "/api/tweets/feed", None, Some(json!({ "offset": 0 }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(request(Method::POST, "/api/tweets/feed", None, Some(json!({ "scope": "home" }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
