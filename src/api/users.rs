/// /api/users endpoints
use crate::{
    account::ProfileUpdate,
    api::tweets::FeedRequest,
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::{FlockError, FlockResult},
    models::AccountView,
    social::{FeedPage, FeedScope},
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/users/search", get(search))
        .route(
            "/api/users/me",
            get(get_me).put(update_profile).delete(delete_account),
        )
        .route("/api/users/:id", get(get_user))
        .route("/api/users/:id/feed", post(profile_feed))
        .route("/api/users/:id/follow", post(follow).delete(unfollow))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    keyword: Option<String>,
}

/// User search endpoint; returns matching account ids, best match first
async fn search(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> FlockResult<Json<Vec<String>>> {
    let keyword = params
        .keyword
        .ok_or_else(|| FlockError::Validation("Search keyword is required".to_string()))?;

    let ids = ctx
        .account_manager
        .search(&keyword, ctx.config.feed.search_limit)
        .await?;

    Ok(Json(ids))
}

async fn get_me(State(ctx): State<AppContext>, auth: AuthContext) -> FlockResult<Json<AccountView>> {
    let account = ctx.account_manager.current_account(&auth.account_id).await?;
    Ok(Json(account))
}

/// Account view endpoint
async fn get_user(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(id): Path<String>,
) -> FlockResult<Json<AccountView>> {
    let account = ctx
        .social
        .identity
        .resolve_account(&id, auth.account_id())
        .await?;

    Ok(Json(account))
}

/// Profile update endpoint
async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(update): Json<ProfileUpdate>,
) -> FlockResult<Json<AccountView>> {
    let account = ctx
        .account_manager
        .update_profile(&auth.account_id, update)
        .await?;

    Ok(Json(account))
}

/// Delete account endpoint
async fn delete_account(State(ctx): State<AppContext>, auth: AuthContext) -> FlockResult<StatusCode> {
    ctx.social.actions.delete_account(&auth.account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Profile feed endpoint, with the subject's total post and retweet count
async fn profile_feed(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(id): Path<String>,
    Json(req): Json<FeedRequest>,
) -> FlockResult<Json<FeedPage>> {
    req.validate()?;
    let (offset, count) = req.window(&ctx);

    let page = ctx
        .social
        .feed
        .assemble_feed(auth.account_id(), &FeedScope::Profile(id), offset, count)
        .await?;

    Ok(Json(page))
}

async fn follow(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> FlockResult<StatusCode> {
    ctx.social.actions.follow(&auth.account_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unfollow(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> FlockResult<StatusCode> {
    ctx.social.actions.unfollow(&auth.account_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
