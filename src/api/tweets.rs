/// /api/tweets endpoints
use crate::{
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::FlockResult,
    models::{PostView, ReplyPermission},
    social::{FeedPage, FeedScope, NewPost, PostEdit},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build tweet routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/tweets", post(create_post))
        .route("/api/tweets/feed", post(feed))
        .route(
            "/api/tweets/:id",
            get(get_post).put(edit_post).delete(delete_post),
        )
        .route("/api/tweets/:id/reply", post(create_reply))
        .route("/api/tweets/:id/like", post(like).delete(unlike))
        .route("/api/tweets/:id/retweet", post(retweet).delete(unretweet))
}

/// New post or reply body
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    #[serde(default)]
    #[validate(length(max = 280))]
    pub body: String,
    #[serde(default)]
    #[validate(length(max = 4))]
    pub images: Vec<String>,
    #[serde(default)]
    pub reply_permission: ReplyPermission,
}

impl From<CreatePostRequest> for NewPost {
    fn from(req: CreatePostRequest) -> Self {
        NewPost {
            body: req.body,
            images: req.images,
            reply_permission: req.reply_permission,
        }
    }
}

/// Edit body; absent fields are left unchanged
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EditPostRequest {
    #[validate(length(max = 280))]
    pub body: Option<String>,
    #[validate(length(max = 4))]
    pub images: Option<Vec<String>>,
}

/// Which feed `/api/tweets/feed` serves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    #[default]
    Global,
    Home,
}

/// Pagination window, shared with the profile feed endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FeedRequest {
    /// 1-based index of the first item
    #[validate(range(min = 1))]
    pub offset: Option<usize>,
    #[validate(range(min = 1))]
    pub count: Option<usize>,
    #[serde(default)]
    pub scope: FeedKind,
}

impl FeedRequest {
    /// Offset and count with defaults applied
    pub fn window(&self, ctx: &AppContext) -> (usize, usize) {
        (
            self.offset.unwrap_or(1),
            self.count.unwrap_or(ctx.config.feed.default_count),
        )
    }
}

/// Create post endpoint
async fn create_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<CreatePostRequest>,
) -> FlockResult<(StatusCode, Json<PostView>)> {
    req.validate()?;

    let post = ctx
        .social
        .actions
        .create_post(&auth.account_id, req.into())
        .await?;

    Ok((StatusCode::CREATED, Json(post)))
}

/// Global or home feed endpoint
async fn feed(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Json(req): Json<FeedRequest>,
) -> FlockResult<Json<FeedPage>> {
    req.validate()?;

    let scope = match req.scope {
        FeedKind::Global => FeedScope::Global,
        FeedKind::Home => FeedScope::Home,
    };
    let (offset, count) = req.window(&ctx);

    let page = ctx
        .social
        .feed
        .assemble_feed(auth.account_id(), &scope, offset, count)
        .await?;

    Ok(Json(page))
}

/// Single post endpoint
async fn get_post(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Path(id): Path<String>,
) -> FlockResult<Json<PostView>> {
    let post = ctx
        .social
        .materializer
        .materialize_by_id(&id, auth.account_id())
        .await?;

    Ok(Json(post))
}

/// Edit post endpoint
async fn edit_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<EditPostRequest>,
) -> FlockResult<Json<PostView>> {
    req.validate()?;

    let edit = PostEdit {
        body: req.body,
        images: req.images,
    };
    let post = ctx
        .social
        .actions
        .edit_post(&auth.account_id, &id, edit)
        .await?;

    Ok(Json(post))
}

/// Delete post endpoint
async fn delete_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> FlockResult<StatusCode> {
    ctx.social.actions.delete_post(&auth.account_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reply endpoint
async fn create_reply(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(req): Json<CreatePostRequest>,
) -> FlockResult<(StatusCode, Json<PostView>)> {
    req.validate()?;

    let reply = ctx
        .social
        .actions
        .create_reply(&auth.account_id, &id, req.into())
        .await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

async fn like(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> FlockResult<StatusCode> {
    ctx.social.actions.like(&auth.account_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unlike(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> FlockResult<StatusCode> {
    ctx.social.actions.unlike(&auth.account_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn retweet(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> FlockResult<(StatusCode, Json<PostView>)> {
    let view = ctx.social.actions.retweet(&auth.account_id, &id).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn unretweet(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> FlockResult<StatusCode> {
    ctx.social.actions.unretweet(&auth.account_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

