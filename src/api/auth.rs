/// /api/auth endpoints
use crate::{
    account::{LoginRequest, LoginResponse, SignupRequest},
    api::middleware::bearer_header,
    auth::{AuthContext, OptionalAuthContext},
    context::AppContext,
    error::{FlockError, FlockResult},
    models::AccountView,
};
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/info", get(info))
        .route("/api/auth/logout", post(logout))
}

fn reject_if_logged_in(auth: &OptionalAuthContext) -> FlockResult<()> {
    match auth.account_id() {
        Some(_) => Err(FlockError::Validation("Already logged in".to_string())),
        None => Ok(()),
    }
}

/// Create account endpoint
async fn signup(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Json(req): Json<SignupRequest>,
) -> FlockResult<(StatusCode, Json<AccountView>)> {
    reject_if_logged_in(&auth)?;
    req.validate()?;

    let account = ctx
        .account_manager
        .signup(&req.user_id, &req.display_name, &req.password)
        .await?;

    Ok((StatusCode::CREATED, Json(account)))
}

/// Login endpoint; the token is returned in the body and the `Authorization` header
async fn login(
    State(ctx): State<AppContext>,
    auth: OptionalAuthContext,
    Json(req): Json<LoginRequest>,
) -> FlockResult<Response> {
    reject_if_logged_in(&auth)?;
    req.validate()?;

    let (account, token) = ctx.account_manager.login(&req.user_id, &req.password).await?;

    let mut response = Json(LoginResponse {
        account,
        token: token.clone(),
    })
    .into_response();

    if let Some(value) = bearer_header(&token) {
        response.headers_mut().insert(header::AUTHORIZATION, value);
    }

    Ok(response)
}

/// Current account endpoint
async fn info(State(ctx): State<AppContext>, auth: AuthContext) -> FlockResult<Json<AccountView>> {
    let account = ctx.account_manager.current_account(&auth.account_id).await?;
    Ok(Json(account))
}

/// Logout endpoint; tokens are stateless, so the client just drops its copy
async fn logout() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    response
        .headers_mut()
        .insert(header::AUTHORIZATION, HeaderValue::from_static(""));
    response
}
