/// Authentication extractors
use crate::{api::middleware::extract_bearer_token, context::AppContext, error::FlockError};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated caller - rejects the request without a valid token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account_id: String,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = FlockError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| FlockError::Authentication("Login required".to_string()))?;

        let account_id = state
            .account_manager
            .validate_token(&token)
            .await
            .map_err(|e| match e {
                FlockError::Jwt(_) => FlockError::Authentication("Login required".to_string()),
                other => other,
            })?;

        Ok(AuthContext { account_id })
    }
}

/// Optional caller identity
///
/// A missing or unparseable token means an anonymous caller. An expired
/// token, or one for a deleted account, still fails the request so the
/// client knows to log in again.
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub auth: Option<AuthContext>,
}

impl OptionalAuthContext {
    pub fn account_id(&self) -> Option<&str> {
        self.auth.as_ref().map(|auth| auth.account_id.as_str())
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = FlockError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_bearer_token(&parts.headers) else {
            return Ok(OptionalAuthContext { auth: None });
        };

        let auth = match state.account_manager.validate_token(&token).await {
            Ok(account_id) => Some(AuthContext { account_id }),
            Err(FlockError::Jwt(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(OptionalAuthContext { auth })
    }
}
