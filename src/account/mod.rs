/// Account management
///
/// Handles signup, credential checks, login tokens, profile edits and user search.

mod manager;

pub use manager::AccountManager;

use crate::models::AccountView;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Signup request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(length(min = 3, max = 30))]
    pub user_id: String,
    #[validate(length(min = 1, max = 50))]
    pub display_name: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Login response; the token is also set on the `Authorization` header
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub account: AccountView,
    pub token: String,
}

/// Profile patch; absent fields stay unchanged, empty strings clear optional fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 50))]
    pub display_name: Option<String>,
    #[validate(length(max = 160))]
    pub bio: Option<String>,
    #[validate(length(max = 512))]
    pub avatar_url: Option<String>,
    #[validate(length(max = 100))]
    pub website: Option<String>,
    #[validate(length(max = 30))]
    pub location: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
            && self.website.is_none()
            && self.location.is_none()
    }
}
