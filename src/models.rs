/// Stored records and the view objects built from them
use crate::store::{Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account record in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    pub password_hash: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub joined_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_login_at: Option<DateTime<Utc>>,
    /// Lowercase copy of `id` for prefix search
    pub id_lowercase: String,
    /// Lowercase copy of `display_name` for prefix search
    pub display_name_lowercase: String,
}

impl Account {
    pub const ID_LOWERCASE: &'static str = "id_lowercase";
    pub const DISPLAY_NAME_LOWERCASE: &'static str = "display_name_lowercase";

    pub fn new(id: String, display_name: String, password_hash: String) -> Self {
        Self {
            id_lowercase: id.to_lowercase(),
            display_name_lowercase: display_name.to_lowercase(),
            id,
            display_name,
            password_hash,
            bio: None,
            avatar_url: None,
            website: None,
            location: None,
            joined_at: Utc::now(),
            last_login_at: None,
        }
    }
}

impl Record for Account {
    const COLLECTION: Collection = Collection::Accounts;

    fn record_id(&self) -> String {
        self.id.clone()
    }
}

/// Post kind as stored; retweets are separate edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Tweet,
    Reply,
}

/// Who may reply to a post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPermission {
    #[default]
    Everyone,
    FollowersOnly,
}

/// Post record in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub kind: PostKind,
    pub author_id: String,
    pub body: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub edited_at: Option<DateTime<Utc>>,
    /// Set iff `kind == Reply`
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub reply_permission: ReplyPermission,
}

impl Post {
    pub const AUTHOR_ID: &'static str = "author_id";
    pub const CREATED_AT: &'static str = "created_at";
    pub const REPLY_TO: &'static str = "reply_to";
}

impl Record for Post {
    const COLLECTION: Collection = Collection::Posts;

    fn record_id(&self) -> String {
        self.id.clone()
    }
}

/// Retweet edge: `user_id` retweeted `post_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Retweet {
    pub user_id: String,
    pub post_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub retweeted_at: DateTime<Utc>,
}

/// Like edge: `user_id` liked `post_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Like {
    pub user_id: String,
    pub post_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub liked_at: DateTime<Utc>,
}

/// Follow edge: `follower_id` follows `followee_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Follow {
    pub follower_id: String,
    pub followee_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub followed_at: DateTime<Utc>,
}

/// Public view of an account; carries no credential or search fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub website: Option<String>,
    pub location: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub follower_count: u64,
    pub following_count: u64,
    /// Whether the viewer follows this account
    pub following: bool,
}

/// Author fields embedded in every post view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorSummary {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Kind tag of a materialized post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Tweet,
    Reply,
    Retweet,
}

impl From<PostKind> for ViewKind {
    fn from(kind: PostKind) -> Self {
        match kind {
            PostKind::Tweet => ViewKind::Tweet,
            PostKind::Reply => ViewKind::Reply,
        }
    }
}

/// Fully denormalized post as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub kind: ViewKind,
    pub author: AuthorSummary,
    pub body: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub reply_permission: ReplyPermission,
    pub reply_count: u64,
    pub retweet_count: u64,
    pub like_count: u64,
    pub liked: bool,
    pub retweeted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retweeted_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retweeted_at: Option<DateTime<Utc>>,
}

impl PostView {
    /// Timestamp used for feed ordering
    pub fn effective_at(&self) -> DateTime<Utc> {
        self.retweeted_at.unwrap_or(self.created_at)
    }
}
