//! Shared test fixtures for the social core

use crate::{
    config::FeedConfig,
    models::{Account, Follow, Post, PostKind, ReplyPermission, Retweet},
    social::SocialGraph,
    store::{MemoryRecordStore, RecordStore},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub fn at(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap()
}

pub fn post_record(id: &str, author: &str, ms: i64) -> Post {
    Post {
        id: id.to_string(),
        kind: PostKind::Tweet,
        author_id: author.to_string(),
        body: format!("body of {}", id),
        images: vec![],
        created_at: at(ms),
        edited_at: None,
        reply_to: None,
        reply_permission: ReplyPermission::Everyone,
    }
}

pub fn retweet_record(user: &str, post: &str, ms: i64) -> Retweet {
    Retweet {
        user_id: user.to_string(),
        post_id: post.to_string(),
        retweeted_at: at(ms),
    }
}

/// Memory-backed social graph with seeding helpers
pub struct Fixture {
    pub store: Arc<dyn RecordStore>,
    pub social: SocialGraph,
}

impl Fixture {
    pub async fn new() -> Self {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let config = FeedConfig {
            materialize_concurrency: 4,
            ..FeedConfig::default()
        };
        let social = SocialGraph::new(store.clone(), config);

        Self { store, social }
    }

    pub async fn account(&self, id: &str) {
        let account = Account::new(id.to_string(), id.to_uppercase(), "hash".to_string());
        self.store.save(&account).await.unwrap();
    }

    pub async fn post(&self, id: &str, author: &str, ms: i64) {
        self.store.save(&post_record(id, author, ms)).await.unwrap();
    }

    pub async fn retweet(&self, user: &str, post: &str, ms: i64) {
        self.store.save(&retweet_record(user, post, ms)).await.unwrap();
    }

    pub async fn follow(&self, follower: &str, followee: &str, ms: i64) {
        let follow = Follow {
            follower_id: follower.to_string(),
            followee_id: followee.to_string(),
            followed_at: at(ms),
        };
        self.store.save(&follow).await.unwrap();
    }
}
