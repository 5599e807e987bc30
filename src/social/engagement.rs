/// Engagement Index
///
/// Existence checks, live counts and listings over the three edge
/// collections (likes, retweets, follows).
use crate::{
    error::{FlockError, FlockResult},
    models::{Follow, Like, Retweet},
    store::{Collection, Direction, Query, Record, RecordStore},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The three kinds of directed edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Like,
    Retweet,
    Follow,
}

/// Which participant of an edge a filter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeEnd {
    /// Liker, retweeter, or follower
    Actor,
    /// Liked/retweeted post, or followee
    Target,
}

impl EdgeKind {
    pub fn collection(&self) -> Collection {
        match self {
            EdgeKind::Like => Collection::Likes,
            EdgeKind::Retweet => Collection::Retweets,
            EdgeKind::Follow => Collection::Follows,
        }
    }

    /// Document field holding the given participant
    pub fn field(&self, end: EdgeEnd) -> &'static str {
        match (self, end) {
            (EdgeKind::Like | EdgeKind::Retweet, EdgeEnd::Actor) => "user_id",
            (EdgeKind::Like | EdgeKind::Retweet, EdgeEnd::Target) => "post_id",
            (EdgeKind::Follow, EdgeEnd::Actor) => "follower_id",
            (EdgeKind::Follow, EdgeEnd::Target) => "followee_id",
        }
    }

    pub fn timestamp_field(&self) -> &'static str {
        match self {
            EdgeKind::Like => "liked_at",
            EdgeKind::Retweet => "retweeted_at",
            EdgeKind::Follow => "followed_at",
        }
    }
}

/// Composite identity of an edge. Field order is fixed: the actor (liker,
/// retweeter, follower) always comes first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub kind: EdgeKind,
    pub actor: String,
    pub target: String,
}

impl EdgeKey {
    pub fn like(user_id: &str, post_id: &str) -> Self {
        Self::new(EdgeKind::Like, user_id, post_id)
    }

    pub fn retweet(user_id: &str, post_id: &str) -> Self {
        Self::new(EdgeKind::Retweet, user_id, post_id)
    }

    pub fn follow(follower_id: &str, followee_id: &str) -> Self {
        Self::new(EdgeKind::Follow, follower_id, followee_id)
    }

    fn new(kind: EdgeKind, actor: &str, target: &str) -> Self {
        Self {
            kind,
            actor: actor.to_string(),
            target: target.to_string(),
        }
    }

    /// Document id: the JSON pair `["actor","target"]`, unambiguous for any ids
    pub fn storage_id(&self) -> String {
        serde_json::Value::from(vec![self.actor.as_str(), self.target.as_str()]).to_string()
    }

    /// Inverse of [`EdgeKey::storage_id`]
    pub fn from_storage_id(kind: EdgeKind, id: &str) -> FlockResult<Self> {
        let (actor, target): (String, String) = serde_json::from_str(id)
            .map_err(|e| FlockError::Store(format!("Malformed {:?} edge id {}: {}", kind, id, e)))?;

        Ok(Self { kind, actor, target })
    }
}

/// A stored edge record, addressable by its composite key
pub trait Edge: Record {
    fn key(&self) -> EdgeKey;
}

macro_rules! impl_edge {
    ($ty:ty, $collection:expr, $kind:expr, $actor:ident, $target:ident) => {
        impl Record for $ty {
            const COLLECTION: Collection = $collection;

            fn record_id(&self) -> String {
                self.key().storage_id()
            }
        }

        impl Edge for $ty {
            fn key(&self) -> EdgeKey {
                EdgeKey::new($kind, &self.$actor, &self.$target)
            }
        }
    };
}

impl_edge!(Like, Collection::Likes, EdgeKind::Like, user_id, post_id);
impl_edge!(Retweet, Collection::Retweets, EdgeKind::Retweet, user_id, post_id);
impl_edge!(Follow, Collection::Follows, EdgeKind::Follow, follower_id, followee_id);

/// Edge existence, counting and listing on top of the record store
#[derive(Clone)]
pub struct EngagementIndex {
    store: Arc<dyn RecordStore>,
}

impl EngagementIndex {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    fn end_query(kind: EdgeKind, end: EdgeEnd, value: &str) -> Query {
        Query::new().eq(kind.field(end), value)
    }

    /// Point existence check for exactly this composite key
    pub async fn has_edge(&self, key: &EdgeKey) -> FlockResult<bool> {
        self.store
            .exists(key.kind.collection(), &key.storage_id())
            .await
    }

    /// Number of edges of `kind` whose `end` participant is `value`
    pub async fn count_edges(&self, kind: EdgeKind, end: EdgeEnd, value: &str) -> FlockResult<u64> {
        self.store
            .count(kind.collection(), &Self::end_query(kind, end, value))
            .await
    }

    /// Keys of matching edges, newest first
    pub async fn list_edge_ids(
        &self,
        kind: EdgeKind,
        end: EdgeEnd,
        value: &str,
    ) -> FlockResult<Vec<EdgeKey>> {
        let query = Self::end_query(kind, end, value)
            .order_by(kind.timestamp_field(), Direction::Desc);

        self.store
            .query_ids(kind.collection(), &query)
            .await?
            .iter()
            .map(|id| EdgeKey::from_storage_id(kind, id))
            .collect()
    }

    /// Ids of accounts `account_id` follows, most recently followed first
    pub async fn followee_ids(&self, account_id: &str) -> FlockResult<Vec<String>> {
        Ok(self
            .list_edge_ids(EdgeKind::Follow, EdgeEnd::Actor, account_id)
            .await?
            .into_iter()
            .map(|key| key.target)
            .collect())
    }

    /// Store an edge; false if this ordered pair already had one
    pub async fn add_edge<E: Edge>(&self, edge: &E) -> FlockResult<bool> {
        self.store.create(edge).await
    }

    /// Remove the edge with exactly this key; false if there was none
    pub async fn remove_edge(&self, key: &EdgeKey) -> FlockResult<bool> {
        self.store
            .delete(key.kind.collection(), &key.storage_id())
            .await
    }

    /// Awaited cascade: remove every edge of `kind` whose `end` is `value`
    pub async fn remove_edges(&self, kind: EdgeKind, end: EdgeEnd, value: &str) -> FlockResult<u64> {
        let ids = self
            .store
            .query_ids(kind.collection(), &Self::end_query(kind, end, value))
            .await?;

        let removed = self.store.delete_many(kind.collection(), &ids).await?;

        if removed as usize != ids.len() {
            tracing::warn!(
                kind = ?kind,
                value,
                expected = ids.len(),
                removed,
                "Cascade removed fewer edges than it listed"
            );
        }

        Ok(removed)
    }
}
