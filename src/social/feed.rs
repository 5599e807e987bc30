/// Feed Assembler
///
/// Builds a reverse-chronological timeline by merging two independently
/// ordered candidate streams (posts, retweets), slicing the requested page
/// and materializing only that page.
use crate::{
    config::FeedConfig,
    error::{FlockError, FlockResult},
    models::{Post, PostView, Retweet},
    social::{
        engagement::{EdgeEnd, EdgeKind, EngagementIndex},
        materializer::PostMaterializer,
    },
    store::{Collection, Direction, Query, RecordStore},
};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which content a feed draws from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "subject", rename_all = "lowercase")]
pub enum FeedScope {
    /// Every post, no retweet fan-in
    Global,
    /// The viewer's posts plus posts and retweets of everyone they follow
    Home,
    /// One account's own posts and retweets
    Profile(String),
}

/// One page of a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<PostView>,
    /// Only computed for profile feeds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

/// An unmaterialized feed entry
#[derive(Debug, Clone, PartialEq)]
pub enum Candidate {
    Post(Post),
    Retweet(Retweet),
}

impl Candidate {
    pub fn effective_at(&self) -> DateTime<Utc> {
        match self {
            Candidate::Post(post) => post.created_at,
            Candidate::Retweet(retweet) => retweet.retweeted_at,
        }
    }
}

/// Candidate author set and whether retweets fan in
struct Sources {
    /// `None` means no author filter
    authors: Option<Vec<String>>,
    include_retweets: bool,
}

/// Merge two streams already sorted newest-first into one newest-first list.
/// On equal timestamps the post stream wins, then store order within a stream.
pub fn merge_by_effective_time(posts: Vec<Post>, retweets: Vec<Retweet>) -> Vec<Candidate> {
    let mut merged = Vec::with_capacity(posts.len() + retweets.len());
    let mut posts = posts.into_iter().map(Candidate::Post).peekable();
    let mut retweets = retweets.into_iter().map(Candidate::Retweet).peekable();

    loop {
        let take_post = match (posts.peek(), retweets.peek()) {
            (Some(p), Some(r)) => p.effective_at() >= r.effective_at(),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };

        let next = if take_post { posts.next() } else { retweets.next() };
        merged.extend(next);
    }

    merged
}

#[derive(Clone)]
pub struct FeedAssembler {
    store: Arc<dyn RecordStore>,
    engagement: EngagementIndex,
    materializer: PostMaterializer,
    config: FeedConfig,
}

impl FeedAssembler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        engagement: EngagementIndex,
        materializer: PostMaterializer,
        config: FeedConfig,
    ) -> Self {
        Self {
            store,
            engagement,
            materializer,
            config,
        }
    }

    /// Assemble one page of a feed.
    ///
    /// `offset` is 1-based: `offset = 1` starts at the newest item. `count`
    /// is clamped to the configured maximum. If any item in the page fails to
    /// materialize the whole call fails.
    pub async fn assemble_feed(
        &self,
        viewer_id: Option<&str>,
        scope: &FeedScope,
        offset: usize,
        count: usize,
    ) -> FlockResult<FeedPage> {
        if offset < 1 {
            return Err(FlockError::Validation("offset must be at least 1".to_string()));
        }
        if count < 1 {
            return Err(FlockError::Validation("count must be at least 1".to_string()));
        }

        let count = count.min(self.config.max_count);
        let skip = offset - 1;
        let fetch_limit = skip.saturating_add(count);

        let sources = self.sources(viewer_id, scope).await?;

        let (posts, retweets) = tokio::try_join!(
            self.fetch_posts(sources.authors.as_deref(), fetch_limit),
            async {
                if sources.include_retweets {
                    self.fetch_retweets(sources.authors.as_deref(), fetch_limit).await
                } else {
                    Ok(Vec::new())
                }
            },
        )?;

        tracing::debug!(
            ?scope,
            offset,
            count,
            posts = posts.len(),
            retweets = retweets.len(),
            "Fetched feed candidates"
        );

        let page: Vec<Candidate> = merge_by_effective_time(posts, retweets)
            .into_iter()
            .skip(skip)
            .take(count)
            .collect();

        let total_count = match scope {
            FeedScope::Profile(subject) => Some(self.profile_total(subject).await?),
            FeedScope::Global | FeedScope::Home => None,
        };

        // `buffered` yields in input order regardless of completion order
        let items: Vec<PostView> = stream::iter(page)
            .map(|candidate| self.materialize_candidate(candidate, viewer_id))
            .buffered(self.config.materialize_concurrency.max(1))
            .try_collect()
            .await?;

        Ok(FeedPage { items, total_count })
    }

    async fn sources(&self, viewer_id: Option<&str>, scope: &FeedScope) -> FlockResult<Sources> {
        match scope {
            FeedScope::Global => Ok(Sources {
                authors: None,
                include_retweets: false,
            }),
            FeedScope::Home => {
                let viewer = viewer_id.ok_or_else(|| {
                    FlockError::Authentication("Login required for the home feed".to_string())
                })?;

                let followees = self.engagement.followee_ids(viewer).await?;
                // An empty follow set skips the retweet stream entirely
                let include_retweets = !followees.is_empty();

                let mut authors = Vec::with_capacity(followees.len() + 1);
                authors.push(viewer.to_string());
                authors.extend(followees.into_iter().filter(|id| id != viewer));

                Ok(Sources {
                    authors: Some(authors),
                    include_retweets,
                })
            }
            FeedScope::Profile(subject) => {
                if !self.store.exists(Collection::Accounts, subject).await? {
                    return Err(FlockError::AccountNotFound(subject.clone()));
                }

                Ok(Sources {
                    authors: Some(vec![subject.clone()]),
                    include_retweets: true,
                })
            }
        }
    }

    /// Restrict `query` to the author set; `None` if the set is empty and no query should run
    fn with_authors(query: Query, field: &'static str, authors: Option<&[String]>) -> Option<Query> {
        match authors {
            None => Some(query),
            Some([]) => None,
            Some([single]) => Some(query.eq(field, single.as_str())),
            Some(many) => Some(query.is_in(field, many.iter().map(String::as_str))),
        }
    }

    async fn fetch_posts(&self, authors: Option<&[String]>, limit: usize) -> FlockResult<Vec<Post>> {
        let base = Query::new()
            .order_by(Post::CREATED_AT, Direction::Desc)
            .limit(limit);

        match Self::with_authors(base, Post::AUTHOR_ID, authors) {
            Some(query) => self.store.find::<Post>(&query).await,
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_retweets(&self, authors: Option<&[String]>, limit: usize) -> FlockResult<Vec<Retweet>> {
        let kind = EdgeKind::Retweet;
        let base = Query::new()
            .order_by(kind.timestamp_field(), Direction::Desc)
            .limit(limit);

        match Self::with_authors(base, kind.field(EdgeEnd::Actor), authors) {
            Some(query) => self.store.find::<Retweet>(&query).await,
            None => Ok(Vec::new()),
        }
    }

    /// Full count of a profile's posts plus retweets, ignoring pagination
    async fn profile_total(&self, subject: &str) -> FlockResult<u64> {
        let posts = Query::new().eq(Post::AUTHOR_ID, subject);

        let (post_count, retweet_count) = tokio::try_join!(
            self.store.count(Collection::Posts, &posts),
            self.engagement
                .count_edges(EdgeKind::Retweet, EdgeEnd::Actor, subject),
        )?;

        Ok(post_count + retweet_count)
    }

    async fn materialize_candidate(
        &self,
        candidate: Candidate,
        viewer_id: Option<&str>,
    ) -> FlockResult<PostView> {
        match candidate {
            Candidate::Post(post) => self.materializer.materialize(&post, viewer_id).await,
            Candidate::Retweet(retweet) => {
                self.materializer
                    .materialize_retweet(&retweet, viewer_id)
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::fixtures::{post_record, retweet_record, Fixture};

    fn ids(page: &FeedPage) -> Vec<String> {
        page.items
            .iter()
            .map(|item| match &item.retweeted_by {
                Some(actor) => format!("rt:{}:{}", actor, item.id),
                None => item.id.clone(),
            })
            .collect()
    }

    #[test]
    fn test_merge_prefers_posts_on_ties() {
        let posts = vec![post_record("p2", "u1", 20), post_record("p1", "u1", 10)];
        let retweets = vec![retweet_record("u1", "x", 20), retweet_record("u1", "y", 15)];

        let merged: Vec<i64> = merge_by_effective_time(posts, retweets)
            .iter()
            .map(|c| c.effective_at().timestamp_millis())
            .collect();
        assert_eq!(merged, vec![20, 20, 15, 10]);

        let posts = vec![post_record("p", "u1", 20)];
        let retweets = vec![retweet_record("u1", "x", 20)];
        let merged = merge_by_effective_time(posts, retweets);
        assert!(matches!(merged[0], Candidate::Post(_)));
        assert!(matches!(merged[1], Candidate::Retweet(_)));
    }

    #[tokio::test]
    async fn test_home_feed_pagination_scenario() {
        let f = Fixture::new().await;
        f.account("u1").await;
        f.account("u2").await;
        f.post("p1", "u1", 10).await;
        f.post("p2", "u1", 20).await;
        f.follow("u2", "u1", 1).await;

        let feed = &f.social.feed;
        let first = feed.assemble_feed(Some("u2"), &FeedScope::Home, 1, 1).await.unwrap();
        assert_eq!(ids(&first), vec!["p2"]);
        assert_eq!(first.total_count, None);

        let second = feed.assemble_feed(Some("u2"), &FeedScope::Home, 2, 1).await.unwrap();
        assert_eq!(ids(&second), vec!["p1"]);

        let past_end = feed.assemble_feed(Some("u2"), &FeedScope::Home, 3, 1).await.unwrap();
        assert!(past_end.items.is_empty());
    }

    #[tokio::test]
    async fn test_home_feed_merges_followed_retweets() {
        let f = Fixture::new().await;
        for id in ["u1", "u2", "u3"] {
            f.account(id).await;
        }
        f.post("own", "u2", 15).await;
        f.post("a", "u1", 10).await;
        f.post("b", "u3", 40).await;
        f.retweet("u1", "b", 50).await;
        f.follow("u2", "u1", 1).await;

        let page = f
            .social
            .feed
            .assemble_feed(Some("u2"), &FeedScope::Home, 1, 10)
            .await
            .unwrap();

        // u3's own post is not in u2's home; u1's retweet of it is
        assert_eq!(ids(&page), vec!["rt:u1:b", "own", "a"]);
    }

    #[tokio::test]
    async fn test_home_feed_with_no_follows_is_own_posts_only() {
        let f = Fixture::new().await;
        f.account("u1").await;
        f.account("u2").await;
        f.post("mine", "u2", 10).await;
        f.post("theirs", "u1", 20).await;
        f.retweet("u2", "theirs", 30).await;

        let page = f
            .social
            .feed
            .assemble_feed(Some("u2"), &FeedScope::Home, 1, 10)
            .await
            .unwrap();
        assert_eq!(ids(&page), vec!["mine"]);
    }

    #[tokio::test]
    async fn test_home_feed_requires_viewer() {
        let f = Fixture::new().await;
        assert!(matches!(
            f.social.feed.assemble_feed(None, &FeedScope::Home, 1, 10).await,
            Err(FlockError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_profile_feed_includes_retweets_and_total() {
        let f = Fixture::new().await;
        f.account("u1").await;
        f.account("u2").await;
        f.post("p_other", "u2", 5).await;
        f.post("mine", "u1", 20).await;
        f.retweet("u1", "p_other", 30).await;

        let page = f
            .social
            .feed
            .assemble_feed(Some("u1"), &FeedScope::Profile("u1".to_string()), 1, 10)
            .await
            .unwrap();

        assert_eq!(ids(&page), vec!["rt:u1:p_other", "mine"]);
        let retweet = &page.items[0];
        assert_eq!(retweet.kind, crate::models::ViewKind::Retweet);
        assert_eq!(retweet.effective_at().timestamp_millis(), 30);
        assert_eq!(retweet.body, "body of p_other");
        assert_eq!(page.total_count, Some(2));

        // total ignores pagination
        let narrow = f
            .social
            .feed
            .assemble_feed(None, &FeedScope::Profile("u1".to_string()), 2, 1)
            .await
            .unwrap();
        assert_eq!(ids(&narrow), vec!["mine"]);
        assert_eq!(narrow.total_count, Some(2));
    }

    #[tokio::test]
    async fn test_profile_of_unknown_account() {
        let f = Fixture::new().await;
        assert!(matches!(
            f.social
                .feed
                .assemble_feed(None, &FeedScope::Profile("ghost".to_string()), 1, 10)
                .await,
            Err(FlockError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_global_feed_ignores_retweets() {
        let f = Fixture::new().await;
        f.account("u1").await;
        f.account("u2").await;
        f.post("a", "u1", 10).await;
        f.post("b", "u2", 20).await;
        f.retweet("u1", "b", 30).await;

        let page = f.social.feed.assemble_feed(None, &FeedScope::Global, 1, 10).await.unwrap();
        assert_eq!(ids(&page), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_page_size_order_and_idempotence() {
        let f = Fixture::new().await;
        f.account("u1").await;
        f.account("u2").await;
        f.follow("u2", "u1", 1).await;
        for i in 0..25 {
            let author = if i % 3 == 0 { "u2" } else { "u1" };
            f.post(&format!("p{}", i), author, (i * 7 % 11) as i64).await;
        }
        for i in 0..6 {
            f.retweet("u1", &format!("p{}", i), 3 + i as i64).await;
        }

        let feed = &f.social.feed;
        for (offset, count) in [(1, 5), (3, 4), (10, 10), (30, 5), (1, 40)] {
            let page = feed.assemble_feed(Some("u2"), &FeedScope::Home, offset, count).await.unwrap();
            assert!(page.items.len() <= count);

            for pair in page.items.windows(2) {
                assert!(pair[0].effective_at() >= pair[1].effective_at());
            }

            let again = feed.assemble_feed(Some("u2"), &FeedScope::Home, offset, count).await.unwrap();
            assert_eq!(page, again);
        }

        // consecutive pages tile the full feed
        let full = feed.assemble_feed(Some("u2"), &FeedScope::Home, 1, 31).await.unwrap();
        assert_eq!(full.items.len(), 31);
        let mut tiled = Vec::new();
        for offset in (1..=31).step_by(4) {
            let page = feed.assemble_feed(Some("u2"), &FeedScope::Home, offset, 4).await.unwrap();
            tiled.extend(page.items);
        }
        assert_eq!(tiled, full.items);
    }

    #[tokio::test]
    async fn test_invalid_window() {
        let f = Fixture::new().await;
        let feed = &f.social.feed;
        assert!(matches!(
            feed.assemble_feed(None, &FeedScope::Global, 0, 10).await,
            Err(FlockError::Validation(_))
        ));
        assert!(matches!(
            feed.assemble_feed(None, &FeedScope::Global, 1, 0).await,
            Err(FlockError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_only_the_window_is_materialized() {
        let f = Fixture::new().await;
        f.account("u1").await;
        f.post("fine", "u1", 20).await;
        // orphaned post, older than the page
        f.post("orphan", "ghost", 10).await;

        let page = f.social.feed.assemble_feed(None, &FeedScope::Global, 1, 1).await.unwrap();
        assert_eq!(ids(&page), vec!["fine"]);

        // once the broken item is inside the window, the whole call fails
        let err = f
            .social
            .feed
            .assemble_feed(None, &FeedScope::Global, 1, 2)
            .await
            .unwrap_err();
        assert!(err.is_data_integrity());
    }

    #[tokio::test]
    async fn test_dangling_retweet_fails_profile_feed() {
        let f = Fixture::new().await;
        f.account("u1").await;
        f.retweet("u1", "deleted", 10).await;

        let err = f
            .social
            .feed
            .assemble_feed(None, &FeedScope::Profile("u1".to_string()), 1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, FlockError::TargetPostNotFound { .. }));
    }
}
