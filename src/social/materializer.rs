/// Post Materializer
///
/// Expands a stored post, or a retweet edge pointing at one, into a
/// `PostView` with author info, live counts and viewer flags. Each call
/// issues three counts, one author lookup and up to two existence checks,
/// all concurrently.
use crate::{
    error::{FlockError, FlockResult},
    models::{Post, PostView, Retweet, ViewKind},
    social::{
        engagement::{EdgeEnd, EdgeKey, EdgeKind, EngagementIndex},
        identity::IdentityResolver,
    },
    store::{Collection, Query, RecordStore},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct PostMaterializer {
    store: Arc<dyn RecordStore>,
    engagement: EngagementIndex,
    identity: IdentityResolver,
}

impl PostMaterializer {
    pub fn new(
        store: Arc<dyn RecordStore>,
        engagement: EngagementIndex,
        identity: IdentityResolver,
    ) -> Self {
        Self {
            store,
            engagement,
            identity,
        }
    }

    /// Load a post by id and materialize it
    pub async fn materialize_by_id(&self, post_id: &str, viewer_id: Option<&str>) -> FlockResult<PostView> {
        let post = self
            .store
            .fetch::<Post>(post_id)
            .await?
            .ok_or_else(|| FlockError::PostNotFound(post_id.to_string()))?;

        self.materialize(&post, viewer_id).await
    }

    /// Materialize a plain post
    pub async fn materialize(&self, post: &Post, viewer_id: Option<&str>) -> FlockResult<PostView> {
        let author = async {
            self.identity
                .resolve_author(&post.author_id)
                .await
                .map_err(|e| match e {
                    FlockError::AccountNotFound(author_id) => {
                        tracing::error!(post_id = %post.id, %author_id, "Post author no longer exists");
                        FlockError::AuthorNotFound {
                            post_id: post.id.clone(),
                            author_id,
                        }
                    }
                    other => other,
                })
        };

        let replies = Query::new().eq(Post::REPLY_TO, post.id.as_str());
        let reply_count = self.store.count(Collection::Posts, &replies);

        let flags = async {
            match viewer_id {
                Some(viewer) => {
                    let like_key = EdgeKey::like(viewer, &post.id);
                    let retweet_key = EdgeKey::retweet(viewer, &post.id);
                    tokio::try_join!(
                        self.engagement.has_edge(&like_key),
                        self.engagement.has_edge(&retweet_key),
                    )
                }
                None => Ok((false, false)),
            }
        };

        let (author, reply_count, retweet_count, like_count, (liked, retweeted)) = tokio::try_join!(
            author,
            reply_count,
            self.engagement
                .count_edges(EdgeKind::Retweet, EdgeEnd::Target, &post.id),
            self.engagement
                .count_edges(EdgeKind::Like, EdgeEnd::Target, &post.id),
            flags,
        )?;

        Ok(PostView {
            id: post.id.clone(),
            kind: post.kind.into(),
            author,
            body: post.body.clone(),
            images: post.images.clone(),
            created_at: post.created_at,
            edited_at: post.edited_at,
            reply_to: post.reply_to.clone(),
            reply_permission: post.reply_permission,
            reply_count,
            retweet_count,
            like_count,
            liked,
            retweeted,
            retweeted_by: None,
            retweeted_at: None,
        })
    }

    /// Materialize a retweet: the target post's view with the retweet overlaid.
    /// Counts and flags stay those of the target post.
    pub async fn materialize_retweet(
        &self,
        retweet: &Retweet,
        viewer_id: Option<&str>,
    ) -> FlockResult<PostView> {
        let target = self.store.fetch::<Post>(&retweet.post_id).await?.ok_or_else(|| {
            tracing::error!(
                actor_id = %retweet.user_id,
                post_id = %retweet.post_id,
                "Retweet target no longer exists"
            );
            FlockError::TargetPostNotFound {
                actor_id: retweet.user_id.clone(),
                post_id: retweet.post_id.clone(),
            }
        })?;

        let mut view = self.materialize(&target, viewer_id).await?;
        view.kind = ViewKind::Retweet;
        view.retweeted_by = Some(retweet.user_id.clone());
        view.retweeted_at = Some(retweet.retweeted_at);

        Ok(view)
    }
}
