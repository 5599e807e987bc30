/// Social Actions - the write path
///
/// Every mutation of posts and edges goes through here so the edge
/// invariants hold: one edge per ordered pair, and cascades that finish
/// before the owning record is removed.
use crate::{
    error::{FlockError, FlockResult},
    models::{Account, Like, Post, PostKind, PostView, ReplyPermission, Retweet, Follow},
    social::{
        engagement::{EdgeEnd, EdgeKey, EdgeKind, EngagementIndex},
        materializer::PostMaterializer,
    },
    store::{Collection, Query, RecordStore},
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Content of a new post or reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPost {
    pub body: String,
    pub images: Vec<String>,
    pub reply_permission: ReplyPermission,
}

/// Fields to change on an existing post; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostEdit {
    pub body: Option<String>,
    pub images: Option<Vec<String>>,
}

/// What one pass over a deleted account removed
#[derive(Debug, Default, Clone, Copy)]
struct AccountSweep {
    posts: u64,
    likes: u64,
    retweets: u64,
    following: u64,
    followers: u64,
}

#[derive(Clone)]
pub struct SocialActions {
    store: Arc<dyn RecordStore>,
    engagement: EngagementIndex,
    materializer: PostMaterializer,
}

impl SocialActions {
    pub fn new(
        store: Arc<dyn RecordStore>,
        engagement: EngagementIndex,
        materializer: PostMaterializer,
    ) -> Self {
        Self {
            store,
            engagement,
            materializer,
        }
    }

    async fn load_post(&self, post_id: &str) -> FlockResult<Post> {
        self.store
            .fetch::<Post>(post_id)
            .await?
            .ok_or_else(|| FlockError::PostNotFound(post_id.to_string()))
    }

    async fn ensure_post(&self, post_id: &str) -> FlockResult<()> {
        if self.store.exists(Collection::Posts, post_id).await? {
            Ok(())
        } else {
            Err(FlockError::PostNotFound(post_id.to_string()))
        }
    }

    async fn ensure_account(&self, account_id: &str) -> FlockResult<()> {
        if self.store.exists(Collection::Accounts, account_id).await? {
            Ok(())
        } else {
            Err(FlockError::AccountNotFound(account_id.to_string()))
        }
    }

    fn ensure_author(post: &Post, actor_id: &str) -> FlockResult<()> {
        if post.author_id == actor_id {
            Ok(())
        } else {
            Err(FlockError::Authorization(
                "Only the author can modify this post".to_string(),
            ))
        }
    }

    /// Undo a freshly written edge whose endpoints were deleted while it was
    /// being written. Deletions sweep edges again after removing the owner,
    /// so one of the two sides always catches the straggler.
    async fn settle_edge(&self, key: &EdgeKey) -> FlockResult<()> {
        let target = async {
            match key.kind {
                EdgeKind::Follow => self.ensure_account(&key.target).await,
                EdgeKind::Like | EdgeKind::Retweet => self.ensure_post(&key.target).await,
            }
        };

        if let Err(e) = tokio::try_join!(self.ensure_account(&key.actor), target) {
            self.engagement.remove_edge(key).await?;
            tracing::warn!(
                kind = ?key.kind,
                actor = %key.actor,
                target = %key.target,
                "Edge retracted after concurrent delete"
            );
            return Err(e);
        }

        Ok(())
    }

    async fn insert_post(
        &self,
        author_id: &str,
        content: NewPost,
        reply_to: Option<String>,
    ) -> FlockResult<PostView> {
        if content.body.trim().is_empty() && content.images.is_empty() {
            return Err(FlockError::Validation(
                "A post needs a body or at least one image".to_string(),
            ));
        }

        let post = Post {
            id: Uuid::new_v4().to_string(),
            kind: if reply_to.is_some() {
                PostKind::Reply
            } else {
                PostKind::Tweet
            },
            author_id: author_id.to_string(),
            body: content.body,
            images: content.images,
            created_at: Utc::now(),
            edited_at: None,
            reply_to,
            reply_permission: content.reply_permission,
        };

        if !self.store.create(&post).await? {
            return Err(FlockError::Internal(format!("Post id collision: {}", post.id)));
        }

        if let Err(e) = self.ensure_account(author_id).await {
            self.store.delete(Collection::Posts, &post.id).await?;
            tracing::warn!(post_id = %post.id, author_id, "Post retracted, author was deleted");
            return Err(e);
        }

        tracing::info!(post_id = %post.id, author_id, kind = ?post.kind, "Post created");

        self.materializer.materialize(&post, Some(author_id)).await
    }

    pub async fn create_post(&self, author_id: &str, content: NewPost) -> FlockResult<PostView> {
        self.insert_post(author_id, content, None).await
    }

    /// Reply to `target_id`. Followers-only targets accept replies from
    /// their author and from accounts following the author.
    pub async fn create_reply(
        &self,
        author_id: &str,
        target_id: &str,
        content: NewPost,
    ) -> FlockResult<PostView> {
        let target = self.load_post(target_id).await?;

        if target.reply_permission == ReplyPermission::FollowersOnly
            && target.author_id != author_id
            && !self
                .engagement
                .has_edge(&EdgeKey::follow(author_id, &target.author_id))
                .await?
        {
            tracing::warn!(author_id, target_id, "Reply rejected by followers-only permission");
            return Err(FlockError::Authorization(
                "Only followers of the author can reply to this post".to_string(),
            ));
        }

        self.insert_post(author_id, content, Some(target.id)).await
    }

    pub async fn edit_post(&self, editor_id: &str, post_id: &str, edit: PostEdit) -> FlockResult<PostView> {
        let mut post = self.load_post(post_id).await?;
        Self::ensure_author(&post, editor_id)?;

        let body_changed = edit.body.as_ref().is_some_and(|body| *body != post.body);
        let images_changed = edit.images.as_ref().is_some_and(|images| *images != post.images);

        if !body_changed && !images_changed {
            return Err(FlockError::Validation("No changes".to_string()));
        }

        if let Some(body) = edit.body {
            post.body = body;
        }
        if let Some(images) = edit.images {
            post.images = images;
        }
        if post.body.trim().is_empty() && post.images.is_empty() {
            return Err(FlockError::Validation(
                "A post needs a body or at least one image".to_string(),
            ));
        }
        post.edited_at = Some(Utc::now());

        self.store.save(&post).await?;
        tracing::info!(post_id, editor_id, "Post edited");

        self.materializer.materialize(&post, Some(editor_id)).await
    }

    /// Remove every like and retweet of a post
    async fn cascade_post(&self, post_id: &str) -> FlockResult<(u64, u64)> {
        tokio::try_join!(
            self.engagement
                .remove_edges(EdgeKind::Like, EdgeEnd::Target, post_id),
            self.engagement
                .remove_edges(EdgeKind::Retweet, EdgeEnd::Target, post_id),
        )
    }

    pub async fn delete_post(&self, actor_id: &str, post_id: &str) -> FlockResult<()> {
        let post = self.load_post(post_id).await?;
        Self::ensure_author(&post, actor_id)?;

        let (likes, retweets) = self.cascade_post(post_id).await?;
        self.store.delete(Collection::Posts, post_id).await?;

        // Edges written while the first sweep ran
        let (late_likes, late_retweets) = self.cascade_post(post_id).await?;
        let (likes, retweets) = (likes + late_likes, retweets + late_retweets);

        tracing::info!(post_id, likes, retweets, "Post deleted");
        Ok(())
    }

    pub async fn like(&self, actor_id: &str, post_id: &str) -> FlockResult<()> {
        self.ensure_post(post_id).await?;

        let like = Like {
            user_id: actor_id.to_string(),
            post_id: post_id.to_string(),
            liked_at: Utc::now(),
        };
        if !self.engagement.add_edge(&like).await? {
            return Err(FlockError::Conflict("Post is already liked".to_string()));
        }
        self.settle_edge(&EdgeKey::like(actor_id, post_id)).await?;

        tracing::debug!(actor_id, post_id, "Post liked");
        Ok(())
    }

    pub async fn unlike(&self, actor_id: &str, post_id: &str) -> FlockResult<()> {
        self.ensure_post(post_id).await?;

        if !self.engagement.remove_edge(&EdgeKey::like(actor_id, post_id)).await? {
            return Err(FlockError::Validation("Post is not liked".to_string()));
        }

        tracing::debug!(actor_id, post_id, "Post unliked");
        Ok(())
    }

    /// Retweet a post, returning the retweet as it would appear in a feed
    pub async fn retweet(&self, actor_id: &str, post_id: &str) -> FlockResult<PostView> {
        self.ensure_post(post_id).await?;

        let retweet = Retweet {
            user_id: actor_id.to_string(),
            post_id: post_id.to_string(),
            retweeted_at: Utc::now(),
        };
        if !self.engagement.add_edge(&retweet).await? {
            return Err(FlockError::Conflict("Post is already retweeted".to_string()));
        }
        self.settle_edge(&EdgeKey::retweet(actor_id, post_id)).await?;

        tracing::info!(actor_id, post_id, "Post retweeted");
        self.materializer
            .materialize_retweet(&retweet, Some(actor_id))
            .await
    }

    pub async fn unretweet(&self, actor_id: &str, post_id: &str) -> FlockResult<()> {
        self.ensure_post(post_id).await?;

        if !self
            .engagement
            .remove_edge(&EdgeKey::retweet(actor_id, post_id))
            .await?
        {
            return Err(FlockError::Validation("Post is not retweeted".to_string()));
        }

        tracing::info!(actor_id, post_id, "Retweet removed");
        Ok(())
    }

    pub async fn follow(&self, follower_id: &str, followee_id: &str) -> FlockResult<()> {
        if follower_id == followee_id {
            return Err(FlockError::Validation("Cannot follow yourself".to_string()));
        }
        self.ensure_account(followee_id).await?;

        let follow = Follow {
            follower_id: follower_id.to_string(),
            followee_id: followee_id.to_string(),
            followed_at: Utc::now(),
        };
        if !self.engagement.add_edge(&follow).await? {
            return Err(FlockError::Conflict("Already following".to_string()));
        }
        self.settle_edge(&EdgeKey::follow(follower_id, followee_id)).await?;

        tracing::info!(follower_id, followee_id, "Follow created");
        Ok(())
    }

    pub async fn unfollow(&self, follower_id: &str, followee_id: &str) -> FlockResult<()> {
        if !self
            .engagement
            .remove_edge(&EdgeKey::follow(follower_id, followee_id))
            .await?
        {
            return Err(FlockError::Validation("Not following".to_string()));
        }

        tracing::info!(follower_id, followee_id, "Follow removed");
        Ok(())
    }

    /// Delete an account with everything it owns.
    ///
    /// Edges the account takes part in go first, then each authored post
    /// with its own cascade, then the account record itself. A second sweep
    /// after the record is gone picks up writes that raced the first one.
    pub async fn delete_account(&self, account_id: &str) -> FlockResult<()> {
        if self.store.fetch::<Account>(account_id).await?.is_none() {
            return Err(FlockError::AccountNotFound(account_id.to_string()));
        }

        let first = self.sweep_account(account_id).await?;
        self.store.delete(Collection::Accounts, account_id).await?;
        // Posts and edges written while the first sweep ran
        let late = self.sweep_account(account_id).await?;

        tracing::info!(
            account_id,
            posts = first.posts + late.posts,
            likes = first.likes + late.likes,
            retweets = first.retweets + late.retweets,
            following = first.following + late.following,
            followers = first.followers + late.followers,
            "Account deleted"
        );
        Ok(())
    }

    /// Remove the account's edges, then each authored post with its own cascade
    async fn sweep_account(&self, account_id: &str) -> FlockResult<AccountSweep> {
        let (likes, retweets, following, followers) = tokio::try_join!(
            self.engagement
                .remove_edges(EdgeKind::Like, EdgeEnd::Actor, account_id),
            self.engagement
                .remove_edges(EdgeKind::Retweet, EdgeEnd::Actor, account_id),
            self.engagement
                .remove_edges(EdgeKind::Follow, EdgeEnd::Actor, account_id),
            self.engagement
                .remove_edges(EdgeKind::Follow, EdgeEnd::Target, account_id),
        )?;

        let authored = Query::new().eq(Post::AUTHOR_ID, account_id);
        let post_ids = self.store.query_ids(Collection::Posts, &authored).await?;
        for post_id in &post_ids {
            self.cascade_post(post_id).await?;
        }
        let posts = self.store.delete_many(Collection::Posts, &post_ids).await?;

        Ok(AccountSweep {
            posts,
            likes,
            retweets,
            following,
            followers,
        })
    }
}
