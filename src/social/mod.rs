/// Social core
///
/// Read path (identity resolution, engagement counts, post materialization,
/// feed assembly) and the write path that keeps edges and cascades consistent.

pub mod actions;
pub mod engagement;
pub mod feed;
pub mod identity;
pub mod materializer;

#[cfg(test)]
pub(crate) mod fixtures;

pub use actions::{NewPost, PostEdit, SocialActions};
pub use engagement::EngagementIndex;
pub use feed::{FeedAssembler, FeedPage, FeedScope};
pub use identity::IdentityResolver;
pub use materializer::PostMaterializer;

use crate::{config::FeedConfig, store::RecordStore};
use std::sync::Arc;

/// Every social component, wired over one shared record store
#[derive(Clone)]
pub struct SocialGraph {
    pub engagement: EngagementIndex,
    pub identity: IdentityResolver,
    pub materializer: PostMaterializer,
    pub feed: FeedAssembler,
    pub actions: SocialActions,
}

impl SocialGraph {
    pub fn new(store: Arc<dyn RecordStore>, feed_config: FeedConfig) -> Self {
        let engagement = EngagementIndex::new(store.clone());
        let identity = IdentityResolver::new(store.clone(), engagement.clone());
        let materializer = PostMaterializer::new(store.clone(), engagement.clone(), identity.clone());
        let feed = FeedAssembler::new(
            store.clone(),
            engagement.clone(),
            materializer.clone(),
            feed_config,
        );
        let actions = SocialActions::new(store, engagement.clone(), materializer.clone());

        Self {
            engagement,
            identity,
            materializer,
            feed,
            actions,
        }
    }
}
