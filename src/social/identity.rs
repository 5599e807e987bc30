/// Identity Resolver - account records to public views
use crate::{
    error::{FlockError, FlockResult},
    models::{Account, AccountView, AuthorSummary},
    social::engagement::{EdgeEnd, EdgeKey, EdgeKind, EngagementIndex},
    store::RecordStore,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn RecordStore>,
    engagement: EngagementIndex,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn RecordStore>, engagement: EngagementIndex) -> Self {
        Self { store, engagement }
    }

    async fn load(&self, account_id: &str) -> FlockResult<Account> {
        self.store
            .fetch::<Account>(account_id)
            .await?
            .ok_or_else(|| FlockError::AccountNotFound(account_id.to_string()))
    }

    /// Resolve an account to its public view, relative to an optional viewer
    pub async fn resolve_account(
        &self,
        account_id: &str,
        viewer_id: Option<&str>,
    ) -> FlockResult<AccountView> {
        let account = self.load(account_id).await?;
        self.view_of(account, viewer_id).await
    }

    /// Build the public view of an already-loaded account
    pub async fn view_of(&self, account: Account, viewer_id: Option<&str>) -> FlockResult<AccountView> {
        let following_check = async {
            match viewer_id {
                Some(viewer) if viewer != account.id => {
                    self.engagement
                        .has_edge(&EdgeKey::follow(viewer, &account.id))
                        .await
                }
                _ => Ok(false),
            }
        };

        let (follower_count, following_count, following) = tokio::try_join!(
            self.engagement
                .count_edges(EdgeKind::Follow, EdgeEnd::Target, &account.id),
            self.engagement
                .count_edges(EdgeKind::Follow, EdgeEnd::Actor, &account.id),
            following_check,
        )?;

        Ok(AccountView {
            id: account.id,
            display_name: account.display_name,
            bio: account.bio,
            avatar_url: account.avatar_url,
            website: account.website,
            location: account.location,
            joined_at: account.joined_at,
            follower_count,
            following_count,
            following,
        })
    }

    /// Minimal author fields for embedding in post views
    pub async fn resolve_author(&self, account_id: &str) -> FlockResult<AuthorSummary> {
        let account = self.load(account_id).await?;

        Ok(AuthorSummary {
            id: account.id,
            display_name: account.display_name,
            avatar_url: account.avatar_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Follow;
    use crate::store::MemoryRecordStore;
    use chrono::Utc;

    async fn setup() -> (IdentityResolver, Arc<dyn RecordStore>) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let engagement = EngagementIndex::new(store.clone());

        for id in ["alice", "bob", "carol"] {
            let account = Account::new(id.to_string(), id.to_uppercase(), "$argon2id$secret".to_string());
            store.save(&account).await.unwrap();
        }

        for (follower, followee) in [("bob", "alice"), ("carol", "alice"), ("alice", "bob")] {
            engagement
                .add_edge(&Follow {
                    follower_id: follower.to_string(),
                    followee_id: followee.to_string(),
                    followed_at: Utc::now(),
                })
                .await
                .unwrap();
        }

        (IdentityResolver::new(store.clone(), engagement), store)
    }

    #[tokio::test]
    async fn test_resolve_account_counts_and_flag() {
        let (resolver, _store) = setup().await;

        let view = resolver.resolve_account("alice", Some("bob")).await.unwrap();
        assert_eq!(view.follower_count, 2);
        assert_eq!(view.following_count, 1);
        assert!(view.following);

        let view = resolver.resolve_account("bob", Some("carol")).await.unwrap();
        assert!(!view.following);
    }

    #[tokio::test]
    async fn test_self_and_anonymous_views_have_no_flag() {
        let (resolver, _store) = setup().await;

        assert!(!resolver.resolve_account("alice", Some("alice")).await.unwrap().following);
        assert!(!resolver.resolve_account("alice", None).await.unwrap().following);
    }

    #[tokio::test]
    async fn test_view_never_carries_credentials() {
        let (resolver, _store) = setup().await;

        for viewer in [None, Some("bob"), Some("alice")] {
            let view = resolver.resolve_account("alice", viewer).await.unwrap();
            let json = serde_json::to_value(&view).unwrap();
            let object = json.as_object().unwrap();

            assert!(!object.keys().any(|k| k.to_lowercase().contains("password")));
            assert!(!object.contains_key("idLowercase"));
            assert!(!object.contains_key("displayNameLowercase"));
            assert!(!json.to_string().contains("$argon2id$secret"));
        }
    }

    #[tokio::test]
    async fn test_missing_account() {
        let (resolver, _store) = setup().await;

        assert!(matches!(
            resolver.resolve_account("ghost", None).await,
            Err(FlockError::AccountNotFound(id)) if id == "ghost"
        ));
        assert!(matches!(
            resolver.resolve_author("ghost").await,
            Err(FlockError::AccountNotFound(_))
        ));
    }
}
