/// Account manager backed by the record store
use crate::{
    account::ProfileUpdate,
    config::ServerConfig,
    error::{FlockError, FlockResult},
    models::{Account, AccountView},
    social::IdentityResolver,
    store::{Collection, Direction, Query, RecordStore},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use validator::Validate;

const BAD_CREDENTIALS: &str = "Incorrect user id or password";

/// Login token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Account manager service
#[derive(Clone)]
pub struct AccountManager {
    store: Arc<dyn RecordStore>,
    identity: IdentityResolver,
    config: Arc<ServerConfig>,
}

impl AccountManager {
    pub fn new(store: Arc<dyn RecordStore>, identity: IdentityResolver, config: Arc<ServerConfig>) -> Self {
        Self {
            store,
            identity,
            config,
        }
    }

    /// Create a new account
    pub async fn signup(&self, user_id: &str, display_name: &str, password: &str) -> FlockResult<AccountView> {
        Self::validate_account_id(user_id)?;

        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(FlockError::Validation("Display name cannot be empty".to_string()));
        }
        if password.chars().count() < 8 {
            return Err(FlockError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }

        let password_hash = hash_password(password.to_string()).await?;
        let account = Account::new(user_id.to_string(), display_name.to_string(), password_hash);

        if !self.store.create(&account).await? {
            return Err(FlockError::Conflict(format!("User id {} already taken", user_id)));
        }

        tracing::info!(account_id = %account.id, "Account created");

        self.identity.view_of(account, Some(user_id)).await
    }

    /// Check credentials, record the login and issue a token
    pub async fn login(&self, user_id: &str, password: &str) -> FlockResult<(AccountView, String)> {
        // Unknown id and wrong password are indistinguishable to the caller
        let Some(mut account) = self.store.fetch::<Account>(user_id).await? else {
            tracing::warn!(user_id, "Login for unknown account");
            return Err(FlockError::Authentication(BAD_CREDENTIALS.to_string()));
        };

        if !verify_password(password.to_string(), account.password_hash.clone()).await? {
            tracing::warn!(user_id, "Login with wrong password");
            return Err(FlockError::Authentication(BAD_CREDENTIALS.to_string()));
        }

        account.last_login_at = Some(Utc::now());
        self.store.save(&account).await?;

        let token = self.issue_token(&account.id)?;
        tracing::info!(account_id = %account.id, "Login succeeded");

        let view = self.identity.view_of(account, Some(user_id)).await?;
        Ok((view, token))
    }

    /// Sign a login token for an account
    pub fn issue_token(&self, account_id: &str) -> FlockResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: account_id.to_string(),
            iat: now,
            exp: now + self.config.authentication.token_ttl,
        };

        self.encode_claims(&claims)
    }

    fn encode_claims(&self, claims: &Claims) -> FlockResult<String> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes()),
        )
        .map_err(|e| FlockError::Jwt(format!("Failed to generate token: {}", e)))
    }

    /// Verify a login token and return the account id it names.
    ///
    /// Expired tokens and tokens for deleted accounts are `Authentication`
    /// errors; tokens that fail to parse or verify are `Jwt` errors.
    pub async fn validate_token(&self, token: &str) -> FlockResult<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;

        let decoding_key = DecodingKey::from_secret(self.config.authentication.jwt_secret.as_bytes());
        let data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    FlockError::Authentication("Token has expired".to_string())
                }
                _ => {
                    tracing::debug!("Token verification failed: {}", e);
                    FlockError::Jwt(format!("Invalid token: {}", e))
                }
            }
        })?;

        let account_id = data.claims.sub;
        if !self.store.exists(Collection::Accounts, &account_id).await? {
            tracing::warn!(%account_id, "Valid token for missing account");
            return Err(FlockError::Authentication("Login token is compromised".to_string()));
        }

        Ok(account_id)
    }

    /// The caller's own account view
    pub async fn current_account(&self, account_id: &str) -> FlockResult<AccountView> {
        self.identity
            .resolve_account(account_id, Some(account_id))
            .await
    }

    /// Apply a profile patch
    pub async fn update_profile(&self, account_id: &str, update: ProfileUpdate) -> FlockResult<AccountView> {
        update.validate()?;
        if update.is_empty() {
            return Err(FlockError::Validation("No changes".to_string()));
        }

        let mut account = self
            .store
            .fetch::<Account>(account_id)
            .await?
            .ok_or_else(|| FlockError::AccountNotFound(account_id.to_string()))?;

        if let Some(display_name) = update.display_name {
            let display_name = display_name.trim().to_string();
            if display_name.is_empty() {
                return Err(FlockError::Validation("Display name cannot be empty".to_string()));
            }
            account.display_name_lowercase = display_name.to_lowercase();
            account.display_name = display_name;
        }

        let clear_if_empty = |value: String| Some(value).filter(|v| !v.trim().is_empty());
        if let Some(bio) = update.bio {
            account.bio = clear_if_empty(bio);
        }
        if let Some(avatar_url) = update.avatar_url {
            account.avatar_url = clear_if_empty(avatar_url);
        }
        if let Some(website) = update.website {
            account.website = clear_if_empty(website);
        }
        if let Some(location) = update.location {
            account.location = clear_if_empty(location);
        }

        self.store.save(&account).await?;
        tracing::info!(account_id, "Profile updated");

        self.identity.view_of(account, Some(account_id)).await
    }

    /// Prefix search over ids and display names.
    ///
    /// Each list scores `longest_list_len - rank` per hit; an account found
    /// by both sums the two. Highest score first, ties by id.
    pub async fn search(&self, keyword: &str, limit: usize) -> FlockResult<Vec<String>> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return Err(FlockError::Validation("Search keyword cannot be empty".to_string()));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let by_id = Query::new()
            .prefix(Account::ID_LOWERCASE, &keyword)
            .order_by(Account::ID_LOWERCASE, Direction::Asc)
            .limit(limit);
        let by_name = Query::new()
            .prefix(Account::DISPLAY_NAME_LOWERCASE, &keyword)
            .order_by(Account::DISPLAY_NAME_LOWERCASE, Direction::Asc)
            .limit(limit);

        let (by_id, by_name) = tokio::try_join!(
            self.store.query_ids(Collection::Accounts, &by_id),
            self.store.query_ids(Collection::Accounts, &by_name),
        )?;

        let max_len = by_id.len().max(by_name.len());
        let mut scores: HashMap<String, usize> = HashMap::new();
        for list in [by_id, by_name] {
            for (rank, id) in list.into_iter().enumerate() {
                *scores.entry(id).or_default() += max_len - rank;
            }
        }

        let mut ranked: Vec<(String, usize)> = scores.into_iter().collect();
        ranked.sort_by(|(a_id, a_score), (b_id, b_score)| {
            b_score.cmp(a_score).then_with(|| a_id.cmp(b_id))
        });
        ranked.truncate(limit);

        tracing::debug!(keyword = %keyword, results = ranked.len(), "User search");

        Ok(ranked.into_iter().map(|(id, _)| id).collect())
    }

    /// Validate account id format
    fn validate_account_id(user_id: &str) -> FlockResult<()> {
        let len = user_id.chars().count();
        if !(3..=30).contains(&len) {
            return Err(FlockError::Validation(
                "User id must be 3 to 30 characters".to_string(),
            ));
        }

        if !user_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FlockError::Validation(
                "User id may only contain letters, digits and underscores".to_string(),
            ));
        }

        Ok(())
    }
}

/// Argon2id PHC string for a password; runs off the async executor
async fn hash_password(password: String) -> FlockResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| FlockError::Internal(format!("Password hashing failed: {}", e)))
    })
    .await
    .map_err(|e| FlockError::Internal(format!("Password hashing task failed: {}", e)))?
}

async fn verify_password(password: String, hash: String) -> FlockResult<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)
            .map_err(|e| FlockError::Internal(format!("Stored password hash is invalid: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| FlockError::Internal(format!("Password verification task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::EngagementIndex;
    use crate::store::MemoryRecordStore;

    fn create_test_manager() -> (AccountManager, Arc<dyn RecordStore>) {
        let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let identity = IdentityResolver::new(store.clone(), EngagementIndex::new(store.clone()));
        let config = Arc::new(ServerConfig::for_tests());

        (AccountManager::new(store.clone(), identity, config), store)
    }

    #[tokio::test]
    async fn test_signup_and_login() {
        let (manager, store) = create_test_manager();

        let view = manager.signup("alice_01", "Alice", "correct horse").await.unwrap();
        assert_eq!(view.id, "alice_01");
        assert_eq!(view.follower_count, 0);

        let stored = store.fetch::<Account>("alice_01").await.unwrap().unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$"));
        assert!(stored.last_login_at.is_none());

        let (view, token) = manager.login("alice_01", "correct horse").await.unwrap();
        assert_eq!(view.display_name, "Alice");
        assert_eq!(manager.validate_token(&token).await.unwrap(), "alice_01");

        let stored = store.fetch::<Account>("alice_01").await.unwrap().unwrap();
        assert!(stored.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_signup_rules() {
        let (manager, _store) = create_test_manager();

        let too_long = "x".repeat(31);
        for bad_id in ["ab", "has space", "dash-ed", too_long.as_str()] {
            assert!(matches!(
                manager.signup(bad_id, "Name", "long enough").await,
                Err(FlockError::Validation(_))
            ));
        }
        assert!(matches!(
            manager.signup("bob", "Bob", "short").await,
            Err(FlockError::Validation(_))
        ));

        manager.signup("bob", "Bob", "long enough").await.unwrap();
        assert!(matches!(
            manager.signup("bob", "Other Bob", "long enough").await,
            Err(FlockError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let (manager, _store) = create_test_manager();
        manager.signup("carol", "Carol", "password123").await.unwrap();

        let wrong_password = manager.login("carol", "password124").await.unwrap_err();
        let unknown_id = manager.login("nobody", "password123").await.unwrap_err();

        assert_eq!(wrong_password.to_string(), unknown_id.to_string());
        assert!(matches!(wrong_password, FlockError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_token_failures() {
        let (manager, store) = create_test_manager();
        manager.signup("dave", "Dave", "password123").await.unwrap();

        let now = Utc::now().timestamp();
        let expired = manager
            .encode_claims(&Claims {
                sub: "dave".to_string(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();
        assert!(matches!(
            manager.validate_token(&expired).await,
            Err(FlockError::Authentication(msg)) if msg == "Token has expired"
        ));

        assert!(matches!(
            manager.validate_token("not-a-jwt").await,
            Err(FlockError::Jwt(_))
        ));

        let token = manager.issue_token("dave").unwrap();
        store.delete(Collection::Accounts, "dave").await.unwrap();
        assert!(matches!(
            manager.validate_token(&token).await,
            Err(FlockError::Authentication(msg)) if msg == "Login token is compromised"
        ));
    }

    #[tokio::test]
    async fn test_update_profile() {
        let (manager, store) = create_test_manager();
        manager.signup("erin", "Erin", "password123").await.unwrap();

        assert!(matches!(
            manager.update_profile("erin", ProfileUpdate::default()).await,
            Err(FlockError::Validation(_))
        ));

        let view = manager
            .update_profile(
                "erin",
                ProfileUpdate {
                    display_name: Some("Erin Q".to_string()),
                    bio: Some("hello".to_string()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(view.display_name, "Erin Q");
        assert_eq!(view.bio.as_deref(), Some("hello"));

        let stored = store.fetch::<Account>("erin").await.unwrap().unwrap();
        assert_eq!(stored.display_name_lowercase, "erin q");

        let view = manager
            .update_profile(
                "erin",
                ProfileUpdate {
                    bio: Some(String::new()),
                    ..ProfileUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(view.bio.is_none());
    }

    #[tokio::test]
    async fn test_search_ranking() {
        let (manager, store) = create_test_manager();
        for (id, name) in [("alice", "Alice Smith"), ("alicia", "Zed"), ("bob", "Alien Bob"), ("carl", "Carl")] {
            store
                .save(&Account::new(id.to_string(), name.to_string(), "h".to_string()))
                .await
                .unwrap();
        }

        // alice matches both lists and leads; alicia and bob tie and sort by id
        assert_eq!(manager.search("ALI", 10).await.unwrap(), vec!["alice", "alicia", "bob"]);
        assert_eq!(manager.search("ali", 2).await.unwrap(), vec!["alice", "alicia"]);
        assert!(manager.search("zzz", 10).await.unwrap().is_empty());
        assert!(matches!(
            manager.search("  ", 10).await,
            Err(FlockError::Validation(_))
        ));
    }
}
