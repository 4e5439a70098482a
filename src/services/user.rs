use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::Utc;
use log::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::{Credentials, NewUser, ProfileUpdate, UserAccount, UserDocument};
use crate::schema::registry::USERS;
use crate::store::{SharedStore, StoreError};
use crate::utils::validation::validate_payload;

fn duplicate(username: &str) -> AppError {
    AppError::DuplicateId(format!("A user with username {} already exists", username))
}

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid username or password".to_string())
}

/// Registration and profile management over the `users` collection.
pub struct UserService {
    store: SharedStore,
}

impl UserService {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    async fn load(&self, username: &str) -> Result<Option<UserDocument>, AppError> {
        match self.store.find_one(USERS, username).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    pub async fn register(&self, new_user: NewUser) -> Result<UserAccount, AppError> {
        validate_payload(&new_user)?;

        if self.load(&new_user.username).await?.is_some() {
            return Err(duplicate(&new_user.username));
        }

        let salt = SaltString::generate(&mut rand::thread_rng());
        let password_hash = Argon2::default()
            .hash_password(new_user.password.as_bytes(), &salt)
            .map_err(|e| {
                error!("Password hashing failed: {}", e);
                AppError::InternalServerError("Hashing error".to_string())
            })?
            .to_string();

        let account = UserAccount {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email.filter(|e| !e.is_empty()),
            first_name: new_user.first_name.unwrap_or_default(),
            last_name: new_user.last_name.unwrap_or_default(),
            is_active: true,
            date_joined: Utc::now(),
        };
        let doc = serde_json::to_value(UserDocument {
            account: account.clone(),
            password_hash,
        })?;

        self.store
            .insert_one(USERS, &account.username, doc)
            .await
            .map_err(|err| match err {
                StoreError::DuplicateKey { .. } => duplicate(&account.username),
                other => other.into(),
            })?;

        info!("Registered user {}", account.username);
        Ok(account)
    }

    /// Checks credentials; inactive accounts cannot sign in.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<UserAccount, AppError> {
        let user = self
            .load(&credentials.username)
            .await?
            .ok_or_else(invalid_credentials)?;

        let parsed_hash = PasswordHash::new(&user.password_hash).map_err(|e| {
            error!("Stored password hash for {} is invalid: {}", credentials.username, e);
            AppError::InternalServerError("Invalid password hash".to_string())
        })?;
        Argon2::default()
            .verify_password(credentials.password.as_bytes(), &parsed_hash)
            .map_err(|_| invalid_credentials())?;

        if !user.account.is_active {
            return Err(AppError::Unauthorized("Account is disabled".to_string()));
        }
        Ok(user.account)
    }

    pub async fn profile(&self, username: &str) -> Result<UserAccount, AppError> {
        match self.load(username).await? {
            Some(user) if user.account.is_active => Ok(user.account),
            _ => Err(AppError::Unauthorized("User not found or unauthorized".to_string())),
        }
    }

    pub async fn update_profile(
        &self,
        username: &str,
        changes: ProfileUpdate,
    ) -> Result<UserAccount, AppError> {
        let mut user = self
            .load(username)
            .await?
            .filter(|u| u.account.is_active)
            .ok_or_else(|| AppError::Unauthorized("User not found or unauthorized".to_string()))?;

        if let Some(email) = changes.email {
            user.account.email = Some(email).filter(|e| !e.is_empty());
        }
        if let Some(first_name) = changes.first_name {
            user.account.first_name = first_name;
        }
        if let Some(last_name) = changes.last_name {
            user.account.last_name = last_name;
        }

        let doc = serde_json::to_value(&user)?;
        if !self.store.replace_one(USERS, username, doc).await? {
            return Err(AppError::Unauthorized("User not found or unauthorized".to_string()));
        }
        info!("Updated profile of {}", username);
        Ok(user.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin;
    use crate::schema::EnforcementMode;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    async fn service() -> UserService {
        let store: SharedStore = Arc::new(MemoryStore::new());
        admin::bootstrap(&store, EnforcementMode::Error).await.unwrap();
        UserService::new(store)
    }

    fn new_user(username: &str, email: Option<&str>) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "correct horse".to_string(),
            email: email.map(str::to_string),
            first_name: Some("Test".to_string()),
            last_name: None,
        }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let service = service().await;
        let account = service
            .register(new_user("testuser123", Some("test@example.com")))
            .await
            .unwrap();
        assert!(account.is_active);

        let credentials = Credentials {
            username: "testuser123".into(),
            password: "correct horse".into(),
        };
        assert_eq!(service.authenticate(&credentials).await.unwrap().id, account.id);

        let wrong = Credentials {
            username: "testuser123".into(),
            password: "battery staple".into(),
        };
        assert!(matches!(service.authenticate(&wrong).await, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn email_is_optional_but_checked() {
        let service = service().await;
        service.register(new_user("no_mail", None)).await.unwrap();
        let err = service.register(new_user("bad_mail", Some("invalid-email"))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[tokio::test]
    async fn short_password_and_bad_username_are_rejected() {
        let service = service().await;
        let mut short = new_user("shorty", None);
        short.password = "1234".into();
        assert!(matches!(service.register(short).await, Err(AppError::Validation { .. })));
        assert!(matches!(
            service.register(new_user("x", None)).await,
            Err(AppError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let service = service().await;
        service.register(new_user("alice", None)).await.unwrap();
        assert!(matches!(
            service.register(new_user("alice", None)).await,
            Err(AppError::DuplicateId(_))
        ));
    }

    #[tokio::test]
    async fn profile_update_is_validated() {
        let service = service().await;
        service.register(new_user("alice", None)).await.unwrap();

        let updated = service
            .update_profile(
                "alice",
                ProfileUpdate {
                    email: Some("alice@example.com".into()),
                    last_name: Some("Liddell".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.email.as_deref(), Some("alice@example.com"));
        assert_eq!(updated.first_name, "Test");

        let err = service
            .update_profile(
                "alice",
                ProfileUpdate {
                    first_name: Some("x".repeat(51)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
        assert_eq!(service.profile("alice").await.unwrap().first_name, "Test");
    }
}
