//! Identity Service (§4.2): registration, password login, token
//! issuance/verification, and session bootstrap via `auth`.

use crate::db::Database;
use crate::error::{AppError, AppResult};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;
const MIN_PASSWORD_LEN: usize = 6;

fn valid_username(username: &str) -> bool {
    let len_ok = (3..=20).contains(&username.len());
    len_ok && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Token payload: `{userId, username, exp}` per §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub exp: i64,
    pub iat: i64,
}

pub struct RegisteredUser {
    pub user_id: String,
    pub username: String,
    pub token: String,
}

pub struct IdentityService {
    db: Database,
    token_secret: String,
}

impl IdentityService {
    pub fn new(db: Database, token_secret: String) -> Self {
        Self { db, token_secret }
    }

    fn issue_token(&self, user_id: &str, username: &str) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.token_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }

    fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.token_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::AuthRejected("invalid or expired token".into()))?;
        Ok(data.claims)
    }

    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> AppResult<RegisteredUser> {
        if !valid_username(username) {
            return Err(AppError::Invalid(
                "username must be 3-20 chars of letters, digits, underscore".into(),
            ));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(AppError::Invalid("password must be at least 6 characters".into()));
        }
        if self.db.users().find_by_username(username).await?.is_some() {
            return Err(AppError::Conflict(format!("username {username} already taken")));
        }

        let hash = crate::security::hash_password(password.to_string())
            .await
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

        let user_id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let user = self.db.users().create(&user_id, username, email, &hash, now).await?;
        let token = self.issue_token(&user.id, &user.username)?;

        Ok(RegisteredUser { user_id: user.id, username: user.username, token })
    }

    pub async fn login(&self, username: &str, password: &str) -> AppResult<RegisteredUser> {
        let user = self
            .db
            .users()
            .find_by_username(username)
            .await?
            .ok_or_else(|| AppError::AuthRejected("invalid username or password".into()))?;

        let ok = crate::security::verify_password(password.to_string(), user.password_hash.clone())
            .await
            .map_err(|e| AppError::Internal(format!("password verification failed: {e}")))?;
        if !ok {
            return Err(AppError::AuthRejected("invalid username or password".into()));
        }

        let now = Utc::now().timestamp_millis();
        self.db.users().touch_last_login(&user.id, now).await?;
        let token = self.issue_token(&user.id, &user.username)?;

        Ok(RegisteredUser { user_id: user.id, username: user.username, token })
    }

    /// Verify the token and load the user. Does not touch presence —
    /// the caller binds the session and restores characters (§4.3).
    pub async fn authenticate(&self, token: &str) -> AppResult<crate::db::UserRecord> {
        let claims = self.verify_token(token)?;
        self.db
            .users()
            .find_by_id(&claims.sub)
            .await?
            .ok_or_else(|| AppError::AuthRejected("user no longer exists".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service() -> IdentityService {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        IdentityService::new(db, "test-secret".into())
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let svc = service().await;
        let err = svc.register("alice", None, "abc").await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[tokio::test]
    async fn register_rejects_bad_username_shape() {
        let svc = service().await;
        let err = svc.register("a", None, "longenough").await.unwrap_err();
        assert!(matches!(err, AppError::Invalid(_)));
    }

    #[tokio::test]
    async fn register_then_login_round_trips() {
        let svc = service().await;
        svc.register("alice", None, "password1").await.unwrap();
        let logged_in = svc.login("alice", "password1").await.unwrap();
        assert_eq!(logged_in.username, "alice");
    }

    #[tokio::test]
    async fn login_rejects_wrong_password() {
        let svc = service().await;
        svc.register("alice", None, "password1").await.unwrap();
        let err = svc.login("alice", "wrong").await.unwrap_err();
        assert!(matches!(err, AppError::AuthRejected(_)));
    }

    #[tokio::test]
    async fn duplicate_registration_is_conflict() {
        let svc = service().await;
        svc.register("alice", None, "password1").await.unwrap();
        let err = svc.register("alice", None, "password2").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn authenticate_round_trips_through_issued_token() {
        let svc = service().await;
        let reg = svc.register("alice", None, "password1").await.unwrap();
        let user = svc.authenticate(&reg.token).await.unwrap();
        assert_eq!(user.username, "alice");
    }

    #[tokio::test]
    async fn authenticate_rejects_garbage_token() {
        let svc = service().await;
        let err = svc.authenticate("not-a-token").await.unwrap_err();
        assert!(matches!(err, AppError::AuthRejected(_)));
    }
}
