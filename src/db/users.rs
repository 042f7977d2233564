//! User repository (§3 `User`, §4.2 Identity Service backing store).

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub created_at: i64,
    pub last_login: Option<i64>,
}

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        id: &str,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        now: i64,
    ) -> Result<UserRecord, DbError> {
        let result = sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at, last_login) \
             VALUES (?, ?, ?, ?, ?, NULL)",
        )
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .execute(self.pool)
        .await;

        if let Err(sqlx::Error::Database(ref db_err)) = result
            && db_err.is_unique_violation()
        {
            return Err(DbError::UsernameTaken(username.to_string()));
        }
        result?;

        Ok(UserRecord {
            id: id.to_string(),
            username: username.to_string(),
            email: email.map(str::to_string),
            password_hash: password_hash.to_string(),
            created_at: now,
            last_login: None,
        })
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<UserRecord>, DbError> {
        let row = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    pub async fn touch_last_login(&self, id: &str, now: i64) -> Result<(), DbError> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
