//! Character repository (§3 `Character`). The `isOnline`/`lastSeen`
//! columns here are persisted last-known state only — the Presence
//! Registry, not this table, is authoritative for routing (§4.3).

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CharacterRecord {
    pub id: String,
    pub user_id: String,
    pub account: String,
    pub nickname: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub is_online: bool,
    pub last_seen: Option<i64>,
    pub created_at: i64,
}

pub struct CharacterRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CharacterRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a brand-new character. Fails with `AccountTaken` if the
    /// account is already registered to anyone.
    pub async fn create(
        &self,
        id: &str,
        user_id: &str,
        account: &str,
        nickname: &str,
        avatar: Option<&str>,
        bio: Option<&str>,
        now: i64,
    ) -> Result<CharacterRecord, DbError> {
        let result = sqlx::query(
            "INSERT INTO characters (id, user_id, account, nickname, avatar, bio, is_online, \
             last_seen, created_at) VALUES (?, ?, ?, ?, ?, ?, 0, NULL, ?)",
        )
        .bind(id)
        .bind(user_id)
        .bind(account)
        .bind(nickname)
        .bind(avatar)
        .bind(bio)
        .bind(now)
        .execute(self.pool)
        .await;

        if let Err(sqlx::Error::Database(ref db_err)) = result
            && db_err.is_unique_violation()
        {
            return Err(DbError::AccountTaken(account.to_string()));
        }
        result?;

        Ok(CharacterRecord {
            id: id.to_string(),
            user_id: user_id.to_string(),
            account: account.to_string(),
            nickname: nickname.to_string(),
            avatar: avatar.map(str::to_string),
            bio: bio.map(str::to_string),
            is_online: false,
            last_seen: None,
            created_at: now,
        })
    }

    /// Case-insensitive lookup, used by search and by presence operations
    /// that take a `wx_account` from the wire.
    pub async fn find_by_account(&self, account: &str) -> Result<Option<CharacterRecord>, DbError> {
        let row = sqlx::query_as::<_, CharacterRecord>(
            "SELECT * FROM characters WHERE account = ? COLLATE NOCASE",
        )
        .bind(account)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_for_user(&self, user_id: &str) -> Result<Vec<CharacterRecord>, DbError> {
        let rows = sqlx::query_as::<_, CharacterRecord>(
            "SELECT * FROM characters WHERE user_id = ? ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Characters marked online in the store for a given user — used by
    /// `Presence::restore` on reconnect (§4.3).
    pub async fn find_online_for_user(&self, user_id: &str) -> Result<Vec<CharacterRecord>, DbError> {
        let rows = sqlx::query_as::<_, CharacterRecord>(
            "SELECT * FROM characters WHERE user_id = ? AND is_online = 1",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Upsert the online snapshot for a bring-online. Avatars over 10,000
    /// characters are cleared, not truncated, matching §3's avatar cap
    /// policy for the global Character. This differs from the per-group
    /// 65,000-byte truncation policy in `groups::truncate_avatar`.
    pub async fn bring_online(
        &self,
        account: &str,
        nickname: &str,
        avatar: Option<&str>,
        bio: Option<&str>,
        now: i64,
    ) -> Result<(), DbError> {
        let avatar = avatar.filter(|a| a.chars().count() <= 10_000);
        sqlx::query(
            "UPDATE characters SET nickname = ?, avatar = ?, bio = ?, is_online = 1, \
             last_seen = ? WHERE account = ? COLLATE NOCASE",
        )
        .bind(nickname)
        .bind(avatar)
        .bind(bio)
        .bind(now)
        .bind(account)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn bring_offline(&self, account: &str, now: i64) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE characters SET is_online = 0, last_seen = ? WHERE account = ? COLLATE NOCASE",
        )
        .bind(now)
        .bind(account)
        .execute(self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn oversized_avatar_is_cleared_on_bring_online() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.users().create("u1", "alice", None, "hash", 0).await.unwrap();
        let repo = db.characters();
        repo.create("c1", "u1", "a_wx", "Alice", None, None, 0).await.unwrap();

        let huge = "x".repeat(10_001);
        repo.bring_online("a_wx", "Alice", Some(&huge), None, 10).await.unwrap();

        let found = repo.find_by_account("a_wx").await.unwrap().unwrap();
        assert!(found.avatar.is_none());
        assert!(found.is_online);
    }

    #[tokio::test]
    async fn find_by_account_is_case_insensitive() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.users().create("u1", "alice", None, "hash", 0).await.unwrap();
        db.characters().create("c1", "u1", "A_Wx", "Alice", None, None, 0).await.unwrap();

        let found = db.characters().find_by_account("a_wx").await.unwrap();
        assert!(found.is_some());
    }
}
