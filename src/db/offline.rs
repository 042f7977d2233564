//! Offline message queue (§3 `OfflineMessage`, §4.5 offline delivery).

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OfflineMessageRecord {
    pub id: String,
    pub from_account: String,
    pub to_account: String,
    pub content: String,
    pub created_at: i64,
    pub delivered: bool,
}

pub struct OfflineRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OfflineRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn enqueue(
        &self,
        id: &str,
        from_account: &str,
        to_account: &str,
        content: &str,
        now: i64,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO offline_messages (id, from_account, to_account, content, created_at, \
             delivered) VALUES (?, ?, ?, ?, ?, 0)",
        )
        .bind(id)
        .bind(from_account)
        .bind(to_account)
        .bind(content)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Everything still undelivered for `account`, oldest first — the
    /// order §4.5 requires for delivery-on-bring-online.
    pub async fn undelivered_for(&self, account: &str) -> Result<Vec<OfflineMessageRecord>, DbError> {
        let rows = sqlx::query_as::<_, OfflineMessageRecord>(
            "SELECT * FROM offline_messages WHERE to_account = ? COLLATE NOCASE \
             AND delivered = 0 ORDER BY created_at ASC",
        )
        .bind(account)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Marks a batch delivered after a successful push. If this fails
    /// after the push already happened, the next bring-online will
    /// re-deliver — callers are documented (§4.5) to tolerate duplicates.
    pub async fn mark_delivered(&self, ids: &[String]) -> Result<(), DbError> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!("UPDATE offline_messages SET delivered = 1 WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }
        query.execute(self.pool).await?;
        Ok(())
    }
}
