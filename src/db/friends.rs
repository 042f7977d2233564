//! Friend graph and friend-request lifecycle (§3 `Friendship`,
//! `FriendRequest`; §4.5).

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendRequestStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "accepted" => Self::Accepted,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FriendRequestRecord {
    pub id: String,
    pub from_account: String,
    pub to_account: String,
    pub message: Option<String>,
    pub status: FriendRequestStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for FriendRequestRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            from_account: row.try_get("from_account")?,
            to_account: row.try_get("to_account")?,
            message: row.try_get("message")?,
            status: FriendRequestStatus::from_str(&status),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Canonicalize an unordered pair so `(a,b)` and `(b,a)` hit the same row.
fn ordered_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a.to_lowercase() <= b.to_lowercase() { (a, b) } else { (b, a) }
}

pub struct FriendRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FriendRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn are_friends(&self, a: &str, b: &str) -> Result<bool, DbError> {
        let (x, y) = ordered_pair(a, b);
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM friendships WHERE account_a = ? COLLATE NOCASE \
             AND account_b = ? COLLATE NOCASE)",
        )
        .bind(x)
        .bind(y)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    /// Idempotent insert: accepting the same request twice (or a
    /// concurrent double-accept) never produces a duplicate row.
    pub async fn add_friendship(&self, a: &str, b: &str, now: i64) -> Result<(), DbError> {
        let (x, y) = ordered_pair(a, b);
        sqlx::query(
            "INSERT OR IGNORE INTO friendships (account_a, account_b, created_at) VALUES (?, ?, ?)",
        )
        .bind(x)
        .bind(y)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_request(
        &self,
        id: &str,
        from_account: &str,
        to_account: &str,
        message: Option<&str>,
        now: i64,
    ) -> Result<FriendRequestRecord, DbError> {
        sqlx::query(
            "INSERT INTO friend_requests (id, from_account, to_account, message, status, \
             created_at, updated_at) VALUES (?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(id)
        .bind(from_account)
        .bind(to_account)
        .bind(message)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(FriendRequestRecord {
            id: id.to_string(),
            from_account: from_account.to_string(),
            to_account: to_account.to_string(),
            message: message.map(str::to_string),
            status: FriendRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_request(&self, id: &str) -> Result<Option<FriendRequestRecord>, DbError> {
        let row = sqlx::query_as::<_, FriendRequestRecord>(
            "SELECT * FROM friend_requests WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn pending_for_account(
        &self,
        account: &str,
    ) -> Result<Vec<FriendRequestRecord>, DbError> {
        let rows = sqlx::query_as::<_, FriendRequestRecord>(
            "SELECT * FROM friend_requests WHERE to_account = ? COLLATE NOCASE \
             AND status = 'pending' ORDER BY created_at",
        )
        .bind(account)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Transition pending → `status`, only if still pending. Returns
    /// `false` if the request was already resolved (the exactly-once
    /// transition guard from §3).
    pub async fn resolve_request(
        &self,
        id: &str,
        status: FriendRequestStatus,
        now: i64,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            "UPDATE friend_requests SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn friendship_lookup_is_symmetric() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.friends().add_friendship("alice", "bob", 0).await.unwrap();
        assert!(db.friends().are_friends("alice", "bob").await.unwrap());
        assert!(db.friends().are_friends("bob", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn resolve_request_is_exactly_once() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.friends()
            .create_request("r1", "alice", "bob", None, 0)
            .await
            .unwrap();

        let first = db
            .friends()
            .resolve_request("r1", FriendRequestStatus::Accepted, 1)
            .await
            .unwrap();
        assert!(first);

        let second = db
            .friends()
            .resolve_request("r1", FriendRequestStatus::Rejected, 2)
            .await
            .unwrap();
        assert!(!second);
    }
}
