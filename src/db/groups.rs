//! Group chat storage (§3 `Group`, `GroupMember`, `GroupMessage`; §4.6,
//! §4.7). Redpacket state lives inside a `GroupMessage.content` JSON blob
//! per §4.7 — this repository only persists and reloads that blob; the
//! claim arithmetic lives in [`crate::redpacket`].

use super::DbError;
use sqlx::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub creator_account: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupMemberRecord {
    pub group_id: String,
    pub account: String,
    pub character_name: Option<String>,
    pub character_avatar: Option<String>,
    pub character_desc: Option<String>,
    pub joined_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GroupMessageRecord {
    pub id: String,
    pub group_id: String,
    pub sender_type: String,
    pub sender_account: String,
    pub sender_name: String,
    pub character_name: Option<String>,
    pub content: String,
    pub msg_type: String,
    pub created_at: i64,
}

/// 65,000-byte cap on per-group persona avatars (§3), silently truncated
/// — distinct from the global Character's clear-above-10,000-chars policy.
const GROUP_AVATAR_CAP_BYTES: usize = 65_000;

fn truncate_avatar(avatar: Option<&str>) -> Option<String> {
    avatar.map(|a| {
        if a.len() <= GROUP_AVATAR_CAP_BYTES {
            a.to_string()
        } else {
            let mut end = GROUP_AVATAR_CAP_BYTES;
            while !a.is_char_boundary(end) {
                end -= 1;
            }
            a[..end].to_string()
        }
    })
}

pub struct GroupRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> GroupRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the group then insert the creator's membership. Not wrapped
    /// in a transaction (§9 "non-transactional group creation"): on
    /// member-insert failure the just-created group row is best-effort
    /// deleted and the error surfaced.
    pub async fn create_online_group(
        &self,
        group_id: &str,
        name: &str,
        avatar: Option<&str>,
        creator_account: &str,
        persona_name: &str,
        persona_avatar: Option<&str>,
        persona_desc: Option<&str>,
        now: i64,
    ) -> Result<GroupRecord, DbError> {
        sqlx::query(
            "INSERT INTO groups (id, name, avatar, creator_account, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(group_id)
        .bind(name)
        .bind(avatar)
        .bind(creator_account)
        .bind(now)
        .execute(self.pool)
        .await?;

        let persona_avatar = truncate_avatar(persona_avatar);
        let insert_member = sqlx::query(
            "INSERT INTO group_members (group_id, account, character_name, character_avatar, \
             character_desc, joined_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(group_id)
        .bind(creator_account)
        .bind(persona_name)
        .bind(persona_avatar.as_deref())
        .bind(persona_desc)
        .bind(now)
        .execute(self.pool)
        .await;

        if let Err(e) = insert_member {
            let _ = sqlx::query("DELETE FROM groups WHERE id = ?")
                .bind(group_id)
                .execute(self.pool)
                .await;
            return Err(e.into());
        }

        Ok(GroupRecord {
            id: group_id.to_string(),
            name: name.to_string(),
            avatar: avatar.map(str::to_string),
            creator_account: creator_account.to_string(),
            created_at: now,
        })
    }

    pub async fn find_group(&self, group_id: &str) -> Result<Option<GroupRecord>, DbError> {
        let row = sqlx::query_as::<_, GroupRecord>("SELECT * FROM groups WHERE id = ?")
            .bind(group_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row)
    }

    pub async fn groups_for_account(&self, account: &str) -> Result<Vec<GroupRecord>, DbError> {
        let rows = sqlx::query_as::<_, GroupRecord>(
            "SELECT g.* FROM groups g JOIN group_members m ON m.group_id = g.id \
             WHERE m.account = ? COLLATE NOCASE ORDER BY g.created_at",
        )
        .bind(account)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn is_member(&self, group_id: &str, account: &str) -> Result<bool, DbError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = ? \
             AND account = ? COLLATE NOCASE)",
        )
        .bind(group_id)
        .bind(account)
        .fetch_one(self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn member(
        &self,
        group_id: &str,
        account: &str,
    ) -> Result<Option<GroupMemberRecord>, DbError> {
        let row = sqlx::query_as::<_, GroupMemberRecord>(
            "SELECT * FROM group_members WHERE group_id = ? AND account = ? COLLATE NOCASE",
        )
        .bind(group_id)
        .bind(account)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    pub async fn members(&self, group_id: &str) -> Result<Vec<GroupMemberRecord>, DbError> {
        let rows = sqlx::query_as::<_, GroupMemberRecord>(
            "SELECT * FROM group_members WHERE group_id = ? ORDER BY joined_at",
        )
        .bind(group_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert a new membership, or update the persona if already a member.
    pub async fn upsert_member(
        &self,
        group_id: &str,
        account: &str,
        persona_name: &str,
        persona_avatar: Option<&str>,
        persona_desc: Option<&str>,
        now: i64,
    ) -> Result<(), DbError> {
        let persona_avatar = truncate_avatar(persona_avatar);
        sqlx::query(
            "INSERT INTO group_members (group_id, account, character_name, character_avatar, \
             character_desc, joined_at) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(group_id, account) DO UPDATE SET \
             character_name = excluded.character_name, \
             character_avatar = excluded.character_avatar, \
             character_desc = excluded.character_desc",
        )
        .bind(group_id)
        .bind(account)
        .bind(persona_name)
        .bind(persona_avatar.as_deref())
        .bind(persona_desc)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_message(
        &self,
        message_id: &str,
        group_id: &str,
        sender_type: &str,
        sender_account: &str,
        sender_name: &str,
        character_name: Option<&str>,
        content: &str,
        msg_type: &str,
        now: i64,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO group_messages (id, group_id, sender_type, sender_account, sender_name, \
             character_name, content, msg_type, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message_id)
        .bind(group_id)
        .bind(sender_type)
        .bind(sender_account)
        .bind(sender_name)
        .bind(character_name)
        .bind(content)
        .bind(msg_type)
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_message(
        &self,
        group_id: &str,
        message_id: &str,
    ) -> Result<Option<GroupMessageRecord>, DbError> {
        let row = sqlx::query_as::<_, GroupMessageRecord>(
            "SELECT * FROM group_messages WHERE group_id = ? AND id = ?",
        )
        .bind(group_id)
        .bind(message_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }

    /// Overwrite a message's content column — used by the redpacket
    /// claim protocol (§4.7 step 8) to persist the mutated JSON blob.
    pub async fn update_message_content(
        &self,
        group_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE group_messages SET content = ? WHERE group_id = ? AND id = ?")
            .bind(content)
            .bind(group_id)
            .bind(message_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn messages_since(
        &self,
        group_id: &str,
        since: i64,
    ) -> Result<Vec<GroupMessageRecord>, DbError> {
        let rows = sqlx::query_as::<_, GroupMessageRecord>(
            "SELECT * FROM group_messages WHERE group_id = ? AND created_at > ? ORDER BY created_at ASC",
        )
        .bind(group_id)
        .bind(since)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn messages_recent(
        &self,
        group_id: &str,
        limit: i64,
    ) -> Result<Vec<GroupMessageRecord>, DbError> {
        let mut rows = sqlx::query_as::<_, GroupMessageRecord>(
            "SELECT * FROM group_messages WHERE group_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(group_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    pub async fn messages_all(&self, group_id: &str) -> Result<Vec<GroupMessageRecord>, DbError> {
        let rows = sqlx::query_as::<_, GroupMessageRecord>(
            "SELECT * FROM group_messages WHERE group_id = ? ORDER BY created_at ASC",
        )
        .bind(group_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test]
    async fn creating_group_inserts_creator_membership() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.groups()
            .create_online_group("g1", "Tavern", None, "alice", "Knight", None, None, 0)
            .await
            .unwrap();

        assert!(db.groups().is_member("g1", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn persona_avatar_is_truncated_to_65000_bytes() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let huge = "x".repeat(70_000);
        db.groups()
            .create_online_group("g1", "Tavern", None, "alice", "Knight", Some(&huge), None, 0)
            .await
            .unwrap();

        let member = db.groups().member("g1", "alice").await.unwrap().unwrap();
        assert_eq!(member.character_avatar.unwrap().len(), GROUP_AVATAR_CAP_BYTES);
    }

    #[tokio::test]
    async fn recent_messages_come_back_in_ascending_order() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.groups()
            .create_online_group("g1", "Tavern", None, "alice", "Knight", None, None, 0)
            .await
            .unwrap();
        for (i, ts) in [10, 20, 30].into_iter().enumerate() {
            db.groups()
                .insert_message(&format!("m{i}"), "g1", "character", "alice", "Knight", Some("Knight"), "hi", "text", ts)
                .await
                .unwrap();
        }

        let recent = db.groups().messages_recent("g1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at < recent[1].created_at);
    }
}
