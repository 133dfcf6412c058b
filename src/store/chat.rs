//! Chat session and message operations.
//!
//! Appending a message bumps the session's `updatedAt`, so session lists
//! sorted by recency stay correct.

use crate::store::database::{new_id, parse_ts, Database};
use crate::store::error::{StoreError, StoreResult};
use crate::store::Page;
use crate::types::{ChatMessage, ChatSession};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const SESSION_COLS: &str = "id, createdAt, updatedAt, title, agentId";
const MESSAGE_COLS: &str = "id, createdAt, role, content, chatSessionId";

fn row_to_session(row: &Row) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        updated_at: parse_ts(2, row.get(2)?)?,
        title: row.get(3)?,
        agent_id: row.get(4)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        role: row.get(2)?,
        content: row.get(3)?,
        chat_session_id: row.get(4)?,
    })
}

impl Database {
    /// Start a new conversation. `agent_id` is stored as given, without
    /// validation against the Agent table.
    pub fn open_session(
        &self,
        title: Option<&str>,
        agent_id: Option<&str>,
    ) -> StoreResult<ChatSession> {
        let now = Utc::now();
        let session = ChatSession {
            id: new_id(),
            created_at: now,
            updated_at: now,
            title: title.map(str::to_string),
            agent_id: agent_id.map(str::to_string),
        };

        self.conn.execute(
            "INSERT INTO \"ChatSession\" (id, createdAt, updatedAt, title, agentId)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
                session.title,
                session.agent_id,
            ],
        )?;

        debug!("Opened chat session {}", session.id);
        Ok(session)
    }

    pub fn session_by_id(&self, id: &str) -> StoreResult<Option<ChatSession>> {
        let sql = format!("SELECT {SESSION_COLS} FROM \"ChatSession\" WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_session)
            .optional()?)
    }

    pub fn require_session(&self, id: &str) -> StoreResult<ChatSession> {
        self.session_by_id(id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "ChatSession",
                key: id.to_string(),
            })
    }

    /// Sessions most recently touched first, optionally for one agent id.
    pub fn list_sessions(
        &self,
        agent_id: Option<&str>,
        page: Page,
    ) -> StoreResult<Vec<ChatSession>> {
        let sql = format!(
            "SELECT {SESSION_COLS} FROM \"ChatSession\"
             WHERE (?1 IS NULL OR agentId = ?1)
             ORDER BY updatedAt DESC, id DESC{}",
            page.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![agent_id], row_to_session)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Set or clear the session title.
    pub fn rename_session(&self, id: &str, title: Option<&str>) -> StoreResult<ChatSession> {
        let updated = self.conn.execute(
            "UPDATE \"ChatSession\" SET title = ?2, updatedAt = ?3 WHERE id = ?1",
            params![id, title, Utc::now().to_rfc3339()],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "ChatSession",
                key: id.to_string(),
            });
        }
        self.require_session(id)
    }

    /// Append one message and touch the session, atomically.
    pub fn append_message(
        &mut self,
        session_id: &str,
        role: &str,
        content: &str,
    ) -> StoreResult<ChatMessage> {
        let mut stored = self.append_messages(session_id, &[(role.to_string(), content.to_string())])?;
        // append_messages returns exactly one row for a one-element batch.
        Ok(stored.remove(0))
    }

    /// Append a batch of (role, content) messages in one transaction and
    /// return the stored rows. The session's `updatedAt` is bumped once.
    pub fn append_messages(
        &mut self,
        session_id: &str,
        messages: &[(String, String)],
    ) -> StoreResult<Vec<ChatMessage>> {
        let tx = self.conn.transaction().map_err(StoreError::from)?;
        let now = Utc::now();

        // Touch the session first; a missing session rolls everything back.
        let touched = tx.execute(
            "UPDATE \"ChatSession\" SET updatedAt = ?2 WHERE id = ?1",
            params![session_id, now.to_rfc3339()],
        )?;
        if touched == 0 {
            return Err(StoreError::NotFound {
                entity: "ChatSession",
                key: session_id.to_string(),
            });
        }

        let mut stored = Vec::with_capacity(messages.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO \"ChatMessage\" (id, createdAt, role, content, chatSessionId)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (role, content) in messages {
                let message = ChatMessage {
                    id: new_id(),
                    created_at: Utc::now(),
                    role: role.clone(),
                    content: content.clone(),
                    chat_session_id: session_id.to_string(),
                };
                stmt.execute(params![
                    message.id,
                    message.created_at.to_rfc3339(),
                    message.role,
                    message.content,
                    message.chat_session_id,
                ])?;
                stored.push(message);
            }
        }
        tx.commit()?;

        debug!("Appended {} messages to session {}", stored.len(), session_id);
        Ok(stored)
    }

    /// All messages of a session in conversation order.
    pub fn messages_for_session(
        &self,
        session_id: &str,
        page: Page,
    ) -> StoreResult<Vec<ChatMessage>> {
        let sql = format!(
            "SELECT {MESSAGE_COLS} FROM \"ChatMessage\"
             WHERE chatSessionId = ?1
             ORDER BY createdAt, id{}",
            page.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id], row_to_message)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete every message in a session, keeping the session itself.
    /// Returns how many messages went.
    pub fn clear_session(&self, session_id: &str) -> StoreResult<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM \"ChatMessage\" WHERE chatSessionId = ?1",
            params![session_id],
        )?;
        Ok(deleted as u64)
    }

    /// Delete a session and, via cascade, its messages.
    pub fn delete_session(&self, id: &str) -> StoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM \"ChatSession\" WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "ChatSession",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn count_sessions(&self) -> StoreResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM \"ChatSession\"", [], |row| row.get(0))?)
    }

    pub fn count_messages(&self, session_id: &str) -> StoreResult<u64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM \"ChatMessage\" WHERE chatSessionId = ?1",
            params![session_id],
            |row| row.get(0),
        )?)
    }
}
