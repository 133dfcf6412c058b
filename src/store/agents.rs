//! Agent operations.

use crate::store::database::{new_id, parse_enum, parse_ts, Database};
use crate::store::error::{StoreError, StoreResult};
use crate::store::Page;
use crate::types::{Agent, AgentStatus};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

const AGENT_COLS: &str =
    "id, createdAt, updatedAt, name, description, status, systemPrompt, iconUrl, userId";

/// Fields for a new agent. Status starts as STOPPED unless given.
#[derive(Debug, Clone, Default)]
pub struct NewAgent {
    pub name: String,
    pub description: Option<String>,
    pub status: Option<AgentStatus>,
    pub system_prompt: Option<String>,
    pub icon_url: Option<String>,
    pub user_id: String,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct AgentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<AgentStatus>,
    pub system_prompt: Option<String>,
    pub icon_url: Option<String>,
}

/// Filter for [`Database::list_agents`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub user_id: Option<String>,
    pub status: Option<AgentStatus>,
    /// Case-insensitive substring match on the name.
    pub name_contains: Option<String>,
}

fn row_to_agent(row: &Row) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        updated_at: parse_ts(2, row.get(2)?)?,
        name: row.get(3)?,
        description: row.get(4)?,
        status: parse_enum(5, row.get(5)?)?,
        system_prompt: row.get(6)?,
        icon_url: row.get(7)?,
        user_id: row.get(8)?,
    })
}

impl Database {
    /// Insert a new agent owned by `new.user_id`.
    pub fn create_agent(&self, new: NewAgent) -> StoreResult<Agent> {
        let now = Utc::now();
        let agent = Agent {
            id: new_id(),
            created_at: now,
            updated_at: now,
            name: new.name,
            description: new.description,
            status: new.status.unwrap_or_default(),
            system_prompt: new.system_prompt,
            icon_url: new.icon_url,
            user_id: new.user_id,
        };

        self.conn.execute(
            "INSERT INTO \"Agent\" (id, createdAt, updatedAt, name, description, status, \
             systemPrompt, iconUrl, userId)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                agent.id,
                agent.created_at.to_rfc3339(),
                agent.updated_at.to_rfc3339(),
                agent.name,
                agent.description,
                agent.status.as_str(),
                agent.system_prompt,
                agent.icon_url,
                agent.user_id,
            ],
        )?;

        debug!("Created agent '{}' ({})", agent.name, agent.id);
        Ok(agent)
    }

    pub fn agent_by_id(&self, id: &str) -> StoreResult<Option<Agent>> {
        let sql = format!("SELECT {AGENT_COLS} FROM \"Agent\" WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_agent)
            .optional()?)
    }

    pub fn require_agent(&self, id: &str) -> StoreResult<Agent> {
        self.agent_by_id(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "Agent",
            key: id.to_string(),
        })
    }

    /// All agents owned by the given user, oldest first.
    pub fn agents_for_user(&self, user_id: &str) -> StoreResult<Vec<Agent>> {
        let sql =
            format!("SELECT {AGENT_COLS} FROM \"Agent\" WHERE userId = ?1 ORDER BY createdAt, id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id], row_to_agent)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_agents(&self, filter: AgentFilter, page: Page) -> StoreResult<Vec<Agent>> {
        let sql = format!(
            "SELECT {AGENT_COLS} FROM \"Agent\"
             WHERE (?1 IS NULL OR userId = ?1)
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR instr(lower(name), lower(?3)) > 0)
             ORDER BY createdAt, id{}",
            page.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                filter.user_id,
                filter.status.map(|s| s.as_str()),
                filter.name_contains,
            ],
            row_to_agent,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// First match for the filter in listing order, if any.
    pub fn find_agent(&self, filter: AgentFilter) -> StoreResult<Option<Agent>> {
        Ok(self.list_agents(filter, Page::first(1))?.into_iter().next())
    }

    pub fn update_agent(&self, id: &str, patch: AgentPatch) -> StoreResult<Agent> {
        let updated = self.conn.execute(
            "UPDATE \"Agent\" SET
                name = COALESCE(?2, name),
                description = COALESCE(?3, description),
                status = COALESCE(?4, status),
                systemPrompt = COALESCE(?5, systemPrompt),
                iconUrl = COALESCE(?6, iconUrl),
                updatedAt = ?7
             WHERE id = ?1",
            params![
                id,
                patch.name,
                patch.description,
                patch.status.map(|s| s.as_str()),
                patch.system_prompt,
                patch.icon_url,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "Agent",
                key: id.to_string(),
            });
        }
        self.require_agent(id)
    }

    /// Transition a single agent's lifecycle status.
    pub fn set_agent_status(&self, id: &str, status: AgentStatus) -> StoreResult<Agent> {
        info!("Agent {} -> {}", id, status);
        self.update_agent(
            id,
            AgentPatch {
                status: Some(status),
                ..Default::default()
            },
        )
    }

    /// Bulk status transition for one user's agents, optionally restricted
    /// to agents currently in `from`. Returns the affected agent ids.
    pub fn set_status_for_user(
        &self,
        user_id: &str,
        from: Option<AgentStatus>,
        to: AgentStatus,
    ) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "UPDATE \"Agent\" SET status = ?3, updatedAt = ?4
             WHERE userId = ?1 AND (?2 IS NULL OR status = ?2)
             RETURNING id",
        )?;
        let rows = stmt.query_map(
            params![
                user_id,
                from.map(|s| s.as_str()),
                to.as_str(),
                Utc::now().to_rfc3339(),
            ],
            |row| row.get::<_, String>(0),
        )?;
        let ids = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        info!("Set {} agents of user {} to {}", ids.len(), user_id, to);
        Ok(ids)
    }

    /// Delete an agent. Bindings, triggers, and logs cascade.
    pub fn delete_agent(&self, id: &str) -> StoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM \"Agent\" WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "Agent",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn count_agents(&self, status: Option<AgentStatus>) -> StoreResult<u64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM \"Agent\" WHERE (?1 IS NULL OR status = ?1)",
            params![status.map(|s| s.as_str())],
            |row| row.get(0),
        )?)
    }

    /// Agent counts per lifecycle status.
    pub fn agent_count_by_status(&self) -> StoreResult<Vec<(AgentStatus, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM \"Agent\" GROUP BY status ORDER BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((parse_enum(0, row.get(0)?)?, row.get::<_, u64>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
