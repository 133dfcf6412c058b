//! MCP service catalog and agent bindings.
//!
//! A binding pairs one agent with one MCP service and carries an optional
//! per-pairing JSON configuration. The (agentId, mcpId) pair is unique.

use crate::store::database::{
    encode_json_opt, encode_tags, new_id, parse_json_opt, parse_tags, parse_ts, Database,
};
use crate::store::error::{StoreError, StoreResult};
use crate::store::Page;
use crate::types::{AgentMcp, Mcp};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const MCP_COLS: &str = "id, createdAt, updatedAt, name, description, type, author, tags";
const BINDING_COLS: &str = "id, createdAt, updatedAt, agentId, mcpId, configuration";

/// Fields for a new MCP catalog entry.
#[derive(Debug, Clone, Default)]
pub struct NewMcp {
    pub name: String,
    pub description: Option<String>,
    pub mcp_type: String,
    pub author: String,
    pub tags: Vec<String>,
}

/// Partial update; `None` fields are left unchanged. `tags` replaces the
/// whole list when given.
#[derive(Debug, Clone, Default)]
pub struct McpPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub mcp_type: Option<String>,
    pub author: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Filter for [`Database::list_mcps`].
#[derive(Debug, Clone, Default)]
pub struct McpFilter {
    pub author: Option<String>,
    pub mcp_type: Option<String>,
    /// Exact match against any element of the tag list.
    pub tag: Option<String>,
}

fn row_to_mcp(row: &Row) -> rusqlite::Result<Mcp> {
    Ok(Mcp {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        updated_at: parse_ts(2, row.get(2)?)?,
        name: row.get(3)?,
        description: row.get(4)?,
        mcp_type: row.get(5)?,
        author: row.get(6)?,
        tags: parse_tags(7, row.get(7)?)?,
    })
}

fn row_to_binding(row: &Row) -> rusqlite::Result<AgentMcp> {
    Ok(AgentMcp {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        updated_at: parse_ts(2, row.get(2)?)?,
        agent_id: row.get(3)?,
        mcp_id: row.get(4)?,
        configuration: parse_json_opt(5, row.get(5)?)?,
    })
}

impl Database {
    // -----------------------------------------------------------------------
    // Mcp catalog
    // -----------------------------------------------------------------------

    pub fn create_mcp(&self, new: NewMcp) -> StoreResult<Mcp> {
        let now = Utc::now();
        let mcp = Mcp {
            id: new_id(),
            created_at: now,
            updated_at: now,
            name: new.name,
            description: new.description,
            mcp_type: new.mcp_type,
            author: new.author,
            tags: new.tags,
        };

        self.conn.execute(
            "INSERT INTO \"Mcp\" (id, createdAt, updatedAt, name, description, type, author, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                mcp.id,
                mcp.created_at.to_rfc3339(),
                mcp.updated_at.to_rfc3339(),
                mcp.name,
                mcp.description,
                mcp.mcp_type,
                mcp.author,
                encode_tags(&mcp.tags)?,
            ],
        )?;

        debug!("Registered MCP '{}' ({})", mcp.name, mcp.id);
        Ok(mcp)
    }

    pub fn mcp_by_id(&self, id: &str) -> StoreResult<Option<Mcp>> {
        let sql = format!("SELECT {MCP_COLS} FROM \"Mcp\" WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_mcp)
            .optional()?)
    }

    pub fn require_mcp(&self, id: &str) -> StoreResult<Mcp> {
        self.mcp_by_id(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "Mcp",
            key: id.to_string(),
        })
    }

    /// List catalog entries. The tag filter matches an exact element of the
    /// JSON tag array.
    pub fn list_mcps(&self, filter: McpFilter, page: Page) -> StoreResult<Vec<Mcp>> {
        let sql = format!(
            "SELECT {MCP_COLS} FROM \"Mcp\"
             WHERE (?1 IS NULL OR author = ?1)
               AND (?2 IS NULL OR type = ?2)
               AND (?3 IS NULL OR EXISTS (
                    SELECT 1 FROM json_each(\"Mcp\".tags) WHERE json_each.value = ?3))
             ORDER BY createdAt, id{}",
            page.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![filter.author, filter.mcp_type, filter.tag],
            row_to_mcp,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_mcp(&self, id: &str, patch: McpPatch) -> StoreResult<Mcp> {
        let tags = patch.tags.as_deref().map(encode_tags).transpose()?;
        let updated = self.conn.execute(
            "UPDATE \"Mcp\" SET
                name = COALESCE(?2, name),
                description = COALESCE(?3, description),
                type = COALESCE(?4, type),
                author = COALESCE(?5, author),
                tags = COALESCE(?6, tags),
                updatedAt = ?7
             WHERE id = ?1",
            params![
                id,
                patch.name,
                patch.description,
                patch.mcp_type,
                patch.author,
                tags,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "Mcp",
                key: id.to_string(),
            });
        }
        self.require_mcp(id)
    }

    /// Delete a catalog entry. Bindings cascade; a listing referencing it
    /// keeps its other fields with `mcpId` cleared.
    pub fn delete_mcp(&self, id: &str) -> StoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM \"Mcp\" WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "Mcp",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn count_mcps(&self) -> StoreResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM \"Mcp\"", [], |row| row.get(0))?)
    }

    // -----------------------------------------------------------------------
    // Agent bindings
    // -----------------------------------------------------------------------

    /// Bind an agent to an MCP service. A duplicate pair is a
    /// [`StoreError::Conflict`].
    pub fn create_binding(
        &self,
        agent_id: &str,
        mcp_id: &str,
        configuration: Option<serde_json::Value>,
    ) -> StoreResult<AgentMcp> {
        let now = Utc::now();
        let binding = AgentMcp {
            id: new_id(),
            created_at: now,
            updated_at: now,
            agent_id: agent_id.to_string(),
            mcp_id: mcp_id.to_string(),
            configuration,
        };

        self.conn.execute(
            "INSERT INTO \"AgentMcp\" (id, createdAt, updatedAt, agentId, mcpId, configuration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                binding.id,
                binding.created_at.to_rfc3339(),
                binding.updated_at.to_rfc3339(),
                binding.agent_id,
                binding.mcp_id,
                encode_json_opt(binding.configuration.as_ref())?,
            ],
        )?;

        debug!("Bound agent {} to MCP {}", agent_id, mcp_id);
        Ok(binding)
    }

    /// Bind or update the pairing configuration in one statement, keyed on
    /// the unique (agentId, mcpId) pair.
    pub fn upsert_binding(
        &self,
        agent_id: &str,
        mcp_id: &str,
        configuration: Option<serde_json::Value>,
    ) -> StoreResult<AgentMcp> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO \"AgentMcp\" (id, createdAt, updatedAt, agentId, mcpId, configuration)
             VALUES (?1, ?2, ?2, ?3, ?4, ?5)
             ON CONFLICT(agentId, mcpId) DO UPDATE SET
                configuration = ?5, updatedAt = ?2",
            params![
                new_id(),
                now,
                agent_id,
                mcp_id,
                encode_json_opt(configuration.as_ref())?,
            ],
        )?;

        self.binding_for_pair(agent_id, mcp_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "AgentMcp",
                key: format!("{agent_id}/{mcp_id}"),
            })
    }

    pub fn binding_for_pair(&self, agent_id: &str, mcp_id: &str) -> StoreResult<Option<AgentMcp>> {
        let sql =
            format!("SELECT {BINDING_COLS} FROM \"AgentMcp\" WHERE agentId = ?1 AND mcpId = ?2");
        Ok(self
            .conn
            .query_row(&sql, params![agent_id, mcp_id], row_to_binding)
            .optional()?)
    }

    /// All of an agent's bindings joined with their catalog entries.
    pub fn bindings_for_agent(&self, agent_id: &str) -> StoreResult<Vec<(AgentMcp, Mcp)>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.id, b.createdAt, b.updatedAt, b.agentId, b.mcpId, b.configuration,
                    m.id, m.createdAt, m.updatedAt, m.name, m.description, m.type, m.author, m.tags
             FROM \"AgentMcp\" b
             JOIN \"Mcp\" m ON m.id = b.mcpId
             WHERE b.agentId = ?1
             ORDER BY b.createdAt, b.id",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| {
            let binding = AgentMcp {
                id: row.get(0)?,
                created_at: parse_ts(1, row.get(1)?)?,
                updated_at: parse_ts(2, row.get(2)?)?,
                agent_id: row.get(3)?,
                mcp_id: row.get(4)?,
                configuration: parse_json_opt(5, row.get(5)?)?,
            };
            let mcp = Mcp {
                id: row.get(6)?,
                created_at: parse_ts(7, row.get(7)?)?,
                updated_at: parse_ts(8, row.get(8)?)?,
                name: row.get(9)?,
                description: row.get(10)?,
                mcp_type: row.get(11)?,
                author: row.get(12)?,
                tags: parse_tags(13, row.get(13)?)?,
            };
            Ok((binding, mcp))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Replace (or clear) a binding's configuration.
    pub fn set_binding_configuration(
        &self,
        id: &str,
        configuration: Option<serde_json::Value>,
    ) -> StoreResult<AgentMcp> {
        let updated = self.conn.execute(
            "UPDATE \"AgentMcp\" SET configuration = ?2, updatedAt = ?3 WHERE id = ?1",
            params![
                id,
                encode_json_opt(configuration.as_ref())?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "AgentMcp",
                key: id.to_string(),
            });
        }
        let sql = format!("SELECT {BINDING_COLS} FROM \"AgentMcp\" WHERE id = ?1");
        Ok(self.conn.query_row(&sql, params![id], row_to_binding)?)
    }

    /// Remove the binding between an agent and an MCP service.
    pub fn delete_binding(&self, agent_id: &str, mcp_id: &str) -> StoreResult<()> {
        let deleted = self.conn.execute(
            "DELETE FROM \"AgentMcp\" WHERE agentId = ?1 AND mcpId = ?2",
            params![agent_id, mcp_id],
        )?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "AgentMcp",
                key: format!("{agent_id}/{mcp_id}"),
            });
        }
        Ok(())
    }

    pub fn count_bindings_for_agent(&self, agent_id: &str) -> StoreResult<u64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM \"AgentMcp\" WHERE agentId = ?1",
            params![agent_id],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::agents::NewAgent;
    use crate::store::users::NewUser;
    use serde_json::json;

    fn fixtures(db: &Database) -> (String, String) {
        let uid = db
            .create_user(NewUser {
                username: "ada".into(),
                email: "ada@example.com".into(),
                ..Default::default()
            })
            .unwrap()
            .id;
        let agent_id = db
            .create_agent(NewAgent {
                name: "bot".into(),
                user_id: uid,
                ..Default::default()
            })
            .unwrap()
            .id;
        let mcp_id = db
            .create_mcp(NewMcp {
                name: "search".into(),
                mcp_type: "http".into(),
                author: "acme".into(),
                tags: vec!["web".into(), "search".into()],
                ..Default::default()
            })
            .unwrap()
            .id;
        (agent_id, mcp_id)
    }

    #[test]
    fn mcp_round_trips_tags() {
        let db = Database::open_memory().unwrap();
        let mcp = db
            .create_mcp(NewMcp {
                name: "search".into(),
                mcp_type: "http".into(),
                author: "acme".into(),
                tags: vec!["web".into(), "search".into()],
                ..Default::default()
            })
            .unwrap();

        let read = db.require_mcp(&mcp.id).unwrap();
        assert_eq!(read.tags, vec!["web".to_string(), "search".to_string()]);
        assert_eq!(read.mcp_type, "http");
    }

    #[test]
    fn tag_filter_matches_whole_elements_only() {
        let db = Database::open_memory().unwrap();
        db.create_mcp(NewMcp {
            name: "a".into(),
            mcp_type: "http".into(),
            author: "acme".into(),
            tags: vec!["websearch".into()],
            ..Default::default()
        })
        .unwrap();
        db.create_mcp(NewMcp {
            name: "b".into(),
            mcp_type: "http".into(),
            author: "acme".into(),
            tags: vec!["web".into()],
            ..Default::default()
        })
        .unwrap();

        let hits = db
            .list_mcps(
                McpFilter {
                    tag: Some("web".into()),
                    ..Default::default()
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "b");
    }

    #[test]
    fn duplicate_pair_is_a_conflict() {
        let db = Database::open_memory().unwrap();
        let (agent_id, mcp_id) = fixtures(&db);

        db.create_binding(&agent_id, &mcp_id, None).unwrap();
        let dup = db.create_binding(&agent_id, &mcp_id, Some(json!({})));
        assert!(matches!(dup, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn upsert_binding_updates_configuration_in_place() {
        let db = Database::open_memory().unwrap();
        let (agent_id, mcp_id) = fixtures(&db);

        let first = db.upsert_binding(&agent_id, &mcp_id, None).unwrap();
        assert!(first.configuration.is_none());

        let second = db
            .upsert_binding(&agent_id, &mcp_id, Some(json!({"apiKey": "k"})))
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.configuration, Some(json!({"apiKey": "k"})));
    }

    #[test]
    fn bindings_join_catalog_rows() {
        let db = Database::open_memory().unwrap();
        let (agent_id, mcp_id) = fixtures(&db);
        db.create_binding(&agent_id, &mcp_id, Some(json!({"region": "eu"})))
            .unwrap();

        let bound = db.bindings_for_agent(&agent_id).unwrap();
        assert_eq!(bound.len(), 1);
        let (binding, mcp) = &bound[0];
        assert_eq!(binding.configuration, Some(json!({"region": "eu"})));
        assert_eq!(mcp.id, mcp_id);
        assert_eq!(mcp.name, "search");
    }

    #[test]
    fn binding_configuration_can_be_cleared() {
        let db = Database::open_memory().unwrap();
        let (agent_id, mcp_id) = fixtures(&db);
        let binding = db
            .create_binding(&agent_id, &mcp_id, Some(json!({"x": 1})))
            .unwrap();

        let cleared = db.set_binding_configuration(&binding.id, None).unwrap();
        assert!(cleared.configuration.is_none());
    }

    #[test]
    fn deleting_mcp_cascades_bindings() {
        let db = Database::open_memory().unwrap();
        let (agent_id, mcp_id) = fixtures(&db);
        db.create_binding(&agent_id, &mcp_id, None).unwrap();

        db.delete_mcp(&mcp_id).unwrap();
        assert!(db.binding_for_pair(&agent_id, &mcp_id).unwrap().is_none());
        assert_eq!(db.count_bindings_for_agent(&agent_id).unwrap(), 0);
    }

    #[test]
    fn unbinding_a_missing_pair_is_not_found() {
        let db = Database::open_memory().unwrap();
        let (agent_id, mcp_id) = fixtures(&db);
        assert!(matches!(
            db.delete_binding(&agent_id, &mcp_id),
            Err(StoreError::NotFound { .. })
        ));
    }
}
