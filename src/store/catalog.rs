//! Marketplace listing operations.
//!
//! A listing sells either an agent template (carried inline as JSON) or an
//! MCP service (referenced by id). An MCP can back at most one listing.

use crate::store::database::{
    encode_json_opt, encode_tags, new_id, parse_enum, parse_json_opt, parse_tags, parse_ts,
    Database,
};
use crate::store::error::{StoreError, StoreResult};
use crate::store::Page;
use crate::types::{ItemType, StoreItem};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const ITEM_COLS: &str =
    "id, createdAt, updatedAt, name, description, details, type, creator, tags, agentTemplate, \
     mcpId";

/// Fields for a new listing.
#[derive(Debug, Clone)]
pub struct NewStoreItem {
    pub name: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub item_type: ItemType,
    pub creator: String,
    pub tags: Vec<String>,
    pub agent_template: Option<serde_json::Value>,
    pub mcp_id: Option<String>,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct StoreItemPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub details: Option<String>,
    pub tags: Option<Vec<String>>,
    pub agent_template: Option<serde_json::Value>,
}

/// Filter for [`Database::list_items`].
#[derive(Debug, Clone, Default)]
pub struct StoreItemFilter {
    pub item_type: Option<ItemType>,
    pub creator: Option<String>,
    /// Exact match against any element of the tag list.
    pub tag: Option<String>,
}

fn row_to_item(row: &Row) -> rusqlite::Result<StoreItem> {
    Ok(StoreItem {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        updated_at: parse_ts(2, row.get(2)?)?,
        name: row.get(3)?,
        description: row.get(4)?,
        details: row.get(5)?,
        item_type: parse_enum(6, row.get(6)?)?,
        creator: row.get(7)?,
        tags: parse_tags(8, row.get(8)?)?,
        agent_template: parse_json_opt(9, row.get(9)?)?,
        mcp_id: row.get(10)?,
    })
}

impl Database {
    /// Insert a listing. A second listing for the same MCP is a
    /// [`StoreError::Conflict`].
    pub fn create_item(&self, new: NewStoreItem) -> StoreResult<StoreItem> {
        let now = Utc::now();
        let item = StoreItem {
            id: new_id(),
            created_at: now,
            updated_at: now,
            name: new.name,
            description: new.description,
            details: new.details,
            item_type: new.item_type,
            creator: new.creator,
            tags: new.tags,
            agent_template: new.agent_template,
            mcp_id: new.mcp_id,
        };

        self.conn.execute(
            "INSERT INTO \"StoreItem\" (id, createdAt, updatedAt, name, description, details, \
             type, creator, tags, agentTemplate, mcpId)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                item.id,
                item.created_at.to_rfc3339(),
                item.updated_at.to_rfc3339(),
                item.name,
                item.description,
                item.details,
                item.item_type.as_str(),
                item.creator,
                encode_tags(&item.tags)?,
                encode_json_opt(item.agent_template.as_ref())?,
                item.mcp_id,
            ],
        )?;

        debug!("Listed '{}' ({}) in the store", item.name, item.id);
        Ok(item)
    }

    pub fn item_by_id(&self, id: &str) -> StoreResult<Option<StoreItem>> {
        let sql = format!("SELECT {ITEM_COLS} FROM \"StoreItem\" WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_item)
            .optional()?)
    }

    pub fn require_item(&self, id: &str) -> StoreResult<StoreItem> {
        self.item_by_id(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "StoreItem",
            key: id.to_string(),
        })
    }

    /// The listing backed by an MCP service, if one exists.
    pub fn item_for_mcp(&self, mcp_id: &str) -> StoreResult<Option<StoreItem>> {
        let sql = format!("SELECT {ITEM_COLS} FROM \"StoreItem\" WHERE mcpId = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![mcp_id], row_to_item)
            .optional()?)
    }

    pub fn list_items(&self, filter: StoreItemFilter, page: Page) -> StoreResult<Vec<StoreItem>> {
        let sql = format!(
            "SELECT {ITEM_COLS} FROM \"StoreItem\"
             WHERE (?1 IS NULL OR type = ?1)
               AND (?2 IS NULL OR creator = ?2)
               AND (?3 IS NULL OR EXISTS (
                    SELECT 1 FROM json_each(\"StoreItem\".tags) WHERE json_each.value = ?3))
             ORDER BY createdAt, id{}",
            page.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                filter.item_type.map(|t| t.as_str()),
                filter.creator,
                filter.tag
            ],
            row_to_item,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_item(&self, id: &str, patch: StoreItemPatch) -> StoreResult<StoreItem> {
        let tags = patch.tags.as_deref().map(encode_tags).transpose()?;
        let updated = self.conn.execute(
            "UPDATE \"StoreItem\" SET
                name = COALESCE(?2, name),
                description = COALESCE(?3, description),
                details = COALESCE(?4, details),
                tags = COALESCE(?5, tags),
                agentTemplate = COALESCE(?6, agentTemplate),
                updatedAt = ?7
             WHERE id = ?1",
            params![
                id,
                patch.name,
                patch.description,
                patch.details,
                tags,
                encode_json_opt(patch.agent_template.as_ref())?,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "StoreItem",
                key: id.to_string(),
            });
        }
        self.require_item(id)
    }

    pub fn delete_item(&self, id: &str) -> StoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM \"StoreItem\" WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "StoreItem",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn count_items(&self) -> StoreResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM \"StoreItem\"", [], |row| row.get(0))?)
    }

    /// Listing counts per item type.
    pub fn item_count_by_type(&self) -> StoreResult<Vec<(ItemType, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT type, COUNT(*) FROM \"StoreItem\" GROUP BY type ORDER BY type")?;
        let rows = stmt.query_map([], |row| {
            Ok((parse_enum(0, row.get(0)?)?, row.get::<_, u64>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}
