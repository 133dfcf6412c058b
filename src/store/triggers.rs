//! Trigger operations.
//!
//! Configurations are validated on write: a SCHEDULED trigger must carry a
//! parseable cron expression, event triggers must carry a JSON object.
//! Nothing here evaluates triggers; execution belongs to the runtime.

use crate::store::database::{new_id, parse_enum, parse_json, parse_ts, Database};
use crate::store::error::{StoreError, StoreResult};
use crate::store::Page;
use crate::types::{Trigger, TriggerType};
use chrono::Utc;
use cron::Schedule;
use rusqlite::{params, OptionalExtension, Row};
use std::str::FromStr;
use tracing::debug;

const TRIGGER_COLS: &str = "id, createdAt, updatedAt, type, configuration, agentId";

/// Fields for a new trigger.
#[derive(Debug, Clone)]
pub struct NewTrigger {
    pub trigger_type: TriggerType,
    pub configuration: serde_json::Value,
    pub agent_id: String,
}

fn row_to_trigger(row: &Row) -> rusqlite::Result<Trigger> {
    Ok(Trigger {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        updated_at: parse_ts(2, row.get(2)?)?,
        trigger_type: parse_enum(3, row.get(3)?)?,
        configuration: parse_json(4, row.get(4)?)?,
        agent_id: row.get(5)?,
    })
}

/// Check a configuration against its trigger type before it is stored.
pub fn validate_configuration(
    trigger_type: TriggerType,
    configuration: &serde_json::Value,
) -> StoreResult<()> {
    let obj = configuration
        .as_object()
        .ok_or_else(|| StoreError::InvalidTrigger {
            trigger_type: trigger_type.as_str(),
            reason: "configuration must be a JSON object".into(),
        })?;

    if trigger_type == TriggerType::Scheduled {
        let expr = obj
            .get("cron")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::InvalidTrigger {
                trigger_type: trigger_type.as_str(),
                reason: "missing 'cron' field".into(),
            })?;
        Schedule::from_str(expr).map_err(|e| StoreError::InvalidTrigger {
            trigger_type: trigger_type.as_str(),
            reason: format!("bad cron expression '{expr}': {e}"),
        })?;
    }

    Ok(())
}

impl Database {
    pub fn create_trigger(&self, new: NewTrigger) -> StoreResult<Trigger> {
        validate_configuration(new.trigger_type, &new.configuration)?;

        let now = Utc::now();
        let trigger = Trigger {
            id: new_id(),
            created_at: now,
            updated_at: now,
            trigger_type: new.trigger_type,
            configuration: new.configuration,
            agent_id: new.agent_id,
        };

        self.conn.execute(
            "INSERT INTO \"Trigger\" (id, createdAt, updatedAt, type, configuration, agentId)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                trigger.id,
                trigger.created_at.to_rfc3339(),
                trigger.updated_at.to_rfc3339(),
                trigger.trigger_type.as_str(),
                serde_json::to_string(&trigger.configuration)?,
                trigger.agent_id,
            ],
        )?;

        debug!(
            "Created {} trigger {} for agent {}",
            trigger.trigger_type, trigger.id, trigger.agent_id
        );
        Ok(trigger)
    }

    pub fn trigger_by_id(&self, id: &str) -> StoreResult<Option<Trigger>> {
        let sql = format!("SELECT {TRIGGER_COLS} FROM \"Trigger\" WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_trigger)
            .optional()?)
    }

    pub fn require_trigger(&self, id: &str) -> StoreResult<Trigger> {
        self.trigger_by_id(id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Trigger",
                key: id.to_string(),
            })
    }

    /// All triggers configured for the given agent, oldest first.
    pub fn triggers_for_agent(&self, agent_id: &str) -> StoreResult<Vec<Trigger>> {
        let sql = format!(
            "SELECT {TRIGGER_COLS} FROM \"Trigger\" WHERE agentId = ?1 ORDER BY createdAt, id"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![agent_id], row_to_trigger)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_triggers(
        &self,
        trigger_type: Option<TriggerType>,
        page: Page,
    ) -> StoreResult<Vec<Trigger>> {
        let sql = format!(
            "SELECT {TRIGGER_COLS} FROM \"Trigger\"
             WHERE (?1 IS NULL OR type = ?1)
             ORDER BY createdAt, id{}",
            page.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![trigger_type.map(|t| t.as_str())], row_to_trigger)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Replace a trigger's configuration, re-validating against its stored
    /// type.
    pub fn update_trigger_configuration(
        &self,
        id: &str,
        configuration: serde_json::Value,
    ) -> StoreResult<Trigger> {
        let current = self.require_trigger(id)?;
        validate_configuration(current.trigger_type, &configuration)?;

        self.conn.execute(
            "UPDATE \"Trigger\" SET configuration = ?2, updatedAt = ?3 WHERE id = ?1",
            params![
                id,
                serde_json::to_string(&configuration)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        self.require_trigger(id)
    }

    pub fn delete_trigger(&self, id: &str) -> StoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM \"Trigger\" WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "Trigger",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    /// Remove every trigger configured for an agent. Returns how many went.
    pub fn delete_triggers_for_agent(&self, agent_id: &str) -> StoreResult<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM \"Trigger\" WHERE agentId = ?1",
            params![agent_id],
        )?;
        Ok(deleted as u64)
    }

    pub fn count_triggers(&self) -> StoreResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM \"Trigger\"", [], |row| row.get(0))?)
    }

    /// Trigger counts per type.
    pub fn trigger_count_by_type(&self) -> StoreResult<Vec<(TriggerType, u64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT type, COUNT(*) FROM \"Trigger\" GROUP BY type ORDER BY type")?;
        let rows = stmt.query_map([], |row| {
            Ok((parse_enum(0, row.get(0)?)?, row.get::<_, u64>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::agents::NewAgent;
    use crate::store::users::NewUser;
    use serde_json::json;

    fn agent_id(db: &Database) -> String {
        let uid = db
            .create_user(NewUser {
                username: "ada".into(),
                email: "ada@example.com".into(),
                ..Default::default()
            })
            .unwrap()
            .id;
        db.create_agent(NewAgent {
            name: "bot".into(),
            user_id: uid,
            ..Default::default()
        })
        .unwrap()
        .id
    }

    #[test]
    fn scheduled_trigger_round_trips() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db);

        let trigger = db
            .create_trigger(NewTrigger {
                trigger_type: TriggerType::Scheduled,
                configuration: json!({"cron": "0 0 9 * * *", "tz": "UTC"}),
                agent_id: aid.clone(),
            })
            .unwrap();

        let read = db.require_trigger(&trigger.id).unwrap();
        assert_eq!(read.trigger_type, TriggerType::Scheduled);
        assert_eq!(read.configuration["cron"], "0 0 9 * * *");
        assert_eq!(read.agent_id, aid);
    }

    #[test]
    fn scheduled_trigger_rejects_bad_cron() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db);

        let missing = db.create_trigger(NewTrigger {
            trigger_type: TriggerType::Scheduled,
            configuration: json!({"interval": 60}),
            agent_id: aid.clone(),
        });
        assert!(matches!(missing, Err(StoreError::InvalidTrigger { .. })));

        let garbage = db.create_trigger(NewTrigger {
            trigger_type: TriggerType::Scheduled,
            configuration: json!({"cron": "not a schedule"}),
            agent_id: aid,
        });
        assert!(matches!(garbage, Err(StoreError::InvalidTrigger { .. })));
    }

    #[test]
    fn event_trigger_requires_an_object() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db);

        let bad = db.create_trigger(NewTrigger {
            trigger_type: TriggerType::EventPrice,
            configuration: json!("BTC > 100000"),
            agent_id: aid.clone(),
        });
        assert!(matches!(bad, Err(StoreError::InvalidTrigger { .. })));

        let ok = db.create_trigger(NewTrigger {
            trigger_type: TriggerType::EventPrice,
            configuration: json!({"asset": "BTC", "above": 100000}),
            agent_id: aid,
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn configuration_update_revalidates_against_stored_type() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db);
        let trigger = db
            .create_trigger(NewTrigger {
                trigger_type: TriggerType::Scheduled,
                configuration: json!({"cron": "0 0 9 * * *"}),
                agent_id: aid,
            })
            .unwrap();

        let bad = db.update_trigger_configuration(&trigger.id, json!({"cron": "nope"}));
        assert!(matches!(bad, Err(StoreError::InvalidTrigger { .. })));

        let ok = db
            .update_trigger_configuration(&trigger.id, json!({"cron": "0 30 * * * *"}))
            .unwrap();
        assert_eq!(ok.configuration["cron"], "0 30 * * * *");
    }

    #[test]
    fn triggers_for_agent_and_group_by_type() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db);
        db.create_trigger(NewTrigger {
            trigger_type: TriggerType::Scheduled,
            configuration: json!({"cron": "0 0 9 * * *"}),
            agent_id: aid.clone(),
        })
        .unwrap();
        db.create_trigger(NewTrigger {
            trigger_type: TriggerType::EventChain,
            configuration: json!({"contract": "0xabc"}),
            agent_id: aid.clone(),
        })
        .unwrap();

        assert_eq!(db.triggers_for_agent(&aid).unwrap().len(), 2);
        assert_eq!(
            db.list_triggers(Some(TriggerType::EventChain), Page::default())
                .unwrap()
                .len(),
            1
        );

        let grouped = db.trigger_count_by_type().unwrap();
        assert!(grouped.contains(&(TriggerType::Scheduled, 1)));
        assert!(grouped.contains(&(TriggerType::EventChain, 1)));
    }

    #[test]
    fn delete_many_for_agent() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db);
        for _ in 0..3 {
            db.create_trigger(NewTrigger {
                trigger_type: TriggerType::EventSocial,
                configuration: json!({"keyword": "ship it"}),
                agent_id: aid.clone(),
            })
            .unwrap();
        }

        assert_eq!(db.delete_triggers_for_agent(&aid).unwrap(), 3);
        assert_eq!(db.count_triggers().unwrap(), 0);
    }
}
