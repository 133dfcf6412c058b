//! Agent activity log operations. Append-heavy, pruned by age.

use crate::store::database::{new_id, parse_ts, Database};
use crate::store::error::{StoreError, StoreResult};
use crate::store::Page;
use crate::types::Log;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const LOG_COLS: &str = "id, createdAt, message, agentId";

fn row_to_log(row: &Row) -> rusqlite::Result<Log> {
    Ok(Log {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        message: row.get(2)?,
        agent_id: row.get(3)?,
    })
}

impl Database {
    /// Append one log line for an agent.
    pub fn append_log(&self, agent_id: &str, message: &str) -> StoreResult<Log> {
        let log = Log {
            id: new_id(),
            created_at: Utc::now(),
            message: message.to_string(),
            agent_id: agent_id.to_string(),
        };

        self.conn.execute(
            "INSERT INTO \"Log\" (id, createdAt, message, agentId) VALUES (?1, ?2, ?3, ?4)",
            params![log.id, log.created_at.to_rfc3339(), log.message, log.agent_id],
        )?;
        Ok(log)
    }

    /// Append a batch of log lines in one transaction and return the stored
    /// rows. All-or-nothing: a bad agent id inserts no rows.
    pub fn append_logs(&mut self, agent_id: &str, messages: &[String]) -> StoreResult<Vec<Log>> {
        let tx = self.conn.transaction().map_err(StoreError::from)?;
        let mut stored = Vec::with_capacity(messages.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO \"Log\" (id, createdAt, message, agentId)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id, createdAt, message, agentId",
            )?;
            for message in messages {
                let row = stmt.query_row(
                    params![new_id(), Utc::now().to_rfc3339(), message, agent_id],
                    row_to_log,
                )?;
                stored.push(row);
            }
        }
        tx.commit()?;

        debug!("Appended {} log lines for agent {}", stored.len(), agent_id);
        Ok(stored)
    }

    pub fn log_by_id(&self, id: &str) -> StoreResult<Option<Log>> {
        let sql = format!("SELECT {LOG_COLS} FROM \"Log\" WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_log)
            .optional()?)
    }

    /// Logs for one agent, oldest first, optionally bounded below by time.
    pub fn logs_for_agent(
        &self,
        agent_id: &str,
        since: Option<DateTime<Utc>>,
        page: Page,
    ) -> StoreResult<Vec<Log>> {
        let sql = format!(
            "SELECT {LOG_COLS} FROM \"Log\"
             WHERE agentId = ?1 AND (?2 IS NULL OR createdAt >= ?2)
             ORDER BY createdAt, id{}",
            page.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![agent_id, since.map(|d| d.to_rfc3339())],
            row_to_log,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// The newest `limit` log lines across all agents, newest first.
    pub fn recent_logs(&self, limit: u32) -> StoreResult<Vec<Log>> {
        let sql = format!(
            "SELECT {LOG_COLS} FROM \"Log\" ORDER BY createdAt DESC, id DESC LIMIT {limit}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_log)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Delete log lines older than the cutoff. Returns how many went.
    pub fn prune_logs_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let deleted = self.conn.execute(
            "DELETE FROM \"Log\" WHERE createdAt < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        if deleted > 0 {
            debug!("Pruned {} log lines older than {}", deleted, cutoff);
        }
        Ok(deleted as u64)
    }

    pub fn count_logs(&self, agent_id: Option<&str>) -> StoreResult<u64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM \"Log\" WHERE (?1 IS NULL OR agentId = ?1)",
            params![agent_id],
            |row| row.get(0),
        )?)
    }

    /// Log-line counts per agent, busiest first.
    pub fn log_count_by_agent(&self) -> StoreResult<Vec<(String, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT agentId, COUNT(*) FROM \"Log\" GROUP BY agentId ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::agents::NewAgent;
    use crate::store::users::NewUser;

    fn agent_id(db: &Database, name: &str) -> String {
        let uid = db
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{name}@example.com"),
                ..Default::default()
            })
            .unwrap()
            .id;
        db.create_agent(NewAgent {
            name: format!("{name}-bot"),
            user_id: uid,
            ..Default::default()
        })
        .unwrap()
        .id
    }

    #[test]
    fn append_and_read_back() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db, "ada");

        let log = db.append_log(&aid, "started").unwrap();
        let read = db.log_by_id(&log.id).unwrap().unwrap();
        assert_eq!(read.message, "started");
        assert_eq!(read.agent_id, aid);
    }

    #[test]
    fn batch_append_returns_stored_rows() {
        let mut db = Database::open_memory().unwrap();
        let aid = agent_id(&db, "ada");

        let lines: Vec<String> = (0..3).map(|i| format!("line {i}")).collect();
        let stored = db.append_logs(&aid, &lines).unwrap();
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[2].message, "line 2");
        assert_eq!(db.count_logs(Some(&aid)).unwrap(), 3);
    }

    #[test]
    fn batch_append_is_atomic_on_bad_agent() {
        let mut db = Database::open_memory().unwrap();
        let lines = vec!["a".to_string(), "b".to_string()];
        let err = db.append_logs("no-such-agent", &lines);
        assert!(matches!(err, Err(StoreError::Conflict { .. })));
        assert_eq!(db.count_logs(None).unwrap(), 0);
    }

    #[test]
    fn logs_for_agent_returns_exactly_matching_rows() {
        let db = Database::open_memory().unwrap();
        let ada = agent_id(&db, "ada");
        let bob = agent_id(&db, "bob");
        db.append_log(&ada, "mine").unwrap();
        db.append_log(&bob, "theirs").unwrap();

        let mine = db.logs_for_agent(&ada, None, Page::default()).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].message, "mine");
    }

    #[test]
    fn since_bound_and_prune() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db, "ada");
        db.append_log(&aid, "old").unwrap();
        let cutoff = Utc::now() + chrono::Duration::seconds(1);

        let after = db
            .logs_for_agent(&aid, Some(cutoff), Page::default())
            .unwrap();
        assert!(after.is_empty());

        assert_eq!(db.prune_logs_before(cutoff).unwrap(), 1);
        assert_eq!(db.count_logs(None).unwrap(), 0);
    }

    #[test]
    fn recent_logs_newest_first() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db, "ada");
        for i in 0..5 {
            db.append_log(&aid, &format!("line {i}")).unwrap();
        }

        let recent = db.recent_logs(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at >= recent[1].created_at);
    }

    #[test]
    fn group_by_agent_counts() {
        let db = Database::open_memory().unwrap();
        let ada = agent_id(&db, "ada");
        let bob = agent_id(&db, "bob");
        for _ in 0..3 {
            db.append_log(&ada, "x").unwrap();
        }
        db.append_log(&bob, "y").unwrap();

        let counts = db.log_count_by_agent().unwrap();
        assert_eq!(counts[0], (ada, 3));
        assert_eq!(counts[1], (bob, 1));
    }

    #[test]
    fn deleting_an_agent_cascades_logs() {
        let db = Database::open_memory().unwrap();
        let aid = agent_id(&db, "ada");
        db.append_log(&aid, "x").unwrap();

        db.delete_agent(&aid).unwrap();
        assert_eq!(db.count_logs(None).unwrap(), 0);
    }
}
