//! Subscription operations. One subscription per user, enforced by the
//! unique `userId` column.

use crate::store::database::{new_id, parse_enum, parse_ts, parse_ts_opt, Database};
use crate::store::error::{StoreError, StoreResult};
use crate::store::Page;
use crate::types::{PlanType, Subscription};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const SUB_COLS: &str =
    "id, createdAt, updatedAt, planType, startDate, endDate, dailyPoints, swapFee, userId";

/// Fields for a new subscription. `start_date` defaults to now.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub plan_type: PlanType,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub daily_points: i64,
    pub swap_fee: f64,
    pub user_id: String,
}

impl Default for NewSubscription {
    fn default() -> Self {
        Self {
            plan_type: PlanType::Free,
            start_date: None,
            end_date: None,
            daily_points: 0,
            swap_fee: 0.0,
            user_id: String::new(),
        }
    }
}

/// Partial update; `None` fields are left unchanged. End-date changes go
/// through [`Database::set_subscription_end`] so they can clear the column.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionPatch {
    pub plan_type: Option<PlanType>,
    pub daily_points: Option<i64>,
    pub swap_fee: Option<f64>,
}

fn row_to_subscription(row: &Row) -> rusqlite::Result<Subscription> {
    Ok(Subscription {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        updated_at: parse_ts(2, row.get(2)?)?,
        plan_type: parse_enum(3, row.get(3)?)?,
        start_date: parse_ts(4, row.get(4)?)?,
        end_date: parse_ts_opt(5, row.get(5)?)?,
        daily_points: row.get(6)?,
        swap_fee: row.get(7)?,
        user_id: row.get(8)?,
    })
}

impl Database {
    /// Insert a subscription. A second subscription for the same user is a
    /// [`StoreError::Conflict`].
    pub fn create_subscription(&self, new: NewSubscription) -> StoreResult<Subscription> {
        let now = Utc::now();
        let sub = Subscription {
            id: new_id(),
            created_at: now,
            updated_at: now,
            plan_type: new.plan_type,
            start_date: new.start_date.unwrap_or(now),
            end_date: new.end_date,
            daily_points: new.daily_points,
            swap_fee: new.swap_fee,
            user_id: new.user_id,
        };

        self.conn.execute(
            "INSERT INTO \"Subscription\" (id, createdAt, updatedAt, planType, startDate, \
             endDate, dailyPoints, swapFee, userId)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                sub.id,
                sub.created_at.to_rfc3339(),
                sub.updated_at.to_rfc3339(),
                sub.plan_type.as_str(),
                sub.start_date.to_rfc3339(),
                sub.end_date.map(|d| d.to_rfc3339()),
                sub.daily_points,
                sub.swap_fee,
                sub.user_id,
            ],
        )?;

        debug!("Created {} subscription for user {}", sub.plan_type, sub.user_id);
        Ok(sub)
    }

    /// Create or replace the user's subscription in one statement,
    /// keyed on the unique `userId`.
    pub fn upsert_subscription(&self, new: NewSubscription) -> StoreResult<Subscription> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO \"Subscription\" (id, createdAt, updatedAt, planType, startDate, \
             endDate, dailyPoints, swapFee, userId)
             VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(userId) DO UPDATE SET
                planType = ?3, startDate = ?4, endDate = ?5,
                dailyPoints = ?6, swapFee = ?7, updatedAt = ?2",
            params![
                new_id(),
                now.to_rfc3339(),
                new.plan_type.as_str(),
                new.start_date.unwrap_or(now).to_rfc3339(),
                new.end_date.map(|d| d.to_rfc3339()),
                new.daily_points,
                new.swap_fee,
                new.user_id,
            ],
        )?;

        self.subscription_for_user(&new.user_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Subscription",
                key: new.user_id,
            })
    }

    pub fn subscription_by_id(&self, id: &str) -> StoreResult<Option<Subscription>> {
        let sql = format!("SELECT {SUB_COLS} FROM \"Subscription\" WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_subscription)
            .optional()?)
    }

    pub fn subscription_for_user(&self, user_id: &str) -> StoreResult<Option<Subscription>> {
        let sql = format!("SELECT {SUB_COLS} FROM \"Subscription\" WHERE userId = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![user_id], row_to_subscription)
            .optional()?)
    }

    pub fn require_subscription(&self, id: &str) -> StoreResult<Subscription> {
        self.subscription_by_id(id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Subscription",
                key: id.to_string(),
            })
    }

    /// List subscriptions, optionally restricted to one plan tier.
    pub fn list_subscriptions(
        &self,
        plan: Option<PlanType>,
        page: Page,
    ) -> StoreResult<Vec<Subscription>> {
        let sql = format!(
            "SELECT {SUB_COLS} FROM \"Subscription\"
             WHERE (?1 IS NULL OR planType = ?1)
             ORDER BY createdAt, id{}",
            page.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![plan.map(|p| p.as_str())], row_to_subscription)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_subscription(
        &self,
        id: &str,
        patch: SubscriptionPatch,
    ) -> StoreResult<Subscription> {
        let updated = self.conn.execute(
            "UPDATE \"Subscription\" SET
                planType = COALESCE(?2, planType),
                dailyPoints = COALESCE(?3, dailyPoints),
                swapFee = COALESCE(?4, swapFee),
                updatedAt = ?5
             WHERE id = ?1",
            params![
                id,
                patch.plan_type.map(|p| p.as_str()),
                patch.daily_points,
                patch.swap_fee,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "Subscription",
                key: id.to_string(),
            });
        }
        self.require_subscription(id)
    }

    /// Set or clear the end date (clearing reactivates an expired plan).
    pub fn set_subscription_end(
        &self,
        id: &str,
        end_date: Option<DateTime<Utc>>,
    ) -> StoreResult<Subscription> {
        let updated = self.conn.execute(
            "UPDATE \"Subscription\" SET endDate = ?2, updatedAt = ?3 WHERE id = ?1",
            params![
                id,
                end_date.map(|d| d.to_rfc3339()),
                Utc::now().to_rfc3339()
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "Subscription",
                key: id.to_string(),
            });
        }
        self.require_subscription(id)
    }

    pub fn delete_subscription(&self, id: &str) -> StoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM \"Subscription\" WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "Subscription",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    /// Subscriber counts per plan tier.
    pub fn subscription_count_by_plan(&self) -> StoreResult<Vec<(PlanType, u64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT planType, COUNT(*) FROM \"Subscription\" GROUP BY planType ORDER BY planType",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((parse_enum(0, row.get(0)?)?, row.get::<_, u64>(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::users::NewUser;

    fn user_id(db: &Database, name: &str) -> String {
        db.create_user(NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            ..Default::default()
        })
        .unwrap()
        .id
    }

    #[test]
    fn create_and_read_back() {
        let db = Database::open_memory().unwrap();
        let uid = user_id(&db, "ada");
        let sub = db
            .create_subscription(NewSubscription {
                plan_type: PlanType::Elite,
                daily_points: 500,
                swap_fee: 0.25,
                user_id: uid.clone(),
                ..Default::default()
            })
            .unwrap();

        let read = db.subscription_for_user(&uid).unwrap().unwrap();
        assert_eq!(read.id, sub.id);
        assert_eq!(read.plan_type, PlanType::Elite);
        assert_eq!(read.daily_points, 500);
        assert_eq!(read.swap_fee, 0.25);
        assert!(read.end_date.is_none());
    }

    #[test]
    fn second_subscription_per_user_is_a_conflict() {
        let db = Database::open_memory().unwrap();
        let uid = user_id(&db, "ada");
        db.create_subscription(NewSubscription {
            user_id: uid.clone(),
            ..Default::default()
        })
        .unwrap();

        let second = db.create_subscription(NewSubscription {
            plan_type: PlanType::Pro,
            user_id: uid,
            ..Default::default()
        });
        assert!(matches!(second, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn subscription_requires_existing_user() {
        let db = Database::open_memory().unwrap();
        let orphan = db.create_subscription(NewSubscription {
            user_id: "no-such-user".into(),
            ..Default::default()
        });
        assert!(matches!(orphan, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn upsert_replaces_in_place() {
        let db = Database::open_memory().unwrap();
        let uid = user_id(&db, "ada");

        let first = db
            .upsert_subscription(NewSubscription {
                plan_type: PlanType::Free,
                daily_points: 50,
                user_id: uid.clone(),
                ..Default::default()
            })
            .unwrap();

        let second = db
            .upsert_subscription(NewSubscription {
                plan_type: PlanType::Pro,
                daily_points: 200,
                swap_fee: 0.5,
                user_id: uid.clone(),
                ..Default::default()
            })
            .unwrap();

        // Same row, upgraded plan.
        assert_eq!(second.id, first.id);
        assert_eq!(second.plan_type, PlanType::Pro);
        assert_eq!(second.daily_points, 200);
        assert_eq!(db.list_subscriptions(None, Page::default()).unwrap().len(), 1);
    }

    #[test]
    fn end_date_can_be_set_and_cleared() {
        let db = Database::open_memory().unwrap();
        let uid = user_id(&db, "ada");
        let sub = db
            .create_subscription(NewSubscription {
                user_id: uid,
                ..Default::default()
            })
            .unwrap();

        let ends = Utc::now();
        let expired = db.set_subscription_end(&sub.id, Some(ends)).unwrap();
        assert_eq!(
            expired.end_date.map(|d| d.timestamp()),
            Some(ends.timestamp())
        );

        let revived = db.set_subscription_end(&sub.id, None).unwrap();
        assert!(revived.end_date.is_none());
    }

    #[test]
    fn deleting_a_user_cascades_to_their_subscription() {
        let db = Database::open_memory().unwrap();
        let uid = user_id(&db, "ada");
        let sub = db
            .create_subscription(NewSubscription {
                user_id: uid.clone(),
                ..Default::default()
            })
            .unwrap();

        db.delete_user(&uid).unwrap();
        assert!(db.subscription_by_id(&sub.id).unwrap().is_none());
    }

    #[test]
    fn counts_group_by_plan() {
        let db = Database::open_memory().unwrap();
        for (name, plan) in [
            ("a", PlanType::Free),
            ("b", PlanType::Free),
            ("c", PlanType::Elite),
        ] {
            let uid = user_id(&db, name);
            db.create_subscription(NewSubscription {
                plan_type: plan,
                user_id: uid,
                ..Default::default()
            })
            .unwrap();
        }

        let counts = db.subscription_count_by_plan().unwrap();
        assert!(counts.contains(&(PlanType::Free, 2)));
        assert!(counts.contains(&(PlanType::Elite, 1)));

        let frees = db
            .list_subscriptions(Some(PlanType::Free), Page::default())
            .unwrap();
        assert_eq!(frees.len(), 2);
    }
}
