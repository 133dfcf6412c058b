//! User account operations, including point accounting.

use crate::store::database::{new_id, parse_ts, Database};
use crate::store::error::{StoreError, StoreResult};
use crate::store::Page;
use crate::types::User;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::debug;

const USER_COLS: &str =
    "id, createdAt, updatedAt, username, email, hashedPassword, systemPrompt, iconUrl, \
     currentPoints, autoRecharge";

/// Fields for a new account. Id and timestamps are assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub hashed_password: Option<String>,
    pub system_prompt: Option<String>,
    pub icon_url: Option<String>,
    pub current_points: i64,
    pub auto_recharge: bool,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub hashed_password: Option<String>,
    pub system_prompt: Option<String>,
    pub icon_url: Option<String>,
    pub auto_recharge: Option<bool>,
}

/// Summary statistics over `currentPoints`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointsAggregate {
    pub users: u64,
    pub total: i64,
    pub avg: Option<f64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        created_at: parse_ts(1, row.get(1)?)?,
        updated_at: parse_ts(2, row.get(2)?)?,
        username: row.get(3)?,
        email: row.get(4)?,
        hashed_password: row.get(5)?,
        system_prompt: row.get(6)?,
        icon_url: row.get(7)?,
        current_points: row.get(8)?,
        auto_recharge: row.get::<_, i64>(9)? != 0,
    })
}

impl Database {
    /// Insert a new user. Fails with [`StoreError::Conflict`] if the
    /// username or email is already taken.
    pub fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let now = Utc::now();
        let user = User {
            id: new_id(),
            created_at: now,
            updated_at: now,
            username: new.username,
            email: new.email,
            hashed_password: new.hashed_password,
            system_prompt: new.system_prompt,
            icon_url: new.icon_url,
            current_points: new.current_points,
            auto_recharge: new.auto_recharge,
        };

        self.conn.execute(
            "INSERT INTO \"User\" (id, createdAt, updatedAt, username, email, hashedPassword, \
             systemPrompt, iconUrl, currentPoints, autoRecharge)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                user.id,
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
                user.username,
                user.email,
                user.hashed_password,
                user.system_prompt,
                user.icon_url,
                user.current_points,
                user.auto_recharge as i64,
            ],
        )?;

        debug!("Created user '{}' ({})", user.username, user.id);
        Ok(user)
    }

    pub fn user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLS} FROM \"User\" WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], row_to_user)
            .optional()?)
    }

    pub fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLS} FROM \"User\" WHERE username = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![username], row_to_user)
            .optional()?)
    }

    pub fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLS} FROM \"User\" WHERE email = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![email], row_to_user)
            .optional()?)
    }

    /// Like [`Database::user_by_id`] but absence is an error.
    pub fn require_user(&self, id: &str) -> StoreResult<User> {
        self.user_by_id(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "User",
            key: id.to_string(),
        })
    }

    pub fn list_users(&self, page: Page) -> StoreResult<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLS} FROM \"User\" ORDER BY createdAt, id{}",
            page.sql()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_user)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Apply a partial update and return the stored row.
    pub fn update_user(&self, id: &str, patch: UserPatch) -> StoreResult<User> {
        let updated = self.conn.execute(
            "UPDATE \"User\" SET
                email = COALESCE(?2, email),
                hashedPassword = COALESCE(?3, hashedPassword),
                systemPrompt = COALESCE(?4, systemPrompt),
                iconUrl = COALESCE(?5, iconUrl),
                autoRecharge = COALESCE(?6, autoRecharge),
                updatedAt = ?7
             WHERE id = ?1",
            params![
                id,
                patch.email,
                patch.hashed_password,
                patch.system_prompt,
                patch.icon_url,
                patch.auto_recharge.map(|b| b as i64),
                Utc::now().to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(StoreError::NotFound {
                entity: "User",
                key: id.to_string(),
            });
        }
        self.require_user(id)
    }

    pub fn delete_user(&self, id: &str) -> StoreResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM \"User\" WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "User",
                key: id.to_string(),
            });
        }
        Ok(())
    }

    pub fn count_users(&self) -> StoreResult<u64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM \"User\"", [], |row| row.get(0))?)
    }

    /// Debit points atomically. The balance never goes negative; an
    /// overdraw fails with [`StoreError::InsufficientPoints`].
    pub fn spend_points(&self, id: &str, amount: i64) -> StoreResult<i64> {
        let updated = self.conn.execute(
            "UPDATE \"User\" SET currentPoints = currentPoints - ?2, updatedAt = ?3
             WHERE id = ?1 AND currentPoints >= ?2",
            params![id, amount, Utc::now().to_rfc3339()],
        )?;

        if updated == 0 {
            let user = self.require_user(id)?;
            return Err(StoreError::InsufficientPoints {
                balance: user.current_points,
                requested: amount,
            });
        }

        let user = self.require_user(id)?;
        debug!("User {} spent {} points, balance {}", id, amount, user.current_points);
        Ok(user.current_points)
    }

    /// Top an auto-recharge user's balance up to their subscription's
    /// `dailyPoints`. No-op for balances at or above the threshold, and
    /// for users who opted out of auto-recharge. Returns the balance.
    pub fn recharge_points(&self, user_id: &str) -> StoreResult<i64> {
        let sub = self
            .subscription_for_user(user_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Subscription",
                key: user_id.to_string(),
            })?;

        self.conn.execute(
            "UPDATE \"User\" SET currentPoints = ?2, updatedAt = ?3
             WHERE id = ?1 AND autoRecharge = 1 AND currentPoints < ?2",
            params![user_id, sub.daily_points, Utc::now().to_rfc3339()],
        )?;

        Ok(self.require_user(user_id)?.current_points)
    }

    /// Aggregate statistics over all users' point balances.
    pub fn user_points_aggregate(&self) -> StoreResult<PointsAggregate> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(currentPoints), 0), AVG(currentPoints),
                    MIN(currentPoints), MAX(currentPoints)
             FROM \"User\"",
            [],
            |row| {
                Ok(PointsAggregate {
                    users: row.get(0)?,
                    total: row.get(1)?,
                    avg: row.get(2)?,
                    min: row.get(3)?,
                    max: row.get(4)?,
                })
            },
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::subscriptions::NewSubscription;
    use crate::types::PlanType;

    fn sample_user(name: &str) -> NewUser {
        NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            ..Default::default()
        }
    }

    #[test]
    fn create_then_read_round_trips_scalars() {
        let db = Database::open_memory().unwrap();
        let created = db
            .create_user(NewUser {
                username: "ada".into(),
                email: "ada@example.com".into(),
                hashed_password: Some("$argon2id$...".into()),
                system_prompt: Some("be terse".into()),
                icon_url: None,
                current_points: 120,
                auto_recharge: true,
            })
            .unwrap();

        let read = db.user_by_id(&created.id).unwrap().unwrap();
        assert_eq!(read.username, "ada");
        assert_eq!(read.email, "ada@example.com");
        assert_eq!(read.hashed_password.as_deref(), Some("$argon2id$..."));
        assert_eq!(read.system_prompt.as_deref(), Some("be terse"));
        assert_eq!(read.icon_url, None);
        assert_eq!(read.current_points, 120);
        assert!(read.auto_recharge);
        assert_eq!(read.created_at, created.created_at);
    }

    #[test]
    fn nullable_fields_accept_absence() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user(sample_user("bare")).unwrap();
        let read = db.user_by_id(&user.id).unwrap().unwrap();
        assert!(read.hashed_password.is_none());
        assert!(read.system_prompt.is_none());
        assert!(read.icon_url.is_none());
    }

    #[test]
    fn duplicate_username_and_email_are_conflicts() {
        let db = Database::open_memory().unwrap();
        db.create_user(sample_user("ada")).unwrap();

        let same_name = db.create_user(NewUser {
            username: "ada".into(),
            email: "other@example.com".into(),
            ..Default::default()
        });
        assert!(matches!(same_name, Err(StoreError::Conflict { .. })));

        let same_email = db.create_user(NewUser {
            username: "grace".into(),
            email: "ada@example.com".into(),
            ..Default::default()
        });
        assert!(matches!(same_email, Err(StoreError::Conflict { .. })));
    }

    #[test]
    fn unique_lookups_hit_and_miss() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user(sample_user("ada")).unwrap();

        assert_eq!(db.user_by_username("ada").unwrap().unwrap().id, user.id);
        assert_eq!(
            db.user_by_email("ada@example.com").unwrap().unwrap().id,
            user.id
        );
        assert!(db.user_by_username("nobody").unwrap().is_none());
        assert!(matches!(
            db.require_user("missing"),
            Err(StoreError::NotFound { entity: "User", .. })
        ));
    }

    #[test]
    fn patch_updates_only_given_fields() {
        let db = Database::open_memory().unwrap();
        let user = db.create_user(sample_user("ada")).unwrap();

        let updated = db
            .update_user(
                &user.id,
                UserPatch {
                    system_prompt: Some("new prompt".into()),
                    auto_recharge: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.email, "ada@example.com");
        assert_eq!(updated.system_prompt.as_deref(), Some("new prompt"));
        assert!(updated.auto_recharge);
        assert!(updated.updated_at >= user.updated_at);
    }

    #[test]
    fn spending_never_overdraws() {
        let db = Database::open_memory().unwrap();
        let user = db
            .create_user(NewUser {
                current_points: 10,
                ..sample_user("ada")
            })
            .unwrap();

        assert_eq!(db.spend_points(&user.id, 4).unwrap(), 6);
        let err = db.spend_points(&user.id, 7).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientPoints {
                balance: 6,
                requested: 7
            }
        ));
        assert_eq!(db.require_user(&user.id).unwrap().current_points, 6);
    }

    #[test]
    fn recharge_tops_up_to_daily_points() {
        let db = Database::open_memory().unwrap();
        let user = db
            .create_user(NewUser {
                current_points: 3,
                auto_recharge: true,
                ..sample_user("ada")
            })
            .unwrap();
        db.create_subscription(NewSubscription {
            plan_type: PlanType::Pro,
            daily_points: 100,
            swap_fee: 0.5,
            user_id: user.id.clone(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(db.recharge_points(&user.id).unwrap(), 100);
        // Already at the threshold: unchanged.
        assert_eq!(db.recharge_points(&user.id).unwrap(), 100);
    }

    #[test]
    fn recharge_respects_opt_out() {
        let db = Database::open_memory().unwrap();
        let user = db
            .create_user(NewUser {
                current_points: 3,
                auto_recharge: false,
                ..sample_user("ada")
            })
            .unwrap();
        db.create_subscription(NewSubscription {
            plan_type: PlanType::Free,
            daily_points: 50,
            user_id: user.id.clone(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(db.recharge_points(&user.id).unwrap(), 3);
    }

    #[test]
    fn points_aggregate_over_users() {
        let db = Database::open_memory().unwrap();
        let empty = db.user_points_aggregate().unwrap();
        assert_eq!(empty.users, 0);
        assert_eq!(empty.total, 0);
        assert!(empty.min.is_none());

        for (name, points) in [("a", 10), ("b", 20), ("c", 30)] {
            db.create_user(NewUser {
                current_points: points,
                ..sample_user(name)
            })
            .unwrap();
        }

        let agg = db.user_points_aggregate().unwrap();
        assert_eq!(agg.users, 3);
        assert_eq!(agg.total, 60);
        assert_eq!(agg.avg, Some(20.0));
        assert_eq!(agg.min, Some(10));
        assert_eq!(agg.max, Some(30));
    }

    #[test]
    fn delete_missing_user_is_not_found() {
        let db = Database::open_memory().unwrap();
        assert!(matches!(
            db.delete_user("nope"),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn list_users_pages_in_creation_order() {
        let db = Database::open_memory().unwrap();
        for name in ["a", "b", "c"] {
            db.create_user(sample_user(name)).unwrap();
        }
        assert_eq!(db.count_users().unwrap(), 3);

        let first_two = db.list_users(Page::first(2)).unwrap();
        assert_eq!(first_two.len(), 2);
        let rest = db
            .list_users(Page {
                limit: None,
                offset: 2,
            })
            .unwrap();
        assert_eq!(rest.len(), 1);
    }
}
