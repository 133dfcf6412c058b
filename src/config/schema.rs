//! Configuration schema for agenthub.toml.

use crate::types::PlanType;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Path to the SQLite state database.
    pub db_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,

    /// Per-tier defaults applied when creating subscriptions.
    pub plans: PlanCatalog,

    /// Config version.
    pub version: u32,
}

/// Default point grants and fees per plan tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanCatalog {
    pub free: PlanSettings,
    pub pro: PlanSettings,
    pub elite: PlanSettings,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanSettings {
    pub daily_points: i64,
    pub swap_fee: f64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            db_path: "~/.agenthub/state.db".into(),
            log_level: "info".into(),
            plans: PlanCatalog::default(),
            version: 1,
        }
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self {
            free: PlanSettings {
                daily_points: 50,
                swap_fee: 1.0,
            },
            pro: PlanSettings {
                daily_points: 500,
                swap_fee: 0.5,
            },
            elite: PlanSettings {
                daily_points: 2000,
                swap_fee: 0.1,
            },
        }
    }
}

impl HubConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved database path.
    pub fn resolved_db_path(&self) -> String {
        self.resolve_path(&self.db_path)
    }

    /// Defaults for the given plan tier.
    pub fn plan_settings(&self, plan: PlanType) -> PlanSettings {
        match plan {
            PlanType::Free => self.plans.free,
            PlanType::Pro => self.plans.pro,
            PlanType::Elite => self.plans.elite,
        }
    }
}
