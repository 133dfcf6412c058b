//! Typed data-access layer over the agenthub SQLite schema.
//!
//! One module per model; every operation is a plain method on [`Database`].

pub mod agents;
pub mod catalog;
pub mod chat;
pub mod database;
pub mod error;
pub mod logs;
pub mod mcps;
pub mod schema;
pub mod subscriptions;
pub mod triggers;
pub mod users;

pub use database::Database;
pub use error::{StoreError, StoreResult};

/// Limit/offset window for list operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Page {
    /// Maximum rows to return; `None` means unbounded.
    pub limit: Option<u32>,
    pub offset: u32,
}

impl Page {
    pub fn first(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            offset: 0,
        }
    }

    /// Render as a SQL fragment. SQLite needs a LIMIT clause before OFFSET;
    /// -1 means no limit.
    pub(crate) fn sql(&self) -> String {
        match self.limit {
            Some(limit) => format!(" LIMIT {} OFFSET {}", limit, self.offset),
            None if self.offset > 0 => format!(" LIMIT -1 OFFSET {}", self.offset),
            None => String::new(),
        }
    }
}
