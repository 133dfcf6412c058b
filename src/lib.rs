//! Agenthub — state store for an AI-agent platform.
//!
//! Users own agents; agents bind MCP services, carry triggers, and emit
//! logs; a marketplace lists agent templates and MCP services; chat
//! sessions record conversations. This crate owns the SQLite schema and
//! the typed data-access layer over it.

pub mod config;
pub mod store;
pub mod types;
