//! Database schema definitions and migrations.
//!
//! Table and column names follow the deployed platform schema (PascalCase
//! tables, camelCase columns) so this crate can open an existing database
//! file without a rename migration. Enum columns store the exact wire
//! tokens; timestamps are RFC 3339 text; list and JSON columns store JSON.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Full DDL for the agenthub state database.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Platform accounts
CREATE TABLE IF NOT EXISTS "User" (
    id             TEXT PRIMARY KEY,
    createdAt      TEXT NOT NULL,
    updatedAt      TEXT NOT NULL,
    username       TEXT NOT NULL UNIQUE,
    email          TEXT NOT NULL UNIQUE,
    hashedPassword TEXT,
    systemPrompt   TEXT,
    iconUrl        TEXT,
    currentPoints  INTEGER NOT NULL DEFAULT 0,
    autoRecharge   INTEGER NOT NULL DEFAULT 0
);

-- Plan subscriptions, one per user
CREATE TABLE IF NOT EXISTS "Subscription" (
    id          TEXT PRIMARY KEY,
    createdAt   TEXT NOT NULL,
    updatedAt   TEXT NOT NULL,
    planType    TEXT NOT NULL,
    startDate   TEXT NOT NULL,
    endDate     TEXT,
    dailyPoints INTEGER NOT NULL DEFAULT 0,
    swapFee     REAL NOT NULL DEFAULT 0.0,
    userId      TEXT NOT NULL UNIQUE REFERENCES "User"(id) ON DELETE CASCADE
);

-- User-owned agents
CREATE TABLE IF NOT EXISTS "Agent" (
    id           TEXT PRIMARY KEY,
    createdAt    TEXT NOT NULL,
    updatedAt    TEXT NOT NULL,
    name         TEXT NOT NULL,
    description  TEXT,
    status       TEXT NOT NULL DEFAULT 'STOPPED',
    systemPrompt TEXT,
    iconUrl      TEXT,
    userId       TEXT NOT NULL REFERENCES "User"(id) ON DELETE CASCADE
);

-- MCP service catalog
CREATE TABLE IF NOT EXISTS "Mcp" (
    id          TEXT PRIMARY KEY,
    createdAt   TEXT NOT NULL,
    updatedAt   TEXT NOT NULL,
    name        TEXT NOT NULL,
    description TEXT,
    type        TEXT NOT NULL,
    author      TEXT NOT NULL,
    tags        TEXT NOT NULL DEFAULT '[]'
);

-- Agent <-> MCP bindings with per-pairing configuration
CREATE TABLE IF NOT EXISTS "AgentMcp" (
    id            TEXT PRIMARY KEY,
    createdAt     TEXT NOT NULL,
    updatedAt     TEXT NOT NULL,
    agentId       TEXT NOT NULL REFERENCES "Agent"(id) ON DELETE CASCADE,
    mcpId         TEXT NOT NULL REFERENCES "Mcp"(id) ON DELETE CASCADE,
    configuration TEXT,
    UNIQUE (agentId, mcpId)
);

-- Agent activation conditions
CREATE TABLE IF NOT EXISTS "Trigger" (
    id            TEXT PRIMARY KEY,
    createdAt     TEXT NOT NULL,
    updatedAt     TEXT NOT NULL,
    type          TEXT NOT NULL,
    configuration TEXT NOT NULL,
    agentId       TEXT NOT NULL REFERENCES "Agent"(id) ON DELETE CASCADE
);

-- Agent activity log
CREATE TABLE IF NOT EXISTS "Log" (
    id        TEXT PRIMARY KEY,
    createdAt TEXT NOT NULL,
    message   TEXT NOT NULL,
    agentId   TEXT NOT NULL REFERENCES "Agent"(id) ON DELETE CASCADE
);

-- Marketplace listings
CREATE TABLE IF NOT EXISTS "StoreItem" (
    id            TEXT PRIMARY KEY,
    createdAt     TEXT NOT NULL,
    updatedAt     TEXT NOT NULL,
    name          TEXT NOT NULL,
    description   TEXT,
    details       TEXT,
    type          TEXT NOT NULL,
    creator       TEXT NOT NULL,
    tags          TEXT NOT NULL DEFAULT '[]',
    agentTemplate TEXT,
    mcpId         TEXT UNIQUE REFERENCES "Mcp"(id) ON DELETE SET NULL
);

-- Chat conversations (agentId is a loose reference, no FK)
CREATE TABLE IF NOT EXISTS "ChatSession" (
    id        TEXT PRIMARY KEY,
    createdAt TEXT NOT NULL,
    updatedAt TEXT NOT NULL,
    title     TEXT,
    agentId   TEXT
);

-- Messages within a conversation
CREATE TABLE IF NOT EXISTS "ChatMessage" (
    id            TEXT PRIMARY KEY,
    createdAt     TEXT NOT NULL,
    role          TEXT NOT NULL,
    content       TEXT NOT NULL,
    chatSessionId TEXT NOT NULL REFERENCES "ChatSession"(id) ON DELETE CASCADE
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_agent_user ON "Agent"(userId);
CREATE INDEX IF NOT EXISTS idx_agent_status ON "Agent"(status);
CREATE INDEX IF NOT EXISTS idx_agentmcp_agent ON "AgentMcp"(agentId);
CREATE INDEX IF NOT EXISTS idx_agentmcp_mcp ON "AgentMcp"(mcpId);
CREATE INDEX IF NOT EXISTS idx_trigger_agent ON "Trigger"(agentId);
CREATE INDEX IF NOT EXISTS idx_log_agent ON "Log"(agentId);
CREATE INDEX IF NOT EXISTS idx_log_created ON "Log"(createdAt);
CREATE INDEX IF NOT EXISTS idx_storeitem_type ON "StoreItem"(type);
CREATE INDEX IF NOT EXISTS idx_message_session ON "ChatMessage"(chatSessionId);
"#;

/// Migration from version 1 to version 2.
///
/// v1 shipped before sessions could be pinned to an agent.
pub const MIGRATE_V1_TO_V2: &str = r#"
ALTER TABLE "ChatSession" ADD COLUMN agentId TEXT;
"#;
