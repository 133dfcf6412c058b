//! Domain records and closed enums shared across the agenthub store.
//!
//! Enum wire values and field names match the deployed platform schema,
//! so rows written by this crate stay readable by the rest of the stack.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored string is not a member of a closed enum.
#[derive(Debug, Clone, thiserror::Error)]
#[error("'{value}' is not a valid {enum_name}")]
pub struct InvalidEnumValue {
    pub enum_name: &'static str,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Plan tiers
// ---------------------------------------------------------------------------

/// Subscription plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanType {
    Free,
    Pro,
    Elite,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Pro => "PRO",
            Self::Elite => "ELITE",
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanType {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE" => Ok(Self::Free),
            "PRO" => Ok(Self::Pro),
            "ELITE" => Ok(Self::Elite),
            other => Err(InvalidEnumValue {
                enum_name: "PlanType",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Agent lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Running,
    Stopped,
    Error,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentStatus {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "STOPPED" => Ok(Self::Stopped),
            "ERROR" => Ok(Self::Error),
            other => Err(InvalidEnumValue {
                enum_name: "AgentStatus",
                value: other.to_string(),
            }),
        }
    }
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Stopped
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Kind of condition that activates an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerType {
    Scheduled,
    EventSocial,
    EventPrice,
    EventChain,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::EventSocial => "EVENT_SOCIAL",
            Self::EventPrice => "EVENT_PRICE",
            Self::EventChain => "EVENT_CHAIN",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(Self::Scheduled),
            "EVENT_SOCIAL" => Ok(Self::EventSocial),
            "EVENT_PRICE" => Ok(Self::EventPrice),
            "EVENT_CHAIN" => Ok(Self::EventChain),
            other => Err(InvalidEnumValue {
                enum_name: "TriggerType",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Marketplace listings
// ---------------------------------------------------------------------------

/// What a store listing sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    AgentTemplate,
    McpService,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentTemplate => "AGENT_TEMPLATE",
            Self::McpService => "MCP_SERVICE",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = InvalidEnumValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AGENT_TEMPLATE" => Ok(Self::AgentTemplate),
            "MCP_SERVICE" => Ok(Self::McpService),
            other => Err(InvalidEnumValue {
                enum_name: "ItemType",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// A platform account. Owns agents and at most one subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub username: String,
    pub email: String,
    pub hashed_password: Option<String>,
    pub system_prompt: Option<String>,
    pub icon_url: Option<String>,
    pub current_points: i64,
    pub auto_recharge: bool,
}

/// A user's plan subscription. One-to-one with [`User`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub plan_type: PlanType,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub daily_points: i64,
    pub swap_fee: f64,
    pub user_id: String,
}

// ---------------------------------------------------------------------------
// Agents and tool bindings
// ---------------------------------------------------------------------------

/// A user-owned automated agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub status: AgentStatus,
    pub system_prompt: Option<String>,
    pub icon_url: Option<String>,
    pub user_id: String,
}

/// An MCP service entry an agent can bind to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mcp {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub mcp_type: String,
    pub author: String,
    pub tags: Vec<String>,
}

/// Join record binding an agent to an MCP service, with per-pairing config.
/// At most one binding per (agent, mcp) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMcp {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub agent_id: String,
    pub mcp_id: String,
    pub configuration: Option<serde_json::Value>,
}

/// A configured condition that activates an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub trigger_type: TriggerType,
    pub configuration: serde_json::Value,
    pub agent_id: String,
}

/// A line of agent activity output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub message: String,
    pub agent_id: String,
}

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

/// A marketplace listing for an agent template or an MCP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreItem {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub item_type: ItemType,
    pub creator: String,
    pub tags: Vec<String>,
    pub agent_template: Option<serde_json::Value>,
    pub mcp_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A chat conversation. `agent_id` is a loose reference, not enforced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: Option<String>,
    pub agent_id: Option<String>,
}

/// A single message within a chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub role: String,
    pub content: String,
    pub chat_session_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_wire_values_round_trip() {
        for plan in [PlanType::Free, PlanType::Pro, PlanType::Elite] {
            assert_eq!(plan.as_str().parse::<PlanType>().unwrap(), plan);
        }
        for status in [AgentStatus::Running, AgentStatus::Stopped, AgentStatus::Error] {
            assert_eq!(status.as_str().parse::<AgentStatus>().unwrap(), status);
        }
        for tt in [
            TriggerType::Scheduled,
            TriggerType::EventSocial,
            TriggerType::EventPrice,
            TriggerType::EventChain,
        ] {
            assert_eq!(tt.as_str().parse::<TriggerType>().unwrap(), tt);
        }
        for it in [ItemType::AgentTemplate, ItemType::McpService] {
            assert_eq!(it.as_str().parse::<ItemType>().unwrap(), it);
        }
    }

    #[test]
    fn enums_reject_values_outside_the_set() {
        assert!("BASIC".parse::<PlanType>().is_err());
        assert!("running".parse::<AgentStatus>().is_err());
        assert!("EVENT_WEATHER".parse::<TriggerType>().is_err());
        assert!("".parse::<ItemType>().is_err());
    }

    #[test]
    fn serde_uses_exact_wire_tokens() {
        assert_eq!(serde_json::to_string(&PlanType::Elite).unwrap(), "\"ELITE\"");
        assert_eq!(
            serde_json::to_string(&TriggerType::EventPrice).unwrap(),
            "\"EVENT_PRICE\""
        );
        let status: AgentStatus = serde_json::from_str("\"STOPPED\"").unwrap();
        assert_eq!(status, AgentStatus::Stopped);
    }
}
