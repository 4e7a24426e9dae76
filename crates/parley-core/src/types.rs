use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Enums
// =============================================================================

/// The author of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// The closed set of agent capabilities.
///
/// Each kind maps to one search engine hint and one summarization persona.
/// Adding a kind means adding a `Capability` implementation, never touching
/// the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    General,
    Academic,
    Video,
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentKind::General => write!(f, "general"),
            AgentKind::Academic => write!(f, "academic"),
            AgentKind::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for AgentKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(AgentKind::General),
            "academic" => Ok(AgentKind::Academic),
            "video" => Ok(AgentKind::Video),
            _ => Err(format!("Unknown agent kind: {}", s)),
        }
    }
}

// =============================================================================
// Value objects
// =============================================================================

/// A message as retrieved from a user's namespace.
///
/// `seq` is the monotonic insertion sequence assigned by the store and is
/// the only ordering key; `message_id` is caller-supplied and carries no
/// ordering meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub seq: i64,
    pub chat_id: String,
    pub message_id: String,
    pub content: String,
    pub role: Role,
    pub metadata: Option<serde_json::Value>,
}

/// A chat record. Created once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub mode: String,
}

/// A single result returned by the search upstream.
///
/// The upstream response carries more fields; only title and url survive
/// into prompts and listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}
