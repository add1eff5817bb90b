use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const GREETING: &str = "Hello! I'm a SQL assistant. Ask me anything about your database.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Speaker label used when a conversation is rendered into a prompt.
    pub fn prompt_label(&self) -> &'static str {
        match self {
            Self::User => "Human",
            Self::Assistant => "AI",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Ordered, append-only list of turns owned by one session.
///
/// Persisted as a plain array of turns; an empty array loads back as the greeting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "Vec<Turn>")]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl From<Vec<Turn>> for Conversation {
    fn from(turns: Vec<Turn>) -> Self {
        Self::from_turns(turns)
    }
}

impl Serialize for Conversation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.turns.serialize(serializer)
    }
}

impl Conversation {
    pub fn seeded() -> Self {
        Self {
            turns: vec![Turn::assistant(GREETING)],
        }
    }

    /// Rebuilds a conversation from persisted turns. An empty list is reseeded.
    pub fn from_turns(turns: Vec<Turn>) -> Self {
        if turns.is_empty() {
            Self::seeded()
        } else {
            Self { turns }
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryForm {
    pub user_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
