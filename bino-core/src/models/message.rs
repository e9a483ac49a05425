use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Author {
    User,
    Bot,
}

/// One entry of the in-memory transcript. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub author: Author,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: Author::User,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: Author::Bot,
        }
    }

    pub fn is_user(&self) -> bool {
        self.author == Author::User
    }
}
