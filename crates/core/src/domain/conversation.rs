use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One prior exchange supplied by the caller. History is owned by the caller and
/// is never persisted server-side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Renders history as the line-oriented transcript embedded in specialist prompts.
pub fn transcript(history: &[ConversationTurn]) -> String {
    history
        .iter()
        .map(|turn| match turn.role {
            Role::User => format!("Previous Q: {}", turn.content),
            Role::Assistant => format!("Your Previous A: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
