use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// What a transport hands to the exchange driver, one per backend message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// A raw text fragment, possibly still JSON-quoted.
    Delta { content: String },
    /// The backend signalled the end of the exchange.
    Done,
}

impl StreamChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        StreamChunk::Delta {
            content: content.into(),
        }
    }
}

/// One streamed exchange with the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRequest {
    /// Send a user message into an existing conversation.
    Conversation {
        conversation_id: String,
        content: String,
    },
    /// Stateless chat over an explicit message list.
    Chat { messages: Vec<ChatMessage> },
}

impl ChatRequest {
    pub fn conversation(conversation_id: impl Into<String>, content: impl Into<String>) -> Self {
        ChatRequest::Conversation {
            conversation_id: conversation_id.into(),
            content: content.into(),
        }
    }

    pub fn chat(messages: Vec<ChatMessage>) -> Self {
        ChatRequest::Chat { messages }
    }

    /// Messages sent in the request body.
    pub fn messages(&self) -> Vec<ChatMessage> {
        match self {
            ChatRequest::Conversation { content, .. } => vec![ChatMessage::user(content.as_str())],
            ChatRequest::Chat { messages } => messages.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let msg = ChatMessage::user("Hello, world!");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "Hello, world!"}));
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_conversation_request_messages() {
        let request = ChatRequest::conversation("c-1", "What is Rust?");
        assert_eq!(request.messages(), vec![ChatMessage::user("What is Rust?")]);
    }
}
