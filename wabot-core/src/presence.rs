use serde::{Deserialize, Serialize};

/// Presence announced to a chat or to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatState {
    Available,
    Unavailable,
    Composing,
    Recording,
    Paused,
}

impl ChatState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatState::Available => "available",
            ChatState::Unavailable => "unavailable",
            ChatState::Composing => "composing",
            ChatState::Recording => "recording",
            ChatState::Paused => "paused",
        }
    }
}

impl std::fmt::Display for ChatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_state_display() {
        assert_eq!(ChatState::Composing.to_string(), "composing");
        assert_eq!(ChatState::Recording.to_string(), "recording");
        assert_eq!(ChatState::Paused.to_string(), "paused");
        assert_eq!(
            serde_json::to_string(&ChatState::Available).unwrap(),
            "\"available\""
        );
    }
}
