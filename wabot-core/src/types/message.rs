use crate::types::jid::{Jid, MessageId};
use serde::{Deserialize, Serialize};

/// Identifies one message inside one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: Jid,
    pub id: MessageId,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<Jid>,
}

impl MessageKey {
    pub fn new(remote_jid: Jid, id: impl Into<MessageId>, from_me: bool) -> Self {
        Self {
            remote_jid,
            id: id.into(),
            from_me,
            participant: None,
        }
    }
}

/// A message as delivered by the session: key, content and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebMessage {
    pub key: MessageKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// Seconds since the unix epoch.
    #[serde(default)]
    pub message_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
}

impl WebMessage {
    pub fn new(key: MessageKey, message: Message, message_timestamp: i64) -> Self {
        Self {
            key,
            message: Some(message),
            message_timestamp,
            push_name: None,
        }
    }
}

/// Content of a message. Exactly one content field is normally populated;
/// the wrapper fields (`ephemeral_message`, `view_once_message`,
/// `device_sent_message`) nest another `Message`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_text_message: Option<ExtendedTextMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_message: Option<MediaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_message: Option<MediaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_message: Option<MediaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sticker_message: Option<MediaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction_message: Option<ReactionMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_creation_message: Option<PollCreationMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral_message: Option<Box<FutureProofMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_once_message: Option<Box<FutureProofMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_sent_message: Option<Box<FutureProofMessage>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FutureProofMessage {
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtendedTextMessage {
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_text: Option<String>,
}

/// Shared shape of image, video, document and sticker payloads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<MessageKey>,
    /// Emoji; empty when a reaction is removed.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollCreationMessage {
    pub name: String,
    pub options: Vec<PollOption>,
    pub selectable_options_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollOption {
    pub option_name: String,
}

/// Which content field a message carries, named the way the library names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Conversation,
    ExtendedText,
    Image,
    Video,
    Document,
    Sticker,
    Reaction,
    PollCreation,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Conversation => "conversation",
            ContentType::ExtendedText => "extendedTextMessage",
            ContentType::Image => "imageMessage",
            ContentType::Video => "videoMessage",
            ContentType::Document => "documentMessage",
            ContentType::Sticker => "stickerMessage",
            ContentType::Reaction => "reactionMessage",
            ContentType::PollCreation => "pollCreationMessage",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content handed to the session for sending.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutgoingContent {
    Text {
        text: String,
    },
    Sticker {
        mimetype: String,
        file_length: u64,
        #[serde(skip)]
        data: Vec<u8>,
    },
}

impl OutgoingContent {
    pub fn text(text: impl Into<String>) -> Self {
        OutgoingContent::Text { text: text.into() }
    }

    pub fn sticker(data: Vec<u8>) -> Self {
        OutgoingContent::Sticker {
            mimetype: "image/webp".to_string(),
            file_length: data.len() as u64,
            data,
        }
    }

    pub fn is_sticker(&self) -> bool {
        matches!(self, OutgoingContent::Sticker { .. })
    }
}
