use crate::creds::CredsUpdate;
use crate::types::jid::Jid;
use crate::types::message::{Message, MessageKey, ReactionMessage, WebMessage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a session can report. The JSON form is
/// `{"event": "<name>", "data": {...}}` using the library's event names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    #[serde(rename = "connection.update")]
    ConnectionUpdate(ConnectionUpdate),
    #[serde(rename = "creds.update")]
    CredsUpdate(CredsUpdate),
    #[serde(rename = "messages.upsert")]
    MessagesUpsert(MessagesUpsert),
    #[serde(rename = "messages.update")]
    MessagesUpdate(Vec<MessageUpdate>),
    #[serde(rename = "message-receipt.update")]
    MessageReceiptUpdate(Vec<ReceiptUpdate>),
    #[serde(rename = "messages.reaction")]
    MessagesReaction(Vec<Reaction>),
    #[serde(rename = "contacts.upsert")]
    ContactsUpsert(Vec<Contact>),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ConnectionUpdate(_) => "connection.update",
            Event::CredsUpdate(_) => "creds.update",
            Event::MessagesUpsert(_) => "messages.upsert",
            Event::MessagesUpdate(_) => "messages.update",
            Event::MessageReceiptUpdate(_) => "message-receipt.update",
            Event::MessagesReaction(_) => "messages.reaction",
            Event::ContactsUpsert(_) => "contacts.upsert",
        }
    }

    pub fn open() -> Self {
        Event::ConnectionUpdate(ConnectionUpdate::state(ConnectionState::Open))
    }

    pub fn connecting() -> Self {
        Event::ConnectionUpdate(ConnectionUpdate::state(ConnectionState::Connecting))
    }

    pub fn closed(reason: DisconnectReason) -> Self {
        Event::ConnectionUpdate(ConnectionUpdate::closed(reason, reason.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_disconnect: Option<LastDisconnect>,
    /// QR payload to render for linking, when not yet registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_new_login: Option<bool>,
}

impl ConnectionUpdate {
    pub fn state(connection: ConnectionState) -> Self {
        Self {
            connection: Some(connection),
            ..Default::default()
        }
    }

    pub fn closed(reason: DisconnectReason, message: impl Into<String>) -> Self {
        Self {
            connection: Some(ConnectionState::Close),
            last_disconnect: Some(LastDisconnect {
                reason,
                message: message.into(),
                date: None,
            }),
            ..Default::default()
        }
    }

    /// The disconnect cause of a close update. A close without a recorded
    /// cause is treated as a lost connection.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self.connection {
            Some(ConnectionState::Close) => Some(
                self.last_disconnect
                    .as_ref()
                    .map(|d| d.reason)
                    .unwrap_or(DisconnectReason::ConnectionLost),
            ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastDisconnect {
    #[serde(rename = "statusCode")]
    pub reason: DisconnectReason,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

/// Why a session closed. Serialized as the numeric status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum DisconnectReason {
    ConnectionClosed,
    ConnectionLost,
    ConnectionReplaced,
    LoggedOut,
    BadSession,
    RestartRequired,
    MultideviceMismatch,
    Forbidden,
    UnavailableService,
    Unknown(i32),
}

impl From<i32> for DisconnectReason {
    fn from(code: i32) -> Self {
        match code {
            428 => Self::ConnectionClosed,
            408 => Self::ConnectionLost,
            440 => Self::ConnectionReplaced,
            401 => Self::LoggedOut,
            500 => Self::BadSession,
            515 => Self::RestartRequired,
            411 => Self::MultideviceMismatch,
            403 => Self::Forbidden,
            503 => Self::UnavailableService,
            _ => Self::Unknown(code),
        }
    }
}

impl From<DisconnectReason> for i32 {
    fn from(reason: DisconnectReason) -> Self {
        reason.code()
    }
}

impl DisconnectReason {
    pub fn code(&self) -> i32 {
        match self {
            Self::ConnectionClosed => 428,
            Self::ConnectionLost => 408,
            Self::ConnectionReplaced => 440,
            Self::LoggedOut => 401,
            Self::BadSession => 500,
            Self::RestartRequired => 515,
            Self::MultideviceMismatch => 411,
            Self::Forbidden => 403,
            Self::UnavailableService => 503,
            Self::Unknown(code) => *code,
        }
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self, Self::LoggedOut)
    }

    /// The server asked for a fresh connection (e.g. right after pairing).
    pub fn is_restart_required(&self) -> bool {
        matches!(self, Self::RestartRequired)
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ConnectionClosed => "connection closed",
            Self::ConnectionLost => "connection lost",
            Self::ConnectionReplaced => "connection replaced",
            Self::LoggedOut => "logged out",
            Self::BadSession => "bad session",
            Self::RestartRequired => "restart required",
            Self::MultideviceMismatch => "multi-device mismatch",
            Self::Forbidden => "forbidden",
            Self::UnavailableService => "service unavailable",
            Self::Unknown(_) => "unknown",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertType {
    /// New messages to notify the user about.
    #[default]
    Notify,
    /// Messages appended from history or sent from another device.
    Append,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesUpsert {
    pub messages: Vec<WebMessage>,
    #[serde(rename = "type", default)]
    pub kind: UpsertType,
    /// Set when the batch answers a request made from the primary device
    /// (placeholder resend or on-demand history sync).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageUpdate {
    pub key: MessageKey,
    pub update: MessageUpdateFields,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageUpdateFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_updates: Option<Vec<PollUpdate>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Error,
    Pending,
    ServerAck,
    DeliveryAck,
    Read,
    Played,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollUpdate {
    pub poll_update_message_key: MessageKey,
    pub voter: Jid,
    /// Option names chosen by this vote; an empty list retracts the vote.
    #[serde(default)]
    pub selected_options: Vec<String>,
    #[serde(default)]
    pub sender_timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptUpdate {
    pub key: MessageKey,
    pub receipt: Receipt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub user_jid: Jid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub key: MessageKey,
    pub reaction: ReactionMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Jid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_close_update_with_status_code() {
        let json = r#"{"event":"connection.update","data":{"connection":"close","lastDisconnect":{"statusCode":401,"message":"bye"}}}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        let Event::ConnectionUpdate(update) = event else {
            panic!("expected connection update");
        };
        assert_eq!(update.disconnect_reason(), Some(DisconnectReason::LoggedOut));
    }

    #[test]
    fn close_without_cause_counts_as_lost() {
        let update = ConnectionUpdate::state(ConnectionState::Close);
        assert_eq!(
            update.disconnect_reason(),
            Some(DisconnectReason::ConnectionLost)
        );
        assert_eq!(ConnectionUpdate::state(ConnectionState::Open).disconnect_reason(), None);
    }

    #[test]
    fn parses_upsert_batch() {
        let json = r#"{"event":"messages.upsert","data":{"type":"notify","requestId":"R1","messages":[
            {"key":{"remoteJid":"15551234567@s.whatsapp.net","id":"ABC","fromMe":false},
             "message":{"conversation":"hi"},"messageTimestamp":1700000000}]}}"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.name(), "messages.upsert");
        let Event::MessagesUpsert(upsert) = event else {
            panic!("expected upsert");
        };
        assert_eq!(upsert.request_id.as_deref(), Some("R1"));
        assert_eq!(upsert.messages[0].message_timestamp, 1_700_000_000);
        assert_eq!(
            upsert.messages[0].message.as_ref().unwrap().conversation.as_deref(),
            Some("hi")
        );
    }

    #[test]
    fn unknown_codes_survive_round_trip() {
        let reason = DisconnectReason::from(499);
        assert_eq!(reason, DisconnectReason::Unknown(499));
        assert_eq!(reason.code(), 499);
        assert!(!reason.is_logged_out());
        assert!(DisconnectReason::from(515).is_restart_required());
    }
}
