//! Decides what to do with one inbound message.
//!
//! The decision is pure: it looks only at the message, the request id of the
//! batch it arrived in, and the configuration. Executing the actions against a
//! live session is the caller's job.

use crate::proto_helpers::MessageExt;
use crate::types::jid::{Jid, MessageId};
use crate::types::message::{MessageKey, WebMessage};

pub const PLACEHOLDER_RESEND_KEYWORD: &str = "requestPlaceholder";
pub const ON_DEMAND_HISTORY_KEYWORD: &str = "onDemandHistSync";
pub const DEFAULT_GREETING: &str = "Hello there!";
pub const DEFAULT_HISTORY_COUNT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyConfig {
    pub auto_reply: bool,
    pub greeting: String,
    pub placeholder_keyword: String,
    pub history_keyword: String,
    pub history_count: u32,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            auto_reply: false,
            greeting: DEFAULT_GREETING.to_string(),
            placeholder_keyword: PLACEHOLDER_RESEND_KEYWORD.to_string(),
            history_keyword: ON_DEMAND_HISTORY_KEYWORD.to_string(),
            history_count: DEFAULT_HISTORY_COUNT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyAction {
    /// Ask the primary device to redeliver a message that failed to decrypt.
    RequestPlaceholderResend { key: MessageKey },
    /// The batch answers an earlier request made from the primary device.
    LogPhoneResponse { request_id: String, message_id: MessageId },
    /// Fetch older messages of the chat, anchored at this message.
    FetchHistory {
        count: u32,
        key: MessageKey,
        anchor_timestamp: i64,
    },
    /// Mark the message read, then greet the chat.
    ReadAndGreet {
        key: MessageKey,
        chat: Jid,
        text: String,
    },
}

/// Runs the decision table. Rows are independent, so one message can yield
/// several actions; they come back in table order.
pub fn decide(msg: &WebMessage, request_id: Option<&str>, config: &ReplyConfig) -> Vec<ReplyAction> {
    let mut actions = Vec::new();
    let text = msg.message.as_ref().and_then(|m| m.text_content());

    if text == Some(config.placeholder_keyword.as_str()) && request_id.is_none() {
        actions.push(ReplyAction::RequestPlaceholderResend {
            key: msg.key.clone(),
        });
    } else if let Some(request_id) = request_id {
        actions.push(ReplyAction::LogPhoneResponse {
            request_id: request_id.to_string(),
            message_id: msg.key.id.clone(),
        });
    }

    if text == Some(config.history_keyword.as_str()) {
        actions.push(ReplyAction::FetchHistory {
            count: config.history_count,
            key: msg.key.clone(),
            anchor_timestamp: msg.message_timestamp,
        });
    }

    if should_auto_reply(msg, config) {
        actions.push(ReplyAction::ReadAndGreet {
            key: msg.key.clone(),
            chat: msg.key.remote_jid.clone(),
            text: config.greeting.clone(),
        });
    }

    actions
}

fn should_auto_reply(msg: &WebMessage, config: &ReplyConfig) -> bool {
    config.auto_reply && !msg.key.from_me && !msg.key.remote_jid.is_broadcast_channel()
}
