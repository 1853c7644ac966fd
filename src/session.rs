//! The seam between this client and the messaging library.
//!
//! A [`SessionFactory`] opens connections; each connection is an
//! `Arc<dyn Session>` plus its own event receiver. Dropping the receiver
//! tears down every subscription of that connection, so a restarted session
//! never shares handlers with the one it replaces.

use crate::error::SessionError;
use crate::retry::MsgRetryCounterCache;
use crate::store::SignalKeyStore;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use wabot_core::creds::Credentials;
use wabot_core::presence::ChatState;
use wabot_core::types::events::Event;
use wabot_core::types::jid::{Jid, MessageId};
use wabot_core::types::message::{Message, MessageKey, OutgoingContent, WebMessage};
use wabot_core::version::{ProtocolVersion, VersionInfo};

pub type MediaStream = BoxStream<'static, Result<Bytes, SessionError>>;

/// An active connection to the messaging network.
#[async_trait]
pub trait Session: Send + Sync {
    /// Own account, once paired.
    fn me(&self) -> Option<Jid>;

    async fn send_message(
        &self,
        jid: &Jid,
        content: OutgoingContent,
    ) -> Result<MessageId, SessionError>;

    /// Sends read receipts for the given messages.
    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), SessionError>;

    async fn presence_subscribe(&self, jid: &Jid) -> Result<(), SessionError>;

    async fn send_presence_update(&self, state: ChatState, jid: &Jid) -> Result<(), SessionError>;

    /// Starts phone-number linking; returns the code to type on the phone.
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, SessionError>;

    /// Asks the primary device to resend a message that failed to decrypt.
    /// Returns the request id, or `None` when the request was suppressed.
    async fn request_placeholder_resend(
        &self,
        key: &MessageKey,
    ) -> Result<Option<String>, SessionError>;

    /// Requests `count` messages older than the anchor; returns the request id.
    async fn fetch_message_history(
        &self,
        count: u32,
        oldest_key: &MessageKey,
        oldest_timestamp: i64,
    ) -> Result<String, SessionError>;

    async fn download_media(&self, message: &WebMessage) -> Result<MediaStream, SessionError>;

    /// Asks the sender to re-upload expired media; returns the refreshed message.
    async fn update_media_message(&self, message: &WebMessage) -> Result<WebMessage, SessionError>;

    async fn close(&self);
}

/// Looks up previously seen messages, for retries and poll decryption.
#[async_trait]
pub trait MessageLookup: Send + Sync {
    async fn get_message(&self, key: &MessageKey) -> Option<Message>;
}

/// Lookup used when no cache is kept: every message resolves to empty content.
pub struct EmptyMessageLookup;

#[async_trait]
impl MessageLookup for EmptyMessageLookup {
    async fn get_message(&self, _key: &MessageKey) -> Option<Message> {
        Some(Message::default())
    }
}

/// Everything a factory needs to open one session.
#[derive(Clone)]
pub struct SessionConfig {
    pub version: ProtocolVersion,
    pub credentials: Credentials,
    pub keys: Arc<dyn SignalKeyStore>,
    pub retry_counts: MsgRetryCounterCache,
    pub message_lookup: Arc<dyn MessageLookup>,
    /// Link with a phone-number code instead of a QR code.
    pub use_pairing_code: bool,
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn connect(
        &self,
        config: SessionConfig,
    ) -> Result<(Arc<dyn Session>, mpsc::Receiver<Event>), SessionError>;

    async fn latest_version(&self) -> Result<VersionInfo, SessionError> {
        Err(SessionError::Other(anyhow::anyhow!(
            "version lookup not supported"
        )))
    }
}

/// The one place the live session handle is kept. Replaced wholesale on
/// reconnect; readers always get the current handle or none.
#[derive(Clone, Default)]
pub struct SessionCell {
    inner: Arc<RwLock<Option<Arc<dyn Session>>>>,
}

impl SessionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> Option<Arc<dyn Session>> {
        self.inner.read().await.clone()
    }

    /// Installs a new session and hands back the previous one.
    pub async fn replace(&self, session: Arc<dyn Session>) -> Option<Arc<dyn Session>> {
        self.inner.write().await.replace(session)
    }

    pub async fn clear(&self) -> Option<Arc<dyn Session>> {
        self.inner.write().await.take()
    }
}
