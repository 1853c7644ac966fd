//! Recording session doubles for exercising handlers and the supervisor
//! without a messaging library.

use crate::error::SessionError;
use crate::prompt::Prompt;
use crate::session::{MediaStream, Session, SessionConfig, SessionFactory};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;
use wabot_core::presence::ChatState;
use wabot_core::types::events::Event;
use wabot_core::types::jid::{Jid, MessageId};
use wabot_core::types::message::{MessageKey, OutgoingContent, WebMessage};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    SendMessage { jid: Jid, content: OutgoingContent },
    ReadMessages { keys: Vec<MessageKey> },
    PresenceSubscribe { jid: Jid },
    PresenceUpdate { state: ChatState, jid: Jid },
    RequestPairingCode { phone_number: String },
    PlaceholderResend { key: MessageKey },
    FetchHistory { count: u32, key: MessageKey, timestamp: i64 },
    DownloadMedia { id: MessageId },
    UpdateMedia { id: MessageId },
    Close,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call: SessionCall,
    pub at: Instant,
}

pub struct MockSession {
    calls: Mutex<Vec<RecordedCall>>,
    events_tx: Mutex<Option<mpsc::Sender<Event>>>,
    media: Mutex<Vec<u8>>,
    expire_media_downloads: AtomicUsize,
    fail_presence: AtomicBool,
    fail_sends: AtomicBool,
    counter: AtomicUsize,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            events_tx: Mutex::new(None),
            media: Mutex::new(b"RIFF-fake-webp".to_vec()),
            expire_media_downloads: AtomicUsize::new(0),
            fail_presence: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            counter: AtomicUsize::new(0),
        }
    }

    fn with_events(tx: mpsc::Sender<Event>) -> Self {
        let session = Self::new();
        *session.events_tx.lock().expect("lock poisoned") = Some(tx);
        session
    }

    /// Pushes an event to whoever holds this session's receiver.
    pub async fn emit(&self, event: Event) -> bool {
        let tx = self.events_tx.lock().expect("lock poisoned").clone();
        match tx {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    pub fn set_media(&self, data: &[u8]) {
        *self.media.lock().expect("lock poisoned") = data.to_vec();
    }

    /// The next `n` downloads fail with `MediaExpired`.
    pub fn expire_media(&self, n: usize) {
        self.expire_media_downloads.store(n, Ordering::SeqCst);
    }

    pub fn fail_presence(&self, fail: bool) {
        self.fail_presence.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.recorded().into_iter().map(|c| c.call).collect()
    }

    pub fn count(&self, pred: impl Fn(&SessionCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn sent_messages(&self) -> Vec<(Jid, OutgoingContent)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SessionCall::SendMessage { jid, content } => Some((jid, content)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: SessionCall) {
        self.calls.lock().expect("lock poisoned").push(RecordedCall {
            call,
            at: Instant::now(),
        });
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl Session for MockSession {
    fn me(&self) -> Option<Jid> {
        Some(Jid::user("10000000000"))
    }

    async fn send_message(
        &self,
        jid: &Jid,
        content: OutgoingContent,
    ) -> Result<MessageId, SessionError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(SessionError::NotConnected);
        }
        self.record(SessionCall::SendMessage {
            jid: jid.clone(),
            content,
        });
        Ok(self.next_id("MOCK"))
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), SessionError> {
        self.record(SessionCall::ReadMessages {
            keys: keys.to_vec(),
        });
        Ok(())
    }

    async fn presence_subscribe(&self, jid: &Jid) -> Result<(), SessionError> {
        if self.fail_presence.load(Ordering::SeqCst) {
            return Err(SessionError::NotConnected);
        }
        self.record(SessionCall::PresenceSubscribe { jid: jid.clone() });
        Ok(())
    }

    async fn send_presence_update(&self, state: ChatState, jid: &Jid) -> Result<(), SessionError> {
        if self.fail_presence.load(Ordering::SeqCst) {
            return Err(SessionError::NotConnected);
        }
        self.record(SessionCall::PresenceUpdate {
            state,
            jid: jid.clone(),
        });
        Ok(())
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, SessionError> {
        self.record(SessionCall::RequestPairingCode {
            phone_number: phone_number.to_string(),
        });
        Ok("ABCD1234".to_string())
    }

    async fn request_placeholder_resend(
        &self,
        key: &MessageKey,
    ) -> Result<Option<String>, SessionError> {
        self.record(SessionCall::PlaceholderResend { key: key.clone() });
        Ok(Some(self.next_id("PLACEHOLDER")))
    }

    async fn fetch_message_history(
        &self,
        count: u32,
        oldest_key: &MessageKey,
        oldest_timestamp: i64,
    ) -> Result<String, SessionError> {
        self.record(SessionCall::FetchHistory {
            count,
            key: oldest_key.clone(),
            timestamp: oldest_timestamp,
        });
        Ok(self.next_id("HIST"))
    }

    async fn download_media(&self, message: &WebMessage) -> Result<MediaStream, SessionError> {
        self.record(SessionCall::DownloadMedia {
            id: message.key.id.clone(),
        });
        let expired = self
            .expire_media_downloads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if expired {
            return Err(SessionError::MediaExpired);
        }
        let data = self.media.lock().expect("lock poisoned").clone();
        let chunks: Vec<Result<Bytes, SessionError>> = data
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(futures_util::stream::iter(chunks).boxed())
    }

    async fn update_media_message(&self, message: &WebMessage) -> Result<WebMessage, SessionError> {
        self.record(SessionCall::UpdateMedia {
            id: message.key.id.clone(),
        });
        Ok(message.clone())
    }

    async fn close(&self) {
        self.record(SessionCall::Close);
        self.events_tx.lock().expect("lock poisoned").take();
    }
}

/// Hands out one scripted session per `connect`; runs out into connect errors.
#[derive(Default)]
pub struct MockSessionFactory {
    scripts: Mutex<VecDeque<Option<Vec<Event>>>>,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    configs: Mutex<Vec<SessionConfig>>,
    connects: AtomicUsize,
}

impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next connect succeeds and delivers these events, in order.
    pub fn script(self, events: Vec<Event>) -> Self {
        self.scripts
            .lock()
            .expect("lock poisoned")
            .push_back(Some(events));
        self
    }

    /// Next connect fails.
    pub fn fail(self) -> Self {
        self.scripts.lock().expect("lock poisoned").push_back(None);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().expect("lock poisoned").clone()
    }

    pub fn configs(&self) -> Vec<SessionConfig> {
        self.configs.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn connect(
        &self,
        config: SessionConfig,
    ) -> Result<(Arc<dyn Session>, mpsc::Receiver<Event>), SessionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.configs.lock().expect("lock poisoned").push(config);

        let script = self.scripts.lock().expect("lock poisoned").pop_front();
        let Some(Some(events)) = script else {
            return Err(SessionError::NotConnected);
        };

        let (tx, rx) = mpsc::channel(events.len() + 16);
        for event in events {
            tx.try_send(event)
                .map_err(|e| SessionError::Other(anyhow::anyhow!("script overflow: {e}")))?;
        }
        let session = Arc::new(MockSession::with_events(tx));
        self.sessions
            .lock()
            .expect("lock poisoned")
            .push(session.clone());
        Ok((session, rx))
    }
}

/// Answers every question with the same line.
pub struct FixedPrompt {
    answer: String,
    asked: AtomicUsize,
}

impl FixedPrompt {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            asked: AtomicUsize::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prompt for FixedPrompt {
    async fn ask(&self, _question: &str) -> anyhow::Result<String> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}
