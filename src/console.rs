//! A line-oriented stand-in for the messaging library.
//!
//! Inbound events are read from stdin, one JSON object per line, in the form
//! `{"event":"messages.upsert","data":{...}}`. Every outbound call is written
//! to stdout as a JSON record. Good enough to drive the whole client by hand
//! or from a script.

use crate::error::SessionError;
use crate::prompt::Prompt;
use crate::retry::MsgRetryCounterCache;
use crate::session::{MediaStream, Session, SessionConfig, SessionFactory};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::io;
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use wabot_core::creds::CredsUpdate;
use wabot_core::presence::ChatState;
use wabot_core::proto_helpers::MessageExt;
use wabot_core::request::{generate_message_id, generate_pairing_code};
use wabot_core::types::events::{ConnectionUpdate, Event};
use wabot_core::types::jid::{Jid, MessageId};
use wabot_core::types::message::{MessageKey, OutgoingContent, WebMessage};
use wabot_core::version::{DEFAULT_VERSION, VersionInfo};

const EVENT_BUFFER: usize = 64;
const MEDIA_CHUNK_SIZE: usize = 64 * 1024;

type BoxedLines = Lines<Box<dyn AsyncBufRead + Unpin + Send>>;
type Output = Arc<Mutex<Box<dyn AsyncWrite + Unpin + Send>>>;

/// Shared line source: the phone-number prompt and the event reader both
/// read from it, never at the same time.
pub struct ConsoleInput {
    lines: Mutex<BoxedLines>,
}

impl ConsoleInput {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }

    pub fn new(reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        let boxed: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        Self {
            lines: Mutex::new(boxed.lines()),
        }
    }

    /// Cancel safe: a partially read line stays buffered.
    pub async fn next_line(&self) -> io::Result<Option<String>> {
        self.lines.lock().await.next_line().await
    }
}

#[async_trait]
impl Prompt for ConsoleInput {
    async fn ask(&self, question: &str) -> anyhow::Result<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(question.as_bytes()).await?;
        stdout.flush().await?;
        self.next_line()
            .await?
            .ok_or_else(|| anyhow::anyhow!("input closed before an answer was given"))
    }
}

/// One outbound call, as printed.
#[derive(Debug, Serialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum OutboundRecord {
    #[serde(rename_all = "camelCase")]
    SendMessage {
        jid: Jid,
        id: MessageId,
        content: OutgoingContent,
    },
    ReadMessages {
        keys: Vec<MessageKey>,
    },
    PresenceSubscribe {
        jid: Jid,
    },
    PresenceUpdate {
        jid: Jid,
        state: ChatState,
    },
    #[serde(rename_all = "camelCase")]
    PairingCode {
        phone_number: String,
        code: String,
    },
    #[serde(rename_all = "camelCase")]
    PlaceholderResend {
        key: MessageKey,
        request_id: String,
        attempt: u8,
    },
    #[serde(rename_all = "camelCase")]
    FetchHistory {
        count: u32,
        key: MessageKey,
        timestamp: i64,
        request_id: String,
    },
    UpdateMedia {
        key: MessageKey,
    },
    Close,
}

pub struct ConsoleSessionFactory {
    input: Arc<ConsoleInput>,
    output: Output,
}

impl ConsoleSessionFactory {
    /// Reads events from `input`, prints outbound calls to stdout.
    pub fn new(input: Arc<ConsoleInput>) -> Self {
        Self::with_output(input, tokio::io::stdout())
    }

    pub fn with_output(input: Arc<ConsoleInput>, output: impl AsyncWrite + Unpin + Send + 'static) -> Self {
        Self {
            input,
            output: Arc::new(Mutex::new(Box::new(output))),
        }
    }
}

#[async_trait]
impl SessionFactory for ConsoleSessionFactory {
    async fn connect(
        &self,
        config: SessionConfig,
    ) -> Result<(Arc<dyn Session>, mpsc::Receiver<Event>), SessionError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let registered = config.credentials.registered;
        info!(
            "Starting console session (v{}, registered: {registered})",
            config.version
        );

        let session = Arc::new(ConsoleSession {
            me: StdRwLock::new(config.credentials.me_jid().cloned()),
            retry_counts: config.retry_counts,
            input: self.input.clone(),
            output: self.output.clone(),
            events: tx.clone(),
            reader: std::sync::Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        send(&tx, Event::connecting()).await?;
        if !registered && config.use_pairing_code {
            debug!("Waiting for a pairing code request before going online");
        } else {
            if !registered {
                send(
                    &tx,
                    Event::ConnectionUpdate(ConnectionUpdate {
                        qr: Some(format!("2@{}", generate_message_id(None))),
                        ..Default::default()
                    }),
                )
                .await?;
                send(
                    &tx,
                    Event::CredsUpdate(CredsUpdate::default().set("registered", true)),
                )
                .await?;
            }
            session.go_online().await?;
        }

        Ok((session, rx))
    }

    async fn latest_version(&self) -> Result<VersionInfo, SessionError> {
        Ok(VersionInfo {
            version: DEFAULT_VERSION,
            is_latest: true,
        })
    }
}

async fn send(tx: &mpsc::Sender<Event>, event: Event) -> Result<(), SessionError> {
    tx.send(event).await.map_err(|_| SessionError::Closed)
}

pub struct ConsoleSession {
    me: StdRwLock<Option<Jid>>,
    retry_counts: MsgRetryCounterCache,
    input: Arc<ConsoleInput>,
    output: Output,
    events: mpsc::Sender<Event>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ConsoleSession {
    /// Announces `open` and starts forwarding input lines as events.
    async fn go_online(&self) -> Result<(), SessionError> {
        send(&self.events, Event::open()).await?;
        let handle = tokio::spawn(read_events(self.input.clone(), self.events.clone()));
        if let Ok(mut reader) = self.reader.lock()
            && let Some(previous) = reader.replace(handle)
        {
            previous.abort();
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn own_jid(&self) -> Option<Jid> {
        self.me.read().ok().and_then(|me| me.clone())
    }

    async fn print(&self, record: OutboundRecord) -> Result<(), SessionError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut out = self.output.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}

async fn read_events(input: Arc<ConsoleInput>, tx: mpsc::Sender<Event>) {
    loop {
        let line = tokio::select! {
            _ = tx.closed() => break,
            line = input.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Event>(line) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Skipping malformed event line: {e}"),
                }
            }
            Ok(None) => {
                info!("Input closed, no further events");
                tx.closed().await;
                break;
            }
            Err(e) => {
                error!("Failed to read input: {e}");
                tx.closed().await;
                break;
            }
        }
    }
    debug!("Console reader stopped");
}

#[async_trait]
impl Session for ConsoleSession {
    fn me(&self) -> Option<Jid> {
        self.own_jid()
    }

    async fn send_message(
        &self,
        jid: &Jid,
        content: OutgoingContent,
    ) -> Result<MessageId, SessionError> {
        self.ensure_open()?;
        let id = generate_message_id(self.own_jid().as_ref());
        self.print(OutboundRecord::SendMessage {
            jid: jid.clone(),
            id: id.clone(),
            content,
        })
        .await?;
        Ok(id)
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.print(OutboundRecord::ReadMessages {
            keys: keys.to_vec(),
        })
        .await
    }

    async fn presence_subscribe(&self, jid: &Jid) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.print(OutboundRecord::PresenceSubscribe { jid: jid.clone() })
            .await
    }

    async fn send_presence_update(&self, state: ChatState, jid: &Jid) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.print(OutboundRecord::PresenceUpdate {
            jid: jid.clone(),
            state,
        })
        .await
    }

    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, SessionError> {
        self.ensure_open()?;
        let digits: String = phone_number.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(SessionError::Other(anyhow::anyhow!(
                "invalid phone number: {phone_number:?}"
            )));
        }

        let code = generate_pairing_code();
        self.print(OutboundRecord::PairingCode {
            phone_number: digits.clone(),
            code: code.clone(),
        })
        .await?;

        let me = Jid::user(&digits);
        if let Ok(mut slot) = self.me.write() {
            *slot = Some(me.clone());
        }
        let update = CredsUpdate::default()
            .set("registered", true)
            .set("me", serde_json::json!({ "id": me.to_string() }));
        send(&self.events, Event::CredsUpdate(update)).await?;
        self.go_online().await?;
        Ok(code)
    }

    async fn request_placeholder_resend(
        &self,
        key: &MessageKey,
    ) -> Result<Option<String>, SessionError> {
        self.ensure_open()?;
        let Some(attempt) = self.retry_counts.increment(&key.id).await else {
            warn!("Not requesting resend of {}: retry limit reached", key.id);
            return Ok(None);
        };
        let request_id = generate_message_id(self.own_jid().as_ref());
        self.print(OutboundRecord::PlaceholderResend {
            key: key.clone(),
            request_id: request_id.clone(),
            attempt,
        })
        .await?;
        Ok(Some(request_id))
    }

    async fn fetch_message_history(
        &self,
        count: u32,
        oldest_key: &MessageKey,
        oldest_timestamp: i64,
    ) -> Result<String, SessionError> {
        self.ensure_open()?;
        let request_id = generate_message_id(self.own_jid().as_ref());
        self.print(OutboundRecord::FetchHistory {
            count,
            key: oldest_key.clone(),
            timestamp: oldest_timestamp,
            request_id: request_id.clone(),
        })
        .await?;
        Ok(request_id)
    }

    /// The image `url` is read as a local file path.
    async fn download_media(&self, message: &WebMessage) -> Result<MediaStream, SessionError> {
        self.ensure_open()?;
        let path = message
            .message
            .as_ref()
            .and_then(|m| m.get_image())
            .and_then(|image| image.url.clone())
            .ok_or(SessionError::NoMedia)?;

        let data = match tokio::fs::read(&path).await {
            Ok(data) => Bytes::from(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(SessionError::MediaExpired),
            Err(e) => return Err(e.into()),
        };
        debug!("Read {} bytes of media from {path}", data.len());

        let chunks: Vec<Result<Bytes, SessionError>> = (0..data.len())
            .step_by(MEDIA_CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + MEDIA_CHUNK_SIZE).min(data.len()))))
            .collect();
        Ok(futures_util::stream::iter(chunks).boxed())
    }

    async fn update_media_message(&self, message: &WebMessage) -> Result<WebMessage, SessionError> {
        self.ensure_open()?;
        self.print(OutboundRecord::UpdateMedia {
            key: message.key.clone(),
        })
        .await?;
        Ok(message.clone())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut reader) = self.reader.lock()
            && let Some(handle) = reader.take()
        {
            handle.abort();
        }
        if let Err(e) = self.print(OutboundRecord::Close).await {
            warn!("Failed to record close: {e}");
        }
    }
}
