//! In-memory snapshot of chats, contacts and messages seen by this client.
//!
//! The whole snapshot is written to one JSON file; reloading replaces the
//! in-memory state wholesale. Flushes are not coordinated with concurrent
//! updates.

use crate::session::MessageLookup;
use crate::store::error::{Result, StoreError};
use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use wabot_core::types::events::{Contact, MessageUpdate, MessagesUpsert, UpsertType};
use wabot_core::types::jid::Jid;
use wabot_core::types::message::{Message, MessageKey, WebMessage};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: Jid,
    #[serde(default)]
    pub conversation_timestamp: i64,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    chats: BTreeMap<String, Chat>,
    #[serde(default)]
    contacts: BTreeMap<String, Contact>,
    /// Per chat, in arrival order.
    #[serde(default)]
    messages: BTreeMap<String, Vec<WebMessage>>,
}

#[derive(Debug, Default)]
pub struct MessageCache {
    inner: RwLock<Snapshot>,
    shutdown: Notify,
}

impl MessageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a message, replacing any earlier copy with the same key.
    pub async fn insert(&self, msg: WebMessage, kind: UpsertType) {
        let chat_key = msg.key.remote_jid.to_string();
        let mut snapshot = self.inner.write().await;

        let chat = snapshot
            .chats
            .entry(chat_key.clone())
            .or_insert_with(|| Chat {
                id: msg.key.remote_jid.clone(),
                conversation_timestamp: 0,
                unread_count: 0,
                name: None,
            });
        chat.conversation_timestamp = chat.conversation_timestamp.max(msg.message_timestamp);
        if kind == UpsertType::Notify && !msg.key.from_me {
            chat.unread_count += 1;
        }
        if chat.name.is_none() && !msg.key.from_me {
            chat.name = msg.push_name.clone();
        }

        let messages = snapshot.messages.entry(chat_key).or_default();
        match messages.iter_mut().find(|m| m.key.id == msg.key.id) {
            Some(existing) => *existing = msg,
            None => messages.push(msg),
        }
    }

    pub async fn upsert(&self, upsert: &MessagesUpsert) {
        for msg in &upsert.messages {
            self.insert(msg.clone(), upsert.kind).await;
        }
    }

    /// Applies a content edit; returns false when the message is unknown.
    pub async fn apply_update(&self, update: &MessageUpdate) -> bool {
        let mut snapshot = self.inner.write().await;
        let Some(existing) = snapshot
            .messages
            .get_mut(&update.key.remote_jid.to_string())
            .and_then(|msgs| msgs.iter_mut().find(|m| m.key.id == update.key.id))
        else {
            return false;
        };
        if let Some(message) = &update.update.message {
            existing.message = Some(message.clone());
        }
        true
    }

    pub async fn upsert_contacts(&self, contacts: &[Contact]) {
        let mut snapshot = self.inner.write().await;
        for contact in contacts {
            snapshot
                .contacts
                .insert(contact.id.to_string(), contact.clone());
        }
    }

    pub async fn mark_chat_read(&self, chat: &Jid) {
        if let Some(chat) = self.inner.write().await.chats.get_mut(&chat.to_string()) {
            chat.unread_count = 0;
        }
    }

    pub async fn load_message(&self, chat: &Jid, id: &str) -> Option<WebMessage> {
        self.inner
            .read()
            .await
            .messages
            .get(&chat.to_string())
            .and_then(|msgs| msgs.iter().find(|m| m.key.id == id).cloned())
    }

    pub async fn messages(&self, chat: &Jid) -> Vec<WebMessage> {
        self.inner
            .read()
            .await
            .messages
            .get(&chat.to_string())
            .cloned()
            .unwrap_or_default()
    }

    pub async fn chats(&self) -> Vec<Chat> {
        self.inner.read().await.chats.values().cloned().collect()
    }

    pub async fn contact(&self, id: &Jid) -> Option<Contact> {
        self.inner.read().await.contacts.get(&id.to_string()).cloned()
    }

    pub async fn message_count(&self) -> usize {
        self.inner.read().await.messages.values().map(Vec::len).sum()
    }

    /// Replaces the in-memory state with the file's content. A missing file
    /// leaves the cache untouched.
    pub async fn read_from_file(&self, path: &Path) -> Result<()> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No cache snapshot at {}", path.display());
                return Ok(());
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        info!(
            "Loaded cache snapshot from {} ({} chats)",
            path.display(),
            snapshot.chats.len()
        );
        *self.inner.write().await = snapshot;
        Ok(())
    }

    /// Rewrites the whole snapshot file (temp file + rename).
    pub async fn write_to_file(&self, path: &Path) -> Result<()> {
        let data = {
            let snapshot = self.inner.read().await;
            serde_json::to_vec(&*snapshot)?
        };
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Flushes to `path` every `interval` until [`stop_background_saver`]
    /// is called, then flushes one last time.
    ///
    /// [`stop_background_saver`]: MessageCache::stop_background_saver
    pub fn run_background_saver(self: Arc<Self>, path: PathBuf, interval: Duration) -> JoinHandle<()> {
        debug!("Background saver task started with interval {interval:?}");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                let stopping = tokio::select! {
                    _ = self.shutdown.notified() => true,
                    _ = ticker.tick() => false,
                };

                if let Err(e) = self.write_to_file(&path).await {
                    error!("Error saving cache snapshot in background: {e}");
                }
                if stopping {
                    debug!("Background saver stopped.");
                    break;
                }
            }
        })
    }

    pub fn stop_background_saver(&self) {
        self.shutdown.notify_one();
    }
}

#[async_trait]
impl MessageLookup for MessageCache {
    async fn get_message(&self, key: &MessageKey) -> Option<Message> {
        self.load_message(&key.remote_jid, &key.id)
            .await
            .and_then(|m| m.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(chat: &str, id: &str, body: &str, from_me: bool, ts: i64) -> WebMessage {
        WebMessage::new(
            MessageKey::new(chat.parse().unwrap(), id, from_me),
            Message {
                conversation: Some(body.into()),
                ..Default::default()
            },
            ts,
        )
    }

    #[tokio::test]
    async fn reinsert_overwrites_instead_of_duplicating() {
        let cache = MessageCache::new();
        let chat = "15551234567@s.whatsapp.net";
        cache.insert(text(chat, "A", "first", false, 1), UpsertType::Notify).await;
        cache.insert(text(chat, "A", "second", false, 2), UpsertType::Append).await;

        let jid: Jid = chat.parse().unwrap();
        assert_eq!(cache.messages(&jid).await.len(), 1);
        let loaded = cache.load_message(&jid, "A").await.unwrap();
        assert_eq!(loaded.message.unwrap().conversation.as_deref(), Some("second"));

        let chats = cache.chats().await;
        assert_eq!(chats[0].conversation_timestamp, 2);
        assert_eq!(chats[0].unread_count, 1);
    }

    #[tokio::test]
    async fn snapshot_round_trip_answers_same_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let cache = MessageCache::new();
        let keys = [
            ("15551234567@s.whatsapp.net", "A"),
            ("15551234567@s.whatsapp.net", "B"),
            ("120363021033254949@g.us", "C"),
        ];
        for (i, (chat, id)) in keys.iter().enumerate() {
            cache
                .insert(text(chat, id, &format!("body {i}"), i % 2 == 0, i as i64), UpsertType::Notify)
                .await;
        }
        cache.write_to_file(&path).await.unwrap();

        let reloaded = MessageCache::new();
        reloaded.read_from_file(&path).await.unwrap();
        for (chat, id) in keys {
            let jid: Jid = chat.parse().unwrap();
            assert_eq!(
                cache.load_message(&jid, id).await,
                reloaded.load_message(&jid, id).await
            );
        }
        assert_eq!(reloaded.message_count().await, 3);
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[tokio::test]
    async fn contacts_are_replaced_by_id() {
        let cache = MessageCache::new();
        let id = Jid::user("15551234567");
        let contact = |name: &str| Contact {
            id: id.clone(),
            name: Some(name.into()),
            notify: None,
        };
        cache.upsert_contacts(&[contact("Ana")]).await;
        cache.upsert_contacts(&[contact("Ana B.")]).await;

        assert_eq!(cache.contact(&id).await, Some(contact("Ana B.")));
        assert_eq!(cache.contact(&Jid::user("15550000000")).await, None);
    }

    #[tokio::test]
    async fn missing_snapshot_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MessageCache::new();
        cache.read_from_file(&dir.path().join("absent.json")).await.unwrap();
        assert!(cache.chats().await.is_empty());
    }

    #[tokio::test]
    async fn update_replaces_content_of_known_messages_only() {
        let cache = MessageCache::new();
        let chat = "15551234567@s.whatsapp.net";
        cache.insert(text(chat, "A", "before", true, 1), UpsertType::Notify).await;

        let edit = |id: &str| MessageUpdate {
            key: MessageKey::new(chat.parse().unwrap(), id, true),
            update: wabot_core::types::events::MessageUpdateFields {
                message: Some(Message {
                    conversation: Some("after".into()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };
        assert!(cache.apply_update(&edit("A")).await);
        assert!(!cache.apply_update(&edit("Z")).await);

        let key = MessageKey::new(chat.parse().unwrap(), "A", true);
        let content = cache.get_message(&key).await.unwrap();
        assert_eq!(content.conversation.as_deref(), Some("after"));
    }

    #[tokio::test]
    async fn background_saver_flushes_on_timer_and_on_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let cache = Arc::new(MessageCache::new());

        let handle = cache
            .clone()
            .run_background_saver(path.clone(), Duration::from_millis(20));
        cache
            .insert(text("1@s.whatsapp.net", "A", "x", false, 1), UpsertType::Notify)
            .await;
        for _ in 0..200 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists(), "timer flush never happened");

        cache
            .insert(text("1@s.whatsapp.net", "B", "y", false, 2), UpsertType::Notify)
            .await;
        cache.stop_background_saver();
        handle.await.unwrap();

        let reloaded = MessageCache::new();
        reloaded.read_from_file(&path).await.unwrap();
        assert_eq!(reloaded.message_count().await, 2);
    }
}
