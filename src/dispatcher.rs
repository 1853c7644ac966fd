//! Routes session events to the cache, the reply policy and the media handler.

use crate::media::MediaHandler;
use crate::session::Session;
use crate::state::ProcessState;
use crate::store::{MessageCache, MultiFileAuthState};
use crate::typing::TypingSimulator;
use anyhow::Context;
use log::{debug, error, info, warn};
use std::sync::Arc;
use wabot_core::poll::{PollTally, aggregate_votes};
use wabot_core::proto_helpers::MessageExt;
use wabot_core::reply::{self, ReplyAction, ReplyConfig};
use wabot_core::types::events::{Event, MessageUpdate, MessagesUpsert};
use wabot_core::types::message::{MessageKey, OutgoingContent, WebMessage};

/// A message whose handling failed; its siblings were still processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageFailure {
    pub key: MessageKey,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub failures: Vec<MessageFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct EventDispatcher {
    reply: ReplyConfig,
    typing: Option<TypingSimulator>,
    media: MediaHandler,
    cache: Option<Arc<MessageCache>>,
    auth: Option<Arc<MultiFileAuthState>>,
    state: ProcessState,
    echo: bool,
}

impl EventDispatcher {
    pub fn new(state: ProcessState) -> Self {
        Self {
            reply: ReplyConfig::default(),
            typing: Some(TypingSimulator::default()),
            media: MediaHandler::default(),
            cache: None,
            auth: None,
            state,
            echo: true,
        }
    }

    pub fn with_reply_config(mut self, reply: ReplyConfig) -> Self {
        self.reply = reply;
        self
    }

    /// `None` sends replies straight away.
    pub fn with_typing(mut self, typing: Option<TypingSimulator>) -> Self {
        self.typing = typing;
        self
    }

    pub fn with_cache(mut self, cache: Arc<MessageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_auth_state(mut self, auth: Arc<MultiFileAuthState>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Whether events are echoed to stdout.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Handles one event against the session that emitted it. Returns a
    /// report for message batches, `None` for every other event.
    pub async fn dispatch(&self, session: &Arc<dyn Session>, event: &Event) -> Option<BatchReport> {
        if self.echo {
            echo(event);
        }

        match event {
            Event::MessagesUpsert(upsert) => Some(self.handle_upsert(session.as_ref(), upsert).await),
            Event::MessagesUpdate(updates) => {
                self.handle_updates(updates).await;
                None
            }
            Event::MessageReceiptUpdate(receipts) => {
                for r in receipts {
                    debug!(target: "Receipt", "{} on {}: {:?}", r.receipt.user_jid, r.key.id, r.receipt);
                }
                None
            }
            Event::MessagesReaction(reactions) => {
                for r in reactions {
                    info!(
                        target: "Reaction",
                        "Reaction {:?} on {}",
                        r.reaction.text, r.key.id
                    );
                }
                None
            }
            Event::CredsUpdate(update) => {
                if let Some(auth) = &self.auth
                    && let Err(e) = auth.apply_update(update).await
                {
                    error!("Failed to persist credentials: {e}");
                }
                None
            }
            Event::ContactsUpsert(contacts) => {
                if let Some(cache) = &self.cache {
                    cache.upsert_contacts(contacts).await;
                }
                None
            }
            Event::ConnectionUpdate(update) => {
                debug!("connection update {update:?}");
                None
            }
        }
    }

    async fn handle_upsert(&self, session: &dyn Session, upsert: &MessagesUpsert) -> BatchReport {
        if let Some(cache) = &self.cache {
            cache.upsert(upsert).await;
        }

        let request_id = upsert.request_id.as_deref();
        if let Some(request_id) = request_id {
            match self.state.on_demand.complete(request_id) {
                Some(chat) => info!("On-demand history for {chat} arrived (request {request_id})"),
                None => debug!("Batch answers request {request_id}"),
            }
        }

        let mut report = BatchReport::default();
        for msg in &upsert.messages {
            if msg.message.is_none() {
                report.skipped += 1;
                continue;
            }
            match self.handle_message(session, msg, request_id).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!("Failed to handle message {}: {e:#}", msg.key.id);
                    report.failures.push(MessageFailure {
                        key: msg.key.clone(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }
        report
    }

    async fn handle_message(
        &self,
        session: &dyn Session,
        msg: &WebMessage,
        request_id: Option<&str>,
    ) -> anyhow::Result<()> {
        for action in reply::decide(msg, request_id, &self.reply) {
            self.execute(session, msg, action).await?;
        }

        if let Some(id) = self
            .media
            .handle(session, msg)
            .await
            .context("sticker reply failed")?
        {
            info!(target: "Media", "Sent sticker {id} to {}", msg.key.remote_jid);
        }
        Ok(())
    }

    async fn execute(
        &self,
        session: &dyn Session,
        msg: &WebMessage,
        action: ReplyAction,
    ) -> anyhow::Result<()> {
        match action {
            ReplyAction::RequestPlaceholderResend { key } => {
                let id = session
                    .request_placeholder_resend(&key)
                    .await
                    .context("placeholder resend failed")?;
                match id {
                    Some(id) => info!("requested placeholder resync, id={id}"),
                    None => warn!("Placeholder resend for {} suppressed", key.id),
                }
            }
            ReplyAction::LogPhoneResponse {
                request_id,
                message_id,
            } => {
                info!("Message received from phone, id={request_id} (message {message_id})");
            }
            ReplyAction::FetchHistory {
                count,
                key,
                anchor_timestamp,
            } => {
                let id = session
                    .fetch_message_history(count, &key, anchor_timestamp)
                    .await
                    .context("history fetch failed")?;
                self.state.on_demand.insert(id.clone(), key.remote_jid.clone());
                info!("requested on-demand sync, id={id}");
            }
            ReplyAction::ReadAndGreet { key, chat, text } => {
                info!("replying to {chat}");
                session
                    .read_messages(std::slice::from_ref(&key))
                    .await
                    .context("read receipt failed")?;
                if let Some(cache) = &self.cache {
                    cache.mark_chat_read(&chat).await;
                }
                let content = OutgoingContent::text(text);
                let sent = match &self.typing {
                    Some(typing) => typing.send_with_typing(session, &chat, content).await,
                    None => session.send_message(&chat, content).await,
                };
                sent.with_context(|| format!("greeting to {chat} failed"))?;
            }
        }
        debug!("Handled {}", msg.key.id);
        Ok(())
    }

    /// Applies edits to the cache and recounts any poll whose creation
    /// message is cached. Returns the tally per updated poll.
    pub async fn handle_updates(
        &self,
        updates: &[MessageUpdate],
    ) -> Vec<(MessageKey, Vec<PollTally>)> {
        let mut tallies = Vec::new();
        for update in updates {
            if let Some(cache) = &self.cache {
                cache.apply_update(update).await;
            }

            let Some(votes) = &update.update.poll_updates else {
                continue;
            };
            let Some(cache) = &self.cache else {
                debug!("Poll update for {} without a cache, ignoring", update.key.id);
                continue;
            };
            let poll = cache
                .load_message(&update.key.remote_jid, &update.key.id)
                .await
                .and_then(|m| m.message)
                .and_then(|m| m.get_base_message().poll_creation_message.clone());
            match poll {
                Some(poll) => {
                    let tally = aggregate_votes(&poll, votes);
                    info!(target: "Poll", "got poll update, aggregation: {tally:?}");
                    tallies.push((update.key.clone(), tally));
                }
                None => debug!("Poll creation {} not cached", update.key.id),
            }
        }
        tallies
    }
}

fn echo(event: &Event) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Could not echo {}: {e}", event.name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockSession, SessionCall};
    use wabot_core::types::events::{MessageUpdateFields, PollUpdate, UpsertType};
    use wabot_core::types::jid::Jid;
    use wabot_core::types::message::{Message, PollCreationMessage, PollOption};

    fn text(chat: &str, id: &str, body: &str, from_me: bool) -> WebMessage {
        WebMessage::new(
            MessageKey::new(chat.parse().unwrap(), id, from_me),
            Message {
                conversation: Some(body.into()),
                ..Default::default()
            },
            1_700_000_000,
        )
    }

    fn batch(messages: Vec<WebMessage>, request_id: Option<&str>) -> Event {
        Event::MessagesUpsert(MessagesUpsert {
            messages,
            kind: UpsertType::Notify,
            request_id: request_id.map(str::to_string),
        })
    }

    fn dispatcher() -> EventDispatcher {
        EventDispatcher::new(ProcessState::default())
            .with_reply_config(ReplyConfig {
                auto_reply: true,
                ..Default::default()
            })
            .with_typing(None)
            .with_echo(false)
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let mock = Arc::new(MockSession::new());
        let session: Arc<dyn Session> = mock.clone();
        mock.fail_sends(true);

        let mut empty = text("1@s.whatsapp.net", "E", "", false);
        empty.message = None;
        let event = batch(
            vec![
                text("1@s.whatsapp.net", "A", "hi", false),
                empty,
                text("2@s.whatsapp.net", "B", "hi", true),
            ],
            None,
        );

        let report = dispatcher().dispatch(&session, &event).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key.id, "A");
        assert_eq!(report.skipped, 1);
        assert_eq!(report.processed, 1);
        // The failing greeting still sent its read receipt.
        assert_eq!(
            mock.count(|c| matches!(c, SessionCall::ReadMessages { .. })),
            1
        );
    }

    #[tokio::test]
    async fn history_fetch_is_tracked_until_answered() {
        let mock = Arc::new(MockSession::new());
        let session: Arc<dyn Session> = mock.clone();
        let state = ProcessState::default();
        let dispatcher = EventDispatcher::new(state.clone()).with_echo(false);

        let msg = text("1@s.whatsapp.net", "H", "onDemandHistSync", true);
        dispatcher.dispatch(&session, &batch(vec![msg.clone()], None)).await;

        let fetches: Vec<_> = mock
            .calls()
            .into_iter()
            .filter(|c| matches!(c, SessionCall::FetchHistory { .. }))
            .collect();
        assert_eq!(
            fetches,
            vec![SessionCall::FetchHistory {
                count: 50,
                key: msg.key.clone(),
                timestamp: 1_700_000_000,
            }]
        );
        assert_eq!(state.on_demand.len(), 1);

        dispatcher
            .dispatch(&session, &batch(vec![], Some("HIST0")))
            .await;
        assert!(state.on_demand.is_empty());
    }

    #[tokio::test]
    async fn creds_update_reaches_the_auth_state() {
        let dir = tempfile::tempdir().unwrap();
        let auth = Arc::new(MultiFileAuthState::open(dir.path()).await.unwrap());
        let session: Arc<dyn Session> = Arc::new(MockSession::new());
        let dispatcher = dispatcher().with_auth_state(auth.clone());

        let update = wabot_core::creds::CredsUpdate::default().set("registered", true);
        dispatcher
            .dispatch(&session, &Event::CredsUpdate(update))
            .await;

        assert!(auth.credentials().await.registered);
        assert!(dir.path().join("creds.json").exists());
    }

    #[tokio::test]
    async fn poll_votes_are_aggregated_from_the_cache() {
        let cache = Arc::new(MessageCache::new());
        let session: Arc<dyn Session> = Arc::new(MockSession::new());
        let dispatcher = dispatcher().with_cache(cache.clone());
        let chat: Jid = "120363000000000000@g.us".parse().unwrap();

        let poll = WebMessage::new(
            MessageKey::new(chat.clone(), "POLL", true),
            Message {
                poll_creation_message: Some(PollCreationMessage {
                    name: "lunch".into(),
                    options: vec![
                        PollOption {
                            option_name: "pizza".into(),
                        },
                        PollOption {
                            option_name: "sushi".into(),
                        },
                    ],
                    selectable_options_count: 1,
                }),
                ..Default::default()
            },
            1,
        );
        dispatcher.dispatch(&session, &batch(vec![poll.clone()], None)).await;
        assert!(cache.load_message(&chat, "POLL").await.is_some());

        let voter = Jid::user("15550000001");
        let vote = |id: &str, option: &str, ts: i64| PollUpdate {
            poll_update_message_key: MessageKey::new(chat.clone(), id, false),
            voter: voter.clone(),
            selected_options: vec![option.into()],
            sender_timestamp_ms: ts,
        };
        let updates = vec![MessageUpdate {
            key: poll.key.clone(),
            update: MessageUpdateFields {
                poll_updates: Some(vec![vote("V1", "pizza", 10), vote("V2", "sushi", 20)]),
                ..Default::default()
            },
        }];

        let tallies = dispatcher.handle_updates(&updates).await;
        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].0, poll.key);
        assert_eq!(
            tallies[0].1,
            vec![
                PollTally {
                    name: "pizza".into(),
                    voters: vec![],
                },
                PollTally {
                    name: "sushi".into(),
                    voters: vec![voter.clone()],
                },
            ]
        );

        let unknown = MessageUpdate {
            key: MessageKey::new(chat.clone(), "NOPOLL", true),
            ..updates[0].clone()
        };
        assert!(dispatcher.handle_updates(&[unknown]).await.is_empty());
    }
}
