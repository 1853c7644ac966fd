//! Scripted "typing" presence before an outbound send.

use crate::error::SessionError;
use crate::session::Session;
use log::debug;
use tokio::time::{Duration, sleep};
use wabot_core::presence::ChatState;
use wabot_core::types::jid::{Jid, MessageId};
use wabot_core::types::message::OutgoingContent;

pub const SUBSCRIBE_DELAY: Duration = Duration::from_millis(500);
pub const COMPOSING_DELAY: Duration = Duration::from_millis(2000);

/// subscribe → wait → composing → wait → paused. Fixed delays, unrelated to
/// the length of what is being sent, and not cancelable once started.
#[derive(Debug, Clone, Copy)]
pub struct TypingSimulator {
    subscribe_delay: Duration,
    composing_delay: Duration,
}

impl Default for TypingSimulator {
    fn default() -> Self {
        Self {
            subscribe_delay: SUBSCRIBE_DELAY,
            composing_delay: COMPOSING_DELAY,
        }
    }
}

impl TypingSimulator {
    pub async fn simulate(&self, session: &dyn Session, jid: &Jid) -> Result<(), SessionError> {
        debug!(target: "Typing", "Simulating typing to {jid}");
        session.presence_subscribe(jid).await?;
        sleep(self.subscribe_delay).await;
        session.send_presence_update(ChatState::Composing, jid).await?;
        sleep(self.composing_delay).await;
        session.send_presence_update(ChatState::Paused, jid).await
    }

    pub async fn send_with_typing(
        &self,
        session: &dyn Session,
        jid: &Jid,
        content: OutgoingContent,
    ) -> Result<MessageId, SessionError> {
        self.simulate(session, jid).await?;
        session.send_message(jid, content).await
    }
}
