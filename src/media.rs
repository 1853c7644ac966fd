//! `#sticker`: an image captioned with the keyword comes back as a sticker.

use crate::error::SessionError;
use crate::session::{MediaStream, Session};
use futures_util::TryStreamExt;
use log::{info, warn};
use wabot_core::proto_helpers::MessageExt;
use wabot_core::types::jid::MessageId;
use wabot_core::types::message::{ContentType, OutgoingContent, WebMessage};

pub const STICKER_KEYWORD: &str = "#sticker";

#[derive(Debug, Clone)]
pub struct MediaHandler {
    keyword: String,
}

impl Default for MediaHandler {
    fn default() -> Self {
        Self::new(STICKER_KEYWORD)
    }
}

impl MediaHandler {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into().to_lowercase(),
        }
    }

    /// Image whose caption, lower-cased, is exactly the keyword.
    pub fn wants(&self, msg: &WebMessage) -> bool {
        let Some(message) = msg.message.as_ref() else {
            return false;
        };
        message.content_type() == Some(ContentType::Image)
            && message
                .get_caption()
                .is_some_and(|caption| caption.to_lowercase() == self.keyword)
    }

    /// Downloads the image and sends it back to the same chat as a sticker.
    /// Returns `None` when the message does not ask for one.
    pub async fn handle(
        &self,
        session: &dyn Session,
        msg: &WebMessage,
    ) -> Result<Option<MessageId>, SessionError> {
        if !self.wants(msg) {
            return Ok(None);
        }

        let stream = match session.download_media(msg).await {
            Err(SessionError::MediaExpired) => {
                warn!(target: "Media", "Media for {} expired, requesting re-upload", msg.key.id);
                let refreshed = session.update_media_message(msg).await?;
                session.download_media(&refreshed).await?
            }
            other => other?,
        };
        let data = collect(stream).await?;
        info!(target: "Media", "Downloaded {} bytes for {}", data.len(), msg.key.id);

        let id = session
            .send_message(&msg.key.remote_jid, OutgoingContent::sticker(data))
            .await?;
        Ok(Some(id))
    }
}

async fn collect(stream: MediaStream) -> Result<Vec<u8>, SessionError> {
    stream
        .try_fold(Vec::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await
}
