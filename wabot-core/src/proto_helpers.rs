use crate::types::message::{ContentType, MediaMessage, Message};

pub trait MessageExt {
    /// Unwraps device-sent, ephemeral and view-once wrappers.
    fn get_base_message(&self) -> &Message;
    fn is_ephemeral(&self) -> bool;
    /// Gets the caption for media messages (Image, Video, Document).
    fn get_caption(&self) -> Option<&str>;
    /// Gets the primary text content of a message (from conversation or extendedTextMessage).
    fn text_content(&self) -> Option<&str>;
    /// The first populated content field of the base message.
    fn content_type(&self) -> Option<ContentType>;
    fn get_image(&self) -> Option<&MediaMessage>;
}

impl MessageExt for Message {
    fn get_base_message(&self) -> &Message {
        let mut current = self;
        if let Some(msg) = self
            .device_sent_message
            .as_ref()
            .and_then(|m| m.message.as_ref())
        {
            current = msg;
        }
        if let Some(msg) = current
            .ephemeral_message
            .as_ref()
            .and_then(|m| m.message.as_ref())
        {
            current = msg;
        }
        if let Some(msg) = current
            .view_once_message
            .as_ref()
            .and_then(|m| m.message.as_ref())
        {
            current = msg;
        }
        current
    }

    fn is_ephemeral(&self) -> bool {
        self.ephemeral_message.is_some()
    }

    fn get_caption(&self) -> Option<&str> {
        let base = self.get_base_message();
        if let Some(msg) = &base.image_message {
            return msg.caption.as_deref();
        }
        if let Some(msg) = &base.video_message {
            return msg.caption.as_deref();
        }
        if let Some(msg) = &base.document_message {
            return msg.caption.as_deref();
        }
        None
    }

    fn text_content(&self) -> Option<&str> {
        let base = self.get_base_message();
        if let Some(text) = &base.conversation
            && !text.is_empty()
        {
            return Some(text);
        }
        if let Some(ext) = &base.extended_text_message
            && let Some(text) = &ext.text
            && !text.is_empty()
        {
            return Some(text);
        }
        None
    }

    fn content_type(&self) -> Option<ContentType> {
        let base = self.get_base_message();
        if base.conversation.is_some() {
            Some(ContentType::Conversation)
        } else if base.extended_text_message.is_some() {
            Some(ContentType::ExtendedText)
        } else if base.image_message.is_some() {
            Some(ContentType::Image)
        } else if base.video_message.is_some() {
            Some(ContentType::Video)
        } else if base.document_message.is_some() {
            Some(ContentType::Document)
        } else if base.sticker_message.is_some() {
            Some(ContentType::Sticker)
        } else if base.reaction_message.is_some() {
            Some(ContentType::Reaction)
        } else if base.poll_creation_message.is_some() {
            Some(ContentType::PollCreation)
        } else {
            None
        }
    }

    fn get_image(&self) -> Option<&MediaMessage> {
        self.get_base_message().image_message.as_ref()
    }
}
