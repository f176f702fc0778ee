use crate::domain::{ChatId, MessageId, MessageRef};

/// What an inbound message carries. Only the fields the relay reads are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Photo { caption: Option<String> },
    Video { caption: Option<String> },
    VideoNote,
    Voice { caption: Option<String> },
    Audio { caption: Option<String> },
    Document { caption: Option<String> },
    Sticker,
    /// Anything else Telegram can deliver (location, contact, poll, ...).
    Other,
}

impl Content {
    pub fn caption(&self) -> Option<&str> {
        match self {
            Content::Photo { caption }
            | Content::Video { caption }
            | Content::Voice { caption }
            | Content::Audio { caption }
            | Content::Document { caption } => caption.as_deref().filter(|c| !c.is_empty()),
            _ => None,
        }
    }

    /// Caption if present, otherwise the text.
    pub fn text_or_caption(&self) -> Option<&str> {
        match self {
            Content::Text(t) => Some(t.as_str()).filter(|t| !t.is_empty()),
            other => other.caption(),
        }
    }

    /// Media that must be copied rather than re-sent as text.
    pub fn is_media(&self) -> bool {
        !matches!(self, Content::Text(_) | Content::Other)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Content::Text(_) => "text",
            Content::Photo { .. } => "photo",
            Content::Video { .. } => "video",
            Content::VideoNote => "video_note",
            Content::Voice { .. } => "voice",
            Content::Audio { .. } => "audio",
            Content::Document { .. } => "document",
            Content::Sticker => "sticker",
            Content::Other => "other",
        }
    }
}

/// A private-chat message as seen by the relay.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    /// Where the message lives; the chat id is also the sender identity.
    pub source: MessageRef,
    pub content: Content,
    /// Message this one replies to, in the same chat.
    pub reply_to: Option<MessageId>,
}

impl IncomingMessage {
    pub fn sender(&self) -> ChatId {
        self.source.chat_id
    }
}

/// Which flow an inbound message belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Student,
    Curator,
    /// Payload of a pending direct-send session.
    DirectSend { target: ChatId },
}

#[derive(Clone, Debug)]
pub struct InboundEvent {
    pub origin: Origin,
    pub message: IncomingMessage,
}

/// Inline button press.
#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub callback_id: String,
    pub sender: ChatId,
    pub username: Option<String>,
    pub data: String,
}

/// Inline keyboard, one button per row.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    pub fn single(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self::new(vec![InlineButton {
            label: label.into(),
            callback_data: callback_data.into(),
        }])
    }
}
