//! teloxide types → relay-core types.

use teloxide::types::{Message, User};

use relay_core::{
    domain::{ChatId, MessageId, MessageRef},
    messaging::types::{Content, IncomingMessage},
    store::SeenProfile,
};

pub fn content(msg: &Message) -> Content {
    let caption = || msg.caption().map(str::to_string);

    if let Some(text) = msg.text() {
        Content::Text(text.to_string())
    } else if msg.photo().is_some() {
        Content::Photo { caption: caption() }
    } else if msg.video().is_some() {
        Content::Video { caption: caption() }
    } else if msg.video_note().is_some() {
        Content::VideoNote
    } else if msg.voice().is_some() {
        Content::Voice { caption: caption() }
    } else if msg.audio().is_some() {
        Content::Audio { caption: caption() }
    } else if msg.document().is_some() {
        Content::Document { caption: caption() }
    } else if msg.sticker().is_some() {
        Content::Sticker
    } else {
        Content::Other
    }
}

pub fn incoming(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        source: MessageRef::new(ChatId(msg.chat.id.0), MessageId(msg.id.0)),
        content: content(msg),
        reply_to: msg.reply_to_message().map(|r| MessageId(r.id.0)),
    }
}

/// Private chats only, so the user id doubles as the chat id.
pub fn profile(user: &User) -> SeenProfile {
    SeenProfile {
        id: ChatId(user.id.0 as i64),
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()).filter(|s| !s.is_empty()),
        last_name: user.last_name.clone(),
    }
}
