//! Shared fixtures for engine and command tests.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use crate::{
    config::Config,
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{Content, IncomingMessage, InlineKeyboard},
    },
    relay::RelayEngine,
    store::Stores,
    Result,
};

pub const ADMIN: ChatId = ChatId(1);
pub const CURATOR: ChatId = ChatId(5000);
pub const STUDENT: ChatId = ChatId(987654321);

#[derive(Clone, Debug)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
    },
    Copy {
        source: MessageRef,
        target: ChatId,
    },
    Keyboard {
        chat_id: ChatId,
        text: String,
        keyboard: InlineKeyboard,
    },
}

impl Sent {
    fn chat(&self) -> ChatId {
        match self {
            Sent::Text { chat_id, .. } | Sent::Keyboard { chat_id, .. } => *chat_id,
            Sent::Copy { target, .. } => *target,
        }
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    sent: Mutex<Vec<Sent>>,
    answered: Mutex<Vec<String>>,
    fail_copies: Mutex<bool>,
    unreachable: Mutex<HashSet<ChatId>>,
}

impl FakeMessenger {
    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        *guard += 1;
        MessageRef::new(chat_id, MessageId(1000 + *guard))
    }

    fn check_reachable(&self, chat_id: ChatId) -> Result<()> {
        if self.unreachable.lock().unwrap().contains(&chat_id) {
            return Err(Error::External(format!("chat {chat_id} blocked the bot")));
        }
        Ok(())
    }

    pub fn fail_copies(&self, fail: bool) {
        *self.fail_copies.lock().unwrap() = fail;
    }

    pub fn fail_sends_to(&self, chat_id: ChatId) {
        self.unreachable.lock().unwrap().insert(chat_id);
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn all_to(&self, chat_id: ChatId) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.chat() == chat_id)
            .cloned()
            .collect()
    }

    /// Plain texts and keyboard texts sent to `chat_id`, in order.
    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.all_to(chat_id)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } | Sent::Keyboard { text, .. } => Some(text),
                Sent::Copy { .. } => None,
            })
            .collect()
    }

    pub fn keyboards_to(&self, chat_id: ChatId) -> Vec<InlineKeyboard> {
        self.all_to(chat_id)
            .into_iter()
            .filter_map(|s| match s {
                Sent::Keyboard { keyboard, .. } => Some(keyboard),
                _ => None,
            })
            .collect()
    }

    pub fn answered_callbacks(&self) -> Vec<String> {
        self.answered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.check_reachable(chat_id)?;
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
        });
        Ok(self.alloc(chat_id))
    }

    async fn copy_message(&self, source: MessageRef, target: ChatId) -> Result<MessageRef> {
        self.check_reachable(target)?;
        if *self.fail_copies.lock().unwrap() {
            return Err(Error::External("copy refused".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Copy { source, target });
        Ok(self.alloc(target))
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.check_reachable(chat_id)?;
        self.sent.lock().unwrap().push(Sent::Keyboard {
            chat_id,
            text: text.to_string(),
            keyboard,
        });
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(&self, callback_id: &str, _text: Option<&str>) -> Result<()> {
        self.answered.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}

pub async fn engine() -> (tempfile::TempDir, RelayEngine, Arc<FakeMessenger>) {
    let dir = tempfile::tempdir().unwrap();
    let fake = Arc::new(FakeMessenger::default());
    let stores = Stores::open(&Config::with_data_dir(dir.path()));
    let engine = RelayEngine::new(stores, fake.clone());
    (dir, engine, fake)
}

pub fn message(
    from: ChatId,
    id: i32,
    content: Content,
    reply_to: Option<MessageId>,
) -> IncomingMessage {
    IncomingMessage {
        source: MessageRef::new(from, MessageId(id)),
        content,
        reply_to,
    }
}
