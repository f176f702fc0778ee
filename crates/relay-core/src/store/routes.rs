use std::{collections::HashMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    Result,
};

use super::JsonDocument;

/// `threads.json`: relayed curator-side message → originating student.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ThreadsDoc {
    #[serde(default)]
    routes: HashMap<String, i64>,
    #[serde(default)]
    ts: i64,
}

impl Default for ThreadsDoc {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            ts: chrono::Utc::now().timestamp(),
        }
    }
}

fn route_key(chat: ChatId, message: MessageId) -> String {
    format!("{}:{}", chat.0, message.0)
}

/// Reply correlation for curators.
///
/// Every message the bot places in a curator chat on behalf of a student is
/// remembered here, so a curator reply to it can be routed back. Entries are
/// never evicted.
pub struct ThreadRouter {
    doc: JsonDocument<ThreadsDoc>,
}

impl ThreadRouter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            doc: JsonDocument::new(path),
        }
    }

    pub async fn remember(&self, relayed: MessageRef, student: ChatId) -> Result<()> {
        self.doc
            .update(|doc| {
                doc.routes
                    .insert(route_key(relayed.chat_id, relayed.message_id), student.0);
                doc.ts = chrono::Utc::now().timestamp();
            })
            .await
    }

    /// Student behind the message that `reply_to` points at in `curator_chat`.
    pub async fn lookup(
        &self,
        curator_chat: ChatId,
        reply_to: Option<MessageId>,
    ) -> Result<Option<ChatId>> {
        let Some(reply_to) = reply_to else {
            return Ok(None);
        };
        let doc = self.doc.read().await?;
        Ok(doc
            .routes
            .get(&route_key(curator_chat, reply_to))
            .copied()
            .map(ChatId))
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.doc.read().await?.routes.len())
    }
}
