//! Direct-send sessions: a curator addresses a student, then sends the payload
//! as the next message.

use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::domain::ChatId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingPayload { target: ChatId },
}

/// One session per sender. Sessions never expire on their own.
#[derive(Default)]
pub struct DirectSendSessions {
    inner: Mutex<HashMap<ChatId, ChatId>>,
}

impl DirectSendSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Idle → AwaitingPayload`. Replaces any pending target.
    pub async fn begin(&self, sender: ChatId, target: ChatId) {
        self.inner.lock().await.insert(sender, target);
    }

    /// `AwaitingPayload → Idle`, handing out the target to deliver to.
    pub async fn resolve(&self, sender: ChatId) -> Option<ChatId> {
        self.inner.lock().await.remove(&sender)
    }

    /// `AwaitingPayload → Idle` without delivery. Returns whether a session
    /// was pending.
    pub async fn cancel(&self, sender: ChatId) -> bool {
        self.inner.lock().await.remove(&sender).is_some()
    }

    /// Target of the pending session, without consuming it.
    pub async fn pending(&self, sender: ChatId) -> Option<ChatId> {
        self.inner.lock().await.get(&sender).copied()
    }

    pub async fn state(&self, sender: ChatId) -> SessionState {
        match self.pending(sender).await {
            Some(target) => SessionState::AwaitingPayload { target },
            None => SessionState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn begin_then_resolve_returns_to_idle() {
        let s = DirectSendSessions::new();
        s.begin(ChatId(1), ChatId(100)).await;
        assert_eq!(
            s.state(ChatId(1)).await,
            SessionState::AwaitingPayload {
                target: ChatId(100)
            }
        );

        assert_eq!(s.pending(ChatId(1)).await, Some(ChatId(100)));
        assert_eq!(s.resolve(ChatId(1)).await, Some(ChatId(100)));
        assert_eq!(s.state(ChatId(1)).await, SessionState::Idle);
        assert_eq!(s.resolve(ChatId(1)).await, None);
    }

    #[tokio::test]
    async fn cancel_clears_without_target() {
        let s = DirectSendSessions::new();
        assert!(!s.cancel(ChatId(1)).await);

        s.begin(ChatId(1), ChatId(100)).await;
        assert!(s.cancel(ChatId(1)).await);
        assert_eq!(s.state(ChatId(1)).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn sessions_are_per_sender_and_latest_target_wins() {
        let s = DirectSendSessions::new();
        s.begin(ChatId(1), ChatId(100)).await;
        s.begin(ChatId(1), ChatId(101)).await;
        s.begin(ChatId(2), ChatId(200)).await;

        assert_eq!(s.resolve(ChatId(1)).await, Some(ChatId(101)));
        assert_eq!(s.resolve(ChatId(2)).await, Some(ChatId(200)));
    }
}
