//! The relay engine: policy gate, routing and bookkeeping for every
//! private-chat message.

use std::sync::Arc;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{Content, InboundEvent, IncomingMessage, Origin},
    },
    policy::{self, Violation},
    sessions::DirectSendSessions,
    store::{PolicyConfig, Stores},
    Result,
};

pub(crate) const STUDENT_ACK: &str = "Sent to your curator ✅";
pub(crate) const CURATOR_ACK: &str = "Sent to the student ✅";
pub(crate) const DIRECT_ACK: &str = "Delivered";
pub(crate) const DIRECT_FAILED: &str = "Failed to deliver the message.";
pub(crate) const CURATOR_NEEDS_REPLY: &str = "Please reply to one of the bot's messages to answer a student, or use /to <ticket> <text>.";
pub(crate) const CURATOR_PLACEHOLDER: &str = "(curator message)";
const COPY_FAILED_PREFIX: &str = "[copy failed]";

pub(crate) const DIR_STUDENT: &str = "student->curator";
pub(crate) const DIR_CURATOR: &str = "curator->student";
pub(crate) const DIR_DIRECT: &str = "/to curator->student";

/// What happened to one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Delivered to `target`; `messages` are the copies placed there.
    Relayed {
        target: ChatId,
        messages: Vec<MessageRef>,
    },
    /// Dropped by the policy filter; admins were notified.
    Blocked(Violation),
    /// Student without curator and no default curator; admins were notified.
    NoRoute,
    /// Curator message that could not be matched to a student.
    Unroutable,
    /// Transport refused a direct send.
    Failed,
}

pub struct RelayEngine {
    pub(crate) stores: Stores,
    pub(crate) sessions: DirectSendSessions,
    pub(crate) messenger: Arc<dyn MessagingPort>,
}

impl RelayEngine {
    pub fn new(stores: Stores, messenger: Arc<dyn MessagingPort>) -> Self {
        Self {
            stores,
            sessions: DirectSendSessions::new(),
            messenger,
        }
    }

    /// Create missing documents, merge `bootstrap_admins` into the admin list
    /// and optionally tell admins the bot is up.
    pub async fn startup(&self, bootstrap_admins: &[ChatId], announce: bool) -> Result<()> {
        self.stores.ensure_files().await?;
        for &id in bootstrap_admins {
            if self.stores.config.add_admin(id).await? {
                tracing::info!(admin = %id, "added bootstrap admin");
            }
        }
        if announce {
            let cfg = self.stores.config.load().await?;
            self.notify_admins(&cfg, "✅ Bot started").await;
        }
        Ok(())
    }

    /// Classify a private-chat message and relay it.
    ///
    /// A pending direct-send session takes precedence; otherwise curator
    /// roster membership decides the direction.
    pub async fn handle_message(&self, message: IncomingMessage) -> Result<RelayOutcome> {
        let sender = message.sender();
        let origin = match self.sessions.resolve(sender).await {
            Some(target) => Origin::DirectSend { target },
            None if self.stores.bindings.is_curator(sender).await? => Origin::Curator,
            None => Origin::Student,
        };
        self.handle_inbound(InboundEvent { origin, message }).await
    }

    pub async fn handle_inbound(&self, event: InboundEvent) -> Result<RelayOutcome> {
        let outcome = match event.origin {
            Origin::Student => self.relay_from_student(&event.message).await?,
            Origin::Curator => self.relay_from_curator(&event.message).await?,
            Origin::DirectSend { target } => self.deliver_direct(&event.message, target).await?,
        };
        tracing::debug!(
            sender = %event.message.sender(),
            kind = event.message.content.kind(),
            ?outcome,
            "inbound handled"
        );
        Ok(outcome)
    }

    async fn relay_from_student(&self, msg: &IncomingMessage) -> Result<RelayOutcome> {
        let cfg = self.stores.config.load().await?;
        let student = msg.sender();

        if let Some(v) = self
            .gate(&cfg, DIR_STUDENT, student, msg.content.text_or_caption())
            .await
        {
            return Ok(RelayOutcome::Blocked(v));
        }

        let binding = match cfg.default_handler() {
            Some(default) => {
                let (b, created) = self
                    .stores
                    .bindings
                    .resolve_or_bind(student, default, cfg.ticket_prefix())
                    .await?;
                if created {
                    tracing::info!(
                        %student,
                        curator = %b.curator,
                        ticket = %b.ticket,
                        "bound student to default curator"
                    );
                }
                b
            }
            None => match self.stores.bindings.resolve(student).await? {
                Some(b) => b,
                None => {
                    tracing::warn!(%student, "no curator bound and no default curator");
                    self.notify_admins(
                        &cfg,
                        &format!(
                            "NO-DELIVERY (no curator) for student {student}. Set default_curator or /link."
                        ),
                    )
                    .await;
                    return Ok(RelayOutcome::NoRoute);
                }
            },
        };

        let curator = binding.curator;
        let header = format!("New message from {}", binding.ticket);
        let mut relayed = Vec::new();

        match &msg.content {
            Content::Text(text) if !text.trim().is_empty() => {
                let sent = self
                    .messenger
                    .send_text(curator, &format!("{header}\n——\n{text}"))
                    .await?;
                relayed.push(sent);
            }
            content => {
                let copied = self.copy_or_degrade(msg, curator).await?;
                if content.is_media() && content.caption().is_none() {
                    relayed.push(self.messenger.send_text(curator, &header).await?);
                }
                relayed.push(copied);
            }
        }

        // Separate critical section from the bind above; a failure here only
        // loses reply correlation for these messages.
        for sent in &relayed {
            self.stores.routes.remember(*sent, student).await?;
        }

        tracing::info!(
            ticket = %binding.ticket,
            %curator,
            kind = msg.content.kind(),
            "relayed to curator"
        );
        self.reply(student, STUDENT_ACK).await;

        Ok(RelayOutcome::Relayed {
            target: curator,
            messages: relayed,
        })
    }

    async fn relay_from_curator(&self, msg: &IncomingMessage) -> Result<RelayOutcome> {
        let cfg = self.stores.config.load().await?;
        let curator = msg.sender();

        if let Some(v) = self
            .gate(&cfg, DIR_CURATOR, curator, msg.content.text_or_caption())
            .await
        {
            return Ok(RelayOutcome::Blocked(v));
        }

        let Some(student) = self.stores.routes.lookup(curator, msg.reply_to).await? else {
            self.reply(curator, CURATOR_NEEDS_REPLY).await;
            return Ok(RelayOutcome::Unroutable);
        };

        let sent = self.deliver_content(msg, student).await?;
        tracing::info!(%curator, kind = msg.content.kind(), "relayed curator reply");
        self.reply(curator, CURATOR_ACK).await;

        Ok(RelayOutcome::Relayed {
            target: student,
            messages: vec![sent],
        })
    }

    /// Payload of a direct-send session. The session is already cleared.
    async fn deliver_direct(&self, msg: &IncomingMessage, target: ChatId) -> Result<RelayOutcome> {
        let cfg = self.stores.config.load().await?;
        let sender = msg.sender();

        if let Some(v) = self
            .gate(&cfg, DIR_DIRECT, sender, msg.content.text_or_caption())
            .await
        {
            return Ok(RelayOutcome::Blocked(v));
        }

        match self.deliver_content(msg, target).await {
            Ok(sent) => {
                tracing::info!(%sender, kind = msg.content.kind(), "direct send delivered");
                self.reply(sender, DIRECT_ACK).await;
                Ok(RelayOutcome::Relayed {
                    target,
                    messages: vec![sent],
                })
            }
            Err(e) => {
                tracing::warn!(%sender, error = %e, "direct send failed");
                self.reply(sender, DIRECT_FAILED).await;
                Ok(RelayOutcome::Failed)
            }
        }
    }

    /// Curator → student delivery: media is copied, text re-sent as the bot.
    async fn deliver_content(&self, msg: &IncomingMessage, target: ChatId) -> Result<MessageRef> {
        match &msg.content {
            c if c.is_media() => self.copy_or_degrade(msg, target).await,
            Content::Text(text) if !text.is_empty() => self.messenger.send_text(target, text).await,
            _ => self.messenger.send_text(target, CURATOR_PLACEHOLDER).await,
        }
    }

    async fn copy_or_degrade(&self, msg: &IncomingMessage, target: ChatId) -> Result<MessageRef> {
        match self.messenger.copy_message(msg.source, target).await {
            Ok(copied) => Ok(copied),
            Err(e) => {
                tracing::warn!(%target, error = %e, "copy failed, sending text fallback");
                let text = msg.content.text_or_caption().unwrap_or_default();
                self.messenger
                    .send_text(target, &format!("{COPY_FAILED_PREFIX} {text}"))
                    .await
            }
        }
    }

    /// Policy check; on violation every admin gets one notice and the caller
    /// must drop the message without telling anyone else.
    pub(crate) async fn gate(
        &self,
        cfg: &PolicyConfig,
        direction: &str,
        sender: ChatId,
        text: Option<&str>,
    ) -> Option<Violation> {
        let violation = policy::evaluate(text, &cfg.banned_regex)?;
        tracing::info!(%sender, direction, rule = violation.index, "message blocked by policy");
        self.notify_admins(
            cfg,
            &format!(
                "BLOCKED ({direction}) from {sender}: {violation}\n{}",
                text.unwrap_or_default()
            ),
        )
        .await;
        Some(violation)
    }

    pub(crate) async fn notify_admins(&self, cfg: &PolicyConfig, text: &str) {
        for admin in cfg.admin_ids() {
            if let Err(e) = self.messenger.send_text(admin, text).await {
                tracing::warn!(%admin, error = %e, "admin notice failed");
            }
        }
    }

    /// Best-effort message to a user.
    pub(crate) async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.messenger.send_text(chat_id, text).await {
            tracing::warn!(%chat_id, error = %e, "reply failed");
        }
    }
}
