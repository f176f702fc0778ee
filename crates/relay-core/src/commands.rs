//! Slash commands and inline-button callbacks.
//!
//! Admin-only commands are ignored without reply for everyone else.

use crate::{
    domain::ChatId,
    errors::Error,
    messaging::types::{CallbackQuery, InlineButton, InlineKeyboard},
    policy,
    relay::{RelayEngine, DIRECT_ACK, DIRECT_FAILED, DIR_DIRECT},
    store::{PolicyConfig, SeenProfile},
    Result,
};

const MESSAGE_LIMIT: usize = 4000;

const NOT_FOUND: &str = "No student with that identifier was found.";
const CANCELLED: &str = "Cancelled.";

const CB_TO_PREFIX: &str = "to:";
const CB_TO_CANCEL: &str = "to_cancel";
const CB_REQUEST_ASSIGNMENT: &str = "request_assignment";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Start,
    Help,
    Link,
    Unlink,
    List,
    Patterns,
    SetPattern,
    DelPattern,
    SetDefaultCurator,
    AddAdmin,
    DelAdmin,
    MyStudents,
    To,
    CancelTo,
}

impl CommandKind {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "start" => Self::Start,
            "help" => Self::Help,
            "link" => Self::Link,
            "unlink" => Self::Unlink,
            "list" => Self::List,
            "patterns" => Self::Patterns,
            "setpattern" => Self::SetPattern,
            "delpattern" => Self::DelPattern,
            "setdefaultcurator" => Self::SetDefaultCurator,
            "addadmin" => Self::AddAdmin,
            "deladmin" => Self::DelAdmin,
            "mystudents" => Self::MyStudents,
            "to" => Self::To,
            "cancel_to" => Self::CancelTo,
            _ => return None,
        })
    }

    fn admin_only(self) -> bool {
        matches!(
            self,
            Self::Link
                | Self::Unlink
                | Self::List
                | Self::Patterns
                | Self::SetPattern
                | Self::DelPattern
                | Self::SetDefaultCurator
                | Self::AddAdmin
                | Self::DelAdmin
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub args: String,
}

impl Command {
    /// Parse `/cmd@botname args...`. Unknown commands are `None` and get
    /// relayed like any other text.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }
        let mut parts = text.splitn(2, char::is_whitespace);
        let first = parts.next().unwrap_or("");
        let args = parts.next().unwrap_or("").trim().to_string();

        let name = first
            .trim_start_matches('/')
            .split('@')
            .next()
            .unwrap_or("")
            .to_lowercase();

        CommandKind::from_name(&name).map(|kind| Command { kind, args })
    }
}

fn parse_id(s: &str) -> Option<ChatId> {
    s.trim().parse::<i64>().ok().map(ChatId)
}

/// Split `text` on line boundaries into chunks of at most `limit` bytes.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut chunk = String::new();
    for line in text.lines() {
        if !chunk.is_empty() && chunk.len() + 1 + line.len() > limit {
            out.push(std::mem::take(&mut chunk));
        }
        if !chunk.is_empty() {
            chunk.push('\n');
        }
        chunk.push_str(line);
    }
    if !chunk.is_empty() || out.is_empty() {
        out.push(chunk);
    }
    out
}

fn help_text(role: Role, cfg: &PolicyConfig) -> String {
    match role {
        Role::Admin => {
            let admins = if cfg.admins.is_empty() {
                "none".to_string()
            } else {
                cfg.admins
                    .iter()
                    .map(|a| a.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!(
                "Admin help:\n\n\
— Student ↔ curator bindings:\n\
/link <student_id> <curator_id>\n\
/unlink <student_id>\n\
/list\n\n\
— Blocking patterns:\n\
/patterns\n\
/setpattern <regex>\n\
/delpattern <index>\n\n\
/setdefaultcurator <curator_id>\n\
/addadmin <id>\n\
/deladmin <id>\n\
/to <student_id|ticket> [text]\n\n\
Admins: {admins}"
            )
        }
        Role::Curator => "Curator help:\n\n\
— Messages from your students arrive here anonymously.\n\
— To answer a student, reply to the bot's message.\n\n\
Commands:\n\
/mystudents — your students (tickets)\n\
/to <student_id|ticket> [text] — write to a student directly\n\
/cancel_to — cancel a pending /to"
            .to_string(),
        Role::Student => "Student help:\n\n\
— Write here: your message goes to your curator anonymously.\n\
— If you have no curator yet, contact an administrator.\n\n\
Commands:\n\
/help — show this message"
            .to_string(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Role {
    Admin,
    Curator,
    Student,
}

impl RelayEngine {
    /// Execute a command sent by `from`.
    pub async fn handle_command(&self, from: &SeenProfile, cmd: &Command) -> Result<()> {
        let sender = from.id;
        let cfg = self.stores.config.load().await?;

        if cmd.kind.admin_only() && !cfg.is_admin(sender) {
            tracing::debug!(%sender, kind = ?cmd.kind, "ignoring admin command from non-admin");
            return Ok(());
        }

        match cmd.kind {
            CommandKind::Start => self.cmd_start(from, &cfg).await,
            CommandKind::Help => {
                let role = self.role(sender, &cfg).await?;
                self.reply(sender, &help_text(role, &cfg)).await;
                Ok(())
            }
            CommandKind::Link => self.cmd_link(sender, &cfg, &cmd.args).await,
            CommandKind::Unlink => self.cmd_unlink(sender, &cmd.args).await,
            CommandKind::List => self.cmd_list(sender).await,
            CommandKind::Patterns => {
                let rows = cfg
                    .banned_regex
                    .iter()
                    .enumerate()
                    .map(|(i, p)| format!("[{i}] {p}"))
                    .collect::<Vec<_>>();
                self.reply_long(sender, &rows, "The list is empty").await;
                Ok(())
            }
            CommandKind::SetPattern => self.cmd_set_pattern(sender, &cmd.args).await,
            CommandKind::DelPattern => self.cmd_del_pattern(sender, &cmd.args).await,
            CommandKind::SetDefaultCurator => {
                let Some(curator) = parse_id(&cmd.args) else {
                    self.reply(sender, "Usage: /setdefaultcurator <curator_id>")
                        .await;
                    return Ok(());
                };
                self.stores.config.set_default_handler(curator).await?;
                tracing::info!(%sender, %curator, "default curator set");
                self.reply(sender, &format!("default_curator = {curator}"))
                    .await;
                Ok(())
            }
            CommandKind::AddAdmin => self.cmd_admin(sender, &cmd.args, true).await,
            CommandKind::DelAdmin => self.cmd_admin(sender, &cmd.args, false).await,
            CommandKind::MyStudents => self.cmd_my_students(sender).await,
            CommandKind::To => self.cmd_to(sender, &cfg, &cmd.args).await,
            CommandKind::CancelTo => {
                self.sessions.cancel(sender).await;
                self.reply(sender, CANCELLED).await;
                Ok(())
            }
        }
    }

    /// Handle an inline-button press. The query is always answered.
    pub async fn handle_callback(&self, q: &CallbackQuery) -> Result<()> {
        if let Err(e) = self
            .messenger
            .answer_callback_query(&q.callback_id, None)
            .await
        {
            tracing::warn!(error = %e, "answer_callback_query failed");
        }

        let sender = q.sender;
        if let Some(ticket) = q.data.strip_prefix(CB_TO_PREFIX) {
            let cfg = self.stores.config.load().await?;
            let target = if cfg.is_admin(sender) {
                self.stores.bindings.resolve_by_ticket(ticket).await?
            } else {
                self.stores
                    .bindings
                    .list_for_curator(sender)
                    .await?
                    .into_iter()
                    .find(|b| b.ticket == ticket)
                    .map(|b| b.student)
            };
            let Some(target) = target else {
                self.reply(sender, NOT_FOUND).await;
                return Ok(());
            };
            self.begin_direct(sender, target, &format!("Write the message for {ticket}:"))
                .await;
            return Ok(());
        }

        match q.data.as_str() {
            CB_TO_CANCEL => {
                self.sessions.cancel(sender).await;
                self.reply(sender, "Operation cancelled.").await;
            }
            CB_REQUEST_ASSIGNMENT => {
                let cfg = self.stores.config.load().await?;
                let mut note = format!("Assignment request: curator id={sender}");
                if let Some(u) = q.username.as_deref() {
                    note.push_str(&format!(", @{u}"));
                }
                self.notify_admins(&cfg, &note).await;
                self.reply(
                    sender,
                    "Admins have been notified. Please wait for an assignment.",
                )
                .await;
            }
            other => tracing::debug!(%sender, data = other, "ignoring unknown callback"),
        }
        Ok(())
    }

    async fn role(&self, id: ChatId, cfg: &PolicyConfig) -> Result<Role> {
        if cfg.is_admin(id) {
            return Ok(Role::Admin);
        }
        if self.stores.bindings.is_curator(id).await? {
            return Ok(Role::Curator);
        }
        Ok(Role::Student)
    }

    async fn cmd_start(&self, from: &SeenProfile, cfg: &PolicyConfig) -> Result<()> {
        if self.stores.seen.mark_seen(from).await? {
            let mut info = format!("NEW USER: id={}", from.id);
            if let Some(u) = from.username.as_deref() {
                info.push_str(&format!(", username=@{u}"));
            }
            if let Some(name) = from.full_name() {
                info.push_str(&format!(", name={name}"));
            }
            tracing::info!(user = %from.id, "first contact");
            self.notify_admins(cfg, &format!("🔔 {info}")).await;
        }

        self.reply(
            from.id,
            "The relay bot is ready. Write a message and we will pass it to your curator without revealing your username or phone number.\nHelp: /help",
        )
        .await;
        Ok(())
    }

    async fn cmd_link(&self, sender: ChatId, cfg: &PolicyConfig, args: &str) -> Result<()> {
        let mut it = args.split_whitespace();
        let (Some(student), Some(curator)) = (
            it.next().and_then(parse_id),
            it.next().and_then(parse_id),
        ) else {
            self.reply(sender, "Usage: /link <student_id> <curator_id>")
                .await;
            return Ok(());
        };

        let b = self
            .stores
            .bindings
            .bind(student, curator, None, cfg.ticket_prefix())
            .await?;
        tracing::info!(%sender, student = %b.student, curator = %b.curator, "linked");
        self.reply(
            sender,
            &format!("Linked {} ({student}) → curator {curator}", b.ticket),
        )
        .await;
        Ok(())
    }

    async fn cmd_unlink(&self, sender: ChatId, args: &str) -> Result<()> {
        let Some(student) = args.split_whitespace().next().and_then(parse_id) else {
            self.reply(sender, "Usage: /unlink <student_id>").await;
            return Ok(());
        };
        let removed = self.stores.bindings.unbind(student).await?;
        tracing::info!(%sender, %student, removed, "unlink");
        self.reply(sender, if removed { "Removed" } else { "Not found" })
            .await;
        Ok(())
    }

    async fn cmd_list(&self, sender: ChatId) -> Result<()> {
        let rows = self
            .stores
            .bindings
            .list_all()
            .await?
            .into_iter()
            .map(|b| format!("{}: {} → {}", b.ticket, b.student, b.curator))
            .collect::<Vec<_>>();
        self.reply_long(sender, &rows, "Empty").await;
        Ok(())
    }

    async fn cmd_set_pattern(&self, sender: ChatId, args: &str) -> Result<()> {
        let pattern = args.trim();
        if pattern.is_empty() {
            self.reply(sender, "Usage: /setpattern <regex>").await;
            return Ok(());
        }
        self.stores.config.add_pattern(pattern).await?;
        let mut text = format!("Pattern added: {pattern}");
        if !policy::is_valid_pattern(pattern) {
            text.push_str("\n⚠️ This pattern does not compile and will be ignored.");
        }
        self.reply(sender, &text).await;
        Ok(())
    }

    async fn cmd_del_pattern(&self, sender: ChatId, args: &str) -> Result<()> {
        let Some(index) = args
            .split_whitespace()
            .next()
            .and_then(|s| s.parse::<usize>().ok())
        else {
            self.reply(sender, "Usage: /delpattern <index>").await;
            return Ok(());
        };
        match self.stores.config.remove_pattern(index).await {
            Ok(removed) => {
                self.reply(sender, &format!("Pattern removed: {removed}"))
                    .await
            }
            Err(Error::IndexOutOfRange { .. }) => self.reply(sender, "No such index").await,
            Err(e) => return Err(e),
        }
        Ok(())
    }

    async fn cmd_admin(&self, sender: ChatId, args: &str, add: bool) -> Result<()> {
        let Some(id) = args.split_whitespace().next().and_then(parse_id) else {
            let usage = if add {
                "Usage: /addadmin <id>"
            } else {
                "Usage: /deladmin <id>"
            };
            self.reply(sender, usage).await;
            return Ok(());
        };

        let text = if add {
            if self.stores.config.add_admin(id).await? {
                format!("Admin added: {id}")
            } else {
                format!("{id} is already an admin")
            }
        } else if self.stores.config.remove_admin(id).await? {
            format!("Admin removed: {id}")
        } else {
            format!("{id} is not an admin")
        };
        tracing::info!(%sender, admin = %id, add, "admin list changed");
        self.reply(sender, &text).await;
        Ok(())
    }

    async fn cmd_my_students(&self, sender: ChatId) -> Result<()> {
        let items = self.stores.bindings.list_for_curator(sender).await?;
        if items.is_empty() {
            self.send_keyboard(
                sender,
                "No students are assigned to you.",
                InlineKeyboard::single("Request assignment", CB_REQUEST_ASSIGNMENT),
            )
            .await;
            return Ok(());
        }

        // Tickets only: the curator never sees student ids.
        let text = items
            .iter()
            .map(|b| b.ticket.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let keyboard = InlineKeyboard::new(
            items
                .iter()
                .map(|b| InlineButton {
                    label: format!("✉️ {}", b.ticket),
                    callback_data: format!("{CB_TO_PREFIX}{}", b.ticket),
                })
                .collect(),
        );
        self.send_keyboard(sender, &text, keyboard).await;
        Ok(())
    }

    /// `/to <student_id|ticket> [text]`.
    async fn cmd_to(&self, sender: ChatId, cfg: &PolicyConfig, args: &str) -> Result<()> {
        if !cfg.is_admin(sender) && !self.stores.bindings.is_curator(sender).await? {
            return Ok(());
        }

        let mut parts = args.splitn(2, char::is_whitespace);
        let ident = parts.next().unwrap_or("").trim();
        let payload = parts.next().unwrap_or("").trim();
        if ident.is_empty() {
            self.reply(sender, "Usage: /to <student_id|ticket> [text]")
                .await;
            return Ok(());
        }

        let Some(target) = self.resolve_student(ident).await? else {
            self.reply(sender, NOT_FOUND).await;
            return Ok(());
        };

        if payload.is_empty() {
            self.begin_direct(
                sender,
                target,
                "OK. Send the next message (text/photo/video/voice/file) and I will deliver it to the student. To cancel: /cancel_to",
            )
            .await;
            return Ok(());
        }

        if self
            .gate(cfg, DIR_DIRECT, sender, Some(payload))
            .await
            .is_some()
        {
            return Ok(());
        }

        match self.messenger.send_text(target, payload).await {
            Ok(_) => {
                tracing::info!(%sender, "direct text delivered");
                self.reply(sender, DIRECT_ACK).await;
            }
            Err(e) => {
                tracing::warn!(%sender, error = %e, "direct text failed");
                self.reply(sender, DIRECT_FAILED).await;
            }
        }
        Ok(())
    }

    /// A numeric identifier names a bound student directly; anything else
    /// (or an unbound number) is looked up as a ticket.
    async fn resolve_student(&self, ident: &str) -> Result<Option<ChatId>> {
        if let Some(id) = parse_id(ident) {
            if self.stores.bindings.resolve(id).await?.is_some() {
                return Ok(Some(id));
            }
        }
        self.stores.bindings.resolve_by_ticket(ident).await
    }

    async fn begin_direct(&self, sender: ChatId, target: ChatId, prompt: &str) {
        self.sessions.begin(sender, target).await;
        self.send_keyboard(
            sender,
            prompt,
            InlineKeyboard::single("Cancel", CB_TO_CANCEL),
        )
        .await;
    }

    async fn send_keyboard(&self, chat_id: ChatId, text: &str, keyboard: InlineKeyboard) {
        if let Err(e) = self
            .messenger
            .send_inline_keyboard(chat_id, text, keyboard)
            .await
        {
            tracing::warn!(%chat_id, error = %e, "keyboard send failed");
        }
    }

    async fn reply_long(&self, chat_id: ChatId, rows: &[String], empty: &str) {
        if rows.is_empty() {
            self.reply(chat_id, empty).await;
            return;
        }
        for chunk in split_message(&rows.join("\n"), MESSAGE_LIMIT) {
            self.reply(chat_id, &chunk).await;
        }
    }
}
