//! Telegram update handlers.
//!
//! Each handler converts the teloxide update into relay-core types and hands
//! it to the engine under the sender's chat lock. Engine errors are logged,
//! never surfaced to the dispatcher.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use relay_core::commands::Command;

use crate::router::AppState;

mod callback;
mod convert;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let profile = convert::profile(user);
    let _guard = state.chat_locks.lock_chat(msg.chat.id.0).await;

    if let Some(cmd) = msg.text().and_then(Command::parse) {
        if let Err(e) = state.engine.handle_command(&profile, &cmd).await {
            tracing::error!(sender = %profile.id, kind = ?cmd.kind, error = %e, "command failed");
        }
        return Ok(());
    }

    let incoming = convert::incoming(&msg);
    let kind = incoming.content.kind();
    match state.engine.handle_message(incoming).await {
        Ok(outcome) => tracing::debug!(sender = %profile.id, kind, ?outcome, "message handled"),
        Err(e) => tracing::error!(sender = %profile.id, kind, error = %e, "message failed"),
    }
    Ok(())
}
