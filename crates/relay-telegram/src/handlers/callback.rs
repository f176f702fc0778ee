use std::sync::Arc;

use teloxide::prelude::*;

use relay_core::{domain::ChatId, messaging::types};

use crate::router::AppState;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let sender = ChatId(q.from.id.0 as i64);
    let query = types::CallbackQuery {
        callback_id: q.id.clone(),
        sender,
        username: q.from.username.clone(),
        data: q.data.clone().unwrap_or_default(),
    };

    let _guard = state.chat_locks.lock_chat(sender.0).await;
    if let Err(e) = state.engine.handle_callback(&query).await {
        tracing::error!(%sender, data = %query.data, error = %e, "callback failed");
    }
    Ok(())
}
