use std::sync::Arc;

use relay_core::{config::Config, relay::RelayEngine, store::Stores};
use relay_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> Result<(), relay_core::Error> {
    relay_core::logging::init("relay_bot")?;

    let cfg = Arc::new(Config::load()?);
    for legacy in cfg.legacy_documents() {
        tracing::warn!(
            path = %legacy.display(),
            "legacy YAML document ignored; re-enter its data with admin commands"
        );
    }
    let stores = Stores::open(&cfg);

    let token = cfg.telegram_bot_token.clone();
    let messenger = Arc::new(TelegramMessenger::from_token(token));
    let bot = messenger.bot();
    let engine = Arc::new(RelayEngine::new(stores, messenger));

    engine
        .startup(&cfg.bootstrap_admins, cfg.startup_notice)
        .await?;
    tracing::info!(
        admins = cfg.bootstrap_admins.len(),
        notice = cfg.startup_notice,
        "stores ready"
    );

    relay_telegram::router::run_polling(bot, cfg, engine)
        .await
        .map_err(|e| relay_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
