//! Telegram bot: commands, access control and the outgoing messaging gateway

mod access;
mod cmd;
mod config;
mod error;
mod messaging;

use crate::observability::metrics;
use crate::prelude::*;
use crate::scheduler::Scheduler;
use crate::subscription::Subscriptions;
use crate::{db, Result};
use dptree::di::DependencyMap;
use std::sync::Arc;
use teloxide::adaptors::{CacheMe, Throttle, Trace};
use teloxide::prelude::*;
use teloxide::types::UpdateKind;
use teloxide::utils::command::BotCommands;

pub(crate) use access::AccessTier;
pub(crate) use config::*;
pub(crate) use error::UserError;
pub(crate) use messaging::TgMessaging;

pub(crate) type Bot = Trace<CacheMe<Throttle<teloxide::Bot>>>;

pub(crate) struct Ctx {
    pub(crate) bot: Bot,
    pub(crate) config: Config,
    pub(crate) db: Arc<db::Repo>,
    pub(crate) subscriptions: Subscriptions,
    pub(crate) scheduler: Arc<Scheduler>,
}

pub(crate) fn create_bot(config: &Config) -> Bot {
    teloxide::Bot::new(config.token.clone())
        .throttle(Default::default())
        .cache_me()
        .trace(teloxide::adaptors::trace::Settings::all())
}

fn update_kind(update: &Update) -> &'static str {
    match &update.kind {
        UpdateKind::Message(_) => "message",
        UpdateKind::EditedMessage(_) => "edited_message",
        UpdateKind::CallbackQuery(_) => "callback_query",
        UpdateKind::MyChatMember(_) => "my_chat_member",
        _ => "other",
    }
}

pub(crate) async fn run_bot(ctx: Ctx) -> Result {
    let mut di = DependencyMap::new();

    let bot = ctx.bot.clone();

    di.insert(Arc::new(ctx));

    info!("Starting bot...");

    bot.set_my_commands(cmd::regular::Cmd::bot_commands())
        .await?;

    let handler = dptree::entry()
        .inspect(|update: Update| metrics::tg_update(update_kind(&update)))
        .branch(
            Update::filter_message()
                .filter(cmd::filter_pm_with_bot)
                .filter_command::<cmd::StartCommand>()
                .endpoint(cmd::handle::<cmd::StartCommand>()),
        )
        .branch(
            Update::filter_message()
                .filter(cmd::filter_pm_with_bot)
                .filter_command::<cmd::regular::Cmd>()
                .endpoint(cmd::handle::<cmd::regular::Cmd>()),
        )
        .branch(
            Update::filter_message()
                .filter(cmd::filter_pm_with_bot)
                .filter_command::<cmd::admin::Cmd>()
                .chain(dptree::filter(cmd::admin::filter))
                .endpoint(cmd::handle::<cmd::admin::Cmd>()),
        )
        .inspect(|update: Update| metrics::tg_update_skipped(update_kind(&update)));

    Dispatcher::builder(bot, handler)
        .dependencies(di)
        // We don't handle all possible messages that users send,
        // so to suppress the warning that we don't do this we have
        // a noop default handler here
        .default_handler(|_| std::future::ready(()))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");

    Ok(())
}
