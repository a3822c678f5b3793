pub(crate) mod admin;
pub(crate) mod regular;

use crate::prelude::*;
use crate::regions::{self, RegionLabel};
use crate::tg::{self, AccessTier, UserError};
use crate::util::DynResult;
use crate::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use teloxide::types::{Message, User};
use teloxide::utils::command::BotCommands;

#[async_trait]
pub(crate) trait Command: fmt::Debug + Send + Sync + 'static {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result;
}

pub(crate) fn handle<'a, C: Command>(
) -> impl Fn(Arc<tg::Ctx>, Message, C) -> BoxFuture<'a, DynResult> {
    move |ctx, msg, cmd| {
        let info = info_span!(
            "handle_message",
            sender = msg.from().map(User::debug_id).as_deref(),
            chat = %msg.chat.id,
            cmd = format_args!("{cmd:?}")
        );

        let fut = async move {
            debug!("Processing command");

            let result = cmd.handle(&ctx, &msg).await;
            if let Err(err) = &result {
                let span = warn_span!("err", err = tracing_err(err), id = err.id());
                async {
                    let reply = if err.is_user_error() {
                        format!("{}\n\nid ошибки: {}", err.kind(), err.id())
                    } else {
                        warn!("Command handler returned an error");
                        format!(
                            "Произошла внутренняя ошибка, попробуйте позже.\n\nid ошибки: {}",
                            err.id()
                        )
                    };

                    if let Err(err) = ctx.bot.reply_text(&msg, reply).await {
                        warn!(
                            err = tracing_err(&err),
                            "Failed to reply with the error message to the user"
                        );
                    }
                }
                .instrument(span)
                .await;
            }
            result.map_err(Into::into)
        };

        Box::pin(fut.instrument(info))
    }
}

/// Special case for the `/start` command in PM with the bot.
///
/// We don't want this command to appear in the help message, so we handle
/// it separately
#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case")]
pub(crate) enum StartCommand {
    #[command(description = "unreachable")]
    Start,
}

#[async_trait]
impl Command for StartCommand {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let user = msg.from().ok_or_else(|| err!(UserError::UnknownSender))?;

        let is_new = ctx
            .db
            .tg_users
            .register(msg.chat.id, user.username.as_deref(), &user.full_name())
            .await?;

        if is_new {
            info!(user = %user.debug_id(), "New user registered");
        }

        regular::Cmd::Help.handle(ctx, msg).await
    }
}

pub(crate) fn filter_pm_with_bot(msg: Message) -> bool {
    msg.chat.is_private()
}

/// Renders the guide for the commands available at the given tier
pub(crate) fn help_text(tier: AccessTier, username: Option<&str>) -> String {
    let mut text = format!(
        "Бот присылает уведомления о новых заключениях экспертизы из реестра ЕГРЗ \
        по регионам, на которые вы подписаны.\n\n\
        Ваш уровень доступа: {tier}\n\n{}",
        regular::Cmd::descriptions()
    );

    if tier < AccessTier::Activated {
        let username = username
            .map(|username| format!("@{username}"))
            .unwrap_or_else(|| "(не задан, укажите его в настройках Telegram)".to_owned());

        text.push_str(&format!(
            "\n\nЧтобы подписываться на регионы, попросите администратора \
            открыть доступ для вашего username: {username}"
        ));
    }

    if tier == AccessTier::Admin {
        text.push_str(&format!("\n\n{}", admin::Cmd::descriptions()));
    }

    text
}

/// Resolves the region argument of a command
pub(crate) fn parse_region(query: &str, usage: &'static str) -> Result<RegionLabel> {
    let query = query.trim();
    if query.is_empty() {
        return Err(err!(UserError::MissingArgument { usage }));
    }

    regions::find(query).ok_or_else(|| {
        err!(UserError::UnknownRegion {
            query: query.to_owned()
        })
    })
}
