use crate::prelude::*;
use crate::scheduler::RunOutcome;
use crate::tg;
use crate::Result;
use async_trait::async_trait;
use itertools::Itertools;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case", description = "Команды администратора:")]
pub(crate) enum Cmd {
    #[command(description = "показать справку для администратора")]
    AdminHelp,

    #[command(description = "открыть доступ пользователю: /allow username")]
    Allow(String),

    #[command(description = "закрыть доступ пользователю: /revoke username")]
    Revoke(String),

    #[command(description = "список пользователей с доступом")]
    Allowed,

    #[command(description = "запустить плановую проверку всех регионов сейчас")]
    RunNow,
}

#[instrument(skip_all, fields(chat = %msg.chat.id))]
pub(crate) fn filter(ctx: Arc<tg::Ctx>, msg: Message) -> bool {
    let is_admin = msg
        .from()
        .and_then(|user| user.username.as_deref())
        .is_some_and(|username| ctx.config.is_admin(username));

    if !is_admin {
        info!("Non-admin user tried to access admin command");
    }

    is_admin
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        match self {
            Cmd::AdminHelp => {
                ctx.bot
                    .reply_text(msg, Cmd::descriptions().to_string())
                    .await?;
            }
            Cmd::Allow(username) => {
                let username = parse_username(&username, "/allow username")?;

                let text = if ctx.db.allowed_usernames.add(&username, msg.chat.id).await? {
                    info!(%username, "Username allowed");
                    format!("Доступ для @{username} открыт")
                } else {
                    format!("У @{username} уже есть доступ")
                };
                ctx.bot.reply_text(msg, text).await?;
            }
            Cmd::Revoke(username) => {
                let username = parse_username(&username, "/revoke username")?;

                let text = if ctx.db.allowed_usernames.remove(&username).await? {
                    info!(%username, "Username revoked");
                    format!("Доступ для @{username} закрыт")
                } else {
                    format!("У @{username} не было доступа")
                };
                ctx.bot.reply_text(msg, text).await?;
            }
            Cmd::Allowed => {
                let allowed = ctx.db.allowed_usernames.list().await?;

                let text = if allowed.is_empty() {
                    "Список доступа пуст".to_owned()
                } else {
                    allowed
                        .iter()
                        .format_with("\n", |entry, f| {
                            f(&format_args!(
                                "@{} (добавлен {})",
                                entry.username,
                                entry.added_at.format("%d.%m.%Y")
                            ))
                        })
                        .to_string()
                };
                ctx.bot.reply_text(msg, text).await?;
            }
            Cmd::RunNow => {
                let text = match ctx.scheduler.run_once().await {
                    RunOutcome::Completed(stats) => format!("Запуск завершён\n\n{stats}"),
                    RunOutcome::SkippedBusy { elapsed } => format!(
                        "Предыдущий запуск ещё выполняется ({} с), этот пропущен",
                        elapsed.as_secs()
                    ),
                    RunOutcome::AggregationFailed(err) => return Err(err),
                };
                ctx.bot.reply_text(msg, text).await?;
            }
        }
        Ok(())
    }
}

fn parse_username(input: &str, usage: &'static str) -> Result<String> {
    let username = crate::db::normalize_username(input);
    if username.is_empty() {
        return Err(err!(tg::UserError::MissingArgument { usage }));
    }
    Ok(username)
}
