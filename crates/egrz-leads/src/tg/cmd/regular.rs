use crate::prelude::*;
use crate::regions;
use crate::tg::{self, AccessTier};
use crate::Result;
use async_trait::async_trait;
use itertools::Itertools;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "snake_case", description = "Команды:")]
pub(crate) enum Cmd {
    #[command(description = "показать справку")]
    Help,

    #[command(description = "список регионов")]
    Regions,

    #[command(description = "мои подписки")]
    MyRegions,

    #[command(description = "подписаться на регион по коду или названию: /subscribe 78")]
    Subscribe(String),

    #[command(description = "отписаться от региона: /unsubscribe 78")]
    Unsubscribe(String),

    #[command(description = "проверить регион за сегодня прямо сейчас: /parse 78")]
    Parse(String),
}

#[async_trait]
impl tg::cmd::Command for Cmd {
    async fn handle(self, ctx: &tg::Ctx, msg: &Message) -> Result {
        let user_id = msg.chat.id;

        let required = match &self {
            Cmd::Help => AccessTier::Unknown,
            _ => AccessTier::Activated,
        };

        let tier = AccessTier::require(ctx, msg, required).await?;

        match self {
            Cmd::Help => {
                let username = msg.from().and_then(|user| user.username.as_deref());
                let text = tg::cmd::help_text(tier, username);
                ctx.bot.reply_text(msg, text).await?;
            }
            Cmd::Regions => {
                let text = regions::catalog().join("\n");
                ctx.bot.reply_text(msg, text).await?;
            }
            Cmd::MyRegions => {
                let regions = ctx.subscriptions.regions_of(user_id).await?;
                let text = if regions.is_empty() {
                    "Вы не подписаны ни на один регион. Подписаться: /subscribe 78".to_owned()
                } else {
                    format!("Ваши регионы:\n{}", regions.iter().join("\n"))
                };
                ctx.bot.reply_text(msg, text).await?;
            }
            Cmd::Subscribe(query) => {
                let region = tg::cmd::parse_region(&query, "/subscribe 78")?;

                if !ctx.subscriptions.add(user_id, region.clone()).await? {
                    let text = format!("Вы уже подписаны на регион {region}");
                    ctx.bot.reply_text(msg, text).await?;
                    return Ok(());
                }

                info!(%region, "User subscribed");

                let text = format!(
                    "Вы подписались на регион {region}. Проверяю заключения за сегодня..."
                );
                ctx.bot.reply_text(msg, text).await?;

                let summary = ctx.scheduler.parse_now(user_id, &region).await;
                ctx.bot.send_message(user_id, summary).await?;
            }
            Cmd::Unsubscribe(query) => {
                let region = tg::cmd::parse_region(&query, "/unsubscribe 78")?;

                let text = if ctx.subscriptions.remove(user_id, &region).await? {
                    info!(%region, "User unsubscribed");
                    format!("Вы отписались от региона {region}")
                } else {
                    format!("Вы не были подписаны на регион {region}")
                };
                ctx.bot.reply_text(msg, text).await?;
            }
            Cmd::Parse(query) => {
                let region = tg::cmd::parse_region(&query, "/parse 78")?;

                let summary = ctx.scheduler.parse_now(user_id, &region).await;
                ctx.bot.reply_text(msg, summary).await?;
            }
        }
        Ok(())
    }
}
