use crate::prelude::*;
use crate::tg::{self, UserError};
use crate::Result;
use std::fmt;
use teloxide::types::Message;

/// What the user is allowed to do with the bot. Variants are declared in
/// the ascending order of privileges, so the derived ordering is the
/// precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum AccessTier {
    /// Never pressed `/start`
    Unknown,

    Registered,

    /// Whitelisted by an admin
    Activated,

    Admin,
}

impl AccessTier {
    pub(crate) fn from_facts(is_admin: bool, is_whitelisted: bool, is_registered: bool) -> Self {
        if is_admin {
            Self::Admin
        } else if is_whitelisted {
            Self::Activated
        } else if is_registered {
            Self::Registered
        } else {
            Self::Unknown
        }
    }

    #[instrument(skip_all, fields(chat = %msg.chat.id, tier))]
    pub(crate) async fn of_sender(ctx: &tg::Ctx, msg: &Message) -> Result<Self> {
        let username = msg.from().and_then(|user| user.username.as_deref());

        let is_admin = username.is_some_and(|username| ctx.config.is_admin(username));

        let is_whitelisted = match username {
            Some(username) if !is_admin => ctx.db.allowed_usernames.contains(username).await?,
            _ => false,
        };

        let is_registered = ctx.db.tg_users.exists(msg.chat.id).await?;

        let tier = Self::from_facts(is_admin, is_whitelisted, is_registered);

        tracing::Span::current().record("tier", tracing::field::debug(tier));

        Ok(tier)
    }

    /// Fails with a user error if the sender's tier is below `required`
    pub(crate) async fn require(ctx: &tg::Ctx, msg: &Message, required: Self) -> Result<Self> {
        let actual = Self::of_sender(ctx, msg).await?;
        if actual < required {
            info!(?actual, ?required, "Access denied");
            return Err(err!(UserError::AccessDenied { required }));
        }
        Ok(actual)
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "не зарегистрирован",
            Self::Registered => "зарегистрирован",
            Self::Activated => "активирован",
            Self::Admin => "администратор",
        };
        f.write_str(name)
    }
}
