use crate::messaging::{DeliveryError, MessagingGateway};
use crate::prelude::*;
use crate::tg::Bot;
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup};
use teloxide::{ApiError, RequestError};

/// Hard limit of the Telegram Bot API on the message text length
const MAX_MESSAGE_CHARS: usize = 4096;

pub(crate) struct TgMessaging {
    bot: Bot,
}

impl TgMessaging {
    pub(crate) fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessagingGateway for TgMessaging {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), DeliveryError> {
        let mut request = self
            .bot
            .send_message(chat_id, text.truncate_chars(MAX_MESSAGE_CHARS))
            .disable_web_page_preview(true);

        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }

        request
            .await
            .map(drop)
            .map_err(|source| classify(chat_id, source))
    }
}

fn classify(chat_id: ChatId, source: RequestError) -> DeliveryError {
    let unavailable = matches!(
        &source,
        RequestError::Api(
            ApiError::BotBlocked
                | ApiError::BotKicked
                | ApiError::BotKickedFromSupergroup
                | ApiError::UserDeactivated
                | ApiError::ChatNotFound
                | ApiError::CantInitiateConversation
        )
    );

    if unavailable {
        DeliveryError::RecipientUnavailable { chat_id, source }
    } else {
        DeliveryError::Transient { chat_id, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn classifies_send_failures() {
        let chat_id = ChatId(42);

        let err = classify(chat_id, RequestError::Api(ApiError::BotBlocked));
        assert_matches!(err, DeliveryError::RecipientUnavailable { .. });

        let err = classify(chat_id, RequestError::Api(ApiError::UserDeactivated));
        assert_matches!(err, DeliveryError::RecipientUnavailable { .. });

        let err = classify(
            chat_id,
            RequestError::Api(ApiError::Unknown("Bad Gateway".to_owned())),
        );
        assert_matches!(err, DeliveryError::Transient { .. });
    }
}
