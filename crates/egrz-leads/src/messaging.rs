use async_trait::async_trait;
use teloxide::types::{ChatId, InlineKeyboardMarkup};

#[derive(Debug, thiserror::Error)]
pub(crate) enum DeliveryError {
    /// The user blocked the bot, deleted the account or the chat is gone.
    /// Retrying is pointless.
    #[error("Recipient {chat_id} is unavailable")]
    RecipientUnavailable {
        chat_id: ChatId,
        source: teloxide::RequestError,
    },

    #[error("Failed to send a message to {chat_id}")]
    Transient {
        chat_id: ChatId,
        source: teloxide::RequestError,
    },
}

/// Outgoing side of the chat transport.
#[async_trait]
pub(crate) trait MessagingGateway: Send + Sync {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), DeliveryError>;
}
