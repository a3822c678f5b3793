use crate::tg::AccessTier;

/// Mistakes in the chat input. These are replied to the user as is.
#[derive(Debug, thiserror::Error)]
pub(crate) enum UserError {
    #[error(
        "Команда недоступна (нужен уровень доступа: {required}). \
        Обратитесь к администратору, чтобы получить доступ."
    )]
    AccessDenied { required: AccessTier },

    #[error("Регион «{query}» не найден. Список регионов: /regions")]
    UnknownRegion { query: String },

    #[error("Не хватает аргумента. Пример: {usage}")]
    MissingArgument { usage: &'static str },

    #[error("Не удалось определить отправителя сообщения")]
    UnknownSender,
}
