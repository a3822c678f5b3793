use crate::db;
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    pub(crate) token: String,

    /// Usernames of the users with full access to the bot.
    /// Comma-separated, the leading `@` is optional.
    #[serde(default)]
    pub(crate) admins: Vec<String>,
}

impl Config {
    pub(crate) fn is_admin(&self, username: &str) -> bool {
        let username = db::normalize_username(username);
        self.admins
            .iter()
            .any(|admin| db::normalize_username(admin) == username)
    }
}
