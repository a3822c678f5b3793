mod requester;

use easy_ext::ext;
use teloxide::types::User;

pub(crate) mod prelude {
    pub(crate) use super::requester::UtilRequesterExt as _;
    pub(crate) use super::UserExt as _;
}

#[ext(UserExt)]
pub(crate) impl User {
    fn username_or_full_name(&self) -> String {
        self.username.clone().unwrap_or_else(|| self.full_name())
    }

    fn debug_id(&self) -> String {
        format!("{} ({})", self.username_or_full_name(), self.id)
    }
}
