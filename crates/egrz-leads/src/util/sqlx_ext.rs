use easy_ext::ext;

pub(crate) mod prelude {
    pub(crate) use super::SqlxErrorExt as _;
}

#[ext(SqlxErrorExt)]
pub(crate) impl sqlx::Error {
    fn is_constraint_violation(&self, constraint: &str) -> bool {
        self.as_database_error()
            .map(|err| err.constraint() == Some(constraint))
            .unwrap_or(false)
    }
}
