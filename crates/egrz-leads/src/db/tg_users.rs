use super::constraints;
use crate::prelude::*;
use crate::util::sqlx_ext::prelude::*;
use crate::Result;
use teloxide::types::ChatId;

pub(crate) struct TgUsersRepo {
    db: sqlx::PgPool,
}

impl TgUsersRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    /// Returns `false` if the user was already registered. Their username
    /// and name are refreshed then.
    #[instrument(skip(self))]
    pub(crate) async fn register(
        &self,
        id: ChatId,
        username: Option<&str>,
        full_name: &str,
    ) -> Result<bool> {
        let inserted = sqlx::query(
            "insert into tg_users (id, username, full_name)
            values ($1, $2, $3)",
        )
        .bind(id.0)
        .bind(username)
        .bind(full_name)
        .execute(&self.db)
        .await;

        match inserted {
            Ok(_) => return Ok(true),
            Err(err) if err.is_constraint_violation(constraints::tg_users_pk) => {}
            Err(err) => return Err(err.into()),
        }

        sqlx::query(
            "update tg_users
            set username = $2, full_name = $3
            where id = $1",
        )
        .bind(id.0)
        .bind(username)
        .bind(full_name)
        .execute(&self.db)
        .await?;

        Ok(false)
    }

    pub(crate) async fn exists(&self, id: ChatId) -> Result<bool> {
        sqlx::query_scalar::<_, bool>("select exists(select 1 from tg_users where id = $1)")
            .bind(id.0)
            .fetch_one(&self.db)
            .await
            .map_err(Into::into)
    }
}
