use super::constraints;
use crate::prelude::*;
use crate::util::sqlx_ext::prelude::*;
use crate::Result;
use chrono::prelude::*;
use teloxide::types::ChatId;

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct AllowedUsername {
    pub(crate) username: String,
    pub(crate) added_at: DateTime<Utc>,
}

/// Usernames are stored lower-cased without the leading `@`
pub(crate) fn normalize_username(username: &str) -> String {
    username.trim().trim_start_matches('@').to_lowercase()
}

pub(crate) struct AllowedUsernamesRepo {
    db: sqlx::PgPool,
}

impl AllowedUsernamesRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }

    /// Returns `false` if the username is already in the list
    #[instrument(skip(self))]
    pub(crate) async fn add(&self, username: &str, added_by: ChatId) -> Result<bool> {
        let result = sqlx::query(
            "insert into allowed_usernames (username, added_by)
            values ($1, $2)",
        )
        .bind(normalize_username(username))
        .bind(added_by.0)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) if err.is_constraint_violation(constraints::allowed_usernames_pk) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns `false` if there was no such username
    #[instrument(skip(self))]
    pub(crate) async fn remove(&self, username: &str) -> Result<bool> {
        let affected = sqlx::query("delete from allowed_usernames where username = $1")
            .bind(normalize_username(username))
            .execute(&self.db)
            .await?
            .rows_affected();

        Ok(affected > 0)
    }

    pub(crate) async fn contains(&self, username: &str) -> Result<bool> {
        sqlx::query_scalar::<_, bool>(
            "select exists(select 1 from allowed_usernames where username = $1)",
        )
        .bind(normalize_username(username))
        .fetch_one(&self.db)
        .await
        .map_err(Into::into)
    }

    pub(crate) async fn list(&self) -> Result<Vec<AllowedUsername>> {
        sqlx::query_as::<_, AllowedUsername>(
            "select username, added_at
            from allowed_usernames
            order by username",
        )
        .fetch_all(&self.db)
        .await
        .map_err(Into::into)
    }
}
