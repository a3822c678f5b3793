use crate::prelude::*;
use crate::subscription::{StoredSubscription, SubscriptionStore};
use crate::Result;
use async_trait::async_trait;
use futures::prelude::*;
use teloxide::types::ChatId;

pub(crate) struct SubscriptionsRepo {
    db: sqlx::PgPool,
}

impl SubscriptionsRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubscriptionStore for SubscriptionsRepo {
    async fn read_all(&self) -> Result<Vec<StoredSubscription>> {
        sqlx::query_as::<_, (i64, String)>("select user_id, regions from subscriptions")
            .fetch(&self.db)
            .map_ok(|(user_id, regions)| StoredSubscription {
                user_id: ChatId(user_id),
                regions,
            })
            .try_collect()
            .err_into()
            .await
    }

    async fn read(&self, user_id: ChatId) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("select regions from subscriptions where user_id = $1")
            .bind(user_id.0)
            .fetch_optional(&self.db)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self))]
    async fn write(&self, user_id: ChatId, regions: String) -> Result {
        sqlx::query(
            "insert into subscriptions (user_id, regions)
            values ($1, $2)
            on conflict on constraint subscriptions_pk
            do update set regions = excluded.regions, updated_at = now()",
        )
        .bind(user_id.0)
        .bind(regions)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
