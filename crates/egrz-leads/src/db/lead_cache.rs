use crate::lead_cache::LeadCacheStore;
use crate::registry::ConclusionNumber;
use crate::Result;
use async_trait::async_trait;

pub(crate) struct LeadCacheRepo {
    db: sqlx::PgPool,
}

impl LeadCacheRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LeadCacheStore for LeadCacheRepo {
    async fn get(&self, key: &ConclusionNumber) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(
            "select message from lead_cache where conclusion_number = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.db)
        .await
        .map_err(Into::into)
    }

    async fn put_if_absent(&self, key: &ConclusionNumber, text: &str) -> Result<String> {
        // The no-op update makes `returning` yield the retained row on conflict
        sqlx::query_scalar::<_, String>(
            "insert into lead_cache (conclusion_number, message)
            values ($1, $2)
            on conflict on constraint lead_cache_pk
            do update set message = lead_cache.message
            returning message",
        )
        .bind(key.as_str())
        .bind(text)
        .fetch_one(&self.db)
        .await
        .map_err(Into::into)
    }
}
