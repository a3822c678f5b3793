use crate::delivery::DeliveryStore;
use crate::registry::ConclusionNumber;
use crate::Result;
use async_trait::async_trait;
use futures::prelude::*;
use std::collections::HashSet;
use teloxide::types::ChatId;

pub(crate) struct DeliveryFactsRepo {
    db: sqlx::PgPool,
}

impl DeliveryFactsRepo {
    pub(crate) fn new(db: sqlx::PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeliveryStore for DeliveryFactsRepo {
    async fn sent_pairs(
        &self,
        users: &[ChatId],
        numbers: &[ConclusionNumber],
    ) -> Result<HashSet<(ChatId, ConclusionNumber)>> {
        let users: Vec<i64> = users.iter().map(|user| user.0).collect();
        let numbers: Vec<String> = numbers
            .iter()
            .map(|number| number.as_str().to_owned())
            .collect();

        sqlx::query_as::<_, (i64, String)>(
            "select user_id, conclusion_number
            from delivery_facts
            where user_id = any($1) and conclusion_number = any($2)",
        )
        .bind(users)
        .bind(numbers)
        .fetch(&self.db)
        .map_ok(|(user_id, number)| (ChatId(user_id), ConclusionNumber::new(number)))
        .try_collect()
        .err_into()
        .await
    }

    async fn record(&self, user: ChatId, number: &ConclusionNumber) -> Result {
        sqlx::query(
            "insert into delivery_facts (user_id, conclusion_number)
            values ($1, $2)
            on conflict on constraint delivery_facts_pk do nothing",
        )
        .bind(user.0)
        .bind(number.as_str())
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
