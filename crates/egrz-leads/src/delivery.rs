//! Facts of notifications delivered to users, the only signal used
//! to avoid sending the same record to the same user twice.
use crate::prelude::*;
use crate::registry::ConclusionNumber;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use teloxide::types::ChatId;

#[async_trait]
pub(crate) trait DeliveryStore: Send + Sync {
    /// Pairs from the cross product of `users` and `numbers` that were
    /// already delivered. Must be a single query, not one per pair.
    async fn sent_pairs(
        &self,
        users: &[ChatId],
        numbers: &[ConclusionNumber],
    ) -> Result<HashSet<(ChatId, ConclusionNumber)>>;

    /// Recording the same pair twice is not an error.
    async fn record(&self, user: ChatId, number: &ConclusionNumber) -> Result;
}

#[derive(Clone)]
pub(crate) struct DeliveryTracker {
    store: Arc<dyn DeliveryStore>,
}

impl DeliveryTracker {
    pub(crate) fn new(store: Arc<dyn DeliveryStore>) -> Self {
        Self { store }
    }

    #[cfg(test)]
    pub(crate) async fn already_sent(&self, user: ChatId, number: &ConclusionNumber) -> Result<bool> {
        let pairs = self
            .store
            .sent_pairs(&[user], std::slice::from_ref(number))
            .await?;
        Ok(!pairs.is_empty())
    }

    pub(crate) async fn already_sent_bulk(
        &self,
        users: &HashSet<ChatId>,
        numbers: &HashSet<ConclusionNumber>,
    ) -> Result<HashSet<(ChatId, ConclusionNumber)>> {
        if users.is_empty() || numbers.is_empty() {
            return Ok(HashSet::new());
        }

        let users: Vec<_> = users.iter().copied().collect();
        let numbers: Vec<_> = numbers.iter().cloned().collect();

        let pairs = self.store.sent_pairs(&users, &numbers).await?;

        trace!(
            users = users.len(),
            numbers = numbers.len(),
            sent = pairs.len(),
            "Checked delivery facts"
        );

        Ok(pairs)
    }

    pub(crate) async fn record(&self, user: ChatId, number: &ConclusionNumber) -> Result {
        self.store.record(user, number).await
    }
}
