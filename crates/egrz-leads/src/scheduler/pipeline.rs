use super::stats::RegionStats;
use crate::delivery::DeliveryTracker;
use crate::enrichment::{self, Enricher};
use crate::lead_cache::LeadCache;
use crate::messaging::{DeliveryError, MessagingGateway};
use crate::observability::metrics;
use crate::prelude::*;
use crate::regions::RegionLabel;
use crate::registry::{ConclusionNumber, RawRecord, RegistrySource};
use chrono::NaiveDate;
use futures::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use teloxide::types::ChatId;

/// Per-region part of a run shared by the scheduled runs and the
/// immediate parse: fetch, filter, dedup, enrich, send, record.
pub(crate) struct RegionPipeline {
    pub(crate) registry: Arc<dyn RegistrySource>,
    pub(crate) lead_cache: LeadCache,
    pub(crate) enricher: Enricher,
    pub(crate) delivery: DeliveryTracker,
    pub(crate) messaging: Arc<dyn MessagingGateway>,
}

enum SendOutcome {
    Sent,
    Failed,
}

impl RegionPipeline {
    /// Never fails, all failures are isolated and reflected in the stats.
    pub(crate) async fn process_region(
        &self,
        region: &RegionLabel,
        subscribers: &HashSet<ChatId>,
        date: NaiveDate,
    ) -> RegionStats {
        let span = info_span!("process_region", region = %region, %date);
        self.process_region_imp(region, subscribers, date)
            .instrument(span)
            .await
    }

    async fn process_region_imp(
        &self,
        region: &RegionLabel,
        subscribers: &HashSet<ChatId>,
        date: NaiveDate,
    ) -> RegionStats {
        let mut stats = RegionStats::default();

        let records = match self.registry.fetch(region, date).await {
            Ok(records) => records,
            Err(err) => {
                error!(err = tracing_err(&err), "Failed to fetch the region, skipping it");
                stats.fetch_failed = true;
                return stats;
            }
        };

        stats.records_seen = records.len();

        let mut seen_numbers = HashSet::new();
        let records: Vec<_> = records
            .into_iter()
            .filter(|record| {
                if enrichment::is_irrelevant(record) {
                    stats.skipped_irrelevant += 1;
                    return false;
                }
                // The export may repeat a row, it's the same record then
                if !seen_numbers.insert(record.conclusion_number.clone()) {
                    stats.already_delivered += 1;
                    return false;
                }
                true
            })
            .collect();

        metrics::registry_records("irrelevant", stats.skipped_irrelevant);

        if records.is_empty() {
            info!(%stats, "Region processed");
            return stats;
        }

        let delivered = match self
            .delivery
            .already_sent_bulk(subscribers, &seen_numbers)
            .await
        {
            Ok(delivered) => delivered,
            Err(err) => {
                error!(
                    err = tracing_err(&err),
                    "Failed to check delivery facts, skipping the region"
                );
                stats.errored = records.len();
                metrics::registry_records("errored", stats.errored);
                return stats;
            }
        };

        for record in &records {
            let pending: Vec<_> = subscribers
                .iter()
                .copied()
                .filter(|&user| !delivered.contains(&(user, record.conclusion_number.clone())))
                .collect();

            let span = info_span!(
                "process_record",
                conclusion_number = %record.conclusion_number,
                pending = pending.len(),
            );

            self.process_record(region, record, &pending, &mut stats)
                .instrument(span)
                .await;
        }

        metrics::registry_records("already_delivered", stats.already_delivered);
        metrics::registry_records("processed", stats.processed);
        metrics::registry_records("errored", stats.errored);

        info!(%stats, "Region processed");

        stats
    }

    async fn process_record(
        &self,
        region: &RegionLabel,
        record: &RawRecord,
        pending: &[ChatId],
        stats: &mut RegionStats,
    ) {
        if pending.is_empty() {
            trace!("Every subscriber has already received the record");
            stats.already_delivered += 1;
            return;
        }

        let text = self
            .lead_cache
            .get_or_compute(&record.conclusion_number, || {
                self.enricher.enrich(record, region).map(Some)
            })
            .await;

        let text = match text {
            Ok(Some(text)) => text,
            Ok(None) => {
                warn!("No notification text could be produced for the record");
                stats.errored += 1;
                return;
            }
            Err(err) => {
                error!(err = tracing_err(&err), "Failed to resolve the notification text");
                stats.errored += 1;
                return;
            }
        };

        stats.processed += 1;

        // Sends to different chats are independent, one failure doesn't
        // cancel the others
        let outcomes = future::join_all(
            pending
                .iter()
                .map(|&user| self.send(user, &record.conclusion_number, &text)),
        )
        .await;

        for outcome in outcomes {
            match outcome {
                SendOutcome::Sent => stats.sent += 1,
                SendOutcome::Failed => stats.send_failures += 1,
            }
        }
    }

    async fn send(&self, user: ChatId, number: &ConclusionNumber, text: &str) -> SendOutcome {
        if let Err(err) = self.messaging.send_text(user, text, None).await {
            match &err {
                DeliveryError::RecipientUnavailable { .. } => {
                    metrics::notification("recipient_unavailable");
                    info!(err = tracing_err(&err), %user, "Recipient is unavailable");
                }
                DeliveryError::Transient { .. } => {
                    metrics::notification("failed");
                    warn!(err = tracing_err(&err), %user, "Failed to send the notification");
                }
            }
            return SendOutcome::Failed;
        }

        metrics::notification("sent");

        // The user has the message already. If recording fails, the worst
        // outcome is a duplicate on the next run.
        if let Err(err) = self.delivery.record(user, number).await {
            error!(err = tracing_err(&err), %user, "Failed to record the delivery");
        }

        SendOutcome::Sent
    }
}
