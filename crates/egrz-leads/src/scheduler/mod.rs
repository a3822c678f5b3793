//! Periodic ingestion of the registry and the on-demand parse of a single
//! region for a single user.
mod pipeline;
mod run_lock;
mod stats;

pub(crate) use pipeline::RegionPipeline;
pub(crate) use run_lock::RunLock;
pub(crate) use stats::{RegionStats, RunStats};

use crate::observability::metrics;
use crate::prelude::*;
use crate::regions::RegionLabel;
use crate::subscription::Subscriptions;
use crate::Result;
use chrono::prelude::*;
use run_lock::Acquire;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use teloxide::types::ChatId;

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct Config {
    #[serde(default = "default_interval_secs")]
    pub(crate) interval_secs: u64,

    #[serde(default = "default_max_execution_secs")]
    pub(crate) max_execution_secs: u64,

    /// Offset of the timezone that defines "today" for the registry
    #[serde(default = "default_utc_offset_hours")]
    pub(crate) utc_offset_hours: i32,
}

fn default_interval_secs() -> u64 {
    15 * 60
}

fn default_max_execution_secs() -> u64 {
    30 * 60
}

fn default_utc_offset_hours() -> i32 {
    // Moscow
    3
}

/// Source of the calendar date a run fetches the registry for
pub(crate) type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// Current calendar date at the fixed UTC offset
pub(crate) fn local_calendar_date(utc_offset_hours: i32) -> Result<Today> {
    let offset = FixedOffset::east_opt(utc_offset_hours * 60 * 60)
        .fatal_ctx(|| format!("Invalid UTC offset: {utc_offset_hours} hours"))?;

    Ok(Arc::new(move || Utc::now().local_date(offset)))
}

#[derive(Debug)]
pub(crate) enum RunOutcome {
    Completed(RunStats),

    /// Another run holds the lock and isn't stale yet
    SkippedBusy { elapsed: Duration },

    /// The subscriptions couldn't be read at all
    AggregationFailed(crate::Error),
}

pub(crate) struct Scheduler {
    subscriptions: Subscriptions,
    pipeline: RegionPipeline,
    run_lock: Arc<RunLock>,
    today: Today,
    interval: Duration,
}

impl Scheduler {
    pub(crate) fn new(
        config: &Config,
        subscriptions: Subscriptions,
        pipeline: RegionPipeline,
        today: Today,
    ) -> Self {
        Self {
            subscriptions,
            pipeline,
            run_lock: RunLock::new(Duration::from_secs(config.max_execution_secs)),
            today,
            interval: Duration::from_secs(config.interval_secs),
        }
    }

    /// Fires a run every interval. Runs are spawned, so a slow run doesn't
    /// delay the timer and an overlapping fire meets the run lock. Missed
    /// fires are not queued.
    pub(crate) async fn run_loop(self: Arc<Self>) {
        info!(interval = tracing_duration(self.interval), "Starting the scheduler");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.run_once().await;
            });
        }
    }

    pub(crate) async fn run_once(&self) -> RunOutcome {
        let guard = match self.run_lock.try_acquire() {
            Acquire::Acquired(guard) => guard,
            Acquire::Busy { elapsed } => {
                info!(
                    elapsed = tracing_duration(elapsed),
                    "Previous run is still in progress, skipping this one"
                );
                metrics::scheduler_run("skipped_busy");
                return RunOutcome::SkippedBusy { elapsed };
            }
        };

        if guard.overrode_stale() {
            metrics::scheduler_run("stale_override");
        }

        let span = info_span!("scheduled_run", generation = guard.generation());

        let (outcome, duration) = self.run_locked().instrument(span).with_duration().await;

        metrics::scheduler_run_duration(duration);

        // Explicit to make the lock's extent obvious
        drop(guard);

        outcome
    }

    async fn run_locked(&self) -> RunOutcome {
        let map = match self.subscriptions.collect().await {
            Ok(map) => map,
            Err(err) => {
                error!(err = tracing_err(&err), "Failed to collect subscriptions, aborting the run");
                metrics::scheduler_run("aggregation_failed");
                return RunOutcome::AggregationFailed(err);
            }
        };

        let date = (self.today)();
        let mut stats = RunStats::default();

        info!(regions = map.len(), %date, "Starting a run");

        // Sequential to not overwhelm the registry
        for (region, subscribers) in &map {
            let region_stats = self
                .pipeline
                .process_region(region, subscribers, date)
                .await;
            stats.push(region.clone(), region_stats);
        }

        metrics::scheduler_run("completed");
        info!(%stats, "Run finished");

        RunOutcome::Completed(stats)
    }

    /// Processes one region for one user right away, bypassing the run lock.
    /// Always produces a summary for the user, whatever happens.
    pub(crate) async fn parse_now(&self, user: ChatId, region: &RegionLabel) -> String {
        let date = (self.today)();
        let subscribers = HashSet::from([user]);

        let stats = self
            .pipeline
            .process_region(region, &subscribers, date)
            .instrument(info_span!("parse_now", %user))
            .await;

        render_summary(region, date, &stats)
    }
}

fn render_summary(region: &RegionLabel, date: NaiveDate, stats: &RegionStats) -> String {
    let date = date.format("%d.%m.%Y");

    if stats.fetch_failed {
        return format!(
            "Не удалось получить данные реестра ЕГРЗ по региону {region} за {date}. \
            Попробуйте позже, регион будет проверен при следующем плановом запуске."
        );
    }

    if stats.records_seen == 0 {
        return format!("За {date} новых заключений по региону {region} нет.");
    }

    let RegionStats {
        fetch_failed: _,
        records_seen,
        skipped_irrelevant,
        already_delivered,
        processed: _,
        errored,
        sent,
        send_failures,
    } = stats;

    let mut summary = format!(
        "Регион {region}, {date}\n\
        Найдено заключений: {records_seen}\n\
        Отправлено уведомлений: {sent}\n\
        Уже были отправлены ранее: {already_delivered}\n\
        Без подрядчика (не требуется): {skipped_irrelevant}"
    );

    if *errored > 0 || *send_failures > 0 {
        summary.push_str(&format!(
            "\nНе удалось обработать: {}",
            errored + send_failures
        ));
    }

    summary
}

#[cfg(test)]
mod tests;
