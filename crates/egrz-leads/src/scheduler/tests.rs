use super::*;
use crate::delivery::DeliveryTracker;
use crate::enrichment::Enricher;
use crate::lead_cache::LeadCache;
use crate::registry::ConclusionNumber;
use crate::testing::{
    config_llm, enriched_text, record, FakeCompletion, FakeMessenger, FakeRegistry, MemoryStore,
};
use assert_matches::assert_matches;
use expect_test::expect;

const SPB: &str = r#"["Санкт-Петербург - 78"]"#;

struct Harness {
    store: Arc<MemoryStore>,
    registry: Arc<FakeRegistry>,
    completion: Arc<FakeCompletion>,
    messenger: Arc<FakeMessenger>,
    scheduler: Arc<Scheduler>,
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
}

fn spb() -> RegionLabel {
    RegionLabel::new("Санкт-Петербург", 78)
}

fn msk() -> RegionLabel {
    RegionLabel::new("Москва", 77)
}

fn config() -> Config {
    Config {
        interval_secs: 15 * 60,
        max_execution_secs: 30 * 60,
        utc_offset_hours: 3,
    }
}

impl Harness {
    fn new() -> Self {
        Self::with_registry(FakeRegistry::default())
    }

    fn with_registry(registry: FakeRegistry) -> Self {
        let store = Arc::new(MemoryStore::default());
        let registry = Arc::new(registry);
        let completion = Arc::new(FakeCompletion::default());
        let messenger = Arc::new(FakeMessenger::default());

        let pipeline = RegionPipeline {
            registry: registry.clone(),
            lead_cache: LeadCache::new(store.clone()),
            enricher: Enricher::new(completion.clone(), None, &config_llm()),
            delivery: DeliveryTracker::new(store.clone()),
            messaging: messenger.clone(),
        };

        let scheduler = Scheduler::new(
            &config(),
            Subscriptions::new(store.clone()),
            pipeline,
            Arc::new(date),
        );

        Self {
            store,
            registry,
            completion,
            messenger,
            scheduler: Arc::new(scheduler),
        }
    }

    async fn run(&self) -> RunStats {
        assert_matches!(self.scheduler.run_once().await, RunOutcome::Completed(stats) => stats)
    }
}

#[test_log::test(tokio::test)]
async fn two_subscribers_get_identical_text() {
    let h = Harness::new();
    h.store.put_subscription(ChatId(1), SPB);
    h.store.put_subscription(ChatId(2), SPB);
    h.registry.set_records(78, vec![record("X", "ООО Ромашка")]);

    let stats = h.run().await;

    let expected = enriched_text("ООО Ромашка");
    assert_eq!(h.messenger.sent_to(ChatId(1)), [expected.clone()]);
    assert_eq!(h.messenger.sent_to(ChatId(2)), [expected]);
    assert_eq!(h.store.delivery_facts().len(), 2);
    assert_eq!(h.store.cache_writes(), 1);
    assert_eq!(h.completion.calls(), 1);

    let region = stats.region(&spb()).unwrap();
    assert_eq!(region.processed, 1);
    assert_eq!(region.sent, 2);
    assert_eq!(h.registry.fetches(), [(spb(), date())]);
}

#[test_log::test(tokio::test)]
async fn already_delivered_user_is_skipped() {
    let h = Harness::new();
    h.store.put_subscription(ChatId(1), SPB);
    h.store.put_subscription(ChatId(2), SPB);
    h.store.put_delivery(ChatId(1), "X");
    h.registry.set_records(78, vec![record("X", "ООО Ромашка")]);

    h.run().await;

    assert_eq!(h.messenger.sent_to(ChatId(1)), Vec::<String>::new());
    assert_eq!(h.messenger.sent_to(ChatId(2)).len(), 1);
    assert!(h
        .store
        .delivery_facts()
        .contains(&(ChatId(2), ConclusionNumber::new("X"))));
    assert_eq!(h.store.delivery_facts().len(), 2);
}

#[test_log::test(tokio::test)]
async fn record_delivered_to_everyone_is_not_enriched() {
    let h = Harness::new();
    h.store.put_subscription(ChatId(1), SPB);
    h.store.put_delivery(ChatId(1), "X");
    h.registry.set_records(78, vec![record("X", "ООО Ромашка")]);

    let stats = h.run().await;

    assert_eq!(h.completion.calls(), 0);
    assert_eq!(stats.region(&spb()).unwrap().already_delivered, 1);
}

#[test_log::test(tokio::test)]
async fn failed_region_does_not_block_others() {
    let h = Harness::new();
    h.store.put_subscription(ChatId(1), r#"["Санкт-Петербург - 78", "Москва - 77"]"#);
    h.registry.fail(78);
    h.registry.set_records(77, vec![record("M", "АО Лютик")]);

    let stats = h.run().await;

    assert_eq!(stats.failed_regions(), 1);
    assert!(stats.region(&spb()).unwrap().fetch_failed);
    assert_eq!(stats.region(&spb()).unwrap().processed, 0);
    assert_eq!(stats.region(&msk()).unwrap().processed, 1);
    assert_eq!(h.messenger.sent().len(), 1);
}

#[test_log::test(tokio::test)]
async fn irrelevant_records_are_never_sent() {
    let h = Harness::new();
    h.store.put_subscription(ChatId(1), SPB);
    h.registry.set_records(
        78,
        vec![record("X", " НЕ ТРЕБУЕТСЯ "), record("Y", "ООО Ромашка")],
    );

    let stats = h.run().await;
    let region = stats.region(&spb()).unwrap();

    assert_eq!(region.skipped_irrelevant, 1);
    assert_eq!(region.errored, 0);
    assert_eq!(region.processed, 1);
    assert_eq!(h.messenger.sent().len(), 1);
    assert!(!h
        .store
        .delivery_facts()
        .contains(&(ChatId(1), ConclusionNumber::new("X"))));
}

#[test_log::test(tokio::test)]
async fn rerun_over_unchanged_data_is_idempotent() {
    let h = Harness::new();
    h.store.put_subscription(ChatId(1), SPB);
    h.store.put_subscription(ChatId(2), r#"["Санкт-Петербург - 78", "Москва - 77"]"#);
    h.registry.set_records(78, vec![record("X", "ООО Ромашка"), record("Y", "АО Лютик")]);
    h.registry.set_records(77, vec![record("M", "ООО Василек")]);

    h.run().await;

    let sent = h.messenger.sent().len();
    let cache_writes = h.store.cache_writes();
    let completions = h.completion.calls();
    assert_eq!(sent, 5);

    let stats = h.run().await;

    assert_eq!(h.messenger.sent().len(), sent);
    assert_eq!(h.store.cache_writes(), cache_writes);
    assert_eq!(h.completion.calls(), completions);
    assert_eq!(stats.totals().sent, 0);
    assert_eq!(stats.totals().already_delivered, 3);
}

#[test_log::test(tokio::test)]
async fn unavailable_recipient_is_not_recorded() {
    let h = Harness::new();
    h.store.put_subscription(ChatId(1), SPB);
    h.store.put_subscription(ChatId(2), SPB);
    h.store.put_subscription(ChatId(3), SPB);
    h.messenger.block(ChatId(1));
    h.messenger.make_flaky(ChatId(3));
    h.registry.set_records(78, vec![record("X", "ООО Ромашка")]);

    let stats = h.run().await;

    let region = stats.region(&spb()).unwrap();
    assert_eq!(region.sent, 1);
    assert_eq!(region.send_failures, 2);
    assert_eq!(
        h.store.delivery_facts(),
        HashSet::from([(ChatId(2), ConclusionNumber::new("X"))])
    );
}

#[test_log::test(tokio::test)]
async fn fallback_text_is_sent_but_not_cached() {
    let h = Harness::new();
    h.store.put_subscription(ChatId(1), SPB);
    h.completion.push_err(crate::enrichment::LlmError::QuotaExhausted);
    h.registry.set_records(78, vec![record("X", "ООО Ромашка")]);

    h.run().await;

    expect![[r#"
        [
            (
                ChatId(
                    1,
                ),
                "Новое заключение экспертизы\nДата заключения: 05.03.2024\nРегион: Санкт-Петербург - 78\nНомер заключения экспертизы: X\nЗастройщик: ООО Ромашка",
            ),
        ]
    "#]]
    .assert_debug_eq(&h.messenger.sent());
    assert_eq!(h.store.cache_writes(), 0);
}

#[test_log::test(tokio::test)]
async fn failing_cache_does_not_block_delivery() {
    let h = Harness::new();
    h.store.put_subscription(ChatId(1), SPB);
    h.store.fail_cache();
    h.registry.set_records(78, vec![record("X", "ООО Ромашка")]);

    let stats = h.run().await;

    assert_eq!(h.messenger.sent_to(ChatId(1)), [enriched_text("ООО Ромашка")]);
    assert_eq!(h.completion.calls(), 1);
    assert_eq!(h.store.delivery_facts().len(), 1);

    let region = stats.region(&spb()).unwrap();
    assert_eq!(region.processed, 1);
    assert_eq!(region.errored, 0);
    assert_eq!(region.sent, 1);
}

#[test_log::test(tokio::test)]
async fn aggregation_failure_ends_the_run_and_releases_the_lock() {
    let h = Harness::new();
    h.store.fail_subscription_reads();

    assert_matches!(h.scheduler.run_once().await, RunOutcome::AggregationFailed(_));
    assert!(!h.scheduler.run_lock.is_running());
    assert!(h.registry.fetches().is_empty());
}

#[test_log::test(tokio::test)]
async fn no_subscriptions_is_a_no_op() {
    let h = Harness::new();

    let stats = h.run().await;

    assert_eq!(stats, RunStats::default());
    assert!(h.registry.fetches().is_empty());
}

async fn wait_for_fetches(registry: &FakeRegistry, count: usize) {
    while registry.fetches().len() < count {
        tokio::task::yield_now().await;
    }
}

#[test_log::test(tokio::test)]
async fn overlapping_fire_is_skipped() {
    let (registry, gate) = FakeRegistry::gated();
    let h = Harness::with_registry(registry);
    h.store.put_subscription(ChatId(1), SPB);

    let scheduler = h.scheduler.clone();
    let first = tokio::spawn(async move { scheduler.run_once().await });

    wait_for_fetches(&h.registry, 1).await;

    assert_matches!(h.scheduler.run_once().await, RunOutcome::SkippedBusy { .. });

    gate.add_permits(1);
    assert_matches!(first.await.unwrap(), RunOutcome::Completed(_));

    assert_eq!(h.registry.fetches().len(), 1);
    assert!(!h.scheduler.run_lock.is_running());
}

#[test_log::test(tokio::test(start_paused = true))]
async fn stale_run_is_overridden() {
    let (registry, gate) = FakeRegistry::gated();
    let h = Harness::with_registry(registry);
    h.store.put_subscription(ChatId(1), SPB);

    let scheduler = h.scheduler.clone();
    let stale = tokio::spawn(async move { scheduler.run_once().await });

    wait_for_fetches(&h.registry, 1).await;

    tokio::time::advance(Duration::from_secs(31 * 60)).await;

    let scheduler = h.scheduler.clone();
    let fresh = tokio::spawn(async move { scheduler.run_once().await });

    wait_for_fetches(&h.registry, 2).await;

    gate.add_permits(2);

    assert_matches!(stale.await.unwrap(), RunOutcome::Completed(_));
    assert_matches!(fresh.await.unwrap(), RunOutcome::Completed(_));
    assert!(!h.scheduler.run_lock.is_running());
}

#[test_log::test(tokio::test)]
async fn parse_now_summaries() {
    let h = Harness::new();
    h.registry.set_records(
        78,
        vec![record("X", "ООО Ромашка"), record("Y", "не требуется")],
    );
    h.registry.fail(77);

    let summary = h.scheduler.parse_now(ChatId(1), &spb()).await;
    expect![[r#"
        Регион Санкт-Петербург - 78, 05.03.2024
        Найдено заключений: 2
        Отправлено уведомлений: 1
        Уже были отправлены ранее: 0
        Без подрядчика (не требуется): 1"#]]
    .assert_eq(&summary);

    // The same record is not sent again
    let summary = h.scheduler.parse_now(ChatId(1), &spb()).await;
    assert!(summary.contains("Отправлено уведомлений: 0"), "{summary}");
    assert!(summary.contains("Уже были отправлены ранее: 1"), "{summary}");
    assert_eq!(h.messenger.sent_to(ChatId(1)).len(), 1);

    let summary = h.scheduler.parse_now(ChatId(1), &msk()).await;
    expect![[r#"Не удалось получить данные реестра ЕГРЗ по региону Москва - 77 за 05.03.2024. Попробуйте позже, регион будет проверен при следующем плановом запуске."#]]
        .assert_eq(&summary);

    let summary = h
        .scheduler
        .parse_now(ChatId(1), &RegionLabel::new("Республика Адыгея", 1))
        .await;
    expect![[r#"За 05.03.2024 новых заключений по региону Республика Адыгея - 01 нет."#]]
        .assert_eq(&summary);
}

#[test_log::test(tokio::test)]
async fn parse_now_ignores_the_run_lock() {
    let (registry, gate) = FakeRegistry::gated();
    let h = Harness::with_registry(registry);
    h.store.put_subscription(ChatId(1), SPB);

    let scheduler = h.scheduler.clone();
    let run = tokio::spawn(async move { scheduler.run_once().await });
    wait_for_fetches(&h.registry, 1).await;

    let scheduler = h.scheduler.clone();
    let parse = tokio::spawn(async move { scheduler.parse_now(ChatId(2), &msk()).await });
    wait_for_fetches(&h.registry, 2).await;

    gate.add_permits(2);
    run.await.unwrap();
    let summary = parse.await.unwrap();

    assert!(summary.contains("новых заключений"), "{summary}");
}

#[test]
fn local_calendar_date_rejects_bad_offsets() {
    assert!(local_calendar_date(3).is_ok());
    assert!(local_calendar_date(30).is_err());
}
