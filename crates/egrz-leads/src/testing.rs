//! In-memory fakes of the external collaborators.
use crate::delivery::DeliveryStore;
use crate::enrichment::{BeneficiaryLookup, Completion, LlmConfig, LlmError, LookupError};
use crate::error::{err, fatal};
use crate::http::HttpClientError;
use crate::lead_cache::LeadCacheStore;
use crate::messaging::{DeliveryError, MessagingGateway};
use crate::regions::RegionLabel;
use crate::registry::{ConclusionNumber, RawRecord, RegistryError, RegistrySource};
use crate::subscription::{StoredSubscription, SubscriptionStore};
use crate::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use teloxide::types::{ChatId, InlineKeyboardMarkup};
use tokio::sync::Semaphore;

pub(crate) fn record(number: &str, developer: &str) -> RawRecord {
    RawRecord {
        conclusion_number: ConclusionNumber::new(number),
        expertise_result: "Положительное заключение".to_owned(),
        preparer: "ООО Проект".to_owned(),
        developer: developer.to_owned(),
        object_name: "Многоквартирный жилой дом".to_owned(),
        object_address: "г. Санкт-Петербург, ул. Садовая, д. 1".to_owned(),
        conclusion_date: "05.03.2024".to_owned(),
    }
}

/// Text that passes the notification validation
pub(crate) fn enriched_text(developer: &str) -> String {
    format!(
        "🏗 Объект: многоквартирный жилой дом, г. Санкт-Петербург, ул. Садовая, д. 1\n\
        📋 Экспертиза: положительное заключение от 05.03.2024\n\
        👤 Застройщик: {developer}\n\
        Номер заключения экспертизы: X"
    )
}

pub(crate) fn config_llm() -> LlmConfig {
    LlmConfig {
        api_url: "http://localhost/v1/chat/completions".parse().unwrap(),
        api_key: "test".to_owned(),
        model: "test".to_owned(),
        timeout_secs: 60,
        max_tokens: 1200,
        retry_attempts: 3,
        retry_delay_secs: 5,
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<MemoryStoreState>,
}

#[derive(Default)]
struct MemoryStoreState {
    subscriptions: HashMap<ChatId, String>,
    fail_subscription_reads: bool,
    fail_cache: bool,
    cache: HashMap<ConclusionNumber, String>,
    cache_writes: usize,
    delivery_facts: HashSet<(ChatId, ConclusionNumber)>,
    delivery_queries: usize,
}

impl MemoryStore {
    pub(crate) fn put_subscription(&self, user: ChatId, regions: &str) {
        self.state
            .lock()
            .subscriptions
            .insert(user, regions.to_owned());
    }

    pub(crate) fn subscription(&self, user: ChatId) -> Option<String> {
        self.state.lock().subscriptions.get(&user).cloned()
    }

    pub(crate) fn fail_subscription_reads(&self) {
        self.state.lock().fail_subscription_reads = true;
    }

    pub(crate) fn fail_cache(&self) {
        self.state.lock().fail_cache = true;
    }

    pub(crate) fn put_cached(&self, key: &ConclusionNumber, text: &str) {
        self.state.lock().cache.insert(key.clone(), text.to_owned());
    }

    pub(crate) fn cached(&self, key: &ConclusionNumber) -> Option<String> {
        self.state.lock().cache.get(key).cloned()
    }

    pub(crate) fn cache_writes(&self) -> usize {
        self.state.lock().cache_writes
    }

    pub(crate) fn put_delivery(&self, user: ChatId, number: &str) {
        self.state
            .lock()
            .delivery_facts
            .insert((user, ConclusionNumber::new(number)));
    }

    pub(crate) fn delivery_facts(&self) -> HashSet<(ChatId, ConclusionNumber)> {
        self.state.lock().delivery_facts.clone()
    }

    pub(crate) fn delivery_queries(&self) -> usize {
        self.state.lock().delivery_queries
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn read_all(&self) -> Result<Vec<StoredSubscription>> {
        let state = self.state.lock();
        if state.fail_subscription_reads {
            return Err(fatal!("Subscriptions store is unavailable"));
        }
        Ok(state
            .subscriptions
            .iter()
            .map(|(&user_id, regions)| StoredSubscription {
                user_id,
                regions: regions.clone(),
            })
            .collect())
    }

    async fn read(&self, user_id: ChatId) -> Result<Option<String>> {
        Ok(self.subscription(user_id))
    }

    async fn write(&self, user_id: ChatId, regions: String) -> Result {
        self.state.lock().subscriptions.insert(user_id, regions);
        Ok(())
    }
}

#[async_trait]
impl LeadCacheStore for MemoryStore {
    async fn get(&self, key: &ConclusionNumber) -> Result<Option<String>> {
        if self.state.lock().fail_cache {
            return Err(fatal!("Lead cache is unavailable"));
        }
        Ok(self.cached(key))
    }

    async fn put_if_absent(&self, key: &ConclusionNumber, text: &str) -> Result<String> {
        let mut state = self.state.lock();
        if state.fail_cache {
            return Err(fatal!("Lead cache is unavailable"));
        }
        if let Some(existing) = state.cache.get(key) {
            return Ok(existing.clone());
        }
        state.cache_writes += 1;
        state.cache.insert(key.clone(), text.to_owned());
        Ok(text.to_owned())
    }
}

#[async_trait]
impl DeliveryStore for MemoryStore {
    async fn sent_pairs(
        &self,
        users: &[ChatId],
        numbers: &[ConclusionNumber],
    ) -> Result<HashSet<(ChatId, ConclusionNumber)>> {
        let mut state = self.state.lock();
        state.delivery_queries += 1;
        Ok(state
            .delivery_facts
            .iter()
            .filter(|(user, number)| users.contains(user) && numbers.contains(number))
            .cloned()
            .collect())
    }

    async fn record(&self, user: ChatId, number: &ConclusionNumber) -> Result {
        self.state
            .lock()
            .delivery_facts
            .insert((user, number.clone()));
        Ok(())
    }
}

/// Registry that answers from memory. Regions without configured records
/// return an empty export.
#[derive(Default)]
pub(crate) struct FakeRegistry {
    records: Mutex<HashMap<u16, Vec<RawRecord>>>,
    failing: Mutex<HashSet<u16>>,
    fetches: Mutex<Vec<(RegionLabel, NaiveDate)>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeRegistry {
    /// Every fetch waits for a permit from the returned semaphore
    pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let registry = Self {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        (registry, gate)
    }

    pub(crate) fn set_records(&self, region_code: u16, records: Vec<RawRecord>) {
        self.records.lock().insert(region_code, records);
    }

    pub(crate) fn fail(&self, region_code: u16) {
        self.failing.lock().insert(region_code);
    }

    pub(crate) fn fetches(&self) -> Vec<(RegionLabel, NaiveDate)> {
        self.fetches.lock().clone()
    }
}

#[async_trait]
impl RegistrySource for FakeRegistry {
    async fn fetch(&self, region: &RegionLabel, date: NaiveDate) -> Result<Vec<RawRecord>> {
        self.fetches.lock().push((region.clone(), date));

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .expect("BUG: gate semaphore was closed")
                .forget();
        }

        if self.failing.lock().contains(&region.code()) {
            let source = HttpClientError::BadResponseStatusCode {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: "maintenance".to_owned(),
            };
            return Err(err!(RegistryError::TransientFetch { source }));
        }

        Ok(self
            .records
            .lock()
            .get(&region.code())
            .cloned()
            .unwrap_or_default())
    }
}

/// Replies from the queue, then with a valid notification once it's empty
#[derive(Default)]
pub(crate) struct FakeCompletion {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub(crate) fn push_ok(&self, text: String) {
        self.replies.lock().push_back(Ok(text));
    }

    pub(crate) fn push_err(&self, err: LlmError) {
        self.replies.lock().push_back(Err(err));
    }

    pub(crate) fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Completion for FakeCompletion {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().push(prompt.to_owned());
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(enriched_text("ООО Ромашка")))
    }
}

pub(crate) struct FakeLookup {
    reply: Option<String>,
    queries: Mutex<Vec<String>>,
}

impl FakeLookup {
    pub(crate) fn ok(text: &str) -> Self {
        Self {
            reply: Some(text.to_owned()),
            queries: Default::default(),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            queries: Default::default(),
        }
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl BeneficiaryLookup for FakeLookup {
    async fn lookup(&self, developer: &str) -> Result<String, LookupError> {
        self.queries.lock().push(developer.to_owned());
        self.reply.clone().ok_or(LookupError::NoIdentifier)
    }
}

/// Collects sent messages. Blocked chats fail with an unavailable recipient,
/// flaky ones with a transient error.
#[derive(Default)]
pub(crate) struct FakeMessenger {
    sent: Mutex<Vec<(ChatId, String)>>,
    blocked: Mutex<HashSet<ChatId>>,
    flaky: Mutex<HashSet<ChatId>>,
}

impl FakeMessenger {
    pub(crate) fn block(&self, chat_id: ChatId) {
        self.blocked.lock().insert(chat_id);
    }

    pub(crate) fn make_flaky(&self, chat_id: ChatId) {
        self.flaky.lock().insert(chat_id);
    }

    pub(crate) fn sent(&self) -> Vec<(ChatId, String)> {
        self.sent.lock().clone()
    }

    pub(crate) fn sent_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl MessagingGateway for FakeMessenger {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        _keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), DeliveryError> {
        if self.blocked.lock().contains(&chat_id) {
            return Err(DeliveryError::RecipientUnavailable {
                chat_id,
                source: teloxide::RequestError::Api(teloxide::ApiError::BotBlocked),
            });
        }
        if self.flaky.lock().contains(&chat_id) {
            return Err(DeliveryError::Transient {
                chat_id,
                source: teloxide::RequestError::Api(teloxide::ApiError::Unknown(
                    "Bad Gateway".to_owned(),
                )),
            });
        }
        self.sent.lock().push((chat_id, text.to_owned()));
        Ok(())
    }
}
