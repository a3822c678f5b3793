mod config;
mod db;
mod delivery;
mod enrichment;
mod error;
mod http;
mod lead_cache;
mod messaging;
mod observability;
mod regions;
mod registry;
mod scheduler;
mod subscription;
mod tg;
mod util;

#[cfg(test)]
mod testing;

pub use crate::error::*;
pub use config::*;
pub use observability::*;

use delivery::DeliveryTracker;
use enrichment::{BeneficiaryLookup, ChatCompletionsClient, Enricher, WebLookup};
use lead_cache::LeadCache;
use prelude::*;
use scheduler::{RegionPipeline, Scheduler};
use std::sync::Arc;
use subscription::Subscriptions;

mod prelude {
    pub(crate) use crate::error::prelude::*;
    pub(crate) use crate::http::prelude::*;
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
}

/// Run the scheduler and the telegram bot processing loop
pub async fn run(config: Config) -> Result {
    let db = Arc::new(db::init(config.db).await?);

    let bot = tg::create_bot(&config.tg);

    let registry = Arc::new(registry::Client::new(config.registry)?);
    let completion = Arc::new(ChatCompletionsClient::new(&config.llm)?);

    let lookup: Option<Arc<dyn BeneficiaryLookup>> = if config.lookup.enabled {
        let base = http::base_client_builder()
            .build()
            .fatal_ctx(|| "Failed to build the lookup HTTP client")?;
        Some(Arc::new(WebLookup::new(http::create_client(base), &config.lookup)))
    } else {
        info!("Beneficiary lookup is disabled");
        None
    };

    let pipeline = RegionPipeline {
        registry,
        lead_cache: LeadCache::new(db.lead_cache.clone()),
        enricher: Enricher::new(completion, lookup, &config.llm),
        delivery: DeliveryTracker::new(db.delivery_facts.clone()),
        messaging: Arc::new(tg::TgMessaging::new(bot.clone())),
    };

    let subscriptions = Subscriptions::new(db.subscriptions.clone());

    let today = scheduler::local_calendar_date(config.scheduler.utc_offset_hours)?;

    let scheduler = Arc::new(Scheduler::new(
        &config.scheduler,
        subscriptions.clone(),
        pipeline,
        today,
    ));

    let scheduler_task = tokio::spawn(scheduler.clone().run_loop());

    let result = tg::run_bot(tg::Ctx {
        bot,
        config: config.tg,
        db,
        subscriptions,
        scheduler,
    })
    .await;

    scheduler_task.abort();

    result
}
