use crate::{db, enrichment, registry, scheduler, tg};
use serde::de::DeserializeOwned;

pub struct Config {
    pub(crate) tg: tg::Config,
    pub(crate) db: db::Config,
    pub(crate) registry: registry::Config,
    pub(crate) llm: enrichment::LlmConfig,
    pub(crate) lookup: enrichment::LookupConfig,
    pub(crate) scheduler: scheduler::Config,
}

impl Config {
    pub fn load_or_panic() -> Config {
        Self {
            tg: from_env_or_panic("TG_"),
            db: from_env_or_panic("DATABASE_"),
            registry: from_env_or_panic("EGRZ_"),
            llm: from_env_or_panic("LLM_"),
            lookup: from_env_or_panic("LOOKUP_"),
            scheduler: from_env_or_panic("SCHEDULER_"),
        }
    }
}

pub(crate) fn from_env_or_panic<T: DeserializeOwned>(prefix: &str) -> T {
    envy::prefixed(prefix).from_env().unwrap_or_else(|err| {
        panic!(
            "BUG: Couldn't load config from environment for {}: {:#?}",
            std::any::type_name::<T>(),
            err
        );
    })
}
