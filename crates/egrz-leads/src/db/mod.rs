mod allowed_usernames;
mod constraints;
mod delivery_facts;
mod error;
mod lead_cache;
mod subscriptions;
mod tg_users;

pub(crate) use allowed_usernames::*;
pub(crate) use delivery_facts::*;
pub(crate) use error::*;
pub(crate) use lead_cache::*;
pub(crate) use subscriptions::*;
pub(crate) use tg_users::*;

use crate::prelude::*;
use crate::Result;
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;

#[derive(Deserialize)]
pub(crate) struct Config {
    pub(crate) url: url::Url,

    #[serde(default = "default_database_pool_size")]
    pub(crate) pool_size: u32,
}

fn default_database_pool_size() -> u32 {
    10
}

pub(crate) struct Repo {
    pub(crate) tg_users: TgUsersRepo,
    pub(crate) allowed_usernames: AllowedUsernamesRepo,
    pub(crate) subscriptions: Arc<SubscriptionsRepo>,
    pub(crate) lead_cache: Arc<LeadCacheRepo>,
    pub(crate) delivery_facts: Arc<DeliveryFactsRepo>,
}

pub(crate) async fn init(config: Config) -> Result<Repo> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        // Verify that the connection is working early.
        // The connection created here can also be reused by the migrations down the road.
        // The default idle timeout should be enough for that.
        .connect(config.url.as_str())
        .await
        .map_err(err_ctx!(DbError::Connect))?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .map_err(err_ctx!(DbError::Migrate))?;

    constraints::validate(pool.clone()).await;

    info!("Database is ready");

    Ok(Repo {
        tg_users: TgUsersRepo::new(pool.clone()),
        allowed_usernames: AllowedUsernamesRepo::new(pool.clone()),
        subscriptions: Arc::new(SubscriptionsRepo::new(pool.clone())),
        lead_cache: Arc::new(LeadCacheRepo::new(pool.clone())),
        delivery_facts: Arc::new(DeliveryFactsRepo::new(pool)),
    })
}
