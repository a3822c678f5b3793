//! Users' region subscriptions and their aggregation into the
//! region to subscribers map used by a run.
use crate::prelude::*;
use crate::regions::RegionLabel;
use crate::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use teloxide::types::ChatId;

/// Derived fresh for every run, never persisted.
pub(crate) type RegionSubscriberMap = BTreeMap<RegionLabel, HashSet<ChatId>>;

/// Subscription row as it is persisted. `regions` is a JSON array of
/// region labels and may be corrupt.
#[derive(Debug, Clone)]
pub(crate) struct StoredSubscription {
    pub(crate) user_id: ChatId,
    pub(crate) regions: String,
}

#[async_trait]
pub(crate) trait SubscriptionStore: Send + Sync {
    async fn read_all(&self) -> Result<Vec<StoredSubscription>>;

    async fn read(&self, user_id: ChatId) -> Result<Option<String>>;

    /// Creates the subscription on first write.
    async fn write(&self, user_id: ChatId, regions: String) -> Result;
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SubscriptionError {
    #[error("Subscription config of user {user_id} is corrupt")]
    ConfigCorrupt {
        user_id: ChatId,
        source: serde_json::Error,
    },
}

fn parse_regions(user_id: ChatId, regions: &str) -> Result<Vec<RegionLabel>> {
    serde_json::from_str(regions).map_err(err_ctx!(SubscriptionError::ConfigCorrupt { user_id }))
}

fn serialize_regions(regions: &[RegionLabel]) -> Result<String> {
    serde_json::to_string(regions).fatal_ctx(|| "Failed to serialize regions")
}

#[derive(Clone)]
pub(crate) struct Subscriptions {
    store: Arc<dyn SubscriptionStore>,
}

impl Subscriptions {
    pub(crate) fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Inverts users' region lists into the region to subscribers map.
    /// A user with a corrupt config is logged and left out, only a failure
    /// to read the store at all is returned as an error.
    pub(crate) async fn collect(&self) -> Result<RegionSubscriberMap> {
        let subscriptions = self.store.read_all().await?;

        let mut map = RegionSubscriberMap::new();

        for subscription in subscriptions {
            let regions = match parse_regions(subscription.user_id, &subscription.regions) {
                Ok(regions) => regions,
                Err(err) => {
                    warn!(
                        err = tracing_err(&err),
                        user_id = %subscription.user_id,
                        "Skipping user with a corrupt subscription config"
                    );
                    continue;
                }
            };

            for region in regions {
                map.entry(region).or_default().insert(subscription.user_id);
            }
        }

        Ok(map)
    }

    /// Regions of the user in the order they were added. A corrupt config
    /// reads as empty, so that the user can overwrite it.
    pub(crate) async fn regions_of(&self, user_id: ChatId) -> Result<Vec<RegionLabel>> {
        let Some(regions) = self.store.read(user_id).await? else {
            return Ok(vec![]);
        };

        match parse_regions(user_id, &regions) {
            Ok(mut regions) => {
                let mut seen = HashSet::new();
                regions.retain(|region| seen.insert(region.clone()));
                Ok(regions)
            }
            Err(err) => {
                warn!(
                    err = tracing_err(&err),
                    %user_id,
                    "Corrupt subscription config will be overwritten"
                );
                Ok(vec![])
            }
        }
    }

    /// Returns `false` if the user was already subscribed to the region.
    pub(crate) async fn add(&self, user_id: ChatId, region: RegionLabel) -> Result<bool> {
        let mut regions = self.regions_of(user_id).await?;

        if regions.contains(&region) {
            return Ok(false);
        }

        regions.push(region);
        self.store
            .write(user_id, serialize_regions(&regions)?)
            .await?;

        Ok(true)
    }

    /// Returns `false` if the user wasn't subscribed to the region.
    /// The subscription itself is never deleted, it just becomes empty.
    pub(crate) async fn remove(&self, user_id: ChatId, region: &RegionLabel) -> Result<bool> {
        let mut regions = self.regions_of(user_id).await?;
        let len_before = regions.len();

        regions.retain(|existing| existing != region);

        if regions.len() == len_before {
            return Ok(false);
        }

        self.store
            .write(user_id, serialize_regions(&regions)?)
            .await?;

        Ok(true)
    }
}
