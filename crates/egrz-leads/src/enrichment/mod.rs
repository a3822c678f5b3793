//! Turns raw registry records into notification texts.
mod beneficiary;
mod llm;
mod prompt;

pub(crate) mod validation;

pub(crate) use beneficiary::{BeneficiaryLookup, LookupConfig, WebLookup, LOOKUP_UNAVAILABLE};
#[cfg(test)]
pub(crate) use beneficiary::LookupError;
pub(crate) use llm::{ChatCompletionsClient, Completion, LlmConfig, LlmError};

use crate::observability::metrics;
use crate::prelude::*;
use crate::regions::RegionLabel;
use crate::registry::RawRecord;
use crate::util::retry::{retry, LinearBackoff};
use std::sync::Arc;
use std::time::Duration;

/// Developer info of records that don't need a contractor
const IRRELEVANT_DEVELOPER: &str = "не требуется";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Quality {
    /// Produced by the model and passed validation
    Enriched,
    /// Rendered from the template after a failure
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Notification {
    pub(crate) text: String,
    pub(crate) quality: Quality,
}

/// Records that are never sent to anyone and are not counted as errors.
pub(crate) fn is_irrelevant(record: &RawRecord) -> bool {
    record.developer.trim().to_lowercase() == IRRELEVANT_DEVELOPER
}

pub(crate) struct Enricher {
    completion: Arc<dyn Completion>,
    lookup: Option<Arc<dyn BeneficiaryLookup>>,
    retry_policy: LinearBackoff,
}

impl Enricher {
    pub(crate) fn new(
        completion: Arc<dyn Completion>,
        lookup: Option<Arc<dyn BeneficiaryLookup>>,
        config: &LlmConfig,
    ) -> Self {
        Self {
            completion,
            lookup,
            retry_policy: LinearBackoff {
                attempts: config.retry_attempts.max(1),
                delay: Duration::from_secs(config.retry_delay_secs),
            },
        }
    }

    /// Never fails. Whatever goes wrong degrades to the fallback template.
    pub(crate) async fn enrich(&self, record: &RawRecord, region: &RegionLabel) -> Notification {
        let beneficiary = match &self.lookup {
            Some(lookup) => Some(self.lookup_beneficiary(lookup.as_ref(), record).await),
            None => None,
        };

        let prompt = prompt::render(record, region, beneficiary.as_deref());

        let completion = retry(
            &self.retry_policy,
            || self.completion.complete(prompt::SYSTEM_PROMPT, &prompt),
            LlmError::is_retryable,
        )
        .await;

        let fallback = || Notification {
            text: prompt::render_fallback(record, region),
            quality: Quality::Fallback,
        };

        let text = match completion {
            Ok(text) => text,
            Err(err) => {
                metrics::llm_completion(err.outcome());
                warn!(err = tracing_err(&err), "LLM enrichment failed, using fallback");
                return fallback();
            }
        };

        if !validation::is_quality(&text) {
            metrics::llm_completion("invalid");
            warn!(%text, "LLM output failed validation, using fallback");
            return fallback();
        }

        metrics::llm_completion("ok");

        Notification {
            text,
            quality: Quality::Enriched,
        }
    }

    async fn lookup_beneficiary(&self, lookup: &dyn BeneficiaryLookup, record: &RawRecord) -> String {
        match lookup.lookup(&record.developer).await {
            Ok(text) => text,
            Err(err) => {
                warn!(err = tracing_err(&err), "Beneficiary lookup failed");
                LOOKUP_UNAVAILABLE.to_owned()
            }
        }
    }
}
