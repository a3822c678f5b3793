use serde::{Deserialize, Serialize};
use std::fmt;

/// Natural unique key of a registry record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct ConclusionNumber(String);

impl ConclusionNumber {
    pub(crate) fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConclusionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One row of the registry export. Lives only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub(crate) struct RawRecord {
    pub(crate) conclusion_number: ConclusionNumber,
    pub(crate) expertise_result: String,
    /// Who prepared the project documentation
    pub(crate) preparer: String,
    /// Developer or technical customer, free text with names and tax ids
    pub(crate) developer: String,
    pub(crate) object_name: String,
    pub(crate) object_address: String,
    pub(crate) conclusion_date: String,
}

