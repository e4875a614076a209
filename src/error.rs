//! Error types for the pivot engine and the update planner.

use thiserror::Error;

use crate::pivot::MonthLabel;

/// Errors raised by table construction and the merge operations.
///
/// Every variant names the identifier that caused it. A merge that returns one
/// of these has not modified the table it was given.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// Malformed anchor data or an unusable column name.
    #[error("schema error at `{key}`: {reason}")]
    Schema { key: String, reason: String },

    /// `add_category` for a category the table already has.
    #[error("category `{0}` already exists in the table")]
    DuplicateCategory(String),

    /// `add_months` for a category the table has never seen.
    #[error("category `{0}` is not in the table; add it before adding months")]
    UnknownCategory(String),

    /// The merged table would break a structural invariant.
    #[error("data integrity violation at `{identifier}`: {reason}")]
    DataIntegrity { identifier: String, reason: String },
}

impl MergeError {
    pub(crate) fn schema(key: impl Into<String>, reason: impl Into<String>) -> Self {
        MergeError::Schema {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn integrity(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        MergeError::DataIntegrity {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while deciding on or executing an update plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planner is in state {state}; cannot {action}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    #[error("failed to load ranks for `{category}` {month}: {source}")]
    Source {
        category: String,
        month: MonthLabel,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Merge(#[from] MergeError),
}
