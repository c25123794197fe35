//! Stream queries and event filters.

use serde::{Deserialize, Serialize};

use crate::error::{EventStoreError, Result};
use crate::event::{DEFAULT_SCOPE, Event};

/// Revision bound meaning "to the end of the stream".
pub const UNBOUNDED: i64 = -1;

/// Identifies a stream, optionally scoped by aggregate type and context.
///
/// `aggregate_id` is required for single-stream operations; queries without
/// it address every stream (used by cross-stream scans).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamQuery {
    /// Aggregate/stream identifier.
    pub aggregate_id: Option<String>,
    /// Aggregate type name.
    pub aggregate: Option<String>,
    /// Bounded-context name.
    pub context: Option<String>,
}

impl StreamQuery {
    /// Query addressing a single stream.
    #[must_use]
    pub fn stream(aggregate_id: impl Into<String>) -> Self {
        Self {
            aggregate_id: Some(aggregate_id.into()),
            ..Self::default()
        }
    }

    /// Query addressing every stream.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Scopes the query to an aggregate type.
    #[must_use]
    pub fn with_aggregate(mut self, aggregate: impl Into<String>) -> Self {
        self.aggregate = Some(aggregate.into());
        self
    }

    /// Scopes the query to a bounded context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns the aggregate id of a single-stream query.
    ///
    /// # Errors
    ///
    /// Returns `EventStoreError::InvalidArgument` if the id is absent or empty.
    pub fn require_aggregate_id(&self) -> Result<&str> {
        match self.aggregate_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(EventStoreError::InvalidArgument(
                "query must contain an aggregate id".into(),
            )),
        }
    }

    /// Aggregate type, falling back to the default scope.
    #[must_use]
    pub fn aggregate_or_default(&self) -> &str {
        self.aggregate.as_deref().unwrap_or(DEFAULT_SCOPE)
    }

    /// Context, falling back to the default scope.
    #[must_use]
    pub fn context_or_default(&self) -> &str {
        self.context.as_deref().unwrap_or(DEFAULT_SCOPE)
    }

    /// Whether the given stream coordinates fall inside this query. Fields
    /// left `None` match anything.
    #[must_use]
    pub fn matches(&self, aggregate_id: &str, aggregate: &str, context: &str) -> bool {
        self.aggregate_id.as_deref().is_none_or(|id| id == aggregate_id)
            && self.aggregate.as_deref().is_none_or(|a| a == aggregate)
            && self.context.as_deref().is_none_or(|c| c == context)
    }
}

/// Filter handed to `StorageAdapter::find_events`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Stream scope.
    pub query: StreamQuery,
    /// Inclusive lower revision bound.
    pub rev_min: Option<i64>,
    /// Exclusive upper revision bound.
    pub rev_max: Option<i64>,
    /// Restrict to events not yet dispatched.
    pub undispatched_only: bool,
}

impl EventFilter {
    /// Filter over a query with no revision bounds.
    #[must_use]
    pub fn for_query(query: StreamQuery) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    /// Filter over the revision range `[rev_min, rev_max)`, where `rev_max`
    /// equal to [`UNBOUNDED`] means "to the end".
    #[must_use]
    pub fn revision_range(query: StreamQuery, rev_min: i64, rev_max: i64) -> Self {
        Self {
            query,
            rev_min: (rev_min > 0).then_some(rev_min),
            rev_max: (rev_max != UNBOUNDED).then_some(rev_max),
            undispatched_only: false,
        }
    }

    /// Filter over undispatched events, optionally scoped by a query.
    #[must_use]
    pub fn undispatched(query: Option<StreamQuery>) -> Self {
        Self {
            query: query.unwrap_or_default(),
            undispatched_only: true,
            ..Self::default()
        }
    }

    /// Whether an event satisfies this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.query
            .matches(&event.aggregate_id, &event.aggregate, &event.context)
            && self.rev_min.is_none_or(|min| event.stream_revision >= min)
            && self.rev_max.is_none_or(|max| event.stream_revision < max)
            && !(self.undispatched_only && event.dispatched)
    }
}
