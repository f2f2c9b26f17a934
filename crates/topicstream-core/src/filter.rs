//! Per-event payload filtering.
//!
//! A filter runs once per received event, after topic matching and before
//! projection. A predicate that returns an error or panics rejects the event
//! for that session only; the failure is logged and never reaches the
//! publisher or the client.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde_json::Value;
use tracing::{trace, warn};

use crate::context::{RequestArgs, RequestContext};
use crate::error::FilterEvaluationError;
use crate::topic::Topic;

/// Everything a predicate may look at for one event.
#[derive(Debug, Clone, Copy)]
pub struct FilterInput<'a> {
    /// Topic the event was published to.
    pub topic: &'a Topic,
    /// Raw event payload.
    pub payload: &'a Value,
    /// Arguments captured when the session started.
    pub args: &'a RequestArgs,
    /// Context captured when the session started.
    pub context: &'a RequestContext,
}

/// Fallible filter predicate.
pub type FilterFn = Arc<dyn Fn(&FilterInput<'_>) -> anyhow::Result<bool> + Send + Sync>;

/// Optional predicate deciding whether an event reaches the field resolver.
///
/// The default filter accepts every event.
#[derive(Clone, Default)]
pub struct PayloadFilter {
    predicate: Option<FilterFn>,
}

impl PayloadFilter {
    /// Filter that accepts every event.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Filter from an infallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&FilterInput<'_>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(move |input| Ok(predicate(input)))),
        }
    }

    /// Filter from a fallible predicate; errors reject the event.
    pub fn try_new<F>(predicate: F) -> Self
    where
        F: Fn(&FilterInput<'_>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Returns true if no predicate is configured.
    pub fn is_accept_all(&self) -> bool {
        self.predicate.is_none()
    }

    /// Evaluate the predicate, turning errors and panics into [`FilterEvaluationError`].
    pub fn evaluate(
        &self,
        field: &str,
        input: &FilterInput<'_>,
    ) -> Result<bool, FilterEvaluationError> {
        let Some(predicate) = &self.predicate else {
            return Ok(true);
        };

        let failure = |message: String| FilterEvaluationError {
            field: field.to_string(),
            topic: input.topic.clone(),
            message,
        };

        match std::panic::catch_unwind(AssertUnwindSafe(|| predicate(input))) {
            Ok(Ok(pass)) => Ok(pass),
            Ok(Err(e)) => Err(failure(e.to_string())),
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());
                Err(failure(format!("predicate panicked: {msg}")))
            }
        }
    }

    /// Evaluate and log: failures count as rejection.
    pub fn accepts(&self, field: &str, input: &FilterInput<'_>) -> bool {
        match self.evaluate(field, input) {
            Ok(true) => true,
            Ok(false) => {
                trace!(field, topic = %input.topic, "Event filtered out");
                false
            }
            Err(e) => {
                warn!(
                    field,
                    topic = %input.topic,
                    error = %e,
                    "Filter evaluation failed, dropping event"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for PayloadFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadFilter")
            .field("accept_all", &self.is_accept_all())
            .finish()
    }
}
