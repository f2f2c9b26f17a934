//! Topics and topic resolution.
//!
//! A [`TopicSpec`] is attached to every subscription field. Static specs are
//! checked once when the schema is built; dynamic specs are evaluated exactly
//! once per subscribe operation with that operation's arguments and context.

use std::collections::BTreeSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::context::{RequestArgs, RequestContext};
use crate::error::{ConfigurationError, SubscriptionError};

/// Opaque topic identifier. Equality is exact string match.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(Arc<str>);

impl Topic {
    /// Create a topic from any string-like value.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Returns the topic name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&String> for Topic {
    fn from(value: &String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Non-empty, duplicate-free set of topics a session listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet(BTreeSet<Topic>);

impl TopicSet {
    /// Build a set from topics, collapsing duplicates.
    ///
    /// Returns `None` when no topics are given.
    pub fn from_topics<I>(topics: I) -> Option<Self>
    where
        I: IntoIterator<Item = Topic>,
    {
        let set: BTreeSet<Topic> = topics.into_iter().collect();
        if set.is_empty() { None } else { Some(Self(set)) }
    }

    /// Number of distinct topics.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check membership.
    pub fn contains(&self, topic: &Topic) -> bool {
        self.0.contains(topic)
    }

    /// Iterate topics in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Topic> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a TopicSet {
    type Item = &'a Topic;
    type IntoIter = std::collections::btree_set::Iter<'a, Topic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Result of a dynamic topic function: one topic or several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicSelection {
    /// A single topic.
    One(Topic),
    /// Any number of topics (possibly zero, possibly with duplicates).
    Many(Vec<Topic>),
}

impl TopicSelection {
    /// An empty selection.
    pub fn none() -> Self {
        Self::Many(Vec::new())
    }

    fn into_vec(self) -> Vec<Topic> {
        match self {
            Self::One(topic) => vec![topic],
            Self::Many(topics) => topics,
        }
    }
}

impl From<Topic> for TopicSelection {
    fn from(value: Topic) -> Self {
        Self::One(value)
    }
}

impl From<&str> for TopicSelection {
    fn from(value: &str) -> Self {
        Self::One(Topic::from(value))
    }
}

impl From<String> for TopicSelection {
    fn from(value: String) -> Self {
        Self::One(Topic::from(value))
    }
}

impl<T: Into<Topic>> From<Vec<T>> for TopicSelection {
    fn from(value: Vec<T>) -> Self {
        Self::Many(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Topic>, const N: usize> From<[T; N]> for TopicSelection {
    fn from(value: [T; N]) -> Self {
        Self::Many(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Topic>> From<Option<T>> for TopicSelection {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(topic) => Self::One(topic.into()),
            None => Self::none(),
        }
    }
}

/// Dynamic topic function, evaluated once per subscribe operation.
pub type TopicFn = Arc<dyn Fn(&RequestArgs, &RequestContext) -> TopicSelection + Send + Sync>;

/// How a subscription field chooses its topics.
#[derive(Clone)]
pub enum TopicSpec {
    /// Topics known when the schema is built.
    Static(Vec<Topic>),
    /// Topics computed from the request arguments and context.
    Dynamic(TopicFn),
}

impl TopicSpec {
    /// Static spec from a list of topic names.
    pub fn fixed<I, T>(topics: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Topic>,
    {
        Self::Static(topics.into_iter().map(Into::into).collect())
    }

    /// Dynamic spec from a function of `(args, context)`.
    pub fn dynamic<F, S>(f: F) -> Self
    where
        F: Fn(&RequestArgs, &RequestContext) -> S + Send + Sync + 'static,
        S: Into<TopicSelection>,
    {
        Self::Dynamic(Arc::new(move |args, ctx| f(args, ctx).into()))
    }

    /// Returns true for dynamic specs.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }

    /// Schema-build check: static specs must name at least one non-blank topic.
    ///
    /// Dynamic specs can only be checked at subscribe time and always pass.
    pub fn validate(&self, field: &str, owner: &str) -> Result<(), ConfigurationError> {
        let Self::Static(topics) = self else {
            return Ok(());
        };
        if topics.is_empty() {
            return Err(ConfigurationError::EmptyTopics {
                field: field.to_string(),
                owner: owner.to_string(),
            });
        }
        if topics.iter().any(Topic::is_blank) {
            return Err(ConfigurationError::BlankTopic {
                field: field.to_string(),
                owner: owner.to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the concrete topic set for one subscribe operation.
    ///
    /// Blank topic names produced by a dynamic function are discarded before
    /// the emptiness check.
    pub fn resolve(
        &self,
        field: &str,
        args: &RequestArgs,
        ctx: &RequestContext,
    ) -> Result<TopicSet, SubscriptionError> {
        let topics = match self {
            Self::Static(topics) => topics.clone(),
            Self::Dynamic(f) => match std::panic::catch_unwind(AssertUnwindSafe(|| f(args, ctx))) {
                Ok(selection) => selection
                    .into_vec()
                    .into_iter()
                    .filter(|t| !t.is_blank())
                    .collect(),
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "Unknown panic".to_string());
                    error!(field, panic = %message, "Topic function panicked");
                    return Err(SubscriptionError::TopicResolution {
                        field: field.to_string(),
                        message,
                    });
                }
            },
        };

        TopicSet::from_topics(topics).ok_or_else(|| SubscriptionError::MissingTopics {
            field: field.to_string(),
        })
    }
}

impl fmt::Debug for TopicSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(topics) => f.debug_tuple("Static").field(topics).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&"<fn>").finish(),
        }
    }
}
