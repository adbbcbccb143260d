use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::object::{RawObject, WatchedObject};

/// Kind of change observed on an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Operation label used in outbound notifications
    #[must_use]
    pub const fn operation(self) -> &'static str {
        match self {
            Self::Added => "create",
            Self::Updated => "update",
            Self::Deleted => "delete",
        }
    }
}

/// Delete notification as delivered by a subscription
///
/// When the provider missed the actual delete (for example across a relist)
/// it only knows the object is gone; it hands over the store key and, if it
/// still has one, a possibly stale copy of the last state it saw.
#[derive(Debug, Clone)]
pub enum DeleteNotice {
    Object(RawObject),
    FinalStateUnknown {
        key: String,
        last_known: Option<RawObject>,
    },
}

/// Decoded form of a [`DeleteNotice`]
#[derive(Debug, Clone)]
pub enum DeletedState {
    Final(Arc<WatchedObject>),
    FinalStateUnknown {
        key: String,
        last_known: Option<Arc<WatchedObject>>,
    },
}

/// Unit flowing through the pipeline
///
/// Events carry no sequence number; order is the order they were enqueued.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Added {
        object: Arc<WatchedObject>,
    },
    Updated {
        /// `None` when the previous state could not be decoded
        prior: Option<Arc<WatchedObject>>,
        object: Arc<WatchedObject>,
    },
    Deleted {
        state: DeletedState,
    },
}

impl ChangeEvent {
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Added { .. } => ChangeKind::Added,
            Self::Updated { .. } => ChangeKind::Updated,
            Self::Deleted { .. } => ChangeKind::Deleted,
        }
    }

    /// Current state of the object; `None` for a delete whose final state is unknown
    #[must_use]
    pub const fn object(&self) -> Option<&Arc<WatchedObject>> {
        match self {
            Self::Added { object }
            | Self::Updated { object, .. }
            | Self::Deleted {
                state: DeletedState::Final(object),
            } => Some(object),
            Self::Deleted {
                state: DeletedState::FinalStateUnknown { .. },
            } => None,
        }
    }

    /// Previous state, only present for updates
    #[must_use]
    pub const fn prior_object(&self) -> Option<&Arc<WatchedObject>> {
        match self {
            Self::Updated { prior, .. } => prior.as_ref(),
            Self::Added { .. } | Self::Deleted { .. } => None,
        }
    }

    /// Identity for logging, including the opaque key of degraded deletes
    #[must_use]
    pub fn describe_key(&self) -> String {
        match self {
            Self::Deleted {
                state: DeletedState::FinalStateUnknown { key, .. },
            } => key.clone(),
            _ => self
                .object()
                .map(|obj| obj.key().to_string())
                .unwrap_or_default(),
        }
    }
}
