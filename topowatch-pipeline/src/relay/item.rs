use std::sync::Arc;
use topowatch_core::models::{
    ChangeEvent, ChangeKind, DeleteNotice, DeletedState, RawObject, WatchedObject,
};
use tracing::warn;

/// Notification as it sits in a relay queue, still undecoded
///
/// Producers only wrap what upstream handed them; parsing happens on the
/// consumer so enqueueing stays cheap.
#[derive(Debug, Clone)]
pub enum RelayItem {
    Added(RawObject),
    Updated { old: RawObject, new: RawObject },
    Deleted(DeleteNotice),
}

impl RelayItem {
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match self {
            Self::Added(_) => ChangeKind::Added,
            Self::Updated { .. } => ChangeKind::Updated,
            Self::Deleted(_) => ChangeKind::Deleted,
        }
    }
}

fn decode(raw: RawObject) -> topowatch_core::Result<Arc<WatchedObject>> {
    WatchedObject::from_raw(raw).map(Arc::new)
}

impl TryFrom<RelayItem> for ChangeEvent {
    type Error = topowatch_core::Error;

    fn try_from(item: RelayItem) -> Result<Self, Self::Error> {
        Ok(match item {
            RelayItem::Added(raw) => Self::Added {
                object: decode(raw)?,
            },
            RelayItem::Updated { old, new } => {
                let object = decode(new)?;
                // the prior state is informational; a bad one costs only oldObj
                let prior = decode(old)
                    .map_err(|e| {
                        warn!(key = %object.key(), error = %e, "Dropping undecodable prior state of update");
                    })
                    .ok();
                Self::Updated { prior, object }
            }
            RelayItem::Deleted(DeleteNotice::Object(raw)) => Self::Deleted {
                state: DeletedState::Final(decode(raw)?),
            },
            RelayItem::Deleted(DeleteNotice::FinalStateUnknown { key, last_known }) => {
                // the last known state is a stale best-effort copy
                Self::Deleted {
                    state: DeletedState::FinalStateUnknown {
                        key,
                        last_known: last_known.and_then(|raw| decode(raw).ok()),
                    },
                }
            }
        })
    }
}
