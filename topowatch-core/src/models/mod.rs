pub mod event;
pub mod object;
pub mod resource;

pub use event::{ChangeEvent, ChangeKind, DeleteNotice, DeletedState};
pub use object::{split_api_version, ObjectKey, OwnerReference, RawObject, WatchedObject};
pub use resource::ResourceType;
