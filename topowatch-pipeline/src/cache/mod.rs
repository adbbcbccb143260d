// Module: cache

pub mod owner_refs;
pub mod reference_cache;
pub mod ttl_store;

pub use owner_refs::OwnerReferenceDiff;
pub use reference_cache::{Observation, ReferenceCache};
pub use ttl_store::TtlStore;
