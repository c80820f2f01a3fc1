//! Shared value types: instance identities, pool kinds, transforms.

mod types;

pub use types::{InstanceId, PoolId, PoolKind, Transform};
