pub mod quat;
mod snapshot;

pub use snapshot::{MAX_SNAPSHOT_SIZE, PoseSnapshot, SyncFields, WireError};
