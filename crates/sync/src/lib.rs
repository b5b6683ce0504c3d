pub mod config;
pub mod controller;
pub mod diff;
pub mod motion;
pub mod queue;
pub mod wire;

pub use config::{Axes, AuthorityRole, Delivery, IntervalMode, SyncConfig};
pub use controller::{
    Direction, Endpoint, PoseAccessor, SnapshotHook, SyncController, TickContext, TickPhase,
    Transmit, Vetoed,
};
pub use motion::{Extrapolation, Goal, MoveRate, Pose};
pub use queue::{PacketQueue, PacketSender, packet_queue};
pub use wire::{MAX_SNAPSHOT_SIZE, PoseSnapshot, SyncFields, WireError};
