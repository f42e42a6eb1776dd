//! Synchronization channel
//!
//! - [`SyncChannel`]: handle held by views (subscribe, commands, staleness)
//! - [`Subscription`]: filtered live projection, reference-counted
//! - `store`: the collection and its monotonic cycle bookkeeping
//! - `worker`: the serialized writer reconciling pull, push and commands

mod channel;
mod snapshot;
mod store;
mod subscription;
mod worker;

pub use channel::{SyncChannel, SyncChannelBuilder};
pub use snapshot::{Staleness, SyncHealth, SyncSnapshot};
pub use store::{OrderStore, PullOutcome};
pub use subscription::{OrderView, Subscription};
