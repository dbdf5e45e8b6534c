mod handle;
mod player;
mod runtime;
mod slices;

pub use handle::{PlayerHandle, PlayerTopics};
pub use player::SlotPlayer;
pub use runtime::{PlayerRuntime, RuntimeOptions};
pub use slices::{ConfigSlice, HealthSlice, PlayerSnapshot, ProgressSlice, StateSlice};
