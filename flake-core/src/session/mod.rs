//! Sync Session
//!
//! The async runtime around [`crate::sync::PlayerState`]: polling, push
//! events, extrapolation ticks, seek timers and command dispatch.

mod handlers;
#[allow(clippy::module_inception)]
mod session;
mod tasks;
mod types;

pub use session::SyncSession;
pub use tasks::TaskHandle;
pub use types::*;
