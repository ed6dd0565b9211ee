//! Flake Music - Player Sync Core
//!
//! Keeps a displayed "now playing" position, controls and queue for one
//! guild consistent with the bot backend, combining periodic polling,
//! push events, local extrapolation and optimistic user actions.

pub mod api;
pub mod config;
pub mod import;
pub mod logging;
pub mod push;
pub mod session;
pub mod sync;

// Re-exports for convenience
pub use api::{ApiError, BotApiClient, ControlAction, PlayerBackend, Track};
pub use config::{ClientConfig, SyncConfig};
pub use logging::init_tracing;
pub use session::{CoreError, SessionCallback, SyncSession};
pub use sync::{format_time, PlayerView};
