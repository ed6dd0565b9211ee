//! Bot API Client
//!
//! Typed access to the dashboard backend (`/bot/*`, `/playlist/*`).

mod client;
mod types;

pub use client::{ApiError, BotApiClient, PlayerBackend};
pub use types::*;
pub(crate) use types::millis;
