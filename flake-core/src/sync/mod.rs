//! Sync Engine
//!
//! Reconciles polled snapshots, push events and local extrapolation into
//! the position and controls shown to the user.

mod controls;
mod position;
mod protocol;
mod seek;
mod snapshot;
mod state;

pub use controls::ControlMirror;
pub use position::{format_time, DisplayPosition};
pub use protocol::PushEvent;
pub use seek::{SeekCoordinator, SeekIntent, SeekState, SeekTicket};
pub use snapshot::{ControlSettings, PlaybackSnapshot};
pub use state::{PlayerState, PlayerView, PushOutcome, ReconcileOutcome};
