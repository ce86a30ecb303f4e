//! Open positions: state, exit rules and the per-position task

pub mod exit;
pub mod manager;
pub mod state;

pub use exit::{ExitDecision, ExitReason, Tick};
pub use manager::{ExitServices, PositionManager};
pub use state::{CloseReason, Position, PositionState};
