//! Entry governance: fee budget, per-mint registry and the serial
//! execution loop

pub mod budget;
pub mod execution;
pub mod registry;

pub use budget::{BudgetGovernor, BudgetState};
pub use execution::{EntryOutcome, ExecutionGovernor};
pub use registry::{PositionRegistry, Slot};
