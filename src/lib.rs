//! Gated sniper library
//!
//! Risk-gated pump.fun pipeline: candidates arrive from the event stream,
//! pass an ordered filter chain, are bought under a global fee budget, and
//! every open position is supervised by its own exit task.

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod governor;
pub mod position;
pub mod pump;
pub mod sinks;
pub mod stream;
pub mod trading;
pub mod types;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
