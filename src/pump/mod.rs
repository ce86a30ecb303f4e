//! Pump.fun protocol module
//!
//! # WARNING: Protocol Instability
//! Pump.fun has historically changed program behavior without notice.
//! The constants and structures in this module may break silently.

pub mod curve;
pub mod instruction;
pub mod market;
pub mod program;

pub use curve::BondingCurve;
pub use instruction::TradeAccounts;
pub use market::{MarketData, RpcMarketData};
pub use program::PUMP_PROGRAM_ID;
