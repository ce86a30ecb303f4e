//! Trading wallets and profit skimming

pub mod pool;
pub mod skim;

pub use pool::{check_keypair_permissions, load_keypair, TradingWallet, WalletPool};
pub use skim::ProfitSkimmer;
