//! Trading wallets
//!
//! The primary keypair always exists. Extra keypairs are only used when
//! `trading.multi_wallet` is on, in which case entries rotate round-robin
//! through every loaded wallet.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct TradingWallet {
    pub keypair: Keypair,
    pub name: String,
}

impl TradingWallet {
    pub fn new(keypair: Keypair, name: impl Into<String>) -> Self {
        Self {
            keypair,
            name: name.into(),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

/// Refuse keypair files readable by group or other
pub fn check_keypair_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path).map_err(|e| {
            Error::InvalidKeypair(format!("Cannot stat {}: {}", path.display(), e))
        })?;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(Error::InsecureKeypair(format!(
                "Keypair file {} has insecure permissions {:o}. Run 'chmod 600 {}'",
                path.display(),
                mode & 0o777,
                path.display()
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Read a JSON byte-array keypair after the permission check
pub fn load_keypair(path: &Path) -> Result<Keypair> {
    check_keypair_permissions(path)?;
    debug!("Loading keypair from: {}", path.display());

    let data = std::fs::read(path).map_err(|e| {
        Error::InvalidKeypair(format!("Failed to read keypair {}: {}", path.display(), e))
    })?;
    let bytes: Vec<u8> = serde_json::from_slice(&data).map_err(|e| {
        Error::InvalidKeypair(format!("Failed to parse keypair JSON {}: {}", path.display(), e))
    })?;
    Keypair::from_bytes(&bytes).map_err(|e| {
        Error::InvalidKeypair(format!("Invalid keypair bytes {}: {}", path.display(), e))
    })
}

pub struct WalletPool {
    wallets: Vec<Arc<TradingWallet>>,
    next: AtomicUsize,
}

impl WalletPool {
    pub fn new(primary: Keypair) -> Self {
        Self {
            wallets: vec![Arc::new(TradingWallet::new(primary, "primary"))],
            next: AtomicUsize::new(0),
        }
    }

    pub fn with_wallet(mut self, keypair: Keypair) -> Self {
        let name = format!("wallet-{}", self.wallets.len() + 1);
        self.wallets.push(Arc::new(TradingWallet::new(keypair, name)));
        self
    }

    /// Primary from `primary_path`, then every extra path
    pub fn load(primary_path: &str, extra_paths: &[String]) -> Result<Self> {
        let mut pool = Self::new(load_keypair(Path::new(primary_path))?);
        for path in extra_paths {
            pool = pool.with_wallet(load_keypair(Path::new(path))?);
        }
        info!(
            "Loaded {} wallet(s), primary {}",
            pool.len(),
            pool.primary().pubkey()
        );
        Ok(pool)
    }

    pub fn primary(&self) -> Arc<TradingWallet> {
        self.wallets[0].clone()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn wallets(&self) -> &[Arc<TradingWallet>] {
        &self.wallets
    }

    /// Wallet for the next entry
    pub fn next_wallet(&self, multi_wallet: bool) -> Arc<TradingWallet> {
        if !multi_wallet || self.wallets.len() == 1 {
            return self.primary();
        }
        let index = self.next.fetch_add(1, Ordering::SeqCst) % self.wallets.len();
        self.wallets[index].clone()
    }
}
