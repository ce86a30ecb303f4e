//! On-chain market reads for a pump.fun token

use async_trait::async_trait;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;
use std::time::Duration;

use super::curve::BondingCurve;
use super::program::{derive_ata, derive_bonding_curve};
use crate::error::{Error, Result};
use crate::trading::rpc::ChainRpc;

/// How many signatures the activity count looks back over at most
const ACTIVITY_SIGNATURE_LIMIT: usize = 50;

#[async_trait]
pub trait MarketData: Send + Sync {
    /// `None` when the curve account does not exist
    async fn bonding_curve(&self, mint: &Pubkey) -> Result<Option<BondingCurve>>;

    /// Transactions against the curve within `window`
    async fn recent_activity(&self, mint: &Pubkey, window: Duration) -> Result<u32>;

    /// Raw token balance of `owner`'s associated account; 0 when absent
    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64>;

    /// Percent of supply held by each of the largest accounts, descending
    async fn holder_shares(&self, mint: &Pubkey, sample: usize) -> Result<Vec<f64>>;
}

/// [`MarketData`] straight from the chain RPC
pub struct RpcMarketData {
    rpc: Arc<dyn ChainRpc>,
}

impl RpcMarketData {
    pub fn new(rpc: Arc<dyn ChainRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl MarketData for RpcMarketData {
    async fn bonding_curve(&self, mint: &Pubkey) -> Result<Option<BondingCurve>> {
        let address = derive_bonding_curve(mint);
        match self.rpc.account_data(&address).await? {
            Some(data) => BondingCurve::decode(&data).map(Some),
            None => Ok(None),
        }
    }

    async fn recent_activity(&self, mint: &Pubkey, window: Duration) -> Result<u32> {
        let curve = derive_bonding_curve(mint);
        let signatures = self
            .rpc
            .recent_signatures(&curve, ACTIVITY_SIGNATURE_LIMIT)
            .await?;
        Ok(count_within_window(
            signatures.iter().map(|s| s.block_time),
            chrono::Utc::now().timestamp(),
            window,
        ))
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64> {
        let ata = derive_ata(owner, mint);
        match self.rpc.account_data(&ata).await? {
            Some(data) => spl_token::state::Account::unpack(&data)
                .map(|account| account.amount)
                .map_err(|e| Error::Rpc(format!("bad token account {}: {}", ata, e))),
            None => Ok(0),
        }
    }

    async fn holder_shares(&self, mint: &Pubkey, sample: usize) -> Result<Vec<f64>> {
        let supply = self.rpc.token_supply(mint).await?;
        if supply == 0 {
            return Ok(Vec::new());
        }
        let largest = self.rpc.largest_token_accounts(mint).await?;
        Ok(largest
            .into_iter()
            .take(sample)
            .map(|amount| amount as f64 / supply as f64 * 100.0)
            .collect())
    }
}

/// Count newest-first block times until one falls outside the window
///
/// Signatures without a block time are still in flight and count.
pub fn count_within_window<I>(block_times: I, now: i64, window: Duration) -> u32
where
    I: IntoIterator<Item = Option<i64>>,
{
    let window = window.as_secs() as i64;
    block_times
        .into_iter()
        .take_while(|t| t.map_or(true, |t| now - t <= window))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRpc;
    use crate::trading::rpc::RecentSignature;

    #[test]
    fn test_count_within_window_stops_at_first_old_signature() {
        let now = 1_000;
        let times = vec![Some(995), None, Some(950), Some(900), Some(999)];
        assert_eq!(count_within_window(times, now, Duration::from_secs(60)), 3);
    }

    #[tokio::test]
    async fn test_curve_read_through_rpc() {
        let rpc = Arc::new(FakeRpc::new("primary"));
        let mint = Pubkey::new_unique();
        let curve = BondingCurve::new(1_000_000_000_000, 40_000_000_000, 0, 10_000_000_000, 0, false);
        rpc.set_account(derive_bonding_curve(&mint), borsh::to_vec(&curve).unwrap());

        let market = RpcMarketData::new(rpc);
        assert_eq!(market.bonding_curve(&mint).await.unwrap(), Some(curve));
        assert_eq!(market.bonding_curve(&Pubkey::new_unique()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_activity_counts_recent_curve_signatures() {
        let rpc = Arc::new(FakeRpc::new("primary"));
        let mint = Pubkey::new_unique();
        let now = chrono::Utc::now().timestamp();
        rpc.set_signatures(
            derive_bonding_curve(&mint),
            vec![
                RecentSignature { signature: "a".into(), block_time: Some(now - 5) },
                RecentSignature { signature: "b".into(), block_time: Some(now - 30) },
                RecentSignature { signature: "c".into(), block_time: Some(now - 600) },
            ],
        );

        let market = RpcMarketData::new(rpc);
        let count = market.recent_activity(&mint, Duration::from_secs(60)).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_missing_token_account_is_zero_balance() {
        let rpc = Arc::new(FakeRpc::new("primary"));
        let market = RpcMarketData::new(rpc);
        let balance = market
            .token_balance(&Pubkey::new_unique(), &Pubkey::new_unique())
            .await
            .unwrap();
        assert_eq!(balance, 0);
    }

    #[tokio::test]
    async fn test_holder_shares_are_percent_of_supply() {
        let rpc = Arc::new(FakeRpc::new("primary"));
        let mint = Pubkey::new_unique();
        rpc.set_holders(mint, 1_000, vec![600, 100, 50, 10]);

        let market = RpcMarketData::new(rpc);
        let shares = market.holder_shares(&mint, 3).await.unwrap();
        assert_eq!(shares, vec![60.0, 10.0, 5.0]);
    }
}
