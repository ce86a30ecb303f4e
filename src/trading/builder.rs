//! Buy/sell plan construction against the bonding curve

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use super::plan::{TradeSide, TxPlan};
use crate::error::{Error, Result};
use crate::pump::curve::{max_sol_with_slippage, min_sol_with_slippage};
use crate::pump::instruction::{self, TradeAccounts};
use crate::pump::MarketData;

/// A plan plus what it is expected to yield
#[derive(Debug, Clone)]
pub struct QuotedPlan {
    pub plan: TxPlan,
    /// Raw tokens for a buy, lamports for a sell
    pub expected_out: u64,
}

#[async_trait]
pub trait TradeBuilder: Send + Sync {
    async fn buy(
        &self,
        mint: &Pubkey,
        buyer: &Pubkey,
        sol_lamports: u64,
        slippage_bps: u32,
    ) -> Result<QuotedPlan>;

    async fn sell(
        &self,
        mint: &Pubkey,
        seller: &Pubkey,
        token_amount: u64,
        slippage_bps: u32,
    ) -> Result<QuotedPlan>;
}

/// Quotes from the live curve and encodes pump.fun instructions
pub struct PumpTradeBuilder {
    market: Arc<dyn MarketData>,
}

impl PumpTradeBuilder {
    pub fn new(market: Arc<dyn MarketData>) -> Self {
        Self { market }
    }
}

#[async_trait]
impl TradeBuilder for PumpTradeBuilder {
    async fn buy(
        &self,
        mint: &Pubkey,
        buyer: &Pubkey,
        sol_lamports: u64,
        slippage_bps: u32,
    ) -> Result<QuotedPlan> {
        let curve = self
            .market
            .bonding_curve(mint)
            .await?
            .ok_or_else(|| Error::PriceUnavailable(mint.to_string()))?;
        if curve.complete {
            return Err(Error::TransactionBuild(format!("curve for {} is complete", mint)));
        }

        let quoted = curve.tokens_for_sol(sol_lamports)?;
        // Ask for slightly fewer tokens so a moving price does not fail the buy
        let token_amount = min_sol_with_slippage(quoted, slippage_bps);
        if token_amount == 0 {
            return Err(Error::TransactionBuild("buy quote is zero tokens".into()));
        }
        let max_sol_cost = max_sol_with_slippage(sol_lamports, slippage_bps);

        let accounts = TradeAccounts::derive(mint, buyer);
        let instructions = vec![
            instruction::create_user_ata(&accounts),
            instruction::buy(&accounts, token_amount, max_sol_cost),
        ];

        Ok(QuotedPlan {
            plan: TxPlan::new(format!("buy {}", mint), TradeSide::Buy, instructions),
            expected_out: token_amount,
        })
    }

    async fn sell(
        &self,
        mint: &Pubkey,
        seller: &Pubkey,
        token_amount: u64,
        slippage_bps: u32,
    ) -> Result<QuotedPlan> {
        if token_amount == 0 {
            return Err(Error::TransactionBuild("nothing to sell".into()));
        }
        let curve = self
            .market
            .bonding_curve(mint)
            .await?
            .ok_or_else(|| Error::PriceUnavailable(mint.to_string()))?;

        let expected = curve.sol_for_tokens(token_amount)?;
        let min_sol_output = min_sol_with_slippage(expected, slippage_bps);

        let accounts = TradeAccounts::derive(mint, seller);
        let instructions = vec![instruction::sell(&accounts, token_amount, min_sol_output)];

        Ok(QuotedPlan {
            plan: TxPlan::new(format!("sell {}", mint), TradeSide::Sell, instructions),
            expected_out: expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::BondingCurve;
    use crate::testing::FakeMarket;

    fn market_with_curve(mint: Pubkey, complete: bool) -> Arc<FakeMarket> {
        let market = Arc::new(FakeMarket::default());
        market.set_curve(
            mint,
            BondingCurve::new(
                1_073_000_000_000_000,
                30_000_000_000,
                793_100_000_000_000,
                0,
                1_000_000_000_000_000,
                complete,
            ),
        );
        market
    }

    #[tokio::test]
    async fn test_buy_plan_applies_slippage() {
        let mint = Pubkey::new_unique();
        let builder = PumpTradeBuilder::new(market_with_curve(mint, false));

        let quoted = builder
            .buy(&mint, &Pubkey::new_unique(), 100_000_000, 1500)
            .await
            .unwrap();
        assert_eq!(quoted.plan.side, TradeSide::Buy);
        assert_eq!(quoted.plan.instructions.len(), 2);

        let data = &quoted.plan.instructions[1].data;
        let amount = u64::from_le_bytes(data[8..16].try_into().unwrap());
        let max_cost = u64::from_le_bytes(data[16..24].try_into().unwrap());
        assert_eq!(amount, quoted.expected_out);
        assert_eq!(max_cost, 115_000_000);
    }

    #[tokio::test]
    async fn test_buy_refuses_complete_or_missing_curve() {
        let mint = Pubkey::new_unique();
        let builder = PumpTradeBuilder::new(market_with_curve(mint, true));
        assert!(builder.buy(&mint, &Pubkey::new_unique(), 1_000, 100).await.is_err());

        let missing = Pubkey::new_unique();
        let err = builder
            .buy(&missing, &Pubkey::new_unique(), 1_000, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PriceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_sell_plan() {
        let mint = Pubkey::new_unique();
        let builder = PumpTradeBuilder::new(market_with_curve(mint, false));

        let quoted = builder
            .sell(&mint, &Pubkey::new_unique(), 1_000_000_000, 1000)
            .await
            .unwrap();
        assert_eq!(quoted.plan.side, TradeSide::Sell);
        assert!(quoted.expected_out > 0);
        assert!(builder.sell(&mint, &Pubkey::new_unique(), 0, 1000).await.is_err());
    }
}
