use std::fmt;

use alloy::{
    network::{Ethereum, TransactionBuilder},
    primitives::{address, Address, I256, U256},
    providers::Provider,
    transports::Transport,
};
use eyre::ensure;
use futures_util::future::try_join;
use tracing::info;

use crate::{
    artifact::{mintable_constructor, Artifact},
    bindings::{ERC20Mintable, KayenFactory, KayenPair, KayenRouter02},
    chain::{confirm, Session},
};

pub const FACTORY: Address = address!("fc1924E20d64AD4daA3A4947b4bAE6cDE77d2dBC");
pub const ROUTER: Address = address!("b82b0e988a1FcA39602c5079382D360C870b44c8");
pub const DEADLINE: u64 = 2720361379;
pub const GAS_LIMIT: u64 = 5_000_000;

pub enum Tokens {
    /// Fresh "BatchTokenA"/"BatchTokenB" pair from the mintable mock artifact.
    Deploy { artifact: Artifact, decimals: u8 },
    Existing { a: Address, b: Address },
}

pub struct LiquidityTest {
    pub factory: Address,
    pub router: Address,
    pub tokens: Tokens,
    pub mint_amount: U256,
    /// In base units of token A.
    pub swap_amount: U256,
    pub first_batch: U256,
    pub second_batch: U256,
    pub deadline: U256,
    pub gas_limit: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserves {
    pub reserve0: U256,
    pub reserve1: U256,
    pub block_timestamp_last: u32,
}

/// What the fee recipient held around the second `addLiquidity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeReport {
    pub pair: Address,
    pub fee_to: Address,
    pub lp_before: U256,
    pub lp_after: U256,
    pub k_last_before: U256,
    pub k_last_after: U256,
    pub reserves: Reserves,
}

impl FeeReport {
    /// LP tokens minted to `feeTo` by the second batch. Negative if the
    /// balance somehow went down.
    pub fn minted(&self) -> I256 {
        I256::from_raw(self.lp_after.wrapping_sub(self.lp_before))
    }
}

impl fmt::Display for Reserves {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            self.reserve0, self.reserve1, self.block_timestamp_last
        )
    }
}

impl fmt::Display for FeeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(49);
        writeln!(f, "{rule}")?;
        writeln!(f, "====Result Test{}", "=".repeat(34))?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Pair: {}", self.pair)?;
        writeln!(f, "feeTo: {}", self.fee_to)?;
        writeln!(f, "Reserves after swap: {}", self.reserves)?;
        writeln!(f, "LP Fee After First addliquidity: {}", self.lp_before)?;
        writeln!(f, "LP Fee After Second addliquidity: {}", self.lp_after)?;
        writeln!(f, "LP Fee Difference: {}", self.minted())?;
        writeln!(f, "kLast before swap: {}", self.k_last_before)?;
        write!(f, "kLast: {}", self.k_last_after)
    }
}

impl LiquidityTest {
    pub async fn run<P, T>(&self, session: &Session<P, T>) -> eyre::Result<FeeReport>
    where
        P: Provider<T, Ethereum>,
        T: Transport + Clone,
    {
        let deployer = session.deployer;
        let provider = &session.provider;

        let (token_a, token_b) = match &self.tokens {
            Tokens::Deploy { artifact, decimals } => {
                let a = session
                    .deploy(artifact.creation_code(&mintable_constructor(
                        "BatchTokenA",
                        "BTA",
                        *decimals,
                    )))
                    .await?;
                info!("Deployed erc20MintableA: {}", session.address_link(a));
                let b = session
                    .deploy(artifact.creation_code(&mintable_constructor(
                        "BatchTokenB",
                        "BTB",
                        *decimals,
                    )))
                    .await?;
                info!("Deployed erc20MintableB: {}", session.address_link(b));
                (a, b)
            }
            Tokens::Existing { a, b } => (*a, *b),
        };
        let token_a = ERC20Mintable::new(token_a, provider);
        let token_b = ERC20Mintable::new(token_b, provider);

        let mint_a = session
            .send(
                token_a
                    .mint(self.mint_amount, deployer)
                    .into_transaction_request(),
            )
            .await?;
        info!("Minted {} erc20MintableA to: {deployer}", self.mint_amount);
        let mint_b = session
            .send(
                token_b
                    .mint(self.mint_amount, deployer)
                    .into_transaction_request(),
            )
            .await?;
        info!("Minted {} erc20MintableB to: {deployer}", self.mint_amount);
        try_join(confirm(mint_a, "mint A"), confirm(mint_b, "mint B")).await?;

        let factory = KayenFactory::new(self.factory, provider);
        let fee_to = factory.feeTo().call().await?._0;
        info!("feeTo: {fee_to}");

        let router = KayenRouter02::new(self.router, provider);

        info!("====Start Test===================================");
        info!(
            "Msg.sender Balance TokenA: {}",
            token_a.balanceOf(deployer).call().await?._0
        );
        info!(
            "Msg.sender Balance TokenB: {}",
            token_b.balanceOf(deployer).call().await?._0
        );
        let approve_a = session
            .send(
                token_a
                    .approve(self.router, U256::MAX)
                    .into_transaction_request(),
            )
            .await?;
        let approve_b = session
            .send(
                token_b
                    .approve(self.router, U256::MAX)
                    .into_transaction_request(),
            )
            .await?;
        try_join(
            confirm(approve_a, "approve A"),
            confirm(approve_b, "approve B"),
        )
        .await?;

        let pair = factory
            .getPair(*token_a.address(), *token_b.address())
            .call()
            .await?
            .pair;
        ensure!(
            pair != Address::ZERO,
            "factory {} has no pair for {} / {}",
            self.factory,
            token_a.address(),
            token_b.address()
        );
        let pair = KayenPair::new(pair, provider);
        let token0 = pair.token0().call().await?._0;
        let token1 = pair.token1().call().await?._0;
        let total_supply = pair.totalSupply().call().await?._0;
        info!(pair = %pair.address(), %token0, %token1, %total_supply, "pair resolved");
        let k_last_before = pair.kLast().call().await?._0;
        info!("kLast: {k_last_before}");

        let swap = router
            .swapExactTokensForTokens(
                self.swap_amount,
                U256::ZERO,
                vec![*token_a.address(), *token_b.address()],
                deployer,
                self.deadline,
            )
            .into_transaction_request()
            .with_gas_limit(self.gas_limit);
        confirm(session.send(swap).await?, "swap").await?;

        let reserves = pair.getReserves().call().await?;
        let reserves = Reserves {
            reserve0: U256::from(reserves.reserve0),
            reserve1: U256::from(reserves.reserve1),
            block_timestamp_last: reserves.blockTimestampLast,
        };
        info!("Reserves: {reserves}");

        let first = self.add_liquidity(&router, &token_a, &token_b, self.first_batch, deployer);
        let first = session.send(first).await?;
        info!("First Batch Done...");
        confirm(first, "first addLiquidity").await?;

        let lp_before = pair.balanceOf(fee_to).call().await?._0;

        let second = self.add_liquidity(&router, &token_a, &token_b, self.second_batch, deployer);
        let second = session.send(second).await?;
        info!("Second Batch Done...");
        confirm(second, "second addLiquidity").await?;

        let lp_after = pair.balanceOf(fee_to).call().await?._0;
        let k_last_after = pair.kLast().call().await?._0;

        Ok(FeeReport {
            pair: *pair.address(),
            fee_to,
            lp_before,
            lp_after,
            k_last_before,
            k_last_after,
            reserves,
        })
    }

    fn add_liquidity<P, T>(
        &self,
        router: &KayenRouter02::KayenRouter02Instance<T, P>,
        token_a: &ERC20Mintable::ERC20MintableInstance<T, P>,
        token_b: &ERC20Mintable::ERC20MintableInstance<T, P>,
        amount: U256,
        to: Address,
    ) -> alloy::rpc::types::TransactionRequest
    where
        P: Provider<T, Ethereum>,
        T: Transport + Clone,
    {
        router
            .addLiquidity(
                *token_a.address(),
                *token_b.address(),
                amount,
                amount,
                U256::ZERO,
                U256::ZERO,
                to,
                self.deadline,
            )
            .into_transaction_request()
            .with_gas_limit(self.gas_limit)
    }
}
