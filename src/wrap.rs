use alloy::{
    network::Ethereum,
    primitives::{address, Address, B256, U256},
    providers::Provider,
    transports::Transport,
};
use eyre::ensure;
use tracing::info;

use crate::{
    bindings::ChilizWrapperFactory,
    chain::{confirm, Session},
};

pub const WRAPPER_FACTORY: Address = address!("9A2a89c376d77ebF747D229dA534FdEBf39BB6FA");
pub const ACCOUNT: Address = address!("86d36bd2EEfB7974B9D0720Af3418FC7Ca5C8897");
pub const TOKEN: Address = address!("c2661815C69c2B3924D3dd0c2C1358A1E38A3105");

pub struct WrapRequest {
    pub factory: Address,
    pub account: Address,
    pub tokens: Vec<Address>,
    pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wrapped {
    pub underlying: Address,
    pub wrapped: Address,
    pub tx_hash: B256,
}

impl WrapRequest {
    pub fn validate(&self) -> eyre::Result<()> {
        ensure!(!self.tokens.is_empty(), "no tokens to wrap");
        ensure!(
            self.factory != Address::ZERO,
            "wrapper factory address is zero"
        );
        Ok(())
    }

    /// Wraps each token in order, waiting for one to land before sending the next.
    pub async fn run<P, T>(&self, session: &Session<P, T>) -> eyre::Result<Vec<Wrapped>>
    where
        P: Provider<T, Ethereum>,
        T: Transport + Clone,
    {
        self.validate()?;
        let factory = ChilizWrapperFactory::new(self.factory, &session.provider);

        let mut done = Vec::with_capacity(self.tokens.len());
        for &token in &self.tokens {
            // eth_call first so the wrapped address is known before paying for it
            let wrapped = factory
                .wrap(self.account, token, self.amount)
                .from(session.deployer)
                .call()
                .await?
                .wrappedToken;

            let tx = factory
                .wrap(self.account, token, self.amount)
                .into_transaction_request();
            let receipt = confirm(session.send(tx).await?, "wrap").await?;
            info!(
                underlying = %token,
                wrapped = %session.address_link(wrapped),
                tx = %receipt.transaction_hash,
                "wrapped {} for {}",
                self.amount,
                self.account
            );

            done.push(Wrapped {
                underlying: token,
                wrapped,
                tx_hash: receipt.transaction_hash,
            });
        }

        Ok(done)
    }
}
