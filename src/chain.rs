use std::marker::PhantomData;

use alloy::{
    network::{Ethereum, EthereumWallet, ReceiptResponse, TransactionBuilder},
    primitives::{utils::format_ether, Address, Bytes, U256},
    providers::{utils::Eip1559Estimation, PendingTransactionBuilder, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    transports::{
        http::{Client, Http},
        Transport,
    },
};
use eyre::{ensure, OptionExt};
use tracing::{debug, info};

use crate::config::{Explorer, Network};

/// One signer talking to one network for the lifetime of a script run.
pub struct Session<P, T> {
    pub provider: P,
    pub deployer: Address,
    pub chain_id: u64,
    pub network: Network,
    pub explorer: Option<Explorer>,
    fee_guard: FeeGuard,
    _phantom: PhantomData<T>,
}

pub async fn connect(
    network: &Network,
    explorer: Option<Explorer>,
) -> eyre::Result<Session<impl Provider<Http<Client>, Ethereum>, Http<Client>>> {
    let signer = network.signer()?;
    let deployer = signer.address();
    let rpc_url = network.rpc_url()?;

    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(EthereumWallet::from(signer))
        .on_http(rpc_url);

    let chain_id = provider.get_chain_id().await?;
    if let Some(expected) = network.chain_id {
        ensure!(
            chain_id == expected,
            "network `{}` expects chain id {expected} but {} reports {chain_id}",
            network.name,
            network.url
        );
    }
    info!(network = %network.name, chain_id, url = %network.url, "connected");

    let balance = provider.get_balance(deployer).await?;
    info!("Deployer: {deployer} ({} ETH)", format_ether(balance));

    Ok(Session {
        provider,
        deployer,
        chain_id,
        network: network.clone(),
        explorer: explorer.filter(|e| e.chain_id == chain_id),
        fee_guard: FeeGuard::new(network.tx_fee_cap),
        _phantom: PhantomData,
    })
}

impl<P, T> Session<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    /// Fills in the network's fixed gas settings and refuses anything whose
    /// worst-case fee exceeds the configured cap.
    pub async fn send(
        &self,
        mut tx: TransactionRequest,
    ) -> eyre::Result<PendingTransactionBuilder<T, Ethereum>> {
        if tx.from.is_none() {
            tx.from = Some(self.deployer);
        }
        if tx.gas.is_none() {
            tx.gas = self.network.gas;
        }
        if tx.gas_price.is_none() {
            tx.gas_price = self.network.gas_price;
        }
        if let Some(gas_limit) = tx.gas {
            let max_price = match tx.gas_price.or(tx.max_fee_per_gas) {
                Some(price) => price,
                None => {
                    let fees = self.provider.estimate_eip1559_fees(None).await?;
                    pin_eip1559_fees(&mut tx, fees)
                }
            };
            self.fee_guard.check(gas_limit, max_price)?;
        }

        let pending = self.provider.send_transaction(tx).await?;
        debug!(tx = %pending.tx_hash(), "sent");
        Ok(pending)
    }

    /// Deploys `code` (creation bytecode with constructor args appended).
    pub async fn deploy(&self, code: Bytes) -> eyre::Result<Address> {
        let tx = TransactionRequest::default().with_deploy_code(code);
        let receipt = confirm(self.send(tx).await?, "deployment").await?;
        receipt
            .contract_address
            .ok_or_eyre("deployment receipt has no contract address")
    }

    pub fn address_link(&self, address: Address) -> String {
        match &self.explorer {
            Some(explorer) => explorer.address_url(address),
            None => address.to_string(),
        }
    }
}

/// Fixes the 1559 fees on `tx` so the fillers cannot raise them past what
/// the fee guard saw. Returns the per-gas ceiling.
fn pin_eip1559_fees(tx: &mut TransactionRequest, fees: Eip1559Estimation) -> u128 {
    tx.max_fee_per_gas = Some(fees.max_fee_per_gas);
    tx.max_priority_fee_per_gas = Some(fees.max_priority_fee_per_gas);
    fees.max_fee_per_gas
}

/// Waits for the receipt and turns a reverted status into an error.
pub async fn confirm<T>(
    pending: PendingTransactionBuilder<T, Ethereum>,
    what: &str,
) -> eyre::Result<TransactionReceipt>
where
    T: Transport + Clone,
{
    let receipt = pending.get_receipt().await?;
    ensure!(
        receipt.status(),
        "{what} reverted in tx {}",
        receipt.transaction_hash
    );
    debug!(
        tx = %receipt.transaction_hash,
        gas_used = receipt.gas_used,
        "{what} confirmed"
    );
    Ok(receipt)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeGuard {
    cap: U256,
}

impl FeeGuard {
    pub fn new(cap: U256) -> Self {
        Self { cap }
    }

    pub fn check(&self, gas_limit: u64, gas_price: u128) -> eyre::Result<()> {
        let worst_case = U256::from(gas_limit) * U256::from(gas_price);
        ensure!(
            worst_case <= self.cap,
            "worst-case fee {worst_case} wei ({gas_limit} gas at {gas_price} wei) exceeds cap of {} wei",
            self.cap
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use alloy::{node_bindings::AnvilInstance, primitives::Bytes, primitives::U256};

    use crate::config::Network;

    /// Answers every call with one zero word.
    pub const ZERO_WORD_RUNTIME: [u8; 5] = [0x60, 0x20, 0x60, 0x00, 0xf3];
    /// Reverts every call with empty data.
    pub const REVERT_RUNTIME: [u8; 5] = [0x60, 0x00, 0x60, 0x00, 0xfd];

    /// Creation code that installs `runtime` as-is.
    pub fn creation_code(runtime: &[u8]) -> Bytes {
        let len = u8::try_from(runtime.len()).expect("short runtime");
        let mut code = vec![
            0x60, len, 0x60, 0x0c, 0x60, 0x00, 0x39, 0x60, len, 0x60, 0x00, 0xf3,
        ];
        code.extend_from_slice(runtime);
        code.into()
    }

    pub fn anvil_network(anvil: &AnvilInstance, key_env: &str) -> Network {
        std::env::set_var(key_env, alloy::hex::encode(anvil.keys()[0].to_bytes()));
        Network {
            name: "anvil".to_string(),
            url: anvil.endpoint(),
            chain_id: Some(anvil.chain_id()),
            key_env: key_env.to_string(),
            gas: None,
            gas_price: None,
            tx_fee_cap: U256::MAX,
            allow_unlimited_contract_size: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::{anvil_network, creation_code, REVERT_RUNTIME};
    use super::*;
    use alloy::node_bindings::Anvil;

    #[test]
    fn fee_guard_allows_up_to_cap() {
        let guard = FeeGuard::new(U256::from(5_000_000u64 * 1_000));
        assert!(guard.check(5_000_000, 1_000).is_ok());
        assert!(guard.check(4_999_999, 1_000).is_ok());
        assert!(guard.check(0, u128::MAX).is_ok());
    }

    #[test]
    fn fee_guard_rejects_over_cap() {
        let guard = FeeGuard::new(U256::from(1_000_000u64));
        let err = guard.check(5_000_000, 1).unwrap_err().to_string();
        assert!(err.contains("exceeds cap of 1000000 wei"));
    }

    #[test]
    fn fee_guard_checks_eip1559_ceiling_not_legacy_price() {
        let gas_limit = 5_000_000u64;
        let legacy_price = 1_000_000_001u128;
        let fees = Eip1559Estimation {
            max_fee_per_gas: 2_000_000_001,
            max_priority_fee_per_gas: 1,
        };

        let mut tx = TransactionRequest::default().with_gas_limit(gas_limit);
        let ceiling = pin_eip1559_fees(&mut tx, fees);
        assert_eq!(ceiling, 2_000_000_001);
        assert_eq!(tx.max_fee_per_gas, Some(2_000_000_001));
        assert_eq!(tx.max_priority_fee_per_gas, Some(1));

        // cap sits between the legacy product and the 1559 worst case
        let guard = FeeGuard::new(U256::from(gas_limit) * U256::from(1_500_000_000u64));
        assert!(guard.check(gas_limit, legacy_price).is_ok());
        assert!(guard.check(gas_limit, ceiling).is_err());
    }

    #[test]
    fn fee_guard_does_not_overflow() {
        let guard = FeeGuard::new(U256::MAX);
        assert!(guard.check(u64::MAX, u128::MAX).is_ok());
    }

    #[tokio::test]
    #[ignore = "spawns anvil"]
    async fn deploys_through_session() -> eyre::Result<()> {
        let anvil = Anvil::new().try_spawn()?;
        let network = anvil_network(&anvil, "KAYEN_SCRIPTS_TEST_ANVIL_DEPLOY");
        let session = connect(&network, None).await?;
        assert_eq!(session.deployer, anvil.addresses()[0]);

        // single STOP byte as runtime
        let deployed = session.deploy(creation_code(&[0x00])).await?;
        let runtime = session.provider.get_code_at(deployed).await?;
        assert_eq!(runtime.as_ref(), &[0x00]);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "spawns anvil"]
    async fn refuses_wrong_chain_and_fee_cap() -> eyre::Result<()> {
        let anvil = Anvil::new().try_spawn()?;
        let mut network = anvil_network(&anvil, "KAYEN_SCRIPTS_TEST_ANVIL_GUARDS");

        network.chain_id = Some(88888);
        let err = connect(&network, None).await.err().expect("chain id mismatch");
        assert!(err.to_string().contains("expects chain id 88888"));

        network.chain_id = Some(anvil.chain_id());
        network.tx_fee_cap = U256::from(1);
        network.gas = Some(21_000);
        let session = connect(&network, None).await?;
        let tx = TransactionRequest::default()
            .with_to(Address::ZERO)
            .with_value(U256::from(1));
        let err = session.send(tx).await.err().expect("over fee cap");
        assert!(err.to_string().contains("exceeds cap"));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "spawns anvil"]
    async fn confirm_reports_reverted_receipt() -> eyre::Result<()> {
        let anvil = Anvil::new().try_spawn()?;
        let network = anvil_network(&anvil, "KAYEN_SCRIPTS_TEST_ANVIL_REVERT");
        let session = connect(&network, None).await?;
        let reverter = session.deploy(creation_code(&REVERT_RUNTIME)).await?;

        // explicit limit so estimation does not catch the revert first
        let tx = TransactionRequest::default()
            .with_to(reverter)
            .with_gas_limit(100_000);
        let pending = session.send(tx).await?;
        let hash = *pending.tx_hash();
        let err = confirm(pending, "poke").await.unwrap_err().to_string();
        assert_eq!(err, format!("poke reverted in tx {hash}"));
        Ok(())
    }

    #[tokio::test]
    #[ignore = "spawns anvil"]
    async fn fee_cap_applies_to_eip1559_ceiling() -> eyre::Result<()> {
        let anvil = Anvil::new().try_spawn()?;
        let mut network = anvil_network(&anvil, "KAYEN_SCRIPTS_TEST_ANVIL_1559");
        let gas_limit = 21_000u64;

        let estimator = connect(&network, None).await?;
        let fees = estimator.provider.estimate_eip1559_fees(None).await?;
        drop(estimator);

        network.tx_fee_cap =
            U256::from(gas_limit) * U256::from(fees.max_fee_per_gas) - U256::from(1);
        let session = connect(&network, None).await?;
        let tx = TransactionRequest::default()
            .with_to(Address::repeat_byte(0x42))
            .with_value(U256::from(1))
            .with_gas_limit(gas_limit);
        let err = session.send(tx).await.err().expect("one wei over the cap");
        assert!(err.to_string().contains("exceeds cap"));
        Ok(())
    }
}
