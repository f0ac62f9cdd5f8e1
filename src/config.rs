use std::{collections::BTreeMap, env, fmt, fs, path::Path, str::FromStr};

use alloy::{
    primitives::{Address, B256, U256},
    signers::local::PrivateKeySigner,
};
use eyre::{bail, OptionExt, WrapErr};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

/// Everything a script run needs to know before it touches a chain.
#[derive(Debug, Clone)]
pub struct Config {
    pub networks: BTreeMap<String, Network>,
    pub compilers: Vec<Compiler>,
    pub explorers: Vec<Explorer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Network {
    #[serde(skip)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    /// Name of the environment variable holding the hex private key.
    pub key_env: String,
    /// Fixed gas limit; estimated per transaction when absent.
    #[serde(default)]
    pub gas: Option<u64>,
    /// Fixed legacy gas price in wei; queried from the node when absent.
    #[serde(default)]
    pub gas_price: Option<u128>,
    #[serde(default = "default_fee_cap", deserialize_with = "wei")]
    pub tx_fee_cap: U256,
    #[serde(default)]
    pub allow_unlimited_contract_size: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Compiler {
    pub version: String,
    #[serde(default)]
    pub optimizer: Optimizer,
    #[serde(default)]
    pub evm_version: Option<String>,
    #[serde(default)]
    pub via_ir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Optimizer {
    pub enabled: bool,
    pub runs: u32,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self {
            enabled: true,
            runs: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Explorer {
    pub chain_id: u64,
    pub api_url: String,
    pub browser_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    networks: BTreeMap<String, Network>,
    #[serde(default)]
    compilers: Vec<Compiler>,
    #[serde(default)]
    explorers: Vec<Explorer>,
}

fn default_fee_cap() -> U256 {
    U256::from(10u64).pow(U256::from(26))
}

/// TOML integers stop at i64, so large wei values are usually written as strings.
fn wei<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Str(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(U256::from(v)),
        Raw::Str(s) => U256::from_str(s.trim()).map_err(serde::de::Error::custom),
    }
}

impl Config {
    /// The Chiliz networks, compiler set and routescan explorers the scripts ship with.
    pub fn builtin() -> Self {
        let network = |name: &str,
                       url: &str,
                       chain_id: Option<u64>,
                       key_env: &str,
                       allow_unlimited_contract_size: bool| Network {
            name: name.to_string(),
            url: url.to_string(),
            chain_id,
            key_env: key_env.to_string(),
            gas: None,
            gas_price: None,
            tx_fee_cap: default_fee_cap(),
            allow_unlimited_contract_size,
        };

        let networks = [
            network(
                "spicy",
                "https://spicy-rpc.chiliz.com/",
                Some(88882),
                "TESTNET_KEY",
                true,
            ),
            network(
                "chiliz",
                "https://chiliz.publicnode.com/",
                Some(88888),
                "MAINNET_KEY",
                true,
            ),
            network(
                "routescan",
                "https://chiliz.publicnode.com/",
                None,
                "PRIVATE_KEY",
                false,
            ),
        ]
        .into_iter()
        .map(|n| (n.name.clone(), n))
        .collect();

        let london = |version: &str| Compiler {
            version: version.to_string(),
            optimizer: Optimizer::default(),
            evm_version: Some("london".to_string()),
            via_ir: false,
        };
        let compilers = vec![
            Compiler {
                version: "0.8.20".to_string(),
                optimizer: Optimizer::default(),
                evm_version: None,
                via_ir: true,
            },
            london("0.8.9"),
            london("0.8.0"),
            london("0.5.16"),
            london("0.6.6"),
        ];

        let explorers = vec![
            Explorer {
                chain_id: 88888,
                api_url: "https://api.routescan.io/v2/network/mainnet/evm/88888/etherscan"
                    .to_string(),
                browser_url: "https://routescan.io".to_string(),
            },
            Explorer {
                chain_id: 88882,
                api_url: "https://api.routescan.io/v2/network/testnet/evm/88882/etherscan"
                    .to_string(),
                browser_url: "https://routescan.io".to_string(),
            },
        ];

        Self {
            networks,
            compilers,
            explorers,
        }
    }

    /// Built-in config with the entries of a TOML file layered on top.
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let raw = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading config {}", path.display()))?;
        Self::builtin()
            .merge_toml(&raw)
            .wrap_err_with(|| format!("parsing config {}", path.display()))
    }

    fn merge_toml(mut self, raw: &str) -> eyre::Result<Self> {
        let file: ConfigFile = toml::from_str(raw)?;

        for (name, mut network) in file.networks {
            network.name = name.clone();
            network.rpc_url()?;
            self.networks.insert(name, network);
        }
        for compiler in file.compilers {
            match self
                .compilers
                .iter_mut()
                .find(|c| c.version == compiler.version)
            {
                Some(existing) => *existing = compiler,
                None => self.compilers.push(compiler),
            }
        }
        for explorer in file.explorers {
            self.explorers.retain(|e| e.chain_id != explorer.chain_id);
            self.explorers.push(explorer);
        }

        Ok(self)
    }

    pub fn network(&self, name: &str) -> eyre::Result<&Network> {
        match self.networks.get(name) {
            Some(network) => Ok(network),
            None => bail!(
                "unknown network `{name}` (configured: {})",
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        }
    }

    pub fn explorer(&self, chain_id: u64) -> Option<&Explorer> {
        self.explorers.iter().find(|e| e.chain_id == chain_id)
    }
}

impl Network {
    pub fn rpc_url(&self) -> eyre::Result<Url> {
        let url = Url::parse(&self.url)
            .wrap_err_with(|| format!("network `{}` has an invalid RPC URL", self.name))?;
        match url.scheme() {
            "http" | "https" if url.host().is_some() => Ok(url),
            _ => bail!(
                "network `{}` RPC URL must be http(s) with a host: {}",
                self.name,
                self.url
            ),
        }
    }

    pub fn signer(&self) -> eyre::Result<PrivateKeySigner> {
        let key = env::var(&self.key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_eyre(format!(
                "{} is not set (signing key for network `{}`)",
                self.key_env, self.name
            ))?;
        let key = B256::from_str(key.trim())
            .wrap_err_with(|| format!("{} is not a 32-byte hex private key", self.key_env))?;
        Ok(PrivateKeySigner::from_bytes(&key)?)
    }

    fn key_status(&self) -> &'static str {
        match env::var(&self.key_env) {
            Ok(k) if !k.trim().is_empty() => "set",
            _ => "missing",
        }
    }
}

/// Never prints the key itself, only where it comes from.
impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain = self
            .chain_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "any".to_string());
        let gas = self
            .gas
            .map(|g| g.to_string())
            .unwrap_or_else(|| "auto".to_string());
        let gas_price = self
            .gas_price
            .map(|g| g.to_string())
            .unwrap_or_else(|| "auto".to_string());
        write!(
            f,
            "{:<10} chain {:<6} {} key ${} ({}) gas {} gas price {} fee cap {}",
            self.name,
            chain,
            self.url,
            self.key_env,
            self.key_status(),
            gas,
            gas_price,
            self.tx_fee_cap
        )?;
        if self.allow_unlimited_contract_size {
            write!(f, " unlimited contract size")?;
        }
        Ok(())
    }
}

impl fmt::Display for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "solc {:<7}", self.version)?;
        if self.optimizer.enabled {
            write!(f, " optimizer runs {}", self.optimizer.runs)?;
        } else {
            write!(f, " optimizer off")?;
        }
        if let Some(evm) = &self.evm_version {
            write!(f, " evm {evm}")?;
        }
        if self.via_ir {
            write!(f, " via-ir")?;
        }
        Ok(())
    }
}

impl Explorer {
    pub fn address_url(&self, address: Address) -> String {
        format!(
            "{}/address/{address}",
            self.browser_url.trim_end_matches('/')
        )
    }

    pub fn tx_url(&self, hash: B256) -> String {
        format!("{}/tx/{hash}", self.browser_url.trim_end_matches('/'))
    }
}
