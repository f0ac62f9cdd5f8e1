use std::{fs, path::Path, str::FromStr};

use alloy::{
    primitives::Bytes,
    sol_types::{sol_data, SolType},
};
use eyre::{ensure, WrapErr};
use serde::Deserialize;

/// Creation bytecode read from a Hardhat or Foundry build artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: Option<String>,
    pub bytecode: Bytes,
}

#[derive(Deserialize)]
struct RawArtifact {
    #[serde(rename = "contractName", default)]
    contract_name: Option<String>,
    bytecode: RawBytecode,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    // hardhat
    Hex(String),
    // forge
    Object { object: String },
}

impl Artifact {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let raw = fs::read_to_string(path)
            .wrap_err_with(|| format!("reading artifact {}", path.display()))?;
        Self::from_json(&raw).wrap_err_with(|| format!("parsing artifact {}", path.display()))
    }

    pub fn from_json(raw: &str) -> eyre::Result<Self> {
        let raw: RawArtifact = serde_json::from_str(raw)?;
        let hex = match raw.bytecode {
            RawBytecode::Hex(hex) => hex,
            RawBytecode::Object { object } => object,
        };
        let bytecode = Bytes::from_str(hex.trim())?;
        ensure!(
            !bytecode.is_empty(),
            "artifact {} has no creation bytecode (interface or abstract contract?)",
            raw.contract_name.as_deref().unwrap_or("<unnamed>")
        );

        Ok(Self {
            name: raw.contract_name,
            bytecode,
        })
    }

    /// Creation code followed by the ABI-encoded constructor arguments.
    pub fn creation_code(&self, constructor_args: &[u8]) -> Bytes {
        [self.bytecode.as_ref(), constructor_args].concat().into()
    }
}

/// `constructor(string name, string symbol, uint8 decimals)` of the mintable mock token.
pub fn mintable_constructor(name: &str, symbol: &str, decimals: u8) -> Vec<u8> {
    <(sol_data::String, sol_data::String, sol_data::Uint<8>)>::abi_encode_params(&(
        name.to_string(),
        symbol.to_string(),
        decimals,
    ))
}
