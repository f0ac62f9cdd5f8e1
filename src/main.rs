use std::path::PathBuf;

use alloy::primitives::{
    utils::{parse_units, ParseUnits},
    Address, U256,
};
use clap::{Args, Parser, Subcommand};
use config::Config;
use eyre::bail;
use liquidity::{LiquidityTest, Tokens};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wrap::WrapRequest;

mod artifact;
mod bindings;
mod chain;
mod config;
mod liquidity;
mod wrap;

/// Scripted calls against the Kayen DEX and Chiliz wrapper factory.
#[derive(Parser)]
#[command(name = "kayen-scripts", version)]
struct Cli {
    /// TOML file layered over the built-in networks and compilers.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Network to run against; each command has its own default.
    #[arg(long, short, global = true)]
    network: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Swap then add liquidity twice, and report LP tokens minted to feeTo.
    LiquidityTest(LiquidityArgs),
    /// Wrap tokens through the wrapper factory.
    Wrap(WrapArgs),
    /// List configured networks.
    Networks,
    /// List the configured solc compilers.
    Compilers,
}

#[derive(Args)]
struct LiquidityArgs {
    /// Build artifact of the mintable mock token.
    #[arg(
        long,
        default_value = "artifacts/contracts/mocks/ERC20Mintable_decimal.sol/ERC20Mintable.json"
    )]
    artifact: PathBuf,

    /// Use an existing token A instead of deploying one.
    #[arg(long, requires = "token_b")]
    token_a: Option<Address>,

    #[arg(long, requires = "token_a")]
    token_b: Option<Address>,

    #[arg(long, default_value_t = 18)]
    decimals: u8,

    #[arg(long, default_value_t = liquidity::FACTORY)]
    factory: Address,

    #[arg(long, default_value_t = liquidity::ROUTER)]
    router: Address,

    /// Whole tokens minted to the deployer on each side.
    #[arg(long, default_value = "1000000")]
    mint: String,

    /// Base units of token A swapped for B.
    #[arg(long, default_value_t = U256::from(100_000))]
    swap: U256,

    /// Whole tokens per side for the first addLiquidity.
    #[arg(long, default_value = "10000")]
    first_batch: String,

    #[arg(long, default_value = "90000")]
    second_batch: String,

    #[arg(long, default_value_t = liquidity::DEADLINE)]
    deadline: u64,

    #[arg(long, default_value_t = liquidity::GAS_LIMIT)]
    gas_limit: u64,
}

#[derive(Args)]
struct WrapArgs {
    #[arg(long, default_value_t = wrap::WRAPPER_FACTORY)]
    factory: Address,

    #[arg(long, default_value_t = wrap::ACCOUNT)]
    account: Address,

    /// Underlying tokens, wrapped one after another.
    #[arg(long = "token", default_values_t = [wrap::TOKEN])]
    tokens: Vec<Address>,

    #[arg(long, default_value_t = U256::from(1))]
    amount: U256,
}

impl Command {
    fn default_network(&self) -> &'static str {
        match self {
            Command::Wrap(_) => "chiliz",
            _ => "spicy",
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,alloy_transport_http=warn,alloy_rpc_client=warn,hyper=warn")
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::builtin(),
    };
    let network_name = cli
        .network
        .clone()
        .unwrap_or_else(|| cli.command.default_network().to_string());

    match cli.command {
        Command::Networks => {
            for network in config.networks.values() {
                println!("{network}");
            }
        }
        Command::Compilers => {
            for compiler in &config.compilers {
                println!("{compiler}");
            }
        }
        Command::LiquidityTest(args) => {
            let network = config.network(&network_name)?;
            let tokens = match (args.token_a, args.token_b) {
                (Some(a), Some(b)) => Tokens::Existing { a, b },
                _ => Tokens::Deploy {
                    artifact: artifact::Artifact::load(&args.artifact)?,
                    decimals: args.decimals,
                },
            };
            let test = LiquidityTest {
                factory: args.factory,
                router: args.router,
                tokens,
                mint_amount: token_amount(&args.mint, args.decimals)?,
                swap_amount: args.swap,
                first_batch: token_amount(&args.first_batch, args.decimals)?,
                second_batch: token_amount(&args.second_batch, args.decimals)?,
                deadline: U256::from(args.deadline),
                gas_limit: args.gas_limit,
            };

            let session = chain::connect(network, explorer_for(&config, network)).await?;
            let report = test.run(&session).await?;
            println!("{report}");
            println!("DONE!!");
        }
        Command::Wrap(args) => {
            let network = config.network(&network_name)?;
            let request = WrapRequest {
                factory: args.factory,
                account: args.account,
                tokens: args.tokens,
                amount: args.amount,
            };

            let session = chain::connect(network, explorer_for(&config, network)).await?;
            for wrapped in request.run(&session).await? {
                println!(
                    "{} -> {} (tx {})",
                    wrapped.underlying, wrapped.wrapped, wrapped.tx_hash
                );
            }
            println!("Deployment completed successfully!");
        }
    }

    Ok(())
}

/// Whole-token amount in base units; negative input is refused rather than
/// silently taken by magnitude.
fn token_amount(amount: &str, decimals: u8) -> eyre::Result<U256> {
    match parse_units(amount, decimals)? {
        ParseUnits::U256(value) => Ok(value),
        ParseUnits::I256(_) => bail!("amount must not be negative: {amount}"),
    }
}

fn explorer_for(config: &Config, network: &config::Network) -> Option<config::Explorer> {
    network
        .chain_id
        .and_then(|id| config.explorer(id))
        .or_else(|| config.explorers.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn liquidity_defaults() {
        let cli = Cli::try_parse_from(["kayen-scripts", "liquidity-test"]).unwrap();
        assert_eq!(cli.command.default_network(), "spicy");
        let Command::LiquidityTest(args) = cli.command else {
            panic!("expected liquidity-test");
        };
        assert_eq!(args.factory, liquidity::FACTORY);
        assert_eq!(args.router, liquidity::ROUTER);
        assert_eq!(args.swap, U256::from(100_000));
        assert_eq!(args.deadline, 2720361379);
        assert_eq!(args.gas_limit, 5_000_000);
        assert_eq!(
            token_amount(&args.mint, args.decimals).unwrap(),
            U256::from(10u64).pow(U256::from(24))
        );
        assert_eq!(
            token_amount(&args.first_batch, args.decimals).unwrap(),
            U256::from(10u64).pow(U256::from(22))
        );
        assert!(args.token_a.is_none());
    }

    #[test]
    fn decimals_scale_every_amount() {
        let cli =
            Cli::try_parse_from(["kayen-scripts", "liquidity-test", "--decimals", "6"]).unwrap();
        let Command::LiquidityTest(args) = cli.command else {
            panic!("expected liquidity-test");
        };
        let amount = |s: &str| token_amount(s, args.decimals).unwrap();
        assert_eq!(amount(&args.mint), U256::from(10u64).pow(U256::from(12)));
        assert_eq!(amount(&args.first_batch), U256::from(10u64).pow(U256::from(10)));
        assert_eq!(amount(&args.second_batch), U256::from(90_000_000_000u64));
        assert!(amount(&args.first_batch) + amount(&args.second_batch) <= amount(&args.mint));
    }

    #[test]
    fn negative_amounts_are_refused() {
        let err = token_amount("-5", 18).unwrap_err().to_string();
        assert_eq!(err, "amount must not be negative: -5");
        assert!(token_amount("1.5", 18).is_ok());
        assert!(token_amount("abc", 18).is_err());

        let cli = Cli::try_parse_from(["kayen-scripts", "liquidity-test", "--mint=-5"]).unwrap();
        let Command::LiquidityTest(args) = cli.command else {
            panic!("expected liquidity-test");
        };
        assert!(token_amount(&args.mint, args.decimals).is_err());
    }

    #[test]
    fn existing_tokens_come_in_pairs() {
        let a = "0x6b1736CA01FD8fbad0330f94D6323B167486d67e";
        let b = "0xe0FDc63c229a76BE6Dfc785BbC7f6aE295eD12Ad";
        assert!(Cli::try_parse_from(["kayen-scripts", "liquidity-test", "--token-a", a]).is_err());

        let cli = Cli::try_parse_from([
            "kayen-scripts",
            "-n",
            "chiliz",
            "liquidity-test",
            "--token-a",
            a,
            "--token-b",
            b,
        ])
        .unwrap();
        assert_eq!(cli.network.as_deref(), Some("chiliz"));
    }

    #[test]
    fn wrap_defaults_and_multiple_tokens() {
        let cli = Cli::try_parse_from(["kayen-scripts", "wrap"]).unwrap();
        assert_eq!(cli.command.default_network(), "chiliz");
        let Command::Wrap(args) = cli.command else {
            panic!("expected wrap");
        };
        assert_eq!(args.tokens, vec![wrap::TOKEN]);
        assert_eq!(args.amount, U256::from(1));
        assert_eq!(args.account, wrap::ACCOUNT);

        let cli = Cli::try_parse_from([
            "kayen-scripts",
            "wrap",
            "--token",
            "0x0000000000000000000000000000000000000001",
            "--token",
            "0x0000000000000000000000000000000000000002",
            "--amount",
            "5",
        ])
        .unwrap();
        let Command::Wrap(args) = cli.command else {
            panic!("expected wrap");
        };
        assert_eq!(args.tokens.len(), 2);
        assert_eq!(args.amount, U256::from(5));
    }

    #[test]
    fn explorer_follows_chain_id() {
        let config = Config::builtin();
        let spicy = config.network("spicy").unwrap();
        assert_eq!(explorer_for(&config, spicy).unwrap().chain_id, 88882);
        let chiliz = config.network("chiliz").unwrap();
        assert_eq!(explorer_for(&config, chiliz).unwrap().chain_id, 88888);
    }
}
