//! chainkit: command-line front end for the wallet engine.
//!
//! Derives and validates addresses, runs the UTXO selector over amounts given
//! on the command line, prints the chain table and refreshes watch-only
//! balances through the configured providers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chainkit_chains::{BitcoinAdapter, BuilderKind, ChainPlugins, EthereumAdapter, PolkadotAdapter};
use chainkit_core::{Address, AddressKind, AmountType, ChainFamily, ChainSpec, Curve, PublicKey, Wallet};
use chainkit_network::EngineConfig;
use chainkit_wallet::{select_utxos, ChainAdapter, KeySigner, WalletManager};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};
use zeroize::Zeroizing;

/// Multi-network wallet engine.
#[derive(Parser, Debug)]
#[command(name = "chainkit", version, about = "Multi-network wallet engine")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Configuration file (default: <config dir>/chainkit/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Derive or validate addresses.
    Address {
        #[command(subcommand)]
        action: AddressAction,
    },
    /// Run the UTXO selector over output amounts.
    Select(SelectArgs),
    /// Print the chain table.
    Chains,
    /// Refresh and print the balances of a watch-only wallet.
    Balance(BalanceArgs),
}

#[derive(Subcommand, Debug)]
enum AddressAction {
    /// Every address encoding of a key.
    Derive(DeriveArgs),
    /// Check an address against a chain's format and checksum.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct DeriveArgs {
    /// Chain id (see `chainkit chains`).
    #[arg(short, long)]
    chain: String,

    /// Hex-encoded public key.
    #[arg(long, conflicts_with = "secret", required_unless_present = "secret")]
    public_key: Option<String>,

    /// Hex-encoded 32-byte private key.
    #[arg(long)]
    secret: Option<String>,

    /// Key curve (default: the chain's primary curve).
    #[arg(long)]
    curve: Option<Curve>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[arg(short, long)]
    chain: String,

    address: String,
}

#[derive(Args, Debug)]
struct SelectArgs {
    /// Amount to spend, in minimal units.
    #[arg(long, allow_negative_numbers = true)]
    spend: i128,

    /// Fee, in minimal units.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    fee: i128,

    /// Change below this value pulls in one more output.
    #[arg(long)]
    dust: Option<u64>,

    /// Available output amounts.
    #[arg(required = true, allow_negative_numbers = true)]
    outputs: Vec<i128>,
}

#[derive(Args, Debug)]
struct BalanceArgs {
    #[arg(short, long)]
    chain: String,

    /// Address to watch; the first one is the default address.
    #[arg(long = "address", required = true)]
    addresses: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Address { action } => match action {
            AddressAction::Derive(args) => address_derive(&config, args),
            AddressAction::Validate(args) => address_validate(&config, args),
        },
        Commands::Select(args) => select(args),
        Commands::Chains => chains(&config),
        Commands::Balance(args) => balance(&config, args).await,
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chainkit").join("config.toml"))
}

/// An explicit path must exist; the default one is used only when present.
fn load_config(explicit: Option<&Path>) -> Result<EngineConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_config_path().filter(|p| p.exists()),
    };
    debug!(path = ?path, "loading configuration");
    EngineConfig::load(path.as_deref()).with_context(|| match &path {
        Some(path) => format!("failed to load {}", path.display()),
        None => "failed to load configuration from the environment".to_string(),
    })
}

fn chain_spec(config: &EngineConfig, id: &str) -> Result<Arc<ChainSpec>> {
    config.registry().get(id).context("see `chainkit chains` for known ids")
}

fn parse_hex(label: &str, input: &str) -> Result<Vec<u8>> {
    hex::decode(input.trim_start_matches("0x")).with_context(|| format!("{label} is not valid hex"))
}

fn address_derive(config: &EngineConfig, args: DeriveArgs) -> Result<()> {
    let spec = chain_spec(config, &args.chain)?;
    let plugins = ChainPlugins::for_chain(&spec)?;
    let curve = args.curve.unwrap_or_else(|| spec.primary_curve());

    let public_key = match (args.secret, args.public_key) {
        (Some(secret), _) => {
            let secret = Zeroizing::new(secret);
            KeySigner::from_hex(curve, &secret)?.public_key().to_vec()
        }
        (None, Some(public_key)) => parse_hex("public key", &public_key)?,
        (None, None) => bail!("one of --secret or --public-key is required"),
    };

    for address in plugins.address_service.make_addresses(&public_key, curve)? {
        println!("{:<8} {}", kind_label(address.kind), address.value);
    }
    Ok(())
}

fn address_validate(config: &EngineConfig, args: ValidateArgs) -> Result<()> {
    let spec = chain_spec(config, &args.chain)?;
    let plugins = ChainPlugins::for_chain(&spec)?;
    if !plugins.address_service.validate(&args.address) {
        bail!("{} is not a valid {} address", args.address, spec.name);
    }
    println!("valid");
    Ok(())
}

/// Selector inputs are unsigned; a negative value is an invalid argument.
fn non_negative(label: &str, value: i128) -> Result<u64> {
    if value < 0 {
        bail!("invalid argument: {label} must not be negative (got {value})");
    }
    u64::try_from(value).with_context(|| format!("invalid argument: {label} exceeds {}", u64::MAX))
}

fn select(args: SelectArgs) -> Result<()> {
    let spend = non_negative("spend", args.spend)?;
    let fee = non_negative("fee", args.fee)?;
    let outputs = args
        .outputs
        .iter()
        .map(|&value| non_negative("output", value))
        .collect::<Result<Vec<_>>>()?;

    let selection = select_utxos(&outputs, spend, fee, args.dust)?;
    let picked: Vec<String> = selection.selected.iter().map(u64::to_string).collect();
    println!("selected:     {}", picked.join(" "));
    println!("total:        {}", selection.total);
    println!("target:       {}", selection.target);
    println!("change:       {}", selection.change());
    println!("sufficient:   {}", selection.is_sufficient());
    Ok(())
}

fn family_label(family: &ChainFamily) -> &'static str {
    match family {
        ChainFamily::Bitcoin { .. } => "bitcoin",
        ChainFamily::Ethereum { .. } => "ethereum",
        ChainFamily::Polkadot { .. } => "polkadot",
        ChainFamily::Koinos => "koinos",
    }
}

fn kind_label(kind: AddressKind) -> &'static str {
    match kind {
        AddressKind::Default => "default",
        AddressKind::Legacy => "legacy",
    }
}

fn chains(config: &EngineConfig) -> Result<()> {
    let registry = config.registry();
    let mut specs: Vec<&Arc<ChainSpec>> = registry.iter().collect();
    specs.sort_by(|a, b| a.id.cmp(&b.id));
    for spec in specs {
        let curves: Vec<String> = spec.curves.iter().map(Curve::to_string).collect();
        println!(
            "{:<18} {:<18} {:<6} {:>2}  {:<9} {}{}",
            spec.id.as_str(),
            spec.name,
            spec.symbol,
            spec.decimals,
            family_label(&spec.family),
            curves.join(","),
            if spec.testnet { "  (testnet)" } else { "" },
        );
    }
    Ok(())
}

/// Label for one balance line.
fn amount_label(amount_type: &AmountType) -> String {
    match amount_type {
        AmountType::Coin => "coin".to_string(),
        AmountType::Token(token) => format!("token {}", token.contract_address),
        AmountType::FeeResource(name) => name.clone(),
        AmountType::Reserve => "reserved".to_string(),
    }
}

fn watch_only_wallet(spec: Arc<ChainSpec>, plugins: &ChainPlugins, addresses: &[String]) -> Result<Wallet> {
    let mut watched = Vec::with_capacity(addresses.len());
    for (index, value) in addresses.iter().enumerate() {
        if !plugins.address_service.validate(value) {
            bail!("{value} is not a valid {} address", spec.name);
        }
        let kind = if index == 0 { AddressKind::Default } else { AddressKind::Legacy };
        watched.push(Address::new(value.clone(), kind, u8::try_from(index).unwrap_or(u8::MAX)));
    }
    Ok(Wallet::new(spec, PublicKey::new(Vec::new()), watched)?)
}

async fn refresh<A: ChainAdapter>(wallet: Wallet, adapter: A) -> Result<Wallet> {
    let mut manager = WalletManager::new(wallet, adapter);
    manager
        .update()
        .await
        .with_context(|| format!("balance refresh failed (last backend {})", manager.current_host()))?;
    info!(host = %manager.current_host(), "balances refreshed");
    Ok(manager.wallet().clone())
}

async fn balance(config: &EngineConfig, args: BalanceArgs) -> Result<()> {
    let spec = chain_spec(config, &args.chain)?;
    let plugins = ChainPlugins::for_chain(&spec)?;
    let wallet = watch_only_wallet(Arc::clone(&spec), &plugins, &args.addresses)?;

    let wallet = match plugins.kind {
        BuilderKind::Bitcoin => refresh(wallet, BitcoinAdapter::from_config(Arc::clone(&spec), config)?).await?,
        BuilderKind::Ethereum => refresh(wallet, EthereumAdapter::from_config(Arc::clone(&spec), config)?).await?,
        BuilderKind::Polkadot => refresh(wallet, PolkadotAdapter::from_config(Arc::clone(&spec), config)?).await?,
    };

    println!("{} {}", spec.name, wallet.address());
    let mut lines: Vec<(String, String)> =
        wallet.amounts().values().map(|a| (amount_label(&a.amount_type), a.to_string())).collect();
    lines.sort();
    for (label, amount) in lines {
        println!("  {label:<10} {amount}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["chainkit", "chains", "--log-format", "json", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Chains));
    }

    #[test]
    fn derive_needs_a_key() {
        assert!(Cli::try_parse_from(["chainkit", "address", "derive", "--chain", "bitcoin"]).is_err());
        assert!(Cli::try_parse_from([
            "chainkit", "address", "derive", "--chain", "bitcoin", "--secret", "01", "--public-key", "02",
        ])
        .is_err());
    }

    #[test]
    fn curve_parses_by_name() {
        let cli = Cli::try_parse_from([
            "chainkit", "address", "derive", "-c", "westend", "--public-key", "00", "--curve", "ed25519",
        ])
        .unwrap();
        let Commands::Address { action: AddressAction::Derive(args) } = cli.command else {
            panic!("expected address derive");
        };
        assert_eq!(args.curve, Some(Curve::Ed25519));
    }

    #[test]
    fn negative_selector_input_is_invalid() {
        let cli = Cli::try_parse_from(["chainkit", "select", "--spend", "-5", "10", "20"]).unwrap();
        let Commands::Select(args) = cli.command else {
            panic!("expected select");
        };
        let err = select(args).unwrap_err();
        assert!(err.to_string().starts_with("invalid argument"), "{err}");
        assert_eq!(non_negative("fee", 7).unwrap(), 7);
        assert!(non_negative("fee", i128::from(u64::MAX) + 1).is_err());
    }

    #[test]
    fn default_config_lives_under_chainkit() {
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("chainkit/config.toml"));
        }
    }

    #[test]
    fn watch_only_wallet_rejects_foreign_addresses() {
        let config = EngineConfig::mainnet();
        let spec = chain_spec(&config, "bitcoin").unwrap();
        let plugins = ChainPlugins::for_chain(&spec).unwrap();
        let ok = ["bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4".to_string()];
        let wallet = watch_only_wallet(Arc::clone(&spec), &plugins, &ok).unwrap();
        assert_eq!(wallet.address(), ok[0]);

        let foreign = ["0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf".to_string()];
        assert!(watch_only_wallet(spec, &plugins, &foreign).is_err());
    }

    #[test]
    fn balance_lines_are_labelled() {
        assert_eq!(amount_label(&AmountType::Coin), "coin");
        assert_eq!(amount_label(&AmountType::FeeResource("mana".into())), "mana");
        assert_eq!(amount_label(&AmountType::Reserve), "reserved");
    }
}
