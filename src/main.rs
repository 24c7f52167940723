//! Coldvault CLI Application
//!
//! Gateway side of the air-gapped multisig ceremony.

use clap::{Parser, Subcommand};
use coldvault::cli;
use coldvault::config::{GatewayConfig, Overrides};
use coldvault::crypto::Network;
use coldvault::qr::EccLevel;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coldvault")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Air-gapped M-of-N Bitcoin cold storage gateway", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// mainnet or testnet
    #[arg(long)]
    network: Option<Network>,

    /// Signatures required (M)
    #[arg(short = 'm', long)]
    threshold: Option<usize>,

    /// Cosigners in the wallet (N)
    #[arg(short = 'n', long)]
    participants: Option<usize>,

    /// Gateway account xpub that receives withdrawals
    #[arg(long)]
    gateway_xpub: Option<String>,

    /// Hex secret of the key that signs sign requests
    #[arg(long)]
    request_key: Option<String>,

    /// QR error correction level (L, M, Q, H)
    #[arg(long)]
    ecc_level: Option<EccLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show the wallet policy in effect
    Constants,

    /// Render a base64 envelope as a QR symbol
    PrintQr {
        /// Base64 envelope
        data: String,
    },

    /// Describe a base64 envelope
    PrettyPrint {
        /// Base64 envelope
        data: String,
    },

    /// Decode a scanned symbol from a JSON file with `size` and `pixels`
    Scan {
        /// Scan file path
        file: PathBuf,
    },

    /// Run a full ceremony against simulated devices
    Demo {
        /// Wallet identifier
        #[arg(short, long, default_value = "1")]
        wallet_id: u32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let port = match &cli.command {
        Commands::Serve { port } => *port,
        _ => None,
    };
    let config = GatewayConfig::resolve(
        cli.config.as_deref(),
        Overrides {
            network: cli.network,
            threshold: cli.threshold,
            participants: cli.participants,
            gateway_xpub: cli.gateway_xpub,
            request_key: cli.request_key,
            ecc_level: cli.ecc_level,
            port,
        },
    )?;

    match cli.command {
        Commands::Serve { .. } => cli::cmd_serve(config),
        Commands::Constants => cli::cmd_constants(&config),
        Commands::PrintQr { data } => cli::cmd_print_qr(&config, &data),
        Commands::PrettyPrint { data } => cli::cmd_pretty_print(&data),
        Commands::Scan { file } => cli::cmd_scan(&file),
        Commands::Demo { wallet_id } => cli::cmd_demo(&config, wallet_id),
    }
}
