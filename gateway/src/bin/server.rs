//! FHE Counter Gateway
//!
//! Serves the relayer endpoints and a devnet hosting encrypted counters.
//!
//! Run this server using:
//! ```shell
//! cargo run -p gateway --bin server
//! ```

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use clap::Parser;
use eyre::{Result, WrapErr};
use gateway::{ApiConfig, CoprocessorConfig, GatewayServer, GatewayServerConfig, DEVNET_CHAIN_ID};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host to bind to
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to bind to
    #[arg(long, env = "GATEWAY_PORT", default_value = "8080")]
    port: u16,

    /// Chain id embedded in handles and signed payloads
    #[arg(long, env = "CHAIN_ID", default_value_t = DEVNET_CHAIN_ID)]
    chain_id: u64,

    /// Comma-separated private keys of the input proof signers
    #[arg(long, env = "INPUT_SIGNER_KEYS", value_delimiter = ',')]
    signer_keys: Vec<String>,

    /// Distinct signatures an input proof needs
    #[arg(long, env = "INPUT_SIGNER_THRESHOLD", default_value = "1")]
    signer_threshold: usize,

    /// Counter addresses to deploy at startup
    #[arg(long, env = "COUNTER_CONTRACT_ADDRESS", value_delimiter = ',')]
    predeploy: Vec<Address>,

    /// Enable CORS for all origins
    #[arg(long, default_value = "true")]
    cors: bool,

    /// Maximum request size in bytes
    #[arg(long, default_value = "1048576")]
    max_request_size: usize,

    /// Request timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout: u64,
}

fn load_signers(keys: &[String]) -> Result<Vec<PrivateKeySigner>> {
    if keys.is_empty() {
        warn!("⚠️  No INPUT_SIGNER_KEYS set, generating an ephemeral input signer");
        return Ok(vec![PrivateKeySigner::random()]);
    }

    keys.iter()
        .map(|key| {
            key.trim()
                .parse::<PrivateKeySigner>()
                .wrap_err("Invalid input signer key")
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();

    info!("🚀 Starting FHE Counter Gateway");
    info!("📍 Server will bind to {}:{}", args.host, args.port);

    let signers = load_signers(&args.signer_keys)?;
    for signer in &signers {
        info!("✍️  Input signer: {}", signer.address());
    }

    let config = GatewayServerConfig {
        api_config: ApiConfig::default(),
        coprocessor: CoprocessorConfig {
            chain_id: args.chain_id,
            signer_threshold: args.signer_threshold,
            ..CoprocessorConfig::default()
        },
        host: args.host.clone(),
        port: args.port,
        enable_compression: true,
        enable_cors: args.cors,
        request_timeout_seconds: args.request_timeout,
        max_request_size_bytes: args.max_request_size,
        predeployed_counters: args.predeploy.clone(),
    };

    let server = GatewayServer::new(config, signers)?;
    let app = server.create_router();

    let bind_address = server.bind_address();
    let listener = match tokio::net::TcpListener::bind(&bind_address).await {
        Ok(listener) => {
            info!("✅ Successfully bound to {bind_address}");
            listener
        }
        Err(e) => {
            error!("❌ Failed to bind to {bind_address}: {e}");
            error!("💡 Make sure the port is not already in use");
            std::process::exit(1);
        }
    };

    println!();
    println!("🌟 FHE Counter Gateway Running!");
    println!("📍 Server Address: http://{bind_address}");
    println!("⛓️  Chain ID: {}", args.chain_id);
    for address in &args.predeploy {
        println!("📦 Counter: {address}");
    }
    println!();
    println!("📚 Available Endpoints:");
    println!("   • GET    /v1/keyurl                          - Public key and verifiers");
    println!("   • POST   /v1/input-proof                     - Register encrypted input");
    println!("   • POST   /v1/user-decrypt                    - Decrypt an allowed handle");
    println!("   • GET    /v1/acl/{{handle}}/{{account}}          - Check access");
    println!("   • POST   /v1/counters                        - Deploy a counter");
    println!("   • GET    /v1/counters/{{address}}/count        - Current count handle");
    println!("   • POST   /v1/counters/{{address}}/increment    - Add encrypted value");
    println!("   • POST   /v1/counters/{{address}}/decrement    - Subtract encrypted value");
    println!("   • GET    /v1/accounts/{{address}}/nonce        - Next call nonce");
    println!("   • GET    /v1/health                          - Health check");
    println!();
    println!("🎊 Server ready for requests!");
    println!();

    if let Err(e) = axum::serve(listener, app).await {
        error!("❌ Server error: {e}");
        std::process::exit(1);
    }

    Ok(())
}
