//! CLI for the encrypted counter
//!
//! Talks to the gateway for encryption and decryption, and to the counter
//! either on the gateway devnet or on an fhEVM chain.
//!
//! Usage examples:
//! ```shell
//! # Deploy a counter on the devnet
//! cli deploy
//!
//! # Add 5 to it and read the result back
//! cli --counter 0x... increment --value 5
//! cli --counter 0x... decrypt
//!
//! # Check gateway health
//! cli health-check
//! ```

use alloy_primitives::Address;
use clap::{Parser, Subcommand, ValueEnum};
use counter_lib::{CiphertextHandle, CounterMethod};
use eyre::{eyre, Result, WrapErr};
use fhevm_client::{
    Config, CounterContract, DevnetCounter, FhevmInstance, OnChainCounter, RelayerClient,
};
use tracing::{info, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Counter hosted by the gateway devnet
    Devnet,
    /// Counter deployed on an fhEVM chain (needs RPC_URL)
    Chain,
}

#[derive(Parser)]
#[command(name = "cli")]
#[command(about = "CLI for the FHE encrypted counter")]
#[command(version)]
struct Cli {
    /// Gateway base URL
    #[arg(long, env = "GATEWAY_URL", default_value = fhevm_client::DEFAULT_GATEWAY_URL)]
    gateway_url: String,

    /// Where the counter lives
    #[arg(long, value_enum, default_value = "devnet")]
    backend: Backend,

    /// Counter contract address
    #[arg(long, env = "COUNTER_CONTRACT_ADDRESS")]
    counter: Option<Address>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a value for the counter and print its handle and proof
    Encrypt {
        #[arg(short, long)]
        value: u32,
    },
    /// Deploy a new counter on the devnet
    Deploy,
    /// Add an encrypted value to the counter
    Increment {
        #[arg(short, long)]
        value: u32,
    },
    /// Subtract an encrypted value from the counter
    Decrement {
        #[arg(short, long)]
        value: u32,
    },
    /// Print the current count handle
    GetCount,
    /// Decrypt a handle, the current count by default
    Decrypt {
        #[arg(long)]
        handle: Option<CiphertextHandle>,
    },
    /// Check whether an account may use a handle
    Allowed {
        #[arg(long)]
        handle: CiphertextHandle,
        #[arg(long)]
        account: Address,
    },
    /// Check gateway health
    HealthCheck,
}

struct Session {
    config: Config,
    relayer: RelayerClient,
    backend: Backend,
}

impl Session {
    fn counter_address(&self) -> Result<Address> {
        self.config
            .contract
            .counter
            .ok_or_else(|| {
                eyre!("No counter given, pass --counter or set COUNTER_CONTRACT_ADDRESS")
            })
    }

    async fn fhevm(&self) -> Result<FhevmInstance> {
        let wallet = self.config.wallet().wrap_err("A wallet is needed for this command")?;
        let chain_id = self.config.network.chain_id;
        Ok(FhevmInstance::connect_to_chain(self.relayer.clone(), wallet, chain_id).await?)
    }

    fn counter(&self, fhevm: &FhevmInstance) -> Result<Box<dyn CounterContract>> {
        match self.backend {
            Backend::Devnet => Ok(Box::new(DevnetCounter::new(
                self.relayer.clone(),
                self.counter_address()?,
                fhevm.wallet().clone(),
                fhevm.chain_id(),
            ))),
            Backend::Chain => Ok(Box::new(OnChainCounter::from_config(&self.config)?)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cli=info,fhevm_client=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    config.gateway.url.clone_from(&cli.gateway_url);
    if cli.counter.is_some() {
        config.contract.counter = cli.counter;
    }
    config.validate()?;

    let relayer = RelayerClient::new(config.gateway.url.clone(), config.request_timeout())?;
    let session = Session {
        config,
        relayer,
        backend: cli.backend,
    };

    match cli.command {
        Commands::Encrypt { value } => encrypt(&session, value).await?,
        Commands::Deploy => deploy(&session).await?,
        Commands::Increment { value } => update(&session, CounterMethod::Increment, value).await?,
        Commands::Decrement { value } => update(&session, CounterMethod::Decrement, value).await?,
        Commands::GetCount => get_count(&session).await?,
        Commands::Decrypt { handle } => decrypt(&session, handle).await?,
        Commands::Allowed { handle, account } => allowed(&session, handle, account).await?,
        Commands::HealthCheck => health_check(&session).await?,
    }

    Ok(())
}

async fn encrypt(session: &Session, value: u32) -> Result<()> {
    let fhevm = session.fhevm().await?;
    let counter = session.counter_address()?;

    let input = fhevm
        .create_encrypted_input(counter, fhevm.address())
        .add32(value)
        .encrypt()
        .await?;

    info!("✅ Encrypted {value} for {counter}");
    for handle in &input.handles {
        println!("handle: {handle}");
    }
    println!("proof:  {}", input.input_proof);
    Ok(())
}

async fn deploy(session: &Session) -> Result<()> {
    if session.backend != Backend::Devnet {
        return Err(eyre!("Deploying is only supported on the devnet backend"));
    }

    let address = session.relayer.deploy_counter().await?;
    info!("✅ Counter deployed");
    println!("{address}");
    Ok(())
}

async fn update(session: &Session, method: CounterMethod, value: u32) -> Result<()> {
    let fhevm = session.fhevm().await?;
    let counter = session.counter(&fhevm)?;

    let input = fhevm
        .create_encrypted_input(counter.address(), fhevm.address())
        .add32(value)
        .encrypt()
        .await?;

    let receipt = counter.call(method, &input).await?;

    info!("✅ {} by an encrypted value succeeded", receipt.method);
    if let Some(hash) = receipt.transaction_hash {
        println!("transaction: {hash}");
    }
    println!("count handle: {}", receipt.count);
    Ok(())
}

async fn get_count(session: &Session) -> Result<()> {
    let handle = match session.backend {
        Backend::Devnet => {
            session
                .relayer
                .count(session.counter_address()?)
                .await?
                .handle
        }
        Backend::Chain => {
            OnChainCounter::from_config(&session.config)?
                .get_count()
                .await?
        }
    };

    if handle.is_uninitialized() {
        info!("ℹ️ Counter has not been updated yet");
    }
    println!("{handle}");
    Ok(())
}

async fn decrypt(session: &Session, handle: Option<CiphertextHandle>) -> Result<()> {
    let fhevm = session.fhevm().await?;
    let counter = session.counter(&fhevm)?;

    let handle = match handle {
        Some(handle) => handle,
        None => counter.get_count().await?,
    };
    if handle.is_uninitialized() {
        warn!("⚠️ Counter is uninitialized, its value is 0");
        println!("0");
        return Ok(());
    }

    let clear = fhevm.user_decrypt(handle, counter.address()).await?;
    info!("✅ Decrypted {handle} ({})", clear.fhe_type);
    println!("{}", clear.value);
    Ok(())
}

async fn allowed(session: &Session, handle: CiphertextHandle, account: Address) -> Result<()> {
    let allowed = session.relayer.is_allowed(handle, account).await?;
    info!("ACL lookup for {account} on {handle}");
    println!("{allowed}");
    Ok(())
}

async fn health_check(session: &Session) -> Result<()> {
    info!("Checking gateway health...");
    let health = session.relayer.health_check().await?;
    let api = session.relayer.api_info().await?;

    info!("✅ Gateway is {}", health.status);
    println!("server:   {} v{}", api.server_name, api.version);
    println!("status:   {}", health.status);
    println!("chain id: {}", health.chain_id);
    println!("counters: {}", health.deployed_counters);
    Ok(())
}
