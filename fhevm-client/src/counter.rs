//! Counter contract backends: the gateway devnet and a real fhEVM chain.

use crate::config::Config;
use crate::contracts::{IFHECounter, IFHECounterInstance};
use crate::encryption::EncryptedInput;
use crate::error::{ClientError, Result};
use crate::relayer::RelayerClient;
use alloy_network::{EthereumWallet, ReceiptResponse};
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use counter_lib::eip712::counter_call_hash;
use counter_lib::wire::CounterCallRequest;
use counter_lib::{CiphertextHandle, CounterMethod, InputError};
use tracing::{info, instrument, warn};

/// Result of a successful counter update
#[derive(Debug, Clone)]
pub struct CounterReceipt {
    pub method: CounterMethod,
    /// Handle of the new total
    pub count: CiphertextHandle,
    /// Set when the update was mined on a chain
    pub transaction_hash: Option<TxHash>,
}

#[async_trait]
pub trait CounterContract: Send + Sync {
    fn address(&self) -> Address;

    /// Handle of the current total; the zero handle before the first update
    async fn get_count(&self) -> Result<CiphertextHandle>;

    /// Apply `method` with the first handle of `input`
    async fn call(&self, method: CounterMethod, input: &EncryptedInput) -> Result<CounterReceipt>;

    async fn increment(&self, input: &EncryptedInput) -> Result<CounterReceipt> {
        self.call(CounterMethod::Increment, input).await
    }

    async fn decrement(&self, input: &EncryptedInput) -> Result<CounterReceipt> {
        self.call(CounterMethod::Decrement, input).await
    }
}

fn first_handle(input: &EncryptedInput) -> Result<CiphertextHandle> {
    input
        .handles
        .first()
        .copied()
        .ok_or(ClientError::Input(InputError::Empty))
}

/// A mined transaction with a failed status means the runtime rejected the call
fn ensure_succeeded(
    method: CounterMethod,
    transaction_hash: TxHash,
    status: bool,
) -> Result<TxHash> {
    if status {
        Ok(transaction_hash)
    } else {
        warn!("⛔ {method} reverted in {transaction_hash}");
        Err(ClientError::Reverted {
            method,
            transaction_hash,
        })
    }
}

// ============================================================================
// DEVNET BACKEND
// ============================================================================

/// Counter hosted by the gateway devnet; calls are authorised by EIP-712
/// signatures of the wallet instead of transactions
pub struct DevnetCounter {
    relayer: RelayerClient,
    address: Address,
    wallet: PrivateKeySigner,
    chain_id: u64,
}

impl DevnetCounter {
    #[must_use]
    pub fn new(
        relayer: RelayerClient,
        address: Address,
        wallet: PrivateKeySigner,
        chain_id: u64,
    ) -> Self {
        Self {
            relayer,
            address,
            wallet,
            chain_id,
        }
    }

    /// Deploy a fresh counter on the devnet
    #[instrument(skip(relayer, wallet), level = "info")]
    pub async fn deploy(
        relayer: RelayerClient,
        wallet: PrivateKeySigner,
        chain_id: u64,
    ) -> Result<Self> {
        let address = relayer.deploy_counter().await?;
        info!("📦 Deployed devnet counter at {address}");
        Ok(Self::new(relayer, address, wallet, chain_id))
    }

    fn sign_call(
        &self,
        method: CounterMethod,
        handle: &CiphertextHandle,
        proof: &[u8],
        nonce: u64,
    ) -> Result<Bytes> {
        let digest = counter_call_hash(
            self.address,
            method.as_str(),
            handle,
            proof,
            nonce,
            self.chain_id,
        );
        let signature = self
            .wallet
            .sign_hash_sync(&digest)
            .map_err(|e| ClientError::Signer(e.to_string()))?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }
}

#[async_trait]
impl CounterContract for DevnetCounter {
    fn address(&self) -> Address {
        self.address
    }

    async fn get_count(&self) -> Result<CiphertextHandle> {
        Ok(self.relayer.count(self.address).await?.handle)
    }

    #[instrument(skip(self, input), fields(counter = %self.address), level = "info")]
    async fn call(&self, method: CounterMethod, input: &EncryptedInput) -> Result<CounterReceipt> {
        let handle = first_handle(input)?;
        let caller = self.wallet.address();
        let nonce = self.relayer.nonce(caller).await?;

        let request = CounterCallRequest {
            caller,
            nonce,
            input_handle: handle,
            input_proof: input.input_proof.clone(),
            signature: self.sign_call(method, &handle, &input.input_proof, nonce)?,
        };
        let response = self
            .relayer
            .counter_call(self.address, method, &request)
            .await?;

        info!("✅ {method} applied, count handle {}", response.handle);
        Ok(CounterReceipt {
            method,
            count: response.handle,
            transaction_hash: None,
        })
    }
}

// ============================================================================
// ON-CHAIN BACKEND
// ============================================================================

/// Counter deployed on an fhEVM chain, driven through its ABI
pub struct OnChainCounter {
    contract: IFHECounterInstance<DynProvider>,
}

impl OnChainCounter {
    #[must_use]
    pub fn new(address: Address, provider: DynProvider) -> Self {
        Self {
            contract: IFHECounter::new(address, provider),
        }
    }

    /// Connect with the RPC endpoint, counter address and wallet from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate_chain()?;

        let rpc_url = config
            .network
            .rpc_url
            .clone()
            .ok_or_else(|| ClientError::Config("RPC_URL is required".to_string()))?;
        let address = config.contract.counter.ok_or_else(|| {
            ClientError::Config("COUNTER_CONTRACT_ADDRESS is required".to_string())
        })?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(config.wallet()?))
            .connect_http(rpc_url)
            .erased();

        Ok(Self::new(address, provider))
    }
}

#[async_trait]
impl CounterContract for OnChainCounter {
    fn address(&self) -> Address {
        *self.contract.address()
    }

    async fn get_count(&self) -> Result<CiphertextHandle> {
        let handle = self.contract.getCount().call().await?;
        Ok(CiphertextHandle::from(handle))
    }

    #[instrument(skip(self, input), level = "info")]
    async fn call(&self, method: CounterMethod, input: &EncryptedInput) -> Result<CounterReceipt> {
        let handle = first_handle(input)?.as_b256();
        let proof = input.input_proof.clone();

        let pending = match method {
            CounterMethod::Increment => self.contract.increment(handle, proof).send().await?,
            CounterMethod::Decrement => self.contract.decrement(handle, proof).send().await?,
        };
        info!("📤 {method} submitted: {}", pending.tx_hash());

        let receipt = pending.get_receipt().await?;
        let transaction_hash =
            ensure_succeeded(method, receipt.transaction_hash(), receipt.status())?;
        info!("⛓️  {method} confirmed in {transaction_hash}");

        Ok(CounterReceipt {
            method,
            count: self.get_count().await?,
            transaction_hash: Some(transaction_hash),
        })
    }
}
