//! Client-side encryption helper: builds sealed inputs against the gateway
//! key and requests user decryptions.

use crate::error::{ClientError, Result};
use crate::relayer::RelayerClient;
use alloy_primitives::{Address, Bytes};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use counter_lib::eip712::user_decrypt_hash;
use counter_lib::input::{self, ClearValue, PublicKey};
use counter_lib::wire::{InputProofRequest, KeyInfoResponse, UserDecryptRequestBody};
use counter_lib::{CiphertextHandle, FheType};
use tracing::{info, instrument};

/// Handles and proof returned by the relayer for one input list
#[derive(Debug, Clone)]
pub struct EncryptedInput {
    pub handles: Vec<CiphertextHandle>,
    pub input_proof: Bytes,
}

pub struct FhevmInstance {
    relayer: RelayerClient,
    keys: KeyInfoResponse,
    wallet: PrivateKeySigner,
}

impl FhevmInstance {
    /// Fetch the gateway key material and bind it to `wallet`
    #[instrument(skip(relayer, wallet), level = "info")]
    pub async fn connect(relayer: RelayerClient, wallet: PrivateKeySigner) -> Result<Self> {
        let keys = relayer.key_info().await?;
        info!(
            "🔑 Loaded gateway key {} for chain {}",
            keys.public_key.key_id, keys.chain_id
        );
        Ok(Self::new(relayer, keys, wallet))
    }

    /// Like [`FhevmInstance::connect`], but the gateway must serve `chain_id`
    pub async fn connect_to_chain(
        relayer: RelayerClient,
        wallet: PrivateKeySigner,
        chain_id: u64,
    ) -> Result<Self> {
        let instance = Self::connect(relayer, wallet).await?;
        instance.ensure_chain(chain_id)?;
        Ok(instance)
    }

    pub fn ensure_chain(&self, chain_id: u64) -> Result<()> {
        if self.keys.chain_id != chain_id {
            return Err(ClientError::Config(format!(
                "gateway {} serves chain {}, configured chain is {chain_id}",
                self.relayer.base_url(),
                self.keys.chain_id
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn new(relayer: RelayerClient, keys: KeyInfoResponse, wallet: PrivateKeySigner) -> Self {
        Self {
            relayer,
            keys,
            wallet,
        }
    }

    #[must_use]
    pub const fn relayer(&self) -> &RelayerClient {
        &self.relayer
    }

    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.keys.chain_id
    }

    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.keys.public_key
    }

    #[must_use]
    pub const fn wallet(&self) -> &PrivateKeySigner {
        &self.wallet
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Start an input list usable only by `caller` on `contract`
    #[must_use]
    pub fn create_encrypted_input(
        &self,
        contract: Address,
        caller: Address,
    ) -> EncryptedInputBuilder<'_> {
        EncryptedInputBuilder {
            instance: self,
            contract,
            caller,
            values: Vec::new(),
        }
    }

    /// Sign the EIP-712 decryption request for `handle` under `contract`
    pub fn sign_user_decrypt(&self, handle: CiphertextHandle, contract: Address) -> Result<Bytes> {
        let digest = user_decrypt_hash(
            &handle,
            contract,
            self.address(),
            self.keys.chain_id,
            self.keys.kms_verifier,
        );
        let signature = self
            .wallet
            .sign_hash_sync(&digest)
            .map_err(|e| ClientError::Signer(e.to_string()))?;
        Ok(Bytes::from(signature.as_bytes().to_vec()))
    }

    /// Decrypt `handle` for this wallet; the wallet and `contract` must both
    /// have been granted access
    #[instrument(skip(self), level = "info")]
    pub async fn user_decrypt(
        &self,
        handle: CiphertextHandle,
        contract: Address,
    ) -> Result<ClearValue> {
        let request = UserDecryptRequestBody {
            handle,
            contract_address: contract,
            user_address: self.address(),
            signature: self.sign_user_decrypt(handle, contract)?,
        };
        let response = self.relayer.user_decrypt(&request).await?;
        Ok(ClearValue::new(response.fhe_type, response.value))
    }
}

pub struct EncryptedInputBuilder<'a> {
    instance: &'a FhevmInstance,
    contract: Address,
    caller: Address,
    values: Vec<ClearValue>,
}

impl EncryptedInputBuilder<'_> {
    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.push(FheType::Bool, u64::from(value))
    }

    pub fn add8(&mut self, value: u8) -> &mut Self {
        self.push(FheType::Uint8, u64::from(value))
    }

    pub fn add16(&mut self, value: u16) -> &mut Self {
        self.push(FheType::Uint16, u64::from(value))
    }

    pub fn add32(&mut self, value: u32) -> &mut Self {
        self.push(FheType::Uint32, u64::from(value))
    }

    pub fn add64(&mut self, value: u64) -> &mut Self {
        self.push(FheType::Uint64, value)
    }

    fn push(&mut self, fhe_type: FheType, value: u64) -> &mut Self {
        self.values.push(ClearValue::new(fhe_type, value));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Seal the values and have the relayer attest them
    pub async fn encrypt(&self) -> Result<EncryptedInput> {
        let ciphertext = input::seal(self.instance.public_key(), &self.values)?;
        let response = self
            .instance
            .relayer
            .input_proof(&InputProofRequest {
                contract_address: self.contract,
                user_address: self.caller,
                ciphertext,
            })
            .await?;

        info!(
            "🔐 Encrypted {} value(s) for {} on {}",
            response.handles.len(),
            self.caller,
            self.contract
        );
        Ok(EncryptedInput {
            handles: response.handles,
            input_proof: response.input_proof,
        })
    }
}
