//! In-process coprocessor serving the FHE runtime role for the devnet.
//!
//! Ciphertexts are kept as clear values behind their handles, so this is a
//! development stand-in with no confidentiality of its own. Everything
//! observable through [`FheRuntime`] (proof checks, typed wrapping
//! arithmetic, access control, fresh handles per computation) behaves the way
//! contract code expects from a real coprocessor.

use crate::error::{GatewayError, GatewayResult};
use alloy_primitives::{address, Address, Signature};
use alloy_signer_local::PrivateKeySigner;
use counter_lib::eip712::user_decrypt_hash;
use counter_lib::input::{self, ClearValue, PublicKey};
use counter_lib::wire::{InputProofResponse, KeyInfoResponse};
use counter_lib::{
    CallContext, CiphertextHandle, FheRuntime, FheType, InputProof, ProofBinding, RuntimeError,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// Chain id reported by the devnet unless configured otherwise
pub const DEVNET_CHAIN_ID: u64 = 31_337;

/// EIP-712 verifying contract for input proofs on the devnet
pub const DEVNET_INPUT_VERIFIER: Address = address!("812b06e1cdce800494b79ffe4f925a504a9a9810");

/// EIP-712 verifying contract for decryption requests on the devnet
pub const DEVNET_KMS_VERIFIER: Address = address!("1364cbbf2cdf5032c47d8226a6f6fbd2afcdacac");

#[derive(Debug, Clone)]
pub struct CoprocessorConfig {
    pub chain_id: u64,
    pub input_verifier: Address,
    pub kms_verifier: Address,
    /// Distinct trusted signatures an input proof needs
    pub signer_threshold: usize,
}

impl Default for CoprocessorConfig {
    fn default() -> Self {
        Self {
            chain_id: DEVNET_CHAIN_ID,
            input_verifier: DEVNET_INPUT_VERIFIER,
            kms_verifier: DEVNET_KMS_VERIFIER,
            signer_threshold: 1,
        }
    }
}

pub struct LocalCoprocessor {
    config: CoprocessorConfig,
    public_key: PublicKey,
    signers: Vec<PrivateKeySigner>,
    trusted: Vec<Address>,
    ciphertexts: HashMap<CiphertextHandle, ClearValue>,
    acl: HashMap<CiphertextHandle, HashSet<Address>>,
    transient: HashSet<(CiphertextHandle, Address)>,
    seq: u64,
}

impl LocalCoprocessor {
    /// Create a coprocessor whose input proofs are signed by `signers`
    ///
    /// # Errors
    /// Returns error if no signer is given or the threshold cannot be met
    pub fn new(config: CoprocessorConfig, signers: Vec<PrivateKeySigner>) -> GatewayResult<Self> {
        if signers.is_empty() {
            return Err(GatewayError::Config(
                "at least one input signer is required".to_string(),
            ));
        }
        if config.signer_threshold > signers.len() {
            return Err(GatewayError::Config(format!(
                "signer threshold {} exceeds {} configured signers",
                config.signer_threshold,
                signers.len()
            )));
        }

        let trusted = signers.iter().map(PrivateKeySigner::address).collect();
        info!(
            "🔐 Coprocessor ready on chain {} with {} input signer(s)",
            config.chain_id,
            signers.len()
        );

        Ok(Self {
            config,
            public_key: PublicKey::generate(),
            signers,
            trusted,
            ciphertexts: HashMap::new(),
            acl: HashMap::new(),
            transient: HashSet::new(),
            seq: 0,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &CoprocessorConfig {
        &self.config
    }

    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub fn ciphertext_count(&self) -> usize {
        self.ciphertexts.len()
    }

    #[must_use]
    pub fn key_info(&self) -> KeyInfoResponse {
        KeyInfoResponse {
            public_key: self.public_key.clone(),
            chain_id: self.config.chain_id,
            input_verifier: self.config.input_verifier,
            kms_verifier: self.config.kms_verifier,
        }
    }

    /// Open a sealed input list, store its ciphertexts and attest the
    /// resulting handles for (`contract`, `caller`)
    #[instrument(skip(self, blob), fields(blob_len = blob.len()), level = "info")]
    pub fn register_input(
        &mut self,
        blob: &[u8],
        contract: Address,
        caller: Address,
    ) -> GatewayResult<InputProofResponse> {
        let values = input::open(&self.public_key, blob)?;
        let blob_hash = input::blob_hash(blob);

        let mut handles = Vec::with_capacity(values.len());
        for (index, value) in values.iter().enumerate() {
            let index = u8::try_from(index)
                .map_err(|_| GatewayError::Config(format!("input index {index} overflows")))?;
            handles.push(CiphertextHandle::for_input(
                blob_hash,
                index,
                self.config.chain_id,
                value.fhe_type,
            ));
        }

        let binding = ProofBinding {
            contract,
            caller,
            chain_id: self.config.chain_id,
        };
        let proof = InputProof::sign(
            handles.clone(),
            &binding,
            self.config.input_verifier,
            &self.signers,
        )?;

        for (handle, value) in handles.iter().zip(values) {
            self.ciphertexts.insert(*handle, value);
        }

        info!(
            "📥 Registered {} input ciphertext(s) for contract {contract}, caller {caller}",
            handles.len()
        );

        Ok(InputProofResponse {
            handles,
            input_proof: proof.encode(),
        })
    }

    /// Decrypt `handle` for `user`, who must have signed the request and,
    /// together with `contract`, hold access to the handle
    #[instrument(skip(self, signature), level = "info")]
    pub fn user_decrypt(
        &self,
        handle: CiphertextHandle,
        contract: Address,
        user: Address,
        signature: &[u8],
    ) -> GatewayResult<ClearValue> {
        if user == contract {
            return Err(GatewayError::InvalidSignature(
                "user and contract addresses must differ".to_string(),
            ));
        }

        let signature = Signature::try_from(signature)
            .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
        let digest = user_decrypt_hash(
            &handle,
            contract,
            user,
            self.config.chain_id,
            self.config.kms_verifier,
        );
        let signer = signature
            .recover_address_from_prehash(&digest)
            .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
        if signer != user {
            return Err(GatewayError::InvalidSignature(format!(
                "request signed by {signer}, expected {user}"
            )));
        }

        for account in [user, contract] {
            if !self.is_allowed(&handle, &account) {
                return Err(RuntimeError::AccessDenied { handle, account }.into());
            }
        }

        let value = self.value(handle)?;
        info!("🔓 Decrypted {handle} for {user}");
        Ok(value)
    }

    fn value(&self, handle: CiphertextHandle) -> Result<ClearValue, RuntimeError> {
        self.ciphertexts
            .get(&handle)
            .copied()
            .ok_or(RuntimeError::UnknownHandle(handle))
    }

    fn require_access(
        &self,
        handle: CiphertextHandle,
        account: Address,
    ) -> Result<ClearValue, RuntimeError> {
        if !self.is_allowed(&handle, &account) {
            return Err(RuntimeError::AccessDenied { handle, account });
        }
        self.value(handle)
    }

    fn store_result(
        &mut self,
        op: &str,
        operands: &[CiphertextHandle],
        value: ClearValue,
        ctx: &CallContext,
    ) -> CiphertextHandle {
        self.seq += 1;
        let handle = CiphertextHandle::for_computation(
            op,
            operands,
            self.config.chain_id,
            value.fhe_type,
            self.seq,
        );
        self.ciphertexts.insert(handle, value);
        self.transient.insert((handle, ctx.contract));
        debug!("{op} -> {handle}");
        handle
    }

    fn binary(
        &mut self,
        op: &str,
        lhs: CiphertextHandle,
        rhs: CiphertextHandle,
        ctx: &CallContext,
        apply: impl Fn(u64, u64) -> u64,
    ) -> Result<CiphertextHandle, RuntimeError> {
        let a = self.require_access(lhs, ctx.contract)?;
        let b = self.require_access(rhs, ctx.contract)?;
        if a.fhe_type != b.fhe_type {
            return Err(RuntimeError::TypeMismatch {
                expected: a.fhe_type,
                actual: b.fhe_type,
            });
        }

        let value = apply(a.value, b.value) & a.fhe_type.mask();
        Ok(self.store_result(op, &[lhs, rhs], ClearValue::new(a.fhe_type, value), ctx))
    }
}

impl FheRuntime for LocalCoprocessor {
    fn from_external(
        &mut self,
        handle: CiphertextHandle,
        proof: &[u8],
        expected: FheType,
        ctx: &CallContext,
    ) -> Result<CiphertextHandle, RuntimeError> {
        let binding = ProofBinding {
            contract: ctx.contract,
            caller: ctx.caller,
            chain_id: self.config.chain_id,
        };
        InputProof::decode(proof)?.verify(
            &handle,
            &binding,
            self.config.input_verifier,
            &self.trusted,
            self.config.signer_threshold,
        )?;

        let actual = handle.fhe_type()?;
        if actual != expected {
            return Err(RuntimeError::TypeMismatch { expected, actual });
        }
        self.value(handle)?;

        self.transient.insert((handle, ctx.contract));
        Ok(handle)
    }

    fn trivial_encrypt(
        &mut self,
        value: u64,
        fhe_type: FheType,
        ctx: &CallContext,
    ) -> Result<CiphertextHandle, RuntimeError> {
        let clear = ClearValue::new(fhe_type, value & fhe_type.mask());
        Ok(self.store_result("trivial", &[], clear, ctx))
    }

    fn add(
        &mut self,
        lhs: CiphertextHandle,
        rhs: CiphertextHandle,
        ctx: &CallContext,
    ) -> Result<CiphertextHandle, RuntimeError> {
        self.binary("add", lhs, rhs, ctx, u64::wrapping_add)
    }

    fn sub(
        &mut self,
        lhs: CiphertextHandle,
        rhs: CiphertextHandle,
        ctx: &CallContext,
    ) -> Result<CiphertextHandle, RuntimeError> {
        self.binary("sub", lhs, rhs, ctx, u64::wrapping_sub)
    }

    fn allow(
        &mut self,
        handle: CiphertextHandle,
        account: Address,
        ctx: &CallContext,
    ) -> Result<(), RuntimeError> {
        self.require_access(handle, ctx.contract)?;
        self.acl.entry(handle).or_default().insert(account);
        Ok(())
    }

    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
        self.acl
            .get(handle)
            .is_some_and(|accounts| accounts.contains(account))
            || self.transient.contains(&(*handle, *account))
    }

    fn end_transaction(&mut self) {
        self.transient.clear();
    }
}
