//! Input proofs: verifier attestations binding input handles to a
//! (contract, caller, chain) triple.
//!
//! Wire layout:
//!
//! ```text
//! [n_handles: u8][n_signers: u8][handles: 32 * n_handles][signatures: 65 * n_signers]
//! ```

use crate::eip712::input_verification_hash;
use crate::handle::CiphertextHandle;
use alloy_primitives::{Address, Bytes, Signature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

pub const HANDLE_LEN: usize = 32;
pub const SIGNATURE_LEN: usize = 65;

/// Upper bound on handles (and on signers) carried by one proof
pub const MAX_PROOF_ENTRIES: usize = u8::MAX as usize;

/// The identities an input proof is issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBinding {
    pub contract: Address,
    pub caller: Address,
    pub chain_id: u64,
}

/// Errors that can occur while building or checking an input proof
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("Malformed input proof: {0}")]
    Malformed(String),

    #[error("Handle {0} is not covered by the input proof")]
    HandleNotInProof(CiphertextHandle),

    #[error("Handle {handle} belongs to chain {actual}, expected chain {expected}")]
    WrongChain {
        handle: CiphertextHandle,
        expected: u64,
        actual: u64,
    },

    #[error("Input proof carries {valid} trusted signatures, {required} required")]
    InsufficientSignatures { valid: usize, required: usize },

    #[error("Failed to sign input proof: {0}")]
    Signing(String),
}

impl ProofError {
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED_PROOF",
            Self::HandleNotInProof(_) => "HANDLE_NOT_IN_PROOF",
            Self::WrongChain { .. } => "WRONG_CHAIN",
            Self::InsufficientSignatures { .. } => "INSUFFICIENT_SIGNATURES",
            Self::Signing(_) => "SIGNING_FAILED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputProof {
    handles: Vec<CiphertextHandle>,
    signatures: Vec<Signature>,
}

impl InputProof {
    /// Attest `handles` for `binding` with every key in `signers`
    pub fn sign(
        handles: Vec<CiphertextHandle>,
        binding: &ProofBinding,
        verifier: Address,
        signers: &[PrivateKeySigner],
    ) -> Result<Self, ProofError> {
        check_entry_count("handles", handles.len())?;
        check_entry_count("signers", signers.len())?;

        let digest = input_verification_hash(&handles, binding, verifier);
        let signatures = signers
            .iter()
            .map(|signer| {
                signer
                    .sign_hash_sync(&digest)
                    .map_err(|e| ProofError::Signing(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            handles,
            signatures,
        })
    }

    #[must_use]
    pub fn handles(&self) -> &[CiphertextHandle] {
        &self.handles
    }

    #[must_use]
    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(
            2 + self.handles.len() * HANDLE_LEN + self.signatures.len() * SIGNATURE_LEN,
        );
        // Entry counts are bounded by MAX_PROOF_ENTRIES at construction.
        out.push(self.handles.len() as u8);
        out.push(self.signatures.len() as u8);
        for handle in &self.handles {
            out.extend_from_slice(handle.as_slice());
        }
        for signature in &self.signatures {
            out.extend_from_slice(&signature.as_bytes());
        }
        Bytes::from(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProofError> {
        let [n_handles, n_signers, body @ ..] = bytes else {
            return Err(ProofError::Malformed("missing header".to_string()));
        };
        let (n_handles, n_signers) = (usize::from(*n_handles), usize::from(*n_signers));
        check_entry_count("handles", n_handles)?;
        check_entry_count("signers", n_signers)?;

        let expected = n_handles * HANDLE_LEN + n_signers * SIGNATURE_LEN;
        if body.len() != expected {
            return Err(ProofError::Malformed(format!(
                "expected {expected} body bytes, got {}",
                body.len()
            )));
        }

        let (handle_bytes, signature_bytes) = body.split_at(n_handles * HANDLE_LEN);
        let handles = handle_bytes
            .chunks_exact(HANDLE_LEN)
            .map(|chunk| CiphertextHandle::new(B256::from_slice(chunk)))
            .collect();
        let signatures = signature_bytes
            .chunks_exact(SIGNATURE_LEN)
            .map(|chunk| {
                Signature::try_from(chunk)
                    .map_err(|e| ProofError::Malformed(format!("invalid signature: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            handles,
            signatures,
        })
    }

    /// Check that `handle` is attested for `binding` by at least `threshold`
    /// distinct keys from `trusted`
    pub fn verify(
        &self,
        handle: &CiphertextHandle,
        binding: &ProofBinding,
        verifier: Address,
        trusted: &[Address],
        threshold: usize,
    ) -> Result<(), ProofError> {
        if !self.handles.contains(handle) {
            return Err(ProofError::HandleNotInProof(*handle));
        }

        if handle.chain_id() != binding.chain_id {
            return Err(ProofError::WrongChain {
                handle: *handle,
                expected: binding.chain_id,
                actual: handle.chain_id(),
            });
        }

        let digest = input_verification_hash(&self.handles, binding, verifier);
        let mut valid = HashSet::new();
        for signature in &self.signatures {
            match signature.recover_address_from_prehash(&digest) {
                Ok(signer) if trusted.contains(&signer) => {
                    valid.insert(signer);
                }
                Ok(signer) => debug!("Ignoring signature from untrusted signer {signer}"),
                Err(e) => debug!("Ignoring unrecoverable signature: {e}"),
            }
        }

        let required = threshold.max(1);
        if valid.len() < required {
            return Err(ProofError::InsufficientSignatures {
                valid: valid.len(),
                required,
            });
        }

        Ok(())
    }
}

fn check_entry_count(what: &str, count: usize) -> Result<(), ProofError> {
    if count == 0 || count > MAX_PROOF_ENTRIES {
        return Err(ProofError::Malformed(format!(
            "{what} count must be between 1 and {MAX_PROOF_ENTRIES}, got {count}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::FheType;
    use alloy_primitives::keccak256;

    const CHAIN_ID: u64 = 31_337;

    fn fixture() -> (Vec<CiphertextHandle>, ProofBinding, Address, PrivateKeySigner) {
        let handles = vec![
            CiphertextHandle::for_input(keccak256(b"blob"), 0, CHAIN_ID, FheType::Uint32),
            CiphertextHandle::for_input(keccak256(b"blob"), 1, CHAIN_ID, FheType::Uint32),
        ];
        let binding = ProofBinding {
            contract: Address::repeat_byte(0xc0),
            caller: Address::repeat_byte(0xca),
            chain_id: CHAIN_ID,
        };
        (handles, binding, Address::repeat_byte(0x01), PrivateKeySigner::random())
    }

    #[test]
    fn test_proof_verifies_for_its_binding() {
        let (handles, binding, verifier, signer) = fixture();
        let proof =
            InputProof::sign(handles.clone(), &binding, verifier, &[signer.clone()]).unwrap();

        let decoded = InputProof::decode(&proof.encode()).unwrap();
        assert_eq!(decoded, proof);
        for handle in &handles {
            decoded
                .verify(handle, &binding, verifier, &[signer.address()], 1)
                .unwrap();
        }
    }

    #[test]
    fn test_proof_rejected_for_other_caller_or_contract() {
        let (handles, binding, verifier, signer) = fixture();
        let proof =
            InputProof::sign(handles.clone(), &binding, verifier, &[signer.clone()]).unwrap();
        let trusted = [signer.address()];

        let other_caller = ProofBinding {
            caller: Address::repeat_byte(0xee),
            ..binding
        };
        assert_eq!(
            proof.verify(&handles[0], &other_caller, verifier, &trusted, 1),
            Err(ProofError::InsufficientSignatures {
                valid: 0,
                required: 1
            })
        );

        let other_contract = ProofBinding {
            contract: Address::repeat_byte(0xdd),
            ..binding
        };
        assert!(proof
            .verify(&handles[0], &other_contract, verifier, &trusted, 1)
            .is_err());
    }

    #[test]
    fn test_untrusted_signer_rejected() {
        let (handles, binding, verifier, signer) = fixture();
        let proof = InputProof::sign(handles.clone(), &binding, verifier, &[signer]).unwrap();
        let stranger = PrivateKeySigner::random();

        let err = proof
            .verify(&handles[0], &binding, verifier, &[stranger.address()], 1)
            .unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_SIGNATURES");
    }

    #[test]
    fn test_threshold_counts_distinct_signers() {
        let (handles, binding, verifier, signer) = fixture();
        let second = PrivateKeySigner::random();
        let trusted = [signer.address(), second.address()];

        let duplicated =
            InputProof::sign(handles.clone(), &binding, verifier, &[signer.clone(), signer.clone()])
                .unwrap();
        assert!(duplicated.verify(&handles[0], &binding, verifier, &trusted, 2).is_err());

        let both =
            InputProof::sign(handles.clone(), &binding, verifier, &[signer, second]).unwrap();
        both.verify(&handles[0], &binding, verifier, &trusted, 2).unwrap();
    }

    #[test]
    fn test_handle_outside_proof_rejected() {
        let (handles, binding, verifier, signer) = fixture();
        let proof =
            InputProof::sign(vec![handles[0]], &binding, verifier, &[signer.clone()]).unwrap();

        assert_eq!(
            proof.verify(&handles[1], &binding, verifier, &[signer.address()], 1),
            Err(ProofError::HandleNotInProof(handles[1]))
        );
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        let (handles, binding, verifier, signer) = fixture();
        let encoded = InputProof::sign(handles, &binding, verifier, &[signer]).unwrap().encode();

        assert!(InputProof::decode(&[]).is_err());
        assert!(InputProof::decode(&encoded[..encoded.len() - 1]).is_err());

        let mut trailing = encoded.to_vec();
        trailing.push(0);
        assert!(InputProof::decode(&trailing).is_err());

        assert!(matches!(
            InputProof::decode(&[0, 1]),
            Err(ProofError::Malformed(_))
        ));
    }

    #[test]
    fn test_sign_requires_handles_and_signers() {
        let (handles, binding, verifier, signer) = fixture();
        assert!(InputProof::sign(Vec::new(), &binding, verifier, &[signer]).is_err());
        assert!(InputProof::sign(handles, &binding, verifier, &[]).is_err());
    }
}
