//! Typed-data payloads signed by the input verifiers, by users requesting a
//! decryption, and by callers of devnet counters.

use crate::handle::CiphertextHandle;
use crate::proof::ProofBinding;
use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::{eip712_domain, sol, Eip712Domain, SolStruct};

sol! {
    /// Attestation over a freshly registered list of input ciphertexts.
    #[derive(Debug, PartialEq, Eq)]
    struct CiphertextVerification {
        bytes32[] ctHandles;
        address userAddress;
        address contractAddress;
        uint256 contractChainId;
    }

    /// Request by `userAddress` to read the value behind `handle`.
    #[derive(Debug, PartialEq, Eq)]
    struct UserDecryptRequest {
        bytes32 handle;
        address contractAddress;
        address userAddress;
    }

    /// A call on a devnet counter, signed in place of a transaction.
    #[derive(Debug, PartialEq, Eq)]
    struct CounterCall {
        address counter;
        string method;
        bytes32 inputHandle;
        bytes32 proofHash;
        uint64 nonce;
    }
}

#[must_use]
pub fn input_verification_domain(chain_id: u64, verifier: Address) -> Eip712Domain {
    eip712_domain! {
        name: "InputVerification",
        version: "1",
        chain_id: chain_id,
        verifying_contract: verifier,
    }
}

#[must_use]
pub fn decryption_domain(chain_id: u64, kms_verifier: Address) -> Eip712Domain {
    eip712_domain! {
        name: "Decryption",
        version: "1",
        chain_id: chain_id,
        verifying_contract: kms_verifier,
    }
}

#[must_use]
pub fn devnet_domain(chain_id: u64, counter: Address) -> Eip712Domain {
    eip712_domain! {
        name: "FHECounterDevnet",
        version: "1",
        chain_id: chain_id,
        verifying_contract: counter,
    }
}

/// Digest signed by input verifiers for a list of handles bound to `binding`
#[must_use]
pub fn input_verification_hash(
    handles: &[CiphertextHandle],
    binding: &ProofBinding,
    verifier: Address,
) -> B256 {
    let payload = CiphertextVerification {
        ctHandles: handles.iter().map(CiphertextHandle::as_b256).collect(),
        userAddress: binding.caller,
        contractAddress: binding.contract,
        contractChainId: U256::from(binding.chain_id),
    };
    payload.eip712_signing_hash(&input_verification_domain(binding.chain_id, verifier))
}

#[must_use]
pub fn user_decrypt_hash(
    handle: &CiphertextHandle,
    contract: Address,
    user: Address,
    chain_id: u64,
    kms_verifier: Address,
) -> B256 {
    let payload = UserDecryptRequest {
        handle: handle.as_b256(),
        contractAddress: contract,
        userAddress: user,
    };
    payload.eip712_signing_hash(&decryption_domain(chain_id, kms_verifier))
}

#[must_use]
pub fn counter_call_hash(
    counter: Address,
    method: &str,
    input_handle: &CiphertextHandle,
    proof: &[u8],
    nonce: u64,
    chain_id: u64,
) -> B256 {
    let payload = CounterCall {
        counter,
        method: method.to_string(),
        inputHandle: input_handle.as_b256(),
        proofHash: keccak256(proof),
        nonce,
    };
    payload.eip712_signing_hash(&devnet_domain(chain_id, counter))
}
