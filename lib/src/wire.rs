//! Request and response bodies of the gateway HTTP API, shared by the server
//! and the client so both sides agree on the JSON shape.

use crate::counter::CounterMethod;
use crate::handle::{CiphertextHandle, FheType};
use crate::input::PublicKey;
use crate::permission::PermissionGrant;
use alloy_primitives::{Address, Bytes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Key material and verifier identities needed to build inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyInfoResponse {
    pub public_key: PublicKey,
    pub chain_id: u64,
    pub input_verifier: Address,
    pub kms_verifier: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputProofRequest {
    pub contract_address: Address,
    pub user_address: Address,
    pub ciphertext: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputProofResponse {
    pub handles: Vec<CiphertextHandle>,
    pub input_proof: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDecryptRequestBody {
    pub handle: CiphertextHandle,
    pub contract_address: Address,
    pub user_address: Address,
    pub signature: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDecryptResponse {
    pub handle: CiphertextHandle,
    pub fhe_type: FheType,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AclResponse {
    pub handle: CiphertextHandle,
    pub account: Address,
    pub allowed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployCounterResponse {
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResponse {
    pub address: Address,
    pub handle: CiphertextHandle,
    pub initialized: bool,
    pub updates: u64,
}

/// A devnet counter call, authenticated by an EIP-712 signature of `caller`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterCallRequest {
    pub caller: Address,
    pub nonce: u64,
    pub input_handle: CiphertextHandle,
    pub input_proof: Bytes,
    pub signature: Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterCallResponse {
    pub address: Address,
    pub method: CounterMethod,
    pub handle: CiphertextHandle,
    pub grants: Vec<PermissionGrant>,
    pub next_nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceResponse {
    pub address: Address,
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub chain_id: u64,
    pub deployed_counters: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiInfoResponse {
    pub server_name: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub method: String,
    pub path: String,
    pub description: String,
}

/// Body of every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}
