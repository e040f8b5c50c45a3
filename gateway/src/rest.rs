use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::devnet::Devnet;
use crate::error::GatewayResult;
use alloy_primitives::Address;
use counter_lib::wire::{
    AclResponse, ApiInfoResponse, CountResponse, CounterCallRequest, CounterCallResponse,
    DeployCounterResponse, EndpointInfo, HealthResponse, InputProofRequest, InputProofResponse,
    KeyInfoResponse, NonceResponse, UserDecryptRequestBody, UserDecryptResponse,
};
use counter_lib::{CiphertextHandle, CounterMethod, FheRuntime};

// ============================================================================
// API STATE
// ============================================================================

/// Shared gateway state: the devnet and everything it owns
#[derive(Clone)]
pub struct GatewayState {
    pub devnet: Arc<RwLock<Devnet>>,
    pub config: ApiConfig,
}

impl GatewayState {
    #[must_use]
    pub fn new(devnet: Devnet, config: ApiConfig) -> Self {
        Self {
            devnet: Arc::new(RwLock::new(devnet)),
            config,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub server_name: String,
    pub version: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            server_name: "FHE Counter Gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

pub fn create_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(api_info))
        .route("/v1/health", get(health_check))
        .route("/v1/info", get(api_info))
        // Relayer operations
        .route("/v1/keyurl", get(key_info))
        .route("/v1/input-proof", post(input_proof))
        .route("/v1/user-decrypt", post(user_decrypt))
        .route("/v1/acl/{handle}/{account}", get(acl_check))
        // Devnet counter operations
        .route("/v1/counters", post(deploy_counter))
        .route("/v1/counters/{address}/count", get(get_count))
        .route("/v1/counters/{address}/increment", post(increment))
        .route("/v1/counters/{address}/decrement", post(decrement))
        .route("/v1/accounts/{address}/nonce", get(account_nonce))
        .with_state(state)
}

// ============================================================================
// ENDPOINT HANDLERS
// ============================================================================

#[instrument(skip(state), level = "info")]
async fn health_check(State(state): State<GatewayState>) -> Json<HealthResponse> {
    info!("🔍 API: Health check requested");
    let devnet = state.devnet.read().await;

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        chain_id: devnet.chain_id(),
        deployed_counters: devnet.counter_count(),
    })
}

#[instrument(skip(state), level = "info")]
async fn api_info(State(state): State<GatewayState>) -> Json<ApiInfoResponse> {
    info!("📋 API: API info requested");

    let endpoints = [
        ("GET", "/v1/health", "Health check"),
        ("GET", "/v1/keyurl", "Public encryption key and verifier addresses"),
        ("POST", "/v1/input-proof", "Register a sealed input and get its proof"),
        ("POST", "/v1/user-decrypt", "Decrypt a handle for an allowed user"),
        ("GET", "/v1/acl/{handle}/{account}", "Check access to a handle"),
        ("POST", "/v1/counters", "Deploy a new encrypted counter"),
        ("GET", "/v1/counters/{address}/count", "Current count handle"),
        ("POST", "/v1/counters/{address}/increment", "Add an encrypted value"),
        ("POST", "/v1/counters/{address}/decrement", "Subtract an encrypted value"),
        ("GET", "/v1/accounts/{address}/nonce", "Next call nonce of an account"),
    ]
    .into_iter()
    .map(|(method, path, description)| EndpointInfo {
        method: method.to_string(),
        path: path.to_string(),
        description: description.to_string(),
    })
    .collect();

    Json(ApiInfoResponse {
        server_name: state.config.server_name.clone(),
        version: state.config.version.clone(),
        timestamp: Utc::now(),
        endpoints,
    })
}

#[instrument(skip(state), level = "info")]
async fn key_info(State(state): State<GatewayState>) -> Json<KeyInfoResponse> {
    info!("🔑 API: Key info requested");
    Json(state.devnet.read().await.runtime().key_info())
}

#[instrument(
    skip(state, request),
    fields(contract = %request.contract_address, user = %request.user_address),
    level = "info"
)]
async fn input_proof(
    State(state): State<GatewayState>,
    Json(request): Json<InputProofRequest>,
) -> GatewayResult<Json<InputProofResponse>> {
    info!("📥 API: Input proof requested");

    let mut devnet = state.devnet.write().await;
    let response = devnet.runtime_mut().register_input(
        &request.ciphertext,
        request.contract_address,
        request.user_address,
    )?;
    Ok(Json(response))
}

#[instrument(skip(state, request), fields(handle = %request.handle), level = "info")]
async fn user_decrypt(
    State(state): State<GatewayState>,
    Json(request): Json<UserDecryptRequestBody>,
) -> GatewayResult<Json<UserDecryptResponse>> {
    info!("🔓 API: User decryption requested by {}", request.user_address);

    let devnet = state.devnet.read().await;
    let clear = devnet.runtime().user_decrypt(
        request.handle,
        request.contract_address,
        request.user_address,
        &request.signature,
    )?;

    Ok(Json(UserDecryptResponse {
        handle: request.handle,
        fhe_type: clear.fhe_type,
        value: clear.value,
    }))
}

#[instrument(skip(state), level = "info")]
async fn acl_check(
    State(state): State<GatewayState>,
    Path((handle, account)): Path<(CiphertextHandle, Address)>,
) -> Json<AclResponse> {
    let allowed = state.devnet.read().await.runtime().is_allowed(&handle, &account);
    Json(AclResponse {
        handle,
        account,
        allowed,
    })
}

#[instrument(skip(state), level = "info")]
async fn deploy_counter(State(state): State<GatewayState>) -> Json<DeployCounterResponse> {
    let address = state.devnet.write().await.deploy_counter();
    info!("📦 API: Counter deployed at {address}");
    Json(DeployCounterResponse { address })
}

#[instrument(skip(state), level = "info")]
async fn get_count(
    State(state): State<GatewayState>,
    Path(address): Path<Address>,
) -> GatewayResult<Json<CountResponse>> {
    let devnet = state.devnet.read().await;
    let counter = devnet.counter(address)?;
    let handle = counter.get_count();

    Ok(Json(CountResponse {
        address,
        handle,
        initialized: !handle.is_uninitialized(),
        updates: counter.update_count(),
    }))
}

#[instrument(skip(state, request), fields(caller = %request.caller), level = "info")]
async fn increment(
    State(state): State<GatewayState>,
    Path(address): Path<Address>,
    Json(request): Json<CounterCallRequest>,
) -> GatewayResult<Json<CounterCallResponse>> {
    info!("➕ API: Increment on {address}");
    counter_call(&state, address, CounterMethod::Increment, &request).await
}

#[instrument(skip(state, request), fields(caller = %request.caller), level = "info")]
async fn decrement(
    State(state): State<GatewayState>,
    Path(address): Path<Address>,
    Json(request): Json<CounterCallRequest>,
) -> GatewayResult<Json<CounterCallResponse>> {
    info!("➖ API: Decrement on {address}");
    counter_call(&state, address, CounterMethod::Decrement, &request).await
}

async fn counter_call(
    state: &GatewayState,
    address: Address,
    method: CounterMethod,
    request: &CounterCallRequest,
) -> GatewayResult<Json<CounterCallResponse>> {
    let mut devnet = state.devnet.write().await;
    let response = devnet.call(address, method, request)?;
    Ok(Json(response))
}

#[instrument(skip(state), level = "info")]
async fn account_nonce(
    State(state): State<GatewayState>,
    Path(address): Path<Address>,
) -> Json<NonceResponse> {
    let nonce = state.devnet.read().await.nonce(address);
    Json(NonceResponse { address, nonce })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coprocessor::{CoprocessorConfig, LocalCoprocessor};
    use alloy_primitives::Bytes;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use counter_lib::eip712::{counter_call_hash, user_decrypt_hash};
    use counter_lib::input::{self, ClearValue};
    use counter_lib::wire::ErrorResponse;
    use counter_lib::COUNTER_TYPE;
    use tracing_test::traced_test;

    fn test_server() -> TestServer {
        let runtime =
            LocalCoprocessor::new(CoprocessorConfig::default(), vec![PrivateKeySigner::random()])
                .unwrap();
        let state = GatewayState::new(Devnet::new(runtime), ApiConfig::default());
        TestServer::new(create_router(state)).unwrap()
    }

    async fn deploy(server: &TestServer) -> Address {
        server
            .post("/v1/counters")
            .await
            .json::<DeployCounterResponse>()
            .address
    }

    async fn prepare_call(
        server: &TestServer,
        user: &PrivateKeySigner,
        counter: Address,
        method: CounterMethod,
        value: u64,
    ) -> CounterCallRequest {
        let keys = server.get("/v1/keyurl").await.json::<KeyInfoResponse>();
        let blob = input::seal(&keys.public_key, &[ClearValue::new(COUNTER_TYPE, value)]).unwrap();

        let proof = server
            .post("/v1/input-proof")
            .json(&InputProofRequest {
                contract_address: counter,
                user_address: user.address(),
                ciphertext: blob,
            })
            .await
            .json::<InputProofResponse>();

        let nonce = server
            .get(&format!("/v1/accounts/{}/nonce", user.address()))
            .await
            .json::<NonceResponse>()
            .nonce;
        let digest = counter_call_hash(
            counter,
            method.as_str(),
            &proof.handles[0],
            &proof.input_proof,
            nonce,
            keys.chain_id,
        );

        CounterCallRequest {
            caller: user.address(),
            nonce,
            input_handle: proof.handles[0],
            input_proof: proof.input_proof,
            signature: Bytes::from(user.sign_hash_sync(&digest).unwrap().as_bytes().to_vec()),
        }
    }

    async fn decrypt(
        server: &TestServer,
        user: &PrivateKeySigner,
        counter: Address,
        handle: CiphertextHandle,
    ) -> axum_test::TestResponse {
        let keys = server.get("/v1/keyurl").await.json::<KeyInfoResponse>();
        let digest = user_decrypt_hash(
            &handle,
            counter,
            user.address(),
            keys.chain_id,
            keys.kms_verifier,
        );
        server
            .post("/v1/user-decrypt")
            .json(&UserDecryptRequestBody {
                handle,
                contract_address: counter,
                user_address: user.address(),
                signature: Bytes::from(user.sign_hash_sync(&digest).unwrap().as_bytes().to_vec()),
            })
            .await
    }

    #[tokio::test]
    #[traced_test]
    async fn test_health_check() {
        let server = test_server();
        let response = server.get("/health").await;

        response.assert_status_ok();
        let health: HealthResponse = response.json();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.deployed_counters, 0);
    }

    #[tokio::test]
    async fn test_api_info_lists_counter_routes() {
        let server = test_server();
        let info: ApiInfoResponse = server.get("/v1/info").await.json();

        assert!(info
            .endpoints
            .iter()
            .any(|e| e.path == "/v1/counters/{address}/increment"));
    }

    #[tokio::test]
    async fn test_fresh_counter_reports_zero_handle() {
        let server = test_server();
        let counter = deploy(&server).await;

        let count: CountResponse = server
            .get(&format!("/v1/counters/{counter}/count"))
            .await
            .json();
        assert!(!count.initialized);
        assert_eq!(count.handle, CiphertextHandle::UNINITIALIZED);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_increment_decrement_and_decrypt() {
        let server = test_server();
        let user = PrivateKeySigner::random();
        let counter = deploy(&server).await;

        let request = prepare_call(&server, &user, counter, CounterMethod::Increment, 10).await;
        server
            .post(&format!("/v1/counters/{counter}/increment"))
            .json(&request)
            .await
            .assert_status_ok();

        let request = prepare_call(&server, &user, counter, CounterMethod::Decrement, 3).await;
        let response: CounterCallResponse = server
            .post(&format!("/v1/counters/{counter}/decrement"))
            .json(&request)
            .await
            .json();
        assert_eq!(response.next_nonce, 2);

        let count: CountResponse = server
            .get(&format!("/v1/counters/{counter}/count"))
            .await
            .json();
        assert_eq!(count.handle, response.handle);
        assert_eq!(count.updates, 2);

        let clear: UserDecryptResponse =
            decrypt(&server, &user, counter, count.handle).await.json();
        assert_eq!(clear.value, 7);
    }

    #[tokio::test]
    async fn test_other_user_cannot_decrypt() {
        let server = test_server();
        let user = PrivateKeySigner::random();
        let stranger = PrivateKeySigner::random();
        let counter = deploy(&server).await;

        let request = prepare_call(&server, &user, counter, CounterMethod::Increment, 5).await;
        let update: CounterCallResponse = server
            .post(&format!("/v1/counters/{counter}/increment"))
            .json(&request)
            .await
            .json();

        let response = decrypt(&server, &stranger, counter, update.handle).await;
        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.json::<ErrorResponse>().code, "ACCESS_DENIED");

        let acl: AclResponse = server
            .get(&format!("/v1/acl/{}/{}", update.handle, user.address()))
            .await
            .json();
        assert!(acl.allowed);
    }

    #[tokio::test]
    async fn test_replay_returns_conflict() {
        let server = test_server();
        let user = PrivateKeySigner::random();
        let counter = deploy(&server).await;

        let request = prepare_call(&server, &user, counter, CounterMethod::Increment, 1).await;
        let path = format!("/v1/counters/{counter}/increment");
        server.post(&path).json(&request).await.assert_status_ok();

        let response = server.post(&path).json(&request).await;
        response.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_unknown_counter_is_not_found() {
        let server = test_server();
        let response = server
            .get(&format!("/v1/counters/{}/count", Address::repeat_byte(7)))
            .await;

        response.assert_status_not_found();
        assert_eq!(response.json::<ErrorResponse>().code, "COUNTER_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_garbage_input_is_bad_request() {
        let server = test_server();
        let response = server
            .post("/v1/input-proof")
            .json(&InputProofRequest {
                contract_address: Address::repeat_byte(1),
                user_address: Address::repeat_byte(2),
                ciphertext: Bytes::from_static(b"nope"),
            })
            .await;

        response.assert_status_bad_request();
        assert_eq!(response.json::<ErrorResponse>().code, "INVALID_INPUT");
    }
}
