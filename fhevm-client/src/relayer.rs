//! Typed HTTP client for the gateway's relayer and devnet routes.

use crate::error::{ClientError, Result};
use alloy_primitives::Address;
use counter_lib::wire::{
    AclResponse, ApiInfoResponse, CountResponse, CounterCallRequest, CounterCallResponse,
    DeployCounterResponse, ErrorResponse, HealthResponse, InputProofRequest, InputProofResponse,
    KeyInfoResponse, NonceResponse, UserDecryptRequestBody, UserDecryptResponse,
};
use counter_lib::{CiphertextHandle, CounterMethod};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RelayerClient {
    client: Client,
    base_url: String,
}

impl RelayerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url: String = base_url.into();

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health_check(&self) -> Result<HealthResponse> {
        self.get("/v1/health").await
    }

    pub async fn api_info(&self) -> Result<ApiInfoResponse> {
        self.get("/v1/info").await
    }

    /// Public encryption key plus the chain and verifier identities
    pub async fn key_info(&self) -> Result<KeyInfoResponse> {
        self.get("/v1/keyurl").await
    }

    pub async fn input_proof(&self, request: &InputProofRequest) -> Result<InputProofResponse> {
        self.post("/v1/input-proof", request).await
    }

    pub async fn user_decrypt(
        &self,
        request: &UserDecryptRequestBody,
    ) -> Result<UserDecryptResponse> {
        self.post("/v1/user-decrypt", request).await
    }

    pub async fn is_allowed(&self, handle: CiphertextHandle, account: Address) -> Result<bool> {
        let response: AclResponse = self.get(&format!("/v1/acl/{handle}/{account}")).await?;
        Ok(response.allowed)
    }

    pub async fn deploy_counter(&self) -> Result<Address> {
        let url = format!("{}/v1/counters", self.base_url);
        let response = self.client.post(&url).send().await?;
        let deployed: DeployCounterResponse = Self::handle_response(response).await?;
        Ok(deployed.address)
    }

    pub async fn count(&self, counter: Address) -> Result<CountResponse> {
        self.get(&format!("/v1/counters/{counter}/count")).await
    }

    pub async fn counter_call(
        &self,
        counter: Address,
        method: CounterMethod,
        request: &CounterCallRequest,
    ) -> Result<CounterCallResponse> {
        self.post(&format!("/v1/counters/{counter}/{method}"), request)
            .await
    }

    pub async fn nonce(&self, account: Address) -> Result<u64> {
        let response: NonceResponse = self.get(&format!("/v1/accounts/{account}/nonce")).await?;
        Ok(response.nonce)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!("GET {url}");
        let response = self.client.get(&url).send().await?;
        Self::handle_response(response).await
    }

    async fn post<B: serde::Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!("POST {url}");
        let response = self.client.post(&url).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::handle_error_response(response).await)
        }
    }

    async fn handle_error_response(response: Response) -> ClientError {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(error) => ClientError::Relayer {
                status,
                code: error.code,
                message: error.error,
            },
            Err(_) => ClientError::Relayer {
                status,
                code: "UNKNOWN".to_string(),
                message: body,
            },
        }
    }
}
