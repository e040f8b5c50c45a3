use axum::Router;
use std::time::Duration;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, instrument};

use crate::coprocessor::{CoprocessorConfig, LocalCoprocessor};
use crate::devnet::Devnet;
use crate::error::GatewayResult;
use crate::rest::{ApiConfig, GatewayState};

// ============================================================================
// GATEWAY SERVER CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct GatewayServerConfig {
    pub api_config: ApiConfig,
    pub coprocessor: CoprocessorConfig,

    pub host: String,
    pub port: u16,

    /// Middleware configuration
    pub enable_compression: bool,
    pub enable_cors: bool,
    pub request_timeout_seconds: u64,
    pub max_request_size_bytes: usize,

    /// Counters deployed at startup, in addition to any created over the API
    pub predeployed_counters: Vec<Address>,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            api_config: ApiConfig::default(),
            coprocessor: CoprocessorConfig::default(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_compression: true,
            enable_cors: true,
            request_timeout_seconds: 30,
            max_request_size_bytes: 1024 * 1024, // 1MB
            predeployed_counters: Vec::new(),
        }
    }
}

// ============================================================================
// GATEWAY SERVER IMPLEMENTATION
// ============================================================================

pub struct GatewayServer {
    config: GatewayServerConfig,
    state: GatewayState,
}

impl GatewayServer {
    /// Create the gateway with `signers` attesting input proofs
    ///
    /// # Errors
    /// Returns error if the coprocessor rejects the signer configuration
    #[instrument(skip(signers), level = "info")]
    pub fn new(config: GatewayServerConfig, signers: Vec<PrivateKeySigner>) -> GatewayResult<Self> {
        info!("🚀 Initializing FHE counter gateway");

        let runtime = LocalCoprocessor::new(config.coprocessor.clone(), signers)?;
        let mut devnet = Devnet::new(runtime);
        for address in &config.predeployed_counters {
            devnet.deploy_counter_at(*address);
        }

        let state = GatewayState::new(devnet, config.api_config.clone());

        info!("✅ Gateway initialized successfully");
        Ok(Self { config, state })
    }

    #[instrument(skip(self), level = "info")]
    pub fn create_router(&self) -> Router {
        info!("🔧 Building gateway router");
        let router = crate::rest::create_router(self.state.clone());
        self.add_middleware(router)
    }

    fn add_middleware(&self, router: Router) -> Router {
        let mut router = router
            .layer(TraceLayer::new_for_http())
            .layer(RequestBodyLimitLayer::new(
                self.config.max_request_size_bytes,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_seconds,
            )));

        if self.config.enable_compression {
            router = router.layer(CompressionLayer::new());
        }

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(Any);

            router = router.layer(cors);
        }

        router
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    #[must_use]
    pub const fn state(&self) -> &GatewayState {
        &self.state
    }

    #[must_use]
    pub const fn config(&self) -> &GatewayServerConfig {
        &self.config
    }
}

// ============================================================================
// SERVER BUILDER UTILITIES
// ============================================================================

pub struct GatewayServerBuilder {
    config: GatewayServerConfig,
    signers: Vec<PrivateKeySigner>,
}

impl GatewayServerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayServerConfig::default(),
            signers: Vec::new(),
        }
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    #[must_use]
    pub const fn chain_id(mut self, chain_id: u64) -> Self {
        self.config.coprocessor.chain_id = chain_id;
        self
    }

    #[must_use]
    pub const fn signer_threshold(mut self, threshold: usize) -> Self {
        self.config.coprocessor.signer_threshold = threshold;
        self
    }

    #[must_use]
    pub fn signer(mut self, signer: PrivateKeySigner) -> Self {
        self.signers.push(signer);
        self
    }

    #[must_use]
    pub fn predeploy(mut self, address: Address) -> Self {
        self.config.predeployed_counters.push(address);
        self
    }

    #[must_use]
    pub fn api_config(mut self, config: ApiConfig) -> Self {
        self.config.api_config = config;
        self
    }

    #[must_use]
    pub const fn enable_cors(mut self, enabled: bool) -> Self {
        self.config.enable_cors = enabled;
        self
    }

    #[must_use]
    pub const fn request_timeout(mut self, seconds: u64) -> Self {
        self.config.request_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub const fn max_request_size(mut self, bytes: usize) -> Self {
        self.config.max_request_size_bytes = bytes;
        self
    }

    /// Build the gateway, generating a random input signer if none was given
    ///
    /// # Errors
    /// Returns error if the signer configuration is invalid
    pub fn build(mut self) -> GatewayResult<GatewayServer> {
        if self.signers.is_empty() {
            self.signers.push(PrivateKeySigner::random());
        }
        GatewayServer::new(self.config, self.signers)
    }
}

impl Default for GatewayServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
