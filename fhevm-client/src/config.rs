use crate::error::{ClientError, Result};
use alloy_primitives::{Address, FixedBytes};
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub gateway: GatewayConfig,
    pub contract: ContractConfig,
    pub signer: Option<SignerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    /// JSON-RPC endpoint, needed only for the on-chain backend
    pub rpc_url: Option<Url>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    pub counter: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    pub private_key: String,
    pub address: Address,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let network_name = env::var("FHEVM_NETWORK").unwrap_or_else(|_| "devnet".to_string());
        let chain_id: u64 = match env::var("CHAIN_ID") {
            Ok(value) => value
                .parse()
                .map_err(|e| ClientError::Config(format!("Invalid chain ID: {e}")))?,
            Err(_) => Self::default_chain_id(&network_name),
        };

        let rpc_url = env::var("RPC_URL")
            .ok()
            .map(|url| {
                Url::parse(&url).map_err(|e| ClientError::Config(format!("Invalid RPC_URL: {e}")))
            })
            .transpose()?;

        let gateway_url =
            env::var("GATEWAY_URL").unwrap_or_else(|_| DEFAULT_GATEWAY_URL.to_string());
        Url::parse(&gateway_url)
            .map_err(|e| ClientError::Config(format!("Invalid GATEWAY_URL: {e}")))?;

        let counter = env::var("COUNTER_CONTRACT_ADDRESS")
            .ok()
            .map(|address| {
                address.parse::<Address>().map_err(|e| {
                    ClientError::InvalidAddress(format!("Invalid counter address: {e}"))
                })
            })
            .transpose()?;

        let signer = if let Ok(private_key) = env::var("WALLET_PRIVATE_KEY") {
            let signer = parse_private_key(&private_key)?;

            // WALLET_ADDRESS is optional, but must match the key when given
            if let Ok(expected) = env::var("WALLET_ADDRESS") {
                let expected = expected.parse::<Address>().map_err(|e| {
                    ClientError::InvalidAddress(format!("Invalid wallet address: {e}"))
                })?;
                if signer.address() != expected {
                    return Err(ClientError::Config(format!(
                        "Private key address ({}) does not match WALLET_ADDRESS ({expected})",
                        signer.address()
                    )));
                }
            }

            Some(SignerConfig {
                private_key,
                address: signer.address(),
            })
        } else {
            None
        };

        Ok(Self {
            network: NetworkConfig {
                name: network_name,
                chain_id,
                rpc_url,
            },
            gateway: GatewayConfig {
                url: gateway_url,
                timeout_seconds: env::var("REQUEST_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            },
            contract: ContractConfig { counter },
            signer,
        })
    }

    fn default_chain_id(network: &str) -> u64 {
        match network {
            "sepolia" => 11_155_111,
            "mainnet" => 1,
            _ => 31_337,
        }
    }

    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.gateway.url)
            .map_err(|e| ClientError::Config(format!("Invalid gateway URL: {e}")))?;

        if self.gateway.timeout_seconds == 0 {
            return Err(ClientError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.contract.counter == Some(Address::ZERO) {
            return Err(ClientError::Config(
                "Counter contract address must not be zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Extra checks for talking to a real chain
    pub fn validate_chain(&self) -> Result<()> {
        self.validate()?;
        if self.network.rpc_url.is_none() {
            return Err(ClientError::Config("RPC_URL is required".to_string()));
        }
        if self.contract.counter.is_none() {
            return Err(ClientError::Config(
                "COUNTER_CONTRACT_ADDRESS is required".to_string(),
            ));
        }
        if self.signer.is_none() {
            return Err(ClientError::Config(
                "WALLET_PRIVATE_KEY is required".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.timeout_seconds)
    }

    /// Wallet used to sign inputs, calls and decryption requests
    pub fn wallet(&self) -> Result<PrivateKeySigner> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| ClientError::Config("WALLET_PRIVATE_KEY is required".to_string()))?;
        parse_private_key(&signer.private_key)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                name: "devnet".to_string(),
                chain_id: 31_337,
                rpc_url: None,
            },
            gateway: GatewayConfig {
                url: DEFAULT_GATEWAY_URL.to_string(),
                timeout_seconds: 30,
            },
            contract: ContractConfig { counter: None },
            signer: None,
        }
    }
}

fn parse_private_key(private_key: &str) -> Result<PrivateKeySigner> {
    let bytes = hex::decode(private_key.trim().trim_start_matches("0x"))?;
    let key = FixedBytes::<32>::try_from(bytes.as_slice())
        .map_err(|e| ClientError::Signer(format!("Private key must be 32 bytes: {e}")))?;
    PrivateKeySigner::from_bytes(&key).map_err(|e| ClientError::Signer(e.to_string()))
}
