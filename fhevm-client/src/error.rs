use alloy_primitives::TxHash;
use counter_lib::{CounterMethod, InputError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Provider error: {0}")]
    Provider(#[from] alloy_transport::TransportError),

    #[error("Contract error: {0}")]
    Contract(#[from] alloy_contract::Error),

    #[error("Transaction error: {0}")]
    PendingTransaction(#[from] alloy_provider::PendingTransactionError),

    #[error("{method} reverted in transaction {transaction_hash}")]
    Reverted {
        method: CounterMethod,
        transaction_hash: TxHash,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Relayer returned {status} ({code}): {message}")]
    Relayer {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the relayer rejected the request for lack of permission
    #[must_use]
    pub const fn is_access_denied(&self) -> bool {
        matches!(self, Self::Relayer { status: 403, .. })
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Relayer { status: 404, .. })
    }
}
