#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

//! Client side of the encrypted counter: configuration, the relayer HTTP
//! client, input encryption and decryption, and counter contract backends.

pub mod config;
pub mod contracts;
pub mod counter;
pub mod encryption;
pub mod error;
pub mod relayer;

pub use config::{Config, NetworkConfig, DEFAULT_GATEWAY_URL};
pub use counter::{CounterContract, CounterReceipt, DevnetCounter, OnChainCounter};
pub use encryption::{EncryptedInput, EncryptedInputBuilder, FhevmInstance};
pub use error::{ClientError, Result};
pub use relayer::RelayerClient;
