#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::needless_pass_by_value)]

//! Development gateway for the encrypted counter: a local coprocessor, a
//! devnet hosting counters, and the REST API clients talk to.

pub mod coprocessor;
pub mod devnet;
pub mod error;
pub mod rest;
pub mod server;

pub use coprocessor::{CoprocessorConfig, LocalCoprocessor, DEVNET_CHAIN_ID};
pub use devnet::{Devnet, DEVNET_DEPLOYER};
pub use error::{GatewayError, GatewayResult};
pub use rest::{create_router, ApiConfig, GatewayState};
pub use server::{GatewayServer, GatewayServerBuilder, GatewayServerConfig};
