#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

//! Shared building blocks of the encrypted counter: ciphertext handles,
//! input proofs, sealed inputs, the FHE runtime seam and the counter state
//! holder itself.

pub mod counter;
pub mod eip712;
pub mod handle;
pub mod input;
pub mod permission;
pub mod proof;
pub mod runtime;
pub mod wire;

pub use counter::{CounterMethod, CounterUpdate, EncryptedCounter, COUNTER_TYPE};
pub use handle::{CiphertextHandle, FheType, HandleError};
pub use input::{ClearValue, InputError, PublicKey};
pub use permission::{PermissionGrant, PermissionRelay};
pub use proof::{InputProof, ProofBinding, ProofError};
pub use runtime::{CallContext, FheRuntime, RuntimeError};
