//! The seam between contract logic and the FHE runtime that owns ciphertexts.
//!
//! Contract code only ever holds handles. Validation of inputs, homomorphic
//! arithmetic and access control are requested through [`FheRuntime`].

use crate::handle::{CiphertextHandle, FheType, HandleError};
use crate::proof::ProofError;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identities of the executing contract and the account that called it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub contract: Address,
    pub caller: Address,
}

impl CallContext {
    #[must_use]
    pub const fn new(contract: Address, caller: Address) -> Self {
        Self { contract, caller }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Input proof rejected: {0}")]
    ProofRejected(#[from] ProofError),

    #[error("Unknown ciphertext handle: {0}")]
    UnknownHandle(CiphertextHandle),

    #[error("Invalid handle: {0}")]
    InvalidHandle(#[from] HandleError),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: FheType, actual: FheType },

    #[error("Account {account} is not allowed to use handle {handle}")]
    AccessDenied {
        handle: CiphertextHandle,
        account: Address,
    },
}

impl RuntimeError {
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ProofRejected(inner) => inner.error_code(),
            Self::UnknownHandle(_) => "UNKNOWN_HANDLE",
            Self::InvalidHandle(_) => "INVALID_HANDLE",
            Self::TypeMismatch { .. } => "TYPE_MISMATCH",
            Self::AccessDenied { .. } => "ACCESS_DENIED",
        }
    }
}

/// Operations a contract may request from the FHE runtime.
///
/// Every handle produced for a contract is transiently allowed to it until
/// [`FheRuntime::end_transaction`]; anything that must outlive the call has to
/// be granted with [`FheRuntime::allow`].
pub trait FheRuntime {
    /// Validate an externally produced input for `ctx` and return its handle
    fn from_external(
        &mut self,
        handle: CiphertextHandle,
        proof: &[u8],
        expected: FheType,
        ctx: &CallContext,
    ) -> Result<CiphertextHandle, RuntimeError>;

    /// Encrypt a public constant
    fn trivial_encrypt(
        &mut self,
        value: u64,
        fhe_type: FheType,
        ctx: &CallContext,
    ) -> Result<CiphertextHandle, RuntimeError>;

    /// Wrapping homomorphic addition
    fn add(
        &mut self,
        lhs: CiphertextHandle,
        rhs: CiphertextHandle,
        ctx: &CallContext,
    ) -> Result<CiphertextHandle, RuntimeError>;

    /// Wrapping homomorphic subtraction
    fn sub(
        &mut self,
        lhs: CiphertextHandle,
        rhs: CiphertextHandle,
        ctx: &CallContext,
    ) -> Result<CiphertextHandle, RuntimeError>;

    /// Persistently allow `account` to use `handle`. The executing contract
    /// must itself have access.
    fn allow(
        &mut self,
        handle: CiphertextHandle,
        account: Address,
        ctx: &CallContext,
    ) -> Result<(), RuntimeError>;

    fn allow_this(
        &mut self,
        handle: CiphertextHandle,
        ctx: &CallContext,
    ) -> Result<(), RuntimeError> {
        self.allow(handle, ctx.contract, ctx)
    }

    fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool;

    /// Drop transient grants at the end of a call
    fn end_transaction(&mut self) {}
}
