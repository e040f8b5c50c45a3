//! Ciphertext handles and the encrypted value types they reference.
//!
//! A handle is a 32-byte opaque reference to a ciphertext held by the
//! coprocessor. Its trailing bytes carry metadata so any holder can tell the
//! encrypted type and origin chain without asking the coprocessor:
//!
//! ```text
//! [0..21)  keccak256 prefix
//! [21]     input index (0xff for computed results)
//! [22..30) chain id, big endian
//! [30]     FHE type tag
//! [31]     handle version
//! ```

use alloy_primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Current handle layout version
pub const HANDLE_VERSION: u8 = 0;

/// Index byte used by handles produced from computations rather than inputs
pub const COMPUTED_INDEX: u8 = 0xff;

/// Encrypted value types supported by the runtime
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FheType {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
}

impl FheType {
    /// Stable byte tag stored in the handle
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::Uint8 => 2,
            Self::Uint16 => 3,
            Self::Uint32 => 4,
            Self::Uint64 => 5,
        }
    }

    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Bool),
            2 => Some(Self::Uint8),
            3 => Some(Self::Uint16),
            4 => Some(Self::Uint32),
            5 => Some(Self::Uint64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::Bool => 1,
            Self::Uint8 => 8,
            Self::Uint16 => 16,
            Self::Uint32 => 32,
            Self::Uint64 => 64,
        }
    }

    /// Bit mask selecting the value range of this type
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self.bits() {
            64 => u64::MAX,
            bits => (1u64 << bits) - 1,
        }
    }

    #[must_use]
    pub const fn fits(self, value: u64) -> bool {
        value & !self.mask() == 0
    }
}

impl fmt::Display for FheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "ebool",
            Self::Uint8 => "euint8",
            Self::Uint16 => "euint16",
            Self::Uint32 => "euint32",
            Self::Uint64 => "euint64",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error("Unknown FHE type tag: {0}")]
    UnknownType(u8),

    #[error("Unsupported handle version: {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid handle encoding: {0}")]
    InvalidEncoding(String),
}

/// Opaque reference to a ciphertext managed by the coprocessor
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CiphertextHandle(B256);

impl CiphertextHandle {
    /// The all-zero handle: a state slot that was never written
    pub const UNINITIALIZED: Self = Self(B256::ZERO);

    #[must_use]
    pub const fn new(bytes: B256) -> Self {
        Self(bytes)
    }

    /// Derive the handle for the `index`-th value of an input blob
    #[must_use]
    pub fn for_input(blob_hash: B256, index: u8, chain_id: u64, ty: FheType) -> Self {
        let digest = keccak256(
            [
                b"FHE_INPUT".as_slice(),
                blob_hash.as_slice(),
                &[index],
                &chain_id.to_be_bytes(),
            ]
            .concat(),
        );
        Self::assemble(digest, index, chain_id, ty)
    }

    /// Derive the handle of a computation result
    ///
    /// `seq` must be unique per computation on a given chain so that repeated
    /// operations over the same operands still yield fresh handles.
    #[must_use]
    pub fn for_computation(
        op: &str,
        operands: &[Self],
        chain_id: u64,
        ty: FheType,
        seq: u64,
    ) -> Self {
        let mut preimage = Vec::with_capacity(11 + op.len() + operands.len() * 32 + 8);
        preimage.extend_from_slice(b"FHE_COMPUTE");
        preimage.extend_from_slice(op.as_bytes());
        for operand in operands {
            preimage.extend_from_slice(operand.0.as_slice());
        }
        preimage.extend_from_slice(&seq.to_be_bytes());

        Self::assemble(keccak256(&preimage), COMPUTED_INDEX, chain_id, ty)
    }

    fn assemble(digest: B256, index: u8, chain_id: u64, ty: FheType) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..21].copy_from_slice(&digest[..21]);
        bytes[21] = index;
        bytes[22..30].copy_from_slice(&chain_id.to_be_bytes());
        bytes[30] = ty.tag();
        bytes[31] = HANDLE_VERSION;
        Self(B256::from(bytes))
    }

    /// Encrypted type recorded in the handle metadata
    pub fn fhe_type(&self) -> Result<FheType, HandleError> {
        if self.version() != HANDLE_VERSION {
            return Err(HandleError::UnsupportedVersion(self.version()));
        }
        FheType::from_tag(self.0[30]).ok_or(HandleError::UnknownType(self.0[30]))
    }

    #[must_use]
    pub fn index(&self) -> u8 {
        self.0[21]
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.index() == COMPUTED_INDEX
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[22..30]);
        u64::from_be_bytes(buf)
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        self.0[31]
    }

    #[must_use]
    pub fn is_uninitialized(&self) -> bool {
        self.0 == B256::ZERO
    }

    #[must_use]
    pub const fn as_b256(&self) -> B256 {
        self.0
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<B256> for CiphertextHandle {
    fn from(bytes: B256) -> Self {
        Self(bytes)
    }
}

impl From<CiphertextHandle> for B256 {
    fn from(handle: CiphertextHandle) -> Self {
        handle.0
    }
}

impl fmt::Display for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for CiphertextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CiphertextHandle({})", self.0)
    }
}

impl FromStr for CiphertextHandle {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<B256>()
            .map(Self)
            .map_err(|e| HandleError::InvalidEncoding(e.to_string()))
    }
}
