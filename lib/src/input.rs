//! Sealed input lists exchanged between the client encryption helper and the
//! coprocessor.
//!
//! Values are masked with a keystream derived from the gateway key and a
//! per-blob nonce. This stands in for compact public-key FHE ciphertexts and
//! offers no confidentiality against anyone holding the published key.

use crate::handle::FheType;
use alloy_primitives::{keccak256, Bytes, B256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of values in one input list
pub const MAX_INPUT_VALUES: usize = 254;

/// Maximum total encrypted bit width of one input list
pub const MAX_INPUT_BITS: u32 = 2048;

const MAX_BLOB_BYTES: usize = 64 * 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Input list is empty")]
    Empty,

    #[error("Input list holds {0} values, at most {MAX_INPUT_VALUES} allowed")]
    TooManyValues(usize),

    #[error("Input list totals {0} bits, at most {MAX_INPUT_BITS} allowed")]
    TooManyBits(u32),

    #[error("Value {value} does not fit in {fhe_type}")]
    ValueOutOfRange { value: u64, fhe_type: FheType },

    #[error("Input sealed for key {actual}, expected {expected}")]
    KeyMismatch { expected: B256, actual: B256 },

    #[error("Invalid sealed input encoding: {0}")]
    Encoding(String),
}

/// Key material published by the gateway for input encryption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    pub key_id: B256,
    pub bytes: Bytes,
}

impl PublicKey {
    #[must_use]
    pub fn from_bytes(bytes: Bytes) -> Self {
        Self {
            key_id: keccak256(&bytes),
            bytes,
        }
    }

    #[must_use]
    pub fn generate() -> Self {
        let material: [u8; 32] = rand::random();
        Self::from_bytes(Bytes::copy_from_slice(&material))
    }

    fn mask(&self, nonce: &B256, index: usize) -> u64 {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        let stream = keccak256(
            [
                self.bytes.as_ref(),
                nonce.as_slice(),
                &index.to_be_bytes(),
            ]
            .concat(),
        );
        let mut word = [0u8; 8];
        word.copy_from_slice(&stream[..8]);
        u64::from_be_bytes(word)
    }
}

/// A typed value before sealing or after opening
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearValue {
    pub fhe_type: FheType,
    pub value: u64,
}

impl ClearValue {
    #[must_use]
    pub const fn new(fhe_type: FheType, value: u64) -> Self {
        Self { fhe_type, value }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedInput {
    key_id: B256,
    nonce: B256,
    values: Vec<SealedValue>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SealedValue {
    fhe_type: FheType,
    masked: u64,
}

/// Seal `values` under `key`
pub fn seal(key: &PublicKey, values: &[ClearValue]) -> Result<Bytes, InputError> {
    check_values(values)?;

    let nonce = B256::from(rand::random::<[u8; 32]>());
    let sealed = SealedInput {
        key_id: key.key_id,
        nonce,
        values: values
            .iter()
            .enumerate()
            .map(|(index, clear)| SealedValue {
                fhe_type: clear.fhe_type,
                masked: (clear.value ^ key.mask(&nonce, index)) & clear.fhe_type.mask(),
            })
            .collect(),
    };

    bincode::serde::encode_to_vec(&sealed, bincode::config::standard())
        .map(Bytes::from)
        .map_err(|e| InputError::Encoding(e.to_string()))
}

/// Open a blob produced by [`seal`]
pub fn open(key: &PublicKey, blob: &[u8]) -> Result<Vec<ClearValue>, InputError> {
    if blob.len() > MAX_BLOB_BYTES {
        return Err(InputError::Encoding(format!(
            "blob of {} bytes exceeds {MAX_BLOB_BYTES}",
            blob.len()
        )));
    }

    let (sealed, read): (SealedInput, usize) =
        bincode::serde::decode_from_slice(blob, bincode::config::standard())
            .map_err(|e| InputError::Encoding(e.to_string()))?;
    if read != blob.len() {
        return Err(InputError::Encoding("trailing bytes after sealed input".to_string()));
    }

    if sealed.key_id != key.key_id {
        return Err(InputError::KeyMismatch {
            expected: key.key_id,
            actual: sealed.key_id,
        });
    }

    let values: Vec<ClearValue> = sealed
        .values
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            ClearValue::new(
                entry.fhe_type,
                (entry.masked ^ key.mask(&sealed.nonce, index)) & entry.fhe_type.mask(),
            )
        })
        .collect();

    check_values(&values)?;
    Ok(values)
}

/// Hash identifying a sealed blob, used to derive its handles
#[must_use]
pub fn blob_hash(blob: &[u8]) -> B256 {
    keccak256(blob)
}

fn check_values(values: &[ClearValue]) -> Result<(), InputError> {
    if values.is_empty() {
        return Err(InputError::Empty);
    }
    if values.len() > MAX_INPUT_VALUES {
        return Err(InputError::TooManyValues(values.len()));
    }

    let bits: u32 = values.iter().map(|v| v.fhe_type.bits()).sum();
    if bits > MAX_INPUT_BITS {
        return Err(InputError::TooManyBits(bits));
    }

    if let Some(bad) = values.iter().find(|v| !v.fhe_type.fits(v.value)) {
        return Err(InputError::ValueOutOfRange {
            value: bad.value,
            fhe_type: bad.fhe_type,
        });
    }

    Ok(())
}
