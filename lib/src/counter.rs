//! Encrypted counter state holder.
//!
//! Holds a single ciphertext handle for the running total. Every update asks
//! the runtime to validate the caller's input, combine it with the current
//! total and grant access to the result; the stored handle only changes once
//! all of that has succeeded.

use crate::handle::{CiphertextHandle, FheType};
use crate::permission::{PermissionGrant, PermissionRelay};
use crate::runtime::{CallContext, FheRuntime, RuntimeError};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

/// Encrypted type of the running total and of accepted deltas
pub const COUNTER_TYPE: FheType = FheType::Uint32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterMethod {
    Increment,
    Decrement,
}

impl CounterMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Increment => "increment",
            Self::Decrement => "decrement",
        }
    }
}

impl fmt::Display for CounterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "increment" => Ok(Self::Increment),
            "decrement" => Ok(Self::Decrement),
            other => Err(format!("unknown counter method: {other}")),
        }
    }
}

/// Outcome of a successful update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterUpdate {
    pub handle: CiphertextHandle,
    pub grants: [PermissionGrant; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedCounter {
    address: Address,
    count: CiphertextHandle,
    updates: u64,
}

impl EncryptedCounter {
    #[must_use]
    pub const fn new(address: Address) -> Self {
        Self {
            address,
            count: CiphertextHandle::UNINITIALIZED,
            updates: 0,
        }
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Handle of the current total; the zero handle until the first update
    #[must_use]
    pub const fn get_count(&self) -> CiphertextHandle {
        self.count
    }

    /// Number of updates applied so far
    #[must_use]
    pub const fn update_count(&self) -> u64 {
        self.updates
    }

    pub fn increment<R: FheRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        caller: Address,
        input: CiphertextHandle,
        proof: &[u8],
    ) -> Result<CounterUpdate, RuntimeError> {
        self.call(CounterMethod::Increment, runtime, caller, input, proof)
    }

    pub fn decrement<R: FheRuntime + ?Sized>(
        &mut self,
        runtime: &mut R,
        caller: Address,
        input: CiphertextHandle,
        proof: &[u8],
    ) -> Result<CounterUpdate, RuntimeError> {
        self.call(CounterMethod::Decrement, runtime, caller, input, proof)
    }

    #[instrument(skip(self, runtime, proof), fields(counter = %self.address), level = "debug")]
    pub fn call<R: FheRuntime + ?Sized>(
        &mut self,
        method: CounterMethod,
        runtime: &mut R,
        caller: Address,
        input: CiphertextHandle,
        proof: &[u8],
    ) -> Result<CounterUpdate, RuntimeError> {
        let ctx = CallContext::new(self.address, caller);

        let delta = runtime.from_external(input, proof, COUNTER_TYPE, &ctx)?;
        let current = if self.count.is_uninitialized() {
            runtime.trivial_encrypt(0, COUNTER_TYPE, &ctx)?
        } else {
            self.count
        };

        let next = match method {
            CounterMethod::Increment => runtime.add(current, delta, &ctx)?,
            CounterMethod::Decrement => runtime.sub(current, delta, &ctx)?,
        };
        let grants = PermissionRelay::grant_update(runtime, next, &ctx)?;

        self.count = next;
        self.updates += 1;
        debug!("Counter {} now at handle {next} after {method}", self.address);

        Ok(CounterUpdate {
            handle: next,
            grants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ClearValue;
    use crate::proof::{InputProof, ProofBinding, ProofError};
    use alloy_primitives::keccak256;
    use alloy_signer_local::PrivateKeySigner;
    use std::collections::{HashMap, HashSet};

    const CHAIN_ID: u64 = 9_000;

    /// Runtime double keeping clear values behind handles
    struct ClearRuntime {
        signer: PrivateKeySigner,
        verifier: Address,
        values: HashMap<CiphertextHandle, ClearValue>,
        acl: HashSet<(CiphertextHandle, Address)>,
        seq: u64,
    }

    impl ClearRuntime {
        fn new() -> Self {
            Self {
                signer: PrivateKeySigner::random(),
                verifier: Address::repeat_byte(0x0f),
                values: HashMap::new(),
                acl: HashSet::new(),
                seq: 0,
            }
        }

        fn input(
            &mut self,
            value: ClearValue,
            contract: Address,
            caller: Address,
        ) -> (CiphertextHandle, Vec<u8>) {
            self.seq += 1;
            let handle = CiphertextHandle::for_input(
                keccak256(self.seq.to_be_bytes()),
                0,
                CHAIN_ID,
                value.fhe_type,
            );
            self.values.insert(handle, value);
            let binding = ProofBinding {
                contract,
                caller,
                chain_id: CHAIN_ID,
            };
            let signers = [self.signer.clone()];
            let proof = InputProof::sign(vec![handle], &binding, self.verifier, &signers).unwrap();
            (handle, proof.encode().to_vec())
        }

        fn value(&self, handle: &CiphertextHandle) -> u64 {
            self.values[handle].value
        }

        fn require(
            &self,
            handle: CiphertextHandle,
            account: Address,
        ) -> Result<ClearValue, RuntimeError> {
            if !self.is_allowed(&handle, &account) {
                return Err(RuntimeError::AccessDenied { handle, account });
            }
            self.values
                .get(&handle)
                .copied()
                .ok_or(RuntimeError::UnknownHandle(handle))
        }

        fn store(
            &mut self,
            op: &str,
            operands: &[CiphertextHandle],
            value: ClearValue,
            ctx: &CallContext,
        ) -> CiphertextHandle {
            self.seq += 1;
            let handle =
                CiphertextHandle::for_computation(op, operands, CHAIN_ID, value.fhe_type, self.seq);
            self.values.insert(handle, value);
            self.acl.insert((handle, ctx.contract));
            handle
        }
    }

    impl FheRuntime for ClearRuntime {
        fn from_external(
            &mut self,
            handle: CiphertextHandle,
            proof: &[u8],
            expected: FheType,
            ctx: &CallContext,
        ) -> Result<CiphertextHandle, RuntimeError> {
            let binding = ProofBinding {
                contract: ctx.contract,
                caller: ctx.caller,
                chain_id: CHAIN_ID,
            };
            let trusted = [self.signer.address()];
            InputProof::decode(proof)?.verify(&handle, &binding, self.verifier, &trusted, 1)?;
            let actual = handle.fhe_type()?;
            if actual != expected {
                return Err(RuntimeError::TypeMismatch { expected, actual });
            }
            self.acl.insert((handle, ctx.contract));
            Ok(handle)
        }

        fn trivial_encrypt(
            &mut self,
            value: u64,
            fhe_type: FheType,
            ctx: &CallContext,
        ) -> Result<CiphertextHandle, RuntimeError> {
            Ok(self.store("trivial", &[], ClearValue::new(fhe_type, value), ctx))
        }

        fn add(
            &mut self,
            lhs: CiphertextHandle,
            rhs: CiphertextHandle,
            ctx: &CallContext,
        ) -> Result<CiphertextHandle, RuntimeError> {
            let (a, b) = (self.require(lhs, ctx.contract)?, self.require(rhs, ctx.contract)?);
            let sum = a.value.wrapping_add(b.value) & a.fhe_type.mask();
            Ok(self.store("add", &[lhs, rhs], ClearValue::new(a.fhe_type, sum), ctx))
        }

        fn sub(
            &mut self,
            lhs: CiphertextHandle,
            rhs: CiphertextHandle,
            ctx: &CallContext,
        ) -> Result<CiphertextHandle, RuntimeError> {
            let (a, b) = (self.require(lhs, ctx.contract)?, self.require(rhs, ctx.contract)?);
            let diff = a.value.wrapping_sub(b.value) & a.fhe_type.mask();
            Ok(self.store("sub", &[lhs, rhs], ClearValue::new(a.fhe_type, diff), ctx))
        }

        fn allow(
            &mut self,
            handle: CiphertextHandle,
            account: Address,
            ctx: &CallContext,
        ) -> Result<(), RuntimeError> {
            self.require(handle, ctx.contract)?;
            self.acl.insert((handle, account));
            Ok(())
        }

        fn is_allowed(&self, handle: &CiphertextHandle, account: &Address) -> bool {
            self.acl.contains(&(*handle, *account))
        }
    }

    fn addresses() -> (Address, Address) {
        (Address::repeat_byte(0xc0), Address::repeat_byte(0xa1))
    }

    #[test]
    fn test_new_counter_is_uninitialized() {
        let (contract, _) = addresses();
        let counter = EncryptedCounter::new(contract);
        assert!(counter.get_count().is_uninitialized());
        assert_eq!(counter.update_count(), 0);
    }

    #[test]
    fn test_increment_then_decrement() {
        let (contract, caller) = addresses();
        let mut runtime = ClearRuntime::new();
        let mut counter = EncryptedCounter::new(contract);

        let (five, proof) = runtime.input(ClearValue::new(FheType::Uint32, 5), contract, caller);
        let update = counter.increment(&mut runtime, caller, five, &proof).unwrap();
        assert_eq!(counter.get_count(), update.handle);
        assert_eq!(runtime.value(&update.handle), 5);

        let (three, proof) = runtime.input(ClearValue::new(FheType::Uint32, 3), contract, caller);
        let update = counter.decrement(&mut runtime, caller, three, &proof).unwrap();
        assert_eq!(runtime.value(&update.handle), 2);
        assert_eq!(counter.update_count(), 2);
    }

    #[test]
    fn test_update_grants_contract_and_caller() {
        let (contract, caller) = addresses();
        let mut runtime = ClearRuntime::new();
        let mut counter = EncryptedCounter::new(contract);

        let (delta, proof) = runtime.input(ClearValue::new(FheType::Uint32, 1), contract, caller);
        let update = counter.increment(&mut runtime, caller, delta, &proof).unwrap();

        assert_eq!(update.grants[0].grantee, contract);
        assert_eq!(update.grants[1].grantee, caller);
        assert!(runtime.is_allowed(&update.handle, &contract));
        assert!(runtime.is_allowed(&update.handle, &caller));
        assert!(!runtime.is_allowed(&update.handle, &Address::repeat_byte(0x99)));
    }

    #[test]
    fn test_decrement_below_zero_wraps() {
        let (contract, caller) = addresses();
        let mut runtime = ClearRuntime::new();
        let mut counter = EncryptedCounter::new(contract);

        let (one, proof) = runtime.input(ClearValue::new(FheType::Uint32, 1), contract, caller);
        let update = counter.decrement(&mut runtime, caller, one, &proof).unwrap();
        assert_eq!(runtime.value(&update.handle), u64::from(u32::MAX));
    }

    #[test]
    fn test_proof_for_other_caller_leaves_state_untouched() {
        let (contract, caller) = addresses();
        let intruder = Address::repeat_byte(0xbb);
        let mut runtime = ClearRuntime::new();
        let mut counter = EncryptedCounter::new(contract);

        let (seed, proof) = runtime.input(ClearValue::new(FheType::Uint32, 4), contract, caller);
        let before = counter.increment(&mut runtime, caller, seed, &proof).unwrap().handle;

        let (delta, proof) = runtime.input(ClearValue::new(FheType::Uint32, 1), contract, caller);
        let err = counter.increment(&mut runtime, intruder, delta, &proof).unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::ProofRejected(ProofError::InsufficientSignatures { .. })
        ));
        assert_eq!(counter.get_count(), before);
        assert_eq!(counter.update_count(), 1);
    }

    #[test]
    fn test_proof_for_other_contract_rejected() {
        let (contract, caller) = addresses();
        let mut runtime = ClearRuntime::new();
        let mut counter = EncryptedCounter::new(contract);

        let (delta, proof) =
            runtime.input(ClearValue::new(FheType::Uint32, 1), Address::repeat_byte(0xdd), caller);
        assert!(counter.increment(&mut runtime, caller, delta, &proof).is_err());
        assert!(counter.get_count().is_uninitialized());
    }

    #[test]
    fn test_wrong_input_type_rejected() {
        let (contract, caller) = addresses();
        let mut runtime = ClearRuntime::new();
        let mut counter = EncryptedCounter::new(contract);

        let (delta, proof) = runtime.input(ClearValue::new(FheType::Uint8, 1), contract, caller);
        assert_eq!(
            counter.increment(&mut runtime, caller, delta, &proof),
            Err(RuntimeError::TypeMismatch {
                expected: FheType::Uint32,
                actual: FheType::Uint8
            })
        );
    }

    #[test]
    fn test_method_names() {
        assert_eq!("increment".parse::<CounterMethod>().unwrap(), CounterMethod::Increment);
        assert_eq!(CounterMethod::Decrement.to_string(), "decrement");
        assert!("reset".parse::<CounterMethod>().is_err());
    }
}
