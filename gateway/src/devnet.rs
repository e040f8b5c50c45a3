//! Single-process stand-in for the chain: deploys counters, sequences calls
//! per account and runs each call as one transaction against the coprocessor.

use crate::coprocessor::LocalCoprocessor;
use crate::error::{GatewayError, GatewayResult};
use alloy_primitives::{address, Address, Signature};
use counter_lib::eip712::counter_call_hash;
use counter_lib::wire::{CounterCallRequest, CounterCallResponse};
use counter_lib::{CounterMethod, EncryptedCounter, FheRuntime};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

/// Deployer account whose CREATE addresses become counter addresses
pub const DEVNET_DEPLOYER: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

pub struct Devnet {
    runtime: LocalCoprocessor,
    counters: HashMap<Address, EncryptedCounter>,
    nonces: HashMap<Address, u64>,
    deployments: u64,
}

impl Devnet {
    #[must_use]
    pub fn new(runtime: LocalCoprocessor) -> Self {
        Self {
            runtime,
            counters: HashMap::new(),
            nonces: HashMap::new(),
            deployments: 0,
        }
    }

    #[must_use]
    pub const fn runtime(&self) -> &LocalCoprocessor {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut LocalCoprocessor {
        &mut self.runtime
    }

    #[must_use]
    pub fn chain_id(&self) -> u64 {
        self.runtime.config().chain_id
    }

    #[must_use]
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Deploy a fresh counter at the next deployer CREATE address
    pub fn deploy_counter(&mut self) -> Address {
        loop {
            let address = DEVNET_DEPLOYER.create(self.deployments);
            self.deployments += 1;
            if !self.counters.contains_key(&address) {
                self.insert_counter(address);
                return address;
            }
        }
    }

    /// Deploy a counter at a fixed address, keeping any existing state there
    pub fn deploy_counter_at(&mut self, address: Address) -> bool {
        if self.counters.contains_key(&address) {
            return false;
        }
        self.insert_counter(address);
        true
    }

    fn insert_counter(&mut self, address: Address) {
        self.counters.insert(address, EncryptedCounter::new(address));
        info!("📦 Deployed encrypted counter at {address}");
    }

    pub fn counter(&self, address: Address) -> GatewayResult<&EncryptedCounter> {
        self.counters
            .get(&address)
            .ok_or(GatewayError::CounterNotFound(address))
    }

    #[must_use]
    pub fn nonce(&self, account: Address) -> u64 {
        self.nonces.get(&account).copied().unwrap_or_default()
    }

    /// Run `method` on the counter at `address` on behalf of `request.caller`.
    ///
    /// The caller's nonce is consumed once the signature checks out, whether
    /// or not the counter call itself succeeds.
    #[instrument(skip(self, request), fields(caller = %request.caller), level = "info")]
    pub fn call(
        &mut self,
        address: Address,
        method: CounterMethod,
        request: &CounterCallRequest,
    ) -> GatewayResult<CounterCallResponse> {
        let chain_id = self.chain_id();
        let expected = self.nonce(request.caller);
        let counter = self
            .counters
            .get_mut(&address)
            .ok_or(GatewayError::CounterNotFound(address))?;

        if request.nonce != expected {
            return Err(GatewayError::NonceMismatch {
                account: request.caller,
                expected,
                actual: request.nonce,
            });
        }

        let signature = Signature::try_from(request.signature.as_ref())
            .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
        let digest = counter_call_hash(
            address,
            method.as_str(),
            &request.input_handle,
            &request.input_proof,
            request.nonce,
            chain_id,
        );
        let signer = signature
            .recover_address_from_prehash(&digest)
            .map_err(|e| GatewayError::InvalidSignature(e.to_string()))?;
        if signer != request.caller {
            return Err(GatewayError::InvalidSignature(format!(
                "call signed by {signer}, expected {}",
                request.caller
            )));
        }

        self.nonces.insert(request.caller, expected + 1);
        let outcome = counter.call(
            method,
            &mut self.runtime,
            request.caller,
            request.input_handle,
            &request.input_proof,
        );
        self.runtime.end_transaction();

        let update = match outcome {
            Ok(update) => update,
            Err(e) => {
                warn!("⛔ {method} on {address} reverted: {e}");
                return Err(e.into());
            }
        };

        info!("✅ {method} on {address} by {} -> {}", request.caller, update.handle);
        Ok(CounterCallResponse {
            address,
            method,
            handle: update.handle,
            grants: update.grants.to_vec(),
            next_nonce: expected + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coprocessor::CoprocessorConfig;
    use alloy_primitives::Bytes;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;
    use counter_lib::input::{self, ClearValue};
    use counter_lib::COUNTER_TYPE;

    fn devnet() -> Devnet {
        let runtime =
            LocalCoprocessor::new(CoprocessorConfig::default(), vec![PrivateKeySigner::random()])
                .unwrap();
        Devnet::new(runtime)
    }

    fn signed_call(
        devnet: &mut Devnet,
        user: &PrivateKeySigner,
        counter: Address,
        method: CounterMethod,
        value: u64,
    ) -> CounterCallRequest {
        let blob = input::seal(
            devnet.runtime().public_key(),
            &[ClearValue::new(COUNTER_TYPE, value)],
        )
        .unwrap();
        let proof = devnet
            .runtime_mut()
            .register_input(&blob, counter, user.address())
            .unwrap();

        let nonce = devnet.nonce(user.address());
        let digest = counter_call_hash(
            counter,
            method.as_str(),
            &proof.handles[0],
            &proof.input_proof,
            nonce,
            devnet.chain_id(),
        );
        CounterCallRequest {
            caller: user.address(),
            nonce,
            input_handle: proof.handles[0],
            input_proof: proof.input_proof,
            signature: Bytes::from(user.sign_hash_sync(&digest).unwrap().as_bytes().to_vec()),
        }
    }

    #[test]
    fn test_deploy_uses_distinct_addresses() {
        let mut devnet = devnet();
        let first = devnet.deploy_counter();
        let second = devnet.deploy_counter();

        assert_ne!(first, second);
        assert_eq!(first, DEVNET_DEPLOYER.create(0));
        assert!(!devnet.deploy_counter_at(first));
        assert_eq!(devnet.counter_count(), 2);
        assert!(devnet.counter(first).unwrap().get_count().is_uninitialized());
    }

    #[test]
    fn test_call_updates_count_and_grants_caller() {
        let mut devnet = devnet();
        let user = PrivateKeySigner::random();
        let counter = devnet.deploy_counter();

        let request = signed_call(&mut devnet, &user, counter, CounterMethod::Increment, 4);
        let response = devnet.call(counter, CounterMethod::Increment, &request).unwrap();

        assert_eq!(response.next_nonce, 1);
        assert_eq!(devnet.counter(counter).unwrap().get_count(), response.handle);
        assert!(devnet.runtime().is_allowed(&response.handle, &user.address()));
        assert!(devnet.runtime().is_allowed(&response.handle, &counter));
        assert!(!devnet
            .runtime()
            .is_allowed(&request.input_handle, &counter));
    }

    #[test]
    fn test_call_ends_its_transaction() {
        let mut devnet = devnet();
        let user = PrivateKeySigner::random();
        let counter = devnet.deploy_counter();

        let first = signed_call(&mut devnet, &user, counter, CounterMethod::Increment, 2);
        let first = devnet.call(counter, CounterMethod::Increment, &first).unwrap();
        let second = signed_call(&mut devnet, &user, counter, CounterMethod::Decrement, 1);
        devnet.call(counter, CounterMethod::Decrement, &second).unwrap();

        // Inputs were only usable during their own call; stored totals keep their grants.
        assert!(!devnet.runtime().is_allowed(&second.input_handle, &counter));
        assert!(devnet.runtime().is_allowed(&first.handle, &counter));
        assert!(devnet.runtime().is_allowed(&first.handle, &user.address()));
    }

    #[test]
    fn test_replayed_call_is_rejected() {
        let mut devnet = devnet();
        let user = PrivateKeySigner::random();
        let counter = devnet.deploy_counter();

        let request = signed_call(&mut devnet, &user, counter, CounterMethod::Increment, 1);
        devnet.call(counter, CounterMethod::Increment, &request).unwrap();

        assert!(matches!(
            devnet.call(counter, CounterMethod::Increment, &request),
            Err(GatewayError::NonceMismatch {
                expected: 1,
                actual: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_signature_binds_method() {
        let mut devnet = devnet();
        let user = PrivateKeySigner::random();
        let counter = devnet.deploy_counter();

        let request = signed_call(&mut devnet, &user, counter, CounterMethod::Increment, 1);
        assert!(matches!(
            devnet.call(counter, CounterMethod::Decrement, &request),
            Err(GatewayError::InvalidSignature(_))
        ));
        assert_eq!(devnet.nonce(user.address()), 0);
    }

    #[test]
    fn test_reverted_call_consumes_nonce_and_keeps_state() {
        let mut devnet = devnet();
        let user = PrivateKeySigner::random();
        let counter = devnet.deploy_counter();
        let other = devnet.deploy_counter();

        // Proof bound to `other`, submitted to `counter`.
        let mut request = signed_call(&mut devnet, &user, other, CounterMethod::Increment, 1);
        let digest = counter_call_hash(
            counter,
            CounterMethod::Increment.as_str(),
            &request.input_handle,
            &request.input_proof,
            request.nonce,
            devnet.chain_id(),
        );
        request.signature =
            Bytes::from(user.sign_hash_sync(&digest).unwrap().as_bytes().to_vec());

        assert!(matches!(
            devnet.call(counter, CounterMethod::Increment, &request),
            Err(GatewayError::Runtime(_))
        ));
        assert_eq!(devnet.nonce(user.address()), 1);
        assert!(devnet.counter(counter).unwrap().get_count().is_uninitialized());
    }

    #[test]
    fn test_unknown_counter() {
        let mut devnet = devnet();
        let user = PrivateKeySigner::random();
        let request = signed_call(
            &mut devnet,
            &user,
            Address::repeat_byte(1),
            CounterMethod::Increment,
            1,
        );

        assert!(matches!(
            devnet.call(Address::repeat_byte(1), CounterMethod::Increment, &request),
            Err(GatewayError::CounterNotFound(_))
        ));
    }
}
