use alloy_sol_types::sol;

sol! {
    /// Deployed encrypted counter. `euint32` / `externalEuint32` values travel
    /// as their 32-byte handles.
    #[sol(rpc)]
    interface IFHECounter {
        function getCount() external view returns (bytes32);

        function increment(bytes32 inputEuint32, bytes calldata inputProof) external;

        function decrement(bytes32 inputEuint32, bytes calldata inputProof) external;
    }
}

pub use IFHECounter::IFHECounterInstance;
