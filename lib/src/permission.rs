use crate::handle::CiphertextHandle;
use crate::runtime::{CallContext, FheRuntime, RuntimeError};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Right of `grantee` to use and request decryption of `handle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub handle: CiphertextHandle,
    pub grantee: Address,
}

/// Grants decrypt rights on a freshly written handle
pub struct PermissionRelay;

impl PermissionRelay {
    /// Allow the executing contract, then the caller, to use `handle`
    pub fn grant_update<R: FheRuntime + ?Sized>(
        runtime: &mut R,
        handle: CiphertextHandle,
        ctx: &CallContext,
    ) -> Result<[PermissionGrant; 2], RuntimeError> {
        runtime.allow_this(handle, ctx)?;
        runtime.allow(handle, ctx.caller, ctx)?;

        debug!(
            "Granted {handle} to contract {} and caller {}",
            ctx.contract, ctx.caller
        );

        Ok([
            PermissionGrant {
                handle,
                grantee: ctx.contract,
            },
            PermissionGrant {
                handle,
                grantee: ctx.caller,
            },
        ])
    }
}
