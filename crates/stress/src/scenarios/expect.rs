//! Whitelisted-error checks.

use std::fmt::Debug;

use tracing::debug;

use kvsoak_rpc::{ErrorKind, RpcError};

use crate::error::{Result, StressError};

/// Require `result` to be an error whose kind is in `allowed`.
///
/// A success, or an error of any other kind, is returned as
/// [`StressError::UnexpectedOutcome`].
pub fn expect_error<T: Debug>(
    operation: &str,
    result: kvsoak_rpc::Result<T>,
    allowed: &[ErrorKind],
) -> Result<RpcError> {
    match result {
        Err(err) if err.is_one_of(allowed) => {
            debug!(operation, kind = %err.kind, "expected error");
            Ok(err)
        }
        Err(err) => Err(StressError::UnexpectedOutcome {
            operation: operation.to_string(),
            expected: allowed.to_vec(),
            actual: err.to_string(),
        }),
        Ok(value) => Err(StressError::UnexpectedOutcome {
            operation: operation.to_string(),
            expected: allowed.to_vec(),
            actual: format!("success ({:?})", value),
        }),
    }
}
