//! Response validation
//!
//! Expected failures (405, 404, 500) are declared the same way as success,
//! by listing the acceptable codes.

use crate::client::CommandResult;
use crate::common::{Error, Result};

/// Codes accepted when a caller does not widen the set
pub const DEFAULT_EXPECTED: &[u16] = &[200];

/// Pass `result` through if its status is in `expected`
pub fn validate(result: CommandResult, expected: &[u16]) -> Result<CommandResult> {
    tracing::debug!(
        status = result.status(),
        url = %result.url(),
        body = %result.trimmed(),
        "validating response"
    );

    if expected.contains(&result.status()) {
        Ok(result)
    } else {
        Err(Error::unexpected_status(
            result.status(),
            expected,
            result.url(),
            result.body(),
        ))
    }
}

/// [`validate`] against [`DEFAULT_EXPECTED`]
pub fn validate_ok(result: CommandResult) -> Result<CommandResult> {
    validate(result, DEFAULT_EXPECTED)
}
