//! Trying a remote call through each requester in turn.

use crate::attributes::Requester;
use crate::error::{Result, SyncError};
use crate::progress::{self, ProgressIndicator};
use tracing::debug;

/// Run `call` with each requester until one succeeds.
///
/// The last failure is returned when every requester fails. Cancellation
/// stops the loop at once. An empty list is `SyncError::NoRequesters`.
pub fn first_successful<T>(
    requesters: &[Requester],
    target: &str,
    progress: Option<&dyn ProgressIndicator>,
    mut call: impl FnMut(&Requester) -> Result<T>,
) -> Result<T> {
    let mut last_error = None;
    for requester in requesters {
        progress::check_cancelled(progress)?;
        debug!(%requester, target, "trying to execute a call");
        match call(requester) {
            Ok(value) => {
                progress::check_cancelled(progress)?;
                return Ok(value);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                debug!(%requester, target, error = %e, "call failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| SyncError::NoRequesters(target.to_string())))
}
