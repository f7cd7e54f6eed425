//! Error-reporting call gate
//!
//! Every foreign call made by this crate passes through [`call_guarded`] or
//! one of its cleanup variants. A zero status is success; anything else is
//! turned into a [`GateError::Call`] naming the function.

use crate::error::{GateError, GateResult};
use std::borrow::Cow;

/// Status code returned by foreign functions
pub type Status = i32;

/// The only success status
pub const SUCCESS: Status = 0;

/// Status used for failures detected on this side of the boundary
pub const INVALID_VALUE: Status = -30;

/// Turn a status into a result, without making a call
pub fn check(name: impl Into<Cow<'static, str>>, status: Status) -> GateResult<()> {
    if status == SUCCESS {
        Ok(())
    } else {
        Err(GateError::call(name, status))
    }
}

/// Invoke a foreign call exactly once and check its status
///
/// The closure is expected to wrap one `unsafe` foreign call; its arguments
/// are captured from the environment.
///
/// # Examples
///
/// ```
/// # use clasp_core::gate::{call_guarded, Status};
/// extern "C" fn flush(_queue: usize) -> Status { 0 }
///
/// call_guarded("clFlush", || flush(7)).unwrap();
/// ```
pub fn call_guarded<F>(name: &'static str, call: F) -> GateResult<()>
where
    F: FnOnce() -> Status,
{
    check(name, call())
}

/// Like [`call_guarded`], but releases a resource the failed call may have
/// produced before reporting the failure
///
/// Errors from `release` are logged and dropped; the caller sees the
/// original failure.
pub fn call_guarded_or_release<F, R>(
    name: &'static str,
    call: F,
    release_name: &'static str,
    release: R,
) -> GateResult<()>
where
    F: FnOnce() -> Status,
    R: FnOnce() -> Status,
{
    let status = call();
    if status == SUCCESS {
        return Ok(());
    }
    call_guarded_cleanup(release_name, release);
    Err(GateError::call(name, status))
}

/// Run a compensating release whose failure must not mask anything
///
/// Returns whether the release succeeded; a failure is logged at warn level.
pub fn call_guarded_cleanup<R>(name: &'static str, release: R) -> bool
where
    R: FnOnce() -> Status,
{
    let status = release();
    if status != SUCCESS {
        tracing::warn!(function = name, status, "cleanup call failed; ignoring");
        return false;
    }
    true
}
