//! Safe construction of managed objects from freshly created handles

use crate::error::GateResult;
use crate::handle::{Handle, HandleKind, ManagedObject};

/// Wrap a handle the caller owns in a managed object of class `C`
///
/// The handle is adopted, not retained. If the constructor fails, the
/// handle is released exactly once and the constructor's error is returned;
/// a failing release is logged and does not replace that error.
///
/// # Safety
///
/// `raw` must be a live handle of `C::Kind` and the caller must own one
/// reference to it. That reference is consumed whether or not construction
/// succeeds.
pub unsafe fn convert_obj<C: ManagedObject>(
    raw: <C::Kind as HandleKind>::Raw,
    args: C::Args,
) -> GateResult<C> {
    let handle = Handle::<C::Kind>::from_owned(raw)?;
    C::construct(handle, args).map_err(|e| {
        tracing::warn!(class = %C::class(), error = %e, "construction failed; releasing handle");
        e
    })
}
