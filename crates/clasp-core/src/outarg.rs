//! Deferred construction for handles returned through out-parameters
//!
//! Foreign constructors often write the new handle through a pointer
//! argument. [`OutArg`] owns that slot from before the call until the
//! managed object exists, so the raw handle always has exactly one owner:
//!
//! ```text
//!  Pending ──mark_filled()──▶ Filled(raw) ──finish()──▶ Finalized
//!     │                          │                        │
//!  cleanup: nothing          cleanup: release raw     cleanup: hand the
//!  (slot never read)                                  object back, no release
//! ```
//!
//! Dropping an adapter runs the same cleanup as `cleanup(false)` on any
//! state that still owns a raw handle.

use crate::construct::convert_obj;
use crate::error::{GateError, GateResult};
use crate::gate;
use crate::handle::{HandleKind, ManagedObject, RawHandle};

type RawOf<C> = <<C as ManagedObject>::Kind as HandleKind>::Raw;

enum State<R> {
    Pending,
    Filled(R),
    Finalized,
    Closed,
}

impl<R> State<R> {
    fn name(&self) -> &'static str {
        match self {
            State::Pending => "pending",
            State::Filled(_) => "filled",
            State::Finalized => "finalized",
            State::Closed => "closed",
        }
    }
}

/// Adapter between a foreign out-parameter and a managed object
pub struct OutArg<'r, C: ManagedObject> {
    ret: &'r mut Option<C>,
    slot: RawOf<C>,
    state: State<RawOf<C>>,
    args: Option<C::Args>,
}

impl<'r, C: ManagedObject> OutArg<'r, C> {
    /// Prepare an adapter that will write its object into `ret`
    ///
    /// `args` are the extra constructor arguments used by [`finish`](Self::finish).
    pub fn new(ret: &'r mut Option<C>, args: C::Args) -> Self {
        Self {
            ret,
            slot: RawOf::<C>::null(),
            state: State::Pending,
            args: Some(args),
        }
    }

    /// Slot for the foreign call to write the new handle into
    pub fn slot(&mut self) -> *mut RawOf<C> {
        &mut self.slot
    }

    /// Record that the embedding call succeeded
    ///
    /// A slot left null stays pending: there is nothing to own.
    pub fn mark_filled(&mut self) -> GateResult<()> {
        match self.state {
            State::Pending => {
                if !self.slot.is_null() {
                    self.state = State::Filled(self.slot);
                }
                Ok(())
            }
            ref other => Err(GateError::InvalidState {
                operation: "fill",
                state: other.name(),
            }),
        }
    }

    /// Build the managed object and store it in the output location
    ///
    /// If the constructor fails the raw handle is released before the error
    /// is returned and the adapter is closed.
    pub fn finish(&mut self) -> GateResult<()> {
        let raw = match self.state {
            State::Filled(raw) => raw,
            ref other => {
                return Err(GateError::InvalidState {
                    operation: "finish",
                    state: other.name(),
                })
            }
        };
        let args = self.args.take().ok_or(GateError::InvalidState {
            operation: "finish",
            state: "consumed",
        })?;

        // Ownership of raw moves into convert_obj from here on
        self.state = State::Closed;
        // SAFETY: raw was written by a successful constructor call
        let object = unsafe { convert_obj::<C>(raw, args) }?;
        *self.ret = Some(object);
        self.state = State::Finalized;
        tracing::debug!(class = %C::class(), handle = raw.addr(), "out-argument finished");
        Ok(())
    }

    /// Undo whatever this adapter still owns
    ///
    /// From `Finalized` the output location is cleared and the finished
    /// object is returned to the caller; the adapter itself releases nothing.
    /// From `Filled` the raw handle is released. From `Pending` the slot is
    /// not read at all.
    #[must_use = "dropping the returned object releases its handle"]
    pub fn cleanup(mut self, was_finished: bool) -> Option<C> {
        let finalized = matches!(self.state, State::Finalized);
        if was_finished != finalized {
            tracing::warn!(
                class = %C::class(),
                was_finished,
                state = self.state.name(),
                "out-argument cleanup flag disagrees with adapter state"
            );
        }
        self.close()
    }

    fn close(&mut self) -> Option<C> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Finalized => self.ret.take(),
            State::Filled(raw) => {
                // SAFETY: the adapter owns the reference until finish succeeds
                gate::call_guarded_cleanup(<C::Kind as HandleKind>::RELEASE, || unsafe {
                    <C::Kind as HandleKind>::release(raw)
                });
                None
            }
            State::Pending | State::Closed => None,
        }
    }

    /// Name of the current state
    pub fn state(&self) -> &'static str {
        self.state.name()
    }
}

impl<C: ManagedObject> Drop for OutArg<'_, C> {
    fn drop(&mut self) {
        // A finalized object already lives in the output location
        if !matches!(self.state, State::Finalized) {
            self.close();
        }
    }
}

/// Call a foreign constructor that returns its handle through an
/// out-parameter, and wrap the result
///
/// `call` receives the slot to pass to the foreign function. On success
/// the handle is wrapped with `args`; on any failure nothing leaks.
pub fn construct_via<C, F>(name: &'static str, args: C::Args, call: F) -> GateResult<C>
where
    C: ManagedObject,
    F: FnOnce(*mut RawOf<C>) -> gate::Status,
{
    let mut raw = RawOf::<C>::null();
    let slot: *mut RawOf<C> = &mut raw;
    // A failed call may scribble into the slot; it is never read
    gate::check(name, call(slot))?;
    if raw.is_null() {
        return Err(GateError::NullHandle { class: C::class() });
    }
    // SAFETY: raw was written by a successful constructor call
    unsafe { convert_obj::<C>(raw, args) }
}
