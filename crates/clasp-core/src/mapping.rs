//! Mapped memory regions that are unmapped exactly once

use crate::error::{GateError, GateResult};
use crate::gate::{self, Status, INVALID_VALUE};
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// The foreign "unmap" call for one mapped region
///
/// Implementations own whatever handles the unmap call needs, typically a
/// queue and the mapped memory object.
pub trait Unmap {
    /// Name of the foreign unmap function, for diagnostics
    const NAME: &'static str;

    /// Unmap `data`
    ///
    /// # Safety
    ///
    /// `data` must be the pointer returned by the matching map call and must
    /// not have been unmapped yet.
    unsafe fn unmap(&self, data: *mut c_void) -> Status;
}

/// A mapped region plus the means to unmap it
pub struct Mapping<U: Unmap> {
    data: *mut c_void,
    unmapper: U,
    valid: AtomicBool,
}

impl<U: Unmap> Mapping<U> {
    /// Take ownership of a region returned by a successful map call
    ///
    /// # Safety
    ///
    /// `data` must be a live mapping that `unmapper` can unmap, and nothing
    /// else may unmap it.
    pub unsafe fn new(data: *mut c_void, unmapper: U) -> Self {
        Self {
            data,
            unmapper,
            valid: AtomicBool::new(true),
        }
    }

    /// Build the unmapper for a fresh region and take ownership of both
    ///
    /// If `build` fails, `data` is unmapped through `fallback` before the
    /// error is returned; a failing fallback unmap is logged.
    ///
    /// # Safety
    ///
    /// As for [`Mapping::new`], and `fallback` must also be able to unmap
    /// `data`.
    pub unsafe fn adopt<F, B>(data: *mut c_void, fallback: F, build: B) -> GateResult<Self>
    where
        F: Unmap,
        B: FnOnce() -> GateResult<U>,
    {
        match build() {
            Ok(unmapper) => Ok(Self::new(data, unmapper)),
            Err(e) => {
                gate::call_guarded_cleanup(F::NAME, || fallback.unmap(data));
                Err(e)
            }
        }
    }

    /// Unmap the region
    ///
    /// Fails without calling anything if the region was already released.
    pub fn release(&self) -> GateResult<()> {
        if !self.valid.swap(false, Ordering::AcqRel) {
            return Err(GateError::call_with_message(
                U::NAME,
                INVALID_VALUE,
                "trying to double-unref mem map",
            ));
        }
        // SAFETY: the flag guarantees this is the only unmap of data
        gate::call_guarded(U::NAME, || unsafe { self.unmapper.unmap(self.data) })
    }

    /// Check if the region is still mapped
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// The mapped pointer; dangling once released
    pub fn data(&self) -> *mut c_void {
        self.data
    }

    /// Address of the region, 0 once released
    pub fn int_ptr(&self) -> usize {
        if self.is_valid() {
            self.data as usize
        } else {
            0
        }
    }

    pub fn unmapper(&self) -> &U {
        &self.unmapper
    }
}

impl<U: Unmap> Drop for Mapping<U> {
    fn drop(&mut self) {
        if self.valid.swap(false, Ordering::AcqRel) {
            let data = self.data;
            let unmapper = &self.unmapper;
            // SAFETY: still valid, so not unmapped yet
            gate::call_guarded_cleanup(U::NAME, || unsafe { unmapper.unmap(data) });
        }
    }
}

impl<U: Unmap> fmt::Debug for Mapping<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapping")
            .field("data", &self.data)
            .field("valid", &self.is_valid())
            .finish()
    }
}
