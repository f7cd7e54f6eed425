//! Foreign handles and the managed objects that own them
//!
//! A raw handle is a reference-counted pointer owned by the foreign side.
//! [`Handle<K>`] owns exactly one reference to it and releases that reference
//! exactly once when dropped. Managed objects ([`ManagedObject`]) are built on
//! top of a `Handle` and inherit that guarantee.
//!
//! A raw handle is owned by exactly one of: the code that just received it
//! from a foreign call, an [`OutArg`](crate::outarg::OutArg) adapter, or a
//! `Handle`.

use crate::error::{GateError, GateResult};
use crate::gate::{self, Status};
use bytemuck::Zeroable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::mem::ManuallyDrop;

/// Pointer-sized opaque handle value
pub trait RawHandle: Copy + Zeroable + fmt::Debug + 'static {
    /// The null handle
    fn null() -> Self;

    /// Check for the null handle
    fn is_null(self) -> bool;

    /// Address of the handle, for identity comparisons
    fn addr(self) -> usize;
}

impl<T: 'static> RawHandle for *mut T {
    fn null() -> Self {
        std::ptr::null_mut()
    }

    fn is_null(self) -> bool {
        <*mut T>::is_null(self)
    }

    fn addr(self) -> usize {
        self as usize
    }
}

/// Identifies which kind of managed object a handle belongs to
///
/// `None` marks plain data in a result envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassTag {
    None,
    Platform,
    Device,
    Context,
    CommandQueue,
    Buffer,
    Image,
    Sampler,
    Program,
    Kernel,
    Event,
    MemoryMap,
}

impl ClassTag {
    /// Check if this tag marks handle data
    pub fn is_object(self) -> bool {
        self != ClassTag::None
    }
}

impl fmt::Display for ClassTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Retain/release entry points for one foreign handle type
///
/// Implementations are normally produced by [`handle_kind!`](crate::handle_kind).
pub trait HandleKind: 'static {
    /// Raw handle type as seen by foreign functions
    type Raw: RawHandle;

    /// Class reported in result envelopes
    const CLASS: ClassTag;

    /// Name of the retain function, for diagnostics
    const RETAIN: &'static str;

    /// Name of the release function, for diagnostics
    const RELEASE: &'static str;

    /// Increment the foreign reference count
    ///
    /// # Safety
    ///
    /// `raw` must be a live handle of this kind.
    unsafe fn retain(raw: Self::Raw) -> Status;

    /// Decrement the foreign reference count
    ///
    /// # Safety
    ///
    /// `raw` must be a live handle of this kind and the caller must own the
    /// reference being dropped.
    unsafe fn release(raw: Self::Raw) -> Status;
}

/// Single-owner reference to a foreign handle
pub struct Handle<K: HandleKind> {
    raw: K::Raw,
}

impl<K: HandleKind> Handle<K> {
    /// Take ownership of `raw`, retaining it first when `retain` is set
    ///
    /// Pass `retain = false` when the caller already owns a reference (the
    /// handle came out of a create call), and `retain = true` when the handle
    /// was only borrowed (for example, returned by an info query).
    ///
    /// # Safety
    ///
    /// `raw` must be a live handle of kind `K`. With `retain = false` the
    /// caller's reference moves into the returned value.
    pub unsafe fn new(raw: K::Raw, retain: bool) -> GateResult<Self> {
        if raw.is_null() {
            return Err(GateError::NullHandle { class: K::CLASS });
        }
        if retain {
            gate::call_guarded(K::RETAIN, || K::retain(raw))?;
            tracing::trace!(class = %K::CLASS, handle = raw.addr(), "retained");
        }
        Ok(Self { raw })
    }

    /// Adopt a reference the caller already owns
    ///
    /// # Safety
    ///
    /// See [`Handle::new`] with `retain = false`.
    pub unsafe fn from_owned(raw: K::Raw) -> GateResult<Self> {
        Self::new(raw, false)
    }

    /// Take a new reference to a borrowed handle
    ///
    /// # Safety
    ///
    /// See [`Handle::new`] with `retain = true`.
    pub unsafe fn retained(raw: K::Raw) -> GateResult<Self> {
        Self::new(raw, true)
    }

    /// The raw handle, still owned by `self`
    pub fn as_raw(&self) -> K::Raw {
        self.raw
    }

    /// Address of the raw handle
    pub fn int_ptr(&self) -> usize {
        self.raw.addr()
    }

    /// Give up ownership without releasing
    pub fn into_raw(self) -> K::Raw {
        let this = ManuallyDrop::new(self);
        this.raw
    }
}

impl<K: HandleKind> Drop for Handle<K> {
    fn drop(&mut self) {
        let raw = self.raw;
        // SAFETY: a Handle owns one reference to a live handle
        gate::call_guarded_cleanup(K::RELEASE, || unsafe { K::release(raw) });
        tracing::trace!(class = %K::CLASS, handle = raw.addr(), "released");
    }
}

impl<K: HandleKind> PartialEq for Handle<K> {
    fn eq(&self, other: &Self) -> bool {
        self.raw.addr() == other.raw.addr()
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", K::CLASS, self.raw.addr())
    }
}

/// A wrapper type built around exactly one foreign handle
///
/// `construct` receives the handle already owned; if it returns an error the
/// handle it was given is dropped, and therefore released, before the error
/// reaches anyone.
pub trait ManagedObject: Sized + 'static {
    /// Handle type wrapped by this object
    type Kind: HandleKind;

    /// Extra constructor arguments
    type Args;

    /// Build the object around `handle`
    fn construct(handle: Handle<Self::Kind>, args: Self::Args) -> GateResult<Self>;

    /// The wrapped handle
    fn handle(&self) -> &Handle<Self::Kind>;

    /// Class of this object
    fn class() -> ClassTag {
        <Self::Kind as HandleKind>::CLASS
    }
}

/// Managed object with no state beyond its handle
pub struct Object<K: HandleKind> {
    handle: Handle<K>,
}

impl<K: HandleKind> Object<K> {
    /// The raw handle, still owned by the object
    pub fn as_raw(&self) -> K::Raw {
        self.handle.as_raw()
    }

    /// Address of the raw handle
    pub fn int_ptr(&self) -> usize {
        self.handle.int_ptr()
    }
}

impl<K: HandleKind> ManagedObject for Object<K> {
    type Kind = K;
    type Args = ();

    fn construct(handle: Handle<K>, _args: ()) -> GateResult<Self> {
        Ok(Self { handle })
    }

    fn handle(&self) -> &Handle<K> {
        &self.handle
    }
}

impl<K: HandleKind> fmt::Debug for Object<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Object").field(&self.handle).finish()
    }
}

/// Declare a [`HandleKind`] from a pair of retain/release functions
///
/// ```
/// use clasp_core::gate::Status;
/// use clasp_core::handle::ClassTag;
///
/// #[repr(C)]
/// pub struct RawEvent { _private: [u8; 0] }
///
/// unsafe extern "C" fn retain_event(_e: *mut RawEvent) -> Status { 0 }
/// unsafe extern "C" fn release_event(_e: *mut RawEvent) -> Status { 0 }
///
/// clasp_core::handle_kind! {
///     /// Completion events
///     pub EventKind: *mut RawEvent => ClassTag::Event,
///         retain = retain_event,
///         release = release_event
/// }
/// ```
#[macro_export]
macro_rules! handle_kind {
    (
        $(#[$meta:meta])*
        $vis:vis $name:ident : $raw:ty => $class:expr,
            retain = $retain:path,
            release = $release:path $(,)?
    ) => {
        $(#[$meta])*
        $vis enum $name {}

        impl $crate::handle::HandleKind for $name {
            type Raw = $raw;
            const CLASS: $crate::handle::ClassTag = $class;
            const RETAIN: &'static str = stringify!($retain);
            const RELEASE: &'static str = stringify!($release);

            unsafe fn retain(raw: $raw) -> $crate::gate::Status {
                $retain(raw)
            }

            unsafe fn release(raw: $raw) -> $crate::gate::Status {
                $release(raw)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{counts, fake_handle, reset, TestEvent, POISON};

    #[test]
    fn test_from_owned_does_not_retain() {
        reset();
        let h = unsafe { Handle::<TestEvent>::from_owned(fake_handle(1)) }.unwrap();
        assert_eq!(counts(), (0, 0));
        drop(h);
        assert_eq!(counts(), (0, 1));
    }

    #[test]
    fn test_retained_retains_then_releases() {
        reset();
        let h = unsafe { Handle::<TestEvent>::retained(fake_handle(2)) }.unwrap();
        assert_eq!(counts(), (1, 0));
        drop(h);
        assert_eq!(counts(), (1, 1));
    }

    #[test]
    fn test_null_handle_rejected_without_calls() {
        reset();
        let err = unsafe { Handle::<TestEvent>::retained(std::ptr::null_mut()) }.unwrap_err();
        assert!(matches!(err, GateError::NullHandle { class: ClassTag::Event }));
        assert_eq!(counts(), (0, 0));
    }

    #[test]
    fn test_failed_retain_takes_no_ownership() {
        reset();
        let err = unsafe { Handle::<TestEvent>::retained(fake_handle(POISON)) }
            .unwrap_err();
        assert_eq!(err.function(), Some("retain_test_event"));
        // No reference was taken, so none is given back
        assert_eq!(counts(), (0, 0));
    }

    #[test]
    fn test_into_raw_skips_release() {
        reset();
        let raw = fake_handle(3);
        let h = unsafe { Handle::<TestEvent>::from_owned(raw) }.unwrap();
        assert_eq!(h.into_raw(), raw);
        assert_eq!(counts(), (0, 0));
    }

    #[test]
    fn test_object_reports_class() {
        reset();
        let handle = unsafe { Handle::<TestEvent>::from_owned(fake_handle(4)) }.unwrap();
        let obj = Object::construct(handle, ()).unwrap();
        assert_eq!(Object::<TestEvent>::class(), ClassTag::Event);
        assert_eq!(obj.int_ptr(), 4 * 8);
        assert_eq!(format!("{:?}", obj), "Object(Event(0x20))");
    }

    #[test]
    fn test_class_tag_serializes_as_name() {
        assert_eq!(
            serde_json::to_string(&ClassTag::CommandQueue).unwrap(),
            "\"CommandQueue\""
        );
        assert!(!ClassTag::None.is_object());
        assert!(ClassTag::Kernel.is_object());
    }
}
