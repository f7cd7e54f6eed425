//! Optional foreign functions resolved by name at run time

use crate::error::{GateError, GateResult};
use crate::gate::INVALID_VALUE;
use crate::handle::RawHandle;
use std::ffi::{c_char, c_void, CStr, CString};
use std::mem;

/// Something that can map a capability name to a function address
pub trait CapabilitySource {
    /// Address of `name`, or null when it is not provided
    fn lookup(&self, name: &CStr) -> *mut c_void;
}

/// Foreign lookup function taking only a name
pub type GlobalLookupFn = unsafe extern "C" fn(*const c_char) -> *mut c_void;

/// Process-wide lookup, e.g. `clGetExtensionFunctionAddress`
#[derive(Clone, Copy)]
pub struct GlobalLookup(pub GlobalLookupFn);

impl CapabilitySource for GlobalLookup {
    fn lookup(&self, name: &CStr) -> *mut c_void {
        // SAFETY: name is a valid NUL-terminated string for the duration of the call
        unsafe { (self.0)(name.as_ptr()) }
    }
}

/// Lookup scoped to one platform-like handle, e.g.
/// `clGetExtensionFunctionAddressForPlatform`
///
/// The scope handle is borrowed; it must outlive this value.
#[derive(Clone, Copy)]
pub struct ScopedLookup<P: RawHandle> {
    pub func: unsafe extern "C" fn(P, *const c_char) -> *mut c_void,
    pub scope: P,
}

impl<P: RawHandle> CapabilitySource for ScopedLookup<P> {
    fn lookup(&self, name: &CStr) -> *mut c_void {
        // SAFETY: scope is live for the lifetime of self, name is NUL-terminated
        unsafe { (self.func)(self.scope, name.as_ptr()) }
    }
}

impl<S: CapabilitySource + ?Sized> CapabilitySource for &S {
    fn lookup(&self, name: &CStr) -> *mut c_void {
        (**self).lookup(name)
    }
}

/// Resolve `name` through `source` and type it as the function pointer `F`
///
/// Nothing is cached; every call asks `source` again. A null address fails
/// with a capability-unavailable error naming `name`.
///
/// # Safety
///
/// `F` must be a function pointer type whose signature matches the foreign
/// function registered under `name`.
pub unsafe fn get_ext_fun<F, S>(source: &S, name: &str) -> GateResult<F>
where
    F: Copy,
    S: CapabilitySource + ?Sized,
{
    if mem::size_of::<F>() != mem::size_of::<*mut c_void>() {
        return Err(GateError::call_with_message(
            name.to_string(),
            INVALID_VALUE,
            "requested type is not pointer sized",
        ));
    }
    let c_name = CString::new(name).map_err(|_| {
        GateError::call_with_message(name.to_string(), INVALID_VALUE, "name contains a NUL byte")
    })?;

    let addr = source.lookup(&c_name);
    if addr.is_null() {
        return Err(GateError::unavailable(name));
    }
    tracing::debug!(capability = name, addr = addr as usize, "resolved capability");
    Ok(mem::transmute_copy::<*mut c_void, F>(&addr))
}
