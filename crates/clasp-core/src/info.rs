//! Probe/fetch info queries
//!
//! Foreign info functions share one shape:
//!
//! ```text
//! status get_xxx_info(<leading args>, size_t size, void *dest, size_t *size_ret)
//! ```
//!
//! [`InfoQuery`] captures the leading arguments so the helpers here only see
//! the trailing three. Variable-length results are fetched in two calls: a
//! probe with a null destination reports the size, then a fetch fills a
//! buffer of exactly that size. Fixed-size results skip the probe.
//!
//! Each foreign call goes through the call gate, so a failing probe or fetch
//! aborts the query with no partial envelope.

use crate::buf::SizedBuf;
use crate::envelope::{GenericInfo, InfoType, Payload};
use crate::error::GateResult;
use crate::gate::{self, Status};
use crate::handle::{ClassTag, Handle, HandleKind, ManagedObject, RawHandle};
use bytemuck::Zeroable;
use std::ffi::c_void;

/// A foreign info function with its leading arguments bound
pub trait InfoQuery {
    /// Name of the foreign function, for diagnostics
    fn name(&self) -> &'static str;

    /// Make one call with the trailing size/destination/size-return arguments
    ///
    /// # Safety
    ///
    /// `dest` is either null (with `size == 0`) or valid for `size` bytes of
    /// writes; `size_ret` is either null or valid for one write.
    unsafe fn call(&self, size: usize, dest: *mut c_void, size_ret: *mut usize) -> Status;
}

/// Closure-backed [`InfoQuery`]
///
/// Usually built with the [`query!`](crate::query) macro.
pub struct Query<F> {
    name: &'static str,
    func: F,
}

impl<F> Query<F>
where
    F: Fn(usize, *mut c_void, *mut usize) -> Status,
{
    pub fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> InfoQuery for Query<F>
where
    F: Fn(usize, *mut c_void, *mut usize) -> Status,
{
    fn name(&self) -> &'static str {
        self.name
    }

    unsafe fn call(&self, size: usize, dest: *mut c_void, size_ret: *mut usize) -> Status {
        (self.func)(size, dest, size_ret)
    }
}

/// Bind the leading arguments of a foreign info function
///
/// ```ignore
/// let q = clasp_core::query!(clGetDeviceInfo(device, CL_DEVICE_NAME));
/// let name = clasp_core::info::get_str_info(&q)?;
/// ```
///
/// Each argument is evaluated once, when the query is built, and must be `Copy`.
#[macro_export]
macro_rules! query {
    (@bind $func:ident [$($bound:ident)*]) => {
        $crate::info::Query::new(
            stringify!($func),
            move |size: usize, dest: *mut ::std::ffi::c_void, size_ret: *mut usize| unsafe {
                $func($($bound,)* size, dest.cast(), size_ret)
            },
        )
    };
    (@bind $func:ident [$($bound:ident)*] $head:expr, $($rest:expr,)*) => {{
        let arg = $head;
        $crate::query!(@bind $func [$($bound)* arg] $($rest,)*)
    }};
    ($func:ident ( $($arg:expr),* $(,)? )) => {
        $crate::query!(@bind $func [] $($arg,)*)
    };
}

fn probe<Q: InfoQuery + ?Sized>(query: &Q) -> GateResult<usize> {
    let mut size = 0usize;
    // SAFETY: null destination with zero size; size_ret points at a local
    gate::call_guarded(query.name(), || unsafe {
        query.call(0, std::ptr::null_mut(), &mut size)
    })?;
    Ok(size)
}

/// Fetch a variable-length result as a buffer of `T`
///
/// The buffer holds `reported_bytes / size_of::<T>()` elements and the fetch
/// is told exactly that many bytes.
pub fn get_vec_info<T, Q>(query: &Q) -> GateResult<SizedBuf<T>>
where
    T: Zeroable + Copy,
    Q: InfoQuery + ?Sized,
{
    let size = probe(query)?;
    let mut buf = SizedBuf::<T>::new(size / std::mem::size_of::<T>().max(1));
    if !buf.is_empty() {
        let bytes = buf.byte_len();
        let dest = buf.as_mut_void();
        // SAFETY: dest is valid for `bytes` bytes
        gate::call_guarded(query.name(), || unsafe {
            query.call(bytes, dest, std::ptr::null_mut())
        })?;
    }
    tracing::debug!(function = query.name(), reported = size, len = buf.len(), "vector info fetched");
    Ok(buf)
}

/// Fixed-size scalar query
///
/// The declared type's size is trusted; the foreign side is not asked for
/// the actual size.
pub fn get_int_info<T, Q>(query: &Q, type_name: &'static str) -> GateResult<GenericInfo>
where
    T: Zeroable + Copy + 'static,
    Q: InfoQuery + ?Sized,
{
    let mut value = T::zeroed();
    let dest: *mut T = &mut value;
    // SAFETY: dest points at one T on the stack
    gate::call_guarded(query.name(), || unsafe {
        query.call(std::mem::size_of::<T>(), dest.cast(), std::ptr::null_mut())
    })?;
    Ok(GenericInfo::owned(
        InfoType::Scalar(type_name),
        ClassTag::None,
        Payload::Scalar(Box::new(value)),
    ))
}

/// String query; the payload keeps the terminator the foreign side wrote
pub fn get_str_info<Q>(query: &Q) -> GateResult<GenericInfo>
where
    Q: InfoQuery + ?Sized,
{
    let buf = get_vec_info::<u8, Q>(query)?;
    Ok(GenericInfo::owned(
        InfoType::String,
        ClassTag::None,
        Payload::Str(buf),
    ))
}

/// Package a fetched buffer as an array envelope
pub fn convert_array_info<T: 'static>(elem: &'static str, buf: SizedBuf<T>) -> GenericInfo {
    GenericInfo::owned(
        InfoType::Array {
            elem,
            len: buf.len(),
        },
        ClassTag::None,
        Payload::Array(Box::new(buf)),
    )
}

/// Homogeneous array query
pub fn get_array_info<T, Q>(query: &Q, elem: &'static str) -> GateResult<GenericInfo>
where
    T: Zeroable + Copy + 'static,
    Q: InfoQuery + ?Sized,
{
    let buf = get_vec_info::<T, Q>(query)?;
    Ok(convert_array_info(elem, buf))
}

/// Wrap each borrowed handle of `buf` in a managed object of class `C`
///
/// Handles in the buffer are borrowed from the foreign side, so each one is
/// retained as it is wrapped. If any wrap fails, the objects built so far
/// are dropped (releasing their references) and the rest are left
/// untouched.
pub fn convert_opaque_array_info<C>(
    buf: SizedBuf<<C::Kind as HandleKind>::Raw>,
) -> GateResult<GenericInfo>
where
    C: ManagedObject<Args = ()>,
{
    let len = buf.len();
    let objects = buf
        .iter()
        .map(|&raw| {
            // SAFETY: raw came from a successful info query of this kind
            let handle = unsafe { Handle::<C::Kind>::retained(raw) }?;
            C::construct(handle, ()).map(|obj| Box::new(obj) as Box<dyn std::any::Any>)
        })
        .collect::<GateResult<Vec<_>>>()?;

    Ok(GenericInfo::owned(
        InfoType::HandleArray { len },
        C::class(),
        Payload::Objects(objects),
    ))
}

/// Handle-array query
pub fn get_opaque_array_info<C, Q>(query: &Q) -> GateResult<GenericInfo>
where
    C: ManagedObject<Args = ()>,
    Q: InfoQuery + ?Sized,
{
    let buf = get_vec_info::<<C::Kind as HandleKind>::Raw, Q>(query)?;
    convert_opaque_array_info::<C>(buf)
}

/// Single-handle query; a null handle yields an empty object payload
pub fn get_opaque_info<C, Q>(query: &Q) -> GateResult<GenericInfo>
where
    C: ManagedObject<Args = ()>,
    Q: InfoQuery + ?Sized,
{
    let mut raw = <<C::Kind as HandleKind>::Raw as RawHandle>::null();
    let dest: *mut <C::Kind as HandleKind>::Raw = &mut raw;
    // SAFETY: dest points at one raw handle on the stack
    gate::call_guarded(query.name(), || unsafe {
        query.call(
            std::mem::size_of::<<C::Kind as HandleKind>::Raw>(),
            dest.cast(),
            std::ptr::null_mut(),
        )
    })?;

    let object = if raw.is_null() {
        None
    } else {
        // SAFETY: raw came from a successful info query of this kind
        let handle = unsafe { Handle::<C::Kind>::retained(raw) }?;
        Some(Box::new(C::construct(handle, ())?) as Box<dyn std::any::Any>)
    };

    Ok(GenericInfo::owned(
        InfoType::Handle,
        C::class(),
        Payload::Object(object),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Object;
    use crate::test_support::{counts, fake_handle, reset, RawTest, TestEvent};
    use std::cell::Cell;

    /// Query double that reports `data` and counts its calls
    fn bytes_query<'a>(
        data: &'a [u8],
        calls: &'a Cell<usize>,
    ) -> Query<impl Fn(usize, *mut c_void, *mut usize) -> Status + 'a> {
        Query::new("clGetThingInfo", move |size, dest, size_ret| {
            calls.set(calls.get() + 1);
            if !size_ret.is_null() {
                unsafe { *size_ret = data.len() };
            }
            if !dest.is_null() {
                assert!(size <= data.len());
                unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dest.cast(), size) };
            }
            0
        })
    }

    unsafe fn get_thing_info(
        param: u32,
        size: usize,
        dest: *mut c_void,
        size_ret: *mut usize,
    ) -> Status {
        let data = param.to_ne_bytes();
        if !size_ret.is_null() {
            *size_ret = data.len();
        }
        if !dest.is_null() {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dest.cast(), size.min(data.len()));
        }
        0
    }

    #[test]
    fn test_query_macro_evaluates_arguments_once() {
        let evaluated = Cell::new(0u32);
        let next_param = || {
            evaluated.set(evaluated.get() + 1);
            0x1000 + evaluated.get()
        };

        let q = query!(get_thing_info(next_param()));
        assert_eq!(q.name(), "get_thing_info");
        let info = get_str_info(&q).unwrap();

        assert_eq!(evaluated.get(), 1);
        assert_eq!(info.bytes(), Some(&0x1001u32.to_ne_bytes()[..]));
    }

    #[test]
    fn test_vec_info_probes_then_fetches() {
        let calls = Cell::new(0);
        let q = bytes_query(&[1, 0, 0, 0, 2, 0, 0, 0], &calls);
        let buf = get_vec_info::<u32, _>(&q).unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(
            buf.as_slice(),
            &[u32::from_ne_bytes([1, 0, 0, 0]), u32::from_ne_bytes([2, 0, 0, 0])]
        );
    }

    #[test]
    fn test_zero_size_skips_fetch() {
        let calls = Cell::new(0);
        let q = bytes_query(&[], &calls);
        let info = get_array_info::<u64, _>(&q, "cl_ulong").unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(info.type_name(), "cl_ulong[0]");
        assert_eq!(info.array::<u64>(), Some(&[][..]));
    }

    #[test]
    fn test_fetch_size_never_exceeds_allocation() {
        // 7 bytes reported for 4-byte elements: one element, 4 bytes fetched
        let seen = Cell::new(usize::MAX);
        let q = Query::new("clGetOddInfo", |size, dest: *mut c_void, size_ret: *mut usize| {
            if dest.is_null() {
                unsafe { *size_ret = 7 };
            } else {
                seen.set(size);
            }
            0
        });
        let buf = get_vec_info::<u32, _>(&q).unwrap();
        assert_eq!(buf.len(), 1);
        assert_eq!(seen.get(), 4);
    }

    #[test]
    fn test_probe_failure_aborts() {
        let q = Query::new("clGetDeviceInfo", |_, _, _| -33);
        let err = get_str_info(&q).unwrap_err();
        assert_eq!(err.function(), Some("clGetDeviceInfo"));
        assert_eq!(err.status(), Some(-33));
    }

    #[test]
    fn test_fetch_failure_aborts() {
        let q = Query::new("clGetDeviceInfo", |_, dest: *mut c_void, size_ret: *mut usize| {
            if dest.is_null() {
                unsafe { *size_ret = 4 };
                0
            } else {
                -30
            }
        });
        assert!(get_array_info::<u32, _>(&q, "cl_uint").is_err());
    }

    #[test]
    fn test_opaque_info_null_handle() {
        reset();
        let q = Query::new("clGetEventInfo", |_, _, _| 0);
        let info = get_opaque_info::<Object<TestEvent>, _>(&q).unwrap();
        assert_eq!(info.type_name(), "void *");
        assert!(matches!(info.object::<Object<TestEvent>>(), Some(None)));
        assert_eq!(counts(), (0, 0));
    }

    #[test]
    fn test_opaque_info_retains_borrowed_handle() {
        reset();
        let q = Query::new("clGetEventInfo", |size, dest: *mut c_void, _| {
            assert_eq!(size, std::mem::size_of::<*mut RawTest>());
            unsafe { *dest.cast::<*mut RawTest>() = fake_handle(9) };
            0
        });
        let info = get_opaque_info::<Object<TestEvent>, _>(&q).unwrap();
        assert_eq!(info.class, ClassTag::Event);
        let obj = info.object::<Object<TestEvent>>().unwrap().unwrap();
        assert_eq!(obj.as_raw(), fake_handle(9));
        assert_eq!(counts(), (1, 0));
        drop(info);
        assert_eq!(counts(), (1, 1));
    }
}
