//! Clasp Core - safe handle ownership and info queries over C-style APIs
//!
//! This library wraps the calling conventions shared by reference-counted
//! C APIs such as OpenCL:
//! - Status-code checking for every foreign call
//! - The two-call probe/fetch convention for variable-sized info queries
//! - Single-owner handles that are released exactly once
//! - Construction of managed objects from created or out-parameter handles
//! - Run-time resolution of optional extension functions
//!
//! # Example
//!
//! ```
//! use clasp_core::gate::Status;
//! use clasp_core::{get_int_info, query};
//! use std::ffi::c_void;
//!
//! unsafe extern "C" fn get_device_info(
//!     _device: usize,
//!     _param: u32,
//!     size: usize,
//!     value: *mut c_void,
//!     _size_ret: *mut usize,
//! ) -> Status {
//!     if size >= 4 && !value.is_null() {
//!         *(value as *mut u32) = 8;
//!     }
//!     0
//! }
//!
//! let info = get_int_info::<u32, _>(
//!     &query!(get_device_info(7, 0x1002)),
//!     "cl_uint",
//! )
//! .unwrap();
//! assert_eq!(info.scalar::<u32>(), Some(&8));
//! assert_eq!(info.type_name(), "cl_uint*");
//! ```

/// Clasp core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod buf;
pub mod construct;
pub mod envelope;
pub mod error;
pub mod ext;
pub mod gate;
pub mod handle;
pub mod info;
pub mod loader;
pub mod mapping;
pub mod outarg;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use buf::SizedBuf;
pub use construct::convert_obj;
pub use envelope::{GenericInfo, InfoType, Payload};
pub use error::{GateError, GateResult};
pub use ext::{get_ext_fun, CapabilitySource, GlobalLookup, ScopedLookup};
pub use gate::{call_guarded, call_guarded_cleanup, call_guarded_or_release, Status};
pub use handle::{ClassTag, Handle, HandleKind, ManagedObject, Object, RawHandle};
pub use info::{
    convert_array_info, convert_opaque_array_info, get_array_info, get_int_info,
    get_opaque_array_info, get_opaque_info, get_str_info, get_vec_info, InfoQuery, Query,
};
pub use loader::{ForeignLibrary, LibraryLoader, LoadError};
pub use mapping::{Mapping, Unmap};
pub use outarg::{construct_via, OutArg};
