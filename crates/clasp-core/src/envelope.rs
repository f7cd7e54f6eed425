//! Result envelope for info queries
//!
//! Every query helper in [`info`](crate::info) returns a [`GenericInfo`]:
//! a payload plus the type and class tags a consumer needs to interpret it.
//! When the class tag is [`ClassTag::None`] the payload is plain data;
//! otherwise it holds managed objects of that class.

use crate::buf::SizedBuf;
use crate::handle::{ClassTag, ManagedObject};
use std::any::Any;
use std::ffi::CStr;
use std::fmt;

/// Shape of an envelope's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoType {
    /// One value of the named C type
    Scalar(&'static str),
    /// NUL-terminated bytes
    String,
    /// `len` elements of the named C type
    Array { elem: &'static str, len: usize },
    /// `len` managed objects
    HandleArray { len: usize },
    /// One managed object, or none for a null handle
    Handle,
}

impl fmt::Display for InfoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoType::Scalar(name) => write!(f, "{}*", name),
            InfoType::String => f.write_str("char*"),
            InfoType::Array { elem, len } => write!(f, "{}[{}]", elem, len),
            InfoType::HandleArray { len } => write!(f, "void*[{}]", len),
            InfoType::Handle => f.write_str("void *"),
        }
    }
}

/// Owned query result
pub enum Payload {
    /// Boxed single value
    Scalar(Box<dyn Any>),
    /// String bytes including the terminator reported by the foreign side
    Str(SizedBuf<u8>),
    /// Boxed `SizedBuf<T>`
    Array(Box<dyn Any>),
    /// Boxed managed object; `None` for a null handle
    Object(Option<Box<dyn Any>>),
    /// Boxed managed objects, one per returned handle
    Objects(Vec<Box<dyn Any>>),
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Scalar(_) => f.write_str("Scalar(..)"),
            Payload::Str(bytes) => f
                .debug_tuple("Str")
                .field(&String::from_utf8_lossy(bytes))
                .finish(),
            Payload::Array(_) => f.write_str("Array(..)"),
            Payload::Object(obj) => write!(f, "Object({})", if obj.is_some() { ".." } else { "null" }),
            Payload::Objects(objs) => write!(f, "Objects(len={})", objs.len()),
        }
    }
}

/// Tagged query result handed to the presentation layer
#[derive(Debug)]
pub struct GenericInfo {
    /// Payload shape and C type name
    pub ty: InfoType,
    /// Class of any handles in the payload
    pub class: ClassTag,
    /// The consumer must free or release the payload
    pub owned: bool,
    /// The data itself
    pub value: Payload,
}

impl GenericInfo {
    pub(crate) fn owned(ty: InfoType, class: ClassTag, value: Payload) -> Self {
        Self {
            ty,
            class,
            owned: true,
            value,
        }
    }

    /// Textual type name, e.g. `cl_uint*`, `char*`, `size_t[3]`, `void*[2]`
    pub fn type_name(&self) -> String {
        self.ty.to_string()
    }

    /// Scalar payload as `T`
    pub fn scalar<T: 'static>(&self) -> Option<&T> {
        match &self.value {
            Payload::Scalar(value) => value.downcast_ref(),
            _ => None,
        }
    }

    /// Raw string bytes, terminator included
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.value {
            Payload::Str(bytes) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    /// String payload up to its terminator
    ///
    /// Returns `None` for non-string payloads and for an empty or
    /// unterminated string buffer.
    pub fn c_str(&self) -> Option<&CStr> {
        self.bytes()
            .and_then(|bytes| CStr::from_bytes_until_nul(bytes).ok())
    }

    /// Array payload as `[T]`
    pub fn array<T: 'static>(&self) -> Option<&[T]> {
        match &self.value {
            Payload::Array(buf) => buf.downcast_ref::<SizedBuf<T>>().map(|b| b.as_slice()),
            _ => None,
        }
    }

    /// Single managed object, `Some(None)` for a null handle
    pub fn object<C: ManagedObject>(&self) -> Option<Option<&C>> {
        match &self.value {
            Payload::Object(obj) if self.class == C::class() => match obj {
                Some(obj) => obj.downcast_ref::<C>().map(Some),
                None => Some(None),
            },
            _ => None,
        }
    }

    /// Managed objects of a handle-array payload
    pub fn objects<C: ManagedObject>(&self) -> Option<Vec<&C>> {
        match &self.value {
            Payload::Objects(objs) if self.class == C::class() => {
                objs.iter().map(|o| o.downcast_ref::<C>()).collect()
            }
            _ => None,
        }
    }

    /// Take ownership of the managed objects of a handle-array payload
    ///
    /// On a type mismatch the envelope is handed back untouched.
    pub fn into_objects<C: ManagedObject>(self) -> Result<Vec<C>, Self> {
        if self.class != C::class() {
            return Err(self);
        }
        match self.value {
            Payload::Objects(objs) if objs.iter().all(|o| o.is::<C>()) => Ok(objs
                .into_iter()
                .filter_map(|o| o.downcast::<C>().ok())
                .map(|b| *b)
                .collect()),
            value => Err(Self { value, ..self }),
        }
    }

    /// Number of elements carried, 1 for scalars and single handles
    pub fn len(&self) -> usize {
        match self.ty {
            InfoType::Array { len, .. } | InfoType::HandleArray { len } => len,
            InfoType::String => self.bytes().map_or(0, <[u8]>::len),
            InfoType::Scalar(_) => 1,
            InfoType::Handle => usize::from(matches!(self.value, Payload::Object(Some(_)))),
        }
    }

    /// Check if the envelope carries no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
