//! Owning, sized result buffer
//!
//! `SizedBuf<T>` is the destination of every variable-length fetch. Storage
//! is zero-filled on allocation, so it is never observed partially
//! initialized, and the fetch call overwrites all of it before it is read.

use bytemuck::Zeroable;
use std::ffi::c_void;

/// Heap buffer of `len` elements whose ownership can be moved out once
pub struct SizedBuf<T> {
    data: Option<Box<[T]>>,
}

impl<T: Zeroable + Copy> SizedBuf<T> {
    /// Allocate room for `len` elements
    ///
    /// A zero length allocates nothing.
    pub fn new(len: usize) -> Self {
        if len == 0 {
            return Self { data: None };
        }
        Self {
            data: Some(vec![T::zeroed(); len].into_boxed_slice()),
        }
    }
}

impl<T> SizedBuf<T> {
    /// An empty buffer
    pub fn empty() -> Self {
        Self { data: None }
    }

    /// Number of elements held
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len())
    }

    /// Check if the buffer holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the storage in bytes
    pub fn byte_len(&self) -> usize {
        self.len() * std::mem::size_of::<T>()
    }

    /// Writable pointer for a foreign call to fill; null when empty
    pub fn as_mut_ptr(&mut self) -> *mut T {
        match self.data.as_mut() {
            Some(d) => d.as_mut_ptr(),
            None => std::ptr::null_mut(),
        }
    }

    /// Untyped view of [`as_mut_ptr`](Self::as_mut_ptr) for query destinations
    pub fn as_mut_void(&mut self) -> *mut c_void {
        self.as_mut_ptr().cast()
    }

    /// Contents as a slice
    pub fn as_slice(&self) -> &[T] {
        self.data.as_deref().unwrap_or(&[])
    }

    /// Move the storage out, leaving the buffer empty
    ///
    /// A second call returns `None`.
    pub fn release(&mut self) -> Option<Box<[T]>> {
        self.data.take()
    }

    /// Consume the buffer into a vector (empty if already released)
    pub fn into_vec(mut self) -> Vec<T> {
        self.release().map(Vec::from).unwrap_or_default()
    }
}

impl<T> Default for SizedBuf<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> std::ops::Deref for SizedBuf<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for SizedBuf<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}
