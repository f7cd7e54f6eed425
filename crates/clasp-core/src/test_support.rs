//! Counting test doubles for foreign retain/release functions

use crate::gate::{Status, SUCCESS};
use crate::handle::ClassTag;
use std::cell::Cell;

#[repr(C)]
pub struct RawTest {
    _private: [u8; 0],
}

/// Handles with this index fail every retain and release
pub const POISON: usize = 13;

pub const RELEASE_FAILED: Status = -5;

thread_local! {
    static RETAINS: Cell<usize> = const { Cell::new(0) };
    static RELEASES: Cell<usize> = const { Cell::new(0) };
}

pub fn reset() {
    RETAINS.with(|c| c.set(0));
    RELEASES.with(|c| c.set(0));
}

/// (successful retains, release calls) on this thread since `reset`
pub fn counts() -> (usize, usize) {
    (RETAINS.with(Cell::get), RELEASES.with(Cell::get))
}

pub fn fake_handle(index: usize) -> *mut RawTest {
    (index * 8) as *mut RawTest
}

unsafe extern "C" fn retain_test_event(raw: *mut RawTest) -> Status {
    if raw as usize == POISON * 8 {
        return RELEASE_FAILED;
    }
    RETAINS.with(|c| c.set(c.get() + 1));
    SUCCESS
}

unsafe extern "C" fn release_test_event(raw: *mut RawTest) -> Status {
    RELEASES.with(|c| c.set(c.get() + 1));
    if raw as usize == POISON * 8 {
        return RELEASE_FAILED;
    }
    SUCCESS
}

crate::handle_kind! {
    pub TestEvent: *mut RawTest => ClassTag::Event,
        retain = retain_test_event,
        release = release_test_event
}
