//! Shared foreign-function doubles for the integration tests
//!
//! Handles are fake addresses; retain and release only count calls on the
//! current thread, so tests running in parallel do not see each other.

#![allow(dead_code, non_snake_case)]

use clasp_core::gate::{Status, SUCCESS};
use clasp_core::handle::{ClassTag, Handle, ManagedObject};
use clasp_core::{GateError, GateResult};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;

pub use pretty_assertions::assert_eq;

#[repr(C)]
pub struct RawEvent {
    _private: [u8; 0],
}

#[repr(C)]
pub struct RawProgram {
    _private: [u8; 0],
}

pub type EventId = *mut RawEvent;
pub type ProgramId = *mut RawProgram;

/// Status returned by the doubles for the poisoned handle
pub const INVALID_EVENT: Status = -58;

/// Handle address whose retain and release always fail
pub const POISONED: usize = 0xdead0;

thread_local! {
    static RETAINS: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
    static RELEASES: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
    static CONSTRUCTED: Cell<usize> = const { Cell::new(0) };
}

/// Forget all counts recorded on this thread
pub fn reset() {
    RETAINS.with(|m| m.borrow_mut().clear());
    RELEASES.with(|m| m.borrow_mut().clear());
    CONSTRUCTED.with(|c| c.set(0));
}

fn bump(map: &'static std::thread::LocalKey<RefCell<HashMap<usize, usize>>>, addr: usize) {
    map.with(|m| *m.borrow_mut().entry(addr).or_default() += 1);
}

fn total(map: &'static std::thread::LocalKey<RefCell<HashMap<usize, usize>>>) -> usize {
    map.with(|m| m.borrow().values().sum())
}

/// Successful retains of `addr`
pub fn retains_of(addr: usize) -> usize {
    RETAINS.with(|m| m.borrow().get(&addr).copied().unwrap_or(0))
}

/// Release calls for `addr`, failed ones included
pub fn releases_of(addr: usize) -> usize {
    RELEASES.with(|m| m.borrow().get(&addr).copied().unwrap_or(0))
}

pub fn total_retains() -> usize {
    total(&RETAINS)
}

pub fn total_releases() -> usize {
    total(&RELEASES)
}

/// Managed objects successfully built on this thread
pub fn constructed() -> usize {
    CONSTRUCTED.with(Cell::get)
}

pub fn event_id(addr: usize) -> EventId {
    addr as EventId
}

pub fn program_id(addr: usize) -> ProgramId {
    addr as ProgramId
}

pub unsafe extern "C" fn clRetainEvent(event: EventId) -> Status {
    if event as usize == POISONED {
        return INVALID_EVENT;
    }
    bump(&RETAINS, event as usize);
    SUCCESS
}

pub unsafe extern "C" fn clReleaseEvent(event: EventId) -> Status {
    bump(&RELEASES, event as usize);
    if event as usize == POISONED {
        return INVALID_EVENT;
    }
    SUCCESS
}

pub unsafe extern "C" fn clRetainProgram(program: ProgramId) -> Status {
    bump(&RETAINS, program as usize);
    SUCCESS
}

pub unsafe extern "C" fn clReleaseProgram(program: ProgramId) -> Status {
    bump(&RELEASES, program as usize);
    SUCCESS
}

clasp_core::handle_kind! {
    pub EventKind: EventId => ClassTag::Event,
        retain = clRetainEvent,
        release = clReleaseEvent
}

clasp_core::handle_kind! {
    pub ProgramKind: ProgramId => ClassTag::Program,
        retain = clRetainProgram,
        release = clReleaseProgram
}

/// Event wrapper with no extra state
#[derive(Debug)]
pub struct Event {
    handle: Handle<EventKind>,
}

impl ManagedObject for Event {
    type Kind = EventKind;
    type Args = ();

    fn construct(handle: Handle<EventKind>, _args: ()) -> GateResult<Self> {
        CONSTRUCTED.with(|c| c.set(c.get() + 1));
        Ok(Self { handle })
    }

    fn handle(&self) -> &Handle<EventKind> {
        &self.handle
    }
}

impl Event {
    pub fn addr(&self) -> usize {
        self.handle.int_ptr()
    }
}

/// Program wrapper that validates its build options during construction
#[derive(Debug)]
pub struct Program {
    handle: Handle<ProgramKind>,
    options: String,
}

impl ManagedObject for Program {
    type Kind = ProgramKind;
    type Args = String;

    fn construct(handle: Handle<ProgramKind>, options: String) -> GateResult<Self> {
        if options.contains("-invalid") {
            return Err(GateError::construction(
                Self::class(),
                format!("unsupported build option in {:?}", options),
            ));
        }
        CONSTRUCTED.with(|c| c.set(c.get() + 1));
        Ok(Self { handle, options })
    }

    fn handle(&self) -> &Handle<ProgramKind> {
        &self.handle
    }
}

impl Program {
    pub fn options(&self) -> &str {
        &self.options
    }

    pub fn addr(&self) -> usize {
        self.handle.int_ptr()
    }
}
