//! Error taxonomy for guarded foreign calls
//!
//! Every failure carries enough context to say which foreign operation
//! failed. Compensating releases run before any of these errors reach the
//! caller.

use crate::gate::{Status, INVALID_VALUE};
use crate::handle::ClassTag;
use crate::loader::LoadError;
use std::borrow::Cow;
use thiserror::Error;

/// Errors raised by the call gate, the query helpers and object construction
#[derive(Error, Debug)]
pub enum GateError {
    /// A foreign function returned a non-success status
    #[error("{function} failed with status {status}{}", detail(.message))]
    Call {
        function: Cow<'static, str>,
        status: Status,
        message: Option<String>,
    },

    /// A managed-object constructor rejected its handle
    #[error("cannot construct {class}: {reason}")]
    Construction { class: ClassTag, reason: String },

    /// A null raw handle was offered for wrapping
    #[error("null {class} handle")]
    NullHandle { class: ClassTag },

    /// An out-argument adapter was driven through an illegal transition
    #[error("cannot {operation} an out-argument that is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Library(#[from] LoadError),
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(msg) => format!(": {}", msg),
        None => String::new(),
    }
}

impl GateError {
    /// Foreign-call failure without a message
    pub fn call(function: impl Into<Cow<'static, str>>, status: Status) -> Self {
        GateError::Call {
            function: function.into(),
            status,
            message: None,
        }
    }

    /// Foreign-call failure with a descriptive message
    pub fn call_with_message(
        function: impl Into<Cow<'static, str>>,
        status: Status,
        message: impl Into<String>,
    ) -> Self {
        GateError::Call {
            function: function.into(),
            status,
            message: Some(message.into()),
        }
    }

    /// A capability could not be resolved
    pub fn unavailable(name: &str) -> Self {
        Self::call_with_message(name.to_string(), INVALID_VALUE, format!("{} not available", name))
    }

    /// Constructor failure for the given class
    pub fn construction(class: ClassTag, reason: impl Into<String>) -> Self {
        GateError::Construction {
            class,
            reason: reason.into(),
        }
    }

    /// Foreign status code, for foreign-call failures
    pub fn status(&self) -> Option<Status> {
        match self {
            GateError::Call { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Name of the foreign function that failed, for foreign-call failures
    pub fn function(&self) -> Option<&str> {
        match self {
            GateError::Call { function, .. } => Some(&**function),
            _ => None,
        }
    }
}

/// Result type for guarded operations
pub type GateResult<T> = Result<T, GateError>;
