//! The fixed failure-code taxonomy and the handful of engine-internal
//! errors that are always the same shape, grounded in SPEC_FULL.md §6's
//! failure code table.

use crate::Error;

/// A named, fixed `(code, message)` pair from the taxonomy below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamedError {
    code: u16,
    message: &'static str,
}

impl NamedError {
    pub const fn code(&self) -> u16 {
        self.code
    }

    pub fn into_error(self) -> Error {
        Error::new(self.code, self.message)
    }

    pub fn with_description(self, description: impl Into<std::borrow::Cow<'static, str>>) -> Error {
        self.into_error().with_description(description)
    }
}

impl From<NamedError> for Error {
    fn from(n: NamedError) -> Self {
        n.into_error()
    }
}

pub mod codes {
    use super::NamedError;

    pub const BAD_REQUEST: NamedError = NamedError {
        code: 400,
        message: "bad request",
    };
    pub const INTERNAL: NamedError = NamedError {
        code: 500,
        message: "internal error",
    };
    pub const UNSUPPORTED_MEDIA_TYPE: NamedError = NamedError {
        code: 415,
        message: "unsupported media type",
    };
    pub const JOURNAL_MISMATCH: NamedError = NamedError {
        code: 570,
        message: "journal mismatch",
    };
    pub const PROTOCOL_VIOLATION: NamedError = NamedError {
        code: 571,
        message: "protocol violation",
    };
    pub const AWAITING_TWO_ASYNC_RESULTS: NamedError = NamedError {
        code: 572,
        message: "awaiting two async results concurrently is not allowed",
    };
    pub const UNSUPPORTED_FEATURE: NamedError = NamedError {
        code: 573,
        message: "unsupported feature for the negotiated protocol version",
    };
    pub const CLOSED: NamedError = NamedError {
        code: 598,
        message: "engine is closed",
    };
    pub const SUSPENDED: NamedError = NamedError {
        code: 599,
        message: "engine is suspended",
    };
}

pub fn missing_content_type() -> Error {
    codes::BAD_REQUEST.with_description("missing content-type header")
}

pub fn unrecognized_content_type(content_type: &str) -> Error {
    codes::UNSUPPORTED_MEDIA_TYPE
        .into_error()
        .with_description(format!("unrecognized content-type '{content_type}'"))
}

pub fn unexpected_input_message(expected: &str, actual: &str) -> Error {
    codes::PROTOCOL_VIOLATION.with_description(format!(
        "expected message of type '{expected}', got '{actual}'"
    ))
}

pub fn known_entries_is_zero() -> Error {
    codes::BAD_REQUEST.with_description("StartMessage.known_entries must be >= 1 (entry 0 is always Input)")
}

pub fn input_closed_while_waiting_entries(received: u32, expected: u32) -> Error {
    codes::PROTOCOL_VIOLATION.with_description(format!(
        "input closed while still waiting for replay entries: received {received}, expected {expected}"
    ))
}

pub fn journal_mismatch(index: u32, expected: &str, actual_user_op: &str) -> Error {
    codes::JOURNAL_MISMATCH.with_description(format!(
        "entry {index} mismatch: journal has '{expected}', user code issued '{actual_user_op}'"
    ))
}

pub fn side_effect_nested_call() -> Error {
    codes::PROTOCOL_VIOLATION
        .with_description("side effect closures must not issue other journalled operations")
}

pub fn completion_conflict(index: u32) -> Error {
    codes::JOURNAL_MISMATCH
        .with_description(format!("completion conflicts with previous value for entry {index}"))
}

pub fn completion_for_unknown_index(index: u32) -> Error {
    codes::PROTOCOL_VIOLATION
        .with_description(format!("completion received for unknown entry {index}"))
}

pub fn duplicate_output() -> Error {
    codes::PROTOCOL_VIOLATION.with_description("an Output entry was already appended")
}

pub fn unsupported_feature(feature: &str, required_version: crate::Version) -> Error {
    codes::UNSUPPORTED_FEATURE.with_description(format!(
        "'{feature}' requires protocol version >= {required_version:?}"
    ))
}

pub fn closed() -> Error {
    codes::CLOSED.into_error()
}

pub fn suspended() -> Error {
    codes::SUSPENDED.into_error()
}

pub fn concurrent_async_result_wait() -> Error {
    codes::AWAITING_TWO_ASYNC_RESULTS
        .with_description("awaited a deferred result while another await was already outstanding")
}
