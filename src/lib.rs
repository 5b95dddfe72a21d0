//! Core invocation state machine for a durable-execution client SDK.
//!
//! This crate implements the engine that drives one invocation of a user
//! handler: it reads protocol messages from a runtime, replays them
//! deterministically against user code issuing operations (state access,
//! RPC, timers, side effects, awakeables, combinators), and produces the
//! corresponding output messages, completions, and suspension decisions.
//!
//! Transport, wire framing of individual payloads and RPC descriptor
//! plumbing are adapter concerns and live outside this crate; the engine
//! only sees opaque bytes in and framed protocol messages out.

use std::borrow::Cow;
use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;

pub mod bridge;
pub mod engine;
pub mod headers;
pub mod protocol;
pub mod retries;

pub use bridge::{AwaitError, Handler, InvocationIo};
pub use engine::errors as error;
pub use engine::CoreEngine;
pub use headers::HeaderMap;
pub use protocol::Version;
pub use retries::RetryPolicy;

#[cfg(test)]
mod tests;

/// A single wire-level header, as sent/received at invocation Start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: Cow<'static, str>,
    pub value: Cow<'static, str>,
}

/// Headers the engine wants the adapter to attach to its response, decided
/// once content negotiation completes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseHead {
    pub status_code: u16,
    pub headers: Vec<Header>,
}

/// A marker indicating the engine closed because it suspended, as opposed to
/// closing for any other reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("engine suspended")]
pub struct SuspendedError;

/// The engine's internal failure type. Distinct from [`TerminalFailure`],
/// which is the value surfaced to user code when an awaited operation fails;
/// `Error` always means the engine itself is now closed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct Error {
    pub code: u16,
    pub message: Cow<'static, str>,
    pub description: Cow<'static, str>,
}

impl Error {
    pub fn new(code: u16, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            description: Cow::Borrowed(""),
        }
    }

    pub fn internal(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(error::codes::INTERNAL.code(), message)
    }

    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = description.into();
        self
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_suspended_error(&self) -> bool {
        self.code == error::codes::SUSPENDED.code()
    }
}

impl From<SuspendedError> for Error {
    fn from(_: SuspendedError) -> Self {
        error::codes::SUSPENDED.into_error()
    }
}

/// Either a plain engine error or a suspension, used at call sites that want
/// to special-case "we suspended" without treating it as a hard failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuspendedOrVMError {
    #[error(transparent)]
    Suspended(#[from] SuspendedError),
    #[error(transparent)]
    VM(#[from] Error),
}

pub type VMResult<T> = Result<T, Error>;

/// Knobs controlling engine behavior that aren't part of the wire protocol
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VMOptions {
    /// If `true` (the default), awaiting a deferred result while another
    /// await is concurrently outstanding on the same logical thread is a
    /// hard usage error (`AWAITING_TWO_ASYNC_RESULTS`). If `false`, it is
    /// tolerated and the first-ready result wins.
    pub fail_on_wait_concurrent_async_result: bool,
}

impl Default for VMOptions {
    fn default() -> Self {
        Self {
            fail_on_wait_concurrent_async_result: true,
        }
    }
}

/// Invocation input delivered by the runtime right after `StartMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub invocation_id: String,
    pub random_seed: u64,
    pub key: String,
    pub headers: Vec<Header>,
    pub input: Bytes,
}

/// A call/one-way-call/delayed-call target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub service: String,
    pub handler: String,
    pub key: Option<String>,
}

/// Handle to a deferred result: a journal entry whose outcome may not be
/// known yet. Opaque to user code beyond identity and composability via
/// `all`/`any`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsyncResultHandle(pub(crate) u32);

impl AsyncResultHandle {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }
}

/// The outcome of an operation that cannot fail in a user-observable way
/// (e.g. a plain `get_state` hit, a resolved sleep).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// No content (e.g. state key absent, sleep elapsed, ack-only ops).
    Void,
    /// Opaque success payload.
    Success(Bytes),
    /// The set of known state keys (result of `get_state_keys`).
    StateKeys(Vec<String>),
    /// The child resolution order recorded by a `CombinatorEntry`, available
    /// once its own entry index has resolved (see
    /// [`CoreEngine::sys_try_complete_combinator`]).
    CombinatorOrder(Vec<AsyncResultHandle>),
}

/// A user-code-visible failure: `(code, message)`, modeled on standard RPC
/// status codes. Raised to user code as an exception-like value whenever a
/// deferred result resolves with a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct TerminalFailure {
    pub code: u16,
    pub message: Cow<'static, str>,
}

impl TerminalFailure {
    pub fn new(code: u16, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Either a successful value or a terminal failure; the two shapes a side
/// effect (or anything durably recorded by the user) may produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonEmptyValue {
    Value(Bytes),
    Failure(TerminalFailure),
}

/// Retry bookkeeping passed to a side effect's retry policy, accumulated
/// across the lifetime of a single journal entry (including across
/// re-invocations, via `StartMessage`'s retry counters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRetryInfo {
    pub retry_count: u32,
    pub retry_loop_duration: Duration,
}

/// What user code should do when entering a `run`/side-effect block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnterResult {
    /// First execution (or a retry): run the closure.
    Executed(EntryRetryInfo),
    /// Already recorded: return this value without re-running the closure.
    NotExecuted(NonEmptyValue),
}

/// The result of proposing a just-executed side effect's outcome to the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExitResult {
    /// Accepted: an entry was created/sent and a handle to await is
    /// returned.
    Handle(AsyncResultHandle),
    /// Rejected: retry the closure after the given delay.
    Retry {
        delay: Duration,
        failure: TerminalFailure,
    },
}

/// Result of draining the engine's output buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TakeOutputResult {
    Buffer(Bytes),
    EOF,
}

/// Tracks, within a single call to [`AsyncResultCombinator::try_complete`],
/// which handles the combinator looked at and whether any access violated
/// the "no concurrent uncompleted access" rule the engine enforces on
/// `processing` mode.
#[derive(Debug, Default)]
pub struct AsyncResultAccessTracker {
    known: std::collections::HashMap<AsyncResultHandle, AsyncResultState>,
    pub(crate) accessed_completed: HashSet<AsyncResultHandle>,
    pub(crate) accessed_uncompleted: HashSet<AsyncResultHandle>,
}

impl AsyncResultAccessTracker {
    pub fn from_snapshot(known: Vec<(AsyncResultHandle, AsyncResultState)>) -> Self {
        Self {
            known: known.into_iter().collect(),
            accessed_completed: HashSet::new(),
            accessed_uncompleted: HashSet::new(),
        }
    }

    pub fn record(&mut self, handle: AsyncResultHandle, state: AsyncResultState) {
        match state {
            AsyncResultState::NotReady => {
                self.accessed_uncompleted.insert(handle);
            }
            AsyncResultState::Success | AsyncResultState::Failure => {
                self.accessed_completed.insert(handle);
            }
        }
    }

    /// Looks up the (pre-snapshotted) state of `handle` and records the
    /// access.
    pub fn state_of(&mut self, handle: AsyncResultHandle) -> AsyncResultState {
        let state = self
            .known
            .get(&handle)
            .copied()
            .unwrap_or(AsyncResultState::NotReady);
        self.record(handle, state);
        state
    }
}

/// Whether a given journal entry currently has a result, and if so whether
/// it resolved successfully or with a failure. Distinguishing the two lets
/// combinators (e.g. `all`) short-circuit on the first failing child instead
/// of waiting for every sibling to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncResultState {
    Success,
    Failure,
    NotReady,
}

/// A node in the deferred-result graph with children that may themselves be
/// combinators: `all`/`any` implement this.
pub trait AsyncResultCombinator {
    /// The handles this combinator resolves over, in the order relevant to
    /// its semantics (e.g. `any`'s tie-break order).
    fn children(&self) -> &[AsyncResultHandle];

    /// Attempts to resolve. Returns `Some(order)` — the child handles in
    /// resolution order — once the combinator can resolve; `None` if it is
    /// still waiting on more input.
    fn try_complete(&self, tracker: &mut AsyncResultAccessTracker) -> Option<Vec<AsyncResultHandle>>;
}
