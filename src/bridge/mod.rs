//! Ergonomic surface handed to user handler code: turns [`CoreEngine`]'s
//! `sys_*` primitives and deferred-result handles into blocking calls that
//! loop on `notify_await_point` until a result is ready or the invocation
//! suspends.
//!
//! This models the "dedicated worker thread per invocation" concurrency
//! style: a handler just calls `bridge.call(...)`, `bridge.sleep(...)`, etc.
//! and blocks, instead of juggling futures. The blocking is cooperative with
//! the engine, not the OS: every wait is really "feed the engine more input
//! until this journal entry completes or we suspend".

use std::time::{Duration, SystemTime};

use bytes::Bytes;

use crate::engine::{CoreEngine, Engine};
use crate::retries::RetryPolicy;
use crate::{
    AsyncResultAccessTracker, AsyncResultCombinator, AsyncResultHandle, AsyncResultState,
    EntryRetryInfo, Header, NonEmptyValue, RunEnterResult, RunExitResult, TakeOutputResult,
    Target, TerminalFailure, Value,
};

/// Supplies more input bytes (or signals EOF) while the bridge is blocked
/// awaiting a deferred result. Implemented by the transport adapter; the
/// engine itself never touches a socket.
pub trait InvocationIo {
    /// Blocks until either more input is available or the runtime closed the
    /// connection (`None`).
    fn read_more(&mut self) -> Option<Bytes>;
}

/// Everything that can stop a blocking wait: a user-visible failure on the
/// entry being awaited, an engine-level protocol error, or a clean
/// suspension (nothing left to do until the next replay).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AwaitError {
    #[error(transparent)]
    Failure(#[from] TerminalFailure),
    #[error("invocation suspended")]
    Suspended,
    #[error(transparent)]
    VM(#[from] crate::Error),
}

/// Drives one invocation's [`CoreEngine`] on behalf of handler code,
/// presenting blocking operations instead of raw journal entries.
pub struct Handler<'a, IO> {
    engine: &'a mut CoreEngine,
    io: &'a mut IO,
}

impl<'a, IO: InvocationIo> Handler<'a, IO> {
    pub fn new(engine: &'a mut CoreEngine, io: &'a mut IO) -> Self {
        Self { engine, io }
    }

    pub fn engine(&self) -> &CoreEngine {
        self.engine
    }

    /// Drains whatever output the engine has accumulated. Adapters should
    /// call this after every operation that might have produced a message
    /// (most of the methods below already flush internally via awaiting).
    pub fn take_output(&mut self) -> TakeOutputResult {
        self.engine.take_output()
    }

    fn drive_input(&mut self) {
        match self.io.read_more() {
            Some(bytes) => self.engine.notify_input(bytes),
            None => self.engine.notify_input_closed(),
        }
    }

    /// Blocks until `handle` resolves or the invocation suspends.
    pub fn await_one(&mut self, handle: AsyncResultHandle) -> Result<Value, AwaitError> {
        loop {
            if let Some(result) = self.engine.take_async_result(handle) {
                return result.map_err(AwaitError::Failure);
            }
            self.engine.notify_await_point(&[handle])?;
            if self.engine.is_closed() {
                return Err(AwaitError::Suspended);
            }
            self.drive_input();
        }
    }

    fn await_combinator<C: AsyncResultCombinator>(
        &mut self,
        combinator: &C,
    ) -> Result<Vec<AsyncResultHandle>, AwaitError> {
        loop {
            if let Some(handle) = self.engine.sys_try_complete_combinator(combinator)? {
                return match self.await_one(handle)? {
                    Value::CombinatorOrder(order) => Ok(order),
                    _ => Ok(Vec::new()),
                };
            }
            let pending = self.engine.not_ready_handles(combinator.children());
            self.engine.notify_await_point(&pending)?;
            if self.engine.is_closed() {
                return Err(AwaitError::Suspended);
            }
            self.drive_input();
        }
    }

    /// Blocks until every handle has resolved, returning them in the order
    /// the combinator recorded (reproduced identically on replay).
    pub fn all(&mut self, handles: Vec<AsyncResultHandle>) -> Result<Vec<AsyncResultHandle>, AwaitError> {
        let combinator = AllCombinator { children: handles };
        self.await_combinator(&combinator)
    }

    /// Blocks until the first of `handles` resolves, returning just that one.
    pub fn any(&mut self, handles: Vec<AsyncResultHandle>) -> Result<AsyncResultHandle, AwaitError> {
        let combinator = AnyCombinator { children: handles };
        let order = self.await_combinator(&combinator)?;
        Ok(order.into_iter().next().expect("combinator resolved with no winner"))
    }

    /// Reads the invocation's input payload and headers.
    pub fn input(&mut self) -> crate::VMResult<crate::Input> {
        self.engine.sys_input()
    }

    pub fn get(&mut self, key: impl Into<Bytes>) -> Result<Option<Bytes>, AwaitError> {
        let handle = self.engine.sys_state_get(key)?;
        match self.await_one(handle)? {
            Value::Success(b) => Ok(Some(b)),
            _ => Ok(None),
        }
    }

    pub fn get_keys(&mut self) -> Result<Vec<String>, AwaitError> {
        let handle = self.engine.sys_state_get_keys()?;
        match self.await_one(handle)? {
            Value::StateKeys(keys) => Ok(keys),
            _ => Ok(Vec::new()),
        }
    }

    pub fn set(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> crate::VMResult<()> {
        self.engine.sys_state_set(key, value)
    }

    pub fn clear(&mut self, key: impl Into<Bytes>) -> crate::VMResult<()> {
        self.engine.sys_state_clear(key)
    }

    pub fn clear_all(&mut self) -> crate::VMResult<()> {
        self.engine.sys_state_clear_all()
    }

    /// Blocks until `duration` has elapsed (from the perspective of the
    /// runtime, not this process).
    pub fn sleep(&mut self, duration: Duration) -> Result<(), AwaitError> {
        let wake_up_time = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .saturating_add(duration)
            .as_millis() as u64;
        let handle = self.engine.sys_sleep(wake_up_time)?;
        self.await_one(handle).map(|_| ())
    }

    pub fn call(
        &mut self,
        target: Target,
        parameter: impl Into<Bytes>,
        headers: Vec<Header>,
    ) -> Result<Bytes, AwaitError> {
        let handle = self.engine.sys_call(target, parameter, headers)?;
        match self.await_one(handle)? {
            Value::Success(b) => Ok(b),
            _ => Ok(Bytes::new()),
        }
    }

    pub fn one_way_call(
        &mut self,
        target: Target,
        parameter: impl Into<Bytes>,
        headers: Vec<Header>,
    ) -> crate::VMResult<()> {
        self.engine.sys_one_way_call(target, parameter, headers, 0)
    }

    pub fn delayed_call(
        &mut self,
        target: Target,
        parameter: impl Into<Bytes>,
        headers: Vec<Header>,
        delay: Duration,
    ) -> crate::VMResult<()> {
        self.engine
            .sys_one_way_call(target, parameter, headers, delay.as_millis() as u64)
    }

    /// Runs a side effect exactly once (across retries of the whole
    /// invocation). `f` is invoked only when the entry has not already been
    /// recorded; on a retryable failure it is re-invoked after `delay`
    /// (enforced here via a blocking sleep, matching the single-threaded
    /// worker model).
    pub fn run<F>(
        &mut self,
        name: impl Into<String>,
        retry_policy: RetryPolicy,
        mut f: F,
    ) -> Result<Bytes, AwaitError>
    where
        F: FnMut(EntryRetryInfo) -> Result<Bytes, TerminalFailure>,
    {
        let name = name.into();
        loop {
            match self.engine.sys_run_enter(name.clone())? {
                RunEnterResult::NotExecuted(NonEmptyValue::Value(b)) => return Ok(b),
                RunEnterResult::NotExecuted(NonEmptyValue::Failure(failure)) => {
                    return Err(AwaitError::Failure(failure))
                }
                RunEnterResult::Executed(retry_info) => {
                    let attempt_start = std::time::Instant::now();
                    let outcome = f(retry_info);
                    let attempt_duration = attempt_start.elapsed();
                    match self.engine.sys_run_exit(outcome, &retry_policy, attempt_duration)? {
                        RunExitResult::Handle(handle) => {
                            return match self.await_one(handle)? {
                                Value::Success(b) => Ok(b),
                                _ => Ok(Bytes::new()),
                            };
                        }
                        RunExitResult::Retry { delay, .. } => {
                            std::thread::sleep(delay);
                        }
                    }
                }
            }
        }
    }

    pub fn awakeable(&mut self) -> crate::VMResult<(String, AsyncResultHandle)> {
        self.engine.sys_awakeable()
    }

    pub fn resolve_awakeable(&mut self, id: String, value: Bytes) -> crate::VMResult<()> {
        self.engine.sys_complete_awakeable(id, Ok(value))
    }

    pub fn reject_awakeable(&mut self, id: String, failure: TerminalFailure) -> crate::VMResult<()> {
        self.engine.sys_complete_awakeable(id, Err(failure))
    }

    pub fn get_promise(&mut self, key: String) -> Result<Option<Bytes>, AwaitError> {
        let handle = self.engine.sys_get_promise(key)?;
        match self.await_one(handle)? {
            Value::Success(b) => Ok(Some(b)),
            _ => Ok(None),
        }
    }

    pub fn peek_promise(&mut self, key: String) -> Result<Option<Bytes>, AwaitError> {
        let handle = self.engine.sys_peek_promise(key)?;
        match self.await_one(handle)? {
            Value::Success(b) => Ok(Some(b)),
            _ => Ok(None),
        }
    }

    pub fn resolve_promise(&mut self, key: String, value: Bytes) -> Result<(), AwaitError> {
        let handle = self.engine.sys_complete_promise(key, Ok(value))?;
        self.await_one(handle).map(|_| ())
    }

    pub fn reject_promise(&mut self, key: String, failure: TerminalFailure) -> Result<(), AwaitError> {
        let handle = self.engine.sys_complete_promise(key, Err(failure))?;
        self.await_one(handle).map(|_| ())
    }

    pub fn write_output(&mut self, result: Result<Bytes, TerminalFailure>) -> crate::VMResult<()> {
        self.engine.sys_write_output(result)
    }
}

struct AllCombinator {
    children: Vec<AsyncResultHandle>,
}

impl AsyncResultCombinator for AllCombinator {
    fn children(&self) -> &[AsyncResultHandle] {
        &self.children
    }

    /// Resolves once every child has succeeded, or short-circuits as soon as
    /// any child fails (mirroring `Promise.all`'s fail-fast semantics rather
    /// than waiting out the slower siblings).
    fn try_complete(&self, tracker: &mut AsyncResultAccessTracker) -> Option<Vec<AsyncResultHandle>> {
        for handle in &self.children {
            match tracker.state_of(*handle) {
                AsyncResultState::Failure => return Some(vec![*handle]),
                AsyncResultState::NotReady => return None,
                AsyncResultState::Success => {}
            }
        }
        Some(self.children.clone())
    }
}

struct AnyCombinator {
    children: Vec<AsyncResultHandle>,
}

impl AsyncResultCombinator for AnyCombinator {
    fn children(&self) -> &[AsyncResultHandle] {
        &self.children
    }

    fn try_complete(&self, tracker: &mut AsyncResultAccessTracker) -> Option<Vec<AsyncResultHandle>> {
        self.children
            .iter()
            .find(|h| !matches!(tracker.state_of(**h), AsyncResultState::NotReady))
            .map(|h| vec![*h])
    }
}
