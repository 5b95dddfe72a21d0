use std::time::Duration;

use bytes::Bytes;

use crate::engine::context::RunState;
use crate::engine::{decode_err, errors, CoreEngine};
use crate::protocol::messages::{run_entry_message, RestateMessage, RunEntryMessage};
use crate::retries::{NextRetry, RetryPolicy};
use crate::{AsyncResultHandle, NonEmptyValue, RunEnterResult, RunExitResult, TerminalFailure, VMResult};

impl CoreEngine {
    /// Enters a `run` (side effect) block. On replay, returns the recorded
    /// value/failure without invoking the user's closure. In processing
    /// mode, marks the engine as "running" (guarding against nested
    /// journalled operations) and hands back retry bookkeeping.
    pub fn sys_run_enter(&mut self, name: impl Into<String>) -> VMResult<RunEnterResult> {
        self.check_not_terminated()?;
        let name = name.into();

        if self.in_replay() {
            self.context.journal.set_current(RunEntryMessage::ty(), Some(name.clone()));
            let raw = self.pop_replay_entry()?;
            if raw.ty() != RunEntryMessage::ty() {
                let index = self.context.journal.index();
                let actual = format!("{:?}", raw.ty());
                return Err(self.fail(errors::journal_mismatch(index, &actual, "RunEntry")));
            }
            let decoded: RunEntryMessage = raw.decode_to().map_err(|e| self.fail(decode_err(e)))?;
            self.advance_journal();
            let result = decoded
                .result
                .ok_or_else(|| {
                    self.fail(errors::codes::JOURNAL_MISMATCH.with_description("RunEntry missing result on replay"))
                })?;
            return Ok(RunEnterResult::NotExecuted(result.into()));
        }

        // A fresh attempt (run_state was NotRunning) inherits Start's carried-over
        // retry counters; a locally retried attempt (run_state is already
        // Running, from a previous failed-and-retried sys_run_exit) keeps the
        // bookkeeping accumulated so far instead of re-deriving it.
        let retry_info = match &self.context.run_state {
            RunState::Running(_, retry_info) => *retry_info,
            RunState::NotRunning => self.context.infer_entry_retry_info(),
        };
        self.context.run_state = RunState::Running(name, retry_info);
        Ok(RunEnterResult::Executed(retry_info))
    }

    /// Proposes the outcome of a just-executed side effect. If `retry_policy`
    /// says to retry, returns `RunExitResult::Retry` and leaves the engine in
    /// the `Running` state (with updated retry bookkeeping) for another
    /// attempt; otherwise records the RunEntry, sends it requiring an ack,
    /// and returns a handle.
    pub fn sys_run_exit(
        &mut self,
        value: Result<Bytes, TerminalFailure>,
        retry_policy: &RetryPolicy,
        attempt_duration: Duration,
    ) -> VMResult<RunExitResult> {
        self.check_not_closed_or_suspended()?;
        let (name, mut retry_info) = match &self.context.run_state {
            RunState::Running(name, retry_info) => (name.clone(), *retry_info),
            RunState::NotRunning => {
                return Err(self.fail(errors::codes::PROTOCOL_VIOLATION.with_description(
                    "sys_run_exit called without a matching sys_run_enter",
                )))
            }
        };

        if let Err(failure) = &value {
            retry_info.retry_count += 1;
            retry_info.retry_loop_duration += attempt_duration;
            if let NextRetry::Retry(delay) = retry_policy.next_retry(retry_info) {
                let delay = delay.unwrap_or(Duration::ZERO);
                self.context.next_retry_delay = Some(delay);
                self.context.run_state = RunState::Running(name, retry_info);
                return Ok(RunExitResult::Retry {
                    delay,
                    failure: failure.clone(),
                });
            }
        }

        self.context.run_state = RunState::NotRunning;
        self.context.next_retry_delay = None;

        let non_empty = match value {
            Ok(b) => NonEmptyValue::Value(b),
            Err(f) => NonEmptyValue::Failure(f),
        };
        let result: run_entry_message::Result = non_empty.clone().into();

        let index = self.advance_journal();
        self.context.output.send(&RunEntryMessage {
            name: String::new(),
            result: Some(result),
        });
        let parsed: Result<crate::Value, TerminalFailure> = match non_empty {
            NonEmptyValue::Value(b) => Ok(crate::Value::Success(b)),
            NonEmptyValue::Failure(f) => Err(f),
        };
        self.context.async_results.insert_waiting_ack_result(index, parsed);
        Ok(RunExitResult::Handle(AsyncResultHandle::new(index)))
    }
}
