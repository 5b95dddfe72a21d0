use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use bytes::Bytes;
use bytes_utils::SegmentedBuf;

use crate::engine::errors;
use crate::protocol::header::MessageType;
use crate::protocol::messages::CompletionParsingHint;
use crate::protocol::Encoder;
use crate::{AsyncResultHandle, EntryRetryInfo, Error, TerminalFailure, Value};

/// Everything learned from `StartMessage`.
#[derive(Debug, Clone)]
pub struct StartInfo {
    pub id: String,
    pub debug_id: String,
    pub key: String,
    pub entries_to_replay: u32,
    pub retry_count_since_last_stored_entry: u32,
    pub duration_since_last_stored_entry: Duration,
    pub random_seed: u64,
}

/// Tracks the engine's position in the journal and, while replaying, which
/// entry is "current" for mismatch diagnostics.
#[derive(Debug, Default)]
pub struct Journal {
    index: u32,
    current_entry_ty: Option<MessageType>,
    current_entry_name: Option<String>,
}

impl Journal {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn set_current(&mut self, ty: MessageType, name: Option<String>) {
        self.current_entry_ty = Some(ty);
        self.current_entry_name = name;
    }

    pub fn current_entry_ty(&self) -> Option<MessageType> {
        self.current_entry_ty
    }

    pub fn current_entry_name(&self) -> Option<&str> {
        self.current_entry_name.as_deref()
    }

    pub fn advance(&mut self) -> u32 {
        let idx = self.index;
        self.index += 1;
        idx
    }
}

/// Buffers outbound bytes until the adapter drains them.
pub struct Output {
    encoder: Encoder,
    buffer: SegmentedBuf<Bytes>,
    is_closed: bool,
}

impl Output {
    pub fn new(encoder: Encoder) -> Self {
        Self {
            encoder,
            buffer: SegmentedBuf::new(),
            is_closed: false,
        }
    }

    pub fn send<M: crate::protocol::messages::WriteableRestateMessage>(&mut self, msg: &M) {
        if self.is_closed {
            return;
        }
        self.buffer.push(self.encoder.encode(msg));
    }

    pub fn send_eof(&mut self) {
        self.is_closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    pub fn take(&mut self) -> Option<Bytes> {
        if !self.buffer.has_remaining() {
            return None;
        }
        use bytes::Buf;
        let len = self.buffer.remaining();
        Some(self.buffer.copy_to_bytes(len))
    }
}

/// Tracks the outcome of every journal entry the engine has issued a
/// completion for, plus the side-effect/combinator acknowledgement queue.
#[derive(Debug, Default)]
pub struct AsyncResultsState {
    ready_results: HashMap<u32, Result<Value, TerminalFailure>>,
    parsing_hints: HashMap<u32, CompletionParsingHint>,
    waiting_ack_results: VecDeque<(u32, Result<Value, TerminalFailure>)>,
    last_acked_entry: u32,
}

impl AsyncResultsState {
    pub fn has_ready_result(&self, index: u32) -> bool {
        self.ready_results.contains_key(&index)
    }

    pub fn take_ready_result(&mut self, index: u32) -> Option<Result<Value, TerminalFailure>> {
        self.ready_results.remove(&index)
    }

    pub fn peek_ready_result(&self, index: u32) -> Option<&Result<Value, TerminalFailure>> {
        self.ready_results.get(&index)
    }

    pub fn insert_completion_parsing_hint(&mut self, index: u32, hint: CompletionParsingHint) {
        self.parsing_hints.insert(index, hint);
    }

    pub fn parsing_hint(&self, index: u32) -> CompletionParsingHint {
        self.parsing_hints
            .get(&index)
            .copied()
            .unwrap_or(CompletionParsingHint::EmptyOrSuccessOrValue)
    }

    /// Inserts a freshly resolved result. Byte-equal duplicates are
    /// tolerated (idempotent); conflicting duplicates are rejected.
    pub fn insert_ready_result(
        &mut self,
        index: u32,
        result: Result<Value, TerminalFailure>,
    ) -> Result<(), Error> {
        if let Some(existing) = self.ready_results.get(&index) {
            if *existing != result {
                return Err(errors::completion_conflict(index));
            }
            return Ok(());
        }
        self.ready_results.insert(index, result);
        Ok(())
    }

    /// Records a result that must not become visible to `take_ready_result`
    /// until the runtime acknowledges the entry it belongs to (`RunEntry`,
    /// `CombinatorEntry`). If an ack for this index (or a later one) has
    /// already been observed, the result is ready immediately — acks may
    /// race ahead of the entry they apply to.
    pub fn insert_waiting_ack_result(&mut self, index: u32, value: Result<Value, TerminalFailure>) {
        if index <= self.last_acked_entry {
            let _ = self.insert_ready_result(index, value);
        } else {
            self.waiting_ack_results.push_back((index, value));
        }
    }

    /// Advances the ack watermark and promotes every queued result up to and
    /// including `acked_index` into `ready_results`. Acks are a monotonic
    /// high-water mark, not a per-index set: an ack for index N also
    /// confirms every earlier still-pending index.
    pub fn notify_ack(&mut self, acked_index: u32) {
        if acked_index <= self.last_acked_entry {
            return;
        }
        self.last_acked_entry = acked_index;
        while let Some((index, _)) = self.waiting_ack_results.front() {
            if *index > self.last_acked_entry {
                break;
            }
            let (index, value) = self.waiting_ack_results.pop_front().expect("front just peeked");
            let _ = self.insert_ready_result(index, value);
        }
    }

    pub fn get_ready_results_state(
        &self,
        handles: &[AsyncResultHandle],
    ) -> Vec<(AsyncResultHandle, crate::AsyncResultState)> {
        handles
            .iter()
            .map(|h| {
                let state = match self.ready_results.get(&h.index()) {
                    Some(Ok(_)) => crate::AsyncResultState::Success,
                    Some(Err(_)) => crate::AsyncResultState::Failure,
                    None => crate::AsyncResultState::NotReady,
                };
                (*h, state)
            })
            .collect()
    }
}

/// Whether a side effect closure is currently executing; used to guard
/// against side effects issuing other journalled operations. `Running`
/// carries the retry bookkeeping accumulated so far for this (not yet
/// committed) entry, so a locally retried closure sees an incrementing
/// `retry_count`/`retry_loop_duration` instead of the same value on every
/// attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Running(String, crate::EntryRetryInfo),
    NotRunning,
}

/// Local cache of state key/value pairs, seeded from `StartMessage`'s eager
/// state map and kept current by local `SetState`/`ClearState` effects.
#[derive(Debug, Default)]
pub struct EagerState {
    is_partial: bool,
    values: HashMap<String, Option<Bytes>>,
}

pub enum EagerGetState {
    Unknown,
    Empty,
    Value(Bytes),
}

impl EagerState {
    pub fn new(is_partial: bool, entries: impl IntoIterator<Item = (String, Bytes)>) -> Self {
        Self {
            is_partial,
            values: entries.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }

    pub fn get(&self, key: &str) -> EagerGetState {
        match self.values.get(key) {
            Some(Some(v)) => EagerGetState::Value(v.clone()),
            Some(None) => EagerGetState::Empty,
            None if self.is_partial => EagerGetState::Unknown,
            None => EagerGetState::Empty,
        }
    }

    pub fn get_keys(&self) -> Option<Vec<String>> {
        if self.is_partial {
            None
        } else {
            let mut keys: Vec<String> = self.values.keys().cloned().collect();
            keys.sort();
            Some(keys)
        }
    }

    pub fn set(&mut self, key: String, value: Bytes) {
        self.values.insert(key, Some(value));
    }

    pub fn clear(&mut self, key: &str) {
        self.values.insert(key.to_string(), None);
    }

    pub fn clear_all(&mut self) {
        self.is_partial = false;
        self.values.clear();
    }
}

/// Everything shared across every state-machine transition for a single
/// invocation.
pub struct Context {
    pub start_info: Option<StartInfo>,
    pub journal: Journal,
    pub input_is_closed: bool,
    pub output: Output,
    pub eager_state: EagerState,
    pub async_results: AsyncResultsState,
    pub run_state: RunState,
    pub next_retry_delay: Option<Duration>,
}

impl Context {
    pub fn new(output: Output) -> Self {
        Self {
            start_info: None,
            journal: Journal::default(),
            input_is_closed: false,
            output,
            eager_state: EagerState::default(),
            async_results: AsyncResultsState::default(),
            run_state: RunState::NotRunning,
            next_retry_delay: None,
        }
    }

    pub fn start_info(&self) -> Option<&StartInfo> {
        self.start_info.as_ref()
    }

    pub fn expect_start_info(&self) -> Result<&StartInfo, Error> {
        self.start_info.as_ref().ok_or_else(errors::closed)
    }

    /// The first entry committed after replay ends inherits the
    /// Start-supplied retry counters; everything after starts fresh.
    pub fn infer_entry_retry_info(&mut self) -> EntryRetryInfo {
        if let Some(start_info) = &mut self.start_info {
            if start_info.retry_count_since_last_stored_entry > 0
                || start_info.duration_since_last_stored_entry > Duration::ZERO
            {
                let info = EntryRetryInfo {
                    retry_count: start_info.retry_count_since_last_stored_entry,
                    retry_loop_duration: start_info.duration_since_last_stored_entry,
                };
                start_info.retry_count_since_last_stored_entry = 0;
                start_info.duration_since_last_stored_entry = Duration::ZERO;
                return info;
            }
        }
        EntryRetryInfo {
            retry_count: 0,
            retry_loop_duration: Duration::ZERO,
        }
    }
}
