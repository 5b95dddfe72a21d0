//! The invocation state machine: reads protocol messages, replays them
//! deterministically against user operations, and produces the
//! corresponding outbound messages/suspension/error decisions.

pub mod errors;
mod transitions;

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::instrument;

use crate::engine::context::{Context, EagerState, Output, StartInfo};
use crate::headers::HeaderMap;
use crate::protocol::header::MessageType;
use crate::protocol::messages::{ErrorMessage, RestateMessage, StartMessage};
use crate::protocol::{Decoder, Encoder, RawMessage, Version};
use crate::{Error, Header, ResponseHead, TakeOutputResult, VMOptions, VMResult};

pub mod context;

pub(crate) type PendingEntries = VecDeque<RawMessage>;

/// High-level phase of the invocation, driving which entry-handling path
/// (replay vs. fresh) user operations take.
pub(crate) enum State {
    WaitingStart,
    Replaying { pending: PendingEntries },
    Processing,
    Closed,
    Suspended,
}

/// The engine-to-adapter contract: push bytes in, pull bytes out, ask
/// whether the invocation has closed.
pub trait Engine {
    fn notify_input(&mut self, buf: Bytes);
    fn notify_input_closed(&mut self);
    fn is_ready_to_execute(&self) -> VMResult<bool>;
    fn take_output(&mut self) -> TakeOutputResult;
    fn is_closed(&self) -> bool;
    fn get_response_head(&self) -> &ResponseHead;
}

/// The invocation state machine itself.
pub struct CoreEngine {
    pub(crate) version: Version,
    pub(crate) decoder: Decoder,
    pub(crate) context: Context,
    pub(crate) state: State,
    pub(crate) options: VMOptions,
    pub(crate) response_head: ResponseHead,
    pub(crate) closed_with: Option<Error>,
}

impl CoreEngine {
    #[instrument(level = "trace", skip(headers))]
    pub fn new(headers: impl HeaderMap, options: VMOptions) -> VMResult<Self> {
        let content_type = headers
            .extract("content-type")
            .map_err(|e| errors::codes::BAD_REQUEST.with_description(format!("{e:?}")))?
            .ok_or_else(errors::missing_content_type)?;
        let version = Version::choose_from_content_type(content_type)
            .ok_or_else(|| errors::unrecognized_content_type(content_type))?;

        let response_head = ResponseHead {
            status_code: 200,
            headers: vec![Header {
                key: "content-type".into(),
                value: version.content_type().to_string().into(),
            }],
        };

        Ok(Self {
            version,
            decoder: Decoder::new(version),
            context: Context::new(Output::new(Encoder::new(version))),
            state: State::WaitingStart,
            options,
            response_head,
            closed_with: None,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn options(&self) -> VMOptions {
        self.options
    }

    pub(crate) fn in_replay(&self) -> bool {
        matches!(self.state, State::Replaying { .. })
    }

    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.state, State::Closed | State::Suspended)
    }

    pub(crate) fn check_not_closed_or_suspended(&self) -> VMResult<()> {
        match self.state {
            State::Closed => Err(errors::closed()),
            State::Suspended => Err(errors::suspended()),
            _ => Ok(()),
        }
    }

    /// Every user operation except `sys_run_exit` goes through this: closed,
    /// suspended, and "currently inside a side effect" are all disqualifying.
    pub(crate) fn check_not_terminated(&self) -> VMResult<()> {
        self.check_not_closed_or_suspended()?;
        if matches!(self.context.run_state, crate::engine::context::RunState::Running(_, _)) {
            return Err(errors::side_effect_nested_call());
        }
        Ok(())
    }

    /// Pops the next entry the journal expects during replay, failing if the
    /// runtime closed input before delivering it.
    pub(crate) fn pop_replay_entry(&mut self) -> VMResult<RawMessage> {
        let expected_total = self
            .context
            .start_info
            .as_ref()
            .map(|s| s.entries_to_replay)
            .unwrap_or(0);
        match &mut self.state {
            State::Replaying { pending } => pending.pop_front().ok_or_else(|| {
                errors::input_closed_while_waiting_entries(
                    self.context.journal.index(),
                    expected_total,
                )
            }),
            _ => Err(Error::internal(
                "pop_replay_entry called outside of replay",
            )),
        }
    }

    /// Advances the journal index and, if that crosses the known-entries
    /// boundary, flips from `Replaying` to `Processing`.
    pub(crate) fn advance_journal(&mut self) -> u32 {
        let index = self.context.journal.advance();
        if let Some(start) = &self.context.start_info {
            if matches!(self.state, State::Replaying { .. }) && index + 1 >= start.entries_to_replay
            {
                self.state = State::Processing;
            }
        }
        index
    }

    pub(crate) fn fail(&mut self, err: Error) -> Error {
        if !matches!(self.state, State::Closed | State::Suspended) {
            self.context.output.send(&ErrorMessage {
                code: err.code as u32,
                message: err.message.clone().into_owned(),
                description: err.description.clone().into_owned(),
                related_entry_index: None,
                related_entry_name: self.context.journal.current_entry_name().map(String::from),
                related_entry_type: self
                    .context
                    .journal
                    .current_entry_ty()
                    .map(|t| t.to_id() as u32),
                next_retry_delay: self.context.next_retry_delay.map(|d| d.as_millis() as u64),
            });
            self.context.output.send_eof();
        }
        self.closed_with = Some(err.clone());
        self.state = State::Closed;
        err
    }

    fn drain_decoder(&mut self) {
        loop {
            match self.decoder.consume_next() {
                Ok(Some(raw)) => {
                    if self.handle_raw_message(raw).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.fail(errors::codes::PROTOCOL_VIOLATION.with_description(e.to_string()));
                    break;
                }
            }
        }
    }

    fn handle_raw_message(&mut self, raw: RawMessage) -> VMResult<()> {
        match &self.state {
            State::WaitingStart => self.handle_start(raw),
            State::Replaying { .. } | State::Processing => match raw.ty() {
                MessageType::Completion => self.handle_completion(raw),
                MessageType::EntryAck => self.handle_ack(raw),
                _ if self.in_replay() => {
                    if let State::Replaying { pending } = &mut self.state {
                        pending.push_back(raw);
                    }
                    Ok(())
                }
                other => Err(self.fail(errors::unexpected_input_message(
                    "Completion or EntryAck",
                    &format!("{other:?}"),
                ))),
            },
            State::Closed | State::Suspended => Ok(()),
        }
    }

    fn handle_start(&mut self, raw: RawMessage) -> VMResult<()> {
        if raw.ty() != MessageType::Start {
            return Err(self.fail(errors::unexpected_input_message(
                "Start",
                &format!("{:?}", raw.ty()),
            )));
        }
        let start: StartMessage = raw
            .decode_to()
            .map_err(|e| self.fail(errors::codes::PROTOCOL_VIOLATION.with_description(e.to_string())))?;

        if start.known_entries == 0 {
            return Err(self.fail(errors::known_entries_is_zero()));
        }

        let eager_state = EagerState::new(
            start.partial_state,
            start
                .state_map
                .iter()
                .map(|e| (String::from_utf8_lossy(&e.key).into_owned(), e.value.clone())),
        );
        self.context.eager_state = eager_state;
        let random_seed = if start.random_seed != 0 {
            start.random_seed
        } else {
            compute_random_seed(&start.id)
        };

        self.context.start_info = Some(StartInfo {
            id: String::from_utf8_lossy(&start.id).into_owned(),
            debug_id: start.debug_id,
            key: start.key,
            entries_to_replay: start.known_entries,
            retry_count_since_last_stored_entry: start.retry_count_since_last_stored_entry,
            duration_since_last_stored_entry: std::time::Duration::from_millis(
                start.duration_since_last_stored_entry,
            ),
            random_seed,
        });

        self.state = State::Replaying {
            pending: VecDeque::new(),
        };
        Ok(())
    }

    fn handle_completion(&mut self, raw: RawMessage) -> VMResult<()> {
        use crate::protocol::messages::CompletionMessage;
        let completion: CompletionMessage = raw
            .decode_to()
            .map_err(|e| self.fail(errors::codes::PROTOCOL_VIOLATION.with_description(e.to_string())))?;
        let Some(result) = completion.result else {
            return Err(self.fail(errors::codes::PROTOCOL_VIOLATION.with_description(
                "CompletionMessage missing result",
            )));
        };
        let hint = self.context.async_results.parsing_hint(completion.entry_index);
        let parsed: Result<crate::Value, crate::TerminalFailure> = hint.parse(result);
        if self
            .context
            .async_results
            .insert_ready_result(completion.entry_index, parsed)
            .is_err()
        {
            return Err(self.fail(errors::completion_conflict(completion.entry_index)));
        }
        Ok(())
    }

    fn handle_ack(&mut self, raw: RawMessage) -> VMResult<()> {
        use crate::protocol::messages::EntryAckMessage;
        let ack: EntryAckMessage = raw
            .decode_to()
            .map_err(|e| self.fail(errors::codes::PROTOCOL_VIOLATION.with_description(e.to_string())))?;
        self.context.async_results.notify_ack(ack.entry_index);
        Ok(())
    }

    #[instrument(level = "trace", skip(self), fields(restate.journal.index = self.context.journal.index()), ret)]
    pub fn take_async_result(
        &mut self,
        handle: crate::AsyncResultHandle,
    ) -> Option<Result<crate::Value, crate::TerminalFailure>> {
        self.context.async_results.take_ready_result(handle.index())
    }

    pub fn peek_async_result(
        &self,
        handle: crate::AsyncResultHandle,
    ) -> Option<&Result<crate::Value, crate::TerminalFailure>> {
        self.context.async_results.peek_ready_result(handle.index())
    }

    /// Filters `handles` down to those without a ready result yet. Used by
    /// combinator awaits, which must suspend on the subset still outstanding
    /// rather than treat "some child is ready" as "nothing to wait for".
    pub fn not_ready_handles(&self, handles: &[crate::AsyncResultHandle]) -> Vec<crate::AsyncResultHandle> {
        handles
            .iter()
            .filter(|h| !self.context.async_results.has_ready_result(h.index()))
            .copied()
            .collect()
    }

    /// Called by the bridge when user code is about to block on one or more
    /// deferred results and nothing else remains runnable. Emits a
    /// suspension if no further input can resolve any of them.
    #[instrument(level = "trace", skip(self))]
    pub fn notify_await_point(&mut self, awaited: &[crate::AsyncResultHandle]) -> VMResult<()> {
        self.check_not_terminated()?;
        if awaited
            .iter()
            .any(|h| self.context.async_results.has_ready_result(h.index()))
        {
            return Ok(());
        }
        if self.context.input_is_closed {
            self.suspend(awaited.iter().map(|h| h.index()).collect());
        }
        Ok(())
    }

    fn suspend(&mut self, indices: Vec<u32>) {
        use crate::protocol::messages::SuspensionMessage;
        self.context.output.send(&SuspensionMessage {
            entry_indexes: indices,
        });
        self.context.output.send_eof();
        self.state = State::Suspended;
    }

    /// Generates the server-style awakeable id for a journal entry: a
    /// URL-safe, unpadded base64 encoding of the invocation id and entry
    /// index.
    pub fn awakeable_id(invocation_id: &str, entry_index: u32) -> String {
        use base64::engine::general_purpose::GeneralPurposeConfig;
        use base64::engine::{DecodePaddingMode, GeneralPurpose};
        use base64::{alphabet, Engine as _};

        let config = GeneralPurposeConfig::new()
            .with_encode_padding(false)
            .with_decode_padding_mode(DecodePaddingMode::Indifferent);
        let engine = GeneralPurpose::new(&alphabet::URL_SAFE, config);

        let mut buf = Vec::with_capacity(invocation_id.len() + 4);
        buf.extend_from_slice(invocation_id.as_bytes());
        buf.extend_from_slice(&entry_index.to_be_bytes());
        format!("prom_1{}", engine.encode(buf))
    }
}

impl Engine for CoreEngine {
    #[instrument(level = "trace", skip(self, buf))]
    fn notify_input(&mut self, buf: Bytes) {
        self.decoder.push(buf);
        self.drain_decoder();
    }

    fn notify_input_closed(&mut self) {
        self.context.input_is_closed = true;
    }

    fn is_ready_to_execute(&self) -> VMResult<bool> {
        self.check_not_terminated()?;
        Ok(!matches!(self.state, State::WaitingStart))
    }

    fn take_output(&mut self) -> TakeOutputResult {
        match self.context.output.take() {
            Some(b) => TakeOutputResult::Buffer(b),
            None if self.context.output.is_closed() => TakeOutputResult::EOF,
            None => TakeOutputResult::Buffer(Bytes::new()),
        }
    }

    fn is_closed(&self) -> bool {
        self.is_terminated()
    }

    fn get_response_head(&self) -> &ResponseHead {
        &self.response_head
    }
}

pub(crate) fn decode_err<E: std::fmt::Display>(e: E) -> Error {
    errors::codes::PROTOCOL_VIOLATION.with_description(e.to_string())
}

/// Derives a deterministic per-invocation random seed from the invocation
/// id, used as a fallback when the runtime did not supply one directly.
#[cfg(feature = "sha2_random_seed")]
fn compute_random_seed(invocation_id: &[u8]) -> u64 {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(invocation_id);
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

#[cfg(not(feature = "sha2_random_seed"))]
fn compute_random_seed(invocation_id: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in invocation_id {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
