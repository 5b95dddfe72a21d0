//! Test harness: a builder that feeds mock protocol messages into a
//! [`CoreEngine`] and an iterator over its decoded output, mirroring how an
//! adapter actually drives the engine but synchronously and in-memory.

use bytes::Bytes;

use crate::bridge::{Handler, InvocationIo};
use crate::engine::{CoreEngine, Engine};
use crate::protocol::header::MessageType;
use crate::protocol::messages::{
    completion_message, start_message, CompletionMessage, Empty, EntryAckMessage, Failure,
    InputEntryMessage, RestateMessage, StartMessage, WriteableRestateMessage,
};
use crate::protocol::{Decoder, Encoder, Version};
use crate::{TakeOutputResult, VMOptions};

mod calls;
mod scenarios;
mod state;

/// Input is always fed up front and the stream closed before the handler
/// runs, so an adapter backed by this never has more to offer.
pub(crate) struct NoMoreInput;

impl InvocationIo for NoMoreInput {
    fn read_more(&mut self) -> Option<Bytes> {
        None
    }
}

pub(crate) struct EngineTestCase {
    version: Version,
    options: VMOptions,
    inputs: Vec<Bytes>,
}

impl EngineTestCase {
    pub(crate) fn new() -> Self {
        Self {
            version: Version::maximum_supported_version(),
            options: VMOptions::default(),
            inputs: Vec::new(),
        }
    }

    pub(crate) fn with_options(options: VMOptions) -> Self {
        Self {
            options,
            ..Self::new()
        }
    }

    pub(crate) fn input<M: WriteableRestateMessage>(mut self, msg: M) -> Self {
        let encoder = Encoder::new(self.version);
        self.inputs.push(encoder.encode(&msg));
        self
    }

    fn build(self) -> (CoreEngine, Version) {
        let headers = vec![(
            "content-type".to_string(),
            self.version.content_type().to_string(),
        )];
        let mut engine = CoreEngine::new(headers, self.options).expect("engine construction");
        for buf in self.inputs {
            engine.notify_input(buf);
        }
        engine.notify_input_closed();
        (engine, self.version)
    }

    /// Runs `f` directly against the engine's `sys_*` primitives.
    pub(crate) fn run(self, f: impl FnOnce(&mut CoreEngine)) -> OutputIterator {
        let (mut engine, version) = self.build();
        f(&mut engine);
        OutputIterator::collect(&mut engine, version)
    }

    /// Runs `f` against the blocking [`Handler`] surface, backed by an
    /// adapter that never has more input to offer (everything was already
    /// fed and the stream closed).
    pub(crate) fn run_bridge(self, f: impl FnOnce(&mut Handler<'_, NoMoreInput>)) -> OutputIterator {
        let (mut engine, version) = self.build();
        let mut io = NoMoreInput;
        {
            let mut handler = Handler::new(&mut engine, &mut io);
            f(&mut handler);
        }
        OutputIterator::collect(&mut engine, version)
    }
}

/// Decodes an engine's accumulated output for sequential assertions.
pub(crate) struct OutputIterator {
    decoder: Decoder,
}

impl OutputIterator {
    fn collect(engine: &mut CoreEngine, version: Version) -> Self {
        let mut decoder = Decoder::new(version);
        loop {
            match engine.take_output() {
                TakeOutputResult::Buffer(b) => {
                    if b.is_empty() {
                        break;
                    }
                    decoder.push(b);
                }
                TakeOutputResult::EOF => break,
            }
        }
        Self { decoder }
    }

    pub(crate) fn next_ty(&mut self) -> Option<MessageType> {
        self.decoder
            .consume_next()
            .expect("well-formed frame")
            .map(|raw| raw.ty())
    }

    pub(crate) fn next_decoded<M: RestateMessage>(&mut self) -> Option<M> {
        self.decoder
            .consume_next()
            .expect("well-formed frame")
            .map(|raw| raw.decode_to::<M>().expect("message matches its own type tag"))
    }
}

// --- Mock message builders, grounded in the wire shapes in `protocol::messages`.

pub(crate) fn start_message(known_entries: u32) -> StartMessage {
    StartMessage {
        id: Bytes::from_static(b"inv-1"),
        debug_id: "inv-1".to_string(),
        known_entries,
        key: "my-key".to_string(),
        random_seed: 42,
        ..Default::default()
    }
}

pub(crate) fn start_message_with_state(
    known_entries: u32,
    partial_state: bool,
    state: Vec<(&'static str, &'static str)>,
) -> StartMessage {
    StartMessage {
        partial_state,
        state_map: state
            .into_iter()
            .map(|(k, v)| start_message::StateEntry {
                key: Bytes::from_static(k.as_bytes()),
                value: Bytes::from_static(v.as_bytes()),
            })
            .collect(),
        ..start_message(known_entries)
    }
}

pub(crate) fn input_entry_message(data: &'static [u8]) -> InputEntryMessage {
    InputEntryMessage {
        headers: vec![],
        value: Bytes::from_static(data),
        name: String::new(),
    }
}

pub(crate) fn completion_value(entry_index: u32, value: &'static [u8]) -> CompletionMessage {
    CompletionMessage {
        entry_index,
        result: Some(completion_message::Result::Value(Bytes::from_static(value))),
    }
}

pub(crate) fn completion_empty(entry_index: u32) -> CompletionMessage {
    CompletionMessage {
        entry_index,
        result: Some(completion_message::Result::Empty(Empty {})),
    }
}

pub(crate) fn completion_failure(entry_index: u32, code: u32, message: &str) -> CompletionMessage {
    CompletionMessage {
        entry_index,
        result: Some(completion_message::Result::Failure(Failure {
            code,
            message: message.to_string(),
        })),
    }
}

pub(crate) fn entry_ack(entry_index: u32) -> EntryAckMessage {
    EntryAckMessage { entry_index }
}
