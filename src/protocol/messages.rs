//! Hand-authored wire message types.
//!
//! These mirror what a `prost_build` codegen pass over the protocol's
//! `.proto` definitions would produce. Written by hand here because no
//! `protoc`/`build.rs` pipeline is available to this crate; the shapes are
//! ordinary `prost::Message`/`prost::Oneof` derives and compile exactly as
//! generated code would.

use bytes::Bytes;
use prost::Message;

use crate::protocol::header::{MessageHeader, MessageType};
use crate::{NonEmptyValue, TerminalFailure, Value};

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Header {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct Failure {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl From<TerminalFailure> for Failure {
    fn from(f: TerminalFailure) -> Self {
        Failure {
            code: f.code as u32,
            message: f.message.into_owned(),
        }
    }
}

impl From<Failure> for TerminalFailure {
    fn from(f: Failure) -> Self {
        TerminalFailure {
            code: f.code as u16,
            message: f.message.into(),
        }
    }
}

// --- Start / control messages

pub mod start_message {
    #[derive(Clone, PartialEq, Eq, prost::Message)]
    pub struct StateEntry {
        #[prost(bytes = "bytes", tag = "1")]
        pub key: bytes::Bytes,
        #[prost(bytes = "bytes", tag = "2")]
        pub value: bytes::Bytes,
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct StartMessage {
    #[prost(bytes = "bytes", tag = "1")]
    pub id: Bytes,
    #[prost(string, tag = "2")]
    pub debug_id: String,
    #[prost(uint32, tag = "3")]
    pub known_entries: u32,
    #[prost(message, repeated, tag = "4")]
    pub state_map: Vec<start_message::StateEntry>,
    #[prost(bool, tag = "5")]
    pub partial_state: bool,
    #[prost(string, tag = "6")]
    pub key: String,
    #[prost(uint32, tag = "7")]
    pub retry_count_since_last_stored_entry: u32,
    #[prost(uint64, tag = "8")]
    pub duration_since_last_stored_entry: u64,
    #[prost(uint64, tag = "9")]
    pub random_seed: u64,
}

pub mod completion_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "13")]
        Empty(super::Empty),
        #[prost(bytes, tag = "14")]
        Value(Bytes),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct CompletionMessage {
    #[prost(uint32, tag = "1")]
    pub entry_index: u32,
    #[prost(oneof = "completion_message::Result", tags = "13, 14, 15")]
    pub result: Option<completion_message::Result>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct SuspensionMessage {
    #[prost(uint32, repeated, tag = "1")]
    pub entry_indexes: Vec<u32>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct ErrorMessage {
    #[prost(uint32, tag = "1")]
    pub code: u32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(uint32, optional, tag = "4")]
    pub related_entry_index: Option<u32>,
    #[prost(string, optional, tag = "5")]
    pub related_entry_name: Option<String>,
    #[prost(uint32, optional, tag = "6")]
    pub related_entry_type: Option<u32>,
    #[prost(uint64, optional, tag = "7")]
    pub next_retry_delay: Option<u64>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct EntryAckMessage {
    #[prost(uint32, tag = "1")]
    pub entry_index: u32,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct EndMessage {}

// --- Input / Output

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct InputEntryMessage {
    #[prost(message, repeated, tag = "1")]
    pub headers: Vec<Header>,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
    #[prost(string, tag = "3")]
    pub name: String,
}

pub mod output_entry_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(bytes, tag = "14")]
        Value(Bytes),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct OutputEntryMessage {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(oneof = "output_entry_message::Result", tags = "14, 15")]
    pub result: Option<output_entry_message::Result>,
}

// --- State

pub mod get_state_entry_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "13")]
        Empty(super::Empty),
        #[prost(bytes, tag = "14")]
        Value(Bytes),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GetStateEntryMessage {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(oneof = "get_state_entry_message::Result", tags = "13, 14, 15")]
    pub result: Option<get_state_entry_message::Result>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct SetStateEntryMessage {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
    #[prost(string, tag = "3")]
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct ClearStateEntryMessage {
    #[prost(bytes = "bytes", tag = "1")]
    pub key: Bytes,
    #[prost(string, tag = "2")]
    pub name: String,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct ClearAllStateEntryMessage {
    #[prost(string, tag = "1")]
    pub name: String,
}

pub mod get_state_keys_entry_message {
    #[derive(Clone, PartialEq, Eq, prost::Message)]
    pub struct StateKeys {
        #[prost(bytes = "bytes", repeated, tag = "1")]
        pub keys: Vec<bytes::Bytes>,
    }

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "14")]
        Value(StateKeys),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GetStateKeysEntryMessage {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(oneof = "get_state_keys_entry_message::Result", tags = "14, 15")]
    pub result: Option<get_state_keys_entry_message::Result>,
}

// --- Promises

pub mod get_promise_entry_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(bytes, tag = "14")]
        Value(Bytes),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct GetPromiseEntryMessage {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(oneof = "get_promise_entry_message::Result", tags = "14, 15")]
    pub result: Option<get_promise_entry_message::Result>,
}

pub mod peek_promise_entry_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "13")]
        Empty(super::Empty),
        #[prost(bytes, tag = "14")]
        Value(Bytes),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct PeekPromiseEntryMessage {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(oneof = "peek_promise_entry_message::Result", tags = "13, 14, 15")]
    pub result: Option<peek_promise_entry_message::Result>,
}

pub mod complete_promise_entry_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Completion {
        #[prost(bytes, tag = "2")]
        CompletionValue(Bytes),
        #[prost(message, tag = "3")]
        CompletionFailure(super::Failure),
    }

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "13")]
        Empty(super::Empty),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct CompletePromiseEntryMessage {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(oneof = "complete_promise_entry_message::Completion", tags = "2, 3")]
    pub completion: Option<complete_promise_entry_message::Completion>,
    #[prost(string, tag = "4")]
    pub name: String,
    #[prost(oneof = "complete_promise_entry_message::Result", tags = "13, 15")]
    pub result: Option<complete_promise_entry_message::Result>,
}

// --- Sleep / Call / Awakeable / Run

pub mod sleep_entry_message {
    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "13")]
        Empty(super::Empty),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct SleepEntryMessage {
    #[prost(uint64, tag = "1")]
    pub wake_up_time: u64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(oneof = "sleep_entry_message::Result", tags = "13, 15")]
    pub result: Option<sleep_entry_message::Result>,
}

pub mod call_entry_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(bytes, tag = "14")]
        Value(Bytes),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct CallEntryMessage {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(string, tag = "2")]
    pub handler_name: String,
    #[prost(bytes = "bytes", tag = "3")]
    pub parameter: Bytes,
    #[prost(message, repeated, tag = "4")]
    pub headers: Vec<Header>,
    #[prost(string, tag = "5")]
    pub key: String,
    #[prost(string, tag = "6")]
    pub name: String,
    #[prost(oneof = "call_entry_message::Result", tags = "14, 15")]
    pub result: Option<call_entry_message::Result>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct OneWayCallEntryMessage {
    #[prost(string, tag = "1")]
    pub service_name: String,
    #[prost(string, tag = "2")]
    pub handler_name: String,
    #[prost(bytes = "bytes", tag = "3")]
    pub parameter: Bytes,
    #[prost(uint64, tag = "4")]
    pub invoke_time: u64,
    #[prost(message, repeated, tag = "5")]
    pub headers: Vec<Header>,
    #[prost(string, tag = "6")]
    pub key: String,
    #[prost(string, tag = "7")]
    pub name: String,
}

pub mod awakeable_entry_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(bytes, tag = "14")]
        Value(Bytes),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct AwakeableEntryMessage {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(oneof = "awakeable_entry_message::Result", tags = "14, 15")]
    pub result: Option<awakeable_entry_message::Result>,
}

pub mod complete_awakeable_entry_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(bytes, tag = "14")]
        Value(Bytes),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct CompleteAwakeableEntryMessage {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(oneof = "complete_awakeable_entry_message::Result", tags = "14, 15")]
    pub result: Option<complete_awakeable_entry_message::Result>,
}

pub mod run_entry_message {
    use bytes::Bytes;

    #[derive(Clone, PartialEq, Eq, prost::Oneof)]
    pub enum Result {
        #[prost(bytes, tag = "14")]
        Value(Bytes),
        #[prost(message, tag = "15")]
        Failure(super::Failure),
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct RunEntryMessage {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(oneof = "run_entry_message::Result", tags = "14, 15")]
    pub result: Option<run_entry_message::Result>,
}

impl From<run_entry_message::Result> for NonEmptyValue {
    fn from(r: run_entry_message::Result) -> Self {
        match r {
            run_entry_message::Result::Value(b) => NonEmptyValue::Value(b),
            run_entry_message::Result::Failure(f) => NonEmptyValue::Failure(f.into()),
        }
    }
}

impl From<NonEmptyValue> for run_entry_message::Result {
    fn from(v: NonEmptyValue) -> Self {
        match v {
            NonEmptyValue::Value(b) => run_entry_message::Result::Value(b),
            NonEmptyValue::Failure(f) => run_entry_message::Result::Failure(f.into()),
        }
    }
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct CombinatorEntryMessage {
    #[prost(uint32, repeated, tag = "1")]
    pub completed_entries_order: Vec<u32>,
}

// --- Trait machinery: every outbound/inbound message knows its own type tag,
// how to build a header for itself, and (for entries) how to compare itself
// against a replayed entry ("journal match").

pub trait RestateMessage: prost::Message + Default + Clone + PartialEq {
    fn ty() -> MessageType;
}

pub trait WriteableRestateMessage: RestateMessage {
    fn generate_header(&self) -> MessageHeader;
}

/// Structural-equality check used during replay: compares only the fields
/// that were present when the entry was first created, ignoring
/// runtime-filled result fields.
pub trait EntryMessageHeaderEq {
    fn header_eq(&self, other: &Self) -> bool;
}

macro_rules! impl_message {
    ($ty:ident, $msg_ty:expr) => {
        impl RestateMessage for $ty {
            fn ty() -> MessageType {
                $msg_ty
            }
        }

        impl WriteableRestateMessage for $ty {
            fn generate_header(&self) -> MessageHeader {
                MessageHeader::new(Self::ty(), self.encoded_len() as u32)
            }
        }
    };
}

macro_rules! impl_completable_entry_message {
    ($ty:ident, $msg_ty:expr, $result_field:ident) => {
        impl RestateMessage for $ty {
            fn ty() -> MessageType {
                $msg_ty
            }
        }

        impl WriteableRestateMessage for $ty {
            fn generate_header(&self) -> MessageHeader {
                MessageHeader::new_entry_header(
                    Self::ty(),
                    self.$result_field.is_some(),
                    self.encoded_len() as u32,
                )
            }
        }
    };
}

impl_message!(StartMessage, MessageType::Start);
impl_message!(CompletionMessage, MessageType::Completion);
impl_message!(SuspensionMessage, MessageType::Suspension);
impl_message!(ErrorMessage, MessageType::Error);
impl_message!(EntryAckMessage, MessageType::EntryAck);
impl_message!(EndMessage, MessageType::End);

impl_message!(InputEntryMessage, MessageType::InputEntry);
impl_message!(OutputEntryMessage, MessageType::OutputEntry);

impl_completable_entry_message!(GetStateEntryMessage, MessageType::GetStateEntry, result);
impl_message!(SetStateEntryMessage, MessageType::SetStateEntry);
impl_message!(ClearStateEntryMessage, MessageType::ClearStateEntry);
impl_message!(ClearAllStateEntryMessage, MessageType::ClearAllStateEntry);
impl_completable_entry_message!(
    GetStateKeysEntryMessage,
    MessageType::GetStateKeysEntry,
    result
);
impl_completable_entry_message!(GetPromiseEntryMessage, MessageType::GetPromiseEntry, result);
impl_completable_entry_message!(
    PeekPromiseEntryMessage,
    MessageType::PeekPromiseEntry,
    result
);
impl_completable_entry_message!(
    CompletePromiseEntryMessage,
    MessageType::CompletePromiseEntry,
    result
);

impl_completable_entry_message!(SleepEntryMessage, MessageType::SleepEntry, result);
impl_completable_entry_message!(CallEntryMessage, MessageType::CallEntry, result);
impl_message!(OneWayCallEntryMessage, MessageType::OneWayCallEntry);
impl_completable_entry_message!(AwakeableEntryMessage, MessageType::AwakeableEntry, result);
impl_message!(
    CompleteAwakeableEntryMessage,
    MessageType::CompleteAwakeableEntry
);

impl RestateMessage for RunEntryMessage {
    fn ty() -> MessageType {
        MessageType::RunEntry
    }
}

impl WriteableRestateMessage for RunEntryMessage {
    fn generate_header(&self) -> MessageHeader {
        // A RunEntry always carries a result when written (it is only ever
        // emitted once the side effect has executed); it requires an ack
        // from the runtime before its value is considered durable.
        MessageHeader::new_ackable_entry_header(Self::ty(), true, self.encoded_len() as u32)
    }
}

impl RestateMessage for CombinatorEntryMessage {
    fn ty() -> MessageType {
        MessageType::CombinatorEntry
    }
}

impl WriteableRestateMessage for CombinatorEntryMessage {
    fn generate_header(&self) -> MessageHeader {
        MessageHeader::new_ackable_entry_header(Self::ty(), true, self.encoded_len() as u32)
    }
}

// --- header_eq impls: the "structurally essential fields" comparison.

impl EntryMessageHeaderEq for InputEntryMessage {
    fn header_eq(&self, _other: &Self) -> bool {
        true
    }
}

impl EntryMessageHeaderEq for OutputEntryMessage {
    fn header_eq(&self, _other: &Self) -> bool {
        true
    }
}

impl EntryMessageHeaderEq for GetStateEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl EntryMessageHeaderEq for SetStateEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.key == other.key && self.value == other.value
    }
}

impl EntryMessageHeaderEq for ClearStateEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl EntryMessageHeaderEq for ClearAllStateEntryMessage {
    fn header_eq(&self, _other: &Self) -> bool {
        true
    }
}

impl EntryMessageHeaderEq for GetStateKeysEntryMessage {
    fn header_eq(&self, _other: &Self) -> bool {
        true
    }
}

impl EntryMessageHeaderEq for GetPromiseEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl EntryMessageHeaderEq for PeekPromiseEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl EntryMessageHeaderEq for CompletePromiseEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.key == other.key && self.completion == other.completion
    }
}

impl EntryMessageHeaderEq for SleepEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.wake_up_time == other.wake_up_time
    }
}

impl EntryMessageHeaderEq for CallEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.service_name == other.service_name
            && self.handler_name == other.handler_name
            && self.key == other.key
            && self.parameter == other.parameter
            && self.headers == other.headers
    }
}

impl EntryMessageHeaderEq for OneWayCallEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.service_name == other.service_name
            && self.handler_name == other.handler_name
            && self.key == other.key
            && self.parameter == other.parameter
            && self.headers == other.headers
    }
}

impl EntryMessageHeaderEq for AwakeableEntryMessage {
    fn header_eq(&self, _other: &Self) -> bool {
        true
    }
}

impl EntryMessageHeaderEq for CompleteAwakeableEntryMessage {
    fn header_eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl EntryMessageHeaderEq for RunEntryMessage {
    fn header_eq(&self, _other: &Self) -> bool {
        // Side effects are non-deterministic by construction; replay never
        // re-derives the inputs, it only ever reuses the recorded result.
        true
    }
}

impl EntryMessageHeaderEq for CombinatorEntryMessage {
    fn header_eq(&self, _other: &Self) -> bool {
        true
    }
}

// --- Value <-> wire result conversions

impl TryFrom<get_state_entry_message::Result> for Value {
    type Error = TerminalFailure;

    fn try_from(r: get_state_entry_message::Result) -> Result<Self, Self::Error> {
        match r {
            get_state_entry_message::Result::Empty(_) => Ok(Value::Void),
            get_state_entry_message::Result::Value(b) => Ok(Value::Success(b)),
            get_state_entry_message::Result::Failure(f) => Err(f.into()),
        }
    }
}

impl TryFrom<get_state_keys_entry_message::Result> for Value {
    type Error = TerminalFailure;

    fn try_from(r: get_state_keys_entry_message::Result) -> Result<Self, Self::Error> {
        match r {
            get_state_keys_entry_message::Result::Value(mut keys) => {
                let mut decoded: Vec<String> = keys
                    .keys
                    .drain(..)
                    .map(|k| String::from_utf8_lossy(&k).into_owned())
                    .collect();
                decoded.sort();
                Ok(Value::StateKeys(decoded))
            }
            get_state_keys_entry_message::Result::Failure(f) => Err(f.into()),
        }
    }
}

impl TryFrom<sleep_entry_message::Result> for Value {
    type Error = TerminalFailure;

    fn try_from(r: sleep_entry_message::Result) -> Result<Self, Self::Error> {
        match r {
            sleep_entry_message::Result::Empty(_) => Ok(Value::Void),
            sleep_entry_message::Result::Failure(f) => Err(f.into()),
        }
    }
}

impl TryFrom<call_entry_message::Result> for Value {
    type Error = TerminalFailure;

    fn try_from(r: call_entry_message::Result) -> Result<Self, Self::Error> {
        match r {
            call_entry_message::Result::Value(b) => Ok(Value::Success(b)),
            call_entry_message::Result::Failure(f) => Err(f.into()),
        }
    }
}

impl TryFrom<awakeable_entry_message::Result> for Value {
    type Error = TerminalFailure;

    fn try_from(r: awakeable_entry_message::Result) -> Result<Self, Self::Error> {
        match r {
            awakeable_entry_message::Result::Value(b) => Ok(Value::Success(b)),
            awakeable_entry_message::Result::Failure(f) => Err(f.into()),
        }
    }
}

impl TryFrom<get_promise_entry_message::Result> for Value {
    type Error = TerminalFailure;

    fn try_from(r: get_promise_entry_message::Result) -> Result<Self, Self::Error> {
        match r {
            get_promise_entry_message::Result::Value(b) => Ok(Value::Success(b)),
            get_promise_entry_message::Result::Failure(f) => Err(f.into()),
        }
    }
}

impl TryFrom<peek_promise_entry_message::Result> for Value {
    type Error = TerminalFailure;

    fn try_from(r: peek_promise_entry_message::Result) -> Result<Self, Self::Error> {
        match r {
            peek_promise_entry_message::Result::Empty(_) => Ok(Value::Void),
            peek_promise_entry_message::Result::Value(b) => Ok(Value::Success(b)),
            peek_promise_entry_message::Result::Failure(f) => Err(f.into()),
        }
    }
}

/// Tells a pending-completion slot how to interpret the raw
/// `CompletionMessage` payload once it arrives, since the wire result shape
/// differs per entry kind (e.g. `GetStateKeys` carries a `StateKeys` message,
/// everything else carries raw bytes or Empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionParsingHint {
    StateKeys,
    EmptyOrSuccessOrValue,
}

impl CompletionParsingHint {
    pub fn parse(self, result: completion_message::Result) -> Result<Value, TerminalFailure> {
        match (self, result) {
            (_, completion_message::Result::Failure(f)) => Err(f.into()),
            (_, completion_message::Result::Empty(_)) => Ok(Value::Void),
            (CompletionParsingHint::StateKeys, completion_message::Result::Value(b)) => {
                let keys = get_state_keys_entry_message::StateKeys::decode(b)
                    .map(|sk| {
                        let mut decoded: Vec<String> = sk
                            .keys
                            .into_iter()
                            .map(|k| String::from_utf8_lossy(&k).into_owned())
                            .collect();
                        decoded.sort();
                        decoded
                    })
                    .unwrap_or_default();
                Ok(Value::StateKeys(keys))
            }
            (CompletionParsingHint::EmptyOrSuccessOrValue, completion_message::Result::Value(b)) => {
                Ok(Value::Success(b))
            }
        }
    }
}
