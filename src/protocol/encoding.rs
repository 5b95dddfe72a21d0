use std::mem;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use bytes_utils::SegmentedBuf;
use prost::Message;

use super::header::{MessageHeader, MessageType, UnknownMessageType};
use super::messages::{RestateMessage, WriteableRestateMessage};
use super::version::Version;

#[derive(Debug, thiserror::Error)]
pub enum DecodingError {
    #[error("cannot decode protocol message type {0:?}: {1}")]
    DecodeMessage(MessageType, #[source] prost::DecodeError),
    #[error("expected message of type {expected:?}, got {actual:?}")]
    UnexpectedMessageType {
        expected: MessageType,
        actual: MessageType,
    },
    #[error(transparent)]
    UnknownMessageType(#[from] UnknownMessageType),
}

/// Encodes typed protocol messages to their framed wire representation.
pub struct Encoder {}

impl Encoder {
    pub fn new(version: Version) -> Self {
        assert!(
            version >= Version::minimum_supported_version(),
            "Encoder only supports protocol version {:?} <= x <= {:?}",
            Version::minimum_supported_version(),
            Version::maximum_supported_version()
        );
        Self {}
    }

    /// Includes the 8-byte header.
    pub fn encoded_len<M: RestateMessage>(&self, msg: &M) -> usize {
        8 + msg.encoded_len()
    }

    pub fn encode<M: WriteableRestateMessage>(&self, msg: &M) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len(msg));
        self.encode_to_buf_mut(&mut buf, msg)
            .expect("encoding a message into a buffer sized from its own encoded_len is infallible");
        buf.freeze()
    }

    pub fn encode_to_buf_mut<M: WriteableRestateMessage>(
        &self,
        mut buf: impl BufMut,
        msg: &M,
    ) -> Result<(), prost::EncodeError> {
        let header = msg.generate_header();
        buf.put_u64(header.into());
        msg.encode(&mut buf)
    }
}

/// A decoded-but-not-yet-interpreted message: header plus raw body bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage(MessageHeader, Bytes);

impl RawMessage {
    pub fn header(&self) -> MessageHeader {
        self.0
    }

    pub fn ty(&self) -> MessageType {
        self.0.message_type()
    }

    pub fn decode_to<M: RestateMessage>(self) -> Result<M, DecodingError> {
        if self.0.message_type() != M::ty() {
            return Err(DecodingError::UnexpectedMessageType {
                expected: M::ty(),
                actual: self.0.message_type(),
            });
        }
        M::decode(self.1).map_err(|e| DecodingError::DecodeMessage(self.0.message_type(), e))
    }
}

/// Stateful, incremental frame decoder over a (possibly chunked) byte stream.
pub struct Decoder {
    buf: SegmentedBuf<Bytes>,
    state: DecoderState,
}

impl Decoder {
    pub fn new(version: Version) -> Self {
        assert!(
            version >= Version::minimum_supported_version(),
            "Decoder only supports protocol version {:?} <= x <= {:?}",
            Version::minimum_supported_version(),
            Version::maximum_supported_version()
        );
        Self {
            buf: SegmentedBuf::new(),
            state: DecoderState::WaitingHeader,
        }
    }

    /// Appends a newly received chunk to the internal buffer.
    pub fn push(&mut self, buf: Bytes) {
        self.buf.push(buf)
    }

    /// Attempts to decode the next framed message; returns `None` if more
    /// bytes are needed.
    pub fn consume_next(&mut self) -> Result<Option<RawMessage>, DecodingError> {
        loop {
            if self.buf.remaining() < self.state.needs_bytes() {
                return Ok(None);
            }

            if let Some(res) = self.state.decode(&mut self.buf)? {
                return Ok(Some(res));
            }
        }
    }
}

#[derive(Default)]
enum DecoderState {
    #[default]
    WaitingHeader,
    WaitingPayload(MessageHeader),
}

impl DecoderState {
    fn needs_bytes(&self) -> usize {
        match self {
            DecoderState::WaitingHeader => 8,
            DecoderState::WaitingPayload(h) => h.message_length() as usize,
        }
    }

    fn decode(&mut self, mut buf: impl Buf) -> Result<Option<RawMessage>, DecodingError> {
        let mut res = None;

        *self = match mem::take(self) {
            DecoderState::WaitingHeader => {
                let header: MessageHeader = buf.get_u64().try_into()?;
                DecoderState::WaitingPayload(header)
            }
            DecoderState::WaitingPayload(h) => {
                let msg = RawMessage(h, buf.copy_to_bytes(h.message_length() as usize));
                res = Some(msg);
                DecoderState::WaitingHeader
            }
        };

        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages;

    #[test]
    fn fill_decoder_with_several_messages() {
        let encoder = Encoder::new(Version::maximum_supported_version());
        let mut decoder = Decoder::new(Version::maximum_supported_version());

        let expected_msg_0 = messages::StartMessage {
            id: Bytes::from_static(b"key"),
            debug_id: "key".into(),
            known_entries: 1,
            state_map: vec![],
            partial_state: true,
            key: "key".to_string(),
            retry_count_since_last_stored_entry: 0,
            duration_since_last_stored_entry: 0,
            random_seed: 0,
        };
        let expected_msg_1 = messages::InputEntryMessage {
            headers: vec![],
            value: Bytes::from_static(b"input"),
            name: String::new(),
        };

        decoder.push(encoder.encode(&expected_msg_0));
        decoder.push(encoder.encode(&expected_msg_1));

        let actual_msg_0 = decoder.consume_next().unwrap().unwrap();
        assert_eq!(actual_msg_0.ty(), MessageType::Start);
        assert_eq!(
            actual_msg_0.decode_to::<messages::StartMessage>().unwrap(),
            expected_msg_0
        );

        let actual_msg_1 = decoder.consume_next().unwrap().unwrap();
        assert_eq!(actual_msg_1.ty(), MessageType::InputEntry);
        assert_eq!(
            actual_msg_1
                .decode_to::<messages::InputEntryMessage>()
                .unwrap(),
            expected_msg_1
        );

        assert!(decoder.consume_next().unwrap().is_none());
    }

    #[test]
    fn fill_decoder_with_partial_header() {
        partial_decoding_test(4)
    }

    #[test]
    fn fill_decoder_with_partial_body() {
        partial_decoding_test(10)
    }

    fn partial_decoding_test(split_index: usize) {
        let encoder = Encoder::new(Version::maximum_supported_version());
        let mut decoder = Decoder::new(Version::maximum_supported_version());

        let expected_msg = messages::InputEntryMessage {
            headers: vec![],
            value: Bytes::from_static(b"input"),
            name: String::new(),
        };
        let encoded = encoder.encode(&expected_msg);

        decoder.push(encoded.slice(0..split_index));
        assert!(decoder.consume_next().unwrap().is_none());

        decoder.push(encoded.slice(split_index..));
        let actual = decoder.consume_next().unwrap().unwrap();
        assert_eq!(
            actual.decode_to::<messages::InputEntryMessage>().unwrap(),
            expected_msg
        );
        assert!(decoder.consume_next().unwrap().is_none());
    }
}
