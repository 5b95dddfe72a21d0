pub mod encoding;
pub mod header;
pub mod messages;
pub mod version;

pub use encoding::{Decoder, DecodingError, Encoder, RawMessage};
pub use header::{MessageHeader, MessageType, UnknownMessageType};
pub use version::Version;
