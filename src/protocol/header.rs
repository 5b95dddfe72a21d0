use std::fmt;

const CUSTOM_ENTRY_MASK: u16 = 0xFC00;
const DONE_MASK: u64 = 0x0001_0000_0000;
const REQUIRES_ACK_MASK: u64 = 0x8000_0000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown message type {0:#06x}")]
pub struct UnknownMessageType(pub u16);

macro_rules! gen_message_type_enum {
    ($($name:ident = $id:expr),* $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
        pub enum MessageType {
            $($name,)*
        }

        impl MessageType {
            pub fn to_id(self) -> u16 {
                match self {
                    $(MessageType::$name => $id,)*
                }
            }

            pub fn from_id(id: u16) -> Result<Self, UnknownMessageType> {
                match id {
                    $($id => Ok(MessageType::$name),)*
                    other => Err(UnknownMessageType(other)),
                }
            }
        }
    };
}

gen_message_type_enum! {
    Start = 0x0000,
    Completion = 0x0001,
    Suspension = 0x0002,
    Error = 0x0003,
    EntryAck = 0x0004,
    End = 0x0005,

    InputEntry = 0x0400,
    OutputEntry = 0x0401,

    GetStateEntry = 0x0800,
    SetStateEntry = 0x0801,
    ClearStateEntry = 0x0802,
    ClearAllStateEntry = 0x0803,
    GetStateKeysEntry = 0x0804,
    GetPromiseEntry = 0x0808,
    PeekPromiseEntry = 0x0809,
    CompletePromiseEntry = 0x080A,

    SleepEntry = 0x0C00,
    CallEntry = 0x0C01,
    OneWayCallEntry = 0x0C02,
    AwakeableEntry = 0x0C03,
    CompleteAwakeableEntry = 0x0C04,
    RunEntry = 0x0C05,

    CombinatorEntry = 0xFC02,
}

impl MessageType {
    /// Whether this entry kind carries a `DONE` flag signaling an inline result.
    pub fn has_completed_flag(self) -> bool {
        matches!(
            self,
            MessageType::GetStateEntry
                | MessageType::GetStateKeysEntry
                | MessageType::SleepEntry
                | MessageType::CallEntry
                | MessageType::AwakeableEntry
                | MessageType::GetPromiseEntry
                | MessageType::PeekPromiseEntry
                | MessageType::CompletePromiseEntry
        )
    }

    pub fn is_custom_entry(self) -> bool {
        (self.to_id() & CUSTOM_ENTRY_MASK) == CUSTOM_ENTRY_MASK
    }
}

/// Decoded 64-bit message header: type (16 bits) | flags (16 bits) | body length (32 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    ty: MessageType,
    length: u32,
    completed_flag: Option<bool>,
    requires_ack_flag: Option<bool>,
}

impl MessageHeader {
    pub fn new(ty: MessageType, length: u32) -> Self {
        Self {
            ty,
            length,
            completed_flag: None,
            requires_ack_flag: None,
        }
    }

    pub fn new_entry_header(ty: MessageType, completed: bool, length: u32) -> Self {
        Self {
            ty,
            length,
            completed_flag: Some(completed),
            requires_ack_flag: None,
        }
    }

    pub fn new_ackable_entry_header(ty: MessageType, requires_ack: bool, length: u32) -> Self {
        Self {
            ty,
            length,
            completed_flag: None,
            requires_ack_flag: Some(requires_ack),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.ty
    }

    pub fn message_length(&self) -> u32 {
        self.length
    }

    pub fn completed(&self) -> bool {
        self.completed_flag.unwrap_or(false)
    }

    pub fn requires_ack(&self) -> bool {
        self.requires_ack_flag.unwrap_or(false)
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.ty, self.length)
    }
}

impl TryFrom<u64> for MessageHeader {
    type Error = UnknownMessageType;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let ty_id = (value >> 48) as u16;
        let ty = MessageType::from_id(ty_id)?;
        let length = (value & 0xFFFF_FFFF) as u32;

        let completed_flag = ty
            .has_completed_flag()
            .then(|| (value & DONE_MASK) != 0);
        let requires_ack_flag = matches!(ty, MessageType::RunEntry | MessageType::CombinatorEntry)
            .then(|| (value & REQUIRES_ACK_MASK) != 0);

        Ok(Self {
            ty,
            length,
            completed_flag,
            requires_ack_flag,
        })
    }
}

impl From<MessageHeader> for u64 {
    fn from(header: MessageHeader) -> Self {
        let mut value = (header.ty.to_id() as u64) << 48;
        value |= header.length as u64;
        if header.completed_flag.unwrap_or(false) {
            value |= DONE_MASK;
        }
        if header.requires_ack_flag.unwrap_or(false) {
            value |= REQUIRES_ACK_MASK;
        }
        value
    }
}
