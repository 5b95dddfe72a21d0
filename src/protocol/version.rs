use std::fmt;

/// Wire protocol version negotiated via the `content-type` header at Start.
///
/// `V2` adds the entry-retry accounting fields on `StartMessage`/`ErrorMessage`
/// (retry count and duration since the last durably stored entry), used to
/// seed retry-info inference across re-invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    V1,
    V2,
}

impl Version {
    pub const fn minimum_supported_version() -> Self {
        Version::V1
    }

    pub const fn maximum_supported_version() -> Self {
        Version::V2
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Version::V1 => "application/vnd.engine.invocation.v1",
            Version::V2 => "application/vnd.engine.invocation.v2",
        }
    }

    pub fn choose_from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/vnd.engine.invocation.v1" => Some(Version::V1),
            "application/vnd.engine.invocation.v2" => Some(Version::V2),
            _ => None,
        }
    }

    pub fn supports_entry_retry_info(&self) -> bool {
        *self >= Version::V2
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.content_type())
    }
}
