use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown relay mode `{0}`")]
    UnknownMode(String),
    #[error("unknown relay role `{0}`")]
    UnknownRole(String),
}

/// Why a single sampling attempt was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SampleFault {
    #[error("sensor reported fault sentinel")]
    Sentinel,
    #[error("sample {0:.2}C outside plausible range")]
    OutOfRange(f32),
    #[error("samples inconsistent (max deviation {0:.2}C)")]
    Inconsistent(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("temperature read failed after {attempts} attempts: {last}")]
pub struct ReadFailure {
    pub attempts: u8,
    pub last: SampleFault,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network unavailable")]
    Offline,
    #[error("request timed out")]
    Timeout,
    #[error("transport failure: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("storage failure: {0}")]
pub struct StorageError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no bearer token available")]
pub struct Unauthorized;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("device is not registered")]
    NotRegistered,
    #[error(transparent)]
    Network(#[from] TransportError),
    #[error("remote rejected credentials (HTTP {status})")]
    AuthRejected { status: u16 },
    #[error("remote answered HTTP {status}")]
    Rejected { status: u16 },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<Unauthorized> for SyncError {
    fn from(_: Unauthorized) -> Self {
        Self::NotRegistered
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command type `{0}`")]
    UnknownType(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("relay number {0} out of range")]
    RelayOutOfRange(u64),
}
