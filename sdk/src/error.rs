use pcmstream_format::FormatError;
use thiserror::Error;

/// Errors returned by stream ingestion and configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("stream already ended, no more data can be pushed")]
    StreamEndedAlready,

    #[error("failed to create Opus decoder: {0}")]
    OpusDecoderInitFailed(String),

    #[error("failed to decode Opus packet: {0}")]
    OpusDecodeFailed(String),

    #[error("sample buffer is full, stream has been ended")]
    BufferFull,

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("invalid PCM format: {0}")]
    InvalidFormat(#[from] FormatError),

    #[error("lock error: {0}")]
    LockPoisoned(String),
}

impl StreamError {
    /// True for errors after which the stream accepts no more data.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamError::StreamEndedAlready | StreamError::BufferFull)
    }
}
