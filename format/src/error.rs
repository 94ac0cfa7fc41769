use std::fmt;

/// PCM format validation and sample decoding errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    InvalidRate(u32),
    InvalidChannels(u16),
    WidthMismatch { encoding: &'static str, expected: u16, got: u16 },
    UnknownEncoding(u8),
    TooShort { expected: usize, got: usize },
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidRate(rate) => {
                write!(f, "invalid sample rate: {}", rate)
            }
            FormatError::InvalidChannels(channels) => {
                write!(f, "invalid channel count: {}", channels)
            }
            FormatError::WidthMismatch { encoding, expected, got } => {
                write!(
                    f,
                    "{} samples are {} bytes wide, got bytes_per_sample={}",
                    encoding, expected, got
                )
            }
            FormatError::UnknownEncoding(tag) => {
                write!(f, "unknown sample encoding tag: 0x{:02x}", tag)
            }
            FormatError::TooShort { expected, got } => {
                write!(f, "sample data too short: expected at least {} bytes, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for FormatError {}
