use crate::error::FormatError;

macro_rules! sample_encodings {
    ($($name:ident = $tag:literal, $width:literal, $label:literal),* $(,)?) => {
        /// How samples are laid out in pushed bytes.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum SampleEncoding { $($name = $tag,)* }

        impl SampleEncoding {
            #[must_use]
            pub const fn as_u8(self) -> u8 { self as u8 }

            /// Width in bytes of one sample of this encoding once decoded.
            #[must_use]
            pub const fn width(self) -> u16 {
                match self { $(Self::$name => $width,)* }
            }

            #[must_use]
            pub const fn label(self) -> &'static str {
                match self { $(Self::$name => $label,)* }
            }
        }

        impl TryFrom<u8> for SampleEncoding {
            type Error = FormatError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($tag => Ok(Self::$name),)*
                    _ => Err(FormatError::UnknownEncoding(value)),
                }
            }
        }
    };
}

sample_encodings! {
    Float32 = 0, 4, "f32",
    S8 = 1, 1, "s8",
    S16Le = 2, 2, "s16le",
    S32Le = 3, 4, "s32le",
    // Decoded to f32 before storage
    Opus = 4, 4, "opus",
}

impl SampleEncoding {
    /// Encoding of the samples as they sit in the sample store.
    #[must_use]
    pub const fn stored(self) -> SampleEncoding {
        match self {
            SampleEncoding::Opus => SampleEncoding::Float32,
            other => other,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_compressed(self) -> bool {
        matches!(self, SampleEncoding::Opus)
    }
}

/// Format of a pushed audio stream. Immutable once a stream is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bytes_per_sample: u16,
    pub encoding: SampleEncoding,
}

impl PcmFormat {
    /// Build a format whose sample width follows the encoding.
    #[must_use]
    pub const fn new(sample_rate: u32, channels: u16, encoding: SampleEncoding) -> Self {
        Self {
            sample_rate,
            channels,
            bytes_per_sample: encoding.width(),
            encoding,
        }
    }

    pub fn validate(&self) -> Result<(), FormatError> {
        if self.sample_rate == 0 {
            return Err(FormatError::InvalidRate(self.sample_rate));
        }
        if self.channels == 0 {
            return Err(FormatError::InvalidChannels(self.channels));
        }
        if self.bytes_per_sample != self.encoding.width() {
            return Err(FormatError::WidthMismatch {
                encoding: self.encoding.label(),
                expected: self.encoding.width(),
                got: self.bytes_per_sample,
            });
        }
        Ok(())
    }

    /// Bytes per stored sample, after any decoding.
    #[inline]
    #[must_use]
    pub const fn sample_width(&self) -> usize {
        self.encoding.stored().width() as usize
    }

    /// Bytes per stored interleaved frame; the alignment unit.
    #[inline]
    #[must_use]
    pub const fn frame_size(&self) -> usize {
        self.sample_width() * self.channels as usize
    }

    /// Playback length in seconds of `samples` interleaved samples.
    #[must_use]
    pub fn duration_of(&self, samples: usize) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        samples as f64 / f64::from(self.channels) / f64::from(self.sample_rate)
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self::new(44100, 2, SampleEncoding::Float32)
    }
}
