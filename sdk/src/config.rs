//! Configuration constants and per-stream settings.

use std::time::Duration;

use pcmstream_format::PcmFormat;

/// Staged bytes needed before the decode stage runs.
pub const LOW_WATER_MARK_BYTES: usize = 2 * 1024;

/// Default sample store capacity in bytes.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default audio that must accumulate past a starvation point before resuming.
pub const DEFAULT_PRE_BUFFER_SECONDS: f64 = 2.0;

/// Largest Opus frame per channel: 120 ms at 48 kHz.
pub const OPUS_MAX_FRAME_SAMPLES: usize = 5760;

/// Sample rates libopus can decode to.
pub const OPUS_SAMPLE_RATES: [u32; 5] = [8000, 12000, 16000, 24000, 48000];

/// Settings fixed when a streaming buffer is configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamConfig {
    pub format: PcmFormat,
    pub max_buffer_size: usize,
    pub pre_buffer: Duration,
}

impl StreamConfig {
    #[must_use]
    pub fn new(format: PcmFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    #[must_use]
    pub fn with_pre_buffer(mut self, pre_buffer: Duration) -> Self {
        self.pre_buffer = pre_buffer;
        self
    }

    /// Pre-buffer target in seconds.
    #[must_use]
    pub fn pre_buffer_seconds(&self) -> f64 {
        self.pre_buffer.as_secs_f64()
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            format: PcmFormat::default(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            pre_buffer: Duration::from_secs_f64(DEFAULT_PRE_BUFFER_SECONDS),
        }
    }
}
