use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use pcmstream_format::PcmFormat;
use tracing::{debug, info, warn};

use crate::config::{StreamConfig, LOW_WATER_MARK_BYTES};
use crate::decode::DecodeStage;
use crate::engine::{Handle, PlaybackEngine};
use crate::error::StreamError;
use crate::policy::{BufferingEvent, BufferingPolicy};
use crate::reader::StreamReader;
use crate::staging::StagingQueue;
use crate::store::SampleStore;

/// Called synchronously from the flush path, once per handle transition.
pub type BufferingCallback = Box<dyn Fn(BufferingEvent) + Send + Sync>;

/// State shared between the single writer and every reader of a stream.
pub(crate) struct StreamShared {
    pub(crate) store: RwLock<SampleStore>,
    horizon: AtomicUsize,
    ended: AtomicBool,
}

impl StreamShared {
    /// Decoded samples readers may consume.
    #[inline]
    pub(crate) fn horizon(&self) -> usize {
        self.horizon.load(Ordering::Acquire)
    }

    /// Publish a new horizon. Must follow the store write it covers.
    #[inline]
    fn publish(&self, samples: usize) {
        self.horizon.store(samples, Ordering::Release);
    }

    fn append(&self, pcm: &[u8]) -> Result<usize, StreamError> {
        let mut store = self
            .store
            .write()
            .map_err(|e| StreamError::LockPoisoned(e.to_string()))?;
        Ok(store.append(pcm))
    }

    #[inline]
    pub(crate) fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    #[inline]
    fn set_ended(&self) {
        self.ended.store(true, Ordering::Release);
    }
}

/// Ingests pushed PCM or Opus data and serves it to playback handles.
///
/// Small pushes are staged until more than [`LOW_WATER_MARK_BYTES`] are
/// waiting, then decoded and appended to the sample store. After every
/// append the buffering policy runs over the attached handles, pausing
/// those that caught up with the data and resuming them once the
/// configured pre-buffer has accumulated.
///
/// All mutating calls take `&mut self`: a stream has exactly one writer.
pub struct StreamingBuffer {
    config: StreamConfig,
    shared: Arc<StreamShared>,
    staging: StagingQueue,
    decoder: DecodeStage,
    decoded_samples: usize,
    policy: BufferingPolicy,
    engine: Arc<dyn PlaybackEngine>,
    on_buffering: Option<BufferingCallback>,
}

impl StreamingBuffer {
    /// Set up a stream. Fails if the format is invalid or the Opus decoder cannot be created.
    pub fn configure(
        config: StreamConfig,
        engine: Arc<dyn PlaybackEngine>,
        on_buffering: Option<BufferingCallback>,
    ) -> Result<Self, StreamError> {
        let format = config.format;
        format.validate()?;
        let decoder = DecodeStage::for_format(&format)?;

        let store = SampleStore::new(
            format.sample_width(),
            usize::from(format.channels),
            config.max_buffer_size,
        );

        info!(
            "Configured stream: {} Hz, {} channels, {:?}, capacity {} bytes, pre-buffer {:.3}s",
            format.sample_rate,
            format.channels,
            format.encoding,
            config.max_buffer_size,
            config.pre_buffer_seconds()
        );

        Ok(StreamingBuffer {
            config,
            shared: Arc::new(StreamShared {
                store: RwLock::new(store),
                horizon: AtomicUsize::new(0),
                ended: AtomicBool::new(false),
            }),
            staging: StagingQueue::new(),
            decoder,
            decoded_samples: 0,
            policy: BufferingPolicy::new(config.pre_buffer_seconds()),
            engine,
            on_buffering,
        })
    }

    /// Push data, decoding it once enough has been staged.
    pub fn push_data(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.ingest(data, false)
    }

    /// Push data and flush the staging queue regardless of the low-water mark.
    pub fn push_data_forced(&mut self, data: &[u8]) -> Result<(), StreamError> {
        self.ingest(data, true)
    }

    fn ingest(&mut self, data: &[u8], force: bool) -> Result<(), StreamError> {
        if self.shared.is_ended() {
            return Err(StreamError::StreamEndedAlready);
        }

        self.staging.push(data);

        if self.staging.len() <= LOW_WATER_MARK_BYTES && !force {
            return Ok(());
        }

        self.flush()
    }

    fn flush(&mut self) -> Result<(), StreamError> {
        if self.staging.is_empty() {
            return Ok(());
        }

        let staged = self.staging.len();
        let (consumed, produced, failure, outcome) = {
            let decoded = self.decoder.decode(&self.staging);
            let outcome = if decoded.pcm.is_empty() {
                Ok(0)
            } else {
                self.shared.append(&decoded.pcm)
            };
            (decoded.consumed, decoded.pcm.len(), decoded.failure, outcome)
        };

        let written = match outcome {
            Ok(written) => written,
            Err(err) => {
                warn!("Dropping {} staged bytes: {}", staged, err);
                self.staging.clear();
                return Err(err);
            }
        };

        self.staging.consume(consumed);
        if let Some(err) = &failure {
            warn!("Dropped undecodable packet ending at byte {}: {}", consumed, err);
        }

        if produced == 0 {
            debug!("Flush of {} staged bytes produced no samples", staged);
            return failure.map_or(Ok(()), Err);
        }

        self.decoded_samples += written / self.config.format.sample_width();
        self.shared.publish(self.decoded_samples);

        debug!(
            "Flushed {} of {} staged bytes: {} decoded, {} stored, horizon {} samples",
            consumed, staged, produced, written, self.decoded_samples
        );

        if written > 0 {
            self.apply_buffering_policy();
        }

        if written < produced {
            warn!(
                "Sample store full ({} bytes), ending stream",
                self.config.max_buffer_size
            );
            self.staging.clear();
            self.end_stream();
            return Err(StreamError::BufferFull);
        }

        failure.map_or(Ok(()), Err)
    }

    fn apply_buffering_policy(&mut self) {
        let buffered = self.current_buffered_duration();
        let events = self.policy.scan(self.engine.as_ref(), buffered);
        self.notify(events);
    }

    fn notify(&self, events: Vec<BufferingEvent>) {
        for event in events {
            debug!(
                "Handle {} buffering: {} at {:.3}s",
                event.handle(),
                event.is_buffering(),
                event.buffered_duration()
            );
            if let Some(callback) = &self.on_buffering {
                callback(event);
            }
        }
    }

    /// Set end-of-stream and release every handle held for buffering.
    fn end_stream(&mut self) {
        self.shared.set_ended();
        let buffered = self.current_buffered_duration();
        let events = self.policy.release(self.engine.as_ref(), buffered);
        self.notify(events);
    }

    /// Flush everything still staged and end the stream.
    ///
    /// The stream is ended even when the final flush fails; the first
    /// error is still returned. An unaligned PCM tail is dropped. Handles
    /// paused for buffering are resumed.
    pub fn mark_ended(&mut self) -> Result<(), StreamError> {
        if self.shared.is_ended() {
            return Ok(());
        }

        let mut result = Ok(());
        while !self.staging.is_empty() && !self.shared.is_ended() {
            let before = self.staging.len();
            if let Err(err) = self.flush() {
                if result.is_ok() {
                    result = Err(err);
                }
            }
            if self.staging.len() == before {
                break;
            }
        }

        if !self.staging.is_empty() {
            warn!("Dropping {} unaligned trailing bytes", self.staging.len());
            self.staging.clear();
        }

        if !self.shared.is_ended() {
            info!(
                "Stream ended with {} samples ({:.3}s)",
                self.decoded_samples,
                self.current_buffered_duration()
            );
            self.end_stream();
        }

        result
    }

    /// Seconds of decoded audio available.
    #[must_use]
    pub fn current_buffered_duration(&self) -> f64 {
        self.config.format.duration_of(self.decoded_samples)
    }

    /// True if a reader at `reader_offset` has consumed everything and the stream is ended.
    #[must_use]
    pub fn has_ended(&self, reader_offset: usize) -> bool {
        reader_offset >= self.decoded_samples && self.shared.is_ended()
    }

    /// Register `handle` with the buffering policy and create its reader.
    pub fn attach(&mut self, handle: Handle) -> StreamReader {
        if !self.policy.attach(handle) {
            debug!("Handle {} already attached", handle);
        }
        self.reader()
    }

    pub fn detach(&mut self, handle: Handle) -> bool {
        self.policy.detach(handle)
    }

    /// A reader not watched by the buffering policy.
    #[must_use]
    pub fn reader(&self) -> StreamReader {
        StreamReader::new(Arc::downgrade(&self.shared), self.config.format)
    }

    #[must_use]
    pub fn is_buffering(&self, handle: Handle) -> bool {
        self.policy.is_buffering(handle)
    }

    #[must_use]
    pub fn decoded_samples(&self) -> usize {
        self.decoded_samples
    }

    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.shared.is_ended()
    }

    #[must_use]
    pub fn staged_len(&self) -> usize {
        self.staging.len()
    }

    #[must_use]
    pub fn format(&self) -> &PcmFormat {
        &self.config.format
    }

    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

impl Drop for StreamingBuffer {
    fn drop(&mut self) {
        self.shared.set_ended();
        if !self.policy.is_empty() {
            debug!("Detaching {} handles from dropped stream", self.policy.len());
        }
        self.policy.clear();
    }
}
