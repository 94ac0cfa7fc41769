use std::sync::Weak;

use pcmstream_format::{PcmFormat, SampleReader};
use tracing::warn;

use crate::buffer::StreamShared;

/// Per-handle read cursor over a streaming buffer's sample store.
///
/// The reader does not own the store. It holds a weak reference and checks
/// liveness on every call: once the streaming buffer is dropped the reader
/// reads silence and reports that it has ended.
pub struct StreamReader {
    shared: Weak<StreamShared>,
    format: PcmFormat,
    /// Read offset in interleaved samples.
    offset: usize,
}

impl StreamReader {
    pub(crate) fn new(shared: Weak<StreamShared>, format: PcmFormat) -> Self {
        StreamReader {
            shared,
            format,
            offset: 0,
        }
    }

    /// Read up to `requested` frames into `out` in planar layout.
    ///
    /// The output holds `available` samples of channel 0, then `available`
    /// samples of channel 1, and so on. Everything in `out` after the written
    /// samples, up to `requested` frames, is zeroed. Returns the number of
    /// frames read; zero means no data is available yet (or ever, see
    /// [`StreamReader::has_ended`]).
    pub fn read_block(&mut self, requested: usize, out: &mut [f32]) -> usize {
        let channels = self.channels();
        let requested = requested.min(out.len() / channels);
        let block = &mut out[..requested * channels];

        let available = self.fill_block(requested, block);
        block[available * channels..].fill(0.0);
        self.offset += available * channels;
        available
    }

    fn fill_block(&self, requested: usize, block: &mut [f32]) -> usize {
        let Some(shared) = self.shared.upgrade() else {
            return 0;
        };

        let channels = self.channels();
        let horizon = shared.horizon();
        let available = (horizon.saturating_sub(self.offset) / channels).min(requested);
        if available == 0 {
            return 0;
        }

        let store = match shared.store.read() {
            Ok(store) => store,
            Err(e) => {
                warn!("Sample store lock poisoned, reading silence: {}", e);
                return 0;
            }
        };

        let width = self.format.sample_width();
        let raw = store.read_raw(self.offset * width, available * channels * width);
        let mut samples = SampleReader::new(raw, self.format.encoding);

        if channels == 1 {
            for sample in &mut block[..available] {
                *sample = samples.read_sample().unwrap_or(0.0);
            }
        } else {
            for frame in 0..available {
                for ch in 0..channels {
                    block[ch * available + frame] = samples.read_sample().unwrap_or(0.0);
                }
            }
        }

        available
    }

    /// Seek by reading and discarding audio, returning the position reached.
    ///
    /// Seeking backwards rewinds to the start and reads forward again.
    /// The position stops at the decoded horizon if `seconds` lies beyond it.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn seek(&mut self, seconds: f64, scratch: &mut [f32]) -> f64 {
        let seconds = seconds.max(0.0);
        if seconds < self.position() {
            self.rewind();
        }

        let channels = self.channels();
        let frames_per_pass = scratch.len() / channels;
        if frames_per_pass == 0 {
            return self.position();
        }

        let target = (seconds * f64::from(self.format.sample_rate)) as usize;
        let mut frame = self.offset / channels;
        while frame < target {
            let read = self.read_block((target - frame).min(frames_per_pass), scratch);
            if read == 0 {
                break;
            }
            frame += read;
        }

        self.position()
    }

    /// Move back to the first sample.
    pub fn rewind(&mut self) {
        self.offset = 0;
    }

    /// True once every decoded sample was read and no more will arrive.
    #[must_use]
    pub fn has_ended(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => self.offset >= shared.horizon() && shared.is_ended(),
            None => true,
        }
    }

    /// Seconds of audio this reader has consumed.
    #[must_use]
    pub fn position(&self) -> f64 {
        self.format.duration_of(self.offset)
    }

    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        usize::from(self.format.channels)
    }

    #[must_use]
    pub fn format(&self) -> &PcmFormat {
        &self.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pcmstream_format::{encode_samples, SampleEncoding};

    use crate::buffer::StreamingBuffer;
    use crate::config::StreamConfig;
    use crate::engine::VirtualEngine;

    fn float_stream(channels: u16, samples: &[f32]) -> StreamingBuffer {
        let config = StreamConfig::new(PcmFormat::new(4, channels, SampleEncoding::Float32));
        let mut stream =
            StreamingBuffer::configure(config, Arc::new(VirtualEngine::new(2)), None).unwrap();
        stream
            .push_data_forced(&encode_samples(samples, SampleEncoding::Float32))
            .unwrap();
        stream
    }

    #[test]
    fn test_mono_block_is_contiguous() {
        let stream = float_stream(1, &[0.1, 0.2, 0.3]);
        let mut reader = stream.reader();
        let mut out = [9.0f32; 2];

        assert_eq!(reader.read_block(2, &mut out), 2);
        assert_eq!(out, [0.1, 0.2]);
        assert_eq!(reader.offset(), 2);
    }

    #[test]
    fn test_stereo_block_is_planar() {
        let stream = float_stream(2, &[0.1, -0.1, 0.2, -0.2]);
        let mut reader = stream.reader();
        let mut out = [0.0f32; 4];

        assert_eq!(reader.read_block(2, &mut out), 2);
        assert_eq!(out, [0.1, 0.2, -0.1, -0.2]);
        assert_eq!(reader.offset(), 4);
    }

    #[test]
    fn test_partial_block_zero_fills_tail() {
        let stream = float_stream(2, &[0.5, 0.6]);
        let mut reader = stream.reader();
        let mut out = [7.0f32; 8];

        assert_eq!(reader.read_block(3, &mut out), 1);
        assert_eq!(out[..6], [0.5, 0.6, 0.0, 0.0, 0.0, 0.0]);
        // Outside the requested block
        assert_eq!(out[6..], [7.0, 7.0]);
    }

    #[test]
    fn test_empty_stream_reads_silence() {
        let stream = float_stream(1, &[]);
        let mut reader = stream.reader();
        let mut out = [1.0f32; 4];

        assert_eq!(reader.read_block(4, &mut out), 0);
        assert_eq!(out, [0.0; 4]);
        assert!(!reader.has_ended());
    }

    #[test]
    fn test_has_ended_after_draining_ended_stream() {
        let mut stream = float_stream(1, &[0.1, 0.2]);
        let mut reader = stream.reader();
        let mut out = [0.0f32; 4];

        reader.read_block(4, &mut out);
        assert!(!reader.has_ended());

        stream.mark_ended().unwrap();
        assert!(reader.has_ended());

        reader.rewind();
        assert!(!reader.has_ended());
        assert_eq!(reader.offset(), 0);
    }

    #[test]
    fn test_reader_outliving_stream_reports_end() {
        let stream = float_stream(1, &[0.1, 0.2]);
        let mut reader = stream.reader();
        drop(stream);

        let mut out = [1.0f32; 2];
        assert_eq!(reader.read_block(2, &mut out), 0);
        assert_eq!(out, [0.0, 0.0]);
        assert!(reader.has_ended());
    }

    #[test]
    fn test_seek_forward_and_backward() {
        let samples: Vec<f32> = (0..8).map(|i| i as f32 / 10.0).collect();
        let stream = float_stream(1, &samples);
        let mut reader = stream.reader();
        let mut scratch = [0.0f32; 3];

        // 4 Hz stream: one second is four samples
        assert!((reader.seek(1.0, &mut scratch) - 1.0).abs() < 1e-9);
        assert_eq!(reader.offset(), 4);

        assert!((reader.seek(0.5, &mut scratch) - 0.5).abs() < 1e-9);
        assert_eq!(reader.offset(), 2);

        let mut out = [0.0f32; 1];
        reader.read_block(1, &mut out);
        assert_eq!(out, [0.2]);
    }

    #[test]
    fn test_seek_stops_at_horizon() {
        let stream = float_stream(1, &[0.0; 6]);
        let mut reader = stream.reader();
        let mut scratch = [0.0f32; 4];

        assert!((reader.seek(10.0, &mut scratch) - 1.5).abs() < 1e-9);
        assert_eq!(reader.offset(), 6);
    }
}
