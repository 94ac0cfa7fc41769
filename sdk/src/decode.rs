use std::borrow::Cow;

use opus::Channels;
use pcmstream_format::{encode_samples, PcmFormat, SampleEncoding};
use tracing::debug;

use crate::config::{OPUS_MAX_FRAME_SAMPLES, OPUS_SAMPLE_RATES};
use crate::error::StreamError;
use crate::staging::StagingQueue;

/// Output of one decode pass over the staging queue.
pub struct Decoded<'a> {
    /// Length of the staged prefix this pass used up.
    pub consumed: usize,
    /// Frame-aligned PCM ready for the sample store.
    pub pcm: Cow<'a, [u8]>,
    /// Set when a packet could not be decoded. `consumed` then ends just
    /// past that packet and `pcm` holds the packets before it.
    pub failure: Option<StreamError>,
}

/// Turns staged bytes into storable PCM.
pub enum DecodeStage {
    Pcm { frame_size: usize },
    Opus(OpusStage),
}

impl DecodeStage {
    pub fn for_format(format: &PcmFormat) -> Result<Self, StreamError> {
        match format.encoding {
            SampleEncoding::Opus => Ok(DecodeStage::Opus(OpusStage::new(format)?)),
            _ => Ok(DecodeStage::Pcm {
                frame_size: format.frame_size(),
            }),
        }
    }

    /// Decode what is staged.
    ///
    /// PCM forwards the longest frame-aligned prefix and leaves the tail
    /// staged. Opus decodes staged packets in order and stops at the first
    /// one that fails, keeping the output of the packets before it.
    pub fn decode<'a>(&mut self, staged: &'a StagingQueue) -> Decoded<'a> {
        match self {
            DecodeStage::Pcm { frame_size } => {
                let bytes = staged.as_bytes();
                let aligned = bytes.len() - bytes.len() % *frame_size;
                Decoded {
                    consumed: aligned,
                    pcm: Cow::Borrowed(&bytes[..aligned]),
                    failure: None,
                }
            }
            DecodeStage::Opus(stage) => stage.decode_packets(staged.packets()),
        }
    }
}

/// Opus packet decoder producing little-endian `f32` PCM.
pub struct OpusStage {
    decoder: opus::Decoder,
    channels: usize,
    pcm_out: Vec<f32>,
}

impl OpusStage {
    pub fn new(format: &PcmFormat) -> Result<Self, StreamError> {
        let channels = match format.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            other => {
                return Err(StreamError::OpusDecoderInitFailed(format!(
                    "unsupported channel count {}",
                    other
                )))
            }
        };

        if !OPUS_SAMPLE_RATES.contains(&format.sample_rate) {
            return Err(StreamError::OpusDecoderInitFailed(format!(
                "unsupported sample rate {} Hz",
                format.sample_rate
            )));
        }

        let decoder = opus::Decoder::new(format.sample_rate, channels)
            .map_err(|e| StreamError::OpusDecoderInitFailed(e.to_string()))?;

        let channels = usize::from(format.channels);
        Ok(OpusStage {
            decoder,
            channels,
            pcm_out: vec![0.0f32; OPUS_MAX_FRAME_SAMPLES * channels],
        })
    }

    /// Decode packets in order. Zero decoded samples is not an error.
    pub fn decode_packets<'p>(
        &mut self,
        packets: impl Iterator<Item = &'p [u8]>,
    ) -> Decoded<'static> {
        let mut samples = Vec::new();
        let mut consumed = 0;
        let mut failure = None;

        for packet in packets {
            consumed += packet.len();

            match self.decoder.decode_float(packet, &mut self.pcm_out, false) {
                Ok(decoded) => {
                    debug!("Decoded {} bytes to {} samples per channel", packet.len(), decoded);
                    samples.extend_from_slice(&self.pcm_out[..decoded * self.channels]);
                }
                Err(e) => {
                    failure = Some(StreamError::OpusDecodeFailed(e.to_string()));
                    break;
                }
            }
        }

        Decoded {
            consumed,
            pcm: Cow::Owned(encode_samples(&samples, SampleEncoding::Float32)),
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(pushes: &[&[u8]]) -> StagingQueue {
        let mut staging = StagingQueue::new();
        for push in pushes {
            staging.push(push);
        }
        staging
    }

    #[test]
    fn test_pcm_stage_leaves_alignment_tail() {
        let format = PcmFormat::new(8000, 2, SampleEncoding::S16Le);
        let mut stage = DecodeStage::for_format(&format).unwrap();
        let staging = staged(&[&[0u8; 10]]);

        let decoded = stage.decode(&staging);
        assert_eq!(decoded.consumed, 8);
        assert_eq!(decoded.pcm.len(), 8);
    }

    #[test]
    fn test_pcm_stage_below_one_frame_yields_nothing() {
        let format = PcmFormat::new(8000, 1, SampleEncoding::S32Le);
        let mut stage = DecodeStage::for_format(&format).unwrap();
        let staging = staged(&[&[1, 2, 3]]);

        let decoded = stage.decode(&staging);
        assert_eq!(decoded.consumed, 0);
        assert!(decoded.pcm.is_empty());
    }

    #[test]
    fn test_opus_stage_rejects_unsupported_channels() {
        let format = PcmFormat::new(48000, 6, SampleEncoding::Opus);
        assert!(matches!(
            DecodeStage::for_format(&format),
            Err(StreamError::OpusDecoderInitFailed(_))
        ));
    }

    #[test]
    fn test_opus_stage_rejects_unsupported_rate() {
        let format = PcmFormat::new(44100, 2, SampleEncoding::Opus);
        assert!(matches!(
            DecodeStage::for_format(&format),
            Err(StreamError::OpusDecoderInitFailed(_))
        ));
    }

    #[test]
    fn test_opus_stage_decodes_encoded_silence() {
        let mut encoder =
            opus::Encoder::new(48000, Channels::Mono, opus::Application::Audio).unwrap();
        let mut packet = vec![0u8; 4000];
        let len = encoder.encode_float(&[0.0f32; 960], &mut packet).unwrap();
        packet.truncate(len);

        let format = PcmFormat::new(48000, 1, SampleEncoding::Opus);
        let mut stage = DecodeStage::for_format(&format).unwrap();
        let staging = staged(&[&packet, &packet]);

        let decoded = stage.decode(&staging);
        assert_eq!(decoded.consumed, staging.len());
        assert_eq!(decoded.pcm.len(), 2 * 960 * 4);
        assert!(decoded.failure.is_none());
    }

    #[test]
    fn test_opus_stage_reports_malformed_packet() {
        let format = PcmFormat::new(48000, 2, SampleEncoding::Opus);
        let mut stage = DecodeStage::for_format(&format).unwrap();
        let staging = staged(&[&[0xff, 0xff, 0xff]]);

        let decoded = stage.decode(&staging);
        assert!(matches!(decoded.failure, Some(StreamError::OpusDecodeFailed(_))));
        assert_eq!(decoded.consumed, 3);
        assert!(decoded.pcm.is_empty());
    }

    #[test]
    fn test_opus_failure_keeps_earlier_packets_and_later_stay_staged() {
        let mut encoder =
            opus::Encoder::new(48000, Channels::Mono, opus::Application::Audio).unwrap();
        let mut packet = vec![0u8; 4000];
        let len = encoder.encode_float(&[0.0f32; 960], &mut packet).unwrap();
        packet.truncate(len);

        let format = PcmFormat::new(48000, 1, SampleEncoding::Opus);
        let mut stage = DecodeStage::for_format(&format).unwrap();
        let staging = staged(&[&packet, &packet, &[0xff, 0xff, 0xff], &packet]);

        let decoded = stage.decode(&staging);
        assert!(matches!(decoded.failure, Some(StreamError::OpusDecodeFailed(_))));
        assert_eq!(decoded.pcm.len(), 2 * 960 * 4);
        assert_eq!(decoded.consumed, 2 * packet.len() + 3);
    }
}
