use crate::pcm::SampleEncoding;

/// Helper for building little-endian PCM payloads from `f32` samples
pub struct SampleWriter {
    buf: Vec<u8>,
    encoding: SampleEncoding,
}

impl SampleWriter {
    #[must_use]
    pub fn new(encoding: SampleEncoding) -> Self {
        Self::with_capacity(encoding, 0)
    }

    #[must_use]
    pub fn with_capacity(encoding: SampleEncoding, samples: usize) -> Self {
        let encoding = encoding.stored();
        Self {
            buf: Vec::with_capacity(samples * encoding.width() as usize),
            encoding,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn write_sample(&mut self, sample: f32) {
        let sample = sample.clamp(-1.0, 1.0);
        match self.encoding {
            SampleEncoding::S8 => self.buf.extend_from_slice(&((sample * 127.0) as i8).to_le_bytes()),
            SampleEncoding::S16Le => self.buf.extend_from_slice(&((sample * 32767.0) as i16).to_le_bytes()),
            SampleEncoding::S32Le => {
                let scaled = f64::from(sample) * f64::from(i32::MAX);
                self.buf.extend_from_slice(&(scaled as i32).to_le_bytes());
            }
            SampleEncoding::Float32 | SampleEncoding::Opus => self.buf.extend_from_slice(&sample.to_le_bytes()),
        }
    }

    pub fn write_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.write_sample(sample);
        }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

/// Encode `samples` as little-endian bytes of `encoding`.
#[must_use]
pub fn encode_samples(samples: &[f32], encoding: SampleEncoding) -> Vec<u8> {
    let mut writer = SampleWriter::with_capacity(encoding, samples.len());
    writer.write_samples(samples);
    writer.into_vec()
}
