use crate::error::FormatError;
use crate::pcm::SampleEncoding;

/// Reads little-endian samples as `f32` with automatic cursor advancement.
pub struct SampleReader<'a> {
    data: &'a [u8],
    encoding: SampleEncoding,
    pos: usize,
}

impl<'a> SampleReader<'a> {
    /// `encoding` is the stored encoding; compressed input is read as `f32`.
    #[inline]
    #[must_use]
    pub fn new(data: &'a [u8], encoding: SampleEncoding) -> Self {
        Self {
            data,
            encoding: encoding.stored(),
            pos: 0,
        }
    }

    #[inline]
    fn take<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let bytes = self
            .data
            .get(self.pos..self.pos + N)
            .ok_or(FormatError::TooShort {
                expected: self.pos + N,
                got: self.data.len(),
            })?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        self.pos += N;
        Ok(out)
    }

    /// Next sample, scaled to `[-1.0, 1.0)` for integer encodings.
    #[inline]
    pub fn read_sample(&mut self) -> Result<f32, FormatError> {
        let sample = match self.encoding {
            SampleEncoding::S8 => f32::from(i8::from_le_bytes(self.take::<1>()?)) / 128.0,
            SampleEncoding::S16Le => f32::from(i16::from_le_bytes(self.take::<2>()?)) / 32768.0,
            #[allow(clippy::cast_precision_loss)]
            SampleEncoding::S32Le => i32::from_le_bytes(self.take::<4>()?) as f32 / 2_147_483_648.0,
            SampleEncoding::Float32 | SampleEncoding::Opus => f32::from_le_bytes(self.take::<4>()?),
        };
        Ok(sample)
    }

    /// Skip `count` samples without decoding them.
    pub fn skip(&mut self, count: usize) -> Result<(), FormatError> {
        let end = self.pos + count * self.encoding.width() as usize;
        if end > self.data.len() {
            return Err(FormatError::TooShort {
                expected: end,
                got: self.data.len(),
            });
        }
        self.pos = end;
        Ok(())
    }

    /// Number of whole samples left.
    #[inline]
    #[must_use]
    pub fn remaining_samples(&self) -> usize {
        (self.data.len() - self.pos) / self.encoding.width() as usize
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }
}
