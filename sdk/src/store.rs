use crate::error::StreamError;

/// Growable byte store of decoded, frame-aligned PCM.
///
/// The store only ever holds whole interleaved frames. Appends past the
/// configured capacity are truncated to the last frame that fits.
pub struct SampleStore {
    bytes: Vec<u8>,
    capacity: usize,
    sample_width: usize,
    frame_size: usize,
}

impl SampleStore {
    /// Create an empty store for samples `sample_width` bytes wide, `channels` per frame.
    #[must_use]
    pub fn new(sample_width: usize, channels: usize, capacity: usize) -> Self {
        SampleStore {
            bytes: Vec::new(),
            capacity,
            sample_width: sample_width.max(1),
            frame_size: (sample_width * channels).max(1),
        }
    }

    /// Change the capacity. Only allowed while the store is empty.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<(), StreamError> {
        if !self.bytes.is_empty() {
            return Err(StreamError::InvalidState("capacity cannot change after data was appended"));
        }
        self.capacity = capacity;
        Ok(())
    }

    /// Append whole frames from `data`, returning the number of bytes written.
    ///
    /// A trailing partial frame is never written, and neither is anything
    /// beyond the remaining capacity.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let room = self.capacity.saturating_sub(self.bytes.len());
        let writable = data.len().min(room);
        let writable = writable - writable % self.frame_size;
        self.bytes.extend_from_slice(&data[..writable]);
        writable
    }

    /// View of up to `len` bytes starting at `offset`, truncated to the valid size.
    #[must_use]
    pub fn read_raw(&self, offset: usize, len: usize) -> &[u8] {
        let start = offset.min(self.bytes.len());
        let end = offset.saturating_add(len).min(self.bytes.len());
        &self.bytes[start..end]
    }

    #[inline]
    #[must_use]
    pub fn size_in_samples(&self) -> usize {
        self.bytes.len() / self.sample_width
    }

    #[inline]
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.bytes.len())
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_writes_whole_frames_only() {
        let mut store = SampleStore::new(2, 2, 1024);
        let written = store.append(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(written, 4);
        assert_eq!(store.size_in_bytes(), 4);
        assert_eq!(store.size_in_samples(), 2);
    }

    #[test]
    fn test_append_stops_at_capacity() {
        let mut store = SampleStore::new(2, 1, 5);
        assert_eq!(store.append(&[0u8; 8]), 4);
        assert_eq!(store.remaining(), 1);
        assert_eq!(store.append(&[0u8; 2]), 0);
        assert_eq!(store.size_in_samples(), 2);
    }

    #[test]
    fn test_set_capacity_after_append_fails() {
        let mut store = SampleStore::new(1, 1, 4);
        assert!(store.set_capacity(8).is_ok());
        store.append(&[1]);
        assert!(matches!(store.set_capacity(16), Err(StreamError::InvalidState(_))));
        assert_eq!(store.capacity(), 8);
    }

    #[test]
    fn test_read_raw_truncates_to_valid_size() {
        let mut store = SampleStore::new(1, 1, 16);
        store.append(&[10, 20, 30]);
        assert_eq!(store.read_raw(1, 10), &[20, 30]);
        assert!(store.read_raw(5, 2).is_empty());
        assert_eq!(store.read_raw(0, usize::MAX), &[10, 20, 30]);
    }

    #[test]
    fn test_clear_allows_capacity_change() {
        let mut store = SampleStore::new(1, 1, 4);
        store.append(&[1, 2]);
        store.clear();
        assert_eq!(store.size_in_bytes(), 0);
        assert!(store.set_capacity(2).is_ok());
    }
}
