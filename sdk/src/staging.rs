use std::collections::VecDeque;

/// Raw pushed bytes waiting for the decode stage.
///
/// Each push is remembered as one packet so that packetized codecs can
/// recover the boundaries after several small pushes were batched together.
#[derive(Default)]
pub struct StagingQueue {
    bytes: Vec<u8>,
    packet_ends: VecDeque<usize>,
}

impl StagingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage one push. Empty pushes are ignored.
    pub fn push(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.bytes.extend_from_slice(data);
        self.packet_ends.push_back(self.bytes.len());
    }

    /// Iterate over the staged packets in push order.
    pub fn packets(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let mut start = 0;
        self.packet_ends.iter().map(move |&end| {
            let packet = &self.bytes[start..end];
            start = end;
            packet
        })
    }

    /// Remove the first `count` bytes.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.bytes.len());
        if count == 0 {
            return;
        }
        self.bytes.drain(..count);
        while self.packet_ends.front().is_some_and(|&end| end <= count) {
            self.packet_ends.pop_front();
        }
        for end in &mut self.packet_ends {
            *end -= count;
        }
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.packet_ends.clear();
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn packet_count(&self) -> usize {
        self.packet_ends.len()
    }
}
