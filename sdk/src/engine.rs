use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use dashmap::DashMap;
use tracing::{debug, info};

use crate::reader::StreamReader;

/// Identifier of one playing voice in a playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub u32);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle-state operations the buffering policy needs from a playback engine.
///
/// Implementations guard their handle state with their own lock, which
/// serializes policy pause/resume calls with the engine's mixing cycle.
pub trait PlaybackEngine: Send + Sync {
    /// Seconds played so far on `handle`.
    fn position(&self, handle: Handle) -> f64;

    fn is_paused(&self, handle: Handle) -> bool;

    fn set_paused(&self, handle: Handle, paused: bool);

    fn is_valid_handle(&self, handle: Handle) -> bool;
}

struct Voice {
    reader: StreamReader,
    paused: bool,
    /// Playback clock in seconds. Keeps running through underruns.
    position: f64,
}

/// Software playback engine that mixes stream readers into an interleaved buffer.
///
/// There is no output device: callers pull audio with [`VirtualEngine::mix`]
/// at whatever pace they like, which makes playback deterministic.
pub struct VirtualEngine {
    voices: DashMap<Handle, Voice>,
    next_handle: AtomicU32,
    channels: usize,
}

impl VirtualEngine {
    /// Create an engine rendering `channels` interleaved output channels.
    #[must_use]
    pub fn new(channels: usize) -> Self {
        VirtualEngine {
            voices: DashMap::new(),
            next_handle: AtomicU32::new(1),
            channels: channels.max(1),
        }
    }

    /// Reserve a handle before the voice exists, so it can be attached to a stream first.
    pub fn allocate_handle(&self) -> Handle {
        Handle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    /// Start playing `reader` on a previously allocated handle.
    pub fn play_with(&self, handle: Handle, reader: StreamReader, paused: bool) {
        info!("Playing voice {} (paused: {})", handle, paused);
        self.voices.insert(
            handle,
            Voice {
                reader,
                paused,
                position: 0.0,
            },
        );
    }

    pub fn play(&self, reader: StreamReader) -> Handle {
        let handle = self.allocate_handle();
        self.play_with(handle, reader, false);
        handle
    }

    pub fn stop(&self, handle: Handle) -> bool {
        self.voices.remove(&handle).is_some()
    }

    /// Seek a voice, returning the position actually reached.
    pub fn seek(&self, handle: Handle, seconds: f64) -> Option<f64> {
        let mut voice = self.voices.get_mut(&handle)?;
        let mut scratch = vec![0.0f32; 4096];
        let reached = voice.reader.seek(seconds, &mut scratch);
        voice.position = reached;
        Some(reached)
    }

    #[must_use]
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Render `frames` interleaved frames into `out`, summing every unpaused voice.
    ///
    /// Every unpaused voice's clock advances by `frames`, whether or not its
    /// stream had data. Voices with fewer channels than the output are
    /// spread across the output channels. Voices whose stream has ended are
    /// removed afterwards. Returns the number of voices that produced samples.
    #[allow(clippy::cast_precision_loss)]
    pub fn mix(&self, frames: usize, out: &mut [f32]) -> usize {
        let frames = frames.min(out.len() / self.channels);
        out[..frames * self.channels].fill(0.0);

        let mut block = Vec::new();
        let mut active = 0;

        for mut entry in self.voices.iter_mut() {
            let voice = entry.value_mut();
            if voice.paused {
                continue;
            }

            let voice_channels = voice.reader.channels();
            block.resize(frames * voice_channels, 0.0);
            let read = voice.reader.read_block(frames, &mut block);
            voice.position += frames as f64 / f64::from(voice.reader.format().sample_rate);
            if read == 0 {
                continue;
            }
            active += 1;

            // Planar voice block: channel c occupies block[c * read..(c + 1) * read]
            for frame in 0..read {
                for ch in 0..self.channels {
                    let source = ch % voice_channels;
                    out[frame * self.channels + ch] += block[source * read + frame];
                }
            }
        }

        self.voices.retain(|handle, voice| {
            let ended = voice.reader.has_ended();
            if ended {
                debug!("Voice {} reached end of stream", handle);
            }
            !ended
        });

        active
    }
}

impl PlaybackEngine for VirtualEngine {
    fn position(&self, handle: Handle) -> f64 {
        self.voices
            .get(&handle)
            .map_or(0.0, |voice| voice.position)
    }

    fn is_paused(&self, handle: Handle) -> bool {
        self.voices.get(&handle).is_some_and(|voice| voice.paused)
    }

    fn set_paused(&self, handle: Handle, paused: bool) {
        if let Some(mut voice) = self.voices.get_mut(&handle) {
            voice.paused = paused;
        }
    }

    fn is_valid_handle(&self, handle: Handle) -> bool {
        self.voices.contains_key(&handle)
    }
}
