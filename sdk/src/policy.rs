use tracing::debug;

use crate::engine::{Handle, PlaybackEngine};

/// A buffering state transition of one playback handle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferingEvent {
    /// The handle caught up with the decoded data and was paused.
    Started { handle: Handle, buffered: f64 },
    /// Enough audio accumulated past the starvation point; the handle resumed.
    Ended { handle: Handle, buffered: f64 },
}

impl BufferingEvent {
    #[must_use]
    pub fn is_buffering(&self) -> bool {
        matches!(self, BufferingEvent::Started { .. })
    }

    #[must_use]
    pub fn handle(&self) -> Handle {
        match self {
            BufferingEvent::Started { handle, .. } | BufferingEvent::Ended { handle, .. } => *handle,
        }
    }

    /// Seconds of decoded audio when the transition happened.
    #[must_use]
    pub fn buffered_duration(&self) -> f64 {
        match self {
            BufferingEvent::Started { buffered, .. } | BufferingEvent::Ended { buffered, .. } => *buffered,
        }
    }
}

struct HandleState {
    handle: Handle,
    /// Horizon in seconds when starvation was detected. `None` while playing normally.
    buffering_since: Option<f64>,
}

/// Pauses handles that outrun the decoded data and resumes them once
/// `pre_buffer` seconds have accumulated past the starvation point.
pub struct BufferingPolicy {
    pre_buffer: f64,
    handles: Vec<HandleState>,
}

impl BufferingPolicy {
    #[must_use]
    pub fn new(pre_buffer: f64) -> Self {
        BufferingPolicy {
            pre_buffer: pre_buffer.max(0.0),
            handles: Vec::new(),
        }
    }

    /// Start watching `handle`. Returns false if it was already attached.
    pub fn attach(&mut self, handle: Handle) -> bool {
        if self.handles.iter().any(|state| state.handle == handle) {
            return false;
        }
        self.handles.push(HandleState {
            handle,
            buffering_since: None,
        });
        true
    }

    pub fn detach(&mut self, handle: Handle) -> bool {
        let before = self.handles.len();
        self.handles.retain(|state| state.handle != handle);
        self.handles.len() != before
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.handles.iter().map(|state| state.handle)
    }

    #[must_use]
    pub fn buffering_since(&self, handle: Handle) -> Option<f64> {
        self.handles
            .iter()
            .find(|state| state.handle == handle)
            .and_then(|state| state.buffering_since)
    }

    #[must_use]
    pub fn is_buffering(&self, handle: Handle) -> bool {
        self.buffering_since(handle).is_some()
    }

    #[must_use]
    pub fn pre_buffer(&self) -> f64 {
        self.pre_buffer
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Apply the policy to every attached handle given the current horizon
    /// in seconds, returning the transitions in handle order.
    pub fn scan(&mut self, engine: &dyn PlaybackEngine, buffered: f64) -> Vec<BufferingEvent> {
        self.handles.retain(|state| {
            let valid = engine.is_valid_handle(state.handle);
            if !valid {
                debug!("Dropping stale handle {} from buffering scan", state.handle);
            }
            valid
        });

        let mut events = Vec::new();

        for state in &mut self.handles {
            let handle = state.handle;
            let paused = engine.is_paused(handle);

            if !paused && engine.position(handle) >= buffered {
                state.buffering_since = Some(buffered);
                engine.set_paused(handle, true);
                events.push(BufferingEvent::Started { handle, buffered });
            } else if paused {
                if let Some(since) = state.buffering_since {
                    if buffered - since >= self.pre_buffer {
                        state.buffering_since = None;
                        engine.set_paused(handle, false);
                        events.push(BufferingEvent::Ended { handle, buffered });
                    }
                }
            } else {
                // Unpaused by the application mid-buffering: the marker
                // would otherwise let a later user pause be resumed by us.
                state.buffering_since = None;
            }
        }

        events
    }

    /// Resume every handle still held for buffering.
    ///
    /// Used once the stream has ended: no further data can arrive to lift
    /// the pause, so the remaining samples are played out as they are.
    pub fn release(&mut self, engine: &dyn PlaybackEngine, buffered: f64) -> Vec<BufferingEvent> {
        let mut events = Vec::new();

        for state in &mut self.handles {
            if state.buffering_since.take().is_none() {
                continue;
            }
            let handle = state.handle;
            if engine.is_valid_handle(handle) && engine.is_paused(handle) {
                engine.set_paused(handle, false);
                events.push(BufferingEvent::Ended { handle, buffered });
            }
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEngine {
        voices: Mutex<HashMap<Handle, (f64, bool)>>,
    }

    impl FakeEngine {
        fn add(&self, handle: Handle, position: f64, paused: bool) {
            self.voices.lock().unwrap().insert(handle, (position, paused));
        }

        fn remove(&self, handle: Handle) {
            self.voices.lock().unwrap().remove(&handle);
        }
    }

    impl PlaybackEngine for FakeEngine {
        fn position(&self, handle: Handle) -> f64 {
            self.voices.lock().unwrap().get(&handle).map_or(0.0, |v| v.0)
        }

        fn is_paused(&self, handle: Handle) -> bool {
            self.voices.lock().unwrap().get(&handle).is_some_and(|v| v.1)
        }

        fn set_paused(&self, handle: Handle, paused: bool) {
            if let Some(voice) = self.voices.lock().unwrap().get_mut(&handle) {
                voice.1 = paused;
            }
        }

        fn is_valid_handle(&self, handle: Handle) -> bool {
            self.voices.lock().unwrap().contains_key(&handle)
        }
    }

    #[test]
    fn test_starved_handle_is_paused_once() {
        let engine = FakeEngine::default();
        let handle = Handle(1);
        engine.add(handle, 1.0, false);

        let mut policy = BufferingPolicy::new(0.5);
        policy.attach(handle);

        let events = policy.scan(&engine, 1.0);
        assert_eq!(events, vec![BufferingEvent::Started { handle, buffered: 1.0 }]);
        assert!(engine.is_paused(handle));
        assert_eq!(policy.buffering_since(handle), Some(1.0));

        // Below the pre-buffer target: nothing happens
        assert!(policy.scan(&engine, 1.2).is_empty());
        assert!(policy.scan(&engine, 1.49).is_empty());
        assert!(engine.is_paused(handle));
    }

    #[test]
    fn test_resume_after_pre_buffer_reached() {
        let engine = FakeEngine::default();
        let handle = Handle(7);
        engine.add(handle, 2.0, false);

        let mut policy = BufferingPolicy::new(0.5);
        policy.attach(handle);
        policy.scan(&engine, 2.0);

        let events = policy.scan(&engine, 2.5);
        assert_eq!(events, vec![BufferingEvent::Ended { handle, buffered: 2.5 }]);
        assert!(!engine.is_paused(handle));
        assert!(!policy.is_buffering(handle));

        // Position 2.0 is behind the horizon now
        assert!(policy.scan(&engine, 3.0).is_empty());
    }

    #[test]
    fn test_playing_handle_ahead_of_position_untouched() {
        let engine = FakeEngine::default();
        let handle = Handle(2);
        engine.add(handle, 0.1, false);

        let mut policy = BufferingPolicy::new(1.0);
        policy.attach(handle);
        assert!(policy.scan(&engine, 0.5).is_empty());
        assert!(!engine.is_paused(handle));
    }

    #[test]
    fn test_user_paused_handle_never_resumed() {
        let engine = FakeEngine::default();
        let handle = Handle(3);
        engine.add(handle, 0.0, true);

        let mut policy = BufferingPolicy::new(0.0);
        policy.attach(handle);
        assert!(policy.scan(&engine, 10.0).is_empty());
        assert!(engine.is_paused(handle));
    }

    #[test]
    fn test_invalid_handles_are_dropped() {
        let engine = FakeEngine::default();
        engine.add(Handle(1), 0.0, false);
        engine.add(Handle(2), 0.0, false);

        let mut policy = BufferingPolicy::new(0.5);
        policy.attach(Handle(1));
        policy.attach(Handle(2));
        engine.remove(Handle(2));

        let events = policy.scan(&engine, 0.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].handle(), Handle(1));
        assert_eq!(policy.handles().collect::<Vec<_>>(), vec![Handle(1)]);
    }

    #[test]
    fn test_app_resume_clears_marker() {
        let engine = FakeEngine::default();
        let handle = Handle(9);
        engine.add(handle, 1.0, false);

        let mut policy = BufferingPolicy::new(0.5);
        policy.attach(handle);
        policy.scan(&engine, 1.0);
        assert!(policy.is_buffering(handle));

        // Application resumes, then pauses the handle on its own
        engine.add(handle, 0.5, false);
        assert!(policy.scan(&engine, 1.2).is_empty());
        assert!(!policy.is_buffering(handle));

        engine.set_paused(handle, true);
        assert!(policy.scan(&engine, 5.0).is_empty());
        assert!(engine.is_paused(handle));
    }

    #[test]
    fn test_release_resumes_only_buffering_handles() {
        let engine = FakeEngine::default();
        engine.add(Handle(1), 2.0, false);
        engine.add(Handle(2), 0.0, true);

        let mut policy = BufferingPolicy::new(5.0);
        policy.attach(Handle(1));
        policy.attach(Handle(2));
        policy.scan(&engine, 1.0);
        assert!(engine.is_paused(Handle(1)));

        let events = policy.release(&engine, 1.2);
        assert_eq!(events, vec![BufferingEvent::Ended { handle: Handle(1), buffered: 1.2 }]);
        assert!(!engine.is_paused(Handle(1)));
        assert!(!policy.is_buffering(Handle(1)));
        // Paused by the user, not by buffering
        assert!(engine.is_paused(Handle(2)));

        assert!(policy.release(&engine, 1.2).is_empty());
    }

    #[test]
    fn test_attach_is_idempotent() {
        let mut policy = BufferingPolicy::new(0.5);
        assert!(policy.attach(Handle(4)));
        assert!(!policy.attach(Handle(4)));
        assert_eq!(policy.len(), 1);
        assert!(policy.detach(Handle(4)));
        assert!(policy.is_empty());
    }
}
