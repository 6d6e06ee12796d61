//! Channel seams to the 3D scene.
//!
//! Orientation flows through a `watch` channel: the tracking loop is the
//! single writer, the scene bridge reads the latest value on render.
//! Discrete events (synthetic key presses) flow through an unbounded
//! queue.

use bantam_core::Orientation;
use tokio::sync::{mpsc, watch};

/// Key the scene maps to the wave reaction.
pub const WAVE_KEY: char = 'w';

/// Discrete events delivered to the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneEvent {
    KeyDown(char),
    KeyUp(char),
}

/// Write side, held by the tracking loop.
pub struct CharacterHandle {
    orientation_tx: watch::Sender<Orientation>,
    events_tx: mpsc::UnboundedSender<SceneEvent>,
}

/// Read side, consumed by the scene bridge.
pub struct CharacterView {
    pub orientation: watch::Receiver<Orientation>,
    pub events: mpsc::UnboundedReceiver<SceneEvent>,
}

/// Create the character seam.
pub fn character_channel() -> (CharacterHandle, CharacterView) {
    let (orientation_tx, orientation_rx) = watch::channel(Orientation::default());
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    (
        CharacterHandle {
            orientation_tx,
            events_tx,
        },
        CharacterView {
            orientation: orientation_rx,
            events: events_rx,
        },
    )
}

impl CharacterHandle {
    /// Publish the latest orientation; the scene reads it on render.
    pub fn set_orientation(&self, orientation: Orientation) {
        let _ = self.orientation_tx.send(orientation);
    }

    /// Queue a discrete event. A detached scene is not an error.
    pub fn emit(&self, event: SceneEvent) {
        let _ = self.events_tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orientation_latest_value_wins() {
        let (handle, view) = character_channel();
        handle.set_orientation(Orientation { yaw: 0.1, pitch: 0.0 });
        handle.set_orientation(Orientation { yaw: 0.2, pitch: 0.1 });
        let seen = *view.orientation.borrow();
        assert!((seen.yaw - 0.2).abs() < f32::EPSILON);
        assert!((seen.pitch - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn test_events_preserve_order() {
        let (handle, mut view) = character_channel();
        handle.emit(SceneEvent::KeyDown(WAVE_KEY));
        handle.emit(SceneEvent::KeyUp(WAVE_KEY));
        assert_eq!(view.events.try_recv().unwrap(), SceneEvent::KeyDown('w'));
        assert_eq!(view.events.try_recv().unwrap(), SceneEvent::KeyUp('w'));
        assert!(view.events.try_recv().is_err());
    }

    #[test]
    fn test_emit_without_consumer_is_silent() {
        let (handle, view) = character_channel();
        drop(view);
        handle.emit(SceneEvent::KeyDown(WAVE_KEY));
        handle.set_orientation(Orientation::default());
    }
}
