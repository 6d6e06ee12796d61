//! Tracking subsystem driver.
//!
//! Owns the camera and both detection models on a dedicated OS thread
//! (capture and inference are blocking) and runs the per-frame loop:
//! person detection → orientation update → hand detection → wave
//! gesture. Results leave through the character and UI channels.

use crate::character::{CharacterHandle, SceneEvent, WAVE_KEY};
use crate::ui::{UiEvent, UiHandle};
use bantam_core::tracking::KEY_PRESS_HOLD;
use bantam_core::{HandLandmarker, OrientationTracker, PersonDetector, WaveGate};
use bantam_hw::Camera;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

/// Transient speech-bubble messages are cleared this long after a wave.
const MESSAGE_CLEAR_DELAY: Duration = Duration::from_secs(2);

/// Pause before retrying when the driver fails to deliver a frame.
const CAPTURE_RETRY_PAUSE: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("camera: {0}")]
    Camera(#[from] bantam_hw::CameraError),
    #[error("person detector: {0}")]
    Person(#[from] bantam_core::person::PersonDetectorError),
    #[error("hand landmarker: {0}")]
    Hand(#[from] bantam_core::hand::HandLandmarkerError),
}

/// Camera subsystem state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Initializing,
    Running,
    Failed,
}

pub struct TrackingConfig {
    pub camera_device: Option<String>,
    pub person_model: String,
    pub hand_model: String,
    pub hand_load_attempts: usize,
    pub hand_load_backoff: Duration,
}

/// Handle to the tracking thread.
pub struct TrackingHandle {
    shutdown: watch::Sender<bool>,
    state: watch::Receiver<TrackingState>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl TrackingHandle {
    pub fn state(&self) -> TrackingState {
        *self.state.borrow()
    }

    /// Request shutdown and wait for the loop to finish its current
    /// iteration. No iteration starts after this returns; the camera
    /// and detector sessions are dropped on the loop thread.
    pub fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Spawn the tracking subsystem.
///
/// Initialization happens on the spawned thread; progress is observable
/// through [`TrackingHandle::state`]. Initialization failure disables
/// the camera-dependent UI and parks the subsystem in `Failed`.
pub fn spawn_tracking(
    config: TrackingConfig,
    character: CharacterHandle,
    ui: UiHandle,
) -> TrackingHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(TrackingState::Idle);

    let join = std::thread::Builder::new()
        .name("bantam-tracking".into())
        .spawn(move || tracking_thread(config, character, ui, state_tx, shutdown_rx))
        .expect("failed to spawn tracking thread");

    TrackingHandle {
        shutdown: shutdown_tx,
        state: state_rx,
        join: Some(join),
    }
}

fn tracking_thread(
    config: TrackingConfig,
    character: CharacterHandle,
    ui: UiHandle,
    state_tx: watch::Sender<TrackingState>,
    shutdown_rx: watch::Receiver<bool>,
) {
    let _ = state_tx.send(TrackingState::Initializing);

    match init_resources(&config) {
        Ok((camera, person, hand)) => {
            let _ = state_tx.send(TrackingState::Running);
            tracing::info!("tracking loop started");
            run_loop(camera, person, hand, &character, &ui, &shutdown_rx);
            tracing::info!("tracking loop stopped");
            let _ = state_tx.send(TrackingState::Idle);
        }
        Err(e) => {
            tracing::error!(error = %e, "tracking subsystem initialization failed");
            ui.send(UiEvent::CameraDisabled);
            let _ = state_tx.send(TrackingState::Failed);
        }
    }
    // Camera and detector sessions drop here, on the loop thread.
}

fn init_resources(
    config: &TrackingConfig,
) -> Result<(Camera, PersonDetector, HandLandmarker), TrackingError> {
    let camera = Camera::open_preferred(config.camera_device.as_deref())?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        "camera ready"
    );

    let person = PersonDetector::load(&config.person_model)?;
    tracing::info!(path = %config.person_model, "person detector loaded");

    let hand = HandLandmarker::load_with_retry(
        &config.hand_model,
        config.hand_load_attempts,
        config.hand_load_backoff,
    )?;
    tracing::info!(path = %config.hand_model, "hand landmarker loaded");

    Ok((camera, person, hand))
}

/// Delayed side effects of a wave: the paired key-release and the
/// transient-message clear. Serviced from within the loop so nothing
/// outlives cancellation.
#[derive(Default)]
struct PendingEffects {
    release: Option<Instant>,
    clear: Option<Instant>,
}

impl PendingEffects {
    fn arm(&mut self, now: Instant) {
        self.release = Some(now + KEY_PRESS_HOLD);
        self.clear = Some(now + MESSAGE_CLEAR_DELAY);
    }

    fn service(&mut self, now: Instant, character: &CharacterHandle, ui: &UiHandle) {
        if self.release.is_some_and(|due| now >= due) {
            character.emit(SceneEvent::KeyUp(WAVE_KEY));
            ui.send(UiEvent::KeyUp(WAVE_KEY));
            self.release = None;
        }
        if self.clear.is_some_and(|due| now >= due) {
            ui.send(UiEvent::ClearMessage);
            self.clear = None;
        }
    }

    /// Fire an outstanding release immediately so shutdown never leaves
    /// the synthetic key held down.
    fn flush(&mut self, character: &CharacterHandle, ui: &UiHandle) {
        if self.release.take().is_some() {
            character.emit(SceneEvent::KeyUp(WAVE_KEY));
            ui.send(UiEvent::KeyUp(WAVE_KEY));
        }
        self.clear = None;
    }
}

fn run_loop(
    camera: Camera,
    mut person: PersonDetector,
    mut hand: HandLandmarker,
    character: &CharacterHandle,
    ui: &UiHandle,
    shutdown: &watch::Receiver<bool>,
) {
    let mut tracker = OrientationTracker::new();
    let mut gate = WaveGate::default();
    let mut effects = PendingEffects::default();

    while !*shutdown.borrow() {
        let now = Instant::now();
        effects.service(now, character, ui);

        // The blocking capture paces the loop at the camera frame rate.
        let frame = match camera.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed, skipping");
                std::thread::sleep(CAPTURE_RETRY_PAUSE);
                continue;
            }
        };

        // Per-frame detector errors are non-fatal: treat as no detections.
        let boxes = match person.detect(&frame.data, frame.width, frame.height) {
            Ok(boxes) => boxes,
            Err(e) => {
                tracing::warn!(error = %e, "person detection failed on frame");
                Vec::new()
            }
        };

        let primary = bantam_core::tracking::select_primary(&boxes);
        tracker.update(primary, frame.width as f32, frame.height as f32);
        character.set_orientation(tracker.orientation());

        let hands = match hand.process(&frame.data, frame.width, frame.height) {
            Ok(hands) => hands,
            Err(e) => {
                tracing::warn!(error = %e, "hand detection failed on frame");
                Vec::new()
            }
        };

        if bantam_core::tracking::wave_detected(&hands) && gate.try_fire(Instant::now()) {
            tracing::info!("wave gesture detected");
            character.emit(SceneEvent::KeyDown(WAVE_KEY));
            ui.send(UiEvent::KeyDown(WAVE_KEY));
            effects.arm(Instant::now());
        }
    }

    effects.flush(character, ui);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::character_channel;
    use crate::ui::ui_channel;

    #[test]
    fn test_pending_effects_release_then_clear() {
        let (character, mut view) = character_channel();
        let (ui, mut ui_rx) = ui_channel();
        let mut effects = PendingEffects::default();

        let t0 = Instant::now();
        effects.arm(t0);

        // Before the hold expires nothing fires.
        effects.service(t0 + Duration::from_millis(50), &character, &ui);
        assert!(view.events.try_recv().is_err());

        // Release fires at 100 ms, clear not yet.
        effects.service(t0 + KEY_PRESS_HOLD, &character, &ui);
        assert_eq!(view.events.try_recv().unwrap(), SceneEvent::KeyUp(WAVE_KEY));
        assert_eq!(ui_rx.try_recv().unwrap(), UiEvent::KeyUp(WAVE_KEY));
        assert!(ui_rx.try_recv().is_err());

        // Clear fires at 2 s.
        effects.service(t0 + MESSAGE_CLEAR_DELAY, &character, &ui);
        assert_eq!(ui_rx.try_recv().unwrap(), UiEvent::ClearMessage);
    }

    #[test]
    fn test_pending_effects_service_idempotent() {
        let (character, mut view) = character_channel();
        let (ui, _ui_rx) = ui_channel();
        let mut effects = PendingEffects::default();

        let t0 = Instant::now();
        effects.arm(t0);
        effects.service(t0 + Duration::from_secs(3), &character, &ui);
        effects.service(t0 + Duration::from_secs(4), &character, &ui);

        // Only one release despite repeated servicing.
        assert_eq!(view.events.try_recv().unwrap(), SceneEvent::KeyUp(WAVE_KEY));
        assert!(view.events.try_recv().is_err());
    }

    #[test]
    fn test_pending_effects_flush_releases_held_key() {
        let (character, mut view) = character_channel();
        let (ui, _ui_rx) = ui_channel();
        let mut effects = PendingEffects::default();

        effects.arm(Instant::now());
        effects.flush(&character, &ui);
        assert_eq!(view.events.try_recv().unwrap(), SceneEvent::KeyUp(WAVE_KEY));

        // Nothing pending: flush is a no-op.
        effects.flush(&character, &ui);
        assert!(view.events.try_recv().is_err());
    }

    #[test]
    fn test_init_failure_disables_camera_ui() {
        let (character, _view) = character_channel();
        let (ui, mut ui_rx) = ui_channel();

        let config = TrackingConfig {
            camera_device: Some("/nonexistent/video".to_string()),
            person_model: "/nonexistent/person.onnx".to_string(),
            hand_model: "/nonexistent/hand.onnx".to_string(),
            hand_load_attempts: 1,
            hand_load_backoff: Duration::ZERO,
        };

        let handle = spawn_tracking(config, character, ui);

        // The thread fails fast on the missing device.
        let deadline = Instant::now() + Duration::from_secs(2);
        while handle.state() != TrackingState::Failed {
            assert!(Instant::now() < deadline, "tracking did not fail in time");
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(ui_rx.blocking_recv().unwrap(), UiEvent::CameraDisabled);
        handle.stop();
    }
}
