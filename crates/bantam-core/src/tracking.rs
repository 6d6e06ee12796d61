//! Per-frame tracking logic: primary-person selection, orientation
//! smoothing, and wave-gesture detection.
//!
//! This module is pure — detector output in, orientation/gesture
//! decisions out. The loop that feeds it frames lives in the daemon.

use crate::types::{HandLandmarks, PersonBox};
use std::f32::consts::FRAC_PI_2;
use std::time::{Duration, Instant};

/// Exponential smoothing factor: `new = old*(1-k) + target*k`.
const SMOOTHING_FACTOR: f32 = 0.3;

/// Per-frame decay applied to both angles, person present or not.
const DECAY_FACTOR: f32 = 0.9;

/// Maximum target rotation on either axis.
const MAX_ROTATION_ANGLE: f32 = FRAC_PI_2;

/// Fingertip must be above the wrist by this much (normalized units)
/// before a wave fires.
const WAVE_THRESHOLD: f32 = 0.1;

/// How long the synthetic key press is held before the paired release.
pub const KEY_PRESS_HOLD: Duration = Duration::from_millis(100);

/// Smoothed character orientation, radians.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Orientation {
    pub yaw: f32,
    pub pitch: f32,
}

/// Owns the orientation state. Single writer: the tracking loop.
#[derive(Debug, Default)]
pub struct OrientationTracker {
    orientation: Orientation,
}

impl OrientationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Advance one frame.
    ///
    /// With a person present, the box center is normalized to [-1, 1]
    /// per axis and smoothed toward `offset × π/2` (x inverted for yaw).
    /// The 0.9 decay applies every frame regardless, so the character
    /// settles back to neutral when nobody is in view.
    pub fn update(&mut self, primary: Option<&PersonBox>, frame_w: f32, frame_h: f32) {
        if let Some(person) = primary {
            if frame_w > 0.0 && frame_h > 0.0 {
                let (cx, cy) = person.center();
                let norm_x = (cx / frame_w - 0.5) * 2.0;
                let norm_y = (cy / frame_h - 0.5) * 2.0;

                let target_yaw = -norm_x * MAX_ROTATION_ANGLE;
                let target_pitch = norm_y * MAX_ROTATION_ANGLE;

                self.orientation.yaw =
                    self.orientation.yaw * (1.0 - SMOOTHING_FACTOR) + target_yaw * SMOOTHING_FACTOR;
                self.orientation.pitch = self.orientation.pitch * (1.0 - SMOOTHING_FACTOR)
                    + target_pitch * SMOOTHING_FACTOR;
            }
        }

        self.orientation.yaw *= DECAY_FACTOR;
        self.orientation.pitch *= DECAY_FACTOR;
    }
}

/// Pick the detection to track: largest bounding-box area, first
/// encountered on ties (stable w.r.t. detector output order).
pub fn select_primary(boxes: &[PersonBox]) -> Option<&PersonBox> {
    let mut best: Option<&PersonBox> = None;
    for candidate in boxes {
        match best {
            Some(current) if candidate.area() <= current.area() => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Wave predicate: the middle fingertip is above the wrist by more than
/// the threshold, for the first tracked hand only. Image y grows
/// downward, so "above" is a smaller y.
pub fn wave_detected(hands: &[HandLandmarks]) -> bool {
    let Some(hand) = hands.first() else {
        return false;
    };
    hand.middle_fingertip().y < hand.wrist().y - WAVE_THRESHOLD
}

/// Debounce for wave gestures: a new wave is ignored until the previous
/// synthetic key-release has fired.
#[derive(Debug)]
pub struct WaveGate {
    hold: Duration,
    open_at: Option<Instant>,
}

impl WaveGate {
    pub fn new(hold: Duration) -> Self {
        Self { hold, open_at: None }
    }

    /// Attempt to fire a wave at `now`. Returns true and closes the gate
    /// for the hold window when allowed.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if let Some(open_at) = self.open_at {
            if now < open_at {
                return false;
            }
        }
        self.open_at = Some(now + self.hold);
        true
    }
}

impl Default for WaveGate {
    fn default() -> Self {
        Self::new(KEY_PRESS_HOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Landmark, HAND_LANDMARK_COUNT, MIDDLE_FINGERTIP, WRIST};

    fn person_at(x: f32, y: f32, w: f32, h: f32) -> PersonBox {
        PersonBox {
            x,
            y,
            width: w,
            height: h,
            label: "person".into(),
            confidence: 0.9,
        }
    }

    fn hand_with(fingertip_y: f32, wrist_y: f32) -> HandLandmarks {
        let mut points = [Landmark { x: 0.5, y: 0.5, z: 0.0 }; HAND_LANDMARK_COUNT];
        points[WRIST].y = wrist_y;
        points[MIDDLE_FINGERTIP].y = fingertip_y;
        HandLandmarks { points }
    }

    #[test]
    fn test_orientation_bounded_by_half_pi() {
        // Hammer one extreme corner for many frames: the smoothed value
        // approaches but never exceeds pi/2 on either axis.
        let mut tracker = OrientationTracker::new();
        let corner = person_at(630.0, 470.0, 10.0, 10.0);
        for _ in 0..1000 {
            tracker.update(Some(&corner), 640.0, 480.0);
            let o = tracker.orientation();
            assert!(o.yaw.abs() <= FRAC_PI_2, "yaw {} out of range", o.yaw);
            assert!(o.pitch.abs() <= FRAC_PI_2, "pitch {} out of range", o.pitch);
        }
    }

    #[test]
    fn test_orientation_decays_toward_zero_without_person() {
        let mut tracker = OrientationTracker::new();
        let left = person_at(0.0, 0.0, 20.0, 20.0);
        for _ in 0..50 {
            tracker.update(Some(&left), 640.0, 480.0);
        }
        let mut prev = tracker.orientation();
        assert!(prev.yaw.abs() > 0.0);

        for _ in 0..20 {
            tracker.update(None, 640.0, 480.0);
            let o = tracker.orientation();
            assert!(o.yaw.abs() <= prev.yaw.abs());
            assert!(o.pitch.abs() <= prev.pitch.abs());
            assert!((o.yaw - prev.yaw * 0.9).abs() < 1e-6);
            prev = o;
        }
    }

    #[test]
    fn test_orientation_yaw_inverted_from_x() {
        // Person on the right half of the frame turns the character with
        // a negative yaw (mirror-facing).
        let mut tracker = OrientationTracker::new();
        let right = person_at(600.0, 230.0, 20.0, 20.0);
        tracker.update(Some(&right), 640.0, 480.0);
        assert!(tracker.orientation().yaw < 0.0);

        let mut tracker = OrientationTracker::new();
        let left = person_at(20.0, 230.0, 20.0, 20.0);
        tracker.update(Some(&left), 640.0, 480.0);
        assert!(tracker.orientation().yaw > 0.0);
    }

    #[test]
    fn test_orientation_centered_person_stays_neutral() {
        let mut tracker = OrientationTracker::new();
        let centered = person_at(310.0, 230.0, 20.0, 20.0);
        for _ in 0..10 {
            tracker.update(Some(&centered), 640.0, 480.0);
        }
        let o = tracker.orientation();
        assert!(o.yaw.abs() < 1e-3);
        assert!(o.pitch.abs() < 1e-3);
    }

    #[test]
    fn test_orientation_degenerate_frame_dims() {
        let mut tracker = OrientationTracker::new();
        let p = person_at(10.0, 10.0, 5.0, 5.0);
        tracker.update(Some(&p), 0.0, 0.0);
        // No smoothing input, decay only: stays at zero.
        assert_eq!(tracker.orientation(), Orientation::default());
    }

    #[test]
    fn test_select_primary_largest_area() {
        let boxes = vec![
            person_at(0.0, 0.0, 10.0, 10.0),
            person_at(0.0, 0.0, 50.0, 50.0),
            person_at(0.0, 0.0, 20.0, 20.0),
        ];
        let primary = select_primary(&boxes).unwrap();
        assert_eq!(primary.width, 50.0);
    }

    #[test]
    fn test_select_primary_tie_break_keeps_first() {
        let mut first = person_at(0.0, 0.0, 30.0, 30.0);
        first.confidence = 0.6;
        let mut second = person_at(100.0, 0.0, 30.0, 30.0);
        second.confidence = 0.99;

        let boxes = vec![first, second];
        let primary = select_primary(&boxes).unwrap();
        // Equal areas: detector order wins, confidence is irrelevant.
        assert!((primary.confidence - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_select_primary_empty() {
        assert!(select_primary(&[]).is_none());
    }

    #[test]
    fn test_wave_fires_above_threshold() {
        // fingertip 0.39, wrist 0.5: above by 0.11 > 0.1
        assert!(wave_detected(&[hand_with(0.39, 0.5)]));
    }

    #[test]
    fn test_wave_silent_at_threshold() {
        // Above by exactly 0.1 is not enough (strict inequality).
        assert!(!wave_detected(&[hand_with(0.4, 0.5)]));
    }

    #[test]
    fn test_wave_silent_below_wrist() {
        assert!(!wave_detected(&[hand_with(0.8, 0.5)]));
    }

    #[test]
    fn test_wave_first_hand_only() {
        // First hand is idle, second hand is waving: no event.
        let hands = vec![hand_with(0.6, 0.5), hand_with(0.1, 0.5)];
        assert!(!wave_detected(&hands));
    }

    #[test]
    fn test_wave_no_hands() {
        assert!(!wave_detected(&[]));
    }

    #[test]
    fn test_wave_gate_suppresses_inside_window() {
        let mut gate = WaveGate::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(gate.try_fire(t0));
        assert!(!gate.try_fire(t0 + Duration::from_millis(50)));
        assert!(gate.try_fire(t0 + Duration::from_millis(100)));
    }

    #[test]
    fn test_wave_gate_first_fire_always_allowed() {
        let mut gate = WaveGate::default();
        assert!(gate.try_fire(Instant::now()));
    }
}
