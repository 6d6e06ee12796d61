//! End-to-end tracking smoke test: synthetic detection sequences driven
//! through primary selection, orientation smoothing, and the wave gate,
//! the way the daemon's per-frame loop composes them.

use bantam_core::tracking::{select_primary, wave_detected, KEY_PRESS_HOLD};
use bantam_core::types::{Landmark, HAND_LANDMARK_COUNT, MIDDLE_FINGERTIP, WRIST};
use bantam_core::{HandLandmarks, OrientationTracker, PersonBox, WaveGate};
use std::f32::consts::FRAC_PI_2;
use std::time::{Duration, Instant};

const FRAME_W: f32 = 640.0;
const FRAME_H: f32 = 480.0;

fn person(x: f32, y: f32, w: f32, h: f32) -> PersonBox {
    PersonBox {
        x,
        y,
        width: w,
        height: h,
        label: "person".into(),
        confidence: 0.9,
    }
}

fn waving_hand() -> HandLandmarks {
    let mut points = [Landmark { x: 0.5, y: 0.5, z: 0.0 }; HAND_LANDMARK_COUNT];
    points[WRIST].y = 0.7;
    points[MIDDLE_FINGERTIP].y = 0.2;
    HandLandmarks { points }
}

#[test]
fn person_walks_across_frame_then_leaves() {
    let mut tracker = OrientationTracker::new();

    // Walk from the left edge to the right edge over 100 frames.
    for step in 0..100 {
        let x = step as f32 / 99.0 * (FRAME_W - 40.0);
        let boxes = vec![person(x, 200.0, 40.0, 120.0)];
        tracker.update(select_primary(&boxes), FRAME_W, FRAME_H);

        let o = tracker.orientation();
        assert!(o.yaw.abs() <= FRAC_PI_2);
        assert!(o.pitch.abs() <= FRAC_PI_2);
    }

    // Ending on the right side: the character has turned right (negative
    // yaw, mirror-facing).
    assert!(tracker.orientation().yaw < 0.0);

    // Person leaves; orientation settles back to neutral.
    for _ in 0..100 {
        tracker.update(None, FRAME_W, FRAME_H);
    }
    assert!(tracker.orientation().yaw.abs() < 1e-3);
    assert!(tracker.orientation().pitch.abs() < 1e-3);
}

#[test]
fn crowd_tracks_the_largest_person() {
    let mut tracker = OrientationTracker::new();

    // Small person on the left, large person on the right.
    let boxes = vec![
        person(40.0, 200.0, 30.0, 80.0),
        person(500.0, 150.0, 90.0, 260.0),
    ];
    for _ in 0..30 {
        tracker.update(select_primary(&boxes), FRAME_W, FRAME_H);
    }

    // The large right-side person wins: the character turns right.
    assert!(tracker.orientation().yaw < 0.0);
}

#[test]
fn wave_burst_emits_one_event_per_key_window() {
    let mut gate = WaveGate::default();
    let hands = vec![waving_hand()];
    let t0 = Instant::now();

    let mut fired = 0;
    // A wave held across 5 consecutive ~30 ms frames.
    for frame in 0..5 {
        let now = t0 + Duration::from_millis(30 * frame);
        if wave_detected(&hands) && gate.try_fire(now) {
            fired += 1;
        }
    }

    // 150 ms of waving with a 100 ms key window: exactly two events.
    assert_eq!(KEY_PRESS_HOLD, Duration::from_millis(100));
    assert_eq!(fired, 2);
}
