use serde::{Deserialize, Serialize};

/// Number of landmarks the hand model reports per hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Landmark index of the wrist.
pub const WRIST: usize = 0;

/// Landmark index of the middle fingertip.
pub const MIDDLE_FINGERTIP: usize = 12;

/// Bounding box for one detected object, in source-frame pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub label: String,
    pub confidence: f32,
}

impl PersonBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Box center in source-frame pixels.
    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// One normalized hand keypoint. x and y are in [0, 1] relative to the
/// frame; z is relative depth with the wrist at roughly zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Normalized keypoints for one tracked hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub points: [Landmark; HAND_LANDMARK_COUNT],
}

impl HandLandmarks {
    pub fn wrist(&self) -> Landmark {
        self.points[WRIST]
    }

    pub fn middle_fingertip(&self) -> Landmark {
        self.points[MIDDLE_FINGERTIP]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_box_area() {
        let b = PersonBox {
            x: 10.0,
            y: 20.0,
            width: 100.0,
            height: 50.0,
            label: "person".into(),
            confidence: 0.9,
        };
        assert!((b.area() - 5000.0).abs() < f32::EPSILON);
        assert_eq!(b.center(), (60.0, 45.0));
    }

    #[test]
    fn test_named_landmarks() {
        let mut points = [Landmark { x: 0.0, y: 0.0, z: 0.0 }; HAND_LANDMARK_COUNT];
        points[WRIST] = Landmark { x: 0.5, y: 0.8, z: 0.0 };
        points[MIDDLE_FINGERTIP] = Landmark { x: 0.5, y: 0.3, z: -0.1 };
        let hand = HandLandmarks { points };
        assert_eq!(hand.wrist().y, 0.8);
        assert_eq!(hand.middle_fingertip().y, 0.3);
    }
}
