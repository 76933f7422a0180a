//! Landmark frames produced by the external face landmark detector.
//!
//! Points are normalized to the video frame (x, y, z in [0, 1]) and indexed
//! positionally using the 468-point face mesh topology, extended with ten
//! iris points (468..478) when the detector supports them.

use serde::{Deserialize, Serialize};

/// Nose tip.
pub const NOSE_TIP: usize = 1;
/// Top of the forehead.
pub const FOREHEAD: usize = 10;
/// Bottom of the chin.
pub const CHIN: usize = 152;
/// Outer corner of the eye on the image-left side.
pub const LEFT_EYE_OUTER: usize = 33;
/// Inner corner of the eye on the image-left side.
pub const LEFT_EYE_INNER: usize = 133;
/// Outer corner of the eye on the image-right side.
pub const RIGHT_EYE_OUTER: usize = 263;
/// Inner corner of the eye on the image-right side.
pub const RIGHT_EYE_INNER: usize = 362;
/// Iris center, image-left eye.
pub const LEFT_IRIS_CENTER: usize = 468;
/// Iris center, image-right eye.
pub const RIGHT_IRIS_CENTER: usize = 473;

/// Point count of the base face mesh.
pub const FACE_MESH_POINTS: usize = 468;
/// Point count when iris refinement is enabled.
pub const FACE_MESH_WITH_IRIS_POINTS: usize = 478;

/// A single normalized 3D point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// True when every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Point3D {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Landmarks for one detected face on one sampling tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkFrame {
    pub points: Vec<Point3D>,
}

impl LandmarkFrame {
    pub fn new(points: Vec<Point3D>) -> Self {
        Self { points }
    }

    /// Number of points in the frame.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Look up a landmark by index.
    ///
    /// Returns `None` for indices past the end and for points with
    /// non-finite coordinates, so callers never read garbage.
    pub fn get(&self, index: usize) -> Option<Point3D> {
        self.points.get(index).copied().filter(Point3D::is_finite)
    }
}

/// What the landmark detector can produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorCapabilities {
    /// The detector emits iris centers (indices 468..478).
    pub iris_landmarks: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_rejects_out_of_range_and_non_finite() {
        let frame = LandmarkFrame::new(vec![
            Point3D::new(0.1, 0.2, 0.0),
            Point3D::new(f64::NAN, 0.5, 0.0),
        ]);

        assert_eq!(frame.get(0), Some(Point3D::new(0.1, 0.2, 0.0)));
        assert_eq!(frame.get(1), None);
        assert_eq!(frame.get(2), None);
    }

    #[test]
    fn test_point_from_array() {
        let p: Point3D = [0.25, 0.5, -0.1].into();
        assert_eq!(p, Point3D::new(0.25, 0.5, -0.1));
    }
}
