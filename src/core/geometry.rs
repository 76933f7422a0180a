//! Geometric feature extraction from a single landmark frame.
//!
//! Everything here is pure and synchronous. Missing or malformed landmarks
//! degrade to neutral values (a straight-ahead pose, a centered gaze) and
//! never fail.

use crate::core::landmarks::{
    LandmarkFrame, CHIN, FOREHEAD, LEFT_EYE_INNER, LEFT_EYE_OUTER, LEFT_IRIS_CENTER, NOSE_TIP,
    RIGHT_EYE_INNER, RIGHT_EYE_OUTER, RIGHT_IRIS_CENTER,
};
use serde::{Deserialize, Serialize};

/// Substitute for near-zero denominators.
pub const DENOMINATOR_EPSILON: f64 = 1e-3;

/// Head orientation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    /// Rotation about the vertical axis (left/right)
    pub yaw: f64,
    /// Rotation about the lateral axis (up/down)
    pub pitch: f64,
    /// Rotation about the frontal axis (tilt)
    pub roll: f64,
}

/// Features derived for one tick with a face present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceFeatures {
    pub head_pose: HeadPose,
    /// 0 = eyes centered, 1 = fully averted
    pub gaze_score: f64,
}

/// Replace a near-zero magnitude with the epsilon.
fn guard_denominator(value: f64) -> f64 {
    if value.abs() < DENOMINATOR_EPSILON {
        DENOMINATOR_EPSILON
    } else {
        value
    }
}

/// Compute yaw, pitch and roll from the nose, eye corners, forehead and chin.
///
/// Yaw is the nose's horizontal offset from the eye midpoint normalized by
/// inter-eye distance, mapped through `atan(2 * offset)`. Pitch uses the
/// vertical offset from the forehead/chin midpoint normalized by face height.
/// Roll is the angle of the outer-eye-corner line.
pub fn compute_head_pose(frame: &LandmarkFrame) -> HeadPose {
    let (Some(nose), Some(left_eye), Some(right_eye), Some(chin), Some(forehead)) = (
        frame.get(NOSE_TIP),
        frame.get(LEFT_EYE_OUTER),
        frame.get(RIGHT_EYE_OUTER),
        frame.get(CHIN),
        frame.get(FOREHEAD),
    ) else {
        tracing::trace!(points = frame.len(), "pose landmarks missing, using neutral pose");
        return HeadPose::default();
    };

    let eye_mid_x = (left_eye.x + right_eye.x) / 2.0;
    let eye_distance = guard_denominator((left_eye.x - right_eye.x).abs());
    let nose_offset = (nose.x - eye_mid_x) / eye_distance;
    let yaw = (nose_offset * 2.0).atan().to_degrees();

    let face_mid_y = (forehead.y + chin.y) / 2.0;
    let face_height = guard_denominator((chin.y - forehead.y).abs());
    let nose_vert_offset = (nose.y - face_mid_y) / face_height;
    let pitch = (nose_vert_offset * 2.0).atan().to_degrees();

    let roll = (right_eye.y - left_eye.y)
        .atan2(right_eye.x - left_eye.x)
        .to_degrees();

    HeadPose { yaw, pitch, roll }
}

/// Horizontal off-center offset of one iris within its eye opening.
fn eye_offset(frame: &LandmarkFrame, iris: usize, near: usize, far: usize) -> Option<f64> {
    let iris = frame.get(iris)?;
    let near = frame.get(near)?;
    let far = frame.get(far)?;

    let width = guard_denominator((far.x - near.x).abs());
    let ratio = (iris.x - near.x) / width;
    Some((ratio - 0.5).abs() * 2.0)
}

/// Compute how far the irises sit from the center of the eye openings.
///
/// Returns 0 when the detector lacks iris support or the iris points are
/// missing. The result is always within [0, 1].
pub fn compute_gaze_score(frame: &LandmarkFrame, iris_available: bool) -> f64 {
    if !iris_available {
        return 0.0;
    }

    let left = eye_offset(frame, LEFT_IRIS_CENTER, LEFT_EYE_OUTER, LEFT_EYE_INNER);
    let right = eye_offset(frame, RIGHT_IRIS_CENTER, RIGHT_EYE_INNER, RIGHT_EYE_OUTER);

    let (Some(left), Some(right)) = (left, right) else {
        return 0.0;
    };

    let score = (left + right) / 2.0;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Extract head pose and gaze score from a non-empty frame.
pub fn extract_features(frame: &LandmarkFrame, iris_available: bool) -> FaceFeatures {
    FaceFeatures {
        head_pose: compute_head_pose(frame),
        gaze_score: compute_gaze_score(frame, iris_available),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Synthetic landmark frames for tests.

    use crate::core::landmarks::{
        LandmarkFrame, Point3D, CHIN, FACE_MESH_POINTS, FACE_MESH_WITH_IRIS_POINTS, FOREHEAD,
        LEFT_EYE_INNER, LEFT_EYE_OUTER, LEFT_IRIS_CENTER, NOSE_TIP, RIGHT_EYE_INNER,
        RIGHT_EYE_OUTER, RIGHT_IRIS_CENTER,
    };

    /// A level face whose nose is offset so that the derived yaw equals `yaw_deg`.
    ///
    /// Eye corners sit at x = 0.4 and x = 0.6, so the inter-eye distance is 0.2
    /// and `offset = tan(yaw) / 2`.
    pub fn face_with_yaw(yaw_deg: f64) -> LandmarkFrame {
        face(yaw_deg, 0.0, false)
    }

    /// A face with iris points shifted by `iris_shift` of the eye width
    /// from center (0 = centered, 0.5 = at the corner).
    pub fn face_with_gaze(iris_shift: f64) -> LandmarkFrame {
        face(0.0, iris_shift, true)
    }

    pub fn face(yaw_deg: f64, iris_shift: f64, with_iris: bool) -> LandmarkFrame {
        let count = if with_iris {
            FACE_MESH_WITH_IRIS_POINTS
        } else {
            FACE_MESH_POINTS
        };
        let mut points = vec![Point3D::new(0.5, 0.5, 0.0); count];

        let offset = yaw_deg.to_radians().tan() / 2.0;
        points[LEFT_EYE_OUTER] = Point3D::new(0.4, 0.4, 0.0);
        points[RIGHT_EYE_OUTER] = Point3D::new(0.6, 0.4, 0.0);
        points[NOSE_TIP] = Point3D::new(0.5 + offset * 0.2, 0.5, 0.0);
        points[FOREHEAD] = Point3D::new(0.5, 0.2, 0.0);
        points[CHIN] = Point3D::new(0.5, 0.8, 0.0);

        // Each eye is 0.06 wide.
        points[LEFT_EYE_INNER] = Point3D::new(0.46, 0.4, 0.0);
        points[RIGHT_EYE_INNER] = Point3D::new(0.54, 0.4, 0.0);

        if with_iris {
            points[LEFT_IRIS_CENTER] = Point3D::new(0.43 + iris_shift * 0.06, 0.4, 0.0);
            points[RIGHT_IRIS_CENTER] = Point3D::new(0.57 + iris_shift * 0.06, 0.4, 0.0);
        }

        LandmarkFrame::new(points)
    }
}
