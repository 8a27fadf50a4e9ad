//! A single frame's measurement of one fiducial relative to the camera.

use std::f64::consts::FRAC_PI_2;

use nalgebra::{UnitQuaternion, Vector3};

use super::transform::Transform3D;

/// One normalized detection: fiducial identity, the two mutually inverse
/// camera/fiducial transforms, and the detector's error scalars.
///
/// `object_error` is used directly as a measurement-variance proxy by the
/// map engine; `image_error` is carried for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct Observation {
    /// Fiducial id. Should not repeat within one frame's observation set.
    pub id: u32,
    /// Transform from the camera frame to the fiducial frame.
    pub camera_to_fiducial: Transform3D,
    /// Exact inverse of `camera_to_fiducial`, precomputed.
    pub fiducial_to_camera: Transform3D,
    /// Detector reprojection error in image space (non-negative).
    pub image_error: f64,
    /// Detector object-space error, used as measurement variance (non-negative).
    pub object_error: f64,
}

impl Observation {
    /// Build an observation from a raw detection.
    ///
    /// ArUco-style detectors report markers with Y pointing forward and X
    /// to the right; REP-103 wants X-forward, Y-left. The raw transform is
    /// composed with a fixed 90° twist about +Z so that "forward" in the
    /// fiducial-relative frame matches the map convention.
    pub fn from_detection(
        id: u32,
        rotation: UnitQuaternion<f64>,
        translation: Vector3<f64>,
        image_error: f64,
        object_error: f64,
    ) -> Self {
        let correction = Transform3D::new(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2),
            Vector3::zeros(),
        );
        let camera_to_fiducial = Transform3D::new(rotation, translation).compose(&correction);
        Self::from_transform(id, camera_to_fiducial, image_error, object_error)
    }

    /// Build an observation from an already convention-corrected transform.
    ///
    /// Used when replaying recorded transforms that were normalized upstream.
    pub fn from_transform(
        id: u32,
        camera_to_fiducial: Transform3D,
        image_error: f64,
        object_error: f64,
    ) -> Self {
        Self {
            id,
            fiducial_to_camera: camera_to_fiducial.inverse(),
            camera_to_fiducial,
            image_error,
            object_error,
        }
    }

    /// Squared camera-relative translation magnitude of this detection.
    ///
    /// Used to pick the nearest fiducial during bootstrap.
    #[inline]
    pub fn camera_distance_sq(&self) -> f64 {
        self.fiducial_to_camera.translation.norm_squared()
    }
}
