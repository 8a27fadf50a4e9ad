//! Uncertainty-weighted pose fusion primitives.
//!
//! Two estimates of the same pose are combined using their scalar variances
//! as inverse weights: translation by linear blend, rotation by spherical
//! interpolation. The combined variance is computed by a selectable
//! [`VarianceMode`] strategy.

use std::f64::consts::PI;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::transform::Transform3D;

/// Floor applied to the harmonically combined variance.
pub const MIN_COMBINED_VARIANCE: f64 = 1e-6;

/// Clamp range for the overlap-aware variance estimate.
const OVERLAP_VARIANCE_MIN: f64 = 1e-3;
const OVERLAP_VARIANCE_MAX: f64 = 100.0;

/// Epsilon below which slerp considers the two rotations antipodal.
const SLERP_EPSILON: f64 = 1e-9;

/// Fuse two pose estimates using their variances as weights.
///
/// Translation is the variance-weighted blend
/// `(var_a * t_b + var_b * t_a) / (var_a + var_b)`; rotation is the
/// spherical interpolation from `a` toward `b` by `var_a / (var_a + var_b)`,
/// renormalized. The lower-variance input therefore dominates the result.
///
/// `var_a + var_b` must be positive; callers floor their variances above
/// zero before fusing.
pub fn fuse(a: &Transform3D, var_a: f64, b: &Transform3D, var_b: f64) -> Transform3D {
    let total = var_a + var_b;
    debug_assert!(total > 0.0, "fuse called with zero total variance");

    let t = var_a / total;
    let translation = (b.translation * var_a + a.translation * var_b) / total;

    // try_slerp fails only when the rotations are antipodal; fall back to
    // the dominant endpoint in that case.
    let rotation = a
        .rotation
        .try_slerp(&b.rotation, t, SLERP_EPSILON)
        .unwrap_or(if t < 0.5 { a.rotation } else { b.rotation });

    Transform3D::new(rotation, translation)
}

/// Harmonic combination of two variances, floored at [`MIN_COMBINED_VARIANCE`].
///
/// Ignores the positional overlap of the two estimates. Fusing two equal
/// variances `v` yields `v / 2`.
pub fn harmonic(var_a: f64, var_b: f64) -> f64 {
    (1.0 / (1.0 / var_a + 1.0 / var_b)).max(MIN_COMBINED_VARIANCE)
}

/// Strategy for combining the variances of two fused pose estimates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceMode {
    /// Harmonic mean of the inverse variances (default). Cheap and stable.
    #[default]
    Harmonic,
    /// Scales the combined variance by the positional discrepancy between
    /// each input mean and the fused mean. Does not converge reliably;
    /// kept as an extension point, not a recommendation.
    Overlap,
}

impl VarianceMode {
    /// Combine the variances of two estimates whose fused mean is `fused_mean`.
    pub fn combine(
        self,
        fused_mean: &Vector3<f64>,
        mean_a: &Vector3<f64>,
        var_a: f64,
        mean_b: &Vector3<f64>,
        var_b: f64,
    ) -> f64 {
        match self {
            VarianceMode::Harmonic => harmonic(var_a, var_b),
            VarianceMode::Overlap => {
                let d_a = (mean_a - fused_mean).norm_squared();
                let d_b = (mean_b - fused_mean).norm_squared();
                let v = (2.0 * PI).sqrt()
                    * var_a
                    * var_b
                    * (d_a / (2.0 * var_a) + d_b / (2.0 * var_b)).exp();
                v.clamp(OVERLAP_VARIANCE_MIN, OVERLAP_VARIANCE_MAX)
            }
        }
    }
}
