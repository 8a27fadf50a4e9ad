//! A persistent map node: one fiducial's pose estimate and bookkeeping.

use std::collections::BTreeSet;

use super::fusion::{self, VarianceMode};
use super::transform::Transform3D;

/// A fiducial in the map: pose estimate, uncertainty, observation count,
/// adjacency set, and a publish timestamp for external throttling.
///
/// A variance of exactly `0.0` marks the fiducial as anchored: it fixes the
/// map's reference frame and is never fused again.
#[derive(Clone, Debug)]
pub struct Fiducial {
    /// Unique id within the map.
    pub id: u32,
    /// Pose in the map frame.
    pub pose: Transform3D,
    /// Scalar uncertainty; `0.0` means anchored and immutable.
    pub variance: f64,
    /// Number of times this fiducial has been fused with a new estimate.
    pub num_observations: u64,
    /// Ids of fiducials co-observed with this one (kept symmetric).
    pub links: BTreeSet<u32>,
    /// Timestamp of the last downstream publish, microseconds since epoch.
    /// Not part of the estimation logic.
    pub last_published_us: u64,
}

impl Fiducial {
    /// Create a fiducial from a pose estimate and its variance.
    pub fn new(id: u32, pose: Transform3D, variance: f64) -> Self {
        Self {
            id,
            pose,
            variance,
            num_observations: 0,
            links: BTreeSet::new(),
            last_published_us: 0,
        }
    }

    /// Whether this fiducial is anchored (variance locked to zero).
    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.variance == 0.0
    }

    /// Fuse a new pose estimate into this fiducial.
    ///
    /// Pose is combined by variance-weighted fusion, variance by the given
    /// strategy, and the observation counter is incremented. Anchored
    /// fiducials are left untouched.
    pub fn update(&mut self, new_pose: &Transform3D, new_variance: f64, mode: VarianceMode) {
        if self.is_anchored() {
            return;
        }

        let mean_prev = self.pose.translation;
        let fused = fusion::fuse(&self.pose, self.variance, new_pose, new_variance);

        self.variance = mode.combine(
            &fused.translation,
            &mean_prev,
            self.variance,
            &new_pose.translation,
            new_variance,
        );
        self.pose = fused;
        self.num_observations += 1;
    }

    /// Record that this fiducial was published downstream.
    #[inline]
    pub fn mark_published(&mut self, now_us: u64) {
        self.last_published_us = now_us;
    }
}
