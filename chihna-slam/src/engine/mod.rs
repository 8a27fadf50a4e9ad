//! Map engine: bootstrap state machine, relational map updates, and
//! observer pose estimation.
//!
//! # Pipeline
//!
//! ```text
//! Observations (per frame)
//!       │
//!       ▼
//! ┌──────────────┐   map empty + observations?
//! │ Mode switch  │ ──────────────────────────► Initializing
//! └──────┬───────┘
//!        │ Tracking
//!        ▼
//! ┌──────────────┐  O(k²) ordered pairs, insert-or-fuse,
//! │  update_map  │  symmetric links, save on insert
//! └──────┬───────┘
//!        ▼
//! ┌──────────────┐  sequential pairwise fusion over mapped
//! │ update_pose  │  observations → PoseEstimate
//! └──────────────┘
//! ```
//!
//! Bootstrap inserts the nearest observed fiducial as the map origin, fuses
//! it on re-observation, and anchors it (variance = 0) once the frame count
//! passes the configured threshold. No global relaxation is performed; each
//! frame is a bounded pass over the observation set and the current map.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::MapConfig;
use crate::core::{fusion, Fiducial, Observation, Transform3D};
use crate::error::Result;
use crate::io::map_format;

/// Floor applied to the reference fiducial's variance in the relational
/// update, so an anchored reference still contributes a nonzero term.
const REFERENCE_VARIANCE_FLOOR: f64 = 1e-5;

/// Engine operating mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapMode {
    /// Establishing the map origin from the nearest observed fiducial.
    Initializing,
    /// Steady-state: relational map updates plus pose estimation.
    Tracking,
}

/// Observer pose estimate for one frame, with its fused variance.
#[derive(Clone, Copy, Debug)]
pub struct PoseEstimate {
    /// Observer pose in the map frame.
    pub pose: Transform3D,
    /// Scalar uncertainty of the estimate.
    pub variance: f64,
}

/// One fiducial in a map snapshot, suitable for downstream transport.
#[derive(Clone, Debug, Serialize)]
pub struct MapEntry {
    pub id: u32,
    /// Translation in the map frame, meters.
    pub translation: [f64; 3],
    /// Roll/pitch/yaw rotation in the map frame, radians.
    pub rotation_rpy: [f64; 3],
}

/// Engine status for diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct MapStatus {
    pub mode: MapMode,
    pub frame_num: u64,
    pub num_fiducials: usize,
    pub origin_id: Option<u32>,
    /// Timestamp of the last processed frame, microseconds since epoch.
    pub last_frame_us: u64,
}

/// Incremental fiducial map and observer-pose estimator.
///
/// Owns the fiducial collection exclusively; one frame is processed to
/// completion before the next begins.
pub struct FiducialMap {
    config: MapConfig,
    fiducials: BTreeMap<u32, Fiducial>,
    frame_num: u64,
    mode: MapMode,
    origin_id: Option<u32>,
    last_frame_us: u64,
}

impl FiducialMap {
    /// Create an engine, seeding the map from `initial_map_file` when set,
    /// otherwise from `map_file`. A missing file means an empty map.
    pub fn new(config: MapConfig) -> Self {
        let mut map = Self {
            fiducials: BTreeMap::new(),
            frame_num: 0,
            mode: MapMode::Tracking,
            origin_id: None,
            last_frame_us: 0,
            config,
        };

        let seed = map
            .config
            .initial_map_file
            .clone()
            .unwrap_or_else(|| map.config.map_file.clone());

        if seed.exists() {
            match map_format::load_map(&seed) {
                Ok(loaded) => {
                    log::info!("loaded {} fiducials from {}", loaded.len(), seed.display());
                    map.fiducials = loaded;
                }
                Err(e) => log::warn!("could not load map from {}: {}", seed.display(), e),
            }
        } else {
            log::info!("no map at {}, starting empty", seed.display());
        }

        map
    }

    /// Process one frame of observations.
    ///
    /// Returns the observer pose estimate, or `None` while initializing or
    /// when no observed fiducial is in the map yet.
    pub fn update(
        &mut self,
        observations: &[Observation],
        timestamp_us: u64,
    ) -> Option<PoseEstimate> {
        self.frame_num += 1;
        self.last_frame_us = timestamp_us;

        log::info!(
            "frame {}: {} observations, {} fiducials in map",
            self.frame_num,
            observations.len(),
            self.fiducials.len()
        );

        if !observations.is_empty() && self.fiducials.is_empty() {
            self.mode = MapMode::Initializing;
        }

        match self.mode {
            MapMode::Initializing => {
                self.auto_init(observations);
                None
            }
            MapMode::Tracking => {
                self.update_map(observations);
                self.update_pose(observations)
            }
        }
    }

    /// Bootstrap step: establish and refine the map origin.
    fn auto_init(&mut self, observations: &[Observation]) {
        log::info!("auto-init, frame {}", self.frame_num);

        if self.fiducials.is_empty() {
            match nearest_observation(observations) {
                Some(o) => {
                    log::info!("initializing map from fiducial {}", o.id);
                    self.origin_id = Some(o.id);
                    self.fiducials.insert(
                        o.id,
                        Fiducial::new(o.id, o.camera_to_fiducial, o.object_error),
                    );
                }
                None => log::warn!("no observation available to initialize the map from"),
            }
        } else if let Some(origin_id) = self.origin_id {
            for o in observations.iter().filter(|o| o.id == origin_id) {
                if let Some(origin) = self.fiducials.get_mut(&origin_id) {
                    origin.update(
                        &o.camera_to_fiducial,
                        o.object_error,
                        self.config.variance_mode,
                    );
                }
            }
        }

        // Checked every bootstrap frame, whether or not the origin was
        // re-observed this frame.
        if self.frame_num > self.config.bootstrap_frames {
            if let Some(origin_id) = self.origin_id {
                if let Some(origin) = self.fiducials.get_mut(&origin_id) {
                    origin.variance = 0.0;
                    log::info!("anchored origin fiducial {}", origin_id);
                }
            }
            self.mode = MapMode::Tracking;
        }
    }

    /// Relational map update over every ordered pair of distinct
    /// observations: the first of the pair serves as reference, the second
    /// is inserted or fused. Links are recorded symmetrically either way.
    fn update_map(&mut self, observations: &[Observation]) {
        for o1 in observations {
            for o2 in observations {
                if o1.id == o2.id {
                    continue;
                }

                // The reference must already be mapped.
                let (ref_pose, ref_variance) = match self.fiducials.get(&o1.id) {
                    Some(f) => (f.pose, f.variance),
                    None => {
                        log::warn!("no map entry for reference fiducial {}", o1.id);
                        continue;
                    }
                };

                // Anchors are never overwritten.
                if self.fiducials.get(&o2.id).is_some_and(Fiducial::is_anchored) {
                    continue;
                }

                let fid1_to_fid2 = o1.camera_to_fiducial.compose(&o2.fiducial_to_camera);
                let candidate = ref_pose.compose(&fid1_to_fid2);

                log::debug!(
                    "estimate of {} via {}: ({:.3}, {:.3}, {:.3})",
                    o2.id,
                    o1.id,
                    candidate.translation.x,
                    candidate.translation.y,
                    candidate.translation.z
                );

                let variance = o1.object_error
                    + o2.object_error
                    + ref_variance.max(REFERENCE_VARIANCE_FLOOR);

                if self.fiducials.contains_key(&o2.id) {
                    if let Some(existing) = self.fiducials.get_mut(&o2.id) {
                        existing.update(&candidate, variance, self.config.variance_mode);
                    }
                } else {
                    log::info!("new fiducial {} from {}", o2.id, o1.id);
                    self.fiducials
                        .insert(o2.id, Fiducial::new(o2.id, candidate, variance));
                    if let Err(e) = self.save() {
                        log::warn!(
                            "could not save map to {}: {}",
                            self.config.map_file.display(),
                            e
                        );
                    }
                }

                self.link(o1.id, o2.id);
            }
        }
    }

    /// Estimate the observer pose by sequential pairwise fusion of the
    /// per-observation candidates, in observation order.
    ///
    /// This approximates a multi-constraint least-squares solve without
    /// forming a system matrix; cost is linear in the observed fiducials.
    /// The running variance always combines harmonically, independent of
    /// the map-fusion strategy.
    fn update_pose(&self, observations: &[Observation]) -> Option<PoseEstimate> {
        let mut estimate: Option<PoseEstimate> = None;

        for o in observations {
            let Some(f) = self.fiducials.get(&o.id) else {
                continue;
            };

            let candidate = f.pose.compose(&o.camera_to_fiducial);
            let variance = f.variance + o.object_error;

            log::debug!(
                "pose candidate from {}: ({:.3}, {:.3}, {:.3}) var {:.5}",
                o.id,
                candidate.translation.x,
                candidate.translation.y,
                candidate.translation.z,
                variance
            );

            estimate = Some(match estimate {
                None => PoseEstimate {
                    pose: candidate,
                    variance,
                },
                Some(acc) => PoseEstimate {
                    pose: fusion::fuse(&acc.pose, acc.variance, &candidate, variance),
                    variance: fusion::harmonic(acc.variance, variance),
                },
            });
        }

        if let Some(e) = &estimate {
            log::info!(
                "observer pose ({:.3}, {:.3}, {:.3}) var {:.5}",
                e.pose.translation.x,
                e.pose.translation.y,
                e.pose.translation.z,
                e.variance
            );
        }
        estimate
    }

    /// Record adjacency between two fiducials, symmetrically.
    fn link(&mut self, a: u32, b: u32) {
        if let Some(f) = self.fiducials.get_mut(&a) {
            f.links.insert(b);
        }
        if let Some(f) = self.fiducials.get_mut(&b) {
            f.links.insert(a);
        }
    }

    /// Persist the current fiducial collection to the configured map file.
    pub fn save(&self) -> Result<()> {
        map_format::save_map(&self.fiducials, &self.config.map_file)?;
        log::info!(
            "saved {} fiducials to {}",
            self.fiducials.len(),
            self.config.map_file.display()
        );
        Ok(())
    }

    /// Snapshot of the map for downstream transport or visualization.
    pub fn snapshot(&self) -> Vec<MapEntry> {
        self.fiducials
            .values()
            .map(|f| {
                let t = f.pose.translation;
                let (roll, pitch, yaw) = f.pose.euler_angles();
                MapEntry {
                    id: f.id,
                    translation: [t.x, t.y, t.z],
                    rotation_rpy: [roll, pitch, yaw],
                }
            })
            .collect()
    }

    /// Ids of fiducials not published within the last `min_interval_us`.
    pub fn stale_entries(&self, now_us: u64, min_interval_us: u64) -> Vec<u32> {
        self.fiducials
            .values()
            .filter(|f| now_us.saturating_sub(f.last_published_us) > min_interval_us)
            .map(|f| f.id)
            .collect()
    }

    /// Record that a fiducial was published downstream.
    pub fn mark_published(&mut self, id: u32, now_us: u64) {
        if let Some(f) = self.fiducials.get_mut(&id) {
            f.mark_published(now_us);
        }
    }

    /// Engine status for diagnostics.
    pub fn status(&self) -> MapStatus {
        MapStatus {
            mode: self.mode,
            frame_num: self.frame_num,
            num_fiducials: self.fiducials.len(),
            origin_id: self.origin_id,
            last_frame_us: self.last_frame_us,
        }
    }

    /// Current operating mode.
    pub fn mode(&self) -> MapMode {
        self.mode
    }

    /// The fiducial collection, keyed by id.
    pub fn fiducials(&self) -> &BTreeMap<u32, Fiducial> {
        &self.fiducials
    }

    /// Look up a single fiducial.
    pub fn get(&self, id: u32) -> Option<&Fiducial> {
        self.fiducials.get(&id)
    }

    /// Number of fiducials in the map.
    pub fn len(&self) -> usize {
        self.fiducials.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.fiducials.is_empty()
    }
}

/// The observation with minimum squared camera-relative translation.
/// Ties resolve to the first in input order.
fn nearest_observation(observations: &[Observation]) -> Option<&Observation> {
    let mut best: Option<&Observation> = None;
    for o in observations {
        let closer = match best {
            Some(b) => o.camera_distance_sq() < b.camera_distance_sq(),
            None => true,
        };
        if closer {
            best = Some(o);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VarianceMode;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::path::Path;

    fn test_config(dir: &Path) -> MapConfig {
        MapConfig {
            map_file: dir.join("map.txt"),
            initial_map_file: None,
            variance_mode: VarianceMode::Harmonic,
            bootstrap_frames: 10,
        }
    }

    fn obs_at(id: u32, translation: Vector3<f64>, object_error: f64) -> Observation {
        Observation::from_transform(
            id,
            Transform3D::new(UnitQuaternion::identity(), translation),
            0.0,
            object_error,
        )
    }

    #[test]
    fn test_first_frame_bootstraps_nearest() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = FiducialMap::new(test_config(dir.path()));

        // Single observation of fiducial 5 at distance 1.0
        let result = map.update(&[obs_at(5, Vector3::new(1.0, 0.0, 0.0), 0.01)], 0);

        assert!(result.is_none());
        assert_eq!(map.mode(), MapMode::Initializing);
        let f = map.get(5).unwrap();
        assert_relative_eq!(f.variance, 0.01, epsilon = 1e-12);
        assert_eq!(f.num_observations, 0);
    }

    #[test]
    fn test_bootstrap_picks_minimum_distance() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = FiducialMap::new(test_config(dir.path()));

        map.update(
            &[
                obs_at(1, Vector3::new(3.0, 0.0, 0.0), 0.01),
                obs_at(2, Vector3::new(0.5, 0.0, 0.0), 0.01),
                obs_at(3, Vector3::new(2.0, 0.0, 0.0), 0.01),
            ],
            0,
        );

        assert_eq!(map.status().origin_id, Some(2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_bootstrap_tie_resolves_to_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = FiducialMap::new(test_config(dir.path()));

        map.update(
            &[
                obs_at(8, Vector3::new(1.0, 0.0, 0.0), 0.01),
                obs_at(9, Vector3::new(0.0, 1.0, 0.0), 0.01),
            ],
            0,
        );

        assert_eq!(map.status().origin_id, Some(8));
    }

    #[test]
    fn test_empty_first_frame_stays_initializing_on_next() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = FiducialMap::new(test_config(dir.path()));

        // Nothing observed: map stays empty and no mode is forced
        assert!(map.update(&[], 0).is_none());
        assert!(map.is_empty());

        // A later frame with an observation starts bootstrap normally
        map.update(&[obs_at(4, Vector3::new(1.0, 0.0, 0.0), 0.02)], 1);
        assert_eq!(map.mode(), MapMode::Initializing);
        assert_eq!(map.status().origin_id, Some(4));
    }

    #[test]
    fn test_origin_anchored_after_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = FiducialMap::new(test_config(dir.path()));

        // Fiducial 5 re-observed every frame through frame 11
        let o = obs_at(5, Vector3::new(1.0, 0.0, 0.0), 0.01);
        for frame in 1..=10 {
            map.update(&[o], frame);
            assert_eq!(map.mode(), MapMode::Initializing);
            assert!(map.get(5).unwrap().variance > 0.0);
        }

        map.update(&[o], 11);
        assert_eq!(map.mode(), MapMode::Tracking);
        assert_eq!(map.get(5).unwrap().variance, 0.0);
        assert!(map.get(5).unwrap().is_anchored());
    }

    #[test]
    fn test_anchoring_does_not_require_origin_in_view() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = FiducialMap::new(test_config(dir.path()));

        map.update(&[obs_at(5, Vector3::new(1.0, 0.0, 0.0), 0.01)], 1);
        // Origin out of view for the rest of bootstrap
        let other = obs_at(6, Vector3::new(2.0, 0.0, 0.0), 0.01);
        for frame in 2..=11 {
            map.update(&[other], frame);
        }

        assert_eq!(map.mode(), MapMode::Tracking);
        assert!(map.get(5).unwrap().is_anchored());
    }

    /// Build a tracking-mode map whose fiducial 1 is anchored at identity.
    fn anchored_map(dir: &Path) -> FiducialMap {
        let mut fiducials = BTreeMap::new();
        fiducials.insert(1, Fiducial::new(1, Transform3D::identity(), 0.0));

        let initial = dir.join("initial.txt");
        map_format::save_map(&fiducials, &initial).unwrap();

        let mut config = test_config(dir);
        config.initial_map_file = Some(initial);
        FiducialMap::new(config)
    }

    #[test]
    fn test_new_fiducial_inserted_from_reference() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = anchored_map(dir.path());

        // The camera sees anchored 1 and unknown 2 in the same frame
        let o1 = obs_at(1, Vector3::new(1.0, 0.0, 0.0), 0.02);
        let o2 = obs_at(2, Vector3::new(0.0, 2.0, 0.0), 0.02);
        let estimate = map.update(&[o1, o2], 100);

        let f2 = map.get(2).unwrap();

        // pose(2) = pose(1) ∘ (o1.camera_to_fiducial ∘ o2.fiducial_to_camera)
        let expected = Transform3D::identity()
            .compose(&o1.camera_to_fiducial.compose(&o2.fiducial_to_camera));
        assert!(f2.pose.approx_eq(&expected, 1e-10, 1e-10));

        // variance = 0.02 + 0.02 + max(0, 1e-5)
        assert_relative_eq!(f2.variance, 0.04001, epsilon = 1e-12);
        assert_eq!(f2.num_observations, 0);

        // links recorded symmetrically on insert
        assert!(map.get(1).unwrap().links.contains(&2));
        assert!(map.get(2).unwrap().links.contains(&1));

        // the frame also yields a pose estimate (fiducial 1 is mapped)
        assert!(estimate.is_some());

        // insertion triggered a save
        assert!(dir.path().join("map.txt").exists());
    }

    #[test]
    fn test_reobservation_fuses_and_links() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = anchored_map(dir.path());

        let o1 = obs_at(1, Vector3::new(1.0, 0.0, 0.0), 0.02);
        let o2 = obs_at(2, Vector3::new(0.0, 2.0, 0.0), 0.02);

        map.update(&[o1, o2], 100);
        let var_after_insert = map.get(2).unwrap().variance;

        map.update(&[o1, o2], 200);
        let f2 = map.get(2).unwrap();
        assert!(f2.variance < var_after_insert);
        assert_eq!(f2.num_observations, 1);
    }

    #[test]
    fn test_anchor_never_overwritten_by_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = anchored_map(dir.path());

        let o1 = obs_at(1, Vector3::new(1.0, 0.0, 0.0), 0.02);
        let o2 = obs_at(2, Vector3::new(0.0, 2.0, 0.0), 0.02);

        for frame in 0..5 {
            map.update(&[o1, o2], frame);
        }

        let f1 = map.get(1).unwrap();
        assert!(f1.is_anchored());
        assert!(f1.pose.approx_eq(&Transform3D::identity(), 1e-12, 1e-12));
    }

    #[test]
    fn test_unknown_reference_pair_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = anchored_map(dir.path());

        // Neither 7 nor 8 is mapped; only pairs referenced from 1 can land
        let o1 = obs_at(7, Vector3::new(1.0, 0.0, 0.0), 0.02);
        let o2 = obs_at(8, Vector3::new(0.0, 2.0, 0.0), 0.02);
        let estimate = map.update(&[o1, o2], 100);

        assert_eq!(map.len(), 1);
        assert!(estimate.is_none());
    }

    #[test]
    fn test_link_symmetry_over_many_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = anchored_map(dir.path());

        let observations = [
            obs_at(1, Vector3::new(1.0, 0.0, 0.0), 0.02),
            obs_at(2, Vector3::new(0.0, 2.0, 0.0), 0.02),
            obs_at(3, Vector3::new(0.0, 0.0, 1.5), 0.03),
        ];

        for frame in 0..6 {
            map.update(&observations, frame);
        }

        for f in map.fiducials().values() {
            for link in &f.links {
                assert!(
                    map.get(*link).unwrap().links.contains(&f.id),
                    "link {} -> {} not symmetric",
                    f.id,
                    link
                );
            }
        }
    }

    #[test]
    fn test_update_pose_fuses_candidates_sequentially() {
        let dir = tempfile::tempdir().unwrap();

        // A fully surveyed map: both fiducials anchored, so the relational
        // pass leaves them untouched and the estimate is exact.
        let mut fiducials = BTreeMap::new();
        fiducials.insert(1, Fiducial::new(1, Transform3D::identity(), 0.0));
        fiducials.insert(
            2,
            Fiducial::new(
                2,
                Transform3D::new(UnitQuaternion::identity(), Vector3::new(2.0, 0.0, 0.0)),
                0.0,
            ),
        );
        let initial = dir.path().join("initial.txt");
        map_format::save_map(&fiducials, &initial).unwrap();

        let mut config = test_config(dir.path());
        config.initial_map_file = Some(initial);
        let mut map = FiducialMap::new(config);

        // Candidate from 1: (1, 0, 0); candidate from 2: (3, 0, 0); both var 0.01
        let o1 = obs_at(1, Vector3::new(1.0, 0.0, 0.0), 0.01);
        let o2 = obs_at(2, Vector3::new(1.0, 0.0, 0.0), 0.01);
        let estimate = map.update(&[o1, o2], 0).unwrap();

        // Equal variances: midpoint translation, harmonic variance
        assert_relative_eq!(estimate.pose.translation.x, 2.0, epsilon = 1e-10);
        assert_relative_eq!(estimate.variance, 0.005, epsilon = 1e-12);
    }

    #[test]
    fn test_snapshot_lists_all_fiducials() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = anchored_map(dir.path());

        let o1 = obs_at(1, Vector3::new(1.0, 0.0, 0.0), 0.02);
        let o2 = obs_at(2, Vector3::new(0.0, 2.0, 0.0), 0.02);
        map.update(&[o1, o2], 100);

        let snapshot = map.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, 1);
        assert_eq!(snapshot[1].id, 2);
    }

    #[test]
    fn test_publish_throttling() {
        let dir = tempfile::tempdir().unwrap();
        let mut map = anchored_map(dir.path());

        assert_eq!(map.stale_entries(2_000_000, 1_000_000), vec![1]);
        map.mark_published(1, 2_000_000);
        assert!(map.stale_entries(2_500_000, 1_000_000).is_empty());
        assert_eq!(map.stale_entries(3_500_000, 1_000_000), vec![1]);
    }
}
