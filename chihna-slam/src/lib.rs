//! # Chihna-SLAM: fiducial-marker mapping and localization
//!
//! An incremental SLAM core for fixed visual landmarks (fiducials): it
//! grows a consistent map of marker poses from relative observations and
//! estimates the observer's pose each frame, weighted by per-observation
//! uncertainty.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chihna_slam::{FiducialMap, MapConfig, Observation};
//! use nalgebra::{UnitQuaternion, Vector3};
//!
//! let mut map = FiducialMap::new(MapConfig::default());
//!
//! // One frame of detections from the marker frontend
//! let observations = vec![Observation::from_detection(
//!     5,
//!     UnitQuaternion::identity(),
//!     Vector3::new(1.0, 0.0, 0.5),
//!     0.4,   // image error
//!     0.01,  // object error (variance proxy)
//! )];
//!
//! if let Some(estimate) = map.update(&observations, 1_000_000) {
//!     println!(
//!         "observer at ({:.2}, {:.2}, {:.2}), variance {:.4}",
//!         estimate.pose.translation.x,
//!         estimate.pose.translation.y,
//!         estimate.pose.translation.z,
//!         estimate.variance
//!     );
//! }
//! ```
//!
//! ## Coordinate Frame
//!
//! All transforms follow the ROS REP-103 convention (X-forward, Y-left,
//! Z-up, right-handed). Raw ArUco-style detections are corrected by a
//! fixed 90° twist about +Z in [`Observation::from_detection`].
//!
//! ## Architecture
//!
//! - [`core`]: transforms, observations, fiducials, weighted fusion
//! - [`config`]: YAML-loadable engine configuration
//! - [`engine`]: the map engine (bootstrap state machine, relational
//!   updates, pose estimation)
//! - [`io`]: line-oriented text persistence of the map
//! - [`error`]: crate error type
//!
//! The engine is single-threaded and synchronous: one frame is processed
//! to completion before the next begins, and the fiducial collection is
//! owned exclusively by the engine. External readers consume the snapshot
//! returned by [`engine::FiducialMap::snapshot`].

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod io;

pub use config::MapConfig;
pub use core::{Fiducial, Observation, Transform3D, VarianceMode};
pub use engine::{FiducialMap, MapEntry, MapMode, MapStatus, PoseEstimate};
pub use error::{MapError, Result};
