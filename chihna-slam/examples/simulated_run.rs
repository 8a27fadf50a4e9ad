//! Simulated run: a camera translating past three wall-mounted markers.
//!
//! Observations are synthesized from ground-truth marker poses, the map
//! bootstraps on the nearest marker, and the estimated observer track is
//! printed per frame.
//!
//! ```bash
//! cargo run --example simulated_run
//! ```

use nalgebra::{UnitQuaternion, Vector3};

use chihna_slam::{FiducialMap, MapConfig, Observation, Transform3D};

fn main() {
    let map_file = std::env::temp_dir().join("chihna_demo_map.txt");
    let _ = std::fs::remove_file(&map_file);

    let config = MapConfig {
        map_file,
        ..MapConfig::default()
    };
    let mut map = FiducialMap::new(config);

    // Ground truth: three markers along a wall two meters ahead (map frame)
    let markers = [
        (10u32, Vector3::new(2.0, -1.0, 0.3)),
        (11u32, Vector3::new(2.0, 0.0, 0.3)),
        (12u32, Vector3::new(2.0, 1.0, 0.3)),
    ];

    for frame in 0..30u64 {
        // Camera slides sideways along the wall
        let camera = Transform3D::new(
            UnitQuaternion::identity(),
            Vector3::new(0.0, -1.5 + 0.1 * frame as f64, 0.0),
        );

        // Markers within ~1.8m of the camera are "detected" this frame
        let observations: Vec<Observation> = markers
            .iter()
            .filter(|(_, position)| (position - camera.translation).norm() < 1.8)
            .map(|&(id, position)| {
                let marker = Transform3D::new(UnitQuaternion::identity(), position);
                let camera_to_fiducial = marker.inverse().compose(&camera);
                Observation::from_transform(id, camera_to_fiducial, 0.3, 0.01)
            })
            .collect();

        let estimate = map.update(&observations, frame * 100_000);
        match estimate {
            Some(e) => println!(
                "frame {:2}: {} markers in view, observer estimate ({:+.2}, {:+.2}, {:+.2}) var {:.5}",
                frame,
                observations.len(),
                e.pose.translation.x,
                e.pose.translation.y,
                e.pose.translation.z,
                e.variance
            ),
            None => println!(
                "frame {:2}: {} markers in view, initializing",
                frame,
                observations.len()
            ),
        }
    }

    println!("\nfinal map:");
    for entry in map.snapshot() {
        println!(
            "  fiducial {:2} at ({:+.2}, {:+.2}, {:+.2})",
            entry.id, entry.translation[0], entry.translation[1], entry.translation[2]
        );
    }
}
