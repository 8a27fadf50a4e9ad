//! Line-oriented text format for the fiducial map.
//!
//! One record per fiducial, newline-terminated:
//!
//! ```text
//! <id> <tx> <ty> <tz> <roll_deg> <pitch_deg> <yaw_deg> <variance> <num_obs> <link1> <link2> ...
//! ```
//!
//! Rotation is stored as roll/pitch/yaw Euler angles in degrees; the link
//! list is variable-length and may be empty. Floats are written with Rust's
//! shortest round-trip formatting, so translation survives save/load
//! exactly. Lines that do not parse the nine fixed fields are skipped.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Vector3;

use crate::core::{Fiducial, Transform3D};
use crate::error::Result;

/// Save the whole fiducial collection to `path`, overwriting it.
///
/// Creates parent directories as needed. Single pass; the file always
/// reflects one complete collection state.
pub fn save_map(fiducials: &BTreeMap<u32, Fiducial>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for f in fiducials.values() {
        let t = f.pose.translation;
        let (roll, pitch, yaw) = f.pose.euler_angles();

        write!(
            writer,
            "{} {} {} {} {} {} {} {} {}",
            f.id,
            t.x,
            t.y,
            t.z,
            roll.to_degrees(),
            pitch.to_degrees(),
            yaw.to_degrees(),
            f.variance,
            f.num_observations
        )?;
        for link in &f.links {
            write!(writer, " {}", link)?;
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

/// Load a fiducial collection from `path`.
///
/// Malformed lines are skipped rather than failing the whole file. A
/// missing file is an I/O error; callers that want "missing file means
/// empty map" check existence first.
pub fn load_map(path: &Path) -> Result<BTreeMap<u32, Fiducial>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut fiducials = BTreeMap::new();
    for line in reader.lines() {
        let line = line?;
        match parse_record(&line) {
            Some(f) => {
                fiducials.insert(f.id, f);
            }
            None => {
                if !line.trim().is_empty() {
                    log::debug!("skipping malformed map record: {:?}", line);
                }
            }
        }
    }

    Ok(fiducials)
}

/// Parse one record line, or `None` if the fixed fields do not parse.
fn parse_record(line: &str) -> Option<Fiducial> {
    let mut fields = line.split_whitespace();

    let id: u32 = fields.next()?.parse().ok()?;
    let mut values = [0.0f64; 7];
    for value in values.iter_mut() {
        *value = fields.next()?.parse().ok()?;
    }
    let num_observations: u64 = fields.next()?.parse().ok()?;

    let pose = Transform3D::from_euler_angles(
        values[3].to_radians(),
        values[4].to_radians(),
        values[5].to_radians(),
        Vector3::new(values[0], values[1], values[2]),
    );

    let mut fiducial = Fiducial::new(id, pose, values[6]);
    fiducial.num_observations = num_observations;
    fiducial.links = fields.filter_map(|s| s.parse().ok()).collect();
    Some(fiducial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_map() -> BTreeMap<u32, Fiducial> {
        let mut fiducials = BTreeMap::new();

        let mut origin = Fiducial::new(1, Transform3D::identity(), 0.0);
        origin.links.insert(2);
        fiducials.insert(1, origin);

        let mut other = Fiducial::new(
            2,
            Transform3D::from_euler_angles(0.1, -0.25, 1.3, Vector3::new(0.5, -1.25, 2.0)),
            0.04001,
        );
        other.num_observations = 7;
        other.links.insert(1);
        fiducials.insert(2, other);

        fiducials
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.txt");

        let original = sample_map();
        save_map(&original, &path).unwrap();
        let loaded = load_map(&path).unwrap();

        assert_eq!(loaded.len(), original.len());
        for (id, f) in &original {
            let l = &loaded[id];
            assert_eq!(l.id, f.id);
            // Translation is exact; rotation within the degree round-trip
            assert_eq!(l.pose.translation, f.pose.translation);
            assert!(l.pose.rotation.angle_to(&f.pose.rotation) < 1e-4);
            assert_eq!(l.variance, f.variance);
            assert_eq!(l.num_observations, f.num_observations);
            assert_eq!(l.links, f.links);
        }
    }

    #[test]
    fn test_round_trip_empty_link_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.txt");

        let mut fiducials = BTreeMap::new();
        fiducials.insert(5, Fiducial::new(5, Transform3D::identity(), 0.01));

        save_map(&fiducials, &path).unwrap();
        let loaded = load_map(&path).unwrap();

        assert_eq!(loaded.len(), 1);
        assert!(loaded[&5].links.is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.txt");

        std::fs::write(
            &path,
            "3 1 2 3 0 0 90 0.5 4 7\n\
             not a record\n\
             9 1 2\n\
             11 0 0 0 0 0 0 0.25 0\n",
        )
        .unwrap();

        let loaded = load_map(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains_key(&3));
        assert!(loaded.contains_key(&11));

        let f = &loaded[&3];
        let (_, _, yaw) = f.pose.euler_angles();
        assert_relative_eq!(yaw.to_degrees(), 90.0, epsilon = 1e-9);
        assert_eq!(f.links.iter().copied().collect::<Vec<_>>(), vec![7]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_map(Path::new("/nonexistent/chihna/map.txt")).unwrap_err();
        assert!(matches!(err, crate::error::MapError::Io(_)));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("map.txt");

        save_map(&sample_map(), &path).unwrap();
        assert!(path.exists());
    }
}
