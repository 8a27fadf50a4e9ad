//! Persistence of the fiducial map.

pub mod map_format;
