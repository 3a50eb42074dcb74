//! I/O boundary modules

pub mod geojson;

pub use geojson::{read_overlay, write_polygons};
