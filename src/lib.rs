//! Groundcover: a fast, modular land-cover training-label generator
//!
//! This library derives machine-learning training polygons from multiband
//! satellite imagery by combining a scene classification layer (when
//! present), spectral-index thresholding, optional vector overlays, and
//! geometric cleanup.

pub mod core;
pub mod io;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    Band, BandGrid, ClassGrid, CoordinateSystem, GeoTransform, IndexGrid, LabelError, LabelGrid,
    LabelResult, LandCoverClass, MaskGrid, OverlayLayer, PolygonRecord, SceneRaster,
};

pub use self::core::{
    autoscale, clean_labels, compute_indices, estimate_area_m2, extract_polygons, force_water,
    vectorize, ClassifierParams, CleaningParams, OverlayReport, PolygonizeParams, RuleClassifier,
    SceneClassMap, SpectralIndices,
};

pub use io::{read_overlay, write_polygons};

pub use pipeline::{PipelineConfig, TrainingPipeline};
