//! Core classification and vectorization modules

pub mod classify;
pub mod indices;
pub mod morphology;
pub mod overlay;
pub mod polygonize;

// Re-export main types
pub use classify::{ClassifierParams, RuleClassifier, SceneClassMap};
pub use indices::{autoscale, compute_indices, SpectralIndices};
pub use morphology::{clean_labels, closing, remove_small_objects, CleaningParams};
pub use overlay::{force_water, OverlayReport};
pub use polygonize::{estimate_area_m2, extract_polygons, vectorize, PolygonizeParams};
