//! Pipeline orchestration: indices → classification → overlay → cleanup →
//! polygon extraction.

use crate::core::classify::{ClassifierParams, RuleClassifier};
use crate::core::indices::compute_indices;
use crate::core::morphology::{clean_labels, CleaningParams};
use crate::core::overlay::force_water;
use crate::core::polygonize::{extract_polygons, PolygonizeParams};
use crate::types::{LabelGrid, LabelResult, OverlayLayer, PolygonRecord, SceneRaster};
use serde::{Deserialize, Serialize};

/// Full configuration for one training-label run.
///
/// Defaults reproduce the standard processing constants; tests override
/// individual thresholds without touching process-wide state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub classifier: ClassifierParams,
    pub cleaning: CleaningParams,
    pub polygonize: PolygonizeParams,
}

/// End-to-end training-label generator
///
/// One raster in, one polygon set out: fully synchronous, no shared state
/// across runs. The optional overlay stage is best-effort; its failure is
/// logged and the run continues with the unmodified label grid.
pub struct TrainingPipeline {
    config: PipelineConfig,
}

impl TrainingPipeline {
    /// Create a pipeline with custom configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Derive training polygons from a scene.
    ///
    /// Fails on degenerate output (no polygon survives even the relaxed
    /// area bound) or invalid cleanup parameters; overlay problems are
    /// downgraded to warnings.
    pub fn run(
        &self,
        scene: &SceneRaster,
        overlay: Option<&OverlayLayer>,
    ) -> LabelResult<Vec<PolygonRecord>> {
        let (h, w) = scene.dim();
        log::info!("Deriving training labels from {}x{} scene", w, h);

        let indices = compute_indices(scene);
        let classifier = RuleClassifier::new(self.config.classifier.clone());
        let mut label = classifier.classify(&indices, scene.scene_class());
        log_counts("Raw label counts", &label);

        if let Some(layer) = overlay {
            match force_water(&mut label, layer, scene.transform(), scene.crs()) {
                Ok(report) => log::info!(
                    "Overlay forced {} pixels to water from {} geometries",
                    report.forced_pixels,
                    report.geometry_count
                ),
                Err(e) => log::warn!("Overlay skipped: {}", e),
            }
        }

        let cleaned = clean_labels(&label, &self.config.cleaning)?;
        log_counts("Cleaned label counts", &cleaned);

        log::debug!(
            "Pixel ground area: {} transform units²",
            scene.transform().pixel_area()
        );
        extract_polygons(
            &cleaned,
            scene.transform(),
            scene.crs(),
            &self.config.polygonize,
        )
    }
}

impl Default for TrainingPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

fn log_counts(stage: &str, label: &LabelGrid) {
    let mut counts = [0usize; 5];
    for &v in label.iter() {
        if (v as usize) < counts.len() {
            counts[v as usize] += 1;
        }
    }
    log::info!(
        "{}: water {}, urban {}, vegetation {}, bare {}",
        stage,
        counts[1],
        counts[2],
        counts[3],
        counts[4]
    );
}
