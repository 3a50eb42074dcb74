use crate::core::indices::SpectralIndices;
use crate::types::{ClassGrid, LabelGrid, LandCoverClass, MaskGrid};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Vegetation-index ceiling above which the urban rule never fires
const URBAN_NDVI_CEILING: f32 = 0.25;

/// Mapping from categorical-band codes to classes and exclusions.
///
/// Defaults follow the Sentinel-2 scene classification layer; the codes are
/// configuration, not hardwired domain knowledge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneClassMap {
    pub water_code: i16,
    pub vegetation_code: i16,
    pub bare_code: i16,
    /// Codes excluded from every class mask (cloud, cloud shadow)
    pub cloud_codes: Vec<i16>,
}

impl Default for SceneClassMap {
    fn default() -> Self {
        Self {
            water_code: 6,
            vegetation_code: 4,
            bare_code: 5,
            cloud_codes: vec![3, 8, 9, 10],
        }
    }
}

/// Threshold parameters for the per-pixel classification rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierParams {
    /// Vegetation index at or above which a pixel is vegetation
    pub ndvi_vegetation: f32,
    /// Vegetation index below which a pixel is bare
    pub ndvi_bare: f32,
    /// Built-up index above which a pixel is urban
    pub ndbi_urban: f32,
    /// Water index above which a pixel is water
    pub ndwi_water: f32,
    /// Built-up index the water rule additionally requires staying below
    pub ndbi_water: f32,
    /// Categorical-band code mapping
    pub scene_class_map: SceneClassMap,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            ndvi_vegetation: 0.30,
            ndvi_bare: 0.12,
            ndbi_urban: 0.08,
            ndwi_water: 0.10,
            ndbi_water: -0.15,
            scene_class_map: SceneClassMap::default(),
        }
    }
}

/// Per-pixel threshold classifier resolving overlaps by fixed class priority
pub struct RuleClassifier {
    params: ClassifierParams,
}

impl RuleClassifier {
    /// Create a classifier with custom thresholds
    pub fn new(params: ClassifierParams) -> Self {
        Self { params }
    }

    /// Produce the label grid from index grids and the optional categorical
    /// band.
    ///
    /// Class masks are seeded from categorical codes when the band is
    /// present, then index rules are ORed in over valid pixels, cloud and
    /// shadow pixels are removed from every mask, and overlaps are resolved
    /// water > urban > vegetation > bare. Absence of the categorical band is
    /// a normal mode.
    pub fn classify(
        &self,
        indices: &SpectralIndices,
        scene_class: Option<&ClassGrid>,
    ) -> LabelGrid {
        let dim = indices.ndvi.dim();
        let mut water = Array2::from_elem(dim, false);
        let mut urban = Array2::from_elem(dim, false);
        let mut vegetation = Array2::from_elem(dim, false);
        let mut bare = Array2::from_elem(dim, false);

        let map = &self.params.scene_class_map;

        if let Some(scl) = scene_class {
            for ((r, c), &code) in scl.indexed_iter() {
                if code == map.water_code {
                    water[[r, c]] = true;
                } else if code == map.vegetation_code {
                    vegetation[[r, c]] = true;
                } else if code == map.bare_code {
                    bare[[r, c]] = true;
                }
            }
            log::info!(
                "Seeded from categorical band: {} water, {} vegetation, {} bare pixels",
                count(&water),
                count(&vegetation),
                count(&bare)
            );
        }

        // Index rules complement the seeded masks on valid pixels only.
        for ((r, c), &ok) in indices.valid.indexed_iter() {
            if !ok {
                continue;
            }
            let ndvi = indices.ndvi[[r, c]];
            let ndwi = indices.ndwi[[r, c]];
            let ndbi = indices.ndbi[[r, c]];

            if ndvi >= self.params.ndvi_vegetation {
                vegetation[[r, c]] = true;
            }
            if ndvi < self.params.ndvi_bare {
                bare[[r, c]] = true;
            }
            if ndbi > self.params.ndbi_urban && ndvi < URBAN_NDVI_CEILING {
                urban[[r, c]] = true;
            }
            if ndwi > self.params.ndwi_water && ndbi < self.params.ndbi_water {
                water[[r, c]] = true;
            }
        }

        // Cloud and shadow pixels drop out of every mask, however the mask
        // was derived.
        if let Some(scl) = scene_class {
            let mut removed = 0usize;
            for ((r, c), code) in scl.indexed_iter() {
                if map.cloud_codes.contains(code) {
                    for mask in [&mut water, &mut urban, &mut vegetation, &mut bare] {
                        if mask[[r, c]] {
                            mask[[r, c]] = false;
                            removed += 1;
                        }
                    }
                }
            }
            if removed > 0 {
                log::debug!("Cloud exclusion cleared {} mask entries", removed);
            }
        }

        self.resolve(&water, &urban, &vegetation, &bare)
    }

    /// Ordered priority resolution: later classes only claim pixels that are
    /// still unlabeled.
    fn resolve(
        &self,
        water: &MaskGrid,
        urban: &MaskGrid,
        vegetation: &MaskGrid,
        bare: &MaskGrid,
    ) -> LabelGrid {
        let mut label: LabelGrid = Array2::zeros(water.dim());
        for class in LandCoverClass::PRIORITY {
            let mask = match class {
                LandCoverClass::Water => water,
                LandCoverClass::Urban => urban,
                LandCoverClass::Vegetation => vegetation,
                LandCoverClass::Bare => bare,
            };
            for ((r, c), &set) in mask.indexed_iter() {
                if set && label[[r, c]] == 0 {
                    label[[r, c]] = class.code();
                }
            }
        }
        label
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new(ClassifierParams::default())
    }
}

fn count(mask: &MaskGrid) -> usize {
    mask.iter().filter(|&&v| v).count()
}
