use geo::{Geometry, Polygon};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Raw or reflectance-scaled spectral band values
pub type BandGrid = Array2<f32>;

/// Derived spectral index values, approximately in [-1, 1]
pub type IndexGrid = Array2<f32>;

/// Per-pixel boolean mask
pub type MaskGrid = Array2<bool>;

/// Resolved per-pixel class labels (0 = unlabeled)
pub type LabelGrid = Array2<u8>;

/// Per-pixel categorical codes (e.g. a Sentinel-2 scene classification layer)
pub type ClassGrid = Array2<i16>;

/// Coordinate system enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordinateSystem {
    /// Geographic coordinates in angular degrees (e.g. EPSG:4326)
    Geographic,
    /// Projected coordinates in linear units (e.g. UTM meters)
    Projected { epsg: u32 },
}

impl CoordinateSystem {
    /// True for degree-based systems where planar areas are in squared degrees
    pub fn is_geographic(&self) -> bool {
        matches!(self, CoordinateSystem::Geographic)
    }
}

/// Required spectral band slots, in fixed input order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Blue,
    Green,
    Red,
    Nir,
    Swir1,
    Swir2,
}

impl Band {
    /// Number of mandatory bands in an input scene
    pub const COUNT: usize = 6;

    /// Position of this band in the input band stack
    pub fn index(self) -> usize {
        match self {
            Band::Blue => 0,
            Band::Green => 1,
            Band::Red => 2,
            Band::Nir => 3,
            Band::Swir1 => 4,
            Band::Swir2 => 5,
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Band::Blue => write!(f, "blue"),
            Band::Green => write!(f, "green"),
            Band::Red => write!(f, "red"),
            Band::Nir => write!(f, "nir"),
            Band::Swir1 => write!(f, "swir1"),
            Band::Swir2 => write!(f, "swir2"),
        }
    }
}

/// Land-cover classes produced by the rule classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LandCoverClass {
    Water,
    Urban,
    Vegetation,
    Bare,
}

impl LandCoverClass {
    /// All classes in resolution priority order (highest priority first).
    ///
    /// Water misclassification is the costliest error, so water outranks
    /// everything; urban/vegetation ambiguity is resolved before the
    /// catch-all bare class.
    pub const PRIORITY: [LandCoverClass; 4] = [
        LandCoverClass::Water,
        LandCoverClass::Urban,
        LandCoverClass::Vegetation,
        LandCoverClass::Bare,
    ];

    /// Numeric label written into the label grid
    pub fn code(self) -> u8 {
        match self {
            LandCoverClass::Water => 1,
            LandCoverClass::Urban => 2,
            LandCoverClass::Vegetation => 3,
            LandCoverClass::Bare => 4,
        }
    }

    /// Inverse of [`code`](Self::code); 0 and unknown codes map to `None`
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(LandCoverClass::Water),
            2 => Some(LandCoverClass::Urban),
            3 => Some(LandCoverClass::Vegetation),
            4 => Some(LandCoverClass::Bare),
            _ => None,
        }
    }
}

impl std::fmt::Display for LandCoverClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LandCoverClass::Water => write!(f, "water"),
            LandCoverClass::Urban => write!(f, "urban"),
            LandCoverClass::Vegetation => write!(f, "vegetation"),
            LandCoverClass::Bare => write!(f, "bare"),
        }
    }
}

/// Affine pixel-to-ground transformation (GDAL coefficient order)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation terms
    pub fn north_up(top_left_x: f64, top_left_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            top_left_x,
            pixel_width,
            rotation_x: 0.0,
            top_left_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    /// Map fractional pixel coordinates (col, row) to ground (x, y)
    pub fn pixel_to_ground(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Map ground (x, y) back to fractional pixel coordinates (col, row).
    ///
    /// Returns `None` for a degenerate (non-invertible) transform.
    pub fn ground_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det.abs() < f64::EPSILON {
            return None;
        }
        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (dx * self.pixel_height - dy * self.rotation_x) / det;
        let row = (dy * self.pixel_width - dx * self.rotation_y) / det;
        Some((col, row))
    }

    /// Ground area covered by one pixel, in squared transform units
    pub fn pixel_area(&self) -> f64 {
        (self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y).abs()
    }
}

/// Immutable multiband input scene
///
/// Owns the band stack, the optional categorical band, and the georeferencing
/// needed to map pixels to ground coordinates. All grids share one (H, W).
#[derive(Debug, Clone)]
pub struct SceneRaster {
    bands: Vec<BandGrid>,
    scene_class: Option<ClassGrid>,
    transform: GeoTransform,
    crs: CoordinateSystem,
}

impl SceneRaster {
    /// Build a scene from a band stack in [`Band`] order.
    ///
    /// Fails when fewer than [`Band::COUNT`] bands are supplied or when any
    /// grid disagrees on shape.
    pub fn new(
        bands: Vec<BandGrid>,
        scene_class: Option<ClassGrid>,
        transform: GeoTransform,
        crs: CoordinateSystem,
    ) -> LabelResult<Self> {
        if bands.len() < Band::COUNT {
            return Err(LabelError::InsufficientBands {
                found: bands.len(),
                expected: Band::COUNT,
            });
        }

        let dim = bands[0].dim();
        for (i, band) in bands.iter().enumerate() {
            if band.dim() != dim {
                return Err(LabelError::ShapeMismatch(format!(
                    "band {} has shape {:?}, expected {:?}",
                    i,
                    band.dim(),
                    dim
                )));
            }
        }
        if let Some(ref scl) = scene_class {
            if scl.dim() != dim {
                return Err(LabelError::ShapeMismatch(format!(
                    "categorical band has shape {:?}, expected {:?}",
                    scl.dim(),
                    dim
                )));
            }
        }

        Ok(Self {
            bands,
            scene_class,
            transform,
            crs,
        })
    }

    /// Access one of the six required bands
    pub fn band(&self, band: Band) -> &BandGrid {
        &self.bands[band.index()]
    }

    /// The optional categorical band, if the scene carries one
    pub fn scene_class(&self) -> Option<&ClassGrid> {
        self.scene_class.as_ref()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> CoordinateSystem {
        self.crs
    }

    /// Grid shape as (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.bands[0].dim()
    }
}

/// Vector geometries used to force a class onto covered pixels
#[derive(Debug, Clone)]
pub struct OverlayLayer {
    pub geometries: Vec<Geometry<f64>>,
    /// Coordinate reference of the geometries; `None` means "assume the
    /// raster's reference"
    pub crs: Option<CoordinateSystem>,
}

/// One labeled training polygon
#[derive(Debug, Clone)]
pub struct PolygonRecord {
    pub geometry: Polygon<f64>,
    pub class: LandCoverClass,
    /// Estimated ground area in square meters (approximate for geographic
    /// reference systems)
    pub area_m2: f64,
}

/// Error types for training-label generation
#[derive(Debug, thiserror::Error)]
pub enum LabelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("insufficient bands: found {found}, expected at least {expected}")]
    InsufficientBands { found: usize, expected: usize },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("overlay error: {0}")]
    Overlay(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("no polygons above {relaxed_min_area_m2} m² survived, even after relaxation")]
    NoUsablePolygons { relaxed_min_area_m2: f64 },
}

/// Result type for training-label operations
pub type LabelResult<T> = Result<T, LabelError>;
