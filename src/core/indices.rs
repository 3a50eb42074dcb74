use crate::types::{Band, BandGrid, IndexGrid, MaskGrid, SceneRaster};
use ndarray::{Array2, Zip};

/// Additive guard against zero denominators in the index ratios
const DENOM_EPSILON: f32 = 1e-8;

/// Bands whose finite maximum exceeds this are raw digital numbers
const DN_CUTOFF: f32 = 2.0;

/// Divisor converting raw sensor digital numbers to reflectance scale
const DN_SCALE: f32 = 10_000.0;

/// Spectral indices and the validity mask derived from one scene
#[derive(Debug, Clone)]
pub struct SpectralIndices {
    /// Vegetation index, (nir - red) / (nir + red)
    pub ndvi: IndexGrid,
    /// Water index, (green - nir) / (green + nir)
    pub ndwi: IndexGrid,
    /// Built-up index, (swir1 - nir) / (swir1 + nir)
    pub ndbi: IndexGrid,
    /// Pixels usable for index-based rules
    pub valid: MaskGrid,
}

/// Rescale a raw band to reflectance-like 0..1 values.
///
/// Bands delivered as digital numbers (finite maximum above 2) are divided
/// by 10 000; bands that are already normalized pass through unchanged, so
/// the operation is idempotent.
pub fn autoscale(band: &BandGrid) -> BandGrid {
    let max = band
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f32::NEG_INFINITY, f32::max);

    if max > DN_CUTOFF {
        band.mapv(|v| v / DN_SCALE)
    } else {
        band.clone()
    }
}

/// Normalized difference (a - b) / (a + b) with a small epsilon guard.
///
/// Finite output even where both operands are zero.
fn normalized_difference(a: &BandGrid, b: &BandGrid) -> IndexGrid {
    let mut out = Array2::zeros(a.dim());
    Zip::from(&mut out).and(a).and(b).for_each(|o, &a, &b| {
        *o = (a - b) / (a + b + DENOM_EPSILON);
    });
    out
}

/// Compute the vegetation, water and built-up indices plus the validity mask.
///
/// Bands are autoscaled independently before the ratios are formed. The
/// validity mask marks pixels where blue, green, red and nir are all finite
/// and at least one of blue/green/red is nonzero.
pub fn compute_indices(scene: &SceneRaster) -> SpectralIndices {
    log::debug!("Computing spectral indices for {:?} scene", scene.dim());

    let blue = autoscale(scene.band(Band::Blue));
    let green = autoscale(scene.band(Band::Green));
    let red = autoscale(scene.band(Band::Red));
    let nir = autoscale(scene.band(Band::Nir));
    let swir1 = autoscale(scene.band(Band::Swir1));

    let ndvi = normalized_difference(&nir, &red);
    let ndwi = normalized_difference(&green, &nir);
    let ndbi = normalized_difference(&swir1, &nir);

    let mut valid = Array2::from_elem(scene.dim(), false);
    Zip::from(&mut valid)
        .and(&blue)
        .and(&green)
        .and(&red)
        .and(&nir)
        .for_each(|v, &b, &g, &r, &n| {
            *v = b.is_finite()
                && g.is_finite()
                && r.is_finite()
                && n.is_finite()
                && (b != 0.0 || g != 0.0 || r != 0.0);
        });

    let valid_count = valid.iter().filter(|&&v| v).count();
    log::debug!(
        "Valid pixels: {} of {}",
        valid_count,
        valid.len()
    );

    SpectralIndices {
        ndvi,
        ndwi,
        ndbi,
        valid,
    }
}
