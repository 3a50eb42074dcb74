use crate::types::{
    CoordinateSystem, GeoTransform, LabelError, LabelGrid, LabelResult, LandCoverClass,
    OverlayLayer,
};
use geo::{BoundingRect, Coord, Intersects, LineString, Polygon, Rect};

/// Outcome of a successful overlay application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayReport {
    /// Geometries rasterized onto the grid
    pub geometry_count: usize,
    /// Pixels force-set to water
    pub forced_pixels: usize,
}

/// Force the water class onto every pixel touched by the overlay geometries.
///
/// Rasterization uses all-touched semantics: a pixel is marked when its
/// ground footprint intersects the geometry at all, not only when the
/// geometry covers the pixel center. Line geometries narrower than a pixel
/// (river centerlines) are therefore still captured.
///
/// An overlay without a coordinate reference is assumed to match the
/// raster's; a differing reference is an error. Errors from this stage are
/// meant to be consumed non-fatally: the caller logs them and proceeds with
/// the unmodified label grid.
pub fn force_water(
    label: &mut LabelGrid,
    overlay: &OverlayLayer,
    transform: &GeoTransform,
    raster_crs: CoordinateSystem,
) -> LabelResult<OverlayReport> {
    match overlay.crs {
        Some(crs) if crs != raster_crs => {
            return Err(LabelError::Overlay(format!(
                "overlay reference {:?} does not match raster reference {:?}",
                crs, raster_crs
            )));
        }
        Some(_) => {}
        None => {
            log::debug!("Overlay has no coordinate reference, assuming the raster's");
        }
    }

    let (h, w) = label.dim();
    let mut forced = 0usize;
    let mut rasterized = 0usize;

    for geometry in &overlay.geometries {
        let Some(bounds) = geometry.bounding_rect() else {
            log::debug!("Skipping overlay geometry without extent");
            continue;
        };
        let (col_range, row_range) = pixel_window(&bounds, transform, h, w)?;

        for row in row_range {
            for col in col_range.clone() {
                if label[[row, col]] == LandCoverClass::Water.code() {
                    continue;
                }
                if geometry.intersects(&pixel_footprint(col, row, transform)) {
                    label[[row, col]] = LandCoverClass::Water.code();
                    forced += 1;
                }
            }
        }
        rasterized += 1;
    }

    Ok(OverlayReport {
        geometry_count: rasterized,
        forced_pixels: forced,
    })
}

/// Clamped pixel index window covering a ground-space rectangle
fn pixel_window(
    bounds: &Rect<f64>,
    transform: &GeoTransform,
    h: usize,
    w: usize,
) -> LabelResult<(std::ops::Range<usize>, std::ops::Range<usize>)> {
    let corners = [
        (bounds.min().x, bounds.min().y),
        (bounds.min().x, bounds.max().y),
        (bounds.max().x, bounds.min().y),
        (bounds.max().x, bounds.max().y),
    ];

    let mut col_min = f64::INFINITY;
    let mut col_max = f64::NEG_INFINITY;
    let mut row_min = f64::INFINITY;
    let mut row_max = f64::NEG_INFINITY;
    for (x, y) in corners {
        let (col, row) = transform.ground_to_pixel(x, y).ok_or_else(|| {
            LabelError::Overlay("raster transform is not invertible".to_string())
        })?;
        col_min = col_min.min(col);
        col_max = col_max.max(col);
        row_min = row_min.min(row);
        row_max = row_max.max(row);
    }

    let col_start = col_min.floor().max(0.0) as usize;
    let col_end = (col_max.ceil().max(0.0) as usize).min(w);
    let row_start = row_min.floor().max(0.0) as usize;
    let row_end = (row_max.ceil().max(0.0) as usize).min(h);

    Ok((col_start..col_end, row_start..row_end))
}

/// Ground-space footprint of one pixel as a quad under the affine transform
fn pixel_footprint(col: usize, row: usize, transform: &GeoTransform) -> Polygon<f64> {
    let c = col as f64;
    let r = row as f64;
    let corners = [
        transform.pixel_to_ground(c, r),
        transform.pixel_to_ground(c + 1.0, r),
        transform.pixel_to_ground(c + 1.0, r + 1.0),
        transform.pixel_to_ground(c, r + 1.0),
    ];
    let ring: Vec<Coord<f64>> = corners.iter().map(|&(x, y)| Coord { x, y }).collect();
    Polygon::new(LineString::new(ring), vec![])
}
