use crate::core::morphology::connected_components;
use crate::types::{
    CoordinateSystem, GeoTransform, LabelError, LabelGrid, LabelResult, LandCoverClass,
    PolygonRecord,
};
use geo::{Area, Centroid, Coord, LineString, Polygon};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameters for polygon extraction and area filtering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonizeParams {
    /// Minimum estimated ground area (m²) a polygon must reach to be kept
    pub min_area_m2: f64,
    /// Fallback minimum applied once when the primary pass keeps nothing
    pub relaxed_min_area_m2: f64,
}

impl Default for PolygonizeParams {
    fn default() -> Self {
        Self {
            min_area_m2: 2000.0,
            relaxed_min_area_m2: 200.0,
        }
    }
}

/// Ground meters per degree of longitude at the equator
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Estimate the ground area of a polygon in square meters.
///
/// For linear reference systems the planar area is already in square
/// meters. For geographic systems the squared-degree area is scaled by the
/// local meters-per-degree factor at the polygon's representative latitude.
/// An approximation for filtering, not a geodesic measurement.
pub fn estimate_area_m2(polygon: &Polygon<f64>, crs: CoordinateSystem) -> f64 {
    let planar = planar_area(polygon);
    if crs.is_geographic() {
        let lat = polygon
            .centroid()
            .map(|p| p.y())
            .unwrap_or(0.0);
        let meters_per_degree = METERS_PER_DEGREE * lat.to_radians().cos();
        planar * meters_per_degree * meters_per_degree
    } else {
        planar
    }
}

/// Planar area as exterior ring minus interior rings, independent of ring
/// winding.
fn planar_area(polygon: &Polygon<f64>) -> f64 {
    let exterior = ring_area(polygon.exterior());
    let holes: f64 = polygon.interiors().iter().map(ring_area).sum();
    (exterior - holes).max(0.0)
}

fn ring_area(ring: &LineString<f64>) -> f64 {
    Polygon::new(ring.clone(), vec![]).unsigned_area()
}

/// Vectorize nonzero labels into area-filtered polygon records.
///
/// Contiguous (4-connected) same-valued regions become one polygon each,
/// with pixel-corner vertices mapped through the affine transform. Regions
/// whose estimated area falls below `min_area_m2` are dropped.
pub fn vectorize(
    label: &LabelGrid,
    transform: &GeoTransform,
    crs: CoordinateSystem,
    min_area_m2: f64,
) -> Vec<PolygonRecord> {
    let mut records = Vec::new();
    let mut raw_regions = 0usize;

    for class in LandCoverClass::PRIORITY {
        let mask = label.mapv(|v| v == class.code());
        if !mask.iter().any(|&v| v) {
            continue;
        }
        let (regions, count) = connected_components(&mask);
        let mut pixels: Vec<Vec<(usize, usize)>> = vec![Vec::new(); count];
        for ((r, c), &id) in regions.indexed_iter() {
            if id != 0 {
                pixels[(id - 1) as usize].push((r, c));
            }
        }

        for (index, region_pixels) in pixels.iter().enumerate() {
            raw_regions += 1;
            let geometry = region_polygon(region_pixels, &regions, (index + 1) as u32, transform);
            let area_m2 = estimate_area_m2(&geometry, crs);
            if area_m2 >= min_area_m2 {
                records.push(PolygonRecord {
                    geometry,
                    class,
                    area_m2,
                });
            }
        }
    }

    log::info!(
        "Polygons kept after {} m² area filter: {} of {} raw regions",
        min_area_m2,
        records.len(),
        raw_regions
    );
    records
}

/// Extract polygons with the relaxation fallback.
///
/// When the primary pass keeps nothing the grid is re-vectorized once with
/// the relaxed minimum; if that also keeps nothing the raster holds no
/// usable training regions and the run fails.
pub fn extract_polygons(
    label: &LabelGrid,
    transform: &GeoTransform,
    crs: CoordinateSystem,
    params: &PolygonizeParams,
) -> LabelResult<Vec<PolygonRecord>> {
    let records = vectorize(label, transform, crs, params.min_area_m2);
    if !records.is_empty() {
        return Ok(records);
    }

    log::warn!(
        "No polygons survived the {} m² minimum, retrying with relaxed {} m²",
        params.min_area_m2,
        params.relaxed_min_area_m2
    );
    let relaxed = vectorize(label, transform, crs, params.relaxed_min_area_m2);
    if relaxed.is_empty() {
        return Err(LabelError::NoUsablePolygons {
            relaxed_min_area_m2: params.relaxed_min_area_m2,
        });
    }
    Ok(relaxed)
}

/// Trace one region into a polygon with holes.
///
/// Boundary edges between region and non-region pixels are chained into
/// closed rings over pixel-corner vertices; the largest-area ring is the
/// exterior, the rest are holes. Output rings follow the GeoJSON winding
/// convention (counter-clockwise exterior, clockwise holes).
fn region_polygon(
    pixels: &[(usize, usize)],
    regions: &Array2<u32>,
    id: u32,
    transform: &GeoTransform,
) -> Polygon<f64> {
    let rings = trace_rings(pixels, regions, id);

    let mut best = 0usize;
    let mut best_area = -1.0f64;
    let ground: Vec<Vec<Coord<f64>>> = rings
        .iter()
        .map(|ring| {
            ring.iter()
                .map(|&(x, y)| {
                    let (gx, gy) = transform.pixel_to_ground(x as f64, y as f64);
                    Coord { x: gx, y: gy }
                })
                .collect()
        })
        .collect();
    for (i, ring) in ground.iter().enumerate() {
        let area = shoelace(ring).abs();
        if area > best_area {
            best_area = area;
            best = i;
        }
    }

    let mut exterior = Vec::new();
    let mut interiors = Vec::new();
    for (i, ring) in ground.into_iter().enumerate() {
        if i == best {
            exterior = wind(ring, false);
        } else {
            interiors.push(LineString::new(wind(ring, true)));
        }
    }
    Polygon::new(LineString::new(exterior), interiors)
}

/// Chain directed boundary edges of a region into closed pixel-corner rings
fn trace_rings(
    pixels: &[(usize, usize)],
    regions: &Array2<u32>,
    id: u32,
) -> Vec<Vec<(i64, i64)>> {
    let (h, w) = regions.dim();
    let inside = |r: i64, c: i64| {
        r >= 0
            && c >= 0
            && (r as usize) < h
            && (c as usize) < w
            && regions[[r as usize, c as usize]] == id
    };

    // Directed edges over (x=col, y=row) corner vertices, one per exposed
    // pixel side, oriented so every ring closes.
    let mut edges: HashMap<(i64, i64), Vec<(i64, i64)>> = HashMap::new();
    for &(r, c) in pixels {
        let (r, c) = (r as i64, c as i64);
        if !inside(r - 1, c) {
            edges.entry((c, r)).or_default().push((c + 1, r));
        }
        if !inside(r, c + 1) {
            edges.entry((c + 1, r)).or_default().push((c + 1, r + 1));
        }
        if !inside(r + 1, c) {
            edges.entry((c + 1, r + 1)).or_default().push((c, r + 1));
        }
        if !inside(r, c - 1) {
            edges.entry((c, r + 1)).or_default().push((c, r));
        }
    }

    let mut rings = Vec::new();
    while !edges.is_empty() {
        // Start at a vertex with a single outgoing edge; at least one exists
        // for every remaining ring (e.g. the region's top-left corner).
        let start = edges
            .iter()
            .find(|(_, ends)| ends.len() == 1)
            .map(|(&v, _)| v)
            .or_else(|| edges.keys().next().copied());
        let Some(start) = start else { break };

        let mut ring = vec![start];
        let mut current = start;
        let mut incoming: Option<(i64, i64)> = None;
        loop {
            let Some(next) = take_next(&mut edges, current, incoming) else {
                break;
            };
            incoming = Some((next.0 - current.0, next.1 - current.1));
            current = next;
            if current == start {
                break;
            }
            ring.push(current);
        }
        if ring.len() >= 4 {
            rings.push(simplify_collinear(&ring));
        }
    }
    rings
}

/// Pop the outgoing edge continuing a ring walk at `current`.
///
/// A corner shared by two diagonal region pixels has two outgoing edges;
/// the sharpest left turn relative to the incoming direction keeps each
/// ring simple.
fn take_next(
    edges: &mut HashMap<(i64, i64), Vec<(i64, i64)>>,
    current: (i64, i64),
    incoming: Option<(i64, i64)>,
) -> Option<(i64, i64)> {
    let ends = edges.get_mut(&current)?;
    let index = if ends.len() == 1 {
        0
    } else {
        let (ix, iy) = incoming.unwrap_or((1, 0));
        let mut best = 0;
        let mut best_cross = i64::MIN;
        for (i, &(ex, ey)) in ends.iter().enumerate() {
            let (dx, dy) = (ex - current.0, ey - current.1);
            let cross = ix * dy - iy * dx;
            if cross > best_cross {
                best_cross = cross;
                best = i;
            }
        }
        best
    };
    let next = ends.swap_remove(index);
    if ends.is_empty() {
        edges.remove(&current);
    }
    Some(next)
}

/// Drop vertices interior to straight runs of unit edges
fn simplify_collinear(ring: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let n = ring.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = ring[(i + n - 1) % n];
        let cur = ring[i];
        let next = ring[(i + 1) % n];
        let d1 = (cur.0 - prev.0, cur.1 - prev.1);
        let d2 = (next.0 - cur.0, next.1 - cur.1);
        if d1 != d2 {
            out.push(cur);
        }
    }
    out
}

fn shoelace(ring: &[Coord<f64>]) -> f64 {
    let n = ring.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// Orient a ring clockwise or counter-clockwise by signed area
fn wind(mut ring: Vec<Coord<f64>>, clockwise: bool) -> Vec<Coord<f64>> {
    let signed = shoelace(&ring);
    let is_clockwise = signed < 0.0;
    if is_clockwise != clockwise {
        ring.reverse();
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn projected() -> CoordinateSystem {
        CoordinateSystem::Projected { epsg: 32650 }
    }

    fn label_with_block(
        h: usize,
        w: usize,
        rows: std::ops::Range<usize>,
        cols: std::ops::Range<usize>,
        class: u8,
    ) -> LabelGrid {
        let mut label: LabelGrid = Array2::zeros((h, w));
        for r in rows {
            for c in cols.clone() {
                label[[r, c]] = class;
            }
        }
        label
    }

    #[test]
    fn square_region_becomes_one_polygon() {
        let label = label_with_block(8, 8, 2..6, 2..6, 1);
        let gt = GeoTransform::north_up(0.0, 0.0, 10.0, -10.0);
        let records = vectorize(&label, &gt, projected(), 0.0);

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.class, LandCoverClass::Water);
        // 16 pixels at 100 m² each
        assert_relative_eq!(record.area_m2, 1600.0, epsilon = 1e-6);
        // Rectangle simplifies to 4 corners (plus the closing point geo adds)
        assert_eq!(record.geometry.exterior().0.len(), 5);
    }

    #[test]
    fn hole_area_is_subtracted() {
        // 5x5 block with the center pixel unlabeled
        let mut label = label_with_block(7, 7, 1..6, 1..6, 3);
        label[[3, 3]] = 0;
        let gt = GeoTransform::north_up(0.0, 0.0, 10.0, -10.0);
        let records = vectorize(&label, &gt, projected(), 0.0);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].geometry.interiors().len(), 1);
        assert_relative_eq!(records[0].area_m2, 2400.0, epsilon = 1e-6);
    }

    #[test]
    fn separate_regions_become_separate_polygons() {
        let mut label = label_with_block(10, 10, 0..3, 0..3, 1);
        for r in 6..9 {
            for c in 6..9 {
                label[[r, c]] = 1;
            }
        }
        let gt = GeoTransform::north_up(0.0, 0.0, 10.0, -10.0);
        let records = vectorize(&label, &gt, projected(), 0.0);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn classes_vectorize_independently() {
        let mut label = label_with_block(6, 6, 0..6, 0..3, 1);
        for r in 0..6 {
            for c in 3..6 {
                label[[r, c]] = 3;
            }
        }
        let gt = GeoTransform::north_up(0.0, 0.0, 10.0, -10.0);
        let mut classes: Vec<LandCoverClass> = vectorize(&label, &gt, projected(), 0.0)
            .iter()
            .map(|r| r.class)
            .collect();
        classes.sort_by_key(|c| c.code());
        assert_eq!(classes, vec![LandCoverClass::Water, LandCoverClass::Vegetation]);
    }

    #[test]
    fn geographic_area_uses_meters_per_degree() {
        // 2x2 pixels of 0.001° near the equator
        let label = label_with_block(4, 4, 1..3, 1..3, 1);
        let gt = GeoTransform::north_up(115.2, 0.002, 0.001, -0.001);
        let records = vectorize(&label, &gt, CoordinateSystem::Geographic, 0.0);

        assert_eq!(records.len(), 1);
        let expected = (0.002 * METERS_PER_DEGREE).powi(2);
        // Latitude is a fraction of a degree, so cos(lat) ≈ 1
        assert_relative_eq!(records[0].area_m2, expected, max_relative = 1e-3);
    }

    #[test]
    fn area_filter_is_monotonic_in_threshold() {
        let mut label = label_with_block(10, 10, 0..5, 0..5, 1);
        label[[9, 9]] = 1;
        let gt = GeoTransform::north_up(0.0, 0.0, 10.0, -10.0);

        let strict = vectorize(&label, &gt, projected(), 2000.0);
        let loose = vectorize(&label, &gt, projected(), 50.0);
        assert!(loose.len() >= strict.len());
        assert_eq!(strict.len(), 1);
        assert_eq!(loose.len(), 2);
    }

    #[test]
    fn relaxation_recovers_small_regions() {
        // 9 pixels at 25 m² = 225 m²: below the 2000 m² default, above the
        // 200 m² relaxed bound.
        let label = label_with_block(6, 6, 1..4, 1..4, 1);
        let gt = GeoTransform::north_up(0.0, 0.0, 5.0, -5.0);
        let records = extract_polygons(&label, &gt, projected(), &PolygonizeParams::default())
            .expect("relaxation recovers the region");
        assert_eq!(records.len(), 1);
        assert_relative_eq!(records[0].area_m2, 225.0, epsilon = 1e-6);
    }

    #[test]
    fn empty_grid_fails_with_distinct_reason() {
        let label: LabelGrid = Array2::zeros((6, 6));
        let gt = GeoTransform::north_up(0.0, 0.0, 10.0, -10.0);
        let result = extract_polygons(&label, &gt, projected(), &PolygonizeParams::default());
        assert!(matches!(
            result,
            Err(LabelError::NoUsablePolygons { .. })
        ));
    }

    #[test]
    fn region_below_relaxed_bound_fails() {
        // One 25 m² pixel is below even the 200 m² relaxed bound.
        let label = label_with_block(4, 4, 1..2, 1..2, 1);
        let gt = GeoTransform::north_up(0.0, 0.0, 5.0, -5.0);
        let result = extract_polygons(&label, &gt, projected(), &PolygonizeParams::default());
        assert!(matches!(result, Err(LabelError::NoUsablePolygons { .. })));
    }

    #[test]
    fn exterior_ring_is_counter_clockwise() {
        let label = label_with_block(4, 4, 1..3, 1..3, 1);
        let gt = GeoTransform::north_up(0.0, 0.0, 10.0, -10.0);
        let records = vectorize(&label, &gt, projected(), 0.0);
        let exterior: Vec<Coord<f64>> = records[0].geometry.exterior().0.clone();
        assert!(shoelace(&exterior) > 0.0);
    }

    #[test]
    fn diagonal_touching_pixels_trace_separately() {
        let mut label: LabelGrid = Array2::zeros((4, 4));
        label[[0, 0]] = 1;
        label[[1, 1]] = 1;
        let gt = GeoTransform::north_up(0.0, 0.0, 10.0, -10.0);
        let records = vectorize(&label, &gt, projected(), 0.0);
        assert_eq!(records.len(), 2);
        for record in &records {
            assert_relative_eq!(record.area_m2, 100.0, epsilon = 1e-6);
        }
    }
}
