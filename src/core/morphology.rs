use crate::types::{LabelError, LabelGrid, LabelResult, LandCoverClass, MaskGrid};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Parameters for per-class label cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleaningParams {
    /// Radius of the disk structuring element used for closing (pixels)
    pub closing_radius: usize,
    /// Connected components smaller than this many pixels are removed
    pub min_object_pixels: usize,
}

impl Default for CleaningParams {
    fn default() -> Self {
        Self {
            closing_radius: 3,
            min_object_pixels: 50,
        }
    }
}

/// Offsets of a disk-shaped structuring element: all (dr, dc) with
/// dr² + dc² ≤ radius².
pub fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    let r2 = r * r;
    let mut offsets = Vec::new();
    for dr in -r..=r {
        for dc in -r..=r {
            if dr * dr + dc * dc <= r2 {
                offsets.push((dr, dc));
            }
        }
    }
    offsets
}

fn dilate(mask: &MaskGrid, offsets: &[(isize, isize)]) -> MaskGrid {
    let (h, w) = mask.dim();
    let mut out = Array2::from_elem((h, w), false);
    for r in 0..h {
        for c in 0..w {
            // Outside the grid counts as background.
            let hit = offsets.iter().any(|&(dr, dc)| {
                let rr = r as isize + dr;
                let cc = c as isize + dc;
                rr >= 0 && rr < h as isize && cc >= 0 && cc < w as isize
                    && mask[[rr as usize, cc as usize]]
            });
            out[[r, c]] = hit;
        }
    }
    out
}

fn erode(mask: &MaskGrid, offsets: &[(isize, isize)]) -> MaskGrid {
    let (h, w) = mask.dim();
    let mut out = Array2::from_elem((h, w), false);
    for r in 0..h {
        for c in 0..w {
            // Outside the grid counts as foreground so borders are not
            // eroded merely for touching the image edge.
            let all = offsets.iter().all(|&(dr, dc)| {
                let rr = r as isize + dr;
                let cc = c as isize + dc;
                if rr < 0 || rr >= h as isize || cc < 0 || cc >= w as isize {
                    true
                } else {
                    mask[[rr as usize, cc as usize]]
                }
            });
            out[[r, c]] = all;
        }
    }
    out
}

/// Morphological closing (dilation then erosion) with a disk element.
///
/// Fills gaps smaller than the element and smooths region boundaries.
pub fn closing(mask: &MaskGrid, radius: usize) -> MaskGrid {
    let offsets = disk_offsets(radius);
    erode(&dilate(mask, &offsets), &offsets)
}

/// Label 4-connected components of a boolean mask.
///
/// Returns the component grid (0 = background, components numbered from 1)
/// and the component count.
pub fn connected_components(mask: &MaskGrid) -> (Array2<u32>, usize) {
    let (h, w) = mask.dim();
    let mut regions = Array2::<u32>::zeros((h, w));
    let mut next = 0u32;
    let mut stack = Vec::new();

    for r in 0..h {
        for c in 0..w {
            if !mask[[r, c]] || regions[[r, c]] != 0 {
                continue;
            }
            next += 1;
            regions[[r, c]] = next;
            stack.push((r, c));
            while let Some((pr, pc)) = stack.pop() {
                let neighbors = [
                    (pr.wrapping_sub(1), pc),
                    (pr + 1, pc),
                    (pr, pc.wrapping_sub(1)),
                    (pr, pc + 1),
                ];
                for (nr, nc) in neighbors {
                    if nr < h && nc < w && mask[[nr, nc]] && regions[[nr, nc]] == 0 {
                        regions[[nr, nc]] = next;
                        stack.push((nr, nc));
                    }
                }
            }
        }
    }

    (regions, next as usize)
}

/// Remove 4-connected components smaller than `min_size` pixels
pub fn remove_small_objects(mask: &MaskGrid, min_size: usize) -> MaskGrid {
    let (regions, count) = connected_components(mask);
    if count == 0 {
        return mask.clone();
    }

    let mut sizes = vec![0usize; count + 1];
    for &id in regions.iter() {
        sizes[id as usize] += 1;
    }

    let mut out = mask.clone();
    for (slot, &id) in out.iter_mut().zip(regions.iter()) {
        if id != 0 && sizes[id as usize] < min_size {
            *slot = false;
        }
    }
    out
}

/// Clean one class mask: closing followed by small-object removal.
///
/// Empty masks pass through untouched.
pub fn clean_mask(mask: &MaskGrid, params: &CleaningParams) -> MaskGrid {
    if !mask.iter().any(|&v| v) {
        return mask.clone();
    }
    let closed = closing(mask, params.closing_radius);
    remove_small_objects(&closed, params.min_object_pixels)
}

/// Clean a label grid class by class.
///
/// Each class mask is extracted from the original grid, closed and stripped
/// of speckle independently, then written to a fresh output grid. Cleaned
/// masks may overlap near class boundaries after closing; classes are
/// written in ascending priority order (bare first, water last) so the
/// higher-priority class wins exactly as in rule resolution. Finally, any
/// pixel the cleanup left unlabeled gets its original label back, so no
/// originally-labeled pixel is silently dropped.
pub fn clean_labels(label: &LabelGrid, params: &CleaningParams) -> LabelResult<LabelGrid> {
    if params.closing_radius == 0 {
        return Err(LabelError::InvalidParameter(
            "closing radius must be at least 1 pixel".to_string(),
        ));
    }

    let mut cleaned: LabelGrid = Array2::zeros(label.dim());

    for class in LandCoverClass::PRIORITY.iter().rev() {
        let mask = label.mapv(|v| v == class.code());
        if !mask.iter().any(|&v| v) {
            continue;
        }
        let class_clean = clean_mask(&mask, params);
        for (slot, &keep) in cleaned.iter_mut().zip(class_clean.iter()) {
            if keep {
                *slot = class.code();
            }
        }
    }

    let mut restored = 0usize;
    for (slot, &original) in cleaned.iter_mut().zip(label.iter()) {
        if *slot == 0 && original != 0 {
            *slot = original;
            restored += 1;
        }
    }
    if restored > 0 {
        log::debug!("Cleanup fallback restored {} original labels", restored);
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn mask_from(rows: &[&[u8]]) -> MaskGrid {
        let h = rows.len();
        let w = rows[0].len();
        let mut mask = Array2::from_elem((h, w), false);
        for (r, row) in rows.iter().enumerate() {
            for (c, &v) in row.iter().enumerate() {
                mask[[r, c]] = v != 0;
            }
        }
        mask
    }

    #[test]
    fn disk_radius_one_is_a_cross() {
        let offsets = disk_offsets(1);
        assert_eq!(offsets.len(), 5);
        assert!(offsets.contains(&(0, 0)));
        assert!(offsets.contains(&(-1, 0)));
        assert!(!offsets.contains(&(1, 1)));
    }

    #[test]
    fn disk_radius_two_has_thirteen_cells() {
        // dr² + dc² ≤ 4: center, 4 at distance 1, 4 diagonals, 4 at distance 2
        assert_eq!(disk_offsets(2).len(), 13);
    }

    #[test]
    fn closing_fills_single_gap() {
        let mask = mask_from(&[
            &[1, 1, 1, 1, 1],
            &[1, 1, 0, 1, 1],
            &[1, 1, 1, 1, 1],
        ]);
        let closed = closing(&mask, 1);
        assert!(closed[[1, 2]], "closing should fill a one-pixel hole");
        assert!(closed.iter().all(|&v| v));
    }

    #[test]
    fn closing_uniform_mask_is_identity() {
        let mask = Array2::from_elem((6, 6), true);
        assert_eq!(closing(&mask, 3), mask);
    }

    #[test]
    fn connected_components_separates_diagonals() {
        let mask = mask_from(&[
            &[1, 0, 0],
            &[0, 1, 0],
            &[0, 0, 0],
        ]);
        let (_, count) = connected_components(&mask);
        assert_eq!(count, 2, "diagonal pixels are not 4-connected");
    }

    #[test]
    fn remove_small_objects_keeps_large_regions() {
        let mut mask = Array2::from_elem((8, 8), false);
        for r in 0..4 {
            for c in 0..4 {
                mask[[r, c]] = true; // 16-pixel block
            }
        }
        mask[[7, 7]] = true; // speckle

        let out = remove_small_objects(&mask, 10);
        assert!(out[[0, 0]]);
        assert!(!out[[7, 7]]);
    }

    #[test]
    fn clean_labels_rejects_zero_radius() {
        let label: LabelGrid = Array2::zeros((4, 4));
        let params = CleaningParams {
            closing_radius: 0,
            min_object_pixels: 10,
        };
        assert!(matches!(
            clean_labels(&label, &params),
            Err(LabelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn fallback_restores_labels_cleanup_erased() {
        // A 2-pixel water blob is below min_object_pixels, so cleanup
        // erases it; the fallback must bring the original labels back.
        let mut label: LabelGrid = Array2::zeros((6, 6));
        label[[2, 2]] = 1;
        label[[2, 3]] = 1;

        let cleaned = clean_labels(&label, &CleaningParams::default()).expect("cleanup");
        for ((r, c), &v) in label.indexed_iter() {
            if v != 0 {
                assert_ne!(cleaned[[r, c]], 0, "pixel ({}, {}) lost its label", r, c);
            }
        }
        assert_eq!(cleaned[[2, 2]], 1);
    }

    #[test]
    fn no_labeled_pixel_becomes_unlabeled() {
        let mut label: LabelGrid = Array2::zeros((10, 10));
        for r in 0..10 {
            for c in 0..5 {
                label[[r, c]] = 3;
            }
        }
        label[[0, 9]] = 4;

        let cleaned = clean_labels(&label, &CleaningParams::default()).expect("cleanup");
        for (orig, out) in label.iter().zip(cleaned.iter()) {
            if *orig != 0 {
                assert_ne!(*out, 0);
            }
        }
    }

    #[test]
    fn overlapping_cleaned_masks_resolve_to_higher_priority() {
        // Two water blocks with a one-column bare seam between them: closing
        // the water mask bridges the seam, so the cleaned water and bare
        // masks overlap on column 5. The overlap must resolve to water.
        let mut label: LabelGrid = Array2::zeros((9, 11));
        for r in 0..9 {
            for c in 0..11 {
                label[[r, c]] = if c == 5 { 4 } else { 1 };
            }
        }
        let params = CleaningParams {
            closing_radius: 2,
            min_object_pixels: 5,
        };
        let cleaned = clean_labels(&label, &params).expect("cleanup");
        for r in 0..9 {
            assert_eq!(
                cleaned[[r, 5]],
                1,
                "seam pixel ({}, 5) must resolve to water",
                r
            );
        }
    }

    #[test]
    fn classes_are_cleaned_independently() {
        // A solid vegetation block adjacent to water: cleaning must not let
        // vegetation claim interior water pixels.
        let mut label: LabelGrid = Array2::zeros((10, 10));
        for r in 0..10 {
            for c in 0..10 {
                label[[r, c]] = if c < 5 { 1 } else { 3 };
            }
        }
        let params = CleaningParams {
            closing_radius: 1,
            min_object_pixels: 5,
        };
        let cleaned = clean_labels(&label, &params).expect("cleanup");
        assert_eq!(cleaned[[5, 1]], 1);
        assert_eq!(cleaned[[5, 8]], 3);
    }
}
