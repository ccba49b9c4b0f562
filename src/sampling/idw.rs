//! Inverse-distance weighting over a 3x3 cell neighbourhood.
//!
//! The query point is snapped to the cell with the nearest centre; the
//! valid cells of the surrounding 3x3 window (clipped to the grid) are
//! averaged with weights `1 / d`, where `d` is the Euclidean distance in
//! coordinate units between the query point and each cell centre.

use crate::raster::RasterGrid;

/// Half-width of the sampling window, in cells
pub const WINDOW_RADIUS: i64 = 1;

/// A valid neighbourhood cell and its distance to the query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub value: f64,
    pub distance: f64,
}

/// Collect unmasked, in-bounds cells around the query point `(x, y)`
pub fn neighbors(grid: &RasterGrid, x: f64, y: f64) -> Vec<Neighbor> {
    let Some((row, col)) = grid.nearest_cell(x, y) else {
        return Vec::new();
    };
    // Window cannot reach the grid, including saturated indices
    let (rows, cols) = (grid.rows() as i64, grid.cols() as i64);
    if row < -WINDOW_RADIUS
        || col < -WINDOW_RADIUS
        || row >= rows + WINDOW_RADIUS
        || col >= cols + WINDOW_RADIUS
    {
        return Vec::new();
    }

    let mut found = Vec::with_capacity(9);
    for r in (row - WINDOW_RADIUS)..=(row + WINDOW_RADIUS) {
        for c in (col - WINDOW_RADIUS)..=(col + WINDOW_RADIUS) {
            let Some(value) = grid.get(r, c) else {
                continue;
            };
            let (cx, cy) = grid.transform().cell_center(c as usize, r as usize);
            let distance = ((x - cx).powi(2) + (y - cy).powi(2)).sqrt();
            found.push(Neighbor { value, distance });
        }
    }
    found
}

/// Weighted mean of the neighbours, `None` when there are none.
///
/// A neighbour at distance exactly zero is returned as-is.
pub fn weighted_mean(neighbors: &[Neighbor]) -> Option<f64> {
    if neighbors.is_empty() {
        return None;
    }

    if let Some(exact) = neighbors.iter().find(|n| n.distance == 0.0) {
        return Some(exact.value);
    }

    let mut sum_w = 0.0;
    let mut sum_wz = 0.0;
    for n in neighbors {
        let w = 1.0 / n.distance;
        sum_w += w;
        sum_wz += w * n.value;
    }
    Some(sum_wz / sum_w)
}

/// Interpolated value at `(x, y)`, or `None` if no valid cell is nearby
pub fn sample_at(grid: &RasterGrid, x: f64, y: f64) -> Option<f64> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    weighted_mean(&neighbors(grid, x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    /// 3x3 grid of unit cells with upper-left corner at (0, 3)
    fn grid(values: Array2<f64>, threshold: f64) -> RasterGrid {
        RasterGrid::new(values, GeoTransform::new(0.0, 3.0, 1.0, -1.0), threshold).unwrap()
    }

    #[test]
    fn test_constant_grid() {
        let g = grid(Array2::from_elem((3, 3), 10.0), 0.0);
        assert_relative_eq!(sample_at(&g, 1.3, 1.7).unwrap(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cell_centre_returns_cell_value() {
        let g = grid(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]], 0.0);
        // Centre of (row 1, col 1)
        assert_eq!(sample_at(&g, 1.5, 1.5), Some(5.0));
        // Centre of (row 0, col 2)
        assert_eq!(sample_at(&g, 2.5, 2.5), Some(3.0));
    }

    #[test]
    fn test_single_valid_neighbor() {
        let g = grid(
            array![[0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 42.0]],
            1.0,
        );
        assert_eq!(sample_at(&g, 1.4, 1.6), Some(42.0));
    }

    #[test]
    fn test_all_masked_is_missing() {
        let g = grid(Array2::from_elem((3, 3), -5.0), 0.0);
        assert_eq!(sample_at(&g, 1.5, 1.5), None);
    }

    #[test]
    fn test_outside_grid_is_missing() {
        let g = grid(Array2::from_elem((3, 3), 1.0), 0.0);
        assert_eq!(sample_at(&g, 50.0, 50.0), None);
        assert_eq!(sample_at(&g, f64::NAN, 1.0), None);
    }

    #[test]
    fn test_extreme_coordinates_are_missing() {
        let g = grid(Array2::from_elem((3, 3), 1.0), 0.0);
        assert_eq!(sample_at(&g, 1e300, 1.5), None);
        assert_eq!(sample_at(&g, -1e300, 1.5), None);
        assert_eq!(sample_at(&g, 1.5, 1e300), None);
        assert_eq!(sample_at(&g, f64::MAX, f64::MIN), None);
    }

    #[test]
    fn test_window_one_cell_outside_still_reaches_grid() {
        let g = grid(Array2::from_elem((3, 3), 7.0), 0.0);
        // Nearest centre is column -1; its window still covers column 0
        assert_eq!(sample_at(&g, -0.4, 1.5), Some(7.0));
        assert_eq!(neighbors(&g, -0.4, 1.5).len(), 3);
        // Nearest centre is column -2; the window misses the grid
        assert_eq!(sample_at(&g, -1.6, 1.5), None);
    }

    #[test]
    fn test_window_follows_nearest_centre_at_cell_edge() {
        // 4x4 unit cells with upper-left corner at (0, 4)
        let g = RasterGrid::new(
            Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c + 1) as f64),
            GeoTransform::new(0.0, 4.0, 1.0, -1.0),
            0.0,
        )
        .unwrap();
        // Left of the edge at x = 1: window centred on column 0, clipped to 2x2
        assert_eq!(neighbors(&g, 0.99, 3.5).len(), 4);
        // Right of the edge: window centred on column 1, clipped to 2x3
        assert_eq!(neighbors(&g, 1.01, 3.5).len(), 6);
    }

    #[test]
    fn test_window_is_clipped_at_edges() {
        let g = grid(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]], 0.0);
        let found = neighbors(&g, 0.4, 2.6);
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_weights_are_inverse_distance() {
        let ns = [
            Neighbor { value: 10.0, distance: 1.0 },
            Neighbor { value: 20.0, distance: 2.0 },
        ];
        // (10 * 1 + 20 * 0.5) / 1.5
        assert_relative_eq!(weighted_mean(&ns).unwrap(), 20.0 / 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_distance_short_circuits() {
        let ns = [
            Neighbor { value: 10.0, distance: 1.0 },
            Neighbor { value: 3.0, distance: 0.0 },
        ];
        assert_eq!(weighted_mean(&ns), Some(3.0));
        assert_eq!(weighted_mean(&[]), None);
    }
}
