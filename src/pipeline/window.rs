/*
Copyright 2022 Jakub Lewandowski

This file is part of Basin Precipitation Reconstruction (BPR).

Basin Precipitation Reconstruction (BPR) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Basin Precipitation Reconstruction (BPR) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Basin Precipitation Reconstruction (BPR). If not, see https://www.gnu.org/licenses/.
*/

//! Module extracting the rectangular window of interest
//! from raster grids.
//!
//! Window is computed separately for every raster, so a grid
//! with a different resolution is either windowed correctly
//! (bounding box) or rejected (cell indices), never misread.

use super::configuration::{BoundingBox, WindowSpec};
use super::raster::RasterGrid;
use crate::{constants::CELL_EDGE_TOLERANCE, errors::WindowError, Float};
use ndarray::s;

/// Half-open row and column bounds of the window.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct WindowBounds {
    pub row_up: i64,
    pub row_down: i64,
    pub col_left: i64,
    pub col_right: i64,
}

impl WindowBounds {
    /// Derives bounds from two linear indices of the flattened grid
    /// with `ncols` columns.
    pub fn from_cell_indices(top_cell: usize, lower_cell: usize, ncols: usize) -> Self {
        // zero columns cannot be windowed, the bounds below are then
        // rejected by `check_fits`
        let ncols = ncols.max(1) as i64;
        let (top_cell, lower_cell) = (top_cell as i64, lower_cell as i64);

        WindowBounds {
            row_up: top_cell / ncols,
            col_left: (lower_cell % ncols) - 1,
            row_down: (lower_cell / ncols) + 1,
            col_right: lower_cell % ncols,
        }
    }

    /// Derives bounds covering every cell that intersects the bounding box,
    /// using the grid lower-left corner and cell size.
    pub fn from_bounding_box(bbox: &BoundingBox, grid: &RasterGrid) -> Self {
        let (xll, _) = grid.lower_left;
        let (_, yur) = grid.upper_right;
        let cell_size = grid.cell_size;

        WindowBounds {
            row_up: snap_floor((yur - bbox.north) / cell_size),
            row_down: snap_ceil((yur - bbox.south) / cell_size),
            col_left: snap_floor((bbox.west - xll) / cell_size),
            col_right: snap_ceil((bbox.east - xll) / cell_size),
        }
    }

    /// Number of cells in the window.
    pub fn len(&self) -> usize {
        ((self.row_down - self.row_up) * (self.col_right - self.col_left)).max(0) as usize
    }

    /// Checks if the window lies within a grid of given shape.
    pub fn check_fits(&self, nrows: usize, ncols: usize) -> Result<(), WindowError> {
        let fits = self.row_up >= 0
            && self.col_left >= 0
            && self.row_up <= self.row_down
            && self.col_left <= self.col_right
            && self.row_down <= nrows as i64
            && self.col_right <= ncols as i64;

        if fits {
            Ok(())
        } else {
            Err(WindowError::OutOfBounds {
                row_up: self.row_up,
                row_down: self.row_down,
                col_left: self.col_left,
                col_right: self.col_right,
                nrows,
                ncols,
            })
        }
    }
}

/// Resolves the window specification against a particular grid.
pub fn window_bounds(grid: &RasterGrid, window: &WindowSpec) -> Result<WindowBounds, WindowError> {
    let bounds = match window {
        WindowSpec::CellIndices {
            top_cell,
            lower_cell,
        } => WindowBounds::from_cell_indices(*top_cell, *lower_cell, grid.ncols),
        WindowSpec::BoundingBox(bbox) => WindowBounds::from_bounding_box(bbox, grid),
    };

    if grid.ncols == 0 || grid.nrows == 0 {
        return Err(WindowError::OutOfBounds {
            row_up: bounds.row_up,
            row_down: bounds.row_down,
            col_left: bounds.col_left,
            col_right: bounds.col_right,
            nrows: grid.nrows,
            ncols: grid.ncols,
        });
    }

    bounds.check_fits(grid.nrows, grid.ncols)?;

    Ok(bounds)
}

/// Slices the window out of the grid matrix and flattens it
/// row by row (north to south, west to east within a row).
pub fn extract(grid: &RasterGrid, window: &WindowSpec) -> Result<Vec<Float>, WindowError> {
    let bounds = window_bounds(grid, window)?;

    let truncated = grid.matrix.slice(s![
        bounds.row_up as usize..bounds.row_down as usize,
        bounds.col_left as usize..bounds.col_right as usize
    ]);

    let mut vector = Vec::with_capacity(bounds.len());
    vector.extend(truncated.iter().copied());

    Ok(vector)
}

/// Floor that treats values within tolerance of an integer as that integer,
/// so cell edges given in coordinates do not pull in neighbouring cells.
fn snap_floor(value: Float) -> i64 {
    let rounded = value.round();

    if (value - rounded).abs() < CELL_EDGE_TOLERANCE {
        rounded as i64
    } else {
        value.floor() as i64
    }
}

fn snap_ceil(value: Float) -> i64 {
    let rounded = value.round();

    if (value - rounded).abs() < CELL_EDGE_TOLERANCE {
        rounded as i64
    } else {
        value.ceil() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::{extract, window_bounds, WindowBounds};
    use crate::errors::WindowError;
    use crate::pipeline::configuration::{BoundingBox, WindowSpec};
    use crate::pipeline::raster::build_raster;
    use ndarray::Array2;

    fn indexed_grid(nrows: usize, ncols: usize) -> crate::pipeline::raster::RasterGrid {
        let matrix = Array2::from_shape_fn((nrows, ncols), |(r, c)| (r * ncols + c) as f64);
        build_raster((0.0, 0.0), 1.0, -9999.0, matrix)
    }

    #[test]
    fn cell_indices_bounds() {
        let bounds = WindowBounds::from_cell_indices(23, 57, 10);

        assert_eq!(
            bounds,
            WindowBounds {
                row_up: 2,
                row_down: 6,
                col_left: 6,
                col_right: 7
            }
        );
        assert_eq!(bounds.len(), 4);
    }

    #[test]
    fn ordered_bounds_for_any_columns() {
        for ncols in 1..40 {
            for lower in 0..200 {
                let bounds = WindowBounds::from_cell_indices(lower / 2, lower, ncols);

                assert!(bounds.row_up <= bounds.row_down);
                assert!(bounds.col_left <= bounds.col_right);
            }
        }
    }

    #[test]
    fn extract_cell_indices() {
        let grid = indexed_grid(10, 10);
        let window = WindowSpec::CellIndices {
            top_cell: 23,
            lower_cell: 57,
        };

        let vector = extract(&grid, &window).unwrap();

        assert_eq!(vector, vec![26.0, 36.0, 46.0, 56.0]);
    }

    #[test]
    fn extract_bounding_box() {
        let grid = indexed_grid(10, 10);
        let window = WindowSpec::BoundingBox(BoundingBox {
            west: 2.0,
            south: 3.0,
            east: 4.0,
            north: 5.0,
        });

        let bounds = window_bounds(&grid, &window).unwrap();
        let vector = extract(&grid, &window).unwrap();

        assert_eq!(vector.len(), bounds.len());
        assert_eq!(vector, vec![52.0, 53.0, 62.0, 63.0]);
    }

    #[test]
    fn bounding_box_partially_covering_cells() {
        let grid = indexed_grid(10, 10);
        let window = WindowSpec::BoundingBox(BoundingBox {
            west: 2.5,
            south: 3.5,
            east: 3.5,
            north: 4.5,
        });

        let vector = extract(&grid, &window).unwrap();

        assert_eq!(vector, vec![52.0, 53.0, 62.0, 63.0]);
    }

    #[test]
    fn bounding_box_follows_resolution() {
        let coarse = indexed_grid(10, 10);
        let fine = build_raster((0.0, 0.0), 0.5, -9999.0, Array2::zeros((20, 20)));
        let window = WindowSpec::BoundingBox(BoundingBox {
            west: 2.0,
            south: 3.0,
            east: 4.0,
            north: 5.0,
        });

        assert_eq!(extract(&coarse, &window).unwrap().len(), 4);
        assert_eq!(extract(&fine, &window).unwrap().len(), 16);
    }

    #[test]
    fn window_out_of_bounds() {
        let grid = indexed_grid(5, 5);
        let rows = WindowSpec::CellIndices {
            top_cell: 0,
            lower_cell: 27,
        };
        let left_edge = WindowSpec::CellIndices {
            top_cell: 0,
            lower_cell: 10,
        };
        let outside = WindowSpec::BoundingBox(BoundingBox {
            west: 4.0,
            south: 0.0,
            east: 6.0,
            north: 1.0,
        });

        assert!(matches!(
            extract(&grid, &rows),
            Err(WindowError::OutOfBounds { row_down: 6, .. })
        ));
        assert!(matches!(
            extract(&grid, &left_edge),
            Err(WindowError::OutOfBounds { col_left: -1, .. })
        ));
        assert!(extract(&grid, &outside).is_err());
    }
}
