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

//! Module responsible for decoding raster files into
//! an in-memory grid.
//!
//! Two encodings are recognised from the file extension:
//! Arc/ASCII grids (`.asc`) and GeoTIFF (`.tif`, `.tiff`).
//! Anything else is reported as unsupported instead of
//! being replaced with an empty placeholder grid.

mod ascii;
mod geotiff;

use crate::{constants::MISSING_VALUE, errors::RasterError, Float};
use ndarray::Array2;
use std::path::Path;

/// Decoded raster with its georeference.
///
/// The grid lives only as long as it takes to extract
/// the window vector from it.
#[derive(Clone, PartialEq, Debug)]
pub struct RasterGrid {
    pub ncols: usize,
    pub nrows: usize,
    pub cell_size: Float,
    pub lower_left: (Float, Float),
    pub upper_right: (Float, Float),
    pub no_data_value: Float,
    pub matrix: Array2<Float>,
}

impl RasterGrid {
    /// Total number of cells in the grid.
    pub fn nclls(&self) -> usize {
        self.nrows * self.ncols
    }

    /// Replaces cells equal to the raster no-data value
    /// with the canonical missing-value marker.
    fn change_no_data(&mut self) {
        let no_data = self.no_data_value;

        self.matrix.mapv_inplace(|v| {
            if v == no_data || v.is_nan() {
                MISSING_VALUE
            } else {
                v
            }
        });

        self.no_data_value = MISSING_VALUE;
    }
}

/// Builds a [`RasterGrid`] when its matrix and lower-left
/// georeference are known, computing the remaining attributes.
pub fn build_raster(
    lower_left: (Float, Float),
    cell_size: Float,
    no_data_value: Float,
    matrix: Array2<Float>,
) -> RasterGrid {
    let (nrows, ncols) = matrix.dim();

    let upper_right = (
        lower_left.0 + ncols as Float * cell_size,
        lower_left.1 + nrows as Float * cell_size,
    );

    let mut raster = RasterGrid {
        ncols,
        nrows,
        cell_size,
        lower_left,
        upper_right,
        no_data_value,
        matrix,
    };

    raster.change_no_data();
    raster
}

/// Contract of raster decoders used by the assembler.
///
/// Decoders are shared between worker threads, hence `Sync`.
pub trait RasterDecoder: Sync {
    fn decode(&self, path: &Path) -> Result<RasterGrid, RasterError>;
}

/// Decoder dispatching on the raster file extension.
#[derive(Copy, Clone, Debug, Default)]
pub struct FileDecoder;

impl RasterDecoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<RasterGrid, RasterError> {
        read_raster(path)
    }
}

/// Loads a raster after identifying the file extension.
pub fn read_raster(path: &Path) -> Result<RasterGrid, RasterError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("asc") => ascii::read_ascii_raster(path),
        Some("tif") | Some("tiff") => geotiff::read_tif_raster(path),
        _ => Err(RasterError::UnsupportedFormat(path.to_path_buf())),
    }
}
