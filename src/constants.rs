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

//! Module containing constants used by the pipeline.

use crate::Float;

/// Canonical missing-value marker.
///
/// Raster no-data cells are replaced with it right after decoding,
/// so every later stage only has to recognise one sentinel.
pub const MISSING_VALUE: Float = Float::NAN;

/// No-data value assumed for Arc/ASCII grids without `nodata_value` header.
pub const ASCII_DEFAULT_NODATA: Float = -9999.0;

/// Default tolerance of the basin weights sum around `1.0`.
pub const DEFAULT_WEIGHT_TOLERANCE: Float = 0.01;

/// Tolerance used when snapping real-world coordinates to raster cell edges.
pub const CELL_EDGE_TOLERANCE: Float = 1.0e-9;

/// Minimum number of sites with known values required to fit the
/// radial-basis interpolant.
pub const MIN_INTERPOLATION_SITES: usize = 3;

/// Format of timestamps in output tables.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Header of the timestamp column in output tables.
pub const TIMESTAMP_HEADER: &str = "DATE";
