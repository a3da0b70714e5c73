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

//! Sub-module reading Arc/ASCII grids.
//!
//! The header is a list of `key value` lines (`ncols`, `nrows`,
//! `xllcorner` or `xllcenter`, `yllcorner` or `yllcenter`, `cellsize`
//! and optional `nodata_value`) followed by values row by row
//! starting from the northernmost row.

use super::{build_raster, RasterGrid};
use crate::{constants::ASCII_DEFAULT_NODATA, errors::RasterError, Float};
use ndarray::Array2;
use std::{fs, path::Path};

const HEADER_KEYS: [&str; 8] = [
    "ncols",
    "nrows",
    "xllcorner",
    "xllcenter",
    "yllcorner",
    "yllcenter",
    "cellsize",
    "nodata_value",
];

#[derive(Debug, Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    xll: Option<Float>,
    yll: Option<Float>,
    centered: (bool, bool),
    cell_size: Option<Float>,
    no_data: Option<Float>,
}

/// Loads an Arc/ASCII raster file from the disk.
pub(super) fn read_ascii_raster(path: &Path) -> Result<RasterGrid, RasterError> {
    let content = fs::read_to_string(path)?;
    parse_ascii_raster(&content)
}

/// Parses Arc/ASCII raster content.
pub(super) fn parse_ascii_raster(content: &str) -> Result<RasterGrid, RasterError> {
    let mut tokens = content.split_whitespace().peekable();
    let mut header = Header::default();

    while let Some(key) = tokens.peek() {
        let key = key.to_lowercase();

        if !HEADER_KEYS.contains(&key.as_str()) {
            break;
        }

        tokens.next();
        let value = tokens
            .next()
            .ok_or(RasterError::MalformedHeader("header key without value"))?;

        match key.as_str() {
            "ncols" => header.ncols = Some(parse_count(value)?),
            "nrows" => header.nrows = Some(parse_count(value)?),
            "xllcorner" => {
                header.xll = Some(parse_value(value)?);
                header.centered.0 = false;
            }
            "xllcenter" => {
                header.xll = Some(parse_value(value)?);
                header.centered.0 = true;
            }
            "yllcorner" => {
                header.yll = Some(parse_value(value)?);
                header.centered.1 = false;
            }
            "yllcenter" => {
                header.yll = Some(parse_value(value)?);
                header.centered.1 = true;
            }
            "cellsize" => header.cell_size = Some(parse_value(value)?),
            _ => header.no_data = Some(parse_value(value)?),
        }
    }

    let ncols = header
        .ncols
        .ok_or(RasterError::MalformedHeader("ncols is missing"))?;
    let nrows = header
        .nrows
        .ok_or(RasterError::MalformedHeader("nrows is missing"))?;
    let cell_size = header
        .cell_size
        .ok_or(RasterError::MalformedHeader("cellsize is missing"))?;
    let mut xll = header
        .xll
        .ok_or(RasterError::MalformedHeader("xllcorner is missing"))?;
    let mut yll = header
        .yll
        .ok_or(RasterError::MalformedHeader("yllcorner is missing"))?;

    if !(cell_size > 0.0) {
        return Err(RasterError::MalformedHeader("cellsize must be positive"));
    }

    // centre-registered grids are shifted to the corner convention
    if header.centered.0 {
        xll -= 0.5 * cell_size;
    }
    if header.centered.1 {
        yll -= 0.5 * cell_size;
    }

    let values = tokens
        .map(parse_value)
        .collect::<Result<Vec<Float>, RasterError>>()?;

    if values.len() != nrows * ncols {
        return Err(RasterError::ValueCount {
            expected: nrows * ncols,
            found: values.len(),
        });
    }

    let matrix = Array2::from_shape_vec((nrows, ncols), values)?;

    Ok(build_raster(
        (xll, yll),
        cell_size,
        header.no_data.unwrap_or(ASCII_DEFAULT_NODATA),
        matrix,
    ))
}

fn parse_value(token: &str) -> Result<Float, RasterError> {
    token
        .parse::<Float>()
        .map_err(|_| RasterError::InvalidValue(token.to_string()))
}

fn parse_count(token: &str) -> Result<usize, RasterError> {
    token
        .parse::<usize>()
        .map_err(|_| RasterError::InvalidValue(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::parse_ascii_raster;
    use crate::errors::RasterError;
    use float_cmp::approx_eq;

    const GRID: &str = "ncols        3
nrows        2
xllcorner    -76.0
yllcorner    5.0
cellsize     0.05
NODATA_value -9999
1.5 2.0 -9999
0.0 4.25 3.0
";

    #[test]
    fn parse_grid() {
        let raster = parse_ascii_raster(GRID).unwrap();

        assert_eq!((raster.nrows, raster.ncols), (2, 3));
        assert!(approx_eq!(f64, raster.upper_right.0, -75.85, epsilon = 1e-12));
        assert!(approx_eq!(f64, raster.upper_right.1, 5.1, epsilon = 1e-12));
        assert_eq!(raster.matrix[[0, 0]], 1.5);
        assert!(raster.matrix[[0, 2]].is_nan());
        assert_eq!(raster.matrix[[1, 1]], 4.25);
    }

    #[test]
    fn centre_registered_grid() {
        let grid = "ncols 1\nnrows 1\nxllcenter 0.5\nyllcenter 1.5\ncellsize 1\n7\n";
        let raster = parse_ascii_raster(grid).unwrap();

        assert_eq!(raster.lower_left, (0.0, 1.0));
        assert_eq!(raster.matrix[[0, 0]], 7.0);
    }

    #[test]
    fn last_registration_key_wins() {
        let grid = "ncols 1\nnrows 1\nxllcenter 0.5\nxllcorner 2\nyllcorner 1\nyllcenter 1.5\ncellsize 1\n7\n";
        let raster = parse_ascii_raster(grid).unwrap();

        assert_eq!(raster.lower_left, (2.0, 1.0));
    }

    #[test]
    fn default_no_data() {
        let grid = "ncols 2\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\n-9999 3\n";
        let raster = parse_ascii_raster(grid).unwrap();

        assert!(raster.matrix[[0, 0]].is_nan());
    }

    #[test]
    fn truncated_values() {
        let grid = "ncols 2\nnrows 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2 3\n";

        assert!(matches!(
            parse_ascii_raster(grid),
            Err(RasterError::ValueCount {
                expected: 4,
                found: 3
            })
        ));
    }

    #[test]
    fn missing_header_key() {
        let grid = "ncols 2\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 2\n";

        assert!(matches!(
            parse_ascii_raster(grid),
            Err(RasterError::MalformedHeader(_))
        ));
    }

    #[test]
    fn garbage_value() {
        let grid = "ncols 2\nnrows 1\nxllcorner 0\nyllcorner 0\ncellsize 1\n1 abc\n";

        assert!(matches!(
            parse_ascii_raster(grid),
            Err(RasterError::InvalidValue(v)) if v == "abc"
        ));
    }
}
