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

use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Error while reading config.yaml: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cannot set memory limit of {0} MB, more memory is already in use")]
    MemoryLimit(usize),

    #[error("Error while reading reference table: {0}")]
    Reference(#[from] ReferenceError),

    #[error("Error while assembling grid-point series: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Error while resampling series: {0}")]
    Resample(#[from] ResampleError),

    #[error("Error while interpolating onto stations: {0}")]
    Interpolation(#[from] InterpolationError),

    #[error("Error while aggregating basins: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Error while writing output: {0}")]
    Output(#[from] SeriesError),

    #[error("Output directory is faulty: {0}")]
    FaultyOutput(&'static str),

    #[error("Error while handling files: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open config.yaml: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize config.yaml: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds {0}")]
    OutOfBounds(&'static str),
}

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("Raster format of {0} is not supported")]
    UnsupportedFormat(PathBuf),

    #[error("Cannot read raster file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot decode GeoTIFF: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Malformed raster header: {0}")]
    MalformedHeader(&'static str),

    #[error("Raster value '{0}' is not a number")]
    InvalidValue(String),

    #[error("Raster has {found} values but its header declares {expected}")]
    ValueCount { expected: usize, found: usize },

    #[error("Raster sample format is not supported")]
    UnsupportedSampleFormat,

    #[error("Raster is missing georeferencing tag: {0}")]
    MissingGeoreference(&'static str),

    #[error("Raster values cannot be shaped into a matrix: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

#[derive(Error, Debug, PartialEq)]
pub enum WindowError {
    #[error("Window rows {row_up}..{row_down} and columns {col_left}..{col_right} exceed the {nrows}x{ncols} grid")]
    OutOfBounds {
        row_up: i64,
        row_down: i64,
        col_left: i64,
        col_right: i64,
        nrows: usize,
        ncols: usize,
    },
}

#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("File name '{0}' does not follow the configured naming convention")]
    FilenameFormat(String),

    #[error("Timestamp {timestamp} is shared by {first:?} and {second:?}")]
    DuplicateTimestamp {
        timestamp: NaiveDateTime,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Cannot decode raster {file:?}: {source}")]
    Raster {
        file: PathBuf,
        source: RasterError,
    },

    #[error("Cannot extract window from raster {file:?}: {source}")]
    Window {
        file: PathBuf,
        source: WindowError,
    },

    #[error("Window of raster {file:?} has {found} cells but {expected} grid points are defined")]
    WindowLength {
        file: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("No raster files found in {0:?}")]
    NoInputFiles(PathBuf),

    #[error("None of the raster files produced usable data")]
    NoUsableRasters,

    #[error("Cannot list raster files: {0}")]
    Io(#[from] std::io::Error),

    #[error("Assembled series is invalid: {0}")]
    Series(#[from] SeriesError),
}

#[derive(Error, Debug)]
pub enum SeriesError {
    #[error("Timestamps are not strictly ascending at {0}")]
    NotAscending(NaiveDateTime),

    #[error("Values shape {found:?} does not match {expected:?} (timestamps, columns)")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("Cannot write series: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cannot write series: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ResampleError {
    #[error("Granularity is invalid: {0}")]
    Granularity(&'static str),

    #[error("Resampled series is invalid: {0}")]
    Series(#[from] SeriesError),

    #[error("Cannot bracket timestamp: {0}")]
    Search(#[from] SearchError),
}

#[derive(Error, Debug, PartialEq)]
pub enum SearchError {
    #[error("Searched array is empty")]
    EmptyArray,

    #[error("Searched value is out of array bounds")]
    OutOfBounds,
}

#[derive(Error, Debug)]
pub enum InterpolationError {
    #[error("Only {valid} usable grid points at {timestamp}, at least 3 distinct non-collinear points are required")]
    Degenerate {
        timestamp: NaiveDateTime,
        valid: usize,
    },

    #[error("Series column '{0}' has no grid point coordinates")]
    UnknownSite(String),

    #[error("No stations to interpolate onto")]
    NoStations,

    #[error("Interpolated series is invalid: {0}")]
    Series(#[from] SeriesError),
}

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("Basin '{basin}' references point '{point}' which is not in the series")]
    UnknownPointReference { basin: String, point: String },

    #[error("Basin '{basin}' has no data at {timestamp} while other basins do")]
    AlignmentGap {
        basin: String,
        timestamp: NaiveDateTime,
    },

    #[error("Aggregated series is invalid: {0}")]
    Series(#[from] SeriesError),
}

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Cannot read table: {0}")]
    Csv(#[from] csv::Error),

    #[error("Table {file:?} is missing column '{column}'")]
    MissingColumn { file: PathBuf, column: &'static str },

    #[error("Value '{value}' in table {file:?} is not a number")]
    InvalidValue { file: PathBuf, value: String },

    #[error("Basin '{0}' is not defined in the weights table")]
    UnknownBasin(String),

    #[error("Basin '{0}' has no grid points with non-zero weight")]
    NoWeights(String),

    #[error("Table {0:?} has no rows")]
    Empty(PathBuf),
}
