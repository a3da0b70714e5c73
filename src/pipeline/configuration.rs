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

//! Module responsible for parsing and checking the configuration file.
//!
//! To provide meaningful error messages. The configuration file uses
//! [YAML](https://en.wikipedia.org/wiki/YAML) and `serde` to enforce
//! strong typing and automatic type checking.
//!
//! The structures and their fields in this module directly correspond to
//! the fields inside `config.yaml` so you can check this documentation
//! for more details how to set the config file.

use crate::constants::DEFAULT_WEIGHT_TOLERANCE;
use crate::errors::ConfigError;
use crate::Float;
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Naming convention of raster files from which
/// the period timestamp is parsed.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameConvention {
    /// Daily files named `<prefix>.<year>.<MMDD><suffix>`.
    YearMonthDay,

    /// Sub-daily forecast files named `...DIA<d><HH>HLC.<ext>`,
    /// where `d` is the forecast day (starting from 1) and
    /// `HH` is the hour, both relative to `reference_date`.
    DayOffsetHour { reference_date: NaiveDate },
}

/// What to do with a raster file that cannot be parsed,
/// decoded or windowed.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the whole run on the first failing file.
    Abort,

    /// Leave the file out and report it in the log.
    SkipAndWarn,

    /// Insert a row of missing values at the file timestamp.
    FillWithNoData,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Abort
    }
}

/// Fields with information about raster input.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Input {
    /// Directory with raster files, one file per period.
    ///
    /// Every regular file inside is treated as a raster, so
    /// the directory should contain nothing else.
    pub data_dir: PathBuf,

    /// Naming convention of the raster files.
    pub filename: FilenameConvention,

    /// _(Optional)_ Handling of files that fail to be read.
    ///
    /// Defaults to `abort`.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

/// Rectangular extent in raster coordinates.
#[derive(Copy, Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct BoundingBox {
    pub west: Float,
    pub south: Float,
    pub east: Float,
    pub north: Float,
}

/// Definition of the raster window covering the basins under study.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSpec {
    /// Window given by two linear indices of the flattened grid.
    ///
    /// The indices are only meaningful for one raster resolution,
    /// prefer `bounding_box` for new setups.
    CellIndices { top_cell: usize, lower_cell: usize },

    /// Window given in real-world raster coordinates, translated
    /// to rows and columns with each raster's own georeference.
    BoundingBox(BoundingBox),
}

impl WindowSpec {
    /// Checks if window specification follows conventions
    /// and limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        match self {
            WindowSpec::CellIndices {
                top_cell,
                lower_cell,
            } => {
                if top_cell > lower_cell {
                    return Err(ConfigError::OutOfBounds(
                        "Top cell index cannot be greater than lower cell index",
                    ));
                }
            }
            WindowSpec::BoundingBox(bbox) => {
                if !(bbox.west.is_finite()
                    && bbox.east.is_finite()
                    && bbox.south.is_finite()
                    && bbox.north.is_finite())
                {
                    return Err(ConfigError::OutOfBounds(
                        "Bounding box coordinates must be finite",
                    ));
                }

                if bbox.west >= bbox.east || bbox.south >= bbox.north {
                    return Err(ConfigError::OutOfBounds(
                        "Bounding box must have west < east and south < north",
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Temporal resampling policy.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplePolicy {
    /// Running sum along time, linearly interpolated at the target frequency.
    CumulativeInterpolate,

    /// Period totals split evenly into target slots and forward-filled.
    DisaggregateForwardFill,
}

/// Fields with information about temporal resampling.
#[derive(Copy, Clone, PartialEq, Debug, Deserialize)]
pub struct Resample {
    /// Native period of the raster feed in hours (eg. `24` for daily files).
    pub source_period: u32,

    /// Period of the output series in hours.
    ///
    /// `source_period` must be a multiple of it.
    pub target_period: u32,

    pub policy: ResamplePolicy,

    /// _(Optional)_ Convert cumulative output back to per-period amounts.
    /// Only affects the `cumulative_interpolate` policy.
    ///
    /// Defaults to `false`.
    #[serde(default)]
    pub deaccumulate: bool,
}

impl Resample {
    /// Checks if periods are positive and compatible.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.source_period < 1 || self.target_period < 1 {
            return Err(ConfigError::OutOfBounds(
                "Resampling periods cannot be shorter than 1 hour",
            ));
        }

        if self.source_period % self.target_period != 0 {
            return Err(ConfigError::OutOfBounds(
                "Source period must be a multiple of target period",
            ));
        }

        Ok(())
    }

    pub fn source_duration(&self) -> Duration {
        Duration::hours(i64::from(self.source_period))
    }

    pub fn target_duration(&self) -> Duration {
        Duration::hours(i64::from(self.target_period))
    }
}

/// Moment of the pipeline at which grid points are
/// interpolated onto stations.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationStage {
    Disabled,
    BeforeResample,
    AfterResample,
}

impl Default for InterpolationStage {
    fn default() -> Self {
        InterpolationStage::Disabled
    }
}

/// _(Optional)_ Fields with information about spatial interpolation.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Default)]
pub struct Interpolation {
    /// Defaults to `disabled`.
    #[serde(default)]
    pub stage: InterpolationStage,
}

/// Fields with paths to reference tables and their options.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Reference {
    /// Table of grid points with `POINTID`, `X`, `Y` columns.
    ///
    /// Rows must follow the row-major order of window cells,
    /// as they label the extracted vectors.
    pub grid_points: PathBuf,

    /// _(Optional)_ Table of stations with `COD`, `ESTE`, `NORTE` columns.
    ///
    /// Required when interpolation is enabled.
    #[serde(default)]
    pub stations: Option<PathBuf>,

    /// Table with `POINTID` column and one weights column per basin.
    pub basin_weights: PathBuf,

    /// _(Optional)_ Basins to aggregate. Defaults to all basins in the weights table.
    #[serde(default)]
    pub basins: Vec<String>,

    /// _(Optional)_ Weights are given in percent instead of fractions.
    ///
    /// Defaults to `false`.
    #[serde(default)]
    pub weights_in_percent: bool,

    /// _(Optional)_ Allowed deviation of basin weights sum from `1.0`
    /// before a warning is issued.
    ///
    /// Defaults to `0.01`. Cannot be negative.
    #[serde(default = "Reference::default_weight_tolerance")]
    pub weight_tolerance: Float,
}

impl Reference {
    fn default_weight_tolerance() -> Float {
        DEFAULT_WEIGHT_TOLERANCE
    }

    pub fn check_bounds(&self, interpolation: &Interpolation) -> Result<(), ConfigError> {
        if !(self.weight_tolerance >= 0.0) {
            return Err(ConfigError::OutOfBounds(
                "Weight tolerance cannot be negative",
            ));
        }

        if interpolation.stage != InterpolationStage::Disabled && self.stations.is_none() {
            return Err(ConfigError::OutOfBounds(
                "Stations table is required when interpolation is enabled",
            ));
        }

        if self.basins.iter().any(|b| b.trim().is_empty()) {
            return Err(ConfigError::OutOfBounds("Basin identifiers cannot be empty"));
        }

        Ok(())
    }
}

/// _(Optional)_ Fields with information about output files.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Output {
    #[serde(default = "Output::default_directory")]
    pub directory: PathBuf,

    #[serde(default = "Output::default_basin_file")]
    pub basin_file: String,

    #[serde(default = "Output::default_station_file")]
    pub station_file: String,
}

impl Output {
    fn default_directory() -> PathBuf {
        PathBuf::from("./output/")
    }

    fn default_basin_file() -> String {
        "basins.csv".to_string()
    }

    fn default_station_file() -> String {
        "stations.csv".to_string()
    }

    pub fn basin_path(&self) -> PathBuf {
        self.directory.join(&self.basin_file)
    }

    pub fn station_path(&self) -> PathBuf {
        self.directory.join(&self.station_file)
    }
}

impl Default for Output {
    fn default() -> Self {
        Output {
            directory: Output::default_directory(),
            basin_file: Output::default_basin_file(),
            station_file: Output::default_station_file(),
        }
    }
}

/// _(Optional)_ Fields with information about
/// resources available for the pipeline.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used by the pipeline.
    /// Rasters are decoded and rows interpolated on a thread
    /// pool with up to this number of workers.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit for the pipeline in MB.
    /// Useful for enabling meaningful Out-of-memory error messages.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space
    /// (`2^32` or `2^64` bytes).
    ///
    /// Long reconstructions keep every windowed raster in memory
    /// until the series is assembled. If the process gets killed for
    /// no apparent reason try setting the limit lower than your
    /// available system memory and check if OOM error occurs.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        Ok(())
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Config {
    pub input: Input,

    pub window: WindowSpec,

    pub resample: Resample,

    #[serde(default)]
    pub interpolation: Interpolation,

    pub reference: Reference,

    #[serde(default)]
    pub output: Output,

    #[serde(default)]
    pub resources: Resources,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;
        Config::new_from_slice(data.as_slice())
    }

    fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let config: Config = serde_yaml::from_slice(data)?;

        config.window.check_bounds()?;
        config.resample.check_bounds()?;
        config.reference.check_bounds(&config.interpolation)?;
        config.resources.check_bounds()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
input:
  data_dir: ./data/chirps
  filename: year_month_day
  failure_policy: skip_and_warn
window:
  cell_indices:
    top_cell: 6158060
    lower_cell: 6906903
resample:
  source_period: 24
  target_period: 1
  policy: disaggregate_forward_fill
interpolation:
  stage: after_resample
reference:
  grid_points: ./ref/points.csv
  stations: ./ref/stations.csv
  basin_weights: ./ref/weights.csv
  basins: [PORCE, GUADALUPE]
resources:
  threads: 4
"#;

    #[test]
    fn full_config() {
        let config = Config::new_from_slice(FULL_CONFIG.as_bytes()).unwrap();

        assert_eq!(config.input.filename, FilenameConvention::YearMonthDay);
        assert_eq!(config.input.failure_policy, FailurePolicy::SkipAndWarn);
        assert_eq!(
            config.window,
            WindowSpec::CellIndices {
                top_cell: 6158060,
                lower_cell: 6906903
            }
        );
        assert_eq!(config.resample.source_duration(), Duration::hours(24));
        assert!(!config.resample.deaccumulate);
        assert_eq!(config.interpolation.stage, InterpolationStage::AfterResample);
        assert_eq!(config.reference.basins, vec!["PORCE", "GUADALUPE"]);
        assert_eq!(config.reference.weight_tolerance, DEFAULT_WEIGHT_TOLERANCE);
        assert_eq!(config.output.basin_path(), PathBuf::from("./output/basins.csv"));
        assert_eq!(config.resources.threads, 4);
    }

    #[test]
    fn sub_daily_with_bounding_box() {
        let yaml = r#"
input:
  data_dir: ./data/ideam
  filename:
    day_offset_hour:
      reference_date: 2022-03-15
window:
  bounding_box: { west: -76.0, south: 5.5, east: -75.0, north: 7.0 }
resample: { source_period: 1, target_period: 1, policy: cumulative_interpolate }
reference:
  grid_points: points.csv
  basin_weights: weights.csv
"#;
        let config = Config::new_from_slice(yaml.as_bytes()).unwrap();

        assert_eq!(
            config.input.filename,
            FilenameConvention::DayOffsetHour {
                reference_date: NaiveDate::from_ymd_opt(2022, 3, 15).unwrap()
            }
        );
        assert_eq!(config.input.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.interpolation.stage, InterpolationStage::Disabled);
        assert!(matches!(config.window, WindowSpec::BoundingBox(b) if b.west == -76.0));
    }

    #[test]
    fn incompatible_periods() {
        let resample = Resample {
            source_period: 24,
            target_period: 5,
            policy: ResamplePolicy::CumulativeInterpolate,
            deaccumulate: false,
        };

        assert!(matches!(
            resample.check_bounds(),
            Err(ConfigError::OutOfBounds(_))
        ));
    }

    #[test]
    fn inverted_window() {
        let cells = WindowSpec::CellIndices {
            top_cell: 10,
            lower_cell: 5,
        };
        let bbox = WindowSpec::BoundingBox(BoundingBox {
            west: 1.0,
            south: 0.0,
            east: 0.0,
            north: 1.0,
        });

        assert!(cells.check_bounds().is_err());
        assert!(bbox.check_bounds().is_err());
    }

    #[test]
    fn stations_required_for_interpolation() {
        let yaml = FULL_CONFIG.replace("  stations: ./ref/stations.csv\n", "");

        assert!(matches!(
            Config::new_from_slice(yaml.as_bytes()),
            Err(ConfigError::OutOfBounds(_))
        ));
    }
}
