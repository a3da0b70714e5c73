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

//! Module containing the reconstruction pipeline.
//!
//! The pipeline is a batch job running the stages strictly forward:
//!
//! 1. Raster files are decoded and windowed ([`raster`], [`window`]).
//! 2. Window vectors are assembled into grid-point series ([`assembler`]).
//! 3. The series is resampled to the target period ([`resample`]).
//! 4. Optionally, grid points are interpolated onto stations
//! ([`interpolation`]), either before or after resampling.
//! 5. Grid-point series is aggregated into basin series ([`aggregation`]).
//!
//! Every stage takes its input by reference and returns a new series,
//! nothing is kept between runs.

mod aggregation;
mod assembler;
mod bisection;
mod configuration;
mod interpolation;
mod raster;
mod reference;
mod resample;
mod series;
mod window;


use self::{
    assembler::Assembler,
    configuration::{Config, InterpolationStage},
    raster::FileDecoder,
    reference::{BasinWeightTable, GridPointCoordinate, StationCoordinate},
    resample::Granularity,
    series::PrecipitationSeries,
};
use crate::{errors::PipelineError, ALLOCATOR};
use log::{debug, info};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Main pipeline function, responsible for running all stages.
///
/// It reads the configuration and reference tables,
/// processes raster files and writes the output series.
pub fn main() -> Result<(), PipelineError> {
    info!("Preparing the pipeline core");

    let core = Core::new()?;

    prepare_output_dir(&core.config.output.directory)?;

    let files = assembler::list_raster_files(&core.config.input.data_dir)?;

    let products = run(&core, &files)?;

    debug!(
        "Reconstructed {} basin rows from {} grid-point rows",
        products.basins.nrows(),
        products.grid_points.nrows()
    );

    info!("Writing output");

    products.basins.write_csv(&core.config.output.basin_path())?;

    if let Some(stations) = &products.stations {
        stations.write_csv(&core.config.output.station_path())?;
    }

    #[cfg(feature = "raw_output")]
    products
        .grid_points
        .write_csv(&core.config.output.directory.join("grid_points_raw.csv"))?;

    Ok(())
}

/// Structure containing pipeline prerequisites.
///
/// Configuration, threadpool and reference tables are
/// loaded once and only borrowed by the stages.
#[derive(Debug)]
pub struct Core {
    pub config: Config,
    pub threadpool: ThreadPool,
    pub grid_points: Vec<GridPointCoordinate>,
    pub stations: Vec<StationCoordinate>,
    pub weights: BasinWeightTable,
}

impl Core {
    /// Pipeline [`Core`] constructor.
    pub fn new() -> Result<Self, PipelineError> {
        debug!("Reading configuration from config.yaml");
        let config = Config::new_from_file(Path::new("config.yaml"))?;

        debug!("Setting memory limit");
        ALLOCATOR
            .set_limit(config.resources.memory.saturating_mul(1024 * 1024))
            .map_err(|_| PipelineError::MemoryLimit(config.resources.memory))?;

        debug!("Setting up ThreadPool");
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(config.resources.threads as usize)
            .stack_size(2 * 1024 * 1024)
            .build()?;

        Core::with_config(config, threadpool)
    }

    /// Loads reference tables listed in the configuration.
    fn with_config(config: Config, threadpool: ThreadPool) -> Result<Self, PipelineError> {
        debug!("Reading reference tables");
        let reference = &config.reference;

        let grid_points = reference::read_grid_points(&reference.grid_points)?;

        let stations = match &reference.stations {
            Some(path) if config.interpolation.stage != InterpolationStage::Disabled => {
                reference::read_stations(path)?
            }
            _ => vec![],
        };

        let weights = reference::read_basin_weights(
            &reference.basin_weights,
            &reference.basins,
            reference.weights_in_percent,
        )?;

        aggregation::check_weight_sums(&weights, reference.weight_tolerance);

        Ok(Core {
            config,
            threadpool,
            grid_points,
            stations,
            weights,
        })
    }
}

/// Series produced by one pipeline run.
#[derive(Clone, PartialEq, Debug)]
pub struct RunProducts {
    pub grid_points: PrecipitationSeries,
    pub stations: Option<PrecipitationSeries>,
    pub basins: PrecipitationSeries,
}

/// Runs all stages on given raster files.
pub fn run(core: &Core, files: &[PathBuf]) -> Result<RunProducts, PipelineError> {
    let config = &core.config;

    let point_ids = core.grid_points.iter().map(|p| p.id.clone()).collect();
    let assembler = Assembler::new(
        FileDecoder,
        config.window,
        config.input.filename,
        config.input.failure_policy,
        point_ids,
    );

    let grid_points = assembler.assemble(files, &core.threadpool)?;

    let granularity = Granularity::from_config(&config.resample);
    let resample_series = |series: &PrecipitationSeries| {
        info!("Resampling series");
        resample::resample(
            series,
            granularity,
            config.resample.policy,
            config.resample.deaccumulate,
        )
    };
    let interpolate_series = |series: &PrecipitationSeries| {
        info!("Interpolating grid points onto stations");
        interpolation::interpolate(series, &core.grid_points, &core.stations, &core.threadpool)
    };

    let (resampled, stations) = match config.interpolation.stage {
        InterpolationStage::Disabled => (resample_series(&grid_points)?, None),
        InterpolationStage::BeforeResample => {
            let stations = interpolate_series(&grid_points)?;
            (resample_series(&grid_points)?, Some(resample_series(&stations)?))
        }
        InterpolationStage::AfterResample => {
            let resampled = resample_series(&grid_points)?;
            let stations = interpolate_series(&resampled)?;
            (resampled, Some(stations))
        }
    };

    info!("Aggregating basins");
    let basins = aggregation::aggregate(&resampled, &core.weights)?;

    Ok(RunProducts {
        grid_points,
        stations,
        basins,
    })
}

/// Creates the output directory if it does not exist.
fn prepare_output_dir(out_path: &Path) -> Result<(), PipelineError> {
    debug!("Checking and setting output directory");

    if out_path.is_dir() {
        debug!("Output directory exists so continuing");
    } else if out_path.exists() {
        return Err(PipelineError::FaultyOutput(
            "Output path exists and is not a directory",
        ));
    } else {
        debug!("Output directory does not exist so creating a new one");
        fs::create_dir_all(out_path)?;
    }

    Ok(())
}
