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

//! Basin Precipitation Reconstruction (BPR) rebuilds spatiotemporal
//! precipitation time series for river basins from periodic gridded
//! rainfall rasters.
//!
//! Raw rasters (one per forecast or observation period) are windowed
//! down to the extent of interest, assembled into a grid-point time series,
//! resampled to the target temporal granularity, optionally interpolated
//! onto gauge stations and finally aggregated into basin-level series
//! using area-weighted contributions.

mod constants;
mod errors;
mod pipeline;

use cap::Cap;
use env_logger::Env;
use log::{error, info};
use std::alloc;

type Float = f64;

/// Global allocator used by the pipeline.
///
/// Use of static global allocator allows for capping the memory to the limit set by user
/// in configuration file and in effect provide better [OOM error](https://en.wikipedia.org/wiki/Out_of_memory) handling
/// when long reconstructions with many rasters are run.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// The main program function.
/// Prepares the runtime environment and calls the [`pipeline::main`].
///
/// The `env_logger` needs to be initiated before any log messages
/// are possible to occur, so that errors raised while reading the
/// configuration are also reported.
fn main() {
    #[cfg(not(feature = "debug"))]
    let logger_env = Env::new().filter_or("BASIN_PRECIP_LOG_LEVEL", "info");

    #[cfg(feature = "debug")]
    let logger_env = Env::new().filter_or("BASIN_PRECIP_LOG_LEVEL", "debug");

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    match pipeline::main() {
        Ok(_) => info!("Reconstruction finished. Check the output directory and log."),
        Err(err) => {
            error!("Reconstruction failed with error: {}", err);
            std::process::exit(1);
        }
    }
}
