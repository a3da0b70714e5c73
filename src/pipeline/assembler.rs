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

//! Module assembling the grid-point series from raster files.
//!
//! Each file is handled independently: its timestamp is parsed from the
//! file name, the raster is decoded and the window vector extracted.
//! Files are processed on the threadpool and the outcomes are gathered
//! through a channel, so the series itself is built by a single owner.
//!
//! The failure policy is applied afterwards in file-name order,
//! which makes `abort` report the same file regardless of which
//! worker finished first.

use super::configuration::{FailurePolicy, FilenameConvention, WindowSpec};
use super::raster::RasterDecoder;
use super::series::PrecipitationSeries;
use super::window;
use crate::{constants::MISSING_VALUE, errors::AssemblyError, Float};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use ndarray::Array2;
use rayon::ThreadPool;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
};

/// Reason for which a file did not produce a window vector.
///
/// Timestamp is known when only decoding or windowing failed.
#[derive(Debug)]
struct FileFailure {
    timestamp: Option<NaiveDateTime>,
    error: AssemblyError,
}

type FileOutcome = Result<(NaiveDateTime, Vec<Float>), FileFailure>;

/// Settings shared by all workers processing raster files.
#[derive(Debug)]
pub struct Assembler<D: RasterDecoder> {
    decoder: Arc<D>,
    window: WindowSpec,
    convention: FilenameConvention,
    policy: FailurePolicy,
    point_ids: Arc<Vec<String>>,
}

impl<D: RasterDecoder + Send + 'static> Assembler<D> {
    /// Assembler constructor.
    ///
    /// `point_ids` label the window cells in row-major order,
    /// so their count is also the expected window length.
    pub fn new(
        decoder: D,
        window: WindowSpec,
        convention: FilenameConvention,
        policy: FailurePolicy,
        point_ids: Vec<String>,
    ) -> Self {
        Assembler {
            decoder: Arc::new(decoder),
            window,
            convention,
            policy,
            point_ids: Arc::new(point_ids),
        }
    }

    /// Builds the series from given files, which are expected
    /// to be sorted by name.
    pub fn assemble(
        &self,
        files: &[PathBuf],
        threadpool: &ThreadPool,
    ) -> Result<PrecipitationSeries, AssemblyError> {
        info!("Assembling series from {} raster files", files.len());

        let files_bar = ProgressBar::new(files.len() as u64);
        files_bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
                .progress_chars("#>-"),
        );
        files_bar.set_prefix("Decoded rasters");

        let (tx, rx) = mpsc::channel();

        for (i, file) in files.iter().enumerate() {
            let tx = tx.clone();
            let file = file.clone();
            let decoder = Arc::clone(&self.decoder);
            let point_ids = Arc::clone(&self.point_ids);
            let window = self.window;
            let convention = self.convention;

            threadpool.spawn(move || {
                let outcome = process_file(&file, decoder.as_ref(), &window, &convention, &point_ids);
                // receiver lives until every file is reported
                let _ = tx.send((i, outcome));
            });
        }

        drop(tx);

        let mut outcomes: Vec<(usize, FileOutcome)> = Vec::with_capacity(files.len());
        for outcome in rx.iter() {
            outcomes.push(outcome);
            files_bar.inc(1);
        }

        files_bar.finish_with_message("All rasters processed");

        outcomes.sort_by_key(|(i, _)| *i);

        let mut rows = Vec::with_capacity(outcomes.len());

        for (i, outcome) in outcomes {
            let file = &files[i];

            match outcome {
                Ok((timestamp, vector)) => rows.push((timestamp, file.clone(), vector)),
                Err(failure) => {
                    if let Some(row) = self.apply_policy(file, failure)? {
                        rows.push(row);
                    }
                }
            }
        }

        build_series(rows, &self.point_ids)
    }

    /// Returns a no-data row, nothing (file skipped)
    /// or the error when the run must stop.
    fn apply_policy(
        &self,
        file: &Path,
        failure: FileFailure,
    ) -> Result<Option<(NaiveDateTime, PathBuf, Vec<Float>)>, AssemblyError> {
        match (self.policy, failure.timestamp) {
            (FailurePolicy::Abort, _) => Err(failure.error),
            (FailurePolicy::SkipAndWarn, _) => {
                warn!("Skipping raster {:?}: {}", file, failure.error);
                Ok(None)
            }
            (FailurePolicy::FillWithNoData, Some(timestamp)) => {
                warn!(
                    "Filling {} with no data in place of raster {:?}: {}",
                    timestamp, file, failure.error
                );
                Ok(Some((
                    timestamp,
                    file.to_path_buf(),
                    vec![MISSING_VALUE; self.point_ids.len()],
                )))
            }
            (FailurePolicy::FillWithNoData, None) => {
                warn!(
                    "Raster {:?} has no timestamp to fill, skipping it instead: {}",
                    file, failure.error
                );
                Ok(None)
            }
        }
    }
}

/// Parses the timestamp, decodes the raster and extracts its window.
fn process_file<D: RasterDecoder>(
    file: &Path,
    decoder: &D,
    window: &WindowSpec,
    convention: &FilenameConvention,
    point_ids: &[String],
) -> FileOutcome {
    let timestamp = parse_timestamp(file, convention).map_err(|error| FileFailure {
        timestamp: None,
        error,
    })?;

    let failed = |error| FileFailure {
        timestamp: Some(timestamp),
        error,
    };

    let grid = decoder.decode(file).map_err(|source| {
        failed(AssemblyError::Raster {
            file: file.to_path_buf(),
            source,
        })
    })?;

    debug!(
        "Decoded raster {:?} with {} cells for {}",
        file,
        grid.nclls(),
        timestamp
    );

    let vector = window::extract(&grid, window).map_err(|source| {
        failed(AssemblyError::Window {
            file: file.to_path_buf(),
            source,
        })
    })?;

    if vector.len() != point_ids.len() {
        return Err(failed(AssemblyError::WindowLength {
            file: file.to_path_buf(),
            expected: point_ids.len(),
            found: vector.len(),
        }));
    }

    Ok((timestamp, vector))
}

/// Sorts rows by timestamp and stacks them into the series.
fn build_series(
    mut rows: Vec<(NaiveDateTime, PathBuf, Vec<Float>)>,
    point_ids: &[String],
) -> Result<PrecipitationSeries, AssemblyError> {
    if rows.is_empty() {
        return Err(AssemblyError::NoUsableRasters);
    }

    rows.sort_by_key(|(timestamp, _, _)| *timestamp);

    if let Some(pair) = rows.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(AssemblyError::DuplicateTimestamp {
            timestamp: pair[0].0,
            first: pair[0].1.clone(),
            second: pair[1].1.clone(),
        });
    }

    let ncols = point_ids.len();
    let mut values = Array2::<Float>::zeros((rows.len(), ncols));
    let mut index = Vec::with_capacity(rows.len());

    for (i, (timestamp, _, vector)) in rows.into_iter().enumerate() {
        index.push(timestamp);

        for (j, value) in vector.into_iter().enumerate() {
            values[[i, j]] = value;
        }
    }

    debug!("Assembled series of {} rows and {} grid points", index.len(), ncols);

    Ok(PrecipitationSeries::new(index, point_ids.to_vec(), values)?)
}

/// Lists regular files in the directory sorted by name.
pub fn list_raster_files(data_dir: &Path) -> Result<Vec<PathBuf>, AssemblyError> {
    let mut files = vec![];

    for entry in fs::read_dir(data_dir)? {
        let path = entry?.path();

        if path.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(AssemblyError::NoInputFiles(data_dir.to_path_buf()));
    }

    files.sort();

    Ok(files)
}

/// Derives the period timestamp from the raster file name.
pub fn parse_timestamp(
    file: &Path,
    convention: &FilenameConvention,
) -> Result<NaiveDateTime, AssemblyError> {
    let file_name = file
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| AssemblyError::FilenameFormat(file.display().to_string()))?;

    let timestamp = match convention {
        FilenameConvention::YearMonthDay => parse_year_month_day(file_name),
        FilenameConvention::DayOffsetHour { reference_date } => {
            parse_day_offset_hour(file_name, *reference_date)
        }
    };

    timestamp.ok_or_else(|| AssemblyError::FilenameFormat(file_name.to_string()))
}

/// `<prefix>.<year>.<MMDD><suffix>`, eg. `chirps-v2.0.2022.0315.tif`
/// does not match but `chirps.2022.0315.tif` does.
fn parse_year_month_day(file_name: &str) -> Option<NaiveDateTime> {
    let parts: Vec<&str> = file_name.split('.').collect();

    let year = parts.get(1)?.parse::<i32>().ok()?;
    let month_day = parts.get(2)?.get(0..4)?;
    let month = month_day.get(0..2)?.parse::<u32>().ok()?;
    let day = month_day.get(2..4)?.parse::<u32>().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
}

/// `...DIA<d><HH>HLC.<ext>`, where `d` is the one-based forecast day
/// and `HH` the hour of that day.
fn parse_day_offset_hour(file_name: &str, reference_date: NaiveDate) -> Option<NaiveDateTime> {
    let (_, after_day) = file_name.rsplit_once("DIA")?;
    let (token, _) = after_day.split_once("HLC.")?;

    let day = token.get(0..1)?.parse::<i64>().ok()?;
    let hour = token.get(1..)?.parse::<u32>().ok()?;

    if day < 1 {
        return None;
    }

    let timestamp = reference_date.and_hms_opt(hour, 0, 0)?;

    Some(timestamp + Duration::days(day - 1))
}
