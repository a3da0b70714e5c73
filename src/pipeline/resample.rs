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

//! Module converting raw per-period series into the
//! target temporal granularity.
//!
//! Two policies are available:
//!
//! - **Cumulative interpolation**, where the running sum of each column
//! is linearly interpolated at target timestamps between known values.
//! Before the first known value the result is missing, after the last
//! one the cumulative value is held. The output grid ends at the last
//! raw timestamp, as the running sum is only known up to it.
//!
//! - **Disaggregation with forward fill**, where each raw total is split
//! evenly into target slots of its own period. Slots not covered by any
//! raw period stay missing, so a skipped file never repeats rain of its
//! neighbour. The output grid ends at the last target slot of the
//! final raw period, so its total is split in full.
//!
//! All computations are done in floating point and missing values
//! are skipped, never treated as zero.

use super::bisection::{find_left_closest, find_right_closest};
use super::configuration::{Resample, ResamplePolicy};
use super::series::PrecipitationSeries;
use crate::{constants::MISSING_VALUE, errors::ResampleError, Float};
use chrono::{Duration, NaiveDateTime};
use log::debug;
use ndarray::{Array2, ArrayView1};

/// Native period of the raw series and period of the output.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Granularity {
    pub source: Duration,
    pub target: Duration,
}

impl Granularity {
    pub fn from_config(resample: &Resample) -> Self {
        Granularity {
            source: resample.source_duration(),
            target: resample.target_duration(),
        }
    }

    /// Number of target slots in one source period.
    fn slots(&self) -> Result<i64, ResampleError> {
        let source = self.source.num_seconds();
        let target = self.target.num_seconds();

        if source <= 0 || target <= 0 {
            return Err(ResampleError::Granularity("periods must be positive"));
        }

        if source % target != 0 {
            return Err(ResampleError::Granularity(
                "source period must be a multiple of target period",
            ));
        }

        Ok(source / target)
    }
}

/// Resamples the series with chosen policy.
///
/// When the target period equals the source period
/// the series is returned unchanged.
pub fn resample(
    raw: &PrecipitationSeries,
    granularity: Granularity,
    policy: ResamplePolicy,
    deaccumulate: bool,
) -> Result<PrecipitationSeries, ResampleError> {
    let slots = granularity.slots()?;

    if slots == 1 {
        debug!("Target period equals source period, skipping resampling");
        return Ok(raw.clone());
    }

    if raw.is_empty() {
        return Ok(raw.clone());
    }

    debug!(
        "Resampling {} rows with {:?} into {} slots per period",
        raw.nrows(),
        policy,
        slots
    );

    match policy {
        ResamplePolicy::CumulativeInterpolate => {
            let cumulative = cumulative_interpolate(raw, granularity)?;

            if deaccumulate {
                Ok(deaccumulate_series(&cumulative)?)
            } else {
                Ok(cumulative)
            }
        }
        ResamplePolicy::DisaggregateForwardFill => disaggregate_forward_fill(raw, granularity, slots),
    }
}

/// Timestamps from `start` to `end` (inclusive) with given step.
fn time_grid(start: NaiveDateTime, end: NaiveDateTime, step: Duration) -> Vec<NaiveDateTime> {
    let mut grid = vec![];
    let mut current = start;

    while current <= end {
        grid.push(current);
        current = current + step;
    }

    grid
}

/// Running sum along time, missing values stay missing
/// and do not break the sum.
fn cumulative_sum(values: &Array2<Float>) -> Array2<Float> {
    let mut cumulative = values.clone();

    for mut column in cumulative.columns_mut() {
        let mut running = 0.0;

        for value in column.iter_mut() {
            if !value.is_nan() {
                running += *value;
                *value = running;
            }
        }
    }

    cumulative
}

fn cumulative_interpolate(
    raw: &PrecipitationSeries,
    granularity: Granularity,
) -> Result<PrecipitationSeries, ResampleError> {
    let index = raw.index();
    let cumulative = cumulative_sum(raw.values());

    let (first, last) = match (index.first(), index.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Ok(raw.clone()),
    };

    let grid = time_grid(first, last, granularity.target);
    let mut values = Array2::from_elem((grid.len(), raw.columns().len()), MISSING_VALUE);

    for (j, column) in cumulative.columns().into_iter().enumerate() {
        let interpolated = interpolate_column(index, column, &grid)?;

        for (i, value) in interpolated.into_iter().enumerate() {
            values[[i, j]] = value;
        }
    }

    Ok(PrecipitationSeries::new(
        grid,
        raw.columns().to_vec(),
        values,
    )?)
}

/// Linear interpolation of one column at grid timestamps
/// using only its known values.
fn interpolate_column(
    index: &[NaiveDateTime],
    column: ArrayView1<Float>,
    grid: &[NaiveDateTime],
) -> Result<Vec<Float>, ResampleError> {
    let (known_times, known_values): (Vec<NaiveDateTime>, Vec<Float>) = index
        .iter()
        .zip(column.iter())
        .filter(|(_, v)| !v.is_nan())
        .map(|(t, v)| (*t, *v))
        .unzip();

    let (first_known, last_known) = match (known_times.first(), known_times.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Ok(vec![MISSING_VALUE; grid.len()]),
    };

    let last_value = known_values[known_values.len() - 1];
    let mut result = Vec::with_capacity(grid.len());

    for t in grid {
        if *t < first_known {
            result.push(MISSING_VALUE);
            continue;
        }

        if *t > last_known {
            result.push(last_value);
            continue;
        }

        let left = find_left_closest(&known_times, t)?;
        let right = find_right_closest(&known_times, t)?;

        if left == right {
            result.push(known_values[left]);
            continue;
        }

        let span = (known_times[right] - known_times[left]).num_seconds() as Float;
        let offset = (*t - known_times[left]).num_seconds() as Float;
        let weight = offset / span;

        result.push(known_values[left] + weight * (known_values[right] - known_values[left]));
    }

    Ok(result)
}

/// Differences of cumulative series against the previous known value
/// of each column (zero before the first one), so the first known value
/// is kept whole. Negative rounding noise is clamped to zero.
fn deaccumulate_series(cumulative: &PrecipitationSeries) -> Result<PrecipitationSeries, ResampleError> {
    let mut values = cumulative.values().clone();

    for mut column in values.columns_mut() {
        let mut baseline = 0.0;

        for value in column.iter_mut() {
            if value.is_nan() {
                continue;
            }

            let current = *value;
            *value = (current - baseline).max(0.0);
            baseline = current;
        }
    }

    Ok(PrecipitationSeries::new(
        cumulative.index().to_vec(),
        cumulative.columns().to_vec(),
        values,
    )?)
}

fn disaggregate_forward_fill(
    raw: &PrecipitationSeries,
    granularity: Granularity,
    slots: i64,
) -> Result<PrecipitationSeries, ResampleError> {
    let index = raw.index();

    let (first, last) = match (index.first(), index.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Ok(raw.clone()),
    };

    let grid = time_grid(first, last + granularity.source - granularity.target, granularity.target);
    let mut values = Array2::from_elem((grid.len(), raw.columns().len()), MISSING_VALUE);
    let divisor = slots as Float;

    for (i, t) in grid.iter().enumerate() {
        let source_row = if *t >= last {
            index.len() - 1
        } else {
            find_left_closest(index, t)?
        };

        // only fill slots inside the period of the source row
        if *t >= index[source_row] + granularity.source {
            continue;
        }

        for (j, value) in raw.values().row(source_row).iter().enumerate() {
            values[[i, j]] = value / divisor;
        }
    }

    Ok(PrecipitationSeries::new(
        grid,
        raw.columns().to_vec(),
        values,
    )?)
}
