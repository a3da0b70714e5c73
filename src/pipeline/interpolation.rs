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

//! Module containing spatial interpolation of grid-point
//! series onto station coordinates.
//!
//! For every timestamp a radial basis function interpolant with the
//! linear kernel `phi(r) = r` is fitted to the grid-point values:
//!
//! $$ s(\mathbf{x}) = \sum_i w_i \lVert \mathbf{x} - \mathbf{p}_i \rVert $$
//!
//! where weights solve $A w = f$ with $A_{ij} = \lVert \mathbf{p}_i - \mathbf{p}_j \rVert$.
//! No polynomial term and no smoothing is used, so the interpolant passes
//! exactly through the grid-point values.
//!
//! Precipitation cannot be negative, so every evaluated value is
//! clamped to zero from below.

use super::reference::{GridPointCoordinate, StationCoordinate};
use super::series::PrecipitationSeries;
use crate::{
    constants::{MIN_INTERPOLATION_SITES, MISSING_VALUE},
    errors::InterpolationError,
    Float,
};
use chrono::NaiveDateTime;
use log::debug;
use nalgebra::{DMatrix, DVector, Dynamic, LU};
use ndarray::{Array2, ArrayView1};
use rayon::{prelude::*, ThreadPool};
use rustc_hash::FxHashMap;

type Site = (Float, Float);

fn distance(a: Site, b: Site) -> Float {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Checks if there are enough distinct sites
/// and not all of them lie on one line.
fn sites_are_valid(sites: &[Site]) -> bool {
    if sites.len() < MIN_INTERPOLATION_SITES {
        return false;
    }

    for (i, a) in sites.iter().enumerate() {
        if sites[i + 1..].iter().any(|b| a == b) {
            return false;
        }
    }

    let origin = sites[0];
    let (far, extent) = sites
        .iter()
        .map(|s| (*s, distance(origin, *s)))
        .fold((origin, 0.0), |acc, s| if s.1 > acc.1 { s } else { acc });

    let direction = (far.0 - origin.0, far.1 - origin.1);
    let tolerance = 1.0e-10 * extent * extent;

    sites.iter().any(|s| {
        let cross = direction.0 * (s.1 - origin.1) - direction.1 * (s.0 - origin.0);
        cross.abs() > tolerance
    })
}

/// Factorised interpolation system for a fixed set of sites.
///
/// Factorisation depends only on site positions, so it can be
/// reused for every row in which all sites have values.
struct SiteSystem {
    sites: Vec<Site>,
    lu: LU<Float, Dynamic, Dynamic>,
}

impl SiteSystem {
    fn new(sites: Vec<Site>) -> Option<Self> {
        if !sites_are_valid(&sites) {
            return None;
        }

        let n = sites.len();
        let lhs = DMatrix::from_fn(n, n, |i, j| distance(sites[i], sites[j]));

        Some(SiteSystem {
            sites,
            lu: lhs.lu(),
        })
    }

    /// Solves for the weights, `None` when the system is singular.
    fn fit(&self, values: &[Float]) -> Option<DVector<Float>> {
        let rhs = DVector::from_column_slice(values);
        let weights = self.lu.solve(&rhs)?;

        if weights.iter().all(|w| w.is_finite()) {
            Some(weights)
        } else {
            None
        }
    }

    fn evaluate(&self, weights: &DVector<Float>, target: Site) -> Float {
        self.sites
            .iter()
            .zip(weights.iter())
            .map(|(site, weight)| weight * distance(*site, target))
            .sum()
    }
}

/// Interpolates every row of the series onto the stations.
///
/// Series columns are matched with grid points by id.
/// Rows are independent and computed in parallel on the threadpool.
pub fn interpolate(
    series: &PrecipitationSeries,
    grid_points: &[GridPointCoordinate],
    stations: &[StationCoordinate],
    threadpool: &ThreadPool,
) -> Result<PrecipitationSeries, InterpolationError> {
    if stations.is_empty() {
        return Err(InterpolationError::NoStations);
    }

    let coordinates: FxHashMap<&str, Site> = grid_points
        .iter()
        .map(|p| (p.id.as_str(), (p.x, p.y)))
        .collect();

    let sites = series
        .columns()
        .iter()
        .map(|id| {
            coordinates
                .get(id.as_str())
                .copied()
                .ok_or_else(|| InterpolationError::UnknownSite(id.clone()))
        })
        .collect::<Result<Vec<Site>, InterpolationError>>()?;

    let targets: Vec<Site> = stations.iter().map(|s| (s.este, s.norte)).collect();
    let full_system = SiteSystem::new(sites.clone());

    debug!(
        "Interpolating {} rows from {} grid points onto {} stations",
        series.nrows(),
        sites.len(),
        targets.len()
    );

    let index = series.index();
    let values = series.values();

    let rows = threadpool.install(|| {
        (0..series.nrows())
            .into_par_iter()
            .map(|i| {
                interpolate_row(
                    index[i],
                    values.row(i),
                    &sites,
                    full_system.as_ref(),
                    &targets,
                )
            })
            .collect::<Result<Vec<Vec<Float>>, InterpolationError>>()
    })?;

    let mut result = Array2::from_elem((rows.len(), targets.len()), MISSING_VALUE);

    for (i, row) in rows.into_iter().enumerate() {
        for (j, value) in row.into_iter().enumerate() {
            result[[i, j]] = value;
        }
    }

    let columns = stations.iter().map(|s| s.id.clone()).collect();

    Ok(PrecipitationSeries::new(index.to_vec(), columns, result)?)
}

/// Fits the interpolant to present values of one row and evaluates
/// it at the targets. A row with no values at all stays missing.
fn interpolate_row(
    timestamp: NaiveDateTime,
    row: ArrayView1<Float>,
    sites: &[Site],
    full_system: Option<&SiteSystem>,
    targets: &[Site],
) -> Result<Vec<Float>, InterpolationError> {
    let present: Vec<usize> = (0..row.len()).filter(|&i| !row[i].is_nan()).collect();

    if present.is_empty() {
        return Ok(vec![MISSING_VALUE; targets.len()]);
    }

    let degenerate = || InterpolationError::Degenerate {
        timestamp,
        valid: present.len(),
    };

    let subset_system;
    let system = if present.len() == sites.len() {
        full_system.ok_or_else(degenerate)?
    } else {
        subset_system = SiteSystem::new(present.iter().map(|&i| sites[i]).collect())
            .ok_or_else(degenerate)?;
        &subset_system
    };

    let field: Vec<Float> = present.iter().map(|&i| row[i]).collect();
    let weights = system.fit(&field).ok_or_else(degenerate)?;

    Ok(targets
        .iter()
        .map(|target| {
            let value = system.evaluate(&weights, *target);

            if value.is_nan() {
                MISSING_VALUE
            } else {
                value.max(0.0)
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{interpolate, sites_are_valid};
    use crate::errors::InterpolationError;
    use crate::pipeline::reference::{GridPointCoordinate, StationCoordinate};
    use crate::pipeline::series::PrecipitationSeries;
    use chrono::{NaiveDate, NaiveDateTime};
    use float_cmp::approx_eq;
    use ndarray::{array, Array2};
    use rayon::{ThreadPool, ThreadPoolBuilder};

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn threadpool() -> ThreadPool {
        ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn grid_points(coords: &[(f64, f64)]) -> Vec<GridPointCoordinate> {
        coords
            .iter()
            .enumerate()
            .map(|(i, (x, y))| GridPointCoordinate {
                id: format!("P{}", i + 1),
                x: *x,
                y: *y,
            })
            .collect()
    }

    fn station(id: &str, este: f64, norte: f64) -> StationCoordinate {
        StationCoordinate {
            id: id.to_string(),
            este,
            norte,
        }
    }

    fn series(index: Vec<NaiveDateTime>, values: Array2<f64>) -> PrecipitationSeries {
        let columns = (0..values.ncols()).map(|j| format!("P{}", j + 1)).collect();
        PrecipitationSeries::new(index, columns, values).unwrap()
    }

    #[test]
    fn three_point_field() {
        let points = grid_points(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        let input = series(vec![day(1)], array![[1.0, 2.0, 3.0]]);

        let result = interpolate(
            &input,
            &points,
            &[station("S1", 0.5, 0.5)],
            &threadpool(),
        )
        .unwrap();

        let value = result.values()[[0, 0]];

        assert_eq!(result.columns(), &["S1"]);
        assert!(approx_eq!(f64, value, 1.9748737341529163, epsilon = 1e-12));
        assert!((1.0..=3.0).contains(&value));
    }

    #[test]
    fn exact_at_grid_points() {
        let points = grid_points(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let input = series(vec![day(1)], array![[1.0, 2.0, 3.0, 4.0]]);

        let result = interpolate(
            &input,
            &points,
            &[station("S1", 1.0, 0.0), station("S2", 1.0, 1.0)],
            &threadpool(),
        )
        .unwrap();

        assert!(approx_eq!(f64, result.values()[[0, 0]], 2.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, result.values()[[0, 1]], 4.0, epsilon = 1e-12));
    }

    #[test]
    fn rows_with_missing_values() {
        let points = grid_points(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]);
        let nan = f64::NAN;
        let input = series(
            vec![day(1), day(2), day(3)],
            array![[1.0, 2.0, 3.0, 4.0], [1.0, 2.0, 3.0, nan], [nan, nan, nan, nan]],
        );

        let result = interpolate(
            &input,
            &points,
            &[station("S1", 0.5, 0.5)],
            &threadpool(),
        )
        .unwrap();

        assert!(approx_eq!(
            f64,
            result.values()[[0, 0]],
            2.0710678118654755,
            epsilon = 1e-12
        ));
        assert!(approx_eq!(
            f64,
            result.values()[[1, 0]],
            1.9748737341529163,
            epsilon = 1e-12
        ));
        assert!(result.values()[[2, 0]].is_nan());
    }

    #[test]
    fn negative_values_clamped() {
        let points = grid_points(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.0),
            (0.0, 1.0),
            (1.0, 1.0),
            (2.0, 1.0),
        ]);
        let input = series(vec![day(1)], array![[0.0, 10.0, 0.0, 0.0, 10.0, 0.0]]);

        let result = interpolate(
            &input,
            &points,
            &[station("S1", -2.0, -2.0), station("S2", 1.0, 0.5)],
            &threadpool(),
        )
        .unwrap();

        assert_eq!(result.values()[[0, 0]], 0.0);
        assert!(result.values().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn degenerate_rows() {
        let points = grid_points(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (0.0, 1.0)]);
        let nan = f64::NAN;
        let stations = [station("S1", 0.5, 0.5)];

        let collinear = series(vec![day(1)], array![[1.0, 2.0, 3.0, nan]]);
        let too_few = series(vec![day(2)], array![[1.0, nan, nan, 4.0]]);

        assert!(matches!(
            interpolate(&collinear, &points, &stations, &threadpool()),
            Err(InterpolationError::Degenerate { valid: 3, .. })
        ));
        assert!(matches!(
            interpolate(&too_few, &points, &stations, &threadpool()),
            Err(InterpolationError::Degenerate { timestamp, valid: 2 }) if timestamp == day(2)
        ));
    }

    #[test]
    fn site_validity() {
        assert!(sites_are_valid(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]));
        assert!(!sites_are_valid(&[(0.0, 0.0), (1.0, 0.0)]));
        assert!(!sites_are_valid(&[(0.0, 0.0), (1.0, 0.0), (1.0, 0.0)]));
        assert!(!sites_are_valid(&[(0.0, 0.0), (1.0, 1.0), (3.0, 3.0), (-2.0, -2.0)]));
    }

    #[test]
    fn unknown_site_and_no_stations() {
        let points = grid_points(&[(0.0, 0.0), (1.0, 0.0)]);
        let input = series(vec![day(1)], array![[1.0, 2.0, 3.0]]);

        assert!(matches!(
            interpolate(&input, &points, &[station("S1", 0.0, 0.0)], &threadpool()),
            Err(InterpolationError::UnknownSite(id)) if id == "P3"
        ));
        assert!(matches!(
            interpolate(&input, &points, &[], &threadpool()),
            Err(InterpolationError::NoStations)
        ));
    }
}
