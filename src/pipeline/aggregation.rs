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

//! Module combining grid-point (or station) series into
//! basin series with area weights.

use super::reference::BasinWeightTable;
use super::series::PrecipitationSeries;
use crate::{constants::MISSING_VALUE, errors::AggregationError, Float};
use log::{debug, warn};
use ndarray::Array2;

/// Warns about basins which weights do not sum to `1.0`
/// within the tolerance and returns their names.
pub fn check_weight_sums(weights: &BasinWeightTable, tolerance: Float) -> Vec<&str> {
    let mut deviating = vec![];

    for basin in &weights.basins {
        let sum = basin.weights_sum();

        if (sum - 1.0).abs() > tolerance {
            warn!(
                "Weights of basin {} sum to {:.4} instead of 1.0",
                basin.basin, sum
            );
            deviating.push(basin.basin.as_str());
        }
    }

    deviating
}

/// Computes weighted sum of series columns for every basin.
///
/// A basin value is missing when any of its points is missing,
/// and always missing for a basin without points.
/// All basins must have values at the same timestamps.
pub fn aggregate(
    series: &PrecipitationSeries,
    weights: &BasinWeightTable,
) -> Result<PrecipitationSeries, AggregationError> {
    let positions = series.column_positions();
    let source = series.values();
    let nbasins = weights.basins.len();

    let mut values = Array2::from_elem((series.nrows(), nbasins), MISSING_VALUE);

    for (k, basin) in weights.basins.iter().enumerate() {
        let contributions = basin
            .weights
            .iter()
            .map(|(point, weight)| {
                positions
                    .get(point.as_str())
                    .map(|&j| (j, *weight))
                    .ok_or_else(|| AggregationError::UnknownPointReference {
                        basin: basin.basin.clone(),
                        point: point.clone(),
                    })
            })
            .collect::<Result<Vec<(usize, Float)>, AggregationError>>()?;

        if contributions.is_empty() {
            continue;
        }

        for (i, row) in source.outer_iter().enumerate() {
            values[[i, k]] = contributions
                .iter()
                .map(|&(j, weight)| weight * row[j])
                .sum();
        }
    }

    for (i, row) in values.outer_iter().enumerate() {
        let has_data = row.iter().any(|v| !v.is_nan());

        if let Some(k) = row.iter().position(|v| v.is_nan()).filter(|_| has_data) {
            return Err(AggregationError::AlignmentGap {
                basin: weights.basins[k].basin.clone(),
                timestamp: series.index()[i],
            });
        }
    }

    debug!(
        "Aggregated {} rows into {} basins",
        series.nrows(),
        nbasins
    );

    let columns = weights.basins.iter().map(|b| b.basin.clone()).collect();

    Ok(PrecipitationSeries::new(
        series.index().to_vec(),
        columns,
        values,
    )?)
}

#[cfg(test)]
mod tests {
    use super::{aggregate, check_weight_sums};
    use crate::errors::AggregationError;
    use crate::pipeline::reference::{BasinWeightTable, BasinWeights};
    use crate::pipeline::series::PrecipitationSeries;
    use chrono::{NaiveDate, NaiveDateTime};
    use float_cmp::approx_eq;
    use ndarray::{array, Array2};

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn series(index: Vec<NaiveDateTime>, values: Array2<f64>) -> PrecipitationSeries {
        let columns = (0..values.ncols()).map(|j| format!("P{}", j + 1)).collect();
        PrecipitationSeries::new(index, columns, values).unwrap()
    }

    fn basin(name: &str, weights: &[(&str, f64)]) -> BasinWeights {
        BasinWeights {
            basin: name.to_string(),
            weights: weights.iter().map(|(p, w)| (p.to_string(), *w)).collect(),
        }
    }

    #[test]
    fn weighted_basin_sum() {
        let input = series(vec![day(1), day(2)], array![[10.0, 20.0, 5.0], [0.0, 1.0, 2.0]]);
        let weights = BasinWeightTable {
            basins: vec![
                basin("PORCE", &[("P1", 0.6), ("P2", 0.4)]),
                basin("NARE", &[("P3", 1.0)]),
            ],
        };

        let result = aggregate(&input, &weights).unwrap();

        assert_eq!(result.columns(), &["PORCE", "NARE"]);
        assert!(approx_eq!(f64, result.values()[[0, 0]], 14.0, epsilon = 1e-12));
        assert!(approx_eq!(f64, result.values()[[1, 0]], 0.4, epsilon = 1e-12));
        assert!(approx_eq!(f64, result.values()[[0, 1]], 5.0));
    }

    #[test]
    fn unknown_point() {
        let input = series(vec![day(1)], array![[10.0]]);
        let weights = BasinWeightTable {
            basins: vec![basin("PORCE", &[("P1", 0.5), ("P9", 0.5)])],
        };

        assert!(matches!(
            aggregate(&input, &weights),
            Err(AggregationError::UnknownPointReference { point, .. }) if point == "P9"
        ));
    }

    #[test]
    fn alignment_gap() {
        let nan = f64::NAN;
        let input = series(
            vec![day(1), day(2), day(3)],
            array![[1.0, 2.0], [nan, nan], [3.0, nan]],
        );
        let weights = BasinWeightTable {
            basins: vec![basin("PORCE", &[("P1", 1.0)]), basin("NARE", &[("P2", 1.0)])],
        };

        assert!(matches!(
            aggregate(&input, &weights),
            Err(AggregationError::AlignmentGap { basin, timestamp })
                if basin == "NARE" && timestamp == day(3)
        ));
    }

    #[test]
    fn missing_rows_stay_missing() {
        let nan = f64::NAN;
        let input = series(vec![day(1), day(2)], array![[1.0, 2.0], [nan, nan]]);
        let weights = BasinWeightTable {
            basins: vec![basin("PORCE", &[("P1", 0.5), ("P2", 0.5)])],
        };

        let result = aggregate(&input, &weights).unwrap();

        assert!(approx_eq!(f64, result.values()[[0, 0]], 1.5));
        assert!(result.values()[[1, 0]].is_nan());
    }

    #[test]
    fn weight_sum_tolerance() {
        let weights = BasinWeightTable {
            basins: vec![
                basin("PORCE", &[("P1", 0.6), ("P2", 0.395)]),
                basin("NARE", &[("P1", 0.5), ("P2", 0.3)]),
            ],
        };

        assert_eq!(check_weight_sums(&weights, 0.01), vec!["NARE"]);
        assert!(check_weight_sums(&weights, 0.5).is_empty());
    }

    #[test]
    fn basin_without_points_is_missing() {
        let nan = f64::NAN;
        let input = series(vec![day(1), day(2)], array![[3.0], [nan]]);
        let weights = BasinWeightTable {
            basins: vec![basin("PORCE", &[("P1", 1.0)]), basin("NARE", &[])],
        };

        assert!(matches!(
            aggregate(&input, &weights),
            Err(AggregationError::AlignmentGap { basin, timestamp })
                if basin == "NARE" && timestamp == day(1)
        ));
    }
}
