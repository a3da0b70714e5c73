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

//! Module reading static reference tables: grid-point coordinates,
//! station coordinates and basin weights.
//!
//! Tables are comma-separated with a header row. They are read
//! once per run and only borrowed by the stages afterwards.

use crate::{errors::ReferenceError, Float};
use csv::{ReaderBuilder, StringRecord, Trim};
use log::debug;
use serde::Deserialize;
use std::path::Path;

const POINT_ID: &str = "POINTID";

/// Interpolation source point.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct GridPointCoordinate {
    #[serde(rename = "POINTID")]
    pub id: String,
    #[serde(rename = "X")]
    pub x: Float,
    #[serde(rename = "Y")]
    pub y: Float,
}

/// Interpolation target (gauge station).
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct StationCoordinate {
    #[serde(rename = "COD")]
    pub id: String,
    #[serde(rename = "ESTE")]
    pub este: Float,
    #[serde(rename = "NORTE")]
    pub norte: Float,
}

/// Grid points contributing to one basin with their weights
/// (fractions, already rescaled from percent if needed).
#[derive(Clone, PartialEq, Debug)]
pub struct BasinWeights {
    pub basin: String,
    pub weights: Vec<(String, Float)>,
}

impl BasinWeights {
    pub fn weights_sum(&self) -> Float {
        self.weights.iter().map(|(_, w)| w).sum()
    }
}

/// Weights of all basins in the run, in configured order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct BasinWeightTable {
    pub basins: Vec<BasinWeights>,
}

fn check_columns(
    headers: &StringRecord,
    required: &[&'static str],
    file: &Path,
) -> Result<(), ReferenceError> {
    for &column in required {
        if !headers.iter().any(|h| h == column) {
            return Err(ReferenceError::MissingColumn {
                file: file.to_path_buf(),
                column,
            });
        }
    }

    Ok(())
}

fn read_table<T: for<'de> Deserialize<'de>>(
    file: &Path,
    required: &[&'static str],
) -> Result<Vec<T>, ReferenceError> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_path(file)?;
    check_columns(reader.headers()?, required, file)?;

    let rows = reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()?;

    if rows.is_empty() {
        return Err(ReferenceError::Empty(file.to_path_buf()));
    }

    Ok(rows)
}

/// Reads grid-point table with `POINTID`, `X`, `Y` columns.
///
/// Row order is kept, as it labels the window cells.
pub fn read_grid_points(file: &Path) -> Result<Vec<GridPointCoordinate>, ReferenceError> {
    let points = read_table(file, &[POINT_ID, "X", "Y"])?;
    debug!("Read {} grid points from {:?}", points.len(), file);

    Ok(points)
}

/// Reads station table with `COD`, `ESTE`, `NORTE` columns.
pub fn read_stations(file: &Path) -> Result<Vec<StationCoordinate>, ReferenceError> {
    let stations = read_table(file, &["COD", "ESTE", "NORTE"])?;
    debug!("Read {} stations from {:?}", stations.len(), file);

    Ok(stations)
}

/// Reads basin weights table with `POINTID` column and one column per basin.
///
/// When `basins` is empty every basin column is read, otherwise only
/// the listed ones (in listed order). Empty and zero weights are dropped,
/// a basin left without any weight is an error.
pub fn read_basin_weights(
    file: &Path,
    basins: &[String],
    in_percent: bool,
) -> Result<BasinWeightTable, ReferenceError> {
    let mut reader = ReaderBuilder::new().trim(Trim::All).from_path(file)?;
    let headers = reader.headers()?.clone();
    check_columns(&headers, &[POINT_ID], file)?;

    let id_position = headers
        .iter()
        .position(|h| h == POINT_ID)
        .ok_or(ReferenceError::MissingColumn {
            file: file.to_path_buf(),
            column: POINT_ID,
        })?;

    let selected: Vec<(usize, String)> = if basins.is_empty() {
        headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != id_position)
            .map(|(i, h)| (i, h.to_string()))
            .collect()
    } else {
        basins
            .iter()
            .map(|basin| {
                headers
                    .iter()
                    .position(|h| h == basin)
                    .filter(|i| *i != id_position)
                    .map(|i| (i, basin.clone()))
                    .ok_or_else(|| ReferenceError::UnknownBasin(basin.clone()))
            })
            .collect::<Result<_, _>>()?
    };

    let divisor = if in_percent { 100.0 } else { 1.0 };
    let mut table = BasinWeightTable {
        basins: selected
            .iter()
            .map(|(_, basin)| BasinWeights {
                basin: basin.clone(),
                weights: vec![],
            })
            .collect(),
    };

    let mut rows = 0;

    for record in reader.records() {
        let record = record?;
        rows += 1;

        let point = record.get(id_position).unwrap_or_default().to_string();

        for (k, (position, _)) in selected.iter().enumerate() {
            let raw = record.get(*position).unwrap_or_default();

            if raw.is_empty() {
                continue;
            }

            let weight = raw
                .parse::<Float>()
                .map_err(|_| ReferenceError::InvalidValue {
                    file: file.to_path_buf(),
                    value: raw.to_string(),
                })?;

            if weight != 0.0 {
                table.basins[k].weights.push((point.clone(), weight / divisor));
            }
        }
    }

    if rows == 0 {
        return Err(ReferenceError::Empty(file.to_path_buf()));
    }

    if let Some(empty) = table.basins.iter().find(|b| b.weights.is_empty()) {
        return Err(ReferenceError::NoWeights(empty.basin.clone()));
    }

    debug!(
        "Read weights of {} basins from {:?}",
        table.basins.len(),
        file
    );

    Ok(table)
}
