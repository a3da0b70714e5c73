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

//! Timestamp-indexed table of precipitation values
//! shared by all pipeline stages.

use crate::{
    constants::{TIMESTAMP_FORMAT, TIMESTAMP_HEADER},
    errors::SeriesError,
    Float,
};
use chrono::NaiveDateTime;
use ndarray::Array2;
use rustc_hash::{FxHashMap, FxHashSet};
use std::{io::Write, path::Path};

/// Table with strictly ascending timestamps as rows
/// and uniquely named columns (grid points, stations or basins).
///
/// Missing values are stored as `MISSING_VALUE`.
#[derive(Clone, PartialEq, Debug)]
pub struct PrecipitationSeries {
    index: Vec<NaiveDateTime>,
    columns: Vec<String>,
    values: Array2<Float>,
}

impl PrecipitationSeries {
    /// Series constructor, checking that the index is strictly ascending,
    /// column names are unique and values have `(index, columns)` shape.
    pub fn new(
        index: Vec<NaiveDateTime>,
        columns: Vec<String>,
        values: Array2<Float>,
    ) -> Result<Self, SeriesError> {
        let expected = (index.len(), columns.len());

        if values.dim() != expected {
            return Err(SeriesError::ShapeMismatch {
                expected,
                found: values.dim(),
            });
        }

        if let Some(pair) = index.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(SeriesError::NotAscending(pair[1]));
        }

        let mut seen = FxHashSet::default();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(SeriesError::DuplicateColumn(column.clone()));
            }
        }

        Ok(PrecipitationSeries {
            index,
            columns,
            values,
        })
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<Float> {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Map from column name to its position.
    pub fn column_positions(&self) -> FxHashMap<&str, usize> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect()
    }

    /// Writes the series into CSV file at given path.
    pub fn write_csv(&self, path: &Path) -> Result<(), SeriesError> {
        let mut out_file = csv::Writer::from_path(path)?;
        self.write_to(&mut out_file)
    }

    /// Writes the series with `DATE` header, formatted timestamps
    /// and missing values as empty cells.
    pub fn write_to<W: Write>(&self, out_file: &mut csv::Writer<W>) -> Result<(), SeriesError> {
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        header.push(TIMESTAMP_HEADER.to_string());
        header.extend(self.columns.iter().cloned());

        out_file.write_record(&header)?;

        for (timestamp, row) in self.index.iter().zip(self.values.outer_iter()) {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(timestamp.format(TIMESTAMP_FORMAT).to_string());
            record.extend(row.iter().map(|v| {
                if v.is_nan() {
                    String::new()
                } else {
                    v.to_string()
                }
            }));

            out_file.write_record(&record)?;
        }

        out_file.flush()?;

        Ok(())
    }
}
