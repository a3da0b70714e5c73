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

//! Module containg methods for conducting
//! binary search (bisection) of elements closest
//! to searched values in ascending series.
//!
//! Used to bracket target timestamps between
//! known observations when resampling.

use crate::errors::SearchError;

/// Core bisection function, returns the index of the first
/// element not less than `x`.
///
/// Array must be sorted ascendingly and `x` must lie
/// within its first and last element.
fn binary_search<T: PartialOrd>(array: &[T], x: &T) -> Result<usize, SearchError> {
    let (first, last) = match (array.first(), array.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(SearchError::EmptyArray),
    };

    if x < first || x > last {
        return Err(SearchError::OutOfBounds);
    }

    let mut lo = 0;
    let mut hi = array.len() - 1;

    while lo < hi {
        let mid = (lo + hi) / 2;

        if array[mid] >= *x {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    Ok(lo)
}

/// Finds index of the closest element
/// to the left of (or equal to) the searched item.
pub fn find_left_closest<T: PartialOrd>(array: &[T], x: &T) -> Result<usize, SearchError> {
    let found_index = binary_search(array, x)?;

    if array[found_index] <= *x {
        Ok(found_index)
    } else {
        Ok(found_index - 1)
    }
}

/// Finds index of the closest element
/// to the right of (or equal to) the searched item.
pub fn find_right_closest<T: PartialOrd>(array: &[T], x: &T) -> Result<usize, SearchError> {
    binary_search(array, x)
}

#[cfg(test)]
mod tests {
    use super::{find_left_closest, find_right_closest};
    use crate::errors::SearchError;
    use chrono::{NaiveDate, NaiveDateTime};

    fn hour(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2022, 3, 15)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn bracket_between_items() {
        let array = [0.0, 1.0, 2.5, 4.0, 7.0];

        assert_eq!(find_left_closest(&array, &3.0), Ok(2));
        assert_eq!(find_right_closest(&array, &3.0), Ok(3));
    }

    #[test]
    fn exact_hit() {
        let array = [0.0, 1.0, 2.5, 4.0, 7.0];

        assert_eq!(find_left_closest(&array, &4.0), Ok(3));
        assert_eq!(find_right_closest(&array, &4.0), Ok(3));
        assert_eq!(find_left_closest(&array, &0.0), Ok(0));
        assert_eq!(find_right_closest(&array, &7.0), Ok(4));
    }

    #[test]
    fn bracket_timestamps() {
        let array = [hour(0), hour(6), hour(18)];

        assert_eq!(find_left_closest(&array, &hour(12)), Ok(1));
        assert_eq!(find_right_closest(&array, &hour(12)), Ok(2));
    }

    #[test]
    fn search_errors() {
        let empty: [f64; 0] = [];
        let array = [1.0, 2.0];

        assert_eq!(find_left_closest(&empty, &1.0), Err(SearchError::EmptyArray));
        assert_eq!(find_left_closest(&array, &0.5), Err(SearchError::OutOfBounds));
        assert_eq!(find_right_closest(&array, &2.5), Err(SearchError::OutOfBounds));
    }
}
