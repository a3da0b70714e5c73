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

//! Sub-module reading single-band GeoTIFF rasters.
//!
//! Only the first band is read. Georeference is taken from
//! `ModelPixelScale` and `ModelTiepoint` tags, and the no-data
//! value from the `GDAL_NODATA` tag when present.

use super::{build_raster, RasterGrid};
use crate::{constants::MISSING_VALUE, errors::RasterError, Float};
use log::debug;
use ndarray::Array2;
use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};
use tiff::{
    decoder::{Decoder, DecodingResult},
    tags::Tag,
};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GDAL_NODATA: u16 = 42113;

/// Loads a GeoTIFF raster file from the disk.
pub(super) fn read_tif_raster(path: &Path) -> Result<RasterGrid, RasterError> {
    let file = File::open(path)?;
    decode_tif(BufReader::new(file))
}

/// Decodes GeoTIFF from any seekable reader.
///
/// The decoder (and the file handle it owns) is dropped
/// before the grid is returned, also on every error path.
fn decode_tif<R: Read + Seek>(reader: R) -> Result<RasterGrid, RasterError> {
    let mut decoder = Decoder::new(reader)?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    let scale = decoder
        .find_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))?
        .ok_or(RasterError::MissingGeoreference("ModelPixelScale"))?
        .into_f64_vec()?;

    let tiepoint = decoder
        .find_tag(Tag::from_u16_exhaustive(MODEL_TIEPOINT))?
        .ok_or(RasterError::MissingGeoreference("ModelTiepoint"))?
        .into_f64_vec()?;

    let no_data = match decoder.find_tag(Tag::from_u16_exhaustive(GDAL_NODATA))? {
        Some(value) => parse_no_data(&value.into_string()?)?,
        None => MISSING_VALUE,
    };

    let (lower_left, cell_size) = georeference(height, &scale, &tiepoint)?;

    debug!(
        "GeoTIFF {}x{} with lower-left corner {:?} and cell size {}",
        height, width, lower_left, cell_size
    );

    let values = decoding_result_to_floats(decoder.read_image()?)?;

    if values.len() != width * height {
        return Err(RasterError::ValueCount {
            expected: width * height,
            found: values.len(),
        });
    }

    let matrix = Array2::from_shape_vec((height, width), values)?;

    Ok(build_raster(lower_left, cell_size, no_data, matrix))
}

/// Computes the lower-left corner and cell size from
/// pixel scale and tiepoint tags.
///
/// Tiepoint maps raster point `(i, j)` onto model point `(x, y)`,
/// rows grow southwards with the `y` scale.
fn georeference(
    nrows: usize,
    scale: &[f64],
    tiepoint: &[f64],
) -> Result<((Float, Float), Float), RasterError> {
    if scale.len() < 2 {
        return Err(RasterError::MissingGeoreference("ModelPixelScale"));
    }

    if tiepoint.len() < 6 {
        return Err(RasterError::MissingGeoreference("ModelTiepoint"));
    }

    let (scale_x, scale_y) = (scale[0].abs(), scale[1].abs());
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);

    let xll = x - i * scale_x;
    let yur = y + j * scale_y;
    let yll = yur - nrows as Float * scale_y;

    let cell_size = 0.5 * (scale_x + scale_y);

    Ok(((xll, yll), cell_size))
}

/// `GDAL_NODATA` is stored as ASCII, possibly NUL-terminated.
fn parse_no_data(raw: &str) -> Result<Float, RasterError> {
    let trimmed = raw.trim_matches(char::from(0)).trim();

    if trimmed.eq_ignore_ascii_case("nan") {
        return Ok(MISSING_VALUE);
    }

    trimmed
        .parse::<Float>()
        .map_err(|_| RasterError::InvalidValue(trimmed.to_string()))
}

#[allow(unreachable_patterns)]
fn decoding_result_to_floats(result: DecodingResult) -> Result<Vec<Float>, RasterError> {
    let values = match result {
        DecodingResult::U8(v) => v.into_iter().map(Float::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(Float::from).collect(),
        DecodingResult::U32(v) => v.into_iter().map(Float::from).collect(),
        DecodingResult::U64(v) => v.into_iter().map(|x| x as Float).collect(),
        DecodingResult::I8(v) => v.into_iter().map(Float::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(Float::from).collect(),
        DecodingResult::I32(v) => v.into_iter().map(Float::from).collect(),
        DecodingResult::I64(v) => v.into_iter().map(|x| x as Float).collect(),
        DecodingResult::F32(v) => v.into_iter().map(Float::from).collect(),
        DecodingResult::F64(v) => v,
        _ => return Err(RasterError::UnsupportedSampleFormat),
    };

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::{decode_tif, georeference, parse_no_data, GDAL_NODATA, MODEL_PIXEL_SCALE, MODEL_TIEPOINT};
    use crate::errors::RasterError;
    use float_cmp::approx_eq;
    use std::io::Cursor;
    use tiff::{
        encoder::{colortype::Gray32Float, TiffEncoder},
        tags::Tag,
    };

    #[test]
    fn georeference_from_tags() {
        let ((xll, yll), cell_size) =
            georeference(10, &[0.05, 0.05, 0.0], &[0.0, 0.0, 0.0, -80.0, 10.0, 0.0]).unwrap();

        assert!(approx_eq!(f64, xll, -80.0));
        assert!(approx_eq!(f64, yll, 9.5, epsilon = 1e-12));
        assert!(approx_eq!(f64, cell_size, 0.05));
    }

    #[test]
    fn incomplete_tiepoint() {
        assert!(matches!(
            georeference(10, &[0.05, 0.05, 0.0], &[0.0, 0.0, 0.0]),
            Err(RasterError::MissingGeoreference("ModelTiepoint"))
        ));
    }

    #[test]
    fn no_data_string() {
        assert_eq!(parse_no_data("-9999\0").unwrap(), -9999.0);
        assert!(parse_no_data(" nan ").unwrap().is_nan());
        assert!(parse_no_data("none").is_err());
    }

    #[test]
    fn decode_georeferenced_tif() {
        let mut buffer = Cursor::new(Vec::new());

        {
            let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
            let mut image = encoder.new_image::<Gray32Float>(2, 2).unwrap();

            image
                .encoder()
                .write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &[0.5f64, 0.5, 0.0][..])
                .unwrap();
            image
                .encoder()
                .write_tag(
                    Tag::from_u16_exhaustive(MODEL_TIEPOINT),
                    &[0.0f64, 0.0, 0.0, 10.0, 20.0, 0.0][..],
                )
                .unwrap();
            image
                .encoder()
                .write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), "-1")
                .unwrap();

            image.write_data(&[1.0f32, -1.0, 3.0, 4.0]).unwrap();
        }

        buffer.set_position(0);
        let raster = decode_tif(buffer).unwrap();

        assert_eq!((raster.nrows, raster.ncols), (2, 2));
        assert_eq!(raster.lower_left, (10.0, 19.0));
        assert_eq!(raster.upper_right, (11.0, 20.0));
        assert_eq!(raster.matrix[[0, 0]], 1.0);
        assert!(raster.matrix[[0, 1]].is_nan());
        assert_eq!(raster.matrix[[1, 1]], 4.0);
    }

    #[test]
    fn plain_tif_is_not_georeferenced() {
        let mut buffer = Cursor::new(Vec::new());

        TiffEncoder::new(&mut buffer)
            .unwrap()
            .write_image::<Gray32Float>(1, 1, &[2.0f32])
            .unwrap();

        buffer.set_position(0);

        assert!(matches!(
            decode_tif(buffer),
            Err(RasterError::MissingGeoreference("ModelPixelScale"))
        ));
    }
}
