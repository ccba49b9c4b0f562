//! Single-band GeoTIFF reading and writing with the `tiff` crate.
//!
//! Georeferencing is taken from ModelPixelScale + ModelTiepoint tags, or
//! from ModelTransformation when present. Projection keys are ignored.

use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

use super::{GeoTransform, RasterSource};
use crate::error::{ErosivityError, Result};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;

/// A GeoTIFF file on disk. The header is read on open, pixels on `read_band`.
#[derive(Debug, Clone)]
pub struct GeoTiffRaster {
    path: PathBuf,
    name: String,
    transform: GeoTransform,
    shape: (usize, usize),
}

impl GeoTiffRaster {
    /// Open a GeoTIFF and read its dimensions and transform
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut decoder = Decoder::new(BufReader::new(File::open(path)?))?;
        let (width, height) = decoder.dimensions()?;
        let transform = read_transform(&mut decoder).ok_or_else(|| ErosivityError::Raster {
            message: format!("No georeferencing tags in {}", path.display()),
        })?;
        transform.ensure_invertible()?;

        debug!(
            path = %path.display(),
            rows = height,
            cols = width,
            "Opened GeoTIFF"
        );

        Ok(Self {
            path: path.to_path_buf(),
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            transform,
            shape: (height as usize, width as usize),
        })
    }

    /// Grid shape as `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }
}

impl RasterSource for GeoTiffRaster {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_band(&self) -> Result<Array2<f64>> {
        let mut decoder = Decoder::new(BufReader::new(File::open(&self.path)?))?;
        let samples = decode_samples(decoder.read_image()?)?;
        first_band(samples, self.shape)
    }

    fn transform(&self) -> GeoTransform {
        self.transform
    }
}

fn decode_samples(result: DecodingResult) -> Result<Vec<f64>> {
    let samples = match result {
        DecodingResult::F64(buf) => buf,
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I8(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        _ => {
            return Err(ErosivityError::Raster {
                message: "Unsupported TIFF sample format".to_string(),
            })
        }
    };
    Ok(samples)
}

/// Keep band 1 of a pixel-interleaved buffer
fn first_band(samples: Vec<f64>, (rows, cols): (usize, usize)) -> Result<Array2<f64>> {
    let cells = rows * cols;
    if cells == 0 || samples.len() % cells != 0 {
        return Err(ErosivityError::Raster {
            message: format!(
                "TIFF buffer of {} samples does not fit a {}x{} grid",
                samples.len(),
                rows,
                cols
            ),
        });
    }

    let stride = samples.len() / cells;
    let band: Vec<f64> = if stride == 1 {
        samples
    } else {
        samples.into_iter().step_by(stride).collect()
    };

    Array2::from_shape_vec((rows, cols), band).map_err(|e| ErosivityError::Raster {
        message: format!("Cannot shape TIFF band: {}", e),
    })
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    if let Ok(m) = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION)) {
        if m.len() >= 8 {
            return Some(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }
    }

    let scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT)).ok()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }

    // tiepoint: [I, J, K, X, Y, Z], scale: [ScaleX, ScaleY, ScaleZ]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
    Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]))
}

/// Write a grid as a single-band 64-bit float GeoTIFF
pub fn write_geotiff(path: impl AsRef<Path>, values: &Array2<f64>, transform: &GeoTransform) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut encoder = TiffEncoder::new(file)?;
    let (rows, cols) = values.dim();
    let mut image = encoder.new_image::<Gray64Float>(cols as u32, rows as u32)?;

    if transform.is_axis_aligned() && transform.pixel_height < 0.0 {
        let scale = [transform.pixel_width, -transform.pixel_height, 0.0];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])?;
        let tiepoint = [0.0, 0.0, 0.0, transform.origin_x, transform.origin_y, 0.0];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])?;
    } else {
        let matrix = [
            transform.pixel_width,
            transform.row_rotation,
            0.0,
            transform.origin_x,
            transform.col_rotation,
            transform.pixel_height,
            0.0,
            transform.origin_y,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            0.0,
            1.0,
        ];
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_TRANSFORMATION), &matrix[..])?;
    }

    // Version 1.1.0 with two keys: geographic model, pixel-is-area
    let geokeys: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 2, 1025, 0, 1, 1];
    image
        .encoder()
        .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &geokeys[..])?;

    let data: Vec<f64> = values.iter().copied().collect();
    image.write_data(&data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_geotiff_roundtrip_north_up() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("grid.tif");
        let values = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let transform = GeoTransform::new(-10.0, 45.0, 0.25, -0.25);

        write_geotiff(&path, &values, &transform).unwrap();
        let raster = GeoTiffRaster::open(&path).unwrap();

        assert_eq!(raster.shape(), (2, 3));
        assert_eq!(raster.transform(), transform);
        assert_eq!(raster.read_band().unwrap(), values);
        assert_eq!(raster.name(), "grid");
    }

    #[test]
    fn test_geotiff_roundtrip_rotated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotated.tif");
        let values = array![[1.0, 2.0], [3.0, 4.0]];
        let transform = GeoTransform::from_gdal([5.0, 1.0, 0.1, 20.0, 0.2, -1.0]);

        write_geotiff(&path, &values, &transform).unwrap();
        let raster = GeoTiffRaster::open(&path).unwrap();
        assert_eq!(raster.transform(), transform);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = GeoTiffRaster::open("/nonexistent/grid.tif").unwrap_err();
        assert!(matches!(err, ErosivityError::Io(_)));
    }

    #[test]
    fn test_first_band_of_interleaved_buffer() {
        let band = first_band(vec![1.0, 9.0, 2.0, 9.0], (1, 2)).unwrap();
        assert_eq!(band, array![[1.0, 2.0]]);
        assert!(first_band(vec![1.0, 2.0, 3.0], (1, 2)).is_err());
    }
}
