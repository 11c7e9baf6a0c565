//! Tile pixel buffers and their on-disk encodings (FITS float tiles for
//! science data, PNG/JPEG for quick-look previews; §4.M steps 5-7).

use std::string::String;
use std::vec::Vec;

use crate::error::{HipsError as Error, HipsResult as Result};
use crate::fits::image::{build_image_hdu, ImageData};

/// The pixel encoding a tile file is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFormat {
    Fits,
    Png,
    Jpeg,
}

impl TileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TileFormat::Fits => "fits",
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "fits" => Ok(TileFormat::Fits),
            "png" => Ok(TileFormat::Png),
            "jpg" | "jpeg" => Ok(TileFormat::Jpeg),
            _ => Err(Error::Validation("unrecognized hips_tile_format")),
        }
    }
}

/// A square tile's pixel data at full `f64` precision; `NAN` marks samples
/// with no contributing source coverage (the "blank" convention used
/// throughout the builder and the allsky grid).
#[derive(Debug, Clone)]
pub struct TileBuffer {
    pub width: usize,
    pub samples: Vec<f64>,
}

impl TileBuffer {
    /// A tile filled entirely with blank (`NAN`) samples, the value emitted
    /// for a pixel index with no contributing data.
    pub fn blank(width: usize) -> Self {
        TileBuffer { width, samples: std::vec![f64::NAN; width * width] }
    }

    pub fn is_blank(&self) -> bool {
        self.samples.iter().all(|s| s.is_nan())
    }

    /// Encode this tile's samples as a single-plane, 64-bit floating point
    /// FITS image HDU (BITPIX=-64). `NAN` samples round-trip exactly since
    /// IEEE 754 FITS floats carry NaN natively; no BLANK keyword is needed.
    pub fn encode_fits(&self) -> Result<Vec<u8>> {
        build_image_hdu(-64, &[self.width, self.width], &ImageData::F64(self.samples.clone())).map_err(|_| Error::Format("failed to build FITS tile HDU"))
    }

    /// Linearly rescale `[min, max]` to `[0, 255]` and encode as an 8-bit
    /// grayscale PNG. `NAN` samples are emitted as `0`. Used for quick-look
    /// tiles and the allsky grid; science tiles should prefer
    /// [`TileBuffer::encode_fits`].
    pub fn encode_png(&self, min: f64, max: f64) -> Result<Vec<u8>> {
        let span = if max > min { max - min } else { 1.0 };
        let mut bytes = Vec::with_capacity(self.samples.len());
        for &s in &self.samples {
            if s.is_nan() {
                bytes.push(0u8);
                continue;
            }
            let normalized = ((s - min) / span).clamp(0.0, 1.0);
            bytes.push((normalized * 255.0).round() as u8);
        }

        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, self.width as u32, self.width as u32);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().map_err(|_| Error::Format("failed to write PNG header for tile"))?;
            writer.write_image_data(&bytes).map_err(|_| Error::Format("failed to write PNG image data for tile"))?;
        }
        Ok(out)
    }

    /// Encode per `format`, dispatching to [`TileBuffer::encode_fits`] or
    /// [`TileBuffer::encode_png`] (with a default full-range `[min, max]`
    /// scale of the tile's own finite samples). `Jpeg` is not supported by
    /// this crate's dependency stack and always errors.
    pub fn encode(&self, format: TileFormat) -> Result<Vec<u8>> {
        match format {
            TileFormat::Fits => self.encode_fits(),
            TileFormat::Png => {
                let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
                for &s in &self.samples {
                    if s.is_finite() {
                        min = min.min(s);
                        max = max.max(s);
                    }
                }
                if !min.is_finite() {
                    (min, max) = (0.0, 1.0);
                }
                self.encode_png(min, max)
            }
            TileFormat::Jpeg => Err(Error::Validation("JPEG tile encoding is not supported")),
        }
    }
}
