//! Tile decompression codecs for the FITS tile-compression convention
//! (`ZCMPTYPE`): Rice, HCompress, PLIO, and GZIP_1.

pub mod dither;
pub mod gzip;
pub mod hcompress;
pub mod plio;
pub mod rice;

use alloc::vec::Vec;

use crate::error::{FitsError as Error, FitsResult as Result};

/// A decoded tile, prior to BSCALE/BZERO rescaling and BLANK substitution.
pub enum DecodedTile {
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Dispatches to the decoder registered for `algorithm`.
///
/// `algorithm` is the value of the `ZCMPTYPE` keyword. Unknown algorithms
/// produce [`Error::UnsupportedCompression`] so callers can decide whether to
/// fail or fall back to the uncompressed heap representation.
pub fn decode_tile(
    algorithm: &str,
    compressed: &[u8],
    num_pixels: usize,
    blocksize: usize,
    bytepix: usize,
    smooth: bool,
) -> Result<DecodedTile> {
    match algorithm {
        "RICE_1" | "RICE_ONE" => {
            rice::decompress(compressed, num_pixels, blocksize, bytepix).map(DecodedTile::I32)
        }
        "GZIP_1" | "GZIP_2" => {
            gzip::decompress(compressed).map(|bytes| DecodedTile::I32(gzip::bytes_to_i32(&bytes)))
        }
        "HCOMPRESS_1" => {
            let (pixels, nx, ny) = hcompress::decompress(compressed, smooth)?;
            if nx * ny != num_pixels {
                return Err(Error::Decompression("HCompress tile extents do not match ZTILEn"));
            }
            Ok(DecodedTile::I32(pixels))
        }
        "PLIO_1" => plio::decompress(compressed, num_pixels).map(DecodedTile::I32),
        _ => Err(Error::UnsupportedCompression),
    }
}
