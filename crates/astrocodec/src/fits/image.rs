//! Image data reading for FITS HDUs.
//!
//! Provides functions to extract image pixel data from FITS byte streams,
//! with support for all standard BITPIX types and BSCALE/BZERO calibration.

use alloc::vec;
use alloc::vec::Vec;

use bytemuck::pod_collect_to_vec;

use crate::fits::block::padded_byte_len;
use crate::fits::endian::{
    buf_f32_native_to_be, buf_f64_native_to_be, buf_i16_native_to_be, buf_i32_native_to_be,
    buf_i64_native_to_be,
};
use crate::error::{FitsError as Error, FitsResult as Result};
use crate::fits::hdu::{Hdu, HduInfo};
use crate::fits::header::{serialize_header, Card};
use crate::fits::primary::build_primary_header;
use crate::fits::value::Value;

/// Image pixel data extracted from a FITS HDU, typed by BITPIX.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(Vec<u8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Returns the image dimensions (NAXESn values) from an HDU.
///
/// Returns an error if the HDU is not a Primary or Image HDU.
pub fn image_dimensions(hdu: &Hdu) -> Result<Vec<usize>> {
    match &hdu.info {
        HduInfo::Primary { naxes, .. } => Ok(naxes.clone()),
        HduInfo::Image { naxes, .. } => Ok(naxes.clone()),
        HduInfo::CompressedImage { znaxes, .. } => Ok(znaxes.clone()),
        _ => Err(Error::InvalidHeader("not an image HDU")),
    }
}

/// Extracts the BITPIX value from an HDU info, returning an error for
/// non-image HDU types.
fn hdu_bitpix(hdu: &Hdu) -> Result<i64> {
    match &hdu.info {
        HduInfo::Primary { bitpix, .. } | HduInfo::Image { bitpix, .. } => Ok(*bitpix),
        HduInfo::CompressedImage { zbitpix, .. } => Ok(*zbitpix),
        _ => Err(Error::InvalidHeader("not an image HDU")),
    }
}

/// Read raw image pixel data from a FITS byte stream for the given HDU.
///
/// Converts big-endian on-disk bytes to native-endian typed arrays.
/// Returns an `ImageData` enum variant matching the BITPIX type.
pub fn read_image_data(fits_data: &[u8], hdu: &Hdu) -> Result<ImageData> {
    if matches!(&hdu.info, HduInfo::CompressedImage { .. }) {
        return crate::fits::tiled::read_tiled_image(fits_data, hdu);
    }
    let bitpix = hdu_bitpix(hdu)?;
    let data_len = hdu.data_len;

    if data_len == 0 {
        return match bitpix {
            8 => Ok(ImageData::U8(Vec::new())),
            16 => Ok(ImageData::I16(Vec::new())),
            32 => Ok(ImageData::I32(Vec::new())),
            64 => Ok(ImageData::I64(Vec::new())),
            -32 => Ok(ImageData::F32(Vec::new())),
            -64 => Ok(ImageData::F64(Vec::new())),
            other => Err(Error::InvalidBitpix(other)),
        };
    }

    let end = hdu.data_start + data_len;
    if end > fits_data.len() {
        return Err(Error::UnexpectedEof);
    }

    let raw = &fits_data[hdu.data_start..end];

    match bitpix {
        8 => Ok(ImageData::U8(raw.to_vec())),
        16 => {
            // Interpret big-endian bytes as i16, collect into properly-aligned Vec<i16>,
            // then swap each element to native endianness in place.
            let mut pixels: Vec<i16> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i16::from_be(*v);
            }
            Ok(ImageData::I16(pixels))
        }
        32 => {
            let mut pixels: Vec<i32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i32::from_be(*v);
            }
            Ok(ImageData::I32(pixels))
        }
        64 => {
            let mut pixels: Vec<i64> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i64::from_be(*v);
            }
            Ok(ImageData::I64(pixels))
        }
        -32 => {
            let mut pixels: Vec<f32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f32::from_bits(u32::from_be(v.to_bits()));
            }
            Ok(ImageData::F32(pixels))
        }
        -64 => {
            let mut pixels: Vec<f64> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f64::from_bits(u64::from_be(v.to_bits()));
            }
            Ok(ImageData::F64(pixels))
        }
        other => Err(Error::InvalidBitpix(other)),
    }
}

/// Read image pixel data into a pre-allocated `f32` buffer.
///
/// The buffer must have exactly the right number of elements for the image.
/// Data is converted from the on-disk BITPIX type to f32.
pub fn read_image_data_into_f32(fits_data: &[u8], hdu: &Hdu, buf: &mut [f32]) -> Result<()> {
    let bitpix = hdu_bitpix(hdu)?;
    let bpp = bytes_per_pixel(bitpix)?;
    let data_len = hdu.data_len;
    let npixels = if bpp > 0 { data_len / bpp } else { 0 };

    if buf.len() != npixels {
        return Err(Error::InvalidValue);
    }

    if npixels == 0 {
        return Ok(());
    }

    let end = hdu.data_start + data_len;
    if end > fits_data.len() {
        return Err(Error::UnexpectedEof);
    }
    let raw = &fits_data[hdu.data_start..end];

    match bitpix {
        8 => {
            for (i, &b) in raw.iter().enumerate() {
                buf[i] = b as f32;
            }
        }
        16 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_i16_be(&raw[i * 2..]) as f32;
            }
        }
        32 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_i32_be(&raw[i * 4..]) as f32;
            }
        }
        64 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_i64_be(&raw[i * 8..]) as f32;
            }
        }
        -32 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_f32_be(&raw[i * 4..]);
            }
        }
        -64 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_f64_be(&raw[i * 8..]) as f32;
            }
        }
        other => return Err(Error::InvalidBitpix(other)),
    }
    Ok(())
}

/// Read image pixel data into a pre-allocated `f64` buffer.
///
/// The buffer must have exactly the right number of elements for the image.
/// Data is converted from the on-disk BITPIX type to f64.
pub fn read_image_data_into_f64(fits_data: &[u8], hdu: &Hdu, buf: &mut [f64]) -> Result<()> {
    let bitpix = hdu_bitpix(hdu)?;
    let bpp = bytes_per_pixel(bitpix)?;
    let data_len = hdu.data_len;
    let npixels = if bpp > 0 { data_len / bpp } else { 0 };

    if buf.len() != npixels {
        return Err(Error::InvalidValue);
    }

    if npixels == 0 {
        return Ok(());
    }

    let end = hdu.data_start + data_len;
    if end > fits_data.len() {
        return Err(Error::UnexpectedEof);
    }
    let raw = &fits_data[hdu.data_start..end];

    match bitpix {
        8 => {
            for (i, &b) in raw.iter().enumerate() {
                buf[i] = b as f64;
            }
        }
        16 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_i16_be(&raw[i * 2..]) as f64;
            }
        }
        32 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_i32_be(&raw[i * 4..]) as f64;
            }
        }
        64 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_i64_be(&raw[i * 8..]) as f64;
            }
        }
        -32 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_f32_be(&raw[i * 4..]) as f64;
            }
        }
        -64 => {
            for i in 0..npixels {
                buf[i] = crate::fits::endian::read_f64_be(&raw[i * 8..]);
            }
        }
        other => return Err(Error::InvalidBitpix(other)),
    }
    Ok(())
}

/// Apply BSCALE/BZERO calibration to raw image data.
///
/// Computes `physical = bzero + bscale * pixel` for every pixel and returns
/// the results as `Vec<f64>`.
pub fn apply_bscale_bzero(data: &ImageData, bscale: f64, bzero: f64) -> Vec<f64> {
    match data {
        ImageData::U8(v) => v.iter().map(|&p| bzero + bscale * (p as f64)).collect(),
        ImageData::I16(v) => v.iter().map(|&p| bzero + bscale * (p as f64)).collect(),
        ImageData::I32(v) => v.iter().map(|&p| bzero + bscale * (p as f64)).collect(),
        ImageData::I64(v) => v.iter().map(|&p| bzero + bscale * (p as f64)).collect(),
        ImageData::F32(v) => v.iter().map(|&p| bzero + bscale * (p as f64)).collect(),
        ImageData::F64(v) => v.iter().map(|&p| bzero + bscale * p).collect(),
    }
}

/// Extract BSCALE and BZERO values from a slice of header cards.
///
/// Returns `(bscale, bzero)`. Defaults to `(1.0, 0.0)` if the keywords
/// are not present.
pub fn extract_bscale_bzero(cards: &[Card]) -> (f64, f64) {
    let bscale = find_float_keyword(cards, "BSCALE").unwrap_or(1.0);
    let bzero = find_float_keyword(cards, "BZERO").unwrap_or(0.0);
    (bscale, bzero)
}

/// Extract the BLANK keyword value from header cards.
///
/// The BLANK keyword defines the integer value used to represent undefined
/// pixels in images with positive BITPIX (8, 16, 32, 64). Returns `None`
/// if the keyword is not present.
pub fn extract_blank(cards: &[Card]) -> Option<i64> {
    find_integer_keyword(cards, "BLANK")
}

/// Find an integer-valued keyword in the card list.
fn find_integer_keyword(cards: &[Card], keyword: &str) -> Option<i64> {
    cards.iter().find_map(|c| {
        if c.keyword_str() == keyword {
            match &c.value {
                Some(Value::Integer(n)) => Some(*n),
                _ => None,
            }
        } else {
            None
        }
    })
}

/// Create a boolean mask indicating which pixels are undefined (BLANK).
///
/// Returns a `Vec<bool>` with the same length as the pixel array, where
/// `true` means the pixel is undefined. For floating-point types, NaN
/// pixels are marked as undefined regardless of the BLANK keyword.
///
/// Returns `None` if the image data is empty or no BLANK/NaN values exist.
pub fn blank_mask(data: &ImageData, blank: Option<i64>) -> Option<Vec<bool>> {
    let mask: Vec<bool> = match data {
        ImageData::U8(v) => match blank {
            Some(b) => {
                let bv = b as u8;
                v.iter().map(|&p| p == bv).collect()
            }
            None => return None,
        },
        ImageData::I16(v) => match blank {
            Some(b) => {
                let bv = b as i16;
                v.iter().map(|&p| p == bv).collect()
            }
            None => return None,
        },
        ImageData::I32(v) => match blank {
            Some(b) => {
                let bv = b as i32;
                v.iter().map(|&p| p == bv).collect()
            }
            None => return None,
        },
        ImageData::I64(v) => match blank {
            Some(b) => v.iter().map(|&p| p == b).collect(),
            None => return None,
        },
        ImageData::F32(v) => v.iter().map(|p| p.is_nan()).collect(),
        ImageData::F64(v) => v.iter().map(|p| p.is_nan()).collect(),
    };
    if mask.iter().any(|&b| b) {
        Some(mask)
    } else {
        None
    }
}

/// Find a float-valued keyword in the card list, accepting both Float and
/// Integer values (integers are promoted to f64).
fn find_float_keyword(cards: &[Card], keyword: &str) -> Option<f64> {
    cards.iter().find_map(|c| {
        if c.keyword_str() == keyword {
            match &c.value {
                Some(Value::Float(f)) => Some(*f),
                Some(Value::Integer(n)) => Some(*n as f64),
                _ => None,
            }
        } else {
            None
        }
    })
}

/// Read image data with BSCALE/BZERO calibration applied.
///
/// Reads raw pixel data from the HDU, extracts BSCALE and BZERO from the
/// header cards, and returns calibrated physical values as `Vec<f64>`.
/// Pixels matching the BLANK keyword value are set to NaN.
pub fn read_image_physical(fits_data: &[u8], hdu: &Hdu) -> Result<Vec<f64>> {
    let raw = read_image_data(fits_data, hdu)?;
    let (bscale, bzero) = extract_bscale_bzero(&hdu.cards);
    let blank = extract_blank(&hdu.cards);
    let mut physical = apply_bscale_bzero(&raw, bscale, bzero);
    if let Some(mask) = blank_mask(&raw, blank) {
        for (val, is_blank) in physical.iter_mut().zip(mask.iter()) {
            if *is_blank {
                *val = f64::NAN;
            }
        }
    }
    Ok(physical)
}

// ---- Image write functions ----

/// Serialize a slice of `u8` pixel values into a block-padded FITS data segment.
pub fn serialize_image_u8(pixels: &[u8]) -> Vec<u8> {
    let raw_len = pixels.len();
    let padded_len = padded_byte_len(raw_len);
    let mut buf = vec![0u8; padded_len];
    buf[..raw_len].copy_from_slice(pixels);
    buf
}

/// Serialize a slice of `i16` pixel values into big-endian, block-padded FITS data.
pub fn serialize_image_i16(pixels: &[i16]) -> Vec<u8> {
    let raw_len = pixels.len() * 2;
    let padded_len = padded_byte_len(raw_len);
    // Copy pixel bytes via bytemuck, then swap endianness in-place
    let mut buf: Vec<u8> = pod_collect_to_vec(pixels);
    buf_i16_native_to_be(&mut buf);
    buf.resize(padded_len, 0);
    buf
}

/// Serialize a slice of `i32` pixel values into big-endian, block-padded FITS data.
pub fn serialize_image_i32(pixels: &[i32]) -> Vec<u8> {
    let raw_len = pixels.len() * 4;
    let padded_len = padded_byte_len(raw_len);
    let mut buf: Vec<u8> = pod_collect_to_vec(pixels);
    buf_i32_native_to_be(&mut buf);
    buf.resize(padded_len, 0);
    buf
}

/// Serialize a slice of `i64` pixel values into big-endian, block-padded FITS data.
pub fn serialize_image_i64(pixels: &[i64]) -> Vec<u8> {
    let raw_len = pixels.len() * 8;
    let padded_len = padded_byte_len(raw_len);
    let mut buf: Vec<u8> = pod_collect_to_vec(pixels);
    buf_i64_native_to_be(&mut buf);
    buf.resize(padded_len, 0);
    buf
}

/// Serialize a slice of `f32` pixel values into big-endian, block-padded FITS data.
pub fn serialize_image_f32(pixels: &[f32]) -> Vec<u8> {
    let raw_len = pixels.len() * 4;
    let padded_len = padded_byte_len(raw_len);
    let mut buf: Vec<u8> = pod_collect_to_vec(pixels);
    buf_f32_native_to_be(&mut buf);
    buf.resize(padded_len, 0);
    buf
}

/// Serialize a slice of `f64` pixel values into big-endian, block-padded FITS data.
pub fn serialize_image_f64(pixels: &[f64]) -> Vec<u8> {
    let raw_len = pixels.len() * 8;
    let padded_len = padded_byte_len(raw_len);
    let mut buf: Vec<u8> = pod_collect_to_vec(pixels);
    buf_f64_native_to_be(&mut buf);
    buf.resize(padded_len, 0);
    buf
}

/// Serialize an `ImageData` variant into block-padded FITS data bytes.
pub fn serialize_image(data: &ImageData) -> Vec<u8> {
    match data {
        ImageData::U8(v) => serialize_image_u8(v),
        ImageData::I16(v) => serialize_image_i16(v),
        ImageData::I32(v) => serialize_image_i32(v),
        ImageData::I64(v) => serialize_image_i64(v),
        ImageData::F32(v) => serialize_image_f32(v),
        ImageData::F64(v) => serialize_image_f64(v),
    }
}

/// Build a complete image HDU (header + data) as a byte vector.
pub fn build_image_hdu(bitpix: i64, naxes: &[usize], data: &ImageData) -> Result<Vec<u8>> {
    let cards = build_primary_header(bitpix, naxes)?;
    let header_bytes = serialize_header(&cards)?;
    let data_bytes = serialize_image(data);

    let mut hdu = Vec::with_capacity(header_bytes.len() + data_bytes.len());
    hdu.extend_from_slice(&header_bytes);
    hdu.extend_from_slice(&data_bytes);
    Ok(hdu)
}

/// Reverse BSCALE/BZERO calibration: convert physical f64 values to raw
/// integer values using `raw = (physical - bzero) / bscale`.
///
/// The target BITPIX determines the output type. Values are rounded to the
/// nearest integer and clamped to the valid range for the target type.
pub fn reverse_bscale_bzero(
    physical: &[f64],
    bscale: f64,
    bzero: f64,
    bitpix: i64,
) -> Result<ImageData> {
    let inv = |v: f64| (v - bzero) / bscale;
    let round_clamp = |v: f64, lo: f64, hi: f64| -> f64 {
        let r = libm::round(v);
        if r < lo {
            lo
        } else if r > hi {
            hi
        } else {
            r
        }
    };
    match bitpix {
        8 => {
            let pixels: Vec<u8> = physical
                .iter()
                .map(|&v| round_clamp(inv(v), 0.0, 255.0) as u8)
                .collect();
            Ok(ImageData::U8(pixels))
        }
        16 => {
            let pixels: Vec<i16> = physical
                .iter()
                .map(|&v| round_clamp(inv(v), i16::MIN as f64, i16::MAX as f64) as i16)
                .collect();
            Ok(ImageData::I16(pixels))
        }
        32 => {
            let pixels: Vec<i32> = physical
                .iter()
                .map(|&v| round_clamp(inv(v), i32::MIN as f64, i32::MAX as f64) as i32)
                .collect();
            Ok(ImageData::I32(pixels))
        }
        64 => {
            let pixels: Vec<i64> = physical
                .iter()
                .map(|&v| round_clamp(inv(v), i64::MIN as f64, i64::MAX as f64) as i64)
                .collect();
            Ok(ImageData::I64(pixels))
        }
        -32 => {
            let pixels: Vec<f32> = physical.iter().map(|&v| inv(v) as f32).collect();
            Ok(ImageData::F32(pixels))
        }
        -64 => {
            let pixels: Vec<f64> = physical.iter().map(|&v| inv(v)).collect();
            Ok(ImageData::F64(pixels))
        }
        other => Err(Error::InvalidBitpix(other)),
    }
}

/// Build a complete image HDU with BSCALE/BZERO keywords.
///
/// Takes physical `f64` values, reverse-applies BSCALE/BZERO to produce raw
/// pixel data at the specified BITPIX, and includes the calibration keywords
/// in the header so that readers can recover the physical values.
pub fn build_image_hdu_with_scaling(
    bitpix: i64,
    naxes: &[usize],
    physical: &[f64],
    bscale: f64,
    bzero: f64,
) -> Result<Vec<u8>> {
    let raw = reverse_bscale_bzero(physical, bscale, bzero, bitpix)?;
    let mut cards = build_primary_header(bitpix, naxes)?;

    let is_non_default = bscale != 1.0 || bzero != 0.0;
    if is_non_default {
        fn make_card(keyword: &str, value: Value) -> Card {
            let mut kw = [b' '; 8];
            let bytes = keyword.as_bytes();
            let len = bytes.len().min(8);
            kw[..len].copy_from_slice(&bytes[..len]);
            Card {
                keyword: kw,
                value: Some(value),
                comment: None,
            }
        }
        cards.push(make_card("BSCALE", Value::Float(bscale)));
        cards.push(make_card("BZERO", Value::Float(bzero)));
    }

    let header_bytes = serialize_header(&cards)?;
    let data_bytes = serialize_image(&raw);

    let mut hdu = Vec::with_capacity(header_bytes.len() + data_bytes.len());
    hdu.extend_from_slice(&header_bytes);
    hdu.extend_from_slice(&data_bytes);
    Ok(hdu)
}

// ---- Image region/section/row functions ----

/// Returns the number of bytes per pixel for a given BITPIX value.
pub fn bytes_per_pixel(bitpix: i64) -> Result<usize> {
    match bitpix {
        8 | 16 | 32 | 64 | -32 | -64 => Ok((bitpix.unsigned_abs() / 8) as usize),
        _ => Err(Error::InvalidBitpix(bitpix)),
    }
}

/// Extract the BITPIX value and axis dimensions from an HDU.
fn hdu_bitpix_naxes(hdu: &Hdu) -> Result<(i64, &[usize])> {
    match &hdu.info {
        HduInfo::Primary { bitpix, naxes } | HduInfo::Image { bitpix, naxes } => {
            Ok((*bitpix, naxes))
        }
        HduInfo::CompressedImage {
            zbitpix, znaxes, ..
        } => Ok((*zbitpix, znaxes)),
        _ => Err(Error::InvalidHeader("not an image HDU")),
    }
}

/// Decode a contiguous byte slice into an `ImageData` variant based on BITPIX.
fn decode_pixels(raw: &[u8], bitpix: i64) -> Result<ImageData> {
    bytes_per_pixel(bitpix)?; // validate
    match bitpix {
        8 => Ok(ImageData::U8(raw.to_vec())),
        16 => {
            let mut pixels: Vec<i16> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i16::from_be(*v);
            }
            Ok(ImageData::I16(pixels))
        }
        32 => {
            let mut pixels: Vec<i32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i32::from_be(*v);
            }
            Ok(ImageData::I32(pixels))
        }
        64 => {
            let mut pixels: Vec<i64> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = i64::from_be(*v);
            }
            Ok(ImageData::I64(pixels))
        }
        -32 => {
            let mut pixels: Vec<f32> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f32::from_bits(u32::from_be(v.to_bits()));
            }
            Ok(ImageData::F32(pixels))
        }
        -64 => {
            let mut pixels: Vec<f64> = pod_collect_to_vec(raw);
            for v in &mut pixels {
                *v = f64::from_bits(u64::from_be(v.to_bits()));
            }
            Ok(ImageData::F64(pixels))
        }
        _ => Err(Error::InvalidBitpix(bitpix)),
    }
}

/// Read a flat range of pixels `[start_pixel..start_pixel+count)` from the image data.
pub fn read_image_section(
    fits_data: &[u8],
    hdu: &Hdu,
    start_pixel: usize,
    count: usize,
) -> Result<ImageData> {
    let (bitpix, naxes) = hdu_bitpix_naxes(hdu)?;
    let bpp = bytes_per_pixel(bitpix)?;

    let total_pixels: usize = if naxes.is_empty() {
        0
    } else {
        naxes.iter().copied().product()
    };

    let end_pixel = start_pixel.checked_add(count).ok_or(Error::InvalidValue)?;
    if end_pixel > total_pixels {
        return Err(Error::UnexpectedEof);
    }

    let byte_offset = hdu.data_start + start_pixel * bpp;
    let byte_end = byte_offset + count * bpp;
    if byte_end > fits_data.len() {
        return Err(Error::UnexpectedEof);
    }

    decode_pixels(&fits_data[byte_offset..byte_end], bitpix)
}

/// Read complete rows `[start_row..start_row+num_rows)` from a 2D+ image.
///
/// Row length is NAXIS1 pixels. Requires `naxis >= 2`.
pub fn read_image_rows(
    fits_data: &[u8],
    hdu: &Hdu,
    start_row: usize,
    num_rows: usize,
) -> Result<ImageData> {
    let (_, naxes) = hdu_bitpix_naxes(hdu)?;
    if naxes.len() < 2 {
        return Err(Error::InvalidHeader(
            "image needs at least 2 axes for row slicing",
        ));
    }

    let row_len = naxes[0];
    let total_rows: usize = naxes[1..].iter().copied().product();

    let end_row = start_row.checked_add(num_rows).ok_or(Error::InvalidValue)?;
    if end_row > total_rows {
        return Err(Error::UnexpectedEof);
    }

    let start_pixel = start_row * row_len;
    let pixel_count = num_rows * row_len;
    read_image_section(fits_data, hdu, start_pixel, pixel_count)
}

/// Read a rectangular sub-region from an image of arbitrary dimensionality.
///
/// `ranges` contains one `(start, end)` pair per axis (end exclusive).
/// Returns pixels in row-major (C) order for the sub-region.
pub fn read_image_region(
    fits_data: &[u8],
    hdu: &Hdu,
    ranges: &[(usize, usize)],
) -> Result<ImageData> {
    let (bitpix, naxes) = hdu_bitpix_naxes(hdu)?;
    let bpp = bytes_per_pixel(bitpix)?;
    let ndim = naxes.len();

    if ranges.len() != ndim {
        return Err(Error::InvalidValue);
    }

    let mut sub_dims = Vec::with_capacity(ndim);
    for (i, &(start, end)) in ranges.iter().enumerate() {
        if start > end || end > naxes[i] {
            return Err(Error::InvalidValue);
        }
        sub_dims.push(end - start);
    }

    let total_out: usize = if sub_dims.is_empty() {
        0
    } else {
        sub_dims.iter().copied().product()
    };

    if total_out == 0 {
        return decode_pixels(&[], bitpix);
    }

    // Axis strides: stride[0]=1, stride[1]=naxes[0], stride[2]=naxes[0]*naxes[1], ...
    let mut strides = Vec::with_capacity(ndim);
    let mut s: usize = 1;
    for &dim in naxes.iter() {
        strides.push(s);
        s *= dim;
    }

    let mut raw = Vec::with_capacity(total_out * bpp);
    let mut idx: Vec<usize> = vec![0; ndim];

    for _ in 0..total_out {
        let mut flat = 0;
        for d in 0..ndim {
            flat += (ranges[d].0 + idx[d]) * strides[d];
        }

        let byte_offset = hdu.data_start + flat * bpp;
        let byte_end = byte_offset + bpp;
        if byte_end > fits_data.len() {
            return Err(Error::UnexpectedEof);
        }
        raw.extend_from_slice(&fits_data[byte_offset..byte_end]);

        // Increment multi-index with first axis varying fastest (Fortran/FITS order).
        let mut carry = true;
        for d in 0..ndim {
            if carry {
                idx[d] += 1;
                if idx[d] < sub_dims[d] {
                    carry = false;
                } else {
                    idx[d] = 0;
                }
            }
        }
    }

    decode_pixels(&raw, bitpix)
}
