//! The XISF `<Image>` element: geometry, sample format, pixel storage, and
//! the associated data block plus auxiliary elements (§3 "XISF Unit").

use std::string::String;
use std::vec::Vec;

use crate::error::{XisfError as Error, XisfResult as Result};
use crate::xisf::datablock::DataBlock;
use crate::xisf::property::Property;

/// Sample storage format, the `sampleFormat` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Complex32,
    Complex64,
}

impl SampleFormat {
    pub fn parse(s: &str) -> Option<SampleFormat> {
        Some(match s {
            "UInt8" => SampleFormat::UInt8,
            "UInt16" => SampleFormat::UInt16,
            "UInt32" => SampleFormat::UInt32,
            "UInt64" => SampleFormat::UInt64,
            "Float32" => SampleFormat::Float32,
            "Float64" => SampleFormat::Float64,
            "Complex32" => SampleFormat::Complex32,
            "Complex64" => SampleFormat::Complex64,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::UInt8 => "UInt8",
            SampleFormat::UInt16 => "UInt16",
            SampleFormat::UInt32 => "UInt32",
            SampleFormat::UInt64 => "UInt64",
            SampleFormat::Float32 => "Float32",
            SampleFormat::Float64 => "Float64",
            SampleFormat::Complex32 => "Complex32",
            SampleFormat::Complex64 => "Complex64",
        }
    }

    /// Byte width of one sample (two `f32`/`f64` for complex formats).
    pub fn byte_width(self) -> usize {
        match self {
            SampleFormat::UInt8 => 1,
            SampleFormat::UInt16 => 2,
            SampleFormat::UInt32 | SampleFormat::Float32 => 4,
            SampleFormat::UInt64 | SampleFormat::Float64 | SampleFormat::Complex32 => 8,
            SampleFormat::Complex64 => 16,
        }
    }
}

/// Pixel channel interleaving, the `pixelStorage` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelStorage {
    /// Each channel is a contiguous plane (the XISF default).
    #[default]
    Planar,
    /// Channels are interleaved per pixel.
    Normal,
}

/// Color space, the `colorSpace` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Gray,
    Rgb,
    CieLab,
}

impl ColorSpace {
    pub fn parse(s: &str) -> Option<ColorSpace> {
        Some(match s {
            "Gray" => ColorSpace::Gray,
            "RGB" => ColorSpace::Rgb,
            "CIELab" => ColorSpace::CieLab,
            _ => return None,
        })
    }
}

/// One `<FITSKeyword>` carried by an Image, preserving header provenance
/// through a conversion round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct FitsKeyword {
    pub name: String,
    pub value: String,
    pub comment: String,
}

/// A decoded `<Image>` element: geometry, typed pixel block, and the
/// auxiliary metadata XISF allows to travel with an image.
#[derive(Debug, Clone)]
pub struct Image {
    /// Dimension vector; the trailing component is the channel count
    /// (e.g. `[width, height, channels]`).
    pub geometry: Vec<usize>,
    pub sample_format: SampleFormat,
    pub pixel_storage: PixelStorage,
    pub color_space: ColorSpace,
    pub bounds: Option<(f64, f64)>,
    pub orientation: Option<String>,
    pub offset: Option<f64>,
    pub data_block: DataBlock,
    pub icc_profile: Option<DataBlock>,
    pub rgb_working_space: Option<Vec<(String, String)>>,
    pub display_function: Option<Vec<f64>>,
    pub color_filter_array: Option<String>,
    pub resolution: Option<(f64, f64, String)>,
    pub thumbnail: Option<Box<Image>>,
    pub properties: Vec<Property>,
    pub tables: Vec<crate::xisf::table::Table>,
    pub fits_keywords: Vec<FitsKeyword>,
    pub id: Option<String>,
}

impl Image {
    /// Channel count, the trailing geometry component.
    pub fn channel_count(&self) -> usize {
        *self.geometry.last().unwrap_or(&1)
    }

    /// Pixel count per channel (product of every geometry component but
    /// the trailing channel count).
    pub fn pixels_per_channel(&self) -> usize {
        self.geometry[..self.geometry.len().saturating_sub(1)].iter().product()
    }

    /// Total sample count across all channels.
    pub fn total_samples(&self) -> usize {
        self.pixels_per_channel() * self.channel_count()
    }

    /// Decode resolved block bytes into typed samples, honoring
    /// `byte_order_little_endian` and the `sampleFormat`.
    pub fn decode_samples(&self, resolved: &[u8]) -> Result<DecodedImage> {
        let expected = self.total_samples() * self.sample_format.byte_width();
        if resolved.len() != expected {
            return Err(Error::Validation("resolved image block length does not match geometry/sampleFormat"));
        }
        let le = self.data_block.byte_order_little_endian;
        Ok(match self.sample_format {
            SampleFormat::UInt8 => DecodedImage::U8(resolved.to_vec()),
            SampleFormat::UInt16 => DecodedImage::U16(decode_u16(resolved, le)),
            SampleFormat::UInt32 => DecodedImage::U32(decode_u32(resolved, le)),
            SampleFormat::UInt64 => DecodedImage::U64(decode_u64(resolved, le)),
            SampleFormat::Float32 => DecodedImage::F32(decode_f32(resolved, le)),
            SampleFormat::Float64 => DecodedImage::F64(decode_f64(resolved, le)),
            SampleFormat::Complex32 => DecodedImage::Complex32(decode_complex32(resolved, le)),
            SampleFormat::Complex64 => DecodedImage::Complex64(decode_complex64(resolved, le)),
        })
    }
}

/// Typed pixel data decoded from an Image's resolved data block.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedImage {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Complex32(Vec<(f32, f32)>),
    Complex64(Vec<(f64, f64)>),
}

fn decode_u16(b: &[u8], le: bool) -> Vec<u16> {
    b.chunks_exact(2).map(|c| if le { u16::from_le_bytes([c[0], c[1]]) } else { u16::from_be_bytes([c[0], c[1]]) }).collect()
}
fn decode_u32(b: &[u8], le: bool) -> Vec<u32> {
    b.chunks_exact(4)
        .map(|c| {
            let a: [u8; 4] = c.try_into().unwrap();
            if le {
                u32::from_le_bytes(a)
            } else {
                u32::from_be_bytes(a)
            }
        })
        .collect()
}
fn decode_u64(b: &[u8], le: bool) -> Vec<u64> {
    b.chunks_exact(8)
        .map(|c| {
            let a: [u8; 8] = c.try_into().unwrap();
            if le {
                u64::from_le_bytes(a)
            } else {
                u64::from_be_bytes(a)
            }
        })
        .collect()
}
fn decode_f32(b: &[u8], le: bool) -> Vec<f32> {
    b.chunks_exact(4)
        .map(|c| {
            let a: [u8; 4] = c.try_into().unwrap();
            if le {
                f32::from_le_bytes(a)
            } else {
                f32::from_be_bytes(a)
            }
        })
        .collect()
}
fn decode_f64(b: &[u8], le: bool) -> Vec<f64> {
    b.chunks_exact(8)
        .map(|c| {
            let a: [u8; 8] = c.try_into().unwrap();
            if le {
                f64::from_le_bytes(a)
            } else {
                f64::from_be_bytes(a)
            }
        })
        .collect()
}
fn decode_complex32(b: &[u8], le: bool) -> Vec<(f32, f32)> {
    b.chunks_exact(8)
        .map(|c| {
            let re: [u8; 4] = c[0..4].try_into().unwrap();
            let im: [u8; 4] = c[4..8].try_into().unwrap();
            if le {
                (f32::from_le_bytes(re), f32::from_le_bytes(im))
            } else {
                (f32::from_be_bytes(re), f32::from_be_bytes(im))
            }
        })
        .collect()
}
fn decode_complex64(b: &[u8], le: bool) -> Vec<(f64, f64)> {
    b.chunks_exact(16)
        .map(|c| {
            let re: [u8; 8] = c[0..8].try_into().unwrap();
            let im: [u8; 8] = c[8..16].try_into().unwrap();
            if le {
                (f64::from_le_bytes(re), f64::from_le_bytes(im))
            } else {
                (f64::from_be_bytes(re), f64::from_be_bytes(im))
            }
        })
        .collect()
}

/// Encode typed samples back to bytes in the requested byte order (writer side).
pub fn encode_samples(image: &DecodedImage, little_endian: bool) -> Vec<u8> {
    match image {
        DecodedImage::U8(v) => v.clone(),
        DecodedImage::U16(v) => v.iter().flat_map(|x| if little_endian { x.to_le_bytes() } else { x.to_be_bytes() }).collect(),
        DecodedImage::U32(v) => v.iter().flat_map(|x| if little_endian { x.to_le_bytes() } else { x.to_be_bytes() }).collect(),
        DecodedImage::U64(v) => v.iter().flat_map(|x| if little_endian { x.to_le_bytes() } else { x.to_be_bytes() }).collect(),
        DecodedImage::F32(v) => v.iter().flat_map(|x| if little_endian { x.to_le_bytes() } else { x.to_be_bytes() }).collect(),
        DecodedImage::F64(v) => v.iter().flat_map(|x| if little_endian { x.to_le_bytes() } else { x.to_be_bytes() }).collect(),
        DecodedImage::Complex32(v) => v
            .iter()
            .flat_map(|(re, im)| {
                let mut out = Vec::with_capacity(8);
                out.extend_from_slice(&if little_endian { re.to_le_bytes() } else { re.to_be_bytes() });
                out.extend_from_slice(&if little_endian { im.to_le_bytes() } else { im.to_be_bytes() });
                out
            })
            .collect(),
        DecodedImage::Complex64(v) => v
            .iter()
            .flat_map(|(re, im)| {
                let mut out = Vec::with_capacity(16);
                out.extend_from_slice(&if little_endian { re.to_le_bytes() } else { re.to_be_bytes() });
                out.extend_from_slice(&if little_endian { im.to_le_bytes() } else { im.to_be_bytes() });
                out
            })
            .collect(),
    }
}
