//! The fixed 178-byte SER header (§6: offsets 0..178).

use crate::error::{SerError as Error, SerResult as Result};

/// Size in bytes of the fixed SER header.
pub const HEADER_LEN: usize = 178;

/// Size in bytes of one frame timestamp in the optional trailer.
pub const TIMESTAMP_LEN: usize = 8;

/// The 14-byte ASCII file identifier every SER file begins with.
pub const FILE_ID: &[u8; 14] = b"LUCAM-RECORDER";

/// Color layout of a SER sequence, carried in the `colorID` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorId {
    Mono,
    BayerRggb,
    BayerGrbg,
    BayerGbrg,
    BayerBggr,
    BayerCyym,
    BayerYcmy,
    BayerYmcy,
    BayerMyxy,
    Rgb,
    Bgr,
}

impl ColorId {
    /// Decode the raw `colorID` field value.
    pub fn from_raw(v: i32) -> Result<ColorId> {
        Ok(match v {
            0 => ColorId::Mono,
            8 => ColorId::BayerRggb,
            9 => ColorId::BayerGrbg,
            10 => ColorId::BayerGbrg,
            11 => ColorId::BayerBggr,
            16 => ColorId::BayerCyym,
            17 => ColorId::BayerYcmy,
            18 => ColorId::BayerYmcy,
            19 => ColorId::BayerMyxy,
            100 => ColorId::Rgb,
            101 => ColorId::Bgr,
            _ => return Err(Error::Validation("colorID outside the defined enum")),
        })
    }

    /// The raw wire value for this color layout.
    pub fn to_raw(self) -> i32 {
        match self {
            ColorId::Mono => 0,
            ColorId::BayerRggb => 8,
            ColorId::BayerGrbg => 9,
            ColorId::BayerGbrg => 10,
            ColorId::BayerBggr => 11,
            ColorId::BayerCyym => 16,
            ColorId::BayerYcmy => 17,
            ColorId::BayerYmcy => 18,
            ColorId::BayerMyxy => 19,
            ColorId::Rgb => 100,
            ColorId::Bgr => 101,
        }
    }

    /// Number of interleaved samples per pixel: 3 for RGB/BGR, 1 for mono
    /// and every Bayer pattern (a Bayer mosaic is one plane with a
    /// color-filter-array pattern over it, not interleaved channels).
    pub fn channel_count(self) -> usize {
        match self {
            ColorId::Rgb | ColorId::Bgr => 3,
            _ => 1,
        }
    }

    /// Whether pixel channels must be reversed to obtain RGB order.
    pub fn is_reversed(self) -> bool {
        matches!(self, ColorId::Bgr)
    }
}

/// Endianness interpretation policy for the `littleEndianFlag` header field.
///
/// The field's wire semantics are historically inverted in widely deployed
/// tooling relative to the written SER standard; see §4.K / §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndianPolicy {
    /// `0` ⇒ little-endian, `1` ⇒ big-endian. The de facto convention and
    /// this crate's default.
    #[default]
    Compat,
    /// Literal reading of the standard: `1` ⇒ little-endian, `0` ⇒ big-endian.
    Spec,
    /// Decide per-file by examining sample bytes for the smoother histogram.
    Auto,
}

impl EndianPolicy {
    /// Resolve whether multi-byte samples are little-endian, given the raw
    /// `endianFlag` field and (for `Auto`) a sample of frame bytes.
    pub fn resolve_little_endian(self, raw_flag: i32, sample: &[u8], bytes_per_sample: usize) -> bool {
        match self {
            EndianPolicy::Compat => raw_flag == 0,
            EndianPolicy::Spec => raw_flag == 1,
            EndianPolicy::Auto => auto_detect_little_endian(sample, bytes_per_sample),
        }
    }
}

/// Histogram-smoothness heuristic for 16-bit samples: real sky images have
/// slowly varying sample values, so the correctly-ordered interpretation
/// produces a lower sum of absolute differences between consecutive samples
/// than the byte-swapped interpretation.
fn auto_detect_little_endian(sample: &[u8], bytes_per_sample: usize) -> bool {
    if bytes_per_sample != 2 || sample.len() < 4 {
        return true;
    }
    let values_le: alloc::vec::Vec<u16> = sample
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let values_be: alloc::vec::Vec<u16> = sample
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();
    let roughness = |v: &[u16]| -> i64 {
        v.windows(2)
            .map(|w| (w[1] as i64 - w[0] as i64).abs())
            .sum()
    };
    roughness(&values_le) <= roughness(&values_be)
}

/// A parsed 178-byte SER header.
#[derive(Debug, Clone)]
pub struct SerHeader {
    pub lu_id: i32,
    pub color_id: ColorId,
    /// Raw `endianFlag` field, preserved verbatim for round-tripping.
    pub raw_endian_flag: i32,
    pub width: u32,
    pub height: u32,
    /// Bits per sample per channel, 1..=16.
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: [u8; 40],
    pub instrument: [u8; 40],
    pub telescope: [u8; 40],
    pub date_time: u64,
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Bytes occupied by one sample, derived from `pixel_depth`.
    pub fn bytes_per_sample(&self) -> usize {
        if self.pixel_depth <= 8 {
            1
        } else {
            2
        }
    }

    /// Number of interleaved channels per pixel.
    pub fn channel_count(&self) -> usize {
        self.color_id.channel_count()
    }

    /// Stride in bytes of a single frame: `w * h * channels * bytes_per_sample`.
    pub fn frame_stride(&self) -> usize {
        self.width as usize
            * self.height as usize
            * self.channel_count()
            * self.bytes_per_sample()
    }

    /// Parse the fixed header from the first 178 bytes of a SER file.
    pub fn parse(buf: &[u8]) -> Result<SerHeader> {
        if buf.len() < HEADER_LEN {
            return Err(Error::Format("file shorter than the 178-byte SER header"));
        }
        if &buf[0..14] != FILE_ID {
            return Err(Error::Format("missing LUCAM-RECORDER signature"));
        }
        let i32_at = |off: usize| -> i32 { i32::from_le_bytes(buf[off..off + 4].try_into().unwrap()) };
        let u64_at = |off: usize| -> u64 { u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()) };

        let lu_id = i32_at(14);
        let raw_color_id = i32_at(18);
        let raw_endian_flag = i32_at(22);
        let width = i32_at(26);
        let height = i32_at(30);
        let pixel_depth = i32_at(34);
        let frame_count = i32_at(38);

        if width <= 0 || height <= 0 {
            return Err(Error::Validation("width/height must be positive"));
        }
        if !(1..=16).contains(&pixel_depth) {
            return Err(Error::Validation("pixelDepth out of range 1..=16"));
        }
        if frame_count < 0 {
            return Err(Error::Validation("frameCount must not be negative"));
        }

        let mut observer = [0u8; 40];
        observer.copy_from_slice(&buf[42..82]);
        let mut instrument = [0u8; 40];
        instrument.copy_from_slice(&buf[82..122]);
        let mut telescope = [0u8; 40];
        telescope.copy_from_slice(&buf[122..162]);

        Ok(SerHeader {
            lu_id,
            color_id: ColorId::from_raw(raw_color_id)?,
            raw_endian_flag,
            width: width as u32,
            height: height as u32,
            pixel_depth: pixel_depth as u32,
            frame_count: frame_count as u32,
            observer,
            instrument,
            telescope,
            date_time: u64_at(162),
            date_time_utc: u64_at(170),
        })
    }

    /// Serialize back to the fixed 178-byte layout.
    pub fn write(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..14].copy_from_slice(FILE_ID);
        out[14..18].copy_from_slice(&self.lu_id.to_le_bytes());
        out[18..22].copy_from_slice(&self.color_id.to_raw().to_le_bytes());
        out[22..26].copy_from_slice(&self.raw_endian_flag.to_le_bytes());
        out[26..30].copy_from_slice(&(self.width as i32).to_le_bytes());
        out[30..34].copy_from_slice(&(self.height as i32).to_le_bytes());
        out[34..38].copy_from_slice(&(self.pixel_depth as i32).to_le_bytes());
        out[38..42].copy_from_slice(&(self.frame_count as i32).to_le_bytes());
        out[42..82].copy_from_slice(&self.observer);
        out[82..122].copy_from_slice(&self.instrument);
        out[122..162].copy_from_slice(&self.telescope);
        out[162..170].copy_from_slice(&self.date_time.to_le_bytes());
        out[170..178].copy_from_slice(&self.date_time_utc.to_le_bytes());
        out
    }
}

/// Right-pad (or truncate) a UTF-8 string into a fixed 40-byte ASCII field.
pub fn pack_ascii40(s: &str) -> [u8; 40] {
    let mut out = [b' '; 40];
    let bytes = s.as_bytes();
    let len = bytes.len().min(40);
    out[..len].copy_from_slice(&bytes[..len]);
    out
}

/// Trim a fixed 40-byte ASCII field back to a `String`.
pub fn unpack_ascii40(field: &[u8; 40]) -> alloc::string::String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(40);
    alloc::string::String::from_utf8_lossy(&field[..end])
        .trim_end()
        .into()
}
