//! Lossless interconversion between FITS, XISF, and SER (§4.L).
//!
//! Each direction keeps the untransportable parts of the source format in a
//! metadata side-channel on the target: non-image FITS HDUs survive a round
//! trip through XISF as a `FITS:PreservedHDULayout` property, SER frame
//! timestamps survive through XISF as a `SER:FrameTimestamps` vector
//! property (or through FITS as a `SER_TSTP` BINTABLE extension).

use std::string::{String, ToString};
use std::vec::Vec;

use crate::error::{ConversionError, Error, Result};
use crate::fits::bintable::{
    read_binary_column, serialize_binary_table, serialize_binary_table_hdu,
    BinaryColumnData, BinaryColumnDescriptor, BinaryColumnType,
};
use crate::fits::extension::{build_extension_header, ExtensionType};
use crate::fits::hdu::{parse_fits, FitsData, Hdu, HduInfo};
use crate::fits::header::{format_card, parse_card, serialize_header, Card};
use crate::fits::image::{build_image_hdu, build_image_hdu_with_scaling, image_dimensions, read_image_data, ImageData};
use crate::fits::value::Value;
use crate::ser::{ColorId, SerHeader, SerSequence};
use crate::xisf::datablock::{DataBlock, Location};
use crate::xisf::image::{ColorSpace, DecodedImage, Image, PixelStorage, SampleFormat};
use crate::xisf::property::{Property, PropertyType, PropertyValue};

fn kw(name: &str) -> [u8; 8] {
    let mut buf = [b' '; 8];
    let bytes = name.as_bytes();
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);
    buf
}

fn card_string(name: &str, value: &str) -> Card {
    Card { keyword: kw(name), value: Some(Value::String(value.to_string())), comment: None }
}

fn card_bool(name: &str, value: bool) -> Card {
    Card { keyword: kw(name), value: Some(Value::Logical(value)), comment: None }
}

fn card_int(name: &str, value: i64) -> Card {
    Card { keyword: kw(name), value: Some(Value::Integer(value)), comment: None }
}

fn no_data_block() -> DataBlock {
    DataBlock {
        location: Location::Inline { hex: false },
        byte_order_little_endian: true,
        checksum: None,
        compression: None,
        inline_text: None,
    }
}

// ── §4.L: BZERO-encoded unsigned image <-> XISF sample format ──

/// Canonical BZERO literal for a sample format's unsigned encoding, or
/// `None` for formats that need no zero offset (signed/float/complex never
/// go through this path).
fn canonical_bzero(format: SampleFormat) -> Option<f64> {
    match format {
        SampleFormat::UInt8 => Some(0.0),
        SampleFormat::UInt16 => Some(32768.0),
        SampleFormat::UInt32 => Some(2147483648.0),
        SampleFormat::UInt64 => Some(9223372036854775808.0),
        _ => None,
    }
}

/// Markers written on the complex-image wrapper BINTABLE (§4.L).
const XISFCPLX: &str = "XISFCPLX";
const XISFSFMT: &str = "XISFSFMT";

/// Convert one XISF `Image` (already decoded) into a complete FITS byte
/// stream (§4.L "The writer creates FITS from XISF images using
/// BZERO-encoded unsigned representations"). Complex sample formats are
/// emitted as a single-row BINTABLE extension behind a minimal empty
/// primary HDU; every other format is a primary image HDU.
pub fn xisf_image_to_fits(image: &Image, pixels: &DecodedImage) -> Result<Vec<u8>> {
    let naxes = &image.geometry;
    match pixels {
        DecodedImage::U8(v) => Ok(build_image_hdu(8, naxes, &ImageData::U8(v.clone()))?),
        DecodedImage::U16(v) => {
            let physical: Vec<f64> = v.iter().map(|&p| p as f64).collect();
            let bzero = canonical_bzero(SampleFormat::UInt16).unwrap();
            Ok(build_image_hdu_with_scaling(16, naxes, &physical, 1.0, bzero)?)
        }
        DecodedImage::U32(v) => {
            let physical: Vec<f64> = v.iter().map(|&p| p as f64).collect();
            let bzero = canonical_bzero(SampleFormat::UInt32).unwrap();
            Ok(build_image_hdu_with_scaling(32, naxes, &physical, 1.0, bzero)?)
        }
        DecodedImage::U64(v) => {
            let physical: Vec<f64> = v.iter().map(|&p| p as f64).collect();
            let bzero = canonical_bzero(SampleFormat::UInt64).unwrap();
            Ok(build_image_hdu_with_scaling(64, naxes, &physical, 1.0, bzero)?)
        }
        DecodedImage::F32(v) => Ok(build_image_hdu(-32, naxes, &ImageData::F32(v.clone()))?),
        DecodedImage::F64(v) => Ok(build_image_hdu(-64, naxes, &ImageData::F64(v.clone()))?),
        DecodedImage::Complex32(v) => complex_image_to_fits(naxes, SampleFormat::Complex32, BinaryColumnType::ComplexFloat, v.iter().flat_map(|&(re, im)| [re as f64, im as f64]).collect()),
        DecodedImage::Complex64(v) => complex_image_to_fits(naxes, SampleFormat::Complex64, BinaryColumnType::ComplexDouble, v.iter().flat_map(|&(re, im)| [re, im]).collect()),
    }
}

fn complex_image_to_fits(naxes: &[usize], format: SampleFormat, col_type: BinaryColumnType, flat_re_im: Vec<f64>) -> Result<Vec<u8>> {
    let total_samples: usize = naxes.iter().product();
    let byte_width = match col_type {
        BinaryColumnType::ComplexFloat => 8,
        BinaryColumnType::ComplexDouble => 16,
        _ => unreachable!(),
    };
    let col = BinaryColumnDescriptor { name: Some("DATA".to_string()), repeat: total_samples, col_type, byte_width: total_samples * byte_width };
    let values: Vec<(f64, f64)> = flat_re_im.chunks_exact(2).map(|c| (c[0], c[1])).collect();
    let col_data = match col_type {
        BinaryColumnType::ComplexFloat => BinaryColumnData::ComplexFloat(values.iter().map(|&(re, im)| (re as f32, im as f32)).collect()),
        BinaryColumnType::ComplexDouble => BinaryColumnData::ComplexDouble(values),
        _ => unreachable!(),
    };

    let primary = build_image_hdu(8, &[], &ImageData::U8(Vec::new()))?;

    let ext_header = build_extension_header(ExtensionType::BinaryTable, 8, &[col.byte_width, 1], 0, 1)?;
    let mut cards = ext_header;
    cards.push(card_int("TFIELDS", 1));
    cards.push(card_string("TFORM1", &std::format!("{}{}", col.repeat, if matches!(col_type, BinaryColumnType::ComplexFloat) { 'C' } else { 'M' })));
    cards.push(card_string("TTYPE1", "DATA"));
    cards.push(card_bool(XISFCPLX, true));
    cards.push(card_string(XISFSFMT, format.as_str()));
    cards.push(card_int("XISFWID", *naxes.first().unwrap_or(&0) as i64));
    cards.push(card_int("XISFHEI", *naxes.get(1).unwrap_or(&0) as i64));
    cards.push(card_int("XISFDEP", *naxes.get(2).unwrap_or(&1) as i64));
    cards.push(card_int("XISFCHN", *naxes.last().unwrap_or(&1) as i64));

    let header_bytes = serialize_header(&cards)?;
    let data_bytes = serialize_binary_table(&[col], &[col_data], 1)?;

    let mut out = primary;
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&data_bytes);
    Ok(out)
}

/// Inverse of [`xisf_image_to_fits`]: read a FITS byte stream's image (or,
/// for complex data, its `XISFCPLX` BINTABLE extension) back into a typed
/// XISF [`DecodedImage`] plus geometry.
pub fn fits_to_xisf_image(fits_bytes: &[u8]) -> Result<(Image, DecodedImage)> {
    let fits = parse_fits(fits_bytes)?;
    if let Some(hdu) = fits.iter().find(|h| h.cards.iter().any(|c| c.keyword_str() == XISFCPLX)) {
        return fits_complex_hdu_to_xisf(fits_bytes, hdu);
    }

    let hdu = fits.primary();
    let naxes = image_dimensions(hdu)?;
    let raw = read_image_data(fits_bytes, hdu)?;
    let (bscale, bzero) = crate::fits::image::extract_bscale_bzero(&hdu.cards);
    let (decoded, format) = widen_to_decoded(raw, bscale, bzero);
    let image = build_xisf_image_shell(naxes, format);
    Ok((image, decoded))
}

fn widen_to_decoded(raw: ImageData, bscale: f64, bzero: f64) -> (DecodedImage, SampleFormat) {
    let is_unscaled = bscale == 1.0;
    match &raw {
        ImageData::U8(v) if is_unscaled && bzero == 0.0 => return (DecodedImage::U8(v.clone()), SampleFormat::UInt8),
        ImageData::I16(v) if is_unscaled && bzero == 32768.0 => {
            return (DecodedImage::U16(v.iter().map(|&p| (p as i32 + 32768) as u16).collect()), SampleFormat::UInt16);
        }
        ImageData::I32(v) if is_unscaled && bzero == 2147483648.0 => {
            return (DecodedImage::U32(v.iter().map(|&p| (p as i64 + 2147483648) as u32).collect()), SampleFormat::UInt32);
        }
        ImageData::I64(v) if is_unscaled && bzero == 9223372036854775808.0 => {
            return (
                DecodedImage::U64(v.iter().map(|&p| (p as i128 + 9223372036854775808i128) as u64).collect()),
                SampleFormat::UInt64,
            );
        }
        ImageData::F32(v) if is_unscaled && bzero == 0.0 => return (DecodedImage::F32(v.clone()), SampleFormat::Float32),
        ImageData::F64(v) if is_unscaled && bzero == 0.0 => return (DecodedImage::F64(v.clone()), SampleFormat::Float64),
        _ => {}
    }
    let physical = crate::fits::image::apply_bscale_bzero(&raw, bscale, bzero);
    (DecodedImage::F64(physical), SampleFormat::Float64)
}

fn fits_complex_hdu_to_xisf(fits_bytes: &[u8], hdu: &Hdu) -> Result<(Image, DecodedImage)> {
    let sfmt_str = hdu
        .cards
        .iter()
        .find(|c| c.keyword_str() == XISFSFMT)
        .and_then(|c| match &c.value {
            Some(Value::String(s)) => Some(s.trim().to_string()),
            _ => None,
        })
        .ok_or(Error::Conversion(ConversionError("XISFCPLX extension missing XISFSFMT")))?;
    let format = SampleFormat::parse(&sfmt_str).ok_or(Error::Conversion(ConversionError("unrecognized XISFSFMT value")))?;

    let axis = |keyword: &str| -> usize {
        hdu.cards
            .iter()
            .find(|c| c.keyword_str() == keyword)
            .and_then(|c| match &c.value {
                Some(Value::Integer(n)) => Some(*n as usize),
                _ => None,
            })
            .unwrap_or(1)
    };
    let naxes = std::vec![axis("XISFWID"), axis("XISFHEI"), axis("XISFCHN")];

    let col_data = read_binary_column(fits_bytes, hdu, 0)?;
    let decoded = match col_data {
        BinaryColumnData::ComplexFloat(v) => DecodedImage::Complex32(v),
        BinaryColumnData::ComplexDouble(v) => DecodedImage::Complex64(v),
        _ => return Err(Error::Conversion(ConversionError("XISFCPLX column is not a complex type"))),
    };

    let image = build_xisf_image_shell(naxes, format);
    Ok((image, decoded))
}

fn build_xisf_image_shell(geometry: Vec<usize>, format: SampleFormat) -> Image {
    Image {
        geometry,
        sample_format: format,
        pixel_storage: PixelStorage::Planar,
        color_space: ColorSpace::Gray,
        bounds: None,
        orientation: None,
        offset: None,
        data_block: no_data_block(),
        icc_profile: None,
        rgb_working_space: None,
        display_function: None,
        color_filter_array: None,
        resolution: None,
        thumbnail: None,
        properties: Vec::new(),
        tables: Vec::new(),
        fits_keywords: Vec::new(),
        id: None,
    }
}

// ── §4.L round-trip preservation: non-image HDUs through an XISF property ──

/// One non-image HDU captured verbatim for later replay (§4.L
/// `nonImageHDUs: [{index, cards[], dataBase64}]`).
#[derive(Debug, Clone)]
pub struct PreservedHdu {
    pub index: usize,
    pub cards: Vec<Card>,
    pub data: Vec<u8>,
}

/// `FITS:PreservedHDULayout` (§4.L): the full set of non-image HDUs from a
/// source FITS file, plus which HDU indices held the images that did
/// survive as XISF images, so the reverse direction can interleave them
/// back in original order.
#[derive(Debug, Clone, Default)]
pub struct PreservedHduLayout {
    pub image_source_indices: Vec<usize>,
    pub non_image_hdus: Vec<PreservedHdu>,
}

/// Is this HDU representable as a single XISF `Image` (§4.L)? Compressed
/// images decode to a plain pixel plane and qualify; tables of any kind do
/// not (they preserve as `non_image_hdus` instead).
fn is_image_like(info: &HduInfo) -> bool {
    matches!(info, HduInfo::Primary { .. } | HduInfo::Image { .. } | HduInfo::CompressedImage { .. })
}

/// Split a parsed FITS file into the HDUs that convert straight to XISF
/// images and the layout needed to preserve everything else (§4.L).
pub fn capture_non_image_hdus(fits_bytes: &[u8], fits: &FitsData) -> PreservedHduLayout {
    let mut layout = PreservedHduLayout::default();
    for (index, hdu) in fits.iter().enumerate() {
        if is_image_like(&hdu.info) {
            layout.image_source_indices.push(index);
            continue;
        }
        let data_start = hdu.data_start;
        let data_end = (data_start + hdu.data_len).min(fits_bytes.len());
        layout.non_image_hdus.push(PreservedHdu {
            index,
            cards: hdu.cards.clone(),
            data: fits_bytes[data_start..data_end].to_vec(),
        });
    }
    layout
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&std::format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

impl PreservedHduLayout {
    /// Serialize to the JSON structure §4.L names:
    /// `{imageSourceIndices, nonImageHDUs:[{index, cards[], dataBase64}]}`.
    pub fn to_json(&self) -> String {
        use base64::Engine;
        let indices: Vec<String> = self.image_source_indices.iter().map(|i| i.to_string()).collect();
        let mut hdus = String::new();
        for (i, hdu) in self.non_image_hdus.iter().enumerate() {
            if i > 0 {
                hdus.push(',');
            }
            let card_strings: Vec<String> = hdu
                .cards
                .iter()
                .map(|c| {
                    let bytes = format_card(c);
                    let text = core::str::from_utf8(&bytes).unwrap_or("").trim_end();
                    std::format!("\"{}\"", json_escape(text))
                })
                .collect();
            let b64 = base64::engine::general_purpose::STANDARD.encode(&hdu.data);
            hdus.push_str(&std::format!(
                "{{\"index\":{},\"cards\":[{}],\"dataBase64\":\"{}\"}}",
                hdu.index,
                card_strings.join(","),
                b64
            ));
        }
        std::format!("{{\"imageSourceIndices\":[{}],\"nonImageHDUs\":[{}]}}", indices.join(","), hdus)
    }

    /// Parse the JSON structure written by [`Self::to_json`]. This is a
    /// hand-rolled reader for exactly that schema, not a general JSON
    /// parser: it expects well-formed input produced by this crate.
    pub fn from_json(text: &str) -> Result<PreservedHduLayout> {
        let mut p = JsonCursor::new(text);
        p.expect_char('{')?;
        p.expect_key("imageSourceIndices")?;
        let image_source_indices = p.parse_usize_array()?;
        p.expect_char(',')?;
        p.expect_key("nonImageHDUs")?;
        let non_image_hdus = p.parse_hdu_array()?;
        Ok(PreservedHduLayout { image_source_indices, non_image_hdus })
    }

    /// Wrap this layout as the `FITS:PreservedHDULayout` metadata property.
    pub fn to_property(&self) -> Property {
        Property {
            id: "FITS:PreservedHDULayout".to_string(),
            ty: PropertyType::String,
            format: None,
            comment: None,
            value: PropertyValue::String(self.to_json()),
        }
    }

    /// Recover a `PreservedHduLayout` from a unit's metadata, if present.
    pub fn from_metadata(metadata: &[Property]) -> Option<PreservedHduLayout> {
        metadata.iter().find(|p| p.id == "FITS:PreservedHDULayout").and_then(|p| match &p.value {
            PropertyValue::String(s) => PreservedHduLayout::from_json(s).ok(),
            _ => None,
        })
    }
}

struct JsonCursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> JsonCursor<'a> {
    fn new(text: &'a str) -> Self {
        JsonCursor { bytes: text.as_bytes(), pos: 0 }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn expect_char(&mut self, c: char) -> Result<()> {
        self.skip_ws();
        if self.bytes.get(self.pos) == Some(&(c as u8)) {
            self.pos += 1;
            Ok(())
        } else {
            Err(Error::Conversion(ConversionError("malformed PreservedHDULayout JSON")))
        }
    }

    fn expect_key(&mut self, key: &str) -> Result<()> {
        self.skip_ws();
        let s = self.parse_json_string()?;
        if s != key {
            return Err(Error::Conversion(ConversionError("malformed PreservedHDULayout JSON: unexpected key")));
        }
        self.expect_char(':')
    }

    fn parse_json_string(&mut self) -> Result<String> {
        self.skip_ws();
        self.expect_char('"')?;
        let mut out = String::new();
        loop {
            let b = *self.bytes.get(self.pos).ok_or(Error::Conversion(ConversionError("unterminated JSON string")))?;
            self.pos += 1;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = *self.bytes.get(self.pos).ok_or(Error::Conversion(ConversionError("bad JSON escape")))?;
                    self.pos += 1;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b'u' => {
                            let hex = core::str::from_utf8(&self.bytes[self.pos..self.pos + 4]).unwrap_or("0000");
                            let code = u32::from_str_radix(hex, 16).unwrap_or(0);
                            if let Some(c) = char::from_u32(code) {
                                out.push(c);
                            }
                            self.pos += 4;
                        }
                        other => out.push(other as char),
                    }
                }
                other => out.push(other as char),
            }
        }
        Ok(out)
    }

    fn parse_usize_array(&mut self) -> Result<Vec<usize>> {
        self.skip_ws();
        self.expect_char('[')?;
        let mut out = Vec::new();
        self.skip_ws();
        if self.bytes.get(self.pos) == Some(&b']') {
            self.pos += 1;
            return Ok(out);
        }
        loop {
            self.skip_ws();
            let start = self.pos;
            while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
                self.pos += 1;
            }
            let n: usize = core::str::from_utf8(&self.bytes[start..self.pos])
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or(Error::Conversion(ConversionError("malformed integer in PreservedHDULayout JSON")))?;
            out.push(n);
            self.skip_ws();
            if self.bytes.get(self.pos) == Some(&b',') {
                self.pos += 1;
                continue;
            }
            break;
        }
        self.expect_char(']')?;
        Ok(out)
    }

    fn parse_string_array(&mut self) -> Result<Vec<String>> {
        self.skip_ws();
        self.expect_char('[')?;
        let mut out = Vec::new();
        self.skip_ws();
        if self.bytes.get(self.pos) == Some(&b']') {
            self.pos += 1;
            return Ok(out);
        }
        loop {
            out.push(self.parse_json_string()?);
            self.skip_ws();
            if self.bytes.get(self.pos) == Some(&b',') {
                self.pos += 1;
                continue;
            }
            break;
        }
        self.expect_char(']')?;
        Ok(out)
    }

    fn parse_hdu_array(&mut self) -> Result<Vec<PreservedHdu>> {
        self.skip_ws();
        self.expect_char('[')?;
        let mut out = Vec::new();
        self.skip_ws();
        if self.bytes.get(self.pos) == Some(&b']') {
            self.pos += 1;
            return Ok(out);
        }
        loop {
            self.expect_char('{')?;
            self.expect_key("index")?;
            self.skip_ws();
            let start = self.pos;
            while self.bytes.get(self.pos).is_some_and(u8::is_ascii_digit) {
                self.pos += 1;
            }
            let index: usize = core::str::from_utf8(&self.bytes[start..self.pos]).ok().and_then(|s| s.parse().ok()).unwrap_or(0);
            self.expect_char(',')?;
            self.expect_key("cards")?;
            let card_strings = self.parse_string_array()?;
            self.expect_char(',')?;
            self.expect_key("dataBase64")?;
            let b64 = self.parse_json_string()?;
            self.expect_char('}')?;

            let mut cards = Vec::with_capacity(card_strings.len());
            for s in &card_strings {
                let mut bytes = [b' '; 80];
                let src = s.as_bytes();
                let len = src.len().min(80);
                bytes[..len].copy_from_slice(&src[..len]);
                cards.push(parse_card(&bytes).map_err(|_| Error::Conversion(ConversionError("malformed preserved card text")))?);
            }
            use base64::Engine;
            let data = base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map_err(|_| Error::Conversion(ConversionError("malformed preserved HDU base64")))?;
            out.push(PreservedHdu { index, cards, data });

            self.skip_ws();
            if self.bytes.get(self.pos) == Some(&b',') {
                self.pos += 1;
                continue;
            }
            break;
        }
        self.expect_char(']')?;
        Ok(out)
    }
}

/// Reassemble a complete FITS byte stream from image HDUs (in the order
/// recorded by `image_source_indices`) interleaved with preserved non-image
/// HDUs, reversing [`capture_non_image_hdus`] (§4.L "On the reverse
/// direction, image HDUs are interleaved with preserved HDUs in the
/// recorded order").
pub fn rebuild_fits_with_preserved_hdus(image_hdu_bytes: &[Vec<u8>], layout: &PreservedHduLayout) -> Result<Vec<u8>> {
    let total = layout.image_source_indices.len() + layout.non_image_hdus.len();
    let mut by_index: std::collections::BTreeMap<usize, Vec<u8>> = std::collections::BTreeMap::new();

    for (i, &src_index) in layout.image_source_indices.iter().enumerate() {
        let bytes = image_hdu_bytes.get(i).ok_or(Error::Conversion(ConversionError("fewer image HDUs than recorded source indices")))?;
        by_index.insert(src_index, bytes.clone());
    }
    for hdu in &layout.non_image_hdus {
        let mut bytes = serialize_header(&hdu.cards)?;
        let padded_len = crate::fits::block::padded_byte_len(hdu.data.len());
        let mut data = hdu.data.clone();
        data.resize(padded_len, 0);
        bytes.extend_from_slice(&data);
        by_index.insert(hdu.index, bytes);
    }

    let mut out = Vec::new();
    for i in 0..total {
        if let Some(bytes) = by_index.get(&i) {
            out.extend_from_slice(bytes);
        }
    }
    Ok(out)
}

// ── §4.L SER <-> FITS ──

/// How a SER sequence's frames map onto FITS HDUs (§4.L "Two layouts").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerFitsLayout {
    /// A single N-axis HDU with a trailing frame axis (and channel
    /// interleaving for RGB).
    Cube,
    /// One image HDU per frame, linked by an `SERFRAME` card.
    MultiHdu,
}

const SERFRAME_MARKER: &str = "SERFRAME";

/// Convert a SER sequence to FITS under the requested layout.
pub fn ser_to_fits(seq: &SerSequence, layout: SerFitsLayout) -> Result<Vec<u8>> {
    match layout {
        SerFitsLayout::Cube => ser_to_fits_cube(seq),
        SerFitsLayout::MultiHdu => ser_to_fits_multi_hdu(seq),
    }
}

fn frame_plane_u16(seq: &SerSequence, index: usize) -> Result<Vec<u16>> {
    Ok(seq.get_frame(index)?.samples)
}

fn ser_to_fits_cube(seq: &SerSequence) -> Result<Vec<u8>> {
    let h = &seq.header;
    let channels = h.channel_count();
    let frame_count = seq.frame_count();
    let (w, ht) = (h.width as usize, h.height as usize);

    let naxes: Vec<usize> = if channels > 1 { std::vec![w, ht, channels, frame_count] } else { std::vec![w, ht, frame_count] };
    let total: usize = naxes.iter().product();
    let mut pixels = std::vec![0u16; total];
    let per_frame = w * ht * channels;
    for f in 0..frame_count {
        let plane = frame_plane_u16(seq, f)?;
        pixels[f * per_frame..(f + 1) * per_frame].copy_from_slice(&plane);
    }

    let physical: Vec<f64> = pixels.iter().map(|&p| p as f64).collect();
    let bytes = build_image_hdu_with_scaling(16, &naxes, &physical, 1.0, 32768.0)?;

    let mut out = bytes;
    append_ser_timestamps_bintable(&mut out, seq.timestamps())?;
    Ok(out)
}

fn ser_to_fits_multi_hdu(seq: &SerSequence) -> Result<Vec<u8>> {
    let h = &seq.header;
    let channels = h.channel_count();
    let (w, ht) = (h.width as usize, h.height as usize);
    let naxes: Vec<usize> = if channels > 1 { std::vec![w, ht, channels] } else { std::vec![w, ht] };

    let mut out = Vec::new();
    for frame_index in 0..seq.frame_count() {
        let plane = frame_plane_u16(seq, frame_index)?;
        let physical: Vec<f64> = plane.iter().map(|&p| p as f64).collect();
        let hdu_bytes = if frame_index == 0 {
            build_image_hdu_with_scaling(16, &naxes, &physical, 1.0, 32768.0)?
        } else {
            build_extension_image_hdu(&naxes, &physical, frame_index)?
        };
        out.extend_from_slice(&hdu_bytes);
    }
    append_ser_timestamps_bintable(&mut out, seq.timestamps())?;
    Ok(out)
}

fn build_extension_image_hdu(naxes: &[usize], physical: &[f64], frame_index: usize) -> Result<Vec<u8>> {
    let raw = crate::fits::image::reverse_bscale_bzero(physical, 1.0, 32768.0, 16)?;
    let mut cards = build_extension_header(ExtensionType::Image, 16, naxes, 0, 1)?;
    cards.push(Card { keyword: kw("BSCALE"), value: Some(Value::Float(1.0)), comment: None });
    cards.push(Card { keyword: kw("BZERO"), value: Some(Value::Float(32768.0)), comment: None });
    cards.push(card_int(SERFRAME_MARKER, frame_index as i64));
    let header_bytes = serialize_header(&cards)?;
    let data_bytes = crate::fits::image::serialize_image(&raw);
    let mut out = header_bytes;
    out.extend_from_slice(&data_bytes);
    Ok(out)
}

const SER_TSTP_EXTNAME: &str = "SER_TSTP";

fn append_ser_timestamps_bintable(out: &mut Vec<u8>, timestamps: &[u64]) -> Result<()> {
    if timestamps.is_empty() {
        return Ok(());
    }
    let columns = std::vec![BinaryColumnDescriptor { name: Some("TICKS".to_string()), repeat: 1, col_type: BinaryColumnType::Long, byte_width: 8 }];
    let col_data = std::vec![BinaryColumnData::Long(timestamps.iter().map(|&t| t as i64).collect())];
    let mut hdu = serialize_binary_table_hdu(&columns, &col_data, timestamps.len())?;
    // Stamp EXTNAME by reparsing and rewriting the header; simplest path
    // given the builder above doesn't expose a hook for extra cards.
    let header_len = crate::fits::header::header_byte_len(&hdu)?;
    let mut cards = crate::fits::header::parse_header_blocks(&hdu[..header_len])?;
    cards.pop(); // drop END; serialize_header re-appends it
    cards.push(card_string("EXTNAME", SER_TSTP_EXTNAME));
    let new_header = serialize_header(&cards)?;
    hdu.splice(0..header_len, new_header);
    out.extend_from_slice(&hdu);
    Ok(())
}

/// Auto-infer which [`SerFitsLayout`] a FITS file was written with (§4.L
/// "Layout auto-inference considers frame-marker cards, HDU count matching
/// the declared frame count, and shape equality among HDUs"), then convert
/// back to a [`SerSequence`]. Pass an explicit `layout` to skip inference.
pub fn fits_to_ser(fits_bytes: &[u8], layout: Option<SerFitsLayout>, header: SerHeader) -> Result<SerSequence> {
    let fits = parse_fits(fits_bytes)?;
    let layout = layout.unwrap_or_else(|| infer_layout(&fits));

    let (frame_bytes, frame_count) = match layout {
        SerFitsLayout::Cube => read_cube_frames(fits_bytes, &fits, &header)?,
        SerFitsLayout::MultiHdu => read_multi_hdu_frames(fits_bytes, &fits, &header)?,
    };

    let mut header = header;
    header.frame_count = frame_count as u32;
    let timestamps = read_ser_timestamps_bintable(fits_bytes, &fits).unwrap_or_default();
    Ok(SerSequence::from_parts(header, frame_bytes, timestamps))
}

fn infer_layout(fits: &FitsData) -> SerFitsLayout {
    let image_hdus: Vec<&Hdu> = fits.iter().filter(|h| is_image_like(&h.info)).collect();
    let has_serframe = image_hdus.iter().any(|h| h.cards.iter().any(|c| c.keyword_str() == SERFRAME_MARKER));
    if has_serframe || image_hdus.len() > 1 {
        SerFitsLayout::MultiHdu
    } else {
        SerFitsLayout::Cube
    }
}

fn read_cube_frames(fits_bytes: &[u8], fits: &FitsData, header: &SerHeader) -> Result<(Vec<u8>, usize)> {
    let hdu = fits.primary();
    let raw = read_image_data(fits_bytes, hdu)?;
    let ImageData::I16(values) = raw else {
        return Err(Error::Conversion(ConversionError("SER cube HDU is not 16-bit")));
    };
    let samples_per_frame = header.width as usize * header.height as usize * header.channel_count();
    let frame_count = if samples_per_frame == 0 { 0 } else { values.len() / samples_per_frame };
    let mut bytes = Vec::with_capacity(values.len() * header.bytes_per_sample());
    for v in values {
        let unsigned = (v as i32 + 32768) as u16;
        if header.bytes_per_sample() == 1 {
            bytes.push(unsigned as u8);
        } else {
            bytes.extend_from_slice(&unsigned.to_le_bytes());
        }
    }
    Ok((bytes, frame_count))
}

fn read_multi_hdu_frames(fits_bytes: &[u8], fits: &FitsData, header: &SerHeader) -> Result<(Vec<u8>, usize)> {
    let mut bytes = Vec::new();
    let mut frame_count = 0;
    for hdu in fits.iter().filter(|h| is_image_like(&h.info)) {
        let raw = read_image_data(fits_bytes, hdu)?;
        let ImageData::I16(values) = raw else {
            continue;
        };
        for v in values {
            let unsigned = (v as i32 + 32768) as u16;
            if header.bytes_per_sample() == 1 {
                bytes.push(unsigned as u8);
            } else {
                bytes.extend_from_slice(&unsigned.to_le_bytes());
            }
        }
        frame_count += 1;
    }
    Ok((bytes, frame_count))
}

fn read_ser_timestamps_bintable(fits_bytes: &[u8], fits: &FitsData) -> Option<Vec<u64>> {
    let hdu = fits.find_by_name(SER_TSTP_EXTNAME)?;
    let data = read_binary_column(fits_bytes, hdu, 0).ok()?;
    match data {
        BinaryColumnData::Long(v) => Some(v.into_iter().map(|t| t as u64).collect()),
        _ => None,
    }
}

// ── §4.L SER <-> XISF ──

/// Metadata property id prefix for SER-derived XISF properties (§4.L).
const SER_PREFIX: &str = "SER:";

fn ser_property_int(id: &str, value: i64) -> Property {
    Property { id: id.to_string(), ty: PropertyType::Int64, format: None, comment: None, value: PropertyValue::I64(value) }
}
fn ser_property_string(id: &str, value: String) -> Property {
    Property { id: id.to_string(), ty: PropertyType::String, format: None, comment: None, value: PropertyValue::String(value) }
}
fn ser_property_bool(id: &str, value: bool) -> Property {
    Property { id: id.to_string(), ty: PropertyType::Boolean, format: None, comment: None, value: PropertyValue::Boolean(value) }
}

/// Convert a SER sequence to an XISF `(Image, DecodedImage, metadata
/// properties)` triple (§4.L "Emits a single XISF image with geometry
/// `[w, h, frameCount]`"). All frames are concatenated along the geometry's
/// trailing axis; mono sequences use `Planar` storage, RGB/BGR use
/// `Normal` (interleaved) storage matching how SER itself stores channels.
pub fn ser_to_xisf(seq: &SerSequence) -> Result<(Image, DecodedImage, Vec<Property>)> {
    let h = &seq.header;
    let channels = h.channel_count();
    let frame_count = seq.frame_count();
    let (w, ht) = (h.width as usize, h.height as usize);

    let mut samples = Vec::with_capacity(w * ht * channels * frame_count);
    for f in 0..frame_count {
        let frame = seq.get_frame_rgb(f)?;
        samples.extend(frame.samples);
    }

    let geometry = std::vec![w, ht, frame_count];
    let pixel_storage = if channels > 1 { PixelStorage::Normal } else { PixelStorage::Planar };
    let decoded = DecodedImage::U16(samples);

    let mut image = build_xisf_image_shell(geometry, SampleFormat::UInt16);
    image.pixel_storage = pixel_storage;
    image.color_space = if channels > 1 { ColorSpace::Rgb } else { ColorSpace::Gray };

    let mut metadata = std::vec![
        ser_property_int(&std::format!("{SER_PREFIX}ColorID"), h.color_id.to_raw() as i64),
        ser_property_int(&std::format!("{SER_PREFIX}PixelDepth"), h.pixel_depth as i64),
        ser_property_int(&std::format!("{SER_PREFIX}FrameCount"), frame_count as i64),
        ser_property_int(&std::format!("{SER_PREFIX}ChannelCount"), channels as i64),
        ser_property_bool(&std::format!("{SER_PREFIX}LittleEndian"), h.raw_endian_flag == 0),
        ser_property_int(&std::format!("{SER_PREFIX}LuID"), h.lu_id as i64),
        ser_property_string(&std::format!("{SER_PREFIX}Observer"), crate::ser::unpack_ascii40(&h.observer)),
        ser_property_string(&std::format!("{SER_PREFIX}Instrument"), crate::ser::unpack_ascii40(&h.instrument)),
        ser_property_string(&std::format!("{SER_PREFIX}Telescope"), crate::ser::unpack_ascii40(&h.telescope)),
        ser_property_int(&std::format!("{SER_PREFIX}StartTime"), h.date_time as i64),
        ser_property_int(&std::format!("{SER_PREFIX}StartTimeUTC"), h.date_time_utc as i64),
    ];
    if !seq.timestamps().is_empty() {
        metadata.push(Property {
            id: std::format!("{SER_PREFIX}FrameTimestamps"),
            ty: PropertyType::UI64Vector,
            format: None,
            comment: None,
            value: PropertyValue::U64Vec(seq.timestamps().to_vec()),
        });
    }

    Ok((image, decoded, metadata))
}

fn metadata_int(metadata: &[Property], id: &str) -> Option<i64> {
    metadata.iter().find(|p| p.id == id).and_then(|p| match p.value {
        PropertyValue::I64(v) => Some(v),
        _ => None,
    })
}
fn metadata_string(metadata: &[Property], id: &str) -> Option<String> {
    metadata.iter().find(|p| p.id == id).and_then(|p| match &p.value {
        PropertyValue::String(s) => Some(s.clone()),
        _ => None,
    })
}

/// Inverse of [`ser_to_xisf`]: rebuild a [`SerSequence`] from an XISF image
/// plus its `SER:*` metadata.
pub fn xisf_to_ser(image: &Image, decoded: &DecodedImage, metadata: &[Property]) -> Result<SerSequence> {
    let DecodedImage::U16(samples) = decoded else {
        return Err(Error::Conversion(ConversionError("SER reconstruction requires a UInt16 XISF image")));
    };
    let color_id_raw = metadata_int(metadata, &std::format!("{SER_PREFIX}ColorID")).ok_or(Error::Conversion(ConversionError("missing SER:ColorID metadata")))? as i32;
    let color_id = ColorId::from_raw(color_id_raw).map_err(Error::Ser)?;
    let pixel_depth = metadata_int(metadata, &std::format!("{SER_PREFIX}PixelDepth")).unwrap_or(16) as u32;
    let lu_id = metadata_int(metadata, &std::format!("{SER_PREFIX}LuID")).unwrap_or(0) as i32;
    let little_endian = metadata.iter().find(|p| p.id == std::format!("{SER_PREFIX}LittleEndian")).map(|p| matches!(p.value, PropertyValue::Boolean(true))).unwrap_or(true);
    let date_time = metadata_int(metadata, &std::format!("{SER_PREFIX}StartTime")).unwrap_or(0) as u64;
    let date_time_utc = metadata_int(metadata, &std::format!("{SER_PREFIX}StartTimeUTC")).unwrap_or(0) as u64;

    let (w, ht, frame_count) = match image.geometry.as_slice() {
        [w, h, f] => (*w, *h, *f),
        _ => return Err(Error::Conversion(ConversionError("SER reconstruction requires a [w,h,frames] geometry"))),
    };

    let header = SerHeader {
        lu_id,
        color_id,
        raw_endian_flag: if little_endian { 0 } else { 1 },
        width: w as u32,
        height: ht as u32,
        pixel_depth,
        frame_count: frame_count as u32,
        observer: crate::ser::pack_ascii40(&metadata_string(metadata, &std::format!("{SER_PREFIX}Observer")).unwrap_or_default()),
        instrument: crate::ser::pack_ascii40(&metadata_string(metadata, &std::format!("{SER_PREFIX}Instrument")).unwrap_or_default()),
        telescope: crate::ser::pack_ascii40(&metadata_string(metadata, &std::format!("{SER_PREFIX}Telescope")).unwrap_or_default()),
        date_time,
        date_time_utc,
    };

    let bps = header.bytes_per_sample();
    let mut frame_bytes = Vec::with_capacity(samples.len() * bps);
    for &s in samples {
        if bps == 1 {
            frame_bytes.push(s as u8);
        } else if little_endian {
            frame_bytes.extend_from_slice(&s.to_le_bytes());
        } else {
            frame_bytes.extend_from_slice(&s.to_be_bytes());
        }
    }

    let timestamps = metadata
        .iter()
        .find(|p| p.id == std::format!("{SER_PREFIX}FrameTimestamps"))
        .and_then(|p| match &p.value {
            PropertyValue::U64Vec(v) => Some(v.clone()),
            _ => None,
        })
        .unwrap_or_default();

    Ok(SerSequence::from_parts(header, frame_bytes, timestamps))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ser::SerHeader as Hdr;

    fn sample_header(color: ColorId, w: u32, h: u32, depth: u32, frames: u32) -> Hdr {
        Hdr {
            lu_id: 1,
            color_id: color,
            raw_endian_flag: 0,
            width: w,
            height: h,
            pixel_depth: depth,
            frame_count: frames,
            observer: crate::ser::pack_ascii40("obs"),
            instrument: crate::ser::pack_ascii40("inst"),
            telescope: crate::ser::pack_ascii40("tel"),
            date_time: 638_000_000_000_000_000,
            date_time_utc: 638_000_000_000_000_000,
        }
    }

    fn mono_sequence() -> SerSequence {
        let header = sample_header(ColorId::Mono, 4, 3, 8, 2);
        let frame_bytes: Vec<u8> = (0u8..24).collect();
        SerSequence::from_parts(header, frame_bytes, std::vec![1_000, 1_100])
    }

    #[test]
    fn bzero_roundtrip_uint16() {
        let image = build_xisf_image_shell(std::vec![2, 2, 1], SampleFormat::UInt16);
        let pixels = DecodedImage::U16(std::vec![0, 32768, 65535, 40000]);
        let fits = xisf_image_to_fits(&image, &pixels).unwrap();
        let (_image2, decoded2) = fits_to_xisf_image(&fits).unwrap();
        assert_eq!(decoded2, pixels);
    }

    #[test]
    fn complex_image_roundtrips_through_bintable_wrapper() {
        let image = build_xisf_image_shell(std::vec![2, 1, 1], SampleFormat::Complex64);
        let pixels = DecodedImage::Complex64(std::vec![(1.5, -2.5), (3.0, 4.0)]);
        let fits = xisf_image_to_fits(&image, &pixels).unwrap();
        let (image2, decoded2) = fits_to_xisf_image(&fits).unwrap();
        assert_eq!(decoded2, pixels);
        assert_eq!(image2.sample_format, SampleFormat::Complex64);
    }

    #[test]
    fn preserved_hdu_layout_json_roundtrips() {
        let mut layout = PreservedHduLayout::default();
        layout.image_source_indices = std::vec![0, 2];
        layout.non_image_hdus.push(PreservedHdu {
            index: 1,
            cards: std::vec![card_string("EXTNAME", "AUX")],
            data: std::vec![1, 2, 3, 4, 5],
        });
        let json = layout.to_json();
        let parsed = PreservedHduLayout::from_json(&json).unwrap();
        assert_eq!(parsed.image_source_indices, std::vec![0, 2]);
        assert_eq!(parsed.non_image_hdus.len(), 1);
        assert_eq!(parsed.non_image_hdus[0].data, std::vec![1, 2, 3, 4, 5]);
        assert_eq!(parsed.non_image_hdus[0].index, 1);
    }

    #[test]
    fn ser_to_fits_cube_then_back_preserves_frames() {
        let seq = mono_sequence();
        let fits = ser_to_fits(&seq, SerFitsLayout::Cube).unwrap();
        let header = sample_header(ColorId::Mono, 4, 3, 8, 2);
        let seq2 = fits_to_ser(&fits, Some(SerFitsLayout::Cube), header).unwrap();
        assert_eq!(seq2.frame_count(), 2);
        assert_eq!(seq2.get_frame(0).unwrap().samples, seq.get_frame(0).unwrap().samples);
        assert_eq!(seq2.timestamps(), seq.timestamps());
    }

    #[test]
    fn ser_to_fits_multi_hdu_marks_serframe() {
        let seq = mono_sequence();
        let fits = ser_to_fits(&seq, SerFitsLayout::MultiHdu).unwrap();
        let parsed = parse_fits(&fits).unwrap();
        assert!(parsed.len() >= 3);
        let second = parsed.get(1).unwrap();
        assert!(second.cards.iter().any(|c| c.keyword_str() == SERFRAME_MARKER));
    }

    #[test]
    fn ser_to_xisf_and_back_preserves_metadata() {
        let seq = mono_sequence();
        let (image, decoded, metadata) = ser_to_xisf(&seq).unwrap();
        let seq2 = xisf_to_ser(&image, &decoded, &metadata).unwrap();
        assert_eq!(seq2.frame_count(), seq.frame_count());
        assert_eq!(seq2.timestamps(), seq.timestamps());
        assert_eq!(seq2.get_frame(0).unwrap().samples, seq.get_frame(0).unwrap().samples);
    }
}
