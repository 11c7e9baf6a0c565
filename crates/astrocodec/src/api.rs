//! Public entry points (§4.O): typed facades over the individual format
//! modules plus end-to-end conversion functions built on [`crate::convert`].
//!
//! Nothing here introduces new parsing/writing logic; it wires together
//! [`crate::fits`], [`crate::xisf`], [`crate::ser`], and [`crate::convert`]
//! into the shapes a caller reaches for first: "open these bytes", "give me
//! the image", "convert this file to that format".

use std::vec::Vec;

use crate::error::{ConversionError, Error, Result};
use crate::fits::hdu::{parse_fits, FitsData};
use crate::fits::image::{image_dimensions, read_image_data, ImageData};
use crate::ser::SerSequence;
use crate::xisf::datablock::resolve_data_block;
use crate::xisf::image::{DecodedImage, Image};
use crate::xisf::property::Property;
use crate::xisf::resolver::{NullResolver, ResourceResolver};
use crate::xisf::unit::{parse_header, parse_monolithic, ParsePolicy, Unit};
use crate::xisf::writer::{write_monolithic, UnitToWrite, WriterOptions};

// ── FITS facade ──

/// A parsed FITS file paired with the bytes it was parsed from, since every
/// lazy accessor ([`crate::fits::image::read_image_data`],
/// [`crate::fits::bintable::read_binary_column`], ...) needs both.
pub struct FitsFile {
    pub bytes: Vec<u8>,
    pub hdus: FitsData,
}

impl FitsFile {
    /// Parse a complete FITS byte stream.
    pub fn open(bytes: Vec<u8>) -> Result<FitsFile> {
        let hdus = parse_fits(&bytes)?;
        Ok(FitsFile { bytes, hdus })
    }

    /// Decode the primary HDU's image data, applying BSCALE/BZERO is left
    /// to the caller ([`crate::fits::image::apply_bscale_bzero`]).
    pub fn primary_image(&self) -> Result<ImageData> {
        let hdu = self.hdus.primary();
        Ok(read_image_data(&self.bytes, hdu)?)
    }

    /// Axis extents of the primary HDU.
    pub fn primary_dimensions(&self) -> Result<Vec<usize>> {
        Ok(image_dimensions(self.hdus.primary())?)
    }

    /// Decode the primary image into a typed, unsigned-widened XISF
    /// representation (§4.L), the same conversion [`to_xisf`] performs.
    pub fn to_xisf_image(&self) -> Result<(Image, DecodedImage)> {
        crate::convert::fits_to_xisf_image(&self.bytes)
    }
}

// ── XISF facade ──

/// A parsed XISF unit paired with the monolithic payload (if any), for
/// resolving `attachment:` blocks.
pub struct XisfFile {
    pub unit: Unit,
    monolithic_payload: Option<Vec<u8>>,
}

impl XisfFile {
    /// Parse a monolithic XISF file (`XISF0100` + XML header + attachments).
    /// Attachment and inline blocks resolve without any external resolver;
    /// `url:`/`path:` blocks require [`Self::open_monolithic_with_resolver`].
    pub fn open_monolithic(bytes: Vec<u8>) -> Result<XisfFile> {
        let unit = parse_monolithic(&bytes, &NullResolver, "", ParsePolicy::default(), &mut crate::error::NullSink)?;
        Ok(XisfFile { unit, monolithic_payload: Some(bytes) })
    }

    /// Parse a monolithic XISF file with an explicit resolver (for units
    /// that also carry `url:`/`path:` blocks alongside the monolithic body).
    pub fn open_monolithic_with_resolver(bytes: Vec<u8>, resolver: &dyn ResourceResolver, header_dir: &str) -> Result<XisfFile> {
        let unit = parse_monolithic(&bytes, resolver, header_dir, ParsePolicy::default(), &mut crate::error::NullSink)?;
        Ok(XisfFile { unit, monolithic_payload: Some(bytes) })
    }

    /// Parse a standalone XISF header (distributed form); every block must
    /// resolve through `resolver`.
    pub fn open_header(xml_text: &str, resolver: &dyn ResourceResolver, header_dir: &str) -> Result<XisfFile> {
        let unit = parse_header(xml_text, resolver, header_dir, ParsePolicy::default(), &mut crate::error::NullSink)?;
        Ok(XisfFile { unit, monolithic_payload: None })
    }

    /// Decode the unit's first image into typed pixels, resolving its
    /// `DataBlock` against `resolver` (pass [`NullResolver`] for
    /// attachment/inline-only units).
    pub fn decode_image(&self, index: usize, resolver: &dyn ResourceResolver) -> Result<DecodedImage> {
        let image = self.unit.images.get(index).ok_or(Error::Conversion(ConversionError("no image at that index")))?;
        let resolved = resolve_data_block(&image.data_block, self.monolithic_payload.as_deref(), resolver, "", true)?;
        Ok(image.decode_samples(&resolved)?)
    }

    /// Convert the unit's first image back to FITS (§4.L), replaying any
    /// `FITS:PreservedHDULayout` metadata if present.
    pub fn to_fits(&self) -> Result<Vec<u8>> {
        let image = self.unit.images.first().ok_or(Error::Conversion(ConversionError("unit has no images")))?;
        let decoded = self.decode_image(0, &NullResolver)?;
        let fits_bytes = crate::convert::xisf_image_to_fits(image, &decoded)?;
        match crate::convert::PreservedHduLayout::from_metadata(&self.unit.metadata) {
            Some(layout) => crate::convert::rebuild_fits_with_preserved_hdus(&[fits_bytes], &layout),
            None => Ok(fits_bytes),
        }
    }
}

/// Write a single image (plus optional metadata) as a monolithic XISF file.
pub fn write_xisf_image(image: &Image, pixels: &DecodedImage, metadata: &[Property], options: &WriterOptions) -> Result<Vec<u8>> {
    let pair = (image, pixels);
    let unit = UnitToWrite { metadata, images: core::slice::from_ref(&pair) };
    Ok(write_monolithic(&unit, options)?)
}

// ── SER facade ──

/// Parse a complete SER file with default (de facto) endianness and strict
/// validation; see [`crate::ser::SerSequence::parse_with`] for explicit
/// control over either.
pub fn open_ser(bytes: &[u8]) -> Result<SerSequence> {
    Ok(SerSequence::parse(bytes)?)
}

/// Serialize a [`SerSequence`] back to its on-disk byte layout.
pub fn write_ser(seq: &SerSequence) -> Vec<u8> {
    seq.write()
}

// ── Conversion entry points (§4.L) ──

/// FITS bytes -> a monolithic XISF file. Non-image HDUs are captured into a
/// `FITS:PreservedHDULayout` metadata property so [`xisf_to_fits`] can
/// replay them byte-for-byte.
pub fn fits_to_xisf(fits_bytes: &[u8], options: &WriterOptions) -> Result<Vec<u8>> {
    let fits = parse_fits(fits_bytes)?;
    let layout = crate::convert::capture_non_image_hdus(fits_bytes, &fits);
    let (image, decoded) = crate::convert::fits_to_xisf_image(fits_bytes)?;
    let metadata = std::vec![layout.to_property()];
    write_xisf_image(&image, &decoded, &metadata, options)
}

/// Inverse of [`fits_to_xisf`]: a monolithic XISF file -> FITS bytes, with
/// any preserved non-image HDUs interleaved back into their original
/// positions.
pub fn xisf_to_fits(xisf_bytes: &[u8]) -> Result<Vec<u8>> {
    let file = XisfFile::open_monolithic(xisf_bytes.to_vec())?;
    file.to_fits()
}

/// SER sequence -> FITS bytes, under the requested frame layout (§4.L "Two
/// layouts"). Frame timestamps travel along as a `SER_TSTP` BINTABLE.
pub fn ser_to_fits(seq: &SerSequence, layout: crate::convert::SerFitsLayout) -> Result<Vec<u8>> {
    crate::convert::ser_to_fits(seq, layout)
}

/// Inverse of [`ser_to_fits`]: FITS bytes -> a [`SerSequence`] with `header`
/// supplying the fields FITS cannot round-trip on its own (observer,
/// instrument, telescope, LuID, color layout). Pass `layout = None` to
/// auto-infer from the HDU structure.
pub fn fits_to_ser(fits_bytes: &[u8], layout: Option<crate::convert::SerFitsLayout>, header: crate::ser::SerHeader) -> Result<SerSequence> {
    crate::convert::fits_to_ser(fits_bytes, layout, header)
}

/// SER sequence -> a monolithic XISF file. Every header field and the frame
/// timestamp trailer travel as `SER:*` metadata properties.
pub fn ser_to_xisf(seq: &SerSequence, options: &WriterOptions) -> Result<Vec<u8>> {
    let (image, decoded, metadata) = crate::convert::ser_to_xisf(seq)?;
    write_xisf_image(&image, &decoded, &metadata, options)
}

/// Inverse of [`ser_to_xisf`]: a monolithic XISF file -> a [`SerSequence`],
/// reading the `SER:*` metadata properties back into a [`crate::ser::SerHeader`].
pub fn xisf_to_ser(xisf_bytes: &[u8]) -> Result<SerSequence> {
    let file = XisfFile::open_monolithic(xisf_bytes.to_vec())?;
    let image = file.unit.images.first().ok_or(Error::Conversion(ConversionError("unit has no images")))?;
    let decoded = file.decode_image(0, &NullResolver)?;
    crate::convert::xisf_to_ser(image, &decoded, &file.unit.metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ser::{pack_ascii40, ColorId, SerHeader};
    use crate::xisf::image::{ColorSpace, PixelStorage, SampleFormat};

    fn mono_sequence() -> SerSequence {
        let header = SerHeader {
            lu_id: 1,
            color_id: ColorId::Mono,
            raw_endian_flag: 0,
            width: 4,
            height: 3,
            pixel_depth: 8,
            frame_count: 2,
            observer: pack_ascii40("obs"),
            instrument: pack_ascii40("inst"),
            telescope: pack_ascii40("tel"),
            date_time: 638_000_000_000_000_000,
            date_time_utc: 638_000_000_000_000_000,
        };
        let frame_bytes: Vec<u8> = (0u8..24).collect();
        SerSequence::from_parts(header, frame_bytes, std::vec![1_000, 1_100])
    }

    fn sample_image() -> Image {
        Image {
            geometry: std::vec![2, 2, 1],
            sample_format: SampleFormat::UInt16,
            pixel_storage: PixelStorage::Planar,
            color_space: ColorSpace::Gray,
            bounds: None,
            orientation: None,
            offset: None,
            data_block: crate::xisf::datablock::DataBlock {
                location: crate::xisf::datablock::Location::Inline { hex: false },
                byte_order_little_endian: true,
                checksum: None,
                compression: None,
                inline_text: None,
            },
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

    #[test]
    fn fits_file_opens_and_decodes_primary() {
        let image = sample_image();
        let pixels = DecodedImage::U16(std::vec![0, 32768, 65535, 40000]);
        let fits_bytes = crate::convert::xisf_image_to_fits(&image, &pixels).unwrap();
        let file = FitsFile::open(fits_bytes).unwrap();
        assert_eq!(file.primary_dimensions().unwrap(), std::vec![2, 2, 1]);
        let (_image2, decoded2) = file.to_xisf_image().unwrap();
        assert_eq!(decoded2, pixels);
    }

    #[test]
    fn write_and_open_xisf_image_round_trips() {
        let image = sample_image();
        let pixels = DecodedImage::U16(std::vec![1, 2, 3, 4]);
        let options = WriterOptions { checksum_algorithm: None, ..Default::default() };
        let bytes = write_xisf_image(&image, &pixels, &[], &options).unwrap();

        let file = XisfFile::open_monolithic(bytes).unwrap();
        let decoded = file.decode_image(0, &NullResolver).unwrap();
        assert_eq!(decoded, pixels);
    }

    #[test]
    fn fits_to_xisf_to_fits_round_trips() {
        let image = sample_image();
        let pixels = DecodedImage::U16(std::vec![10, 20, 30, 40]);
        let fits_bytes = crate::convert::xisf_image_to_fits(&image, &pixels).unwrap();
        let options = WriterOptions { checksum_algorithm: None, ..Default::default() };
        let xisf_bytes = fits_to_xisf(&fits_bytes, &options).unwrap();
        let fits_bytes2 = xisf_to_fits(&xisf_bytes).unwrap();

        let file = FitsFile::open(fits_bytes2).unwrap();
        let (_image2, decoded2) = file.to_xisf_image().unwrap();
        assert_eq!(decoded2, pixels);
    }

    #[test]
    fn ser_to_xisf_to_ser_round_trips() {
        let seq = mono_sequence();
        let options = WriterOptions { checksum_algorithm: None, ..Default::default() };
        let xisf_bytes = ser_to_xisf(&seq, &options).unwrap();
        let seq2 = xisf_to_ser(&xisf_bytes).unwrap();
        assert_eq!(seq2.frame_count(), seq.frame_count());
        assert_eq!(seq2.timestamps(), seq.timestamps());
        assert_eq!(seq2.get_frame(0).unwrap().samples, seq.get_frame(0).unwrap().samples);
    }

    #[test]
    fn ser_to_fits_and_back_via_open_ser_write_ser() {
        let seq = mono_sequence();
        let fits_bytes = ser_to_fits(&seq, crate::convert::SerFitsLayout::Cube).unwrap();
        let header = SerHeader { frame_count: 0, ..seq.header };
        let seq2 = fits_to_ser(&fits_bytes, Some(crate::convert::SerFitsLayout::Cube), header).unwrap();
        let written = write_ser(&seq2);
        let reopened = open_ser(&written).unwrap();
        assert_eq!(reopened.frame_count(), seq.frame_count());
    }
}
