//! Converts a parsed XML arena (§4.G) into the typed [`Unit`] tree: the
//! top-level object this crate's callers actually work with.

use std::string::String;
use std::vec::Vec;

use crate::error::{XisfError as Error, XisfResult as Result, Warning, WarningSink};
use crate::xisf::datablock::{
    resolve_data_block, Checksum, ChecksumAlgorithm, Compression, DataBlock, Location,
};
use crate::xisf::image::{ColorSpace, FitsKeyword, Image, PixelStorage, SampleFormat};
use crate::xisf::property::{Property, PropertyType, PropertyValue};
use crate::xisf::resolver::ResourceResolver;
use crate::xisf::signature::{verify as verify_signature, SignaturePolicy, SignatureVerdict};
use crate::xisf::table::{Table, TableColumn};
use crate::xisf::xml::{self, NodeRef, XmlArena, XmlNode};

/// Parsing policy for an XISF unit: strictness and how `<Signature>`
/// verification failures are handled.
#[derive(Debug, Clone, Copy)]
pub struct ParsePolicy {
    pub strict: bool,
    pub signature: SignaturePolicy,
}

impl Default for ParsePolicy {
    fn default() -> Self {
        ParsePolicy { strict: true, signature: SignaturePolicy::Require }
    }
}

/// A fully decoded XISF unit: metadata, images, standalone properties and
/// tables, and the verdict of verifying any embedded signature (§3).
#[derive(Debug, Clone)]
pub struct Unit {
    pub version: String,
    pub metadata: Vec<Property>,
    pub images: Vec<Image>,
    pub properties: Vec<Property>,
    pub tables: Vec<Table>,
    pub signature: SignatureVerdict,
}

/// Parse a monolithic XISF file (`XISF0100` + XML header + attachments).
pub fn parse_monolithic(
    file: &[u8],
    resolver: &dyn ResourceResolver,
    header_dir: &str,
    policy: ParsePolicy,
    warnings: &mut dyn WarningSink,
) -> Result<Unit> {
    let monolithic = crate::xisf::container::parse_monolithic(file)?;
    let arena = xml::parse(monolithic.xml)?;
    parse_from_arena(&arena, Some(monolithic.buffer), resolver, header_dir, policy, warnings)
}

/// Parse a standalone XML header (distributed XISF: pixel/table data lives
/// in external files addressed by `url:`/`path:` locations).
pub fn parse_header(
    xml_text: &str,
    resolver: &dyn ResourceResolver,
    header_dir: &str,
    policy: ParsePolicy,
    warnings: &mut dyn WarningSink,
) -> Result<Unit> {
    let arena = xml::parse(xml_text)?;
    parse_from_arena(&arena, None, resolver, header_dir, policy, warnings)
}

fn parse_from_arena(
    arena: &XmlArena,
    monolithic_payload: Option<&[u8]>,
    resolver: &dyn ResourceResolver,
    header_dir: &str,
    policy: ParsePolicy,
    warnings: &mut dyn WarningSink,
) -> Result<Unit> {
    let root = arena.get(arena.root);
    let version = root.attr("version").unwrap_or("1.0").to_string();

    let mut metadata = Vec::new();
    let mut images = Vec::new();
    let mut properties = Vec::new();
    let mut tables = Vec::new();
    let mut signature_idx: Option<NodeRef> = None;

    for &child_idx in &root.children {
        let child = arena.get(child_idx);
        match child.tag.as_str() {
            "Metadata" => {
                for prop_idx in arena.children_named(child_idx, "Property") {
                    metadata.push(decode_property(arena, prop_idx, monolithic_payload, resolver, header_dir, policy.strict)?);
                }
            }
            "Image" => images.push(decode_image(arena, child_idx, monolithic_payload, resolver, header_dir, policy.strict)?),
            "Property" => properties.push(decode_property(arena, child_idx, monolithic_payload, resolver, header_dir, policy.strict)?),
            "Table" => tables.push(decode_table(arena, child_idx)?),
            "Signature" => signature_idx = Some(child_idx),
            _ => {}
        }
    }

    let signature = match signature_idx {
        None => SignatureVerdict::NotPresent,
        Some(idx) => verify_signature(arena, idx, policy.signature)?,
    };

    let signature_requires_checksums = !matches!(signature, SignatureVerdict::NotPresent | SignatureVerdict::Ignored);
    if signature_requires_checksums {
        check_external_blocks_have_checksums(&images, &tables, &metadata, &properties, policy.strict, warnings)?;
    }

    Ok(Unit { version, metadata, images, properties, tables, signature })
}

fn check_external_blocks_have_checksums(
    images: &[Image],
    tables: &[Table],
    metadata: &[Property],
    properties: &[Property],
    strict: bool,
    warnings: &mut dyn WarningSink,
) -> Result<()> {
    let mut missing = false;
    for image in images {
        if is_external(&image.data_block.location) && image.data_block.checksum.is_none() {
            missing = true;
        }
    }
    for table in tables {
        if is_external(&table.data_block.location) && table.data_block.checksum.is_none() {
            missing = true;
        }
    }
    let _ = (metadata, properties);
    if missing {
        if strict {
            return Err(Error::Signature("signed unit has an external data block without a checksum"));
        }
        warnings.warn(Warning::Generic("signed unit has an external data block without a checksum".into()));
    }
    Ok(())
}

fn is_external(location: &Location) -> bool {
    matches!(location, Location::Url { .. } | Location::Path { .. })
}

/// Parse the `location="..."` grammar (§6).
fn parse_location(s: &str) -> Result<Location> {
    if let Some(rest) = s.strip_prefix("inline:") {
        return Ok(match rest {
            "base64" => Location::Inline { hex: false },
            "hex" => Location::Inline { hex: true },
            _ => return Err(Error::Format("unknown inline encoding")),
        });
    }
    if s == "embedded" {
        return Ok(Location::Embedded { hex: false });
    }
    if let Some(rest) = s.strip_prefix("attachment:") {
        let mut parts = rest.splitn(2, ':');
        let position: u64 = parts.next().unwrap_or("").parse().map_err(|_| Error::Format("malformed attachment position"))?;
        let size: u64 = parts.next().ok_or(Error::Format("attachment location missing size"))?.parse().map_err(|_| Error::Format("malformed attachment size"))?;
        return Ok(Location::Attachment { position, size });
    }
    if let Some(rest) = s.strip_prefix("url(") {
        let (url, tail) = split_paren(rest)?;
        let index_id = parse_optional_hex_id(tail)?;
        return Ok(Location::Url { url: url.to_string(), index_id });
    }
    if let Some(rest) = s.strip_prefix("path(") {
        let (path, tail) = split_paren(rest)?;
        let index_id = parse_optional_hex_id(tail)?;
        return Ok(Location::Path { path: path.to_string(), index_id });
    }
    Err(Error::Format("unrecognized location grammar"))
}

fn split_paren(rest: &str) -> Result<(&str, &str)> {
    let close = rest.find(')').ok_or(Error::Format("unterminated url()/path() in location"))?;
    Ok((&rest[..close], &rest[close + 1..]))
}

fn parse_optional_hex_id(tail: &str) -> Result<Option<u64>> {
    match tail.strip_prefix(':') {
        None => Ok(None),
        Some(hex) => u64::from_str_radix(hex, 16).map(Some).map_err(|_| Error::Format("malformed hexId suffix")),
    }
}

fn build_data_block(node: &XmlNode) -> Result<DataBlock> {
    let location_str = node.attr("location").ok_or(Error::Validation("element has a data payload but no location attribute"))?;
    let location = parse_location(location_str)?;
    let byte_order_little_endian = match node.attr("byteOrder") {
        Some("big") => false,
        _ => true,
    };
    let checksum = match node.attr("checksum") {
        None => None,
        Some(spec) => {
            let (alg, digest) = spec.split_once(':').ok_or(Error::Format("malformed checksum attribute"))?;
            let algorithm = ChecksumAlgorithm::parse(alg).ok_or(Error::Format("unknown checksum algorithm"))?;
            Some(Checksum { algorithm, digest_hex: digest.to_string() })
        }
    };
    let compression = match node.attr("compression") {
        None => None,
        Some(spec) => {
            let mut parts = spec.split(':');
            let codec_str = parts.next().ok_or(Error::Format("empty compression attribute"))?;
            let (codec, shuffled) = Compression::parse_codec(codec_str).ok_or(Error::Format("unknown compression codec"))?;
            let uncompressed_size: u64 = parts.next().ok_or(Error::Format("compression attribute missing size"))?.parse().map_err(|_| Error::Format("malformed compression size"))?;
            let item_size = match parts.next() {
                Some(s) => Some(s.parse::<usize>().map_err(|_| Error::Format("malformed compression itemSize"))?),
                None => None,
            };
            Some(Compression { codec, shuffled, uncompressed_size, item_size })
        }
    };
    let inline_text = matches!(location, Location::Inline { .. } | Location::Embedded { .. }).then(|| node.text.clone());
    Ok(DataBlock { location, byte_order_little_endian, checksum, compression, inline_text })
}

fn decode_property(
    arena: &XmlArena,
    idx: NodeRef,
    monolithic_payload: Option<&[u8]>,
    resolver: &dyn ResourceResolver,
    header_dir: &str,
    strict: bool,
) -> Result<Property> {
    let node = arena.resolve(idx)?;
    let id = node.attr("id").ok_or(Error::Validation("Property missing id"))?.to_string();
    let ty = PropertyType::parse(node.attr("type").ok_or(Error::Validation("Property missing type"))?)
        .ok_or(Error::Validation("Property has an unrecognized type"))?;
    let format = node.attr("format").map(String::from);
    let comment = node.attr("comment").map(String::from);

    let value = if node.attr("location").is_some() {
        let block = build_data_block(node)?;
        let resolved = resolve_data_block(&block, monolithic_payload, resolver, header_dir, strict)?;
        decode_block_value(ty, &resolved, node, block.byte_order_little_endian)?
    } else if let Some(v) = node.attr("value") {
        decode_scalar_attr(ty, v)?
    } else {
        decode_inline_scalar(ty, &node.text)?
    };

    Ok(Property { id, ty, format, comment, value })
}

fn decode_scalar_attr(ty: PropertyType, v: &str) -> Result<PropertyValue> {
    let bad = || Error::Validation("Property value attribute does not match its type");
    Ok(match ty {
        PropertyType::Boolean => PropertyValue::Boolean(v == "true" || v == "1"),
        PropertyType::Int8 => PropertyValue::I8(v.parse().map_err(|_| bad())?),
        PropertyType::UInt8 => PropertyValue::U8(v.parse().map_err(|_| bad())?),
        PropertyType::Int16 => PropertyValue::I16(v.parse().map_err(|_| bad())?),
        PropertyType::UInt16 => PropertyValue::U16(v.parse().map_err(|_| bad())?),
        PropertyType::Int32 => PropertyValue::I32(v.parse().map_err(|_| bad())?),
        PropertyType::UInt32 => PropertyValue::U32(v.parse().map_err(|_| bad())?),
        PropertyType::Int64 => PropertyValue::I64(v.parse().map_err(|_| bad())?),
        PropertyType::UInt64 => PropertyValue::U64(v.parse().map_err(|_| bad())?),
        PropertyType::Float32 => PropertyValue::F32(v.parse().map_err(|_| bad())?),
        PropertyType::Float64 => PropertyValue::F64(v.parse().map_err(|_| bad())?),
        PropertyType::Complex32 | PropertyType::Complex64 => {
            let (re, im) = v.split_once(',').ok_or(bad())?;
            let re: f64 = re.parse().map_err(|_| bad())?;
            let im: f64 = im.parse().map_err(|_| bad())?;
            if ty == PropertyType::Complex32 {
                PropertyValue::Complex32(re as f32, im as f32)
            } else {
                PropertyValue::Complex64(re, im)
            }
        }
        PropertyType::String | PropertyType::TimePoint => PropertyValue::String(v.to_string()),
        _ => return Err(Error::Validation("vector/matrix Property must use a DataBlock, not a value attribute")),
    })
}

fn decode_inline_scalar(ty: PropertyType, text: &str) -> Result<PropertyValue> {
    match ty {
        PropertyType::String => Ok(PropertyValue::String(text.to_string())),
        PropertyType::TimePoint => Ok(PropertyValue::TimePoint(text.to_string())),
        _ => Err(Error::Validation("Property has neither a location, value attribute, nor usable element text")),
    }
}

fn decode_block_value(ty: PropertyType, resolved: &[u8], node: &XmlNode, le: bool) -> Result<PropertyValue> {
    let length: usize = node.attr("length").and_then(|s| s.parse().ok()).unwrap_or(0);
    let rows: usize = node.attr("rows").and_then(|s| s.parse().ok()).unwrap_or(0);
    let columns: usize = node.attr("columns").and_then(|s| s.parse().ok()).unwrap_or(0);

    macro_rules! decode_vec {
        ($elem_ty:ty, $from_bytes:expr) => {{
            let width = core::mem::size_of::<$elem_ty>();
            if resolved.len() != length * width {
                return Err(Error::Validation("decoded vector length does not match the declared length"));
            }
            resolved.chunks_exact(width).map(|c| ($from_bytes)(c, le)).collect::<Vec<_>>()
        }};
    }

    Ok(match ty {
        PropertyType::I8Vector => PropertyValue::I8Vec(decode_vec!(i8, |c: &[u8], _le: bool| c[0] as i8)),
        PropertyType::UI8Vector => PropertyValue::U8Vec(resolved.to_vec()),
        PropertyType::I16Vector => PropertyValue::I16Vec(decode_vec!(i16, |c: &[u8], le: bool| if le {
            i16::from_le_bytes([c[0], c[1]])
        } else {
            i16::from_be_bytes([c[0], c[1]])
        })),
        PropertyType::UI16Vector => PropertyValue::U16Vec(decode_vec!(u16, |c: &[u8], le: bool| if le {
            u16::from_le_bytes([c[0], c[1]])
        } else {
            u16::from_be_bytes([c[0], c[1]])
        })),
        PropertyType::I32Vector => PropertyValue::I32Vec(decode_vec!(i32, |c: &[u8], le: bool| {
            let a: [u8; 4] = c.try_into().unwrap();
            if le { i32::from_le_bytes(a) } else { i32::from_be_bytes(a) }
        })),
        PropertyType::UI32Vector => PropertyValue::U32Vec(decode_vec!(u32, |c: &[u8], le: bool| {
            let a: [u8; 4] = c.try_into().unwrap();
            if le { u32::from_le_bytes(a) } else { u32::from_be_bytes(a) }
        })),
        PropertyType::I64Vector => PropertyValue::I64Vec(decode_vec!(i64, |c: &[u8], le: bool| {
            let a: [u8; 8] = c.try_into().unwrap();
            if le { i64::from_le_bytes(a) } else { i64::from_be_bytes(a) }
        })),
        PropertyType::UI64Vector => PropertyValue::U64Vec(decode_vec!(u64, |c: &[u8], le: bool| {
            let a: [u8; 8] = c.try_into().unwrap();
            if le { u64::from_le_bytes(a) } else { u64::from_be_bytes(a) }
        })),
        PropertyType::F32Vector => PropertyValue::F32Vec(decode_vec!(f32, |c: &[u8], le: bool| {
            let a: [u8; 4] = c.try_into().unwrap();
            if le { f32::from_le_bytes(a) } else { f32::from_be_bytes(a) }
        })),
        PropertyType::F64Vector => PropertyValue::F64Vec(decode_vec!(f64, |c: &[u8], le: bool| {
            let a: [u8; 8] = c.try_into().unwrap();
            if le { f64::from_le_bytes(a) } else { f64::from_be_bytes(a) }
        })),
        PropertyType::Complex32Vector => {
            let width = 8;
            if resolved.len() != length * width {
                return Err(Error::Validation("decoded complex vector length mismatch"));
            }
            PropertyValue::Complex32Vec(
                resolved
                    .chunks_exact(width)
                    .map(|c| {
                        let re: [u8; 4] = c[0..4].try_into().unwrap();
                        let im: [u8; 4] = c[4..8].try_into().unwrap();
                        if le {
                            (f32::from_le_bytes(re), f32::from_le_bytes(im))
                        } else {
                            (f32::from_be_bytes(re), f32::from_be_bytes(im))
                        }
                    })
                    .collect(),
            )
        }
        PropertyType::Complex64Vector => {
            let width = 16;
            if resolved.len() != length * width {
                return Err(Error::Validation("decoded complex vector length mismatch"));
            }
            PropertyValue::Complex64Vec(
                resolved
                    .chunks_exact(width)
                    .map(|c| {
                        let re: [u8; 8] = c[0..8].try_into().unwrap();
                        let im: [u8; 8] = c[8..16].try_into().unwrap();
                        if le {
                            (f64::from_le_bytes(re), f64::from_le_bytes(im))
                        } else {
                            (f64::from_be_bytes(re), f64::from_be_bytes(im))
                        }
                    })
                    .collect(),
            )
        }
        PropertyType::Matrix => {
            let width = 8;
            if resolved.len() != rows * columns * width {
                return Err(Error::Validation("decoded matrix size does not match rows*columns"));
            }
            let data = resolved
                .chunks_exact(width)
                .map(|c| {
                    let a: [u8; 8] = c.try_into().unwrap();
                    if le {
                        f64::from_le_bytes(a)
                    } else {
                        f64::from_be_bytes(a)
                    }
                })
                .collect();
            PropertyValue::Matrix { rows, columns, data }
        }
        PropertyType::String => PropertyValue::String(String::from_utf8_lossy(resolved).to_string()),
        PropertyType::TimePoint => PropertyValue::TimePoint(String::from_utf8_lossy(resolved).to_string()),
        _ => return Err(Error::Validation("scalar Property unexpectedly carries a DataBlock")),
    })
}

fn decode_image(
    arena: &XmlArena,
    idx: NodeRef,
    monolithic_payload: Option<&[u8]>,
    resolver: &dyn ResourceResolver,
    header_dir: &str,
    strict: bool,
) -> Result<Image> {
    let node = arena.get(idx);
    let geometry: Vec<usize> = node
        .attr("geometry")
        .ok_or(Error::Validation("Image missing geometry"))?
        .split(':')
        .map(|s| s.parse().map_err(|_| Error::Validation("Image geometry component is not a non-negative integer")))
        .collect::<Result<_>>()?;
    let sample_format = SampleFormat::parse(node.attr("sampleFormat").ok_or(Error::Validation("Image missing sampleFormat"))?)
        .ok_or(Error::Validation("Image has an unrecognized sampleFormat"))?;
    let pixel_storage = match node.attr("pixelStorage") {
        Some("Normal") => PixelStorage::Normal,
        _ => PixelStorage::Planar,
    };
    let color_space = node.attr("colorSpace").and_then(ColorSpace::parse).unwrap_or_default();
    let bounds = node.attr("bounds").and_then(|s| {
        let (lo, hi) = s.split_once(':')?;
        Some((lo.parse().ok()?, hi.parse().ok()?))
    });
    let orientation = node.attr("orientation").map(String::from);
    let offset = node.attr("offset").and_then(|s| s.parse().ok());
    let data_block = build_data_block(node)?;
    let id = node.attr("id").map(String::from);

    let mut icc_profile = None;
    let mut rgb_working_space = None;
    let mut display_function = None;
    let mut color_filter_array = node.attr("colorFilterArray").map(String::from);
    let mut resolution = None;
    let mut thumbnail = None;
    let mut properties = Vec::new();
    let mut tables = Vec::new();
    let mut fits_keywords = Vec::new();

    for &child_idx in &node.children {
        let child = arena.get(child_idx);
        match child.tag.as_str() {
            "ICCProfile" => icc_profile = Some(build_data_block(child)?),
            "RGBWorkingSpace" => rgb_working_space = Some(child.attrs.clone()),
            "DisplayFunction" => {
                display_function = Some(child.attrs.iter().filter_map(|(_, v)| v.parse::<f64>().ok()).collect())
            }
            "ColorFilterArray" => {
                if let Some(pattern) = child.attr("pattern") {
                    color_filter_array = Some(pattern.to_string());
                }
            }
            "Resolution" => {
                let h: f64 = child.attr("horizontal").and_then(|s| s.parse().ok()).unwrap_or(0.0);
                let v: f64 = child.attr("vertical").and_then(|s| s.parse().ok()).unwrap_or(0.0);
                let unit = child.attr("unit").unwrap_or("inch").to_string();
                resolution = Some((h, v, unit));
            }
            "Thumbnail" => thumbnail = Some(Box::new(decode_image(arena, child_idx, monolithic_payload, resolver, header_dir, strict)?)),
            "Property" => properties.push(decode_property(arena, child_idx, monolithic_payload, resolver, header_dir, strict)?),
            "Table" => tables.push(decode_table(arena, child_idx)?),
            "FITSKeyword" => fits_keywords.push(FitsKeyword {
                name: child.attr("name").unwrap_or("").to_string(),
                value: child.attr("value").unwrap_or("").to_string(),
                comment: child.attr("comment").unwrap_or("").to_string(),
            }),
            _ => {}
        }
    }

    Ok(Image {
        geometry,
        sample_format,
        pixel_storage,
        color_space,
        bounds,
        orientation,
        offset,
        data_block,
        icc_profile,
        rgb_working_space,
        display_function,
        color_filter_array,
        resolution,
        thumbnail,
        properties,
        tables,
        fits_keywords,
        id,
    })
}

fn decode_table(arena: &XmlArena, idx: NodeRef) -> Result<Table> {
    let node = arena.get(idx);
    let rows: usize = node.attr("rows").ok_or(Error::Validation("Table missing rows"))?.parse().map_err(|_| Error::Validation("Table rows is not an integer"))?;
    let id = node.attr("id").map(String::from);
    let mut columns = Vec::new();
    for child_idx in arena.children_named(idx, "TableColumn").collect::<Vec<_>>() {
        let col = arena.get(child_idx);
        let ty = PropertyType::parse(col.attr("type").ok_or(Error::Validation("TableColumn missing type"))?)
            .ok_or(Error::Validation("TableColumn has an unrecognized type"))?;
        columns.push(TableColumn {
            id: col.attr("id").unwrap_or("").to_string(),
            ty,
            format: col.attr("format").map(String::from),
        });
    }
    let data_block = build_data_block(node)?;
    Ok(Table { id, rows, columns, data_block })
}
