//! XISF header XML emission and data block placement (§4.J).
//!
//! Small blocks are inlined as base64 directly in the XML; larger ones are
//! placed in the attachment region (4096-byte aligned by default) and
//! addressed back with `attachment:<pos>:<size>`. [`write_distributed`]
//! instead writes a standalone header plus an XISB sidecar, referenced with
//! `path(@header_dir/...):<hexId>`.

use std::string::String;
use std::vec::Vec;

use crate::error::{XisfError as Error, XisfResult as Result};
use crate::xisf::container::{write_monolithic_prefix, write_xisb_index, XisbEntry, MONOLITHIC_PREFIX_LEN, NODE_HEADER_LEN, XISB_ENTRY_LEN, XISB_PREFIX_LEN};
use crate::xisf::datablock::ChecksumAlgorithm;
use crate::xisf::image::{encode_samples, DecodedImage, Image};
use crate::xisf::property::{Property, PropertyValue};

/// Controls how the writer places data blocks.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Blocks at or under this size are inlined as base64 in the XML header
    /// instead of attached or externalized.
    pub max_inline_block_size: usize,
    /// Byte alignment for block placement (monolithic attachments or XISB blocks).
    pub attachment_alignment: usize,
    /// When `Some`, non-inlined blocks go to an XISB sidecar whose filename
    /// (relative to `@header_dir/`) is this path; see [`write_distributed`].
    pub distributed_blocks_path: Option<String>,
    /// Checksum algorithm applied to every written block, or `None` to omit.
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            max_inline_block_size: 3072,
            attachment_alignment: 4096,
            distributed_blocks_path: None,
            checksum_algorithm: Some(ChecksumAlgorithm::Sha256),
        }
    }
}

/// A raw payload placed in the monolithic attachment region. Every pending
/// block shares the same placeholder text (see [`placeholder_location`]), so
/// `place_attachments` substitutes them in document order.
struct PendingBlock {
    bytes: Vec<u8>,
}

/// A raw payload placed in an XISB sidecar, keyed by the `uniqueId` already
/// burned into the XML's `path(...):<hexId>` location text.
struct PendingXisbBlock {
    unique_id: u64,
    bytes: Vec<u8>,
}

/// Minimal unit-of-work for the writer: images plus standalone metadata
/// properties. Tables and signatures are intentionally out of this writer's
/// scope (see DESIGN.md); callers needing them compose XML manually around
/// [`write_monolithic`]'s output.
pub struct UnitToWrite<'a> {
    pub metadata: &'a [Property],
    pub images: &'a [(&'a Image, &'a DecodedImage)],
}

impl UnitToWrite<'_> {
    fn version_string(&self) -> &'static str {
        "1.0"
    }
}

/// Where a just-placed block's bytes ended up, and what the referencing
/// element's attributes/text should carry.
struct BlockAttrs {
    location: String,
    checksum: Option<String>,
    /// `Some(base64)` for inlined blocks, which must be emitted as the
    /// element's text content rather than a self-closing tag.
    inline_body: Option<String>,
}

/// Write a monolithic XISF file for `unit`, returning the complete bytes.
/// `options.distributed_blocks_path` must be `None`; use [`write_distributed`]
/// for a standalone header + XISB sidecar pair.
pub fn write_monolithic(unit: &UnitToWrite<'_>, options: &WriterOptions) -> Result<Vec<u8>> {
    if options.distributed_blocks_path.is_some() {
        return Err(Error::Validation("write_monolithic does not accept distributed_blocks_path; call write_distributed"));
    }
    let mut pending: Vec<PendingBlock> = Vec::new();
    let mut xisb_pending: Vec<PendingXisbBlock> = Vec::new();
    let mut next_uid: u64 = 1;

    let body = emit_body(unit, options, &mut pending, &mut xisb_pending, &mut next_uid)?;
    let (xml, attachments) = place_attachments(&body, &pending, options.attachment_alignment, unit.version_string());
    Ok(assemble(&xml, &attachments))
}

/// Write a distributed unit: a standalone XML header plus an XISB sidecar
/// blob carrying every non-inlined block. The caller is responsible for
/// writing both to storage (the header typically as `<name>.xisf`, the
/// sidecar at `options.distributed_blocks_path`).
pub fn write_distributed(unit: &UnitToWrite<'_>, options: &WriterOptions) -> Result<(String, Vec<u8>)> {
    if options.distributed_blocks_path.is_none() {
        return Err(Error::Validation("write_distributed requires distributed_blocks_path"));
    }
    let mut pending: Vec<PendingBlock> = Vec::new();
    let mut xisb_pending: Vec<PendingXisbBlock> = Vec::new();
    let mut next_uid: u64 = 1;

    let body = emit_body(unit, options, &mut pending, &mut xisb_pending, &mut next_uid)?;
    let xml = finalize_distributed(&body, unit.version_string());
    let blob = assemble_xisb(&xisb_pending, options.attachment_alignment);
    Ok((xml, blob))
}

fn emit_body(
    unit: &UnitToWrite<'_>,
    options: &WriterOptions,
    pending: &mut Vec<PendingBlock>,
    xisb_pending: &mut Vec<PendingXisbBlock>,
    next_uid: &mut u64,
) -> Result<String> {
    let mut body = String::new();
    body.push_str("<Metadata>\n");
    for prop in unit.metadata {
        body.push_str(&emit_property(prop, options, pending, xisb_pending, next_uid)?);
    }
    body.push_str("</Metadata>\n");

    for (image, pixels) in unit.images {
        body.push_str(&emit_image(image, pixels, options, pending, xisb_pending, next_uid)?);
    }
    Ok(body)
}

/// Digit width the writer zero-pads `attachment:<pos>:<size>` fields to.
/// Fixing the width means substituting real offsets never changes the XML
/// header's byte length, so the header length (and therefore every
/// attachment's absolute file position, computed below) can be settled
/// before any position is known.
const POS_WIDTH: usize = 12;

fn placeholder_location() -> String {
    std::format!("attachment:{:0w$}:{:0w$}", 0, 0, w = POS_WIDTH)
}

fn place_attachments(body: &str, pending: &[PendingBlock], alignment: usize, version: &str) -> (String, Vec<u8>) {
    let xml_with_placeholders = std::format!("<xisf version=\"{version}\" xmlns=\"http://www.pixinsight.com/xisf\">\n{body}</xisf>");
    let header_len = xml_with_placeholders.len();
    let attachment_region_base = MONOLITHIC_PREFIX_LEN + header_len;

    let mut xml = xml_with_placeholders;
    let mut offset = attachment_region_base;
    let mut attachments = Vec::new();

    for block in pending {
        let pos = align_up(offset, alignment);
        let size = block.bytes.len();
        let location = std::format!("attachment:{:0w$}:{:0w$}", pos, size, w = POS_WIDTH);
        xml = xml.replacen(&placeholder_location(), &location, 1);

        let region_offset = pos - attachment_region_base;
        attachments.resize(region_offset, 0);
        attachments.extend_from_slice(&block.bytes);
        offset = pos + size;
    }
    (xml, attachments)
}

/// Lay out an XISB sidecar: signature + reserved bytes + one index node
/// covering every pending block, then the blocks themselves at the
/// `block_position` each entry records. Unlike the monolithic header, the
/// index's byte length is known up front (it's a fixed 40 bytes per entry),
/// so block positions don't need the placeholder trick.
fn assemble_xisb(pending: &[PendingXisbBlock], alignment: usize) -> Vec<u8> {
    let index_len = NODE_HEADER_LEN + pending.len() * XISB_ENTRY_LEN;
    let base = XISB_PREFIX_LEN + index_len;

    let mut entries = Vec::with_capacity(pending.len());
    let mut blocks = Vec::new();
    let mut offset = base;
    for block in pending {
        let pos = align_up(offset, alignment);
        entries.push(XisbEntry {
            unique_id: block.unique_id,
            block_position: pos as u64,
            block_length: block.bytes.len() as u64,
            uncompressed_block_length: block.bytes.len() as u64,
            free: 0,
        });
        let region_offset = pos - base;
        blocks.resize(region_offset, 0);
        blocks.extend_from_slice(&block.bytes);
        offset = pos + block.bytes.len();
    }

    let mut out = write_xisb_index(&entries);
    out.extend_from_slice(&blocks);
    out
}

fn align_up(offset: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return offset;
    }
    offset.div_ceil(alignment) * alignment
}

fn assemble(xml: &str, attachments: &[u8]) -> Vec<u8> {
    let mut out = write_monolithic_prefix(xml);
    out.extend_from_slice(attachments);
    out
}

fn finalize_distributed(body: &str, version: &str) -> String {
    std::format!("<xisf version=\"{version}\" xmlns=\"http://www.pixinsight.com/xisf\">\n{body}</xisf>")
}

/// Place `bytes` according to `options` (inline / attachment / XISB),
/// computing the `location` (and optional `checksum`) attribute text.
fn place_value_block(
    bytes: Vec<u8>,
    options: &WriterOptions,
    pending: &mut Vec<PendingBlock>,
    xisb_pending: &mut Vec<PendingXisbBlock>,
    next_uid: &mut u64,
) -> BlockAttrs {
    let checksum = options.checksum_algorithm.map(|alg| {
        let digest = alg.digest(&bytes);
        std::format!("{}:{}", alg.as_str(), hex(&digest))
    });

    if bytes.len() <= options.max_inline_block_size {
        use base64::Engine;
        let inline_body = base64::engine::general_purpose::STANDARD.encode(&bytes);
        return BlockAttrs { location: "inline:base64".to_string(), checksum, inline_body: Some(inline_body) };
    }

    if let Some(path) = &options.distributed_blocks_path {
        let uid = *next_uid;
        *next_uid += 1;
        xisb_pending.push(PendingXisbBlock { unique_id: uid, bytes });
        BlockAttrs { location: std::format!("path(@header_dir/{path}):{uid:x}"), checksum, inline_body: None }
    } else {
        pending.push(PendingBlock { bytes });
        BlockAttrs { location: placeholder_location(), checksum, inline_body: None }
    }
}

fn emit_property(
    prop: &Property,
    options: &WriterOptions,
    pending: &mut Vec<PendingBlock>,
    xisb_pending: &mut Vec<PendingXisbBlock>,
    next_uid: &mut u64,
) -> Result<String> {
    let ty = prop.ty.as_str();
    match &prop.value {
        PropertyValue::String(s) => Ok(std::format!(
            "<Property id=\"{}\" type=\"{ty}\" value=\"{}\"/>\n",
            escape_xml(&prop.id),
            escape_xml(s)
        )),
        PropertyValue::Boolean(b) => Ok(std::format!("<Property id=\"{}\" type=\"{ty}\" value=\"{}\"/>\n", escape_xml(&prop.id), b)),
        PropertyValue::I32(v) => Ok(std::format!("<Property id=\"{}\" type=\"{ty}\" value=\"{v}\"/>\n", escape_xml(&prop.id))),
        PropertyValue::F64(v) => Ok(std::format!("<Property id=\"{}\" type=\"{ty}\" value=\"{v}\"/>\n", escape_xml(&prop.id))),
        other => {
            let bytes = encode_property_bytes(other);
            let len = property_element_count(other);
            let block = place_value_block(bytes, options, pending, xisb_pending, next_uid);
            let checksum_attr = block.checksum.map(|c| std::format!(" checksum=\"{c}\"")).unwrap_or_default();
            Ok(match block.inline_body {
                Some(text) => std::format!(
                    "<Property id=\"{}\" type=\"{ty}\" length=\"{len}\" location=\"{}\"{checksum_attr}>{text}</Property>\n",
                    escape_xml(&prop.id),
                    block.location
                ),
                None => std::format!(
                    "<Property id=\"{}\" type=\"{ty}\" length=\"{len}\" location=\"{}\"{checksum_attr}/>\n",
                    escape_xml(&prop.id),
                    block.location
                ),
            })
        }
    }
}

fn property_element_count(v: &PropertyValue) -> usize {
    v.element_count().unwrap_or(0)
}

fn encode_property_bytes(v: &PropertyValue) -> Vec<u8> {
    match v {
        PropertyValue::I8Vec(x) => x.iter().map(|v| *v as u8).collect(),
        PropertyValue::U8Vec(x) => x.clone(),
        PropertyValue::I16Vec(x) => x.iter().flat_map(|v| v.to_le_bytes()).collect(),
        PropertyValue::U16Vec(x) => x.iter().flat_map(|v| v.to_le_bytes()).collect(),
        PropertyValue::I32Vec(x) => x.iter().flat_map(|v| v.to_le_bytes()).collect(),
        PropertyValue::U32Vec(x) => x.iter().flat_map(|v| v.to_le_bytes()).collect(),
        PropertyValue::I64Vec(x) => x.iter().flat_map(|v| v.to_le_bytes()).collect(),
        PropertyValue::U64Vec(x) => x.iter().flat_map(|v| v.to_le_bytes()).collect(),
        PropertyValue::F32Vec(x) => x.iter().flat_map(|v| v.to_le_bytes()).collect(),
        PropertyValue::F64Vec(x) => x.iter().flat_map(|v| v.to_le_bytes()).collect(),
        PropertyValue::Matrix { data, .. } => data.iter().flat_map(|v| v.to_le_bytes()).collect(),
        _ => Vec::new(),
    }
}

fn emit_image(
    image: &Image,
    pixels: &DecodedImage,
    options: &WriterOptions,
    pending: &mut Vec<PendingBlock>,
    xisb_pending: &mut Vec<PendingXisbBlock>,
    next_uid: &mut u64,
) -> Result<String> {
    let bytes = encode_samples(pixels, true);
    let geometry: Vec<String> = image.geometry.iter().map(|n| n.to_string()).collect();
    let block = place_value_block(bytes, options, pending, xisb_pending, next_uid);
    let checksum_attr = block.checksum.map(|c| std::format!(" checksum=\"{c}\"")).unwrap_or_default();

    let mut out = std::format!(
        "<Image geometry=\"{}\" sampleFormat=\"{}\" location=\"{}\"{checksum_attr} byteOrder=\"little\">\n",
        geometry.join(":"),
        image.sample_format.as_str(),
        block.location,
    );
    if let Some(text) = &block.inline_body {
        out.push_str(text);
        out.push('\n');
    }
    for prop in &image.properties {
        out.push_str(&emit_property(prop, options, pending, xisb_pending, next_uid)?);
    }
    for kw in &image.fits_keywords {
        out.push_str(&std::format!(
            "<FITSKeyword name=\"{}\" value=\"{}\" comment=\"{}\"/>\n",
            escape_xml(&kw.name),
            escape_xml(&kw.value),
            escape_xml(&kw.comment)
        ));
    }
    out.push_str("</Image>\n");
    Ok(out)
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&std::format!("{b:02x}"));
    }
    s
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;").replace('"', "&quot;")
}
