//! XISF `DataBlock` location parsing and the read pipeless of resolve →
//! checksum → decompress (§4.H). Every block of pixel/table/attached-property
//! data in a unit is addressed through one of these.

use std::string::String;
use std::vec::Vec;

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use sha3::{Sha3_256, Sha3_512};

use crate::error::{XisfError as Error, XisfResult as Result};
use crate::xisf::container::{parse_xisb_index, XisbIndex};
use crate::xisf::resolver::ResourceResolver;

/// Where a DataBlock's bytes live, per the `location` attribute grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// `inline:base64` or `inline:hex`; bytes carried in the element text.
    Inline { hex: bool },
    /// `embedded`; same encoding rule as `Inline`, used for thumbnails.
    Embedded { hex: bool },
    /// `attachment:<pos>:<size>`, byte range in the monolithic payload.
    Attachment { position: u64, size: u64 },
    /// `url(<URL>)[:<hexId>]`.
    Url { url: String, index_id: Option<u64> },
    /// `path(<PATH>)[:<hexId>]`.
    Path { path: String, index_id: Option<u64> },
}

/// Checksum algorithms a DataBlock may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha1,
    Sha256,
    Sha512,
    Sha3_256,
    Sha3_512,
}

impl ChecksumAlgorithm {
    pub fn parse(s: &str) -> Option<ChecksumAlgorithm> {
        Some(match s {
            "sha-1" | "sha1" => ChecksumAlgorithm::Sha1,
            "sha-256" | "sha256" => ChecksumAlgorithm::Sha256,
            "sha-512" | "sha512" => ChecksumAlgorithm::Sha512,
            "sha3-256" => ChecksumAlgorithm::Sha3_256,
            "sha3-512" => ChecksumAlgorithm::Sha3_512,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha1 => "sha-1",
            ChecksumAlgorithm::Sha256 => "sha-256",
            ChecksumAlgorithm::Sha512 => "sha-512",
            ChecksumAlgorithm::Sha3_256 => "sha3-256",
            ChecksumAlgorithm::Sha3_512 => "sha3-512",
        }
    }

    pub fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            ChecksumAlgorithm::Sha1 => Sha1::digest(bytes).to_vec(),
            ChecksumAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            ChecksumAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
            ChecksumAlgorithm::Sha3_256 => Sha3_256::digest(bytes).to_vec(),
            ChecksumAlgorithm::Sha3_512 => Sha3_512::digest(bytes).to_vec(),
        }
    }
}

/// A declared `checksum="<alg>:<hexDigest>"` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub digest_hex: String,
}

impl Checksum {
    /// Verify `bytes` against the declared digest.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        let actual = self.algorithm.digest(bytes);
        hex_encode(&actual).eq_ignore_ascii_case(&self.digest_hex)
    }
}

/// Compression codecs a DataBlock may declare, with the optional `+sh`
/// byte-shuffle variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCodec {
    Zlib,
    Lz4,
    Lz4Hc,
    Zstd,
}

/// A declared `compression="<codec>:<uncompressedSize>[:<itemSize>]"` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Compression {
    pub codec: CompressionCodec,
    pub shuffled: bool,
    pub uncompressed_size: u64,
    /// Byte-shuffle item size (element width in bytes), required when `shuffled`.
    pub item_size: Option<usize>,
}

impl Compression {
    pub fn parse_codec(s: &str) -> Option<(CompressionCodec, bool)> {
        let (base, shuffled) = match s.strip_suffix("+sh") {
            Some(b) => (b, true),
            None => (s, false),
        };
        let codec = match base {
            "zlib" => CompressionCodec::Zlib,
            "lz4" => CompressionCodec::Lz4,
            "lz4hc" => CompressionCodec::Lz4Hc,
            "zstd" => CompressionCodec::Zstd,
            _ => return None,
        };
        Some((codec, shuffled))
    }

    pub fn codec_str(&self) -> &'static str {
        match (self.codec, self.shuffled) {
            (CompressionCodec::Zlib, false) => "zlib",
            (CompressionCodec::Zlib, true) => "zlib+sh",
            (CompressionCodec::Lz4, false) => "lz4",
            (CompressionCodec::Lz4, true) => "lz4+sh",
            (CompressionCodec::Lz4Hc, false) => "lz4hc",
            (CompressionCodec::Lz4Hc, true) => "lz4hc+sh",
            (CompressionCodec::Zstd, false) => "zstd",
            (CompressionCodec::Zstd, true) => "zstd+sh",
        }
    }

    /// Decompress `compressed`, undoing the byte shuffle if declared.
    pub fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        let raw = match self.codec {
            CompressionCodec::Zlib => miniz_oxide::inflate::decompress_to_vec_zlib(compressed)
                .map_err(|_| Error::Decompression("zlib stream corrupt"))?,
            CompressionCodec::Lz4 | CompressionCodec::Lz4Hc => {
                lz4_flex::block::decompress(compressed, self.uncompressed_size as usize)
                    .map_err(|_| Error::Decompression("lz4 stream corrupt"))?
            }
            CompressionCodec::Zstd => decompress_zstd(compressed)?,
        };
        if raw.len() as u64 != self.uncompressed_size {
            return Err(Error::Decompression("decompressed size does not match declared uncompressedSize"));
        }
        if self.shuffled {
            let item_size = self.item_size.ok_or(Error::Decompression("shuffled block missing itemSize"))?;
            Ok(unshuffle(&raw, item_size))
        } else {
            Ok(raw)
        }
    }

    /// Compress `raw`, applying the byte shuffle first if requested. Only
    /// zlib and plain lz4 are supported for writing (see DESIGN.md); zstd
    /// and lz4hc round-trip on read but are not emitted by this writer.
    pub fn compress(codec: CompressionCodec, shuffled: bool, item_size: usize, raw: &[u8]) -> Result<(Vec<u8>, Compression)> {
        let shaped = if shuffled { shuffle(raw, item_size) } else { raw.to_vec() };
        let compressed = match codec {
            CompressionCodec::Zlib => miniz_oxide::deflate::compress_to_vec_zlib(&shaped, 6),
            CompressionCodec::Lz4 => lz4_flex::block::compress(&shaped),
            CompressionCodec::Lz4Hc | CompressionCodec::Zstd => {
                return Err(Error::Decompression("writer does not support this codec for compression"))
            }
        };
        Ok((
            compressed,
            Compression {
                codec,
                shuffled,
                uncompressed_size: raw.len() as u64,
                item_size: if shuffled { Some(item_size) } else { None },
            },
        ))
    }
}

fn decompress_zstd(compressed: &[u8]) -> Result<Vec<u8>> {
    use std::io::Read;
    let mut decoder = ruzstd::decoding::StreamingDecoder::new(compressed)
        .map_err(|_| Error::Decompression("zstd frame header corrupt"))?;
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).map_err(|_| Error::Decompression("zstd stream corrupt"))?;
    Ok(out)
}

/// Byte-shuffle: interleave `item_size`-wide elements into `item_size`
/// contiguous planes (plane `p` holds byte `p` of every element).
fn shuffle(data: &[u8], item_size: usize) -> Vec<u8> {
    if item_size <= 1 || data.is_empty() {
        return data.to_vec();
    }
    let n = data.len() / item_size;
    let mut out = Vec::with_capacity(data.len());
    for plane in 0..item_size {
        for i in 0..n {
            out.push(data[i * item_size + plane]);
        }
    }
    // Trailing bytes that don't form a complete element are passed through.
    out.extend_from_slice(&data[n * item_size..]);
    out
}

/// Undo [`shuffle`]: `out[i] = planes[i mod item_size][i div item_size]`.
fn unshuffle(data: &[u8], item_size: usize) -> Vec<u8> {
    if item_size <= 1 || data.is_empty() {
        return data.to_vec();
    }
    let n = data.len() / item_size;
    let remainder = &data[n * item_size..];
    let mut out = vec![0u8; data.len()];
    for plane in 0..item_size {
        for i in 0..n {
            out[i * item_size + plane] = data[plane * n + i];
        }
    }
    out[n * item_size..].copy_from_slice(remainder);
    out
}

/// A fully described DataBlock reference, as decoded from an element's
/// `location`/`byteOrder`/`checksum`/`compression` attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub location: Location,
    pub byte_order_little_endian: bool,
    pub checksum: Option<Checksum>,
    pub compression: Option<Compression>,
    /// Inline text payload (base64/hex), populated for `Inline`/`Embedded`.
    pub inline_text: Option<String>,
}

/// Resolves a [`DataBlock`] to its final (decompressed, checksummed) bytes.
///
/// `monolithic_payload` is the attachment region of the current file when
/// parsing a monolithic container (`None` for a header-only/distributed
/// parse). `header_dir` is the directory `@header_dir/` expands against.
pub fn resolve_data_block(
    block: &DataBlock,
    monolithic_payload: Option<&[u8]>,
    resolver: &dyn ResourceResolver,
    header_dir: &str,
    strict: bool,
) -> Result<Vec<u8>> {
    let raw = match &block.location {
        Location::Inline { hex } | Location::Embedded { hex } => {
            let text = block.inline_text.as_deref().unwrap_or("");
            decode_inline(text, *hex)?
        }
        Location::Attachment { position, size } => {
            let payload = monolithic_payload.ok_or(Error::Format("attachment location outside a monolithic file"))?;
            let start = *position as usize;
            let end = start
                .checked_add(*size as usize)
                .ok_or(Error::Format("attachment byte range overflows"))?;
            if end > payload.len() {
                return Err(Error::Format("attachment byte range exceeds file size"));
            }
            payload[start..end].to_vec()
        }
        Location::Url { url, index_id } => {
            let expanded = crate::xisf::resolver::resolve_header_dir(url, header_dir);
            let bytes = resolver.resolve(&expanded, None)?;
            resolve_index_id(bytes, *index_id)?
        }
        Location::Path { path, index_id } => {
            let expanded = crate::xisf::resolver::resolve_header_dir(path, header_dir);
            let bytes = resolver.resolve(&expanded, None)?;
            resolve_index_id(bytes, *index_id)?
        }
    };

    if let Some(checksum) = &block.checksum {
        if !checksum.verify(&raw) {
            if strict {
                return Err(Error::Checksum { algorithm: checksum.algorithm.as_str() });
            }
        }
    }

    match &block.compression {
        Some(compression) => compression.decompress(&raw),
        None => Ok(raw),
    }
}

fn resolve_index_id(bytes: Vec<u8>, index_id: Option<u64>) -> Result<Vec<u8>> {
    match index_id {
        None => Ok(bytes),
        Some(id) => {
            let index: XisbIndex = parse_xisb_index(&bytes)?;
            let entry = index.find(id).ok_or(Error::Format("XISB index has no entry for the referenced uniqueId"))?;
            let start = entry.block_position as usize;
            let end = start
                .checked_add(entry.block_length as usize)
                .ok_or(Error::Format("XISB entry byte range overflows"))?;
            if end > bytes.len() {
                return Err(Error::Format("XISB entry byte range exceeds file size"));
            }
            Ok(bytes[start..end].to_vec())
        }
    }
}

fn decode_inline(text: &str, hex: bool) -> Result<Vec<u8>> {
    let trimmed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if hex {
        hex_decode(&trimmed).ok_or(Error::Format("inline hex payload malformed"))
    } else {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(trimmed)
            .map_err(|_| Error::Format("inline base64 payload malformed"))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&std::format!("{b:02x}"));
    }
    s
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
