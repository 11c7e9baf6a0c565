use alloc::string::String;
use alloc::vec::Vec;

use crate::fits::block::{padded_byte_len, BLOCK_SIZE};
use crate::error::{FitsError as Error, FitsResult as Result};
use crate::fits::header::{header_byte_len, parse_header_blocks, Card};
use crate::fits::value::Value;

/// Describes the kind and shape of data in a single HDU.
#[derive(Debug, Clone, PartialEq)]
pub enum HduInfo {
    /// Primary HDU containing image data.
    Primary {
        /// BITPIX value (8, 16, 32, 64, -32, -64).
        bitpix: i64,
        /// Axis dimensions (NAXIS1, NAXIS2, ...).
        naxes: Vec<usize>,
    },
    /// Image extension (XTENSION = 'IMAGE').
    Image {
        /// BITPIX value.
        bitpix: i64,
        /// Axis dimensions.
        naxes: Vec<usize>,
    },
    /// ASCII table extension (XTENSION = 'TABLE').
    AsciiTable {
        /// Row width in bytes.
        naxis1: usize,
        /// Number of rows.
        naxis2: usize,
        /// Number of columns.
        tfields: usize,
    },
    /// Binary table extension (XTENSION = 'BINTABLE').
    BinaryTable {
        /// Row width in bytes.
        naxis1: usize,
        /// Number of rows.
        naxis2: usize,
        /// Size of the variable-length array heap in bytes.
        pcount: usize,
        /// Number of columns.
        tfields: usize,
    },
    /// Random groups structure (primary HDU with GROUPS=T, NAXIS1=0).
    RandomGroups {
        /// BITPIX value.
        bitpix: i64,
        /// Group dimensions (NAXIS2..NAXISm, excluding NAXIS1=0).
        naxes: Vec<usize>,
        /// Number of parameters per group.
        pcount: usize,
        /// Number of groups.
        gcount: usize,
    },
    /// Tile-compressed image stored as a binary table (ZIMAGE=T).
    CompressedImage {
        /// Original image BITPIX before compression.
        zbitpix: i64,
        /// Original image dimensions.
        znaxes: Vec<usize>,
        /// Compression algorithm name (e.g. "RICE_1", "GZIP_1").
        zcmptype: String,
        /// Tile dimensions for compression.
        ztile: Vec<usize>,
        /// Rice compression block size (ZVAL1).
        blocksize: usize,
        /// Rice bytes per pixel (ZVAL2).
        rice_bytepix: usize,
        /// Underlying binary table row width.
        naxis1: usize,
        /// Underlying binary table row count (number of tiles).
        naxis2: usize,
        /// Heap size for variable-length compressed data.
        pcount: usize,
        /// Number of columns in the underlying binary table.
        tfields: usize,
    },
}

/// A single Header Data Unit parsed from a FITS byte stream.
#[derive(Debug, Clone)]
pub struct Hdu {
    /// Parsed metadata describing the HDU type and shape.
    pub info: HduInfo,
    /// Byte offset where the header begins in the FITS stream.
    pub header_start: usize,
    /// Byte offset where the data segment begins.
    pub data_start: usize,
    /// Length of the data segment in bytes (unpadded).
    pub data_len: usize,
    /// All header cards parsed from this HDU.
    pub cards: Vec<Card>,
}

/// A collection of HDUs parsed from a complete FITS file.
#[derive(Debug, Clone)]
pub struct FitsData {
    /// All HDUs in the file, with the primary HDU at index 0.
    pub hdus: Vec<Hdu>,
}

impl FitsData {
    /// Returns the primary (first) HDU.
    pub fn primary(&self) -> &Hdu {
        &self.hdus[0]
    }

    /// Returns the HDU at the given index, or `None` if out of bounds.
    pub fn get(&self, index: usize) -> Option<&Hdu> {
        self.hdus.get(index)
    }

    /// Finds the first HDU whose EXTNAME matches `name`.
    pub fn find_by_name(&self, name: &str) -> Option<&Hdu> {
        self.hdus.iter().find(|hdu| {
            card_string_value(&hdu.cards, "EXTNAME")
                .map(|s| s == name)
                .unwrap_or(false)
        })
    }

    /// Returns the number of HDUs.
    pub fn len(&self) -> usize {
        self.hdus.len()
    }

    /// Returns `true` if the file contains no HDUs.
    pub fn is_empty(&self) -> bool {
        self.hdus.is_empty()
    }

    /// Iterates over all HDUs in order.
    pub fn iter(&self) -> impl Iterator<Item = &Hdu> {
        self.hdus.iter()
    }
}

fn card_integer_value(cards: &[Card], keyword: &str) -> Option<i64> {
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

fn card_string_value(cards: &[Card], keyword: &str) -> Option<String> {
    cards.iter().find_map(|c| {
        if c.keyword_str() == keyword {
            match &c.value {
                Some(Value::String(s)) => Some(s.trim().into()),
                _ => None,
            }
        } else {
            None
        }
    })
}

fn card_logical_value(cards: &[Card], keyword: &str) -> Option<bool> {
    cards.iter().find_map(|c| {
        if c.keyword_str() == keyword {
            match &c.value {
                Some(Value::Logical(b)) => Some(*b),
                _ => None,
            }
        } else {
            None
        }
    })
}

fn is_primary_hdu(cards: &[Card]) -> bool {
    cards
        .first()
        .map(|c| c.keyword_str() == "SIMPLE")
        .unwrap_or(false)
}

fn compute_data_byte_len(cards: &[Card], is_primary: bool) -> Result<usize> {
    let bitpix = card_integer_value(cards, "BITPIX").ok_or(Error::MissingKeyword("BITPIX"))?;
    let naxis = card_integer_value(cards, "NAXIS").ok_or(Error::MissingKeyword("NAXIS"))?;
    let naxis = naxis as usize;

    if naxis == 0 {
        return Ok(0);
    }

    let bytes_per_value = (bitpix.unsigned_abs() as usize) / 8;

    let mut dims = Vec::with_capacity(naxis);
    for i in 1..=naxis {
        let kw = alloc::format!("NAXIS{}", i);
        let dim = card_integer_value(cards, &kw).ok_or(Error::MissingKeyword("NAXISn"))? as usize;
        dims.push(dim);
    }

    // Random groups: primary HDU with NAXIS1=0 and GROUPS=T
    if is_primary && dims[0] == 0 && card_logical_value(cards, "GROUPS") == Some(true) {
        let pcount =
            card_integer_value(cards, "PCOUNT").ok_or(Error::MissingKeyword("PCOUNT"))? as usize;
        let gcount =
            card_integer_value(cards, "GCOUNT").ok_or(Error::MissingKeyword("GCOUNT"))? as usize;

        // Product of NAXIS2 * NAXIS3 * ... * NAXISm
        let mut product: usize = 1;
        for &d in &dims[1..] {
            product = product
                .checked_mul(d)
                .ok_or(Error::InvalidHeader("NAXIS overflow"))?;
        }

        // Nbytes = bytes_per_value * GCOUNT * (PCOUNT + product)
        let group_size = pcount
            .checked_add(product)
            .ok_or(Error::InvalidHeader("random groups size overflow"))?;
        let data_bytes = bytes_per_value
            .checked_mul(gcount)
            .ok_or(Error::InvalidHeader("random groups size overflow"))?
            .checked_mul(group_size)
            .ok_or(Error::InvalidHeader("random groups size overflow"))?;
        return Ok(data_bytes);
    }

    let total_pixels: usize = dims
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or(Error::InvalidHeader("pixel count overflow"))?;

    let pcount = if is_primary {
        0
    } else {
        card_integer_value(cards, "PCOUNT").unwrap_or(0) as usize
    };

    let gcount = if is_primary {
        1
    } else {
        let g = card_integer_value(cards, "GCOUNT").unwrap_or(1) as usize;
        if g == 0 {
            1
        } else {
            g
        }
    };

    let data_bytes = gcount
        .checked_mul(
            total_pixels
                .checked_mul(bytes_per_value)
                .ok_or(Error::InvalidHeader("data size overflow"))?,
        )
        .ok_or(Error::InvalidHeader("data size overflow"))?
        .checked_add(
            gcount
                .checked_mul(pcount)
                .ok_or(Error::InvalidHeader("data size overflow"))?,
        )
        .ok_or(Error::InvalidHeader("data size overflow"))?;

    Ok(data_bytes)
}

fn parse_hdu_info(cards: &[Card], is_primary: bool) -> Result<HduInfo> {
    if is_primary {
        let bitpix = card_integer_value(cards, "BITPIX").ok_or(Error::MissingKeyword("BITPIX"))?;
        let naxis =
            card_integer_value(cards, "NAXIS").ok_or(Error::MissingKeyword("NAXIS"))? as usize;
        let mut naxes = Vec::with_capacity(naxis);
        for i in 1..=naxis {
            let kw = alloc::format!("NAXIS{}", i);
            let dim =
                card_integer_value(cards, &kw).ok_or(Error::MissingKeyword("NAXISn"))? as usize;
            naxes.push(dim);
        }

        if naxis > 0 && naxes[0] == 0 && card_logical_value(cards, "GROUPS") == Some(true) {
            let pcount = card_integer_value(cards, "PCOUNT")
                .ok_or(Error::MissingKeyword("PCOUNT"))? as usize;
            let gcount = card_integer_value(cards, "GCOUNT")
                .ok_or(Error::MissingKeyword("GCOUNT"))? as usize;
            return Ok(HduInfo::RandomGroups {
                bitpix,
                naxes: naxes[1..].to_vec(),
                pcount,
                gcount,
            });
        }

        return Ok(HduInfo::Primary { bitpix, naxes });
    }

    let xtension = card_string_value(cards, "XTENSION").ok_or(Error::MissingKeyword("XTENSION"))?;
    match xtension.as_str() {
        "IMAGE" => {
            let bitpix =
                card_integer_value(cards, "BITPIX").ok_or(Error::MissingKeyword("BITPIX"))?;
            let naxis =
                card_integer_value(cards, "NAXIS").ok_or(Error::MissingKeyword("NAXIS"))? as usize;
            let mut naxes = Vec::with_capacity(naxis);
            for i in 1..=naxis {
                let kw = alloc::format!("NAXIS{}", i);
                let dim =
                    card_integer_value(cards, &kw).ok_or(Error::MissingKeyword("NAXISn"))? as usize;
                naxes.push(dim);
            }
            Ok(HduInfo::Image { bitpix, naxes })
        }
        "TABLE" => {
            let naxis1 = card_integer_value(cards, "NAXIS1")
                .ok_or(Error::MissingKeyword("NAXIS1"))? as usize;
            let naxis2 = card_integer_value(cards, "NAXIS2")
                .ok_or(Error::MissingKeyword("NAXIS2"))? as usize;
            let tfields = card_integer_value(cards, "TFIELDS")
                .ok_or(Error::MissingKeyword("TFIELDS"))? as usize;
            Ok(HduInfo::AsciiTable {
                naxis1,
                naxis2,
                tfields,
            })
        }
        "BINTABLE" => {
            let naxis1 = card_integer_value(cards, "NAXIS1")
                .ok_or(Error::MissingKeyword("NAXIS1"))? as usize;
            let naxis2 = card_integer_value(cards, "NAXIS2")
                .ok_or(Error::MissingKeyword("NAXIS2"))? as usize;
            let pcount = card_integer_value(cards, "PCOUNT")
                .ok_or(Error::MissingKeyword("PCOUNT"))? as usize;
            let tfields = card_integer_value(cards, "TFIELDS")
                .ok_or(Error::MissingKeyword("TFIELDS"))? as usize;

            if card_logical_value(cards, "ZIMAGE") == Some(true) {
                let zbitpix =
                    card_integer_value(cards, "ZBITPIX").ok_or(Error::MissingKeyword("ZBITPIX"))?;
                let znaxis = card_integer_value(cards, "ZNAXIS")
                    .ok_or(Error::MissingKeyword("ZNAXIS"))? as usize;
                let mut znaxes = Vec::with_capacity(znaxis);
                for i in 1..=znaxis {
                    let kw = alloc::format!("ZNAXIS{}", i);
                    let dim = card_integer_value(cards, &kw)
                        .ok_or(Error::MissingKeyword("ZNAXISn"))?
                        as usize;
                    znaxes.push(dim);
                }
                let zcmptype = card_string_value(cards, "ZCMPTYPE")
                    .ok_or(Error::MissingKeyword("ZCMPTYPE"))?;
                let mut ztile = Vec::with_capacity(znaxis);
                for i in 1..=znaxis {
                    let kw = alloc::format!("ZTILE{}", i);
                    let default = if i == 1 && !znaxes.is_empty() {
                        znaxes[0]
                    } else {
                        1
                    };
                    let val = card_integer_value(cards, &kw).unwrap_or(default as i64) as usize;
                    ztile.push(val);
                }
                let mut blocksize = card_integer_value(cards, "ZVAL1").unwrap_or(32) as usize;
                let mut rice_bytepix = card_integer_value(cards, "ZVAL2").unwrap_or(4) as usize;
                // cfitsio compatibility: if blocksize < 16 and bytepix > 8, values are swapped
                if blocksize < 16 && rice_bytepix > 8 {
                    core::mem::swap(&mut blocksize, &mut rice_bytepix);
                }
                return Ok(HduInfo::CompressedImage {
                    zbitpix,
                    znaxes,
                    zcmptype,
                    ztile,
                    blocksize,
                    rice_bytepix,
                    naxis1,
                    naxis2,
                    pcount,
                    tfields,
                });
            }

            Ok(HduInfo::BinaryTable {
                naxis1,
                naxis2,
                pcount,
                tfields,
            })
        }
        other => Err(Error::UnsupportedExtension(
            if other.starts_with("A3DTABLE") {
                "A3DTABLE"
            } else if other.starts_with("FOREIGN") {
                "FOREIGN"
            } else {
                "unknown XTENSION"
            },
        )),
    }
}

/// Parse a complete FITS byte stream into a [`FitsData`] containing all HDUs.
pub fn parse_fits(data: &[u8]) -> Result<FitsData> {
    if data.is_empty() {
        return Err(Error::UnexpectedEof);
    }
    if data.len() < BLOCK_SIZE {
        return Err(Error::UnexpectedEof);
    }

    let mut hdus = Vec::new();
    let mut offset: usize = 0;

    while offset < data.len() {
        let remaining = &data[offset..];
        if remaining.len() < BLOCK_SIZE {
            break;
        }

        let header_len = match header_byte_len(remaining) {
            Ok(len) => len,
            Err(_) if !hdus.is_empty() => break,
            Err(e) => return Err(e),
        };
        let header_data = &remaining[..header_len];
        let cards = match parse_header_blocks(header_data) {
            Ok(cards) => cards,
            Err(_) if !hdus.is_empty() => break,
            Err(e) => return Err(e),
        };

        let is_primary = hdus.is_empty() && is_primary_hdu(&cards);
        if hdus.is_empty() && !is_primary {
            return Err(Error::InvalidHeader("first HDU must be primary"));
        }

        let info = match parse_hdu_info(&cards, is_primary) {
            Ok(info) => info,
            Err(_) if !hdus.is_empty() => break,
            Err(e) => return Err(e),
        };
        let data_len = match compute_data_byte_len(&cards, is_primary) {
            Ok(len) => len,
            Err(_) if !hdus.is_empty() => break,
            Err(e) => return Err(e),
        };
        let data_start = offset + header_len;

        // Require that all actual data bytes are present, but allow
        // the trailing block padding to be missing.  Many real-world
        // files (HiPS tiles from Aladin/Hipsgen) omit trailing padding.
        if data_len > 0 && data_start + data_len > data.len() {
            return Err(Error::UnexpectedEof);
        }

        hdus.push(Hdu {
            info,
            header_start: offset,
            data_start,
            data_len,
            cards,
        });

        let padded_data = padded_byte_len(data_len);
        offset = data_start + padded_data;
    }

    if hdus.is_empty() {
        return Err(Error::InvalidHeader("no valid HDUs found"));
    }

    Ok(FitsData { hdus })
}
