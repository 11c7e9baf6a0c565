use alloc::string::String;
use alloc::vec::Vec;

use crate::fits::block::padded_byte_len;
#[cfg(test)]
use crate::fits::block::BLOCK_SIZE;
use crate::error::{FitsError as Error, FitsResult as Result};
use crate::fits::header::{validate_required_keywords, Card, HduType};
use crate::fits::value::Value;

/// The type of FITS extension, determined by the XTENSION keyword value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionType {
    /// XTENSION = 'IMAGE'.
    Image,
    /// XTENSION = 'TABLE'.
    AsciiTable,
    /// XTENSION = 'BINTABLE'.
    BinaryTable,
}

impl ExtensionType {
    fn as_str(&self) -> &'static str {
        match self {
            ExtensionType::Image => "IMAGE",
            ExtensionType::AsciiTable => "TABLE",
            ExtensionType::BinaryTable => "BINTABLE",
        }
    }

    fn hdu_type(&self) -> HduType {
        match self {
            ExtensionType::Image => HduType::Image,
            ExtensionType::AsciiTable => HduType::AsciiTable,
            ExtensionType::BinaryTable => HduType::BinaryTable,
        }
    }
}

/// A parsed FITS extension header with all mandatory keyword values extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionHeader {
    /// The extension type (IMAGE, TABLE, or BINTABLE).
    pub xtension: ExtensionType,
    /// Bits per pixel / data value.
    pub bitpix: i64,
    /// Number of axes.
    pub naxis: usize,
    /// Axis dimensions (NAXIS1, NAXIS2, ...).
    pub naxes: Vec<usize>,
    /// Parameter count (heap size for binary tables).
    pub pcount: usize,
    /// Group count (always 1 for standard extensions).
    pub gcount: usize,
    /// All header cards from this extension.
    pub cards: Vec<Card>,
}

impl ExtensionHeader {
    /// Compute the number of data bytes described by this extension header.
    ///
    /// Per the FITS standard the data size is:
    ///   `|BITPIX|/8 * NAXIS1 * NAXIS2 * ... * NAXISn + PCOUNT`
    /// for binary tables (where BITPIX=8 so it simplifies to the product of
    /// axes plus PCOUNT for the heap). For images, PCOUNT is typically 0.
    /// If NAXIS is 0, the data size is 0 (no data follows).
    pub fn data_byte_count(&self) -> usize {
        if self.naxis == 0 || self.naxes.is_empty() {
            return 0;
        }
        let bytes_per_value = (self.bitpix.unsigned_abs() as usize) / 8;
        let product: usize = self.naxes.iter().product();
        bytes_per_value * product + self.pcount
    }

    /// Compute the padded data byte count, rounded up to the next multiple
    /// of the FITS block size (2880 bytes).
    pub fn data_padded_byte_count(&self) -> usize {
        padded_byte_len(self.data_byte_count())
    }
}

/// Pad a keyword name to 8 bytes with trailing ASCII spaces.
fn kw(name: &[u8]) -> [u8; 8] {
    let mut buf = [b' '; 8];
    let len = name.len().min(8);
    buf[..len].copy_from_slice(&name[..len]);
    buf
}

fn find_keyword<'a>(cards: &'a [Card], name: &[u8; 8]) -> Option<&'a Card> {
    cards.iter().find(|c| &c.keyword == name)
}

fn extract_integer(card: &Card, keyword_name: &'static str) -> Result<i64> {
    match &card.value {
        Some(Value::Integer(n)) => Ok(*n),
        _ => Err(Error::MissingKeyword(keyword_name)),
    }
}

fn extract_usize(card: &Card, keyword_name: &'static str) -> Result<usize> {
    let n = extract_integer(card, keyword_name)?;
    if n < 0 {
        return Err(Error::InvalidValue);
    }
    Ok(n as usize)
}

/// Parse an XTENSION keyword value and determine the extension type.
fn parse_extension_type(cards: &[Card]) -> Result<ExtensionType> {
    let xtension_card = cards.first().ok_or(Error::MissingKeyword("XTENSION"))?;
    if xtension_card.keyword != kw(b"XTENSION") {
        return Err(Error::MissingKeyword("XTENSION"));
    }

    match &xtension_card.value {
        Some(Value::String(s)) => match s.trim() {
            "IMAGE" => Ok(ExtensionType::Image),
            "TABLE" => Ok(ExtensionType::AsciiTable),
            "BINTABLE" => Ok(ExtensionType::BinaryTable),
            other => Err(Error::UnsupportedExtension(if other.starts_with("A3D") {
                "A3DTABLE"
            } else {
                "unknown XTENSION"
            })),
        },
        _ => Err(Error::UnsupportedExtension("XTENSION not a string")),
    }
}

/// Parse an extension header from a slice of cards.
///
/// Reads the XTENSION keyword to determine the extension type, then extracts
/// all shared mandatory keywords (BITPIX, NAXIS, NAXISn, PCOUNT, GCOUNT) and
/// validates the header against the FITS standard.
pub fn parse_extension_header(cards: &[Card]) -> Result<ExtensionHeader> {
    let ext_type = parse_extension_type(cards)?;

    validate_required_keywords(ext_type.hdu_type(), cards)?;

    let bitpix_card = find_keyword(cards, &kw(b"BITPIX")).ok_or(Error::MissingKeyword("BITPIX"))?;
    let bitpix = extract_integer(bitpix_card, "BITPIX")?;

    let naxis_card = find_keyword(cards, &kw(b"NAXIS")).ok_or(Error::MissingKeyword("NAXIS"))?;
    let naxis = extract_usize(naxis_card, "NAXIS")?;

    let mut naxes = Vec::with_capacity(naxis);
    for i in 1..=naxis {
        let kw_name = alloc::format!("NAXIS{}", i);
        let mut kw_buf = [b' '; 8];
        let len = kw_name.len().min(8);
        kw_buf[..len].copy_from_slice(&kw_name.as_bytes()[..len]);
        let card = find_keyword(cards, &kw_buf).ok_or(Error::InvalidHeader("missing NAXISn"))?;
        let val = extract_usize(card, "NAXISn")?;
        naxes.push(val);
    }

    let pcount_card = find_keyword(cards, &kw(b"PCOUNT")).ok_or(Error::MissingKeyword("PCOUNT"))?;
    let pcount = extract_usize(pcount_card, "PCOUNT")?;

    let gcount_card = find_keyword(cards, &kw(b"GCOUNT")).ok_or(Error::MissingKeyword("GCOUNT"))?;
    let gcount = extract_usize(gcount_card, "GCOUNT")?;

    Ok(ExtensionHeader {
        xtension: ext_type,
        bitpix,
        naxis,
        naxes,
        pcount,
        gcount,
        cards: cards.to_vec(),
    })
}

/// Build a sequence of cards for an extension header.
///
/// Creates the mandatory keywords in the order required by the FITS standard:
/// XTENSION, BITPIX, NAXIS, NAXIS1..NAXISn, PCOUNT, GCOUNT.
pub fn build_extension_header(
    ext_type: ExtensionType,
    bitpix: i64,
    naxes: &[usize],
    pcount: usize,
    gcount: usize,
) -> Result<Vec<Card>> {
    let naxis = naxes.len();
    let mut cards = Vec::with_capacity(6 + naxis);

    cards.push(Card {
        keyword: kw(b"XTENSION"),
        value: Some(Value::String(String::from(ext_type.as_str()))),
        comment: None,
    });

    cards.push(Card {
        keyword: kw(b"BITPIX"),
        value: Some(Value::Integer(bitpix)),
        comment: None,
    });

    cards.push(Card {
        keyword: kw(b"NAXIS"),
        value: Some(Value::Integer(naxis as i64)),
        comment: None,
    });

    for (i, &dim) in naxes.iter().enumerate() {
        let kw_name = alloc::format!("NAXIS{}", i + 1);
        let mut kw_buf = [b' '; 8];
        let len = kw_name.len().min(8);
        kw_buf[..len].copy_from_slice(&kw_name.as_bytes()[..len]);
        cards.push(Card {
            keyword: kw_buf,
            value: Some(Value::Integer(dim as i64)),
            comment: None,
        });
    }

    cards.push(Card {
        keyword: kw(b"PCOUNT"),
        value: Some(Value::Integer(pcount as i64)),
        comment: None,
    });

    cards.push(Card {
        keyword: kw(b"GCOUNT"),
        value: Some(Value::Integer(gcount as i64)),
        comment: None,
    });

    Ok(cards)
}
