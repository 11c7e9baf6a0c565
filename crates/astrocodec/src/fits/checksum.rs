//! FITS CHECKSUM and DATASUM keyword support.
//!
//! Implements the HEASARC ones-complement checksum convention for verifying
//! and computing integrity checksums on FITS HDUs.

use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;

use crate::fits::block::{padded_byte_len, BLOCK_SIZE};
use crate::fits::hdu::Hdu;
use crate::fits::header::{serialize_header, Card};
use crate::fits::value::Value;

// ---------------------------------------------------------------------------
// Ones-complement 32-bit checksum (cfitsio `ffcsum`)
// ---------------------------------------------------------------------------

/// Compute the ones-complement 32-bit checksum over block-aligned data.
///
/// `data` must be a multiple of [`BLOCK_SIZE`] (2880) bytes.
/// Returns the accumulated checksum.
pub fn checksum_blocks(data: &[u8]) -> u32 {
    assert!(
        data.len().is_multiple_of(BLOCK_SIZE),
        "data length must be a multiple of 2880"
    );
    let mut sum: u32 = 0;
    for block in data.chunks_exact(BLOCK_SIZE) {
        sum = accumulate_block(sum, block);
    }
    sum
}

/// Accumulate a single 2880-byte block into an existing checksum.
fn accumulate_block(sum: u32, block: &[u8]) -> u32 {
    let mut hi: u32 = sum >> 16;
    let mut lo: u32 = sum & 0xFFFF;

    // Process 1440 big-endian u16 values, alternating into hi and lo.
    for pair in block.chunks_exact(4) {
        let w0 = u16::from_be_bytes([pair[0], pair[1]]) as u32;
        let w1 = u16::from_be_bytes([pair[2], pair[3]]) as u32;
        hi += w0;
        lo += w1;
    }

    // Fold carry bits.
    let mut hicarry = hi >> 16;
    let mut locarry = lo >> 16;
    while (hicarry | locarry) != 0 {
        hi = (hi & 0xFFFF) + locarry;
        lo = (lo & 0xFFFF) + hicarry;
        hicarry = hi >> 16;
        locarry = lo >> 16;
    }

    (hi << 16) | lo
}

// ---------------------------------------------------------------------------
// ASCII encoding/decoding (cfitsio `ffesum` / `ffdsum`)
// ---------------------------------------------------------------------------

/// ASCII characters to exclude (punctuation gaps between digits/upper/lower).
const EXCLUDE: [u8; 13] = [
    0x3a, 0x3b, 0x3c, 0x3d, 0x3e, 0x3f, 0x40, // : ; < = > ? @
    0x5b, 0x5c, 0x5d, 0x5e, 0x5f, 0x60, // [ \ ] ^ _ `
];
const ASCII_OFFSET: i32 = 0x30; // ASCII '0'

/// Encode a 32-bit checksum into a 16-character ASCII string.
///
/// If `complement` is true, the bitwise complement of `sum` is encoded.
pub fn encode_checksum(sum: u32, complement: bool) -> [u8; 16] {
    let value = if complement {
        0xFFFFFFFFu32.wrapping_sub(sum)
    } else {
        sum
    };

    let mut asc = [0u8; 16];
    for ii in 0..4u32 {
        let byte_val = ((value >> (24 - 8 * ii)) & 0xFF) as i32;
        let quotient = byte_val / 4 + ASCII_OFFSET;
        let remainder = byte_val % 4;

        let mut ch = [quotient; 4];
        ch[0] += remainder;

        // Adjust pairs to avoid excluded ASCII characters.
        loop {
            let mut adjusted = false;
            for &ex in &EXCLUDE {
                let ex = ex as i32;
                for jj in (0..4).step_by(2) {
                    if ch[jj] == ex || ch[jj + 1] == ex {
                        ch[jj] += 1;
                        ch[jj + 1] -= 1;
                        adjusted = true;
                    }
                }
            }
            if !adjusted {
                break;
            }
        }

        // Interleave bytes.
        for jj in 0..4 {
            asc[4 * jj + ii as usize] = ch[jj] as u8;
        }
    }

    // Circular right-shift by 1 position.
    let mut result = [0u8; 16];
    for ii in 0..16 {
        result[ii] = asc[(ii + 15) % 16];
    }
    result
}

/// Decode a 16-character ASCII encoded checksum into a 32-bit value.
///
/// If `complement` is true, the complement of the decoded value is returned.
pub fn decode_checksum(ascii: &[u8; 16], complement: bool) -> u32 {
    let mut cbuf = [0i32; 16];
    for ii in 0..16 {
        cbuf[ii] = ascii[(ii + 1) % 16] as i32 - ASCII_OFFSET;
    }

    let mut hi: u32 = 0;
    let mut lo: u32 = 0;
    for ii in (0..16).step_by(4) {
        hi += ((cbuf[ii] << 8) + cbuf[ii + 1]) as u32;
        lo += ((cbuf[ii + 2] << 8) + cbuf[ii + 3]) as u32;
    }

    let mut hicarry = hi >> 16;
    let mut locarry = lo >> 16;
    while hicarry != 0 || locarry != 0 {
        hi = (hi & 0xFFFF) + locarry;
        lo = (lo & 0xFFFF) + hicarry;
        hicarry = hi >> 16;
        locarry = lo >> 16;
    }

    let mut sum = (hi << 16) + lo;
    if complement {
        sum = 0xFFFFFFFFu32.wrapping_sub(sum);
    }
    sum
}

// ---------------------------------------------------------------------------
// Verification (read path)
// ---------------------------------------------------------------------------

/// Verify the DATASUM keyword against the actual data checksum.
///
/// Returns `Ok(true)` if DATASUM matches, `Ok(false)` if it doesn't,
/// or `Ok(true)` if no DATASUM keyword is present (nothing to verify).
pub fn verify_datasum(fits_data: &[u8], hdu: &Hdu) -> bool {
    let stored = match find_string_keyword(&hdu.cards, "DATASUM") {
        Some(s) => s,
        None => return true,
    };
    let expected: u32 = match stored.trim().parse::<u64>() {
        Ok(v) => v as u32,
        Err(_) => return false,
    };
    let computed = compute_datasum(fits_data, hdu);
    computed == expected
}

/// Verify the CHECKSUM keyword for an entire HDU.
///
/// The total ones-complement checksum of a valid HDU should be -0
/// (i.e. `0x00000000` or `0xFFFFFFFF`).
pub fn verify_checksum(fits_data: &[u8], hdu: &Hdu) -> bool {
    if find_string_keyword(&hdu.cards, "CHECKSUM").is_none() {
        return true;
    }
    let header_end = hdu.data_start;
    let data_padded = padded_byte_len(hdu.data_len);
    let hdu_end = header_end + data_padded;
    if hdu_end > fits_data.len() || hdu.header_start > fits_data.len() {
        return false;
    }
    let hdu_bytes = &fits_data[hdu.header_start..hdu_end];
    if !hdu_bytes.len().is_multiple_of(BLOCK_SIZE) {
        return false;
    }
    let sum = checksum_blocks(hdu_bytes);
    sum == 0 || sum == 0xFFFFFFFF
}

// ---------------------------------------------------------------------------
// Computation (write path)
// ---------------------------------------------------------------------------

/// Compute the DATASUM for an HDU's data blocks.
pub fn compute_datasum(fits_data: &[u8], hdu: &Hdu) -> u32 {
    if hdu.data_len == 0 {
        return 0;
    }
    let data_padded = padded_byte_len(hdu.data_len);
    let data_end = hdu.data_start + data_padded;
    if data_end > fits_data.len() {
        return 0;
    }
    checksum_blocks(&fits_data[hdu.data_start..data_end])
}

/// Stamp CHECKSUM and DATASUM keywords onto a set of header cards.
///
/// Given the raw FITS data and an HDU, computes both checksums and returns
/// a new card list with CHECKSUM and DATASUM inserted (or updated).
/// The caller should then re-serialize the header with these cards.
///
/// This function performs the iterative computation: it first sets
/// `CHECKSUM = '0000000000000000'`, serializes, checksums the whole HDU,
/// then encodes the complement.
pub fn stamp_checksum(cards: &[Card], data_bytes: &[u8]) -> Vec<Card> {
    // Build card list without any existing CHECKSUM/DATASUM.
    let mut new_cards: Vec<Card> = cards
        .iter()
        .filter(|c| {
            let kw = c.keyword_str();
            kw != "CHECKSUM" && kw != "DATASUM"
        })
        .cloned()
        .collect();

    // Compute data checksum.
    let data_padded_len = padded_byte_len(data_bytes.len());
    let mut data_padded = Vec::with_capacity(data_padded_len);
    data_padded.extend_from_slice(data_bytes);
    data_padded.resize(data_padded_len, 0u8);
    let datasum = if data_bytes.is_empty() {
        0u32
    } else {
        checksum_blocks(&data_padded)
    };

    // Add DATASUM card.
    let datasum_card = Card {
        keyword: make_keyword(b"DATASUM"),
        value: Some(Value::String(datasum.to_string())),
        comment: Some(String::from("data unit checksum")),
    };
    new_cards.push(datasum_card);

    // Add CHECKSUM placeholder.
    let checksum_card = Card {
        keyword: make_keyword(b"CHECKSUM"),
        value: Some(Value::String(String::from("0000000000000000"))),
        comment: Some(String::from("HDU checksum")),
    };
    new_cards.push(checksum_card);

    // Serialize header with placeholder, compute HDU checksum.
    let header_bytes = match serialize_header(&new_cards) {
        Ok(h) => h,
        Err(_) => return new_cards,
    };
    let header_sum = checksum_blocks(&header_bytes);

    // Total HDU sum = header_sum + datasum (ones-complement addition).
    let hdu_sum = ones_complement_add(header_sum, datasum);

    // Encode the complement so the HDU sums to -0.
    let encoded = encode_checksum(hdu_sum, true);
    let checksum_str = core::str::from_utf8(&encoded).unwrap_or("0000000000000000");

    // Replace the placeholder with the actual checksum.
    if let Some(card) = new_cards.iter_mut().find(|c| c.keyword_str() == "CHECKSUM") {
        card.value = Some(Value::String(String::from(checksum_str)));
    }

    new_cards
}

/// Ones-complement addition of two 32-bit values.
fn ones_complement_add(a: u32, b: u32) -> u32 {
    let mut hi = (a >> 16) + (b >> 16);
    let mut lo = (a & 0xFFFF) + (b & 0xFFFF);
    let mut hicarry = hi >> 16;
    let mut locarry = lo >> 16;
    while (hicarry | locarry) != 0 {
        hi = (hi & 0xFFFF) + locarry;
        lo = (lo & 0xFFFF) + hicarry;
        hicarry = hi >> 16;
        locarry = lo >> 16;
    }
    (hi << 16) | lo
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_keyword(name: &[u8]) -> [u8; 8] {
    let mut buf = [b' '; 8];
    let len = name.len().min(8);
    buf[..len].copy_from_slice(&name[..len]);
    buf
}

fn find_string_keyword(cards: &[Card], keyword: &str) -> Option<String> {
    cards.iter().find_map(|c| {
        if c.keyword_str() == keyword {
            match &c.value {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            }
        } else {
            None
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
