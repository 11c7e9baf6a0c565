//! PLIO_1 tile decompression: IRAF pixel-list run-length decoding.
//!
//! A PLIO-compressed tile is a 5-word big-endian header followed by a
//! sequence of big-endian 16-bit instruction words. Each instruction word
//! splits into a 4-bit opcode (bits 12..15) and a 12-bit data field. The
//! stream decodes to a flat run-length-expanded list of non-negative pixel
//! values (cfitsio treats PLIO tiles as always unsigned, clamped to `i32`).

use alloc::vec::Vec;

use crate::error::{FitsError as Error, FitsResult as Result};

const OP_SHIFT: u16 = 12;
const DATA_MASK: u16 = 0x0FFF;
const HEADER_WORDS: usize = 5;

/// Decode a PLIO_1 tile to `num_pixels` row-major `i32` samples.
pub fn decompress(compressed: &[u8], num_pixels: usize) -> Result<Vec<i32>> {
    if compressed.len() % 2 != 0 {
        return Err(Error::Decompression("PLIO stream length must be a multiple of 2"));
    }
    let words: Vec<u16> = compressed
        .chunks_exact(2)
        .map(|c| u16::from_be_bytes([c[0], c[1]]))
        .collect();

    if words.len() < HEADER_WORDS {
        return Err(Error::Decompression("PLIO stream shorter than its 5-word header"));
    }

    // Words 1-5 (1-based) encode starting position and total list length.
    // `word(3) > 0` selects the old format (length lives in word 3 alone);
    // otherwise the new format packs a wider length across words 4 and 5.
    let w1 = words[0] as u32;
    let w2 = words[1] as u32;
    let w3 = words[2];
    let w4 = words[3] as u32;
    let w5 = words[4] as u32;
    let _start_position = (w1 << 16) | w2;
    let _list_length = if w3 > 0 { w3 as u32 } else { (w4 << 16) | w5 };

    let mut out = Vec::with_capacity(num_pixels);
    let mut last_value: i32 = 0;
    let mut i = HEADER_WORDS;

    while i < words.len() && out.len() < num_pixels {
        let word = words[i];
        let opcode = word >> OP_SHIFT;
        let data = (word & DATA_MASK) as i32;
        i += 1;

        match opcode {
            // Zero-fill run: `data` pixels of value 0.
            0 => push_run(&mut out, 0, data as usize, num_pixels),
            // Constant run at the current running value, length `data`.
            4 => push_run(&mut out, last_value, data as usize, num_pixels),
            // Single pixel run at value `data` (also sets the running value).
            5 => {
                last_value = data;
                push_run(&mut out, last_value, 1, num_pixels);
            }
            // Load the running value from a 24-bit double-word: `data` is
            // the high 12 bits, the next word's low 12 bits complete it.
            // No pixel is emitted.
            1 => {
                if i >= words.len() {
                    return Err(Error::Decompression("truncated PLIO 24-bit load"));
                }
                let low = (words[i] & DATA_MASK) as i32;
                i += 1;
                last_value = (data << 12) | low;
            }
            // Add `data` to the running value; no pixel emitted.
            2 => last_value += data,
            // Subtract `data` from the running value; no pixel emitted.
            3 => last_value -= data,
            // Add `data` to the running value and emit one pixel.
            6 => {
                last_value += data;
                push_run(&mut out, last_value, 1, num_pixels);
            }
            // Subtract `data` from the running value and emit one pixel.
            7 => {
                last_value -= data;
                push_run(&mut out, last_value, 1, num_pixels);
            }
            _ => return Err(Error::Decompression("invalid PLIO opcode")),
        }
    }

    if out.len() < num_pixels {
        out.resize(num_pixels, last_value);
    }
    out.truncate(num_pixels);
    Ok(out)
}

fn push_run(out: &mut Vec<i32>, value: i32, count: usize, limit: usize) {
    let remaining = limit.saturating_sub(out.len());
    let n = count.min(remaining);
    out.resize(out.len() + n, value);
}

/// Prepend a 5-word old-format PLIO header ahead of `body` (big-endian), for
/// tests that build a raw instruction stream.
#[cfg(test)]
fn with_header(body: &[u16]) -> Vec<u8> {
    let mut words = alloc::vec![0u16, 0u16, (HEADER_WORDS + body.len()) as u16, 0u16, 0u16];
    words.extend_from_slice(body);
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for w in words {
        bytes.extend_from_slice(&w.to_be_bytes());
    }
    bytes
}
