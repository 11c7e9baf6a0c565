//! GZIP_1 / GZIP_2 tile decompression: a thin wrapper over `miniz_oxide`
//! that also tolerates bare zlib and raw-deflate streams.

use alloc::vec::Vec;

use crate::error::{FitsError as Error, FitsResult as Result};

/// Strip the gzip header and trailer, returning the raw deflate payload.
fn strip_gzip_header(data: &[u8]) -> Result<&[u8]> {
    if data.len() < 18 || data[0] != 0x1f || data[1] != 0x8b || data[2] != 0x08 {
        return Err(Error::Decompression("not a valid gzip member"));
    }
    let flg = data[3];
    let mut pos = 10usize;
    if flg & 0x04 != 0 {
        if pos + 2 > data.len() {
            return Err(Error::Decompression("truncated gzip FEXTRA field"));
        }
        let xlen = u16::from_le_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2 + xlen;
    }
    if flg & 0x08 != 0 {
        while pos < data.len() && data[pos] != 0 {
            pos += 1;
        }
        pos += 1;
    }
    if flg & 0x10 != 0 {
        while pos < data.len() && data[pos] != 0 {
            pos += 1;
        }
        pos += 1;
    }
    if flg & 0x02 != 0 {
        pos += 2;
    }
    if pos >= data.len() || data.len() < pos + 8 {
        return Err(Error::Decompression("gzip member truncated before trailer"));
    }
    Ok(&data[pos..data.len() - 8])
}

/// Decompress a GZIP_1/GZIP_2 compressed tile to raw bytes.
pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    if compressed.len() >= 2 && compressed[0] == 0x1f && compressed[1] == 0x8b {
        let deflate_payload = strip_gzip_header(compressed)?;
        return miniz_oxide::inflate::decompress_to_vec(deflate_payload)
            .map_err(|_| Error::Decompression("deflate stream corrupt"));
    }
    miniz_oxide::inflate::decompress_to_vec_zlib(compressed)
        .or_else(|_| miniz_oxide::inflate::decompress_to_vec(compressed))
        .map_err(|_| Error::Decompression("zlib/deflate stream corrupt"))
}

/// Reinterpret big-endian decompressed bytes as `i32` values.
pub fn bytes_to_i32(data: &[u8]) -> Vec<i32> {
    data.chunks_exact(4)
        .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
