//! SER (Simple sEquence Recorder) raw frame sequence codec.
//!
//! A SER file is a fixed 178-byte header followed by `frameCount` frames of
//! identical byte stride, with an optional 8-byte-per-frame timestamp
//! trailer. See §4.K / §6 of the format contract for the exact byte layout.

mod header;
mod sequence;

pub use header::{pack_ascii40, unpack_ascii40, ColorId, EndianPolicy, SerHeader, FILE_ID, HEADER_LEN, TIMESTAMP_LEN};
pub use sequence::{SerFrame, SerSequence, TICKS_PER_SECOND};
