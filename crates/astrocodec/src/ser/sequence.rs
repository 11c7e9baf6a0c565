//! Frame access and whole-sequence (de)serialization for SER files.

use alloc::vec::Vec;

use crate::error::{SerError as Error, SerResult as Result, StrictPolicy, Warning, WarningSink};
use crate::ser::header::{EndianPolicy, SerHeader, HEADER_LEN, TIMESTAMP_LEN};

/// .NET `DateTime` ticks per second (100 ns resolution), the unit SER
/// timestamps are written in.
pub const TICKS_PER_SECOND: f64 = 10_000_000.0;

/// A single decoded frame: one interleaved sample buffer per the sequence's
/// color layout, plus its timestamp if the file carries a trailer.
#[derive(Debug, Clone)]
pub struct SerFrame {
    /// Raw interleaved samples, host-endian, one entry per (pixel, channel).
    pub samples: Vec<u16>,
    /// Ticks since `0001-01-01T00:00:00`, if the trailer is present.
    pub timestamp: Option<u64>,
}

/// A parsed SER sequence: header plus access to its frame data and optional
/// timestamp trailer.
#[derive(Debug, Clone)]
pub struct SerSequence {
    pub header: SerHeader,
    frame_bytes: Vec<u8>,
    timestamps: Vec<u64>,
    little_endian: bool,
}

impl SerSequence {
    /// Parse a complete SER file with the default (`Compat`) endianness
    /// policy and strict validation.
    pub fn parse(buf: &[u8]) -> Result<SerSequence> {
        Self::parse_with(buf, EndianPolicy::Compat, StrictPolicy::STRICT, &mut crate::error::NullSink)
    }

    /// Parse a complete SER file, choosing how the `endianFlag` field is
    /// interpreted and how strictly the frame/trailer size is enforced.
    pub fn parse_with(
        buf: &[u8],
        endian_policy: EndianPolicy,
        policy: StrictPolicy,
        sink: &mut dyn WarningSink,
    ) -> Result<SerSequence> {
        let header = SerHeader::parse(buf)?;
        let stride = header.frame_stride();
        let declared_len = stride * header.frame_count as usize;
        let available = buf.len() - HEADER_LEN;

        let frame_bytes_len = if available >= declared_len {
            declared_len
        } else if policy.strict {
            return Err(Error::Format("file too short for declared frame count"));
        } else {
            sink.warn(Warning::Generic(alloc::format!(
                "file holds only {available} of {declared_len} declared frame bytes; truncating"
            )));
            available
        };

        let frame_bytes = buf[HEADER_LEN..HEADER_LEN + frame_bytes_len].to_vec();

        let trailer_start = HEADER_LEN + declared_len;
        let trailer_needed = header.frame_count as usize * TIMESTAMP_LEN;
        let mut timestamps = Vec::new();
        if buf.len() >= trailer_start + trailer_needed && trailer_needed > 0 {
            for i in 0..header.frame_count as usize {
                let off = trailer_start + i * TIMESTAMP_LEN;
                timestamps.push(u64::from_le_bytes(buf[off..off + 8].try_into().unwrap()));
            }
            for w in timestamps.windows(2) {
                if w[1] < w[0] {
                    if policy.strict {
                        return Err(Error::Validation("frame timestamps are not monotonic"));
                    }
                    sink.warn(Warning::TimestampOutOfOrder { frame_index: 1 });
                }
            }
        }

        let little_endian = if stride > 0 && !frame_bytes.is_empty() {
            endian_policy.resolve_little_endian(
                header.raw_endian_flag,
                &frame_bytes[..frame_bytes.len().min(4096)],
                header.bytes_per_sample(),
            )
        } else {
            true
        };

        Ok(SerSequence {
            header,
            frame_bytes,
            timestamps,
            little_endian,
        })
    }

    /// Number of complete frames available.
    pub fn frame_count(&self) -> usize {
        let stride = self.header.frame_stride();
        if stride == 0 {
            0
        } else {
            self.frame_bytes.len() / stride
        }
    }

    /// Decode frame `index`, interleaved samples in channel order as stored
    /// (use [`SerFrame::to_rgb`] to normalize BGR to RGB order).
    pub fn get_frame(&self, index: usize) -> Result<SerFrame> {
        let stride = self.header.frame_stride();
        if index >= self.frame_count() {
            return Err(Error::Validation("frame index out of range"));
        }
        let bps = self.header.bytes_per_sample();
        let start = index * stride;
        let raw = &self.frame_bytes[start..start + stride];

        let samples = if bps == 1 {
            raw.iter().map(|&b| b as u16).collect()
        } else {
            raw.chunks_exact(2)
                .map(|c| {
                    if self.little_endian {
                        u16::from_le_bytes([c[0], c[1]])
                    } else {
                        u16::from_be_bytes([c[0], c[1]])
                    }
                })
                .collect()
        };

        Ok(SerFrame {
            samples,
            timestamp: self.timestamps.get(index).copied(),
        })
    }

    /// Decode frame `index` and normalize channel order to RGB (a no-op for
    /// mono and Bayer layouts; swaps R/B for `colorID=101`).
    pub fn get_frame_rgb(&self, index: usize) -> Result<SerFrame> {
        let mut frame = self.get_frame(index)?;
        if self.header.color_id.is_reversed() {
            let channels = self.header.channel_count();
            for px in frame.samples.chunks_mut(channels) {
                px.swap(0, channels - 1);
            }
        }
        Ok(frame)
    }

    /// All trailer timestamps, if present.
    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }

    /// Span between the first and last trailer timestamp, in ticks.
    pub fn duration_ticks(&self) -> Option<u64> {
        match (self.timestamps.first(), self.timestamps.last()) {
            (Some(&first), Some(&last)) if self.timestamps.len() > 1 => Some(last - first),
            _ => None,
        }
    }

    /// Mean frame rate implied by the timestamp trailer, in frames/second.
    pub fn estimated_fps(&self) -> Option<f64> {
        let n = self.timestamps.len();
        if n < 2 {
            return None;
        }
        let ticks = self.duration_ticks()? as f64;
        if ticks == 0.0 {
            return None;
        }
        Some((n - 1) as f64 * TICKS_PER_SECOND / ticks)
    }

    /// Serialize the sequence back to a complete SER byte buffer.
    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.frame_bytes.len() + self.timestamps.len() * 8);
        out.extend_from_slice(&self.header.write());
        out.extend_from_slice(&self.frame_bytes);
        for &ts in &self.timestamps {
            out.extend_from_slice(&ts.to_le_bytes());
        }
        out
    }

    /// Build a new sequence from a header, raw frame byte region (already in
    /// the sequence's native endianness), and optional per-frame timestamps.
    pub fn from_parts(header: SerHeader, frame_bytes: Vec<u8>, timestamps: Vec<u64>) -> SerSequence {
        let little_endian = header.raw_endian_flag == 0;
        SerSequence {
            header,
            frame_bytes,
            timestamps,
            little_endian,
        }
    }
}
