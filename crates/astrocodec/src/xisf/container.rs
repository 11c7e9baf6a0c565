//! Binary framing for the two XISF container shapes (§4.F, §6): the
//! monolithic file (signature + XML header + attachments) and the XISB
//! sidecar index used by distributed XISF.

use crate::error::{XisfError as Error, XisfResult as Result};

/// 8-byte signature at the start of every monolithic XISF file.
pub const MONOLITHIC_SIGNATURE: &[u8; 8] = b"XISF0100";

/// 8-byte signature at the start of every XISB sidecar file.
pub const XISB_SIGNATURE: &[u8; 8] = b"XISB0100";

/// Byte offset at which the XML header text begins in a monolithic file.
pub const MONOLITHIC_PREFIX_LEN: usize = 16;

/// A parsed monolithic container: the XML header text and the byte range
/// attachments are addressed against (absolute offsets into the original
/// buffer, so `attachment:<pos>:<size>` locations slice directly).
#[derive(Debug)]
pub struct MonolithicFile<'a> {
    /// The UTF-8 XML header text.
    pub xml: &'a str,
    /// The full source buffer, so attachment byte ranges can be sliced by
    /// absolute position without re-copying.
    pub buffer: &'a [u8],
}

/// Parse the monolithic XISF prefix: `XISF0100` + `u32 headerLen LE` +
/// 4 reserved bytes + UTF-8 XML header of `headerLen` bytes.
pub fn parse_monolithic(buffer: &[u8]) -> Result<MonolithicFile<'_>> {
    if buffer.len() < MONOLITHIC_PREFIX_LEN {
        return Err(Error::Format("buffer shorter than the monolithic XISF prefix"));
    }
    if &buffer[0..8] != MONOLITHIC_SIGNATURE {
        return Err(Error::Format("missing XISF0100 signature"));
    }
    let header_len = u32::from_le_bytes(buffer[8..12].try_into().unwrap()) as usize;
    // bytes 12..16 are reserved.
    let xml_start = MONOLITHIC_PREFIX_LEN;
    let xml_end = xml_start.checked_add(header_len).ok_or(Error::Format("header length overflow"))?;
    if xml_end > buffer.len() {
        return Err(Error::Format("header length extends past end of file"));
    }
    let xml = core::str::from_utf8(&buffer[xml_start..xml_end])
        .map_err(|_| Error::Format("XML header is not valid UTF-8"))?;
    Ok(MonolithicFile { xml, buffer })
}

/// Serialize the monolithic prefix for `xml`, returning the bytes that
/// precede the attachment region. Callers append attachment bytes (already
/// placed at the positions recorded in `xml`) to the result.
pub fn write_monolithic_prefix(xml: &str) -> std::vec::Vec<u8> {
    let mut out = std::vec::Vec::with_capacity(MONOLITHIC_PREFIX_LEN + xml.len());
    out.extend_from_slice(MONOLITHIC_SIGNATURE);
    out.extend_from_slice(&(xml.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(xml.as_bytes());
    out
}

/// One entry in an XISB index node: the block this unique id resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XisbEntry {
    pub unique_id: u64,
    pub block_position: u64,
    pub block_length: u64,
    pub uncompressed_block_length: u64,
    pub free: u64,
}

/// Byte width of one serialized [`XisbEntry`] (five little-endian `u64`s).
const ENTRY_LEN: usize = 40;
pub(crate) const XISB_ENTRY_LEN: usize = ENTRY_LEN;
/// Byte width of a node's fixed header: `length: u32` + `nextNode: u64`.
pub(crate) const NODE_HEADER_LEN: usize = 12;
/// Reserved bytes following the `XISB0100` signature.
const XISB_RESERVED_LEN: usize = 8;
/// Byte offset of the first index node: signature + reserved bytes.
pub(crate) const XISB_PREFIX_LEN: usize = 8 + XISB_RESERVED_LEN;

/// A parsed XISB index: every entry across every node of the linked list,
/// in list order.
#[derive(Debug, Default)]
pub struct XisbIndex {
    pub entries: std::vec::Vec<XisbEntry>,
}

impl XisbIndex {
    /// Look up the block addressed by `unique_id`.
    pub fn find(&self, unique_id: u64) -> Option<&XisbEntry> {
        self.entries.iter().find(|e| e.unique_id == unique_id)
    }
}

/// Parse an XISB sidecar buffer: signature, reserved bytes, then a
/// singly-linked list of index nodes. `nextNode` is the absolute byte
/// offset of the next node, or `0` to terminate the list. Cyclic lists
/// (a node offset revisited) are rejected.
pub fn parse_xisb_index(buffer: &[u8]) -> Result<XisbIndex> {
    let prefix_len = XISB_PREFIX_LEN;
    if buffer.len() < prefix_len {
        return Err(Error::Format("buffer shorter than the XISB prefix"));
    }
    if &buffer[0..8] != XISB_SIGNATURE {
        return Err(Error::Format("missing XISB0100 signature"));
    }

    let mut index = XisbIndex::default();
    let mut visited = std::vec::Vec::new();
    let mut offset = prefix_len;

    loop {
        if offset == 0 {
            break;
        }
        if visited.contains(&offset) {
            return Err(Error::Format("cyclic XISB index node chain"));
        }
        visited.push(offset);

        if offset + NODE_HEADER_LEN > buffer.len() {
            return Err(Error::Format("truncated XISB index node header"));
        }
        let node_len = u32::from_le_bytes(buffer[offset..offset + 4].try_into().unwrap()) as usize;
        let next_node = u64::from_le_bytes(buffer[offset + 4..offset + 12].try_into().unwrap()) as usize;

        let node_end = offset.checked_add(node_len).ok_or(Error::Format("XISB node length overflow"))?;
        if node_end > buffer.len() || node_len < NODE_HEADER_LEN {
            return Err(Error::Format("XISB index node length out of range"));
        }

        let entries_bytes = &buffer[offset + NODE_HEADER_LEN..node_end];
        if entries_bytes.len() % ENTRY_LEN != 0 {
            return Err(Error::Format("XISB index node entries not a multiple of entry size"));
        }
        for chunk in entries_bytes.chunks_exact(ENTRY_LEN) {
            index.entries.push(XisbEntry {
                unique_id: u64::from_le_bytes(chunk[0..8].try_into().unwrap()),
                block_position: u64::from_le_bytes(chunk[8..16].try_into().unwrap()),
                block_length: u64::from_le_bytes(chunk[16..24].try_into().unwrap()),
                uncompressed_block_length: u64::from_le_bytes(chunk[24..32].try_into().unwrap()),
                free: u64::from_le_bytes(chunk[32..40].try_into().unwrap()),
            });
        }

        offset = if next_node == 0 { 0 } else { next_node };
    }

    Ok(index)
}

/// Serialize an XISB index as a single node (the writer never splits across
/// nodes; `nextNode` is always `0`).
pub fn write_xisb_index(entries: &[XisbEntry]) -> std::vec::Vec<u8> {
    let mut out = std::vec::Vec::with_capacity(8 + XISB_RESERVED_LEN + NODE_HEADER_LEN + entries.len() * ENTRY_LEN);
    out.extend_from_slice(XISB_SIGNATURE);
    out.extend_from_slice(&[0u8; XISB_RESERVED_LEN]);

    let node_len = (NODE_HEADER_LEN + entries.len() * ENTRY_LEN) as u32;
    out.extend_from_slice(&node_len.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes()); // nextNode = 0 (end of list)

    for e in entries {
        out.extend_from_slice(&e.unique_id.to_le_bytes());
        out.extend_from_slice(&e.block_position.to_le_bytes());
        out.extend_from_slice(&e.block_length.to_le_bytes());
        out.extend_from_slice(&e.uncompressed_block_length.to_le_bytes());
        out.extend_from_slice(&e.free.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monolithic_round_trip() {
        let xml = "<xisf version=\"1.0\"></xisf>";
        let prefix = write_monolithic_prefix(xml);
        let parsed = parse_monolithic(&prefix).unwrap();
        assert_eq!(parsed.xml, xml);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = write_monolithic_prefix("<xisf/>");
        bytes[0] = b'Y';
        assert!(parse_monolithic(&bytes).is_err());
    }

    #[test]
    fn xisb_round_trip_by_id() {
        let entries = std::vec![
            XisbEntry { unique_id: 1, block_position: 100, block_length: 10, uncompressed_block_length: 20, free: 0 },
            XisbEntry { unique_id: 2, block_position: 110, block_length: 30, uncompressed_block_length: 30, free: 0 },
        ];
        let bytes = write_xisb_index(&entries);
        let index = parse_xisb_index(&bytes).unwrap();
        assert_eq!(index.find(1).unwrap().block_position, 100);
        assert_eq!(index.find(2).unwrap().block_length, 30);
    }

    #[test]
    fn xisb_rejects_cycle() {
        // Hand-build a node whose nextNode points back at the first node.
        let mut bytes = std::vec::Vec::new();
        bytes.extend_from_slice(XISB_SIGNATURE);
        bytes.extend_from_slice(&[0u8; XISB_RESERVED_LEN]);
        let first_offset = bytes.len() as u64;
        bytes.extend_from_slice(&(NODE_HEADER_LEN as u32).to_le_bytes());
        bytes.extend_from_slice(&first_offset.to_le_bytes());
        assert!(parse_xisb_index(&bytes).is_err());
    }
}
