//! Extensible Image Serialization Format (XISF) reader/writer (§3, §4).
//!
//! A unit is an XML header (one `<xisf>` document) describing Image/Table/
//! Property elements, each pointing at a [`datablock::DataBlock`] whose bytes
//! may live inline, in a monolithic file's attachment region, or in an
//! external XISB sidecar / arbitrary `url:`/`path:` resource.

pub mod container;
pub mod datablock;
pub mod image;
pub mod property;
pub mod resolver;
pub mod signature;
pub mod table;
pub mod unit;
pub mod writer;
pub mod xml;

pub use datablock::{Checksum, ChecksumAlgorithm, Compression, CompressionCodec, DataBlock, Location};
pub use image::{ColorSpace, DecodedImage, FitsKeyword, Image, PixelStorage, SampleFormat};
pub use property::{Property, PropertyType, PropertyValue};
pub use resolver::{FsResolver, MemoryResolver, NullResolver, ResourceResolver};
pub use signature::{SignaturePolicy, SignatureVerdict};
pub use table::{Table, TableColumn};
pub use unit::{parse_header, parse_monolithic, ParsePolicy, Unit};
pub use writer::{write_distributed, write_monolithic, UnitToWrite, WriterOptions};
