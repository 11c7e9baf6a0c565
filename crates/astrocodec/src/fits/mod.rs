//! FITS (Flexible Image Transport System) container support: header parsing,
//! primary/extension HDUs, image and table data, tile-compressed images, and
//! checksums.

pub mod bintable;
pub mod block;
pub mod checksum;
pub mod codecs;
pub mod endian;
pub mod extension;
pub mod hdu;
pub mod header;
pub mod image;
pub mod io;
pub mod primary;
pub mod table;
pub mod tiled;
pub mod value;
