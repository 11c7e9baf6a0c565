//! HiPS (Hierarchical Progressive Survey) tile pyramid builder and reader
//! (§3 "HiPS tile", §4.M). Spherical/HEALPix primitives are treated as an
//! external oracle ([`address::HealpixOracle`]); this module owns tile
//! addressing, the build/read pipeline, allsky assembly, and MOC emission.

pub mod address;
pub mod allsky;
pub mod dataset;
pub mod moc;
pub mod properties;
pub mod reproject;
pub mod tile;
pub mod wcs;

pub use address::{allsky_path, dir_index, nside, parse_tile_path, tile_count, tile_path, validate_ipix, HealpixOracle};
pub use dataset::{build_dataset, cutout, export_map, read_tile, BuildOptions, CutoutRequest, PixelOrdering, SourceFrame};
pub use moc::{from_uniq, to_uniq, Moc};
pub use properties::{Properties, REQUIRED_KEYS};
pub use reproject::{reproject_tile, Interpolation, SourcePlane};
pub use tile::{TileBuffer, TileFormat};
pub use wcs::{angular_separation_deg, Footprint, LinearWcs};
