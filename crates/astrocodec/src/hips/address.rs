//! HEALPix `(order, ipix)` tile addressing and directory path layout (§3
//! "HiPS tile", §4.M step 4/9, §6 "HiPS directory").

use std::string::String;

use crate::error::{HipsError as Error, HipsResult as Result};

/// `nside = 2^order`, the HEALPix resolution parameter for a given order.
pub fn nside(order: u8) -> u64 {
    1u64 << order
}

/// Total tile count at `order`: `12 * nside^2`.
pub fn tile_count(order: u8) -> u64 {
    12 * nside(order) * nside(order)
}

/// Validate that `ipix` is addressable at `order` (`ipix < 12*nside^2`).
pub fn validate_ipix(order: u8, ipix: u64) -> Result<()> {
    if ipix >= tile_count(order) {
        return Err(Error::Validation("ipix out of range for this order"));
    }
    Ok(())
}

/// The directory a tile's file lives under: `Dir(floor(ipix/10000)*10000)`.
pub fn dir_index(ipix: u64) -> u64 {
    (ipix / 10_000) * 10_000
}

/// Build the HiPS-relative path for tile `(order, ipix)` with extension `ext`
/// (without the leading dot, e.g. `"fits"`, `"png"`).
pub fn tile_path(order: u8, ipix: u64, ext: &str) -> Result<String> {
    validate_ipix(order, ipix)?;
    Ok(std::format!("Norder{order}/Dir{}/Npix{ipix}.{ext}", dir_index(ipix)))
}

/// Parse a `NorderK/DirM/NpixJ.<ext>` path back into `(order, ipix, ext)`.
/// Does not validate that `M` matches `dir_index(ipix)`; callers that care
/// about a well-formed dataset should check `dir_index(ipix) == M`.
pub fn parse_tile_path(path: &str) -> Result<(u8, u64, String)> {
    let mut parts = path.trim_start_matches('/').splitn(3, '/');
    let norder = parts.next().ok_or(Error::Format("tile path missing Norder component"))?;
    let _dir = parts.next().ok_or(Error::Format("tile path missing Dir component"))?;
    let npix_file = parts.next().ok_or(Error::Format("tile path missing Npix component"))?;

    let order: u8 = norder.strip_prefix("Norder").ok_or(Error::Format("tile path missing Norder prefix"))?.parse().map_err(|_| Error::Format("malformed Norder component"))?;

    let (npix, ext) = npix_file.rsplit_once('.').ok_or(Error::Format("tile filename missing extension"))?;
    let ipix: u64 = npix.strip_prefix("Npix").ok_or(Error::Format("tile filename missing Npix prefix"))?.parse().map_err(|_| Error::Format("malformed Npix component"))?;
    validate_ipix(order, ipix)?;
    Ok((order, ipix, ext.to_string()))
}

/// The path for the order-3 allsky grid image: `Norder3/Allsky.<ext>`.
pub fn allsky_path(ext: &str) -> String {
    std::format!("Norder3/Allsky.{ext}")
}

/// An abstraction over the spherical geometry this crate treats as external
/// (§4.M step 4: "using `query_disc_inclusive_nest` from an external HEALPix
/// oracle"). Implementations provide the actual HEALPix math; this crate
/// only needs the resulting pixel set to drive tile enumeration and I/O.
pub trait HealpixOracle {
    /// Every NESTED-ordering `ipix` at `order` whose tile overlaps a disc of
    /// `radius_rad` around `(ra_rad, dec_rad)`, inclusive of partially
    /// overlapping tiles.
    fn query_disc_inclusive_nest(&self, order: u8, ra_rad: f64, dec_rad: f64, radius_rad: f64) -> Vec<u64>;

    /// The maximum angular pixel radius at `order`, used to pad disc queries
    /// so no partially-covered tile near the query boundary is missed.
    fn max_pixrad(&self, order: u8) -> f64;

    /// The `(ra_rad, dec_rad)` center of tile `ipix` at `order`, used for MOC
    /// emission and allsky-grid bookkeeping.
    fn tile_center(&self, order: u8, ipix: u64) -> (f64, f64);
}
