//! Minimal linear WCS (World Coordinate System) reader (§4.M step 1).
//!
//! The projection math itself is out of scope (§1: "the focus is on the
//! tile-addressing and I/O contract"); this module only extracts the linear
//! plate-scale keywords a source FITS header carries and converts between
//! pixel and a tangent-plane approximation of sky coordinates. Anything
//! needing exact spherical astrometry (SIP distortion, full projections)
//! is the caller's concern.

use std::string::String;
use std::vec::Vec;

use crate::error::{HipsError as Error, HipsResult as Result};
use crate::fits::header::Card;
use crate::fits::value::Value;

fn card_f64(cards: &[Card], keyword: &str) -> Option<f64> {
    cards.iter().find(|c| c.keyword_str() == keyword).and_then(|c| match &c.value {
        Some(Value::Float(f)) => Some(*f),
        Some(Value::Integer(n)) => Some(*n as f64),
        _ => None,
    })
}

fn card_string(cards: &[Card], keyword: &str) -> Option<String> {
    cards.iter().find(|c| c.keyword_str() == keyword).and_then(|c| match &c.value {
        Some(Value::String(s)) => Some(s.trim().to_string()),
        _ => None,
    })
}

/// A linear, two-axis WCS: reference pixel/value plus a CD (or CDELT-derived)
/// matrix, in degrees per pixel. Supports the subset of FITS WCS keywords
/// needed to place tiles on the sky: `CRPIX{1,2}`, `CRVAL{1,2}`,
/// `CD{1,2}_{1,2}` or `CDELT{1,2}` (+ optional `CROTA2`), and `CTYPE{1,2}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearWcs {
    pub crpix1: f64,
    pub crpix2: f64,
    pub crval1: f64,
    pub crval2: f64,
    pub cd11: f64,
    pub cd12: f64,
    pub cd21: f64,
    pub cd22: f64,
}

impl LinearWcs {
    /// Read a `LinearWcs` from a header's cards. Requires `CRPIX1/2` and
    /// `CRVAL1/2`; the scale matrix comes from `CD1_1.../CD2_2` if present,
    /// otherwise from `CDELT1/2` (optionally rotated by `CROTA2`, degrees).
    pub fn from_cards(cards: &[Card]) -> Result<LinearWcs> {
        let crpix1 = card_f64(cards, "CRPIX1").ok_or(Error::Validation("missing CRPIX1"))?;
        let crpix2 = card_f64(cards, "CRPIX2").ok_or(Error::Validation("missing CRPIX2"))?;
        let crval1 = card_f64(cards, "CRVAL1").ok_or(Error::Validation("missing CRVAL1"))?;
        let crval2 = card_f64(cards, "CRVAL2").ok_or(Error::Validation("missing CRVAL2"))?;

        if let (Some(cd11), Some(cd12), Some(cd21), Some(cd22)) = (
            card_f64(cards, "CD1_1"),
            card_f64(cards, "CD1_2"),
            card_f64(cards, "CD2_1"),
            card_f64(cards, "CD2_2"),
        ) {
            return Ok(LinearWcs { crpix1, crpix2, crval1, crval2, cd11, cd12, cd21, cd22 });
        }

        let cdelt1 = card_f64(cards, "CDELT1").ok_or(Error::Validation("missing CDELT1/CD1_1"))?;
        let cdelt2 = card_f64(cards, "CDELT2").ok_or(Error::Validation("missing CDELT2/CD2_2"))?;
        let rot = card_f64(cards, "CROTA2").unwrap_or(0.0).to_radians();
        let (sin_r, cos_r) = (rot.sin(), rot.cos());
        Ok(LinearWcs {
            crpix1,
            crpix2,
            crval1,
            crval2,
            cd11: cdelt1 * cos_r,
            cd12: -cdelt2 * sin_r,
            cd21: cdelt1 * sin_r,
            cd22: cdelt2 * cos_r,
        })
    }

    /// Whether either axis carries a recognized spherical `CTYPE` (used to
    /// decide whether small-angle tangent-plane math is a fair
    /// approximation); purely informational, does not change any transform.
    pub fn ctype_is_spherical(cards: &[Card]) -> bool {
        let t1 = card_string(cards, "CTYPE1").unwrap_or_default();
        let t2 = card_string(cards, "CTYPE2").unwrap_or_default();
        t1.contains("RA") || t1.contains("GLON") || t2.contains("DEC") || t2.contains("GLAT")
    }

    /// Pixel scale in degrees/pixel along each axis (determinant-based,
    /// independent of rotation): `sqrt(|det(CD)|)` per axis approximated
    /// from the matrix's row norms.
    pub fn pixel_scale_deg(&self) -> (f64, f64) {
        let sx = (self.cd11 * self.cd11 + self.cd21 * self.cd21).sqrt();
        let sy = (self.cd12 * self.cd12 + self.cd22 * self.cd22).sqrt();
        (sx, sy)
    }

    /// 1-indexed pixel `(x, y)` -> tangent-plane sky `(ra_deg, dec_deg)`,
    /// a flat approximation valid near the reference point. `dec` is
    /// corrected for the `cos(dec)` convergence of RA at the reference
    /// latitude, matching the small-field approximation standard tools use
    /// for tile footprint estimation.
    pub fn pixel_to_sky_deg(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.crpix1;
        let dy = y - self.crpix2;
        let xi = self.cd11 * dx + self.cd12 * dy;
        let eta = self.cd21 * dx + self.cd22 * dy;
        let cos_dec0 = self.crval2.to_radians().cos();
        let ra = self.crval1 + if cos_dec0.abs() > 1e-12 { xi / cos_dec0 } else { xi };
        let dec = self.crval2 + eta;
        (ra, dec)
    }

    /// Inverse of [`Self::pixel_to_sky_deg`].
    pub fn sky_to_pixel_deg(&self, ra_deg: f64, dec_deg: f64) -> Option<(f64, f64)> {
        let cos_dec0 = self.crval2.to_radians().cos();
        let xi = (ra_deg - self.crval1) * if cos_dec0.abs() > 1e-12 { cos_dec0 } else { 1.0 };
        let eta = dec_deg - self.crval2;
        let det = self.cd11 * self.cd22 - self.cd12 * self.cd21;
        if det.abs() < 1e-18 {
            return None;
        }
        let dx = (self.cd22 * xi - self.cd12 * eta) / det;
        let dy = (-self.cd21 * xi + self.cd11 * eta) / det;
        Some((self.crpix1 + dx, self.crpix2 + dy))
    }

    /// The angular-degree center and maximum corner-to-center distance of an
    /// image `width x height` pixels (§4.M step 3).
    pub fn footprint(&self, width: usize, height: usize) -> Footprint {
        let center_x = (width as f64 + 1.0) / 2.0;
        let center_y = (height as f64 + 1.0) / 2.0;
        let (center_ra, center_dec) = self.pixel_to_sky_deg(center_x, center_y);

        let corners: Vec<(f64, f64)> = std::vec![
            (1.0, 1.0),
            (width as f64, 1.0),
            (1.0, height as f64),
            (width as f64, height as f64),
        ];
        let radius_deg = corners
            .into_iter()
            .map(|(x, y)| {
                let (ra, dec) = self.pixel_to_sky_deg(x, y);
                angular_separation_deg(center_ra, center_dec, ra, dec)
            })
            .fold(0.0_f64, f64::max);

        Footprint { center_ra_deg: center_ra, center_dec_deg: center_dec, radius_deg }
    }
}

/// The great-circle (haversine) separation between two sky points, in
/// degrees; used both for footprint radius and disc-query padding.
pub fn angular_separation_deg(ra1: f64, dec1: f64, ra2: f64, dec2: f64) -> f64 {
    let (ra1, dec1, ra2, dec2) = (ra1.to_radians(), dec1.to_radians(), ra2.to_radians(), dec2.to_radians());
    let dra = ra2 - ra1;
    let ddec = dec2 - dec1;
    let a = (ddec / 2.0).sin().powi(2) + dec1.cos() * dec2.cos() * (dra / 2.0).sin().powi(2);
    2.0 * a.sqrt().asin().to_degrees()
}

/// Source footprint on the sphere (§4.M step 3): a center and the maximum
/// angular distance from center to any corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub center_ra_deg: f64,
    pub center_dec_deg: f64,
    pub radius_deg: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::header::Card;
    use crate::fits::value::Value;

    fn card(keyword: &str, value: Value) -> Card {
        let mut kw = [b' '; 8];
        kw[..keyword.len()].copy_from_slice(keyword.as_bytes());
        Card { keyword: kw, value: Some(value), comment: None }
    }

    #[test]
    fn reads_cd_matrix_directly() {
        let cards = std::vec![
            card("CRPIX1", Value::Float(50.0)),
            card("CRPIX2", Value::Float(50.0)),
            card("CRVAL1", Value::Float(180.0)),
            card("CRVAL2", Value::Float(0.0)),
            card("CD1_1", Value::Float(-0.001)),
            card("CD1_2", Value::Float(0.0)),
            card("CD2_1", Value::Float(0.0)),
            card("CD2_2", Value::Float(0.001)),
        ];
        let wcs = LinearWcs::from_cards(&cards).unwrap();
        let (ra, dec) = wcs.pixel_to_sky_deg(50.0, 50.0);
        assert!((ra - 180.0).abs() < 1e-9);
        assert!((dec - 0.0).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_cdelt() {
        let cards = std::vec![
            card("CRPIX1", Value::Float(1.0)),
            card("CRPIX2", Value::Float(1.0)),
            card("CRVAL1", Value::Float(10.0)),
            card("CRVAL2", Value::Float(20.0)),
            card("CDELT1", Value::Float(-0.0002)),
            card("CDELT2", Value::Float(0.0002)),
        ];
        let wcs = LinearWcs::from_cards(&cards).unwrap();
        assert!((wcs.cd11 - (-0.0002)).abs() < 1e-12);
        assert!((wcs.cd22 - 0.0002).abs() < 1e-12);
    }

    #[test]
    fn sky_to_pixel_is_the_inverse_of_pixel_to_sky() {
        let cards = std::vec![
            card("CRPIX1", Value::Float(50.0)),
            card("CRPIX2", Value::Float(60.0)),
            card("CRVAL1", Value::Float(100.0)),
            card("CRVAL2", Value::Float(-30.0)),
            card("CDELT1", Value::Float(-0.0003)),
            card("CDELT2", Value::Float(0.0003)),
        ];
        let wcs = LinearWcs::from_cards(&cards).unwrap();
        let (ra, dec) = wcs.pixel_to_sky_deg(120.0, 80.0);
        let (x, y) = wcs.sky_to_pixel_deg(ra, dec).unwrap();
        assert!((x - 120.0).abs() < 1e-6);
        assert!((y - 80.0).abs() < 1e-6);
    }

    #[test]
    fn footprint_radius_covers_all_corners() {
        let cards = std::vec![
            card("CRPIX1", Value::Float(5.0)),
            card("CRPIX2", Value::Float(5.0)),
            card("CRVAL1", Value::Float(0.0)),
            card("CRVAL2", Value::Float(0.0)),
            card("CDELT1", Value::Float(-0.001)),
            card("CDELT2", Value::Float(0.001)),
        ];
        let wcs = LinearWcs::from_cards(&cards).unwrap();
        let fp = wcs.footprint(10, 10);
        assert!(fp.radius_deg > 0.0);
        assert!(fp.radius_deg < 1.0);
    }
}
