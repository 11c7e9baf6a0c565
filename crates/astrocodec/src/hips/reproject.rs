//! Reprojecting a source image plane into a HiPS tile buffer (§4.M step 5).
//!
//! The sky<->pixel projection itself is supplied by the caller (a
//! [`super::wcs::LinearWcs`] for the source, a [`TileProjector`] for the
//! tile); this module only walks the destination tile's pixel grid and
//! samples the source plane per the configured interpolation kernel.

use std::vec::Vec;

use super::tile::TileBuffer;

/// Interpolation kernel used when resampling a source plane onto a tile
/// grid (§4.M step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    Bilinear,
    Bicubic,
}

/// A single source image plane sampled by floating-point pixel coordinate,
/// `NAN` (or the configured blank) outside its bounds.
pub struct SourcePlane<'a> {
    pub width: usize,
    pub height: usize,
    pub samples: &'a [f64],
}

impl SourcePlane<'_> {
    fn at(&self, x: i64, y: i64) -> f64 {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return f64::NAN;
        }
        self.samples[y as usize * self.width + x as usize]
    }

    fn nearest(&self, x: f64, y: f64) -> f64 {
        self.at(x.round() as i64, y.round() as i64)
    }

    fn bilinear(&self, x: f64, y: f64) -> f64 {
        let x0 = x.floor();
        let y0 = y.floor();
        let (tx, ty) = (x - x0, y - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);
        let p00 = self.at(x0, y0);
        let p10 = self.at(x0 + 1, y0);
        let p01 = self.at(x0, y0 + 1);
        let p11 = self.at(x0 + 1, y0 + 1);
        if [p00, p10, p01, p11].iter().any(|p| p.is_nan()) {
            return self.nearest(x, y);
        }
        let top = p00 * (1.0 - tx) + p10 * tx;
        let bottom = p01 * (1.0 - tx) + p11 * tx;
        top * (1.0 - ty) + bottom * ty
    }

    fn cubic_kernel(t: f64) -> [f64; 4] {
        // Catmull-Rom.
        let t2 = t * t;
        let t3 = t2 * t;
        [
            -0.5 * t3 + t2 - 0.5 * t,
            1.5 * t3 - 2.5 * t2 + 1.0,
            -1.5 * t3 + 2.0 * t2 + 0.5 * t,
            0.5 * t3 - 0.5 * t2,
        ]
    }

    fn bicubic(&self, x: f64, y: f64) -> f64 {
        let x0 = x.floor();
        let y0 = y.floor();
        let (tx, ty) = (x - x0, y - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);
        let kx = Self::cubic_kernel(tx);
        let ky = Self::cubic_kernel(ty);

        let mut rows = [0.0; 4];
        let mut any_nan = false;
        for (j, row) in rows.iter_mut().enumerate() {
            let mut acc = 0.0;
            for i in 0..4 {
                let v = self.at(x0 - 1 + i as i64, y0 - 1 + j as i64);
                if v.is_nan() {
                    any_nan = true;
                }
                acc += kx[i] * v;
            }
            *row = acc;
        }
        if any_nan {
            return self.bilinear(x, y);
        }
        ky.iter().zip(rows.iter()).map(|(k, r)| k * r).sum()
    }

    /// Sample the source plane at floating-point pixel coordinate `(x, y)`
    /// using `interp`; falls back one kernel tier when any contributing
    /// sample is blank so a tile edge doesn't turn an entire interpolated
    /// neighborhood NaN.
    pub fn sample(&self, x: f64, y: f64, interp: Interpolation) -> f64 {
        match interp {
            Interpolation::Nearest => self.nearest(x, y),
            Interpolation::Bilinear => self.bilinear(x, y),
            Interpolation::Bicubic => self.bicubic(x, y),
        }
    }
}

/// Reproject `source` into a `tile_width x tile_width` tile buffer, where
/// `pixel_for_tile_xy(tx, ty) -> Option<(source_x, source_y)>` maps a tile
/// cell to the corresponding floating-point pixel coordinate in `source`
/// (or `None` if that sky position falls outside the source's coverage).
pub fn reproject_tile<F>(
    source: &SourcePlane<'_>,
    tile_width: usize,
    interp: Interpolation,
    blank: f64,
    mut pixel_for_tile_xy: F,
) -> TileBuffer
where
    F: FnMut(usize, usize) -> Option<(f64, f64)>,
{
    let mut samples = Vec::with_capacity(tile_width * tile_width);
    for ty in 0..tile_width {
        for tx in 0..tile_width {
            let value = match pixel_for_tile_xy(tx, ty) {
                Some((sx, sy)) => {
                    let v = source.sample(sx, sy, interp);
                    if v.is_nan() {
                        blank
                    } else {
                        v
                    }
                }
                None => blank,
            };
            samples.push(value);
        }
    }
    TileBuffer { width: tile_width, samples }
}
