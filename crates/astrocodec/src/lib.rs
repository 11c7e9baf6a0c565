#![cfg_attr(not(feature = "std"), no_std)]
//! Pure Rust codec and container runtime for astronomical image formats:
//! FITS, XISF, SER, and HiPS.
//!
//! The [`fits`] module is usable in `no_std` + `alloc` environments. The
//! [`xisf`], [`ser`], [`hips`], [`storage`], and [`convert`] modules require
//! the `std` feature (on by default) because they deal in XML, hashing,
//! compression, and filesystem-shaped I/O that assume an allocator-backed
//! standard environment.

extern crate alloc;

/// FITS block size in bytes.
pub const BLOCK_SIZE: usize = 2880;

/// FITS card (keyword record) size in bytes.
pub const CARD_SIZE: usize = 80;

/// Number of cards per block.
pub const CARDS_PER_BLOCK: usize = BLOCK_SIZE / CARD_SIZE;

pub mod error;
pub mod fits;

#[cfg(feature = "xisf")]
pub mod xisf;

#[cfg(feature = "ser")]
pub mod ser;

#[cfg(feature = "hips")]
pub mod hips;

#[cfg(feature = "storage")]
pub mod storage;

#[cfg(all(feature = "xisf", feature = "ser"))]
pub mod convert;

#[cfg(all(feature = "xisf", feature = "ser"))]
pub mod api;

// Flatten the FITS submodules to the crate root (`astrocodec::header::Card`,
// `astrocodec::bintable::...`) so the public surface reads as one format
// library rather than `fits::fits::...`.
pub use fits::*;
