//! Crate-wide error taxonomy and the warning-sink mechanism used by every
//! parser's `strictValidation` policy (see each module's `*_with` entry
//! points).

use alloc::string::String;

/// Errors that can occur while parsing, validating, or writing a FITS file.
#[derive(Debug)]
pub enum FitsError {
    /// Malformed FITS header block; carries a short cause description.
    InvalidHeader(&'static str),
    /// Premature end of data while reading.
    UnexpectedEof,
    /// Unrecognized BITPIX value.
    InvalidBitpix(i64),
    /// Malformed keyword name in a header card.
    InvalidKeyword,
    /// Unknown or unsupported XTENSION type; carries the type name.
    UnsupportedExtension(&'static str),
    /// A header value could not be parsed correctly.
    InvalidValue,
    /// A required keyword was not found in the header.
    MissingKeyword(&'static str),
    /// A keyword's value failed semantic validation (e.g. NAXIS out of range).
    Validation(&'static str),
    /// DATASUM/CHECKSUM verification failed.
    Checksum,
    /// A tile codec (Rice, HCompress, PLIO, GZIP) failed to decode its input.
    Decompression(&'static str),
    /// The requested compression algorithm has no registered decoder.
    UnsupportedCompression,
}

/// Errors that can occur while parsing, verifying, or writing an XISF unit.
#[derive(Debug)]
pub enum XisfError {
    /// Bytes do not match the declared XISF/XISB framing.
    Format(&'static str),
    /// Header XML parses but violates a structural constraint.
    Validation(&'static str),
    /// A data block's checksum did not match its declared digest.
    Checksum {
        /// Digest algorithm used.
        algorithm: &'static str,
    },
    /// XML-DSig signature verification failed.
    Signature(&'static str),
    /// A data block's declared compression codec failed to decompress.
    Decompression(&'static str),
    /// Resolving an `url:` or `path:` location failed.
    Resource(String),
}

/// Errors from SER sequence parsing and writing.
#[derive(Debug)]
pub enum SerError {
    /// Bytes do not match the fixed 178-byte SER header layout.
    Format(&'static str),
    /// A header field holds a value outside its legal range.
    Validation(&'static str),
}

/// Errors from the HiPS tile engine.
#[derive(Debug)]
pub enum HipsError {
    /// A `properties` file or tile path does not match the expected layout.
    Format(&'static str),
    /// A semantic HiPS constraint was violated (order/ipix out of range, etc).
    Validation(&'static str),
    /// A storage or resolver operation failed.
    Resource(String),
}

/// Raised when a lossless conversion between two container formats cannot be
/// completed under the caller's strictness setting.
#[derive(Debug)]
pub struct ConversionError(pub &'static str);

/// The union error type returned by the public conversion and storage
/// entry points. Subsystem-specific code works with its own error enum
/// and is only wrapped into `Error` at the boundary that crosses formats.
#[derive(Debug)]
pub enum Error {
    /// Error from the FITS codec.
    Fits(FitsError),
    /// Error from the XISF codec.
    Xisf(XisfError),
    /// Error from the SER codec.
    Ser(SerError),
    /// Error from the HiPS tile engine.
    Hips(HipsError),
    /// Error from the conversion algebra.
    Conversion(ConversionError),
    /// An I/O error from the standard library (storage targets, resource
    /// resolvers).
    #[cfg(feature = "std")]
    Io(std::io::Error),
    /// The caller's cancellation token was observed.
    Cancelled,
}

/// Convenience alias for FITS-subsystem results.
pub type FitsResult<T> = core::result::Result<T, FitsError>;
/// Convenience alias for XISF-subsystem results.
pub type XisfResult<T> = core::result::Result<T, XisfError>;
/// Convenience alias for SER-subsystem results.
pub type SerResult<T> = core::result::Result<T, SerError>;
/// Convenience alias for HiPS-subsystem results.
pub type HipsResult<T> = core::result::Result<T, HipsError>;
/// Convenience alias for the top-level union result.
pub type Result<T> = core::result::Result<T, Error>;

impl core::fmt::Display for FitsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FitsError::InvalidHeader(why) => write!(f, "invalid FITS header: {why}"),
            FitsError::UnexpectedEof => write!(f, "unexpected end of file"),
            FitsError::InvalidBitpix(v) => write!(f, "invalid BITPIX value: {v}"),
            FitsError::InvalidKeyword => write!(f, "invalid keyword name"),
            FitsError::UnsupportedExtension(kind) => write!(f, "unsupported XTENSION type: {kind}"),
            FitsError::InvalidValue => write!(f, "invalid header value"),
            FitsError::MissingKeyword(kw) => write!(f, "missing required keyword: {kw}"),
            FitsError::Validation(why) => write!(f, "FITS validation failed: {why}"),
            FitsError::Checksum => write!(f, "FITS checksum mismatch"),
            FitsError::Decompression(why) => write!(f, "tile decompression failed: {why}"),
            FitsError::UnsupportedCompression => write!(f, "unsupported tile compression algorithm"),
        }
    }
}

impl core::fmt::Display for XisfError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            XisfError::Format(why) => write!(f, "invalid XISF container: {why}"),
            XisfError::Validation(why) => write!(f, "XISF validation failed: {why}"),
            XisfError::Checksum { algorithm } => {
                write!(f, "XISF data block checksum ({algorithm}) mismatch")
            }
            XisfError::Signature(why) => write!(f, "XISF signature verification failed: {why}"),
            XisfError::Decompression(why) => write!(f, "XISF block decompression failed: {why}"),
            XisfError::Resource(why) => write!(f, "XISF resource resolution failed: {why}"),
        }
    }
}

impl core::fmt::Display for SerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SerError::Format(why) => write!(f, "invalid SER header: {why}"),
            SerError::Validation(why) => write!(f, "SER validation failed: {why}"),
        }
    }
}

impl core::fmt::Display for HipsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HipsError::Format(why) => write!(f, "invalid HiPS layout: {why}"),
            HipsError::Validation(why) => write!(f, "HiPS validation failed: {why}"),
            HipsError::Resource(why) => write!(f, "HiPS storage error: {why}"),
        }
    }
}

impl core::fmt::Display for ConversionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "lossless conversion not possible: {}", self.0)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Fits(e) => write!(f, "{e}"),
            Error::Xisf(e) => write!(f, "{e}"),
            Error::Ser(e) => write!(f, "{e}"),
            Error::Hips(e) => write!(f, "{e}"),
            Error::Conversion(e) => write!(f, "{e}"),
            #[cfg(feature = "std")]
            Error::Io(e) => write!(f, "I/O error: {e}"),
            Error::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
#[cfg(feature = "std")]
impl std::error::Error for FitsError {}
#[cfg(feature = "std")]
impl std::error::Error for XisfError {}
#[cfg(feature = "std")]
impl std::error::Error for SerError {}
#[cfg(feature = "std")]
impl std::error::Error for HipsError {}
#[cfg(feature = "std")]
impl std::error::Error for ConversionError {}

impl From<FitsError> for Error {
    fn from(e: FitsError) -> Self {
        Error::Fits(e)
    }
}
impl From<XisfError> for Error {
    fn from(e: XisfError) -> Self {
        Error::Xisf(e)
    }
}
impl From<SerError> for Error {
    fn from(e: SerError) -> Self {
        Error::Ser(e)
    }
}
impl From<HipsError> for Error {
    fn from(e: HipsError) -> Self {
        Error::Hips(e)
    }
}
impl From<ConversionError> for Error {
    fn from(e: ConversionError) -> Self {
        Error::Conversion(e)
    }
}
#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// A non-fatal issue raised during parsing when `strict_validation` is
/// disabled. In strict mode the same condition is raised as an `Err`
/// instead of being routed here.
#[derive(Debug, Clone, PartialEq)]
pub enum Warning {
    /// A mandatory keyword appeared at the wrong card index.
    HeaderOrdering {
        /// The keyword that was misplaced.
        keyword: &'static str,
        /// The card index it was found at.
        found_at: usize,
    },
    /// BZERO/BSCALE deviated from the canonical unsigned-encoding literal.
    NonCanonicalBzero {
        /// The literal the strict encoding expects.
        expected: f64,
        /// The literal actually present.
        found: f64,
    },
    /// A data block or frame checksum did not match, but relaxed mode
    /// allows continuing with the bytes as read.
    ChecksumMismatch {
        /// Human-readable description of what was checksummed.
        what: String,
    },
    /// SER frame timestamps were not monotonically increasing.
    TimestampOutOfOrder {
        /// Index of the frame whose timestamp broke monotonicity.
        frame_index: usize,
    },
    /// A frame was zero-padded or truncated to satisfy a declared extent.
    FramePadded {
        /// Index of the affected frame.
        frame_index: usize,
    },
    /// An XML-DSig signature could not be verified but the policy is `warn`.
    SignatureUnverified(String),
    /// Catch-all for conditions not covered by a dedicated variant.
    Generic(String),
}

/// Receives non-fatal [`Warning`]s from a relaxed-mode parse.
///
/// Implemented for any `FnMut(Warning)` closure, so callers typically pass
/// a closure or `&mut Vec<Warning>::push` rather than a bespoke type.
pub trait WarningSink {
    /// Record one warning.
    fn warn(&mut self, warning: Warning);
}

impl<F: FnMut(Warning)> WarningSink for F {
    fn warn(&mut self, warning: Warning) {
        self(warning)
    }
}

/// A [`WarningSink`] that discards every warning.
///
/// Used as the default sink for call sites that do not care to observe
/// relaxed-mode recoveries, while strict mode continues to raise `Err`.
#[derive(Debug, Default)]
pub struct NullSink;

impl WarningSink for NullSink {
    fn warn(&mut self, _warning: Warning) {}
}

/// Controls how a parser reacts to non-fatal format deviations.
///
/// Threaded through every parse entry point alongside a [`WarningSink`].
/// The default matches §7 of the format contract: strict by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrictPolicy {
    /// When `true` (the default), any condition that would otherwise be a
    /// [`Warning`] is instead raised as an `Err`.
    pub strict: bool,
}

impl Default for StrictPolicy {
    fn default() -> Self {
        StrictPolicy { strict: true }
    }
}

impl StrictPolicy {
    /// The default strict policy (`strict: true`).
    pub const STRICT: StrictPolicy = StrictPolicy { strict: true };
    /// A relaxed policy that downgrades recoverable errors to warnings.
    pub const RELAXED: StrictPolicy = StrictPolicy { strict: false };
}
