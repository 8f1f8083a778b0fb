//! Recovers embedded asset files from Xbox 360 memory dumps and transcodes
//! big-endian ESM master files into the little-endian PC layout.
//!
//! Two subsystems carry the hard engineering and make up the bulk of this
//! crate:
//!
//! - [`carve`] locates files embedded in a raw memory dump by signature,
//!   validates them with a format-specific header parser, and reassembles
//!   their bytes from the dump's (possibly non-contiguous) memory regions.
//! - [`esm`] indexes a source-endian ESM file in one pass, then emits a
//!   fresh byte stream in the target platform's byte order, container
//!   hierarchy, and world-cell offset layout.
//!
//! [`dump`] and [`matcher`] are the shared plumbing both depend on;
//! [`reconstruct`] builds typed in-memory records from either representation.

pub mod primitives;
pub mod error;
pub mod dump;
pub mod matcher;
pub mod format;

#[cfg(feature = "carve")]
pub mod carve;

#[cfg(feature = "esm")]
pub mod esm;

#[cfg(feature = "reconstruct")]
pub mod reconstruct;

pub mod progress;

pub use error::{Error, Result};
