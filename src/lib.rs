//! Write engine for the Digital RF time-indexed HDF5 sample format.
//!
//! Digital RF stores continuous and gapped streams of radio-frequency
//! sample vectors, tagged with a monotonic global sample index, across a
//! directory/file hierarchy of self-describing HDF5 datasets. This crate
//! implements the write side: [`ChannelWriter`] is the entry point most
//! callers need; [`rational`] and [`path`] are exposed separately because
//! the reader side of the format (out of scope here) needs the same exact
//! arithmetic to seek.
//!
//! The on-disk format and every invariant below follow the specification
//! this crate implements; see `DESIGN.md` in the repository root for the
//! provenance of each module's design.
//!
//! # Feature flags
//!
//! - `hdf5` (default): enables [`file_writer`], [`channel_writer`], and
//!   [`properties`], all of which require the native HDF5 library. With
//!   it disabled, only the pure arithmetic and configuration modules
//!   build — [`rational`], [`path`], [`sample_type`], [`config`],
//!   [`error`], and [`heartbeat`] have no native dependency.

pub mod config;
pub mod error;
pub mod heartbeat;
pub mod path;
pub mod rational;
pub mod sample_type;

#[cfg(feature = "hdf5")]
pub mod channel_writer;
#[cfg(feature = "hdf5")]
pub mod file_writer;
#[cfg(feature = "hdf5")]
pub mod properties;

#[cfg(feature = "hdf5")]
pub use channel_writer::ChannelWriter;
pub use config::ChannelConfig;
pub use error::{DigitalRfError, DigitalRfResult};
#[cfg(feature = "hdf5")]
pub use file_writer::FileWriter;
pub use sample_type::{Endian, Scalar, SampleType};
