//! Channel configuration: the immutable set of parameters fixed at a
//! channel's first open (§3). Mirrors the validate-eagerly posture of
//! `rust_daq`'s `Settings::new`/`validation` module — a malformed
//! configuration is rejected at construction, not at first write.

use crate::error::{DigitalRfError, DigitalRfResult};
use crate::sample_type::SampleType;

/// Immutable, validated channel configuration (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Wall-clock seconds of data per subdirectory.
    pub subdir_cadence_secs: u64,
    /// Wall-clock milliseconds of data per file.
    pub file_cadence_millisecs: u64,
    /// Sample rate numerator.
    pub sample_rate_numerator: u64,
    /// Sample rate denominator.
    pub sample_rate_denominator: u64,
    /// Element type stored in `rf_data`.
    pub sample_type: SampleType,
    /// Dataset row width (§3).
    pub num_subchannels: u32,
    /// If true, every file has exactly one index entry and gaps inside
    /// a file are zero-filled (§3).
    pub is_continuous: bool,
    /// gzip compression level, `0..=9`; `0` disables compression.
    pub compression_level: u8,
    /// Whether to attach a Fletcher-32 checksum filter.
    pub checksum: bool,
    /// Opaque identifier echoed into every file's attributes.
    pub uuid_str: String,
    /// Cosmetic stderr heartbeat on each new subdirectory (§3).
    pub marching_periods: bool,
}

impl ChannelConfig {
    /// Validate and construct a channel configuration. Rejects anything
    /// that would violate §3's invariants, per `DigitalRfError::ConfigInvalid`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        subdir_cadence_secs: u64,
        file_cadence_millisecs: u64,
        sample_rate_numerator: u64,
        sample_rate_denominator: u64,
        sample_type: SampleType,
        num_subchannels: u32,
        is_continuous: bool,
        compression_level: u8,
        checksum: bool,
        uuid_str: impl Into<String>,
        marching_periods: bool,
    ) -> DigitalRfResult<Self> {
        let uuid_str = uuid_str.into();

        if sample_rate_numerator == 0 || sample_rate_denominator == 0 {
            return Err(DigitalRfError::ConfigInvalid(
                "sample rate numerator and denominator must both be nonzero".into(),
            ));
        }
        if subdir_cadence_secs == 0 {
            return Err(DigitalRfError::ConfigInvalid(
                "subdir_cadence_secs must be nonzero".into(),
            ));
        }
        if file_cadence_millisecs == 0 {
            return Err(DigitalRfError::ConfigInvalid(
                "file_cadence_millisecs must be nonzero".into(),
            ));
        }
        // Invariant from §3: an integer number of files must span every
        // subdirectory.
        if (subdir_cadence_secs * 1000) % file_cadence_millisecs != 0 {
            return Err(DigitalRfError::ConfigInvalid(format!(
                "subdir_cadence_secs * 1000 ({}) is not a multiple of file_cadence_millisecs ({})",
                subdir_cadence_secs * 1000,
                file_cadence_millisecs
            )));
        }
        if num_subchannels == 0 {
            return Err(DigitalRfError::ConfigInvalid(
                "num_subchannels must be at least 1".into(),
            ));
        }
        if compression_level > 9 {
            return Err(DigitalRfError::ConfigInvalid(format!(
                "compression_level {compression_level} is out of range 0..=9"
            )));
        }
        if uuid_str.is_empty() {
            return Err(DigitalRfError::ConfigInvalid(
                "uuid_str must not be empty".into(),
            ));
        }

        Ok(Self {
            subdir_cadence_secs,
            file_cadence_millisecs,
            sample_rate_numerator,
            sample_rate_denominator,
            sample_type,
            num_subchannels,
            is_continuous,
            compression_level,
            checksum,
            uuid_str,
            marching_periods,
        })
    }

    /// This channel's sample rate, for use with the `rational` module.
    #[must_use]
    pub fn sample_rate(&self) -> crate::rational::SampleRate {
        // Constructed only through `new`, which already validated both
        // components are nonzero.
        crate::rational::SampleRate {
            num: self.sample_rate_numerator,
            den: self.sample_rate_denominator,
        }
    }
}
