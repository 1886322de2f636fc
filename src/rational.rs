//! Rational Time Arithmetic: exact conversion between a global sample
//! index and calendar/unix time, using the channel's sample rate as an
//! exact ratio `num/den`. Everything here works in 128-bit integers so
//! that products like `sample_rate_numerator * seconds * 1000` (easily
//! overflowing 64 bits for a multi-GHz rate over a multi-year span, per
//! Design Notes §9) never lose precision, and so that no boundary
//! computation ever touches a float.

use crate::error::{DigitalRfError, DigitalRfResult};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

/// A channel's exact sample rate, `num/den` samples per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleRate {
    /// Numerator of the rate, in samples.
    pub num: u64,
    /// Denominator of the rate, in seconds.
    pub den: u64,
}

impl SampleRate {
    /// Construct a sample rate, rejecting a zero numerator or
    /// denominator (§4.1).
    pub fn new(num: u64, den: u64) -> DigitalRfResult<Self> {
        if num == 0 || den == 0 {
            return Err(DigitalRfError::ConfigInvalid(
                "sample rate numerator and denominator must both be nonzero".into(),
            ));
        }
        Ok(Self { num, den })
    }

    /// `num/den` as an informational `f64`, for the `samples_per_second`
    /// HDF5 attribute hint (§6). Never used for boundary arithmetic.
    #[must_use]
    pub fn as_f64_hint(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

/// The decomposition of a global sample index into calendar fields plus
/// a sub-second remainder, per §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarTime {
    /// Full year (UTC).
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
    /// Day of month, 1-31.
    pub day: u32,
    /// Hour, 0-23.
    pub hour: u32,
    /// Minute, 0-59.
    pub minute: u32,
    /// Second within the minute, 0-59 (leap seconds are not modeled).
    pub second: u32,
    /// Unix seconds since the epoch (may be negative for pre-1970
    /// indices, per Design Notes §9's "historical timestamps" note).
    pub unix_second: i64,
    /// Picoseconds within `unix_second`, exact, `0..10^12`.
    pub picosecond: u64,
}

fn floor_div_u128(a: u128, b: u128) -> u128 {
    a / b
}

fn ceil_div_u128(a: u128, b: u128) -> u128 {
    (a + b - 1) / b
}

/// Decompose global sample index `g` into its exact unix time, per
/// §4.1. `g · den / num` is computed as an exact rational; `second` and
/// `picosecond` never touch floating point.
pub fn index_to_unix(g: u64, rate: SampleRate) -> DigitalRfResult<CalendarTime> {
    let num = rate.num as u128;
    let den = rate.den as u128;
    // g·den fits u128 for any u64 g and den (worst case just under
    // u128::MAX); computing the remainder before scaling by 10^12
    // keeps every intermediate well clear of overflow.
    let product = g as u128 * den;
    let unix_second = (product / num) as i64;
    let remainder = product % num;
    let picosecond = (remainder * 1_000_000_000_000u128) / num;

    let dt = Utc
        .timestamp_opt(unix_second, 0)
        .single()
        .ok_or_else(|| {
            DigitalRfError::InternalInvariantViolated(format!(
                "unix second {unix_second} out of chrono's representable range"
            ))
        })?;

    Ok(CalendarTime {
        year: dt.year(),
        month: dt.month(),
        day: dt.day(),
        hour: dt.hour(),
        minute: dt.minute(),
        second: dt.second(),
        unix_second,
        picosecond: picosecond as u64,
    })
}

/// Inverse of [`index_to_unix`]: the global sample index nearest
/// `second.picosecond`, ties rounding half-away-from-zero (§4.1).
pub fn unix_to_index(second: i64, picosecond: u64, rate: SampleRate) -> DigitalRfResult<u64> {
    if picosecond >= 1_000_000_000_000 {
        return Err(DigitalRfError::ConfigInvalid(format!(
            "picosecond {picosecond} is out of range 0..10^12"
        )));
    }
    let num = rate.num as i128;
    let den = rate.den as i128;

    let total_ps = second as i128 * 1_000_000_000_000i128 + picosecond as i128;
    let numerator = total_ps * num;
    let denominator = den * 1_000_000_000_000i128;

    let g = round_half_away_from_zero(numerator, denominator);
    u64::try_from(g).map_err(|_| {
        DigitalRfError::ConfigInvalid(format!(
            "unix_to_index({second}, {picosecond}) produced a negative or overflowing index: {g}"
        ))
    })
}

fn round_half_away_from_zero(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0);
    let q = numerator / denominator;
    let r = numerator % denominator;
    if r == 0 {
        return q;
    }
    if 2 * r.abs() >= denominator {
        q + numerator.signum()
    } else {
        q
    }
}

/// The smallest global sample index `g` such that
/// `floor(g·den/num) >= unix_second`, i.e. the first sample index whose
/// unix second is at or after `unix_second`. Used by the Path Planner
/// to translate a wall-clock boundary back into sample space without
/// requiring `subdir_cadence_secs`/`file_cadence_millisecs` to divide
/// the rate evenly (§4.1's "fractional boundaries" clause).
pub fn first_index_at_or_after_second(unix_second: i64, rate: SampleRate) -> DigitalRfResult<u64> {
    if unix_second < 0 {
        return Err(DigitalRfError::ConfigInvalid(
            "first_index_at_or_after_second requires a non-negative second".into(),
        ));
    }
    let numerator = unix_second as u128 * rate.num as u128;
    let denominator = rate.den as u128;
    u64::try_from(ceil_div_u128(numerator, denominator)).map_err(|_| {
        DigitalRfError::InternalInvariantViolated("sample index overflowed u64".into())
    })
}

/// The smallest global sample index `g` such that
/// `floor(g·den·1000/num) >= millisecond`. Same role as
/// [`first_index_at_or_after_second`] but at millisecond resolution,
/// for file boundaries.
pub fn first_index_at_or_after_millisecond(
    millisecond: u64,
    rate: SampleRate,
) -> DigitalRfResult<u64> {
    let numerator = millisecond as u128 * rate.num as u128;
    let denominator = rate.den as u128 * 1000u128;
    u64::try_from(ceil_div_u128(numerator, denominator)).map_err(|_| {
        DigitalRfError::InternalInvariantViolated("sample index overflowed u64".into())
    })
}

/// The unix second containing sample `g`, i.e. `floor(g·den/num)`.
#[must_use]
pub fn second_of_index(g: u64, rate: SampleRate) -> i64 {
    floor_div_u128(g as u128 * rate.den as u128, rate.num as u128) as i64
}

/// The unix millisecond containing sample `g`, i.e.
/// `floor(g·den·1000/num)`.
#[must_use]
pub fn millisecond_of_index(g: u64, rate: SampleRate) -> u64 {
    floor_div_u128(g as u128 * rate.den as u128 * 1000, rate.num as u128) as u64
}

/// Number of samples per subdirectory, if `subdir_cadence_secs` divides
/// the rate evenly; `None` if the boundary must be rederived per query
/// (§4.1).
#[must_use]
pub fn subdir_cadence_samples_exact(rate: SampleRate, subdir_cadence_secs: u64) -> Option<u64> {
    let samples = rate.num as u128 * subdir_cadence_secs as u128;
    if samples % rate.den as u128 == 0 {
        u64::try_from(samples / rate.den as u128).ok()
    } else {
        None
    }
}

/// Number of samples per file, if `file_cadence_millisecs` divides the
/// rate evenly; `None` if the boundary must be rederived per query.
#[must_use]
pub fn file_cadence_samples_exact(rate: SampleRate, file_cadence_millisecs: u64) -> Option<u64> {
    let samples = rate.num as u128 * file_cadence_millisecs as u128;
    let denom = rate.den as u128 * 1000;
    if samples % denom == 0 {
        u64::try_from(samples / denom).ok()
    } else {
        None
    }
}

/// Render a [`CalendarTime`] in the ISO-8601-derived, hyphen-separated
/// form the format uses for subdirectory names: `YYYY-MM-DDTHH-MM-SS`
/// (§4.2).
#[must_use]
pub fn format_subdir_timestamp(t: &CalendarTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}-{:02}-{:02}",
        t.year, t.month, t.day, t.hour, t.minute, t.second
    )
}

#[must_use]
pub(crate) fn utc_now_unix_seconds() -> u64 {
    DateTime::<Utc>::from(std::time::SystemTime::now()).timestamp() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_rate_components() {
        assert!(SampleRate::new(0, 1).is_err());
        assert!(SampleRate::new(1, 0).is_err());
    }

    #[test]
    fn round_trips_for_integer_rate() {
        let rate = SampleRate::new(200, 1).unwrap();
        for g in [0u64, 1, 199, 200, 201, 1_000_000, u32::MAX as u64] {
            let t = index_to_unix(g, rate).unwrap();
            let back = unix_to_index(t.unix_second, t.picosecond, rate).unwrap();
            assert_eq!(back, g, "round-trip failed for g={g}");
        }
    }

    #[test]
    fn round_trips_for_non_integer_rate() {
        // 48000/1 Hz fine, but try a rate with a denominator too:
        // 2/3 Hz (den != 1) so second/picosecond land off whole numbers.
        let rate = SampleRate::new(2, 3).unwrap();
        for g in [0u64, 1, 2, 3, 7, 1000, 123_456_789] {
            let t = index_to_unix(g, rate).unwrap();
            let back = unix_to_index(t.unix_second, t.picosecond, rate).unwrap();
            assert_eq!(back, g, "round-trip failed for g={g}");
        }
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_half_away_from_zero(1, 2), 1);
        assert_eq!(round_half_away_from_zero(-1, 2), -1);
        assert_eq!(round_half_away_from_zero(3, 2), 2);
        assert_eq!(round_half_away_from_zero(5, 2), 3);
    }

    #[test]
    fn exact_cadence_samples_when_divisible() {
        let rate = SampleRate::new(200, 1).unwrap();
        assert_eq!(subdir_cadence_samples_exact(rate, 3600), Some(720_000));
        assert_eq!(file_cadence_samples_exact(rate, 1000), Some(200));
    }

    #[test]
    fn cadence_samples_none_when_fractional() {
        // 3 Hz over a 1000ms (1s) window: 3 samples, divides evenly.
        // Use a rate where the cadence genuinely does not divide.
        let rate = SampleRate::new(3, 2).unwrap(); // 1.5 Hz
        // file_cadence_millisecs=1000 -> 1.5 samples/file: fractional.
        assert_eq!(file_cadence_samples_exact(rate, 1000), None);
    }

    #[test]
    fn format_matches_iso_with_hyphenated_time() {
        let rate = SampleRate::new(1, 1).unwrap();
        let t = index_to_unix(0, rate).unwrap();
        assert_eq!(format_subdir_timestamp(&t), "1970-01-01T00-00-00");
    }
}
