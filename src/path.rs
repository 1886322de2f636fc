//! Path Planner: the pure function from a global sample index to the
//! directory, file, and in-file/in-subdir position that sample belongs
//! to (§4.2). Every boundary is rederived from `g` on each call rather
//! than cached, so the planner is correct even when the configured
//! cadence does not divide the sample rate evenly (§4.1's
//! "fractional boundaries" clause).

use crate::error::DigitalRfResult;
use crate::rational::{
    self, format_subdir_timestamp, first_index_at_or_after_millisecond,
    first_index_at_or_after_second, millisecond_of_index, second_of_index, SampleRate,
};

/// Where a single global sample index lives in the on-disk hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLocation {
    /// Subdirectory name, e.g. `1970-01-01T00-00-00`.
    pub subdir_name: String,
    /// File name, e.g. `rf@0.000.h5`.
    pub file_name: String,
    /// Global index of this file's first sample.
    pub file_first_index: u64,
    /// `g - file_first_index`.
    pub sample_index_within_file: u64,
    /// Samples from `g` (inclusive) to the end of this file.
    pub samples_remaining_in_file: u64,
    /// Samples from `g` (inclusive) to the end of this subdirectory.
    pub samples_remaining_in_subdir: u64,
}

/// Plan the location of global sample index `g` given the channel's
/// cadence configuration (§4.2).
pub fn plan(
    g: u64,
    subdir_cadence_secs: u64,
    file_cadence_millisecs: u64,
    rate: SampleRate,
) -> DigitalRfResult<PlannedLocation> {
    let subdir_start_second =
        (second_of_index(g, rate) as u64 / subdir_cadence_secs) * subdir_cadence_secs;
    let file_start_millisecond =
        (millisecond_of_index(g, rate) / file_cadence_millisecs) * file_cadence_millisecs;

    let file_first_index = first_index_at_or_after_millisecond(file_start_millisecond, rate)?;
    let next_file_first_index =
        first_index_at_or_after_millisecond(file_start_millisecond + file_cadence_millisecs, rate)?;
    let next_subdir_first_index =
        first_index_at_or_after_second(subdir_start_second + subdir_cadence_secs, rate)?;

    let subdir_time = rational::index_to_unix(
        first_index_at_or_after_second(subdir_start_second, rate)?,
        rate,
    )?;
    let subdir_name = format_subdir_timestamp(&subdir_time);

    let file_sec = file_start_millisecond / 1000;
    let file_milli_remainder = file_start_millisecond % 1000;
    let file_name = format!("rf@{file_sec}.{file_milli_remainder:03}.h5");

    Ok(PlannedLocation {
        subdir_name,
        file_name,
        file_first_index,
        sample_index_within_file: g - file_first_index,
        samples_remaining_in_file: next_file_first_index - g,
        samples_remaining_in_subdir: next_subdir_first_index - g,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(num: u64, den: u64) -> SampleRate {
        SampleRate::new(num, den).unwrap()
    }

    #[test]
    fn s1_single_file_layout() {
        let loc = plan(0, 3600, 1000, rate(200, 1)).unwrap();
        assert_eq!(loc.subdir_name, "1970-01-01T00-00-00");
        assert_eq!(loc.file_name, "rf@0.000.h5");
        assert_eq!(loc.sample_index_within_file, 0);
        assert_eq!(loc.samples_remaining_in_file, 200);
    }

    #[test]
    fn s2_file_boundary_crossed() {
        // 250 samples at 200 Hz, 1000ms files: file 0 holds [0..199],
        // file 1 (`rf@1.000.h5`) holds [200..249].
        let loc = plan(200, 3600, 1000, rate(200, 1)).unwrap();
        assert_eq!(loc.file_name, "rf@1.000.h5");
        assert_eq!(loc.sample_index_within_file, 0);
        assert_eq!(loc.file_first_index, 200);
    }

    #[test]
    fn s3_subdir_boundary() {
        let r = rate(1, 1);
        let loc1 = plan(1, 2, 1000, r).unwrap();
        assert_eq!(loc1.subdir_name, "1970-01-01T00-00-00");
        assert_eq!(loc1.file_name, "rf@1.000.h5");

        let loc2 = plan(2, 2, 1000, r).unwrap();
        assert_eq!(loc2.subdir_name, "1970-01-01T00-00-02");
        assert_eq!(loc2.file_name, "rf@2.000.h5");
    }

    #[test]
    fn file_always_lies_within_its_subdir() {
        let r = rate(44_100, 1);
        let subdir_cadence = 10u64;
        for g in [0u64, 1, 44_099, 44_100, 10_000_000, 999_999_999] {
            let loc = plan(g, subdir_cadence, 2500, r).unwrap();

            let subdir_start_second = (second_of_index(g, r) as u64 / subdir_cadence) * subdir_cadence;
            let recomputed = format_subdir_timestamp(
                &rational::index_to_unix(
                    first_index_at_or_after_second(subdir_start_second, r).unwrap(),
                    r,
                )
                .unwrap(),
            );
            assert_eq!(loc.subdir_name, recomputed);

            // The file's first sample must land on or after the
            // subdir's start second and before the subdir's end.
            let file_sec = rational::index_to_unix(loc.file_first_index, r).unwrap();
            assert!(file_sec.unix_second >= subdir_start_second as i64);
            assert!(file_sec.unix_second < subdir_start_second as i64 + subdir_cadence as i64);
        }
    }

    #[test]
    fn remaining_plus_offset_equals_capacity() {
        let r = rate(200, 1);
        for g in [0u64, 1, 199, 200, 201, 999] {
            let loc = plan(g, 3600, 1000, r).unwrap();
            let capacity = loc.sample_index_within_file + loc.samples_remaining_in_file;
            assert_eq!(capacity, 200, "file capacity should be 200 samples at 200Hz/1000ms");
        }
    }
}
