//! File Writer: opens and maintains one HDF5 file for a single file-cadence
//! window (§4.3). A `FileWriter` owns exactly one open HDF5 handle and the
//! two datasets backing it (`rf_data`, `rf_data_index`); its state machine
//! is `Closed -> Open -> Closed`, terminal — there is no reopen, matching
//! §4.3's state machine note.
//!
//! Element-type dispatch follows the same shape `daq-storage`'s
//! `comedi_writer` uses for its per-channel datasets (`new_dataset::<T>()`,
//! `.chunk(..)`, `.deflate(..)`, `.shape(..)`): [`SampleType`] is a runtime
//! value, so [`open`] matches over it once and calls a generic helper
//! monomorphized for the concrete on-disk scalar, rather than carrying a
//! type parameter on `FileWriter` itself (`hdf5::Dataset` handles are
//! already dynamically typed, so nothing past `open` needs to be generic).

use std::path::{Path, PathBuf};

use hdf5::types::VarLenUnicode;
use hdf5::{Dataset, File, H5Type};
use ndarray::Array2;

use crate::config::ChannelConfig;
use crate::error::{DigitalRfError, DigitalRfResult};
use crate::rational::{utc_now_unix_seconds, SampleRate};
use crate::sample_type::{Scalar, SampleType};

/// A `{r, i}` compound element, one struct per scalar width this engine
/// supports (§3: "each element is a struct of two such scalars named
/// `r`, `i`"). Public so callers can build buffers of the exact layout
/// `FileWriter` creates the `rf_data` dataset with when `is_complex` is
/// set.
macro_rules! complex_struct {
    ($name:ident, $inner:ty) => {
        #[doc = concat!("A `{r, i}` pair of `", stringify!($inner), "` scalars (§3).")]
        #[derive(Clone, Copy, Debug, Default, PartialEq, H5Type)]
        #[repr(C)]
        pub struct $name {
            /// Real part.
            pub r: $inner,
            /// Imaginary part.
            pub i: $inner,
        }
    };
}

complex_struct!(ComplexI8, i8);
complex_struct!(ComplexU8, u8);
complex_struct!(ComplexI16, i16);
complex_struct!(ComplexU16, u16);
complex_struct!(ComplexI32, i32);
complex_struct!(ComplexU32, u32);
complex_struct!(ComplexI64, i64);
complex_struct!(ComplexU64, u64);
complex_struct!(ComplexF32, f32);
complex_struct!(ComplexF64, f64);

/// Roughly the row count that keeps one chunk under a few MiB for a given
/// element width, capped at the file's total sample capacity (§4.3's chunk
/// sizing guidance).
fn chunk_rows(capacity_samples: u64, element_byte_size: usize, num_subchannels: u32) -> usize {
    const TARGET_CHUNK_BYTES: u64 = 4 * 1024 * 1024;
    let row_bytes = (element_byte_size as u64) * (num_subchannels.max(1) as u64);
    let by_size = (TARGET_CHUNK_BYTES / row_bytes.max(1)).max(1);
    by_size.min(capacity_samples.max(1)) as usize
}

/// An open HDF5 file backing one file-cadence window.
pub struct FileWriter {
    path: PathBuf,
    file: File,
    rf_data: Dataset,
    rf_data_index: Dataset,
    num_subchannels: usize,
    file_first_index: u64,
    capacity_samples: u64,
    len: u64,
    /// The global index that would extend the file's last run
    /// contiguously, i.e. the index one past the last sample written.
    /// `None` until the first append.
    next_contiguous_index: Option<u64>,
    closed: bool,
}

impl FileWriter {
    /// Open a new file for the cadence window starting at
    /// `first_global_index_in_file`, creating its HDF5 attributes and the
    /// `rf_data`/`rf_data_index` datasets (§4.3).
    pub fn open(
        path: &Path,
        config: &ChannelConfig,
        rate: SampleRate,
        first_global_index_in_file: u64,
        capacity_samples: u64,
    ) -> DigitalRfResult<Self> {
        if path.exists() {
            return Err(DigitalRfError::FileExists(path.to_path_buf()));
        }
        log::debug!(
            "opening {} (first_index={first_global_index_in_file}, capacity={capacity_samples})",
            path.display()
        );

        let file = File::create(path)
            .map_err(|e| DigitalRfError::IoError(format!("creating {}: {e}", path.display())))?;

        write_root_attrs(&file, config, rate)?;

        let element_byte_size = config.sample_type.element_byte_size();
        let rows = chunk_rows(capacity_samples, element_byte_size, config.num_subchannels);

        let rf_data = create_rf_data(
            &file,
            config.sample_type,
            rows,
            config.num_subchannels as usize,
            config.compression_level,
            config.checksum,
        )?;

        let rf_data_index = file
            .new_dataset::<u64>()
            .chunk((rows.min(4096).max(1), 2))
            .shape((0.., 2))
            .create("rf_data_index")
            .map_err(|e| DigitalRfError::IoError(format!("creating rf_data_index: {e}")))?;

        log::info!("opened {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
            rf_data,
            rf_data_index,
            num_subchannels: config.num_subchannels as usize,
            file_first_index: first_global_index_in_file,
            capacity_samples,
            len: 0,
            next_contiguous_index: None,
            closed: false,
        })
    }

    /// This file's path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Global index of this file's first sample.
    #[must_use]
    pub fn file_first_index(&self) -> u64 {
        self.file_first_index
    }

    /// Current length of `rf_data` (samples written so far, including
    /// zero-fill).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether anything has been written to this file yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The global index that would extend the file's current run
    /// contiguously, if any samples have been written.
    #[must_use]
    pub fn next_contiguous_index(&self) -> Option<u64> {
        self.next_contiguous_index
    }

    /// Append `n_samples` rows starting at `starting_global_index`,
    /// treating them as a single contiguous run (§4.3). Adds a new
    /// `rf_data_index` row only if this run does not extend the file's
    /// previous run contiguously.
    pub fn append_continuous<T: H5Type + Copy>(
        &mut self,
        buffer: &[T],
        n_samples: u64,
        starting_global_index: u64,
    ) -> DigitalRfResult<()> {
        if self.closed {
            return Err(DigitalRfError::InternalInvariantViolated(
                "append_continuous called on a closed FileWriter".into(),
            ));
        }
        let expected_rows = n_samples as usize * self.num_subchannels;
        if buffer.len() != expected_rows {
            return Err(DigitalRfError::InternalInvariantViolated(format!(
                "buffer has {} elements, expected {expected_rows} ({n_samples} samples x {} subchannels)",
                buffer.len(),
                self.num_subchannels
            )));
        }
        if self.len + n_samples > self.capacity_samples {
            return Err(DigitalRfError::InternalInvariantViolated(format!(
                "write of {n_samples} samples at offset {} exceeds file capacity {}",
                self.len, self.capacity_samples
            )));
        }

        let is_new_run = self.next_contiguous_index != Some(starting_global_index);
        if is_new_run {
            self.append_index_row(starting_global_index, self.len)?;
        }

        let new_len = self.len + n_samples;
        self.rf_data
            .resize((new_len as usize, self.num_subchannels))
            .map_err(|e| DigitalRfError::IoError(format!("resizing rf_data: {e}")))?;

        let arr = Array2::from_shape_vec((n_samples as usize, self.num_subchannels), buffer.to_vec())
            .map_err(|e| DigitalRfError::InternalInvariantViolated(e.to_string()))?;
        self.rf_data
            .write_slice(&arr, (self.len as usize..new_len as usize, ..))
            .map_err(|e| DigitalRfError::IoError(format!("writing rf_data: {e}")))?;

        self.len = new_len;
        self.next_contiguous_index = Some(starting_global_index + n_samples);
        Ok(())
    }

    /// Append several runs from one buffer in a single call (§4.3). Each
    /// run is `(global_index, sample_index_within_buffer, run_length)`;
    /// runs must already be sorted and non-overlapping (the caller,
    /// `ChannelWriter`, guarantees this).
    pub fn append_with_gaps<T: H5Type + Copy>(
        &mut self,
        buffer: &[T],
        runs: &[(u64, u64, u64)],
    ) -> DigitalRfResult<()> {
        for &(global_index, offset_in_buffer, run_length) in runs {
            let start = offset_in_buffer as usize * self.num_subchannels;
            let end = start + run_length as usize * self.num_subchannels;
            let slice = buffer.get(start..end).ok_or_else(|| {
                DigitalRfError::InternalInvariantViolated(
                    "run slice out of bounds of the supplied buffer".into(),
                )
            })?;
            self.append_continuous(slice, run_length, global_index)?;
        }
        Ok(())
    }

    fn append_index_row(&mut self, global_index: u64, sample_index_within_file: u64) -> DigitalRfResult<()> {
        let current_rows = self.rf_data_index.shape()[0];
        self.rf_data_index
            .resize((current_rows + 1, 2))
            .map_err(|e| DigitalRfError::IoError(format!("resizing rf_data_index: {e}")))?;
        let row = Array2::from_shape_vec((1, 2), vec![global_index, sample_index_within_file])
            .map_err(|e| DigitalRfError::InternalInvariantViolated(e.to_string()))?;
        self.rf_data_index
            .write_slice(&row, (current_rows..current_rows + 1, ..))
            .map_err(|e| DigitalRfError::IoError(format!("writing rf_data_index: {e}")))?;
        Ok(())
    }

    /// Flush and close the file. Idempotent: a second call is a no-op
    /// (§5's close-idempotence requirement, needed so `Drop` can always
    /// call this safely).
    pub fn close(&mut self) -> DigitalRfResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        log::info!("closing {}", self.path.display());
        self.file
            .flush()
            .map_err(|e| DigitalRfError::IoError(format!("flushing {}: {e}", self.path.display())))
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("error closing {} on drop: {e}", self.path.display());
            }
        }
    }
}

fn write_root_attrs(file: &File, config: &ChannelConfig, rate: SampleRate) -> DigitalRfResult<()> {
    let now = utc_now_unix_seconds();
    write_scalar_attr(file, "subdir_cadence_secs", config.subdir_cadence_secs)?;
    write_scalar_attr(file, "file_cadence_millisecs", config.file_cadence_millisecs)?;
    write_scalar_attr(file, "sample_rate_numerator", rate.num)?;
    write_scalar_attr(file, "sample_rate_denominator", rate.den)?;
    write_scalar_attr(file, "samples_per_second", rate.as_f64_hint())?;
    write_scalar_attr(file, "is_complex", i32::from(config.sample_type.is_complex()))?;
    write_scalar_attr(file, "num_subchannels", config.num_subchannels as i32)?;
    write_string_attr(file, "uuid_str", &config.uuid_str)?;
    write_string_attr(file, "epoch", "1970-01-01T00:00:00Z")?;
    write_string_attr(
        file,
        "digital_rf_time_description",
        "global sample index = samples elapsed since the Unix epoch at the channel's exact rational sample rate",
    )?;
    write_string_attr(file, "digital_rf_version", "2.6")?;
    write_scalar_attr(file, "computer_time", now)?;
    write_scalar_attr(file, "init_utc_timestamp", now)?;
    Ok(())
}

fn write_scalar_attr<T: H5Type>(file: &File, name: &str, value: T) -> DigitalRfResult<()> {
    file.new_attr::<T>()
        .create(name)
        .map_err(|e| DigitalRfError::IoError(format!("creating attribute {name}: {e}")))?
        .write_scalar(&value)
        .map_err(|e| DigitalRfError::IoError(format!("writing attribute {name}: {e}")))
}

fn write_string_attr(file: &File, name: &str, value: &str) -> DigitalRfResult<()> {
    let v: VarLenUnicode = value
        .parse()
        .map_err(|_| DigitalRfError::InternalInvariantViolated(format!("invalid string for {name}")))?;
    write_scalar_attr(file, name, v)
}

fn create_rf_data(
    file: &File,
    sample_type: SampleType,
    rows: usize,
    num_subchannels: usize,
    compression_level: u8,
    checksum: bool,
) -> DigitalRfResult<Dataset> {
    macro_rules! build {
        ($t:ty) => {{
            let mut builder = file.new_dataset::<$t>().chunk((rows, num_subchannels));
            if compression_level > 0 {
                builder = builder.deflate(compression_level);
            }
            if checksum {
                builder = builder.fletcher32();
            }
            builder
                .shape((0.., num_subchannels))
                .create("rf_data")
                .map_err(|e| DigitalRfError::IoError(format!("creating rf_data: {e}")))
        }};
    }

    match sample_type {
        SampleType::Real(Scalar::Int { bits: 8, signed: true, .. }) => build!(i8),
        SampleType::Real(Scalar::Int { bits: 8, signed: false, .. }) => build!(u8),
        SampleType::Real(Scalar::Int { bits: 16, signed: true, .. }) => build!(i16),
        SampleType::Real(Scalar::Int { bits: 16, signed: false, .. }) => build!(u16),
        SampleType::Real(Scalar::Int { bits: 32, signed: true, .. }) => build!(i32),
        SampleType::Real(Scalar::Int { bits: 32, signed: false, .. }) => build!(u32),
        SampleType::Real(Scalar::Int { bits: 64, signed: true, .. }) => build!(i64),
        SampleType::Real(Scalar::Int { bits: 64, signed: false, .. }) => build!(u64),
        SampleType::Real(Scalar::Float { bits: 32, .. }) => build!(f32),
        SampleType::Real(Scalar::Float { bits: 64, .. }) => build!(f64),
        SampleType::Complex(Scalar::Int { bits: 8, signed: true, .. }) => build!(ComplexI8),
        SampleType::Complex(Scalar::Int { bits: 8, signed: false, .. }) => build!(ComplexU8),
        SampleType::Complex(Scalar::Int { bits: 16, signed: true, .. }) => build!(ComplexI16),
        SampleType::Complex(Scalar::Int { bits: 16, signed: false, .. }) => build!(ComplexU16),
        SampleType::Complex(Scalar::Int { bits: 32, signed: true, .. }) => build!(ComplexI32),
        SampleType::Complex(Scalar::Int { bits: 32, signed: false, .. }) => build!(ComplexU32),
        SampleType::Complex(Scalar::Int { bits: 64, signed: true, .. }) => build!(ComplexI64),
        SampleType::Complex(Scalar::Int { bits: 64, signed: false, .. }) => build!(ComplexU64),
        SampleType::Complex(Scalar::Float { bits: 32, .. }) => build!(ComplexF32),
        SampleType::Complex(Scalar::Float { bits: 64, .. }) => build!(ComplexF64),
        other => Err(DigitalRfError::ConfigInvalid(format!(
            "unsupported sample type: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_type::{Endian as E, Scalar as Sc};

    fn config(num_subchannels: u32, is_continuous: bool) -> ChannelConfig {
        ChannelConfig::new(
            3600,
            1000,
            200,
            1,
            SampleType::real(Sc::Int {
                bits: 16,
                signed: true,
                endian: E::Little,
            })
            .unwrap(),
            num_subchannels,
            is_continuous,
            0,
            false,
            "test-uuid",
            false,
        )
        .unwrap()
    }

    #[test]
    fn open_rejects_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rf@0.000.h5");
        std::fs::write(&path, b"not hdf5").unwrap();
        let cfg = config(1, true);
        let rate = cfg.sample_rate();
        let err = FileWriter::open(&path, &cfg, rate, 0, 200).unwrap_err();
        assert!(matches!(err, DigitalRfError::FileExists(_)));
    }

    #[test]
    fn single_continuous_run_yields_one_index_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rf@0.000.h5");
        let cfg = config(1, true);
        let rate = cfg.sample_rate();
        let mut fw = FileWriter::open(&path, &cfg, rate, 0, 200).unwrap();

        let buffer: Vec<i16> = (0..200).collect();
        fw.append_continuous(&buffer, 200, 0).unwrap();
        assert_eq!(fw.len(), 200);
        assert_eq!(fw.rf_data_index.shape()[0], 1);
        fw.close().unwrap();
    }

    #[test]
    fn two_runs_in_one_call_yield_two_index_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rf@0.000.h5");
        let cfg = config(1, false);
        let rate = cfg.sample_rate();
        let mut fw = FileWriter::open(&path, &cfg, rate, 0, 400).unwrap();

        let buffer: Vec<i16> = (0..200).collect();
        fw.append_with_gaps(&buffer, &[(0, 0, 100), (200, 100, 100)])
            .unwrap();
        assert_eq!(fw.len(), 200);
        assert_eq!(fw.rf_data_index.shape()[0], 2);
        fw.close().unwrap();
    }

    #[test]
    fn capacity_overrun_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rf@0.000.h5");
        let cfg = config(1, true);
        let rate = cfg.sample_rate();
        let mut fw = FileWriter::open(&path, &cfg, rate, 0, 10).unwrap();
        let buffer: Vec<i16> = (0..20).collect();
        let err = fw.append_continuous(&buffer, 20, 0).unwrap_err();
        assert!(matches!(err, DigitalRfError::InternalInvariantViolated(_)));
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rf@0.000.h5");
        let cfg = config(1, true);
        let rate = cfg.sample_rate();
        let mut fw = FileWriter::open(&path, &cfg, rate, 0, 200).unwrap();
        fw.close().unwrap();
        fw.close().unwrap();
    }
}
