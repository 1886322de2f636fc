//! Properties Emitter: writes and re-reads `drf_properties.h5`, the
//! channel-level property file that is immutable once created (§4.5). The
//! attribute idiom (`new_attr::<T>().create(name)?.write_scalar(&v)?`,
//! `VarLenUnicode` for strings) matches `storage::hdf5_annotation` and
//! `storage::document_writer`'s `write_group_attr`/`write_dataset_attr`
//! helpers.

use std::path::Path;

use hdf5::types::VarLenUnicode;
use hdf5::File;

use crate::config::ChannelConfig;
use crate::error::{DigitalRfError, DigitalRfResult};
use crate::sample_type::SampleType;

const FILE_NAME: &str = "drf_properties.h5";

/// Create `drf_properties.h5` under `channel_dir` if absent; if present,
/// compare it field-by-field against `config` and fail with
/// `PropertiesConflict` on any mismatch (§4.4 step 2, §4.5).
pub fn ensure(channel_dir: &Path, config: &ChannelConfig) -> DigitalRfResult<()> {
    let path = channel_dir.join(FILE_NAME);
    if path.exists() {
        let existing = load(&path)?;
        if existing != *config {
            return Err(DigitalRfError::PropertiesConflict(format!(
                "{} disagrees with the requested channel configuration",
                path.display()
            )));
        }
        return Ok(());
    }

    write_new(&path, config)?;
    log::info!("created {}", path.display());
    Ok(())
}

fn write_new(path: &Path, config: &ChannelConfig) -> DigitalRfResult<()> {
    let file = File::create(path)
        .map_err(|e| DigitalRfError::IoError(format!("creating {}: {e}", path.display())))?;

    write_scalar(&file, "subdir_cadence_secs", config.subdir_cadence_secs)?;
    write_scalar(&file, "file_cadence_millisecs", config.file_cadence_millisecs)?;
    write_scalar(&file, "sample_rate_numerator", config.sample_rate_numerator)?;
    write_scalar(&file, "sample_rate_denominator", config.sample_rate_denominator)?;
    write_string(&file, "sample_type", &config.sample_type.encode())?;
    write_scalar(&file, "num_subchannels", config.num_subchannels)?;
    write_scalar(&file, "is_continuous", i32::from(config.is_continuous))?;
    write_scalar(&file, "compression_level", u32::from(config.compression_level))?;
    write_scalar(&file, "checksum", i32::from(config.checksum))?;
    write_string(&file, "uuid_str", &config.uuid_str)?;
    write_scalar(&file, "marching_periods", i32::from(config.marching_periods))?;
    write_string(&file, "digital_rf_version", "2.6")?;

    file.flush()
        .map_err(|e| DigitalRfError::IoError(format!("flushing {}: {e}", path.display())))
}

fn load(path: &Path) -> DigitalRfResult<ChannelConfig> {
    let file = File::open(path)
        .map_err(|e| DigitalRfError::IoError(format!("opening {}: {e}", path.display())))?;

    let sample_type_str = read_string(&file, "sample_type")?;
    let sample_type = SampleType::decode(&sample_type_str)?;

    ChannelConfig::new(
        read_scalar::<u64>(&file, "subdir_cadence_secs")?,
        read_scalar::<u64>(&file, "file_cadence_millisecs")?,
        read_scalar::<u64>(&file, "sample_rate_numerator")?,
        read_scalar::<u64>(&file, "sample_rate_denominator")?,
        sample_type,
        read_scalar::<u32>(&file, "num_subchannels")?,
        read_scalar::<i32>(&file, "is_continuous")? != 0,
        read_scalar::<u32>(&file, "compression_level")? as u8,
        read_scalar::<i32>(&file, "checksum")? != 0,
        read_string(&file, "uuid_str")?,
        read_scalar::<i32>(&file, "marching_periods")? != 0,
    )
}

fn write_scalar<T: hdf5::types::H5Type>(file: &File, name: &str, value: T) -> DigitalRfResult<()> {
    file.new_attr::<T>()
        .create(name)
        .map_err(|e| DigitalRfError::IoError(format!("creating attribute {name}: {e}")))?
        .write_scalar(&value)
        .map_err(|e| DigitalRfError::IoError(format!("writing attribute {name}: {e}")))
}

fn write_string(file: &File, name: &str, value: &str) -> DigitalRfResult<()> {
    let v: VarLenUnicode = value
        .parse()
        .map_err(|_| DigitalRfError::InternalInvariantViolated(format!("invalid string for {name}")))?;
    write_scalar(file, name, v)
}

fn read_scalar<T: hdf5::types::H5Type>(file: &File, name: &str) -> DigitalRfResult<T> {
    file.attr(name)
        .map_err(|e| DigitalRfError::IoError(format!("reading attribute {name}: {e}")))?
        .read_scalar::<T>()
        .map_err(|e| DigitalRfError::IoError(format!("decoding attribute {name}: {e}")))
}

fn read_string(file: &File, name: &str) -> DigitalRfResult<String> {
    Ok(read_scalar::<VarLenUnicode>(file, name)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_type::{Endian, Scalar};

    fn config() -> ChannelConfig {
        ChannelConfig::new(
            3600,
            1000,
            200,
            1,
            SampleType::real(Scalar::Int {
                bits: 16,
                signed: true,
                endian: Endian::Little,
            })
            .unwrap(),
            1,
            true,
            0,
            false,
            "test-uuid",
            false,
        )
        .unwrap()
    }

    #[test]
    fn writes_then_loads_back_identical() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config();
        ensure(dir.path(), &cfg).unwrap();
        let loaded = load(&dir.path().join(FILE_NAME)).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn second_ensure_with_same_config_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config();
        ensure(dir.path(), &cfg).unwrap();
        ensure(dir.path(), &cfg).unwrap();
    }

    #[test]
    fn conflicting_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        ensure(dir.path(), &config()).unwrap();

        let mut other = config();
        other.num_subchannels = 2;
        let err = ensure(dir.path(), &other).unwrap_err();
        assert!(matches!(err, DigitalRfError::PropertiesConflict(_)));
    }
}
