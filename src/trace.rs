use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::error::ConfigError;

/// Width of one address record in a binary trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AddressWidth {
    #[default]
    #[value(name = "32")]
    Bits32,
    #[value(name = "64")]
    Bits64,
}

impl AddressWidth {
    #[must_use]
    pub fn bytes(self) -> u64 {
        match self {
            AddressWidth::Bits32 => 4,
            AddressWidth::Bits64 => 8,
        }
    }
}

impl fmt::Display for AddressWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bytes() * 8)
    }
}

/// Shape of a headerless binary trace: fixed-width addresses back to back.
///
/// Only sizes are checked here, decoding is left to the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSummary {
    pub path: PathBuf,
    pub width: AddressWidth,
    pub records: u64,
    /// Bytes of a truncated final record, ignored by readers.
    pub trailing_bytes: u64,
}

impl TraceSummary {
    pub fn inspect(path: impl AsRef<Path>, width: AddressWidth) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::MissingTrace(path.to_path_buf()));
        }
        let metadata = fs::metadata(path).map_err(|source| ConfigError::Trace {
            path: path.to_path_buf(),
            source,
        })?;
        let len = metadata.len();
        let summary = Self {
            path: path.to_path_buf(),
            width,
            records: len / width.bytes(),
            trailing_bytes: len % width.bytes(),
        };
        if summary.trailing_bytes > 0 {
            log::warn!(
                "trace file {} ends with a partial {} record ({} bytes), it will be ignored",
                path.display(),
                width,
                summary.trailing_bytes
            );
        }
        if summary.records == 0 {
            log::warn!("trace file {} contains no addresses", path.display());
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::{AddressWidth, TraceSummary};
    use crate::error::ConfigError;
    use pretty_assertions_sorted as diff;
    use std::fs;

    fn write_trace(name: &str, bytes: &[u8]) -> anyhow::Result<std::path::PathBuf> {
        let path = crate::testing::temp_dir()?.join(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    #[test]
    fn counts_whole_records() -> anyhow::Result<()> {
        crate::testing::init_logging();
        let path = write_trace("whole.bin", &[0u8; 24])?;
        let summary = TraceSummary::inspect(&path, AddressWidth::Bits32)?;
        diff::assert_eq!(summary.records, 6);
        diff::assert_eq!(summary.trailing_bytes, 0);

        let summary = TraceSummary::inspect(&path, AddressWidth::Bits64)?;
        diff::assert_eq!(summary.records, 3);
        Ok(())
    }

    #[test]
    fn reports_truncated_tail() -> anyhow::Result<()> {
        crate::testing::init_logging();
        let path = write_trace("truncated.bin", &[0xAB; 11])?;
        let summary = TraceSummary::inspect(&path, AddressWidth::Bits64)?;
        diff::assert_eq!(summary.records, 1);
        diff::assert_eq!(summary.trailing_bytes, 3);
        Ok(())
    }

    #[test]
    fn missing_trace_is_fatal() {
        assert!(matches!(
            TraceSummary::inspect("/nonexistent/TRACE.bin", AddressWidth::Bits32),
            Err(ConfigError::MissingTrace(_))
        ));
    }
}
