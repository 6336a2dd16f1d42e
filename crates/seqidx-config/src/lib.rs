//! # seqidx-config — Sequence Number Index configuration
//!
//! The index's configuration surface: `fileCapacity`, `streamId`, and
//! `indexFileStateFlushTimeoutInMs`, plus the sector size and split ratio
//! needed to turn the layout into something concrete.

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Default sector size: 4 KiB.
pub const DEFAULT_SECTOR_SIZE: u32 = 4096;
/// Default total capacity: 16 MiB.
pub const DEFAULT_FILE_CAPACITY: u64 = 16 * 1024 * 1024;
/// Default minimum interval between time-triggered flushes.
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SeqIndexConfig {
    /// Total span of the index buffer/file, in bytes. Must be a positive
    /// multiple of `sector_size`.
    pub file_capacity: u64,
    /// Physical size of one checksum-framed sector.
    pub sector_size: u32,
    /// Fraction of `file_capacity` given to the record region; the
    /// remainder goes to the position region. Defaults to 0.9, but left
    /// adjustable so tests can shrink the position region without
    /// shrinking the whole buffer.
    pub sequence_number_ratio: f64,
    /// Only fragments carrying this stream id are processed.
    pub stream_id: i32,
    /// Minimum interval between time-triggered flushes.
    pub index_file_state_flush_timeout_ms: u64,
}

impl Default for SeqIndexConfig {
    fn default() -> Self {
        SeqIndexConfig {
            file_capacity: DEFAULT_FILE_CAPACITY,
            sector_size: DEFAULT_SECTOR_SIZE,
            sequence_number_ratio: seqidx_format::SEQUENCE_NUMBER_RATIO,
            stream_id: 1,
            index_file_state_flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("file capacity {file_capacity} is smaller than one sector ({sector_size})")]
    SubSectorCapacity { file_capacity: u64, sector_size: u32 },

    #[error("file capacity {file_capacity} is not a multiple of sector size {sector_size}")]
    NotSectorAligned { file_capacity: u64, sector_size: u32 },

    #[error("sequence_number_ratio {0} is out of range (0, 1)")]
    RatioOutOfRange(f64),

    #[error("record region {record_region_len} bytes is not a multiple of sector size {sector_size}")]
    RecordRegionNotAligned { record_region_len: u64, sector_size: u32 },

    #[error("position region {position_region_len} bytes is not a multiple of sector size {sector_size}")]
    PositionRegionNotAligned { position_region_len: u64, sector_size: u32 },
}

impl SeqIndexConfig {
    /// Validates the combination of `file_capacity`, `sector_size`, and
    /// `sequence_number_ratio` — `file_capacity` must equal an integral
    /// number of sectors and be at least one sector — returning the byte
    /// length of the record region and the position region on success.
    pub fn validate(&self) -> Result<(u64, u64), ConfigError> {
        let sector_size = u64::from(self.sector_size);

        if self.file_capacity < sector_size {
            return Err(ConfigError::SubSectorCapacity {
                file_capacity: self.file_capacity,
                sector_size: self.sector_size,
            });
        }
        if self.file_capacity % sector_size != 0 {
            return Err(ConfigError::NotSectorAligned {
                file_capacity: self.file_capacity,
                sector_size: self.sector_size,
            });
        }
        if !(self.sequence_number_ratio > 0.0 && self.sequence_number_ratio < 1.0) {
            return Err(ConfigError::RatioOutOfRange(self.sequence_number_ratio));
        }

        let raw_record_len = (self.file_capacity as f64) * self.sequence_number_ratio;
        let record_sectors = (raw_record_len as u64) / sector_size;
        let record_region_len = record_sectors * sector_size;
        let position_region_len = self.file_capacity - record_region_len;

        if record_region_len == 0 || record_region_len % sector_size != 0 {
            return Err(ConfigError::RecordRegionNotAligned {
                record_region_len,
                sector_size: self.sector_size,
            });
        }
        if position_region_len == 0 || position_region_len % sector_size != 0 {
            return Err(ConfigError::PositionRegionNotAligned {
                position_region_len,
                sector_size: self.sector_size,
            });
        }

        Ok((record_region_len, position_region_len))
    }

    /// Reads a configuration value from the environment, falling back to
    /// `default` and silently keeping the default on a parse failure.
    pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
        env::var(key)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(default)
    }

    /// Builds a config from `SEQIDX_*` environment variables, falling back
    /// to [`SeqIndexConfig::default`] for anything unset or unparsable.
    #[must_use]
    pub fn from_env() -> Self {
        let default = Self::default();
        SeqIndexConfig {
            file_capacity: Self::env_or("SEQIDX_FILE_CAPACITY", default.file_capacity),
            sector_size: Self::env_or("SEQIDX_SECTOR_SIZE", default.sector_size),
            sequence_number_ratio: Self::env_or(
                "SEQIDX_SEQUENCE_NUMBER_RATIO",
                default.sequence_number_ratio,
            ),
            stream_id: Self::env_or("SEQIDX_STREAM_ID", default.stream_id),
            index_file_state_flush_timeout_ms: Self::env_or(
                "SEQIDX_FLUSH_TIMEOUT_MS",
                default.index_file_state_flush_timeout_ms,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = SeqIndexConfig::default();
        let (record_len, position_len) = config.validate().unwrap();
        assert_eq!(record_len + position_len, config.file_capacity);
    }

    #[test]
    fn sub_sector_capacity_is_rejected() {
        let config = SeqIndexConfig {
            file_capacity: 100,
            sector_size: 4096,
            ..SeqIndexConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SubSectorCapacity { .. })
        ));
    }

    #[test]
    fn non_aligned_capacity_is_rejected() {
        let config = SeqIndexConfig {
            file_capacity: 4096 * 3 + 10,
            sector_size: 4096,
            ..SeqIndexConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotSectorAligned { .. })
        ));
    }

    #[test]
    fn one_sector_capacity_is_the_minimum_valid_size() {
        // One sector total can't split 90/10 into two non-zero,
        // sector-aligned regions, so it must be rejected even though it
        // satisfies the bare "at least one sector" rule on its own.
        let config = SeqIndexConfig {
            file_capacity: 4096,
            sector_size: 4096,
            ..SeqIndexConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn small_multi_sector_capacity_splits_90_10() {
        let config = SeqIndexConfig {
            file_capacity: 4096 * 10,
            sector_size: 4096,
            ..SeqIndexConfig::default()
        };
        let (record_len, position_len) = config.validate().unwrap();
        assert_eq!(record_len, 4096 * 9);
        assert_eq!(position_len, 4096);
    }
}
