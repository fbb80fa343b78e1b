use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::axes::AxisPermutation;
use crate::error::{BlockspotError, Result};
use crate::volume::Boundary;

/// Parameters of one blockwise detection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectConfig {
    /// Core block extent per axis, in voxels.
    pub blocksize: [u64; 3],
    /// Halo added on each side of a block, per axis.
    pub overlap: [u64; 3],
    pub boundary: Boundary,
    /// Axis order the detector expects, relative to the stored array.
    pub transpose: Option<AxisPermutation>,
    /// Final width of every detection row, sampled intensity included.
    pub columns: usize,
    pub retry: RetryPolicy,
    /// Per-call limit on the detector process, in seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            blocksize: [256, 256, 256],
            overlap: [8, 8, 8],
            boundary: Boundary::Reflect,
            transpose: None,
            columns: 6,
            retry: RetryPolicy::default(),
            timeout_secs: None,
        }
    }
}

impl DetectConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| BlockspotError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        for a in 0..3 {
            if self.blocksize[a] == 0 {
                return Err(BlockspotError::Config(format!(
                    "blocksize must be positive on every axis, got {:?}",
                    self.blocksize
                )));
            }
            // A halo as wide as a block would reach into the core of a non-adjacent block.
            if self.overlap[a] >= self.blocksize[a] {
                return Err(BlockspotError::Config(format!(
                    "overlap {:?} must be smaller than blocksize {:?}",
                    self.overlap, self.blocksize
                )));
            }
        }
        if self.columns < 4 {
            return Err(BlockspotError::Config(format!(
                "columns must cover 3 coordinates plus intensity, got {}",
                self.columns
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(BlockspotError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Retries for transient detector failures, with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_backoff_ms
                .saturating_mul(factor)
                .min(self.max_backoff_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        DetectConfig::default().validate().unwrap();
    }

    #[test]
    fn overlap_must_be_smaller_than_blocksize() {
        let cfg = DetectConfig {
            blocksize: [20, 20, 20],
            overlap: [4, 20, 4],
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn too_few_columns_rejected() {
        let cfg = DetectConfig {
            columns: 3,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let p = RetryPolicy {
            max_attempts: 6,
            initial_backoff_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(350));
    }

    #[test]
    fn parses_partial_json() {
        let cfg: DetectConfig = serde_json::from_str(
            r#"{"blocksize": [64, 64, 32], "transpose": [2, 1, 0], "boundary": "zero"}"#,
        )
        .unwrap();
        assert_eq!(cfg.blocksize, [64, 64, 32]);
        assert_eq!(cfg.boundary, Boundary::Zero);
        assert_eq!(cfg.transpose, Some(AxisPermutation::reversed()));
        assert_eq!(cfg.columns, 6);
    }

    #[test]
    fn invalid_transpose_fails_to_parse() {
        let r: std::result::Result<DetectConfig, _> =
            serde_json::from_str(r#"{"transpose": [0, 0, 1]}"#);
        assert!(r.is_err());
    }
}
