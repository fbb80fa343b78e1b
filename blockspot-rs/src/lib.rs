//! Blockwise spot detection for 3-D volumes too large for one detector pass.
//!
//! The volume is cut into a grid of blocks with a halo, blocks with no
//! foreground in a coarse mask are skipped, the external detector runs once
//! per remaining block, and each spot is kept by exactly one block before the
//! results are stacked into one table in global coordinates.

pub mod aggregate;
pub mod axes;
pub mod config;
pub mod coords;
pub mod dedup;
pub mod detector;
pub mod error;
pub mod mask;
pub mod orchestrate;
pub mod partition;
pub mod pipeline;
pub mod table;
pub mod volume;
pub mod zarr;

pub use config::{DetectConfig, RetryPolicy};
pub use detector::{ExternalDetector, SpotDetector};
pub use error::{BlockspotError, DetectError};
pub use orchestrate::{distributed_detect_spots, ExecutionContext, RunSummary};
pub use table::DetectionTable;
