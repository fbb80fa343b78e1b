//! Region-of-interest run: physical ROI in, physical spot table out.

use std::path::{Path, PathBuf};

use crate::config::DetectConfig;
use crate::coords::{to_physical, to_voxels};
use crate::detector::SpotDetector;
use crate::error::Result;
use crate::mask::{ForegroundMask, MaskGate};
use crate::orchestrate::{distributed_detect_spots, ExecutionContext, RunSummary};
use crate::table::DetectionTable;
use crate::volume::{RegionVolume, Volume};

/// A physical region of a volume with known voxel spacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub offset: [f64; 3],
    pub extent: [f64; 3],
    pub spacing: [f64; 3],
}

/// Detect spots inside `region` of `volume`. Block halos at the region's edge
/// read the surrounding voxels of `volume`. The mask, if any, is drawn over
/// the whole volume. Returned coordinates are physical:
/// `voxel * spacing + region.offset`.
pub fn detect_region<V, D, P>(
    ctx: &ExecutionContext,
    volume: &V,
    region: &Region,
    detector: &D,
    config: &DetectConfig,
    mask: Option<&ForegroundMask>,
    progress: P,
) -> Result<(DetectionTable, RunSummary)>
where
    V: Volume,
    D: SpotDetector + ?Sized,
    P: Fn(f64, &str) + Sync,
{
    let (origin, extent) = to_voxels(region.offset, region.extent, region.spacing);
    log::info!(
        "region {:?}+{:?} (physical) -> voxels {:?}+{:?}",
        region.offset,
        region.extent,
        origin,
        extent
    );
    let roi = RegionVolume::new(volume, origin, extent)?;
    let gate = mask.map(|m| MaskGate::new(m, volume.shape()).offset_by(origin));

    let (mut spots, summary) =
        distributed_detect_spots(ctx, &roi, detector, config, gate.as_ref(), progress)?;
    to_physical(&mut spots, region.spacing, region.offset);
    Ok((spots, summary))
}

pub fn output_path(dir: &Path, suffix: &str) -> PathBuf {
    dir.join(format!("spots{}", suffix))
}
