//! Physical <-> voxel conversions and the two-line coordinates file.

use std::fs;
use std::path::Path;

use crate::error::{BlockspotError, Result};
use crate::table::DetectionTable;

/// Round a physical region to voxel units. No bound checking: an extent that
/// runs past the volume shows up later as a failed read.
pub fn to_voxels(offset: [f64; 3], extent: [f64; 3], spacing: [f64; 3]) -> ([u64; 3], [u64; 3]) {
    let mut offset_vox = [0u64; 3];
    let mut extent_vox = [0u64; 3];
    for axis in 0..3 {
        offset_vox[axis] = (offset[axis] / spacing[axis]).round().max(0.0) as u64;
        extent_vox[axis] = (extent[axis] / spacing[axis]).round().max(0.0) as u64;
    }
    (offset_vox, extent_vox)
}

/// `voxel * spacing + origin` on the spatial columns.
pub fn to_physical(table: &mut DetectionTable, spacing: [f64; 3], origin: [f64; 3]) {
    table.scale_translate(spacing, origin);
}

/// Line 1: physical offset per axis. Line 2: physical extent per axis.
pub fn read_coords(path: &Path) -> Result<([f64; 3], [f64; 3])> {
    let s = fs::read_to_string(path)?;
    let mut lines = s.lines().filter(|l| !l.trim().is_empty());
    let offset = parse_triple(lines.next(), "offset", path)?;
    let extent = parse_triple(lines.next(), "extent", path)?;
    Ok((offset, extent))
}

fn parse_triple(line: Option<&str>, what: &str, path: &Path) -> Result<[f64; 3]> {
    let line = line.ok_or_else(|| {
        BlockspotError::Config(format!("{}: missing {} line", path.display(), what))
    })?;
    let values: Vec<f64> = line
        .split_whitespace()
        .map(|t| t.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| BlockspotError::Config(format!("{}: bad {}: {}", path.display(), what, e)))?;
    <[f64; 3]>::try_from(values.as_slice()).map_err(|_| {
        BlockspotError::Config(format!(
            "{}: {} needs 3 values, got {}",
            path.display(),
            what,
            values.len()
        ))
    })
}
