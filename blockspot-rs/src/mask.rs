//! Coarse foreground masks: skip empty blocks up front, filter spots at the end.

use ndarray::{s, Array3};

use crate::table::DetectionTable;

/// Binary foreground on its own (usually coarser) grid.
#[derive(Debug, Clone)]
pub struct ForegroundMask {
    data: Array3<bool>,
}

impl ForegroundMask {
    pub fn new(data: Array3<bool>) -> Self {
        Self { data }
    }

    /// Nonzero voxels are foreground.
    pub fn from_values(values: &Array3<f32>) -> Self {
        Self {
            data: values.mapv(|v| v != 0.0),
        }
    }

    pub fn shape(&self) -> [u64; 3] {
        let (a, b, c) = self.data.dim();
        [a as u64, b as u64, c as u64]
    }

    pub fn get(&self, idx: [i64; 3]) -> bool {
        let shape = self.shape();
        if (0..3).any(|a| idx[a] < 0 || idx[a] as u64 >= shape[a]) {
            return false;
        }
        self.data[[idx[0] as usize, idx[1] as usize, idx[2] as usize]]
    }
}

/// A mask bound to the voxel grid of the volume being processed.
#[derive(Debug, Clone, Copy)]
pub struct MaskGate<'a> {
    mask: &'a ForegroundMask,
    ratio: [f64; 3],
    offset: [u64; 3],
}

impl<'a> MaskGate<'a> {
    /// `volume_shape` is the full grid the mask was drawn on.
    pub fn new(mask: &'a ForegroundMask, volume_shape: [u64; 3]) -> Self {
        let m = mask.shape();
        let ratio = std::array::from_fn(|a| {
            if volume_shape[a] == 0 {
                0.0
            } else {
                m[a] as f64 / volume_shape[a] as f64
            }
        });
        Self {
            mask,
            ratio,
            offset: [0; 3],
        }
    }

    /// Coordinates handed to the gate are relative to `offset` in the full grid.
    pub fn offset_by(mut self, offset: [u64; 3]) -> Self {
        self.offset = offset;
        self
    }

    pub fn ratio(&self) -> [f64; 3] {
        self.ratio
    }

    /// True when the mask has at least one foreground voxel under the block.
    pub fn has_foreground(&self, block_origin: [u64; 3], block_size: [u64; 3]) -> bool {
        let shape = self.mask.shape();
        let mut ranges = [(0usize, 0usize); 3];
        for a in 0..3 {
            let start = ((self.offset[a] + block_origin[a]) as f64 * self.ratio[a]).round() as u64;
            let len = (block_size[a] as f64 * self.ratio[a]).round() as u64;
            let lo = start.min(shape[a]);
            let hi = (start + len).min(shape[a]);
            if hi <= lo {
                return false;
            }
            ranges[a] = (lo as usize, hi as usize);
        }
        let [(a0, a1), (b0, b1), (c0, c1)] = ranges;
        self.mask
            .data
            .slice(s![a0..a1, b0..b1, c0..c1])
            .iter()
            .any(|&v| v)
    }

    /// Keep spots whose scaled, rounded position lands on foreground.
    pub fn filter(&self, table: &DetectionTable) -> DetectionTable {
        table.retain(|c| {
            let idx: [i64; 3] = std::array::from_fn(|a| {
                ((c[a] + self.offset[a] as f64) * self.ratio[a]).round() as i64
            });
            self.mask.get(idx)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn half_mask() -> ForegroundMask {
        // 2x2x2 mask over a 20^3 volume: only the high half of axis 0 is foreground.
        let mut m = Array3::from_elem((2, 2, 2), false);
        m.slice_mut(s![1, .., ..]).fill(true);
        ForegroundMask::new(m)
    }

    #[test]
    fn ratio_is_mask_over_volume() {
        let m = half_mask();
        let gate = MaskGate::new(&m, [20, 20, 40]);
        assert_eq!(gate.ratio(), [0.1, 0.1, 0.05]);
    }

    #[test]
    fn gate_sees_foreground_only_where_present() {
        let m = half_mask();
        let gate = MaskGate::new(&m, [20, 20, 20]);
        assert!(!gate.has_foreground([0, 0, 0], [10, 20, 20]));
        assert!(gate.has_foreground([10, 0, 0], [10, 20, 20]));
    }

    #[test]
    fn region_past_the_mask_counts_as_empty() {
        let m = half_mask();
        let gate = MaskGate::new(&m, [20, 20, 20]);
        assert!(!gate.has_foreground([40, 0, 0], [10, 10, 10]));
    }

    #[test]
    fn offset_shifts_the_lookup() {
        let m = half_mask();
        let gate = MaskGate::new(&m, [20, 20, 20]).offset_by([10, 0, 0]);
        assert!(gate.has_foreground([0, 0, 0], [10, 20, 20]));
    }

    #[test]
    fn filter_drops_background_and_out_of_range_spots() {
        let m = half_mask();
        let gate = MaskGate::new(&m, [20, 20, 20]);
        let t = DetectionTable::new(array![
            [2.0, 3.0, 3.0, 1.0],
            [12.0, 3.0, 3.0, 2.0],
            [14.0, 14.0, 1.0, 3.0],
            [30.0, 3.0, 3.0, 4.0],
        ]);
        let kept = gate.filter(&t);
        let ids: Vec<f64> = (0..kept.len()).map(|i| kept.row(i)[3]).collect();
        assert_eq!(ids, vec![2.0, 3.0]);
    }
}
