//! Attribute each spot to exactly one block.
//!
//! A spot near a block edge is seen by every block whose halo covers it. Only
//! the block whose core contains the spot keeps it: per axis the local
//! coordinate must satisfy `overlap <= c < overlap + core`. The cores of
//! neighbouring blocks tile each axis, so a sub-voxel position is claimed by
//! one block only and a spot exactly on a shared boundary belongs to the
//! higher block.

use crate::partition::Block;
use crate::table::DetectionTable;

pub fn in_core(coord: &[f64; 3], overlap: [u64; 3], core: [u64; 3]) -> bool {
    (0..3).all(|a| {
        let lo = overlap[a] as f64;
        let hi = (overlap[a] + core[a]) as f64;
        coord[a] >= lo && coord[a] < hi
    })
}

/// Keep core spots and move them from padded-block to global voxel coordinates.
pub fn dedup_and_translate(block: &Block, spots: &DetectionTable) -> DetectionTable {
    let mut kept = spots.retain(|c| in_core(c, block.overlap, block.core));
    let frame = block.frame_origin();
    kept.translate([frame[0] as f64, frame[1] as f64, frame[2] as f64]);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::BlockGrid;
    use ndarray::array;

    #[test]
    fn boundary_is_half_open() {
        let o = [4, 4, 4];
        let core = [20, 20, 20];
        assert!(in_core(&[4.0, 5.0, 5.0], o, core));
        assert!(!in_core(&[3.0, 5.0, 5.0], o, core));
        assert!(!in_core(&[3.5, 5.0, 5.0], o, core));
        assert!(!in_core(&[3.999, 5.0, 5.0], o, core));
        assert!(in_core(&[23.9, 5.0, 5.0], o, core));
        assert!(!in_core(&[24.0, 5.0, 5.0], o, core));
    }

    #[test]
    fn translates_by_padded_frame_origin() {
        let grid = BlockGrid::new([40, 20, 20], [20, 20, 20], [4, 4, 4]);
        let spots = DetectionTable::new(array![[4.0, 5.0, 6.0, 1.0], [1.0, 5.0, 6.0, 2.0]]);

        let first = dedup_and_translate(&grid.block([0, 0, 0]), &spots);
        assert_eq!(first.len(), 1);
        assert_eq!(first.row(0), vec![0.0, 1.0, 2.0, 1.0]);

        let second = dedup_and_translate(&grid.block([1, 0, 0]), &spots);
        assert_eq!(second.row(0), vec![20.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn shared_boundary_spot_survives_once() {
        // Global x = 20 sits on the boundary between block 0 and block 1.
        let grid = BlockGrid::new([40, 20, 20], [20, 20, 20], [4, 4, 4]);
        let mut survivors = 0;
        for block in grid.blocks() {
            let local = 20.0 - block.frame_origin()[0] as f64;
            let spots = DetectionTable::new(array![[local, 9.0, 9.0, 0.0]]);
            survivors += dedup_and_translate(&block, &spots).len();
        }
        assert_eq!(survivors, 1);
    }

    #[test]
    fn sub_voxel_boundary_spot_survives_once() {
        // Global x = 19.5 is in the halo of block 1 and the core of block 0.
        let grid = BlockGrid::new([40, 20, 20], [20, 20, 20], [4, 4, 4]);
        let mut kept = Vec::new();
        for block in grid.blocks() {
            let local = 19.5 - block.frame_origin()[0] as f64;
            let spots = DetectionTable::new(array![[local, 9.0, 9.0, 0.0]]);
            let out = dedup_and_translate(&block, &spots);
            kept.extend((0..out.len()).map(|i| out.row(i)[0]));
        }
        assert_eq!(kept, vec![19.5]);
    }

    #[test]
    fn first_block_drops_spots_before_the_volume() {
        let grid = BlockGrid::new([40, 20, 20], [20, 20, 20], [4, 4, 4]);
        // local 3.5 is global -0.5, centred in the reflected fill.
        let spots = DetectionTable::new(array![[3.5, 5.0, 5.0], [4.25, 5.0, 5.0]]);
        let kept = dedup_and_translate(&grid.block([0, 0, 0]), &spots);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.row(0)[0], 0.25);
    }

    #[test]
    fn edge_block_drops_spots_in_boundary_fill() {
        let grid = BlockGrid::new([25, 20, 20], [20, 20, 20], [4, 4, 4]);
        let block = grid.block([1, 0, 0]);
        // core is 5 voxels; local 9.5 is global 25.5, past the volume.
        let spots = DetectionTable::new(array![[8.5, 5.0, 5.0], [9.5, 5.0, 5.0]]);
        let kept = dedup_and_translate(&block, &spots);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.row(0)[0], 24.5);
    }
}
