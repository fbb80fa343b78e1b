//! Regular block grid over a volume, with a halo around every block.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    /// Position in the block grid.
    pub index: [usize; 3],
    /// Global voxel coordinate of the first core voxel.
    pub origin: [u64; 3],
    /// Core extent. Equal to the block size except on the high edge of the volume.
    pub core: [u64; 3],
    pub overlap: [u64; 3],
}

impl Block {
    /// `max(0, origin - overlap)`: where the halo read starts inside the volume.
    pub fn overlap_origin(&self) -> [u64; 3] {
        std::array::from_fn(|a| self.origin[a].saturating_sub(self.overlap[a]))
    }

    /// Global coordinate of local voxel 0 in the padded block. Negative on
    /// the low edge, where the halo is boundary fill.
    pub fn frame_origin(&self) -> [i64; 3] {
        std::array::from_fn(|a| self.origin[a] as i64 - self.overlap[a] as i64)
    }

    /// Extent of the padded block handed to the detector.
    pub fn padded_extent(&self) -> [u64; 3] {
        std::array::from_fn(|a| self.core[a] + 2 * self.overlap[a])
    }
}

#[derive(Debug, Clone)]
pub struct BlockGrid {
    shape: [u64; 3],
    blocksize: [u64; 3],
    overlap: [u64; 3],
    counts: [usize; 3],
}

impl BlockGrid {
    /// Block size must be nonzero on every axis.
    pub fn new(shape: [u64; 3], blocksize: [u64; 3], overlap: [u64; 3]) -> Self {
        let counts = std::array::from_fn(|a| shape[a].div_ceil(blocksize[a].max(1)) as usize);
        Self {
            shape,
            blocksize,
            overlap,
            counts,
        }
    }

    /// Number of blocks along each axis.
    pub fn counts(&self) -> [usize; 3] {
        self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn block(&self, index: [usize; 3]) -> Block {
        let origin: [u64; 3] = std::array::from_fn(|a| self.blocksize[a] * index[a] as u64);
        let core = std::array::from_fn(|a| self.blocksize[a].min(self.shape[a] - origin[a]));
        Block {
            index,
            origin,
            core,
            overlap: self.overlap,
        }
    }

    /// Row-major position of a block index.
    pub fn linear(&self, index: [usize; 3]) -> usize {
        (index[0] * self.counts[1] + index[1]) * self.counts[2] + index[2]
    }

    /// All blocks in row-major order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        let [n0, n1, n2] = self.counts;
        (0..n0).flat_map(move |i| {
            (0..n1).flat_map(move |j| (0..n2).map(move |k| self.block([i, j, k])))
        })
    }
}
