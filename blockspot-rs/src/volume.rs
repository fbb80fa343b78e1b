//! Read-only 3-D intensity volumes and halo-padded region reads.

use ndarray::{s, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{BlockspotError, Result};

/// How voxels outside the volume are filled when a halo crosses its edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    Zero,
    /// Mirror about the edge, repeating the edge voxel.
    #[default]
    Reflect,
}

/// A volume the orchestrator can read sub-regions from. Implementations are
/// shared across worker threads and must not mutate anything on read.
pub trait Volume: Sync {
    fn shape(&self) -> [u64; 3];

    /// Read `[origin, origin + shape)`; the region lies inside the volume.
    fn read(&self, origin: [u64; 3], shape: [u64; 3]) -> Result<Array3<f32>>;

    /// Read `[start, start + extent)` where the window may cross the volume
    /// edge. See [`read_padded`].
    fn read_padded(
        &self,
        start: [i64; 3],
        extent: [u64; 3],
        boundary: Boundary,
    ) -> Result<Array3<f32>> {
        read_padded(self, start, extent, boundary)
    }
}

impl<V: Volume + ?Sized> Volume for &V {
    fn shape(&self) -> [u64; 3] {
        (**self).shape()
    }

    fn read(&self, origin: [u64; 3], shape: [u64; 3]) -> Result<Array3<f32>> {
        (**self).read(origin, shape)
    }

    fn read_padded(
        &self,
        start: [i64; 3],
        extent: [u64; 3],
        boundary: Boundary,
    ) -> Result<Array3<f32>> {
        (**self).read_padded(start, extent, boundary)
    }
}

pub struct InMemoryVolume {
    data: Array3<f32>,
}

impl InMemoryVolume {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data }
    }
}

impl Volume for InMemoryVolume {
    fn shape(&self) -> [u64; 3] {
        let (a, b, c) = self.data.dim();
        [a as u64, b as u64, c as u64]
    }

    fn read(&self, origin: [u64; 3], shape: [u64; 3]) -> Result<Array3<f32>> {
        check_inside(self.shape(), origin, shape)?;
        let [o0, o1, o2] = origin.map(|v| v as usize);
        let [e0, e1, e2] = shape.map(|v| v as usize);
        Ok(self
            .data
            .slice(s![o0..o0 + e0, o1..o1 + e1, o2..o2 + e2])
            .to_owned())
    }
}

/// A rectangular window of another volume, addressed from its own origin.
/// Halo reads that leave the window take real voxels from the outer volume;
/// only voxels past the outer volume's edge are filled.
pub struct RegionVolume<V> {
    inner: V,
    origin: [u64; 3],
    shape: [u64; 3],
}

impl<V: Volume> RegionVolume<V> {
    pub fn new(inner: V, origin: [u64; 3], shape: [u64; 3]) -> Result<Self> {
        check_inside(inner.shape(), origin, shape)?;
        Ok(Self {
            inner,
            origin,
            shape,
        })
    }
}

impl<V: Volume> Volume for RegionVolume<V> {
    fn shape(&self) -> [u64; 3] {
        self.shape
    }

    fn read(&self, origin: [u64; 3], shape: [u64; 3]) -> Result<Array3<f32>> {
        check_inside(self.shape, origin, shape)?;
        let global = [
            self.origin[0] + origin[0],
            self.origin[1] + origin[1],
            self.origin[2] + origin[2],
        ];
        self.inner.read(global, shape)
    }

    fn read_padded(
        &self,
        start: [i64; 3],
        extent: [u64; 3],
        boundary: Boundary,
    ) -> Result<Array3<f32>> {
        let outer = std::array::from_fn(|a| start[a] + self.origin[a] as i64);
        self.inner.read_padded(outer, extent, boundary)
    }
}

fn check_inside(volume: [u64; 3], origin: [u64; 3], shape: [u64; 3]) -> Result<()> {
    for axis in 0..3 {
        if origin[axis] + shape[axis] > volume[axis] {
            return Err(BlockspotError::Read {
                origin,
                shape,
                message: format!("outside volume of shape {:?}", volume),
            });
        }
    }
    Ok(())
}

/// Map a possibly out-of-range index onto the volume, or `None` for zero fill.
fn source_index(idx: i64, len: u64, boundary: Boundary) -> Option<u64> {
    let n = len as i64;
    if n == 0 {
        return None;
    }
    if (0..n).contains(&idx) {
        return Some(idx as u64);
    }
    match boundary {
        Boundary::Zero => None,
        Boundary::Reflect => {
            let m = idx.rem_euclid(2 * n);
            Some(if m >= n { 2 * n - 1 - m } else { m } as u64)
        }
    }
}

/// Read `[start, start + extent)` where `start` may be negative and the end
/// may run past the volume. Voxels outside are filled per `boundary`.
pub fn read_padded<V: Volume + ?Sized>(
    volume: &V,
    start: [i64; 3],
    extent: [u64; 3],
    boundary: Boundary,
) -> Result<Array3<f32>> {
    let shape = volume.shape();
    let sources: [Vec<Option<u64>>; 3] = std::array::from_fn(|axis| {
        (0..extent[axis] as i64)
            .map(|i| source_index(start[axis] + i, shape[axis], boundary))
            .collect()
    });

    let dim = (extent[0] as usize, extent[1] as usize, extent[2] as usize);
    let mut lo = [0u64; 3];
    let mut hi = [0u64; 3];
    for axis in 0..3 {
        let present = sources[axis].iter().flatten();
        match (present.clone().min(), present.max()) {
            (Some(&a), Some(&b)) => {
                lo[axis] = a;
                hi[axis] = b + 1;
            }
            _ => return Ok(Array3::zeros(dim)),
        }
    }

    let inner = volume.read(lo, [hi[0] - lo[0], hi[1] - lo[1], hi[2] - lo[2]])?;
    let [s0, s1, s2] = &sources;
    Ok(Array3::from_shape_fn(dim, |(i, j, k)| {
        match (s0[i], s1[j], s2[k]) {
            (Some(a), Some(b), Some(c)) => {
                inner[[(a - lo[0]) as usize, (b - lo[1]) as usize, (c - lo[2]) as usize]]
            }
            _ => 0.0,
        }
    }))
}
