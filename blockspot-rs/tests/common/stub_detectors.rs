//! In-process detectors standing in for the external program.

use blockspot::{DetectError, SpotDetector};
use ndarray::{Array2, ArrayView3};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Reports every voxel above `threshold` as a spot: `[c0, c1, c2, value]`.
pub struct ThresholdDetector {
    pub threshold: f32,
    pub calls: AtomicUsize,
}

impl ThresholdDetector {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            calls: AtomicUsize::new(0),
        }
    }
}

impl SpotDetector for ThresholdDetector {
    fn detect(&self, block: ArrayView3<'_, f32>) -> Result<Array2<f64>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut flat = Vec::new();
        for ((i, j, k), &v) in block.indexed_iter() {
            if v > self.threshold {
                flat.extend_from_slice(&[i as f64, j as f64, k as f64, v as f64]);
            }
        }
        let n = flat.len() / 4;
        Ok(Array2::from_shape_vec((n, 4), flat).expect("4 fields per spot"))
    }
}

/// Reports one sub-voxel spot per block: the intensity-weighted centroid of
/// all voxels above `threshold`, as `[c0, c1, c2, total]`.
pub struct CentroidDetector {
    pub threshold: f32,
}

impl SpotDetector for CentroidDetector {
    fn detect(&self, block: ArrayView3<'_, f32>) -> Result<Array2<f64>, DetectError> {
        let mut sum = [0.0f64; 3];
        let mut total = 0.0f64;
        for ((i, j, k), &v) in block.indexed_iter() {
            if v > self.threshold {
                let w = v as f64;
                sum[0] += w * i as f64;
                sum[1] += w * j as f64;
                sum[2] += w * k as f64;
                total += w;
            }
        }
        if total == 0.0 {
            return Ok(Array2::zeros((0, 4)));
        }
        let row = vec![sum[0] / total, sum[1] / total, sum[2] / total, total];
        Ok(Array2::from_shape_vec((1, 4), row).expect("one row of 4 fields"))
    }
}

/// Returns the same table for every block.
pub struct FixedDetector {
    pub spots: Array2<f64>,
    pub calls: AtomicUsize,
}

impl FixedDetector {
    pub fn new(spots: Array2<f64>) -> Self {
        Self {
            spots,
            calls: AtomicUsize::new(0),
        }
    }
}

impl SpotDetector for FixedDetector {
    fn detect(&self, _block: ArrayView3<'_, f32>) -> Result<Array2<f64>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.spots.clone())
    }
}

/// Fails `failures` times with the given error kind, then returns no spots.
pub struct FlakyDetector {
    pub failures: usize,
    pub transient: bool,
    pub calls: AtomicUsize,
    pub shapes: Mutex<Vec<Vec<usize>>>,
}

impl FlakyDetector {
    pub fn new(failures: usize, transient: bool) -> Self {
        Self {
            failures,
            transient,
            calls: AtomicUsize::new(0),
            shapes: Mutex::new(Vec::new()),
        }
    }
}

impl SpotDetector for FlakyDetector {
    fn detect(&self, block: ArrayView3<'_, f32>) -> Result<Array2<f64>, DetectError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.shapes.lock().unwrap().push(block.shape().to_vec());
        if n < self.failures {
            return Err(if self.transient {
                DetectError::Exited {
                    code: 1,
                    stderr: "session lost".into(),
                }
            } else {
                DetectError::Output("garbage".into())
            });
        }
        Ok(Array2::zeros((0, 0)))
    }
}
