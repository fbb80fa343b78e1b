//! Detection tables: one row per spot, columns `[c0, c1, c2, fields..., intensity]`.

use ndarray::{s, Array2, ArrayView2, Axis};
use std::path::Path;

use crate::error::Result;

/// Number of leading spatial coordinate columns.
pub const SPATIAL: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionTable {
    rows: Array2<f64>,
}

impl DetectionTable {
    pub fn new(rows: Array2<f64>) -> Self {
        Self { rows }
    }

    /// Zero-row table with a fixed column count, so it stacks with populated ones.
    pub fn empty(columns: usize) -> Self {
        Self {
            rows: Array2::zeros((0, columns)),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.nrows() == 0
    }

    pub fn columns(&self) -> usize {
        self.rows.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.rows.view()
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        self.rows.row(i).to_vec()
    }

    /// Keep rows whose spatial coordinates satisfy `keep`.
    pub fn retain(&self, mut keep: impl FnMut(&[f64; 3]) -> bool) -> Self {
        let selected: Vec<usize> = (0..self.len())
            .filter(|&i| {
                let r = self.rows.row(i);
                keep(&[r[0], r[1], r[2]])
            })
            .collect();
        Self {
            rows: self.rows.select(Axis(0), &selected),
        }
    }

    /// Add `offset` to the spatial columns.
    pub fn translate(&mut self, offset: [f64; 3]) {
        for (axis, delta) in offset.iter().enumerate() {
            self.rows.column_mut(axis).mapv_inplace(|c| c + delta);
        }
    }

    /// `coord * scale + offset` on the spatial columns only.
    pub fn scale_translate(&mut self, scale: [f64; 3], offset: [f64; 3]) {
        for axis in 0..SPATIAL {
            let (k, d) = (scale[axis], offset[axis]);
            self.rows.column_mut(axis).mapv_inplace(|c| c * k + d);
        }
    }

    /// Reorder the spatial columns so that column `k` becomes the old column `order[k]`.
    pub fn reorder_spatial(&mut self, order: [usize; 3]) {
        let old = self.rows.slice(s![.., ..SPATIAL]).to_owned();
        for (k, &src) in order.iter().enumerate() {
            self.rows.column_mut(k).assign(&old.column(src));
        }
    }

    /// Write as a whitespace-delimited numeric table with no header.
    pub fn write_txt(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .from_path(path)?;
        for row in self.rows.rows() {
            wtr.write_record(row.iter().map(|v| format!("{:.18e}", v)))?;
        }
        wtr.flush()?;
        Ok(())
    }
}
