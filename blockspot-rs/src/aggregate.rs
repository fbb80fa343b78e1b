//! Collect per-block tables (any completion order) into one global table.

use ndarray::{Array2, Axis};

use crate::error::{BlockspotError, Result};
use crate::partition::BlockGrid;
use crate::table::DetectionTable;

/// One slot per block, filled in whatever order blocks finish.
#[derive(Debug)]
pub struct BlockResults {
    grid: BlockGrid,
    columns: usize,
    cells: Vec<Option<DetectionTable>>,
}

impl BlockResults {
    pub fn new(grid: &BlockGrid, columns: usize) -> Self {
        Self {
            grid: grid.clone(),
            columns,
            cells: vec![None; grid.len()],
        }
    }

    /// Store a block's table. The width is checked here so a misconfigured
    /// run fails on the first bad block instead of at concatenation.
    pub fn insert(&mut self, index: [usize; 3], table: DetectionTable) -> Result<()> {
        if table.columns() != self.columns {
            return Err(BlockspotError::ColumnMismatch {
                index,
                expected: self.columns,
                found: table.columns(),
            });
        }
        let i = self.grid.linear(index);
        self.cells[i] = Some(table);
        Ok(())
    }

    /// Stack all cells in row-major block order. Missing cells are an error:
    /// a block without a result must never read as zero detections.
    pub fn flatten(self) -> Result<DetectionTable> {
        let mut views = Vec::with_capacity(self.cells.len());
        for (block, cell) in self.grid.blocks().zip(&self.cells) {
            match cell {
                Some(t) => views.push(t.view()),
                None => {
                    return Err(BlockspotError::Config(format!(
                        "block {:?} has no result",
                        block.index
                    )));
                }
            }
        }
        if views.is_empty() {
            return Ok(DetectionTable::empty(self.columns));
        }
        let rows: Array2<f64> = ndarray::concatenate(Axis(0), &views)
            .map_err(|e| BlockspotError::Config(format!("cannot stack block tables: {}", e)))?;
        Ok(DetectionTable::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn flattens_in_block_order_regardless_of_insert_order() {
        let grid = BlockGrid::new([4, 2, 2], [2, 2, 2], [0, 0, 0]);
        let mut results = BlockResults::new(&grid, 4);
        results
            .insert([1, 0, 0], DetectionTable::new(array![[2.0, 0.0, 0.0, 0.0]]))
            .unwrap();
        results
            .insert(
                [0, 0, 0],
                DetectionTable::new(array![[0.0, 0.0, 0.0, 0.0], [1.0, 0.0, 0.0, 0.0]]),
            )
            .unwrap();
        let all = results.flatten().unwrap();
        let xs: Vec<f64> = (0..all.len()).map(|i| all.row(i)[0]).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn empty_cells_stack_with_populated_ones() {
        let grid = BlockGrid::new([4, 2, 2], [2, 2, 2], [0, 0, 0]);
        let mut results = BlockResults::new(&grid, 6);
        results.insert([0, 0, 0], DetectionTable::empty(6)).unwrap();
        results
            .insert([1, 0, 0], DetectionTable::new(Array2::ones((3, 6))))
            .unwrap();
        let all = results.flatten().unwrap();
        assert_eq!((all.len(), all.columns()), (3, 6));
    }

    #[test]
    fn width_mismatch_names_the_block() {
        let grid = BlockGrid::new([2, 2, 2], [2, 2, 2], [0, 0, 0]);
        let mut results = BlockResults::new(&grid, 6);
        let err = results
            .insert([0, 0, 0], DetectionTable::empty(4))
            .unwrap_err();
        assert!(matches!(
            err,
            BlockspotError::ColumnMismatch {
                index: [0, 0, 0],
                expected: 6,
                found: 4
            }
        ));
    }

    #[test]
    fn missing_cell_is_not_silently_empty() {
        let grid = BlockGrid::new([4, 2, 2], [2, 2, 2], [0, 0, 0]);
        let mut results = BlockResults::new(&grid, 4);
        results.insert([0, 0, 0], DetectionTable::empty(4)).unwrap();
        let err = results.flatten().unwrap_err();
        assert!(err.to_string().contains("[1, 0, 0]"), "{}", err);
    }
}
