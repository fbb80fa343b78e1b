//! Axis reordering for detectors that expect a fixed axis order.
//!
//! A permutation `p` maps the block so that axis `k` of the detector's view
//! is axis `p[k]` of the stored array. Coordinates coming back are in the
//! detector's order and must be mapped back before anything else reads them.

use ndarray::ArrayView3;
use serde::{Deserialize, Serialize};

use crate::error::{BlockspotError, Result};
use crate::table::DetectionTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[usize; 3]", into = "[usize; 3]")]
pub struct AxisPermutation([usize; 3]);

impl AxisPermutation {
    pub fn new(order: [usize; 3]) -> Result<Self> {
        let mut seen = [false; 3];
        for &a in &order {
            if a > 2 || seen[a] {
                return Err(BlockspotError::Config(format!(
                    "{:?} is not a permutation of the axes 0, 1, 2",
                    order
                )));
            }
            seen[a] = true;
        }
        Ok(Self(order))
    }

    /// Full reversal, e.g. stored (z, y, x) handed over as (x, y, z).
    pub fn reversed() -> Self {
        Self([2, 1, 0])
    }

    pub fn inverse(&self) -> Self {
        let mut inv = [0usize; 3];
        for (k, &a) in self.0.iter().enumerate() {
            inv[a] = k;
        }
        Self(inv)
    }

    /// Parse "2,1,0" style strings from the command line.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<usize> = s
            .split(',')
            .map(|p| p.trim().parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|_| BlockspotError::Config(format!("Invalid axis order: {:?}", s)))?;
        let order = <[usize; 3]>::try_from(parts.as_slice())
            .map_err(|_| BlockspotError::Config(format!("Axis order needs 3 entries: {:?}", s)))?;
        Self::new(order)
    }
}

impl TryFrom<[usize; 3]> for AxisPermutation {
    type Error = BlockspotError;

    fn try_from(order: [usize; 3]) -> Result<Self> {
        Self::new(order)
    }
}

impl From<AxisPermutation> for [usize; 3] {
    fn from(p: AxisPermutation) -> Self {
        p.0
    }
}

/// View the block in the detector's axis order. No copy is made.
pub fn permute_block<'a>(
    block: ArrayView3<'a, f32>,
    perm: Option<&AxisPermutation>,
) -> ArrayView3<'a, f32> {
    match perm {
        Some(p) => block.permuted_axes(p.0),
        None => block,
    }
}

/// Stored-order coordinates to detector order.
pub fn permute_columns(table: &mut DetectionTable, perm: Option<&AxisPermutation>) {
    if let Some(p) = perm {
        table.reorder_spatial(p.0);
    }
}

/// Detector-order coordinates back to stored order. Non-spatial columns keep
/// their values and position.
pub fn restore_columns(table: &mut DetectionTable, perm: Option<&AxisPermutation>) {
    if let Some(p) = perm {
        table.reorder_spatial(p.inverse().0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};

    const ALL: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    #[test]
    fn restore_inverts_permute_for_every_order() {
        let original = DetectionTable::new(array![
            [1.0, 2.0, 3.0, 4.0, 5.0],
            [6.5, 7.5, 8.5, 9.5, 10.5],
        ]);
        for order in ALL {
            let p = AxisPermutation::new(order).unwrap();
            let mut t = original.clone();
            permute_columns(&mut t, Some(&p));
            restore_columns(&mut t, Some(&p));
            assert_eq!(t, original, "order {:?}", order);
        }
    }

    #[test]
    fn block_and_coordinates_agree() {
        let mut block = Array3::<f32>::zeros((4, 5, 6));
        block[[1, 3, 5]] = 1.0;
        for order in ALL {
            let p = AxisPermutation::new(order).unwrap();
            let view = permute_block(block.view(), Some(&p));
            let mut t = DetectionTable::new(array![[1.0, 3.0, 5.0]]);
            permute_columns(&mut t, Some(&p));
            let c = t.row(0);
            assert_eq!(view[[c[0] as usize, c[1] as usize, c[2] as usize]], 1.0);
        }
    }

    #[test]
    fn none_is_identity() {
        let mut t = DetectionTable::new(array![[1.0, 2.0, 3.0]]);
        restore_columns(&mut t, None);
        assert_eq!(t.row(0), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_repeated_axes() {
        assert!(AxisPermutation::new([0, 0, 1]).is_err());
        assert!(AxisPermutation::parse("0,1,3").is_err());
        assert_eq!(AxisPermutation::parse("2, 1, 0").unwrap(), AxisPermutation::reversed());
    }
}
