//! Blockwise detection over a whole volume.
//!
//! Per block: mask check, halo-padded read, axis reorder, detector call with
//! retries, axis restore, core filter and translation to global voxels.
//! Blocks share nothing but read-only inputs and run in any order on the
//! context's worker pool; the only join is the final gather.

use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::aggregate::BlockResults;
use crate::axes::{permute_block, restore_columns};
use crate::config::DetectConfig;
use crate::dedup::dedup_and_translate;
use crate::detector::{sample_intensity, SpotDetector};
use crate::error::{BlockspotError, Result};
use crate::mask::MaskGate;
use crate::partition::{Block, BlockGrid};
use crate::table::DetectionTable;
use crate::volume::Volume;

/// Worker pool shared by many runs. The caller owns it; a run borrows it.
pub struct ExecutionContext {
    pool: rayon::ThreadPool,
}

impl ExecutionContext {
    /// `workers == 0` uses one worker per available core.
    pub fn new(workers: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("blockspot-worker-{}", i))
            .build()?;
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub blocks: usize,
    pub skipped: usize,
    pub detector_calls: usize,
    pub retries: usize,
    pub spots: usize,
}

#[derive(Default)]
struct Counters {
    done: AtomicUsize,
    skipped: AtomicUsize,
    calls: AtomicUsize,
    retries: AtomicUsize,
}

/// Detect spots in every block of `volume` and return them in global voxel
/// coordinates, one row per spot, in row-major block order.
pub fn distributed_detect_spots<V, D, P>(
    ctx: &ExecutionContext,
    volume: &V,
    detector: &D,
    config: &DetectConfig,
    gate: Option<&MaskGate<'_>>,
    progress: P,
) -> Result<(DetectionTable, RunSummary)>
where
    V: Volume,
    D: SpotDetector + ?Sized,
    P: Fn(f64, &str) + Sync,
{
    config.validate()?;
    let grid = BlockGrid::new(volume.shape(), config.blocksize, config.overlap);
    let blocks: Vec<Block> = grid.blocks().collect();
    let total = blocks.len();
    log::info!(
        "detecting spots in {} block(s) of {:?} (overlap {:?}) over volume {:?} with {} worker(s)",
        total,
        config.blocksize,
        config.overlap,
        volume.shape(),
        ctx.workers()
    );

    let counters = Counters::default();
    let outcomes: Vec<(Block, Result<DetectionTable>)> = ctx.pool.install(|| {
        blocks
            .par_iter()
            .map(|block| {
                let result = process_block(block, volume, detector, config, gate, &counters);
                let done = counters.done.fetch_add(1, Ordering::Relaxed) + 1;
                progress(done as f64 / total as f64, &format!("Block {}/{}", done, total));
                (*block, result)
            })
            .collect()
    });

    let mut results = BlockResults::new(&grid, config.columns);
    let mut first_failure = None;
    for (block, outcome) in outcomes {
        match outcome {
            Ok(table) => results.insert(block.index, table)?,
            Err(e) => {
                log::error!("block {:?} at origin {:?}: {}", block.index, block.origin, e);
                first_failure.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_failure {
        return Err(e);
    }

    let mut spots = results.flatten()?;
    if let Some(gate) = gate {
        let before = spots.len();
        spots = gate.filter(&spots);
        log::debug!("mask filter kept {}/{} spots", spots.len(), before);
    }

    let summary = RunSummary {
        blocks: total,
        skipped: counters.skipped.load(Ordering::Relaxed),
        detector_calls: counters.calls.load(Ordering::Relaxed),
        retries: counters.retries.load(Ordering::Relaxed),
        spots: spots.len(),
    };
    log::info!(
        "{} spot(s) from {} block(s): {} skipped by mask, {} detector call(s), {} retried",
        summary.spots,
        summary.blocks,
        summary.skipped,
        summary.detector_calls,
        summary.retries
    );
    Ok((spots, summary))
}

fn process_block<V, D>(
    block: &Block,
    volume: &V,
    detector: &D,
    config: &DetectConfig,
    gate: Option<&MaskGate<'_>>,
    counters: &Counters,
) -> Result<DetectionTable>
where
    V: Volume,
    D: SpotDetector + ?Sized,
{
    if let Some(gate) = gate {
        if !gate.has_foreground(block.origin, config.blocksize) {
            log::debug!("block {:?}: no foreground, skipped", block.index);
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(DetectionTable::empty(config.columns));
        }
    }

    let padded =
        volume.read_padded(block.frame_origin(), block.padded_extent(), config.boundary)?;
    let perm = config.transpose.as_ref();
    let view = permute_block(padded.view(), perm);

    let mut attempt = 0u32;
    let mut raw_spots = loop {
        attempt += 1;
        counters.calls.fetch_add(1, Ordering::Relaxed);
        let result = detector
            .detect(view.view())
            .and_then(|raw| sample_intensity(view.view(), &raw, config.columns));
        match result {
            Ok(table) => break table,
            Err(e) if e.is_transient() && attempt < config.retry.max_attempts => {
                let wait = config.retry.backoff(attempt);
                log::warn!(
                    "block at origin {:?}: attempt {} failed ({}), retrying in {:?}",
                    block.origin,
                    attempt,
                    e,
                    wait
                );
                counters.retries.fetch_add(1, Ordering::Relaxed);
                std::thread::sleep(wait);
            }
            Err(source) => {
                return Err(BlockspotError::BlockFailed {
                    origin: block.origin,
                    attempts: attempt,
                    source,
                })
            }
        }
    };

    restore_columns(&mut raw_spots, perm);
    let spots = dedup_and_translate(block, &raw_spots);
    log::debug!(
        "block {:?}: {} spot(s), {} in core",
        block.index,
        raw_spots.len(),
        spots.len()
    );
    Ok(spots)
}
