//! The external point detector and the per-block adapter around it.
//!
//! The detector is an opaque program that leaks memory over its lifetime, so
//! every block gets a fresh process that is torn down before the call returns.
//!
//! Invocation:
//!   <program> [args...] --params <file> --input <raw> --shape <a,b,c>
//!             --output <dir> --threads <n> [--code-path <dir>]
//!
//! `<raw>` holds the block as little-endian f32 in column-major order. The
//! program writes `<dir>/spots.json` as `{"size": [rows, cols], "data": [...]}`
//! with `data` flattened column-major.

use ndarray::{Array2, ArrayView3, ShapeBuilder};
use serde::Deserialize;
use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::DetectError;
use crate::table::{DetectionTable, SPATIAL};

const OUTPUT_FILE: &str = "spots.json";
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One detector call: padded block in, raw `(points, fields)` table out, with
/// coordinates in the block's local voxel frame.
pub trait SpotDetector: Send + Sync {
    fn detect(&self, block: ArrayView3<'_, f32>) -> Result<Array2<f64>, DetectError>;
}

#[derive(Debug, Clone)]
pub struct ExternalDetector {
    program: PathBuf,
    args: Vec<String>,
    params: PathBuf,
    code_path: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    threads: usize,
    timeout: Option<Duration>,
}

impl ExternalDetector {
    /// Fails early when the parameter file is missing; that never recovers.
    pub fn new(program: impl Into<PathBuf>, params: impl Into<PathBuf>) -> Result<Self, DetectError> {
        let params = params.into();
        if !params.is_file() {
            return Err(DetectError::MissingParams(params));
        }
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Ok(Self {
            program: program.into(),
            args: Vec::new(),
            params,
            code_path: None,
            work_dir: None,
            threads: 2 * cores,
            timeout: None,
        })
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_code_path(mut self, path: impl Into<PathBuf>) -> Result<Self, DetectError> {
        let path = path.into();
        if !path.exists() {
            return Err(DetectError::MissingCodePath(path));
        }
        self.code_path = Some(path);
        Ok(self)
    }

    /// Parent directory for per-call scratch directories (system temp by default).
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, input: &Path, shape: &[usize], out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--params")
            .arg(&self.params)
            .arg("--input")
            .arg(input)
            .arg("--shape")
            .arg(
                shape
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            )
            .arg("--output")
            .arg(out_dir)
            .arg("--threads")
            .arg(self.threads.to_string())
            .env("OMP_NUM_THREADS", self.threads.to_string());
        if let Some(code) = &self.code_path {
            cmd.arg("--code-path").arg(code);
        }
        cmd
    }
}

impl SpotDetector for ExternalDetector {
    fn detect(&self, block: ArrayView3<'_, f32>) -> Result<Array2<f64>, DetectError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("blockspot-");
        let scratch = match &self.work_dir {
            Some(dir) => builder.tempdir_in(dir)?,
            None => builder.tempdir()?,
        };
        let input = scratch.path().join("block.raw");
        write_column_major(&block, &input)?;

        let stderr_path = scratch.path().join("stderr.log");
        let mut cmd = self.command(&input, block.shape(), scratch.path());
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(fs::File::create(&stderr_path)?));

        let session = DetectorSession::start(cmd, &self.program)?;
        let status = session.wait(self.timeout)?;
        if !status.success() {
            return Err(DetectError::Exited {
                code: status.code().unwrap_or(-1),
                stderr: read_tail(&stderr_path, 2048),
            });
        }
        read_output(&scratch.path().join(OUTPUT_FILE))
    }
}

/// A running detector process. Dropping it kills and reaps the process, so
/// no exit path from a block call leaves a session behind.
struct DetectorSession {
    child: Child,
    finished: bool,
}

impl DetectorSession {
    fn start(mut cmd: Command, program: &Path) -> Result<Self, DetectError> {
        let child = cmd.spawn().map_err(|source| DetectError::Spawn {
            program: program.display().to_string(),
            source,
        })?;
        log::trace!("detector session started (pid {})", child.id());
        Ok(Self {
            child,
            finished: false,
        })
    }

    fn wait(mut self, timeout: Option<Duration>) -> Result<ExitStatus, DetectError> {
        let started = Instant::now();
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.finished = true;
                return Ok(status);
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(DetectError::Timeout(limit));
                }
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for DetectorSession {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let pid = self.child.id();
        if let Err(e) = self.child.kill() {
            log::warn!("failed to kill detector session {}: {}", pid, e);
        }
        let _ = self.child.wait();
        log::trace!("detector session {} torn down", pid);
    }
}

fn write_column_major(block: &ArrayView3<'_, f32>, path: &Path) -> Result<(), DetectError> {
    let mut w = BufWriter::new(fs::File::create(path)?);
    // Row-major walk of the reversed view is a column-major walk of the block.
    for v in block.view().reversed_axes().iter() {
        w.write_all(&v.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

#[derive(Deserialize)]
struct DetectorOutput {
    size: [usize; 2],
    data: Vec<f64>,
}

fn read_output(path: &Path) -> Result<Array2<f64>, DetectError> {
    let text = fs::read_to_string(path)
        .map_err(|e| DetectError::Output(format!("{}: {}", path.display(), e)))?;
    parse_output(&text)
}

/// Parse the detector's JSON buffer and reshape it column-major.
pub fn parse_output(text: &str) -> Result<Array2<f64>, DetectError> {
    let out: DetectorOutput =
        serde_json::from_str(text).map_err(|e| DetectError::Output(e.to_string()))?;
    let [rows, cols] = out.size;
    if out.data.len() != rows * cols {
        return Err(DetectError::Output(format!(
            "size {}x{} does not match {} values",
            rows,
            cols,
            out.data.len()
        )));
    }
    Array2::from_shape_vec((rows, cols).f(), out.data)
        .map_err(|e| DetectError::Output(e.to_string()))
}

fn read_tail(path: &Path, max: usize) -> String {
    let mut buf = Vec::new();
    if let Ok(mut f) = fs::File::open(path) {
        let _ = f.read_to_end(&mut buf);
    }
    let start = buf.len().saturating_sub(max);
    String::from_utf8_lossy(&buf[start..]).trim().to_string()
}

/// Turn a raw detector table into a block table of exactly `columns` columns:
/// sample the block at each rounded, clamped spot position and append it.
/// An empty result becomes an empty table of the full width.
pub fn sample_intensity(
    block: ArrayView3<'_, f32>,
    raw: &Array2<f64>,
    columns: usize,
) -> Result<DetectionTable, DetectError> {
    if raw.nrows() == 0 {
        return Ok(DetectionTable::empty(columns));
    }
    let fields = columns.saturating_sub(1);
    if raw.ncols() != fields || fields < SPATIAL {
        return Err(DetectError::FieldCount {
            expected: fields,
            found: raw.ncols(),
        });
    }

    let dim = block.shape();
    let intensity: Vec<f64> = raw
        .rows()
        .into_iter()
        .map(|r| {
            let idx: [usize; 3] = std::array::from_fn(|a| {
                let hi = dim[a].saturating_sub(1) as f64;
                r[a].round().clamp(0.0, hi) as usize
            });
            block[idx] as f64
        })
        .collect();

    let rows = Array2::from_shape_fn((raw.nrows(), columns), |(i, j)| {
        if j < fields {
            raw[[i, j]]
        } else {
            intensity[i]
        }
    });
    Ok(DetectionTable::new(rows))
}
