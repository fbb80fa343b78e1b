use clap::Args;
use std::path::Path;

use blockspot::axes::AxisPermutation;
use blockspot::coords::read_coords;
use blockspot::pipeline::{detect_region, output_path, Region};
use blockspot::volume::{Boundary, Volume};
use blockspot::zarr::{self, ZarrVolume};
use blockspot::{DetectConfig, ExecutionContext, ExternalDetector};

#[derive(Args, Clone)]
pub struct DetectArgs {
    /// Path to the zarr store holding the image
    pub image: String,
    /// Array path inside the store, e.g. "/c0/s0"
    pub subpath: String,
    /// Coordinates file: physical offset on line 1, physical extent on line 2
    pub coords: String,
    /// Detector parameter file
    pub params: String,
    /// Output directory
    pub output: String,
    /// Appended to the output file name (spots<suffix>)
    pub suffix: String,

    #[arg(long, help = "Detector executable")]
    pub detector: String,
    #[arg(
        long = "detector-arg",
        allow_hyphen_values = true,
        help = "Extra argument passed to the detector before the standard ones (repeatable)"
    )]
    pub detector_args: Vec<String>,
    #[arg(long, help = "Directory with the detector's code, checked before any block runs")]
    pub code_path: Option<String>,
    #[arg(long, help = "Threads per detector process (default: 2 x cores)")]
    pub detector_threads: Option<usize>,
    #[arg(long, help = "Parent directory for per-block scratch directories")]
    pub work_dir: Option<String>,

    #[arg(long, help = "JSON run configuration; flags below override it")]
    pub config: Option<String>,
    #[arg(long, help = "Zarr store holding a foreground mask")]
    pub mask: Option<String>,
    #[arg(long, default_value = "/mask", help = "Array path of the mask inside its store")]
    pub mask_subpath: String,
    #[arg(long, value_delimiter = ',', help = "Block size: one value or three comma-separated")]
    pub blocksize: Option<Vec<u64>>,
    #[arg(long, value_delimiter = ',', help = "Halo per side: one value or three comma-separated")]
    pub overlap: Option<Vec<u64>>,
    #[arg(long, value_enum)]
    pub boundary: Option<Boundary>,
    #[arg(long, help = "Axis order handed to the detector, e.g. \"2,1,0\"")]
    pub transpose: Option<String>,
    #[arg(long, help = "Columns per spot row, sampled intensity included")]
    pub columns: Option<usize>,
    #[arg(long, help = "Attempts per block for transient detector failures")]
    pub retries: Option<u32>,
    #[arg(long)]
    pub timeout_secs: Option<u64>,
    #[arg(long, default_value_t = 0, help = "Concurrent blocks (0: one per core)")]
    pub workers: usize,
}

fn triple(values: &[u64], name: &str) -> Result<[u64; 3], Box<dyn std::error::Error>> {
    match values {
        [v] => Ok([*v; 3]),
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(format!("--{} takes 1 or 3 values, got {}", name, values.len()).into()),
    }
}

fn build_config(args: &DetectArgs) -> Result<DetectConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => DetectConfig::from_json_file(Path::new(path))?,
        None => DetectConfig::default(),
    };
    if let Some(v) = &args.blocksize {
        config.blocksize = triple(v, "blocksize")?;
    }
    if let Some(v) = &args.overlap {
        config.overlap = triple(v, "overlap")?;
    }
    if let Some(b) = args.boundary {
        config.boundary = b;
    }
    if let Some(t) = &args.transpose {
        config.transpose = Some(AxisPermutation::parse(t)?);
    }
    if let Some(c) = args.columns {
        config.columns = c;
    }
    if let Some(r) = args.retries {
        config.retry.max_attempts = r;
    }
    if args.timeout_secs.is_some() {
        config.timeout_secs = args.timeout_secs;
    }
    config.validate()?;
    Ok(config)
}

pub fn run(
    args: DetectArgs,
    progress: impl Fn(f64, &str) + Sync,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = build_config(&args)?;

    let mut detector = ExternalDetector::new(&args.detector, &args.params)?
        .with_args(args.detector_args.clone())
        .with_timeout(config.timeout());
    if let Some(code) = &args.code_path {
        detector = detector.with_code_path(code)?;
    }
    if let Some(n) = args.detector_threads {
        detector = detector.with_threads(n);
    }
    if let Some(dir) = &args.work_dir {
        detector = detector.with_work_dir(dir);
    }

    let (offset, extent) = read_coords(Path::new(&args.coords))?;

    let store = zarr::open_store(Path::new(&args.image))?;
    let volume = ZarrVolume::open(&store, &args.subpath)?;
    let spacing = volume.spacing();
    progress(
        0.0,
        &format!(
            "Opened {}{} shape={:?} spacing={:?}",
            args.image,
            args.subpath,
            volume.shape(),
            spacing
        ),
    );

    let mask = match &args.mask {
        Some(mask_root) => {
            let mask_store = zarr::open_store(Path::new(mask_root))?;
            let mask = ZarrVolume::open(&mask_store, &args.mask_subpath)?.to_mask()?;
            progress(0.0, &format!("Loaded mask {:?}", mask.shape()));
            Some(mask)
        }
        None => None,
    };

    let ctx = ExecutionContext::new(args.workers)?;
    let region = Region {
        offset,
        extent,
        spacing,
    };
    let (spots, summary) = detect_region(
        &ctx,
        &volume,
        &region,
        &detector,
        &config,
        mask.as_ref(),
        &progress,
    )?;

    let out_path = output_path(Path::new(&args.output), &args.suffix);
    spots.write_txt(&out_path)?;
    progress(
        1.0,
        &format!(
            "Wrote {} spots to {} ({} of {} blocks skipped)",
            spots.len(),
            out_path.display(),
            summary.skipped,
            summary.blocks
        ),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        args: DetectArgs,
    }

    fn parse(extra: &[&str]) -> DetectArgs {
        let mut argv = vec!["blockspot", "img.zarr", "/s0", "coords.txt", "p.txt", "out", "_a"];
        argv.extend_from_slice(extra);
        Cli::parse_from(argv).args
    }

    #[test]
    fn flags_override_defaults() {
        let args = parse(&[
            "--detector",
            "det",
            "--blocksize",
            "64",
            "--overlap",
            "4,4,2",
            "--transpose",
            "2,1,0",
            "--boundary",
            "zero",
        ]);
        let cfg = build_config(&args).unwrap();
        assert_eq!(cfg.blocksize, [64, 64, 64]);
        assert_eq!(cfg.overlap, [4, 4, 2]);
        assert_eq!(cfg.boundary, Boundary::Zero);
        assert_eq!(cfg.transpose, Some(AxisPermutation::reversed()));
    }

    #[test]
    fn two_value_blocksize_is_rejected() {
        let args = parse(&["--detector", "det", "--blocksize", "64,64"]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn overlap_not_below_blocksize_is_rejected() {
        let args = parse(&["--detector", "det", "--blocksize", "8", "--overlap", "8"]);
        assert!(build_config(&args).is_err());
    }
}
