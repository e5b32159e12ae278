// ============================================================================
// FundusStretch CLI — headless channel decomposition and export
// ============================================================================
//
// Usage examples:
//   fundus-stretch --input fundus.jpg --output-dir out/
//   fundus-stretch -i eye.png --lower 60 --upper 200 --stage stretched
//   fundus-stretch -i scans/*.tif --red-weight 0.7 --blue-weight 0.3 --format tiff
//   fundus-stretch -i eye.jpg --channel nogreen --invert-lower --format jpeg -q 95
//
// Each input gets its own session; the chosen rasters are written under
// their default names (e.g. GrayscaleNoGreen_R0.50_B0.50.png).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::GrayImage;

use fundus_stretch::io::{self, ExportOptions, SaveFormat, TiffCompression};
use fundus_stretch::params::{
    DEFAULT_BLUE_WEIGHT, DEFAULT_LOWER_THRESHOLD, DEFAULT_RED_WEIGHT, DEFAULT_UPPER_THRESHOLD,
};
use fundus_stretch::{log_err, log_info};
use fundus_stretch::{
    Advisory, Channel, ImageKey, Session, SessionObserver, Stage, StretchParams, Weights,
};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// Fundus photo channel decomposition and contrast stretching.
#[derive(Parser, Debug)]
#[command(
    name = "fundus-stretch",
    about = "Split fundus photos into channels, autocontrast and stretch them",
    long_about = "Derive grayscale, red, green, blue and a green-free weighted gray image\n\
                  from each input photo, normalize each with autocontrast, apply a\n\
                  two-threshold contrast stretch and export the results.\n\
                  Inputs: PNG, JPEG, BMP, TIFF.\n\n\
                  Example:\n  \
                  fundus-stretch --input fundus.jpg --output-dir out/\n  \
                  fundus-stretch -i *.png --lower 60 --upper 200 --stage stretched"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "scans/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output directory. With several inputs each one gets a sub-directory
    /// named after its file stem. Defaults to `<stem>_channels` next to the input.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, bmp, tiff.
    #[arg(short, long, default_value = "png", value_name = "FORMAT")]
    pub format: String,

    /// JPEG quality (1–100).
    #[arg(short, long, default_value_t = io::DEFAULT_JPEG_QUALITY, value_name = "1-100")]
    pub quality: u8,

    /// TIFF compression mode: none, lzw, deflate.
    #[arg(long, default_value = "none", value_name = "MODE")]
    pub tiff_compression: String,

    /// Red coefficient of the green-free gray image (0.0–1.0).
    #[arg(long, default_value_t = DEFAULT_RED_WEIGHT, value_name = "W")]
    pub red_weight: f32,

    /// Blue coefficient of the green-free gray image (0.0–1.0).
    #[arg(long, default_value_t = DEFAULT_BLUE_WEIGHT, value_name = "W")]
    pub blue_weight: f32,

    /// Lower stretch threshold (0–254).
    #[arg(long, default_value_t = DEFAULT_LOWER_THRESHOLD, value_name = "0-254")]
    pub lower: u8,

    /// Upper stretch threshold (0–255). Raised to lower+1 when not above lower.
    #[arg(long, default_value_t = DEFAULT_UPPER_THRESHOLD, value_name = "0-255")]
    pub upper: u8,

    /// Map pixels below the lower threshold to white instead of black.
    #[arg(long)]
    pub invert_lower: bool,

    /// Map pixels above the upper threshold to black instead of white.
    #[arg(long)]
    pub invert_upper: bool,

    /// Invert the photo's tones before extracting channels.
    #[arg(long)]
    pub invert_source: bool,

    /// Stages to export: derived, normalized, stretched (default: all).
    #[arg(long, value_delimiter = ',', value_name = "STAGE")]
    pub stage: Vec<String>,

    /// Channels to export: gray, green, red, blue, nogreen (default: all).
    #[arg(long, value_delimiter = ',', value_name = "CHANNEL")]
    pub channel: Vec<String>,

    /// Print every written file and per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    let format = match SaveFormat::from_name(&args.format) {
        Some(f) => f,
        None => {
            eprintln!("error: unknown output format '{}'.", args.format);
            return ExitCode::FAILURE;
        }
    };
    let options = ExportOptions {
        format: Some(format),
        quality: args.quality,
        tiff_compression: TiffCompression::from_name(&args.tiff_compression),
    };

    let selection = match Selection::parse(&args.stage, &args.channel) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let params = StretchParams {
        lower: args.lower,
        upper: args.upper,
        invert_lower: args.invert_lower,
        invert_upper: args.invert_upper,
    };

    if args.verbose
        && let Some(log) = fundus_stretch::logger::log_path()
    {
        println!("log: {}", log.display());
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();
        let out_dir = build_output_dir(input_path, args.output_dir.as_deref(), multi);

        let job = Job {
            weights: Weights::new(args.red_weight, args.blue_weight),
            params,
            invert_source: args.invert_source,
            options,
            selection: &selection,
            verbose: args.verbose,
        };

        match run_one(input_path, &out_dir, &job) {
            Ok(written) => {
                if args.verbose || multi {
                    println!(
                        "  → {} file(s) in {} ({:.0}ms)",
                        written,
                        out_dir.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                log_err!("{}: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

struct Job<'a> {
    weights: Weights,
    params: StretchParams,
    invert_source: bool,
    options: ExportOptions,
    selection: &'a Selection,
    verbose: bool,
}

fn run_one(input: &Path, out_dir: &Path, job: &Job<'_>) -> Result<usize, String> {
    // -- Step 1: Parameters (recorded before load, applied by it) --------
    let mut session = Session::new();
    session.set_invert_source(job.invert_source);
    let mut advisories = session.set_weights(job.weights.red, job.weights.blue).advisories;
    advisories.extend(session.set_stretch_params(job.params).advisories);

    // -- Step 2: Load ----------------------------------------------------
    let mut update = session
        .load(input)
        .map_err(|e| format!("load failed: {}", e))?;
    update.advisories = advisories;

    // -- Step 3: Export --------------------------------------------------
    std::fs::create_dir_all(out_dir).map_err(|e| {
        format!("could not create output directory '{}': {}", out_dir.display(), e)
    })?;

    let weights = session.weights();
    let mut sink = ExportSink {
        dir: out_dir,
        options: job.options,
        selection: job.selection,
        weights,
        verbose: job.verbose,
        written: 0,
        errors: Vec::new(),
    };
    session.publish(&update, &mut sink);

    if let Some(first) = sink.errors.first() {
        return Err(format!("save failed: {}", first));
    }
    log_info!("{}: wrote {} file(s) to {}", input.display(), sink.written, out_dir.display());
    Ok(sink.written)
}

/// Writes every selected raster it is handed.
struct ExportSink<'a> {
    dir: &'a Path,
    options: ExportOptions,
    selection: &'a Selection,
    weights: Weights,
    verbose: bool,
    written: usize,
    errors: Vec<String>,
}

impl SessionObserver for ExportSink<'_> {
    fn image_changed(&mut self, key: ImageKey, image: &GrayImage) {
        if !self.selection.includes(key) {
            return;
        }
        let ext = self.options.format.unwrap_or_default().extension();
        let path = self
            .dir
            .join(key.default_file_name(self.weights.red, self.weights.blue, ext));
        match io::export_gray_image(image, &path, &self.options) {
            Ok(()) => {
                self.written += 1;
                if self.verbose {
                    println!("  {}", path.display());
                }
            }
            Err(e) => self.errors.push(format!("{}: {}", path.display(), e)),
        }
    }

    fn advisory(&mut self, advisory: &Advisory) {
        eprintln!("  warning: {}", advisory);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Which of the fifteen rasters to export.
#[derive(Debug, PartialEq)]
struct Selection {
    stages: Vec<Stage>,
    channels: Vec<Channel>,
}

impl Selection {
    /// Empty lists select everything.
    fn parse(stages: &[String], channels: &[String]) -> Result<Selection, String> {
        let stages = if stages.is_empty() {
            Stage::ALL.to_vec()
        } else {
            stages
                .iter()
                .map(|s| Stage::from_name(s).ok_or_else(|| format!("unknown stage '{}'", s)))
                .collect::<Result<Vec<_>, _>>()?
        };
        let channels = if channels.is_empty() {
            Channel::ALL.to_vec()
        } else {
            channels
                .iter()
                .map(|c| Channel::from_name(c).ok_or_else(|| format!("unknown channel '{}'", c)))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(Selection { stages, channels })
    }

    fn includes(&self, key: ImageKey) -> bool {
        self.stages.contains(&key.stage) && self.channels.contains(&key.channel)
    }
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !io::is_supported_extension(&entry) {
                        continue;
                    }
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no image files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Directory the rasters of `input` are written to.
///
/// 1. `--output-dir` with a single input: the directory itself
/// 2. `--output-dir` with several inputs: `<dir>/<stem>`
/// 3. No `--output-dir`: `<stem>_channels` next to the input
fn build_output_dir(input: &Path, output_dir: Option<&Path>, multi: bool) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    match output_dir {
        Some(dir) if multi => dir.join(stem),
        Some(dir) => dir.to_path_buf(),
        None => {
            let parent = input.parent().unwrap_or(Path::new("."));
            parent.join(format!("{}_channels", stem))
        }
    }
}
