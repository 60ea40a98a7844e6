// ============================================================================
// LumenFE CLI — headless batch editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   lumenfe -i photo.png --op removeBg --output cutout.png
//   lumenfe -i photo.jpg --op upscale:factor=4 --op crop:rect=800x600+0+0 -o out.jpg
//   lumenfe -i "shots/*.jpg" --op adjust:brightness=120,contrast=110 --output-dir out/
//   lumenfe -i face.png --mask face_mask.png --op generativeEdit --prompt "a red scarf" -o out.png
//   lumenfe -i portrait.png --op faceSwap:source=actor.png,blend=80 -o swapped.png
//   lumenfe -i me.png --op "tryOn:source=shirt.png;boots.png" --prompt "a rooftop at dusk" -o fit.png
//
// Each --op is `tool[:key=value,...]`. Values parse as JSON when they can
// (numbers, booleans) and are strings otherwise. A bare value after the
// colon is stored under `value` (e.g. `transform:rotate-left`).
// Every step goes through the editor orchestrator, so each file gets its own
// history and a failing step leaves the file's previous result in place.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Instant;

use clap::Parser;
use serde_json::Value;

use crate::ai::{CancelToken, EditError, MissingInput, PollState, RemoteOp};
use crate::app::{EditorApp, Outcome};
use crate::artifact::Artifact;
use crate::canvas::BlendMode;
use crate::components::tools::{ToolId, ToolParams};
use crate::io::{self, SaveFormat};
use crate::ops::{CropRect, FilterStack, LocalOp, TextOverlay, TransformKind};
use crate::settings::{EditorSettings, TransportKind};

// ============================================================================
// Arguments
// ============================================================================

/// LumenFE headless image editor.
///
/// Run local and AI-backed edits on image files without opening an editor.
#[derive(Parser, Debug)]
#[command(
    name = "lumenfe",
    about = "LumenFE headless batch image editor",
    long_about = "Run a pipeline of local and AI-backed edits on image files.\n\
                  Each --op is `tool[:key=value,...]`, applied in order.\n\n\
                  Example:\n  \
                  lumenfe --input photo.png --op removeBg --output cutout.png\n  \
                  lumenfe -i *.jpg --op adjust:sepia=60 --output-dir out/ --format png"
)]
pub struct CliArgs {
    /// Images to edit. Literal paths or glob patterns ("shots/*.jpg").
    #[arg(short, long, num_args = 1..)]
    pub input: Vec<String>,

    /// Edit step, repeatable: `tool[:key=value,...]`.
    #[arg(long = "op", value_name = "TOOL[:K=V,...]")]
    pub ops: Vec<String>,

    /// Where to write the result when editing a single image.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Destination directory when editing several images.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// png, jpeg, webp or bmp. Defaults to the --output extension, then png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// Mask image applied before the first step (white = edit here).
    #[arg(short, long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Prompt for steps that need one and don't set `prompt=` themselves.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Remote transport: direct or proxy. Overrides the config file.
    #[arg(long, value_name = "direct|proxy")]
    pub transport: Option<String>,

    /// Bypass the result cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Empty the result cache before processing.
    #[arg(long)]
    pub clear_cache: bool,

    /// Print each file's edit history when done.
    #[arg(long)]
    pub history: bool,

    /// Mirror the log to stderr and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

/// One pipeline step.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub tool: ToolId,
    pub params: ToolParams,
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, rest) = s.split_once(':').unwrap_or((s, ""));
        let tool: ToolId = name.parse()?;
        let mut params = ToolParams::new();
        for pair in rest.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => ("value", pair),
            };
            if key.is_empty() {
                return Err(format!("empty parameter name in '{s}'"));
            }
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
            params.insert(key.to_string(), value);
        }
        Ok(Step { tool, params })
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Edit every input and report failure if any file failed.
pub async fn run(args: CliArgs, mut settings: EditorSettings) -> ExitCode {
    if let Some(t) = &args.transport {
        match TransportKind::parse(t) {
            Some(kind) => settings.transport = kind,
            None => {
                eprintln!("error: unknown transport '{}' (expected direct or proxy).", t);
                return ExitCode::FAILURE;
            }
        }
    }

    let steps = match args.ops.iter().map(|s| s.parse::<Step>()).collect::<Result<Vec<_>, _>>() {
        Ok(steps) => steps,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let app = EditorApp::from_settings(&settings, !args.no_cache);

    if args.clear_cache
        && let Some(cache) = app.service().and_then(|s| s.cache())
    {
        match cache.clear() {
            Ok(()) => println!("cache cleared."),
            Err(e) => {
                eprintln!("error: could not clear cache: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        if args.clear_cache && args.input.is_empty() {
            return ExitCode::SUCCESS;
        }
        eprintln!("error: nothing to edit, no input matched.");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: --output names one file but {} inputs matched; use --output-dir.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let save_format = parse_format(args.format.as_deref(), args.output.as_deref());

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let mask = match &args.mask {
        Some(path) => match io::load_artifact(path) {
            Ok(m) => Some(m),
            Err(e) => {
                eprintln!("error: could not read mask '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;
    let prompt = args.prompt.clone().unwrap_or_default();

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), save_format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        let job = FileJob {
            input: input_path,
            output: &output_path,
            steps: &steps,
            prompt: &prompt,
            mask: mask.as_ref(),
            format: save_format,
            quality: args.quality,
        };
        let result = run_one(&app, &job).await;

        for notice in app.take_notices() {
            if args.verbose {
                println!("  [{:?}] {}", notice.level, notice.message);
            }
        }
        if args.history {
            for row in app.history().await {
                let marker = if row.is_current { ">" } else { " " };
                println!("  {} {:>2} {}", marker, row.index, row.label);
            }
        }

        match result {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

struct FileJob<'a> {
    input: &'a Path,
    output: &'a Path,
    steps: &'a [Step],
    prompt: &'a str,
    mask: Option<&'a Artifact>,
    format: SaveFormat,
    quality: u8,
}

async fn run_one(app: &EditorApp, job: &FileJob<'_>) -> Result<(), String> {
    // -- Step 1: Load ----------------------------------------------------
    let artifact = io::load_artifact(job.input).map_err(|e| format!("load failed: {}", e))?;
    app.load_image(artifact).await.map_err(|e| e.user_message())?;

    if let Some(mask) = job.mask {
        app.with_project(|p| p.mask.load_artifact(mask))
            .await
            .map_err(|e| format!("mask failed: {}", e))?;
    }

    // -- Step 2: Edit ----------------------------------------------------
    for step in job.steps {
        apply_step(app, step, job.prompt, job.output)
            .await
            .map_err(|e| format!("{} failed: {}", step.tool, e.user_message()))?;
    }

    // -- Step 3: Save ----------------------------------------------------
    let result = app
        .current_artifact()
        .await
        .ok_or_else(|| "nothing to save".to_string())?;
    io::write_artifact(&result, job.output, job.format, job.quality).map_err(|e| format!("save failed: {}", e))
}

fn param_str<'a>(params: &'a ToolParams, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn param_f32(params: &ToolParams, key: &str, default: f32) -> f32 {
    params
        .get(key)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(default)
}

fn param_u32(params: &ToolParams, key: &str, default: u32) -> u32 {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v.min(u32::MAX as u64) as u32)
        .unwrap_or(default)
}

/// Load every `;`-separated image path under `key`. Missing key gives none.
fn load_param_images(params: &ToolParams, key: &str) -> Result<Vec<Artifact>, EditError> {
    let Some(paths) = param_str(params, key) else {
        return Ok(Vec::new());
    };
    paths
        .split(';')
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(|path| io::load_artifact(Path::new(path)).map_err(|e| EditError::InvalidParameter(format!("{key}: {e}"))))
        .collect()
}

fn crop_rect(params: &ToolParams) -> Result<CropRect, EditError> {
    if let Some(rect) = param_str(params, "rect").or_else(|| param_str(params, "value")) {
        return rect.parse().map_err(EditError::InvalidParameter);
    }
    let field = |k: &str| {
        params
            .get(k)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| EditError::InvalidParameter(format!("crop needs '{k}'")))
    };
    Ok(CropRect {
        x: field("x")?,
        y: field("y")?,
        width: field("width")?,
        height: field("height")?,
    })
}

async fn apply_step(app: &EditorApp, step: &Step, prompt: &str, output: &Path) -> Result<(), EditError> {
    let p = &step.params;
    match step.tool {
        ToolId::Crop => app.run_local(LocalOp::Crop(crop_rect(p)?)).await.map(drop),
        ToolId::Transform => {
            let kind: TransformKind = param_str(p, "kind")
                .or_else(|| param_str(p, "value"))
                .ok_or_else(|| EditError::InvalidParameter("transform needs a kind".to_string()))?
                .parse()
                .map_err(EditError::InvalidParameter)?;
            app.run_local(LocalOp::Transform(kind)).await.map(drop)
        }
        ToolId::Adjust | ToolId::LocalAdjust => {
            let stack = FilterStack::from_params(p).map_err(EditError::InvalidParameter)?;
            app.run_local(LocalOp::Filters(stack)).await.map(drop)
        }
        ToolId::Texture => {
            let texture = load_param_images(p, "file")?
                .into_iter()
                .next()
                .ok_or(EditError::MissingInput(MissingInput::SourceImage))?;
            let blend_mode: BlendMode = param_str(p, "blend_mode")
                .unwrap_or("normal")
                .parse()
                .map_err(EditError::InvalidParameter)?;
            let op = LocalOp::Texture {
                texture,
                blend_mode,
                opacity: param_f32(p, "opacity", 1.0),
            };
            app.run_local(op).await.map(drop)
        }
        ToolId::Text => {
            let mut params = p.clone();
            if !params.contains_key("content") {
                let content = param_str(p, "value").unwrap_or(prompt).to_string();
                params.insert("content".to_string(), Value::String(content));
            }
            params.remove("value");
            let overlay = TextOverlay::from_params(&params).map_err(EditError::InvalidParameter)?;
            app.run_local(LocalOp::Text(overlay)).await.map(drop)
        }
        ToolId::SuperResolution => app
            .super_resolution(param_u32(p, "factor", 2), param_u32(p, "intensity", 50))
            .await
            .map(drop),
        ToolId::ImageGen => app
            .generate_image(param_str(p, "prompt").unwrap_or(prompt), param_str(p, "aspect_ratio").unwrap_or("1:1"))
            .await
            .map(drop),
        ToolId::Video => {
            let cancel = CancelToken::new();
            let clip = app
                .generate_video(
                    param_str(p, "prompt").unwrap_or(prompt),
                    param_str(p, "aspect_ratio").unwrap_or("16:9"),
                    &cancel,
                    |state: &PollState| {
                        if let PollState::Polling { attempt, .. } = state {
                            log_info!("Video still rendering (poll {})", attempt);
                        }
                    },
                )
                .await?;
            let path = output.with_extension(io::extension_for_mime(clip.mime_type()));
            io::write_bytes(clip.bytes(), &path)
                .map_err(|e| EditError::InvalidParameter(format!("could not write {}: {e}", path.display())))?;
            println!("  video → {}", path.display());
            Ok(())
        }
        tool => {
            let sources = load_param_images(p, "source")?;
            if sources.is_empty() && tool.requires_source_image() {
                return Err(EditError::MissingInput(MissingInput::SourceImage));
            }
            let op = RemoteOp::from_tool(tool, p, prompt, sources)?;
            if let Outcome::Previewing { .. } = app.run_remote(op).await? {
                let blend = p.get("blend").and_then(Value::as_f64).map(|b| b as f32);
                app.accept_preview(blend).await?;
            }
            Ok(())
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

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
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Choose the [`SaveFormat`] from the `--format` string or infer it from the
/// output file extension. Defaults to PNG when neither is known.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>) -> SaveFormat {
    let ext = format_arg.or_else(|| output.and_then(|o| o.extension()).and_then(|e| e.to_str()));
    ext.and_then(SaveFormat::from_extension).unwrap_or_default()
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>, format: SaveFormat) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}
