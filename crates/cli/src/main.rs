//! CLI entry point for the dailies tool
//!
//! Picks a sequence folder, applies the operator's output choices, and runs
//! the external daily encoder while reporting its progress.

use clap::Parser;
use dailies::config::ConfigError;
use dailies::preview::UNAVAILABLE_TEXT;
use dailies::{
    decode_preview, Config, EncoderProgram, Preview, RunEvent, RunResult, Session, DEFAULT_ENCODER,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Generate a daily movie from an image sequence
#[derive(Parser, Debug)]
#[command(name = "dailies")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Image sequence folder
    #[arg(required_unless_present = "list_codecs")]
    sequence: Option<PathBuf>,

    /// Path to the base configuration file
    #[arg(long, default_value = "dailies-config.toml")]
    config: PathBuf,

    /// Output folder (defaults to globals.movie_location)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Encoding preset from output_codecs (defaults to globals.output_codec)
    #[arg(short, long)]
    codec: Option<String>,

    /// Output width
    #[arg(long)]
    width: Option<u32>,

    /// Output height
    #[arg(long)]
    height: Option<u32>,

    /// Do not keep the input aspect ratio when width or height is set
    #[arg(long, default_value = "false")]
    no_keep_aspect: bool,

    /// Scale to fit the input height (defaults to globals.fit)
    #[arg(long, default_value = "false", conflicts_with = "no_fit")]
    fit: bool,

    /// Do not scale to fit the input height, even if globals.fit is set
    #[arg(long, default_value = "false")]
    no_fit: bool,

    /// Daily encoder program
    #[arg(long, default_value = DEFAULT_ENCODER)]
    encoder: PathBuf,

    /// Argument placed before the per-run arguments (repeatable)
    #[arg(long = "encoder-arg", allow_hyphen_values = true)]
    encoder_args: Vec<String>,

    /// List encoding presets and exit
    #[arg(long, default_value = "false")]
    list_codecs: bool,

    /// Write the latest preview thumbnail to this PNG file
    #[arg(long)]
    preview_out: Option<PathBuf>,

    /// Print progress and the result as JSON lines on stdout
    #[arg(long, default_value = "false")]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::load(&args.config) {
        Ok(config) => Arc::new(config),
        Err(e @ ConfigError::Missing(_)) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!(config = %args.config.display(), "{}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.list_codecs {
        for name in config.codec_names() {
            let marker = if name == config.globals.output_codec { " (default)" } else { "" };
            println!("{}{}", name, marker);
        }
        return ExitCode::SUCCESS;
    }

    let Some(sequence) = args.sequence.clone() else {
        error!("Please select a valid sequence folder.");
        return ExitCode::FAILURE;
    };

    let encoder = EncoderProgram::new(&args.encoder).with_leading_args(args.encoder_args.clone());
    let mut session = Session::new(config, encoder);

    if let Some(codec) = &args.codec {
        if let Err(e) = session.set_codec(codec) {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    }
    if let Some(output) = &args.output {
        session.set_output_folder(Some(output.clone()));
    }

    let input = session
        .load_sequence(&sequence)
        .and_then(|info| info.input)
        .map(|input| input.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    status(args.json, &format!("Input Dimensions: {}", input));
    if let Some(path) = &args.preview_out {
        write_preview(&session.first_frame_preview(), path);
    }

    apply_dimension_args(&mut session, &args);
    status(
        args.json,
        &format!("Output Dimensions: {}", session.dimensions().output()),
    );

    if let Err(e) = session.start(&sequence) {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    status(args.json, "Encoding...");

    let mut exit = ExitCode::FAILURE;
    while let Some(event) = session.next_event().await {
        match event {
            RunEvent::State(state) => debug!(state = state.as_str(), "run state"),
            RunEvent::Progress(progress) => {
                if args.json {
                    println!(
                        "{}",
                        json!({
                            "event": "progress",
                            "current_frame": progress.current_frame,
                            "total_frames": progress.total_frames,
                            "percent": progress.percent(),
                            "preview": &progress.preview,
                        })
                    );
                } else {
                    println!(
                        "Frame {}/{} ({}%)",
                        progress.current_frame,
                        progress.total_frames,
                        progress.percent()
                    );
                }
                if let Some(path) = &args.preview_out {
                    write_preview(&decode_preview(&progress.preview), path);
                }
            }
            RunEvent::Finished(Ok(result)) => {
                report_result(&result, args.json);
                exit = ExitCode::from(exit_status(&result));
            }
            RunEvent::Finished(Err(e)) => {
                if args.json {
                    println!("{}", json!({ "event": "finished", "error": e.to_string() }));
                }
                error!("Failed to run daily: {}", e);
                exit = ExitCode::FAILURE;
            }
        }
    }

    exit
}

/// Operator-facing status line; kept off stdout in JSON mode
fn status(json: bool, message: &str) {
    if json {
        info!("{}", message);
    } else {
        println!("{}", message);
    }
}

/// Apply width/height/aspect/fit flags in the order an operator would
fn apply_dimension_args(session: &mut Session, args: &Args) {
    let dims = session.dimensions_mut();
    dims.set_keep_aspect(!args.no_keep_aspect);
    if let Some(width) = args.width {
        dims.set_width(width);
    }
    if let Some(height) = args.height {
        dims.set_height(height);
    }
    if let Some(fit) = fit_override(args) {
        dims.set_fit_to_height(fit);
    }
}

/// Fit-to-height choice given on the command line, if any
fn fit_override(args: &Args) -> Option<bool> {
    match (args.fit, args.no_fit) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn report_result(result: &RunResult, json: bool) {
    if json {
        println!(
            "{}",
            json!({
                "event": "finished",
                "exit_code": result.exit_code,
                "stdout": result.stdout,
                "stderr": result.stderr,
            })
        );
        return;
    }

    if result.success() {
        println!("Daily generated successfully!\n\n{}", result.stdout);
    } else {
        eprintln!(
            "Daily exited with code {}\n\nStdout:\n{}\n\nStderr:\n{}",
            result.exit_code, result.stdout, result.stderr
        );
    }
}

/// Process exit status mirroring the encoder's, 1 when it does not fit
fn exit_status(result: &RunResult) -> u8 {
    if result.success() {
        0
    } else {
        u8::try_from(result.exit_code).unwrap_or(1)
    }
}

fn write_preview(preview: &Preview, path: &Path) {
    match preview.save_png(path) {
        Ok(true) => debug!(path = %path.display(), "preview written"),
        Ok(false) => debug!(path = %path.display(), "{}", UNAVAILABLE_TEXT),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to write preview"),
    }
}
