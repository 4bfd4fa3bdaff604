mod replay;

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use image::ImageFormat;
use livecheck_core::capture::process_capture;
use livecheck_core::CheckDefinition;
use livecheck_hw::{LensFacing, RawCapture};
use livecheck_session::SessionConfig;

#[derive(Parser)]
#[command(name = "livecheck", about = "Face liveness check tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay recorded classifier output (JSON Lines) through the check engine
    Replay {
        /// File with one JSON array of detected faces per line
        input: PathBuf,
        /// Print each frame's full check snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mirror, rotate and square-crop a captured still
    Process {
        input: PathBuf,
        output: PathBuf,
        /// Clockwise rotation in degrees (0, 90, 180, 270)
        #[arg(short, long, default_value_t = 0)]
        rotation: u32,
        /// Treat the still as taken with the front (mirrored) lens
        #[arg(long)]
        front: bool,
    },
    /// List the liveness checks in order
    Checks,
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay { input, json } => {
            let config = SessionConfig::from_env()?;
            let file = File::open(&input)
                .with_context(|| format!("failed to open {}", input.display()))?;
            let steps = replay::replay(BufReader::new(file), config.liveness)?;
            for step in &steps {
                if json {
                    println!("{}", serde_json::to_string(&step.outcome.state)?);
                } else {
                    replay::print_step(step);
                }
            }
            let captures = steps.iter().filter(|s| s.capture).count();
            println!("{} frames, {} capture request(s)", steps.len(), captures);
        }
        Commands::Process {
            input,
            output,
            rotation,
            front,
        } => {
            let format = output_format(&output)?;
            let data = std::fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let raw = RawCapture {
                data,
                rotation_degrees: rotation,
                lens: if front {
                    LensFacing::Front
                } else {
                    LensFacing::Back
                },
            };
            let image = process_capture(&raw)?;
            image
                .save_with_format(&output, format)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "{} -> {} ({}x{})",
                input.display(),
                output.display(),
                image.width(),
                image.height()
            );
        }
        Commands::Checks => {
            for (i, def) in CheckDefinition::standard().iter().enumerate() {
                println!(
                    "{}. {:?} ({} deg): {}",
                    i + 1,
                    def.kind,
                    def.sweep_angle,
                    def.guide_message
                );
            }
        }
        Commands::Config => {
            let config = SessionConfig::from_env()?;
            config.liveness.validate()?;
            let value = serde_json::json!({
                "throttle_ms": config.throttle.as_millis() as u64,
                "capture_delay_ms": config.capture_delay.as_millis() as u64,
                "validate_capture": config.validate_capture,
                "liveness": config.liveness,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

/// Output format from the file extension, checked before any decoding work.
fn output_format(path: &Path) -> Result<ImageFormat> {
    ImageFormat::from_path(path)
        .with_context(|| format!("unsupported output image type: {}", path.display()))
}
