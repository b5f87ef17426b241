use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use ml_core::{ActionLabel, LandmarkSet, classify};
use serde::Deserialize;
use tracing::info;
use vision::{CaptureCliArgs, PipelineConfig};

#[derive(Debug, Parser)]
#[command(name = "motion-capture", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture landmarks from a camera, video or image directory.
    Capture(CaptureCliArgs),
    /// Print the action label of the first pose in a landmark CSV.
    Classify {
        /// CSV written by `capture` (columns Landmark_Index,X,Y,Z).
        #[arg(value_name = "CSV")]
        csv: PathBuf,
    },
}

pub fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Capture(args) => {
            let config = PipelineConfig::try_from(args)?;
            let output_dir = config.output_dir.clone();
            let summary = vision::run(config).context("Capture pipeline failed")?;
            println!(
                "Captured {} frame(s) in {:.1}s ({:.1} fps); {} landmark file set(s) in {}",
                summary.frames,
                summary.elapsed_secs,
                summary.average_fps,
                summary.persisted,
                output_dir.display()
            );
            Ok(())
        }
        Command::Classify { csv } => {
            let label = classify_csv(&csv)?;
            println!("{}", label.map_or("none", ActionLabel::as_str));
            Ok(())
        }
    }
}

#[derive(Debug, Deserialize)]
struct LandmarkRow {
    #[serde(rename = "Landmark_Index")]
    index: usize,
    #[serde(rename = "X")]
    x: f32,
    #[serde(rename = "Y")]
    y: f32,
    #[serde(rename = "Z")]
    z: f32,
}

fn classify_csv(path: &Path) -> Result<Option<ActionLabel>> {
    let pose = read_first_set(path)?;
    info!("{} keypoint(s) read from {}", pose.len(), path.display());
    Ok(classify(&pose))
}

/// Rows up to the point where `Landmark_Index` restarts at 0.
fn read_first_set(path: &Path) -> Result<LandmarkSet> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.deserialize::<LandmarkRow>() {
        let row = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        if row.index == 0 && !rows.is_empty() {
            break;
        }
        if row.index != rows.len() {
            bail!(
                "{}: expected landmark index {}, found {}",
                path.display(),
                rows.len(),
                row.index
            );
        }
        rows.push([row.x, row.y, row.z]);
    }
    Ok(LandmarkSet::from_rows(&rows))
}
