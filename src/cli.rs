use clap::Parser;
use std::path::PathBuf;

use crate::config::Config;
use crate::transform::{Interpolation, OutputSize};

#[derive(Parser, Debug)]
#[command(name = "card-rectify")]
#[command(version, about = "Detect a business card in a photo and rectify it to a flat image")]
pub struct Cli {
    /// Input photograph
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output path [default: input_rectified.png]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Known card corners as percentages of the image, "x,y x,y x,y x,y"
    /// (top-left, top-right, bottom-right, bottom-left); skips detection
    #[arg(short, long, value_parser = parse_quad)]
    pub quad: Option<[[f64; 2]; 4]>,

    /// Output size, e.g. "1000x633" [default: classified from the card's aspect ratio]
    #[arg(short, long)]
    pub size: Option<OutputSize>,

    /// Use bilinear instead of nearest-neighbour sampling
    #[arg(long)]
    pub bilinear: bool,

    /// Sobel magnitude threshold for edge pixels
    #[arg(long)]
    pub edge_threshold: Option<f32>,

    /// Number of blur passes before edge detection
    #[arg(long)]
    pub blur_passes: Option<u32>,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the working-resolution edge mask to this path
    #[arg(long)]
    pub edges: Option<PathBuf>,

    /// Print the final quadrilateral (natural pixels) as JSON on stdout
    #[arg(long)]
    pub print_quad: bool,

    /// Show detection details
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let stem = self.input.file_stem().unwrap_or_default().to_string_lossy();
            let parent = self.input.parent().unwrap_or(std::path::Path::new("."));
            parent.join(format!("{}_rectified.png", stem))
        })
    }

    /// Apply command-line overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(threshold) = self.edge_threshold {
            config.detection.edge_threshold = threshold;
        }
        if let Some(passes) = self.blur_passes {
            config.detection.blur_passes = passes;
        }
        if let Some(size) = self.size {
            config.rectify.output_size = Some(size);
        }
        if self.bilinear {
            config.rectify.interpolation = Interpolation::Bilinear;
        }
    }
}

fn parse_quad(s: &str) -> Result<[[f64; 2]; 4], String> {
    let points: Vec<&str> = s.split_whitespace().collect();
    if points.len() != 4 {
        return Err(format!(
            "Invalid quad '{}', expected four \"x,y\" points",
            s
        ));
    }

    let mut quad = [[0.0; 2]; 4];
    for (slot, point) in quad.iter_mut().zip(points) {
        let (x, y) = point
            .split_once(',')
            .ok_or_else(|| format!("Invalid point '{}', expected x,y", point))?;
        let x: f64 = x.parse().map_err(|_| format!("Invalid x value: {}", x))?;
        let y: f64 = y.parse().map_err(|_| format!("Invalid y value: {}", y))?;
        if !(0.0..=100.0).contains(&x) || !(0.0..=100.0).contains(&y) {
            return Err(format!("Point '{}' is outside 0-100%", point));
        }
        *slot = [x, y];
    }
    Ok(quad)
}
