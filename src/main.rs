use anyhow::{Context, Result};
use clap::Parser;
use image::ImageReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use card_rectify::edges::build_edge_map;
use card_rectify::normalize::normalize;
use card_rectify::{detect, import_quad, rectify_with_config, Cli, Config, OutputSize};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path))?,
        None => Config::default(),
    };
    cli.apply_overrides(&mut config);
    config
        .detection
        .validate()
        .context("Invalid detection settings")?;

    // Load input image
    let img = ImageReader::open(&cli.input)
        .with_context(|| format!("Failed to open input file: {:?}", cli.input))?
        .decode()
        .with_context(|| format!("Failed to decode image: {:?}", cli.input))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    info!(input = ?cli.input, width, height, "Loaded image");

    if let Some(path) = &cli.edges {
        let normalized = normalize(&img, config.detection.max_working_side)?;
        let edges = build_edge_map(
            &normalized.intensity,
            config.detection.blur_passes,
            config.detection.edge_threshold,
        );
        edges
            .as_image()
            .save(path)
            .with_context(|| format!("Failed to save edge map: {:?}", path))?;
        info!(path = ?path, "Saved edge map");
    }

    let detection = match cli.quad {
        Some(points) => import_quad(points, width, height, &config.detection)
            .context("Failed to import quadrilateral")?,
        None => detect(&img, &config.detection).context("Failed to detect card")?,
    };

    let size = config
        .rectify
        .output_size
        .unwrap_or_else(|| OutputSize::classify(&detection.quad).1);
    config.rectify.output_size = Some(size);

    let rectified = rectify_with_config(&img, &detection.quad, &config.rectify)
        .context("Failed to rectify card; adjust the corners and try again")?;

    let output_path = cli.output_path();
    rectified
        .save(&output_path)
        .with_context(|| format!("Failed to save output: {:?}", output_path))?;
    info!(
        output = ?output_path,
        source = ?detection.source,
        width = size.width,
        height = size.height,
        "Saved rectified card"
    );

    if cli.print_quad {
        let report = serde_json::json!({
            "source": format!("{:?}", detection.source),
            "corners": detection.quad.to_array(),
            "percentages": detection.quad.to_percentages(width, height),
            "output": size,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
