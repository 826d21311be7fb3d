//! # EarthOS Command Line Client
//!
//! Thin CLI over the `earthos` library: query the engine, print formula text,
//! and turn tiles/regions into PNGs, raw float dumps or terminal previews.
//!
//! Configuration comes from `earthos.toml` plus `EARTHOS_ENGINE_HOST` /
//! `EARTHOS_APIKEY`. Set `RUST_LOG=earthos=debug` to see requests.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use earthos::{
    client::EarthOs,
    colorscale::{Colorscale, PRESET_NAMES},
    config::Config,
    formula::Var,
    renderer, Raster, Region, Timestamp,
};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "earthos", version, about = "Query the EarthOS engine")]
struct Cli {
    /// Config file (defaults to ./earthos.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API key, overrides config and environment
    #[arg(long, global = true, env = "EARTHOS_APIKEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print engine version information
    Version,
    /// List variables known to the engine
    Variables,
    /// Print the formula text for a shifted variable reference
    Formula {
        /// Variable as namespace.name
        reference: String,
        /// Offset as axis=value, repeatable
        #[arg(long = "offset", value_parser = parse_axis_value)]
        offsets: Vec<(String, f64)>,
        /// Treat offsets as absolute coordinates
        #[arg(long)]
        absolute: bool,
    },
    /// Evaluate a formula at one point
    Point {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        alt: f64,
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Fetch a slippy map tile
    Tile {
        x: u32,
        y: u32,
        z: u8,
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Fetch an arbitrary bounding box
    Region {
        #[arg(long, allow_hyphen_values = true)]
        north: f64,
        #[arg(long, allow_hyphen_values = true)]
        south: f64,
        #[arg(long, allow_hyphen_values = true)]
        east: f64,
        #[arg(long, allow_hyphen_values = true)]
        west: f64,
        /// Width in pixels (config default if omitted)
        #[arg(long)]
        width: Option<u32>,
        /// Height in pixels (config default if omitted)
        #[arg(long)]
        height: Option<u32>,
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Formula text, e.g. "(gfs.air_temperature - 273.15)"
    #[arg(long, short)]
    formula: String,
    /// ISO-8601 time or epoch seconds; now if omitted
    #[arg(long, short, allow_hyphen_values = true)]
    time: Option<String>,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write a colorized PNG here
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Write raw little-endian f32 samples here
    #[arg(long)]
    raw: Option<PathBuf>,
    /// Preset name or path to a colorscale JSON file
    #[arg(long)]
    colorscale: Option<String>,
    /// Fit the colorscale range to the data (always on for presets)
    #[arg(long)]
    fit: bool,
    /// Terminal preview width in columns (0 disables)
    #[arg(long, default_value_t = 72)]
    preview: u32,
}

fn parse_axis_value(text: &str) -> Result<(String, f64), String> {
    let (axis, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected axis=value, got {text:?}"))?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value for {axis}: {e}"))?;
    Ok((axis.trim().to_string(), value))
}

/// Epoch seconds when numeric, ISO-8601 otherwise.
fn parse_time(text: Option<&str>) -> Timestamp {
    match text {
        None => Timestamp::now(),
        Some(text) => {
            if let Ok(secs) = text.parse::<i64>() {
                Timestamp::Epoch(secs)
            } else if let Ok(secs) = text.parse::<f64>() {
                Timestamp::EpochFloat(secs)
            } else {
                Timestamp::Iso(text.to_string())
            }
        }
    }
}

fn load_colorscale(spec: &str) -> anyhow::Result<(Colorscale, bool)> {
    if let Some(preset) = Colorscale::preset(spec) {
        return Ok((preset, true));
    }
    let json = fs::read_to_string(spec).with_context(|| {
        format!("{spec:?} is neither a preset ({}) nor a readable file", PRESET_NAMES.join(", "))
    })?;
    let scale = Colorscale::from_json(&json).with_context(|| format!("invalid colorscale JSON in {spec}"))?;
    Ok((scale, false))
}

/// Load the colorscale and fit it to the data when asked (always for presets).
///
/// A constant raster has no spread to fit, so its value becomes the middle of
/// a unit-wide range instead.
fn prepare_colorscale(spec: &str, fit: bool, raster: &Raster) -> anyhow::Result<Colorscale> {
    let (mut scale, is_preset) = load_colorscale(spec)?;
    if !(is_preset || fit) {
        return Ok(scale);
    }
    match (raster.min(), raster.max()) {
        (Some(min), Some(max)) if min == max => {
            tracing::warn!(value = min, "raster is constant, centering colorscale on it");
            let value = f64::from(min);
            scale = scale.with_range(value - 0.5, value + 0.5);
        }
        _ => scale
            .set_minmax(raster)
            .context("cannot fit colorscale to a raster without valid samples")?,
    }
    Ok(scale)
}

fn connect(config: &Config) -> anyhow::Result<EarthOs> {
    EarthOs::new(config.engine.clone()).context("cannot configure the EarthOS client")
}

fn emit(raster: &Raster, output: &OutputArgs, config: &Config) -> anyhow::Result<()> {
    let (width, height) = raster.resolution();
    println!(
        "{}x{} {} min={:?} max={:?} mean={:?}",
        width,
        height,
        raster.format(),
        raster.min(),
        raster.max(),
        raster.mean()
    );

    if output.preview > 0 {
        println!("{}", renderer::draw_ascii(raster, output.preview));
    }

    if let Some(path) = &output.raw {
        renderer::save_raw(raster, path)?;
        eprintln!("Raw samples written to {}", path.display());
    }

    if let Some(path) = &output.output {
        let spec = output.colorscale.as_deref().unwrap_or(&config.render.colorscale);
        let scale = prepare_colorscale(spec, output.fit, raster)?;
        renderer::save_png(raster, &scale, path)?;
        eprintln!("PNG written to {}", path.display());
    }
    Ok(())
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path).with_env_overrides(|key| std::env::var(key).ok()),
        None => Config::load(),
    };
    if let Some(key) = cli.api_key.clone() {
        config.engine.api_key = Some(key);
    }

    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        match &cli.command {
            // Formula printing needs no engine
            Command::Formula {
                reference,
                offsets,
                absolute,
            } => {
                let var = Var::parse(reference)?;
                let var = match (offsets.is_empty(), *absolute) {
                    (true, _) => var,
                    (false, true) => var.absolute(offsets.iter().cloned())?,
                    (false, false) => var.offset(offsets.iter().cloned())?,
                };
                println!("{}", var);
            }
            Command::Version => {
                let version = connect(&config)?.engine_version().await?;
                println!("{}", serde_json::to_string_pretty(&version)?);
            }
            Command::Variables => {
                let mut eo = connect(&config)?;
                let mut names: Vec<&String> = eo.variables().await?.keys().collect();
                names.sort();
                for name in names {
                    println!("{}", name);
                }
            }
            Command::Point { lat, lon, alt, query } => {
                let time = parse_time(query.time.as_deref());
                let point = connect(&config)?.point(*lat, *lon, *alt, time, &query.formula).await?;
                if !point.error.is_ok() {
                    bail!(
                        "engine reported {}: {}",
                        point.error.kind.as_deref().unwrap_or("error"),
                        point.error.message.as_deref().unwrap_or("")
                    );
                }
                println!("{}", serde_json::to_string_pretty(&point)?);
            }
            Command::Tile {
                x,
                y,
                z,
                query,
                output,
            } => {
                let time = parse_time(query.time.as_deref());
                let raster = connect(&config)?.tile(*x, *y, *z, time, &query.formula).await?;
                emit(&raster, output, &config)?;
            }
            Command::Region {
                north,
                south,
                east,
                west,
                width,
                height,
                query,
                output,
            } => {
                let region = Region::new(*north, *south, *east, *west);
                let width = width.unwrap_or(config.render.width);
                let height = height.unwrap_or(config.render.height);
                let time = parse_time(query.time.as_deref());
                let raster = connect(&config)?.region(region, time, &query.formula, width, height).await?;
                emit(&raster, output, &config)?;
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
