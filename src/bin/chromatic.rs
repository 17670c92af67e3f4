use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chromatic_geography::fetch::{ACCESS_KEY_ENV, UnsplashClient};
use chromatic_geography::pipeline::Pipeline;
use chromatic_geography::report::{write_city, write_report};
use chromatic_geography::{CityPalette, HueFamily, PipelineConfig, compute_metrics};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Collect city photographs and turn them into color palettes.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON configuration file; defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the default configuration to a file
    InitConfig {
        path: PathBuf,
    },

    /// Download photographs for the configured cities
    Fetch {
        /// Only this city
        #[arg(long)]
        city: Option<String>,

        #[arg(long, env = ACCESS_KEY_ENV, hide_env_values = true)]
        access_key: String,

        /// Override the image directory
        #[arg(long)]
        images_dir: Option<PathBuf>,
    },

    /// Extract, aggregate and measure palettes, then write the report
    Analyze {
        /// Only this city
        #[arg(long)]
        city: Option<String>,

        /// Override the image directory
        #[arg(long)]
        images_dir: Option<PathBuf>,

        /// Override the output directory
        #[arg(short = 'd', long)]
        out_dir: Option<PathBuf>,

        /// Combined report file name, inside the output directory
        #[arg(long, default_value = "cities.json")]
        report: String,
    },

    /// Print the metrics of an explicit palette
    Metrics {
        /// Hex colors, most prominent first
        #[arg(required = true)]
        colors: Vec<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::from_json_file(p)
            .with_context(|| format!("loading config {}", p.display())),
        None => Ok(PipelineConfig::default()),
    }
}

/// `RUST_LOG`-style directives, falling back to `info` when unset or invalid.
fn log_filter(directives: Option<String>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_ref())?;

    match args.command {
        Command::InitConfig { path } => {
            config
                .to_json_file(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Saved → {}", path.display());
        }

        Command::Fetch {
            city,
            access_key,
            images_dir,
        } => {
            if let Some(dir) = images_dir {
                config.images_dir = dir;
            }
            let cities = match &city {
                Some(name) => match config.city(name) {
                    Some(c) => vec![c.clone()],
                    None => bail!("city {name:?} is not configured"),
                },
                None => config.cities.clone(),
            };

            let client = UnsplashClient::new(access_key, config.fetch.clone())
                .context("building image API client")?;
            let mut failed = Vec::new();
            for c in &cities {
                match client.scrape_city(c, &config.images_dir, &config.metadata_dir) {
                    Ok(summary) => println!(
                        "{}: {} photos ({} new, {} already present, {} failed)",
                        c.name,
                        summary.photos,
                        summary.downloaded,
                        summary.already_present,
                        summary.failed
                    ),
                    Err(e) => {
                        error!(city = %c.name, error = %e, "scrape failed");
                        println!("{}: failed ({e})", c.name);
                        failed.push(c.name.as_str());
                    }
                }
            }
            if !failed.is_empty() {
                println!("cities not scraped: {}", failed.join(", "));
            }
        }

        Command::Analyze {
            city,
            images_dir,
            out_dir,
            report,
        } => {
            if let Some(dir) = images_dir {
                config.images_dir = dir;
            }
            if let Some(dir) = out_dir {
                config.output_dir = dir;
            }

            let city = city.map(|name| match config.city(&name) {
                Some(c) => c.name.clone(),
                None => name,
            });
            let pipeline = Pipeline::new(config).context("invalid configuration")?;
            let result = match &city {
                Some(name) => pipeline.run_cities(&[name.as_str()]),
                None => pipeline.run(),
            };

            let out = &pipeline.config().output_dir;
            for record in &result.cities {
                let path = write_city(out, record)?;
                info!("saved {}", path.display());
            }
            let report_path = out.join(&report);
            write_report(&report_path, &result)?;
            println!("Saved → {}", report_path.display());

            for record in result.by_temperature() {
                println!(
                    "{:<16} {:>5.1}°  sat {:>5.1}%  contrast {:>5.1}  diversity {:.2}  {}",
                    record.city,
                    record.metrics.temperature,
                    record.metrics.saturation,
                    record.metrics.contrast,
                    record.metrics.hue_diversity,
                    record.palette_hex.join(" ")
                );
            }
            for missing in &result.missing {
                println!("{:<16} missing: {}", missing.city, missing.reason);
            }
            if let (Some(w), Some(c)) = (result.warmest(), result.coolest()) {
                println!("warmest: {}  coolest: {}", w.city, c.city);
            }
            let green: Vec<&str> = result
                .dominated_by(HueFamily::Green)
                .iter()
                .map(|r| r.city.as_str())
                .collect();
            if !green.is_empty() {
                println!("green-dominant: {}", green.join(", "));
            }
        }

        Command::Metrics { colors } => {
            let palette = CityPalette::from_hex(&colors).context("parsing palette")?;
            let metrics = compute_metrics(&palette, config.palette_size);
            println!("{}", serde_json::to_string_pretty(&metrics)?);
        }
    }

    Ok(())
}
