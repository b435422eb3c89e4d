use std::path::PathBuf;

use clap::{Parser, Subcommand};
use geotiles::{config::DatasetConfig, CollectionDataset, GeotilesError, Result, TileSize};
use log::{debug, error, info};

#[derive(Subcommand, Debug)]
enum Command {
    /// Scenes, tiles per scene and total length
    Summary,
    /// Per channel mean and std, cached next to the data
    Stats {
        /// Recompute even when cached statistics exist
        #[arg(long)]
        force: bool,
    },
    /// Metadata of one sample as JSON
    Sample { index: usize },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Tile georeferenced scenes into a segmentation dataset", long_about = None)]
struct Cli {
    /// JSON dataset configuration
    #[arg(long, conflicts_with = "data_root")]
    config: Option<PathBuf>,

    /// Data directory in the default layout
    #[arg(long, required_unless_present = "config")]
    data_root: Option<PathBuf>,

    /// Square tile size in pixels, overrides the configuration
    #[arg(long)]
    tile_size: Option<usize>,

    /// Minimum label coverage, overrides the configuration
    #[arg(long)]
    threshold: Option<f64>,

    #[command(subcommand)]
    command: Command,
}

fn load_config(cli: &Cli) -> Result<DatasetConfig> {
    let mut config = match (&cli.config, &cli.data_root) {
        (Some(path), _) => DatasetConfig::from_json_file(path)?,
        (None, Some(root)) => DatasetConfig::new(root),
        (None, None) => {
            return Err(GeotilesError::Configuration(
                "either --config or --data-root is needed".into(),
            ))
        }
    };
    if let Some(tile_size) = cli.tile_size {
        config.tile_size = TileSize::square(tile_size);
    }
    if let Some(threshold) = cli.threshold {
        config.label_coverage_threshold = threshold;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    debug!("configuration: {config:?}");
    let mut collection: CollectionDataset<u16> = config.build()?;
    match cli.command {
        Command::Summary => {
            for (scene, subset) in collection.scenes().iter().zip(collection.subsets()) {
                println!(
                    "{}\t{}/{}",
                    scene.image_path().display(),
                    subset.len(),
                    scene.len()?
                );
            }
            println!(
                "{} scenes, {} tiles",
                collection.scenes().len(),
                collection.len()
            );
        }
        Command::Stats { force } => {
            let stats = collection.get_stats(force)?;
            println!("{}", serde_json::to_string_pretty(stats)?);
        }
        Command::Sample { index } => {
            let sample = collection.get(index)?;
            println!("{}", serde_json::to_string_pretty(&sample.meta())?);
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    debug!("Parsed CLI args: {cli:?}");
    info!("running {:?}", cli.command);

    if let Err(err) = run(cli) {
        error!("{err}");
        std::process::exit(1);
    }
}
