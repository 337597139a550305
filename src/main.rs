use anyhow::Result;
use clap::{Parser, ValueEnum};
use conv_snake::game::GameConfig;
use conv_snake::memory::MemoryKind;
use conv_snake::modes::{TrainConfig, TrainMode, VisualizeMode};
use conv_snake::nn::TopologyPreset;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "conv_snake")]
#[command(version, about = "Deep Q-learning Snake with a hand-written convolutional network")]
struct Cli {
    /// Execution mode
    #[arg(long, default_value = "train")]
    mode: Mode,

    /// JSON file with a training configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of training episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Side length of the square grid
    #[arg(long)]
    grid_size: Option<usize>,

    /// Weight file written by training and read by visualization
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Seed for every random choice
    #[arg(long)]
    seed: Option<u64>,

    /// Replay sampling policy (uniform or prioritized)
    #[arg(long)]
    memory: Option<MemoryKind>,

    /// Network preset (strided or deep)
    #[arg(long)]
    topology: Option<TopologyPreset>,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    /// Train an agent and dump its weights
    Train,
    /// Watch a trained agent play
    Visualize,
}

impl Cli {
    /// Defaults, then the JSON file, then explicit flags
    fn train_config(&self) -> Result<TrainConfig> {
        let mut config = match &self.config {
            Some(path) => TrainConfig::from_json_file(path)?,
            None => TrainConfig::default(),
        };

        if let Some(episodes) = self.episodes {
            config.num_episodes = episodes;
        }
        if let Some(size) = self.grid_size {
            config.game_config = GameConfig {
                grid_width: size,
                grid_height: size,
                ..config.game_config
            };
        }
        if let Some(weights) = &self.weights {
            config.save_path = weights.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(memory) = self.memory {
            config.dqn_config.memory = memory;
        }
        if let Some(topology) = self.topology {
            config.dqn_config.topology = topology;
        }

        Ok(config)
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.train_config()?;

    match cli.mode {
        Mode::Train => {
            init_tracing();
            let mut train_mode = TrainMode::new(config)?;
            train_mode.run()?;
        }
        Mode::Visualize => {
            // The TUI owns the terminal; log lines would tear the frame
            let mut visualize_mode = VisualizeMode::new(
                &config.save_path,
                config.game_config,
                config.dqn_config,
                config.seed,
            )?;
            visualize_mode.run().await?;
        }
    }

    Ok(())
}
