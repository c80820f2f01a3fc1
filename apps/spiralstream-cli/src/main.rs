use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glam::Vec3;
use spiralstream_kernel::Level;
use spiralstream_stream::{LevelConfig, SpiralCursor};
use spiralstream_tools::LevelInspector;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spiralstream-cli", about = "CLI tool for spiral level streaming")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and default configuration summary
    Info,
    /// Walk an agent up the spiral and report streaming statistics
    Simulate {
        /// Number of ticks to simulate
        #[arg(short, long, default_value = "1000")]
        ticks: u64,
        /// RNG seed for deterministic generation
        #[arg(short, long, default_value = "42")]
        seed: u64,
        /// YAML level configuration (defaults when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Agent speed in spiral sections per tick
        #[arg(long, default_value = "0.5")]
        speed: f32,
        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file and print it with defaults filled in
    Config {
        /// YAML level configuration (prints defaults when omitted)
        path: Option<PathBuf>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LevelConfig> {
    match path {
        Some(path) => LevelConfig::load(path)
            .with_context(|| format!("loading level config from {}", path.display())),
        None => Ok(LevelConfig::default()),
    }
}

/// Agent that follows the primary spiral at a fixed number of sections per tick.
struct Walker {
    cursor: SpiralCursor,
    progress: f32,
    speed: f32,
}

impl Walker {
    fn new(speed: f32) -> Self {
        Self {
            cursor: SpiralCursor::new(),
            progress: 0.0,
            speed,
        }
    }

    fn advance(&mut self, config: &LevelConfig, radius: f32) -> Vec3 {
        self.progress += self.speed;
        while self.progress >= 1.0 {
            self.cursor.advance(&config.spiral, radius);
            self.progress -= 1.0;
        }
        self.cursor.position(radius) + Vec3::Y * config.streaming.agent_spawn_height
    }
}

fn simulate(
    ticks: u64,
    seed: u64,
    config: LevelConfig,
    speed: f32,
    json: bool,
) -> anyhow::Result<()> {
    anyhow::ensure!(speed.is_finite() && speed >= 0.0, "speed must be non-negative");

    let mut level = Level::new(config.clone(), seed)?;
    level.set_recording(false);
    let spawn = level
        .generate_initial()?
        .context("initial generation placed no primary block")?;
    tracing::info!(?spawn, "agent placed");

    let radius = level.generator().radius();
    let mut walker = Walker::new(speed);
    let report_every = (ticks / 10).max(1);
    for _ in 0..ticks {
        let agent = walker.advance(&config, radius);
        let stats = level.step(agent);
        if level.tick() % report_every == 0 {
            tracing::info!(
                tick = level.tick(),
                live = stats.live_placements,
                enemies = stats.live_enemies,
                reclaimed = stats.placements_reclaimed,
                "progress"
            );
        }
    }

    let summary = LevelInspector::summary(&level);
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
        for (row, count) in LevelInspector::row_histogram(&level) {
            println!("  row {row}: {count} placements");
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Commands::Info => {
            let config = LevelConfig::default();
            println!("spiralstream-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "spiral: radius={} spacing={} rows={}",
                config.spiral.effective_radius(),
                config.spiral.block_spacing,
                config.rows.count
            );
            println!(
                "pools: blocks={} enemies={} projectiles={}",
                config.pools.block_capacity,
                config.pools.enemy_capacity,
                config.pools.projectile_capacity
            );
            println!(
                "streaming: max_blocks={} cleanup={} visible={}",
                config.streaming.max_blocks_in_memory,
                config.streaming.cleanup_distance,
                config.streaming.visible_distance
            );
        }
        Commands::Simulate {
            ticks,
            seed,
            config,
            speed,
            json,
        } => {
            let config = load_config(config.as_ref())?;
            simulate(ticks, seed, config, speed, json)?;
        }
        Commands::Config { path } => {
            let config = load_config(path.as_ref())?;
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}
