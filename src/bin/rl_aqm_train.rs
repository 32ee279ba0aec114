//! Train a DQN drop policy against the in-process AQM queue model.

use anyhow::Context;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use rl_aqm::agent::DqnAgent;
use rl_aqm::config::RunConfig;
use rl_aqm::env::{AqmEnv, DeadlineEnv, Environment};
use rl_aqm::logging::init_tracing;
use rl_aqm::trainer::Trainer;

#[derive(Parser)]
#[command(name = "rl-aqm-train")]
#[command(about = "Train a DQN agent to tune an AQM drop policy", long_about = None)]
struct Cli {
    /// JSON configuration file; defaults are used for anything it omits
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of episodes
    #[arg(short, long)]
    episodes: Option<usize>,

    /// Seed for the agent and the queue model
    #[arg(short, long)]
    seed: Option<u64>,

    /// Deadline for every environment call, in milliseconds
    #[arg(long)]
    step_timeout_ms: Option<u64>,

    /// Cut episodes after this many steps
    #[arg(long)]
    max_steps: Option<usize>,

    /// Greedy evaluation episodes to play after training
    #[arg(long)]
    test_episodes: Option<usize>,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Write the per-episode report here as JSON
    #[arg(short, long)]
    report: Option<PathBuf>,
}

fn load_config(cli: &Cli) -> anyhow::Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RunConfig::default(),
    };

    if let Some(episodes) = cli.episodes {
        config.training.episodes = episodes;
    }
    if let Some(seed) = cli.seed {
        config.agent.seed = Some(seed);
        config.env.seed = Some(seed.wrapping_add(1));
    }
    if let Some(timeout) = cli.step_timeout_ms {
        config.training.step_timeout_ms = Some(timeout);
    }
    if let Some(max_steps) = cli.max_steps {
        config.training.max_steps_per_episode = Some(max_steps);
    }
    if let Some(episodes) = cli.test_episodes {
        config.training.test_episodes = episodes;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config.log_level)?;

    let env_config = config.env.clone();
    let env: Box<dyn Environment> = match config.training.step_timeout_ms {
        Some(ms) => {
            let env = DeadlineEnv::new(move || AqmEnv::new(env_config.clone()), Duration::from_millis(ms))?;
            match config.training.max_stuck_workers {
                Some(cap) => Box::new(env.with_max_stuck_workers(cap)),
                None => Box::new(env),
            }
        }
        None => Box::new(AqmEnv::new(env_config)?),
    };
    tracing::info!(
        observation_size = env.observation_size(),
        action_count = env.action_count(),
        episodes = config.training.episodes,
        "starting training"
    );

    let agent = DqnAgent::new(env.observation_size(), env.action_count(), config.agent.clone())?;
    let mut trainer = Trainer::new(agent, env, config.training.clone())?;
    let report = trainer.run()?;

    println!(
        "episodes: {} completed, {} aborted; mean reward (last {}): {}; best: {}",
        report.completed(),
        report.aborted(),
        report.window,
        report
            .trailing_mean_reward()
            .map_or_else(|| "n/a".to_string(), |r| format!("{:.3}", r)),
        report
            .best_reward()
            .map_or_else(|| "n/a".to_string(), |r| format!("{:.3}", r)),
    );

    let evaluation = trainer.evaluate(config.training.test_episodes)?;
    for summary in &evaluation {
        println!(
            "evaluation episode {}: reward {:.3} over {} steps ({:?})",
            summary.episode, summary.total_reward, summary.steps, summary.outcome
        );
    }

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "training": report,
            "evaluation": evaluation,
        }))?;
        fs::write(path, json).with_context(|| format!("writing report to {}", path.display()))?;
    }

    Ok(())
}
