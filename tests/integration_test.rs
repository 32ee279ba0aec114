use rl_aqm::{
    agent::{DqnAgent, DqnAgentBuilder, EpsilonSchedule},
    config::{AgentConfig, RunConfig, TrainingConfig},
    env::{AqmEnv, AqmEnvConfig, DeadlineEnv, Environment},
    optimizer::{GradientClipper, OptimizerWrapper, Sgd},
    trainer::{EpisodeOutcome, Trainer},
};
use ndarray::{array, Array1};
use std::time::Duration;

fn small_agent_config(seed: u64) -> AgentConfig {
    AgentConfig {
        memory_capacity: 500,
        batch_size: 16,
        hidden_sizes: vec![16, 16],
        seed: Some(seed),
        ..AgentConfig::default()
    }
}

fn short_env_config(seed: u64) -> AqmEnvConfig {
    AqmEnvConfig {
        simulation_time_s: 1.0,
        seed: Some(seed),
        ..AqmEnvConfig::default()
    }
}

#[test]
fn test_end_to_end_training() {
    let env = AqmEnv::new(short_env_config(1)).unwrap();
    let agent = DqnAgent::new(env.observation_size(), env.action_count(), small_agent_config(2)).unwrap();
    let config = TrainingConfig {
        episodes: 5,
        report_window: 3,
        ..TrainingConfig::default()
    };

    let mut trainer = Trainer::new(agent, env, config).unwrap();
    let report = trainer.run().unwrap();

    assert_eq!(report.episodes.len(), 5);
    assert_eq!(report.completed(), 5);
    assert!(report.trailing_mean_reward().unwrap().is_finite());
    assert!(report.best_reward().unwrap() >= report.trailing_mean_reward().unwrap());

    let (agent, _env) = trainer.into_parts();
    assert_eq!(agent.steps_done(), 100);
    assert_eq!(agent.memory().len(), 100);
    assert_eq!(agent.policy_net(), agent.target_net());
}

#[test]
fn test_training_is_reproducible_with_seeds() {
    let run = || {
        let env = AqmEnv::new(short_env_config(7)).unwrap();
        let agent = DqnAgent::new(3, 5, small_agent_config(8)).unwrap();
        let mut trainer = Trainer::new(agent, env, TrainingConfig { episodes: 2, ..TrainingConfig::default() }).unwrap();
        let report = trainer.run().unwrap();
        let (agent, _) = trainer.into_parts();
        (report.episodes, agent.policy_net().clone())
    };

    let (episodes_a, net_a) = run();
    let (episodes_b, net_b) = run();
    assert_eq!(episodes_a, episodes_b);
    assert_eq!(net_a, net_b);
}

#[test]
fn test_training_through_deadline_env() {
    let env_config = short_env_config(3);
    let env = DeadlineEnv::new(move || AqmEnv::new(env_config.clone()), Duration::from_secs(10)).unwrap();
    let agent = DqnAgent::new(3, 5, small_agent_config(4)).unwrap();

    let mut trainer = Trainer::new(agent, env, TrainingConfig { episodes: 2, ..TrainingConfig::default() }).unwrap();
    let report = trainer.run().unwrap();
    assert!(report
        .episodes
        .iter()
        .all(|e| e.outcome == EpisodeOutcome::Completed && e.steps == 20));
}

#[test]
fn test_boxed_environment() {
    let env: Box<dyn Environment> = Box::new(AqmEnv::new(short_env_config(5)).unwrap());
    let agent = DqnAgent::new(3, 5, small_agent_config(6)).unwrap();
    let mut trainer = Trainer::new(agent, env, TrainingConfig { episodes: 1, ..TrainingConfig::default() }).unwrap();
    assert_eq!(trainer.run().unwrap().completed(), 1);
}

#[test]
fn test_run_config_drives_training() {
    let json = r#"{
        "agent": { "memory_capacity": 200, "batch_size": 8, "hidden_sizes": [8], "seed": 11 },
        "training": { "episodes": 2, "max_steps_per_episode": 10 },
        "env": { "seed": 12 }
    }"#;
    let config = RunConfig::from_json(json).unwrap();

    let env = AqmEnv::new(config.env.clone()).unwrap();
    let agent = DqnAgent::new(env.observation_size(), env.action_count(), config.agent.clone()).unwrap();
    let mut trainer = Trainer::new(agent, env, config.training.clone()).unwrap();
    let report = trainer.run().unwrap();

    assert!(report
        .episodes
        .iter()
        .all(|e| e.outcome == EpisodeOutcome::Truncated && e.steps == 10));
}

#[test]
fn test_agent_learns_reward_bearing_action() {
    // One-step episodes: action 1 pays 1, action 0 pays 0
    let mut agent = DqnAgentBuilder::new()
        .state_size(2)
        .action_size(2)
        .memory_capacity(256)
        .batch_size(32)
        .hidden_sizes(&[16])
        .epsilon(EpsilonSchedule::new(1.0, 1.0, 200.0))
        .optimizer(OptimizerWrapper::Sgd(Sgd::new(0.05)))
        .gradient_clipper(GradientClipper::None)
        .seed(42)
        .build()
        .unwrap();

    let state = array![1.0, 0.5];
    for _ in 0..256 {
        let action = agent.select_action(state.view()).unwrap();
        let reward = if action == 1 { 1.0 } else { 0.0 };
        agent.push_transition(state.clone(), action, None, reward).unwrap();
        agent.optimize_model().unwrap();
    }
    for _ in 0..500 {
        agent.optimize_model().unwrap();
    }

    let values: Array1<f32> = agent.policy_net().evaluate_one(state.view()).unwrap();
    assert_eq!(agent.greedy_action(state.view()).unwrap(), 1);
    assert!((values[1] - 1.0).abs() < 0.2, "{:?}", values);
    assert!(values[0].abs() < 0.2, "{:?}", values);
}
