use anyhow::Result;
use candle_core::Device;
use candle_nn::VarMap;
use clap::{Parser, ValueEnum};
use objnav_candle::{
    model::{ModelConfig, PolicyValueNet},
    policy::ModelPolicy,
};
use objnav_core::{
    config::EpisodeConfig,
    controller::EpisodeController,
    rollout::run_episode,
    vocabulary::{INTERACTABLE_OBJECTS_PATH, ObjectVocabulary, RECEPTACLE_OBJECTS_PATH},
};
use objnav_thor::ThorEnvBuilder;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum DeviceType {
    Cpu,
    Cuda,
}

impl DeviceType {
    fn device(self) -> Result<Device> {
        Ok(match self {
            Self::Cpu => Device::Cpu,
            Self::Cuda => Device::new_cuda(0)?,
        })
    }
}

/// Runs one object search episode in AI2-THOR with a recurrent actor-critic policy.
#[derive(Parser, Debug)]
struct Args {
    /// JSON episode configuration. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "FloorPlan28")]
    scene: String,

    /// Worker rank, added to the configured seed.
    #[arg(long, default_value_t = 0)]
    rank: u64,

    #[arg(long)]
    gpu_id: Option<usize>,

    #[arg(long, default_value_t = 200)]
    max_steps: usize,

    #[arg(long, default_value = INTERACTABLE_OBJECTS_PATH)]
    interactable_objects: PathBuf,

    #[arg(long, default_value = RECEPTACLE_OBJECTS_PATH)]
    receptacle_objects: PathBuf,

    /// Safetensors file with trained weights. A fresh network is used otherwise.
    #[arg(long)]
    weights: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = DeviceType::Cpu)]
    device: DeviceType,

    /// Always take the most likely action.
    #[arg(long)]
    greedy: bool,

    /// Replays the finished episode with this many milliseconds between actions.
    #[arg(long)]
    replay_delay_ms: Option<u64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EpisodeConfig::from_json_file(path)?,
        None => EpisodeConfig::default(),
    };
    let vocabulary = Arc::new(ObjectVocabulary::load(
        &args.interactable_objects,
        &args.receptacle_objects,
    )?);
    let mut controller = EpisodeController::new(ThorEnvBuilder, config.seed, args.rank, vocabulary);
    if let Some(gpu_id) = args.gpu_id {
        controller = controller.with_gpu(gpu_id);
    }

    let device = args.device.device()?;
    // candle's CPU generator cannot be seeded
    if device.is_cuda() {
        device.set_seed(controller.seed())?;
    }
    let model_config = ModelConfig {
        frame_size: config.frame_size,
        action_space: controller.catalog().len(),
        aux_state_size: (!config.targets.is_empty()).then_some(config.targets.len()),
        ..Default::default()
    };
    let mut varmap = VarMap::new();
    let net = PolicyValueNet::new(model_config, &mut varmap, &device)?;
    if let Some(weights) = &args.weights {
        varmap.load(weights)?;
        info!(weights = %weights.display(), "loaded weights");
    }
    let mut policy = ModelPolicy::new(net, device);
    if args.greedy {
        policy = policy.greedy();
    }

    controller.new_episode(&config, &args.scene)?;
    let rollout = run_episode(&mut controller, &policy, args.max_steps)?;
    info!(
        scene = %args.scene,
        seed = controller.seed(),
        steps = rollout.len(),
        reward = rollout.total_reward(),
        success = rollout.success,
        truncated = rollout.truncated,
        "episode finished"
    );

    if let Some(delay) = args.replay_delay_ms {
        controller.slow_replay(Duration::from_millis(delay))?;
    }
    Ok(())
}
