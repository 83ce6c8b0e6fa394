use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarMap;
use objnav_candle::{
    model::{ModelConfig, ModelInput, PolicyValueNet, RecurrentMemory, embedding_size},
    policy::ModelPolicy,
};
use objnav_core::{
    actions::ActionCatalog,
    config::EpisodeConfig,
    controller::EpisodeController,
    env::EnvironmentSettings,
    rollout::{RecurrentPolicy, run_episode},
    test_utils::ScriptedEnv,
    vocabulary::ObjectVocabulary,
};
use rand::{SeedableRng, rngs::StdRng};
use std::sync::Arc;

fn zero_input(config: &ModelConfig) -> Result<ModelInput> {
    let [h, w] = config.frame_size;
    Ok(ModelInput {
        state: Tensor::zeros((1, 3, h, w), DType::F32, &Device::Cpu)?,
        memory: RecurrentMemory::zeros(1, config.hidden_state_size, &Device::Cpu)?,
        aux: None,
    })
}

fn var(varmap: &VarMap, name: &str) -> Tensor {
    varmap.data().lock().unwrap()[name].as_tensor().clone()
}

#[test]
fn embedding_matches_the_reference_resolution() -> Result<()> {
    assert_eq!(embedding_size(84, 84)?, 1024);
    assert_eq!(embedding_size(128, 128)?, 64 * 7 * 7);
    assert!(embedding_size(8, 8).is_err());
    Ok(())
}

#[test]
fn forward_shapes_are_stable_across_calls() -> Result<()> {
    let config = ModelConfig::default();
    let mut varmap = VarMap::new();
    let net = PolicyValueNet::new(config.clone(), &mut varmap, &Device::Cpu)?;
    let input = zero_input(&config)?;

    let first = net.forward(&input)?;
    assert_eq!(first.policy.dims(), &[1, ActionCatalog::basic().len()]);
    assert_eq!(first.value.dims(), &[1, 1]);
    assert_eq!(first.memory.hx.dims(), input.memory.hx.dims());
    assert_eq!(first.memory.cx.dims(), input.memory.cx.dims());

    // nothing leaks between independent calls
    let second = net.forward(&input)?;
    assert_eq!(
        first.policy.to_vec2::<f32>()?,
        second.policy.to_vec2::<f32>()?
    );
    assert_eq!(first.value.to_vec2::<f32>()?, second.value.to_vec2::<f32>()?);
    assert_eq!(
        first.memory.hx.to_vec2::<f32>()?,
        second.memory.hx.to_vec2::<f32>()?
    );

    // feeding the returned memory back in keeps the shapes
    let third = net.forward(&ModelInput {
        memory: first.memory.clone(),
        ..input.clone()
    })?;
    assert_eq!(third.memory.hx.dims(), input.memory.hx.dims());
    let untouched: Vec<Vec<f32>> = input.memory.cx.to_vec2()?;
    assert!(untouched.iter().flatten().all(|v| *v == 0.));
    Ok(())
}

#[test]
fn zero_state_gives_uniform_policy() -> Result<()> {
    let config = ModelConfig::default();
    let mut varmap = VarMap::new();
    let net = PolicyValueNet::new(config.clone(), &mut varmap, &Device::Cpu)?;
    let output = net.forward(&zero_input(&config)?)?;
    let logits: Vec<f32> = output.policy.squeeze(0)?.to_vec1()?;
    assert!(logits.iter().all(|l| *l == 0.));
    Ok(())
}

#[test]
fn initialization_policy() -> Result<()> {
    let config = ModelConfig::default();
    let mut varmap = VarMap::new();
    PolicyValueNet::new(config.clone(), &mut varmap, &Device::Cpu)?;

    let actor_norms: Vec<f32> = var(&varmap, "actor_linear.weight")
        .sqr()?
        .sum(1)?
        .sqrt()?
        .to_vec1()?;
    assert_eq!(actor_norms.len(), config.action_space);
    assert!(actor_norms.iter().all(|n| (n - 0.01).abs() < 1e-5));
    let critic_norms: Vec<f32> = var(&varmap, "critic_linear.weight")
        .sqr()?
        .sum(1)?
        .sqrt()?
        .to_vec1()?;
    assert!((critic_norms[0] - 1.).abs() < 1e-4);

    for bias in [
        "conv1.bias",
        "conv4.bias",
        "actor_linear.bias",
        "critic_linear.bias",
        "lstm.bias_ih_l0",
        "lstm.bias_hh_l0",
    ] {
        let max = var(&varmap, bias).abs()?.max_all()?.to_scalar::<f32>()?;
        assert_eq!(max, 0., "{bias} should start at zero");
    }

    // 3 in, 32 out, 5x5 kernels, scaled by the relu gain
    let bound = (2f32 * 6. / (75. + 800.)).sqrt();
    let conv1 = var(&varmap, "conv1.weight");
    assert_eq!(conv1.dims(), &[32, 3, 5, 5]);
    let max = conv1.abs()?.max_all()?.to_scalar::<f32>()?;
    assert!(max <= bound * 1.0001 && max > 0.5 * bound);
    Ok(())
}

#[test]
fn malformed_inputs_are_rejected() -> Result<()> {
    let config = ModelConfig::default();
    let mut varmap = VarMap::new();
    let net = PolicyValueNet::new(config.clone(), &mut varmap, &Device::Cpu)?;
    let input = zero_input(&config)?;

    let wrong_frame = ModelInput {
        state: Tensor::zeros((1, 3, 64, 64), DType::F32, &Device::Cpu)?,
        ..input.clone()
    };
    assert!(net.forward(&wrong_frame).is_err());

    let wrong_memory = ModelInput {
        memory: RecurrentMemory::zeros(1, 16, &Device::Cpu)?,
        ..input.clone()
    };
    assert!(net.forward(&wrong_memory).is_err());

    let unexpected_aux = ModelInput {
        aux: Some(Tensor::zeros((1, 2), DType::F32, &Device::Cpu)?),
        ..input
    };
    assert!(net.forward(&unexpected_aux).is_err());
    Ok(())
}

#[test]
fn auxiliary_pathway_takes_the_seen_flags() -> Result<()> {
    let config = ModelConfig {
        aux_state_size: Some(2),
        hidden_state_size: 32,
        ..Default::default()
    };
    let mut varmap = VarMap::new();
    let net = PolicyValueNet::new(config.clone(), &mut varmap, &Device::Cpu)?;
    let input = zero_input(&config)?;
    assert!(net.forward(&input).is_err());

    let seen = ModelInput {
        aux: Some(Tensor::new(&[1f32, 0.], &Device::Cpu)?),
        ..input.clone()
    };
    let output = net.forward(&seen)?;
    assert_eq!(output.policy.dims(), &[1, 7]);
    assert_eq!(output.memory.hx.dims(), &[1, 32]);

    let wrong_size = ModelInput {
        aux: Some(Tensor::new(&[1f32, 0., 1.], &Device::Cpu)?),
        ..input
    };
    assert!(net.forward(&wrong_size).is_err());
    Ok(())
}

#[test]
fn single_frames_are_batched() -> Result<()> {
    let config = ModelConfig {
        hidden_state_size: 32,
        ..Default::default()
    };
    let mut varmap = VarMap::new();
    let net = PolicyValueNet::new(config.clone(), &mut varmap, &Device::Cpu)?;
    let input = ModelInput {
        state: Tensor::rand(0f32, 1f32, (3, 84, 84), &Device::Cpu)?,
        ..zero_input(&config)?
    };
    let output = net.forward(&input)?;
    assert_eq!(output.value.dims(), &[1, 1]);
    Ok(())
}

fn room(settings: &EnvironmentSettings) -> Result<ScriptedEnv> {
    Ok(ScriptedEnv::new(
        settings,
        vec![vec!["Tomato"], vec!["Bowl"], vec![], vec!["Tomato", "Bowl"]],
    ))
}

#[test]
fn model_policy_drives_an_episode() -> Result<()> {
    let vocabulary = Arc::new(ObjectVocabulary::from_lists(
        vec!["Tomato".into()],
        vec!["Bowl".into()],
    ));
    let config = ModelConfig {
        hidden_state_size: 64,
        aux_state_size: Some(2),
        ..Default::default()
    };
    let mut varmap = VarMap::new();
    let net = PolicyValueNet::new(config, &mut varmap, &Device::Cpu)?;
    let policy = ModelPolicy::new(net, Device::Cpu);

    let mut controller = EpisodeController::new(room, 3, 0, vocabulary);
    controller.new_episode(&EpisodeConfig::default(), "FloorPlan28")?;
    let rollout = run_episode(&mut controller, &policy, 12)?;
    assert!(!rollout.is_empty() && rollout.len() <= 12);
    assert_eq!(rollout.truncated, !rollout.dones.iter().any(|d| *d));
    assert!(rollout.values.iter().all(|v| v.is_finite()));
    assert!(rollout.log_probs.iter().all(|l| *l <= 0.));
    Ok(())
}

#[test]
fn greedy_policy_is_deterministic() -> Result<()> {
    let config = ModelConfig {
        hidden_state_size: 32,
        ..Default::default()
    };
    let mut varmap = VarMap::new();
    let net = PolicyValueNet::new(config, &mut varmap, &Device::Cpu)?;
    let policy = ModelPolicy::new(net, Device::Cpu).greedy();
    let frame = Tensor::rand(0f32, 1f32, (3, 84, 84), &Device::Cpu)?;
    let memory = policy.initial_memory()?;
    let a = policy.act(&frame, &[], &memory, &mut StdRng::seed_from_u64(0))?;
    let b = policy.act(&frame, &[], &memory, &mut StdRng::seed_from_u64(1))?;
    assert_eq!(a.action, b.action);
    assert_eq!(a.value, b.value);
    Ok(())
}
