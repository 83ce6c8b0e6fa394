use crate::{
    controller::{EpisodeController, StepOutcome},
    env::EnvironmentBuilder,
    error::EpisodeError,
};
use anyhow::Result;
use candle_core::Tensor;
use rand::rngs::StdRng;

pub struct PolicyStep<M> {
    pub action: usize,
    pub value: f32,
    pub log_prob: f32,
    pub memory: M,
}

/// A policy carrying explicit recurrent memory between calls. Implementations keep no state of
/// their own: the memory goes in, the updated memory comes out.
pub trait RecurrentPolicy {
    type Memory;

    fn initial_memory(&self) -> Result<Self::Memory>;

    /// Picks an action for `frame`. `seen` holds the episode's seen flags as `0.0`/`1.0`.
    fn act(
        &self,
        frame: &Tensor,
        seen: &[f32],
        memory: &Self::Memory,
        rng: &mut StdRng,
    ) -> Result<PolicyStep<Self::Memory>>;
}

#[derive(Debug, Clone, Default)]
pub struct EpisodeRollout {
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
    pub values: Vec<f32>,
    pub log_probs: Vec<f32>,
    pub dones: Vec<bool>,
    pub action_successes: Vec<bool>,
    pub success: bool,
    /// The step budget ran out before the done signal.
    pub truncated: bool,
}

impl EpisodeRollout {
    fn push_step(&mut self, action: usize, value: f32, log_prob: f32, outcome: StepOutcome) {
        self.actions.push(action);
        self.values.push(value);
        self.log_probs.push(log_prob);
        self.rewards.push(outcome.reward);
        self.dones.push(outcome.terminal);
        self.action_successes.push(outcome.action_was_successful);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }
}

/// Runs the episode started by the last `new_episode` until the done signal or `max_steps`.
pub fn run_episode<B: EnvironmentBuilder, P: RecurrentPolicy>(
    controller: &mut EpisodeController<B>,
    policy: &P,
    max_steps: usize,
) -> Result<EpisodeRollout> {
    let mut rollout = EpisodeRollout::default();
    let mut memory = policy.initial_memory()?;
    for _ in 0..max_steps {
        let frame = controller.state_for_agent()?;
        let seen = controller
            .episode()
            .ok_or(EpisodeError::NoEpisode)?
            .seen_vector();
        let step = policy.act(&frame, &seen, &memory, controller.rng_mut())?;
        let outcome = controller.step(step.action)?;
        rollout.push_step(step.action, step.value, step.log_prob, outcome);
        memory = step.memory;
        if outcome.terminal {
            rollout.success = controller.episode().is_some_and(|e| e.success());
            return Ok(rollout);
        }
    }
    rollout.truncated = true;
    Ok(rollout)
}
