use crate::{
    actions::{Action, ActionCatalog, ActionRecord},
    config::{EpisodeConfig, RewardConfig},
    env::{Environment, EnvironmentBuilder},
    episode::Episode,
    error::EpisodeError,
    rng::{seeded_rng, worker_seed},
    vocabulary::ObjectVocabulary,
};
use anyhow::Result;
use candle_core::Tensor;
use rand::rngs::StdRng;
use std::{sync::Arc, thread, time::Duration};
use tracing::{debug, info, warn};

/// What a single step produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub reward: f32,
    pub terminal: bool,
    /// Whether the simulator executed the physical action. Independent of goal progress.
    pub action_was_successful: bool,
}

/// Drives episodes against one simulator connection.
///
/// The connection is created by the first `new_episode` and reused by every later one until
/// [`EpisodeController::disconnect`] hands it back to the caller.
pub struct EpisodeController<B: EnvironmentBuilder> {
    builder: B,
    env: Option<B::Env>,
    catalog: Arc<ActionCatalog>,
    vocabulary: Arc<ObjectVocabulary>,
    gpu_id: Option<usize>,
    seed: u64,
    rng: StdRng,
    rewards: RewardConfig,
    episode: Option<Episode>,
}

impl<B: EnvironmentBuilder> EpisodeController<B> {
    pub fn new(builder: B, base_seed: u64, rank: u64, vocabulary: Arc<ObjectVocabulary>) -> Self {
        let seed = worker_seed(base_seed, rank);
        Self {
            builder,
            env: None,
            catalog: ActionCatalog::basic(),
            vocabulary,
            gpu_id: None,
            seed,
            rng: seeded_rng(seed),
            rewards: RewardConfig::default(),
            episode: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<ActionCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_gpu(mut self, gpu_id: usize) -> Self {
        self.gpu_id = Some(gpu_id);
        self
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The controller's own random source, for anything that samples during its episodes.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn episode(&self) -> Option<&Episode> {
        self.episode.as_ref()
    }

    pub fn environment(&self) -> Option<&B::Env> {
        self.env.as_ref()
    }

    /// Gives up the simulator connection; the next `new_episode` builds a fresh one.
    pub fn disconnect(&mut self) -> Option<B::Env> {
        self.episode = None;
        self.env.take()
    }

    /// Ends any current episode and starts one in `scene`. On failure no episode is active.
    pub fn new_episode(&mut self, config: &EpisodeConfig, scene: &str) -> Result<()> {
        self.episode = None;
        if let Some(target) = config
            .targets
            .iter()
            .find(|t| !self.vocabulary.contains(t))
        {
            return Err(EpisodeError::UnknownTarget {
                target: target.clone(),
            }
            .into());
        }
        if let Some(env) = self.env.as_mut() {
            env.reset(scene, true)?;
        } else {
            let settings = config.environment_settings(self.seed);
            let mut env = self.builder.build_env(&settings)?;
            env.start(scene, self.gpu_id)?;
            self.env = Some(env);
        }
        self.rewards = config.rewards.clone();
        self.episode = Some(Episode::new(scene, config.targets.clone()));
        info!(scene, targets = ?config.targets, seed = self.seed, "new episode");
        Ok(())
    }

    /// The current observation, as fed to the policy.
    pub fn state_for_agent(&self) -> Result<Tensor> {
        let env = self.env.as_ref().ok_or(EpisodeError::NoEpisode)?;
        env.current_frame()
    }

    pub fn step(&mut self, action_index: usize) -> Result<StepOutcome> {
        let action = self
            .catalog
            .get(action_index)
            .ok_or(EpisodeError::ActionOutOfRange {
                index: action_index,
                catalog_size: self.catalog.len(),
            })?;
        let episode = self.episode.as_mut().ok_or(EpisodeError::NoEpisode)?;
        if episode.is_terminal() {
            return Err(EpisodeError::AlreadyTerminated {
                scene: episode.scene_id().to_owned(),
            }
            .into());
        }
        episode.record(action);
        self.action_step(action)
    }

    fn action_step(&mut self, action: Action) -> Result<StepOutcome> {
        let env = self.env.as_mut().ok_or(EpisodeError::NoEpisode)?;
        env.step(&ActionRecord::from(action))?;
        let action_was_successful = env.last_action_success();
        let visible = env.visible_object_types();
        let episode = self.episode.as_mut().ok_or(EpisodeError::NoEpisode)?;
        let (reward, terminal) = episode.judge(action, &visible, &self.rewards);
        debug!(
            %action,
            reward,
            action_was_successful,
            seen = ?episode.seen(),
            "step"
        );
        if terminal {
            info!(
                scene = episode.scene_id(),
                steps = episode.actions_taken().len(),
                success = episode.success(),
                "episode finished"
            );
        }
        Ok(StepOutcome {
            reward,
            terminal,
            action_was_successful,
        })
    }

    /// Re-runs `actions` from a reset of the current scene that keeps the object placement, waiting
    /// `delay` after each step. The episode state starts over, so the outcomes match the original
    /// run step for step.
    pub fn replay(&mut self, actions: &[Action], delay: Duration) -> Result<Vec<StepOutcome>> {
        if let Some(action) = actions
            .iter()
            .find(|a| self.catalog.index_of(**a).is_none())
        {
            return Err(EpisodeError::NotInCatalog { action: *action }.into());
        }
        let episode = self.episode.as_ref().ok_or(EpisodeError::NoEpisode)?;
        let scene = episode.scene_id().to_owned();
        let targets = episode.targets().to_vec();
        let env = self.env.as_mut().ok_or(EpisodeError::NoEpisode)?;
        env.reset(&scene, false)?;
        self.episode = Some(Episode::new(scene, targets));

        let mut outcomes = Vec::with_capacity(actions.len());
        for (idx, action) in actions.iter().enumerate() {
            if let Some(episode) = self.episode.as_mut() {
                episode.record(*action);
            }
            let outcome = self.action_step(*action)?;
            outcomes.push(outcome);
            thread::sleep(delay);
            if outcome.terminal {
                let ignored = actions.len() - idx - 1;
                if ignored > 0 {
                    warn!(ignored, "replayed sequence continues after `Done`, rest ignored");
                }
                break;
            }
        }
        Ok(outcomes)
    }

    /// Replays the current episode's own history.
    pub fn slow_replay(&mut self, delay: Duration) -> Result<Vec<StepOutcome>> {
        let actions = self
            .episode
            .as_ref()
            .ok_or(EpisodeError::NoEpisode)?
            .actions_taken()
            .to_vec();
        self.replay(&actions, delay)
    }
}
