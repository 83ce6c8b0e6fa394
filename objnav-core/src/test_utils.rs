//! In-process stand-ins for the simulator and the policy, for tests and dry runs.

use crate::{
    actions::{Action, ActionRecord},
    env::{Environment, EnvironmentSettings, ObjectMetadata},
    rng::seeded_rng,
    rollout::{PolicyStep, RecurrentPolicy},
};
use anyhow::{Result, bail};
use candle_core::{Device, Tensor};
use rand::{Rng, rngs::StdRng};

/// A room seen from a fixed spot. The agent can only turn; each heading shows a fixed set of
/// object types. With object randomization the views are rotated by a seed drawn on reseeding
/// resets, so replays without reseeding see the same room.
pub struct ScriptedEnv {
    settings: EnvironmentSettings,
    rng: StdRng,
    views: Vec<Vec<String>>,
    blocked: Vec<bool>,
    placement_seed: u64,
    heading: usize,
    objects: Vec<ObjectMetadata>,
    last_action_success: bool,
    scene: Option<String>,
    crash_after: Option<usize>,
    pub starts: usize,
    pub resets: usize,
    pub steps: usize,
}

impl ScriptedEnv {
    pub fn new(settings: &EnvironmentSettings, views: Vec<Vec<&str>>) -> Self {
        assert!(!views.is_empty(), "a scripted room needs at least one heading");
        let views: Vec<Vec<String>> = views
            .into_iter()
            .map(|v| v.into_iter().map(str::to_owned).collect())
            .collect();
        let blocked = vec![false; views.len()];
        Self {
            settings: settings.clone(),
            rng: seeded_rng(settings.seed),
            views,
            blocked,
            placement_seed: 0,
            heading: 0,
            objects: vec![],
            last_action_success: true,
            scene: None,
            crash_after: None,
            starts: 0,
            resets: 0,
            steps: 0,
        }
    }

    /// Moving ahead fails while facing `heading`.
    pub fn with_blocked(mut self, heading: usize) -> Self {
        self.blocked[heading] = true;
        self
    }

    /// The simulator dies on the step after `steps` successful ones.
    pub fn with_crash_after(mut self, steps: usize) -> Self {
        self.crash_after = Some(steps);
        self
    }

    pub fn scene(&self) -> Option<&str> {
        self.scene.as_deref()
    }

    pub fn heading(&self) -> usize {
        self.heading
    }

    fn view_at(&self, heading: usize) -> &[String] {
        let n = self.views.len();
        let shift = if self.settings.randomize_objects {
            (self.placement_seed % n as u64) as usize
        } else {
            0
        };
        &self.views[(heading + shift) % n]
    }

    fn observe(&mut self) {
        let mut objects: Vec<ObjectMetadata> = vec![];
        for object_type in self.views.iter().flatten() {
            if objects.iter().all(|o| &o.object_type != object_type) {
                objects.push(ObjectMetadata::new(object_type.clone(), false));
            }
        }
        let visible = self.view_at(self.heading).to_vec();
        for object in objects.iter_mut() {
            object.visible = visible.contains(&object.object_type);
        }
        self.objects = objects;
    }
}

impl Environment for ScriptedEnv {
    fn start(&mut self, scene: &str, _gpu_id: Option<usize>) -> Result<()> {
        self.starts += 1;
        self.reset(scene, true)
    }

    fn reset(&mut self, scene: &str, reseed: bool) -> Result<()> {
        if reseed {
            self.placement_seed = self.rng.random();
        }
        self.resets += 1;
        self.scene = Some(scene.to_owned());
        self.heading = 0;
        self.last_action_success = true;
        self.observe();
        Ok(())
    }

    fn step(&mut self, action: &ActionRecord) -> Result<()> {
        if self.scene.is_none() {
            bail!("scripted simulator was never started");
        }
        if self.crash_after.is_some_and(|n| self.steps >= n) {
            bail!("scripted simulator crashed after {} steps", self.steps);
        }
        self.steps += 1;
        let n = self.views.len();
        self.last_action_success = match action.action {
            Action::RotateRight => {
                self.heading = (self.heading + 1) % n;
                true
            }
            Action::RotateLeft => {
                self.heading = (self.heading + n - 1) % n;
                true
            }
            Action::MoveAhead => !self.blocked[self.heading],
            _ => true,
        };
        self.observe();
        Ok(())
    }

    fn last_action_success(&self) -> bool {
        self.last_action_success
    }

    fn objects(&self) -> &[ObjectMetadata] {
        &self.objects
    }

    fn current_frame(&self) -> Result<Tensor> {
        let [height, width] = self.settings.frame_size;
        let shade = self.heading as f32 / self.views.len() as f32;
        Ok(Tensor::full(shade, (3, height, width), &Device::Cpu)?)
    }
}

/// Picks uniformly among `action_space` actions.
pub struct UniformPolicy {
    pub action_space: usize,
}

impl RecurrentPolicy for UniformPolicy {
    type Memory = ();

    fn initial_memory(&self) -> Result<()> {
        Ok(())
    }

    fn act(
        &self,
        _frame: &Tensor,
        _seen: &[f32],
        _memory: &(),
        rng: &mut StdRng,
    ) -> Result<PolicyStep<()>> {
        Ok(PolicyStep {
            action: rng.random_range(0..self.action_space),
            value: 0.,
            log_prob: -(self.action_space as f32).ln(),
            memory: (),
        })
    }
}
