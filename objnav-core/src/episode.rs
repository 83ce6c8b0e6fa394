use crate::{actions::Action, config::RewardConfig};

/// Progress of one search episode: which targets have been credited and what was done so far.
///
/// `seen` has one flag per target and flags only ever go from `false` to `true`. `success`
/// is only set by the done signal and implies every flag is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
    scene_id: String,
    targets: Vec<String>,
    seen: Vec<bool>,
    actions_taken: Vec<Action>,
    success: bool,
    terminal: bool,
}

impl Episode {
    pub fn new(scene_id: impl Into<String>, targets: Vec<String>) -> Self {
        let seen = vec![false; targets.len()];
        Self {
            scene_id: scene_id.into(),
            targets,
            seen,
            actions_taken: vec![],
            success: false,
            terminal: false,
        }
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn seen(&self) -> &[bool] {
        &self.seen
    }

    /// The seen flags as `0.0`/`1.0`, the auxiliary input of the policy network.
    pub fn seen_vector(&self) -> Vec<f32> {
        self.seen.iter().map(|s| if *s { 1. } else { 0. }).collect()
    }

    pub fn actions_taken(&self) -> &[Action] {
        &self.actions_taken
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Vacuously true without targets.
    pub fn all_seen(&self) -> bool {
        self.seen.iter().all(|s| *s)
    }

    pub(crate) fn record(&mut self, action: Action) {
        self.actions_taken.push(action);
    }

    // Returns how many targets were newly credited.
    fn credit_visible(&mut self, visible: &[&str]) -> usize {
        let mut newly_seen = 0;
        for (target, seen) in self.targets.iter().zip(self.seen.iter_mut()) {
            if !*seen && visible.contains(&target.as_str()) {
                *seen = true;
                newly_seen += 1;
            }
        }
        newly_seen
    }

    /// Scores `action` against the object types visible after it was executed and returns
    /// `(reward, terminal)`.
    ///
    /// The found signal credits every visible target that has not been credited yet, each one
    /// earning the found reward exactly once. The done signal always terminates: visible targets
    /// get one last credit and the goal reward is paid only if every target is seen afterwards.
    pub fn judge(
        &mut self,
        action: Action,
        visible: &[&str],
        rewards: &RewardConfig,
    ) -> (f32, bool) {
        let mut reward = rewards.step_penalty;
        let mut terminal = false;
        match action {
            Action::Found => {
                let newly_seen = self.credit_visible(visible);
                reward += newly_seen as f32 * rewards.found_reward;
            }
            Action::Done => {
                terminal = true;
                self.terminal = true;
                self.credit_visible(visible);
                if self.all_seen() {
                    reward += rewards.goal_success_reward;
                    self.success = true;
                }
            }
            _ => {}
        }
        (reward, terminal)
    }
}
