use crate::actions::ActionRecord;
use anyhow::Result;
use candle_core::Tensor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One entry of the simulator's object metadata for the latest event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    #[serde(rename = "objectType")]
    pub object_type: String,
    pub visible: bool,
}

impl ObjectMetadata {
    pub fn new(object_type: impl Into<String>, visible: bool) -> Self {
        Self {
            object_type: object_type.into(),
            visible,
        }
    }
}

/// The simulator as seen by the episode controller. Every call blocks until the simulator has
/// answered; an `Err` is fatal for the running episode.
pub trait Environment {
    /// Launches the simulator process bound to `scene`.
    fn start(&mut self, scene: &str, gpu_id: Option<usize>) -> Result<()>;

    /// Loads `scene` again. With `reseed == false` object placement must be identical to the
    /// previous reset so that recorded action sequences replay deterministically.
    fn reset(&mut self, scene: &str, reseed: bool) -> Result<()>;

    fn step(&mut self, action: &ActionRecord) -> Result<()>;

    /// Whether the simulator physically executed the last action (movement was not blocked...).
    fn last_action_success(&self) -> bool;

    fn objects(&self) -> &[ObjectMetadata];

    /// The latest RGB observation as a `(3, height, width)` f32 tensor.
    fn current_frame(&self) -> Result<Tensor>;

    fn visible_object_types(&self) -> Vec<&str> {
        self.objects()
            .iter()
            .filter(|o| o.visible)
            .map(|o| o.object_type.as_str())
            .collect()
    }
}

/// Everything needed to launch a simulator connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    pub grid_size: f32,
    pub fov: f32,
    pub executable_path: PathBuf,
    pub randomize_objects: bool,
    pub frame_size: [usize; 2],
    pub seed: u64,
}

pub trait EnvironmentBuilder {
    type Env: Environment;

    fn build_env(&self, settings: &EnvironmentSettings) -> Result<Self::Env>;
}

impl<E: Environment, F> EnvironmentBuilder for F
where
    F: Fn(&EnvironmentSettings) -> Result<E>,
{
    type Env = E;

    fn build_env(&self, settings: &EnvironmentSettings) -> Result<Self::Env> {
        (self)(settings)
    }
}
