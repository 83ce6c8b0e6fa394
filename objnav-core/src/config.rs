use crate::env::EnvironmentSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};

/// Which local THOR build to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Osx,
}

impl Default for Platform {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Osx
        } else {
            Self::Linux
        }
    }
}

impl Platform {
    pub fn default_executable_path(&self) -> PathBuf {
        match self {
            Self::Osx => PathBuf::from(
                "./datasets/builds/thor-local-OSXIntel64.app/Contents/MacOS/thor-local-OSXIntel64",
            ),
            Self::Linux => PathBuf::from("./datasets/builds/thor-local-Linux64"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RewardConfig {
    /// Added on every step, whatever the action.
    pub step_penalty: f32,
    /// Added once per target the first time it is credited by the found signal.
    pub found_reward: f32,
    /// Added when the done signal ends an episode with every target seen.
    pub goal_success_reward: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            step_penalty: -0.01,
            found_reward: 1.0,
            goal_success_reward: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EpisodeConfig {
    pub grid_size: f32,
    pub fov: f32,
    pub randomize_objects: bool,
    pub platform: Platform,
    /// Overrides the platform's default build location.
    pub executable_path: Option<PathBuf>,
    /// Base seed, offset by the controller rank.
    pub seed: u64,
    /// `[height, width]` of the frames handed to the model.
    pub frame_size: [usize; 2],
    pub targets: Vec<String>,
    pub rewards: RewardConfig,
}

impl Default for EpisodeConfig {
    fn default() -> Self {
        Self {
            grid_size: 0.25,
            fov: 90.0,
            randomize_objects: false,
            platform: Platform::default(),
            executable_path: None,
            seed: 1,
            frame_size: [84, 84],
            targets: vec!["Tomato".into(), "Bowl".into()],
            rewards: RewardConfig::default(),
        }
    }
}

impl EpisodeConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading episode config {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("parsing episode config {}", path.display()))?;
        Ok(config)
    }

    pub fn executable_path(&self) -> PathBuf {
        self.executable_path
            .clone()
            .unwrap_or_else(|| self.platform.default_executable_path())
    }

    pub fn environment_settings(&self, seed: u64) -> EnvironmentSettings {
        EnvironmentSettings {
            grid_size: self.grid_size,
            fov: self.fov,
            executable_path: self.executable_path(),
            randomize_objects: self.randomize_objects,
            frame_size: self.frame_size,
            seed,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: EpisodeConfig =
            serde_json::from_str(r#"{"platform": "osx", "targets": ["Apple"]}"#).unwrap();
        assert_eq!(config.platform, Platform::Osx);
        assert_eq!(config.targets, vec!["Apple".to_string()]);
        assert_eq!(config.grid_size, 0.25);
        assert_eq!(config.rewards, RewardConfig::default());
        assert!(
            config
                .executable_path()
                .ends_with("thor-local-OSXIntel64")
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<EpisodeConfig>(r#"{"gird_size": 0.5}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn settings_carry_the_controller_seed() {
        let config = EpisodeConfig {
            executable_path: Some("/opt/thor".into()),
            ..Default::default()
        };
        let settings = config.environment_settings(42);
        assert_eq!(settings.seed, 42);
        assert_eq!(settings.executable_path, PathBuf::from("/opt/thor"));
        assert_eq!(settings.frame_size, [84, 84]);
    }
}
