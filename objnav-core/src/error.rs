use crate::actions::Action;
use thiserror::Error;

/// Contract violations raised by the episode controller. All of them end the current run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EpisodeError {
    #[error("action index {index} is out of range for a catalog of {catalog_size} actions")]
    ActionOutOfRange { index: usize, catalog_size: usize },
    #[error("action `{action}` is not in the controller's catalog")]
    NotInCatalog { action: Action },
    #[error("no episode has been started, call `new_episode` first")]
    NoEpisode,
    #[error("episode in scene {scene} already ended with `Done`")]
    AlreadyTerminated { scene: String },
    #[error("target `{target}` is not part of the object vocabulary")]
    UnknownTarget { target: String },
}
