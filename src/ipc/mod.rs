pub mod client;
pub mod server;

use crate::error::{ExoError, Result};
use crate::flows::{DetectionState, TrainingMode, TrainingStatus, TransitForm};
use crate::notifications::Notification;
use crate::registry::{Hyperparameters, ModelRecord};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::oneshot;

/// IPC Commands
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Command {
    ListModels,
    SelectedModel,
    SelectModel { id: String },
    CreateModel {
        name: String,
        hyperparameters: Hyperparameters,
    },
    DeleteModel { id: String },
    Detect(TransitForm),
    DetectionStatus,
    ResetDetection,
    ChooseDataset { filename: String },
    SetTrainingMode(TrainingMode),
    SetHyperparameters(Hyperparameters),
    Train { name: String },
    TrainingStatus,
    ResetTraining,
    Notifications,
}

/// IPC Responses
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    Models {
        records: Vec<ModelRecord>,
        selected_id: String,
    },
    Model(ModelRecord),
    Detection(DetectionState),
    Training(TrainingStatus),
    Notifications(Vec<Notification>),
    Error(String),
}

/// A command plus the channel its response goes back on
#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub reply: oneshot::Sender<Response>,
}

/// Default socket path under `XDG_RUNTIME_DIR`
pub fn default_socket_path() -> Result<PathBuf> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .or_else(|_| -> std::result::Result<String, std::env::VarError> {
            #[cfg(target_os = "linux")]
            {
                let uid = nix::unistd::getuid();
                Ok(format!("/run/user/{uid}"))
            }
            #[cfg(not(target_os = "linux"))]
            {
                Err(std::env::VarError::NotPresent)
            }
        })
        .map_err(|_| ExoError::Ipc("XDG_RUNTIME_DIR not set".to_string()))?;

    Ok(PathBuf::from(runtime_dir).join("exodetect.sock"))
}
