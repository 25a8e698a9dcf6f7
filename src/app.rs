//! Daemon controller
//!
//! Owns the registry and both flows and turns IPC commands into responses.
//! Commands are handled one at a time, so the controller is the single
//! writer of registry state apart from the training flow's delayed task.

use crate::config::Config;
use crate::error::Result;
use crate::flows::{Classifier, DetectionFlow, PlaceholderClassifier, TrainingFlow};
use crate::ipc::{Command, Request, Response};
use crate::notifications::NotificationManager;
use crate::registry::{
    FileStore, KeyValueStore, MetricsSource, ModelRegistry, SharedRegistry, StorageKeys,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub struct App {
    registry: SharedRegistry,
    detection: DetectionFlow,
    training: TrainingFlow,
    notifier: Arc<NotificationManager>,
}

impl App {
    /// Build the controller on top of the configured file store
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store = FileStore::new(config.store_dir()?);
        tracing::info!("Model store at {}", store.dir().display());
        Ok(Self::with_store(config, Box::new(store), Arc::new(PlaceholderClassifier)).await)
    }

    /// Build the controller on top of any store and classifier
    pub async fn with_store(
        config: &Config,
        store: Box<dyn KeyValueStore>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        let registry = ModelRegistry::load(
            store,
            StorageKeys::from(&config.storage),
            MetricsSource::from(config.metrics.mode),
        )
        .into_shared();
        let notifier = Arc::new(NotificationManager::new(config.notifications.clone()));

        let detection = DetectionFlow::new(
            Duration::from_millis(config.detection.delay_ms),
            classifier,
            Arc::clone(&notifier),
        );
        let training =
            TrainingFlow::new(Arc::clone(&registry), &config.training, Arc::clone(&notifier)).await;

        Self {
            registry,
            detection,
            training,
            notifier,
        }
    }

    #[must_use]
    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Serve requests until every sender is dropped
    pub async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        while let Some(Request { command, reply }) = requests.recv().await {
            let response = self.handle(command).await;
            if reply.send(response).is_err() {
                tracing::debug!("Client went away before the response was sent");
            }
        }
        tracing::info!("Request channel closed, controller stopping");
    }

    /// Handle one command
    pub async fn handle(&mut self, command: Command) -> Response {
        self.training.sync_selection().await;

        match command {
            Command::ListModels => {
                let registry = self.registry.read().await;
                Response::Models {
                    records: registry.list().to_vec(),
                    selected_id: registry.selected().id.clone(),
                }
            }
            Command::SelectedModel => {
                Response::Model(self.registry.read().await.selected().clone())
            }
            Command::SelectModel { id } => {
                let mut registry = self.registry.write().await;
                registry.select(&id);
                Response::Model(registry.selected().clone())
            }
            Command::CreateModel {
                name,
                hyperparameters,
            } => {
                if let Err(e) = hyperparameters.check() {
                    return Response::Error(e.to_string());
                }
                let created = self.registry.write().await.create(&name, hyperparameters);
                match created {
                    Ok(record) => Response::Model(record),
                    Err(e) => Response::Error(e.to_string()),
                }
            }
            Command::DeleteModel { id } => {
                self.registry.write().await.delete(&id);
                Response::Ok
            }
            Command::Detect(form) => match self.detection.submit(&form) {
                Ok(()) => Response::Detection(self.detection.state()),
                Err(e) => Response::Error(e.to_string()),
            },
            Command::DetectionStatus => Response::Detection(self.detection.state()),
            Command::ResetDetection => {
                self.detection.reset();
                Response::Detection(self.detection.state())
            }
            Command::ChooseDataset { filename } => {
                self.training_response(|t| t.choose_dataset(&filename))
            }
            Command::SetTrainingMode(mode) => self.training_response(|t| t.set_mode(mode)),
            Command::SetHyperparameters(hyperparameters) => {
                self.training_response(|t| t.set_hyperparameters(hyperparameters))
            }
            Command::Train { name } => match self.training.start(&name).await {
                Ok(()) => Response::Training(self.training.status()),
                Err(e) => Response::Error(e.to_string()),
            },
            Command::TrainingStatus => Response::Training(self.training.status()),
            Command::ResetTraining => {
                self.training.reset();
                Response::Training(self.training.status())
            }
            Command::Notifications => Response::Notifications(self.notifier.recent()),
        }
    }

    fn training_response(
        &mut self,
        update: impl FnOnce(&mut TrainingFlow) -> Result<()>,
    ) -> Response {
        match update(&mut self.training) {
            Ok(()) => Response::Training(self.training.status()),
            Err(e) => Response::Error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{DetectionState, TrainingMode, TrainingState, TransitForm};
    use crate::registry::{Hyperparameters, MemoryStore, BASE_MODEL_ID};

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.detection.delay_ms = 5;
        config.training.delay_ms = 5;
        config
    }

    async fn app() -> App {
        App::with_store(
            &fast_config(),
            Box::new(MemoryStore::new()),
            Arc::new(PlaceholderClassifier),
        )
        .await
    }

    #[tokio::test]
    async fn test_list_marks_selection() {
        let mut app = app().await;
        match app.handle(Command::ListModels).await {
            Response::Models {
                records,
                selected_id,
            } => {
                assert_eq!(records.len(), 1);
                assert_eq!(selected_id, BASE_MODEL_ID);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_create_validates_hyperparameters() {
        let mut app = app().await;
        let response = app
            .handle(Command::CreateModel {
                name: "Alpha".to_string(),
                hyperparameters: Hyperparameters {
                    estimators: 5,
                    ..Hyperparameters::default()
                },
            })
            .await;
        assert!(matches!(response, Response::Error(ref e) if e.contains("estimators")));
    }

    #[tokio::test]
    async fn test_duplicate_create_reports_error() {
        let mut app = app().await;
        let create = Command::CreateModel {
            name: "Alpha".to_string(),
            hyperparameters: Hyperparameters::default(),
        };
        assert!(matches!(app.handle(create.clone()).await, Response::Model(_)));
        match app.handle(create).await {
            Response::Error(e) => assert!(e.contains("already exists")),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_selection_prefills_training() {
        let mut app = app().await;
        let params = Hyperparameters {
            max_depth: 9,
            ..Hyperparameters::default()
        };
        app.handle(Command::CreateModel {
            name: "Deep".to_string(),
            hyperparameters: params,
        })
        .await;

        match app.handle(Command::TrainingStatus).await {
            Response::Training(status) => assert_eq!(status.hyperparameters.max_depth, 9),
            other => panic!("unexpected response {other:?}"),
        }

        app.handle(Command::SelectModel {
            id: BASE_MODEL_ID.to_string(),
        })
        .await;
        match app.handle(Command::TrainingStatus).await {
            Response::Training(status) => assert_eq!(status.hyperparameters.max_depth, 5),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_training_round_trip() {
        let mut app = app().await;

        let response = app.handle(Command::Train { name: "Alpha".to_string() }).await;
        assert!(matches!(response, Response::Error(ref e) if e.contains("No dataset")));

        app.handle(Command::ChooseDataset {
            filename: "koi.fits".to_string(),
        })
        .await;
        app.handle(Command::SetTrainingMode(TrainingMode::FineTune)).await;
        let response = app.handle(Command::Train { name: "Alpha".to_string() }).await;
        assert!(matches!(
            response,
            Response::Training(ref s) if s.state == (TrainingState::Pending {
                name: "Alpha".to_string(),
                mode: TrainingMode::FineTune,
            })
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;

        match app.handle(Command::TrainingStatus).await {
            Response::Training(status) => {
                assert!(matches!(status.state, TrainingState::Complete(ref r) if r.name == "Alpha"));
            }
            other => panic!("unexpected response {other:?}"),
        }
        match app.handle(Command::SelectedModel).await {
            Response::Model(record) => assert_eq!(record.name, "Alpha"),
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_detection_round_trip() {
        let mut app = app().await;
        let form = TransitForm {
            orbital_period: "3.5".to_string(),
            transit_duration: "2.9".to_string(),
            planetary_radius: "11.2".to_string(),
            transit_depth: "14000".to_string(),
            stellar_flux: "900".to_string(),
        };

        let response = app.handle(Command::Detect(form)).await;
        assert!(matches!(
            response,
            Response::Detection(DetectionState::Pending(_))
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            app.handle(Command::DetectionStatus).await,
            Response::Detection(DetectionState::ResultReady { .. })
        ));

        assert_eq!(
            app.handle(Command::ResetDetection).await,
            Response::Detection(DetectionState::Idle)
        );
    }
}
