use crate::config::schema::TrainingConfig;
use crate::error::{ExoError, Result};
use crate::notifications::NotificationManager;
use crate::registry::{Hyperparameters, ModelRecord, RegistryEvent, SharedRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrainingMode {
    /// Initialize and train a new model
    #[default]
    Scratch,
    /// Continue from the selected model
    FineTune,
}

/// Training flow state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum TrainingState {
    Idle,
    Pending { name: String, mode: TrainingMode },
    Complete(ModelRecord),
}

/// Everything a client needs to render the training view
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TrainingStatus {
    pub state: TrainingState,
    pub dataset: Option<String>,
    pub mode: TrainingMode,
    pub hyperparameters: Hyperparameters,
}

/// `Idle -> Pending -> Complete` state machine that adds a record to the
/// registry once its delayed task fires
pub struct TrainingFlow {
    registry: SharedRegistry,
    events: broadcast::Receiver<RegistryEvent>,
    notifier: Arc<NotificationManager>,
    delay: Duration,
    extensions: Vec<String>,
    dataset: Option<String>,
    mode: TrainingMode,
    hyperparameters: Hyperparameters,
    state: Arc<watch::Sender<TrainingState>>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl TrainingFlow {
    /// Create a flow pre-filled with the selected model's hyperparameters
    pub async fn new(
        registry: SharedRegistry,
        config: &TrainingConfig,
        notifier: Arc<NotificationManager>,
    ) -> Self {
        let (events, hyperparameters) = {
            let guard = registry.read().await;
            (guard.subscribe(), guard.selected().hyperparameters)
        };
        let (state, _) = watch::channel(TrainingState::Idle);

        Self {
            registry,
            events,
            notifier,
            delay: Duration::from_millis(config.delay_ms),
            extensions: config
                .dataset_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            dataset: None,
            mode: TrainingMode::default(),
            hyperparameters,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> TrainingState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrainingState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> TrainingStatus {
        TrainingStatus {
            state: self.state(),
            dataset: self.dataset.clone(),
            mode: self.mode,
            hyperparameters: self.hyperparameters,
        }
    }

    #[must_use]
    pub fn dataset(&self) -> Option<&str> {
        self.dataset.as_deref()
    }

    #[must_use]
    pub const fn hyperparameters(&self) -> Hyperparameters {
        self.hyperparameters
    }

    /// Reload hyperparameters if the registry selection changed since the
    /// last call
    pub async fn sync_selection(&mut self) {
        let mut changed = false;
        loop {
            match self.events.try_recv() {
                Ok(RegistryEvent::Created(_) | RegistryEvent::Selected { .. }) => changed = true,
                Ok(RegistryEvent::Deleted {
                    selection_reset, ..
                }) => changed |= selection_reset,
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!("Training flow skipped {skipped} registry events");
                    changed = true;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        if changed {
            self.hyperparameters = self.registry.read().await.selected().hyperparameters;
            tracing::debug!("Training hyperparameters reset to {:?}", self.hyperparameters);
        }
    }

    /// Remember the dataset file name. Its content is never read.
    pub fn choose_dataset(&mut self, filename: &str) -> Result<()> {
        self.ensure_not_pending()?;

        let path = Path::new(filename.trim());
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ExoError::InvalidInput("dataset file name is required".to_string()))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.extensions.contains(&extension) {
            return Err(ExoError::InvalidInput(format!(
                "unsupported dataset '{name}', expected one of: {}",
                self.extensions.join(", ")
            )));
        }

        tracing::info!("Dataset selected: {name}");
        self.dataset = Some(name.to_string());
        Ok(())
    }

    pub fn set_mode(&mut self, mode: TrainingMode) -> Result<()> {
        self.ensure_not_pending()?;
        self.mode = mode;
        Ok(())
    }

    pub fn set_hyperparameters(&mut self, hyperparameters: Hyperparameters) -> Result<()> {
        self.ensure_not_pending()?;
        hyperparameters.check()?;
        self.hyperparameters = hyperparameters;
        Ok(())
    }

    /// Start a training run that will create a record called `name`
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(&mut self, name: &str) -> Result<()> {
        if !matches!(self.state(), TrainingState::Idle) {
            return Err(ExoError::Flow(
                "A training run is already pending or complete. Reset it first.".to_string(),
            ));
        }

        let Some(dataset) = self.dataset.clone() else {
            self.notifier.missing_dataset();
            return Err(ExoError::MissingDataset);
        };

        let name = self.registry.read().await.validate_name(name)?;
        let run = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mode = self.mode;

        self.state.send_replace(TrainingState::Pending {
            name: name.clone(),
            mode,
        });
        tracing::info!("Training '{name}' on {dataset} ({mode:?})");

        let delay = self.delay;
        let hyperparameters = self.hyperparameters;
        let registry = Arc::clone(&self.registry);
        let notifier = Arc::clone(&self.notifier);
        let state = Arc::clone(&self.state);
        let generation = Arc::clone(&self.generation);

        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if generation.load(Ordering::SeqCst) != run {
                return;
            }

            let created = registry.write().await.create(&name, hyperparameters);
            match created {
                Ok(record) => {
                    state.send_if_modified(|current| {
                        if generation.load(Ordering::SeqCst) != run {
                            return false;
                        }
                        *current = TrainingState::Complete(record.clone());
                        true
                    });
                    notifier.training_complete(&record);
                }
                Err(e) => {
                    state.send_if_modified(|current| {
                        if generation.load(Ordering::SeqCst) != run {
                            return false;
                        }
                        *current = TrainingState::Idle;
                        true
                    });
                    notifier.training_failed(&e.to_string());
                }
            }
        }));

        Ok(())
    }

    /// Return to `Idle`, clear the dataset and cancel any in-flight run
    pub fn reset(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.dataset = None;
        self.state.send_replace(TrainingState::Idle);
    }

    fn ensure_not_pending(&self) -> Result<()> {
        if matches!(*self.state.borrow(), TrainingState::Pending { .. }) {
            return Err(ExoError::Flow(
                "Cannot change training setup while a run is pending".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for TrainingFlow {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::NotificationConfig;
    use crate::error::NameError;
    use crate::registry::{MemoryStore, MetricsSource, ModelRegistry, StorageKeys, BASE_MODEL_ID};

    fn shared_registry() -> SharedRegistry {
        ModelRegistry::load(
            Box::new(MemoryStore::new()),
            StorageKeys::default(),
            MetricsSource::Fixed,
        )
        .into_shared()
    }

    async fn flow(registry: &SharedRegistry, delay_ms: u64) -> (TrainingFlow, Arc<NotificationManager>) {
        let notifier = Arc::new(NotificationManager::new(NotificationConfig::default()));
        let config = TrainingConfig {
            delay_ms,
            ..TrainingConfig::default()
        };
        let flow = TrainingFlow::new(Arc::clone(registry), &config, Arc::clone(&notifier)).await;
        (flow, notifier)
    }

    async fn wait_complete(flow: &TrainingFlow) -> ModelRecord {
        let mut rx = flow.subscribe();
        let state = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s| matches!(s, TrainingState::Complete(_))),
        )
        .await
        .expect("training did not finish")
        .unwrap()
        .clone();

        match state {
            TrainingState::Complete(record) => record,
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_prefilled_from_selection() {
        let registry = shared_registry();
        let (flow, _) = flow(&registry, 10).await;
        assert_eq!(flow.hyperparameters(), Hyperparameters::default());
    }

    #[tokio::test]
    async fn test_start_without_dataset_notifies() {
        let registry = shared_registry();
        let (mut flow, notifier) = flow(&registry, 10).await;

        let err = flow.start("Alpha").await.unwrap_err();

        assert!(matches!(err, ExoError::MissingDataset));
        assert_eq!(flow.state(), TrainingState::Idle);
        assert_eq!(notifier.recent()[0].summary, "No Dataset Selected");
    }

    #[tokio::test]
    async fn test_choose_dataset_checks_extension() {
        let registry = shared_registry();
        let (mut flow, _) = flow(&registry, 10).await;

        assert!(flow.choose_dataset("notes.txt").is_err());
        assert!(flow.choose_dataset("").is_err());
        flow.choose_dataset("/data/kepler/koi.CSV").unwrap();
        assert_eq!(flow.dataset(), Some("koi.CSV"));
    }

    #[tokio::test]
    async fn test_start_rejects_bad_names() {
        let registry = shared_registry();
        let (mut flow, _) = flow(&registry, 10).await;
        flow.choose_dataset("koi.csv").unwrap();

        let err = flow.start("  ").await.unwrap_err();
        assert!(matches!(err, ExoError::Name(NameError::EmptyName)));

        let err = flow.start("Base Model").await.unwrap_err();
        assert!(matches!(err, ExoError::Name(NameError::DuplicateName(_))));
        assert_eq!(flow.state(), TrainingState::Idle);
    }

    #[tokio::test]
    async fn test_training_creates_record() {
        let registry = shared_registry();
        let (mut flow, notifier) = flow(&registry, 10).await;
        flow.choose_dataset("koi.csv").unwrap();
        let params = Hyperparameters {
            learning_rate: 0.05,
            estimators: 200,
            max_depth: 6,
            subsample: 0.9,
            regularization: 0.2,
        };
        flow.set_hyperparameters(params).unwrap();

        flow.start("Alpha").await.unwrap();
        assert!(matches!(flow.state(), TrainingState::Pending { .. }));
        assert!(flow.choose_dataset("other.csv").is_err());

        let record = wait_complete(&flow).await;

        assert_eq!(record.name, "Alpha");
        assert_eq!(record.hyperparameters, params);
        let guard = registry.read().await;
        assert_eq!(guard.list().len(), 2);
        assert_eq!(guard.selected().id, record.id);
        assert_eq!(notifier.recent()[0].summary, "Training Complete");
    }

    #[tokio::test]
    async fn test_reset_cancels_pending_run() {
        let registry = shared_registry();
        let (mut flow, _) = flow(&registry, 50).await;
        flow.choose_dataset("koi.csv").unwrap();
        flow.start("Alpha").await.unwrap();

        flow.reset();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(flow.state(), TrainingState::Idle);
        assert_eq!(flow.dataset(), None);
        assert_eq!(registry.read().await.list().len(), 1);
    }

    #[tokio::test]
    async fn test_name_taken_during_run_returns_to_idle() {
        let registry = shared_registry();
        let (mut flow, notifier) = flow(&registry, 50).await;
        flow.choose_dataset("koi.csv").unwrap();
        flow.start("Alpha").await.unwrap();

        registry
            .write()
            .await
            .create("Alpha", Hyperparameters::default())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(flow.state(), TrainingState::Idle);
        assert_eq!(registry.read().await.list().len(), 2);
        assert_eq!(notifier.recent()[0].summary, "Training Failed");
    }

    #[tokio::test]
    async fn test_sync_selection_follows_registry() {
        let registry = shared_registry();
        let (mut flow, _) = flow(&registry, 10).await;
        let params = Hyperparameters {
            max_depth: 12,
            ..Hyperparameters::default()
        };

        let beta = registry.write().await.create("Beta", params).unwrap();
        flow.sync_selection().await;
        assert_eq!(flow.hyperparameters().max_depth, 12);

        registry.write().await.select(BASE_MODEL_ID);
        flow.sync_selection().await;
        assert_eq!(flow.hyperparameters().max_depth, 5);

        registry.write().await.select(&beta.id);
        registry.write().await.delete(&beta.id);
        flow.sync_selection().await;
        assert_eq!(flow.hyperparameters().max_depth, 5);
    }
}
