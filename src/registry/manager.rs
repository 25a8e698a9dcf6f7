use crate::config::schema::StorageConfig;
use crate::error::NameError;
use crate::registry::record::{Hyperparameters, MetricsSource, ModelRecord, BASE_MODEL_ID};
use crate::registry::store::KeyValueStore;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Registry shared between the controller loop and delayed training tasks
pub type SharedRegistry = Arc<RwLock<ModelRegistry>>;

const EVENT_CAPACITY: usize = 64;

/// Change notifications for registry observers
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Created(ModelRecord),
    Deleted { id: String, selection_reset: bool },
    Selected { id: String },
}

/// Store keys the registry persists to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub records: String,
    pub selected: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for StorageKeys {
    fn from(config: &StorageConfig) -> Self {
        Self {
            records: config.records_key.clone(),
            selected: config.selected_key.clone(),
        }
    }
}

/// Ordered set of trained model records plus the active selection
pub struct ModelRegistry {
    records: Vec<ModelRecord>,
    base: ModelRecord,
    selected_id: String,
    store: Box<dyn KeyValueStore>,
    keys: StorageKeys,
    metrics: MetricsSource,
    events: broadcast::Sender<RegistryEvent>,
}

impl ModelRegistry {
    /// Restore registry state from the store, seeding the base record when
    /// nothing usable is stored
    pub fn load(store: Box<dyn KeyValueStore>, keys: StorageKeys, metrics: MetricsSource) -> Self {
        let records = load_records(store.as_ref(), &keys.records);

        let selected_id = match store.get(&keys.selected) {
            Ok(Some(id)) if records.iter().any(|r| r.id == id) => id,
            Ok(Some(id)) => {
                tracing::debug!("Stored selection '{id}' not found, selecting base model");
                BASE_MODEL_ID.to_string()
            }
            Ok(None) => BASE_MODEL_ID.to_string(),
            Err(e) => {
                tracing::warn!("Failed to read stored selection: {e}");
                BASE_MODEL_ID.to_string()
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        tracing::info!(
            "Model registry loaded: {} record(s), selected '{selected_id}'",
            records.len()
        );

        Self {
            records,
            base: ModelRecord::base(),
            selected_id,
            store,
            keys,
            metrics,
            events,
        }
    }

    /// Wrap for sharing across tasks
    #[must_use]
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// All records in creation order
    #[must_use]
    pub fn list(&self) -> &[ModelRecord] {
        &self.records
    }

    /// Currently selected record, falling back to the base record
    #[must_use]
    pub fn selected(&self) -> &ModelRecord {
        self.find(&self.selected_id)
            .or_else(|| self.find(BASE_MODEL_ID))
            .unwrap_or(&self.base)
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<&ModelRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.records.iter().any(|r| r.name == name)
    }

    /// Subscribe to registry changes
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Check a candidate model name, returning it trimmed
    pub fn validate_name(&self, name: &str) -> Result<String, NameError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(NameError::EmptyName);
        }
        if self.contains_name(trimmed) {
            return Err(NameError::DuplicateName(trimmed.to_string()));
        }
        Ok(trimmed.to_string())
    }

    /// Select a record by id. Unknown ids are ignored.
    pub fn select(&mut self, id: &str) {
        if self.find(id).is_none() {
            tracing::debug!("Ignoring selection of unknown model '{id}'");
            return;
        }

        self.selected_id = id.to_string();
        self.persist();
        tracing::info!("Selected model '{id}'");
        self.events
            .send(RegistryEvent::Selected { id: id.to_string() })
            .ok();
    }

    /// Create a record, append it and make it the selection
    pub fn create(
        &mut self,
        name: &str,
        hyperparameters: Hyperparameters,
    ) -> Result<ModelRecord, NameError> {
        let name = self.validate_name(name)?;
        let record = ModelRecord::trained(name, hyperparameters, self.metrics.generate());

        self.records.push(record.clone());
        self.selected_id = record.id.clone();
        self.persist();

        tracing::info!("Created model '{}' ({})", record.name, record.id);
        self.events.send(RegistryEvent::Created(record.clone())).ok();

        Ok(record)
    }

    /// Delete a record. The base record is never removed.
    pub fn delete(&mut self, id: &str) {
        if id == BASE_MODEL_ID {
            tracing::debug!("Refusing to delete the base model");
            return;
        }

        let before_len = self.records.len();
        self.records.retain(|r| r.id != id);
        let removed = self.records.len() != before_len;

        let selection_reset = self.selected_id == id;
        if selection_reset {
            self.selected_id = BASE_MODEL_ID.to_string();
        }

        self.persist();

        if removed {
            tracing::info!("Deleted model '{id}'");
            self.events
                .send(RegistryEvent::Deleted {
                    id: id.to_string(),
                    selection_reset,
                })
                .ok();
        }
    }

    /// Write the full record set and selection. Failures are logged only.
    fn persist(&mut self) {
        let records = match serde_json::to_string(&self.records) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize model records: {e}");
                return;
            }
        };

        if let Err(e) = self.store.set(&self.keys.records, &records) {
            tracing::warn!("Failed to persist model records: {e}");
        }
        if let Err(e) = self.store.set(&self.keys.selected, &self.selected_id) {
            tracing::warn!("Failed to persist selected model: {e}");
        }
    }
}

fn load_records(store: &dyn KeyValueStore, key: &str) -> Vec<ModelRecord> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return vec![ModelRecord::base()],
        Err(e) => {
            tracing::warn!("Failed to read stored models, starting fresh: {e}");
            return vec![ModelRecord::base()];
        }
    };

    let stored: Vec<ModelRecord> = match serde_json::from_str(&raw) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!("Failed to parse stored models, starting fresh: {e}");
            return vec![ModelRecord::base()];
        }
    };

    // First occurrence wins for both ids and names
    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    let mut records: Vec<ModelRecord> = stored
        .into_iter()
        .filter(|r| {
            let keep = !ids.contains(&r.id) && !names.contains(&r.name);
            if keep {
                ids.insert(r.id.clone());
                names.insert(r.name.clone());
            } else {
                tracing::warn!("Dropping duplicate stored model '{}' ({})", r.name, r.id);
            }
            keep
        })
        .collect();

    if !records.iter().any(ModelRecord::is_base) {
        tracing::warn!("Stored models are missing the base model, restoring it");
        records.insert(0, ModelRecord::base());
    }

    records
}
