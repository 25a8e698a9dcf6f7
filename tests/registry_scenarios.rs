use exodetect::registry::{
    FileStore, Hyperparameters, KeyValueStore, MetricsSource, ModelRegistry, StorageKeys,
    BASE_MODEL_ID,
};
use exodetect::NameError;
use std::path::Path;
use tempfile::TempDir;

fn alpha_params() -> Hyperparameters {
    Hyperparameters {
        learning_rate: 0.05,
        estimators: 200,
        max_depth: 6,
        subsample: 0.9,
        regularization: 0.2,
    }
}

fn open(dir: &Path) -> ModelRegistry {
    ModelRegistry::load(
        Box::new(FileStore::new(dir)),
        StorageKeys::default(),
        MetricsSource::Random,
    )
}

#[test]
fn test_create_alpha_from_fresh_store() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = open(temp_dir.path());
    assert_eq!(registry.list().len(), 1);
    assert_eq!(registry.list()[0].id, BASE_MODEL_ID);

    registry.create("Alpha", alpha_params()).unwrap();

    assert_eq!(registry.list().len(), 2);
    assert_eq!(registry.list()[1].name, "Alpha");
    assert_eq!(registry.selected().name, "Alpha");
}

#[test]
fn test_duplicate_alpha_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = open(temp_dir.path());
    registry.create("Alpha", alpha_params()).unwrap();

    let err = registry.create("Alpha", alpha_params()).unwrap_err();

    assert_eq!(err, NameError::DuplicateName("Alpha".to_string()));
    assert_eq!(registry.list().len(), 2);
}

#[test]
fn test_delete_base_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = open(temp_dir.path());
    let alpha = registry.create("Alpha", alpha_params()).unwrap();

    registry.delete(BASE_MODEL_ID);

    assert_eq!(registry.list().len(), 2);
    assert_eq!(registry.selected().id, alpha.id);
}

#[test]
fn test_deleting_selected_beta_selects_base() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = open(temp_dir.path());
    registry.create("Alpha", alpha_params()).unwrap();
    let beta = registry.create("Beta", alpha_params()).unwrap();
    registry.select(&beta.id);

    registry.delete(&beta.id);

    assert_eq!(registry.selected().id, BASE_MODEL_ID);
}

#[test]
fn test_state_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let (records, selected) = {
        let mut registry = open(temp_dir.path());
        let alpha = registry.create("Alpha", alpha_params()).unwrap();
        registry.create("Beta", Hyperparameters::default()).unwrap();
        registry.select(&alpha.id);
        (registry.list().to_vec(), alpha.id)
    };

    let registry = open(temp_dir.path());

    assert_eq!(registry.list(), records.as_slice());
    assert_eq!(registry.selected().id, selected);
}

#[test]
fn test_unreadable_store_starts_fresh() {
    let temp_dir = TempDir::new().unwrap();
    let keys = StorageKeys::default();
    let mut store = FileStore::new(temp_dir.path());
    store.set(&keys.records, "[{\"id\": 7}]").unwrap();
    store.set(&keys.selected, "model-gone").unwrap();

    let mut registry = open(temp_dir.path());
    assert_eq!(registry.list().len(), 1);
    assert_eq!(registry.selected().id, BASE_MODEL_ID);

    // The next mutation overwrites the corrupt payload
    registry.select(BASE_MODEL_ID);
    let raw = store.get(&keys.records).unwrap().unwrap();
    assert!(raw.contains("\"base-model\""));
}

#[test]
fn test_names_stay_unique_across_many_creates() {
    let temp_dir = TempDir::new().unwrap();
    let mut registry = open(temp_dir.path());
    let names = ["A", "B", "A", " B ", "C", "Base Model", "c", ""];

    for name in names {
        let _ = registry.create(name, Hyperparameters::default());
    }

    let mut seen: Vec<&str> = registry.list().iter().map(|r| r.name.as_str()).collect();
    let total = seen.len();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), total);
    assert_eq!(total, 5);
}
