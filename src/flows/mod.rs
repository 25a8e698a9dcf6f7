//! Simulated detection and training flows
//!
//! Both are small state machines with at most one delayed task in flight.
//! Neither runs real inference or training.

pub mod detection;
pub mod training;

pub use detection::{
    Classifier, DetectionFlow, DetectionState, Outcome, PlaceholderClassifier, TransitForm,
    TransitParameters,
};
pub use training::{TrainingFlow, TrainingMode, TrainingState, TrainingStatus};
