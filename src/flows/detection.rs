use crate::error::{ExoError, Result};
use crate::notifications::NotificationManager;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Detection result category
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exoplanet,
    Candidate,
    FalsePositive,
}

impl Outcome {
    pub const ALL: [Self; 3] = [Self::Exoplanet, Self::Candidate, Self::FalsePositive];

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Exoplanet => "Exoplanet Detected",
            Self::Candidate => "Planetary Candidate",
            Self::FalsePositive => "False Positive",
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Exoplanet => "High confidence detection. The transit signature matches known exoplanet characteristics.",
            Self::Candidate => "Moderate confidence. Further observation recommended to confirm exoplanet status.",
            Self::FalsePositive => "Low confidence. The signal is likely caused by stellar activity or instrumental noise.",
        }
    }
}

/// Raw detection form input, one text field per parameter
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitForm {
    pub orbital_period: String,
    pub transit_duration: String,
    pub planetary_radius: String,
    pub transit_depth: String,
    pub stellar_flux: String,
}

/// Parsed transit observation
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TransitParameters {
    /// Days
    pub orbital_period: f64,
    /// Hours
    pub transit_duration: f64,
    /// Earth radii
    pub planetary_radius: f64,
    /// Parts per million
    pub transit_depth: f64,
    /// Relative to Earth
    pub stellar_flux: f64,
}

impl TransitParameters {
    /// Parse a form. Every field is required and must be a finite number.
    pub fn parse(form: &TransitForm) -> Result<Self> {
        Ok(Self {
            orbital_period: parse_field("orbital period", &form.orbital_period)?,
            transit_duration: parse_field("transit duration", &form.transit_duration)?,
            planetary_radius: parse_field("planetary radius", &form.planetary_radius)?,
            transit_depth: parse_field("transit depth", &form.transit_depth)?,
            stellar_flux: parse_field("stellar flux", &form.stellar_flux)?,
        })
    }
}

fn parse_field(field: &str, raw: &str) -> Result<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ExoError::InvalidInput(format!("{field} is required")));
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ExoError::InvalidInput(format!(
            "{field} must be a number, got '{raw}'"
        ))),
    }
}

/// Detection flow state
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum DetectionState {
    Idle,
    Pending(TransitParameters),
    ResultReady {
        parameters: TransitParameters,
        outcome: Outcome,
    },
}

/// Unified interface for detection classifiers
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a transit observation
    async fn classify(&self, parameters: &TransitParameters) -> Result<Outcome>;

    /// Get classifier name for logging/debugging
    fn classifier_name(&self) -> &str;
}

/// Picks an outcome uniformly at random
#[derive(Debug, Default)]
pub struct PlaceholderClassifier;

#[async_trait]
impl Classifier for PlaceholderClassifier {
    async fn classify(&self, _parameters: &TransitParameters) -> Result<Outcome> {
        Outcome::ALL
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or_else(|| ExoError::Flow("no outcomes to choose from".to_string()))
    }

    fn classifier_name(&self) -> &str {
        "placeholder"
    }
}

/// `Idle -> Pending -> ResultReady` state machine with one delayed task
pub struct DetectionFlow {
    delay: Duration,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<NotificationManager>,
    state: Arc<watch::Sender<DetectionState>>,
    generation: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl DetectionFlow {
    #[must_use]
    pub fn new(
        delay: Duration,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<NotificationManager>,
    ) -> Self {
        let (state, _) = watch::channel(DetectionState::Idle);
        Self {
            delay,
            classifier,
            notifier,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> DetectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetectionState> {
        self.state.subscribe()
    }

    /// Validate the form and start a detection run
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&mut self, form: &TransitForm) -> Result<()> {
        if !matches!(*self.state.borrow(), DetectionState::Idle) {
            return Err(ExoError::Flow(
                "A detection is already running or showing a result. Reset it first.".to_string(),
            ));
        }

        let parameters = TransitParameters::parse(form)?;
        let run = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(DetectionState::Pending(parameters));

        tracing::info!(
            "Detection started with {} classifier: {parameters:?}",
            self.classifier.classifier_name()
        );

        let delay = self.delay;
        let classifier = Arc::clone(&self.classifier);
        let notifier = Arc::clone(&self.notifier);
        let state = Arc::clone(&self.state);
        let generation = Arc::clone(&self.generation);

        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let next = match classifier.classify(&parameters).await {
                Ok(outcome) => DetectionState::ResultReady {
                    parameters,
                    outcome,
                },
                Err(e) => {
                    tracing::error!("Detection failed: {e}");
                    DetectionState::Idle
                }
            };

            let applied = state.send_if_modified(|current| {
                if generation.load(Ordering::SeqCst) != run
                    || !matches!(current, DetectionState::Pending(_))
                {
                    return false;
                }
                *current = next.clone();
                true
            });

            if let (true, DetectionState::ResultReady { outcome, .. }) = (applied, &next) {
                notifier.detection_ready(*outcome);
            }
        }));

        Ok(())
    }

    /// Return to `Idle`, cancelling any in-flight run
    pub fn reset(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.state.send_replace(DetectionState::Idle);
    }
}

impl Drop for DetectionFlow {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
