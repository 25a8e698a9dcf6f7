#![allow(clippy::multiple_crate_versions)]

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use exodetect::app::App;
use exodetect::config::Config;
use exodetect::flows::{DetectionState, TrainingMode, TrainingState, TrainingStatus, TransitForm};
use exodetect::ipc::{client::IpcClient, server::IpcServer, Command, Request, Response};
use exodetect::registry::{Hyperparameters, ModelRecord};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "exodetect")]
#[command(about = "Exoplanet detection demo with a trained-model registry", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/exodetect/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (default)
    Daemon,
    /// Browse and manage trained models
    #[command(subcommand)]
    Models(ModelCommands),
    /// Submit transit parameters for detection
    Detect(DetectArgs),
    /// Clear the detection result
    DetectReset,
    /// Choose the dataset file for training
    Dataset { filename: String },
    /// Train a new model from the chosen dataset
    Train(TrainArgs),
    /// Clear the training result and dataset
    TrainReset,
    /// Show selection, detection and training state
    Status,
    /// Show recent notifications
    Notifications,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// List all models, marking the selected one
    List,
    /// Show the selected model
    Selected,
    /// Select a model by id
    Select { id: String },
    /// Create a model directly, starting from the selected model's hyperparameters
    Create {
        name: String,
        #[command(flatten)]
        hyperparameters: HyperparameterArgs,
    },
    /// Delete a model by id
    Delete { id: String },
}

#[derive(Args)]
struct DetectArgs {
    /// Orbital period (days)
    #[arg(long)]
    orbital_period: String,
    /// Transit duration (hours)
    #[arg(long)]
    transit_duration: String,
    /// Planetary radius (Earth radii)
    #[arg(long)]
    planetary_radius: String,
    /// Transit depth (ppm)
    #[arg(long)]
    transit_depth: String,
    /// Stellar flux (relative to Earth)
    #[arg(long)]
    stellar_flux: String,
    /// Wait for the result
    #[arg(long)]
    wait: bool,
}

#[derive(Args)]
struct TrainArgs {
    name: String,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    #[command(flatten)]
    hyperparameters: HyperparameterArgs,
    /// Wait for training to complete
    #[arg(long)]
    wait: bool,
}

#[derive(Args)]
struct HyperparameterArgs {
    /// Learning rate (0.001 - 0.1)
    #[arg(long)]
    learning_rate: Option<f64>,
    /// Number of estimators (50 - 500)
    #[arg(long)]
    estimators: Option<u32>,
    /// Maximum tree depth (3 - 20)
    #[arg(long)]
    max_depth: Option<u32>,
    /// Subsample fraction (0.5 - 1.0)
    #[arg(long)]
    subsample: Option<f64>,
    /// Regularization strength (0 - 1)
    #[arg(long)]
    regularization: Option<f64>,
}

impl HyperparameterArgs {
    const fn is_empty(&self) -> bool {
        self.learning_rate.is_none()
            && self.estimators.is_none()
            && self.max_depth.is_none()
            && self.subsample.is_none()
            && self.regularization.is_none()
    }

    fn apply(&self, base: Hyperparameters) -> Hyperparameters {
        Hyperparameters {
            learning_rate: self.learning_rate.unwrap_or(base.learning_rate),
            estimators: self.estimators.unwrap_or(base.estimators),
            max_depth: self.max_depth.unwrap_or(base.max_depth),
            subsample: self.subsample.unwrap_or(base.subsample),
            regularization: self.regularization.unwrap_or(base.regularization),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Scratch,
    FineTune,
}

impl From<ModeArg> for TrainingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Scratch => Self::Scratch,
            ModeArg::FineTune => Self::FineTune,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load config")?;

    match cli.command {
        None | Some(Commands::Daemon) => {
            tracing::info!("Starting exodetect daemon");
            run_daemon(config).await
        }
        Some(Commands::Models(cmd)) => run_models(&client(&config)?, cmd).await,
        Some(Commands::Detect(args)) => run_detect(&client(&config)?, args).await,
        Some(Commands::DetectReset) => {
            let client = client(&config)?;
            send(&client, Command::ResetDetection).await?;
            println!("OK");
            Ok(())
        }
        Some(Commands::Dataset { filename }) => {
            let client = client(&config)?;
            if let Response::Training(status) =
                send(&client, Command::ChooseDataset { filename }).await?
            {
                print_training(&status);
            }
            Ok(())
        }
        Some(Commands::Train(args)) => run_train(&client(&config)?, args).await,
        Some(Commands::TrainReset) => {
            let client = client(&config)?;
            send(&client, Command::ResetTraining).await?;
            println!("OK");
            Ok(())
        }
        Some(Commands::Status) => run_status(&client(&config)?).await,
        Some(Commands::Notifications) => {
            let client = client(&config)?;
            if let Response::Notifications(list) = send(&client, Command::Notifications).await? {
                for n in list {
                    println!("[{:?}] {}: {}", n.kind, n.summary, n.body);
                }
            }
            Ok(())
        }
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    let (request_tx, request_rx) = mpsc::channel::<Request>(32);

    // An explicit socket path must not depend on XDG_RUNTIME_DIR
    let server = match &config.ipc.socket_path {
        Some(path) => IpcServer::with_socket_path(request_tx, path.clone()),
        None => IpcServer::new(request_tx)?,
    };

    let app = App::from_config(&config)
        .await
        .context("Failed to open model store")?;

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.start().await {
            tracing::error!("IPC server error: {e}");
        }
    });

    tracing::info!("Daemon started, waiting for commands");

    tokio::select! {
        () = app.run(request_rx) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
        }
    }

    server_handle.abort();
    Ok(())
}

fn client(config: &Config) -> anyhow::Result<IpcClient> {
    Ok(match &config.ipc.socket_path {
        Some(path) => IpcClient::with_socket_path(path.clone()),
        None => IpcClient::new()?,
    })
}

async fn send(client: &IpcClient, cmd: Command) -> anyhow::Result<Response> {
    match client.send_command(cmd).await? {
        Response::Error(e) => bail!("{e}"),
        response => Ok(response),
    }
}

async fn run_models(client: &IpcClient, cmd: ModelCommands) -> anyhow::Result<()> {
    match cmd {
        ModelCommands::List => {
            if let Response::Models {
                records,
                selected_id,
            } = send(client, Command::ListModels).await?
            {
                print_models(&records, &selected_id);
            }
        }
        ModelCommands::Selected => {
            if let Response::Model(record) = send(client, Command::SelectedModel).await? {
                print_model(&record);
            }
        }
        ModelCommands::Select { id } => {
            if let Response::Model(record) =
                send(client, Command::SelectModel { id: id.clone() }).await?
            {
                if record.id != id {
                    eprintln!("No model with id '{id}', selection unchanged");
                }
                println!("✓ Active model is '{}'", record.name);
            }
        }
        ModelCommands::Create {
            name,
            hyperparameters,
        } => {
            let Response::Model(selected) = send(client, Command::SelectedModel).await? else {
                bail!("Unexpected response from daemon");
            };
            let hyperparameters = hyperparameters.apply(selected.hyperparameters);
            if let Response::Model(record) = send(
                client,
                Command::CreateModel {
                    name,
                    hyperparameters,
                },
            )
            .await?
            {
                println!("✓ Created model '{}' ({})", record.name, record.id);
            }
        }
        ModelCommands::Delete { id } => {
            send(client, Command::DeleteModel { id }).await?;
            println!("OK");
        }
    }
    Ok(())
}

async fn run_detect(client: &IpcClient, args: DetectArgs) -> anyhow::Result<()> {
    let form = TransitForm {
        orbital_period: args.orbital_period,
        transit_duration: args.transit_duration,
        planetary_radius: args.planetary_radius,
        transit_depth: args.transit_depth,
        stellar_flux: args.stellar_flux,
    };

    let mut response = send(client, Command::Detect(form)).await?;
    while args.wait && matches!(response, Response::Detection(DetectionState::Pending(_))) {
        tokio::time::sleep(POLL_INTERVAL).await;
        response = send(client, Command::DetectionStatus).await?;
    }

    if let Response::Detection(state) = response {
        print_detection(&state);
    }
    Ok(())
}

async fn run_train(client: &IpcClient, args: TrainArgs) -> anyhow::Result<()> {
    if let Some(mode) = args.mode {
        send(client, Command::SetTrainingMode(mode.into())).await?;
    }

    if !args.hyperparameters.is_empty() {
        let Response::Training(status) = send(client, Command::TrainingStatus).await? else {
            bail!("Unexpected response from daemon");
        };
        let hyperparameters = args.hyperparameters.apply(status.hyperparameters);
        send(client, Command::SetHyperparameters(hyperparameters)).await?;
    }

    let mut response = send(client, Command::Train { name: args.name }).await?;
    while args.wait
        && matches!(
            response,
            Response::Training(TrainingStatus {
                state: TrainingState::Pending { .. },
                ..
            })
        )
    {
        tokio::time::sleep(POLL_INTERVAL).await;
        response = send(client, Command::TrainingStatus).await?;
    }

    if let Response::Training(status) = response {
        print_training(&status);
    }
    Ok(())
}

async fn run_status(client: &IpcClient) -> anyhow::Result<()> {
    if let Response::Model(record) = send(client, Command::SelectedModel).await? {
        print_model(&record);
    }
    if let Response::Detection(state) = send(client, Command::DetectionStatus).await? {
        print_detection(&state);
    }
    if let Response::Training(status) = send(client, Command::TrainingStatus).await? {
        print_training(&status);
    }
    Ok(())
}

fn print_models(records: &[ModelRecord], selected_id: &str) {
    println!(
        "  {:<38} {:<24} {:>9} {:>9} {:>7}  CREATED",
        "ID", "NAME", "ACCURACY", "PRECISION", "RECALL"
    );
    for record in records {
        let marker = if record.id == selected_id { "*" } else { " " };
        println!(
            "{marker} {:<38} {:<24} {:>8.1}% {:>8.1}% {:>6.1}%  {}",
            record.id,
            record.name,
            record.accuracy,
            record.precision,
            record.recall,
            record.created_at.format("%b %-d, %Y")
        );
    }
}

fn print_model(record: &ModelRecord) {
    let h = &record.hyperparameters;
    println!("Selected model: {} ({})", record.name, record.id);
    println!(
        "  {:?}  accuracy {:.1}%  precision {:.1}%  recall {:.1}%",
        record.kind, record.accuracy, record.precision, record.recall
    );
    println!(
        "  learning_rate={} estimators={} max_depth={} subsample={} regularization={}",
        h.learning_rate, h.estimators, h.max_depth, h.subsample, h.regularization
    );
}

fn print_detection(state: &DetectionState) {
    match state {
        DetectionState::Idle => println!("Detection: idle"),
        DetectionState::Pending(_) => println!("Detection: analyzing transit data..."),
        DetectionState::ResultReady { outcome, .. } => {
            println!("Detection: {}", outcome.title());
            println!("  {}", outcome.description());
        }
    }
}

fn print_training(status: &TrainingStatus) {
    let dataset = status.dataset.as_deref().unwrap_or("<none>");
    match &status.state {
        TrainingState::Idle => println!("Training: idle (dataset: {dataset}, mode: {:?})", status.mode),
        TrainingState::Pending { name, mode } => {
            println!("Training: '{name}' in progress ({mode:?}, dataset: {dataset})");
        }
        TrainingState::Complete(record) => {
            println!(
                "Training: complete, '{}' added to the library ({:.1}% accuracy)",
                record.name, record.accuracy
            );
        }
    }
}
