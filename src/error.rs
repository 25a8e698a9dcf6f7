use thiserror::Error;

/// Main error type for exodetect
#[derive(Error, Debug)]
pub enum ExoError {
    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/exodetect/config.toml\n- Remove unknown keys or fix value types\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("Storage error: {0}\n\nTroubleshooting:\n- Check that the store directory is writable\n- Override it with storage.dir in config")]
    Storage(String),

    #[error("IPC error: {0}\n\nTroubleshooting:\n- Is the daemon running? Start with: exodetect daemon\n- Check socket path: $XDG_RUNTIME_DIR/exodetect.sock\n- Try restarting the daemon")]
    Ipc(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Flow(String),

    #[error("No dataset selected\n\nChoose one first: exodetect dataset <file.csv>")]
    MissingDataset,

    #[error(transparent)]
    Name(#[from] NameError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Model name validation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Model name is required")]
    EmptyName,

    #[error("A model named '{0}' already exists")]
    DuplicateName(String),
}

pub type Result<T> = std::result::Result<T, ExoError>;
