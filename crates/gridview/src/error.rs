//! Error types for the gridview library.

use std::path::PathBuf;

/// Failures while assembling a code payload.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid variable name {0:?}")]
    InvalidVariableName(String),

    #[error("Invalid row range {start}..{end}")]
    InvalidRange { start: usize, end: usize },
}

/// Failures talking to a kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("No kernel available for {0}")]
    Unavailable(String),

    #[error("Failed to connect to kernel: {0}")]
    Connection(#[from] anyhow::Error),

    #[error("Kernel is not responding (heartbeat failed)")]
    Unresponsive,

    #[error("Kernel channel closed before execution finished")]
    ChannelClosed,

    #[error("Execution was cancelled")]
    Cancelled,

    #[error("Execution timed out after {0}s")]
    TimedOut(u64),

    #[error("Kernel reported an error: {0}")]
    Execution(String),
}

/// Failures turning kernel output into a dataset.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Kernel output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Kernel produced no output")]
    Empty,
}

/// Everything that can go wrong while showing a panel.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Unknown command {0:?}")]
    UnknownCommand(String),

    #[error("Invalid arguments for {command}: {source}")]
    InvalidArguments {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}
