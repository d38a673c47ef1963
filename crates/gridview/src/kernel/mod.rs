//! The kernel collaborator.
//!
//! The viewer only consumes kernels. A [`KernelResolver`] turns the active
//! notebook into a [`Kernel`] handle, and [`Kernel::execute`] yields a stream
//! of mime-typed output chunks that ends when the kernel goes idle.

use std::sync::Arc;

use futures::channel::mpsc;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::KernelError;

mod jupyter;
mod scripted;

pub use jupyter::{ConnectionFileResolver, JupyterKernel};
pub use scripted::{Script, ScriptedKernel, StaticResolver};

/// Mime type marking an output chunk as a kernel error.
pub const ERROR_MIME: &str = "application/vnd.code.notebook.error";
pub const STDOUT_MIME: &str = "application/vnd.code.notebook.stdout";
pub const STDERR_MIME: &str = "application/vnd.code.notebook.stderr";
pub const PLAIN_MIME: &str = "text/plain";
pub const JSON_MIME: &str = "application/json";

/// One piece of output produced by an execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub mime: String,
    pub text: String,
}

impl OutputChunk {
    pub fn new(mime: impl Into<String>, text: impl Into<String>) -> Self {
        OutputChunk {
            mime: mime.into(),
            text: text.into(),
        }
    }

    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(STDOUT_MIME, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(ERROR_MIME, text)
    }

    pub fn is_error(&self) -> bool {
        self.mime == ERROR_MIME
    }
}

/// Output of a single execution. Ends when the kernel is done with the request.
pub type OutputStream = mpsc::UnboundedReceiver<Result<OutputChunk, KernelError>>;

/// A running interpreter that can execute code.
pub trait Kernel: Send + Sync {
    /// Human-readable name, used in logs.
    fn label(&self) -> &str;

    /// Start executing `code`. Cancelling `cancel` abandons the execution and
    /// ends the stream.
    fn execute(&self, code: String, cancel: CancellationToken) -> OutputStream;
}

/// Identity of a notebook whose kernel should be inspected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotebookRef {
    pub uri: String,
}

impl NotebookRef {
    pub fn new(uri: impl Into<String>) -> Self {
        NotebookRef { uri: uri.into() }
    }
}

impl std::fmt::Display for NotebookRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri)
    }
}

/// Resolves the kernel behind a notebook.
pub trait KernelResolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        notebook: &'a NotebookRef,
    ) -> BoxFuture<'a, Result<Arc<dyn Kernel>, KernelError>>;
}
