//! In-process kernels with canned output, for tests and demos.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::channel::mpsc;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::{Kernel, KernelResolver, NotebookRef, OutputChunk, OutputStream};
use crate::error::KernelError;

/// What a [`ScriptedKernel`] does for one execution.
#[derive(Debug, Clone)]
pub enum Script {
    /// Emit these chunks, then finish.
    Output(Vec<OutputChunk>),
    /// Never finish until cancelled.
    Hang,
}

/// A kernel that replays scripted responses in order.
///
/// Executions beyond the end of the script produce no output.
#[derive(Default)]
pub struct ScriptedKernel {
    scripts: Mutex<VecDeque<Script>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedKernel {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        ScriptedKernel {
            scripts: Mutex::new(scripts.into_iter().collect()),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for scripts that only print to stdout.
    pub fn with_stdout<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            outputs
                .into_iter()
                .map(|text| Script::Output(vec![OutputChunk::stdout(text)])),
        )
    }

    /// Code received so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }
}

impl Kernel for ScriptedKernel {
    fn label(&self) -> &str {
        "scripted"
    }

    fn execute(&self, code: String, cancel: CancellationToken) -> OutputStream {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(code);
        }
        let script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.pop_front())
            .unwrap_or(Script::Output(Vec::new()));

        let (tx, rx) = mpsc::unbounded();
        match script {
            Script::Output(chunks) => {
                for chunk in chunks {
                    let _ = tx.unbounded_send(Ok(chunk));
                }
            }
            Script::Hang => {
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    let _ = tx.unbounded_send(Err(KernelError::Cancelled));
                });
            }
        }
        rx
    }
}

/// Resolves every notebook to the same kernel, or to none.
pub struct StaticResolver {
    kernel: Option<Arc<dyn Kernel>>,
}

impl StaticResolver {
    pub fn new(kernel: Arc<dyn Kernel>) -> Self {
        StaticResolver {
            kernel: Some(kernel),
        }
    }

    pub fn empty() -> Self {
        StaticResolver { kernel: None }
    }
}

impl KernelResolver for StaticResolver {
    fn resolve<'a>(
        &'a self,
        notebook: &'a NotebookRef,
    ) -> BoxFuture<'a, Result<Arc<dyn Kernel>, KernelError>> {
        Box::pin(async move {
            self.kernel
                .clone()
                .ok_or_else(|| KernelError::Unavailable(notebook.to_string()))
        })
    }
}
