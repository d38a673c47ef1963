//! Jupyter kernels reached through a connection file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc;
use futures::future::BoxFuture;
use jupyter_protocol::{
    ConnectionInfo, ExecuteRequest, ExecutionState, JupyterMessage, JupyterMessageContent,
    MediaType, Status, Stdio,
};
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use super::{
    Kernel, KernelResolver, NotebookRef, OutputChunk, OutputStream, ERROR_MIME, JSON_MIME,
    PLAIN_MIME, STDERR_MIME, STDOUT_MIME,
};
use crate::error::KernelError;

fn connection_error(e: impl std::fmt::Display) -> KernelError {
    KernelError::Connection(anyhow::anyhow!("{}", e))
}

/// A kernel described by a Jupyter connection file.
///
/// Every execution opens its own shell and iopub sockets, so concurrent
/// callers never read each other's replies.
pub struct JupyterKernel {
    connection_info: ConnectionInfo,
    session_id: String,
    label: String,
}

impl JupyterKernel {
    /// Read `connection_file` and verify the kernel answers a heartbeat.
    pub async fn connect(
        connection_file: &Path,
        heartbeat_timeout: Duration,
    ) -> Result<Self, KernelError> {
        let content = tokio::fs::read_to_string(connection_file)
            .await
            .map_err(|e| {
                KernelError::Unavailable(format!("{} ({})", connection_file.display(), e))
            })?;
        let connection_info =
            serde_json::from_str::<ConnectionInfo>(&content).map_err(connection_error)?;

        // ZeroMQ connections don't fail fast, so check the heartbeat before handing out a handle
        if !check_kernel_heartbeat(&connection_info, heartbeat_timeout).await {
            return Err(KernelError::Unresponsive);
        }

        let label = connection_file
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("kernel")
            .to_string();
        info!("Connected to kernel {}", label);

        Ok(JupyterKernel {
            connection_info,
            session_id: format!("gridview-{}", uuid::Uuid::new_v4()),
            label,
        })
    }
}

impl Kernel for JupyterKernel {
    fn label(&self) -> &str {
        &self.label
    }

    fn execute(&self, code: String, cancel: CancellationToken) -> OutputStream {
        let (tx, rx) = mpsc::unbounded();
        let connection_info = self.connection_info.clone();
        let session_id = self.session_id.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => Err(KernelError::Cancelled),
                result = execute_on_kernel(&connection_info, &session_id, code, &tx) => result,
            };
            if let Err(e) = result {
                let _ = tx.unbounded_send(Err(e));
            }
        });

        rx
    }
}

/// Send one execute_request and forward its iopub output until the kernel is idle.
async fn execute_on_kernel(
    connection_info: &ConnectionInfo,
    session_id: &str,
    code: String,
    tx: &mpsc::UnboundedSender<Result<OutputChunk, KernelError>>,
) -> Result<(), KernelError> {
    let mut iopub = runtimelib::create_client_iopub_connection(connection_info, "", session_id)
        .await
        .map_err(connection_error)?;

    let identity = runtimelib::peer_identity_for_session(session_id).map_err(connection_error)?;
    let shell = runtimelib::create_client_shell_connection_with_identity(
        connection_info,
        session_id,
        identity,
    )
    .await
    .map_err(connection_error)?;
    let (mut shell_writer, mut shell_reader) = shell.split();

    let mut request = ExecuteRequest::new(code);
    request.store_history = false;
    let message: JupyterMessage = request.into();
    let message_id = message.header.msg_id.clone();
    shell_writer.send(message).await.map_err(connection_error)?;
    debug!("Sent execute_request {}", message_id);

    // Some kernels reply on shell before streaming output, so only idle
    // on iopub marks the end of the request.
    loop {
        tokio::select! {
            result = iopub.read() => {
                let msg = result.map_err(|e| {
                    error!("iopub read error: {}", e);
                    KernelError::ChannelClosed
                })?;
                let is_ours = msg
                    .parent_header
                    .as_ref()
                    .map(|h| h.msg_id.as_str())
                    == Some(message_id.as_str());
                if !is_ours {
                    continue;
                }
                if let JupyterMessageContent::Status(Status { execution_state }) = &msg.content {
                    if *execution_state == ExecutionState::Idle {
                        return Ok(());
                    }
                    continue;
                }
                if let Some(chunk) = chunk_from_content(&msg.content) {
                    if tx.unbounded_send(Ok(chunk)).is_err() {
                        warn!("Output receiver dropped, abandoning {}", message_id);
                        return Ok(());
                    }
                }
            }
            result = shell_reader.read() => {
                let msg = result.map_err(|e| {
                    error!("shell read error: {}", e);
                    KernelError::ChannelClosed
                })?;
                debug!("shell reply: type={}", msg.header.msg_type);
            }
        }
    }
}

/// Map an iopub message to the chunk it contributes, if any.
pub(crate) fn chunk_from_content(content: &JupyterMessageContent) -> Option<OutputChunk> {
    match content {
        JupyterMessageContent::StreamContent(stream) => {
            let mime = match stream.name {
                Stdio::Stdout => STDOUT_MIME,
                Stdio::Stderr => STDERR_MIME,
            };
            Some(OutputChunk::new(mime, stream.text.clone()))
        }
        JupyterMessageContent::ExecuteResult(result) => media_text(&result.data.content),
        JupyterMessageContent::DisplayData(data) => media_text(&data.data.content),
        JupyterMessageContent::ErrorOutput(error) => Some(OutputChunk::new(
            ERROR_MIME,
            format!("{}: {}", error.ename, error.evalue),
        )),
        _ => None,
    }
}

/// Prefer the `text/plain` representation and fall back to `application/json`.
fn media_text(content: &[MediaType]) -> Option<OutputChunk> {
    let plain = content.iter().find_map(|media| match media {
        MediaType::Plain(text) => Some(OutputChunk::new(PLAIN_MIME, text.clone())),
        _ => None,
    });
    plain.or_else(|| {
        content.iter().find_map(|media| match media {
            MediaType::Json(value) => match serde_json::to_string(value) {
                Ok(text) => Some(OutputChunk::new(JSON_MIME, text)),
                Err(e) => {
                    warn!("Dropping unserializable json output: {}", e);
                    None
                }
            },
            _ => None,
        })
    })
}

/// Check if a kernel is alive by sending a heartbeat ping.
///
/// Returns true if the kernel responds within the timeout, false otherwise.
async fn check_kernel_heartbeat(connection_info: &ConnectionInfo, timeout: Duration) -> bool {
    let heartbeat_result = tokio::time::timeout(timeout, async {
        let mut hb = runtimelib::create_client_heartbeat_connection(connection_info).await?;
        hb.single_heartbeat().await
    })
    .await;

    matches!(heartbeat_result, Ok(Ok(())))
}

/// Resolves notebooks whose URI is the path of a kernel connection file.
///
/// Connected kernels are cached per notebook.
pub struct ConnectionFileResolver {
    heartbeat_timeout: Duration,
    kernels: Mutex<HashMap<NotebookRef, Arc<JupyterKernel>>>,
}

impl ConnectionFileResolver {
    pub fn new(heartbeat_timeout: Duration) -> Self {
        ConnectionFileResolver {
            heartbeat_timeout,
            kernels: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, notebook: &NotebookRef) -> Option<Arc<JupyterKernel>> {
        self.kernels.lock().ok()?.get(notebook).cloned()
    }
}

impl KernelResolver for ConnectionFileResolver {
    fn resolve<'a>(
        &'a self,
        notebook: &'a NotebookRef,
    ) -> BoxFuture<'a, Result<Arc<dyn Kernel>, KernelError>> {
        Box::pin(async move {
            if let Some(kernel) = self.cached(notebook) {
                return Ok(kernel as Arc<dyn Kernel>);
            }
            let path = PathBuf::from(&notebook.uri);
            let kernel = Arc::new(JupyterKernel::connect(&path, self.heartbeat_timeout).await?);
            if let Ok(mut kernels) = self.kernels.lock() {
                kernels.insert(notebook.clone(), kernel.clone());
            }
            Ok(kernel as Arc<dyn Kernel>)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jupyter_protocol::{ErrorOutput, StreamContent};

    #[test]
    fn test_stream_chunks_keep_their_channel() {
        let out = JupyterMessageContent::StreamContent(StreamContent {
            name: Stdio::Stdout,
            text: "hello".to_string(),
        });
        assert_eq!(chunk_from_content(&out), Some(OutputChunk::stdout("hello")));

        let err = JupyterMessageContent::StreamContent(StreamContent {
            name: Stdio::Stderr,
            text: "warn".to_string(),
        });
        let chunk = chunk_from_content(&err).unwrap();
        assert_eq!(chunk.mime, STDERR_MIME);
        assert!(!chunk.is_error());
    }

    #[test]
    fn test_error_output_uses_error_mime() {
        let content = JupyterMessageContent::ErrorOutput(ErrorOutput {
            ename: "NameError".to_string(),
            evalue: "name 'df' is not defined".to_string(),
            traceback: vec![],
        });
        let chunk = chunk_from_content(&content).unwrap();
        assert!(chunk.is_error());
        assert_eq!(chunk.text, "NameError: name 'df' is not defined");
    }

    #[test]
    fn test_json_only_result_is_kept() {
        let data = vec![MediaType::Json(
            serde_json::from_value(serde_json::json!({"columns": ["a"], "rowCount": 3})).unwrap(),
        )];
        let chunk = media_text(&data).unwrap();
        assert_eq!(chunk.mime, JSON_MIME);
        let value: serde_json::Value = serde_json::from_str(&chunk.text).unwrap();
        assert_eq!(value["rowCount"], 3);
    }

    #[test]
    fn test_plain_text_wins_over_json() {
        let data = vec![
            MediaType::Json(serde_json::from_value(serde_json::json!({"x": 1})).unwrap()),
            MediaType::Plain("{'x': 1}".to_string()),
        ];
        assert_eq!(media_text(&data), Some(OutputChunk::new(PLAIN_MIME, "{'x': 1}")));
    }

    #[test]
    fn test_media_without_text_contributes_nothing() {
        assert!(media_text(&[MediaType::Html("<b>x</b>".to_string())]).is_none());
    }

    #[test]
    fn test_status_contributes_nothing() {
        let content = JupyterMessageContent::Status(Status {
            execution_state: ExecutionState::Busy,
        });
        assert!(chunk_from_content(&content).is_none());
    }

    #[tokio::test]
    async fn test_missing_connection_file_is_unavailable() {
        let dir = tempfile::TempDir::new().unwrap();
        let notebook = NotebookRef::new(dir.path().join("kernel-x.json").display().to_string());
        let resolver = ConnectionFileResolver::new(Duration::from_millis(100));
        assert!(matches!(
            resolver.resolve(&notebook).await,
            Err(KernelError::Unavailable(_))
        ));
    }
}
