//! Running code on a kernel and collecting its output.

use std::time::Duration;

use futures::StreamExt;
use log::{debug, error};
use tokio_util::sync::CancellationToken;

use crate::error::{KernelError, PanelError};
use crate::kernel::Kernel;
use crate::schema::{self, Dataset};
use crate::template::CodeTemplate;

/// Everything an execution printed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOutput {
    /// Concatenation of every non-error chunk, in arrival order.
    pub text: String,
    /// Text of every chunk flagged with the error mime type.
    pub errors: Vec<String>,
}

impl ExecutionOutput {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The accumulated text, or the kernel's error if it reported one.
    pub fn into_result(self) -> Result<String, KernelError> {
        if self.errors.is_empty() {
            Ok(self.text)
        } else {
            Err(KernelError::Execution(self.errors.join("\n")))
        }
    }
}

/// Executes payloads one at a time, each under its own cancellation token.
#[derive(Debug, Clone, Default)]
pub struct CodeRunner {
    timeout: Option<Duration>,
}

impl CodeRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        CodeRunner { timeout }
    }

    /// Execute `code` and gather its output until the stream ends.
    ///
    /// Error chunks are logged and kept apart from the text. The token handed
    /// to the kernel is cancelled when this returns, whatever the outcome.
    pub async fn run(
        &self,
        kernel: &dyn Kernel,
        code: String,
    ) -> Result<ExecutionOutput, KernelError> {
        let token = CancellationToken::new();
        let _release = token.clone().drop_guard();

        let mut stream = kernel.execute(code, token);
        let mut output = ExecutionOutput::default();

        let drain = async {
            while let Some(item) = stream.next().await {
                let chunk = item?;
                if chunk.is_error() {
                    error!("Kernel {} reported an error: {}", kernel.label(), chunk.text);
                    output.errors.push(chunk.text);
                } else {
                    output.text.push_str(&chunk.text);
                }
            }
            Ok::<(), KernelError>(())
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, drain)
                .await
                .map_err(|_| KernelError::TimedOut(limit.as_secs()))??,
            None => drain.await?,
        }

        debug!(
            "Execution on {} produced {} bytes, {} errors",
            kernel.label(),
            output.text.len(),
            output.errors.len()
        );
        Ok(output)
    }

    /// Fetch `variable` as a dataset: the schema first, then the rows.
    ///
    /// The two executions are strictly sequential because row parsing needs
    /// the column count.
    pub async fn fetch_dataset(
        &self,
        kernel: &dyn Kernel,
        template: &CodeTemplate,
        variable: &str,
    ) -> Result<Dataset, PanelError> {
        let info_code = template.info_payload(variable)?;
        let info_text = self.run(kernel, info_code).await?.into_result()?;
        let info = schema::parse_info(&info_text)?;

        let rows_code = template.rows_payload(variable, 0, info.row_count)?;
        let rows_text = self.run(kernel, rows_code).await?.into_result()?;
        let rows = schema::parse_rows(&rows_text, info.columns.len())?;

        Ok(Dataset::assemble(info, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{OutputChunk, OutputStream, Script, ScriptedKernel};
    use futures::channel::mpsc;
    use std::sync::Mutex;

    /// Records the token it was handed.
    struct TokenCapture {
        token: Mutex<Option<CancellationToken>>,
        chunks: Vec<OutputChunk>,
    }

    impl Kernel for TokenCapture {
        fn label(&self) -> &str {
            "capture"
        }

        fn execute(&self, _code: String, cancel: CancellationToken) -> OutputStream {
            *self.token.lock().unwrap() = Some(cancel);
            let (tx, rx) = mpsc::unbounded();
            for chunk in &self.chunks {
                tx.unbounded_send(Ok(chunk.clone())).unwrap();
            }
            rx
        }
    }

    #[tokio::test]
    async fn test_accumulates_non_error_chunks() {
        let kernel = ScriptedKernel::new([Script::Output(vec![
            OutputChunk::stdout("{\"a\":"),
            OutputChunk::new("text/plain", " 1}"),
        ])]);
        let output = CodeRunner::default()
            .run(&kernel, "x".to_string())
            .await
            .unwrap();
        assert_eq!(output.text, "{\"a\": 1}");
        assert!(!output.has_errors());
    }

    #[tokio::test]
    async fn test_error_only_output_yields_empty_text() {
        let kernel = ScriptedKernel::new([Script::Output(vec![OutputChunk::error(
            "NameError: df",
        )])]);
        let output = CodeRunner::default()
            .run(&kernel, "x".to_string())
            .await
            .unwrap();
        assert_eq!(output.text, "");
        assert_eq!(output.errors, vec!["NameError: df"]);
        assert!(matches!(
            output.into_result(),
            Err(KernelError::Execution(msg)) if msg == "NameError: df"
        ));
    }

    #[tokio::test]
    async fn test_token_released_after_success() {
        let kernel = TokenCapture {
            token: Mutex::new(None),
            chunks: vec![OutputChunk::stdout("ok")],
        };
        CodeRunner::default()
            .run(&kernel, "x".to_string())
            .await
            .unwrap();
        let token = kernel.token.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_token_released_after_error() {
        let kernel = TokenCapture {
            token: Mutex::new(None),
            chunks: vec![OutputChunk::error("boom")],
        };
        let output = CodeRunner::default()
            .run(&kernel, "x".to_string())
            .await
            .unwrap();
        assert!(output.has_errors());
        let token = kernel.token.lock().unwrap().clone().unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_timeout_cancels_hung_execution() {
        let kernel = ScriptedKernel::new([Script::Hang]);
        let runner = CodeRunner::new(Some(Duration::from_millis(20)));
        let result = runner.run(&kernel, "x".to_string()).await;
        assert!(matches!(result, Err(KernelError::TimedOut(_))));
    }

    #[tokio::test]
    async fn test_fetch_dataset_runs_schema_before_rows() {
        let kernel = ScriptedKernel::with_stdout([
            r#"{"columns": ["a", "b"], "rowCount": 2}"#,
            r#"{"data": [[1, "x"], [2, "y"]]}"#,
        ]);
        let template = CodeTemplate::from_source("HELPER");
        let dataset = CodeRunner::default()
            .fetch_dataset(&kernel, &template, "df")
            .await
            .unwrap();

        assert_eq!(dataset.column_count(), 2);
        assert_eq!(dataset.row_count(), 2);

        let executed = kernel.executed();
        assert_eq!(executed.len(), 2);
        assert!(executed[0].contains("_VSCODE_getDataFrame(\"info\", False, df)"));
        assert!(executed[1].contains("_VSCODE_getDataFrame(\"rows\", False, df, 0, 2)"));
    }

    #[tokio::test]
    async fn test_fetch_dataset_stops_on_kernel_error() {
        let kernel = ScriptedKernel::new([Script::Output(vec![OutputChunk::error(
            "NameError: name 'df' is not defined",
        )])]);
        let template = CodeTemplate::from_source("HELPER");
        let result = CodeRunner::default()
            .fetch_dataset(&kernel, &template, "df")
            .await;
        assert!(matches!(
            result,
            Err(PanelError::Kernel(KernelError::Execution(_)))
        ));
        assert_eq!(kernel.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_dataset_rejects_bad_name_without_executing() {
        let kernel = ScriptedKernel::default();
        let template = CodeTemplate::from_source("HELPER");
        let result = CodeRunner::default()
            .fetch_dataset(&kernel, &template, "df; rm")
            .await;
        assert!(matches!(result, Err(PanelError::Template(_))));
        assert!(kernel.executed().is_empty());
    }
}
