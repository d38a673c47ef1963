//! End-to-end tests of the panel controller driven through the commands,
//! with a scripted kernel and a headless webview host.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use grid_protocol::{CellValue, WebviewMessage};
use gridview::commands::{Command, Extension, VariableDescriptor, SHOW_DATA_GRID};
use gridview::headless::{HeadlessHost, HeadlessWebview};
use gridview::kernel::{
    Kernel, KernelResolver, NotebookRef, OutputChunk, Script, ScriptedKernel, StaticResolver,
};
use gridview::panel::{PanelContext, PanelId, RenderOutcome};
use gridview::settings::GridSettings;
use gridview::{KernelError, PanelError};
use serde_json::json;
use tempfile::TempDir;

const INFO: &str = r#"{"columns": ["name", "age", "city"], "rowCount": 2}"#;
const ROWS: &str = r#"{"data": [["ada", 36, "London"], ["alan", 41, "Wilmslow"]]}"#;

struct Harness {
    extension: Extension,
    host: Arc<HeadlessHost>,
    root: TempDir,
}

fn harness(resolver: Arc<dyn KernelResolver>) -> Harness {
    let root = TempDir::new().unwrap();
    let host = Arc::new(HeadlessHost::new(100));
    let ctx = PanelContext {
        settings: GridSettings::default(),
        root: root.path().to_path_buf(),
        resolver,
        host: host.clone(),
        dump: None,
    };
    let extension = Extension::activate(ctx);
    extension.set_active_notebook(Some(NotebookRef::new("notebook.ipynb")));
    Harness {
        extension,
        host,
        root,
    }
}

fn show(name: &str) -> Command {
    Command::ShowDataGrid(VariableDescriptor {
        name: name.to_string(),
        kind: None,
        file_uri: None,
    })
}

async fn open(h: &Harness, command: Command) -> HeadlessWebview {
    let outcome = h.extension.run(command).await;
    assert!(matches!(outcome, RenderOutcome::Created(_)));
    let mut webview = h.host.take(outcome.id()).expect("panel opened");
    assert!(webview.connect().await);
    webview
}

#[tokio::test]
async fn test_grid_matches_dataset_dimensions() {
    let kernel = Arc::new(ScriptedKernel::with_stdout([INFO, ROWS]));
    let h = harness(Arc::new(StaticResolver::new(kernel.clone())));

    let webview = open(&h, show("people")).await;
    let grid = webview.grid();

    assert_eq!(grid.column_count(), 3);
    assert_eq!(grid.row_count(), 2);
    assert_eq!(grid.columns()[2].title, "city");
    assert_eq!(grid.cell(1, 1), CellValue::from(41));
    assert!(grid.error().is_none());
    assert_eq!(webview.title, "Data Grid: people");
    assert_eq!(kernel.executed().len(), 2);
}

#[tokio::test]
async fn test_second_request_reveals_existing_panel() {
    let kernel = Arc::new(ScriptedKernel::with_stdout([INFO, ROWS]));
    let h = harness(Arc::new(StaticResolver::new(kernel.clone())));

    let _webview = open(&h, show("people")).await;
    let outcome = h.extension.run(show("people")).await;

    assert_eq!(outcome, RenderOutcome::Revealed(PanelId::data_grid()));
    assert_eq!(h.host.reveals(), vec![PanelId::data_grid()]);
    assert_eq!(h.host.pending(), 0);
    assert_eq!(h.extension.live_panels().await, 1);
    // No second fetch for a revealed panel
    assert_eq!(kernel.executed().len(), 2);
}

#[tokio::test]
async fn test_concurrent_requests_create_one_panel() {
    let kernel = Arc::new(ScriptedKernel::with_stdout([INFO, ROWS]));
    let h = harness(Arc::new(StaticResolver::new(kernel)));

    let (a, b) = tokio::join!(h.extension.run(show("people")), h.extension.run(show("people")));
    let created = [&a, &b]
        .iter()
        .filter(|o| matches!(o, RenderOutcome::Created(_)))
        .count();

    assert_eq!(created, 1);
    assert_eq!(h.host.pending(), 1);
}

#[tokio::test]
async fn test_refresh_pushes_full_dataset_again() {
    let kernel = Arc::new(ScriptedKernel::with_stdout([INFO, ROWS]));
    let h = harness(Arc::new(StaticResolver::new(kernel)));

    let mut webview = open(&h, show("people")).await;
    assert!(webview.refresh().await);

    assert_eq!(webview.grid().row_count(), 2);
    assert_eq!(webview.grid().invalidations(), 2);
}

#[tokio::test]
async fn test_closed_webview_is_replaced_on_next_request() {
    let kernel = Arc::new(ScriptedKernel::with_stdout([INFO, ROWS, INFO, ROWS]));
    let h = harness(Arc::new(StaticResolver::new(kernel.clone())));

    let webview = open(&h, show("people")).await;
    drop(webview);
    // Let the listener observe the closed bridge
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut webview = open(&h, show("people")).await;
    assert!(h.host.reveals().is_empty());
    assert_eq!(h.extension.live_panels().await, 1);
    assert_eq!(kernel.executed().len(), 4);
    assert_eq!(webview.grid().row_count(), 2);
    assert!(webview.refresh().await);
}

#[tokio::test]
async fn test_disposed_panel_stops_handling_messages() {
    let kernel = Arc::new(ScriptedKernel::with_stdout([INFO, ROWS, INFO, ROWS]));
    let h = harness(Arc::new(StaticResolver::new(kernel)));

    let mut webview = open(&h, show("people")).await;
    assert!(h.extension.dispose_panel(&PanelId::data_grid()).await);
    assert_eq!(h.extension.live_panels().await, 0);

    let answered = tokio::time::timeout(Duration::from_secs(2), webview.connect())
        .await
        .expect("listener released");
    assert!(!answered);
    assert!(!webview.endpoint().post(&WebviewMessage::Connected));

    // A later request builds a fresh panel
    let outcome = h.extension.run(show("people")).await;
    assert!(matches!(outcome, RenderOutcome::Created(_)));
}

#[tokio::test]
async fn test_no_kernel_falls_back_to_empty_grid() {
    let h = harness(Arc::new(StaticResolver::empty()));

    let webview = open(&h, show("people")).await;

    assert_eq!(webview.grid().column_count(), 0);
    assert_eq!(webview.grid().row_count(), 0);
    assert!(webview.grid().error().unwrap().contains("No kernel"));
}

#[tokio::test]
async fn test_no_active_notebook_shows_empty_grid_without_error() {
    let kernel = Arc::new(ScriptedKernel::default());
    let h = harness(Arc::new(StaticResolver::new(kernel.clone())));
    h.extension.set_active_notebook(None);

    let webview = open(&h, show("people")).await;

    assert_eq!(webview.grid().column_count(), 0);
    assert!(webview.grid().error().is_none());
    assert!(kernel.executed().is_empty());
}

#[tokio::test]
async fn test_kernel_error_surfaces_in_grid() {
    let kernel = Arc::new(ScriptedKernel::new([Script::Output(vec![OutputChunk::error(
        "NameError: name 'people' is not defined",
    )])]));
    let h = harness(Arc::new(StaticResolver::new(kernel.clone())));

    let webview = open(&h, show("people")).await;

    assert_eq!(webview.grid().row_count(), 0);
    assert!(webview.grid().error().unwrap().contains("NameError"));
    assert_eq!(kernel.executed().len(), 1);
}

#[tokio::test]
async fn test_hello_world_opens_empty_grid() {
    let kernel = Arc::new(ScriptedKernel::default());
    let h = harness(Arc::new(StaticResolver::new(kernel.clone())));

    let webview = open(&h, Command::ShowHelloWorld).await;

    assert_eq!(webview.title, "Data Grid");
    assert_eq!(webview.grid().column_count(), 0);
    assert!(kernel.executed().is_empty());
}

#[tokio::test]
async fn test_execute_command_by_id() {
    let kernel = Arc::new(ScriptedKernel::with_stdout([INFO, ROWS]));
    let h = harness(Arc::new(StaticResolver::new(kernel)));

    assert_eq!(
        h.extension.registered_commands(),
        &["showHelloWorld", "showDataGrid"]
    );
    let outcome = h
        .extension
        .execute_command(SHOW_DATA_GRID, json!({"name": "people", "type": "DataFrame"}))
        .await
        .unwrap();
    assert!(matches!(outcome, RenderOutcome::Created(_)));

    let err = h
        .extension
        .execute_command("showNothing", json!(null))
        .await
        .unwrap_err();
    assert!(matches!(err, PanelError::UnknownCommand(_)));
}

/// Records which notebooks were resolved.
struct RecordingResolver {
    kernel: Arc<dyn Kernel>,
    seen: Mutex<Vec<NotebookRef>>,
}

impl KernelResolver for RecordingResolver {
    fn resolve<'a>(
        &'a self,
        notebook: &'a NotebookRef,
    ) -> BoxFuture<'a, Result<Arc<dyn Kernel>, KernelError>> {
        self.seen.lock().unwrap().push(notebook.clone());
        let kernel = self.kernel.clone();
        Box::pin(async move { Ok(kernel) })
    }
}

#[tokio::test]
async fn test_variable_file_uri_selects_notebook() {
    let resolver = Arc::new(RecordingResolver {
        kernel: Arc::new(ScriptedKernel::with_stdout([INFO, ROWS])),
        seen: Mutex::new(Vec::new()),
    });
    let h = harness(resolver.clone());

    let command = Command::ShowDataGrid(VariableDescriptor {
        name: "people".to_string(),
        kind: None,
        file_uri: Some("/runtime/kernel-abc.json".to_string()),
    });
    let _webview = open(&h, command).await;

    assert_eq!(
        *resolver.seen.lock().unwrap(),
        vec![NotebookRef::new("/runtime/kernel-abc.json")]
    );
}

#[tokio::test]
async fn test_template_under_root_is_used() {
    let kernel = Arc::new(ScriptedKernel::with_stdout([INFO, ROWS]));
    let h = harness(Arc::new(StaticResolver::new(kernel.clone())));
    let helper: PathBuf = h.root.path().join("python").join("dataframe_helper.py");
    std::fs::create_dir_all(helper.parent().unwrap()).unwrap();
    std::fs::write(&helper, "# custom helper").unwrap();

    let _webview = open(&h, show("people")).await;

    assert!(kernel.executed()[0].starts_with("# custom helper"));
}
