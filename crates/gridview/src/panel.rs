//! Panel lifecycle: creation, single-instance reuse, and disposal.
//!
//! A panel is created by fetching the requested variable (schema, then
//! rows) and only afterwards handing the finished page to the
//! [`WebviewHost`]. From then on a listener task answers every `connected`
//! and `refresh` from the webview with the full dataset.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use grid_protocol::{GridPayload, HostMessage, WebviewMessage};
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;

use crate::bridge::{self, HostEndpoint, WebviewEndpoint};
use crate::dump::MessageDump;
use crate::error::{KernelError, PanelError};
use crate::html;
use crate::kernel::{KernelResolver, NotebookRef};
use crate::runner::CodeRunner;
use crate::schema::Dataset;
use crate::settings::GridSettings;
use crate::template::CodeTemplate;

/// View type of the data grid. There is at most one live panel per view type.
pub const DATA_GRID_VIEW: &str = "showDataGrid";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PanelId(String);

impl PanelId {
    pub fn new(id: impl Into<String>) -> Self {
        PanelId(id.into())
    }

    pub fn data_grid() -> Self {
        Self::new(DATA_GRID_VIEW)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PanelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What [`PanelRegistry::render`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Created(PanelId),
    Revealed(PanelId),
}

impl RenderOutcome {
    pub fn id(&self) -> &PanelId {
        match self {
            RenderOutcome::Created(id) | RenderOutcome::Revealed(id) => id,
        }
    }
}

/// A finished page handed to the UI for display.
pub struct PanelView {
    pub id: PanelId,
    pub title: String,
    pub html: String,
    pub endpoint: WebviewEndpoint,
}

/// Whatever displays webviews.
pub trait WebviewHost: Send + Sync {
    /// Show a newly created panel.
    fn open(&self, view: PanelView);

    /// Bring an existing panel to the front.
    fn reveal(&self, id: &PanelId);
}

/// Shared dependencies of every panel.
#[derive(Clone)]
pub struct PanelContext {
    pub settings: GridSettings,
    /// Installation root, searched for the helper template.
    pub root: PathBuf,
    pub resolver: Arc<dyn KernelResolver>,
    pub host: Arc<dyn WebviewHost>,
    pub dump: Option<Arc<MessageDump>>,
}

/// What to show in the panel.
#[derive(Debug, Clone, Default)]
pub struct PanelRequest {
    pub variable: Option<String>,
    pub notebook: Option<NotebookRef>,
}

impl PanelRequest {
    pub fn title(&self) -> String {
        match &self.variable {
            Some(variable) => format!("Data Grid: {}", variable),
            None => "Data Grid".to_string(),
        }
    }
}

struct LivePanel {
    listener: JoinHandle<()>,
}

/// Live panels keyed by identity.
#[derive(Default)]
pub struct PanelRegistry {
    panels: HashMap<PanelId, LivePanel>,
}

impl PanelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Reveal the live data grid panel, or create it for `request`.
    pub async fn render(&mut self, ctx: &PanelContext, request: PanelRequest) -> RenderOutcome {
        let id = PanelId::data_grid();

        if let Some(panel) = self.panels.get(&id) {
            if !panel.listener.is_finished() {
                debug!("Revealing existing panel {}", id);
                ctx.host.reveal(&id);
                return RenderOutcome::Revealed(id);
            }
            // The webview went away without the host disposing it
            self.dispose(&id);
        }

        let payload = load_payload(ctx, &request).await;
        let (host, webview) = bridge::channel(ctx.dump.clone());
        let title = request.title();
        let page = html::render(&title, &html::nonce(), ctx.settings.column_width);

        let listener = tokio::spawn(serve_webview(id.clone(), host, payload));
        self.panels.insert(id.clone(), LivePanel { listener });

        info!("Created panel {} ({})", id, title);
        ctx.host.open(PanelView {
            id: id.clone(),
            title,
            html: page,
            endpoint: webview,
        });
        RenderOutcome::Created(id)
    }

    /// Dispose a panel, releasing its listener. Returns false if it was not live.
    pub fn dispose(&mut self, id: &PanelId) -> bool {
        match self.panels.remove(id) {
            Some(panel) => {
                panel.listener.abort();
                info!("Disposed panel {}", id);
                true
            }
            None => false,
        }
    }

    pub fn dispose_all(&mut self) {
        let ids: Vec<PanelId> = self.panels.keys().cloned().collect();
        for id in ids {
            self.dispose(&id);
        }
    }
}

impl Drop for PanelRegistry {
    fn drop(&mut self) {
        for panel in self.panels.values() {
            panel.listener.abort();
        }
    }
}

/// Answer webview messages with the panel's dataset until either side goes away.
async fn serve_webview(id: PanelId, mut host: HostEndpoint, payload: GridPayload) {
    while let Some(message) = host.recv().await {
        match message {
            WebviewMessage::Connected | WebviewMessage::Refresh { .. } => {
                if !host.post(&HostMessage::update(payload.clone())) {
                    break;
                }
            }
        }
    }
    debug!("Listener for panel {} finished", id);
    host.close();
}

/// Fetch the grid contents, falling back to an empty grid on any failure.
async fn load_payload(ctx: &PanelContext, request: &PanelRequest) -> GridPayload {
    let (Some(variable), Some(notebook)) = (&request.variable, &request.notebook) else {
        debug!("No variable or notebook, showing an empty grid");
        return GridPayload::empty();
    };
    match fetch(ctx, variable, notebook).await {
        Ok(dataset) => dataset.to_payload(),
        Err(PanelError::Kernel(e @ KernelError::Unavailable(_))) => {
            warn!("{}", e);
            GridPayload::failed(e.to_string())
        }
        Err(e) => {
            error!("Failed to load {}: {}", variable, e);
            GridPayload::failed(e.to_string())
        }
    }
}

async fn fetch(
    ctx: &PanelContext,
    variable: &str,
    notebook: &NotebookRef,
) -> Result<Dataset, PanelError> {
    let kernel = ctx.resolver.resolve(notebook).await?;
    let template = CodeTemplate::locate(ctx.settings.template_path.as_deref(), &ctx.root).await?;
    CodeRunner::new(ctx.settings.execute_timeout())
        .fetch_dataset(kernel.as_ref(), &template, variable)
        .await
}
