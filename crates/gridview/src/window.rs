//! The windowed host: one tao window with a wry webview per panel.
//!
//! This takes over the current thread to run the GUI event loop. Kernel work
//! runs on a tokio runtime in the background and reaches the UI thread only
//! through [`GridEvent`]s.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use log::{debug, error, info};
use tao::{
    dpi::Size,
    event::{Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy, EventLoopWindowTarget},
    window::{Window, WindowBuilder, WindowId},
};
use wry::{
    http::{header::CONTENT_TYPE, HeaderValue, Method, Request, Response, StatusCode},
    WebView, WebViewBuilder,
};

use crate::bridge::WebviewSender;
use crate::commands::{Command, Extension};
use crate::dump::MessageDump;
use crate::html::{MESSAGE_PATH, SCHEME};
use crate::kernel::{ConnectionFileResolver, NotebookRef};
use crate::panel::{PanelContext, PanelId, PanelView, WebviewHost};
use crate::settings::GridSettings;

pub enum GridEvent {
    Open(Box<PanelView>),
    Reveal(PanelId),
    Deliver { window: WindowId, raw: String },
}

/// Forwards panel requests to the event loop.
pub struct WindowHost {
    proxy: Mutex<EventLoopProxy<GridEvent>>,
}

impl WindowHost {
    fn send(&self, event: GridEvent) {
        let sent = self
            .proxy
            .lock()
            .map(|proxy| proxy.send_event(event).is_ok())
            .unwrap_or(false);
        if !sent {
            error!("Event loop is gone, dropping UI event");
        }
    }
}

impl WebviewHost for WindowHost {
    fn open(&self, view: PanelView) {
        self.send(GridEvent::Open(Box::new(view)));
    }

    fn reveal(&self, id: &PanelId) {
        self.send(GridEvent::Reveal(id.clone()));
    }
}

pub struct LaunchOptions {
    pub settings: GridSettings,
    pub root: PathBuf,
    pub command: Command,
    pub notebook: Option<NotebookRef>,
    pub dump: Option<Arc<MessageDump>>,
}

struct OpenPanel {
    id: PanelId,
    // Dropped together; the webview must not outlive its window
    webview: WebView,
    window: Window,
}

fn respond(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Response<Vec<u8>> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Serve the page and accept bridge posts from it.
fn handle_request(
    request: Request<Vec<u8>>,
    page: &str,
    sender: &WebviewSender,
) -> Response<Vec<u8>> {
    match (request.method(), request.uri().path()) {
        (&Method::POST, MESSAGE_PATH) => {
            let raw = String::from_utf8_lossy(request.body()).into_owned();
            if sender.post_raw(raw) {
                respond(StatusCode::NO_CONTENT, "text/plain", Vec::new())
            } else {
                respond(StatusCode::GONE, "text/plain", b"Panel disposed".to_vec())
            }
        }
        (&Method::GET, "/") | (&Method::GET, "/index.html") => {
            respond(StatusCode::OK, "text/html", page.as_bytes().to_vec())
        }
        (&Method::GET, path) => {
            debug!("Asset not found: {}", path);
            respond(StatusCode::NOT_FOUND, "text/plain", b"Not Found".to_vec())
        }
        _ => respond(
            StatusCode::METHOD_NOT_ALLOWED,
            "text/plain",
            b"Method Not Allowed".to_vec(),
        ),
    }
}

fn open_panel(
    view: PanelView,
    target: &EventLoopWindowTarget<GridEvent>,
    settings: &GridSettings,
    proxy: &EventLoopProxy<GridEvent>,
    runtime: &tokio::runtime::Handle,
) -> Result<OpenPanel> {
    let window = WindowBuilder::new()
        .with_title(&view.title)
        .with_inner_size(Size::Logical(
            (settings.window_width, settings.window_height).into(),
        ))
        .build(target)?;
    let window_id = window.id();

    let (sender, mut inbound) = view.endpoint.split();
    let page = view.html;
    let webview = WebViewBuilder::new()
        .with_asynchronous_custom_protocol(SCHEME.into(), move |_webview_id, request, responder| {
            responder.respond(handle_request(request, &page, &sender));
        })
        .with_url(format!("{}://localhost/", SCHEME))
        .build(&window)?;

    let proxy = proxy.clone();
    runtime.spawn(async move {
        while let Some(raw) = inbound.recv().await {
            if proxy
                .send_event(GridEvent::Deliver {
                    window: window_id,
                    raw,
                })
                .is_err()
            {
                break;
            }
        }
    });

    Ok(OpenPanel {
        id: view.id,
        webview,
        window,
    })
}

/// Run `options.command` and show its panel in a native window.
pub fn launch(options: LaunchOptions) -> Result<()> {
    let event_loop: EventLoop<GridEvent> = EventLoopBuilder::with_user_event().build();
    let proxy = event_loop.create_proxy();
    let runtime = tokio::runtime::Runtime::new()?;

    let settings = options.settings.clone();
    let ctx = PanelContext {
        resolver: Arc::new(ConnectionFileResolver::new(settings.heartbeat_timeout())),
        host: Arc::new(WindowHost {
            proxy: Mutex::new(proxy.clone()),
        }),
        settings: options.settings,
        root: options.root,
        dump: options.dump,
    };
    let extension = Arc::new(Extension::activate(ctx));
    extension.set_active_notebook(options.notebook);

    let command = options.command;
    let runner = extension.clone();
    runtime.spawn(async move {
        let outcome = runner.run(command).await;
        info!("Command finished: {:?}", outcome);
    });

    let handle = runtime.handle().clone();
    let mut panels: HashMap<WindowId, OpenPanel> = HashMap::new();

    event_loop.run(move |event, target, control_flow| {
        *control_flow = ControlFlow::Wait;
        // Keep the runtime alive for as long as the loop runs
        let _ = &runtime;

        match event {
            Event::UserEvent(GridEvent::Open(view)) => {
                match open_panel(*view, target, &settings, &proxy, &handle) {
                    Ok(panel) => {
                        panels.insert(panel.window.id(), panel);
                    }
                    Err(e) => {
                        error!("Failed to open panel window: {:?}", e);
                        if panels.is_empty() {
                            *control_flow = ControlFlow::Exit;
                        }
                    }
                }
            }
            Event::UserEvent(GridEvent::Reveal(id)) => {
                if let Some(panel) = panels.values().find(|p| p.id == id) {
                    panel.window.set_focus();
                }
            }
            Event::UserEvent(GridEvent::Deliver { window, raw }) => {
                if let Some(panel) = panels.get(&window) {
                    panel
                        .webview
                        .evaluate_script(&format!("globalThis.onMessage({})", raw))
                        .unwrap_or_else(|e| error!("Failed to evaluate script: {:?}", e));
                }
            }
            Event::WindowEvent {
                event: WindowEvent::CloseRequested,
                window_id,
                ..
            } => {
                if let Some(panel) = panels.remove(&window_id) {
                    let id = panel.id.clone();
                    drop(panel);
                    let extension = extension.clone();
                    handle.spawn(async move {
                        extension.dispose_panel(&id).await;
                    });
                }
                if panels.is_empty() {
                    *control_flow = ControlFlow::Exit;
                }
            }
            _ => {}
        }
    });
}
