//! A webview host without a display.
//!
//! Each opened panel becomes a [`HeadlessWebview`] that speaks the same
//! bridge protocol as the real page and keeps a [`GridModel`] of what the
//! page would show.

use std::sync::Mutex;

use grid_protocol::WebviewMessage;

use crate::bridge::WebviewEndpoint;
use crate::grid::GridModel;
use crate::panel::{PanelId, PanelView, WebviewHost};

pub struct HeadlessWebview {
    pub id: PanelId,
    pub title: String,
    pub html: String,
    endpoint: WebviewEndpoint,
    grid: GridModel,
}

impl HeadlessWebview {
    fn new(view: PanelView, column_width: u32) -> Self {
        HeadlessWebview {
            id: view.id,
            title: view.title,
            html: view.html,
            endpoint: view.endpoint,
            grid: GridModel::new(column_width),
        }
    }

    /// Announce the page as loaded and wait for the first update.
    pub async fn connect(&mut self) -> bool {
        self.endpoint.post(&WebviewMessage::Connected) && self.next_update().await
    }

    /// Ask for a refresh and wait for the resulting update.
    pub async fn refresh(&mut self) -> bool {
        self.endpoint.post(&WebviewMessage::Refresh {
            text: "refresh".to_string(),
        }) && self.next_update().await
    }

    /// Apply the next host message. Returns false once the host is gone.
    pub async fn next_update(&mut self) -> bool {
        match self.endpoint.recv().await {
            Some(message) => {
                self.grid.apply(message);
                true
            }
            None => false,
        }
    }

    pub fn grid(&self) -> &GridModel {
        &self.grid
    }

    pub fn endpoint(&self) -> &WebviewEndpoint {
        &self.endpoint
    }
}

/// Collects opened panels so the caller can drive them.
pub struct HeadlessHost {
    column_width: u32,
    opened: Mutex<Vec<HeadlessWebview>>,
    reveals: Mutex<Vec<PanelId>>,
}

impl HeadlessHost {
    pub fn new(column_width: u32) -> Self {
        HeadlessHost {
            column_width,
            opened: Mutex::new(Vec::new()),
            reveals: Mutex::new(Vec::new()),
        }
    }

    /// Take ownership of an opened panel's webview.
    pub fn take(&self, id: &PanelId) -> Option<HeadlessWebview> {
        let mut opened = self.opened.lock().ok()?;
        let index = opened.iter().position(|w| &w.id == id)?;
        Some(opened.remove(index))
    }

    /// Number of panels opened and not yet taken.
    pub fn pending(&self) -> usize {
        self.opened.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn reveals(&self) -> Vec<PanelId> {
        self.reveals
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl WebviewHost for HeadlessHost {
    fn open(&self, view: PanelView) {
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(HeadlessWebview::new(view, self.column_width));
        }
    }

    fn reveal(&self, id: &PanelId) {
        if let Ok(mut reveals) = self.reveals.lock() {
            reveals.push(id.clone());
        }
    }
}
