//! The message bridge between the host and a webview.
//!
//! The two sides only exchange serialized JSON strings over channels, the
//! same shape of traffic a real webview sends through its IPC, so the host
//! never hands the webview anything but data.

use std::sync::Arc;

use grid_protocol::{HostMessage, WebviewMessage};
use log::{debug, error, warn};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::dump::{Direction, MessageDump};

/// Create a connected pair of endpoints.
pub fn channel(dump: Option<Arc<MessageDump>>) -> (HostEndpoint, WebviewEndpoint) {
    let (to_webview, from_host) = mpsc::unbounded_channel();
    let (to_host, from_webview) = mpsc::unbounded_channel();
    (
        HostEndpoint {
            to_webview,
            from_webview,
            dump,
        },
        WebviewEndpoint { to_host, from_host },
    )
}

/// The host's side of the bridge.
pub struct HostEndpoint {
    to_webview: UnboundedSender<String>,
    from_webview: UnboundedReceiver<String>,
    dump: Option<Arc<MessageDump>>,
}

impl HostEndpoint {
    /// Post a message to the webview. Returns false once the webview is gone.
    pub fn post(&self, message: &HostMessage) -> bool {
        let raw = match message.to_json() {
            Ok(raw) => raw,
            Err(e) => {
                error!("Failed to serialize host message: {}", e);
                return false;
            }
        };
        if let Some(dump) = &self.dump {
            dump.record(Direction::ToWebview, &raw);
        }
        self.to_webview.send(raw).is_ok()
    }

    /// Wait for the next well-formed message from the webview.
    ///
    /// Malformed messages are logged and skipped. Returns `None` once the
    /// webview side has been dropped.
    pub async fn recv(&mut self) -> Option<WebviewMessage> {
        while let Some(raw) = self.from_webview.recv().await {
            if let Some(dump) = &self.dump {
                dump.record(Direction::FromWebview, &raw);
            }
            match WebviewMessage::from_json(&raw) {
                Ok(message) => {
                    debug!("Webview message: {:?}", message);
                    return Some(message);
                }
                Err(e) => warn!("Ignoring webview message: {}", e),
            }
        }
        None
    }

    /// Stop accepting messages from the webview and drop the outbound side.
    pub fn close(mut self) {
        self.from_webview.close();
    }
}

/// The webview's side of the bridge.
pub struct WebviewEndpoint {
    to_host: UnboundedSender<String>,
    from_host: UnboundedReceiver<String>,
}

/// Cloneable sending half, for callbacks that outlive a borrow of the endpoint.
#[derive(Clone)]
pub struct WebviewSender {
    to_host: UnboundedSender<String>,
}

impl WebviewSender {
    /// Forward a raw message. Returns false once the host side is gone.
    pub fn post_raw(&self, raw: String) -> bool {
        self.to_host.send(raw).is_ok()
    }
}

impl WebviewEndpoint {
    pub fn post(&self, message: &WebviewMessage) -> bool {
        match message.to_json() {
            Ok(raw) => self.to_host.send(raw).is_ok(),
            Err(e) => {
                error!("Failed to serialize webview message: {}", e);
                false
            }
        }
    }

    pub fn post_raw(&self, raw: String) -> bool {
        self.to_host.send(raw).is_ok()
    }

    /// Wait for the next message from the host. `None` once the host is gone.
    pub async fn recv(&mut self) -> Option<HostMessage> {
        while let Some(raw) = self.from_host.recv().await {
            match HostMessage::from_json(&raw) {
                Ok(message) => return Some(message),
                Err(e) => warn!("Ignoring host message: {}", e),
            }
        }
        None
    }

    /// Split into a cloneable sender and the raw inbound stream.
    pub fn split(self) -> (WebviewSender, UnboundedReceiver<String>) {
        (
            WebviewSender {
                to_host: self.to_host,
            },
            self.from_host,
        )
    }
}
