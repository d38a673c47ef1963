//! Message types for the gridview webview bridge.
//!
//! The host process and the sandboxed webview never share memory. Everything
//! that crosses the boundary is one of the JSON messages defined here:
//!
//! - webview → host: [`WebviewMessage`] (`connected`, `refresh`)
//! - host → webview: [`HostMessage`] (`update`)
//!
//! Cells are either numbers or strings, see [`CellValue`].

mod cell;
mod message;

pub use cell::{CellValue, MISSING_CELL};
pub use message::{GridPayload, HostMessage, ProtocolError, WebviewMessage};
