//! gridview - inspect a Jupyter kernel variable as an interactive data grid.
//!
//! A host process resolves the kernel behind a notebook, runs a small Python
//! helper to describe the variable (columns first, then rows), and shows the
//! result in a sandboxed webview. The host and the webview only talk through
//! JSON messages over the bridge in [`bridge`]; see `grid-protocol` for the
//! message types.

pub mod bridge;
pub mod commands;
pub mod dump;
pub mod error;
pub mod grid;
pub mod headless;
pub mod html;
pub mod kernel;
pub mod panel;
pub mod runner;
pub mod schema;
pub mod settings;
pub mod template;
pub mod window;

pub use commands::{Command, Extension, VariableDescriptor};
pub use error::{KernelError, PanelError, SchemaError, TemplateError};
pub use panel::{PanelContext, PanelId, RenderOutcome};
