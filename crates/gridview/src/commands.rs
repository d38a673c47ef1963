//! Entry point: the commands the viewer registers and their dispatch.

use std::sync::Mutex;

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PanelError;
use crate::kernel::NotebookRef;
use crate::panel::{PanelContext, PanelId, PanelRegistry, PanelRequest, RenderOutcome};

pub const SHOW_HELLO_WORLD: &str = "showHelloWorld";
pub const SHOW_DATA_GRID: &str = "showDataGrid";

/// A variable picked in the variable inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(
        default,
        rename = "fileUri",
        alias = "file_uri",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ShowHelloWorld,
    ShowDataGrid(VariableDescriptor),
}

impl Command {
    /// Build a command from its registered id and JSON arguments.
    pub fn parse(id: &str, args: Value) -> Result<Self, PanelError> {
        match id {
            SHOW_HELLO_WORLD => Ok(Command::ShowHelloWorld),
            SHOW_DATA_GRID => serde_json::from_value(args)
                .map(Command::ShowDataGrid)
                .map_err(|source| PanelError::InvalidArguments {
                    command: id.to_string(),
                    source,
                }),
            other => Err(PanelError::UnknownCommand(other.to_string())),
        }
    }
}

/// An activated viewer: registered commands plus the panels they opened.
pub struct Extension {
    ctx: PanelContext,
    registry: tokio::sync::Mutex<PanelRegistry>,
    active_notebook: Mutex<Option<NotebookRef>>,
    commands: Vec<&'static str>,
}

impl Extension {
    pub fn activate(ctx: PanelContext) -> Self {
        let commands = vec![SHOW_HELLO_WORLD, SHOW_DATA_GRID];
        info!("Activated with commands {:?}", commands);
        Extension {
            ctx,
            registry: tokio::sync::Mutex::new(PanelRegistry::new()),
            active_notebook: Mutex::new(None),
            commands,
        }
    }

    pub fn registered_commands(&self) -> &[&'static str] {
        &self.commands
    }

    /// Set the notebook whose kernel backs variables without their own file URI.
    pub fn set_active_notebook(&self, notebook: Option<NotebookRef>) {
        if let Ok(mut active) = self.active_notebook.lock() {
            *active = notebook;
        }
    }

    pub fn active_notebook(&self) -> Option<NotebookRef> {
        self.active_notebook.lock().ok().and_then(|a| a.clone())
    }

    pub async fn execute_command(
        &self,
        id: &str,
        args: Value,
    ) -> Result<RenderOutcome, PanelError> {
        let command = Command::parse(id, args)?;
        Ok(self.run(command).await)
    }

    pub async fn run(&self, command: Command) -> RenderOutcome {
        let request = match command {
            Command::ShowHelloWorld => PanelRequest::default(),
            Command::ShowDataGrid(variable) => PanelRequest {
                notebook: variable
                    .file_uri
                    .map(NotebookRef::new)
                    .or_else(|| self.active_notebook()),
                variable: Some(variable.name),
            },
        };
        // Held across creation so concurrent invocations still yield one panel
        let mut registry = self.registry.lock().await;
        registry.render(&self.ctx, request).await
    }

    /// Called when the user closes a panel.
    pub async fn dispose_panel(&self, id: &PanelId) -> bool {
        self.registry.lock().await.dispose(id)
    }

    pub async fn live_panels(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn deactivate(&self) {
        self.registry.lock().await.dispose_all();
        info!("Deactivated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_show_data_grid() {
        let command = Command::parse(
            SHOW_DATA_GRID,
            json!({"name": "df", "type": "DataFrame", "fileUri": "/tmp/kernel.json"}),
        )
        .unwrap();
        assert_eq!(
            command,
            Command::ShowDataGrid(VariableDescriptor {
                name: "df".to_string(),
                kind: Some("DataFrame".to_string()),
                file_uri: Some("/tmp/kernel.json".to_string()),
            })
        );
    }

    #[test]
    fn test_parse_hello_world_ignores_args() {
        assert_eq!(
            Command::parse(SHOW_HELLO_WORLD, Value::Null).unwrap(),
            Command::ShowHelloWorld
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!(matches!(
            Command::parse("showSomethingElse", Value::Null),
            Err(PanelError::UnknownCommand(_))
        ));
        assert!(matches!(
            Command::parse(SHOW_DATA_GRID, json!({"type": "DataFrame"})),
            Err(PanelError::InvalidArguments { .. })
        ));
    }
}
