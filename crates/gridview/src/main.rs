//! gridview CLI entry point.
//!
//! Opens the data grid for a kernel variable, either in a native window or,
//! with `--headless`, printed to stdout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use serde_json::Value;

use gridview::commands::{Command, Extension, SHOW_DATA_GRID, SHOW_HELLO_WORLD};
use gridview::dump::MessageDump;
use gridview::headless::HeadlessHost;
use gridview::kernel::{ConnectionFileResolver, NotebookRef};
use gridview::panel::PanelContext;
use gridview::settings::{self, GridSettings};
use gridview::window::{self, LaunchOptions};

#[derive(Parser, Debug)]
#[command(name = "gridview")]
#[command(about = "Inspect a Jupyter kernel variable as a data grid")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Suppress log output
    #[arg(long, global = true)]
    quiet: bool,

    /// Settings file (default: ~/.config/gridview/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Write every bridge message to this file as JSON lines
    #[arg(long, global = true)]
    dump: Option<PathBuf>,

    /// Directory searched for python/dataframe_helper.py
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Print the grid instead of opening a window
    #[arg(long, global = true)]
    headless: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a variable from a running kernel
    Show {
        /// Name of the variable in the kernel namespace
        variable: String,

        /// Kernel connection file
        #[arg(long, short = 'f')]
        connection_file: PathBuf,
    },

    /// Open an empty grid panel
    Hello,

    /// Run a registered command by id with JSON arguments
    Exec {
        /// Command id (showHelloWorld or showDataGrid)
        id: String,

        /// Arguments as JSON
        #[arg(long, default_value = "null")]
        args: String,

        /// Kernel connection file used when the arguments carry no fileUri
        #[arg(long, short = 'f')]
        connection_file: Option<PathBuf>,
    },
}

fn notebook_for(path: &std::path::Path) -> NotebookRef {
    NotebookRef::new(path.display().to_string())
}

/// Resolve the subcommand into a command plus the active notebook.
fn resolve_command(command: Commands) -> Result<(Command, Option<NotebookRef>)> {
    match command {
        Commands::Show {
            variable,
            connection_file,
        } => {
            let args = serde_json::json!({ "name": variable });
            Ok((
                Command::parse(SHOW_DATA_GRID, args)?,
                Some(notebook_for(&connection_file)),
            ))
        }
        Commands::Hello => Ok((Command::parse(SHOW_HELLO_WORLD, Value::Null)?, None)),
        Commands::Exec {
            id,
            args,
            connection_file,
        } => {
            let args: Value = serde_json::from_str(&args)?;
            Ok((
                Command::parse(&id, args)?,
                connection_file.as_deref().map(notebook_for),
            ))
        }
    }
}

async fn run_headless(
    settings: GridSettings,
    root: PathBuf,
    command: Command,
    notebook: Option<NotebookRef>,
    dump: Option<Arc<MessageDump>>,
) -> Result<()> {
    let host = Arc::new(HeadlessHost::new(settings.column_width));
    let ctx = PanelContext {
        resolver: Arc::new(ConnectionFileResolver::new(settings.heartbeat_timeout())),
        host: host.clone(),
        settings,
        root,
        dump,
    };
    let extension = Extension::activate(ctx);
    extension.set_active_notebook(notebook);

    let outcome = extension.run(command).await;
    let mut webview = host
        .take(outcome.id())
        .ok_or_else(|| anyhow::anyhow!("Panel {} was not opened", outcome.id()))?;

    if !webview.connect().await {
        anyhow::bail!("Panel closed before sending any data");
    }
    println!("{}", webview.title);
    println!("{}", webview.grid().render_table());

    extension.deactivate().await;
    if let Some(error) = webview.grid().error() {
        anyhow::bail!("{}", error);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if !cli.quiet {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
            .init();
    }

    let settings = match &cli.settings {
        Some(path) => settings::load_settings_from(path),
        None => settings::load_settings(),
    };
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let dump = cli
        .dump
        .as_deref()
        .map(MessageDump::create)
        .transpose()?
        .map(Arc::new);

    let (command, notebook) = resolve_command(cli.command)?;
    info!("Running {:?}", command);

    if cli.headless {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(run_headless(settings, root, command, notebook, dump))
    } else {
        window::launch(LaunchOptions {
            settings,
            root,
            command,
            notebook,
            dump,
        })
    }
}
