//! Command-line front end driving a [`ViewerSession`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use crate::app::export::{ExportFormat, ExportOptions, Exporter};
use crate::app::forward::Forwarder;
use crate::app::selection::selection_from_args;
use crate::app::session::ViewerSession;
use crate::domain::capabilities::{ModelRelationIndexer, RelationIndexer};
use crate::domain::model::{ElementId, FragmentSelection};
use crate::infra::config::Config;
use crate::infra::json_model::{JsonModel, JsonModelLoader};
use crate::infra::remote::RemoteClient;

#[derive(Debug, Parser)]
#[command(
    name = "ifcprops",
    author,
    version,
    about = "Resolve, export, and forward properties of selected model elements"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve the selected elements and print their properties
    Show {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        /// Also write the export file (defaults to the configured file name)
        #[arg(long, value_name = "PATH", num_args = 0..=1)]
        export: Option<Option<PathBuf>>,
        /// Format of the export file
        #[arg(long, value_enum, requires = "export")]
        format: Option<ExportFormat>,
    },
    /// Resolve every element of the model and write them to a file
    ExportAll {
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,
    },
    /// Print the relation tree of the model
    Tree {
        #[command(flatten)]
        model: ModelArgs,
    },
    /// Forward the selected elements to the analysis service
    Send {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        #[arg(long, value_enum)]
        action: SendAction,
        /// Element to simplify
        #[arg(long, required_if_eq("action", "simplify"))]
        element: Option<u64>,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Index the selected elements remotely and ask a question about them
    Query {
        #[command(flatten)]
        model: ModelArgs,
        #[command(flatten)]
        selection: SelectionArgs,
        question: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SendAction {
    Store,
    Simplify,
    Index,
}

#[derive(Debug, Args)]
pub struct ModelArgs {
    /// JSON property dump of the model
    #[arg(long, short, value_name = "FILE")]
    pub model: PathBuf,
}

#[derive(Debug, Args)]
pub struct SelectionArgs {
    /// Selected elements as <fragment>=<id>[,<id>...]; repeatable
    #[arg(long = "select", short = 's', value_name = "FRAGMENT=IDS")]
    pub select: Vec<String>,
    /// JSON file mapping fragment ids to element ids
    #[arg(long, value_name = "FILE", conflicts_with = "select")]
    pub selection: Option<PathBuf>,
}

impl SelectionArgs {
    fn resolve(&self) -> Result<FragmentSelection> {
        match &self.selection {
            Some(path) => {
                let data = fs::read_to_string(path)
                    .with_context(|| format!("failed to read selection file {}", path.display()))?;
                serde_json::from_str(&data)
                    .with_context(|| format!("invalid selection file {}", path.display()))
            }
            None => Ok(selection_from_args(&self.select)?),
        }
    }
}

#[derive(Debug, Args)]
pub struct RemoteArgs {
    /// Base URL of the analysis service (overrides configuration)
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,
}

/// Parse arguments from the process and run the selected command.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "ifcprops", &mut io::stdout());
        return Ok(());
    }

    let config = Config::load()?;
    crate::init(&config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(execute(cli.command, config))
}

async fn execute(command: Commands, mut config: Config) -> Result<()> {
    match command {
        Commands::Show {
            model,
            selection,
            export,
            format,
        } => {
            let mut session = load_session(&config, &model.model).await?;
            let report = session.select(selection.resolve()?).await?;
            eprintln!(
                "resolved {} of {} elements ({} failed)",
                report.resolved, report.requested, report.failed
            );

            let snapshot = session.snapshot();
            let exporter = Exporter::new()?;
            let mut options = ExportOptions::from_config(&config)?;
            options.format = ExportFormat::Json;
            println!("{}", exporter.render(&snapshot, &options)?);

            if let Some(target) = export {
                let mut options = ExportOptions::for_selection(&config)?;
                if let Some(path) = target {
                    options.output_path = Some(path);
                }
                if let Some(format) = format {
                    options.format = format;
                }
                let result = exporter.export(&snapshot, &options)?;
                report_export(result.elements, result.output_path.as_deref());
            }
        }
        Commands::ExportAll {
            model,
            output,
            format,
        } => {
            let session = load_session(&config, &model.model).await?;
            let snapshot = session.collect_all().await?;
            let mut options = ExportOptions::for_bulk(&config)?;
            if let Some(path) = output {
                options.output_path = Some(path);
            }
            if let Some(format) = format {
                options.format = format;
            }
            let result = Exporter::new()?.export(&snapshot, &options)?;
            report_export(result.elements, result.output_path.as_deref());
            if !snapshot.failures.is_empty() {
                eprintln!("{} elements could not be resolved", snapshot.failures.len());
            }
        }
        Commands::Tree { model } => {
            let document = JsonModel::from_path(&model.model)?;
            let index = ModelRelationIndexer.index(&document).await?;
            if index.is_empty() {
                println!("model has no relations");
            } else {
                println!("{}", index.render_tree(|id| document.label(id)));
            }
        }
        Commands::Send {
            model,
            selection,
            action,
            element,
            remote,
        } => {
            apply_remote_args(&mut config, remote);
            let mut session = load_session(&config, &model.model).await?;
            session.select(selection.resolve()?).await?;
            let snapshot = session.snapshot();

            let mut forwarder = Forwarder::new(RemoteClient::from_config(&config.remote)?);
            let reply = match action {
                SendAction::Store => forwarder.store(&snapshot).await?,
                SendAction::Simplify => {
                    let id = element.map(ElementId).context("--element is required for simplify")?;
                    forwarder.simplify(&snapshot, id).await?
                }
                SendAction::Index => forwarder.build_index(&snapshot).await?,
            };
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
        Commands::Query {
            model,
            selection,
            question,
            top_k,
            remote,
        } => {
            apply_remote_args(&mut config, remote);
            let mut session = load_session(&config, &model.model).await?;
            session.select(selection.resolve()?).await?;

            let mut forwarder = Forwarder::new(RemoteClient::from_config(&config.remote)?);
            forwarder.build_index(&session.snapshot()).await?;
            let answer = forwarder.query(&question, top_k).await?;
            println!("{answer}");
        }
        Commands::Completions { .. } => unreachable!("handled before the runtime starts"),
    }
    Ok(())
}

async fn load_session(config: &Config, path: &Path) -> Result<ViewerSession> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read model file {}", path.display()))?;
    let mut session = ViewerSession::from_config(config);
    session
        .load_model(&JsonModelLoader, &ModelRelationIndexer, &bytes)
        .await?;
    Ok(session)
}

fn apply_remote_args(config: &mut Config, remote: RemoteArgs) {
    if let Some(url) = remote.url {
        config.remote.set_base_url(url);
    }
}

fn report_export(elements: usize, path: Option<&Path>) {
    match path {
        Some(path) => eprintln!("exported {elements} elements to {}", path.display()),
        None => eprintln!("exported {elements} elements"),
    }
}
